/*
Copyright 2025 Connor Nolan

Licensed under the Apache License, Version 2.0 (the "License");
you may not use this file except in compliance with the License.
You may obtain a copy of the License at

    http://www.apache.org/licenses/LICENSE-2.0

Unless required by applicable law or agreed to in writing, software
distributed under the License is distributed on an "AS IS" BASIS,
WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
See the License for the specific language governing permissions and
limitations under the License.
*/

//! Architecture-dispatch instruction encoding. Every
//! target shares the same generic AST (`Instruction`/`Operand`); only how
//! many bytes an operand needs and which concrete opcode byte a
//! (mnemonic, addressing mode) pair maps to differ per chip.

mod arm7tdmi;
mod m68000;
mod mos6502_family;
mod sm83;
mod spc700;
mod v30mz;
mod wdc65816;
mod z80;

use crate::ast::{AddressingMode, Architecture, Instruction, SizeSuffix};
use crate::errors::AssemblyError;

/// Mutable processor-status bits an encoder needs to thread across
/// instructions. Only the 65816's `m`/`x` flags are used today, but the
/// struct is architecture-agnostic so the two-pass analyzer can own a
/// single `Flags` value without caring which backend is active.
#[derive(Debug, Clone, Copy, Default)]
pub struct Flags {
    /// 65816 accumulator width: `true` = 8-bit.
    pub m8: bool,
    /// 65816 index-register width: `true` = 8-bit.
    pub x8: bool,
}

impl Flags {
    /// 65816 boots in native mode with both flags clear (16-bit); `sep`
    /// with bit 5 or 6 set narrows them, `rep` widens them. Every other
    /// architecture ignores this entirely.
    pub fn native_65816() -> Self {
        Self { m8: false, x8: false }
    }
}

pub struct EncodeRequest<'a> {
    pub mnemonic: &'a str,
    pub size_suffix: Option<SizeSuffix>,
    pub mode: AddressingMode,
    pub register: Option<&'a str>,
    pub operand_value: Option<i64>,
    pub current_address: i64,
}

pub trait Backend {
    /// Byte count for this instruction. `operand_value` is `None` when the
    /// operand is still an unresolved forward reference (routine during
    /// pass 1); backends that need the value to pick between a short and
    /// long encoding (6502-family zero-page vs absolute) treat an absent
    /// value as "assume the wide form" so a later pass can't shrink an
    /// address and invalidate earlier sizing.
    fn size(
        &self,
        mnemonic: &str,
        size_suffix: Option<SizeSuffix>,
        mode: AddressingMode,
        operand_value: Option<i64>,
        flags: Flags,
    ) -> Result<u32, AssemblyError>;

    /// Concrete opcode + operand bytes. `flags` is `&mut` because `rep`/
    /// `sep` (65816) mutate processor state as a side effect of encoding.
    fn encode(&self, request: &EncodeRequest, flags: &mut Flags) -> Result<Vec<u8>, AssemblyError>;

    /// Mnemonics this backend recognizes, for `.macro` reserved-word
    /// checking and for `.assert`-free diagnostics that name an
    /// unsupported instruction.
    fn mnemonics(&self) -> &'static [&'static str];

    /// Whether `name` is one of this architecture's registers. The parser
    /// can't tell a bare register name (`asl a`) from a bare identifier
    /// (`asl label`) apart from the grammar alone, since both are just an
    /// `Identifier` expression under `AddressingMode::Direct` — the
    /// analyzer reclassifies such operands into `AddressingMode::Register`
    /// by asking the backend.
    fn is_register(&self, name: &str) -> bool;

    /// Apply any processor-state side effect `mnemonic` has on `flags`,
    /// without emitting bytes. Pass 1 only sizes instructions (it never
    /// calls `encode`), but the 65816's `rep`/`sep` change how wide a
    /// later immediate is, so pass 1 needs to replay that mutation to size
    /// correctly. Every other architecture's `Flags` is inert, hence the
    /// no-op default.
    fn update_flags(&self, _mnemonic: &str, _operand_value: Option<i64>, _flags: &mut Flags) {}
}

pub fn backend_for(architecture: Architecture) -> Box<dyn Backend> {
    match architecture {
        Architecture::Mos6502 => Box::new(mos6502_family::Mos6502Backend::new(mos6502_family::Variant::Nmos6502)),
        Architecture::Mos6507 => Box::new(mos6502_family::Mos6502Backend::new(mos6502_family::Variant::Nmos6502)),
        Architecture::Wdc65C02 => Box::new(mos6502_family::Mos6502Backend::new(mos6502_family::Variant::Wdc65C02)),
        Architecture::HuC6280 => Box::new(mos6502_family::Mos6502Backend::new(mos6502_family::Variant::HuC6280)),
        Architecture::Wdc65816 => Box::new(wdc65816::Wdc65816Backend::new()),
        Architecture::Sm83 => Box::new(sm83::Sm83Backend::new()),
        Architecture::Z80 => Box::new(z80::Z80Backend::new()),
        Architecture::M68000 => Box::new(m68000::M68000Backend::new()),
        Architecture::Arm7Tdmi => Box::new(arm7tdmi::Arm7TdmiBackend::new()),
        Architecture::V30Mz => Box::new(v30mz::V30MzBackend::new()),
        Architecture::Spc700 => Box::new(spc700::Spc700Backend::new()),
    }
}

/// Branch mnemonics that are always 2 bytes total regardless of target,
/// across every 6502-descended architecture.
pub const SHORT_BRANCH_MNEMONICS: &[&str] =
    &["bcc", "bcs", "beq", "bmi", "bne", "bpl", "bra", "bvc", "bvs"];

/// The shared "explicit suffix, else addressing-mode-implied" sizing rule
/// usable as-is by every architecture whose Immediate size
/// isn't flag-dependent (i.e. everything except the 65816). `Direct`/
/// `DirectIndexedX`/`DirectIndexedY` additionally promote to their
/// `Extended` width when the operand doesn't fit in 8 bits, implementing
/// the zero-page-vs-absolute selection rule generically.
pub fn generic_operand_size(
    size_suffix: Option<SizeSuffix>,
    mode: AddressingMode,
    operand_value: Option<i64>,
) -> u32 {
    if let Some(suffix) = size_suffix {
        return match suffix {
            SizeSuffix::Byte => 1,
            SizeSuffix::Word => 2,
            SizeSuffix::Long => 3,
        };
    }
    let fits_zero_page = matches!(operand_value, Some(v) if (0..=0xff).contains(&v));
    match mode {
        AddressingMode::Implied | AddressingMode::Register => 0,
        AddressingMode::Immediate => 1,
        AddressingMode::Direct | AddressingMode::DirectIndexedX | AddressingMode::DirectIndexedY => {
            if fits_zero_page { 1 } else { 2 }
        }
        AddressingMode::Indirect
        | AddressingMode::IndirectIndexedX
        | AddressingMode::IndirectIndexedY
        | AddressingMode::RegisterIndirect
        | AddressingMode::BitIndex => 1,
        AddressingMode::RegisterIndirectDisplaced => 1,
        AddressingMode::Relative => 1,
        AddressingMode::Extended | AddressingMode::ExtendedIndexedX | AddressingMode::ExtendedIndexedY => 2,
        AddressingMode::Long
        | AddressingMode::LongIndexedX
        | AddressingMode::IndirectLong
        | AddressingMode::IndirectLongIndexedY => 3,
        AddressingMode::StackRelative | AddressingMode::StackRelativeIndirectY => 1,
        AddressingMode::Special => 0,
    }
}

/// `target - (currentAddress + 2)` must fit in a signed 8-bit range.
/// Shared by every 6502-descended backend's relative branches.
pub fn relative_branch_offset(
    target: i64,
    current_address: i64,
) -> Result<i8, AssemblyError> {
    let offset = target - (current_address + 2);
    if !(-128..=127).contains(&offset) {
        return Err(AssemblyError::BranchOutOfRange { offset, bits: 8 });
    }
    Ok(offset as i8)
}
