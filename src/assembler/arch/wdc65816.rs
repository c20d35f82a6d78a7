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

//! WDC 65816 encoding. Superset of the 65C02 instruction set plus the
//! 24-bit long addressing modes and stack-relative forms, and the only
//! architecture whose `Immediate` operand width depends on runtime state
//! (the `m`/`x` flags `sep`/`rep` toggle) rather than the mnemonic alone.

use super::{Backend, EncodeRequest, Flags, relative_branch_offset};
use crate::ast::{AddressingMode, SizeSuffix};
use crate::errors::AssemblyError;

pub struct Wdc65816Backend;

impl Wdc65816Backend {
    pub fn new() -> Self {
        Self
    }
}

impl Default for Wdc65816Backend {
    fn default() -> Self {
        Self::new()
    }
}

const REGISTERS: &[&str] = &["a", "x", "y", "s", "dp", "pb", "db"];

/// `lda #imm` is a 1-byte immediate when the `m` flag is set (8-bit
/// accumulator) and 2 bytes otherwise; `ldx`/`ldy`/`cpx`/`cpy` follow the
/// `x` flag instead. Every other immediate-taking mnemonic (`and`, `ora`,
/// `cmp`, `adc`, `sbc`, `eor`, `bit`) is accumulator-width like `lda`.
const X_FLAG_MNEMONICS: &[&str] = &["ldx", "ldy", "cpx", "cpy"];

fn immediate_width_is_8bit(mnemonic: &str, flags: Flags) -> bool {
    if X_FLAG_MNEMONICS.contains(&mnemonic) {
        flags.x8
    } else {
        flags.m8
    }
}

impl Backend for Wdc65816Backend {
    fn size(
        &self,
        mnemonic: &str,
        size_suffix: Option<SizeSuffix>,
        mode: AddressingMode,
        operand_value: Option<i64>,
        flags: Flags,
    ) -> Result<u32, AssemblyError> {
        if super::SHORT_BRANCH_MNEMONICS.contains(&mnemonic) {
            return Ok(2);
        }
        if mnemonic == "brl" {
            return Ok(3);
        }
        if mnemonic == "per" {
            return Ok(3);
        }
        if let Some(suffix) = size_suffix {
            return Ok(1 + match suffix {
                SizeSuffix::Byte => 1,
                SizeSuffix::Word => 2,
                SizeSuffix::Long => 3,
            });
        }
        if mode == AddressingMode::Immediate {
            return Ok(if immediate_width_is_8bit(mnemonic, flags) { 2 } else { 3 });
        }
        let operand_bytes = match mode {
            AddressingMode::Implied | AddressingMode::Register => 0,
            AddressingMode::Direct | AddressingMode::DirectIndexedX | AddressingMode::DirectIndexedY => 1,
            AddressingMode::StackRelative | AddressingMode::StackRelativeIndirectY => 1,
            AddressingMode::Indirect
            | AddressingMode::IndirectIndexedX
            | AddressingMode::IndirectIndexedY
            | AddressingMode::IndirectLong
            | AddressingMode::IndirectLongIndexedY => 1,
            AddressingMode::Relative => 1,
            AddressingMode::Extended | AddressingMode::ExtendedIndexedX | AddressingMode::ExtendedIndexedY => 2,
            AddressingMode::Long | AddressingMode::LongIndexedX => 3,
            // `mvn`/`mvp`: two packed bank bytes (see `assembler::visit_block_move`).
            AddressingMode::Special => 2,
            _ => {
                return Err(AssemblyError::ArchitectureConflict {
                    mnemonic: mnemonic.to_string(),
                    architecture: "wdc65816".to_string(),
                });
            }
        };
        let _ = operand_value;
        Ok(1 + operand_bytes)
    }

    fn encode(&self, request: &EncodeRequest, flags: &mut Flags) -> Result<Vec<u8>, AssemblyError> {
        let mnemonic = request.mnemonic;

        if super::SHORT_BRANCH_MNEMONICS.contains(&mnemonic) {
            let opcode = short_branch_opcode(mnemonic).ok_or_else(|| conflict(mnemonic))?;
            let target = request.operand_value.unwrap_or(request.current_address);
            let offset = relative_branch_offset(target, request.current_address)?;
            return Ok(vec![opcode, offset as u8]);
        }
        if mnemonic == "brl" || mnemonic == "per" {
            let opcode = if mnemonic == "brl" { 0x82 } else { 0x62 };
            let target = request.operand_value.unwrap_or(request.current_address);
            let offset = target - (request.current_address + 3);
            return Ok([&[opcode][..], &(offset as i16 as u16).to_le_bytes()].concat());
        }

        if mnemonic == "rep" || mnemonic == "sep" {
            let value = request.operand_value.unwrap_or(0);
            apply_rep_sep(mnemonic, value, flags);
            let opcode = if mnemonic == "rep" { 0xC2 } else { 0xE2 };
            return Ok(vec![opcode, value as u8]);
        }

        let mode = request.mode;
        let opcode = opcode_for(mnemonic, mode).ok_or_else(|| conflict(mnemonic))?;
        let value = request.operand_value.unwrap_or(0);

        let operand_bytes = if mode == AddressingMode::Immediate {
            if immediate_width_is_8bit(mnemonic, *flags) { 1 } else { 2 }
        } else {
            match mode {
                AddressingMode::Implied | AddressingMode::Register => 0,
                AddressingMode::Direct
                | AddressingMode::DirectIndexedX
                | AddressingMode::DirectIndexedY
                | AddressingMode::StackRelative
                | AddressingMode::StackRelativeIndirectY
                | AddressingMode::Indirect
                | AddressingMode::IndirectIndexedX
                | AddressingMode::IndirectIndexedY
                | AddressingMode::IndirectLong
                | AddressingMode::IndirectLongIndexedY => 1,
                AddressingMode::Extended | AddressingMode::ExtendedIndexedX | AddressingMode::ExtendedIndexedY => 2,
                AddressingMode::Long | AddressingMode::LongIndexedX => 3,
                // `mvn`/`mvp`: `value`'s low byte is the destination bank and
                // high byte the source bank (see `assembler::visit_block_move`);
                // the little-endian 2-byte write below emits them in that
                // order, which is also the order the instruction encodes in.
                AddressingMode::Special => 2,
                _ => return Err(conflict(mnemonic)),
            }
        };

        let mut bytes = vec![opcode];
        match operand_bytes {
            0 => {}
            1 => bytes.push(value as u8),
            2 => bytes.extend_from_slice(&(value as u16).to_le_bytes()),
            3 => bytes.extend_from_slice(&(value as u32).to_le_bytes()[..3]),
            _ => unreachable!("65816 operands never exceed 3 bytes"),
        }
        Ok(bytes)
    }

    fn mnemonics(&self) -> &'static [&'static str] {
        MNEMONICS
    }

    fn is_register(&self, name: &str) -> bool {
        REGISTERS.contains(&name.to_ascii_lowercase().as_str())
    }

    fn update_flags(&self, mnemonic: &str, operand_value: Option<i64>, flags: &mut Flags) {
        if mnemonic == "rep" || mnemonic == "sep" {
            apply_rep_sep(mnemonic, operand_value.unwrap_or(0), flags);
        }
    }
}

/// `rep #const8`/`sep #const8` narrow or widen the `m`/`x` status flags;
/// shared between `encode` (pass 2) and `update_flags` (pass 1, so the
/// sizing of later immediates already sees the post-`rep`/`sep` width).
fn apply_rep_sep(mnemonic: &str, value: i64, flags: &mut Flags) {
    if mnemonic == "rep" {
        if value & 0x20 != 0 {
            flags.m8 = false;
        }
        if value & 0x10 != 0 {
            flags.x8 = false;
        }
    } else {
        if value & 0x20 != 0 {
            flags.m8 = true;
        }
        if value & 0x10 != 0 {
            flags.x8 = true;
        }
    }
}

fn conflict(mnemonic: &str) -> AssemblyError {
    AssemblyError::ArchitectureConflict {
        mnemonic: mnemonic.to_string(),
        architecture: "wdc65816".to_string(),
    }
}

fn short_branch_opcode(mnemonic: &str) -> Option<u8> {
    Some(match mnemonic {
        "bcc" => 0x90,
        "bcs" => 0xB0,
        "beq" => 0xF0,
        "bmi" => 0x30,
        "bne" => 0xD0,
        "bpl" => 0x10,
        "bra" => 0x80,
        "bvc" => 0x50,
        "bvs" => 0x70,
        _ => return None,
    })
}

const MNEMONICS: &[&str] = &[
    "adc", "and", "asl", "bcc", "bcs", "beq", "bit", "bmi", "bne", "bpl", "bra", "brk", "brl",
    "bvc", "bvs", "clc", "cld", "cli", "clv", "cmp", "cop", "cpx", "cpy", "dec", "dex", "dey",
    "eor", "inc", "inx", "iny", "jml", "jmp", "jsl", "jsr", "lda", "ldx", "ldy", "lsr", "mvn",
    "mvp", "nop", "ora", "pea", "pei", "per", "pha", "phb", "phd", "phk", "php", "phx", "phy",
    "pla", "plb", "pld", "plp", "plx", "ply", "rep", "rol", "ror", "rti", "rtl", "rts", "sbc",
    "sec", "sed", "sei", "sep", "sta", "stp", "stx", "sty", "stz", "tax", "tay", "tcd", "tcs",
    "tdc", "trb", "tsb", "tsc", "tsx", "txa", "txs", "txy", "tya", "tyx", "wai", "wdm", "xba",
    "xce",
];

fn opcode_for(mnemonic: &str, mode: AddressingMode) -> Option<u8> {
    use AddressingMode::*;
    Some(match (mnemonic, mode) {
        ("adc", Immediate) => 0x69,
        ("adc", Direct) => 0x65,
        ("adc", DirectIndexedX) => 0x75,
        ("adc", Extended) => 0x6D,
        ("adc", ExtendedIndexedX) => 0x7D,
        ("adc", ExtendedIndexedY) => 0x79,
        ("adc", Long) => 0x6F,
        ("adc", LongIndexedX) => 0x7F,
        ("adc", Indirect) => 0x72,
        ("adc", IndirectIndexedX) => 0x61,
        ("adc", IndirectIndexedY) => 0x71,
        ("adc", IndirectLong) => 0x67,
        ("adc", IndirectLongIndexedY) => 0x77,
        ("adc", StackRelative) => 0x63,
        ("adc", StackRelativeIndirectY) => 0x73,
        ("and", Immediate) => 0x29,
        ("and", Direct) => 0x25,
        ("and", DirectIndexedX) => 0x35,
        ("and", Extended) => 0x2D,
        ("and", ExtendedIndexedX) => 0x3D,
        ("and", ExtendedIndexedY) => 0x39,
        ("and", Long) => 0x2F,
        ("and", LongIndexedX) => 0x3F,
        ("and", Indirect) => 0x32,
        ("and", IndirectIndexedX) => 0x21,
        ("and", IndirectIndexedY) => 0x31,
        ("asl", Implied | Register) => 0x0A,
        ("asl", Direct) => 0x06,
        ("asl", DirectIndexedX) => 0x16,
        ("asl", Extended) => 0x0E,
        ("asl", ExtendedIndexedX) => 0x1E,
        ("bit", Immediate) => 0x89,
        ("bit", Direct) => 0x24,
        ("bit", DirectIndexedX) => 0x34,
        ("bit", Extended) => 0x2C,
        ("bit", ExtendedIndexedX) => 0x3C,
        ("brk", Implied) => 0x00,
        ("clc", Implied) => 0x18,
        ("cld", Implied) => 0xD8,
        ("cli", Implied) => 0x58,
        ("clv", Implied) => 0xB8,
        ("cmp", Immediate) => 0xC9,
        ("cmp", Direct) => 0xC5,
        ("cmp", DirectIndexedX) => 0xD5,
        ("cmp", Extended) => 0xCD,
        ("cmp", ExtendedIndexedX) => 0xDD,
        ("cmp", ExtendedIndexedY) => 0xD9,
        ("cmp", Long) => 0xCF,
        ("cmp", LongIndexedX) => 0xDF,
        ("cop", Immediate) => 0x02,
        ("cpx", Immediate) => 0xE0,
        ("cpx", Direct) => 0xE4,
        ("cpx", Extended) => 0xEC,
        ("cpy", Immediate) => 0xC0,
        ("cpy", Direct) => 0xC4,
        ("cpy", Extended) => 0xCC,
        ("dec", Implied | Register) => 0x3A,
        ("dec", Direct) => 0xC6,
        ("dec", DirectIndexedX) => 0xD6,
        ("dec", Extended) => 0xCE,
        ("dec", ExtendedIndexedX) => 0xDE,
        ("dex", Implied) => 0xCA,
        ("dey", Implied) => 0x88,
        ("eor", Immediate) => 0x49,
        ("eor", Direct) => 0x45,
        ("eor", Extended) => 0x4D,
        ("inc", Implied | Register) => 0x1A,
        ("inc", Direct) => 0xE6,
        ("inc", DirectIndexedX) => 0xF6,
        ("inc", Extended) => 0xEE,
        ("inc", ExtendedIndexedX) => 0xFE,
        ("inx", Implied) => 0xE8,
        ("iny", Implied) => 0xC8,
        ("jml", Long) => 0xDC,
        ("jml", Extended) => 0xDC,
        ("jmp", Extended) => 0x4C,
        ("jmp", Indirect) => 0x6C,
        ("jmp", Long) => 0x5C,
        ("jmp", IndirectIndexedX) => 0x7C,
        ("jsl", Long) => 0x22,
        ("jsr", Extended) => 0x20,
        ("jsr", IndirectIndexedX) => 0xFC,
        ("lda", Immediate) => 0xA9,
        ("lda", Direct) => 0xA5,
        ("lda", DirectIndexedX) => 0xB5,
        ("lda", Extended) => 0xAD,
        ("lda", ExtendedIndexedX) => 0xBD,
        ("lda", ExtendedIndexedY) => 0xB9,
        ("lda", Long) => 0xAF,
        ("lda", LongIndexedX) => 0xBF,
        ("lda", Indirect) => 0xB2,
        ("lda", IndirectIndexedX) => 0xA1,
        ("lda", IndirectIndexedY) => 0xB1,
        ("lda", IndirectLong) => 0xA7,
        ("lda", IndirectLongIndexedY) => 0xB7,
        ("lda", StackRelative) => 0xA3,
        ("lda", StackRelativeIndirectY) => 0xB3,
        ("ldx", Immediate) => 0xA2,
        ("ldx", Direct) => 0xA6,
        ("ldx", DirectIndexedY) => 0xB6,
        ("ldx", Extended) => 0xAE,
        ("ldx", ExtendedIndexedY) => 0xBE,
        ("ldy", Immediate) => 0xA0,
        ("ldy", Direct) => 0xA4,
        ("ldy", DirectIndexedX) => 0xB4,
        ("ldy", Extended) => 0xAC,
        ("ldy", ExtendedIndexedX) => 0xBC,
        ("lsr", Implied | Register) => 0x4A,
        ("lsr", Direct) => 0x46,
        ("lsr", Extended) => 0x4E,
        ("mvn", Special) => 0x54,
        ("mvp", Special) => 0x44,
        ("nop", Implied) => 0xEA,
        ("ora", Immediate) => 0x09,
        ("ora", Direct) => 0x05,
        ("ora", Extended) => 0x0D,
        ("pea", Extended) => 0xF4,
        ("pei", Direct) => 0xD4,
        ("pha", Implied) => 0x48,
        ("phb", Implied) => 0x8B,
        ("phd", Implied) => 0x0B,
        ("phk", Implied) => 0x4B,
        ("php", Implied) => 0x08,
        ("phx", Implied) => 0xDA,
        ("phy", Implied) => 0x5A,
        ("pla", Implied) => 0x68,
        ("plb", Implied) => 0xAB,
        ("pld", Implied) => 0x2B,
        ("plp", Implied) => 0x28,
        ("plx", Implied) => 0xFA,
        ("ply", Implied) => 0x7A,
        ("rol", Implied | Register) => 0x2A,
        ("rol", Direct) => 0x26,
        ("rol", Extended) => 0x2E,
        ("ror", Implied | Register) => 0x6A,
        ("ror", Direct) => 0x66,
        ("ror", Extended) => 0x6E,
        ("rti", Implied) => 0x40,
        ("rtl", Implied) => 0x6B,
        ("rts", Implied) => 0x60,
        ("sbc", Immediate) => 0xE9,
        ("sbc", Direct) => 0xE5,
        ("sbc", Extended) => 0xED,
        ("sec", Implied) => 0x38,
        ("sed", Implied) => 0xF8,
        ("sei", Implied) => 0x78,
        ("sta", Direct) => 0x85,
        ("sta", DirectIndexedX) => 0x95,
        ("sta", Extended) => 0x8D,
        ("sta", ExtendedIndexedX) => 0x9D,
        ("sta", ExtendedIndexedY) => 0x99,
        ("sta", Long) => 0x8F,
        ("sta", LongIndexedX) => 0x9F,
        ("sta", Indirect) => 0x92,
        ("sta", IndirectIndexedX) => 0x81,
        ("sta", IndirectIndexedY) => 0x91,
        ("sta", IndirectLong) => 0x87,
        ("sta", IndirectLongIndexedY) => 0x97,
        ("sta", StackRelative) => 0x83,
        ("sta", StackRelativeIndirectY) => 0x93,
        ("stp", Implied) => 0xDB,
        ("stx", Direct) => 0x86,
        ("stx", DirectIndexedY) => 0x96,
        ("stx", Extended) => 0x8E,
        ("sty", Direct) => 0x84,
        ("sty", DirectIndexedX) => 0x94,
        ("sty", Extended) => 0x8C,
        ("stz", Direct) => 0x64,
        ("stz", DirectIndexedX) => 0x74,
        ("stz", Extended) => 0x9C,
        ("stz", ExtendedIndexedX) => 0x9E,
        ("tax", Implied) => 0xAA,
        ("tay", Implied) => 0xA8,
        ("tcd", Implied) => 0x5B,
        ("tcs", Implied) => 0x1B,
        ("tdc", Implied) => 0x7B,
        ("trb", Direct) => 0x14,
        ("trb", Extended) => 0x1C,
        ("tsb", Direct) => 0x04,
        ("tsb", Extended) => 0x0C,
        ("tsc", Implied) => 0x3B,
        ("tsx", Implied) => 0xBA,
        ("txa", Implied) => 0x8A,
        ("txs", Implied) => 0x9A,
        ("txy", Implied) => 0x9B,
        ("tya", Implied) => 0x98,
        ("tyx", Implied) => 0xBB,
        ("wai", Implied) => 0xCB,
        ("wdm", Immediate) => 0x42,
        ("xba", Implied) => 0xEB,
        ("xce", Implied) => 0xFB,
        _ => return None,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(mnemonic: &'static str, mode: AddressingMode, value: Option<i64>) -> EncodeRequest<'static> {
        EncodeRequest {
            mnemonic,
            size_suffix: None,
            mode,
            register: None,
            operand_value: value,
            current_address: 0,
        }
    }

    #[test]
    fn lda_immediate_is_one_byte_under_8bit_accumulator() {
        let backend = Wdc65816Backend::new();
        let mut flags = Flags { m8: true, x8: false };
        let req = request("lda", AddressingMode::Immediate, Some(0x12));
        let bytes = backend.encode(&req, &mut flags).unwrap();
        assert_eq!(bytes, vec![0xA9, 0x12]);
    }

    #[test]
    fn lda_immediate_is_two_bytes_under_16bit_accumulator() {
        let backend = Wdc65816Backend::new();
        let mut flags = Flags::native_65816();
        let req = request("lda", AddressingMode::Immediate, Some(0x1234));
        let bytes = backend.encode(&req, &mut flags).unwrap();
        assert_eq!(bytes, vec![0xA9, 0x34, 0x12]);
    }

    #[test]
    fn rep_widens_accumulator_flag() {
        let backend = Wdc65816Backend::new();
        let mut flags = Flags { m8: true, x8: true };
        let req = request("rep", AddressingMode::Immediate, Some(0x20));
        backend.encode(&req, &mut flags).unwrap();
        assert!(!flags.m8);
        assert!(flags.x8);
    }

    #[test]
    fn long_absolute_encodes_three_address_bytes() {
        let backend = Wdc65816Backend::new();
        let mut flags = Flags::native_65816();
        let req = request("lda", AddressingMode::Long, Some(0x7E1234));
        let bytes = backend.encode(&req, &mut flags).unwrap();
        assert_eq!(bytes, vec![0xAF, 0x34, 0x12, 0x7E]);
    }

    #[test]
    fn mvn_block_move_is_three_bytes_dest_then_src() {
        // packed = (src << 8) | dest, per `assembler::visit_block_move`.
        let backend = Wdc65816Backend::new();
        let mut flags = Flags::native_65816();
        let packed = (0x7Ei64 << 8) | 0x7F;
        let req = request("mvn", AddressingMode::Special, Some(packed));
        let bytes = backend.encode(&req, &mut flags).unwrap();
        assert_eq!(bytes, vec![0x54, 0x7F, 0x7E]);
        let size = backend
            .size("mvn", None, AddressingMode::Special, Some(packed), flags)
            .unwrap();
        assert_eq!(size, 3);
    }

    #[test]
    fn mvp_block_move_uses_its_own_opcode() {
        let backend = Wdc65816Backend::new();
        let mut flags = Flags::native_65816();
        let req = request("mvp", AddressingMode::Special, Some(0x0001));
        let bytes = backend.encode(&req, &mut flags).unwrap();
        assert_eq!(bytes, vec![0x44, 0x01, 0x00]);
    }
}
