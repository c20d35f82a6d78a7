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

//! NMOS 6502, WDC 65C02 and HuC6280 encoding. The three variants share one
//! opcode table; 65C02 and HuC6280 only add instructions and addressing
//! modes on top of the NMOS base, so the table is built as base-plus-overlay
//! rather than three independent copies.

use super::{Backend, EncodeRequest, Flags, generic_operand_size, relative_branch_offset};
use crate::ast::{AddressingMode, SizeSuffix};
use crate::errors::AssemblyError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Variant {
    Nmos6502,
    Wdc65C02,
    HuC6280,
}

pub struct Mos6502Backend {
    variant: Variant,
}

impl Mos6502Backend {
    pub fn new(variant: Variant) -> Self {
        Self { variant }
    }

    fn opcode(&self, mnemonic: &str, mode: AddressingMode) -> Option<u8> {
        if let Some(op) = base_opcode(mnemonic, mode) {
            return Some(op);
        }
        if matches!(self.variant, Variant::Wdc65C02 | Variant::HuC6280) {
            if let Some(op) = c02_opcode(mnemonic, mode) {
                return Some(op);
            }
        }
        if self.variant == Variant::HuC6280 {
            if let Some(op) = huc6280_opcode(mnemonic, mode) {
                return Some(op);
            }
        }
        None
    }
}

const REGISTERS: &[&str] = &["a", "x", "y", "s"];

impl Backend for Mos6502Backend {
    fn size(
        &self,
        mnemonic: &str,
        size_suffix: Option<SizeSuffix>,
        mode: AddressingMode,
        operand_value: Option<i64>,
        _flags: Flags,
    ) -> Result<u32, AssemblyError> {
        if super::SHORT_BRANCH_MNEMONICS.contains(&mnemonic) {
            return Ok(2);
        }
        Ok(1 + generic_operand_size(size_suffix, mode, operand_value))
    }

    fn encode(&self, request: &EncodeRequest, _flags: &mut Flags) -> Result<Vec<u8>, AssemblyError> {
        let mnemonic = request.mnemonic;
        if super::SHORT_BRANCH_MNEMONICS.contains(&mnemonic) {
            let opcode = self.opcode(mnemonic, AddressingMode::Relative).ok_or_else(|| {
                AssemblyError::ArchitectureConflict {
                    mnemonic: mnemonic.to_string(),
                    architecture: self.variant_name().to_string(),
                }
            })?;
            let target = request.operand_value.unwrap_or(request.current_address);
            let offset = relative_branch_offset(target, request.current_address)?;
            return Ok(vec![opcode, offset as u8]);
        }

        let fits_zero_page = matches!(request.operand_value, Some(v) if (0..=0xff).contains(&v));
        let resolved_mode = match request.mode {
            AddressingMode::Direct | AddressingMode::DirectIndexedX | AddressingMode::DirectIndexedY
                if !fits_zero_page && request.size_suffix != Some(SizeSuffix::Byte) =>
            {
                match request.mode {
                    AddressingMode::Direct => AddressingMode::Extended,
                    AddressingMode::DirectIndexedX => AddressingMode::ExtendedIndexedX,
                    AddressingMode::DirectIndexedY => AddressingMode::ExtendedIndexedY,
                    other => other,
                }
            }
            other => other,
        };

        let opcode = self.opcode(mnemonic, resolved_mode).ok_or_else(|| {
            AssemblyError::ArchitectureConflict {
                mnemonic: mnemonic.to_string(),
                architecture: self.variant_name().to_string(),
            }
        })?;

        let operand_bytes = generic_operand_size(request.size_suffix, resolved_mode, request.operand_value);
        let mut bytes = vec![opcode];
        let value = request.operand_value.unwrap_or(0);
        match operand_bytes {
            0 => {}
            1 => bytes.push(value as u8),
            2 => bytes.extend_from_slice(&(value as u16).to_le_bytes()),
            3 => bytes.extend_from_slice(&(value as u32).to_le_bytes()[..3]),
            _ => unreachable!("6502-family operands are never wider than 3 bytes"),
        }
        Ok(bytes)
    }

    fn mnemonics(&self) -> &'static [&'static str] {
        match self.variant {
            Variant::Nmos6502 => NMOS_MNEMONICS,
            Variant::Wdc65C02 => C02_MNEMONICS,
            Variant::HuC6280 => HUC6280_MNEMONICS,
        }
    }

    fn is_register(&self, name: &str) -> bool {
        REGISTERS.contains(&name.to_ascii_lowercase().as_str())
    }
}

impl Mos6502Backend {
    fn variant_name(&self) -> &'static str {
        match self.variant {
            Variant::Nmos6502 => "mos6502",
            Variant::Wdc65C02 => "65sc02",
            Variant::HuC6280 => "huc6280",
        }
    }
}

const NMOS_MNEMONICS: &[&str] = &[
    "adc", "and", "asl", "bcc", "bcs", "beq", "bit", "bmi", "bne", "bpl", "brk", "bvc", "bvs",
    "clc", "cld", "cli", "clv", "cmp", "cpx", "cpy", "dec", "dex", "dey", "eor", "inc", "inx",
    "iny", "jmp", "jsr", "lda", "ldx", "ldy", "lsr", "nop", "ora", "pha", "php", "pla", "plp",
    "rol", "ror", "rti", "rts", "sbc", "sec", "sed", "sei", "sta", "stx", "sty", "tax", "tay",
    "tsx", "txa", "txs", "tya",
];

const C02_MNEMONICS: &[&str] = &[
    "adc", "and", "asl", "bcc", "bcs", "beq", "bit", "bmi", "bne", "bpl", "bra", "brk", "bvc",
    "bvs", "clc", "cld", "cli", "clv", "cmp", "cpx", "cpy", "dec", "dex", "dey", "eor", "inc",
    "inx", "iny", "jmp", "jsr", "lda", "ldx", "ldy", "lsr", "nop", "ora", "pha", "php", "phx",
    "phy", "pla", "plp", "plx", "ply", "rol", "ror", "rti", "rts", "sbc", "sec", "sed", "sei",
    "sta", "stx", "sty", "stz", "tax", "tay", "trb", "tsb", "tsx", "txa", "txs", "tya",
];

const HUC6280_MNEMONICS: &[&str] = &[
    "adc", "and", "asl", "bcc", "bcs", "beq", "bit", "bmi", "bne", "bpl", "bra", "brk", "bvc",
    "bvs", "clc", "cld", "cli", "clv", "cmp", "cpx", "cpy", "csh", "csl", "dec", "dex", "dey",
    "eor", "inc", "inx", "iny", "jmp", "jsr", "lda", "ldx", "ldy", "lsr", "nop", "ora", "pha",
    "php", "phx", "phy", "pla", "plp", "plx", "ply", "rol", "ror", "rti", "rts", "say", "sax",
    "sbc", "sec", "sed", "sei", "sta", "stx", "sty", "stz", "sxy", "tax", "tay", "trb", "tsb",
    "tsx", "txa", "txs", "tya",
];

fn base_opcode(mnemonic: &str, mode: AddressingMode) -> Option<u8> {
    use AddressingMode::*;
    Some(match (mnemonic, mode) {
        ("adc", Immediate) => 0x69,
        ("adc", Direct) => 0x65,
        ("adc", DirectIndexedX) => 0x75,
        ("adc", Extended) => 0x6D,
        ("adc", ExtendedIndexedX) => 0x7D,
        ("adc", ExtendedIndexedY) => 0x79,
        ("adc", IndirectIndexedX) => 0x61,
        ("adc", IndirectIndexedY) => 0x71,
        ("and", Immediate) => 0x29,
        ("and", Direct) => 0x25,
        ("and", DirectIndexedX) => 0x35,
        ("and", Extended) => 0x2D,
        ("and", ExtendedIndexedX) => 0x3D,
        ("and", ExtendedIndexedY) => 0x39,
        ("and", IndirectIndexedX) => 0x21,
        ("and", IndirectIndexedY) => 0x31,
        ("asl", Implied | Register) => 0x0A,
        ("asl", Direct) => 0x06,
        ("asl", DirectIndexedX) => 0x16,
        ("asl", Extended) => 0x0E,
        ("asl", ExtendedIndexedX) => 0x1E,
        ("bcc", Relative) => 0x90,
        ("bcs", Relative) => 0xB0,
        ("beq", Relative) => 0xF0,
        ("bit", Direct) => 0x24,
        ("bit", Extended) => 0x2C,
        ("bmi", Relative) => 0x30,
        ("bne", Relative) => 0xD0,
        ("bpl", Relative) => 0x10,
        ("brk", Implied) => 0x00,
        ("bvc", Relative) => 0x50,
        ("bvs", Relative) => 0x70,
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
        ("cmp", IndirectIndexedX) => 0xC1,
        ("cmp", IndirectIndexedY) => 0xD1,
        ("cpx", Immediate) => 0xE0,
        ("cpx", Direct) => 0xE4,
        ("cpx", Extended) => 0xEC,
        ("cpy", Immediate) => 0xC0,
        ("cpy", Direct) => 0xC4,
        ("cpy", Extended) => 0xCC,
        ("dec", Direct) => 0xC6,
        ("dec", DirectIndexedX) => 0xD6,
        ("dec", Extended) => 0xCE,
        ("dec", ExtendedIndexedX) => 0xDE,
        ("dex", Implied) => 0xCA,
        ("dey", Implied) => 0x88,
        ("eor", Immediate) => 0x49,
        ("eor", Direct) => 0x45,
        ("eor", DirectIndexedX) => 0x55,
        ("eor", Extended) => 0x4D,
        ("eor", ExtendedIndexedX) => 0x5D,
        ("eor", ExtendedIndexedY) => 0x59,
        ("eor", IndirectIndexedX) => 0x41,
        ("eor", IndirectIndexedY) => 0x51,
        ("inc", Direct) => 0xE6,
        ("inc", DirectIndexedX) => 0xF6,
        ("inc", Extended) => 0xEE,
        ("inc", ExtendedIndexedX) => 0xFE,
        ("inx", Implied) => 0xE8,
        ("iny", Implied) => 0xC8,
        ("jmp", Extended) => 0x4C,
        ("jmp", Indirect) => 0x6C,
        ("jsr", Extended) => 0x20,
        ("lda", Immediate) => 0xA9,
        ("lda", Direct) => 0xA5,
        ("lda", DirectIndexedX) => 0xB5,
        ("lda", Extended) => 0xAD,
        ("lda", ExtendedIndexedX) => 0xBD,
        ("lda", ExtendedIndexedY) => 0xB9,
        ("lda", IndirectIndexedX) => 0xA1,
        ("lda", IndirectIndexedY) => 0xB1,
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
        ("lsr", DirectIndexedX) => 0x56,
        ("lsr", Extended) => 0x4E,
        ("lsr", ExtendedIndexedX) => 0x5E,
        ("nop", Implied) => 0xEA,
        ("ora", Immediate) => 0x09,
        ("ora", Direct) => 0x05,
        ("ora", DirectIndexedX) => 0x15,
        ("ora", Extended) => 0x0D,
        ("ora", ExtendedIndexedX) => 0x1D,
        ("ora", ExtendedIndexedY) => 0x19,
        ("ora", IndirectIndexedX) => 0x01,
        ("ora", IndirectIndexedY) => 0x11,
        ("pha", Implied) => 0x48,
        ("php", Implied) => 0x08,
        ("pla", Implied) => 0x68,
        ("plp", Implied) => 0x28,
        ("rol", Implied | Register) => 0x2A,
        ("rol", Direct) => 0x26,
        ("rol", DirectIndexedX) => 0x36,
        ("rol", Extended) => 0x2E,
        ("rol", ExtendedIndexedX) => 0x3E,
        ("ror", Implied | Register) => 0x6A,
        ("ror", Direct) => 0x66,
        ("ror", DirectIndexedX) => 0x76,
        ("ror", Extended) => 0x6E,
        ("ror", ExtendedIndexedX) => 0x7E,
        ("rti", Implied) => 0x40,
        ("rts", Implied) => 0x60,
        ("sbc", Immediate) => 0xE9,
        ("sbc", Direct) => 0xE5,
        ("sbc", DirectIndexedX) => 0xF5,
        ("sbc", Extended) => 0xED,
        ("sbc", ExtendedIndexedX) => 0xFD,
        ("sbc", ExtendedIndexedY) => 0xF9,
        ("sbc", IndirectIndexedX) => 0xE1,
        ("sbc", IndirectIndexedY) => 0xF1,
        ("sec", Implied) => 0x38,
        ("sed", Implied) => 0xF8,
        ("sei", Implied) => 0x78,
        ("sta", Direct) => 0x85,
        ("sta", DirectIndexedX) => 0x95,
        ("sta", Extended) => 0x8D,
        ("sta", ExtendedIndexedX) => 0x9D,
        ("sta", ExtendedIndexedY) => 0x99,
        ("sta", IndirectIndexedX) => 0x81,
        ("sta", IndirectIndexedY) => 0x91,
        ("stx", Direct) => 0x86,
        ("stx", DirectIndexedY) => 0x96,
        ("stx", Extended) => 0x8E,
        ("sty", Direct) => 0x84,
        ("sty", DirectIndexedX) => 0x94,
        ("sty", Extended) => 0x8C,
        ("tax", Implied) => 0xAA,
        ("tay", Implied) => 0xA8,
        ("tsx", Implied) => 0xBA,
        ("txa", Implied) => 0x8A,
        ("txs", Implied) => 0x9A,
        ("tya", Implied) => 0x98,
        _ => return None,
    })
}

fn c02_opcode(mnemonic: &str, mode: AddressingMode) -> Option<u8> {
    use AddressingMode::*;
    Some(match (mnemonic, mode) {
        ("bra", Relative) => 0x80,
        ("phx", Implied) => 0xDA,
        ("phy", Implied) => 0x5A,
        ("plx", Implied) => 0xFA,
        ("ply", Implied) => 0x7A,
        ("stz", Direct) => 0x64,
        ("stz", DirectIndexedX) => 0x74,
        ("stz", Extended) => 0x9C,
        ("stz", ExtendedIndexedX) => 0x9E,
        ("trb", Direct) => 0x14,
        ("trb", Extended) => 0x1C,
        ("tsb", Direct) => 0x04,
        ("tsb", Extended) => 0x0C,
        ("ora", Indirect) => 0x12,
        ("and", Indirect) => 0x32,
        ("eor", Indirect) => 0x52,
        ("adc", Indirect) => 0x72,
        ("sta", Indirect) => 0x92,
        ("lda", Indirect) => 0xB2,
        ("cmp", Indirect) => 0xD2,
        ("sbc", Indirect) => 0xF2,
        _ => return None,
    })
}

/// HuC6280-only mnemonics: CPU-speed switch and zero-page block transfer
/// setup instructions (`sax`/`say`/`sxy` register swaps).
fn huc6280_opcode(mnemonic: &str, mode: AddressingMode) -> Option<u8> {
    use AddressingMode::*;
    Some(match (mnemonic, mode) {
        ("csh", Implied) => 0xD4,
        ("csl", Implied) => 0x54,
        ("sax", Implied) => 0x22,
        ("say", Implied) => 0x42,
        ("sxy", Implied) => 0x02,
        _ => return None,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::AddressingMode;

    fn request(mnemonic: &'static str, mode: AddressingMode, value: Option<i64>, addr: i64) -> EncodeRequest<'static> {
        EncodeRequest {
            mnemonic,
            size_suffix: None,
            mode,
            register: None,
            operand_value: value,
            current_address: addr,
        }
    }

    #[test]
    fn jmp_absolute_encodes_three_bytes() {
        let backend = Mos6502Backend::new(Variant::Nmos6502);
        let mut flags = Flags::default();
        let req = request("jmp", AddressingMode::Direct, Some(3), 0);
        let bytes = backend.encode(&req, &mut flags).unwrap();
        assert_eq!(bytes, vec![0x4C, 0x03, 0x00]);
    }

    #[test]
    fn zero_page_selected_when_operand_fits_a_byte() {
        let backend = Mos6502Backend::new(Variant::Nmos6502);
        let mut flags = Flags::default();
        let req = request("lda", AddressingMode::Direct, Some(0x44), 0);
        let bytes = backend.encode(&req, &mut flags).unwrap();
        assert_eq!(bytes, vec![0xA5, 0x44]);
    }

    #[test]
    fn branch_back_to_self_is_minus_two() {
        let backend = Mos6502Backend::new(Variant::Nmos6502);
        let mut flags = Flags::default();
        let req = request("bne", AddressingMode::Relative, Some(0x8000), 0x8000);
        let bytes = backend.encode(&req, &mut flags).unwrap();
        assert_eq!(bytes, vec![0xD0, 0xFE]);
    }

    #[test]
    fn bra_only_available_on_65c02_and_huc6280() {
        let nmos = Mos6502Backend::new(Variant::Nmos6502);
        assert!(nmos.opcode("bra", AddressingMode::Relative).is_none());
        let c02 = Mos6502Backend::new(Variant::Wdc65C02);
        assert_eq!(c02.opcode("bra", AddressingMode::Relative), Some(0x80));
    }

    #[test]
    fn unsupported_mnemonic_is_architecture_conflict() {
        let backend = Mos6502Backend::new(Variant::Nmos6502);
        let mut flags = Flags::default();
        let req = request("stz", AddressingMode::Direct, Some(0), 0);
        assert!(matches!(
            backend.encode(&req, &mut flags),
            Err(AssemblyError::ArchitectureConflict { .. })
        ));
    }
}
