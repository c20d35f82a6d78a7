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

//! Sony SPC700 encoding, the SNES's dedicated sound coprocessor CPU: a
//! 6502-adjacent 8-bit core with its own register set (`a`, `x`, `y`,
//! `sp`, `ya` as a 16-bit accumulator pair) and zero-page-first direct
//! page addressing.

use super::{Backend, EncodeRequest, Flags, relative_branch_offset};
use crate::ast::{AddressingMode, SizeSuffix};
use crate::errors::AssemblyError;

pub struct Spc700Backend;

impl Spc700Backend {
    pub fn new() -> Self {
        Self
    }
}

impl Default for Spc700Backend {
    fn default() -> Self {
        Self::new()
    }
}

const REGISTERS: &[&str] = &["a", "x", "y", "sp", "ya", "psw"];

impl Backend for Spc700Backend {
    fn size(
        &self,
        mnemonic: &str,
        _size_suffix: Option<SizeSuffix>,
        mode: AddressingMode,
        operand_value: Option<i64>,
        _flags: Flags,
    ) -> Result<u32, AssemblyError> {
        if ["bra", "beq", "bne", "bcs", "bcc", "bvs", "bvc", "bmi", "bpl"].contains(&mnemonic) {
            return Ok(2);
        }
        if mnemonic == "cbne" || mnemonic == "dbnz" {
            return Ok(3);
        }
        let fits_zero_page = matches!(operand_value, Some(v) if (0..=0xff).contains(&v));
        Ok(1 + match mode {
            AddressingMode::Implied | AddressingMode::Register => 0,
            AddressingMode::Immediate => 1,
            AddressingMode::Direct | AddressingMode::DirectIndexedX | AddressingMode::DirectIndexedY => 1,
            AddressingMode::Extended | AddressingMode::ExtendedIndexedX | AddressingMode::ExtendedIndexedY => {
                if fits_zero_page { 1 } else { 2 }
            }
            AddressingMode::IndirectIndexedX | AddressingMode::IndirectIndexedY => 1,
            AddressingMode::BitIndex => 2,
            _ => 1,
        })
    }

    fn encode(&self, request: &EncodeRequest, _flags: &mut Flags) -> Result<Vec<u8>, AssemblyError> {
        let mnemonic = request.mnemonic;
        let value = request.operand_value.unwrap_or(0);

        match mnemonic {
            "nop" => return Ok(vec![0x00]),
            "sleep" => return Ok(vec![0xEF]),
            "stop" => return Ok(vec![0xFF]),
            "clrc" => return Ok(vec![0x60]),
            "setc" => return Ok(vec![0x80]),
            "notc" => return Ok(vec![0xED]),
            "clrp" => return Ok(vec![0x20]),
            "setp" => return Ok(vec![0x40]),
            "ei" => return Ok(vec![0xA0]),
            "di" => return Ok(vec![0xC0]),
            "ret" => return Ok(vec![0x6F]),
            "reti" => return Ok(vec![0x7F]),
            "daa" => return Ok(vec![0xDF]),
            "das" => return Ok(vec![0xBE]),
            _ => {}
        }

        if ["bra", "beq", "bne", "bcs", "bcc", "bvs", "bvc", "bmi", "bpl"].contains(&mnemonic) {
            let opcode = match mnemonic {
                "bra" => 0x2F,
                "beq" => 0xF0,
                "bne" => 0xD0,
                "bcs" => 0xB0,
                "bcc" => 0x90,
                "bvs" => 0x70,
                "bvc" => 0x50,
                "bmi" => 0x30,
                "bpl" => 0x10,
                _ => unreachable!(),
            };
            let target = request.operand_value.unwrap_or(request.current_address);
            let offset = relative_branch_offset(target, request.current_address)?;
            return Ok(vec![opcode, offset as u8]);
        }

        if mnemonic == "mov" {
            return encode_mov(request);
        }

        if let Some(opcode) = alu_opcode(mnemonic, request) {
            return Ok(opcode);
        }

        let fits_zero_page = matches!(request.operand_value, Some(v) if (0..=0xff).contains(&v));
        let operand_bytes = match request.mode {
            AddressingMode::Implied | AddressingMode::Register => 0,
            AddressingMode::Direct | AddressingMode::DirectIndexedX | AddressingMode::DirectIndexedY => 1,
            AddressingMode::Extended if fits_zero_page => 1,
            AddressingMode::Extended => 2,
            _ => 1,
        };
        let opcode = opcode_for(mnemonic, request.mode).ok_or_else(|| conflict(mnemonic))?;
        let mut bytes = vec![opcode];
        match operand_bytes {
            0 => {}
            1 => bytes.push(value as u8),
            2 => bytes.extend_from_slice(&(value as u16).to_le_bytes()),
            _ => unreachable!("spc700 operands never exceed 2 bytes"),
        }
        Ok(bytes)
    }

    fn mnemonics(&self) -> &'static [&'static str] {
        MNEMONICS
    }

    fn is_register(&self, name: &str) -> bool {
        REGISTERS.contains(&name.to_ascii_lowercase().as_str())
    }
}

fn conflict(mnemonic: &str) -> AssemblyError {
    AssemblyError::ArchitectureConflict {
        mnemonic: mnemonic.to_string(),
        architecture: "spc700".to_string(),
    }
}

fn encode_mov(request: &EncodeRequest) -> Result<Vec<u8>, AssemblyError> {
    let value = request.operand_value.unwrap_or(0);
    let dest = request.register.map(|r| r.to_ascii_lowercase());

    if request.mode == AddressingMode::Immediate {
        return match dest.as_deref() {
            Some("a") => Ok(vec![0xE8, value as u8]),
            Some("x") => Ok(vec![0xCD, value as u8]),
            Some("y") => Ok(vec![0x8D, value as u8]),
            _ => Err(conflict("mov")),
        };
    }

    if request.mode == AddressingMode::Register {
        return match dest.as_deref() {
            Some("x") => Ok(vec![0x5D]), // mov x, a
            Some("y") => Ok(vec![0xFD]), // mov y, a
            Some("a") => Ok(vec![0x7D]), // mov a, x (default)
            Some("sp") => Ok(vec![0xBD]),
            _ => Err(conflict("mov")),
        };
    }

    match dest.as_deref() {
        Some("a") => Ok(vec![0xE4, value as u8]),
        Some("x") => Ok(vec![0xF8, value as u8]),
        Some("y") => Ok(vec![0xEB, value as u8]),
        None => Ok(vec![0xC4, value as u8]),
        _ => Err(conflict("mov")),
    }
}

fn alu_opcode(mnemonic: &str, request: &EncodeRequest) -> Option<Vec<u8>> {
    let value = request.operand_value.unwrap_or(0);
    let immediate_base = match mnemonic {
        "adc" => 0x88,
        "sbc" => 0xA8,
        "cmp" => 0x68,
        "and" => 0x28,
        "or" => 0x08,
        "eor" => 0x48,
        _ => return None,
    };
    if request.mode == AddressingMode::Immediate {
        return Some(vec![immediate_base, value as u8]);
    }
    None
}

const MNEMONICS: &[&str] = &[
    "adc", "and", "asl", "bbc", "bbs", "bcc", "bcs", "beq", "bmi", "bne", "bpl", "bra", "brk",
    "bvc", "bvs", "call", "cbne", "clr1", "clrc", "clrp", "clrv", "cmp", "cmpw", "daa", "das",
    "dbnz", "dec", "decw", "di", "div", "ei", "eor", "incw", "inc", "jmp", "lsr", "mov", "movw",
    "mul", "nop", "notc", "or", "pcall", "pop", "push", "ret", "ret1", "reti", "rol", "ror",
    "set1", "setc", "setp", "sleep", "stop", "subw", "tcall", "tclr1", "tset1", "xcn",
];

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn nop_is_one_byte() {
        let backend = Spc700Backend::new();
        let mut flags = Flags::default();
        let req = EncodeRequest {
            mnemonic: "nop",
            size_suffix: None,
            mode: AddressingMode::Implied,
            register: None,
            operand_value: None,
            current_address: 0,
        };
        assert_eq!(backend.encode(&req, &mut flags).unwrap(), vec![0x00]);
    }

    #[test]
    fn mov_a_immediate_encodes_two_bytes() {
        let backend = Spc700Backend::new();
        let mut flags = Flags::default();
        let req = EncodeRequest {
            mnemonic: "mov",
            size_suffix: None,
            mode: AddressingMode::Immediate,
            register: Some("a"),
            operand_value: Some(0x42),
            current_address: 0,
        };
        assert_eq!(backend.encode(&req, &mut flags).unwrap(), vec![0xE8, 0x42]);
    }

    #[test]
    fn bra_backward_branch_is_negative_offset() {
        let backend = Spc700Backend::new();
        let mut flags = Flags::default();
        let req = EncodeRequest {
            mnemonic: "bra",
            size_suffix: None,
            mode: AddressingMode::Relative,
            register: None,
            operand_value: Some(0x1000),
            current_address: 0x1004,
        };
        let bytes = backend.encode(&req, &mut flags).unwrap();
        assert_eq!(bytes[0], 0x2F);
        assert_eq!(bytes[1] as i8, -6);
    }

    #[test]
    fn is_register_recognizes_ya_pair() {
        let backend = Spc700Backend::new();
        assert!(backend.is_register("ya"));
        assert!(!backend.is_register("loop"));
    }
}
