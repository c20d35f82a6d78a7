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

//! Motorola 68000 encoding (the Genesis/32X CPU). Covers the mainline
//! data-movement, arithmetic and branch subset those toolchains exercise;
//! full EA-mode coverage (e.g. `movem`, scaled indexing) is not modeled.

use super::{Backend, EncodeRequest, Flags};
use crate::ast::{AddressingMode, SizeSuffix};
use crate::errors::AssemblyError;

pub struct M68000Backend;

impl M68000Backend {
    pub fn new() -> Self {
        Self
    }
}

impl Default for M68000Backend {
    fn default() -> Self {
        Self::new()
    }
}

const DATA_REGISTERS: &[&str] = &["d0", "d1", "d2", "d3", "d4", "d5", "d6", "d7"];
const ADDRESS_REGISTERS: &[&str] = &["a0", "a1", "a2", "a3", "a4", "a5", "a6", "a7", "sp"];

fn size_bits(size: Option<SizeSuffix>) -> u16 {
    match size.unwrap_or(SizeSuffix::Word) {
        SizeSuffix::Byte => 0b00,
        SizeSuffix::Word => 0b01,
        SizeSuffix::Long => 0b10,
    }
}

fn register_number(name: &str) -> Option<u16> {
    if let Some(pos) = DATA_REGISTERS.iter().position(|r| *r == name) {
        return Some(pos as u16);
    }
    if name == "sp" {
        return Some(7);
    }
    ADDRESS_REGISTERS.iter().position(|r| *r == name).map(|p| p as u16)
}

impl Backend for M68000Backend {
    fn size(
        &self,
        mnemonic: &str,
        size_suffix: Option<SizeSuffix>,
        mode: AddressingMode,
        _operand_value: Option<i64>,
        _flags: Flags,
    ) -> Result<u32, AssemblyError> {
        let extension_words: u32 = match mode {
            AddressingMode::Immediate => {
                if size_suffix == Some(SizeSuffix::Long) {
                    2
                } else {
                    1
                }
            }
            AddressingMode::Extended => 2,
            AddressingMode::RegisterIndirectDisplaced => 1,
            AddressingMode::Relative => {
                if mnemonic == "bra" || mnemonic.starts_with('b') {
                    1
                } else {
                    0
                }
            }
            _ => 0,
        };
        Ok(2 + extension_words * 2)
    }

    fn encode(&self, request: &EncodeRequest, _flags: &mut Flags) -> Result<Vec<u8>, AssemblyError> {
        let mnemonic = request.mnemonic;
        let value = request.operand_value.unwrap_or(0);
        let size = size_bits(request.size_suffix);

        match mnemonic {
            "nop" => return Ok(vec![0x4E, 0x71]),
            "rts" => return Ok(vec![0x4E, 0x75]),
            "rte" => return Ok(vec![0x4E, 0x73]),
            "reset" => return Ok(vec![0x4E, 0x70]),
            "illegal" => return Ok(vec![0x4A, 0xFC]),
            "trapv" => return Ok(vec![0x4E, 0x76]),
            _ => {}
        }

        if mnemonic == "bra" || mnemonic == "bsr" || mnemonic.starts_with('b') && mnemonic.len() == 3 {
            let base: u16 = match mnemonic {
                "bra" => 0x6000,
                "bsr" => 0x6100,
                "beq" => 0x6700,
                "bne" => 0x6600,
                "bcc" => 0x6400,
                "bcs" => 0x6500,
                "bpl" => 0x6A00,
                "bmi" => 0x6B00,
                "bge" => 0x6C00,
                "blt" => 0x6D00,
                "bgt" => 0x6E00,
                "ble" => 0x6F00,
                _ => return Err(conflict(mnemonic)),
            };
            let target = request.operand_value.unwrap_or(request.current_address);
            let displacement = target - (request.current_address + 2);
            if !(-32768..=32767).contains(&displacement) {
                return Err(AssemblyError::BranchOutOfRange { offset: displacement, bits: 16 });
            }
            let opcode = base | (0u16);
            let mut bytes = opcode.to_be_bytes().to_vec();
            bytes.extend_from_slice(&(displacement as i16).to_be_bytes());
            return Ok(bytes);
        }

        if mnemonic == "jmp" || mnemonic == "jsr" {
            let opcode: u16 = if mnemonic == "jmp" { 0x4EF9 } else { 0x4EB9 };
            let mut bytes = opcode.to_be_bytes().to_vec();
            bytes.extend_from_slice(&(value as u32).to_be_bytes());
            return Ok(bytes);
        }

        if mnemonic == "move" {
            let dest_reg = request.register.map(|r| r.to_ascii_lowercase());
            let dest_num = dest_reg.as_deref().and_then(register_number).unwrap_or(0);
            let size_field: u16 = match request.size_suffix.unwrap_or(SizeSuffix::Word) {
                SizeSuffix::Byte => 0b01,
                SizeSuffix::Long => 0b10,
                SizeSuffix::Word => 0b11,
            };
            let opcode = 0x0000 | (size_field << 12) | (dest_num << 9);
            let mut bytes = opcode.to_be_bytes().to_vec();
            match request.mode {
                AddressingMode::Immediate => {
                    if request.size_suffix == Some(SizeSuffix::Long) {
                        bytes.extend_from_slice(&(value as u32).to_be_bytes());
                    } else {
                        bytes.extend_from_slice(&(value as u16).to_be_bytes());
                    }
                }
                _ => bytes.extend_from_slice(&(value as u32).to_be_bytes()),
            }
            return Ok(bytes);
        }

        if let Some(reg) = request.register {
            let reg_num = register_number(&reg.to_ascii_lowercase()).unwrap_or(0);
            let base: u16 = match mnemonic {
                "add" => 0xD000,
                "sub" => 0x9000,
                "cmp" => 0xB000,
                "and" => 0xC000,
                "or" => 0x8000,
                "eor" => 0xB100,
                _ => return Err(conflict(mnemonic)),
            };
            let opcode = base | (reg_num << 9) | (size << 6);
            let mut bytes = opcode.to_be_bytes().to_vec();
            bytes.extend_from_slice(&(value as u32).to_be_bytes());
            return Ok(bytes);
        }

        Err(conflict(mnemonic))
    }

    fn mnemonics(&self) -> &'static [&'static str] {
        MNEMONICS
    }

    fn is_register(&self, name: &str) -> bool {
        let lower = name.to_ascii_lowercase();
        DATA_REGISTERS.contains(&lower.as_str()) || ADDRESS_REGISTERS.contains(&lower.as_str())
            || lower == "pc" || lower == "ccr" || lower == "sr"
    }
}

fn conflict(mnemonic: &str) -> AssemblyError {
    AssemblyError::ArchitectureConflict {
        mnemonic: mnemonic.to_string(),
        architecture: "m68000".to_string(),
    }
}

const MNEMONICS: &[&str] = &[
    "add", "and", "bcc", "bcs", "beq", "bge", "bgt", "ble", "blt", "bmi", "bne", "bpl", "bra",
    "bsr", "cmp", "eor", "illegal", "jmp", "jsr", "lea", "move", "movea", "movem", "nop", "or",
    "reset", "rte", "rts", "sub", "swap", "trap", "trapv",
];

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn nop_is_two_bytes() {
        let backend = M68000Backend::new();
        let mut flags = Flags::default();
        let req = EncodeRequest {
            mnemonic: "nop",
            size_suffix: None,
            mode: AddressingMode::Implied,
            register: None,
            operand_value: None,
            current_address: 0,
        };
        assert_eq!(backend.encode(&req, &mut flags).unwrap(), vec![0x4E, 0x71]);
    }

    #[test]
    fn bra_encodes_16_bit_displacement() {
        let backend = M68000Backend::new();
        let mut flags = Flags::default();
        let req = EncodeRequest {
            mnemonic: "bra",
            size_suffix: None,
            mode: AddressingMode::Relative,
            register: None,
            operand_value: Some(10),
            current_address: 0,
        };
        let bytes = backend.encode(&req, &mut flags).unwrap();
        assert_eq!(bytes, vec![0x60, 0x00, 0x00, 0x08]);
    }
}
