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

//! NEC V30MZ encoding (the WonderSwan's CPU): an 8086-compatible core, so
//! this backend follows 8086 opcode shapes rather than anything V20/V30
//! NEC-specific, since homebrew WonderSwan tooling targets the common
//! 8086 subset almost exclusively.

use super::{Backend, EncodeRequest, Flags};
use crate::ast::{AddressingMode, SizeSuffix};
use crate::errors::AssemblyError;

pub struct V30MzBackend;

impl V30MzBackend {
    pub fn new() -> Self {
        Self
    }
}

impl Default for V30MzBackend {
    fn default() -> Self {
        Self::new()
    }
}

const REGISTERS_8: &[&str] = &["al", "cl", "dl", "bl", "ah", "ch", "dh", "bh"];
const REGISTERS_16: &[&str] = &["ax", "cx", "dx", "bx", "sp", "bp", "si", "di"];
const SEGMENT_REGISTERS: &[&str] = &["cs", "ds", "es", "ss"];

fn reg16_code(name: &str) -> Option<u8> {
    REGISTERS_16.iter().position(|r| *r == name).map(|p| p as u8)
}

fn reg8_code(name: &str) -> Option<u8> {
    REGISTERS_8.iter().position(|r| *r == name).map(|p| p as u8)
}

impl Backend for V30MzBackend {
    fn size(
        &self,
        mnemonic: &str,
        size_suffix: Option<SizeSuffix>,
        mode: AddressingMode,
        _operand_value: Option<i64>,
        _flags: Flags,
    ) -> Result<u32, AssemblyError> {
        let is_word = size_suffix != Some(SizeSuffix::Byte);
        Ok(match mnemonic {
            "jmp" | "call" if mode == AddressingMode::Extended => 3,
            "jz" | "jnz" | "jc" | "jnc" | "jmp" | "loop" | "loopz" | "loopnz" if mode == AddressingMode::Relative => 2,
            "nop" | "hlt" | "cli" | "sti" | "cld" | "std" | "clc" | "stc" | "ret" | "retf"
            | "pushf" | "popf" => 1,
            "push" | "pop" | "inc" | "dec" => 1,
            _ if mode == AddressingMode::Immediate => {
                1 + if is_word { 2 } else { 1 }
            }
            _ => 2,
        })
    }

    fn encode(&self, request: &EncodeRequest, _flags: &mut Flags) -> Result<Vec<u8>, AssemblyError> {
        let mnemonic = request.mnemonic;
        let value = request.operand_value.unwrap_or(0);
        let reg = request.register.map(|r| r.to_ascii_lowercase());
        let is_word = request.size_suffix != Some(SizeSuffix::Byte);

        match mnemonic {
            "nop" => return Ok(vec![0x90]),
            "hlt" => return Ok(vec![0xF4]),
            "cli" => return Ok(vec![0xFA]),
            "sti" => return Ok(vec![0xFB]),
            "cld" => return Ok(vec![0xFC]),
            "std" => return Ok(vec![0xFD]),
            "clc" => return Ok(vec![0xF8]),
            "stc" => return Ok(vec![0xF9]),
            "ret" => return Ok(vec![0xC3]),
            "retf" => return Ok(vec![0xCB]),
            "pushf" => return Ok(vec![0x9C]),
            "popf" => return Ok(vec![0x9D]),
            _ => {}
        }

        if mnemonic == "push" || mnemonic == "pop" {
            let name = reg.as_deref().ok_or_else(|| conflict(mnemonic))?;
            if let Some(code) = reg16_code(name) {
                return Ok(vec![if mnemonic == "push" { 0x50 } else { 0x58 } + code]);
            }
            if let Some(idx) = SEGMENT_REGISTERS.iter().position(|r| *r == name) {
                let base = if mnemonic == "push" { 0x06 } else { 0x07 };
                return Ok(vec![base + idx as u8 * 8]);
            }
            return Err(conflict(mnemonic));
        }

        if mnemonic == "inc" || mnemonic == "dec" {
            let name = reg.as_deref().ok_or_else(|| conflict(mnemonic))?;
            if let Some(code) = reg16_code(name) {
                return Ok(vec![if mnemonic == "inc" { 0x40 } else { 0x48 } + code]);
            }
            return Err(conflict(mnemonic));
        }

        if mnemonic == "jmp" {
            if request.mode == AddressingMode::Relative {
                let target = request.operand_value.unwrap_or(request.current_address);
                let offset = target - (request.current_address + 2);
                if !(-128..=127).contains(&offset) {
                    return Err(AssemblyError::BranchOutOfRange { offset, bits: 8 });
                }
                return Ok(vec![0xEB, offset as u8]);
            }
            return Ok([&[0xE9][..], &(value as u16).to_le_bytes()].concat());
        }
        if mnemonic == "call" {
            return Ok([&[0xE8][..], &(value as u16).to_le_bytes()].concat());
        }
        if ["jz", "jnz", "jc", "jnc"].contains(&mnemonic) {
            let opcode = match mnemonic {
                "jz" => 0x74,
                "jnz" => 0x75,
                "jc" => 0x72,
                "jnc" => 0x73,
                _ => unreachable!(),
            };
            let target = request.operand_value.unwrap_or(request.current_address);
            let offset = target - (request.current_address + 2);
            if !(-128..=127).contains(&offset) {
                return Err(AssemblyError::BranchOutOfRange { offset, bits: 8 });
            }
            return Ok(vec![opcode, offset as u8]);
        }
        if ["loop", "loopz", "loopnz"].contains(&mnemonic) {
            let opcode = match mnemonic {
                "loop" => 0xE2,
                "loopz" => 0xE1,
                "loopnz" => 0xE0,
                _ => unreachable!(),
            };
            let target = request.operand_value.unwrap_or(request.current_address);
            let offset = target - (request.current_address + 2);
            if !(-128..=127).contains(&offset) {
                return Err(AssemblyError::BranchOutOfRange { offset, bits: 8 });
            }
            return Ok(vec![opcode, offset as u8]);
        }

        if mnemonic == "mov" {
            if request.mode == AddressingMode::Immediate {
                if let Some(name) = &reg {
                    if let Some(code) = reg16_code(name) {
                        return Ok([&[0xB8 + code][..], &(value as u16).to_le_bytes()].concat());
                    }
                    if let Some(code) = reg8_code(name) {
                        return Ok(vec![0xB0 + code, value as u8]);
                    }
                }
            }
            return Err(conflict("mov"));
        }

        if let Some(base) = alu_base(mnemonic) {
            if request.mode == AddressingMode::Immediate {
                if let Some(name) = &reg {
                    if reg16_code(name).is_some() && is_word {
                        return Ok([&[0x81, 0xC0 | reg_field(base)][..], &(value as u16).to_le_bytes()].concat());
                    }
                    if reg8_code(name).is_some() {
                        return Ok(vec![0x80, 0xC0 | reg_field(base), value as u8]);
                    }
                }
            }
        }

        Err(conflict(mnemonic))
    }

    fn mnemonics(&self) -> &'static [&'static str] {
        MNEMONICS
    }

    fn is_register(&self, name: &str) -> bool {
        let lower = name.to_ascii_lowercase();
        REGISTERS_8.contains(&lower.as_str())
            || REGISTERS_16.contains(&lower.as_str())
            || SEGMENT_REGISTERS.contains(&lower.as_str())
    }
}

fn conflict(mnemonic: &str) -> AssemblyError {
    AssemblyError::ArchitectureConflict {
        mnemonic: mnemonic.to_string(),
        architecture: "v30mz".to_string(),
    }
}

fn alu_base(mnemonic: &str) -> Option<u8> {
    Some(match mnemonic {
        "add" => 0,
        "or" => 1,
        "adc" => 2,
        "sbb" => 3,
        "and" => 4,
        "sub" => 5,
        "xor" => 6,
        "cmp" => 7,
        _ => return None,
    })
}

fn reg_field(base: u8) -> u8 {
    base << 3
}

const MNEMONICS: &[&str] = &[
    "adc", "add", "and", "call", "clc", "cld", "cli", "cmp", "dec", "div", "hlt", "idiv", "imul",
    "in", "inc", "int", "iret", "jc", "jmp", "jnc", "jnz", "jz", "lea", "loop", "loopnz", "loopz",
    "mov", "mul", "neg", "nop", "not", "or", "out", "pop", "popf", "push", "pushf", "rcl", "rcr",
    "ret", "retf", "rol", "ror", "sar", "sbb", "shl", "shr", "stc", "std", "sti", "sub", "test",
    "xchg", "xor",
];

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mov_immediate_into_ax() {
        let backend = V30MzBackend::new();
        let mut flags = Flags::default();
        let req = EncodeRequest {
            mnemonic: "mov",
            size_suffix: None,
            mode: AddressingMode::Immediate,
            register: Some("ax"),
            operand_value: Some(0x1234),
            current_address: 0,
        };
        assert_eq!(backend.encode(&req, &mut flags).unwrap(), vec![0xB8, 0x34, 0x12]);
    }

    #[test]
    fn call_near_relative_is_three_bytes() {
        let backend = V30MzBackend::new();
        let mut flags = Flags::default();
        let req = EncodeRequest {
            mnemonic: "call",
            size_suffix: None,
            mode: AddressingMode::Extended,
            register: None,
            operand_value: Some(0x2000),
            current_address: 0,
        };
        assert_eq!(backend.encode(&req, &mut flags).unwrap(), vec![0xE8, 0x00, 0x20]);
    }
}
