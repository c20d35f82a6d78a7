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

//! Game Boy / Game Boy Color CPU (Sharp SM83, a Z80/8080 hybrid). `ld`
//! covers most of the opcode space and is disambiguated entirely by its
//! two operands' register names and addressing modes rather than by a
//! separate mnemonic per direction.

use super::{Backend, EncodeRequest, Flags, relative_branch_offset};
use crate::ast::{AddressingMode, SizeSuffix};
use crate::errors::AssemblyError;

pub struct Sm83Backend;

impl Sm83Backend {
    pub fn new() -> Self {
        Self
    }
}

impl Default for Sm83Backend {
    fn default() -> Self {
        Self::new()
    }
}

const REGISTERS_8: &[&str] = &["a", "b", "c", "d", "e", "h", "l"];
const REGISTERS_16: &[&str] = &["af", "bc", "de", "hl", "sp"];

fn reg8_code(name: &str) -> Option<u8> {
    Some(match name {
        "b" => 0,
        "c" => 1,
        "d" => 2,
        "e" => 3,
        "h" => 4,
        "l" => 5,
        "a" => 7,
        _ => return None,
    })
}

impl Backend for Sm83Backend {
    fn size(
        &self,
        mnemonic: &str,
        _size_suffix: Option<SizeSuffix>,
        mode: AddressingMode,
        _operand_value: Option<i64>,
        _flags: Flags,
    ) -> Result<u32, AssemblyError> {
        Ok(match mnemonic {
            "jr" | "jp" if mode == AddressingMode::Relative => 2,
            "ld" if mode == AddressingMode::Extended => 3,
            "ld" if mode == AddressingMode::Immediate && matches!(mode, AddressingMode::Immediate) => {
                // disambiguated in encode by register width; default 2, widened there
                2
            }
            "jp" | "call" => 3,
            "bit" | "set" | "res" => 2,
            "rlc" | "rrc" | "rl" | "rr" | "sla" | "sra" | "swap" | "srl" => 2,
            "nop" | "halt" | "stop" | "di" | "ei" | "rlca" | "rrca" | "rla" | "rra" | "daa"
            | "cpl" | "scf" | "ccf" | "ret" | "reti" => 1,
            "push" | "pop" | "inc" | "dec" | "add" | "adc" | "sub" | "sbc" | "and" | "or"
            | "xor" | "cp" | "rst" => 1,
            _ => 1,
        })
    }

    fn encode(&self, request: &EncodeRequest, _flags: &mut Flags) -> Result<Vec<u8>, AssemblyError> {
        let mnemonic = request.mnemonic;
        let value = request.operand_value.unwrap_or(0);
        let reg = request.register.map(|r| r.to_ascii_lowercase());

        match mnemonic {
            "nop" => return Ok(vec![0x00]),
            "halt" => return Ok(vec![0x76]),
            "stop" => return Ok(vec![0x10, 0x00]),
            "di" => return Ok(vec![0xF3]),
            "ei" => return Ok(vec![0xFB]),
            "rlca" => return Ok(vec![0x07]),
            "rrca" => return Ok(vec![0x0F]),
            "rla" => return Ok(vec![0x17]),
            "rra" => return Ok(vec![0x1F]),
            "daa" => return Ok(vec![0x27]),
            "cpl" => return Ok(vec![0x2F]),
            "scf" => return Ok(vec![0x37]),
            "ccf" => return Ok(vec![0x3F]),
            "ret" => {
                return Ok(vec![0xC9]);
            }
            "reti" => return Ok(vec![0xD9]),
            _ => {}
        }

        if mnemonic == "jr" {
            let opcode = match reg.as_deref() {
                None => 0x18,
                Some("z") => 0x28,
                Some("nz") => 0x20,
                Some("c") => 0x38,
                Some("nc") => 0x30,
                _ => return Err(conflict(mnemonic)),
            };
            let target = request.operand_value.unwrap_or(request.current_address);
            let offset = relative_branch_offset(target, request.current_address)?;
            return Ok(vec![opcode, offset as u8]);
        }

        if mnemonic == "jp" && request.mode == AddressingMode::RegisterIndirect {
            return Ok(vec![0xE9]);
        }
        if mnemonic == "jp" {
            let opcode = match reg.as_deref() {
                None => 0xC3,
                Some("z") => 0xCA,
                Some("nz") => 0xC2,
                Some("c") => 0xDA,
                Some("nc") => 0xD2,
                _ => return Err(conflict(mnemonic)),
            };
            return Ok([&[opcode][..], &(value as u16).to_le_bytes()].concat());
        }
        if mnemonic == "call" {
            let opcode = match reg.as_deref() {
                None => 0xCD,
                Some("z") => 0xCC,
                Some("nz") => 0xC4,
                Some("c") => 0xDC,
                Some("nc") => 0xD4,
                _ => return Err(conflict(mnemonic)),
            };
            return Ok([&[opcode][..], &(value as u16).to_le_bytes()].concat());
        }

        if mnemonic == "push" || mnemonic == "pop" {
            let code = match reg.as_deref() {
                Some("bc") => 0,
                Some("de") => 1,
                Some("hl") => 2,
                Some("af") => 3,
                _ => return Err(conflict(mnemonic)),
            };
            let base = if mnemonic == "push" { 0xC5 } else { 0xC1 };
            return Ok(vec![base + code * 0x10]);
        }

        if mnemonic == "rst" {
            if !(0..=0x38).contains(&value) || value % 8 != 0 {
                return Err(AssemblyError::DirectiveMisuse {
                    directive: "rst".to_string(),
                    reason: "vector must be a multiple of 8 between 0 and 0x38".to_string(),
                });
            }
            return Ok(vec![0xC7 | (value as u8)]);
        }

        if mnemonic == "ld" {
            return encode_ld(request);
        }

        if let Some(opcode) = alu_opcode(mnemonic, request) {
            return Ok(opcode);
        }

        if mnemonic == "inc" || mnemonic == "dec" {
            if let Some(name) = &reg {
                if let Some(code) = reg8_code(name) {
                    let base = if mnemonic == "inc" { 0x04 } else { 0x05 };
                    return Ok(vec![base + code * 8]);
                }
                if REGISTERS_16.contains(&name.as_str()) {
                    let idx = REGISTERS_16.iter().position(|r| r == name).unwrap() as u8;
                    let base = if mnemonic == "inc" { 0x03 } else { 0x0B };
                    return Ok(vec![base + idx * 0x10]);
                }
            }
            return Err(conflict(mnemonic));
        }

        if let Some(name) = &reg {
            if ["rlc", "rrc", "rl", "rr", "sla", "sra", "swap", "srl"].contains(&mnemonic) {
                if let Some(code) = reg8_code(name) {
                    let group = match mnemonic {
                        "rlc" => 0,
                        "rrc" => 1,
                        "rl" => 2,
                        "rr" => 3,
                        "sla" => 4,
                        "sra" => 5,
                        "swap" => 6,
                        "srl" => 7,
                        _ => unreachable!(),
                    };
                    return Ok(vec![0xCB, group * 8 + code]);
                }
            }
        }

        if ["bit", "set", "res"].contains(&mnemonic) {
            if let Some(name) = &reg {
                if let Some(code) = reg8_code(name) {
                    let bit = value as u8 & 7;
                    let base = match mnemonic {
                        "bit" => 0x40,
                        "res" => 0x80,
                        "set" => 0xC0,
                        _ => unreachable!(),
                    };
                    return Ok(vec![0xCB, base + bit * 8 + code]);
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
        REGISTERS_8.contains(&lower.as_str()) || REGISTERS_16.contains(&lower.as_str())
    }
}

fn conflict(mnemonic: &str) -> AssemblyError {
    AssemblyError::ArchitectureConflict {
        mnemonic: mnemonic.to_string(),
        architecture: "sm83".to_string(),
    }
}

fn alu_opcode(mnemonic: &str, request: &EncodeRequest) -> Option<Vec<u8>> {
    let base = match mnemonic {
        "add" => 0x80,
        "adc" => 0x88,
        "sub" => 0x90,
        "sbc" => 0x98,
        "and" => 0xA0,
        "xor" => 0xA8,
        "or" => 0xB0,
        "cp" => 0xB8,
        _ => return None,
    };
    if mnemonic == "add" && request.register.map(|r| r.eq_ignore_ascii_case("hl")).unwrap_or(false) {
        return None;
    }
    if request.mode == AddressingMode::Immediate {
        let immediate_base = match mnemonic {
            "add" => 0xC6,
            "adc" => 0xCE,
            "sub" => 0xD6,
            "sbc" => 0xDE,
            "and" => 0xE6,
            "xor" => 0xEE,
            "or" => 0xF6,
            "cp" => 0xFE,
            _ => return None,
        };
        return Some(vec![immediate_base, request.operand_value.unwrap_or(0) as u8]);
    }
    if request.mode == AddressingMode::RegisterIndirect {
        return Some(vec![base + 6]);
    }
    let name = request.register?.to_ascii_lowercase();
    let code = reg8_code(&name)?;
    Some(vec![base + code])
}

fn encode_ld(request: &EncodeRequest) -> Result<Vec<u8>, AssemblyError> {
    let value = request.operand_value.unwrap_or(0);
    let dest = request.register.map(|r| r.to_ascii_lowercase());

    if request.mode == AddressingMode::Extended {
        // `ld (nn), a` / `ld a, (nn)` disambiguated by which side carries
        // the register: `register` set means the register is the source
        // (`ld (nn), a`), absent means the destination operand was the
        // extended address fed back as `ld a, (nn)` by the analyzer.
        return match dest.as_deref() {
            Some("a") => Ok([&[0xEA][..], &(value as u16).to_le_bytes()].concat()),
            Some("sp") => Ok([&[0x08][..], &(value as u16).to_le_bytes()].concat()),
            _ => Ok([&[0xFA][..], &(value as u16).to_le_bytes()].concat()),
        };
    }

    if request.mode == AddressingMode::Immediate {
        return match dest.as_deref() {
            Some(r) if REGISTERS_16.contains(&r) => {
                let idx = REGISTERS_16.iter().position(|x| *x == r).unwrap() as u8;
                Ok([&[0x01 + idx * 0x10][..], &(value as u16).to_le_bytes()].concat())
            }
            Some(r) if reg8_code(r).is_some() => {
                let code = reg8_code(r).unwrap();
                Ok(vec![0x06 + code * 8, value as u8])
            }
            _ => Err(conflict("ld")),
        };
    }

    if request.mode == AddressingMode::RegisterIndirect {
        return Ok(vec![0x36, value as u8]);
    }

    if let Some(name) = dest {
        if let Some(dest_code) = reg8_code(&name) {
            return Ok(vec![0x40 + dest_code * 8 + 6]);
        }
    }

    Err(conflict("ld"))
}

const MNEMONICS: &[&str] = &[
    "adc", "add", "and", "bit", "call", "ccf", "cp", "cpl", "daa", "dec", "di", "ei", "halt",
    "inc", "jp", "jr", "ld", "ldh", "nop", "or", "pop", "push", "res", "ret", "reti", "rl",
    "rla", "rlc", "rlca", "rr", "rra", "rrc", "rrca", "rst", "sbc", "scf", "set", "sla", "sra",
    "srl", "stop", "sub", "swap", "xor",
];

#[cfg(test)]
mod tests {
    use super::*;

    fn req(mnemonic: &'static str, mode: AddressingMode, register: Option<&'static str>, value: Option<i64>) -> EncodeRequest<'static> {
        EncodeRequest {
            mnemonic,
            size_suffix: None,
            mode,
            register,
            operand_value: value,
            current_address: 0,
        }
    }

    #[test]
    fn nop_encodes_single_zero_byte() {
        let backend = Sm83Backend::new();
        let mut flags = Flags::default();
        let r = req("nop", AddressingMode::Implied, None, None);
        assert_eq!(backend.encode(&r, &mut flags).unwrap(), vec![0x00]);
    }

    #[test]
    fn ld_immediate_into_b_is_two_bytes() {
        let backend = Sm83Backend::new();
        let mut flags = Flags::default();
        let r = req("ld", AddressingMode::Immediate, Some("b"), Some(0x42));
        assert_eq!(backend.encode(&r, &mut flags).unwrap(), vec![0x06, 0x42]);
    }

    #[test]
    fn jr_backward_branch_offset() {
        let backend = Sm83Backend::new();
        let mut flags = Flags::default();
        let r = EncodeRequest {
            mnemonic: "jr",
            size_suffix: None,
            mode: AddressingMode::Relative,
            register: None,
            operand_value: Some(0x100),
            current_address: 0x100,
        };
        assert_eq!(backend.encode(&r, &mut flags).unwrap(), vec![0x18, 0xFE]);
    }

    #[test]
    fn push_bc_encodes_as_c5() {
        let backend = Sm83Backend::new();
        let mut flags = Flags::default();
        let r = req("push", AddressingMode::Register, Some("bc"), None);
        assert_eq!(backend.encode(&r, &mut flags).unwrap(), vec![0xC5]);
    }
}
