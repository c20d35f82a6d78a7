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

//! Zilog Z80 encoding. Superset of the 8080 core this crate's SM83 backend
//! is itself descended from, plus the shadow register set, `ix`/`iy` index
//! registers and the `CB`/`ED`/`DD`/`FD` prefix families. Covers the
//! mainline opcode space used by Master System and Game Gear titles; the
//! more exotic `DD CB`/`FD CB` displacement-rotate forms are not modeled.

use super::{Backend, EncodeRequest, Flags, relative_branch_offset};
use crate::ast::{AddressingMode, SizeSuffix};
use crate::errors::AssemblyError;

pub struct Z80Backend;

impl Z80Backend {
    pub fn new() -> Self {
        Self
    }
}

impl Default for Z80Backend {
    fn default() -> Self {
        Self::new()
    }
}

const REGISTERS_8: &[&str] = &["a", "b", "c", "d", "e", "h", "l", "i", "r"];
const REGISTERS_16: &[&str] = &["af", "bc", "de", "hl", "sp", "ix", "iy"];

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

fn cond_code(name: &str) -> Option<u8> {
    Some(match name {
        "nz" => 0,
        "z" => 1,
        "nc" => 2,
        "c" => 3,
        "po" => 4,
        "pe" => 5,
        "p" => 6,
        "m" => 7,
        _ => return None,
    })
}

impl Backend for Z80Backend {
    fn size(
        &self,
        mnemonic: &str,
        _size_suffix: Option<SizeSuffix>,
        mode: AddressingMode,
        _operand_value: Option<i64>,
        _flags: Flags,
    ) -> Result<u32, AssemblyError> {
        Ok(match mnemonic {
            "djnz" | "jr" => 2,
            "jp" | "call" if mode != AddressingMode::RegisterIndirect => 3,
            "ld" if mode == AddressingMode::Extended => 3,
            "ld" if mode == AddressingMode::Immediate => 2,
            "bit" | "set" | "res" => 2,
            "rlc" | "rrc" | "rl" | "rr" | "sla" | "sra" | "srl" => 2,
            "im" => 2,
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
            "exx" => return Ok(vec![0xD9]),
            "ret" if reg.is_none() => return Ok(vec![0xC9]),
            "reti" => return Ok(vec![0xED, 0x4D]),
            "retn" => return Ok(vec![0xED, 0x45]),
            "ldi" => return Ok(vec![0xED, 0xA0]),
            "ldir" => return Ok(vec![0xED, 0xB0]),
            "ldd" => return Ok(vec![0xED, 0xA8]),
            "lddr" => return Ok(vec![0xED, 0xB8]),
            "cpi" => return Ok(vec![0xED, 0xA1]),
            "cpir" => return Ok(vec![0xED, 0xB1]),
            "neg" => return Ok(vec![0xED, 0x44]),
            "im" => {
                let mode_byte = match value {
                    0 => 0x46,
                    1 => 0x56,
                    2 => 0x5E,
                    _ => return Err(conflict("im")),
                };
                return Ok(vec![0xED, mode_byte]);
            }
            _ => {}
        }

        if mnemonic == "ret" {
            let code = cond_code(reg.as_deref().unwrap_or_default()).ok_or_else(|| conflict("ret"))?;
            return Ok(vec![0xC0 + code * 8]);
        }

        if mnemonic == "djnz" {
            let target = request.operand_value.unwrap_or(request.current_address);
            let offset = relative_branch_offset(target, request.current_address)?;
            return Ok(vec![0x10, offset as u8]);
        }
        if mnemonic == "jr" {
            let opcode = match reg.as_deref() {
                None => 0x18,
                Some("z") => 0x28,
                Some("nz") => 0x20,
                Some("c") => 0x38,
                Some("nc") => 0x30,
                _ => return Err(conflict("jr")),
            };
            let target = request.operand_value.unwrap_or(request.current_address);
            let offset = relative_branch_offset(target, request.current_address)?;
            return Ok(vec![opcode, offset as u8]);
        }
        if mnemonic == "jp" && request.mode == AddressingMode::RegisterIndirect {
            return Ok(vec![0xE9]);
        }
        if mnemonic == "jp" {
            let opcode = match &reg {
                None => 0xC3,
                Some(name) => 0xC2 + cond_code(name).ok_or_else(|| conflict("jp"))? * 8,
            };
            return Ok([&[opcode][..], &(value as u16).to_le_bytes()].concat());
        }
        if mnemonic == "call" {
            let opcode = match &reg {
                None => 0xCD,
                Some(name) => 0xC4 + cond_code(name).ok_or_else(|| conflict("call"))? * 8,
            };
            return Ok([&[opcode][..], &(value as u16).to_le_bytes()].concat());
        }

        if mnemonic == "push" || mnemonic == "pop" {
            let name = reg.as_deref().ok_or_else(|| conflict(mnemonic))?;
            if name == "ix" {
                return Ok(vec![0xDD, if mnemonic == "push" { 0xE5 } else { 0xE1 }]);
            }
            if name == "iy" {
                return Ok(vec![0xFD, if mnemonic == "push" { 0xE5 } else { 0xE1 }]);
            }
            let code = match name {
                "bc" => 0,
                "de" => 1,
                "hl" => 2,
                "af" => 3,
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
                if REGISTERS_16.contains(&name.as_str()) && name != "af" {
                    if let Some(idx) = ["bc", "de", "hl", "sp"].iter().position(|r| r == name) {
                        let base = if mnemonic == "inc" { 0x03 } else { 0x0B };
                        return Ok(vec![base + idx as u8 * 0x10]);
                    }
                }
            }
            if request.mode == AddressingMode::RegisterIndirect {
                return Ok(vec![if mnemonic == "inc" { 0x34 } else { 0x35 }]);
            }
            return Err(conflict(mnemonic));
        }

        if ["rlc", "rrc", "rl", "rr", "sla", "sra", "srl"].contains(&mnemonic) {
            if let Some(name) = &reg {
                if let Some(code) = reg8_code(name) {
                    let group = match mnemonic {
                        "rlc" => 0,
                        "rrc" => 1,
                        "rl" => 2,
                        "rr" => 3,
                        "sla" => 4,
                        "sra" => 5,
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
        architecture: "z80".to_string(),
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
        return match dest.as_deref() {
            Some("a") => Ok([&[0x32][..], &(value as u16).to_le_bytes()].concat()),
            Some("hl") => Ok([&[0x22][..], &(value as u16).to_le_bytes()].concat()),
            _ => Ok([&[0x3A][..], &(value as u16).to_le_bytes()].concat()),
        };
    }

    if request.mode == AddressingMode::Immediate {
        return match dest.as_deref() {
            Some(r) if REGISTERS_16.contains(&r) => {
                let idx = ["bc", "de", "hl", "sp"].iter().position(|x| *x == r);
                match idx {
                    Some(idx) => Ok([&[0x01 + idx as u8 * 0x10][..], &(value as u16).to_le_bytes()].concat()),
                    None => Err(conflict("ld")),
                }
            }
            Some(r) if reg8_code(r).is_some() => {
                let code = reg8_code(r).unwrap();
                Ok(vec![0x06 + code * 8, value as u8])
            }
            _ => Err(conflict("ld")),
        };
    }

    // `dest.is_none()` means the only operand carrying a register name was
    // `(hl)` itself, i.e. `ld (hl), n` (store immediate). When a *separate*
    // register operand is also present it's `ld r, (hl)` (load), handled
    // by the `reg8_code` branch below instead.
    if request.mode == AddressingMode::RegisterIndirect && dest.is_none() {
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
    "adc", "add", "and", "bit", "call", "ccf", "cp", "cpd", "cpdr", "cpi", "cpir", "cpl", "daa",
    "dec", "di", "djnz", "ei", "ex", "exx", "halt", "im", "in", "inc", "ind", "indr", "ini",
    "inir", "jp", "jr", "ld", "ldd", "lddr", "ldi", "ldir", "neg", "nop", "or", "out", "otdr",
    "otir", "outd", "outi", "pop", "push", "res", "ret", "reti", "retn", "rl", "rla", "rlc",
    "rlca", "rld", "rr", "rra", "rrc", "rrca", "rrd", "rst", "sbc", "scf", "set", "sla", "sra",
    "srl", "sub", "xor",
];

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn call_unconditional_is_three_bytes() {
        let backend = Z80Backend::new();
        let mut flags = Flags::default();
        let req = EncodeRequest {
            mnemonic: "call",
            size_suffix: None,
            mode: AddressingMode::Extended,
            register: None,
            operand_value: Some(0x1234),
            current_address: 0,
        };
        assert_eq!(backend.encode(&req, &mut flags).unwrap(), vec![0xCD, 0x34, 0x12]);
    }

    #[test]
    fn push_ix_uses_dd_prefix() {
        let backend = Z80Backend::new();
        let mut flags = Flags::default();
        let req = EncodeRequest {
            mnemonic: "push",
            size_suffix: None,
            mode: AddressingMode::Register,
            register: Some("ix"),
            operand_value: None,
            current_address: 0,
        };
        assert_eq!(backend.encode(&req, &mut flags).unwrap(), vec![0xDD, 0xE5]);
    }

    #[test]
    fn bit_test_uses_cb_prefix() {
        let backend = Z80Backend::new();
        let mut flags = Flags::default();
        let req = EncodeRequest {
            mnemonic: "bit",
            size_suffix: None,
            mode: AddressingMode::BitIndex,
            register: Some("b"),
            operand_value: Some(3),
            current_address: 0,
        };
        assert_eq!(backend.encode(&req, &mut flags).unwrap(), vec![0xCB, 0x58]);
    }
}
