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

//! ARM7TDMI encoding (32-bit ARM state only; this crate does not model the
//! Thumb instruction stream). Covers the data-processing subset with an
//! 8-bit unrotated immediate or a plain register operand, branches, `bx`,
//! and word-sized `ldr`/`str` with a register base and immediate
//! displacement — the GBA homebrew subset that doesn't need the scaled/
//! shifted-register addressing forms full EA coverage would require. Every
//! instruction is word-aligned and 4 bytes; every encoding uses the
//! "always execute" `AL` condition field, since this crate's generic AST
//! has no conditional-suffix concept to carry anything else.
//!
//! Note: like the m68000 backend, reducing a two-register instruction down
//! through `flatten_operands` keeps only one register name. This backend
//! uses that single register as both `Rd` and `Rn`, so `add r0, #5` encodes
//! as the in-place `r0 := r0 + 5` — a two-register form like `add r0, r1`
//! loses `r0` the same way the m68000 backend's two-register forms do.

use super::{Backend, EncodeRequest, Flags};
use crate::ast::{AddressingMode, SizeSuffix};
use crate::errors::AssemblyError;

pub struct Arm7TdmiBackend;

impl Arm7TdmiBackend {
    pub fn new() -> Self {
        Self
    }
}

impl Default for Arm7TdmiBackend {
    fn default() -> Self {
        Self::new()
    }
}

const AL: u32 = 0xE << 28;

fn register_number(name: &str) -> Option<u32> {
    let lower = name.to_ascii_lowercase();
    match lower.as_str() {
        "sp" => return Some(13),
        "lr" => return Some(14),
        "pc" => return Some(15),
        _ => {}
    }
    lower.strip_prefix('r').and_then(|n| n.parse().ok()).filter(|n| *n <= 15)
}

/// Opcode field (bits 24-21) for the data-processing instructions this
/// backend supports.
fn data_processing_opcode(mnemonic: &str) -> Option<u32> {
    match mnemonic {
        "and" => Some(0b0000),
        "eor" => Some(0b0001),
        "sub" => Some(0b0010),
        "add" => Some(0b0100),
        "cmp" => Some(0b1010),
        "orr" => Some(0b1100),
        "mov" => Some(0b1101),
        "bic" => Some(0b1110),
        "mvn" => Some(0b1111),
        _ => None,
    }
}

/// `cmp` always sets flags (its `S` bit is hardwired); the others this
/// backend models don't, since there's no AST concept of an `s` suffix to
/// turn it on for them.
fn sets_flags(mnemonic: &str) -> bool {
    mnemonic == "cmp"
}

impl Backend for Arm7TdmiBackend {
    fn size(
        &self,
        _mnemonic: &str,
        _size_suffix: Option<SizeSuffix>,
        _mode: AddressingMode,
        _operand_value: Option<i64>,
        _flags: Flags,
    ) -> Result<u32, AssemblyError> {
        Ok(4)
    }

    fn encode(&self, request: &EncodeRequest, _flags: &mut Flags) -> Result<Vec<u8>, AssemblyError> {
        let mnemonic = request.mnemonic;
        let value = request.operand_value.unwrap_or(0);

        match mnemonic {
            "nop" => return Ok((AL | 0x0320F000).to_be_bytes().to_vec()),
            "bx" => {
                let rm = request.register.as_deref().and_then(register_number).unwrap_or(14);
                return Ok((AL | 0x012F_FF10 | rm).to_be_bytes().to_vec());
            }
            "b" | "bl" => {
                let target = request.operand_value.unwrap_or(request.current_address);
                let displacement = target - (request.current_address + 8);
                if displacement % 4 != 0 {
                    return Err(AssemblyError::DirectiveMisuse {
                        directive: mnemonic.to_string(),
                        reason: "branch target must be word-aligned".to_string(),
                    });
                }
                let word_offset = displacement / 4;
                if !(-(1 << 23)..(1 << 23)).contains(&word_offset) {
                    return Err(AssemblyError::BranchOutOfRange { offset: word_offset, bits: 24 });
                }
                let link_bit = if mnemonic == "bl" { 1 << 24 } else { 0 };
                let opcode = AL | 0x0A00_0000 | link_bit | (word_offset as u32 & 0x00FF_FFFF);
                return Ok(opcode.to_be_bytes().to_vec());
            }
            "ldr" | "str" => {
                let rd = request.register.as_deref().and_then(register_number).unwrap_or(0);
                let rn = 13; // base register: sp-relative addressing, this backend's only supported base
                let load_bit = if mnemonic == "ldr" { 1 << 20 } else { 0 };
                let (up_bit, offset) = if value < 0 { (0, (-value) as u32) } else { (1 << 23, value as u32) };
                if offset > 0xFFF {
                    return Err(AssemblyError::DirectiveMisuse {
                        directive: mnemonic.to_string(),
                        reason: "immediate offset must fit in 12 bits".to_string(),
                    });
                }
                let opcode = AL | 0x0500_0000 | up_bit | load_bit | (rn << 16) | (rd << 12) | offset;
                return Ok(opcode.to_be_bytes().to_vec());
            }
            _ => {}
        }

        if let Some(dp_opcode) = data_processing_opcode(mnemonic) {
            let rd = request.register.as_deref().and_then(register_number).unwrap_or(0);
            let s_bit = if sets_flags(mnemonic) { 1 << 20 } else { 0 };
            // The `I` bit (25) is set exactly when operand2 is an 8-bit
            // immediate rather than a register.
            let operand2 = if request.mode == AddressingMode::Immediate {
                (1 << 25) | (value as u32 & 0xFF)
            } else {
                rd
            };
            let opcode = AL | (dp_opcode << 21) | s_bit | (rd << 16) | (rd << 12) | operand2;
            return Ok(opcode.to_be_bytes().to_vec());
        }

        Err(conflict(mnemonic))
    }

    fn mnemonics(&self) -> &'static [&'static str] {
        MNEMONICS
    }

    fn is_register(&self, name: &str) -> bool {
        register_number(name).is_some()
    }
}

fn conflict(mnemonic: &str) -> AssemblyError {
    AssemblyError::ArchitectureConflict {
        mnemonic: mnemonic.to_string(),
        architecture: "arm7tdmi".to_string(),
    }
}

const MNEMONICS: &[&str] = &[
    "and", "eor", "sub", "add", "cmp", "orr", "mov", "bic", "mvn", "b", "bl", "bx", "ldr", "str",
    "nop",
];

#[cfg(test)]
mod tests {
    use super::*;

    fn request<'a>(mnemonic: &'a str, mode: AddressingMode, register: Option<&'a str>, operand_value: Option<i64>, current_address: i64) -> EncodeRequest<'a> {
        EncodeRequest {
            mnemonic,
            size_suffix: None,
            mode,
            register,
            operand_value,
            current_address,
        }
    }

    #[test]
    fn every_instruction_is_four_bytes() {
        let backend = Arm7TdmiBackend::new();
        let size = backend
            .size("mov", None, AddressingMode::Immediate, Some(5), Flags::default())
            .unwrap();
        assert_eq!(size, 4);
    }

    #[test]
    fn nop_is_the_documented_arm_encoding() {
        let backend = Arm7TdmiBackend::new();
        let mut flags = Flags::default();
        let req = request("nop", AddressingMode::Implied, None, None, 0);
        assert_eq!(backend.encode(&req, &mut flags).unwrap(), vec![0xE3, 0x20, 0xF0, 0x00]);
    }

    #[test]
    fn mov_immediate_sets_the_i_bit_and_rd() {
        let backend = Arm7TdmiBackend::new();
        let mut flags = Flags::default();
        let req = request("mov", AddressingMode::Immediate, Some("r0"), Some(5), 0);
        let bytes = backend.encode(&req, &mut flags).unwrap();
        let word = u32::from_be_bytes(bytes.try_into().unwrap());
        assert_eq!(word & 0xFF, 5);
        assert_eq!((word >> 25) & 1, 1);
        assert_eq!((word >> 12) & 0xF, 0);
    }

    #[test]
    fn branch_out_of_range_is_reported() {
        let backend = Arm7TdmiBackend::new();
        let mut flags = Flags::default();
        let req = request("b", AddressingMode::Direct, None, Some(1 << 26), 0);
        assert!(backend.encode(&req, &mut flags).is_err());
    }

    #[test]
    fn is_register_recognizes_numbered_and_aliased_names() {
        let backend = Arm7TdmiBackend::new();
        assert!(backend.is_register("r7"));
        assert!(backend.is_register("lr"));
        assert!(!backend.is_register("label"));
    }
}
