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

//! SPC700 `.spc` builder: rather than a cartridge image, this target
//! produces the save-state container SNES sound-driver tooling loads —
//! a fixed header carrying the CPU's reset register values followed by the
//! full 64 KiB ARAM image. The program counter is pointed at the lowest
//! address the source actually emitted to, since that's the code's entry
//! point in the absence of an explicit reset vector on this target.

use crate::assembler::ByteRun;

const SIGNATURE: &[u8; 33] = b"SNES-SPC700 Sound File Data v0.30";
const HEADER_LEN: usize = 0x100;
const RAM_LEN: usize = 0x10000;
const DSP_REGISTER_COUNT: usize = 128;
const EXTRA_RAM_LEN: usize = 0x40;
const RESET_STACK_POINTER: u8 = 0xEF;

pub fn build(runs: &[ByteRun]) -> Vec<u8> {
    let mut file = vec![0u8; HEADER_LEN + RAM_LEN + DSP_REGISTER_COUNT + EXTRA_RAM_LEN];

    file[0..33].copy_from_slice(SIGNATURE);
    file[33] = 0x1A;
    file[34] = 0x1A;
    file[0x23] = 0; // no ID666 tag block
    file[0x24] = 30; // format sub-version

    let entry = runs.iter().map(|r| r.address).min().unwrap_or(0) as u16;
    file[0x25..0x27].copy_from_slice(&entry.to_le_bytes());
    file[0x27] = 0x00; // A
    file[0x28] = 0x00; // X
    file[0x29] = 0x00; // Y
    file[0x2A] = 0x02; // PSW: interrupts disabled at reset
    file[0x2B] = RESET_STACK_POINTER;

    let ram = &mut file[HEADER_LEN..HEADER_LEN + RAM_LEN];
    for run in runs {
        if run.address < 0 || run.address as usize >= RAM_LEN {
            continue;
        }
        let addr = run.address as usize;
        let end = (addr + run.bytes.len()).min(RAM_LEN);
        let copy_len = end - addr;
        ram[addr..end].copy_from_slice(&run.bytes[..copy_len]);
    }

    file
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn carries_the_spc_signature() {
        let file = build(&[]);
        assert_eq!(&file[0..33], SIGNATURE);
    }

    #[test]
    fn pc_register_points_at_the_lowest_emitted_address() {
        let runs = vec![ByteRun {
            address: 0x0200,
            bytes: vec![0xEA],
        }];
        let file = build(&runs);
        assert_eq!(u16::from_le_bytes([file[0x25], file[0x26]]), 0x0200);
    }

    #[test]
    fn program_bytes_land_in_the_aram_image() {
        let runs = vec![ByteRun {
            address: 0x0200,
            bytes: vec![0xDE, 0xAD],
        }];
        let file = build(&runs);
        assert_eq!(&file[HEADER_LEN + 0x0200..HEADER_LEN + 0x0202], &[0xDE, 0xAD]);
    }
}
