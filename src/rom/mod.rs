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

//! Turns an [`AssembledProgram`]'s address-tagged byte runs into a bit-exact
//! platform image. Every builder here consumes the same input shape —
//! `&[ByteRun]` plus a [`RomConfig`] section — and differs only in header
//! layout and checksum algorithm.

mod gb;
mod ines;
mod lynx;
mod raw;
mod snes;
mod spc700;

use crate::assembler::{AssembledProgram, ByteRun};
use crate::config::RomConfig;

/// Lays `runs` out into one contiguous buffer starting at `base`, padding any
/// gap (from `.org` jumps or `.res`) with `pad`. Bytes at addresses below
/// `base` are dropped; builders that need every byte pick a `base` of 0 or
/// the lowest run address, as appropriate for their platform's addressing.
fn layout(runs: &[ByteRun], base: i64, pad: u8) -> Vec<u8> {
    let end = runs
        .iter()
        .map(|r| r.address + r.bytes.len() as i64)
        .max()
        .unwrap_or(base);
    let mut out = vec![pad; (end - base).max(0) as usize];
    for run in runs {
        if run.address < base {
            continue;
        }
        let offset = (run.address - base) as usize;
        if offset > out.len() {
            continue;
        }
        let end = (offset + run.bytes.len()).min(out.len());
        let copy_len = end - offset;
        out[offset..end].copy_from_slice(&run.bytes[..copy_len]);
    }
    out
}

/// Lays runs out starting at the lowest emitted address rather than a fixed
/// platform base — the shape every "no header, just the bytes" builder wants.
fn layout_from_lowest(runs: &[ByteRun], pad: u8) -> Vec<u8> {
    let base = runs.iter().map(|r| r.address).min().unwrap_or(0);
    layout(runs, base, pad)
}

/// Builds the final ROM image for `program`, dispatching on its platform.
/// Platforms without a dedicated header builder (Genesis, GBA, Master
/// System, TG16, Atari 2600, WonderSwan) fall through to a raw byte-run
/// passthrough — those platforms' headers are either absent or are authored
/// directly in source via `.db`, so the core has nothing to add.
pub fn build(program: &AssembledProgram, config: &RomConfig) -> Vec<u8> {
    match program.platform.as_deref() {
        Some("nes") => ines::build(&program.runs, &config.nes),
        Some("snes") => snes::build(&program.runs, program.memory_map.as_deref(), &config.snes),
        Some("gb") | Some("gbc") | Some("gameboy") => gb::build(&program.runs, &config.gb),
        Some("lynx") => lynx::build(&program.runs, &config.lynx),
        Some("spc700") => spc700::build(&program.runs),
        _ => raw::build(&program.runs),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn run(address: i64, bytes: &[u8]) -> ByteRun {
        ByteRun {
            address,
            bytes: bytes.to_vec(),
        }
    }

    #[test]
    fn layout_pads_gaps_between_runs() {
        let runs = vec![run(0, &[1, 2]), run(4, &[9])];
        let bytes = layout(&runs, 0, 0xAA);
        assert_eq!(bytes, vec![1, 2, 0xAA, 0xAA, 9]);
    }

    #[test]
    fn layout_from_lowest_ignores_absolute_base() {
        let runs = vec![run(0x8000, &[1, 2, 3])];
        let bytes = layout_from_lowest(&runs, 0);
        assert_eq!(bytes, vec![1, 2, 3]);
    }
}
