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

//! SNES builder: places the 64-byte internal header at `$7fc0`
//! (LoROM) or `$ffc0` (HiROM/ExHiROM), padding the image out to reach it,
//! and computes the checksum/checksum-complement pair. The memory map comes
//! from the in-source `.lorom`/`.hirom`/`.exhirom` directive unless the
//! project config overrides it.

use crate::assembler::ByteRun;
use crate::config::SnesHeaderConfig;
use crate::rom::layout;

const LOROM_HEADER_OFFSET: usize = 0x7FC0;
const HIROM_HEADER_OFFSET: usize = 0xFFC0;
const HEADER_LEN: usize = 0x40;
const TITLE_LEN: usize = 21;

pub fn build(runs: &[ByteRun], directive_map: Option<&str>, config: &SnesHeaderConfig) -> Vec<u8> {
    let map_mode = config
        .memory_map
        .as_deref()
        .or(directive_map)
        .unwrap_or("lorom");
    let header_offset = match map_mode {
        "hirom" | "exhirom" => HIROM_HEADER_OFFSET,
        _ => LOROM_HEADER_OFFSET,
    };

    let mut rom = layout(runs, 0, 0x00);
    let min_len = header_offset + HEADER_LEN;
    if rom.len() < min_len {
        rom.resize(min_len, 0x00);
    }

    let title = config.title.as_deref().unwrap_or("UNTITLED").as_bytes();
    let title_slice = &mut rom[header_offset..header_offset + TITLE_LEN];
    title_slice.fill(b' ');
    let copy_len = title.len().min(TITLE_LEN);
    title_slice[..copy_len].copy_from_slice(&title[..copy_len]);

    let mode_bits: u8 = match map_mode {
        "hirom" => 0x21,
        "exhirom" => 0x25,
        _ => 0x20,
    };
    rom[header_offset + 0x15] = mode_bits | if config.fast_rom { 0x10 } else { 0x00 };
    rom[header_offset + 0x16] = 0x00; // cartridge type: ROM only
    rom[header_offset + 0x17] = rom_size_code(rom.len());
    rom[header_offset + 0x18] = 0x00; // no cartridge RAM
    rom[header_offset + 0x19] = 0x01; // destination code: North America
    rom[header_offset + 0x1A] = 0x33; // fixed licensee byte
    rom[header_offset + 0x1B] = 0x00; // mask ROM version

    // Checksum fields start zeroed, so computing over the whole image
    // includes them as zero exactly as the cartridge's own checksum logic
    // expects.
    let checksum = rom.iter().fold(0u16, |acc, &b| acc.wrapping_add(b as u16));
    let complement = !checksum;
    rom[header_offset + 0x1C] = (complement & 0xFF) as u8;
    rom[header_offset + 0x1D] = (complement >> 8) as u8;
    rom[header_offset + 0x1E] = (checksum & 0xFF) as u8;
    rom[header_offset + 0x1F] = (checksum >> 8) as u8;

    rom
}

fn rom_size_code(len: usize) -> u8 {
    let kbytes = (len / 1024).max(1);
    (kbytes as f64).log2().ceil() as u8
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lorom_header_lands_at_7fc0() {
        let rom = build(&[], Some("lorom"), &SnesHeaderConfig::default());
        assert_eq!(rom.len(), LOROM_HEADER_OFFSET + HEADER_LEN);
        assert_eq!(rom[LOROM_HEADER_OFFSET + 0x15] & 0x0F, 0x00);
    }

    #[test]
    fn hirom_header_lands_at_ffc0() {
        let rom = build(&[], Some("hirom"), &SnesHeaderConfig::default());
        assert_eq!(rom.len(), HIROM_HEADER_OFFSET + HEADER_LEN);
        assert_eq!(rom[HIROM_HEADER_OFFSET + 0x15] & 0x0F, 0x01);
    }

    #[test]
    fn project_config_overrides_the_in_source_directive() {
        let config = SnesHeaderConfig {
            memory_map: Some("hirom".to_string()),
            ..Default::default()
        };
        let rom = build(&[], Some("lorom"), &config);
        assert_eq!(rom.len(), HIROM_HEADER_OFFSET + HEADER_LEN);
    }

    #[test]
    fn checksum_and_complement_are_bitwise_inverses() {
        let rom = build(&[], Some("lorom"), &SnesHeaderConfig::default());
        let checksum = u16::from_le_bytes([
            rom[LOROM_HEADER_OFFSET + 0x1E],
            rom[LOROM_HEADER_OFFSET + 0x1F],
        ]);
        let complement = u16::from_le_bytes([
            rom[LOROM_HEADER_OFFSET + 0x1C],
            rom[LOROM_HEADER_OFFSET + 0x1D],
        ]);
        assert_eq!(checksum ^ complement, 0xFFFF);
    }
}
