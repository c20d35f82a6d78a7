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

//! Game Boy / Game Boy Color builder: stamps the fixed cartridge
//! header into the ROM image at its documented offsets ($0104-$014F) —
//! the Nintendo logo the boot ROM compares byte-for-byte, title, CGB
//! compatibility flag, cartridge/ROM/RAM size codes, and both checksums.

use crate::assembler::ByteRun;
use crate::config::GameBoyHeaderConfig;
use crate::rom::layout;

const LOGO_OFFSET: usize = 0x0104;
const TITLE_OFFSET: usize = 0x0134;
const TITLE_LEN: usize = 15;
const CGB_FLAG_OFFSET: usize = 0x0143;
const CART_TYPE_OFFSET: usize = 0x0147;
const ROM_SIZE_OFFSET: usize = 0x0148;
const RAM_SIZE_OFFSET: usize = 0x0149;
const HEADER_CHECKSUM_OFFSET: usize = 0x014D;
const GLOBAL_CHECKSUM_OFFSET: usize = 0x014E;
const MIN_ROM_SIZE: usize = 0x8000;

const NINTENDO_LOGO: [u8; 48] = [
    0xCE, 0xED, 0x66, 0x66, 0xCC, 0x0D, 0x00, 0x0B, 0x03, 0x73, 0x00, 0x83, 0x00, 0x0C, 0x00, 0x0D,
    0x00, 0x08, 0x11, 0x1F, 0x88, 0x89, 0x00, 0x0E, 0xDC, 0xCC, 0x6E, 0xE6, 0xDD, 0xDD, 0xD9, 0x99,
    0xBB, 0xBB, 0x67, 0x63, 0x6E, 0x0E, 0xEC, 0xCC, 0xDD, 0xDC, 0x99, 0x9F, 0xBB, 0xB9, 0x33, 0x3E,
];

pub fn build(runs: &[ByteRun], config: &GameBoyHeaderConfig) -> Vec<u8> {
    let mut rom = layout(runs, 0, 0x00);
    let size = rom.len().max(MIN_ROM_SIZE).next_power_of_two();
    rom.resize(size, 0x00);

    rom[LOGO_OFFSET..LOGO_OFFSET + NINTENDO_LOGO.len()].copy_from_slice(&NINTENDO_LOGO);

    let title = config.title.as_deref().unwrap_or("").as_bytes();
    let copy_len = title.len().min(TITLE_LEN);
    rom[TITLE_OFFSET..TITLE_OFFSET + copy_len].copy_from_slice(&title[..copy_len]);

    rom[CGB_FLAG_OFFSET] = if config.color_compatible { 0xC0 } else { 0x00 };
    rom[CART_TYPE_OFFSET] = config.cartridge_type.unwrap_or(0);
    rom[ROM_SIZE_OFFSET] = rom_size_code(rom.len());
    rom[RAM_SIZE_OFFSET] = 0x00;

    let mut header_checksum: u8 = 0;
    for &b in &rom[TITLE_OFFSET..HEADER_CHECKSUM_OFFSET] {
        header_checksum = header_checksum.wrapping_sub(b).wrapping_sub(1);
    }
    rom[HEADER_CHECKSUM_OFFSET] = header_checksum;

    rom[GLOBAL_CHECKSUM_OFFSET] = 0;
    rom[GLOBAL_CHECKSUM_OFFSET + 1] = 0;
    let global_checksum = rom.iter().fold(0u16, |acc, &b| acc.wrapping_add(b as u16));
    rom[GLOBAL_CHECKSUM_OFFSET] = (global_checksum >> 8) as u8;
    rom[GLOBAL_CHECKSUM_OFFSET + 1] = (global_checksum & 0xFF) as u8;

    rom
}

/// The ROM size byte is the base-2 log of the image size in 32 KiB units.
fn rom_size_code(len: usize) -> u8 {
    let mut code = 0u8;
    let mut size = MIN_ROM_SIZE;
    while size < len {
        size *= 2;
        code += 1;
    }
    code
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pads_to_32kib_and_stamps_the_logo() {
        let rom = build(&[], &GameBoyHeaderConfig::default());
        assert_eq!(rom.len(), MIN_ROM_SIZE);
        assert_eq!(&rom[LOGO_OFFSET..LOGO_OFFSET + 4], &NINTENDO_LOGO[..4]);
    }

    #[test]
    fn cgb_flag_reflects_color_compatibility() {
        let config = GameBoyHeaderConfig {
            color_compatible: true,
            ..Default::default()
        };
        let rom = build(&[], &config);
        assert_eq!(rom[CGB_FLAG_OFFSET], 0xC0);
    }

    #[test]
    fn header_checksum_is_internally_consistent() {
        let rom = build(&[], &GameBoyHeaderConfig::default());
        let mut checksum: u8 = 0;
        for &b in &rom[TITLE_OFFSET..HEADER_CHECKSUM_OFFSET] {
            checksum = checksum.wrapping_sub(b).wrapping_sub(1);
        }
        assert_eq!(rom[HEADER_CHECKSUM_OFFSET], checksum);
    }
}
