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

//! Atari Lynx `.lnx` builder: a fixed 64-byte header (magic, bank
//! page sizes, loader version, cart/manufacturer name, screen rotation)
//! immediately followed by the raw cartridge image.

use crate::assembler::ByteRun;
use crate::config::LynxHeaderConfig;
use crate::rom::layout_from_lowest;

const HEADER_LEN: usize = 64;
const CART_NAME_OFFSET: usize = 10;
const CART_NAME_LEN: usize = 32;
const MANUFACTURER_OFFSET: usize = 42;
const MANUFACTURER_LEN: usize = 16;
const DEFAULT_PAGE_SIZE: u16 = 256;

pub fn build(runs: &[ByteRun], config: &LynxHeaderConfig) -> Vec<u8> {
    let body = layout_from_lowest(runs, 0x00);

    let mut header = vec![0u8; HEADER_LEN];
    header[0..4].copy_from_slice(b"LYNX");
    let bank0 = config.bank0_page_size.unwrap_or(DEFAULT_PAGE_SIZE);
    let bank1 = config.bank1_page_size.unwrap_or(0);
    header[4..6].copy_from_slice(&bank0.to_le_bytes());
    header[6..8].copy_from_slice(&bank1.to_le_bytes());
    header[8..10].copy_from_slice(&1u16.to_le_bytes()); // loader version
    write_padded(
        &mut header[CART_NAME_OFFSET..CART_NAME_OFFSET + CART_NAME_LEN],
        config.cart_name.as_deref().unwrap_or(""),
    );
    write_padded(
        &mut header[MANUFACTURER_OFFSET..MANUFACTURER_OFFSET + MANUFACTURER_LEN],
        config.manufacturer_name.as_deref().unwrap_or(""),
    );
    header[58] = 0x00; // no screen rotation

    let mut rom = header;
    rom.extend(body);
    rom
}

fn write_padded(slice: &mut [u8], text: &str) {
    let bytes = text.as_bytes();
    let len = bytes.len().min(slice.len());
    slice[..len].copy_from_slice(&bytes[..len]);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn header_carries_the_lynx_magic_and_default_page_size() {
        let rom = build(&[], &LynxHeaderConfig::default());
        assert_eq!(&rom[0..4], b"LYNX");
        assert_eq!(
            u16::from_le_bytes([rom[4], rom[5]]),
            DEFAULT_PAGE_SIZE
        );
    }

    #[test]
    fn cart_name_is_written_at_its_fixed_offset() {
        let config = LynxHeaderConfig {
            cart_name: Some("ZAGNOID".to_string()),
            ..Default::default()
        };
        let rom = build(&[], &config);
        assert_eq!(&rom[CART_NAME_OFFSET..CART_NAME_OFFSET + 7], b"ZAGNOID");
    }

    #[test]
    fn body_follows_immediately_after_the_header() {
        let runs = vec![ByteRun {
            address: 0,
            bytes: vec![0xAA, 0xBB],
        }];
        let rom = build(&runs, &LynxHeaderConfig::default());
        assert_eq!(rom.len(), HEADER_LEN + 2);
        assert_eq!(&rom[HEADER_LEN..], &[0xAA, 0xBB]);
    }
}
