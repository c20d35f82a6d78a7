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

//! iNES builder: a 16-byte header followed by the PRG-ROM run and,
//! when configured, a CHR-ROM run. Mapper, mirroring, battery and four-screen
//! bits pack into header byte 6/7/8; the PAL flag packs into byte 12.

use crate::assembler::ByteRun;
use crate::config::{Mirroring, NesHeaderConfig};
use crate::rom::layout_from_lowest;

const PRG_UNIT: usize = 16 * 1024;
const CHR_UNIT: usize = 8 * 1024;

pub fn build(runs: &[ByteRun], config: &NesHeaderConfig) -> Vec<u8> {
    let prg = layout_from_lowest(runs, 0xFF);
    let prg_units = config
        .prg_rom_units
        .unwrap_or_else(|| prg.len().div_ceil(PRG_UNIT).max(1) as u8);
    let chr_units = config.chr_rom_units.unwrap_or(0);
    let mapper: u16 = 0;

    let mut header = vec![0u8; 16];
    header[0..4].copy_from_slice(b"NES\x1A");
    header[4] = prg_units;
    header[5] = chr_units;
    header[6] = (((mapper & 0x0F) as u8) << 4)
        | ((config.four_screen as u8) << 3)
        | ((config.trainer as u8) << 2)
        | ((config.battery_backed as u8) << 1)
        | matches!(config.mirroring, Mirroring::Vertical) as u8;
    header[7] = (((mapper >> 4) & 0x0F) as u8) << 4;
    header[8] = ((mapper >> 8) & 0xFF) as u8;
    header[12] = config.pal as u8;

    let mut rom = header;
    rom.extend(resize(prg, prg_units as usize * PRG_UNIT));
    if chr_units > 0 {
        rom.extend(vec![0u8; chr_units as usize * CHR_UNIT]);
    }
    rom
}

/// Pads (never truncates useful data) or grows `data` to exactly `len` bytes.
fn resize(mut data: Vec<u8>, len: usize) -> Vec<u8> {
    data.resize(len, 0xFF);
    data
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn header_magic_and_prg_units() {
        let runs = vec![ByteRun {
            address: 0x8000,
            bytes: vec![0xEA; 100],
        }];
        let rom = build(&runs, &NesHeaderConfig::default());
        assert_eq!(&rom[0..4], b"NES\x1A");
        assert_eq!(rom[4], 1);
        assert_eq!(rom.len(), 16 + PRG_UNIT);
    }

    #[test]
    fn vertical_mirroring_sets_bit0() {
        let config = NesHeaderConfig {
            mirroring: Mirroring::Vertical,
            ..Default::default()
        };
        let rom = build(&[], &config);
        assert_eq!(rom[6] & 0x01, 0x01);
    }

    #[test]
    fn battery_and_four_screen_bits() {
        let config = NesHeaderConfig {
            battery_backed: true,
            four_screen: true,
            ..Default::default()
        };
        let rom = build(&[], &config);
        assert_eq!(rom[6] & 0x02, 0x02);
        assert_eq!(rom[6] & 0x08, 0x08);
    }
}
