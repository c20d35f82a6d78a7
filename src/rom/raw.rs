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

//! Shared passthrough builder for platforms with no builder-owned header:
//! Genesis, GBA, Master System, TG16, Atari 2600 and WonderSwan all expect
//! either no header at all or one the programmer writes with `.db` at a
//! fixed address, so the core's only job is to lay the bytes out.

use crate::assembler::ByteRun;
use crate::rom::layout_from_lowest;

pub fn build(runs: &[ByteRun]) -> Vec<u8> {
    layout_from_lowest(runs, 0x00)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn concatenates_runs_with_gap_padding() {
        let runs = vec![
            ByteRun {
                address: 0,
                bytes: vec![0xDE, 0xAD],
            },
            ByteRun {
                address: 3,
                bytes: vec![0xBE, 0xEF],
            },
        ];
        assert_eq!(build(&runs), vec![0xDE, 0xAD, 0x00, 0xBE, 0xEF]);
    }
}
