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

//! Typed configuration the core is built from. The CLI/project-file loader
//! are thin external collaborators (out of scope); this module only owns
//! the structs they populate before handing them to [`crate::assemble`].

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::ast::Architecture;

/// Everything the analyzer needs besides the source itself.
#[derive(Debug, Clone, Default)]
pub struct AssembleOptions {
    /// Forces the target architecture, bypassing `.target`/platform
    /// directives in source. `None` lets the source decide.
    pub architecture: Option<Architecture>,
    /// Symbols pre-defined as constants before pass 1 starts, as if each
    /// were a `.define NAME, VALUE` at the top of the translation unit
    /// (the CLI's repeatable `--define KEY=VALUE` feeds this).
    pub defines: HashMap<String, i64>,
    /// Header/layout configuration handed to the ROM builder once assembly
    /// succeeds. `None` falls back to that builder's documented defaults.
    pub rom_config: Option<RomConfig>,
}

/// Per-platform header configuration, populated from a project file (or the
/// CLI) rather than in-source directives. Only the platforms whose builder
/// needs more than "lay the bytes out and pad" have a non-empty section.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct RomConfig {
    pub nes: NesHeaderConfig,
    pub snes: SnesHeaderConfig,
    pub gb: GameBoyHeaderConfig,
    pub lynx: LynxHeaderConfig,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Mirroring {
    Horizontal,
    Vertical,
}

impl Default for Mirroring {
    fn default() -> Self {
        Mirroring::Horizontal
    }
}

/// Fields packed into iNES header bytes 6/7/8/12.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct NesHeaderConfig {
    pub mirroring: Mirroring,
    pub battery_backed: bool,
    pub four_screen: bool,
    pub pal: bool,
    pub trainer: bool,
    /// PRG-ROM size in 16 KiB units; `None` infers from the emitted PRG run.
    pub prg_rom_units: Option<u8>,
    /// CHR-ROM size in 8 KiB units; `None` infers from the emitted CHR run
    /// (zero if none was emitted, i.e. CHR-RAM).
    pub chr_rom_units: Option<u8>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct SnesHeaderConfig {
    pub title: Option<String>,
    /// Forces the 64-byte internal header location; `None` defers to the
    /// `.lorom`/`.hirom`/`.exhirom` directive (or LoROM if neither ran).
    pub memory_map: Option<String>,
    pub fast_rom: bool,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct GameBoyHeaderConfig {
    pub title: Option<String>,
    pub cartridge_type: Option<u8>,
    pub color_compatible: bool,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct LynxHeaderConfig {
    pub cart_name: Option<String>,
    pub manufacturer_name: Option<String>,
    pub bank0_page_size: Option<u16>,
    pub bank1_page_size: Option<u16>,
}
