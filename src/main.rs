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

use std::collections::HashMap;
use std::fs;
use std::path::PathBuf;

use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand};

use rasm::ast::Architecture;
use rasm::config::{AssembleOptions, RomConfig};
use rasm::errors::Severity;
use rasm::file_reader::AsmFileReader;

/// Multi-target retro-console assembler.
#[derive(Parser)]
#[clap(version, author = "Connor Nolan")]
struct Opts {
    /// Source file to assemble.
    input: PathBuf,
    #[clap(short, long)]
    output: PathBuf,
    /// Force the target architecture, bypassing any in-source `.target`
    /// directive.
    #[clap(short, long)]
    target: Option<String>,
    /// Predefine a constant as `NAME=VALUE` (repeatable), as if each were
    /// a `.define NAME, VALUE` at the top of the translation unit.
    #[clap(short = 'D', long = "define", value_name = "NAME=VALUE")]
    defines: Vec<String>,
    /// JSON project file supplying ROM header configuration in lieu of
    /// in-source directives.
    #[clap(short, long)]
    config: Option<PathBuf>,
    #[command(subcommand)]
    platform: Option<Platform>,
}

/// Platform shorthand, equivalent to putting `.nes`/`.snes`/... as the
/// first line of the source — a convenience for project setups that
/// don't want the platform baked into the `.asm` file itself.
#[derive(Subcommand)]
enum Platform {
    Nes,
    Snes,
    Gb,
    Genesis,
    Gba,
    Sms,
    Tg16,
    Atari2600,
    Lynx,
    Wonderswan,
    Spc700,
    /// No platform header: assemble as a flat binary starting at address 0.
    Boot,
}

impl Platform {
    fn architecture(&self) -> Option<Architecture> {
        match self {
            Platform::Nes => Some(Architecture::Mos6502),
            Platform::Snes => Some(Architecture::Wdc65816),
            Platform::Gb => Some(Architecture::Sm83),
            Platform::Genesis => Some(Architecture::M68000),
            Platform::Gba => Some(Architecture::Arm7Tdmi),
            Platform::Sms => Some(Architecture::Z80),
            Platform::Tg16 => Some(Architecture::HuC6280),
            Platform::Atari2600 => Some(Architecture::Mos6507),
            Platform::Lynx => Some(Architecture::Wdc65C02),
            Platform::Wonderswan => Some(Architecture::V30Mz),
            Platform::Spc700 => Some(Architecture::Spc700),
            Platform::Boot => None,
        }
    }
}

fn parse_define(raw: &str) -> Result<(String, i64)> {
    let (name, value) = raw
        .split_once('=')
        .with_context(|| format!("--define expects NAME=VALUE, got '{raw}'"))?;
    let value = if let Some(hex) = value.strip_prefix('$') {
        i64::from_str_radix(hex, 16)?
    } else if let Some(bin) = value.strip_prefix('%') {
        i64::from_str_radix(bin, 2)?
    } else {
        value.parse()?
    };
    Ok((name.to_string(), value))
}

fn main() -> Result<()> {
    env_logger::init();
    let opts = Opts::parse();

    let architecture = match &opts.target {
        Some(name) => Some(
            Architecture::from_name(name)
                .with_context(|| format!("unknown target architecture '{name}'"))?,
        ),
        None => opts.platform.as_ref().and_then(Platform::architecture),
    };

    let mut defines = HashMap::new();
    for raw in &opts.defines {
        let (name, value) = parse_define(raw)?;
        defines.insert(name, value);
    }

    let rom_config = match &opts.config {
        Some(path) => {
            let text = fs::read_to_string(path)
                .with_context(|| format!("reading config file {}", path.display()))?;
            Some(
                serde_json::from_str::<RomConfig>(&text)
                    .with_context(|| format!("parsing config file {}", path.display()))?,
            )
        }
        None => None,
    };

    let options = AssembleOptions {
        architecture,
        defines,
        rom_config,
    };

    let reader = AsmFileReader;
    let result = rasm::assemble(&opts.input, &options, &reader)?;

    for diagnostic in &result.diagnostics {
        match diagnostic.severity {
            Severity::Error => log::error!("{diagnostic}"),
            Severity::Warning => log::warn!("{diagnostic}"),
        }
    }

    let Some(rom) = result.rom else {
        let error_count = result.diagnostics.iter().filter(|d| d.is_error()).count();
        bail!("assembly failed with {error_count} error(s); no ROM emitted");
    };

    fs::write(&opts.output, &rom)
        .with_context(|| format!("writing output file {}", opts.output.display()))?;
    println!(
        "assembled {} -> {} ({} bytes)",
        opts.input.display(),
        opts.output.display(),
        rom.len()
    );

    Ok(())
}
