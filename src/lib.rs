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

//! Entry point for the core pipeline: preprocess (splice `.include`s), run
//! the two-pass semantic analyzer, then hand the resolved byte runs to the
//! platform-appropriate ROM builder. The CLI driver (`main.rs`) is a thin
//! wrapper around [`assemble`]; anything that embeds this crate as a
//! library calls it directly.

pub mod assembler;
pub mod ast;
pub mod config;
pub mod errors;
pub mod file_reader;
pub mod parser;
pub mod rom;

use std::path::Path;

use anyhow::{Context, Result};

use config::{AssembleOptions, RomConfig};
use errors::Diagnostic;
use file_reader::FileReader;

extern crate pest;
extern crate pest_derive;

/// Everything a caller gets back from a run, whether or not it succeeded.
/// `rom` is `Some` exactly when `diagnostics` contains no error-severity
/// entry: ROM emission is suppressed whenever any error exists.
pub struct AssembleOutput {
    pub diagnostics: Vec<Diagnostic>,
    pub rom: Option<Vec<u8>>,
}

impl AssembleOutput {
    pub fn has_errors(&self) -> bool {
        self.diagnostics.iter().any(Diagnostic::is_error)
    }
}

/// Assembles `source_path` (read through `reader`) into a final ROM image
/// per `options`. Never itself returns `Err` for source-level problems —
/// those are reported as [`Diagnostic`]s in the returned
/// [`AssembleOutput`] — `Err` is reserved for I/O failures the
/// preprocessor can't recover from (a missing top-level file, a cyclic
/// include).
pub fn assemble<F: FileReader>(
    source_path: &Path,
    options: &AssembleOptions,
    reader: &F,
) -> Result<AssembleOutput> {
    let statements = assembler::preprocessor::preprocess(source_path, reader)
        .context("failed resolving includes")?;

    let result = assembler::analyze(&statements, options, source_path, reader);

    let empty_config = RomConfig::default();
    let rom_config = options.rom_config.as_ref().unwrap_or(&empty_config);
    let rom = result.program.as_ref().map(|program| rom::build(program, rom_config));

    Ok(AssembleOutput {
        diagnostics: result.diagnostics,
        rom,
    })
}
