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

//! Resolves `.include` before the two-pass analyzer ever sees a
//! `Statement` stream: every included file is parsed on its own and
//! spliced in where the `.include` directive appeared, with a
//! currently-open-files set guarding against cycles. `.incbin` is left
//! alone here — the analyzer reads that file lazily through the same
//! `FileReader` so a missing include binary becomes a normal diagnostic
//! instead of aborting the whole run.

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use log::debug;

use crate::ast::{Directive, SourceLocation, Statement};
use crate::file_reader::FileReader;
use crate::parser;

pub fn preprocess<F: FileReader>(
    entry_path: &Path,
    reader: &F,
) -> Result<Vec<Statement>> {
    let mut open_files = HashSet::new();
    resolve_file(entry_path, reader, &mut open_files)
}

fn resolve_file<F: FileReader>(
    path: &Path,
    reader: &F,
    open_files: &mut HashSet<PathBuf>,
) -> Result<Vec<Statement>> {
    let canonical = path.to_path_buf();
    if !open_files.insert(canonical.clone()) {
        return Err(crate::errors::AssemblyError::IncludeCycle {
            path: path.display().to_string(),
        }
        .into());
    }

    debug!("parsing {}", path.display());
    let source = reader
        .read_to_string(path)
        .with_context(|| format!("reading {}", path.display()))?;
    let statements = parser::parse_source(&source)
        .with_context(|| format!("parsing {}", path.display()))?;

    let file_name = path.display().to_string();
    let tagged = tag_file(statements, &file_name);
    let expanded = expand_includes(tagged, path, reader, open_files)?;

    open_files.remove(&canonical);
    Ok(expanded)
}

/// Stamps every statement's (and nested statement's) `SourceLocation`
/// with the file it came from, so diagnostics from an included file point
/// somewhere useful instead of reporting only a line number.
fn tag_file(statements: Vec<Statement>, file: &str) -> Vec<Statement> {
    statements.into_iter().map(|s| tag_statement(s, file)).collect()
}

fn tag_statement(statement: Statement, file: &str) -> Statement {
    fn retag(loc: SourceLocation, file: &str) -> SourceLocation {
        SourceLocation::in_file(file.to_string(), loc.line, loc.column)
    }

    match statement {
        Statement::Label { name, kind, location } => Statement::Label {
            name,
            kind,
            location: retag(location, file),
        },
        Statement::Instruction { instruction, location } => Statement::Instruction {
            instruction,
            location: retag(location, file),
        },
        Statement::Directive { directive, location } => Statement::Directive {
            directive,
            location: retag(location, file),
        },
        Statement::MacroDef { mut macro_def, location } => {
            macro_def.body = tag_file(macro_def.body, file);
            macro_def.location = retag(macro_def.location, file);
            Statement::MacroDef {
                macro_def,
                location: retag(location, file),
            }
        }
        Statement::MacroInvoke { invocation, location } => Statement::MacroInvoke {
            invocation,
            location: retag(location, file),
        },
        Statement::Conditional { mut conditional, location } => {
            conditional.then_body = tag_file(conditional.then_body, file);
            conditional.elseifs = conditional
                .elseifs
                .into_iter()
                .map(|(cond, body)| (cond, tag_file(body, file)))
                .collect();
            conditional.else_body = tag_file(conditional.else_body, file);
            Statement::Conditional {
                conditional,
                location: retag(location, file),
            }
        }
        Statement::Repeat { mut repeat, location } => {
            repeat.body = tag_file(repeat.body, file);
            Statement::Repeat {
                repeat,
                location: retag(location, file),
            }
        }
    }
}

fn expand_includes<F: FileReader>(
    statements: Vec<Statement>,
    current_file: &Path,
    reader: &F,
    open_files: &mut HashSet<PathBuf>,
) -> Result<Vec<Statement>> {
    let dir = current_file.parent().unwrap_or_else(|| Path::new(""));
    let mut out = Vec::with_capacity(statements.len());
    for statement in statements {
        match statement {
            Statement::Directive {
                directive: Directive::Include(include_path),
                ..
            } => {
                let resolved = dir.join(&include_path);
                let included = resolve_file(&resolved, reader, open_files)?;
                out.extend(included);
            }
            Statement::Conditional { mut conditional, location } => {
                conditional.then_body = expand_includes(conditional.then_body, current_file, reader, open_files)?;
                let mut elseifs = Vec::with_capacity(conditional.elseifs.len());
                for (cond, body) in conditional.elseifs {
                    elseifs.push((cond, expand_includes(body, current_file, reader, open_files)?));
                }
                conditional.elseifs = elseifs;
                conditional.else_body = expand_includes(conditional.else_body, current_file, reader, open_files)?;
                out.push(Statement::Conditional { conditional, location });
            }
            Statement::Repeat { mut repeat, location } => {
                repeat.body = expand_includes(repeat.body, current_file, reader, open_files)?;
                out.push(Statement::Repeat { repeat, location });
            }
            Statement::MacroDef { mut macro_def, location } => {
                macro_def.body = expand_includes(macro_def.body, current_file, reader, open_files)?;
                out.push(Statement::MacroDef { macro_def, location });
            }
            other => out.push(other),
        }
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::file_reader::MockFileReader;

    #[test]
    fn splices_included_statements_in_place() {
        let mut reader = MockFileReader::default();
        reader.add_file("main.asm", "nop\n.include \"sub.asm\"\nnop\n");
        reader.add_file("sub.asm", "inx\n");

        let statements = preprocess(Path::new("main.asm"), &reader).unwrap();
        assert_eq!(statements.len(), 3);
        match &statements[1] {
            Statement::Instruction { instruction, location } => {
                assert_eq!(instruction.mnemonic, "inx");
                assert_eq!(location.file.as_deref(), Some("sub.asm"));
            }
            other => panic!("expected an instruction, got {other:?}"),
        }
    }

    #[test]
    fn self_include_is_a_cycle_error() {
        let mut reader = MockFileReader::default();
        reader.add_file("loop.asm", ".include \"loop.asm\"\n");

        let result = preprocess(Path::new("loop.asm"), &reader);
        assert!(result.is_err());
    }
}
