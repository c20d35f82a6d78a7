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

//! The two-pass semantic analyzer: walks the preprocessed
//! statement stream twice, driving the symbol table, macro table and
//! architecture backend to turn an AST into address-tagged byte runs.

pub mod arch;
pub mod expr;
pub mod macro_table;
pub mod preprocessor;
pub mod symbol_table;

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use log::{debug, trace};

use crate::ast::{AddressingMode, Architecture, Directive, Expression, Operand, Statement};
use crate::config::AssembleOptions;
use crate::errors::{AssemblyError, Diagnostic};
use crate::file_reader::FileReader;

use arch::{Backend, EncodeRequest, Flags};
use expr::EvalContext;
use macro_table::MacroTable;
use symbol_table::{SymbolKind, SymbolTable};

/// A contiguous span of bytes destined for a fixed address. The ROM
/// builders turn a `Vec<ByteRun>` plus header configuration into a final
/// platform image; gaps between runs (from `.org` jumps or `.res`) are the
/// builder's to pad.
#[derive(Debug, Clone, PartialEq)]
pub struct ByteRun {
    pub address: i64,
    pub bytes: Vec<u8>,
}

/// Everything downstream (ROM builders, `lib::assemble`) needs once
/// analysis succeeds with no errors.
#[derive(Debug, Clone)]
pub struct AssembledProgram {
    pub architecture: Architecture,
    pub platform: Option<String>,
    pub memory_map: Option<String>,
    pub mapper: Option<i64>,
    pub runs: Vec<ByteRun>,
}

pub struct AnalysisResult {
    pub diagnostics: Vec<Diagnostic>,
    /// `None` whenever `diagnostics` contains an error — ROM emission is
    /// suppressed whenever any error exists.
    pub program: Option<AssembledProgram>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Pass {
    One,
    Two,
}

/// Maps the `.nes`/`.snes`/... platform shorthands (and `.target`'s
/// platform-name form) onto the CPU each one runs. One platform per
/// architecture, so the mapping is total in both directions.
fn architecture_for_platform(name: &str) -> Option<Architecture> {
    Some(match name.to_ascii_lowercase().as_str() {
        "nes" => Architecture::Mos6502,
        "snes" => Architecture::Wdc65816,
        "gb" | "gbc" | "gameboy" => Architecture::Sm83,
        "genesis" | "megadrive" => Architecture::M68000,
        "gba" => Architecture::Arm7Tdmi,
        "sms" | "mastersystem" => Architecture::Z80,
        "tg16" | "pcengine" => Architecture::HuC6280,
        "atari2600" => Architecture::Mos6507,
        "lynx" => Architecture::Wdc65C02,
        "wonderswan" => Architecture::V30Mz,
        "spc700" => Architecture::Spc700,
        _ => return None,
    })
}

struct Analyzer<'a, F: FileReader> {
    reader: &'a F,
    source_dir: PathBuf,
    symbols: SymbolTable,
    macros: MacroTable,
    architecture: Option<Architecture>,
    platform: Option<String>,
    memory_map: Option<String>,
    mapper: Option<i64>,
    flags: Flags,
    current_address: i64,
    pass: Pass,
    diagnostics: Vec<Diagnostic>,
    runs: Vec<ByteRun>,
    current_run: Option<ByteRun>,
}

pub fn analyze<F: FileReader>(
    statements: &[Statement],
    options: &AssembleOptions,
    source_path: &Path,
    reader: &F,
) -> AnalysisResult {
    let mut analyzer = Analyzer {
        reader,
        source_dir: source_path.parent().unwrap_or_else(|| Path::new(".")).to_path_buf(),
        symbols: SymbolTable::new(),
        macros: MacroTable::new(),
        architecture: options.architecture,
        platform: None,
        memory_map: None,
        mapper: None,
        flags: Flags::native_65816(),
        current_address: 0,
        pass: Pass::One,
        diagnostics: Vec::new(),
        runs: Vec::new(),
        current_run: None,
    };
    analyzer.seed_defines(&options.defines);

    debug!("pass 1: sizing and symbol collection");
    analyzer.run_pass(statements, Pass::One);

    analyzer.symbols.clear_anonymous_labels();

    debug!("pass 2: resolution and emission");
    analyzer.run_pass(statements, Pass::Two);

    analyzer.symbols.validate_all_defined();
    analyzer.flush_run();

    analyzer.finish()
}

impl<'a, F: FileReader> Analyzer<'a, F> {
    fn seed_defines(&mut self, defines: &std::collections::HashMap<String, i64>) {
        for (name, value) in defines {
            self.symbols.define(
                name,
                SymbolKind::Constant,
                Some(*value),
                crate::ast::SourceLocation::default(),
            );
        }
    }

    fn run_pass(&mut self, statements: &[Statement], pass: Pass) {
        self.pass = pass;
        self.current_address = 0;
        self.flags = Flags::native_65816();
        self.symbols.reset_scope();
        self.walk(statements);
    }

    fn finish(mut self) -> AnalysisResult {
        self.diagnostics.extend(self.symbols.diagnostics.drain(..));
        self.diagnostics.extend(self.macros.diagnostics.drain(..));
        let has_errors = self.diagnostics.iter().any(Diagnostic::is_error);

        let program = if has_errors {
            None
        } else {
            Some(AssembledProgram {
                architecture: self.architecture.unwrap_or(Architecture::Mos6502),
                platform: self.platform,
                memory_map: self.memory_map,
                mapper: self.mapper,
                runs: self.runs,
            })
        };
        AnalysisResult {
            diagnostics: self.diagnostics,
            program,
        }
    }

    fn backend(&self) -> Option<Box<dyn Backend>> {
        self.architecture.map(arch::backend_for)
    }

    fn walk(&mut self, statements: &[Statement]) {
        for statement in statements {
            self.visit(statement);
        }
    }

    fn visit(&mut self, statement: &Statement) {
        match statement {
            Statement::Label { name, kind, location } => {
                self.visit_label(name, kind, location.clone());
            }
            Statement::Instruction { instruction, location } => {
                // The grammar is mnemonic-agnostic: a macro call is
                // lexically indistinguishable from an instruction until the
                // analyzer knows the macro table, so reclassification
                // happens here rather than in the parser.
                if self.macros.is_macro(&instruction.mnemonic) {
                    self.visit_macro_invocation(instruction, location);
                } else {
                    self.visit_instruction(instruction, location.clone());
                }
            }
            Statement::Directive { directive, location } => {
                self.visit_directive(directive, location.clone());
            }
            Statement::MacroDef { macro_def, location } => {
                if self.pass == Pass::One {
                    let mut reserved: HashSet<String> = self
                        .backend()
                        .map(|b| b.mnemonics().iter().map(|m| m.to_string()).collect())
                        .unwrap_or_default();
                    reserved.extend(DIRECTIVE_KEYWORDS.iter().map(|k| k.to_string()));
                    self.symbols.define(
                        &macro_def.name,
                        SymbolKind::Macro,
                        None,
                        location.clone(),
                    );
                    self.macros.define(macro_def.clone(), &reserved);
                }
            }
            Statement::MacroInvoke { invocation, location } => {
                if !self.macros.is_macro(&invocation.name) {
                    self.diagnostics.push(Diagnostic::error(
                        location.clone(),
                        AssemblyError::UndefinedSymbol {
                            name: invocation.name.clone(),
                        },
                    ));
                    return;
                }
                if let Some(body) = self.macros.expand(invocation, location) {
                    self.walk(&body);
                }
            }
            Statement::Conditional { conditional, location } => {
                self.visit_conditional(conditional, location.clone());
            }
            Statement::Repeat { repeat, location } => {
                self.visit_repeat(repeat, location.clone());
            }
        }
    }

    fn visit_label(&mut self, name: &str, kind: &crate::ast::LabelKind, location: crate::ast::SourceLocation) {
        use crate::ast::LabelKind;
        match kind {
            LabelKind::Named => {
                let address = self.current_address;
                match self.pass {
                    Pass::One => {
                        self.symbols.define(name, SymbolKind::Label, Some(address), location);
                    }
                    Pass::Two => {
                        self.symbols
                            .define_or_confirm(name, SymbolKind::Label, Some(address), location);
                    }
                }
            }
            LabelKind::AnonymousForward => {
                self.symbols.define_anonymous_label(true, self.current_address, location);
            }
            LabelKind::AnonymousBackward => {
                self.symbols.define_anonymous_label(false, self.current_address, location);
            }
            LabelKind::NamedAnonymousForward(scoped_name) => {
                self.symbols
                    .define_named_anonymous_label(true, scoped_name, self.current_address, location);
            }
            LabelKind::NamedAnonymousBackward(scoped_name) => {
                self.symbols
                    .define_named_anonymous_label(false, scoped_name, self.current_address, location);
            }
        }
    }

    fn eval(&mut self, expr: &Expression, location: crate::ast::SourceLocation) -> Option<i64> {
        let mut ctx = EvalContext {
            symbols: &mut self.symbols,
            current_address: self.current_address,
            location,
        };
        expr::eval(expr, &mut ctx)
    }

    /// An instruction-shaped statement whose mnemonic names a macro: turn
    /// its operand expressions back into a [`MacroInvocation`](crate::ast::MacroInvocation)
    /// and expand. Every operand that carries an expression becomes one
    /// positional argument, in source order; bare register/implied
    /// operands (which a macro call never legitimately has) are dropped.
    fn visit_macro_invocation(&mut self, instruction: &crate::ast::Instruction, location: &crate::ast::SourceLocation) {
        let arguments = instruction
            .operands
            .iter()
            .filter_map(|operand| operand.expr.clone())
            .collect();
        let invocation = crate::ast::MacroInvocation {
            name: instruction.mnemonic.clone(),
            arguments,
        };
        if let Some(body) = self.macros.expand(&invocation, location) {
            self.walk(&body);
        }
    }

    fn visit_instruction(&mut self, instruction: &crate::ast::Instruction, location: crate::ast::SourceLocation) {
        let Some(backend) = self.backend() else {
            self.diagnostics.push(Diagnostic::error(
                location,
                AssemblyError::DirectiveMisuse {
                    directive: "target".to_string(),
                    reason: format!(
                        "instruction '{}' seen before a target architecture was selected",
                        instruction.mnemonic
                    ),
                },
            ));
            return;
        };

        if is_block_move(&instruction.mnemonic) {
            self.visit_block_move(backend.as_ref(), instruction, location);
            return;
        }

        let operands = reclassify_operands(backend.as_ref(), &instruction.operands);
        let (mode, register, value_expr) = flatten_operands(&operands);
        let operand_value = value_expr.as_ref().and_then(|e| self.eval(e, location.clone()));

        match self.pass {
            Pass::One => {
                match backend.size(
                    &instruction.mnemonic,
                    instruction.size_suffix,
                    mode,
                    operand_value,
                    self.flags,
                ) {
                    Ok(size) => {
                        backend.update_flags(&instruction.mnemonic, operand_value, &mut self.flags);
                        self.current_address += size as i64;
                    }
                    Err(err) => self.diagnostics.push(Diagnostic::error(location, err)),
                }
            }
            Pass::Two => {
                let request = EncodeRequest {
                    mnemonic: &instruction.mnemonic,
                    size_suffix: instruction.size_suffix,
                    mode,
                    register: register.as_deref(),
                    operand_value,
                    current_address: self.current_address,
                };
                match backend.encode(&request, &mut self.flags) {
                    Ok(bytes) => {
                        let address = self.current_address;
                        self.current_address += bytes.len() as i64;
                        self.emit(address, &bytes);
                    }
                    Err(err) => self.diagnostics.push(Diagnostic::error(location, err)),
                }
            }
        }
    }

    /// 65816 `mvn srcbank, destbank` / `mvp srcbank, destbank`: the one
    /// instruction shape in this catalog with two independently meaningful
    /// operand values, which the generic `flatten_operands` single-value
    /// collapse would silently drop one of. Both bank expressions are
    /// evaluated directly here and packed into one value — low byte the
    /// destination bank, high byte the source bank — matching the byte
    /// order the instruction actually encodes in, so the existing
    /// single-`operand_value` `EncodeRequest` shape can still carry it.
    fn visit_block_move(&mut self, backend: &dyn Backend, instruction: &crate::ast::Instruction, location: crate::ast::SourceLocation) {
        let [src, dest] = instruction.operands.as_slice() else {
            self.diagnostics.push(Diagnostic::error(
                location,
                AssemblyError::DirectiveMisuse {
                    directive: instruction.mnemonic.clone(),
                    reason: "block move takes exactly two bank operands".to_string(),
                },
            ));
            return;
        };
        let src_value = src.expr.as_ref().and_then(|e| self.eval(e, location.clone()));
        let dest_value = dest.expr.as_ref().and_then(|e| self.eval(e, location.clone()));
        let packed = match (src_value, dest_value) {
            (Some(src), Some(dest)) => Some(((src & 0xff) << 8) | (dest & 0xff)),
            _ => None,
        };

        match self.pass {
            Pass::One => match backend.size(
                &instruction.mnemonic,
                instruction.size_suffix,
                AddressingMode::Special,
                packed,
                self.flags,
            ) {
                Ok(size) => self.current_address += size as i64,
                Err(err) => self.diagnostics.push(Diagnostic::error(location, err)),
            },
            Pass::Two => {
                let request = EncodeRequest {
                    mnemonic: &instruction.mnemonic,
                    size_suffix: instruction.size_suffix,
                    mode: AddressingMode::Special,
                    register: None,
                    operand_value: packed,
                    current_address: self.current_address,
                };
                match backend.encode(&request, &mut self.flags) {
                    Ok(bytes) => {
                        let address = self.current_address;
                        self.current_address += bytes.len() as i64;
                        self.emit(address, &bytes);
                    }
                    Err(err) => self.diagnostics.push(Diagnostic::error(location, err)),
                }
            }
        }
    }

    fn visit_conditional(&mut self, conditional: &crate::ast::Conditional, location: crate::ast::SourceLocation) {
        // Pass 1 is a dry run driven by the same tolerant `eval` pass 2
        // uses; an unresolved condition (only possible when it forward
        // references a label this analyzer hasn't reached yet) defaults to
        // the `then` branch so sizing has something concrete to walk. If
        // pass 2 later resolves the same condition differently, the branch
        // taken — and the bytes it contributes — can differ between passes;
        // this is the one case where this analyzer's address trajectory can
        // diverge between passes, and it is an accepted, documented
        // limitation (see DESIGN.md) rather than an oversight.
        let condition_value = self.eval(&conditional.condition, location.clone());
        if condition_value.unwrap_or(1) != 0 {
            self.walk(&conditional.then_body);
            return;
        }
        for (cond, body) in &conditional.elseifs {
            let value = self.eval(cond, location.clone());
            if value.unwrap_or(0) != 0 {
                self.walk(body);
                return;
            }
        }
        self.walk(&conditional.else_body);
    }

    fn visit_repeat(&mut self, repeat: &crate::ast::Repeat, location: crate::ast::SourceLocation) {
        let count = self.eval(&repeat.count, location.clone()).unwrap_or(0);
        if count < 0 {
            self.diagnostics.push(Diagnostic::error(
                location,
                AssemblyError::DirectiveMisuse {
                    directive: "repeat".to_string(),
                    reason: "count must be a non-negative integer".to_string(),
                },
            ));
            return;
        }
        for _ in 0..count {
            self.walk(&repeat.body);
        }
    }

    fn visit_directive(&mut self, directive: &Directive, location: crate::ast::SourceLocation) {
        match directive {
            Directive::Org(expr) => {
                if let Some(value) = self.eval(expr, location.clone()) {
                    self.current_address = value;
                    self.flush_run();
                } else {
                    self.diagnostics.push(Diagnostic::error(
                        location,
                        AssemblyError::DirectiveMisuse {
                            directive: "org".to_string(),
                            reason: "address could not be resolved".to_string(),
                        },
                    ));
                }
            }
            Directive::Equ(name, expr) | Directive::Define(name, expr) => {
                if self.pass != Pass::One {
                    return;
                }
                let value = self.eval(expr, location.clone());
                self.symbols.define(name, SymbolKind::Constant, value, location);
            }
            Directive::Db(exprs) => self.emit_data(exprs, 1, location),
            Directive::Dw(exprs) => self.emit_data(exprs, 2, location),
            Directive::Dl(exprs) => {
                let width = self.long_directive_width();
                self.emit_data(exprs, width, location);
            }
            Directive::Ds(count, fill) => {
                let fill_value = fill.clone().unwrap_or(Expression::Number(0));
                self.emit_reserved(count, Some(&fill_value), location);
            }
            Directive::Fill(count, value) => {
                self.emit_reserved(count, Some(value), location);
            }
            Directive::Res(count) => {
                self.emit_reserved(count, None, location);
            }
            Directive::Target(name) => self.set_target(name, location),
            Directive::Platform(name) => self.set_platform(name, location),
            Directive::MemoryMap(name) => {
                if self.pass != Pass::One {
                    return;
                }
                if self.architecture != Some(Architecture::Wdc65816) {
                    self.diagnostics.push(Diagnostic::error(
                        location,
                        AssemblyError::DirectiveMisuse {
                            directive: name.clone(),
                            reason: "memory-map directives are only valid on the snes target".to_string(),
                        },
                    ));
                    return;
                }
                self.memory_map = Some(name.clone());
            }
            Directive::Mapper(expr) => {
                if self.pass != Pass::One {
                    return;
                }
                self.mapper = self.eval(expr, location);
            }
            Directive::Assert(expr, message) => {
                if self.pass != Pass::Two {
                    return;
                }
                match self.eval(expr, location.clone()) {
                    Some(0) => {
                        self.diagnostics.push(Diagnostic::error(
                            location,
                            AssemblyError::AssertionFailed {
                                message: message.clone().unwrap_or_else(|| "Assertion failed".to_string()),
                            },
                        ));
                    }
                    Some(_) => {}
                    None => {
                        self.diagnostics.push(Diagnostic::error(
                            location,
                            AssemblyError::DirectiveMisuse {
                                directive: "assert".to_string(),
                                reason: "condition could not be resolved".to_string(),
                            },
                        ));
                    }
                }
            }
            Directive::Error(message) => {
                if self.pass == Pass::One {
                    self.diagnostics
                        .push(Diagnostic::error(location, AssemblyError::UserError(message.clone())));
                }
            }
            Directive::Warning(message) => {
                if self.pass == Pass::One {
                    self.diagnostics
                        .push(Diagnostic::warning(location, AssemblyError::UserWarning(message.clone())));
                }
            }
            Directive::Include(_) => {
                // Spliced away by the preprocessor before the analyzer ever runs.
            }
            Directive::Incbin(path, start, length) => {
                self.visit_incbin(path, start.as_ref(), length.as_ref(), location);
            }
        }
    }

    fn set_target(&mut self, name: &str, location: crate::ast::SourceLocation) {
        if self.pass != Pass::One {
            return;
        }
        let resolved = Architecture::from_name(name).or_else(|| architecture_for_platform(name));
        let Some(architecture) = resolved else {
            self.diagnostics.push(Diagnostic::error(
                location,
                AssemblyError::DirectiveMisuse {
                    directive: "target".to_string(),
                    reason: format!("unknown architecture or platform '{name}'"),
                },
            ));
            return;
        };
        if let Some(current) = self.architecture {
            if current != architecture {
                self.diagnostics.push(Diagnostic::error(
                    location,
                    AssemblyError::ArchitectureConflict {
                        mnemonic: "target".to_string(),
                        architecture: name.to_string(),
                    },
                ));
                return;
            }
        }
        self.architecture = Some(architecture);
        if architecture_for_platform(name).is_some() {
            self.platform = Some(name.to_ascii_lowercase());
        }
    }

    fn set_platform(&mut self, name: &str, location: crate::ast::SourceLocation) {
        if self.pass != Pass::One {
            return;
        }
        let Some(architecture) = architecture_for_platform(name) else {
            self.diagnostics.push(Diagnostic::error(
                location,
                AssemblyError::DirectiveMisuse {
                    directive: name.to_string(),
                    reason: "unrecognized platform".to_string(),
                },
            ));
            return;
        };
        if let Some(current) = self.architecture {
            if current != architecture {
                self.diagnostics.push(Diagnostic::error(
                    location,
                    AssemblyError::ArchitectureConflict {
                        mnemonic: name.to_string(),
                        architecture: current.name().to_string(),
                    },
                ));
                return;
            }
        }
        self.architecture = Some(architecture);
        self.platform = Some(name.to_ascii_lowercase());
    }

    /// `.dl`/`.dd` entry width: a 24-bit long pointer on the 65816/HuC6280
    /// long-addressing architectures, a plain 32-bit long everywhere else.
    fn long_directive_width(&self) -> i64 {
        match self.architecture {
            Some(Architecture::Wdc65816) | Some(Architecture::HuC6280) => 3,
            _ => 4,
        }
    }

    fn emit_data(&mut self, exprs: &[Expression], width: i64, location: crate::ast::SourceLocation) {
        let big_endian = self.architecture == Some(Architecture::M68000);
        for expr in exprs {
            if let Expression::StringLiteral(s) = expr {
                let address = self.current_address;
                self.current_address += s.len() as i64;
                if self.pass == Pass::Two {
                    self.emit(address, s.as_bytes());
                }
                continue;
            }
            let value = self.eval(expr, location.clone());
            let address = self.current_address;
            self.current_address += width;
            if self.pass == Pass::Two {
                let bytes = width_bytes(value.unwrap_or(0), width, big_endian);
                self.emit(address, &bytes);
            }
        }
    }

    fn emit_reserved(&mut self, count_expr: &Expression, fill: Option<&Expression>, location: crate::ast::SourceLocation) {
        let count = self.eval(count_expr, location.clone()).unwrap_or(0).max(0);
        let address = self.current_address;
        self.current_address += count;
        if self.pass != Pass::Two {
            return;
        }
        let Some(fill_expr) = fill else {
            // `.res` — BSS-style: space is reserved but nothing is emitted,
            // so the next byte starts a fresh run rather than padding this one.
            self.flush_run();
            return;
        };
        let fill_value = self.eval(fill_expr, location).unwrap_or(0) as u8;
        let bytes = vec![fill_value; count as usize];
        self.emit(address, &bytes);
    }

    fn visit_incbin(
        &mut self,
        path: &str,
        start: Option<&Expression>,
        length: Option<&Expression>,
        location: crate::ast::SourceLocation,
    ) {
        let resolved = self.resolve_include_path(path, &location);
        let data = match self.reader.read_binary(&resolved) {
            Ok(bytes) => bytes,
            Err(err) => {
                self.diagnostics.push(Diagnostic::error(
                    location,
                    AssemblyError::Io(format!("reading '{path}': {err}")),
                ));
                return;
            }
        };
        let start_offset = start
            .and_then(|e| self.eval(e, location.clone()))
            .unwrap_or(0)
            .max(0) as usize;
        let slice_len = length
            .and_then(|e| self.eval(e, location.clone()))
            .map(|v| v.max(0) as usize)
            .unwrap_or_else(|| data.len().saturating_sub(start_offset));
        let end = (start_offset + slice_len).min(data.len());
        let slice = if start_offset <= data.len() {
            &data[start_offset..end]
        } else {
            &[]
        };

        let address = self.current_address;
        self.current_address += slice.len() as i64;
        if self.pass == Pass::Two {
            self.emit(address, slice);
        }
    }

    fn resolve_include_path(&self, path: &str, location: &crate::ast::SourceLocation) -> PathBuf {
        trace!("resolving incbin path {path} from {location}");
        let dir = match location.file.as_deref() {
            Some(file) => Path::new(file).parent().unwrap_or(&self.source_dir).to_path_buf(),
            None => self.source_dir.clone(),
        };
        dir.join(path)
    }

    fn emit(&mut self, address: i64, bytes: &[u8]) {
        if bytes.is_empty() {
            return;
        }
        if let Some(run) = &mut self.current_run {
            if run.address + run.bytes.len() as i64 == address {
                run.bytes.extend_from_slice(bytes);
                return;
            }
        }
        self.flush_run();
        self.current_run = Some(ByteRun {
            address,
            bytes: bytes.to_vec(),
        });
    }

    fn flush_run(&mut self) {
        if let Some(run) = self.current_run.take() {
            self.runs.push(run);
        }
    }
}

fn width_bytes(value: i64, width: i64, big_endian: bool) -> Vec<u8> {
    let mut bytes = Vec::with_capacity(width as usize);
    for i in 0..width {
        bytes.push(((value >> (8 * i)) & 0xff) as u8);
    }
    if big_endian {
        bytes.reverse();
    }
    bytes
}

/// `mvn`/`mvp` are the 65816's two-operand block-move instructions; every
/// other mnemonic in this crate's catalog fits the generic collapse-to-one-
/// value shape `flatten_operands` produces.
fn is_block_move(mnemonic: &str) -> bool {
    matches!(mnemonic, "mvn" | "mvp")
}

/// The parser can't distinguish a bare register name (`asl a`) from a bare
/// identifier (`asl label`) — both parse as `AddressingMode::Direct` around
/// an `Identifier` expression. Ask the active backend which it is and
/// reclassify accordingly before sizing/encoding.
fn reclassify_operands(backend: &dyn Backend, operands: &[Operand]) -> Vec<Operand> {
    operands
        .iter()
        .map(|operand| match &operand.expr {
            Some(Expression::Identifier(name)) if backend.is_register(name) => Operand::register(name.clone()),
            _ => operand.clone(),
        })
        .collect()
}

/// Collapses an instruction's operand list down to the single
/// `mode`/`register`/value shape every `Backend::size`/`encode`
/// implementation expects (see `arch::EncodeRequest`). The first operand is
/// treated as the primary addressing form; later operands supply an
/// explicit register name and/or value it doesn't itself carry — this
/// covers the overwhelming majority of real instructions (`lda #5`, `ld a,
/// 5`, `add a, b`, `push bc`). A handful of two-register-operand forms that
/// differ only in which side is memory (`ld (hl), a` versus `ld a, (hl)`)
/// are inherently ambiguous once reduced to this shape; the per-architecture
/// backends resolve what they can from the register name alone and reject
/// the rest as an architecture conflict rather than silently mis-encoding.
fn flatten_operands(operands: &[Operand]) -> (AddressingMode, Option<String>, Option<Expression>) {
    match operands {
        [] => (AddressingMode::Implied, None, None),
        [only] => (only.mode, only.register.clone(), only.expr.clone()),
        [first, rest @ ..] => {
            let mut mode = first.mode;
            let mut register = if first.mode == AddressingMode::Register {
                first.register.clone()
            } else {
                None
            };
            let mut value_expr = first.expr.clone();
            for operand in rest {
                if operand.mode == AddressingMode::Register {
                    register = operand.register.clone().or(register);
                    if first.mode == AddressingMode::Register {
                        mode = operand.mode;
                    }
                } else {
                    if register.is_none() {
                        register = operand.register.clone();
                    }
                    if first.mode == AddressingMode::Register || first.mode == AddressingMode::Direct {
                        mode = operand.mode;
                        value_expr = operand.expr.clone().or(value_expr);
                    } else if value_expr.is_none() {
                        value_expr = operand.expr.clone();
                    }
                }
            }
            (mode, register, value_expr)
        }
    }
}

/// Directive keywords, reserved alongside architecture mnemonics when
/// checking a macro name for collisions.
const DIRECTIVE_KEYWORDS: &[&str] = &[
    "org", "equ", "define", "db", "byte", "dw", "word", "dl", "dd", "ds", "fill", "res", "target",
    "nes", "snes", "gb", "genesis", "gba", "sms", "tg16", "atari2600", "lynx", "wonderswan",
    "spc700", "lorom", "hirom", "exhirom", "mapper", "assert", "error", "warning", "include",
    "incbin", "macro", "endmacro", "if", "ifdef", "ifndef", "elseif", "elif", "elseifdef",
    "elifdef", "elseifndef", "elifndef", "else", "endif", "repeat", "rept", "endrepeat", "endr",
];

#[cfg(test)]
mod tests {
    use super::*;
    use crate::file_reader::MockFileReader;
    use crate::parser;

    fn options(architecture: Architecture) -> AssembleOptions {
        AssembleOptions {
            architecture: Some(architecture),
            ..Default::default()
        }
    }

    fn run(source: &str, architecture: Architecture) -> AnalysisResult {
        let statements = parser::parse_source(source).unwrap();
        let reader = MockFileReader::default();
        analyze(&statements, &options(architecture), Path::new("test.asm"), &reader)
    }

    #[test]
    fn forward_reference_resolves_to_instruction_length() {
        let result = run("jmp target\ntarget:\n", Architecture::Mos6502);
        assert!(result.diagnostics.iter().all(|d| !d.is_error()), "{:?}", result.diagnostics);
        let program = result.program.unwrap();
        assert_eq!(program.runs[0].bytes, vec![0x4C, 0x03, 0x00]);
    }

    #[test]
    fn undefined_symbol_suppresses_emission() {
        let result = run("jmp nowhere\n", Architecture::Mos6502);
        assert!(result.program.is_none());
        assert!(result
            .diagnostics
            .iter()
            .any(|d| matches!(d.error, AssemblyError::UndefinedSymbol { .. })));
    }

    #[test]
    fn assert_on_current_address() {
        let ok = run(".org $8000\nnop\nnop\nnop\n.assert * == $8003, \"off\"\n", Architecture::Mos6502);
        assert!(ok.diagnostics.iter().all(|d| !d.is_error()), "{:?}", ok.diagnostics);

        let fail = run(".org $8000\nnop\nnop\nnop\n.assert * == $8004, \"off\"\n", Architecture::Mos6502);
        assert!(fail
            .diagnostics
            .iter()
            .any(|d| matches!(&d.error, AssemblyError::AssertionFailed { message } if message == "off")));
    }

    #[test]
    fn macro_hygiene_produces_distinct_labels() {
        let source = ".macro pair\n@loop: nop\njmp @loop\n.endmacro\npair\npair\n";
        let result = run(source, Architecture::Mos6502);
        assert!(result.diagnostics.iter().all(|d| !d.is_error()), "{:?}", result.diagnostics);
    }

    #[test]
    fn sixty_five_eight_sixteen_immediate_follows_rep() {
        let source = ".target wdc65816\nrep #$20\nlda #$1234\n";
        let result = run(source, Architecture::Wdc65816);
        assert!(result.diagnostics.iter().all(|d| !d.is_error()), "{:?}", result.diagnostics);
        let program = result.program.unwrap();
        // rep #$20 (2 bytes) then a 3-byte lda immediate.
        let total: usize = program.runs.iter().map(|r| r.bytes.len()).sum();
        assert_eq!(total, 5);
    }

    #[test]
    fn dl_is_three_bytes_on_65816_and_four_bytes_elsewhere() {
        let narrow = run(".target wdc65816\n.dl $112233\n", Architecture::Wdc65816);
        assert!(narrow.diagnostics.iter().all(|d| !d.is_error()), "{:?}", narrow.diagnostics);
        assert_eq!(narrow.program.unwrap().runs[0].bytes, vec![0x33, 0x22, 0x11]);

        let wide = run(".target mos6502\n.dl $112233\n", Architecture::Mos6502);
        assert!(wide.diagnostics.iter().all(|d| !d.is_error()), "{:?}", wide.diagnostics);
        assert_eq!(wide.program.unwrap().runs[0].bytes, vec![0x33, 0x22, 0x11, 0x00]);
    }

    #[test]
    fn dd_is_accepted_as_a_dl_synonym() {
        let result = run(".target wdc65816\n.dd $102030\n", Architecture::Wdc65816);
        assert!(result.diagnostics.iter().all(|d| !d.is_error()), "{:?}", result.diagnostics);
        assert_eq!(result.program.unwrap().runs[0].bytes, vec![0x30, 0x20, 0x10]);
    }

    #[test]
    fn target_conflict_is_an_error() {
        let result = run(".target nes\n.target snes\n", Architecture::Mos6502);
        assert!(result
            .diagnostics
            .iter()
            .any(|d| matches!(d.error, AssemblyError::ArchitectureConflict { .. })));
    }

    #[test]
    fn target_idempotent_to_same_value() {
        let result = run(".target snes\n.target snes\n", Architecture::Mos6502);
        assert!(result.diagnostics.iter().all(|d| !d.is_error()), "{:?}", result.diagnostics);
    }
}
