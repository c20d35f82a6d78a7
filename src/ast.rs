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

//! Architecture-agnostic AST shared by every target backend. A single
//! `Statement` stream produced by the parser is fed through the same
//! two-pass analyzer regardless of which of the eleven supported
//! architectures the source targets; only `target::Architecture::size`
//! and `::encode` differ per chip.

use std::fmt;

/// Where a token, statement or diagnostic came from. `file` is `None` for
/// the top-level translation unit and `Some(path)` for anything reached
/// through `.include`.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct SourceLocation {
    pub file: Option<String>,
    pub line: usize,
    pub column: usize,
}

impl SourceLocation {
    pub fn new(line: usize, column: usize) -> Self {
        Self {
            file: None,
            line,
            column,
        }
    }

    pub fn in_file(file: impl Into<String>, line: usize, column: usize) -> Self {
        Self {
            file: Some(file.into()),
            line,
            column,
        }
    }
}

impl fmt::Display for SourceLocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.file {
            Some(file) => write!(f, "{file}:{}:{}", self.line, self.column),
            None => write!(f, "{}:{}", self.line, self.column),
        }
    }
}

/// The eleven retro-console CPU families this crate can assemble for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Architecture {
    Mos6502,
    Wdc65816,
    Sm83,
    Z80,
    M68000,
    Arm7Tdmi,
    HuC6280,
    Mos6507,
    V30Mz,
    Spc700,
    Wdc65C02,
}

impl Architecture {
    pub fn name(&self) -> &'static str {
        match self {
            Architecture::Mos6502 => "mos6502",
            Architecture::Wdc65816 => "wdc65816",
            Architecture::Sm83 => "sm83",
            Architecture::Z80 => "z80",
            Architecture::M68000 => "m68000",
            Architecture::Arm7Tdmi => "arm7tdmi",
            Architecture::HuC6280 => "huc6280",
            Architecture::Mos6507 => "6507",
            Architecture::V30Mz => "v30mz",
            Architecture::Spc700 => "spc700",
            Architecture::Wdc65C02 => "65sc02",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        match name.to_ascii_lowercase().as_str() {
            "mos6502" | "6502" => Some(Architecture::Mos6502),
            "wdc65816" | "65816" => Some(Architecture::Wdc65816),
            "sm83" | "gbz80" => Some(Architecture::Sm83),
            "z80" => Some(Architecture::Z80),
            "m68000" | "68000" | "68k" => Some(Architecture::M68000),
            "arm7tdmi" | "arm7" => Some(Architecture::Arm7Tdmi),
            "huc6280" | "6280" => Some(Architecture::HuC6280),
            "6507" | "mos6507" => Some(Architecture::Mos6507),
            "v30mz" | "v30" => Some(Architecture::V30Mz),
            "spc700" => Some(Architecture::Spc700),
            "65sc02" | "65c02" | "wdc65c02" => Some(Architecture::Wdc65C02),
            _ => None,
        }
    }
}

/// Explicit operand-size suffix written on an instruction (`.b`, `.w`,
/// `.l`), or `None` when the architecture/addressing mode determines size
/// on its own.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SizeSuffix {
    Byte,
    Word,
    Long,
}

/// The shape of an operand's addressing, independent of what chip it binds
/// to. A backend's `size`/`encode` implementation interprets the
/// combination of mnemonic + mode (+ flags, for 65816) to pick concrete
/// opcode bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AddressingMode {
    /// No operand at all (`nop`, `rts`).
    Implied,
    /// Operand names a register (`a`, `x`, `r0`, `d0`, ...).
    Register,
    /// `#value`
    Immediate,
    /// `value` — direct/zero-page/short absolute depending on architecture.
    Direct,
    /// `value,x`-style single-index direct addressing.
    DirectIndexedX,
    DirectIndexedY,
    /// `(value)` — absolute indirect.
    Indirect,
    /// `(value,x)` — indexed-then-indirect.
    IndirectIndexedX,
    /// `(value),y` — indirect-then-indexed.
    IndirectIndexedY,
    /// `[value]` — 65816 24-bit long indirect.
    IndirectLong,
    /// `[value],y`
    IndirectLongIndexedY,
    /// Relative branch displacement, computed from the current address.
    Relative,
    /// Full-width absolute/extended address (16-bit on 6502-family, 16/32
    /// on the rest).
    Extended,
    ExtendedIndexedX,
    ExtendedIndexedY,
    /// 65816/HuC6280-style 24-bit long absolute address.
    Long,
    LongIndexedX,
    /// Stack-relative (65816 `value,s`).
    StackRelative,
    StackRelativeIndirectY,
    /// Register-indirect, e.g. Z80 `(hl)`, ARM `[r0]`.
    RegisterIndirect,
    /// Register-indirect with displacement, e.g. Z80 `(ix+d)`, ARM
    /// `[r0, #4]`.
    RegisterIndirectDisplaced,
    /// A bit index operand, as used by SM83/Z80 `bit`/`set`/`res`.
    BitIndex,
    /// Architecture-specific register-pair or block form not otherwise
    /// covered (e.g. SPC700 `(x)+`, ARM register lists); the backend is
    /// expected to recognize the mnemonic/register text itself.
    Special,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOperator {
    Add,
    Sub,
    Mul,
    Div,
    Mod,
    Shl,
    Shr,
    BitAnd,
    BitOr,
    BitXor,
    LogicalAnd,
    LogicalOr,
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnaryOperator {
    Neg,
    Not,
    BitNot,
    /// `<value` — low byte.
    LowByte,
    /// `>value` — high byte.
    HighByte,
    /// `^value` — bank byte (bits 16-23).
    BankByte,
}

/// An expression tree. Evaluation (see `assembler::expr`) returns
/// `Option<i64>`: `None` means "not resolvable yet" (undefined forward
/// reference) rather than a hard error, so pass 1 can still size
/// instructions optimistically and pass 2 can report the real problem if
/// the value never resolves.
#[derive(Debug, Clone, PartialEq)]
pub enum Expression {
    Number(i64),
    StringLiteral(String),
    Identifier(String),
    /// `*` or `$` — the address of the current statement.
    CurrentAddress,
    Binary(BinaryOperator, Box<Expression>, Box<Expression>),
    Unary(UnaryOperator, Box<Expression>),
    /// `.ifdef`/`defined(x)`-style query; evaluates to `1` or `0`, never
    /// `None`, since definedness is always decidable at the point it's
    /// checked.
    Defined(String),
    /// A run of `n` consecutive `+`/`-` characters with nothing else
    /// attached (`forward` is true for `+`): the n-th anonymous label in
    /// that direction from the current address.
    AnonymousLabelRef { forward: bool, count: u32 },
    /// `+name`/`-name`: the nearest named anonymous label in that
    /// direction, scoped to the current non-local label.
    NamedAnonymousLabelRef { forward: bool, name: String },
}

/// A single operand to an instruction: its addressing-mode shape, an
/// optional expression (the displacement/address/immediate value) and an
/// optional register name when the mode binds one.
#[derive(Debug, Clone, PartialEq)]
pub struct Operand {
    pub mode: AddressingMode,
    pub expr: Option<Expression>,
    pub register: Option<String>,
    pub index_register: Option<String>,
}

impl Operand {
    pub fn implied() -> Self {
        Self {
            mode: AddressingMode::Implied,
            expr: None,
            register: None,
            index_register: None,
        }
    }

    pub fn register(name: impl Into<String>) -> Self {
        Self {
            mode: AddressingMode::Register,
            expr: None,
            register: Some(name.into()),
            index_register: None,
        }
    }

    pub fn value(mode: AddressingMode, expr: Expression) -> Self {
        Self {
            mode,
            expr: Some(expr),
            register: None,
            index_register: None,
        }
    }
}

/// A single generic instruction: a mnemonic string (lowercased by the
/// parser), an optional explicit size suffix, and its operands in source
/// order. Architecture backends are responsible for rejecting mnemonics
/// and operand shapes they don't recognize.
#[derive(Debug, Clone, PartialEq)]
pub struct Instruction {
    pub mnemonic: String,
    pub size_suffix: Option<SizeSuffix>,
    pub operands: Vec<Operand>,
}

/// Kinds of label target produced while scanning `LabelDef` statements.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LabelKind {
    /// `name:` — an ordinary global or local label.
    Named,
    /// `+` — an anonymous forward label.
    AnonymousForward,
    /// `-` — an anonymous backward label.
    AnonymousBackward,
    /// `+name:` — a named anonymous forward label, scoped to the current
    /// non-local label.
    NamedAnonymousForward(String),
    /// `-name:` — a named anonymous backward label.
    NamedAnonymousBackward(String),
}

#[derive(Debug, Clone, PartialEq)]
pub struct MacroParameter {
    pub name: String,
    pub default: Option<Expression>,
}

/// A macro's body is stored as raw, unexpanded statements. `assembler::macro_table`
/// clones and rewrites a copy of this on every invocation rather than
/// mutating the definition.
#[derive(Debug, Clone, PartialEq)]
pub struct MacroDefinition {
    pub name: String,
    pub parameters: Vec<MacroParameter>,
    pub body: Vec<Statement>,
    pub location: SourceLocation,
}

#[derive(Debug, Clone, PartialEq)]
pub struct MacroInvocation {
    pub name: String,
    pub arguments: Vec<Expression>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Conditional {
    pub condition: Expression,
    pub then_body: Vec<Statement>,
    /// `.elseif`/`.elifdef` branches in source order, tried in order after
    /// `condition` is falsy.
    pub elseifs: Vec<(Expression, Vec<Statement>)>,
    pub else_body: Vec<Statement>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Repeat {
    pub count: Expression,
    pub body: Vec<Statement>,
}

/// The directive catalog named in the directive table: addressing,
/// constants, raw data, conditionals' cousins (assert/error/warning),
/// file inclusion, and target/platform selection feeding the ROM
/// builders.
#[derive(Debug, Clone, PartialEq)]
pub enum Directive {
    /// `.org expr`
    Org(Expression),
    /// `.equ name, expr` / `name = expr`
    Equ(String, Expression),
    /// `.define name, expr` — like `.equ` but redefinable.
    Define(String, Expression),
    /// `.db expr, expr, ...` (byte data)
    Db(Vec<Expression>),
    /// `.dw expr, expr, ...` (16-bit word data)
    Dw(Vec<Expression>),
    /// `.dl expr, expr, ...` (32-bit long data)
    Dl(Vec<Expression>),
    /// `.ds count[, fill]` — reserve `count` zero/fill bytes.
    Ds(Expression, Option<Expression>),
    /// `.fill count, value` — identical semantics to `.ds` with a mandatory
    /// fill value.
    Fill(Expression, Expression),
    /// `.res count` — reserve space without emitting bytes (BSS-style).
    Res(Expression),
    /// `.target name` — selects the architecture for the rest of the unit.
    Target(String),
    /// `.nes` / `.snes` / `.gb` / ... — selects the ROM builder platform.
    Platform(String),
    /// `.lorom` / `.hirom` / `.exhirom`
    MemoryMap(String),
    /// `.mapper expr`
    Mapper(Expression),
    /// `.assert expr[, message]`
    Assert(Expression, Option<String>),
    /// `.error message`
    Error(String),
    /// `.warning message`
    Warning(String),
    /// `.include path`
    Include(String),
    /// `.incbin path[, start[, length]]`
    Incbin(String, Option<Expression>, Option<Expression>),
}

/// One statement in the program. `MacroDef`/`Conditional`/`Repeat` nest
/// further statements; everything else is a leaf.
#[derive(Debug, Clone, PartialEq)]
pub enum Statement {
    Label {
        name: String,
        kind: LabelKind,
        location: SourceLocation,
    },
    Instruction {
        instruction: Instruction,
        location: SourceLocation,
    },
    Directive {
        directive: Directive,
        location: SourceLocation,
    },
    MacroDef {
        macro_def: MacroDefinition,
        location: SourceLocation,
    },
    MacroInvoke {
        invocation: MacroInvocation,
        location: SourceLocation,
    },
    Conditional {
        conditional: Conditional,
        location: SourceLocation,
    },
    Repeat {
        repeat: Repeat,
        location: SourceLocation,
    },
}

impl Statement {
    pub fn location(&self) -> &SourceLocation {
        match self {
            Statement::Label { location, .. }
            | Statement::Instruction { location, .. }
            | Statement::Directive { location, .. }
            | Statement::MacroDef { location, .. }
            | Statement::MacroInvoke { location, .. }
            | Statement::Conditional { location, .. }
            | Statement::Repeat { location, .. } => location,
        }
    }
}
