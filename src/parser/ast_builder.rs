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

use anyhow::{Result, anyhow};
use pest::iterators::Pair;

use super::Rule;
use crate::ast::*;

/// Classifies the literal text of a `binary_op` pair into a typed
/// operator, since the grammar captures the symbol as one flat token.
fn classify_binary_op(text: &str) -> BinaryOperator {
    match text {
        "+" => BinaryOperator::Add,
        "-" => BinaryOperator::Sub,
        "*" => BinaryOperator::Mul,
        "/" => BinaryOperator::Div,
        "%" => BinaryOperator::Mod,
        "<<" => BinaryOperator::Shl,
        ">>" => BinaryOperator::Shr,
        "&" => BinaryOperator::BitAnd,
        "|" => BinaryOperator::BitOr,
        "^" => BinaryOperator::BitXor,
        "&&" => BinaryOperator::LogicalAnd,
        "||" => BinaryOperator::LogicalOr,
        "==" => BinaryOperator::Eq,
        "!=" => BinaryOperator::Ne,
        "<=" => BinaryOperator::Le,
        ">=" => BinaryOperator::Ge,
        "<" => BinaryOperator::Lt,
        ">" => BinaryOperator::Gt,
        other => unreachable!("grammar should never emit binary_op '{other}'"),
    }
}

/// Result of parsing one `directive` pair: either a complete, self-contained
/// directive, or the header/terminator of a multi-line block construct that
/// `parser::parse_source` folds into a nested `Statement`.
#[derive(Debug, Clone, PartialEq)]
pub enum DirectiveLine {
    Plain(Directive),
    MacroHeader {
        name: String,
        params: Vec<MacroParameter>,
    },
    EndMacro,
    If(Expression),
    /// `(name, want_defined)` — `.ifdef` passes `true`, `.ifndef` passes
    /// `false`.
    IfDef(String, bool),
    ElseIf(Expression),
    ElseIfDef(String, bool),
    Else,
    EndIf,
    Repeat(Expression),
    EndRepeat,
}

pub struct AstBuilder {
    pub line_number: usize,
}

impl AstBuilder {
    pub fn new(line_number: usize) -> Self {
        Self { line_number }
    }

    fn location(&self) -> SourceLocation {
        SourceLocation::new(self.line_number, 0)
    }

    pub fn build_expression(&self, pair: Pair<Rule>) -> Result<Expression> {
        self.parse_expr_pratt(pair.into_inner())
    }

    pub fn build_label(&self, pair: Pair<Rule>) -> Result<Statement> {
        let inner = pair
            .into_inner()
            .next()
            .ok_or_else(|| anyhow!("empty label"))?;
        let (name, kind) = match inner.as_rule() {
            Rule::named_label => {
                let ident = inner
                    .into_inner()
                    .next()
                    .ok_or_else(|| anyhow!("named label with no identifier"))?;
                match ident.as_rule() {
                    Rule::named_anon_forward => {
                        let bare = ident.as_str()[1..].to_string();
                        (bare.clone(), LabelKind::NamedAnonymousForward(bare))
                    }
                    Rule::named_anon_backward => {
                        let bare = ident.as_str()[1..].to_string();
                        (bare.clone(), LabelKind::NamedAnonymousBackward(bare))
                    }
                    _ => (ident.as_str().to_string(), LabelKind::Named),
                }
            }
            Rule::anon_forward_label => ("+".to_string(), LabelKind::AnonymousForward),
            Rule::anon_backward_label => ("-".to_string(), LabelKind::AnonymousBackward),
            other => return Err(anyhow!("unexpected label token: {other:?}")),
        };
        Ok(Statement::Label {
            name,
            kind,
            location: self.location(),
        })
    }

    pub fn build_operand(&self, pair: Pair<Rule>) -> Result<Operand> {
        let inner = pair
            .into_inner()
            .next()
            .ok_or_else(|| anyhow!("empty operand"))?;
        match inner.as_rule() {
            Rule::immediate_operand => {
                let expr_pair = inner.into_inner().next().unwrap();
                Ok(Operand::value(AddressingMode::Immediate, self.build_expression(expr_pair)?))
            }
            Rule::indirect_operand => {
                let expr_pair = inner.into_inner().next().unwrap();
                Ok(Operand::value(AddressingMode::Indirect, self.build_expression(expr_pair)?))
            }
            Rule::indirect_indexed_x => {
                let mut parts = inner.into_inner();
                let expr = self.build_expression(parts.next().unwrap())?;
                let reg = parts.next().unwrap().as_str().to_string();
                Ok(Operand {
                    mode: AddressingMode::IndirectIndexedX,
                    expr: Some(expr),
                    register: None,
                    index_register: Some(reg),
                })
            }
            Rule::indirect_indexed_y => {
                let mut parts = inner.into_inner();
                let expr = self.build_expression(parts.next().unwrap())?;
                let reg = parts.next().unwrap().as_str().to_string();
                Ok(Operand {
                    mode: AddressingMode::IndirectIndexedY,
                    expr: Some(expr),
                    register: None,
                    index_register: Some(reg),
                })
            }
            Rule::indirect_long => {
                let expr_pair = inner.into_inner().next().unwrap();
                Ok(Operand::value(AddressingMode::IndirectLong, self.build_expression(expr_pair)?))
            }
            Rule::indirect_long_indexed_y => {
                let mut parts = inner.into_inner();
                let expr = self.build_expression(parts.next().unwrap())?;
                let reg = parts.next().unwrap().as_str().to_string();
                Ok(Operand {
                    mode: AddressingMode::IndirectLongIndexedY,
                    expr: Some(expr),
                    register: None,
                    index_register: Some(reg),
                })
            }
            Rule::register_indirect => {
                let reg = inner.into_inner().next().unwrap().as_str().to_string();
                Ok(Operand {
                    mode: AddressingMode::RegisterIndirect,
                    expr: None,
                    register: Some(reg),
                    index_register: None,
                })
            }
            Rule::register_indirect_displaced => {
                let mut parts = inner.into_inner();
                let reg = parts.next().unwrap().as_str().to_string();
                let expr = self.build_expression(parts.next().unwrap())?;
                Ok(Operand {
                    mode: AddressingMode::RegisterIndirectDisplaced,
                    expr: Some(expr),
                    register: Some(reg),
                    index_register: None,
                })
            }
            Rule::predecrement_operand => {
                let reg = inner.into_inner().next().unwrap().as_str().to_string();
                Ok(Operand {
                    mode: AddressingMode::Special,
                    expr: None,
                    register: Some(format!("-({reg})")),
                    index_register: None,
                })
            }
            Rule::postincrement_operand => {
                let reg = inner.into_inner().next().unwrap().as_str().to_string();
                Ok(Operand {
                    mode: AddressingMode::Special,
                    expr: None,
                    register: Some(format!("({reg})+")),
                    index_register: None,
                })
            }
            Rule::bare_expression => {
                let mut parts = inner.into_inner();
                let expr = self.build_expression(parts.next().unwrap())?;
                if let Some(index) = parts.next() {
                    let reg = index.as_str().to_string();
                    // A bare `value,x` form; whether this is direct or
                    // extended indexing is for the architecture backend to
                    // decide based on operand width, not the parser.
                    return Ok(Operand {
                        mode: AddressingMode::DirectIndexedX,
                        expr: Some(expr),
                        register: None,
                        index_register: Some(reg),
                    });
                }
                // A register name parses as `Expression::Identifier`; the
                // backend distinguishes register operands from direct
                // addresses by checking the identifier against its own
                // register set.
                Ok(Operand {
                    mode: AddressingMode::Direct,
                    expr: Some(expr),
                    register: None,
                    index_register: None,
                })
            }
            other => Err(anyhow!("unexpected operand token: {other:?}")),
        }
    }

    pub fn build_instruction(&self, pair: Pair<Rule>) -> Result<Instruction> {
        let mut inner = pair.into_inner();
        let mnemonic_pair = inner.next().ok_or_else(|| anyhow!("instruction with no mnemonic"))?;
        let full = mnemonic_pair.as_str();
        let (mnemonic, size_suffix) = split_mnemonic(full);
        let mut operands = Vec::new();
        for operand_pair in inner {
            operands.push(self.build_operand(operand_pair)?);
        }
        Ok(Instruction {
            mnemonic,
            size_suffix,
            operands,
        })
    }

    /// Parses a `directive` pair into either a plain, single-line
    /// `Directive` or the header/terminator of a block construct
    /// (`.macro`/`.endmacro`, `.if`/`.ifdef`/`.else`/`.endif`,
    /// `.repeat`/`.endr`). Block constructs are assembled from a flat
    /// stream of these by `parser::parse_source`, since pest's line-scoped
    /// grammar doesn't nest multi-line bodies on its own.
    pub fn build_directive_line(&self, pair: Pair<Rule>) -> Result<DirectiveLine> {
        let inner = pair
            .into_inner()
            .next()
            .ok_or_else(|| anyhow!("empty directive"))?;
        match inner.as_rule() {
            Rule::equ_directive => {
                let mut parts = inner.into_inner();
                let name = parts.next().unwrap().as_str().to_string();
                let expr = self.build_expression(parts.next().unwrap())?;
                Ok(DirectiveLine::Plain(Directive::Equ(name, expr)))
            }
            Rule::dot_directive => self.build_dot_directive(inner),
            other => Err(anyhow!("unexpected directive token: {other:?}")),
        }
    }

    fn build_dot_directive(&self, pair: Pair<Rule>) -> Result<DirectiveLine> {
        let mut parts = pair.into_inner();
        let name_pair = parts.next().ok_or_else(|| anyhow!("directive with no name"))?;
        let name = name_pair.as_str().trim_start_matches('.').to_ascii_lowercase();
        let mut args: Vec<Pair<Rule>> = Vec::new();
        if let Some(args_pair) = parts.next() {
            args.extend(args_pair.into_inner());
        }

        let expr_at = |builder: &Self, idx: usize| -> Result<Expression> {
            let arg = args
                .get(idx)
                .ok_or_else(|| anyhow!(".{name} is missing argument {idx}"))?
                .clone();
            builder.build_directive_expr(arg)
        };
        let string_at = |idx: usize| -> Result<String> {
            let arg = args
                .get(idx)
                .ok_or_else(|| anyhow!(".{name} is missing argument {idx}"))?;
            Ok(directive_arg_string(arg.clone()))
        };

        match name.as_str() {
            "macro" => {
                let macro_name = string_at(0)?;
                let mut params = Vec::new();
                for arg in args.iter().skip(1) {
                    params.push(self.build_macro_parameter(arg.clone())?);
                }
                return Ok(DirectiveLine::MacroHeader {
                    name: macro_name,
                    params,
                });
            }
            "endmacro" | "endm" => return Ok(DirectiveLine::EndMacro),
            "if" => return Ok(DirectiveLine::If(expr_at(self, 0)?)),
            "ifdef" => return Ok(DirectiveLine::IfDef(string_at(0)?, true)),
            "ifndef" => return Ok(DirectiveLine::IfDef(string_at(0)?, false)),
            "elseif" | "elif" => return Ok(DirectiveLine::ElseIf(expr_at(self, 0)?)),
            "elseifdef" | "elifdef" => return Ok(DirectiveLine::ElseIfDef(string_at(0)?, true)),
            "elseifndef" | "elifndef" => return Ok(DirectiveLine::ElseIfDef(string_at(0)?, false)),
            "else" => return Ok(DirectiveLine::Else),
            "endif" => return Ok(DirectiveLine::EndIf),
            "repeat" | "rept" => return Ok(DirectiveLine::Repeat(expr_at(self, 0)?)),
            "endr" | "endrepeat" => return Ok(DirectiveLine::EndRepeat),
            _ => {}
        }

        let directive = match name.as_str() {
            "org" => Ok(Directive::Org(expr_at(self, 0)?)),
            "equ" => {
                let ident = string_at(0)?;
                Ok(Directive::Equ(ident, expr_at(self, 1)?))
            }
            "define" => {
                let ident = string_at(0)?;
                Ok(Directive::Define(ident, expr_at(self, 1)?))
            }
            "db" | "byte" => {
                let mut exprs = Vec::new();
                for idx in 0..args.len() {
                    exprs.push(expr_at(self, idx)?);
                }
                Ok(Directive::Db(exprs))
            }
            "dw" | "word" => {
                let mut exprs = Vec::new();
                for idx in 0..args.len() {
                    exprs.push(expr_at(self, idx)?);
                }
                Ok(Directive::Dw(exprs))
            }
            "dl" | "dd" | "long" => {
                let mut exprs = Vec::new();
                for idx in 0..args.len() {
                    exprs.push(expr_at(self, idx)?);
                }
                Ok(Directive::Dl(exprs))
            }
            "ds" => {
                let count = expr_at(self, 0)?;
                let fill = if args.len() > 1 { Some(expr_at(self, 1)?) } else { None };
                Ok(Directive::Ds(count, fill))
            }
            "fill" => Ok(Directive::Fill(expr_at(self, 0)?, expr_at(self, 1)?)),
            "res" => Ok(Directive::Res(expr_at(self, 0)?)),
            "target" => Ok(Directive::Target(string_at(0)?)),
            "nes" | "snes" | "gb" | "genesis" | "gba" | "sms" | "tg16" | "atari2600" | "lynx"
            | "wonderswan" | "spc700" => Ok(Directive::Platform(name)),
            "lorom" | "hirom" | "exhirom" => Ok(Directive::MemoryMap(name)),
            "mapper" => Ok(Directive::Mapper(expr_at(self, 0)?)),
            "assert" => {
                let condition = expr_at(self, 0)?;
                let message = if args.len() > 1 { Some(string_at(1)?) } else { None };
                Ok(Directive::Assert(condition, message))
            }
            "error" => Ok(Directive::Error(string_at(0)?)),
            "warning" => Ok(Directive::Warning(string_at(0)?)),
            "include" => Ok(Directive::Include(string_at(0)?)),
            "incbin" => {
                let path = string_at(0)?;
                let start = if args.len() > 1 { Some(expr_at(self, 1)?) } else { None };
                let length = if args.len() > 2 { Some(expr_at(self, 2)?) } else { None };
                Ok(Directive::Incbin(path, start, length))
            }
            other => Err(anyhow!("unknown directive '.{other}'")),
        }?;
        Ok(DirectiveLine::Plain(directive))
    }

    fn build_macro_parameter(&self, arg: Pair<Rule>) -> Result<MacroParameter> {
        let inner = match arg.as_rule() {
            Rule::directive_arg => arg.into_inner().next().unwrap(),
            _ => arg,
        };
        match inner.as_rule() {
            Rule::param_assign => {
                let mut parts = inner.into_inner();
                let name = parts.next().unwrap().as_str().to_string();
                let default = self.build_expression(parts.next().unwrap())?;
                Ok(MacroParameter {
                    name,
                    default: Some(default),
                })
            }
            Rule::expression => Ok(MacroParameter {
                name: inner.as_str().to_string(),
                default: None,
            }),
            other => Err(anyhow!("unexpected macro parameter token: {other:?}")),
        }
    }

    fn build_directive_expr(&self, arg: Pair<Rule>) -> Result<Expression> {
        match arg.as_rule() {
            Rule::directive_arg => {
                let inner = arg.into_inner().next().unwrap();
                self.build_directive_expr(inner)
            }
            Rule::string_literal => Ok(Expression::StringLiteral(unquote(arg.as_str()))),
            Rule::expression => self.build_expression(arg),
            other => Err(anyhow!("unexpected directive argument token: {other:?}")),
        }
    }

    fn parse_expr_pratt(&self, pairs: pest::iterators::Pairs<Rule>) -> Result<Expression> {
        self.fold_binary(pairs)
    }

    /// Manual precedence climbing over the flat `unary_expr (binary_op
    /// unary_expr)*` pair stream the grammar produces.
    fn fold_binary(&self, pairs: pest::iterators::Pairs<Rule>) -> Result<Expression> {
        let items: Vec<Pair<Rule>> = pairs.collect();
        if items.is_empty() {
            return Err(anyhow!("empty expression"));
        }
        let mut operands = Vec::new();
        let mut operators = Vec::new();
        for item in items {
            match item.as_rule() {
                Rule::unary_expr => operands.push(self.build_unary(item)?),
                Rule::binary_op => operators.push(classify_binary_op(item.as_str())),
                other => return Err(anyhow!("unexpected token in expression: {other:?}")),
            }
        }
        Ok(climb(&operands, &operators, 0, operands.len() - 1, 0).0)
    }

    fn build_unary(&self, pair: Pair<Rule>) -> Result<Expression> {
        let mut inner = pair.into_inner();
        let first = inner
            .next()
            .ok_or_else(|| anyhow!("empty unary expression"))?;
        match first.as_rule() {
            Rule::unary_op => {
                let op = match first.as_str() {
                    "-" => UnaryOperator::Neg,
                    "!" => UnaryOperator::Not,
                    "~" => UnaryOperator::BitNot,
                    "<" => UnaryOperator::LowByte,
                    ">" => UnaryOperator::HighByte,
                    "^" => UnaryOperator::BankByte,
                    other => return Err(anyhow!("unknown unary operator '{other}'")),
                };
                let operand_pair = inner
                    .next()
                    .ok_or_else(|| anyhow!("unary operator with no operand"))?;
                Ok(Expression::Unary(op, Box::new(self.build_unary(operand_pair)?)))
            }
            Rule::primary_expr => self.build_primary(first),
            other => Err(anyhow!("unexpected token in unary expression: {other:?}")),
        }
    }

    fn build_anonymous_ref(&self, pair: Pair<Rule>) -> Result<Expression> {
        let inner = pair
            .into_inner()
            .next()
            .ok_or_else(|| anyhow!("empty anonymous reference"))?;
        match inner.as_rule() {
            Rule::named_anonymous_ref => {
                let text = inner.as_str();
                let forward = text.starts_with('+');
                Ok(Expression::NamedAnonymousLabelRef {
                    forward,
                    name: text[1..].to_string(),
                })
            }
            Rule::counted_anonymous_ref => {
                let text = inner.as_str();
                let forward = text.starts_with('+');
                Ok(Expression::AnonymousLabelRef {
                    forward,
                    count: text.len() as u32,
                })
            }
            other => Err(anyhow!("unexpected anonymous reference token: {other:?}")),
        }
    }

    fn build_primary(&self, pair: Pair<Rule>) -> Result<Expression> {
        let inner = pair
            .into_inner()
            .next()
            .ok_or_else(|| anyhow!("empty primary expression"))?;
        match inner.as_rule() {
            Rule::defined_expr => {
                let name = inner
                    .into_inner()
                    .next()
                    .ok_or_else(|| anyhow!("defined() with no identifier"))?
                    .as_str()
                    .to_string();
                Ok(Expression::Defined(name))
            }
            Rule::current_address => Ok(Expression::CurrentAddress),
            Rule::anonymous_ref => self.build_anonymous_ref(inner),
            Rule::number_literal => Ok(Expression::Number(parse_number(inner.as_str())?)),
            Rule::string_literal => Ok(Expression::StringLiteral(unquote(inner.as_str()))),
            Rule::local_identifier | Rule::identifier => {
                Ok(Expression::Identifier(inner.as_str().to_string()))
            }
            Rule::expression => self.build_expression(inner),
            other => Err(anyhow!("unexpected primary expression token: {other:?}")),
        }
    }
}

fn split_mnemonic(full: &str) -> (String, Option<SizeSuffix>) {
    if let Some((base, suffix)) = full.split_once('.') {
        let size = match suffix.to_ascii_lowercase().as_str() {
            "b" => Some(SizeSuffix::Byte),
            "w" => Some(SizeSuffix::Word),
            "l" => Some(SizeSuffix::Long),
            _ => None,
        };
        (base.to_ascii_lowercase(), size)
    } else {
        (full.to_ascii_lowercase(), None)
    }
}

fn directive_arg_string(arg: Pair<Rule>) -> String {
    match arg.as_rule() {
        Rule::directive_arg => arg
            .into_inner()
            .next()
            .map(directive_arg_string)
            .unwrap_or_default(),
        Rule::string_literal => unquote(arg.as_str()),
        _ => arg.as_str().to_string(),
    }
}

/// Precedence-climbing fold over a flat list of already-built operands and
/// the operators between them. Returns the built expression and the index
/// of the last operand consumed.
fn climb(
    operands: &[Expression],
    operators: &[BinaryOperator],
    mut idx: usize,
    max_idx: usize,
    min_prec: u8,
) -> (Expression, usize) {
    let mut left = operands[idx].clone();
    while idx < max_idx {
        let op = operators[idx];
        let prec = precedence(op);
        if prec < min_prec {
            break;
        }
        let (right, new_idx) = climb(operands, operators, idx + 1, max_idx, prec + 1);
        left = Expression::Binary(op, Box::new(left), Box::new(right));
        idx = new_idx;
    }
    (left, idx)
}

fn precedence(op: BinaryOperator) -> u8 {
    use BinaryOperator::*;
    match op {
        LogicalOr => 1,
        LogicalAnd => 2,
        Eq | Ne | Lt | Le | Gt | Ge => 3,
        BitOr => 4,
        BitXor => 5,
        BitAnd => 6,
        Shl | Shr => 7,
        Add | Sub => 8,
        Mul | Div | Mod => 9,
    }
}

pub fn parse_number(text: &str) -> Result<i64> {
    if let Some(hex) = text.strip_prefix("0x").or_else(|| text.strip_prefix("0X")) {
        return i64::from_str_radix(hex, 16).map_err(|e| anyhow!("invalid hex literal: {e}"));
    }
    if let Some(hex) = text.strip_prefix('$') {
        return i64::from_str_radix(hex, 16).map_err(|e| anyhow!("invalid hex literal: {e}"));
    }
    if let Some(bin) = text.strip_prefix("0b").or_else(|| text.strip_prefix("0B")) {
        return i64::from_str_radix(bin, 2).map_err(|e| anyhow!("invalid binary literal: {e}"));
    }
    if let Some(bin) = text.strip_prefix('%') {
        return i64::from_str_radix(bin, 2).map_err(|e| anyhow!("invalid binary literal: {e}"));
    }
    if let Some(oct) = text.strip_prefix("0o").or_else(|| text.strip_prefix("0O")) {
        return i64::from_str_radix(oct, 8).map_err(|e| anyhow!("invalid octal literal: {e}"));
    }
    text.parse::<i64>()
        .map_err(|e| anyhow!("invalid decimal literal '{text}': {e}"))
}

fn unquote(text: &str) -> String {
    text.trim_matches('"').to_string()
}
