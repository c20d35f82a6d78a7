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

mod ast_builder;

use anyhow::{Result, anyhow};
use ast_builder::{AstBuilder, DirectiveLine};
use pest::Parser;
use pest::iterators::Pair;
use pest_derive::Parser;

use crate::ast::*;

#[derive(Parser)]
#[grammar = "./grammar.pest"]
pub struct AsmParser;

/// One open block on the parser's nesting stack while folding the flat
/// per-line directive stream into a tree.
enum OpenBlock {
    Macro {
        name: String,
        params: Vec<MacroParameter>,
        location: SourceLocation,
        body: Vec<Statement>,
    },
    Conditional {
        location: SourceLocation,
        /// Completed branches (the original `.if` and any closed
        /// `.elseif`s), in source order.
        branches: Vec<(Expression, Vec<Statement>)>,
        /// The condition and body currently being filled — either the
        /// `.if`'s or the most recent open `.elseif`'s.
        current_condition: Expression,
        current_body: Vec<Statement>,
        else_body: Vec<Statement>,
        in_else: bool,
    },
    Repeat {
        count: Expression,
        location: SourceLocation,
        body: Vec<Statement>,
    },
}

impl OpenBlock {
    fn push(&mut self, statement: Statement) {
        match self {
            OpenBlock::Macro { body, .. } => body.push(statement),
            OpenBlock::Conditional {
                current_body,
                else_body,
                in_else,
                ..
            } => {
                if *in_else {
                    else_body.push(statement);
                } else {
                    current_body.push(statement);
                }
            }
            OpenBlock::Repeat { body, .. } => body.push(statement),
        }
    }

    fn close(self) -> Statement {
        match self {
            OpenBlock::Macro {
                name,
                params,
                location,
                body,
            } => Statement::MacroDef {
                macro_def: MacroDefinition {
                    name,
                    parameters: params,
                    body,
                    location: location.clone(),
                },
                location,
            },
            OpenBlock::Conditional {
                location,
                mut branches,
                current_condition,
                current_body,
                else_body,
                in_else,
            } => {
                if !in_else {
                    branches.push((current_condition, current_body));
                }
                let mut iter = branches.into_iter();
                let (condition, then_body) = iter
                    .next()
                    .expect("a conditional block always has at least its .if branch");
                Statement::Conditional {
                    conditional: Conditional {
                        condition,
                        then_body,
                        elseifs: iter.collect(),
                        else_body,
                    },
                    location,
                }
            }
            OpenBlock::Repeat {
                count,
                location,
                body,
            } => Statement::Repeat {
                repeat: Repeat { count, body },
                location,
            },
        }
    }
}

/// Parses a full translation unit's source text (after preprocessing) into
/// a flat top-level statement list, with `.macro`/`.if`/`.repeat` blocks
/// folded into their nested `Statement` forms.
pub fn parse_source(source: &str) -> Result<Vec<Statement>> {
    let pairs = AsmParser::parse(Rule::program, source)?;
    let mut stack: Vec<OpenBlock> = Vec::new();
    let mut top_level: Vec<Statement> = Vec::new();

    for line_pair in pairs.flatten().filter(|p| p.as_rule() == Rule::line_content) {
        let line_number = line_pair.as_span().start_pos().line_col().0;
        let builder = AstBuilder::new(line_number);
        let mut inner = line_pair.into_inner().peekable();

        let mut label_statement = None;
        if let Some(pair) = inner.peek() {
            if pair.as_rule() == Rule::label {
                let pair = inner.next().unwrap();
                label_statement = Some(builder.build_label(pair)?);
            }
        }

        if let Some(statement) = label_statement {
            emit(&mut stack, &mut top_level, statement);
        }

        if let Some(pair) = inner.next() {
            emit_body(&builder, pair, line_number, &mut stack, &mut top_level)?;
        }
    }

    if !stack.is_empty() {
        return Err(anyhow!(
            "unterminated block: {} block(s) still open at end of file",
            stack.len()
        ));
    }

    Ok(top_level)
}

fn emit_body(
    builder: &AstBuilder,
    pair: Pair<Rule>,
    line_number: usize,
    stack: &mut Vec<OpenBlock>,
    top_level: &mut Vec<Statement>,
) -> Result<()> {
    let location = SourceLocation::new(line_number, 0);
    match pair.as_rule() {
        Rule::instruction => {
            let instruction = builder.build_instruction(pair)?;
            emit(
                stack,
                top_level,
                Statement::Instruction {
                    instruction,
                    location,
                },
            );
        }
        Rule::directive => {
            let directive_line = builder.build_directive_line(pair)?;
            apply_directive_line(directive_line, location, stack, top_level)?;
        }
        other => return Err(anyhow!("unexpected top-level token: {other:?}")),
    }
    Ok(())
}

fn apply_directive_line(
    line: DirectiveLine,
    location: SourceLocation,
    stack: &mut Vec<OpenBlock>,
    top_level: &mut Vec<Statement>,
) -> Result<()> {
    match line {
        DirectiveLine::Plain(directive) => {
            emit(stack, top_level, Statement::Directive { directive, location });
        }
        DirectiveLine::MacroHeader { name, params } => {
            stack.push(OpenBlock::Macro {
                name,
                params,
                location,
                body: Vec::new(),
            });
        }
        DirectiveLine::EndMacro => {
            close_top(stack, top_level, "endmacro", |b| matches!(b, OpenBlock::Macro { .. }))?;
        }
        DirectiveLine::If(condition) => {
            stack.push(OpenBlock::Conditional {
                location,
                branches: Vec::new(),
                current_condition: condition,
                current_body: Vec::new(),
                else_body: Vec::new(),
                in_else: false,
            });
        }
        DirectiveLine::IfDef(name, want_defined) => {
            stack.push(OpenBlock::Conditional {
                location,
                branches: Vec::new(),
                current_condition: ifdef_condition(name, want_defined),
                current_body: Vec::new(),
                else_body: Vec::new(),
                in_else: false,
            });
        }
        DirectiveLine::ElseIf(condition) => {
            open_elseif(stack, condition)?;
        }
        DirectiveLine::ElseIfDef(name, want_defined) => {
            open_elseif(stack, ifdef_condition(name, want_defined))?;
        }
        DirectiveLine::Else => {
            let top = stack
                .last_mut()
                .ok_or_else(|| anyhow!(".else with no matching .if"))?;
            match top {
                OpenBlock::Conditional {
                    branches,
                    current_condition,
                    current_body,
                    in_else,
                    ..
                } => {
                    branches.push((current_condition.clone(), std::mem::take(current_body)));
                    *in_else = true;
                }
                _ => return Err(anyhow!(".else with no matching .if")),
            }
        }
        DirectiveLine::EndIf => {
            close_top(stack, top_level, "endif", |b| matches!(b, OpenBlock::Conditional { .. }))?;
        }
        DirectiveLine::Repeat(count) => {
            stack.push(OpenBlock::Repeat {
                count,
                location,
                body: Vec::new(),
            });
        }
        DirectiveLine::EndRepeat => {
            close_top(stack, top_level, "endr", |b| matches!(b, OpenBlock::Repeat { .. }))?;
        }
    }
    Ok(())
}

fn ifdef_condition(name: String, want_defined: bool) -> Expression {
    let defined = Expression::Defined(name);
    if want_defined {
        defined
    } else {
        Expression::Unary(UnaryOperator::Not, Box::new(defined))
    }
}

fn open_elseif(stack: &mut [OpenBlock], condition: Expression) -> Result<()> {
    let top = stack
        .last_mut()
        .ok_or_else(|| anyhow!(".elseif with no matching .if"))?;
    match top {
        OpenBlock::Conditional {
            branches,
            current_condition,
            current_body,
            in_else,
            ..
        } => {
            if *in_else {
                return Err(anyhow!(".elseif cannot follow .else"));
            }
            branches.push((
                std::mem::replace(current_condition, condition),
                std::mem::take(current_body),
            ));
            Ok(())
        }
        _ => Err(anyhow!(".elseif with no matching .if")),
    }
}

fn emit(stack: &mut [OpenBlock], top_level: &mut Vec<Statement>, statement: Statement) {
    match stack.last_mut() {
        Some(block) => block.push(statement),
        None => top_level.push(statement),
    }
}

fn close_top(
    stack: &mut Vec<OpenBlock>,
    top_level: &mut Vec<Statement>,
    closing_directive: &str,
    matches_kind: impl Fn(&OpenBlock) -> bool,
) -> Result<()> {
    let top = stack
        .pop()
        .ok_or_else(|| anyhow!("'.{closing_directive}' with no matching opening block"))?;
    if !matches_kind(&top) {
        return Err(anyhow!(
            "'.{closing_directive}' does not match the innermost open block"
        ));
    }
    let statement = top.close();
    emit(stack, top_level, statement);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_label_and_instruction() {
        let source = "start:\n  lda #1\n";
        let statements = parse_source(source).unwrap();
        assert_eq!(statements.len(), 2);
        assert!(matches!(statements[0], Statement::Label { .. }));
        assert!(matches!(statements[1], Statement::Instruction { .. }));
    }

    #[test]
    fn parses_equ_both_syntaxes() {
        let statements = parse_source("FOO = 5\n.equ BAR, 6\n").unwrap();
        assert_eq!(statements.len(), 2);
        match &statements[0] {
            Statement::Directive {
                directive: Directive::Equ(name, Expression::Number(5)),
                ..
            } => assert_eq!(name, "FOO"),
            other => panic!("unexpected statement: {other:?}"),
        }
    }

    #[test]
    fn parses_macro_block() {
        let source = ".macro square, x\n  lda #x\n.endmacro\n";
        let statements = parse_source(source).unwrap();
        assert_eq!(statements.len(), 1);
        match &statements[0] {
            Statement::MacroDef { macro_def, .. } => {
                assert_eq!(macro_def.name, "square");
                assert_eq!(macro_def.parameters.len(), 1);
                assert_eq!(macro_def.body.len(), 1);
            }
            other => panic!("expected macro def, got {other:?}"),
        }
    }

    #[test]
    fn parses_anonymous_labels_and_branches() {
        let source = "-\n  nop\njmp -\n+\n  nop\njmp +\n";
        let statements = parse_source(source).unwrap();
        assert_eq!(statements.len(), 6);
        assert!(matches!(
            &statements[0],
            Statement::Label {
                kind: LabelKind::AnonymousBackward,
                ..
            }
        ));
        assert!(matches!(
            &statements[3],
            Statement::Label {
                kind: LabelKind::AnonymousForward,
                ..
            }
        ));
    }

    #[test]
    fn rejects_unterminated_macro() {
        let source = ".macro foo\n  nop\n";
        assert!(parse_source(source).is_err());
    }

    #[test]
    fn parses_conditional_with_else() {
        let source = ".ifdef FOO\n  nop\n.else\n  halt\n.endif\n";
        let statements = parse_source(source).unwrap();
        assert_eq!(statements.len(), 1);
        match &statements[0] {
            Statement::Conditional { conditional, .. } => {
                assert_eq!(conditional.then_body.len(), 1);
                assert_eq!(conditional.else_body.len(), 1);
            }
            other => panic!("expected conditional, got {other:?}"),
        }
    }
}
