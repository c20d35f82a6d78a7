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

//! Macro definitions and hygienic expansion. Two independent invocations
//! of the same macro never collide on a local label name: each expansion
//! gets a fresh, monotonically increasing id folded into any `@`-prefixed
//! name in its body.

use std::collections::{HashMap, HashSet};

use crate::ast::{
    Directive, Expression, Instruction, MacroDefinition, MacroInvocation, Operand, SourceLocation,
    Statement,
};
use crate::errors::{AssemblyError, Diagnostic};

/// Statements produced by a single top-level macro invocation are capped
/// here; a macro that expands without bound (directly or through nested
/// invocations) hits this before the process does.
pub const EXPANSION_LIMIT: usize = 10_000;

pub struct MacroTable {
    macros: HashMap<String, MacroDefinition>,
    next_expansion_id: u64,
    pub diagnostics: Vec<Diagnostic>,
}

impl Default for MacroTable {
    fn default() -> Self {
        Self::new()
    }
}

impl MacroTable {
    pub fn new() -> Self {
        Self {
            macros: HashMap::new(),
            next_expansion_id: 0,
            diagnostics: Vec::new(),
        }
    }

    pub fn get(&self, name: &str) -> Option<&MacroDefinition> {
        self.macros.get(&name.to_ascii_lowercase())
    }

    pub fn is_macro(&self, name: &str) -> bool {
        self.macros.contains_key(&name.to_ascii_lowercase())
    }

    /// `reserved` is the union of every architecture mnemonic and every
    /// directive keyword; a macro cannot shadow either.
    pub fn define(&mut self, macro_def: MacroDefinition, reserved: &HashSet<String>) {
        let key = macro_def.name.to_ascii_lowercase();
        if reserved.contains(&key) {
            self.diagnostics.push(Diagnostic::error(
                macro_def.location.clone(),
                AssemblyError::ReservedWord {
                    name: macro_def.name.clone(),
                },
            ));
            return;
        }
        if self.macros.contains_key(&key) {
            self.diagnostics.push(Diagnostic::error(
                macro_def.location.clone(),
                AssemblyError::DuplicateDefinition {
                    name: macro_def.name.clone(),
                },
            ));
            return;
        }
        let mut seen_params = HashSet::new();
        for param in &macro_def.parameters {
            if !seen_params.insert(param.name.to_ascii_lowercase()) {
                self.diagnostics.push(Diagnostic::error(
                    macro_def.location.clone(),
                    AssemblyError::InvalidParameterDefault {
                        macro_name: macro_def.name.clone(),
                        parameter: param.name.clone(),
                        reason: "duplicate parameter name".to_string(),
                    },
                ));
                return;
            }
        }
        self.macros.insert(key, macro_def);
    }

    /// Expands `invocation` into a fresh statement list. Returns `None`
    /// (with diagnostics recorded) on arity mismatch or an unknown macro;
    /// the caller is expected to have already checked `is_macro`.
    pub fn expand(
        &mut self,
        invocation: &MacroInvocation,
        location: &SourceLocation,
    ) -> Option<Vec<Statement>> {
        let key = invocation.name.to_ascii_lowercase();
        let macro_def = match self.macros.get(&key) {
            Some(m) => m.clone(),
            None => {
                self.diagnostics.push(Diagnostic::error(
                    location.clone(),
                    AssemblyError::UndefinedSymbol {
                        name: invocation.name.clone(),
                    },
                ));
                return None;
            }
        };

        let required = macro_def
            .parameters
            .iter()
            .filter(|p| p.default.is_none())
            .count();
        let total = macro_def.parameters.len();
        if invocation.arguments.len() < required || invocation.arguments.len() > total {
            self.diagnostics.push(Diagnostic::error(
                location.clone(),
                AssemblyError::MacroArity {
                    name: invocation.name.clone(),
                    expected: required,
                    actual: invocation.arguments.len(),
                },
            ));
            return None;
        }

        let mut bindings: HashMap<String, Expression> = HashMap::new();
        for (i, param) in macro_def.parameters.iter().enumerate() {
            let value = match invocation.arguments.get(i) {
                Some(expr) => expr.clone(),
                None => param
                    .default
                    .clone()
                    .expect("arity check above guarantees a default exists here"),
            };
            bindings.insert(param.name.to_ascii_lowercase(), value);
        }

        let expansion_id = self.next_expansion_id;
        self.next_expansion_id += 1;

        let mut budget = EXPANSION_LIMIT;
        let mut expander = Expander {
            macro_name: &macro_def.name,
            expansion_id,
            bindings: &bindings,
        };
        let mut out = Vec::with_capacity(macro_def.body.len());
        for stmt in &macro_def.body {
            if budget == 0 {
                self.diagnostics.push(Diagnostic::error(
                    location.clone(),
                    AssemblyError::ExpansionLimit {
                        name: invocation.name.clone(),
                        limit: EXPANSION_LIMIT,
                    },
                ));
                return None;
            }
            budget -= 1;
            out.push(expander.rewrite_statement(stmt));
        }
        Some(out)
    }
}

struct Expander<'a> {
    macro_name: &'a str,
    expansion_id: u64,
    bindings: &'a HashMap<String, Expression>,
}

impl Expander<'_> {
    /// `@local` inside a macro body becomes
    /// `<macroName>@<local>_<expansionId>`, unique per expansion no matter
    /// how many times the macro is invoked from the same scope.
    fn rewrite_local_label(&self, name: &str) -> String {
        if let Some(bare) = name.strip_prefix('@') {
            format!("{}@{}_{}", self.macro_name, bare, self.expansion_id)
        } else {
            name.to_string()
        }
    }

    fn rewrite_statement(&mut self, stmt: &Statement) -> Statement {
        match stmt {
            Statement::Label {
                name,
                kind,
                location,
            } => Statement::Label {
                name: self.rewrite_local_label(name),
                kind: kind.clone(),
                location: location.clone(),
            },
            Statement::Instruction {
                instruction,
                location,
            } => Statement::Instruction {
                instruction: self.rewrite_instruction(instruction),
                location: location.clone(),
            },
            Statement::Directive {
                directive,
                location,
            } => Statement::Directive {
                directive: self.rewrite_directive(directive),
                location: location.clone(),
            },
            Statement::MacroDef { macro_def, location } => Statement::MacroDef {
                macro_def: macro_def.clone(),
                location: location.clone(),
            },
            Statement::MacroInvoke {
                invocation,
                location,
            } => Statement::MacroInvoke {
                invocation: MacroInvocation {
                    name: invocation.name.clone(),
                    arguments: invocation
                        .arguments
                        .iter()
                        .map(|a| self.rewrite_expr(a))
                        .collect(),
                },
                location: location.clone(),
            },
            Statement::Conditional {
                conditional,
                location,
            } => Statement::Conditional {
                conditional: crate::ast::Conditional {
                    condition: self.rewrite_expr(&conditional.condition),
                    then_body: conditional.then_body.iter().map(|s| self.rewrite_statement(s)).collect(),
                    elseifs: conditional
                        .elseifs
                        .iter()
                        .map(|(cond, body)| {
                            (
                                self.rewrite_expr(cond),
                                body.iter().map(|s| self.rewrite_statement(s)).collect(),
                            )
                        })
                        .collect(),
                    else_body: conditional.else_body.iter().map(|s| self.rewrite_statement(s)).collect(),
                },
                location: location.clone(),
            },
            Statement::Repeat { repeat, location } => Statement::Repeat {
                repeat: crate::ast::Repeat {
                    count: self.rewrite_expr(&repeat.count),
                    body: repeat.body.iter().map(|s| self.rewrite_statement(s)).collect(),
                },
                location: location.clone(),
            },
        }
    }

    fn rewrite_instruction(&self, instruction: &Instruction) -> Instruction {
        Instruction {
            mnemonic: instruction.mnemonic.clone(),
            size_suffix: instruction.size_suffix,
            operands: instruction.operands.iter().map(|op| self.rewrite_operand(op)).collect(),
        }
    }

    fn rewrite_operand(&self, operand: &Operand) -> Operand {
        Operand {
            mode: operand.mode,
            expr: operand.expr.as_ref().map(|e| self.rewrite_expr(e)),
            register: operand.register.clone(),
            index_register: operand.index_register.clone(),
        }
    }

    fn rewrite_directive(&self, directive: &Directive) -> Directive {
        match directive {
            Directive::Org(e) => Directive::Org(self.rewrite_expr(e)),
            Directive::Equ(name, e) => Directive::Equ(name.clone(), self.rewrite_expr(e)),
            Directive::Define(name, e) => Directive::Define(name.clone(), self.rewrite_expr(e)),
            Directive::Db(es) => Directive::Db(es.iter().map(|e| self.rewrite_expr(e)).collect()),
            Directive::Dw(es) => Directive::Dw(es.iter().map(|e| self.rewrite_expr(e)).collect()),
            Directive::Dl(es) => Directive::Dl(es.iter().map(|e| self.rewrite_expr(e)).collect()),
            Directive::Ds(count, fill) => {
                Directive::Ds(self.rewrite_expr(count), fill.as_ref().map(|e| self.rewrite_expr(e)))
            }
            Directive::Fill(count, value) => {
                Directive::Fill(self.rewrite_expr(count), self.rewrite_expr(value))
            }
            Directive::Res(e) => Directive::Res(self.rewrite_expr(e)),
            Directive::Target(name) => Directive::Target(name.clone()),
            Directive::Platform(name) => Directive::Platform(name.clone()),
            Directive::MemoryMap(name) => Directive::MemoryMap(name.clone()),
            Directive::Mapper(e) => Directive::Mapper(self.rewrite_expr(e)),
            Directive::Assert(e, msg) => Directive::Assert(self.rewrite_expr(e), msg.clone()),
            Directive::Error(msg) => Directive::Error(msg.clone()),
            Directive::Warning(msg) => Directive::Warning(msg.clone()),
            Directive::Include(path) => Directive::Include(path.clone()),
            Directive::Incbin(path, start, len) => Directive::Incbin(
                path.clone(),
                start.as_ref().map(|e| self.rewrite_expr(e)),
                len.as_ref().map(|e| self.rewrite_expr(e)),
            ),
        }
    }

    /// Substitutes any `Identifier` that names a parameter with the whole
    /// argument expression tree (not a textual splice), rewrites `@local`
    /// identifiers for hygiene, and recurses through compound expressions.
    fn rewrite_expr(&self, expr: &Expression) -> Expression {
        match expr {
            Expression::Identifier(name) => {
                if let Some(bound) = self.bindings.get(&name.to_ascii_lowercase()) {
                    bound.clone()
                } else if name.starts_with('@') {
                    Expression::Identifier(self.rewrite_local_label(name))
                } else {
                    expr.clone()
                }
            }
            Expression::Unary(op, inner) => {
                Expression::Unary(*op, Box::new(self.rewrite_expr(inner)))
            }
            Expression::Binary(op, lhs, rhs) => Expression::Binary(
                *op,
                Box::new(self.rewrite_expr(lhs)),
                Box::new(self.rewrite_expr(rhs)),
            ),
            Expression::Defined(name) => {
                if let Some(Expression::Identifier(bound_name)) =
                    self.bindings.get(&name.to_ascii_lowercase())
                {
                    Expression::Defined(bound_name.clone())
                } else {
                    expr.clone()
                }
            }
            other => other.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::{LabelKind, MacroParameter};

    fn loc() -> SourceLocation {
        SourceLocation::new(1, 1)
    }

    fn sample_macro() -> MacroDefinition {
        MacroDefinition {
            name: "pair".to_string(),
            parameters: vec![],
            body: vec![
                Statement::Label {
                    name: "@loop".to_string(),
                    kind: LabelKind::Named,
                    location: loc(),
                },
                Statement::Instruction {
                    instruction: Instruction {
                        mnemonic: "jmp".to_string(),
                        size_suffix: None,
                        operands: vec![Operand::value(
                            crate::ast::AddressingMode::Direct,
                            Expression::Identifier("@loop".to_string()),
                        )],
                    },
                    location: loc(),
                },
            ],
            location: loc(),
        }
    }

    #[test]
    fn two_expansions_never_collide_on_local_labels() {
        let mut table = MacroTable::new();
        table.define(sample_macro(), &HashSet::new());
        let invocation = MacroInvocation {
            name: "pair".to_string(),
            arguments: vec![],
        };
        let first = table.expand(&invocation, &loc()).unwrap();
        let second = table.expand(&invocation, &loc()).unwrap();

        let label_name = |stmts: &[Statement]| match &stmts[0] {
            Statement::Label { name, .. } => name.clone(),
            _ => panic!("expected label"),
        };
        assert_ne!(label_name(&first), label_name(&second));
        assert_eq!(label_name(&first), "pair@loop_0");
        assert_eq!(label_name(&second), "pair@loop_1");
    }

    #[test]
    fn arity_mismatch_is_reported() {
        let mut table = MacroTable::new();
        let mut macro_def = sample_macro();
        macro_def.parameters.push(MacroParameter {
            name: "x".to_string(),
            default: None,
        });
        table.define(macro_def, &HashSet::new());
        let invocation = MacroInvocation {
            name: "pair".to_string(),
            arguments: vec![],
        };
        assert!(table.expand(&invocation, &loc()).is_none());
        assert!(matches!(
            table.diagnostics[0].error,
            AssemblyError::MacroArity { .. }
        ));
    }

    #[test]
    fn reserved_word_rejected() {
        let mut table = MacroTable::new();
        let mut reserved = HashSet::new();
        reserved.insert("pair".to_string());
        table.define(sample_macro(), &reserved);
        assert!(table.get("pair").is_none());
        assert!(matches!(
            table.diagnostics[0].error,
            AssemblyError::ReservedWord { .. }
        ));
    }
}
