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

//! The scoped, case-insensitive symbol table: the arena of [`Symbol`]s plus
//! the local-label scoping and anonymous-label resolution rules. AST nodes
//! and diagnostics refer to symbols by [`SymbolId`] rather than by owning
//! pointer, so clearing anonymous-label state between passes never
//! entangles with anything else holding a reference.

use std::collections::HashMap;

use crate::ast::SourceLocation;
use crate::errors::{AssemblyError, Diagnostic};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SymbolId(usize);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SymbolKind {
    Label,
    Constant,
    Macro,
    External,
}

#[derive(Debug, Clone)]
pub struct Symbol {
    /// Original-case spelling, for display and diagnostics.
    pub name: String,
    pub kind: SymbolKind,
    pub value: Option<i64>,
    pub defined: bool,
    pub def_location: Option<SourceLocation>,
    pub references: Vec<SourceLocation>,
    pub parent_scope: Option<String>,
    pub exported: bool,
}

#[derive(Default)]
struct AnonEntry {
    forward: Vec<(i64, SourceLocation)>,
    backward: Vec<(i64, SourceLocation)>,
}

pub struct SymbolTable {
    symbols: Vec<Symbol>,
    by_qualified_name: HashMap<String, SymbolId>,
    anon_forward: Vec<(i64, SourceLocation)>,
    anon_backward: Vec<(i64, SourceLocation)>,
    /// Keyed by `(scope.unwrap_or_default().to_lowercase(), name.to_lowercase())`.
    named_anon: HashMap<(String, String), AnonEntry>,
    current_scope: Option<String>,
    pub diagnostics: Vec<Diagnostic>,
}

impl Default for SymbolTable {
    fn default() -> Self {
        Self::new()
    }
}

impl SymbolTable {
    pub fn new() -> Self {
        Self {
            symbols: Vec::new(),
            by_qualified_name: HashMap::new(),
            anon_forward: Vec::new(),
            anon_backward: Vec::new(),
            named_anon: HashMap::new(),
            current_scope: None,
            diagnostics: Vec::new(),
        }
    }

    pub fn get(&self, id: SymbolId) -> &Symbol {
        &self.symbols[id.0]
    }

    pub fn current_scope(&self) -> Option<&str> {
        self.current_scope.as_deref()
    }

    /// `<currentScope><local>` for names starting with `.`/`@`; the bare
    /// name otherwise (including when there is no enclosing scope yet).
    pub fn qualify(&self, name: &str) -> String {
        if name.starts_with('.') || name.starts_with('@') {
            match &self.current_scope {
                Some(scope) => format!("{scope}{name}"),
                None => name.to_string(),
            }
        } else {
            name.to_string()
        }
    }

    fn key(name: &str) -> String {
        name.to_ascii_lowercase()
    }

    fn is_local(name: &str) -> bool {
        name.starts_with('.') || name.starts_with('@')
    }

    pub fn define(
        &mut self,
        name: &str,
        kind: SymbolKind,
        value: Option<i64>,
        location: SourceLocation,
    ) -> SymbolId {
        let qualified = self.qualify(name);
        let key = Self::key(&qualified);

        if let Some(&id) = self.by_qualified_name.get(&key) {
            let existing = &mut self.symbols[id.0];
            if existing.defined {
                self.diagnostics.push(Diagnostic::error(
                    location,
                    AssemblyError::DuplicateDefinition {
                        name: qualified.clone(),
                    },
                ));
                if !Self::is_local(name) {
                    self.current_scope = Some(qualified);
                }
                return id;
            }
            existing.kind = kind;
            existing.value = value;
            existing.defined = true;
            existing.def_location = Some(location);
            if !Self::is_local(name) {
                self.current_scope = Some(qualified);
            }
            return id;
        }

        let parent_scope = if Self::is_local(name) {
            self.current_scope.clone()
        } else {
            None
        };
        let id = SymbolId(self.symbols.len());
        self.symbols.push(Symbol {
            name: qualified.clone(),
            kind,
            value,
            defined: true,
            def_location: Some(location),
            references: Vec::new(),
            parent_scope,
            exported: false,
        });
        self.by_qualified_name.insert(key, id);
        if !Self::is_local(name) {
            self.current_scope = Some(qualified);
        }
        id
    }

    /// Returns the symbol for `name` without forcing scope tracking to
    /// change, creating an undefined placeholder if this is the first
    /// mention. Used for expression identifiers, which must never
    /// themselves become the enclosing scope.
    pub fn reference(&mut self, name: &str, location: SourceLocation) -> SymbolId {
        let qualified = self.qualify(name);
        let key = Self::key(&qualified);

        if let Some(&id) = self.by_qualified_name.get(&key) {
            self.symbols[id.0].references.push(location);
            return id;
        }

        let parent_scope = if Self::is_local(name) {
            self.current_scope.clone()
        } else {
            None
        };
        let id = SymbolId(self.symbols.len());
        self.symbols.push(Symbol {
            name: qualified,
            kind: SymbolKind::Label,
            value: None,
            defined: false,
            def_location: None,
            references: vec![location],
            parent_scope,
            exported: false,
        });
        self.by_qualified_name.insert(key, id);
        id
    }

    pub fn lookup(&self, name: &str) -> Option<SymbolId> {
        let qualified = self.qualify(name);
        self.by_qualified_name.get(&Self::key(&qualified)).copied()
    }

    pub fn value_of(&self, name: &str) -> Option<i64> {
        self.lookup(name).and_then(|id| self.symbols[id.0].value)
    }

    /// Called once, after the analyzer's final pass: every symbol that was
    /// only ever referenced, never defined, is an error naming the first
    /// reference site.
    pub fn validate_all_defined(&mut self) {
        for symbol in &self.symbols {
            if !symbol.defined {
                let location = symbol
                    .references
                    .first()
                    .cloned()
                    .unwrap_or_default();
                self.diagnostics.push(Diagnostic::error(
                    location,
                    AssemblyError::UndefinedSymbol {
                        name: symbol.name.clone(),
                    },
                ));
            }
        }
    }

    pub fn define_anonymous_label(
        &mut self,
        forward: bool,
        address: i64,
        location: SourceLocation,
    ) {
        if forward {
            self.anon_forward.push((address, location));
        } else {
            self.anon_backward.push((address, location));
        }
    }

    /// `count` is 1-based: `+` is `count == 1`, `++` is `count == 2`, etc.
    pub fn resolve_anonymous_label(
        &mut self,
        forward: bool,
        count: u32,
        current_address: i64,
        location: SourceLocation,
    ) -> Option<i64> {
        let list = if forward {
            &self.anon_forward
        } else {
            &self.anon_backward
        };
        let mut candidates: Vec<i64> = if forward {
            list.iter()
                .filter(|(addr, _)| *addr > current_address)
                .map(|(addr, _)| *addr)
                .collect()
        } else {
            list.iter()
                .filter(|(addr, _)| *addr <= current_address)
                .map(|(addr, _)| *addr)
                .collect()
        };
        if forward {
            candidates.sort_unstable();
        } else {
            candidates.sort_unstable_by(|a, b| b.cmp(a));
        }
        match candidates.get((count.max(1) - 1) as usize) {
            Some(value) => Some(*value),
            None => {
                self.diagnostics.push(Diagnostic::error(
                    location,
                    AssemblyError::CannotFindAnonymousLabel {
                        direction: if forward { "+".repeat(count.max(1) as usize) } else { "-".repeat(count.max(1) as usize) },
                    },
                ));
                None
            }
        }
    }

    pub fn define_named_anonymous_label(
        &mut self,
        forward: bool,
        name: &str,
        address: i64,
        location: SourceLocation,
    ) {
        let scope = self.current_scope.clone().unwrap_or_default();
        let entry = self
            .named_anon
            .entry((Self::key(&scope), Self::key(name)))
            .or_default();
        if forward {
            entry.forward.push((address, location));
        } else {
            entry.backward.push((address, location));
        }
    }

    pub fn resolve_named_anonymous_label(
        &mut self,
        forward: bool,
        name: &str,
        current_address: i64,
        location: SourceLocation,
    ) -> Option<i64> {
        let scope = self.current_scope.clone().unwrap_or_default();
        let key = (Self::key(&scope), Self::key(name));
        let candidates: Vec<i64> = match self.named_anon.get(&key) {
            Some(entry) => {
                if forward {
                    let mut v: Vec<i64> = entry
                        .forward
                        .iter()
                        .filter(|(addr, _)| *addr > current_address)
                        .map(|(addr, _)| *addr)
                        .collect();
                    v.sort_unstable();
                    v
                } else {
                    let mut v: Vec<i64> = entry
                        .backward
                        .iter()
                        .filter(|(addr, _)| *addr <= current_address)
                        .map(|(addr, _)| *addr)
                        .collect();
                    v.sort_unstable_by(|a, b| b.cmp(a));
                    v
                }
            }
            None => Vec::new(),
        };
        match candidates.first() {
            Some(value) => Some(*value),
            None => {
                self.diagnostics.push(Diagnostic::error(
                    location,
                    AssemblyError::CannotFindAnonymousLabel {
                        direction: format!("{}{name}", if forward { "+" } else { "-" }),
                    },
                ));
                None
            }
        }
    }

    /// Like [`define`](Self::define), but used by pass 2 re-visiting a
    /// label pass 1 already placed: if the qualified name already carries
    /// the same value, this is a no-op (no duplicate-definition error) since
    /// both passes walked the same statement and agree; a differing value
    /// means the two passes' address trajectories diverged (only possible
    /// for a conditional/repeat whose own condition forward-references a
    /// label pass 1 couldn't yet resolve) and is reported as such.
    pub fn define_or_confirm(
        &mut self,
        name: &str,
        kind: SymbolKind,
        value: Option<i64>,
        location: SourceLocation,
    ) -> SymbolId {
        let qualified = self.qualify(name);
        let key = Self::key(&qualified);
        if let Some(&id) = self.by_qualified_name.get(&key) {
            let existing = &self.symbols[id.0];
            if existing.defined && existing.value == value {
                if !Self::is_local(name) {
                    self.current_scope = Some(qualified);
                }
                return id;
            }
        }
        self.define(name, kind, value, location)
    }

    /// Invoked between pass 1 and pass 2 so the second pass rebuilds
    /// anonymous-label addresses from scratch rather than seeing pass 1's
    /// provisional ones.
    pub fn clear_anonymous_labels(&mut self) {
        self.anon_forward.clear();
        self.anon_backward.clear();
        self.named_anon.clear();
    }

    pub fn reset_scope(&mut self) {
        self.current_scope = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn loc() -> SourceLocation {
        SourceLocation::new(1, 1)
    }

    #[test]
    fn case_insensitive_lookup_preserves_display_case() {
        let mut table = SymbolTable::new();
        table.define("Start", SymbolKind::Label, Some(0x100), loc());
        assert_eq!(table.value_of("START"), Some(0x100));
        let id = table.lookup("start").unwrap();
        assert_eq!(table.get(id).name, "Start");
    }

    #[test]
    fn duplicate_definition_keeps_first_value() {
        let mut table = SymbolTable::new();
        table.define("FOO", SymbolKind::Constant, Some(1), loc());
        table.define("FOO", SymbolKind::Constant, Some(2), loc());
        assert_eq!(table.value_of("FOO"), Some(1));
        assert_eq!(table.diagnostics.len(), 1);
        assert!(matches!(
            table.diagnostics[0].error,
            AssemblyError::DuplicateDefinition { .. }
        ));
    }

    #[test]
    fn forward_reference_resolves_after_definition() {
        let mut table = SymbolTable::new();
        let id = table.reference("target", loc());
        assert!(!table.get(id).defined);
        table.define("target", SymbolKind::Label, Some(42), loc());
        assert_eq!(table.value_of("target"), Some(42));
    }

    #[test]
    fn local_label_is_scoped_to_enclosing_global() {
        let mut table = SymbolTable::new();
        table.define("loop_a", SymbolKind::Label, Some(0), loc());
        table.define(".inner", SymbolKind::Label, Some(1), loc());
        table.define("loop_b", SymbolKind::Label, Some(2), loc());
        table.define(".inner", SymbolKind::Label, Some(3), loc());

        assert_eq!(table.qualify(".inner"), "loop_b.inner");
        // The first .inner is independently addressable via its own scope.
        let first = table.lookup("loop_a.inner").unwrap();
        assert_eq!(table.get(first).value, Some(1));
        let second = table.lookup("loop_b.inner").unwrap();
        assert_eq!(table.get(second).value, Some(3));
    }

    #[test]
    fn anonymous_forward_resolves_strictly_after_current_address() {
        let mut table = SymbolTable::new();
        table.define_anonymous_label(true, 10, loc());
        table.define_anonymous_label(true, 20, loc());
        assert_eq!(table.resolve_anonymous_label(true, 1, 10, loc()), Some(20));
        assert_eq!(table.resolve_anonymous_label(true, 1, 5, loc()), Some(10));
    }

    #[test]
    fn anonymous_backward_resolves_at_or_before_current_address() {
        let mut table = SymbolTable::new();
        table.define_anonymous_label(false, 10, loc());
        table.define_anonymous_label(false, 20, loc());
        assert_eq!(table.resolve_anonymous_label(false, 1, 20, loc()), Some(20));
        assert_eq!(table.resolve_anonymous_label(false, 1, 15, loc()), Some(10));
        assert_eq!(table.resolve_anonymous_label(false, 1, 5, loc()), None);
    }

    #[test]
    fn define_or_confirm_is_silent_when_value_matches() {
        let mut table = SymbolTable::new();
        table.define("start", SymbolKind::Label, Some(0x100), loc());
        table.define_or_confirm("start", SymbolKind::Label, Some(0x100), loc());
        assert!(table.diagnostics.is_empty());
        assert_eq!(table.value_of("start"), Some(0x100));
    }

    #[test]
    fn define_or_confirm_reports_divergent_value() {
        let mut table = SymbolTable::new();
        table.define("start", SymbolKind::Label, Some(0x100), loc());
        table.define_or_confirm("start", SymbolKind::Label, Some(0x200), loc());
        assert_eq!(table.diagnostics.len(), 1);
    }

    #[test]
    fn clear_anonymous_labels_drops_stale_addresses() {
        let mut table = SymbolTable::new();
        table.define_anonymous_label(true, 10, loc());
        table.clear_anonymous_labels();
        assert_eq!(table.resolve_anonymous_label(true, 1, 0, loc()), None);
    }
}
