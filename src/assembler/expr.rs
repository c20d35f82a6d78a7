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

//! Folds [`Expression`] trees to `Option<i64>` against a symbol table
//! snapshot and the current address. `None` means "not resolvable yet",
//! not an error — pass 1 leans on that to size instructions that mention
//! forward references, and pass 2 is where an unresolved value finally
//! becomes a diagnostic.

use crate::ast::{BinaryOperator, Expression, SourceLocation, UnaryOperator};

use super::symbol_table::SymbolTable;

pub struct EvalContext<'a> {
    pub symbols: &'a mut SymbolTable,
    pub current_address: i64,
    pub location: SourceLocation,
}

/// `None` on division/modulo by zero or an unresolved reference; never
/// panics. Two's-complement 64-bit arithmetic throughout, matching the
/// wrapping behavior Rust's `i64` already gives us for `+`/`-`/`*`.
pub fn eval(expr: &Expression, ctx: &mut EvalContext) -> Option<i64> {
    match expr {
        Expression::Number(n) => Some(*n),
        Expression::StringLiteral(s) => {
            // A bare string used where a number is expected packs its
            // bytes little-endian into an integer, mirroring how `db
            // "AB"` would encode if read back as a word; most callers
            // never hit this path since string directives consume
            // `Expression::StringLiteral` directly.
            let mut value: i64 = 0;
            for (i, byte) in s.bytes().take(8).enumerate() {
                value |= (byte as i64) << (8 * i);
            }
            Some(value)
        }
        Expression::CurrentAddress => Some(ctx.current_address),
        Expression::Identifier(name) => {
            let id = ctx.symbols.reference(name, ctx.location.clone());
            ctx.symbols.get(id).value
        }
        Expression::Defined(name) => Some(if is_defined(name, ctx) { 1 } else { 0 }),
        Expression::AnonymousLabelRef { forward, count } => {
            ctx.symbols
                .resolve_anonymous_label(*forward, *count, ctx.current_address, ctx.location.clone())
        }
        Expression::NamedAnonymousLabelRef { forward, name } => ctx
            .symbols
            .resolve_named_anonymous_label(*forward, name, ctx.current_address, ctx.location.clone()),
        Expression::Unary(op, inner) => eval_unary(*op, inner, ctx),
        Expression::Binary(op, lhs, rhs) => eval_binary(*op, lhs, rhs, ctx),
    }
}

/// `.ifdef`/`.ifndef`-style definedness test: a bare identifier is directly
/// testable without forcing it to resolve to a value (a label is "defined"
/// once its address is known, a constant once its value is). `!ident`
/// inverts; anything else is evaluated normally and treated as "defined"
/// unconditionally (absent-becomes-0 is handled by the caller via `eval`).
fn is_defined(name: &str, ctx: &mut EvalContext) -> bool {
    match ctx.symbols.lookup(name) {
        Some(id) => ctx.symbols.get(id).defined,
        None => false,
    }
}

fn eval_unary(op: UnaryOperator, inner: &Expression, ctx: &mut EvalContext) -> Option<i64> {
    if let (UnaryOperator::Not, Expression::Defined(name)) = (op, inner) {
        return Some(if is_defined(name, ctx) { 0 } else { 1 });
    }
    let value = eval(inner, ctx)?;
    Some(match op {
        UnaryOperator::Neg => value.wrapping_neg(),
        UnaryOperator::Not => {
            if value == 0 {
                1
            } else {
                0
            }
        }
        UnaryOperator::BitNot => !value,
        UnaryOperator::LowByte => value & 0xff,
        UnaryOperator::HighByte => (value >> 8) & 0xff,
        UnaryOperator::BankByte => (value >> 16) & 0xff,
    })
}

fn eval_binary(
    op: BinaryOperator,
    lhs: &Expression,
    rhs: &Expression,
    ctx: &mut EvalContext,
) -> Option<i64> {
    // Logical operators still need both operands evaluated (forward
    // references in either branch should surface later even on the
    // non-taken side of a conditional's own condition expression), but
    // evaluation order is left-to-right like the rest of the language.
    let l = eval(lhs, ctx)?;
    let r = eval(rhs, ctx)?;
    Some(match op {
        BinaryOperator::Add => l.wrapping_add(r),
        BinaryOperator::Sub => l.wrapping_sub(r),
        BinaryOperator::Mul => l.wrapping_mul(r),
        BinaryOperator::Div => {
            if r == 0 {
                return None;
            }
            l.wrapping_div(r)
        }
        BinaryOperator::Mod => {
            if r == 0 {
                return None;
            }
            l.wrapping_rem(r)
        }
        BinaryOperator::Shl => l.wrapping_shl((r.rem_euclid(64)) as u32),
        BinaryOperator::Shr => l.wrapping_shr((r.rem_euclid(64)) as u32),
        BinaryOperator::BitAnd => l & r,
        BinaryOperator::BitOr => l | r,
        BinaryOperator::BitXor => l ^ r,
        BinaryOperator::LogicalAnd => bool_to_i64(l != 0 && r != 0),
        BinaryOperator::LogicalOr => bool_to_i64(l != 0 || r != 0),
        BinaryOperator::Eq => bool_to_i64(l == r),
        BinaryOperator::Ne => bool_to_i64(l != r),
        BinaryOperator::Lt => bool_to_i64(l < r),
        BinaryOperator::Le => bool_to_i64(l <= r),
        BinaryOperator::Gt => bool_to_i64(l > r),
        BinaryOperator::Ge => bool_to_i64(l >= r),
    })
}

fn bool_to_i64(b: bool) -> i64 {
    if b { 1 } else { 0 }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::SourceLocation;

    fn ctx(symbols: &mut SymbolTable, address: i64) -> EvalContext<'_> {
        EvalContext {
            symbols,
            current_address: address,
            location: SourceLocation::new(1, 1),
        }
    }

    #[test]
    fn undefined_identifier_is_absent_not_error() {
        let mut symbols = SymbolTable::new();
        let mut c = ctx(&mut symbols, 0);
        assert_eq!(eval(&Expression::Identifier("missing".into()), &mut c), None);
    }

    #[test]
    fn division_by_zero_is_absent() {
        let mut symbols = SymbolTable::new();
        let mut c = ctx(&mut symbols, 0);
        let expr = Expression::Binary(
            BinaryOperator::Div,
            Box::new(Expression::Number(4)),
            Box::new(Expression::Number(0)),
        );
        assert_eq!(eval(&expr, &mut c), None);
    }

    #[test]
    fn shift_amount_wraps_modulo_64() {
        let mut symbols = SymbolTable::new();
        let mut c = ctx(&mut symbols, 0);
        let expr = Expression::Binary(
            BinaryOperator::Shl,
            Box::new(Expression::Number(1)),
            Box::new(Expression::Number(65)),
        );
        assert_eq!(eval(&expr, &mut c), Some(2));
    }

    #[test]
    fn byte_splitting_operators_round_trip() {
        let mut symbols = SymbolTable::new();
        let mut c = ctx(&mut symbols, 0);
        let value = 0x12_3456i64;
        let low = eval(
            &Expression::Unary(UnaryOperator::LowByte, Box::new(Expression::Number(value))),
            &mut c,
        )
        .unwrap();
        let high = eval(
            &Expression::Unary(UnaryOperator::HighByte, Box::new(Expression::Number(value))),
            &mut c,
        )
        .unwrap();
        let bank = eval(
            &Expression::Unary(UnaryOperator::BankByte, Box::new(Expression::Number(value))),
            &mut c,
        )
        .unwrap();
        assert_eq!(low | (high << 8) | (bank << 16), value & 0xffffff);
    }

    #[test]
    fn current_address_identifier() {
        let mut symbols = SymbolTable::new();
        let mut c = ctx(&mut symbols, 0x8000);
        assert_eq!(eval(&Expression::CurrentAddress, &mut c), Some(0x8000));
    }

    #[test]
    fn ifdef_style_defined_check_never_absent() {
        let mut symbols = SymbolTable::new();
        let mut c = ctx(&mut symbols, 0);
        assert_eq!(eval(&Expression::Defined("foo".into()), &mut c), Some(0));
        symbols.define("foo", crate::assembler::symbol_table::SymbolKind::Constant, Some(1), SourceLocation::new(1, 1));
        let mut c = ctx(&mut symbols, 0);
        assert_eq!(eval(&Expression::Defined("foo".into()), &mut c), Some(1));
    }
}
