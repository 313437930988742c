//! Static extraction of regex literals
//!
//! Compiling a pattern on every evaluation is wasteful, so each distinct
//! pattern gets a static slot of the class. A synthesized `$clinit`
//! function stores the compiled patterns once when the unit is loaded and
//! the use sites read the slot.

use crate::compiler::ir::{rewrite_exprs, Expr, FunctionKind, IrClass, IrFunction, Stmt, Target};
use indexmap::IndexMap;

/// Name of the synthesized static initializer.
pub const STATIC_INIT: &str = "$clinit";

pub struct StaticExtractor;

impl StaticExtractor {
    pub fn new() -> Self {
        Self
    }

    /// Hoist regex literals; returns the number of distinct patterns.
    pub fn extract(&self, class: &mut IrClass) -> usize {
        let base = class.static_slots;
        let mut slots: IndexMap<String, u16> = IndexMap::new();
        for function in &mut class.functions {
            rewrite_exprs(&mut function.body, &mut |expr| {
                if let Expr::Regex(pattern) = expr {
                    let next = base + slots.len() as u16;
                    let slot = *slots.entry(std::mem::take(pattern)).or_insert(next);
                    *expr = Expr::Static(slot);
                }
            });
        }
        if slots.is_empty() {
            return 0;
        }

        let mut body: Vec<Stmt> = slots
            .iter()
            .map(|(pattern, &slot)| {
                Stmt::Expr(Expr::Store {
                    target: Target::Static(slot),
                    value: Expr::Regex(pattern.clone()).boxed(),
                })
            })
            .collect();
        body.push(Stmt::Return(None));

        class.static_slots = base + slots.len() as u16;
        class.static_init = Some(class.functions.len() as u16);
        class.functions.push(IrFunction {
            name: STATIC_INIT.to_string(),
            kind: FunctionKind::StaticInit,
            params: 0,
            slots: 0,
            body,
        });
        tracing::trace!(count = slots.len(), "hoisted regex literals");
        slots.len()
    }
}

impl Default for StaticExtractor {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compiler::ir::Constant;
    use crate::parser::ast::RegexOp;

    fn matcher(pattern: &str) -> Expr {
        Expr::RegexMatch {
            op: RegexOp::Find,
            input: Expr::Const(Constant::Str("abc".into())).boxed(),
            pattern: Expr::Regex(pattern.to_string()).boxed(),
        }
    }

    #[test]
    fn test_patterns_move_to_static_init() {
        let mut class = IrClass {
            name: "t".to_string(),
            source: String::new(),
            functions: vec![IrFunction {
                name: "execute".to_string(),
                kind: FunctionKind::Entry,
                params: 1,
                slots: 1,
                body: vec![
                    Stmt::Expr(matcher("a+")),
                    Stmt::Expr(matcher("b")),
                    Stmt::Return(Some(matcher("a+"))),
                ],
            }],
            static_slots: 0,
            static_init: None,
        };

        assert_eq!(StaticExtractor::new().extract(&mut class), 2);
        assert_eq!(class.static_slots, 2);
        assert_eq!(class.static_init, Some(1));

        let init = class.function(STATIC_INIT).unwrap();
        assert_eq!(init.kind, FunctionKind::StaticInit);
        assert_eq!(
            init.body[0],
            Stmt::Expr(Expr::Store {
                target: Target::Static(0),
                value: Expr::Regex("a+".into()).boxed(),
            })
        );

        let Stmt::Return(Some(Expr::RegexMatch { pattern, .. })) = &class.functions[0].body[2] else {
            panic!("unexpected body");
        };
        assert_eq!(**pattern, Expr::Static(0));
    }

    #[test]
    fn test_no_patterns_no_initializer() {
        let mut class = IrClass {
            name: "t".to_string(),
            source: String::new(),
            functions: Vec::new(),
            static_slots: 0,
            static_init: None,
        };
        assert_eq!(StaticExtractor::new().extract(&mut class), 0);
        assert!(class.static_init.is_none());
    }
}
