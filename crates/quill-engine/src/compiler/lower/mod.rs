//! Syntax tree to IR lowering
//!
//! Reads the decorated tree and produces one [`IrClass`]. Function indices
//! are fixed here: the entry function is 0, function table entry `i` is
//! `i + 1`, and the synthesized accessors follow.

mod expr;
mod stmt;

use crate::compiler::ir::{Constant, Expr, FunctionKind, Invoke, IrClass, IrFunction, Stmt};
use crate::error::{CompileError, CompileResult};
use crate::parser::ast::NodeKind;
use crate::parser::{NodeId, Span, SyntaxTree};
use crate::semantic::{AdapterPlan, AdapterTarget, Analysis, FunctionBody, LocalFunction};
use crate::whitelist::{ScriptType, Whitelist};

/// Name of the entry function.
pub const ENTRY: &str = "execute";

/// Prefix of the per-parameter `needs` accessors.
pub const NEEDS_PREFIX: &str = "$needs$";

/// Function index of function table entry `index`.
pub(crate) fn local_index(index: usize, span: Span) -> CompileResult<u16> {
    u16::try_from(index + 1).map_err(|_| CompileError::limit("Too many functions.", span))
}

/// The value a variable or missing result holds by default.
pub(crate) fn default_value(ty: &ScriptType) -> Constant {
    match ty {
        ScriptType::Boolean => Constant::Bool(false),
        ScriptType::Int => Constant::Int(0),
        ScriptType::Long => Constant::Long(0),
        ScriptType::Double => Constant::Double(0.0),
        _ => Constant::Null,
    }
}

/// Lower an analyzed script.
pub fn lower(
    tree: &SyntaxTree,
    analysis: &Analysis,
    whitelist: &Whitelist,
    name: &str,
    source: &str,
) -> CompileResult<IrClass> {
    let mut lowerer = Lowerer::new(tree, analysis, whitelist);
    let mut functions = Vec::with_capacity(analysis.functions.len() + 4);
    functions.push(lowerer.entry()?);
    for function in analysis.functions.iter() {
        functions.push(lowerer.function(function)?);
    }
    functions.extend(accessors(analysis, name, source));

    tracing::trace!(functions = functions.len(), "lowered to IR");
    Ok(IrClass {
        name: name.to_string(),
        source: source.to_string(),
        functions,
        static_slots: 0,
        static_init: None,
    })
}

/// `$name`, `$source`, `$statements` and one `$needs$<param>` per context
/// parameter.
fn accessors(analysis: &Analysis, name: &str, source: &str) -> Vec<IrFunction> {
    let accessor = |name: String, value: Expr| IrFunction {
        name,
        kind: FunctionKind::Accessor,
        params: 0,
        slots: 0,
        body: vec![Stmt::Return(Some(value))],
    };
    let statements = analysis
        .statements
        .iter()
        .map(|offset| Expr::Const(Constant::Int(i32::try_from(*offset).unwrap_or(i32::MAX))))
        .collect();

    let mut out = vec![
        accessor("$name".to_string(), Expr::Const(Constant::Str(name.to_string()))),
        accessor("$source".to_string(), Expr::Const(Constant::Str(source.to_string()))),
        accessor(
            "$statements".to_string(),
            Expr::ArrayInit {
                ty: ScriptType::array_of(ScriptType::Int),
                values: statements,
            },
        ),
    ];
    for param in &analysis.context.params {
        out.push(accessor(
            format!("{}{}", NEEDS_PREFIX, param.name),
            Expr::Const(Constant::Bool(analysis.needs.contains(&param.name))),
        ));
    }
    out
}

pub(crate) struct Lowerer<'a> {
    tree: &'a SyntaxTree,
    analysis: &'a Analysis,
    whitelist: &'a Whitelist,
    /// Next free temporary slot of the current function
    next_temp: u32,
    /// Slots used by the current function so far
    max_slots: u32,
}

impl<'a> Lowerer<'a> {
    fn new(tree: &'a SyntaxTree, analysis: &'a Analysis, whitelist: &'a Whitelist) -> Self {
        Self {
            tree,
            analysis,
            whitelist,
            next_temp: 0,
            max_slots: 0,
        }
    }

    fn span(&self, id: NodeId) -> Span {
        self.tree.span(id)
    }

    fn begin_function(&mut self, slots: u16) {
        self.next_temp = slots as u32;
        self.max_slots = slots as u32;
    }

    fn slots_used(&self, span: Span) -> CompileResult<u16> {
        u16::try_from(self.max_slots).map_err(|_| CompileError::limit("Too many local variables.", span))
    }

    /// A fresh slot for an intermediate value.
    fn temp(&mut self, span: Span) -> CompileResult<u16> {
        let slot = u16::try_from(self.next_temp).map_err(|_| CompileError::limit("Too many local variables.", span))?;
        self.next_temp += 1;
        self.max_slots = self.max_slots.max(self.next_temp);
        Ok(slot)
    }

    fn missing(&self, what: &str, id: NodeId) -> CompileError {
        CompileError::internal(format!("missing {} for {}", what, self.tree.kind(id).describe()), self.span(id))
    }

    fn entry(&mut self) -> CompileResult<IrFunction> {
        let info = &self.analysis.entry;
        self.begin_function(info.max_slots);
        let (_, statements) = self.tree.source_parts();
        let mut body = Vec::new();
        for &statement in statements {
            match (self.tree.kind(statement), info.implicit_return) {
                (NodeKind::ExprStatement(value), Some(implicit)) if *value == implicit => {
                    body.push(Stmt::Position(self.span(statement).start));
                    body.push(Stmt::Return(Some(self.expr(implicit)?)));
                }
                _ => self.statement(statement, &mut body)?,
            }
        }
        if info.synthetic_return {
            body.push(Stmt::Return(Some(Expr::Const(default_value(&info.return_type)))));
        }
        let span = self.span(self.tree.root());
        Ok(IrFunction {
            name: ENTRY.to_string(),
            kind: FunctionKind::Entry,
            params: u16::try_from(info.params.len()).map_err(|_| CompileError::limit("Too many parameters.", span))?,
            slots: self.slots_used(span)?,
            body,
        })
    }

    fn function(&mut self, function: &LocalFunction) -> CompileResult<IrFunction> {
        let span = function.span;
        let params = u16::try_from(function.arity()).map_err(|_| CompileError::limit("Too many parameters.", span))?;
        self.begin_function(function.max_slots.max(params));
        let (kind, body) = match &function.body {
            FunctionBody::Declared(node) => (FunctionKind::Declared, self.declared_body(*node, function)?),
            FunctionBody::Lambda { node, param_casts } => {
                let mut body: Vec<Stmt> = param_casts
                    .iter()
                    .map(|(slot, cast)| {
                        Stmt::Expr(Expr::Store {
                            target: crate::compiler::ir::Target::Local(*slot),
                            value: Expr::Local(*slot).cast(Some(cast)).boxed(),
                        })
                    })
                    .collect();
                self.lambda_body(*node, function, &mut body)?;
                (FunctionKind::Lambda, body)
            }
            FunctionBody::Adapter(plan) => (FunctionKind::Adapter, self.adapter_body(plan, function, span)?),
        };
        Ok(IrFunction {
            name: function.symbol.clone(),
            kind,
            params,
            slots: self.slots_used(span)?,
            body,
        })
    }

    fn declared_body(&mut self, node: NodeId, function: &LocalFunction) -> CompileResult<Vec<Stmt>> {
        let NodeKind::Function { body, .. } = self.tree.kind(node) else {
            return Err(self.missing("function body", node));
        };
        let mut out = Vec::new();
        self.statement(*body, &mut out)?;
        if function.synthetic_return {
            out.push(Stmt::Return(None));
        }
        Ok(out)
    }

    fn lambda_body(&mut self, node: NodeId, function: &LocalFunction, out: &mut Vec<Stmt>) -> CompileResult<()> {
        let NodeKind::Lambda { body, .. } = self.tree.kind(node) else {
            return Err(self.missing("lambda body", node));
        };
        let body = *body;
        if matches!(self.tree.kind(body), NodeKind::Block(_)) {
            self.statement(body, out)?;
            if function.synthetic_return {
                out.push(Stmt::Return(None));
            }
            return Ok(());
        }
        let value = self.expr(body)?;
        out.push(Stmt::Position(self.span(body).start));
        if function.return_type.is_void() {
            out.push(Stmt::Expr(value));
            out.push(Stmt::Return(None));
        } else {
            out.push(Stmt::Return(Some(value)));
        }
        Ok(())
    }

    /// Forward the adapter's parameters to its target.
    fn adapter_body(&mut self, plan: &AdapterPlan, function: &LocalFunction, span: Span) -> CompileResult<Vec<Stmt>> {
        let args = plan
            .param_casts
            .iter()
            .enumerate()
            .map(|(slot, cast)| Expr::Local(slot as u16).cast(cast.as_ref()))
            .collect();
        let invoke = match &plan.target {
            AdapterTarget::Local(index) => Invoke::Local(local_index(*index, span)?),
            AdapterTarget::Static(member) => Invoke::Static(*member),
            AdapterTarget::Virtual(member) => Invoke::Virtual(*member),
            AdapterTarget::Constructor(member) => Invoke::Constructor(*member),
        };
        let call = Expr::Invoke {
            invoke,
            args,
            void: plan.target_return.is_void(),
        };
        Ok(if function.return_type.is_void() {
            vec![Stmt::Expr(call), Stmt::Return(None)]
        } else if plan.target_return.is_void() {
            vec![Stmt::Expr(call), Stmt::Return(Some(Expr::Const(Constant::Null)))]
        } else {
            vec![Stmt::Return(Some(call.cast(plan.return_cast.as_ref())))]
        })
    }
}

#[cfg(test)]
mod tests;
