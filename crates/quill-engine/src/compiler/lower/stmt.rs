//! Statement lowering.

use super::{default_value, Lowerer};
use crate::compiler::ir::{CatchClause, Constant, Expr, Invoke, Stmt, Target};
use crate::error::CompileResult;
use crate::parser::ast::{BinaryOp, CompareOp, Literal, NodeKind};
use crate::parser::NodeId;
use crate::semantic::{ForEachPlan, IndexAccess};
use crate::whitelist::ScriptType;

fn store(slot: u16, value: Expr) -> Stmt {
    Stmt::Expr(Expr::Store {
        target: Target::Local(slot),
        value: value.boxed(),
    })
}

impl<'a> Lowerer<'a> {
    /// Lower one statement, appending to `out`.
    pub(super) fn statement(&mut self, id: NodeId, out: &mut Vec<Stmt>) -> CompileResult<()> {
        let tree = self.tree;
        let kind = tree.kind(id);
        if !matches!(kind, NodeKind::Block(_) | NodeKind::Declarations(_) | NodeKind::Empty) {
            out.push(Stmt::Position(self.span(id).start));
        }

        match kind {
            NodeKind::Block(items) => {
                let mut body = Vec::new();
                for &item in items {
                    self.statement(item, &mut body)?;
                }
                out.push(Stmt::Block(body));
            }
            NodeKind::Declarations(items) => {
                for &item in items {
                    self.statement(item, out)?;
                }
            }
            NodeKind::Declaration { init, .. } => {
                let variable = self
                    .analysis
                    .decorations
                    .variable(id)
                    .ok_or_else(|| self.missing("variable slot", id))?
                    .clone();
                let value = match init {
                    Some(init) => self.expr(*init)?,
                    None => Expr::Const(default_value(&variable.ty)),
                };
                out.push(store(variable.slot, value));
            }
            NodeKind::If {
                condition,
                then_branch,
                else_branch,
            } => {
                let condition = self.expr(*condition)?;
                let then_body = self.body(*then_branch)?;
                let else_body = match else_branch {
                    Some(other) => self.body(*other)?,
                    None => Vec::new(),
                };
                out.push(Stmt::If {
                    condition,
                    then_body,
                    else_body,
                });
            }
            NodeKind::While { condition, body } => {
                let condition = self.loop_condition(Some(*condition))?;
                let body = match body {
                    Some(body) => self.body(*body)?,
                    None => Vec::new(),
                };
                out.push(Stmt::Loop {
                    condition,
                    body,
                    update: Vec::new(),
                    test_first: true,
                });
            }
            NodeKind::DoWhile { body, condition } => {
                let body = self.body(*body)?;
                let condition = self.loop_condition(Some(*condition))?;
                out.push(Stmt::Loop {
                    condition,
                    body,
                    update: Vec::new(),
                    test_first: false,
                });
            }
            NodeKind::For {
                init,
                condition,
                update,
                body,
            } => {
                let mut block = Vec::new();
                if let Some(init) = init {
                    if matches!(tree.kind(*init), NodeKind::Declarations(_)) {
                        self.statement(*init, &mut block)?;
                    } else {
                        block.push(Stmt::Expr(self.expr(*init)?));
                    }
                }
                let condition = self.loop_condition(*condition)?;
                let body = match body {
                    Some(body) => self.body(*body)?,
                    None => Vec::new(),
                };
                let update = match update {
                    Some(update) => vec![Stmt::Expr(self.expr(*update)?)],
                    None => Vec::new(),
                };
                block.push(Stmt::Loop {
                    condition,
                    body,
                    update,
                    test_first: true,
                });
                out.push(Stmt::Block(block));
            }
            NodeKind::ForEach { iterable, body, .. } => self.for_each(id, *iterable, *body, out)?,
            NodeKind::Return(value) => {
                let value = match value {
                    Some(value) => Some(self.expr(*value)?),
                    None => None,
                };
                out.push(Stmt::Return(value));
            }
            NodeKind::Break => out.push(Stmt::Break),
            NodeKind::Continue => out.push(Stmt::Continue),
            NodeKind::Throw(value) => out.push(Stmt::Throw(self.expr(*value)?)),
            NodeKind::Try { body, catches } => {
                let body = self.body(*body)?;
                let mut clauses = Vec::with_capacity(catches.len());
                for &catch in catches {
                    let NodeKind::Catch { body, .. } = tree.kind(catch) else {
                        return Err(self.missing("catch clause", catch));
                    };
                    let decorations = &self.analysis.decorations;
                    let slot = decorations
                        .variable(catch)
                        .ok_or_else(|| self.missing("catch slot", catch))?
                        .slot;
                    let ty = decorations
                        .declared_type(catch)
                        .ok_or_else(|| self.missing("catch type", catch))?
                        .clone();
                    clauses.push(CatchClause {
                        ty,
                        slot,
                        body: self.body(*body)?,
                    });
                }
                out.push(Stmt::Try { body, catches: clauses });
            }
            NodeKind::ExprStatement(value) => out.push(Stmt::Expr(self.expr(*value)?)),
            NodeKind::Empty => {}
            _ => return Err(self.missing("statement lowering", id)),
        }
        Ok(())
    }

    /// A nested statement as its own list.
    fn body(&mut self, id: NodeId) -> CompileResult<Vec<Stmt>> {
        let mut out = Vec::new();
        self.statement(id, &mut out)?;
        Ok(out)
    }

    /// `None` for an absent or literally `true` condition.
    fn loop_condition(&mut self, condition: Option<NodeId>) -> CompileResult<Option<Expr>> {
        match condition {
            None => Ok(None),
            Some(id) if matches!(self.tree.kind(id), NodeKind::Literal(Literal::Bool(true))) => Ok(None),
            Some(id) => Ok(Some(self.expr(id)?)),
        }
    }

    /// Expand a for-each loop into the shape the analyzer picked.
    fn for_each(&mut self, id: NodeId, iterable: NodeId, body: NodeId, out: &mut Vec<Stmt>) -> CompileResult<()> {
        let decorations = &self.analysis.decorations;
        let plan = decorations.foreach(id).ok_or_else(|| self.missing("for-each plan", id))?.clone();
        let variable = decorations
            .variable(id)
            .ok_or_else(|| self.missing("loop variable", id))?
            .slot;
        let source = self.expr(iterable)?;
        let mut loop_body = Vec::new();

        let (setup, condition, update) = match plan {
            ForEachPlan::Array {
                array_slot,
                index_slot,
                cast,
                ..
            } => {
                let element = Expr::Index {
                    receiver: Expr::Local(array_slot).boxed(),
                    index: Expr::Local(index_slot).boxed(),
                    access: IndexAccess::Array,
                };
                loop_body.push(store(variable, element.cast(cast.as_ref())));
                let condition = Expr::Compare {
                    op: CompareOp::Lt,
                    ty: ScriptType::Int,
                    left: Expr::Local(index_slot).boxed(),
                    right: Expr::ArrayLength(Expr::Local(array_slot).boxed()).boxed(),
                };
                let step = Expr::Binary {
                    op: BinaryOp::Add,
                    ty: ScriptType::Int,
                    left: Expr::Local(index_slot).boxed(),
                    right: Expr::Const(Constant::Int(1)).boxed(),
                };
                (
                    vec![store(array_slot, source), store(index_slot, Expr::Const(Constant::Int(0)))],
                    condition,
                    vec![store(index_slot, step)],
                )
            }
            ForEachPlan::Iterable {
                iterator_slot,
                iterator,
                has_next,
                next,
                cast,
            } => {
                let call = |member, args| Expr::Invoke {
                    invoke: Invoke::Virtual(member),
                    args,
                    void: false,
                };
                loop_body.push(store(
                    variable,
                    call(next, vec![Expr::Local(iterator_slot)]).cast(cast.as_ref()),
                ));
                (
                    vec![store(iterator_slot, call(iterator, vec![source]))],
                    call(has_next, vec![Expr::Local(iterator_slot)]),
                    Vec::new(),
                )
            }
            ForEachPlan::Dynamic { iterator_slot, cast } => {
                loop_body.push(store(
                    variable,
                    Expr::IterNext(Expr::Local(iterator_slot).boxed()).cast(cast.as_ref()),
                ));
                (
                    vec![store(iterator_slot, Expr::Iterate(source.boxed()))],
                    Expr::IterHasNext(Expr::Local(iterator_slot).boxed()),
                    Vec::new(),
                )
            }
        };

        self.statement(body, &mut loop_body)?;
        let mut block = setup;
        block.push(Stmt::Loop {
            condition: Some(condition),
            body: loop_body,
            update,
            test_first: true,
        });
        out.push(Stmt::Block(block));
        Ok(())
    }
}
