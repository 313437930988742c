//! Expression lowering.
//!
//! Every node's recorded cast is applied here, so the IR carries each
//! conversion as an explicit `Cast` node. Compound assignments and
//! increments go through a [`Place`] whose receiver and index are held in
//! temporaries, so they evaluate exactly once.

use super::{local_index, Lowerer};
use crate::compiler::ir::{Constant, Expr, FieldRef, Invoke, Target};
use crate::error::{CompileError, CompileResult};
use crate::parser::ast::{Literal, NodeKind, UnaryOp};
use crate::parser::{NodeId, Span};
use crate::semantic::{CallTarget, CompoundPlan, FieldAccess, IndexAccess};
use crate::whitelist::{MemberId, ScriptType};

/// A resolved assignment target with its operands already evaluated.
enum Place {
    Local(u16),
    Static(MemberId),
    Field { receiver: u16, field: FieldRef },
    MapKey { receiver: u16, key: String, get: MemberId, put: MemberId },
    Index { receiver: u16, index: u16, access: IndexAccess },
}

/// Evaluate `value` into `slot` around `body`.
fn bind(slot: u16, value: Expr, body: Expr) -> Expr {
    Expr::Let {
        slot,
        value: value.boxed(),
        body: body.boxed(),
    }
}

fn one(ty: &ScriptType) -> Constant {
    match ty {
        ScriptType::Long => Constant::Long(1),
        ScriptType::Double => Constant::Double(1.0),
        _ => Constant::Int(1),
    }
}

impl<'a> Lowerer<'a> {
    /// Lower an expression and apply the cast its use site needs.
    pub(super) fn expr(&mut self, id: NodeId) -> CompileResult<Expr> {
        let lowered = self.expr_kind(id)?;
        Ok(lowered.cast(self.analysis.decorations.cast(id)))
    }

    fn exprs(&mut self, ids: &[NodeId]) -> CompileResult<Vec<Expr>> {
        ids.iter().map(|&id| self.expr(id)).collect()
    }

    fn operation(&self, id: NodeId) -> CompileResult<ScriptType> {
        let analysis = self.analysis;
        analysis
            .decorations
            .operation(id)
            .cloned()
            .ok_or_else(|| self.missing("operation type", id))
    }

    fn declared(&self, id: NodeId) -> CompileResult<ScriptType> {
        let analysis = self.analysis;
        analysis
            .decorations
            .declared_type(id)
            .cloned()
            .ok_or_else(|| self.missing("declared type", id))
    }

    fn call_target(&self, id: NodeId) -> CompileResult<CallTarget> {
        let analysis = self.analysis;
        analysis
            .decorations
            .call(id)
            .cloned()
            .ok_or_else(|| self.missing("call target", id))
    }

    fn returns_void(&self, member: MemberId) -> bool {
        match self.whitelist.member(member) {
            crate::whitelist::Member::Method(m) => m.return_type.is_void(),
            crate::whitelist::Member::ClassBinding(b) => b.return_type.is_void(),
            crate::whitelist::Member::InstanceBinding(b) => b.return_type.is_void(),
            _ => false,
        }
    }

    fn expr_kind(&mut self, id: NodeId) -> CompileResult<Expr> {
        let tree = self.tree;
        let analysis = self.analysis;
        let span = self.span(id);
        Ok(match tree.kind(id) {
            NodeKind::Literal(literal) => Expr::Const(match literal {
                Literal::Int(i) => Constant::Int(*i),
                Literal::Long(l) => Constant::Long(*l),
                Literal::Double(d) => Constant::Double(*d),
                Literal::String(s) => Constant::Str(s.clone()),
                Literal::Bool(b) => Constant::Bool(*b),
                Literal::Null => Constant::Null,
            }),
            NodeKind::Regex { .. } => {
                let info = analysis.decorations.regex(id).ok_or_else(|| self.missing("regex", id))?;
                Expr::Regex(info.pattern.clone())
            }
            NodeKind::Variable(_) => {
                let variable = analysis
                    .decorations
                    .variable(id)
                    .ok_or_else(|| self.missing("variable slot", id))?;
                Expr::Local(variable.slot)
            }
            NodeKind::Unary { op, operand } => {
                let value = self.expr(*operand)?;
                match op {
                    UnaryOp::Plus => value,
                    _ => Expr::Unary {
                        op: *op,
                        ty: self.operation(id)?,
                        operand: value.boxed(),
                    },
                }
            }
            NodeKind::Binary { op, left, right } => Expr::Binary {
                op: *op,
                ty: self.operation(id)?,
                left: self.expr(*left)?.boxed(),
                right: self.expr(*right)?.boxed(),
            },
            NodeKind::Compare { op, left, right } => Expr::Compare {
                op: *op,
                ty: self.operation(id)?,
                left: self.expr(*left)?.boxed(),
                right: self.expr(*right)?.boxed(),
            },
            NodeKind::Logical { op, left, right } => Expr::Logical {
                op: *op,
                left: self.expr(*left)?.boxed(),
                right: self.expr(*right)?.boxed(),
            },
            NodeKind::RegexMatch { op, left, pattern } => Expr::RegexMatch {
                op: *op,
                input: self.expr(*left)?.boxed(),
                pattern: self.expr(*pattern)?.boxed(),
            },
            NodeKind::Assign { target, op: None, value } => {
                let value = self.expr(*value)?;
                self.assign(*target, value)?
            }
            NodeKind::Assign {
                target,
                op: Some(_),
                value,
            } => {
                let plan = analysis
                    .decorations
                    .compound(id)
                    .ok_or_else(|| self.missing("compound plan", id))?;
                let value = self.expr(*value)?;
                self.compound(*target, plan, Some(value), false, span)?
            }
            NodeKind::IncDec { target, prefix, .. } => {
                let plan = analysis
                    .decorations
                    .compound(id)
                    .ok_or_else(|| self.missing("increment plan", id))?;
                self.compound(*target, plan, None, !*prefix, span)?
            }
            NodeKind::Conditional {
                condition,
                then_value,
                else_value,
            } => Expr::Conditional {
                condition: self.expr(*condition)?.boxed(),
                then_value: self.expr(*then_value)?.boxed(),
                else_value: self.expr(*else_value)?.boxed(),
            },
            NodeKind::Elvis { value, fallback } => Expr::Elvis {
                value: self.expr(*value)?.boxed(),
                fallback: self.expr(*fallback)?.boxed(),
            },
            // the conversion is the cast recorded on the operand
            NodeKind::Cast { value, .. } => self.expr(*value)?,
            NodeKind::InstanceOf { value, .. } => Expr::InstanceOf {
                ty: self.declared(id)?,
                value: self.expr(*value)?.boxed(),
            },
            NodeKind::Call { args, .. } => {
                let args = self.exprs(args)?;
                match self.call_target(id)? {
                    CallTarget::Local(index) => {
                        let void = analysis
                            .functions
                            .get(index)
                            .is_some_and(|f| f.return_type.is_void());
                        Expr::Invoke {
                            invoke: Invoke::Local(local_index(index, span)?),
                            args,
                            void,
                        }
                    }
                    CallTarget::Binding(member) => Expr::Invoke {
                        invoke: Invoke::Binding(member),
                        args,
                        void: self.returns_void(member),
                    },
                    other => {
                        return Err(CompileError::internal(format!("unexpected local call target {:?}", other), span))
                    }
                }
            }
            NodeKind::MethodCall {
                receiver,
                args,
                null_safe,
                ..
            } => self.method_call(id, *receiver, args, *null_safe, span)?,
            NodeKind::Field {
                receiver,
                name,
                null_safe,
            } => self.field(id, *receiver, name, *null_safe, span)?,
            NodeKind::Index { receiver, index } => Expr::Index {
                receiver: self.expr(*receiver)?.boxed(),
                index: self.expr(*index)?.boxed(),
                access: analysis.decorations.index(id).ok_or_else(|| self.missing("index access", id))?,
            },
            NodeKind::NewObject { args, .. } => {
                let CallTarget::Constructor(member) = self.call_target(id)? else {
                    return Err(self.missing("constructor", id));
                };
                Expr::Invoke {
                    invoke: Invoke::Constructor(member),
                    args: self.exprs(args)?,
                    void: false,
                }
            }
            NodeKind::NewArray { length, .. } => Expr::NewArray {
                ty: self.declared(id)?,
                length: self.expr(*length)?.boxed(),
            },
            NodeKind::NewArrayInit { values, .. } => Expr::ArrayInit {
                ty: self.declared(id)?,
                values: self.exprs(values)?,
            },
            NodeKind::ListInit(values) => Expr::ListInit(self.exprs(values)?),
            NodeKind::MapInit { keys, values } => {
                let mut entries = Vec::with_capacity(keys.len());
                for (&key, &value) in keys.iter().zip(values) {
                    entries.push((self.expr(key)?, self.expr(value)?));
                }
                Expr::MapInit(entries)
            }
            NodeKind::Lambda { .. } | NodeKind::FunctionRef { .. } => {
                let index = analysis
                    .decorations
                    .function(id)
                    .ok_or_else(|| self.missing("function", id))?;
                let captures = analysis
                    .decorations
                    .captures(id)
                    .iter()
                    .map(|capture| Expr::Local(capture.outer_slot))
                    .collect();
                Expr::Closure {
                    function: local_index(index, span)?,
                    captures,
                }
            }
            _ => return Err(self.missing("expression lowering", id)),
        })
    }

    /// `receiver?.x`: evaluate the receiver once, short-circuit on null.
    fn null_safe(&mut self, receiver: Expr, span: Span, access: impl FnOnce(Expr) -> Expr) -> CompileResult<Expr> {
        let slot = self.temp(span)?;
        Ok(bind(
            slot,
            receiver,
            Expr::Conditional {
                condition: Expr::IsNull(Expr::Local(slot).boxed()).boxed(),
                then_value: Expr::Const(Constant::Null).boxed(),
                else_value: access(Expr::Local(slot)).boxed(),
            },
        ))
    }

    fn method_call(
        &mut self,
        id: NodeId,
        receiver: NodeId,
        args: &[NodeId],
        null_safe: bool,
        span: Span,
    ) -> CompileResult<Expr> {
        let target = self.call_target(id)?;
        if let CallTarget::StaticMethod(member) = target {
            return Ok(Expr::Invoke {
                invoke: Invoke::Static(member),
                args: self.exprs(args)?,
                void: self.returns_void(member),
            });
        }
        let (invoke, void) = match target {
            CallTarget::Method(member) => (Invoke::Virtual(member), self.returns_void(member)),
            CallTarget::Functional(member) => (Invoke::Functional(member), self.returns_void(member)),
            CallTarget::Dynamic(reference) => (Invoke::Dynamic(reference), false),
            other => {
                return Err(CompileError::internal(format!("unexpected method call target {:?}", other), span))
            }
        };
        let receiver = self.expr(receiver)?;
        let args = self.exprs(args)?;
        let call = move |receiver: Expr| {
            let mut all = Vec::with_capacity(args.len() + 1);
            all.push(receiver);
            all.extend(args);
            Expr::Invoke { invoke, args: all, void }
        };
        if null_safe {
            self.null_safe(receiver, span, call)
        } else {
            Ok(call(receiver))
        }
    }

    fn field(&mut self, id: NodeId, receiver: NodeId, name: &str, null_safe: bool, span: Span) -> CompileResult<Expr> {
        let analysis = self.analysis;
        if let Some(constant) = analysis.decorations.constant(id) {
            if let Some(constant) = Constant::from_value(constant) {
                return Ok(Expr::Const(constant));
            }
        }
        let access = analysis
            .decorations
            .field(id)
            .ok_or_else(|| self.missing("field access", id))?
            .clone();
        if let FieldAccess::Static(member) = access {
            return Ok(Expr::Field {
                receiver: None,
                field: FieldRef::Static(member),
            });
        }
        let receiver = self.expr(receiver)?;
        let name = name.to_string();
        let read = move |receiver: Expr| match access {
            FieldAccess::Instance(member) => Expr::Field {
                receiver: Some(receiver.boxed()),
                field: FieldRef::Instance(member),
            },
            FieldAccess::Dynamic(name) => Expr::Field {
                receiver: Some(receiver.boxed()),
                field: FieldRef::Dynamic(name),
            },
            FieldAccess::ArrayLength => Expr::ArrayLength(receiver.boxed()),
            FieldAccess::MapKey { get, .. } => Expr::Invoke {
                invoke: Invoke::Virtual(get),
                args: vec![receiver, Expr::Const(Constant::Str(name))],
                void: false,
            },
            FieldAccess::Static(member) => Expr::Field {
                receiver: None,
                field: FieldRef::Static(member),
            },
        };
        if null_safe {
            self.null_safe(receiver, span, read)
        } else {
            Ok(read(receiver))
        }
    }

    /// Plain assignment; produces the assigned value.
    fn assign(&mut self, target: NodeId, value: Expr) -> CompileResult<Expr> {
        let tree = self.tree;
        let analysis = self.analysis;
        let span = self.span(target);
        match tree.kind(target) {
            NodeKind::Variable(_) => {
                let slot = analysis
                    .decorations
                    .variable(target)
                    .ok_or_else(|| self.missing("variable slot", target))?
                    .slot;
                Ok(Expr::Store {
                    target: Target::Local(slot),
                    value: value.boxed(),
                })
            }
            NodeKind::Field { receiver, name, .. } => {
                let access = analysis
                    .decorations
                    .field(target)
                    .ok_or_else(|| self.missing("field access", target))?
                    .clone();
                match access {
                    FieldAccess::Static(member) => Ok(Expr::Store {
                        target: Target::Field {
                            receiver: None,
                            field: FieldRef::Static(member),
                        },
                        value: value.boxed(),
                    }),
                    FieldAccess::Instance(member) => Ok(Expr::Store {
                        target: Target::Field {
                            receiver: Some(self.expr(*receiver)?.boxed()),
                            field: FieldRef::Instance(member),
                        },
                        value: value.boxed(),
                    }),
                    FieldAccess::Dynamic(name) => Ok(Expr::Store {
                        target: Target::Field {
                            receiver: Some(self.expr(*receiver)?.boxed()),
                            field: FieldRef::Dynamic(name),
                        },
                        value: value.boxed(),
                    }),
                    FieldAccess::MapKey { put, .. } => {
                        let receiver_slot = self.temp(span)?;
                        let value_slot = self.temp(span)?;
                        let receiver = self.expr(*receiver)?;
                        let put = Expr::Invoke {
                            invoke: Invoke::Virtual(put),
                            args: vec![
                                Expr::Local(receiver_slot),
                                Expr::Const(Constant::Str(name.clone())),
                                Expr::Local(value_slot),
                            ],
                            void: false,
                        };
                        Ok(bind(
                            receiver_slot,
                            receiver,
                            bind(value_slot, value, Expr::Seq(vec![put, Expr::Local(value_slot)])),
                        ))
                    }
                    FieldAccess::ArrayLength => Err(CompileError::internal("assignment to array length", span)),
                }
            }
            NodeKind::Index { receiver, index } => Ok(Expr::Store {
                target: Target::Index {
                    receiver: self.expr(*receiver)?.boxed(),
                    index: self.expr(*index)?.boxed(),
                    access: analysis
                        .decorations
                        .index(target)
                        .ok_or_else(|| self.missing("index access", target))?,
                },
                value: value.boxed(),
            }),
            _ => Err(self.missing("assignment target", target)),
        }
    }

    /// Resolve an assignment target, evaluating its receiver and index into
    /// temporaries. Returns the bindings to wrap around the result.
    fn place(&mut self, target: NodeId) -> CompileResult<(Vec<(u16, Expr)>, Place)> {
        let tree = self.tree;
        let analysis = self.analysis;
        let span = self.span(target);
        let mut bindings = Vec::new();
        let place = match tree.kind(target) {
            NodeKind::Variable(_) => Place::Local(
                analysis
                    .decorations
                    .variable(target)
                    .ok_or_else(|| self.missing("variable slot", target))?
                    .slot,
            ),
            NodeKind::Field { receiver, name, .. } => {
                let access = analysis
                    .decorations
                    .field(target)
                    .ok_or_else(|| self.missing("field access", target))?
                    .clone();
                if let FieldAccess::Static(member) = access {
                    Place::Static(member)
                } else {
                    let slot = self.temp(span)?;
                    bindings.push((slot, self.expr(*receiver)?));
                    match access {
                        FieldAccess::Instance(member) => Place::Field {
                            receiver: slot,
                            field: FieldRef::Instance(member),
                        },
                        FieldAccess::Dynamic(name) => Place::Field {
                            receiver: slot,
                            field: FieldRef::Dynamic(name),
                        },
                        FieldAccess::MapKey { get, put } => Place::MapKey {
                            receiver: slot,
                            key: name.clone(),
                            get,
                            put,
                        },
                        _ => return Err(CompileError::internal("read-only compound target", span)),
                    }
                }
            }
            NodeKind::Index { receiver, index } => {
                let access = analysis
                    .decorations
                    .index(target)
                    .ok_or_else(|| self.missing("index access", target))?;
                let receiver_slot = self.temp(span)?;
                bindings.push((receiver_slot, self.expr(*receiver)?));
                let index_slot = self.temp(span)?;
                bindings.push((index_slot, self.expr(*index)?));
                Place::Index {
                    receiver: receiver_slot,
                    index: index_slot,
                    access,
                }
            }
            _ => return Err(self.missing("assignment target", target)),
        };
        Ok((bindings, place))
    }

    fn read(&self, place: &Place) -> Expr {
        match place {
            Place::Local(slot) => Expr::Local(*slot),
            Place::Static(member) => Expr::Field {
                receiver: None,
                field: FieldRef::Static(*member),
            },
            Place::Field { receiver, field } => Expr::Field {
                receiver: Some(Expr::Local(*receiver).boxed()),
                field: field.clone(),
            },
            Place::MapKey { receiver, key, get, .. } => Expr::Invoke {
                invoke: Invoke::Virtual(*get),
                args: vec![Expr::Local(*receiver), Expr::Const(Constant::Str(key.clone()))],
                void: false,
            },
            Place::Index { receiver, index, access } => Expr::Index {
                receiver: Expr::Local(*receiver).boxed(),
                index: Expr::Local(*index).boxed(),
                access: *access,
            },
        }
    }

    /// Store `value` into `place` and produce it.
    fn write(&mut self, place: &Place, value: Expr, span: Span) -> CompileResult<Expr> {
        let target = match place {
            Place::Local(slot) => Target::Local(*slot),
            Place::Static(member) => Target::Field {
                receiver: None,
                field: FieldRef::Static(*member),
            },
            Place::Field { receiver, field } => Target::Field {
                receiver: Some(Expr::Local(*receiver).boxed()),
                field: field.clone(),
            },
            Place::MapKey { receiver, key, put, .. } => {
                let slot = self.temp(span)?;
                let put = Expr::Invoke {
                    invoke: Invoke::Virtual(*put),
                    args: vec![
                        Expr::Local(*receiver),
                        Expr::Const(Constant::Str(key.clone())),
                        Expr::Local(slot),
                    ],
                    void: false,
                };
                return Ok(bind(slot, value, Expr::Seq(vec![put, Expr::Local(slot)])));
            }
            Place::Index { receiver, index, access } => Target::Index {
                receiver: Expr::Local(*receiver).boxed(),
                index: Expr::Local(*index).boxed(),
                access: *access,
            },
        };
        Ok(Expr::Store {
            target,
            value: value.boxed(),
        })
    }

    /// Read-modify-write. `value` is the right-hand side of a compound
    /// assignment; increments pass `None`. Postfix forms produce the old
    /// value.
    fn compound(
        &mut self,
        target: NodeId,
        plan: &CompoundPlan,
        value: Option<Expr>,
        postfix: bool,
        span: Span,
    ) -> CompileResult<Expr> {
        let (bindings, place) = self.place(target)?;
        let operand = match value {
            Some(value) => value.cast(plan.value_cast.as_ref()),
            None => Expr::Const(one(&plan.op_ty)),
        };
        let operate = |current: Expr| {
            Expr::Binary {
                op: plan.op,
                ty: plan.op_ty.clone(),
                left: current.cast(plan.read_cast.as_ref()).boxed(),
                right: operand.boxed(),
            }
            .cast(plan.write_cast.as_ref())
        };

        let result = if postfix {
            let old = self.temp(span)?;
            let updated = operate(Expr::Local(old));
            let store = self.write(&place, updated, span)?;
            bind(old, self.read(&place), Expr::Seq(vec![store, Expr::Local(old)]))
        } else {
            let updated = operate(self.read(&place));
            self.write(&place, updated, span)?
        };
        Ok(bindings
            .into_iter()
            .rev()
            .fold(result, |body, (slot, value)| bind(slot, value, body)))
    }
}

