//! Expression typing.
//!
//! `expr` computes a node's value type bottom-up. The optional hint is the
//! type the parent expects; only null literals, lambdas, function references
//! and conditionals look at it. The parent records the actual conversion
//! with `coerce`.

use super::casts::{self, is_string};
use super::{Analyzer, CallTarget, CompoundPlan, FieldAccess, IndexAccess, VarRef};
use crate::error::{CompileError, CompileResult};
use crate::parser::ast::{BinaryOp, Literal, NodeKind, UnaryOp};
use crate::parser::{NodeId, Span};
use crate::semantic::regex;
use crate::whitelist::{ClassId, LookupError, Member, MemberId, ScriptType};

impl<'a> Analyzer<'a> {
    pub(super) fn expr(&mut self, id: NodeId, hint: Option<&ScriptType>) -> CompileResult<ScriptType> {
        let ty = self.expr_kind(id, hint)?;
        self.decorations.set_value_type(id, ty.clone());
        Ok(ty)
    }

    fn expr_kind(&mut self, id: NodeId, hint: Option<&ScriptType>) -> CompileResult<ScriptType> {
        let tree = self.tree;
        let span = self.span(id);
        match tree.kind(id) {
            NodeKind::Literal(literal) => self.literal(literal, hint, span),
            NodeKind::Regex { pattern, flags } => {
                let info = regex::validate(pattern, flags, self.settings.regex_enabled, span)?;
                self.decorations.regexes.insert(id, info);
                self.core_type(self.whitelist.core().pattern, "Pattern", span)
            }
            NodeKind::Variable(name) => {
                let variable = self.variable(name, span)?;
                self.decorations.variables.insert(
                    id,
                    VarRef {
                        slot: variable.slot,
                        ty: variable.ty.clone(),
                    },
                );
                Ok(variable.ty)
            }
            NodeKind::StaticType(ty) => Err(CompileError::type_error(
                format!("Type [{}] cannot be used as a value.", ty),
                span,
            )),
            NodeKind::Unary { op, operand } => self.unary(id, *op, *operand),
            NodeKind::Binary { op, left, right } => self.binary(id, *op, *left, *right),
            NodeKind::Compare { op, left, right } => {
                let left_ty = self.expr(*left, None)?;
                let right_ty = self.expr(*right, None)?;
                let op_ty = if op.is_equality() {
                    casts::promote_equality(&left_ty, &right_ty)
                } else {
                    casts::promote_numeric(self.whitelist, &left_ty, &right_ty).ok_or_else(|| {
                        self.operand_error(op.symbol(), &left_ty, &right_ty, span)
                    })?
                };
                self.coerce(*left, &left_ty, &op_ty, false)?;
                self.coerce(*right, &right_ty, &op_ty, false)?;
                self.decorations.operations.insert(id, op_ty);
                Ok(ScriptType::Boolean)
            }
            NodeKind::Logical { left, right, .. } => {
                self.expect(*left, &ScriptType::Boolean)?;
                self.expect(*right, &ScriptType::Boolean)?;
                Ok(ScriptType::Boolean)
            }
            NodeKind::RegexMatch { left, pattern, .. } => {
                if !self.settings.regex_enabled {
                    return Err(CompileError::disabled(
                        "Regexes are disabled; set [regex_enabled] to [true] in the compiler settings",
                        span,
                    ));
                }
                let string = self.core_type(self.whitelist.core().string, "String", span)?;
                let pattern_ty = self.core_type(self.whitelist.core().pattern, "Pattern", span)?;
                self.expect(*left, &string)?;
                self.expect(*pattern, &pattern_ty)?;
                Ok(ScriptType::Boolean)
            }
            NodeKind::Assign { target, op, value } => self.assign(id, *target, *op, *value),
            NodeKind::IncDec { target, increment, .. } => self.inc_dec(id, *target, *increment),
            NodeKind::Conditional {
                condition,
                then_value,
                else_value,
            } => {
                self.expect(*condition, &ScriptType::Boolean)?;
                let a = self.expr(*then_value, hint)?;
                let b = self.expr(*else_value, hint)?;
                let ty = casts::promote_conditional(
                    self.whitelist,
                    &a,
                    &b,
                    self.is_null_literal(*then_value),
                    self.is_null_literal(*else_value),
                );
                self.coerce(*then_value, &a, &ty, false)?;
                self.coerce(*else_value, &b, &ty, false)?;
                Ok(ty)
            }
            NodeKind::Elvis { value, fallback } => {
                let a = self.expr(*value, hint)?;
                if a.is_primitive() {
                    return Err(CompileError::type_error(
                        format!(
                            "Elvis operator requires a reference type, found [{}].",
                            self.type_name(&a)
                        ),
                        span,
                    ));
                }
                let b = self.expr(*fallback, hint)?;
                let ty = casts::nullable(
                    self.whitelist,
                    &casts::promote_conditional(self.whitelist, &a, &b, false, self.is_null_literal(*fallback)),
                );
                self.coerce(*value, &a, &ty, false)?;
                self.coerce(*fallback, &b, &ty, false)?;
                Ok(ty)
            }
            NodeKind::Cast { ty, value } => {
                let target = self.resolve_type(ty, span)?;
                if target.is_void() {
                    return Err(CompileError::type_error("Cannot cast to [void].", span));
                }
                let from = self.expr(*value, Some(&target))?;
                self.coerce(*value, &from, &target, true)?;
                self.decorations.types.insert(id, target.clone());
                Ok(target)
            }
            NodeKind::InstanceOf { value, ty } => {
                let value_ty = self.expr(*value, None)?;
                if value_ty.is_void() {
                    return Err(CompileError::type_error("Cannot use [void] with instanceof.", span));
                }
                let target = self.resolve_type(ty, span)?;
                let target = match &target {
                    ScriptType::Void => {
                        return Err(CompileError::type_error("Cannot use [void] with instanceof.", span))
                    }
                    t if t.is_primitive() => casts::nullable(self.whitelist, t),
                    _ => target,
                };
                self.decorations.types.insert(id, target);
                Ok(ScriptType::Boolean)
            }
            NodeKind::Call { name, args } => self.local_call(id, name, args),
            NodeKind::MethodCall {
                receiver,
                name,
                args,
                null_safe,
            } => self.method_call(id, *receiver, name, args, *null_safe),
            NodeKind::Field {
                receiver,
                name,
                null_safe,
            } => self.field(id, *receiver, name, *null_safe),
            NodeKind::Index { receiver, index } => self.index(id, *receiver, *index),
            NodeKind::NewObject { ty, args } => {
                let target = self.resolve_type(ty, span)?;
                let ScriptType::Class(class) = target else {
                    return Err(CompileError::type_error(
                        format!("Cannot construct type [{}].", ty),
                        span,
                    ));
                };
                let member = self
                    .whitelist
                    .lookup_constructor(class, args.len())
                    .map_err(|e| lookup_error(e, span))?;
                let params = self.whitelist.member(member).params();
                self.arguments(args, &params)?;
                self.decorations.calls.insert(id, CallTarget::Constructor(member));
                self.decorations.types.insert(id, target.clone());
                Ok(target)
            }
            NodeKind::NewArray { element, length } => {
                let element = self.resolve_type(element, span)?;
                if element.is_void() {
                    return Err(CompileError::type_error("Cannot create an array of [void].", span));
                }
                self.expect(*length, &ScriptType::Int)?;
                let array = ScriptType::array_of(element);
                self.decorations.types.insert(id, array.clone());
                Ok(array)
            }
            NodeKind::NewArrayInit { element, values } => {
                let element = self.resolve_type(element, span)?;
                if element.is_void() {
                    return Err(CompileError::type_error("Cannot create an array of [void].", span));
                }
                for &value in values {
                    self.expect(value, &element)?;
                }
                let array = ScriptType::array_of(element);
                self.decorations.types.insert(id, array.clone());
                Ok(array)
            }
            NodeKind::ListInit(values) => {
                for &value in values {
                    self.expect(value, &ScriptType::Def)?;
                }
                let list = self.whitelist.core().array_list.or(self.whitelist.core().list);
                self.core_type(list, "ArrayList", span)
            }
            NodeKind::MapInit { keys, values } => {
                for (&key, &value) in keys.iter().zip(values) {
                    self.expect(key, &ScriptType::Def)?;
                    self.expect(value, &ScriptType::Def)?;
                }
                let map = self.whitelist.core().hash_map.or(self.whitelist.core().map);
                self.core_type(map, "HashMap", span)
            }
            NodeKind::Lambda { .. } => self.lambda(id, hint),
            NodeKind::FunctionRef { .. } => self.function_ref(id, hint),
            other => Err(CompileError::internal(
                format!("{} in expression position", other.describe()),
                span,
            )),
        }
    }

    fn literal(&mut self, literal: &Literal, hint: Option<&ScriptType>, span: Span) -> CompileResult<ScriptType> {
        Ok(match literal {
            Literal::Int(_) => ScriptType::Int,
            Literal::Long(_) => ScriptType::Long,
            Literal::Double(_) => ScriptType::Double,
            Literal::Bool(_) => ScriptType::Boolean,
            Literal::String(_) => self.core_type(self.whitelist.core().string, "String", span)?,
            Literal::Null => match hint {
                Some(ty) if ty.is_primitive() => {
                    return Err(CompileError::type_error(
                        format!("Cannot cast null to a primitive type [{}].", self.type_name(ty)),
                        span,
                    ))
                }
                Some(ty) if !ty.is_void() => ty.clone(),
                _ => ScriptType::Def,
            },
        })
    }

    /// Look up a variable of the current frame, noting context parameter use.
    fn variable(&mut self, name: &str, span: Span) -> CompileResult<crate::semantic::scope::Variable> {
        let variable = self
            .scopes
            .lookup(name)
            .cloned()
            .ok_or_else(|| CompileError::unresolved(format!("Variable [{}] is not defined.", name), span))?;
        if variable.context_param {
            self.needs.insert(name.to_string());
        }
        Ok(variable)
    }

    fn unary(&mut self, id: NodeId, op: UnaryOp, operand: NodeId) -> CompileResult<ScriptType> {
        let span = self.span(id);
        if op == UnaryOp::Not {
            self.expect(operand, &ScriptType::Boolean)?;
            self.decorations.operations.insert(id, ScriptType::Boolean);
            return Ok(ScriptType::Boolean);
        }
        let ty = self.expr(operand, None)?;
        let op_ty = casts::promote_unary(self.whitelist, &ty)
            .filter(|t| op != UnaryOp::BitNot || t.is_def() || t.is_integral())
            .ok_or_else(|| {
                let symbol = match op {
                    UnaryOp::Neg => "-",
                    UnaryOp::Plus => "+",
                    UnaryOp::BitNot => "~",
                    UnaryOp::Not => "!",
                };
                CompileError::type_error(
                    format!("Cannot apply [{}] to type [{}].", symbol, self.type_name(&ty)),
                    span,
                )
            })?;
        self.coerce(operand, &ty, &op_ty, false)?;
        self.decorations.operations.insert(id, op_ty.clone());
        Ok(op_ty)
    }

    /// Operation type of a binary operator, `None` when the operands do not
    /// support it.
    pub(super) fn binary_type(&self, op: BinaryOp, left: &ScriptType, right: &ScriptType) -> Option<ScriptType> {
        let wl = self.whitelist;
        match op {
            BinaryOp::Add => casts::promote_add(wl, left, right),
            BinaryOp::Sub | BinaryOp::Mul | BinaryOp::Div | BinaryOp::Rem => casts::promote_numeric(wl, left, right),
            BinaryOp::BitAnd | BinaryOp::BitOr | BinaryOp::BitXor => casts::promote_bitwise(wl, left, right),
            BinaryOp::Shl | BinaryOp::Shr | BinaryOp::Ushr => {
                let amount_ok = right.is_def()
                    || casts::unboxed_numeric(wl, right).is_some_and(|t| t.is_integral());
                casts::promote_shift(wl, left).filter(|_| amount_ok)
            }
        }
    }

    /// Cast of a shift amount: `int` for typed shifts, `def` otherwise.
    fn shift_amount_cast(&self, op_ty: &ScriptType, from: &ScriptType, span: Span) -> CompileResult<Option<casts::Cast>> {
        let target = if op_ty.is_def() { ScriptType::Def } else { ScriptType::Int };
        self.cast_between(from, &target, true, span)
    }

    fn binary(&mut self, id: NodeId, op: BinaryOp, left: NodeId, right: NodeId) -> CompileResult<ScriptType> {
        let span = self.span(id);
        let left_ty = self.expr(left, None)?;
        let right_ty = self.expr(right, None)?;
        let op_ty = self
            .binary_type(op, &left_ty, &right_ty)
            .ok_or_else(|| self.operand_error(op.symbol(), &left_ty, &right_ty, span))?;

        if op == BinaryOp::Add && is_string(self.whitelist, &op_ty) {
            // concatenation converts each operand itself
        } else if op.is_shift() {
            self.coerce(left, &left_ty, &op_ty, false)?;
            if let Some(cast) = self.shift_amount_cast(&op_ty, &right_ty, self.span(right))? {
                self.decorations.set_cast(right, cast);
            }
        } else {
            self.coerce(left, &left_ty, &op_ty, false)?;
            self.coerce(right, &right_ty, &op_ty, false)?;
        }
        self.decorations.operations.insert(id, op_ty.clone());
        Ok(op_ty)
    }

    fn operand_error(&self, symbol: &str, left: &ScriptType, right: &ScriptType, span: Span) -> CompileError {
        CompileError::type_error(
            format!(
                "Cannot apply [{}] to types [{}] and [{}].",
                symbol,
                self.type_name(left),
                self.type_name(right)
            ),
            span,
        )
    }

    /// Analyze an assignment target and check that it can be written.
    fn lvalue(&mut self, target: NodeId) -> CompileResult<ScriptType> {
        let tree = self.tree;
        let span = self.span(target);
        match tree.kind(target) {
            NodeKind::Variable(name) => {
                let variable = self.variable(name, span)?;
                if variable.readonly {
                    return Err(CompileError::type_error(
                        format!("Cannot assign to captured variable [{}].", name),
                        span,
                    ));
                }
                self.decorations.variables.insert(
                    target,
                    VarRef {
                        slot: variable.slot,
                        ty: variable.ty.clone(),
                    },
                );
                self.decorations.set_value_type(target, variable.ty.clone());
                Ok(variable.ty)
            }
            NodeKind::Field { name, null_safe, .. } => {
                if *null_safe {
                    return Err(CompileError::type_error(
                        "Cannot assign to a null-safe field access.",
                        span,
                    ));
                }
                let ty = self.expr(target, None)?;
                let read_only = match self.decorations.field(target) {
                    Some(FieldAccess::ArrayLength) => true,
                    Some(FieldAccess::Instance(member)) | Some(FieldAccess::Static(member)) => {
                        match self.whitelist.member(*member) {
                            Member::Field(field) => field.constant.is_some() || field.setter.is_none(),
                            _ => true,
                        }
                    }
                    _ => false,
                };
                if read_only {
                    return Err(CompileError::type_error(
                        format!("Cannot assign to read-only field [{}].", name),
                        span,
                    ));
                }
                Ok(ty)
            }
            NodeKind::Index { .. } => self.expr(target, None),
            other => Err(CompileError::structure(
                format!("Cannot assign to a {}.", other.describe()),
                span,
            )),
        }
    }

    fn assign(&mut self, id: NodeId, target: NodeId, op: Option<BinaryOp>, value: NodeId) -> CompileResult<ScriptType> {
        let span = self.span(id);
        let target_ty = self.lvalue(target)?;
        let Some(op) = op else {
            self.expect(value, &target_ty)?;
            return Ok(target_ty);
        };

        let value_ty = self.expr(value, None)?;
        let op_ty = self
            .binary_type(op, &target_ty, &value_ty)
            .ok_or_else(|| self.operand_error(op.symbol(), &target_ty, &value_ty, span))?;
        let concat = op == BinaryOp::Add && is_string(self.whitelist, &op_ty);
        let (read_cast, value_cast) = if concat {
            (None, None)
        } else if op.is_shift() {
            (
                self.cast_between(&target_ty, &op_ty, false, span)?,
                self.shift_amount_cast(&op_ty, &value_ty, span)?,
            )
        } else {
            (
                self.cast_between(&target_ty, &op_ty, false, span)?,
                self.cast_between(&value_ty, &op_ty, false, span)?,
            )
        };
        // compound assignment narrows back implicitly
        let write_cast = self.cast_between(&op_ty, &target_ty, true, span)?;
        self.decorations.compounds.insert(
            id,
            CompoundPlan {
                op,
                op_ty,
                read_cast,
                value_cast,
                write_cast,
            },
        );
        Ok(target_ty)
    }

    fn inc_dec(&mut self, id: NodeId, target: NodeId, increment: bool) -> CompileResult<ScriptType> {
        let span = self.span(id);
        let target_ty = self.lvalue(target)?;
        let op_ty = casts::promote_unary(self.whitelist, &target_ty).ok_or_else(|| {
            CompileError::type_error(
                format!("Cannot increment or decrement type [{}].", self.type_name(&target_ty)),
                span,
            )
        })?;
        let plan = CompoundPlan {
            op: if increment { BinaryOp::Add } else { BinaryOp::Sub },
            read_cast: self.cast_between(&target_ty, &op_ty, false, span)?,
            value_cast: None,
            write_cast: self.cast_between(&op_ty, &target_ty, true, span)?,
            op_ty,
        };
        self.decorations.compounds.insert(id, plan);
        Ok(target_ty)
    }

    /// Analyze call arguments against parameter types.
    fn arguments(&mut self, args: &[NodeId], params: &[ScriptType]) -> CompileResult<()> {
        for (&arg, param) in args.iter().zip(params) {
            self.expect(arg, param)?;
        }
        Ok(())
    }

    /// Return type of a method, binding or field read.
    pub(super) fn member_return(&self, member: MemberId) -> ScriptType {
        match self.whitelist.member(member) {
            Member::Constructor(c) => ScriptType::Class(c.owner),
            Member::Method(m) => m.return_type.clone(),
            Member::Field(f) => f.ty.clone(),
            Member::ClassBinding(b) => b.return_type.clone(),
            Member::InstanceBinding(b) => b.return_type.clone(),
        }
    }

    /// `name(args)`: a script function first, then a whitelisted binding.
    fn local_call(&mut self, id: NodeId, name: &str, args: &[NodeId]) -> CompileResult<ScriptType> {
        let span = self.span(id);
        if let Some(index) = self.functions.lookup(name, args.len()) {
            let (params, return_type) = match self.functions.get(index) {
                Some(function) => (function.params.clone(), function.return_type.clone()),
                None => return Err(CompileError::internal("unknown function index", span)),
            };
            self.arguments(args, &params)?;
            self.decorations.calls.insert(id, CallTarget::Local(index));
            return Ok(return_type);
        }
        if let Some(member) = self.whitelist.lookup_binding(name, args.len()) {
            let params = self.whitelist.member(member).params();
            self.arguments(args, &params)?;
            self.decorations.calls.insert(id, CallTarget::Binding(member));
            return Ok(self.member_return(member));
        }
        Err(CompileError::unresolved(
            format!("Unknown call [{}] with [{}] arguments.", name, args.len()),
            span,
        ))
    }

    /// Class of a statically typed receiver; primitives use their box.
    fn receiver_class(&self, ty: &ScriptType, span: Span) -> CompileResult<ClassId> {
        match ty {
            ScriptType::Class(class) => Ok(*class),
            ScriptType::Array(_) => Ok(self.whitelist.object()),
            t if t.is_primitive() => self.whitelist.box_class(t).ok_or_else(|| {
                CompileError::unresolved(format!("Type [{}] has no members.", self.type_name(t)), span)
            }),
            t => Err(CompileError::type_error(
                format!("Type [{}] has no members.", self.type_name(t)),
                span,
            )),
        }
    }

    fn static_receiver(&self, receiver: NodeId) -> CompileResult<Option<ClassId>> {
        let NodeKind::StaticType(ty) = self.tree.kind(receiver) else {
            return Ok(None);
        };
        let span = self.span(receiver);
        match self.resolve_type(ty, span)? {
            ScriptType::Class(class) => Ok(Some(class)),
            other => Err(CompileError::type_error(
                format!("Type [{}] has no static members.", self.type_name(&other)),
                span,
            )),
        }
    }

    fn method_call(
        &mut self,
        id: NodeId,
        receiver: NodeId,
        name: &str,
        args: &[NodeId],
        null_safe: bool,
    ) -> CompileResult<ScriptType> {
        let span = self.span(id);
        if let Some(class) = self.static_receiver(receiver)? {
            let member = self
                .whitelist
                .lookup_method(class, name, args.len(), true)
                .map_err(|e| lookup_error(e, span))?;
            let params = self.whitelist.member(member).params();
            self.arguments(args, &params)?;
            self.decorations.calls.insert(id, CallTarget::StaticMethod(member));
            return Ok(self.member_return(member));
        }

        let receiver_ty = self.expr(receiver, None)?;
        if null_safe && receiver_ty.is_primitive() {
            return Err(CompileError::type_error(
                format!(
                    "Null-safe operator used on primitive type [{}].",
                    self.type_name(&receiver_ty)
                ),
                span,
            ));
        }

        if receiver_ty.is_def() {
            let mut captures = Vec::with_capacity(args.len());
            for &arg in args {
                let ty = self.expr(arg, Some(&ScriptType::Def))?;
                self.coerce(arg, &ty, &ScriptType::Def, false)?;
                captures.push(match self.tree.kind(arg) {
                    NodeKind::Lambda { .. } => Some(self.decorations.captures(arg).len() as u16),
                    NodeKind::FunctionRef { .. } => Some(0),
                    _ => None,
                });
            }
            let arity = u16::try_from(args.len())
                .map_err(|_| CompileError::limit("Too many arguments.", span))?;
            let reference = self.whitelist.def_reference(name, arity, captures);
            self.decorations.calls.insert(id, CallTarget::Dynamic(reference));
            return Ok(ScriptType::Def);
        }

        let class = self.receiver_class(&receiver_ty, span)?;
        let member = self
            .whitelist
            .lookup_method(class, name, args.len(), false)
            .map_err(|e| lookup_error(e, span))?;
        let params = self.whitelist.member(member).params();
        self.arguments(args, &params)?;
        let target = if self.whitelist.functional_method(class) == Some(member) {
            CallTarget::Functional(member)
        } else {
            CallTarget::Method(member)
        };
        self.decorations.calls.insert(id, target);
        let return_type = self.member_return(member);
        Ok(if null_safe && !return_type.is_void() {
            casts::nullable(self.whitelist, &return_type)
        } else {
            return_type
        })
    }

    fn field(&mut self, id: NodeId, receiver: NodeId, name: &str, null_safe: bool) -> CompileResult<ScriptType> {
        let span = self.span(id);
        if let Some(class) = self.static_receiver(receiver)? {
            let member = self
                .whitelist
                .lookup_field(class, name, true)
                .map_err(|e| lookup_error(e, span))?;
            if let Member::Field(field) = self.whitelist.member(member) {
                if let Some(constant) = &field.constant {
                    self.decorations.constants.insert(id, constant.clone());
                }
            }
            self.decorations.fields.insert(id, FieldAccess::Static(member));
            return Ok(self.member_return(member));
        }

        let receiver_ty = self.expr(receiver, None)?;
        if null_safe && receiver_ty.is_primitive() {
            return Err(CompileError::type_error(
                format!(
                    "Null-safe operator used on primitive type [{}].",
                    self.type_name(&receiver_ty)
                ),
                span,
            ));
        }
        let unknown = || {
            CompileError::unresolved(
                format!("Unknown field [{}] for type [{}].", name, self.type_name(&receiver_ty)),
                span,
            )
        };

        let (access, ty) = match &receiver_ty {
            ScriptType::Def => (FieldAccess::Dynamic(name.to_string()), ScriptType::Def),
            ScriptType::Array(_) if name == "length" => (FieldAccess::ArrayLength, ScriptType::Int),
            ScriptType::Class(class) => match self.whitelist.lookup_field(*class, name, false) {
                Ok(member) => (FieldAccess::Instance(member), self.member_return(member)),
                Err(_) => {
                    let is_map = self
                        .whitelist
                        .core()
                        .map
                        .is_some_and(|map| self.whitelist.is_subclass(*class, map));
                    if !is_map {
                        return Err(unknown());
                    }
                    let get = self.whitelist.lookup_method(*class, "get", 1, false);
                    let put = self.whitelist.lookup_method(*class, "put", 2, false);
                    match (get, put) {
                        (Ok(get), Ok(put)) => (FieldAccess::MapKey { get, put }, ScriptType::Def),
                        _ => return Err(unknown()),
                    }
                }
            },
            _ => return Err(unknown()),
        };
        self.decorations.fields.insert(id, access);
        Ok(if null_safe {
            casts::nullable(self.whitelist, &ty)
        } else {
            ty
        })
    }

    fn index(&mut self, id: NodeId, receiver: NodeId, index: NodeId) -> CompileResult<ScriptType> {
        let span = self.span(id);
        let receiver_ty = self.expr(receiver, None)?;
        let whitelist = self.whitelist;
        let core = whitelist.core();
        let is_a = |class: &ClassId, of: Option<ClassId>| of.is_some_and(|of| whitelist.is_subclass(*class, of));

        let (access, ty) = match &receiver_ty {
            ScriptType::Array(element) => (IndexAccess::Array, (**element).clone()),
            ScriptType::Def => (IndexAccess::Dynamic, ScriptType::Def),
            ScriptType::Class(class) if is_a(class, core.list) => (IndexAccess::List, ScriptType::Def),
            ScriptType::Class(class) if is_a(class, core.map) => (IndexAccess::Map, ScriptType::Def),
            other => {
                return Err(CompileError::type_error(
                    format!("Cannot index type [{}].", self.type_name(other)),
                    span,
                ))
            }
        };
        match access {
            IndexAccess::Array | IndexAccess::List => self.expect(index, &ScriptType::Int)?,
            IndexAccess::Map | IndexAccess::Dynamic => self.expect(index, &ScriptType::Def)?,
        }
        self.decorations.indexes.insert(id, access);
        Ok(ty)
    }
}

fn lookup_error(error: LookupError, span: Span) -> CompileError {
    let message = error.to_string();
    let mut chars = message.chars();
    let capitalized = match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect::<String>(),
        None => String::new(),
    };
    CompileError::unresolved(format!("{}.", capitalized), span)
}
