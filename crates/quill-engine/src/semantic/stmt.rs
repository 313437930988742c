//! Statement analysis and escape facts.

use super::{Analyzer, EntryInfo, ForEachPlan, FunctionBody, VarRef};
use crate::context::ResolvedContext;
use crate::error::{CompileError, CompileResult};
use crate::parser::ast::{NodeKind, TypeName};
use crate::parser::{NodeId, Span};
use crate::semantic::decoration::Escape;
use crate::semantic::scope::Frame;
use crate::whitelist::ScriptType;

/// Escape facts of a statement that always leaves the function.
const METHOD_ESCAPE: Escape = Escape {
    method_escape: true,
    loop_escape: true,
    all_escape: true,
    any_continue: false,
    any_break: false,
};

impl<'a> Analyzer<'a> {
    /// Analyze the body of a declared function.
    pub(super) fn analyze_function(&mut self, index: usize) -> CompileResult<()> {
        let tree = self.tree;
        let Some(function) = self.functions.get(index).cloned() else {
            return Err(CompileError::internal("unknown function index", Span::default()));
        };
        let FunctionBody::Declared(node) = function.body else {
            return Err(CompileError::internal("expected a declared function", function.span));
        };
        let NodeKind::Function { params, body, .. } = tree.kind(node) else {
            return Err(CompileError::internal("expected a function declaration", function.span));
        };

        self.scopes.enter(Frame::new(function.return_type.clone(), false));
        for (param, ty) in params.iter().zip(&function.params) {
            self.declare(&param.name, ty.clone(), param.span, false, false)?;
        }
        let escape = self.statement(*body)?;
        let frame = self
            .scopes
            .exit()
            .ok_or_else(|| CompileError::internal("function frame missing", function.span))?;

        if !function.return_type.is_void() && !escape.method_escape {
            return Err(CompileError::structure(
                format!(
                    "Not all paths provide a return value for function [{}] with [{}] parameters.",
                    function.name,
                    function.arity()
                ),
                function.span,
            ));
        }
        if let Some(entry) = self.functions.get_mut(index) {
            entry.max_slots = frame.max_slots();
            entry.synthetic_return = !escape.all_escape;
        }
        Ok(())
    }

    /// Analyze the entry body. Context parameters occupy the first slots.
    pub(super) fn analyze_entry(
        &mut self,
        statements: &[NodeId],
        resolved: &ResolvedContext,
    ) -> CompileResult<EntryInfo> {
        let tree = self.tree;
        for param in &resolved.params {
            self.declare(&param.name, param.ty.clone(), Span::default(), false, true)?;
        }
        let return_type = resolved.return_type.clone();

        // the trailing expression statement is the script's value
        let candidate = match statements.last() {
            Some(&last) if !return_type.is_void() => match tree.kind(last) {
                NodeKind::ExprStatement(value) => Some((last, *value)),
                _ => None,
            },
            _ => None,
        };

        let mut implicit_return = None;
        let mut result = Escape::default();
        let mut escaped = false;
        for &statement in statements {
            if matches!(tree.kind(statement), NodeKind::Empty) {
                continue;
            }
            if escaped {
                return Err(CompileError::structure("Unreachable statement.", self.span(statement)));
            }
            let escape = match candidate {
                Some((node, value)) if node == statement => {
                    self.statements.push(self.span(statement).start);
                    let ty = self.expr(value, Some(&return_type))?;
                    if ty.is_void() {
                        self.expression_statement(statement, value, false)?
                    } else {
                        self.coerce(value, &ty, &return_type, false)?;
                        implicit_return = Some(value);
                        METHOD_ESCAPE
                    }
                }
                _ => self.statement(statement)?,
            };
            self.decorations.escapes.insert(statement, escape);
            result = sequence(result, escape);
            escaped = escape.all_escape;
        }

        Ok(EntryInfo {
            params: resolved.params.iter().map(|p| p.ty.clone()).collect(),
            return_type,
            max_slots: self.scopes.current().max_slots(),
            synthetic_return: !result.all_escape,
            implicit_return,
        })
    }

    pub(super) fn statement(&mut self, id: NodeId) -> CompileResult<Escape> {
        let tree = self.tree;
        let span = self.span(id);
        if !matches!(
            tree.kind(id),
            NodeKind::Block(_) | NodeKind::Declarations(_) | NodeKind::Empty
        ) {
            self.statements.push(span.start);
        }

        let escape = match tree.kind(id) {
            NodeKind::Block(items) => {
                self.scopes.current_mut().push_scope();
                let escape = self.sequence(items)?;
                self.scopes.current_mut().pop_scope();
                escape
            }
            NodeKind::Declarations(items) => {
                for &item in items {
                    self.statement(item)?;
                }
                Escape::default()
            }
            NodeKind::Declaration { ty, name, init } => {
                self.declaration(id, ty, name, *init)?;
                Escape::default()
            }
            NodeKind::If {
                condition,
                then_branch,
                else_branch,
            } => {
                if self.bool_literal(*condition).is_some() {
                    return Err(CompileError::structure("Extraneous if statement.", span));
                }
                self.expect(*condition, &ScriptType::Boolean)?;
                let then = self.branch(*then_branch)?;
                match else_branch {
                    None => Escape {
                        any_continue: then.any_continue,
                        any_break: then.any_break,
                        ..Escape::default()
                    },
                    Some(other) => {
                        let other = self.branch(*other)?;
                        both(then, other)
                    }
                }
            }
            NodeKind::While { condition, body } => {
                let constant = self.bool_literal(*condition);
                if constant == Some(false) {
                    return Err(CompileError::structure("Extraneous while loop.", span));
                }
                self.expect(*condition, &ScriptType::Boolean)?;
                let body = self.loop_body(*body)?;
                loop_result(constant == Some(true), body)
            }
            NodeKind::DoWhile { body, condition } => {
                let constant = self.bool_literal(*condition);
                if constant == Some(false) {
                    return Err(CompileError::structure("Extraneous do while loop.", span));
                }
                let body = self.loop_body(Some(*body))?;
                self.expect(*condition, &ScriptType::Boolean)?;
                loop_result(constant == Some(true), body)
            }
            NodeKind::For {
                init,
                condition,
                update,
                body,
            } => {
                self.scopes.current_mut().push_scope();
                if let Some(init) = init {
                    if matches!(tree.kind(*init), NodeKind::Declarations(_)) {
                        self.statement(*init)?;
                    } else {
                        self.expr(*init, None)?;
                    }
                }
                let constant = condition.and_then(|c| self.bool_literal(c));
                if constant == Some(false) {
                    return Err(CompileError::structure("Extraneous for loop.", span));
                }
                if let Some(condition) = condition {
                    self.expect(*condition, &ScriptType::Boolean)?;
                }
                let body = self.loop_body(*body)?;
                if let Some(update) = update {
                    self.expr(*update, None)?;
                }
                self.scopes.current_mut().pop_scope();
                loop_result(condition.is_none() || constant == Some(true), body)
            }
            NodeKind::ForEach {
                ty,
                name,
                iterable,
                body,
            } => {
                self.scopes.current_mut().push_scope();
                self.for_each(id, ty, name, *iterable)?;
                self.loop_body(Some(*body))?;
                self.scopes.current_mut().pop_scope();
                Escape::default()
            }
            NodeKind::Return(value) => {
                self.return_statement(*value, span)?;
                METHOD_ESCAPE
            }
            NodeKind::Break | NodeKind::Continue => {
                let is_break = matches!(tree.kind(id), NodeKind::Break);
                if self.scopes.current().loop_depth == 0 {
                    let what = if is_break { "Break" } else { "Continue" };
                    return Err(CompileError::structure(
                        format!("{} statement outside of a loop.", what),
                        span,
                    ));
                }
                Escape {
                    loop_escape: true,
                    all_escape: true,
                    any_break: is_break,
                    any_continue: !is_break,
                    ..Escape::default()
                }
            }
            NodeKind::Throw(value) => {
                let exception = self.core_type(self.whitelist.core().exception, "Exception", span)?;
                self.expect(*value, &exception)?;
                METHOD_ESCAPE
            }
            NodeKind::Try { body, catches } => {
                let mut escape = self.statement(*body)?;
                for &catch in catches {
                    let caught = self.statement(catch)?;
                    escape = both(escape, caught);
                }
                escape
            }
            NodeKind::Catch { ty, name, body } => {
                self.scopes.current_mut().push_scope();
                let caught = self.resolve_type(ty, span)?;
                let is_exception = match (&caught, self.whitelist.core().exception) {
                    (ScriptType::Class(class), Some(exception)) => {
                        self.whitelist.is_subclass(*class, exception) && *class != self.whitelist.object()
                    }
                    _ => false,
                };
                if !is_exception {
                    return Err(CompileError::type_error(
                        format!("Not an exception type [{}].", self.type_name(&caught)),
                        span,
                    ));
                }
                let variable = self.declare(name, caught.clone(), span, false, false)?;
                self.decorations.variables.insert(
                    id,
                    VarRef {
                        slot: variable.slot,
                        ty: caught.clone(),
                    },
                );
                self.decorations.types.insert(id, caught);
                let escape = self.statement(*body)?;
                self.scopes.current_mut().pop_scope();
                escape
            }
            NodeKind::ExprStatement(value) => self.expression_statement(id, *value, true)?,
            NodeKind::Empty => Escape::default(),
            other => {
                return Err(CompileError::internal(
                    format!("{} in statement position", other.describe()),
                    span,
                ))
            }
        };
        self.decorations.escapes.insert(id, escape);
        Ok(escape)
    }

    /// Statements of a block, rejecting anything after an escape.
    fn sequence(&mut self, items: &[NodeId]) -> CompileResult<Escape> {
        let mut result = Escape::default();
        let mut escaped = false;
        for &item in items {
            if matches!(self.tree.kind(item), NodeKind::Empty) {
                continue;
            }
            if escaped {
                return Err(CompileError::structure("Unreachable statement.", self.span(item)));
            }
            let escape = self.statement(item)?;
            result = sequence(result, escape);
            escaped = escape.all_escape;
        }
        Ok(result)
    }

    /// A statement in its own scope (if/else branches).
    fn branch(&mut self, id: NodeId) -> CompileResult<Escape> {
        self.scopes.current_mut().push_scope();
        let escape = self.statement(id)?;
        self.scopes.current_mut().pop_scope();
        Ok(escape)
    }

    fn loop_body(&mut self, body: Option<NodeId>) -> CompileResult<Escape> {
        let Some(body) = body else {
            return Ok(Escape::default());
        };
        self.scopes.current_mut().loop_depth += 1;
        let escape = self.branch(body);
        self.scopes.current_mut().loop_depth -= 1;
        escape
    }

    fn declaration(&mut self, id: NodeId, ty: &TypeName, name: &str, init: Option<NodeId>) -> CompileResult<()> {
        let span = self.span(id);
        let ty = self.resolve_type(ty, span)?;
        if ty.is_void() {
            return Err(CompileError::type_error(
                format!("Cannot declare variable [{}] of type [void].", name),
                span,
            ));
        }
        // the initializer cannot see the variable it initializes
        if let Some(init) = init {
            self.expect(init, &ty)?;
        }
        let variable = self.declare(name, ty.clone(), span, false, false)?;
        self.decorations.types.insert(id, ty.clone());
        self.decorations.variables.insert(id, VarRef { slot: variable.slot, ty });
        Ok(())
    }

    fn expression_statement(&mut self, id: NodeId, value: NodeId, analyze: bool) -> CompileResult<Escape> {
        let effectful = matches!(
            self.tree.kind(value),
            NodeKind::Assign { .. }
                | NodeKind::IncDec { .. }
                | NodeKind::Call { .. }
                | NodeKind::MethodCall { .. }
                | NodeKind::NewObject { .. }
        );
        if !effectful {
            return Err(CompileError::structure("Not a statement.", self.span(id)));
        }
        if analyze {
            self.expr(value, None)?;
        }
        Ok(Escape::default())
    }

    fn return_statement(&mut self, value: Option<NodeId>, span: Span) -> CompileResult<()> {
        let return_type = self.scopes.current().return_type.clone();
        match value {
            None if return_type.is_void() => Ok(()),
            None => Err(CompileError::type_error(
                format!("Must return a value of type [{}].", self.type_name(&return_type)),
                span,
            )),
            Some(_) if return_type.is_void() => Err(CompileError::type_error(
                "Cannot return a value from a void function.",
                span,
            )),
            Some(value) => self.expect(value, &return_type),
        }
    }

    /// Pick the for-each shape from the static type of the iterable and
    /// declare the loop variable.
    fn for_each(&mut self, id: NodeId, ty: &TypeName, name: &str, iterable: NodeId) -> CompileResult<()> {
        let span = self.span(id);
        let iterable_ty = self.expr(iterable, None)?;
        let variable_ty = self.resolve_type(ty, span)?;
        if variable_ty.is_void() {
            return Err(CompileError::type_error(
                format!("Cannot declare variable [{}] of type [void].", name),
                span,
            ));
        }
        let whitelist = self.whitelist;
        let core = whitelist.core();
        let not_iterable = CompileError::type_error(
            format!("Cannot iterate over type [{}].", self.type_name(&iterable_ty)),
            self.span(iterable),
        );

        let plan = match &iterable_ty {
            ScriptType::Array(element) => {
                let cast = self.cast_between(element, &variable_ty, false, span)?;
                ForEachPlan::Array {
                    array_slot: self.hidden_slot(span)?,
                    index_slot: self.hidden_slot(span)?,
                    element: (**element).clone(),
                    cast,
                }
            }
            ScriptType::Def => ForEachPlan::Dynamic {
                iterator_slot: self.hidden_slot(span)?,
                cast: self.cast_between(&ScriptType::Def, &variable_ty, false, span)?,
            },
            ScriptType::Class(class) if core.map.is_some_and(|map| whitelist.is_subclass(*class, map)) => {
                ForEachPlan::Dynamic {
                    iterator_slot: self.hidden_slot(span)?,
                    cast: self.cast_between(&ScriptType::Def, &variable_ty, false, span)?,
                }
            }
            ScriptType::Class(class)
                if core
                    .iterable
                    .is_some_and(|iterable| whitelist.is_subclass(*class, iterable)) =>
            {
                let member_error = |e: crate::whitelist::LookupError| CompileError::unresolved(e.to_string(), span);
                let iterator = whitelist
                    .lookup_method(*class, "iterator", 0, false)
                    .map_err(member_error)?;
                let iterator_class = self
                    .member_return(iterator)
                    .class_id()
                    .ok_or_else(|| not_iterable.clone())?;
                let has_next = whitelist
                    .lookup_method(iterator_class, "hasNext", 0, false)
                    .map_err(member_error)?;
                let next = whitelist
                    .lookup_method(iterator_class, "next", 0, false)
                    .map_err(member_error)?;
                let element = self.member_return(next);
                ForEachPlan::Iterable {
                    iterator_slot: self.hidden_slot(span)?,
                    iterator,
                    has_next,
                    next,
                    cast: self.cast_between(&element, &variable_ty, false, span)?,
                }
            }
            _ => return Err(not_iterable),
        };

        let variable = self.declare(name, variable_ty.clone(), span, false, false)?;
        self.decorations.types.insert(id, variable_ty.clone());
        self.decorations.variables.insert(
            id,
            VarRef {
                slot: variable.slot,
                ty: variable_ty,
            },
        );
        self.decorations.foreach.insert(id, plan);
        Ok(())
    }
}

/// Facts of `first; second` where `second` is reached.
fn sequence(first: Escape, second: Escape) -> Escape {
    Escape {
        method_escape: second.method_escape,
        loop_escape: second.loop_escape,
        all_escape: second.all_escape,
        any_continue: first.any_continue || second.any_continue,
        any_break: first.any_break || second.any_break,
    }
}

/// Facts of two alternative paths (if/else, try/catch).
fn both(a: Escape, b: Escape) -> Escape {
    Escape {
        method_escape: a.method_escape && b.method_escape,
        loop_escape: a.loop_escape && b.loop_escape,
        all_escape: a.all_escape && b.all_escape,
        any_continue: a.any_continue || b.any_continue,
        any_break: a.any_break || b.any_break,
    }
}

/// A loop that never exits normally escapes its function.
fn loop_result(continuous: bool, body: Escape) -> Escape {
    if continuous && !body.any_break {
        METHOD_ESCAPE
    } else {
        Escape::default()
    }
}
