//! Semantic analysis
//!
//! Two passes over the syntax tree. The header pass registers every
//! declared function so bodies can call each other in any order; the body
//! pass computes value types bottom-up, pushes expected types top-down,
//! allocates variable slots and records the casts each use site needs. All
//! results go into [`Decorations`] side tables; the tree is never changed.
//!
//! Analysis stops at the first error.

pub mod casts;
pub mod decoration;
pub mod functions;
pub mod regex;
pub mod scope;

mod expr;
mod lambda;
mod stmt;

pub use casts::Cast;
pub use decoration::{
    CallTarget, Capture, CompoundPlan, Decorations, Escape, FieldAccess, ForEachPlan, IndexAccess,
    RegexInfo, VarRef,
};
pub use functions::{AdapterPlan, AdapterTarget, FunctionBody, FunctionTable, LocalFunction};

use crate::context::{ResolvedContext, ScriptContext};
use crate::error::{CompileError, CompileResult};
use crate::parser::ast::{Literal, NodeKind, TypeName};
use crate::parser::{NodeId, Span, SyntaxTree};
use crate::settings::CompilerSettings;
use crate::whitelist::{ClassId, ScriptType, Whitelist};
use rustc_hash::FxHashSet;
use scope::{Frame, ScopeError, Scopes, Variable};

/// Facts about the entry function.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntryInfo {
    pub params: Vec<ScriptType>,
    pub return_type: ScriptType,
    pub max_slots: u16,
    pub synthetic_return: bool,
    /// Last expression statement, returned as the script's value
    pub implicit_return: Option<NodeId>,
}

/// Result of analyzing one script.
#[derive(Debug)]
pub struct Analysis {
    pub decorations: Decorations,
    pub functions: FunctionTable,
    pub entry: EntryInfo,
    pub context: ResolvedContext,
    /// Context parameters the script reads
    pub needs: FxHashSet<String>,
    /// Sorted start offsets of every statement
    pub statements: Vec<usize>,
}

/// Analyze a parsed script against a context and whitelist.
pub fn analyze(
    tree: &SyntaxTree,
    whitelist: &Whitelist,
    context: &ScriptContext,
    settings: &CompilerSettings,
) -> CompileResult<Analysis> {
    let resolved = context
        .resolve(whitelist)
        .map_err(|e| CompileError::unresolved(e.to_string(), tree.span(tree.root())))?;

    let mut analyzer = Analyzer::new(tree, whitelist, context, settings, &resolved);
    let (functions, statements) = tree.source_parts();
    let declared = analyzer.declare_functions(functions)?;
    for index in declared {
        analyzer.analyze_function(index)?;
    }
    let entry = analyzer.analyze_entry(statements, &resolved)?;

    let mut offsets = analyzer.statements;
    offsets.sort_unstable();
    offsets.dedup();
    tracing::trace!(
        functions = analyzer.functions.len(),
        typed_nodes = analyzer.decorations.typed_nodes(),
        "analysis complete"
    );
    Ok(Analysis {
        decorations: analyzer.decorations,
        functions: analyzer.functions,
        entry,
        context: resolved,
        needs: analyzer.needs,
        statements: offsets,
    })
}

pub(crate) struct Analyzer<'a> {
    tree: &'a SyntaxTree,
    whitelist: &'a Whitelist,
    context: &'a ScriptContext,
    settings: &'a CompilerSettings,
    decorations: Decorations,
    functions: FunctionTable,
    scopes: Scopes,
    needs: FxHashSet<String>,
    statements: Vec<usize>,
}

impl<'a> Analyzer<'a> {
    fn new(
        tree: &'a SyntaxTree,
        whitelist: &'a Whitelist,
        context: &'a ScriptContext,
        settings: &'a CompilerSettings,
        resolved: &ResolvedContext,
    ) -> Self {
        Self {
            tree,
            whitelist,
            context,
            settings,
            decorations: Decorations::default(),
            functions: FunctionTable::default(),
            scopes: Scopes::new(Frame::new(resolved.return_type.clone(), false)),
            needs: FxHashSet::default(),
            statements: Vec::new(),
        }
    }

    fn span(&self, id: NodeId) -> Span {
        self.tree.span(id)
    }

    fn type_name(&self, ty: &ScriptType) -> String {
        self.whitelist.type_name(ty)
    }

    /// Resolve a written type through the context, then the whitelist.
    fn resolve_type(&self, ty: &TypeName, span: Span) -> CompileResult<ScriptType> {
        let resolved = self
            .context
            .resolve_type(self.whitelist, &ty.name)
            .ok_or_else(|| CompileError::unresolved(format!("Unknown type [{}].", ty.name), span))?;
        if resolved.is_void() && ty.dims > 0 {
            return Err(CompileError::type_error(format!("Cannot create an array of [void]: [{}].", ty), span));
        }
        Ok(resolved.with_dims(ty.dims))
    }

    /// A core class the language itself relies on.
    fn core_type(&self, class: Option<ClassId>, name: &str, span: Span) -> CompileResult<ScriptType> {
        class
            .map(ScriptType::Class)
            .ok_or_else(|| CompileError::unresolved(format!("Class [{}] is not whitelisted.", name), span))
    }

    fn declare(&mut self, name: &str, ty: ScriptType, span: Span, readonly: bool, context_param: bool) -> CompileResult<Variable> {
        self.scopes
            .current_mut()
            .declare(name, ty, readonly, context_param)
            .map_err(|e| match e {
                ScopeError::AlreadyDefined => {
                    CompileError::structure(format!("Variable [{}] is already defined.", name), span)
                }
                ScopeError::TooManyLocals => CompileError::limit("Too many local variables.", span),
            })
    }

    fn hidden_slot(&mut self, span: Span) -> CompileResult<u16> {
        self.scopes
            .current_mut()
            .hidden()
            .map_err(|_| CompileError::limit("Too many local variables.", span))
    }

    /// The run-time conversion from `from` to `to`; `None` when nothing
    /// needs to happen.
    fn cast_between(&self, from: &ScriptType, to: &ScriptType, explicit: bool, span: Span) -> CompileResult<Option<Cast>> {
        match casts::cast_for(self.whitelist, from, to, explicit) {
            None => Err(CompileError::type_error(
                format!(
                    "Cannot cast from [{}] to [{}].",
                    self.type_name(from),
                    self.type_name(to)
                ),
                span,
            )),
            Some(cast) => Ok(cast.filter(|c| !c.is_noop())),
        }
    }

    /// Record the cast needed to use node `id` (of type `from`) as `to`.
    fn coerce(&mut self, id: NodeId, from: &ScriptType, to: &ScriptType, explicit: bool) -> CompileResult<()> {
        if let Some(cast) = self.cast_between(from, to, explicit, self.span(id))? {
            self.decorations.set_cast(id, cast);
        }
        Ok(())
    }

    /// Analyze an expression that must be usable as `target`.
    fn expect(&mut self, id: NodeId, target: &ScriptType) -> CompileResult<()> {
        let ty = self.expr(id, Some(target))?;
        self.coerce(id, &ty, target, false)
    }

    fn is_null_literal(&self, id: NodeId) -> bool {
        matches!(self.tree.kind(id), NodeKind::Literal(Literal::Null))
    }

    fn bool_literal(&self, id: NodeId) -> Option<bool> {
        match self.tree.kind(id) {
            NodeKind::Literal(Literal::Bool(b)) => Some(*b),
            _ => None,
        }
    }

    /// Header pass: register every declared function.
    fn declare_functions(&mut self, functions: &[NodeId]) -> CompileResult<Vec<usize>> {
        let tree = self.tree;
        let mut declared = Vec::with_capacity(functions.len());
        for &id in functions {
            let NodeKind::Function {
                return_type,
                name,
                params,
                ..
            } = tree.kind(id)
            else {
                return Err(CompileError::internal("expected a function declaration", self.span(id)));
            };
            let span = self.span(id);
            let return_type = self.resolve_type(return_type, span)?;
            let mut param_types = Vec::with_capacity(params.len());
            for param in params {
                let ty = self.resolve_type(&param.ty, param.span)?;
                if ty.is_void() {
                    return Err(CompileError::type_error(
                        format!("Parameter [{}] cannot be void.", param.name),
                        param.span,
                    ));
                }
                param_types.push(ty);
            }
            let function = LocalFunction {
                name: name.clone(),
                symbol: format!("{}${}", name, params.len()),
                params: param_types,
                return_type,
                body: FunctionBody::Declared(id),
                span,
                max_slots: 0,
                synthetic_return: false,
            };
            let index = self.functions.declare(function).ok_or_else(|| {
                CompileError::structure(format!("Duplicate function [{}/{}].", name, params.len()), span)
            })?;
            declared.push(index);
        }
        Ok(declared)
    }
}

#[cfg(test)]
mod tests;
