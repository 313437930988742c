//! Lambdas and function references.
//!
//! Both become synthetic entries of the function table. A lambda's function
//! takes its captured variables first, then the interface parameters. A
//! function reference becomes an adapter that forwards its parameters to the
//! referenced function, method or constructor.

use super::{AdapterPlan, AdapterTarget, Analyzer, Capture, FunctionBody, LocalFunction};
use crate::error::{CompileError, CompileResult};
use crate::parser::ast::{NodeKind, RefReceiver};
use crate::parser::visit;
use crate::parser::{NodeId, Span};
use crate::semantic::scope::Frame;
use crate::whitelist::{ClassId, MemberId, ScriptType};
use rustc_hash::FxHashSet;

/// The shape a lambda or function reference has to take.
struct Signature {
    /// Interface parameter types; `None` when the target is dynamic and
    /// every parameter is `def`
    params: Option<Vec<ScriptType>>,
    return_type: ScriptType,
    /// Static type of the resulting function value
    value_type: ScriptType,
}

impl Signature {
    fn params_or_def(&self, arity: usize) -> Vec<ScriptType> {
        self.params.clone().unwrap_or_else(|| vec![ScriptType::Def; arity])
    }
}

/// Resolved callee of a function reference, with its full parameter list.
struct RefTarget {
    target: AdapterTarget,
    params: Vec<ScriptType>,
    return_type: ScriptType,
}

impl<'a> Analyzer<'a> {
    fn functional_signature(&self, hint: Option<&ScriptType>, span: Span) -> CompileResult<Signature> {
        let whitelist = self.whitelist;
        match hint {
            None | Some(ScriptType::Def) => Ok(Signature {
                params: None,
                return_type: ScriptType::Def,
                value_type: ScriptType::Def,
            }),
            Some(ScriptType::Class(class)) if *class == whitelist.object() => Ok(Signature {
                params: None,
                return_type: ScriptType::Def,
                value_type: ScriptType::Class(*class),
            }),
            Some(ScriptType::Class(class)) if whitelist.is_functional(*class) => {
                let method = whitelist.functional_method(*class).ok_or_else(|| {
                    CompileError::internal("functional interface without a method", span)
                })?;
                Ok(Signature {
                    params: Some(whitelist.member(method).params()),
                    return_type: self.member_return(method),
                    value_type: ScriptType::Class(*class),
                })
            }
            Some(other) => Err(CompileError::type_error(
                format!(
                    "Cannot convert a function to type [{}]; it is not a functional interface.",
                    self.type_name(other)
                ),
                span,
            )),
        }
    }

    pub(super) fn lambda(&mut self, id: NodeId, hint: Option<&ScriptType>) -> CompileResult<ScriptType> {
        let tree = self.tree;
        let span = self.span(id);
        let NodeKind::Lambda { params, body } = tree.kind(id) else {
            return Err(CompileError::internal("expected a lambda", span));
        };
        let signature = self.functional_signature(hint, span)?;
        if let Some(expected) = &signature.params {
            if expected.len() != params.len() {
                return Err(CompileError::type_error(
                    format!(
                        "Incorrect number of parameters for [{}]: expected [{}] but found [{}].",
                        self.type_name(&signature.value_type),
                        expected.len(),
                        params.len()
                    ),
                    span,
                ));
            }
        }
        let interface_params = signature.params_or_def(params.len());
        let return_type = signature.return_type.clone();

        let captures = self.lambda_captures(*body, params.iter().map(|p| p.name.as_str()).collect());

        self.scopes.enter(Frame::new(return_type.clone(), true));
        let analyzed = self.lambda_body(id, params, *body, &captures, &interface_params, &return_type);
        let frame = self.scopes.exit();
        let (param_casts, synthetic_return) = analyzed?;
        let frame = frame.ok_or_else(|| CompileError::internal("lambda frame missing", span))?;

        let mut function_params: Vec<ScriptType> = captures.iter().map(|c| c.ty.clone()).collect();
        function_params.extend(interface_params);
        let index = self.functions.add_synthetic(LocalFunction {
            name: "lambda".to_string(),
            symbol: String::new(),
            params: function_params,
            return_type,
            body: FunctionBody::Lambda { node: id, param_casts },
            span,
            max_slots: frame.max_slots(),
            synthetic_return,
        });
        self.decorations.functions.insert(id, index);
        self.decorations.captures.insert(id, captures);
        Ok(signature.value_type)
    }

    /// Enclosing variables the lambda body reads, in order of first use.
    fn lambda_captures(&mut self, body: NodeId, params: FxHashSet<&str>) -> Vec<Capture> {
        let tree = self.tree;
        let mut seen = FxHashSet::default();
        let mut captures = Vec::new();
        for node in visit::collect(tree, body, |t, n| matches!(t.kind(n), NodeKind::Variable(_))) {
            let NodeKind::Variable(name) = tree.kind(node) else {
                continue;
            };
            if params.contains(name.as_str()) || !seen.insert(name.as_str()) {
                continue;
            }
            let Some(variable) = self.scopes.lookup(name) else {
                continue;
            };
            if variable.context_param {
                self.needs.insert(name.clone());
            }
            captures.push(Capture {
                name: name.clone(),
                outer_slot: variable.slot,
                ty: variable.ty.clone(),
            });
        }
        captures
    }

    /// Analyze parameters and body inside the lambda's frame. Returns the
    /// in-place parameter casts and whether a trailing return is needed.
    fn lambda_body(
        &mut self,
        id: NodeId,
        params: &[crate::parser::ast::LambdaParam],
        body: NodeId,
        captures: &[Capture],
        interface_params: &[ScriptType],
        return_type: &ScriptType,
    ) -> CompileResult<(Vec<(u16, super::Cast)>, bool)> {
        let span = self.span(id);
        for capture in captures {
            self.declare(&capture.name, capture.ty.clone(), span, true, false)?;
        }
        let mut param_casts = Vec::new();
        for (param, interface_ty) in params.iter().zip(interface_params) {
            let declared = match &param.ty {
                Some(ty) => self.resolve_type(ty, param.span)?,
                None => interface_ty.clone(),
            };
            if declared.is_void() {
                return Err(CompileError::type_error(
                    format!("Parameter [{}] cannot be void.", param.name),
                    param.span,
                ));
            }
            let variable = self.declare(&param.name, declared.clone(), param.span, false, false)?;
            if let Some(cast) = self.cast_between(interface_ty, &declared, true, param.span)? {
                param_casts.push((variable.slot, cast));
            }
        }

        if matches!(self.tree.kind(body), NodeKind::Block(_)) {
            let escape = self.statement(body)?;
            if !return_type.is_void() && !escape.method_escape {
                return Err(CompileError::structure(
                    "Not all paths provide a return value for lambda.",
                    span,
                ));
            }
            return Ok((param_casts, !escape.all_escape));
        }

        let ty = self.expr(body, Some(return_type))?;
        if return_type.is_void() {
            return Ok((param_casts, true));
        }
        if ty.is_void() {
            // a void call in a reference-returning lambda yields null
            if !return_type.is_reference() {
                return Err(CompileError::type_error(
                    format!(
                        "Cannot return [void] from a lambda returning [{}].",
                        self.type_name(return_type)
                    ),
                    span,
                ));
            }
        } else {
            self.coerce(body, &ty, return_type, false)?;
        }
        Ok((param_casts, false))
    }

    pub(super) fn function_ref(&mut self, id: NodeId, hint: Option<&ScriptType>) -> CompileResult<ScriptType> {
        let tree = self.tree;
        let span = self.span(id);
        let NodeKind::FunctionRef { receiver, name } = tree.kind(id) else {
            return Err(CompileError::internal("expected a function reference", span));
        };
        let signature = self.functional_signature(hint, span)?;
        let arity = signature.params.as_ref().map(Vec::len);
        let shown = match receiver {
            RefReceiver::This => format!("this::{}", name),
            RefReceiver::Type(ty) => format!("{}::{}", ty, name),
        };
        let not_found = || {
            let message = match arity {
                Some(n) => format!(
                    "Cannot find function reference [{}] with [{}] parameters for [{}].",
                    shown,
                    n,
                    self.type_name(&signature.value_type)
                ),
                None => format!("Function reference [{}] is unknown or ambiguous.", shown),
            };
            CompileError::unresolved(message, span)
        };

        let target = match receiver {
            RefReceiver::This => {
                let index = match arity {
                    Some(n) => self.functions.lookup(name, n),
                    None => unique(self.functions.named(name)),
                };
                let index = index.ok_or_else(not_found)?;
                let function = self.functions.get(index).ok_or_else(not_found)?;
                RefTarget {
                    target: AdapterTarget::Local(index),
                    params: function.params.clone(),
                    return_type: function.return_type.clone(),
                }
            }
            RefReceiver::Type(ty) => {
                let ScriptType::Class(class) = self.resolve_type(ty, span)? else {
                    return Err(not_found());
                };
                if name == "new" {
                    self.constructor_ref(class, arity).ok_or_else(not_found)?
                } else {
                    self.method_ref(class, name, arity).ok_or_else(not_found)?
                }
            }
        };

        let adapter_params = signature.params_or_def(target.params.len());
        let mut param_casts = Vec::with_capacity(adapter_params.len());
        for (from, to) in adapter_params.iter().zip(&target.params) {
            param_casts.push(self.cast_between(from, to, false, span)?);
        }
        let return_cast = if signature.return_type.is_void() || target.return_type.is_void() {
            if !signature.return_type.is_void() && !signature.return_type.is_reference() {
                return Err(CompileError::type_error(
                    format!(
                        "Function reference [{}] returns [void] where [{}] is required.",
                        shown,
                        self.type_name(&signature.return_type)
                    ),
                    span,
                ));
            }
            None
        } else {
            self.cast_between(&target.return_type, &signature.return_type, false, span)?
        };

        let max_slots = u16::try_from(adapter_params.len())
            .map_err(|_| CompileError::limit("Too many parameters.", span))?;
        let index = self.functions.add_synthetic(LocalFunction {
            name: shown,
            symbol: String::new(),
            params: adapter_params,
            return_type: signature.return_type.clone(),
            body: FunctionBody::Adapter(AdapterPlan {
                target: target.target,
                param_casts,
                return_cast,
                target_return: target.return_type,
            }),
            span,
            max_slots,
            synthetic_return: false,
        });
        self.decorations.functions.insert(id, index);
        Ok(signature.value_type)
    }

    fn constructor_ref(&self, class: ClassId, arity: Option<usize>) -> Option<RefTarget> {
        let member = match arity {
            Some(n) => self.whitelist.lookup_constructor(class, n).ok()?,
            None => unique(self.whitelist.class(class).constructors.values().copied().collect())?,
        };
        Some(RefTarget {
            target: AdapterTarget::Constructor(member),
            params: self.whitelist.member(member).params(),
            return_type: ScriptType::Class(class),
        })
    }

    /// `Type::name`: a static method taking every argument, or an instance
    /// method whose receiver is the first argument.
    fn method_ref(&self, class: ClassId, name: &str, arity: Option<usize>) -> Option<RefTarget> {
        let whitelist = self.whitelist;
        let as_static = |member: MemberId| RefTarget {
            target: AdapterTarget::Static(member),
            params: whitelist.member(member).params(),
            return_type: self.member_return(member),
        };
        let as_virtual = |member: MemberId| {
            let mut params = vec![ScriptType::Class(class)];
            params.extend(whitelist.member(member).params());
            RefTarget {
                target: AdapterTarget::Virtual(member),
                params,
                return_type: self.member_return(member),
            }
        };
        match arity {
            Some(n) => {
                if let Ok(member) = whitelist.lookup_method(class, name, n, true) {
                    return Some(as_static(member));
                }
                let member = whitelist.lookup_method(class, name, n.checked_sub(1)?, false).ok()?;
                Some(as_virtual(member))
            }
            None => {
                let statics = whitelist.methods_named(class, name, true);
                let virtuals = whitelist.methods_named(class, name, false);
                match (statics.as_slice(), virtuals.as_slice()) {
                    ([member], []) => Some(as_static(*member)),
                    ([], [member]) => Some(as_virtual(*member)),
                    _ => None,
                }
            }
        }
    }
}

fn unique<T>(mut candidates: Vec<T>) -> Option<T> {
    if candidates.len() == 1 {
        candidates.pop()
    } else {
        None
    }
}
