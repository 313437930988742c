//! Script contexts: the fixed entry points a host exposes to scripts.
//!
//! A context names the return type of a script and the parameters it is
//! called with, split into three groups passed at different times:
//! factory parameters (once per factory instance), stateful parameters
//! (once per stateful instance) and execute parameters (every call).

use crate::whitelist::{split_array_suffix, ScriptType, Whitelist};
use rustc_hash::{FxHashMap, FxHashSet};
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ContextError {
    #[error("Context [{context}] references unknown type [{name}]")]
    UnknownType { context: String, name: String },

    #[error("Context [{context}] declares parameter [{name}] twice")]
    DuplicateParam { context: String, name: String },

    #[error("Context [{context}] declares parameter [{name}] as void")]
    VoidParam { context: String, name: String },
}

/// When the value of a context parameter is supplied.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ParamGroup {
    Factory,
    Stateful,
    Execute,
}

/// A named, typed context parameter. The type is a canonical type name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContextParam {
    pub name: String,
    pub ty: String,
}

/// Declaration of a script context.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScriptContext {
    pub name: String,
    pub return_type: String,
    pub factory_params: Vec<ContextParam>,
    pub stateful_params: Vec<ContextParam>,
    pub execute_params: Vec<ContextParam>,
    /// Type names registered by the context itself, mapped to whitelist types
    types: FxHashMap<String, String>,
}

impl ScriptContext {
    pub fn new(name: impl Into<String>, return_type: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            return_type: return_type.into(),
            factory_params: Vec::new(),
            stateful_params: Vec::new(),
            execute_params: Vec::new(),
            types: FxHashMap::default(),
        }
    }

    /// The context used by the command line: returns `def`, takes a
    /// `Map params` on every call.
    pub fn default_context() -> Self {
        Self::new("script", "def").execute_param("params", "Map")
    }

    pub fn factory_param(mut self, name: impl Into<String>, ty: impl Into<String>) -> Self {
        self.factory_params.push(ContextParam {
            name: name.into(),
            ty: ty.into(),
        });
        self
    }

    pub fn stateful_param(mut self, name: impl Into<String>, ty: impl Into<String>) -> Self {
        self.stateful_params.push(ContextParam {
            name: name.into(),
            ty: ty.into(),
        });
        self
    }

    pub fn execute_param(mut self, name: impl Into<String>, ty: impl Into<String>) -> Self {
        self.execute_params.push(ContextParam {
            name: name.into(),
            ty: ty.into(),
        });
        self
    }

    /// Register a context-specific type name standing for a whitelist type.
    pub fn register_type(mut self, alias: impl Into<String>, target: impl Into<String>) -> Self {
        self.types.insert(alias.into(), target.into());
        self
    }

    pub fn registered_types(&self) -> impl Iterator<Item = (&str, &str)> {
        self.types.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn has_stateful_params(&self) -> bool {
        !self.stateful_params.is_empty()
    }

    /// All parameters in entry order: factory, stateful, execute.
    pub fn params(&self) -> impl Iterator<Item = (ParamGroup, &ContextParam)> {
        self.factory_params
            .iter()
            .map(|p| (ParamGroup::Factory, p))
            .chain(self.stateful_params.iter().map(|p| (ParamGroup::Stateful, p)))
            .chain(self.execute_params.iter().map(|p| (ParamGroup::Execute, p)))
    }

    /// Whether `name` is a type known to the context or the whitelist.
    pub fn is_type_name(&self, whitelist: &Whitelist, name: &str) -> bool {
        self.types.contains_key(name) || whitelist.class_by_name(name).is_some()
    }

    /// Resolve a type name, registered names first, then the whitelist.
    pub fn resolve_type(&self, whitelist: &Whitelist, name: &str) -> Option<ScriptType> {
        let (base, dims) = split_array_suffix(name);
        match self.types.get(base) {
            Some(target) => Some(whitelist.lookup_type(target)?.with_dims(dims)),
            None => whitelist.lookup_type(name),
        }
    }

    /// Check every type the context names and resolve its signature.
    pub fn resolve(&self, whitelist: &Whitelist) -> Result<ResolvedContext, ContextError> {
        let unknown = |name: &str| ContextError::UnknownType {
            context: self.name.clone(),
            name: name.to_string(),
        };
        let return_type = self
            .resolve_type(whitelist, &self.return_type)
            .ok_or_else(|| unknown(&self.return_type))?;

        let mut seen = FxHashSet::default();
        let mut params = Vec::new();
        for (group, param) in self.params() {
            if !seen.insert(param.name.as_str()) {
                return Err(ContextError::DuplicateParam {
                    context: self.name.clone(),
                    name: param.name.clone(),
                });
            }
            let ty = self.resolve_type(whitelist, &param.ty).ok_or_else(|| unknown(&param.ty))?;
            if ty.is_void() {
                return Err(ContextError::VoidParam {
                    context: self.name.clone(),
                    name: param.name.clone(),
                });
            }
            params.push(ResolvedParam {
                name: param.name.clone(),
                ty,
                group,
            });
        }
        Ok(ResolvedContext { return_type, params })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedParam {
    pub name: String,
    pub ty: ScriptType,
    pub group: ParamGroup,
}

/// A context whose types have been resolved against a whitelist.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedContext {
    pub return_type: ScriptType,
    /// Entry parameters in slot order
    pub params: Vec<ResolvedParam>,
}

impl ResolvedContext {
    pub fn count(&self, group: ParamGroup) -> usize {
        self.params.iter().filter(|p| p.group == group).count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::whitelist::standard;

    #[test]
    fn test_params_in_entry_order() {
        let ctx = ScriptContext::new("score", "double")
            .execute_param("doc", "Map")
            .factory_param("params", "Map")
            .stateful_param("state", "List");
        let names: Vec<_> = ctx.params().map(|(_, p)| p.name.as_str()).collect();
        assert_eq!(names, vec!["params", "state", "doc"]);
    }

    #[test]
    fn test_registered_types_resolve_first() {
        let wl = standard();
        let ctx = ScriptContext::new("c", "Document[]").register_type("Document", "Map");
        let resolved = ctx.resolve(&wl).unwrap();
        assert_eq!(
            resolved.return_type,
            ScriptType::array_of(ScriptType::Class(wl.class_by_name("Map").unwrap()))
        );
        assert!(ctx.is_type_name(&wl, "Document"));
    }

    #[test]
    fn test_resolve_rejects_bad_params() {
        let wl = standard();
        let dup = ScriptContext::new("c", "int").execute_param("a", "int").execute_param("a", "long");
        assert!(matches!(dup.resolve(&wl), Err(ContextError::DuplicateParam { .. })));

        let unknown = ScriptContext::new("c", "int").execute_param("a", "Nope");
        assert!(matches!(unknown.resolve(&wl), Err(ContextError::UnknownType { .. })));

        let void = ScriptContext::new("c", "int").execute_param("a", "void");
        assert!(matches!(void.resolve(&wl), Err(ContextError::VoidParam { .. })));
    }
}
