//! Local function table: script-declared functions plus the synthetic
//! functions generated for lambdas and function references.

use crate::parser::{NodeId, Span};
use crate::semantic::casts::Cast;
use crate::whitelist::{MemberId, ScriptType};
use rustc_hash::FxHashMap;

/// Callee of a function-reference adapter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AdapterTarget {
    Local(usize),
    Static(MemberId),
    /// Instance method; the adapter's first parameter is the receiver
    Virtual(MemberId),
    Constructor(MemberId),
}

/// Body of an adapter: forward the parameters to `target` with casts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AdapterPlan {
    pub target: AdapterTarget,
    /// One entry per adapter parameter
    pub param_casts: Vec<Option<Cast>>,
    pub return_cast: Option<Cast>,
    /// Type the callee returns
    pub target_return: ScriptType,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FunctionBody {
    /// A `Function` node declared in the script
    Declared(NodeId),
    /// A `Lambda` node; `param_casts` convert interface parameter types to
    /// the declared lambda parameter types in place
    Lambda {
        node: NodeId,
        param_casts: Vec<(u16, Cast)>,
    },
    Adapter(AdapterPlan),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LocalFunction {
    /// Name as written, or the generated name of a synthetic function
    pub name: String,
    /// Unique symbol in the code unit
    pub symbol: String,
    pub params: Vec<ScriptType>,
    pub return_type: ScriptType,
    pub body: FunctionBody,
    pub span: Span,
    /// Slots used by the analyzed body, parameters included
    pub max_slots: u16,
    /// The body can complete normally and needs a trailing return
    pub synthetic_return: bool,
}

impl LocalFunction {
    pub fn is_synthetic(&self) -> bool {
        !matches!(self.body, FunctionBody::Declared(_))
    }

    pub fn arity(&self) -> usize {
        self.params.len()
    }
}

#[derive(Debug, Default)]
pub struct FunctionTable {
    functions: Vec<LocalFunction>,
    by_key: FxHashMap<(String, usize), usize>,
    lambdas: usize,
    adapters: usize,
}

impl FunctionTable {
    /// Register a declared function; `None` when (name, arity) is taken.
    pub fn declare(&mut self, function: LocalFunction) -> Option<usize> {
        let key = (function.name.clone(), function.arity());
        if self.by_key.contains_key(&key) {
            return None;
        }
        let index = self.functions.len();
        self.by_key.insert(key, index);
        self.functions.push(function);
        Some(index)
    }

    /// Add a synthetic function. Synthetic functions are not callable by name.
    pub fn add_synthetic(&mut self, mut function: LocalFunction) -> usize {
        let index = self.functions.len();
        match function.body {
            FunctionBody::Lambda { .. } => {
                function.symbol = format!("lambda${}", self.lambdas);
                self.lambdas += 1;
            }
            _ => {
                function.symbol = format!("ref${}", self.adapters);
                self.adapters += 1;
            }
        }
        self.functions.push(function);
        index
    }

    pub fn lookup(&self, name: &str, arity: usize) -> Option<usize> {
        self.by_key.get(&(name.to_string(), arity)).copied()
    }

    /// Declared functions named `name`, any arity.
    pub fn named(&self, name: &str) -> Vec<usize> {
        let mut found: Vec<usize> = self
            .by_key
            .iter()
            .filter(|((n, _), _)| n == name)
            .map(|(_, index)| *index)
            .collect();
        found.sort_unstable();
        found
    }

    pub fn get(&self, index: usize) -> Option<&LocalFunction> {
        self.functions.get(index)
    }

    pub(crate) fn get_mut(&mut self, index: usize) -> Option<&mut LocalFunction> {
        self.functions.get_mut(index)
    }

    pub fn len(&self) -> usize {
        self.functions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.functions.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &LocalFunction> {
        self.functions.iter()
    }
}
