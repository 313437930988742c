//! Side tables of facts the analyzer attaches to syntax nodes.
//!
//! Every table is keyed by [`NodeId`]. A node's value type is written once;
//! conversions needed where the node is used are separate [`Cast`] entries.

use crate::parser::NodeId;
use crate::semantic::casts::Cast;
use crate::vm::value::Value;
use crate::whitelist::{DefReference, MemberId, ScriptType};
use rustc_hash::FxHashMap;

/// A resolved local variable.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VarRef {
    pub slot: u16,
    pub ty: ScriptType,
}

/// What a call expression invokes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CallTarget {
    /// A script function, by function table index
    Local(usize),
    Binding(MemberId),
    StaticMethod(MemberId),
    /// Instance method with a statically known receiver type
    Method(MemberId),
    /// Abstract method of a functional interface, called on a function value
    Functional(MemberId),
    Constructor(MemberId),
    /// Resolved at run time against the receiver's class
    Dynamic(DefReference),
}

/// How a field expression reads (and writes) its value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FieldAccess {
    Instance(MemberId),
    Static(MemberId),
    ArrayLength,
    /// `map.key` on a Map-typed receiver
    MapKey { get: MemberId, put: MemberId },
    /// Field of a `def` receiver
    Dynamic(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum IndexAccess {
    Array = 0,
    List = 1,
    Map = 2,
    Dynamic = 3,
}

impl IndexAccess {
    pub fn from_u8(value: u8) -> Option<Self> {
        Some(match value {
            0 => IndexAccess::Array,
            1 => IndexAccess::List,
            2 => IndexAccess::Map,
            3 => IndexAccess::Dynamic,
            _ => return None,
        })
    }
}

/// Read-modify-write plan of a compound assignment or increment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompoundPlan {
    pub op: crate::parser::ast::BinaryOp,
    /// Type the operation runs in; a String type means concatenation
    pub op_ty: ScriptType,
    pub read_cast: Option<Cast>,
    /// Conversion of the right-hand side (absent for increments)
    pub value_cast: Option<Cast>,
    pub write_cast: Option<Cast>,
}

/// An enclosing variable copied into a lambda.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Capture {
    pub name: String,
    pub outer_slot: u16,
    pub ty: ScriptType,
}

/// Lowering shape of a for-each loop, with its hidden slots.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ForEachPlan {
    Array {
        array_slot: u16,
        index_slot: u16,
        element: ScriptType,
        cast: Option<Cast>,
    },
    Iterable {
        iterator_slot: u16,
        iterator: MemberId,
        has_next: MemberId,
        next: MemberId,
        cast: Option<Cast>,
    },
    Dynamic {
        iterator_slot: u16,
        cast: Option<Cast>,
    },
}

/// A validated regex literal.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegexInfo {
    /// Pattern with flags applied inline, ready for the regex engine
    pub pattern: String,
    pub flags: String,
}

/// Control-flow facts of a statement.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Escape {
    /// Always leaves the function (return or throw)
    pub method_escape: bool,
    /// Always leaves the current loop iteration
    pub loop_escape: bool,
    /// Never completes normally
    pub all_escape: bool,
    pub any_continue: bool,
    pub any_break: bool,
}

#[derive(Debug, Default)]
pub struct Decorations {
    value_types: FxHashMap<NodeId, ScriptType>,
    casts: FxHashMap<NodeId, Cast>,
    /// Declared types of declarations, casts, instanceof, new and catch
    pub(crate) types: FxHashMap<NodeId, ScriptType>,
    pub(crate) variables: FxHashMap<NodeId, VarRef>,
    pub(crate) calls: FxHashMap<NodeId, CallTarget>,
    pub(crate) fields: FxHashMap<NodeId, FieldAccess>,
    pub(crate) indexes: FxHashMap<NodeId, IndexAccess>,
    /// Operation type of unary, binary and comparison nodes
    pub(crate) operations: FxHashMap<NodeId, ScriptType>,
    pub(crate) compounds: FxHashMap<NodeId, CompoundPlan>,
    /// Function table index of lambdas and function references
    pub(crate) functions: FxHashMap<NodeId, usize>,
    pub(crate) captures: FxHashMap<NodeId, Vec<Capture>>,
    pub(crate) constants: FxHashMap<NodeId, Value>,
    pub(crate) foreach: FxHashMap<NodeId, ForEachPlan>,
    pub(crate) regexes: FxHashMap<NodeId, RegexInfo>,
    pub(crate) escapes: FxHashMap<NodeId, Escape>,
}

impl Decorations {
    /// Record the value type of a node. The first write wins.
    pub(crate) fn set_value_type(&mut self, id: NodeId, ty: ScriptType) {
        self.value_types.entry(id).or_insert(ty);
    }

    pub fn value_type(&self, id: NodeId) -> Option<&ScriptType> {
        self.value_types.get(&id)
    }

    pub(crate) fn set_cast(&mut self, id: NodeId, cast: Cast) {
        self.casts.insert(id, cast);
    }

    pub fn cast(&self, id: NodeId) -> Option<&Cast> {
        self.casts.get(&id)
    }

    pub fn declared_type(&self, id: NodeId) -> Option<&ScriptType> {
        self.types.get(&id)
    }

    pub fn variable(&self, id: NodeId) -> Option<&VarRef> {
        self.variables.get(&id)
    }

    pub fn call(&self, id: NodeId) -> Option<&CallTarget> {
        self.calls.get(&id)
    }

    pub fn field(&self, id: NodeId) -> Option<&FieldAccess> {
        self.fields.get(&id)
    }

    pub fn index(&self, id: NodeId) -> Option<IndexAccess> {
        self.indexes.get(&id).copied()
    }

    pub fn operation(&self, id: NodeId) -> Option<&ScriptType> {
        self.operations.get(&id)
    }

    pub fn compound(&self, id: NodeId) -> Option<&CompoundPlan> {
        self.compounds.get(&id)
    }

    pub fn function(&self, id: NodeId) -> Option<usize> {
        self.functions.get(&id).copied()
    }

    pub fn captures(&self, id: NodeId) -> &[Capture] {
        self.captures.get(&id).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn constant(&self, id: NodeId) -> Option<&Value> {
        self.constants.get(&id)
    }

    pub fn foreach(&self, id: NodeId) -> Option<&ForEachPlan> {
        self.foreach.get(&id)
    }

    pub fn regex(&self, id: NodeId) -> Option<&RegexInfo> {
        self.regexes.get(&id)
    }

    pub fn escape(&self, id: NodeId) -> Escape {
        self.escapes.get(&id).copied().unwrap_or_default()
    }

    /// Number of nodes with a value type, for pass statistics.
    pub fn typed_nodes(&self) -> usize {
        self.value_types.len()
    }
}
