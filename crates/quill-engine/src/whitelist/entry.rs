//! Whitelist entries: classes and their members, plus free-standing bindings.

use super::ty::{ClassId, ScriptType};
use crate::vm::fault::Fault;
use crate::vm::native::NativeContext;
use crate::vm::value::Value;
use rustc_hash::FxHashMap;
use std::fmt;
use std::sync::Arc;

/// Host implementation of a whitelisted method, constructor, field accessor
/// or instance binding. For instance members the receiver is `args[0]`.
pub type NativeFn = Arc<dyn Fn(&mut dyn NativeContext, &[Value]) -> Result<Value, Fault> + Send + Sync>;

/// Builds the per-script-instance state object of a class binding from the
/// binding's constructor arguments.
pub type BindingFactory =
    Arc<dyn Fn(&mut dyn NativeContext, &[Value]) -> Result<Box<dyn BindingState>, Fault> + Send + Sync>;

/// State object behind a class binding, created on first call.
pub trait BindingState: Send {
    fn call(&mut self, ctx: &mut dyn NativeContext, args: &[Value]) -> Result<Value, Fault>;
}

/// Wrap a closure as a [`NativeFn`].
pub fn native<F>(f: F) -> NativeFn
where
    F: Fn(&mut dyn NativeContext, &[Value]) -> Result<Value, Fault> + Send + Sync + 'static,
{
    Arc::new(f)
}

/// Index of a member in the whitelist's member table
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct MemberId(pub(crate) u32);

impl MemberId {
    pub const fn as_u32(&self) -> u32 {
        self.0
    }

    pub(crate) fn index(self) -> usize {
        self.0 as usize
    }
}

/// A whitelisted class: its supertypes and member tables.
#[derive(Debug, Clone)]
pub struct ClassDef {
    pub id: ClassId,
    pub name: String,
    /// Direct supertypes (empty only for `Object`)
    pub supers: Vec<ClassId>,
    /// The primitive this class boxes, for `Integer`, `Long`, `Double`, `Boolean`
    pub boxes: Option<ScriptType>,
    /// Abstract method of a functional interface
    pub functional: Option<MemberId>,
    pub constructors: FxHashMap<usize, MemberId>,
    pub methods: FxHashMap<(String, usize), MemberId>,
    pub static_methods: FxHashMap<(String, usize), MemberId>,
    pub fields: FxHashMap<String, MemberId>,
    pub static_fields: FxHashMap<String, MemberId>,
}

impl ClassDef {
    pub(crate) fn new(id: ClassId, name: String) -> Self {
        Self {
            id,
            name,
            supers: Vec::new(),
            boxes: None,
            functional: None,
            constructors: FxHashMap::default(),
            methods: FxHashMap::default(),
            static_methods: FxHashMap::default(),
            fields: FxHashMap::default(),
            static_fields: FxHashMap::default(),
        }
    }
}

#[derive(Clone)]
pub struct Constructor {
    pub owner: ClassId,
    pub params: Vec<ScriptType>,
    pub target: NativeFn,
}

#[derive(Clone)]
pub struct Method {
    pub owner: ClassId,
    pub name: String,
    pub params: Vec<ScriptType>,
    pub return_type: ScriptType,
    pub is_static: bool,
    pub target: NativeFn,
}

#[derive(Clone)]
pub struct Field {
    pub owner: ClassId,
    pub name: String,
    pub ty: ScriptType,
    pub is_static: bool,
    /// Compile-time value of a constant static field
    pub constant: Option<Value>,
    pub getter: NativeFn,
    pub setter: Option<NativeFn>,
}

#[derive(Clone)]
pub struct ClassBinding {
    pub name: String,
    /// Leading arguments passed to the factory on first call
    pub constructor_params: Vec<ScriptType>,
    /// Trailing arguments passed to every call
    pub params: Vec<ScriptType>,
    pub return_type: ScriptType,
    pub factory: BindingFactory,
}

impl ClassBinding {
    pub fn arity(&self) -> usize {
        self.constructor_params.len() + self.params.len()
    }
}

#[derive(Clone)]
pub struct InstanceBinding {
    pub name: String,
    pub params: Vec<ScriptType>,
    pub return_type: ScriptType,
    pub target: NativeFn,
}

/// The members a script can reach. Classes themselves live in the class
/// table; everything else is one of these variants.
#[derive(Clone)]
pub enum Member {
    Constructor(Constructor),
    Method(Method),
    Field(Field),
    ClassBinding(ClassBinding),
    InstanceBinding(InstanceBinding),
}

impl Member {
    pub fn kind_name(&self) -> &'static str {
        match self {
            Member::Constructor(_) => "constructor",
            Member::Method(m) if m.is_static => "static method",
            Member::Method(_) => "method",
            Member::Field(_) => "field",
            Member::ClassBinding(_) => "class binding",
            Member::InstanceBinding(_) => "instance binding",
        }
    }

    /// Parameter types, excluding the receiver.
    pub fn params(&self) -> Vec<ScriptType> {
        match self {
            Member::Constructor(c) => c.params.clone(),
            Member::Method(m) => m.params.clone(),
            Member::Field(_) => Vec::new(),
            Member::ClassBinding(b) => b
                .constructor_params
                .iter()
                .chain(b.params.iter())
                .cloned()
                .collect(),
            Member::InstanceBinding(b) => b.params.clone(),
        }
    }
}

impl fmt::Debug for Member {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Member::Constructor(c) => write!(f, "Constructor({}/{})", c.owner, c.params.len()),
            Member::Method(m) => write!(f, "Method({}.{}/{})", m.owner, m.name, m.params.len()),
            Member::Field(x) => write!(f, "Field({}.{})", x.owner, x.name),
            Member::ClassBinding(b) => write!(f, "ClassBinding({}/{})", b.name, b.arity()),
            Member::InstanceBinding(b) => {
                write!(f, "InstanceBinding({}/{})", b.name, b.params.len())
            }
        }
    }
}

/// What a symbolic member reference names.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum MemberKind {
    Method = 0,
    StaticMethod = 1,
    Constructor = 2,
    Field = 3,
    StaticField = 4,
    ClassBinding = 5,
    InstanceBinding = 6,
}

impl MemberKind {
    pub fn from_u8(value: u8) -> Option<Self> {
        Some(match value {
            0 => MemberKind::Method,
            1 => MemberKind::StaticMethod,
            2 => MemberKind::Constructor,
            3 => MemberKind::Field,
            4 => MemberKind::StaticField,
            5 => MemberKind::ClassBinding,
            6 => MemberKind::InstanceBinding,
            _ => return None,
        })
    }
}

/// Name-based reference to a member, as stored in code units and resolved
/// again by the loader. Bindings have an empty `owner`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct MemberRef {
    pub kind: MemberKind,
    pub owner: String,
    pub name: String,
    pub arity: u16,
}

impl fmt::Display for MemberRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.owner.is_empty() {
            write!(f, "{}/{}", self.name, self.arity)
        } else {
            write!(f, "{}.{}/{}", self.owner, self.name, self.arity)
        }
    }
}
