//! Whitelist: the closed set of types and members scripts may reference.
//!
//! A [`Whitelist`] is built once through a [`WhitelistBuilder`] and shared
//! read-only (`Arc<Whitelist>`) by every compile and every running script.
//! All lookups are pure functions over immutable tables.

pub mod builder;
pub mod def;
pub mod entry;
pub mod standard;
pub mod ty;

pub use builder::{ClassDecl, WhitelistBuilder};
pub use def::{DefReference, DefReferenceError, DefStrategy};
pub use entry::{
    native, BindingFactory, BindingState, ClassDef, Member, MemberId, MemberKind, MemberRef,
    NativeFn,
};
pub use standard::standard;
pub use ty::{split_array_suffix, ClassId, ScriptType};

use crate::parser::TypeNames;
use crate::vm::value::Value;
use rustc_hash::{FxHashMap, FxHashSet};
use std::collections::VecDeque;
use std::fmt;
use thiserror::Error;

/// Errors building a whitelist
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum WhitelistError {
    #[error("Duplicate class `{0}`")]
    DuplicateClass(String),

    #[error("Duplicate member `{member}` on `{class}`")]
    DuplicateMember { class: String, member: String },

    #[error("Unknown type `{name}` referenced from `{context}`")]
    UnknownType { context: String, name: String },

    #[error("Cyclic supertypes through `{0}`")]
    CyclicHierarchy(String),
}

/// Errors looking up a member
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LookupError {
    /// No candidate, or more than one, for (class, name, arity)
    #[error("{}", describe_lookup(.class, .name, .arity, .candidates))]
    AmbiguousOrUnknownMember {
        class: String,
        name: String,
        arity: usize,
        candidates: usize,
    },
}

fn describe_lookup(class: &str, name: &str, arity: &usize, candidates: &usize) -> String {
    if *candidates == 0 {
        format!("member [{}/{}] not found for type [{}]", name, arity, class)
    } else {
        format!(
            "member [{}/{}] is ambiguous for type [{}] ({} candidates)",
            name, arity, class, candidates
        )
    }
}

/// Classes the compiler and runtime give special meaning to, when present.
#[derive(Debug, Clone, Default)]
pub struct CoreClasses {
    pub string: Option<ClassId>,
    pub number: Option<ClassId>,
    pub iterable: Option<ClassId>,
    pub list: Option<ClassId>,
    pub array_list: Option<ClassId>,
    pub map: Option<ClassId>,
    pub hash_map: Option<ClassId>,
    pub pattern: Option<ClassId>,
    pub exception: Option<ClassId>,
    pub runtime_exception: Option<ClassId>,
}

impl CoreClasses {
    pub(crate) fn find(names: &FxHashMap<String, ClassId>) -> Self {
        let get = |name: &str| names.get(name).copied();
        Self {
            string: get("String"),
            number: get("Number"),
            iterable: get("Iterable"),
            list: get("List"),
            array_list: get("ArrayList"),
            map: get("Map"),
            hash_map: get("HashMap"),
            pattern: get("Pattern"),
            exception: get("Exception"),
            runtime_exception: get("RuntimeException"),
        }
    }
}

/// The resolved, immutable whitelist.
pub struct Whitelist {
    classes: Vec<ClassDef>,
    class_names: FxHashMap<String, ClassId>,
    members: Vec<Member>,
    bindings: FxHashMap<(String, usize), MemberId>,
    core: CoreClasses,
}

impl fmt::Debug for Whitelist {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Whitelist")
            .field("classes", &self.classes.len())
            .field("members", &self.members.len())
            .field("bindings", &self.bindings.len())
            .finish()
    }
}

impl Whitelist {
    pub(crate) fn from_parts(
        classes: Vec<ClassDef>,
        class_names: FxHashMap<String, ClassId>,
        members: Vec<Member>,
        bindings: FxHashMap<(String, usize), MemberId>,
        core: CoreClasses,
    ) -> Self {
        Self {
            classes,
            class_names,
            members,
            bindings,
            core,
        }
    }

    /// The root class.
    pub fn object(&self) -> ClassId {
        ClassId(0)
    }

    pub fn core(&self) -> &CoreClasses {
        &self.core
    }

    pub fn class(&self, id: ClassId) -> &ClassDef {
        &self.classes[id.index()]
    }

    pub fn classes(&self) -> impl Iterator<Item = &ClassDef> {
        self.classes.iter()
    }

    pub fn class_by_name(&self, name: &str) -> Option<ClassId> {
        self.class_names.get(name).copied()
    }

    pub fn member(&self, id: MemberId) -> &Member {
        &self.members[id.index()]
    }

    pub fn member_count(&self) -> usize {
        self.members.len()
    }

    /// Resolve a canonical type name such as `int`, `String` or `Map[][]`.
    pub fn lookup_type(&self, name: &str) -> Option<ScriptType> {
        let (base, dims) = split_array_suffix(name);
        let ty = match ScriptType::from_primitive_name(base) {
            Some(ScriptType::Void) if dims > 0 => return None,
            Some(ty) => ty,
            None => ScriptType::Class(self.class_by_name(base)?),
        };
        Some(ty.with_dims(dims))
    }

    /// Canonical name of a type; the inverse of [`Whitelist::lookup_type`].
    pub fn type_name(&self, ty: &ScriptType) -> String {
        match ty {
            ScriptType::Class(id) => self.class(*id).name.clone(),
            ScriptType::Array(element) => format!("{}[]", self.type_name(element)),
            other => other.primitive_name().unwrap_or("def").to_string(),
        }
    }

    /// Find the unique method named `name` taking `arity` arguments.
    ///
    /// Static methods are looked up on `class` only. Instance methods are
    /// searched breadth-first through the supertypes; the nearest level with
    /// any candidate decides, and it must have exactly one.
    pub fn lookup_method(
        &self,
        class: ClassId,
        name: &str,
        arity: usize,
        is_static: bool,
    ) -> Result<MemberId, LookupError> {
        let key = (name.to_string(), arity);
        if is_static {
            return self
                .class(class)
                .static_methods
                .get(&key)
                .copied()
                .ok_or_else(|| self.lookup_error(class, name, arity, 0));
        }
        self.search_hierarchy(class, |def| def.methods.get(&key).copied())
            .map_err(|candidates| self.lookup_error(class, name, arity, candidates))
    }

    /// Every method on `class` (and its supertypes, for instance methods)
    /// named `name`, any arity.
    pub fn methods_named(&self, class: ClassId, name: &str, is_static: bool) -> Vec<MemberId> {
        let mut found = Vec::new();
        let mut seen_keys = FxHashSet::default();
        let classes = if is_static {
            vec![class]
        } else {
            self.ancestors(class)
        };
        for id in classes {
            let def = self.class(id);
            let table = if is_static {
                &def.static_methods
            } else {
                &def.methods
            };
            for ((method, arity), member) in table {
                if method == name && seen_keys.insert(*arity) {
                    found.push(*member);
                }
            }
        }
        found
    }

    pub fn lookup_constructor(&self, class: ClassId, arity: usize) -> Result<MemberId, LookupError> {
        self.class(class)
            .constructors
            .get(&arity)
            .copied()
            .ok_or_else(|| self.lookup_error(class, "<init>", arity, 0))
    }

    /// Find a field; instance fields are inherited.
    pub fn lookup_field(&self, class: ClassId, name: &str, is_static: bool) -> Result<MemberId, LookupError> {
        if is_static {
            return self
                .class(class)
                .static_fields
                .get(name)
                .copied()
                .ok_or_else(|| self.lookup_error(class, name, 0, 0));
        }
        self.search_hierarchy(class, |def| def.fields.get(name).copied())
            .map_err(|candidates| self.lookup_error(class, name, 0, candidates))
    }

    /// Find a class or instance binding by name and total arity.
    pub fn lookup_binding(&self, name: &str, arity: usize) -> Option<MemberId> {
        self.bindings.get(&(name.to_string(), arity)).copied()
    }

    /// Abstract method of a functional interface.
    pub fn functional_method(&self, class: ClassId) -> Option<MemberId> {
        self.class(class).functional
    }

    /// Encoding of a dynamic method call site.
    pub fn def_reference(&self, name: &str, arity: u16, captures: Vec<Option<u16>>) -> DefReference {
        DefReference::method(name, arity, captures)
    }

    fn lookup_error(&self, class: ClassId, name: &str, arity: usize, candidates: usize) -> LookupError {
        LookupError::AmbiguousOrUnknownMember {
            class: self.class(class).name.clone(),
            name: name.to_string(),
            arity,
            candidates,
        }
    }

    /// Breadth-first search by hierarchy level. `Err(n)` carries the number of
    /// candidates at the deciding level (0 when nothing matched anywhere).
    fn search_hierarchy<F>(&self, class: ClassId, find: F) -> Result<MemberId, usize>
    where
        F: Fn(&ClassDef) -> Option<MemberId>,
    {
        let mut level = vec![class];
        let mut visited = FxHashSet::default();
        visited.insert(class);
        while !level.is_empty() {
            let mut candidates: Vec<MemberId> = level.iter().filter_map(|id| find(self.class(*id))).collect();
            candidates.sort();
            candidates.dedup();
            match candidates.len() {
                0 => {}
                1 => return Ok(candidates[0]),
                n => return Err(n),
            }
            let mut next = Vec::new();
            for id in level {
                for sup in &self.class(id).supers {
                    if visited.insert(*sup) {
                        next.push(*sup);
                    }
                }
            }
            level = next;
        }
        Err(0)
    }

    /// `class` and all its supertypes, nearest first.
    pub fn ancestors(&self, class: ClassId) -> Vec<ClassId> {
        let mut out = Vec::new();
        let mut queue = VecDeque::from([class]);
        let mut visited = FxHashSet::default();
        while let Some(id) = queue.pop_front() {
            if !visited.insert(id) {
                continue;
            }
            out.push(id);
            queue.extend(self.class(id).supers.iter().copied());
        }
        out
    }

    pub fn is_subclass(&self, class: ClassId, of: ClassId) -> bool {
        class == of || of == self.object() || self.ancestors(class).contains(&of)
    }

    /// Whether a value of static type `from` may be used where `to` is
    /// expected without any conversion.
    pub fn is_assignable(&self, from: &ScriptType, to: &ScriptType) -> bool {
        match (from, to) {
            _ if from == to => true,
            (_, ScriptType::Def) => !from.is_void(),
            (ScriptType::Class(a), ScriptType::Class(b)) => self.is_subclass(*a, *b),
            (ScriptType::Array(_), ScriptType::Class(b)) => *b == self.object(),
            (ScriptType::Array(a), ScriptType::Array(b)) => {
                a.is_reference() && b.is_reference() && self.is_assignable(a, b)
            }
            _ => false,
        }
    }

    /// The box class of a primitive type.
    pub fn box_class(&self, ty: &ScriptType) -> Option<ClassId> {
        self.classes
            .iter()
            .find(|class| class.boxes.as_ref() == Some(ty))
            .map(|class| class.id)
    }

    /// The primitive a class boxes.
    pub fn unboxed(&self, class: ClassId) -> Option<ScriptType> {
        self.class(class).boxes.clone()
    }

    /// Whether `class` is a functional interface.
    pub fn is_functional(&self, class: ClassId) -> bool {
        self.class(class).functional.is_some()
    }

    /// The whitelist class of a runtime value. `None` for `null`.
    pub fn runtime_class(&self, value: &Value) -> Option<ClassId> {
        let core = &self.core;
        let boxed = |ty: ScriptType| self.box_class(&ty).unwrap_or(self.object());
        Some(match value {
            Value::Null => return None,
            Value::Bool(_) => boxed(ScriptType::Boolean),
            Value::Int(_) => boxed(ScriptType::Int),
            Value::Long(_) => boxed(ScriptType::Long),
            Value::Double(_) => boxed(ScriptType::Double),
            Value::Str(_) => core.string.unwrap_or(self.object()),
            Value::List(_) => core.array_list.or(core.list).unwrap_or(self.object()),
            Value::Map(_) => core.hash_map.or(core.map).unwrap_or(self.object()),
            Value::Pattern(_) => core.pattern.unwrap_or(self.object()),
            Value::Exception(e) => e.class,
            Value::Object(o) => self.class_by_name(o.class_name()).unwrap_or(self.object()),
            Value::Array(_) | Value::Function(_) => self.object(),
        })
    }

    /// Whether a runtime value is an instance of `ty` (`instanceof`).
    pub fn is_instance(&self, value: &Value, ty: &ScriptType) -> bool {
        match (value, ty) {
            (Value::Null, _) => false,
            (_, ScriptType::Def) => true,
            (Value::Array(array), ScriptType::Array(element)) => {
                array.element == **element || (element.is_reference() && self.is_assignable(&array.element, element))
            }
            (Value::Function(_), ScriptType::Class(id)) => *id == self.object() || self.is_functional(*id),
            (_, ScriptType::Class(id)) => self
                .runtime_class(value)
                .is_some_and(|class| self.is_subclass(class, *id)),
            _ => false,
        }
    }

    /// Class used for a thrown exception named `name`: the class itself if
    /// whitelisted, else `RuntimeException`, `Exception` or `Object`.
    pub fn exception_class(&self, name: &str) -> ClassId {
        self.class_by_name(name)
            .or(self.core.runtime_exception)
            .or(self.core.exception)
            .unwrap_or(self.object())
    }

    /// Symbolic reference to a member, for code units.
    pub fn member_ref(&self, id: MemberId) -> MemberRef {
        let owner = |class: ClassId| self.class(class).name.clone();
        match self.member(id) {
            Member::Constructor(c) => MemberRef {
                kind: MemberKind::Constructor,
                owner: owner(c.owner),
                name: "new".to_string(),
                arity: c.params.len() as u16,
            },
            Member::Method(m) => MemberRef {
                kind: if m.is_static {
                    MemberKind::StaticMethod
                } else {
                    MemberKind::Method
                },
                owner: owner(m.owner),
                name: m.name.clone(),
                arity: m.params.len() as u16,
            },
            Member::Field(f) => MemberRef {
                kind: if f.is_static {
                    MemberKind::StaticField
                } else {
                    MemberKind::Field
                },
                owner: owner(f.owner),
                name: f.name.clone(),
                arity: 0,
            },
            Member::ClassBinding(b) => MemberRef {
                kind: MemberKind::ClassBinding,
                owner: String::new(),
                name: b.name.clone(),
                arity: b.arity() as u16,
            },
            Member::InstanceBinding(b) => MemberRef {
                kind: MemberKind::InstanceBinding,
                owner: String::new(),
                name: b.name.clone(),
                arity: b.params.len() as u16,
            },
        }
    }

    /// Resolve a symbolic reference back to a member of this whitelist.
    pub fn resolve_member_ref(&self, reference: &MemberRef) -> Option<MemberId> {
        let class = || self.class_by_name(&reference.owner);
        let arity = reference.arity as usize;
        let id = match reference.kind {
            MemberKind::Method => self.lookup_method(class()?, &reference.name, arity, false).ok()?,
            MemberKind::StaticMethod => self.lookup_method(class()?, &reference.name, arity, true).ok()?,
            MemberKind::Constructor => self.lookup_constructor(class()?, arity).ok()?,
            MemberKind::Field => self.lookup_field(class()?, &reference.name, false).ok()?,
            MemberKind::StaticField => self.lookup_field(class()?, &reference.name, true).ok()?,
            MemberKind::ClassBinding | MemberKind::InstanceBinding => {
                self.lookup_binding(&reference.name, arity)?
            }
        };
        let matches_kind = match (reference.kind, self.member(id)) {
            (MemberKind::ClassBinding, Member::ClassBinding(_)) => true,
            (MemberKind::InstanceBinding, Member::InstanceBinding(_)) => true,
            (MemberKind::ClassBinding | MemberKind::InstanceBinding, _) => false,
            _ => true,
        };
        matches_kind.then_some(id)
    }
}

impl TypeNames for Whitelist {
    fn is_type_name(&self, name: &str) -> bool {
        ScriptType::from_primitive_name(name).is_some() || self.class_names.contains_key(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::vm::fault::Fault;

    fn noop() -> NativeFn {
        native(|_, _| Ok(Value::Null))
    }

    fn diamond() -> Whitelist {
        let mut builder = WhitelistBuilder::new();
        builder.class("A").method("m", &[], "int", noop());
        builder.class("B").method("m", &[], "int", noop());
        builder.class("C").extends(&["A", "B"]);
        builder
            .class("D")
            .extends(&["A"])
            .method("n", &["int"], "void", noop());
        builder.build().unwrap()
    }

    #[test]
    fn test_lookup_type_with_arrays() {
        let wl = diamond();
        assert_eq!(wl.lookup_type("int[]"), Some(ScriptType::Int.with_dims(1)));
        assert!(wl.lookup_type("A[][]").is_some());
        assert_eq!(wl.lookup_type("Missing"), None);
        assert_eq!(wl.lookup_type("void[]"), None);
        assert_eq!(wl.type_name(&wl.lookup_type("A[]").unwrap()), "A[]");
    }

    #[test]
    fn test_inherited_method_is_found() {
        let wl = diamond();
        let d = wl.class_by_name("D").unwrap();
        let a = wl.class_by_name("A").unwrap();
        assert_eq!(
            wl.lookup_method(d, "m", 0, false).unwrap(),
            wl.lookup_method(a, "m", 0, false).unwrap()
        );
    }

    #[test]
    fn test_diamond_is_ambiguous() {
        let wl = diamond();
        let c = wl.class_by_name("C").unwrap();
        let err = wl.lookup_method(c, "m", 0, false).unwrap_err();
        assert!(matches!(
            err,
            LookupError::AmbiguousOrUnknownMember { candidates: 2, .. }
        ));
    }

    #[test]
    fn test_unknown_arity_fails() {
        let wl = diamond();
        let d = wl.class_by_name("D").unwrap();
        let err = wl.lookup_method(d, "n", 2, false).unwrap_err();
        assert!(err.to_string().contains("not found"));
    }

    #[test]
    fn test_duplicate_member_rejected() {
        let mut builder = WhitelistBuilder::new();
        builder
            .class("A")
            .method("m", &["int"], "int", noop())
            .method("m", &["long"], "int", noop());
        assert!(matches!(
            builder.build(),
            Err(WhitelistError::DuplicateMember { .. })
        ));
    }

    #[test]
    fn test_unknown_type_rejected() {
        let mut builder = WhitelistBuilder::new();
        builder.class("A").method("m", &["Nope"], "int", noop());
        assert!(matches!(
            builder.build(),
            Err(WhitelistError::UnknownType { .. })
        ));
    }

    #[test]
    fn test_forward_references_resolve() {
        let mut builder = WhitelistBuilder::new();
        builder.class("A").method("b", &[], "B", noop());
        builder.class("B");
        assert!(builder.build().is_ok());
    }

    #[test]
    fn test_cycle_rejected() {
        let mut builder = WhitelistBuilder::new();
        builder.class("A").extends(&["B"]);
        builder.class("B").extends(&["A"]);
        assert!(matches!(
            builder.build(),
            Err(WhitelistError::CyclicHierarchy(_))
        ));
    }

    #[test]
    fn test_assignability() {
        let wl = diamond();
        let a = ScriptType::Class(wl.class_by_name("A").unwrap());
        let d = ScriptType::Class(wl.class_by_name("D").unwrap());
        let object = ScriptType::Class(wl.object());
        assert!(wl.is_assignable(&d, &a));
        assert!(!wl.is_assignable(&a, &d));
        assert!(wl.is_assignable(&ScriptType::Int, &ScriptType::Def));
        assert!(wl.is_assignable(&d.clone().with_dims(1), &a.clone().with_dims(1)));
        assert!(wl.is_assignable(&ScriptType::Int.with_dims(1), &object));
        assert!(!wl.is_assignable(&ScriptType::Int.with_dims(1), &ScriptType::Long.with_dims(1)));
    }

    #[test]
    fn test_member_ref_round_trip() {
        let wl = standard();
        let string = wl.core().string.unwrap();
        let id = wl.lookup_method(string, "substring", 2, false).unwrap();
        let reference = wl.member_ref(id);
        assert_eq!(reference.to_string(), "String.substring/2");
        assert_eq!(wl.resolve_member_ref(&reference), Some(id));
    }

    #[test]
    fn test_exception_class_fallback() {
        let wl = standard();
        let class = wl.exception_class("NoSuchThing");
        assert_eq!(wl.class(class).name, "RuntimeException");
        match Fault::exception(&wl, "ArithmeticException", "/ by zero") {
            Fault::Thrown(e) => assert_eq!(e.to_string(), "ArithmeticException: / by zero"),
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_runtime_instance_checks() {
        let wl = standard();
        let number = ScriptType::Class(wl.core().number.unwrap());
        let list = ScriptType::Class(wl.core().list.unwrap());
        assert!(wl.is_instance(&Value::Int(3), &number));
        assert!(!wl.is_instance(&Value::string("x"), &number));
        assert!(wl.is_instance(&Value::list(vec![]), &list));
        assert!(!wl.is_instance(&Value::Null, &ScriptType::Def));
    }
}
