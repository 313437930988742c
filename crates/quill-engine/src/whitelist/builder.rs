//! Whitelist construction.
//!
//! Declarations name types by string; names are resolved only in
//! [`WhitelistBuilder::build`], after every class has been declared, so
//! classes may refer to each other in any order.

use super::entry::{
    native, BindingFactory, ClassBinding, ClassDef, Constructor, Field, InstanceBinding, Member,
    MemberId, Method, NativeFn,
};
use super::ty::{split_array_suffix, ClassId, ScriptType};
use super::{CoreClasses, Whitelist, WhitelistError};
use crate::vm::value::Value;
use rustc_hash::FxHashMap;

enum PendingMember {
    Constructor {
        params: Vec<String>,
        target: NativeFn,
    },
    Method {
        name: String,
        params: Vec<String>,
        return_type: String,
        is_static: bool,
        target: NativeFn,
        functional: bool,
    },
    Field {
        name: String,
        ty: String,
        is_static: bool,
        constant: Option<Value>,
        getter: NativeFn,
        setter: Option<NativeFn>,
    },
}

/// Declaration of one class, filled in through chained calls.
pub struct ClassDecl {
    name: String,
    supers: Vec<String>,
    boxes: Option<String>,
    members: Vec<PendingMember>,
}

impl ClassDecl {
    fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            supers: Vec::new(),
            boxes: None,
            members: Vec::new(),
        }
    }

    pub fn extends(&mut self, supers: &[&str]) -> &mut Self {
        self.supers.extend(supers.iter().map(|s| s.to_string()));
        self
    }

    /// Mark this class as the box of a primitive type.
    pub fn boxes(&mut self, primitive: &str) -> &mut Self {
        self.boxes = Some(primitive.to_string());
        self
    }

    pub fn constructor(&mut self, params: &[&str], target: NativeFn) -> &mut Self {
        self.members.push(PendingMember::Constructor {
            params: to_strings(params),
            target,
        });
        self
    }

    pub fn method(&mut self, name: &str, params: &[&str], return_type: &str, target: NativeFn) -> &mut Self {
        self.members.push(PendingMember::Method {
            name: name.to_string(),
            params: to_strings(params),
            return_type: return_type.to_string(),
            is_static: false,
            target,
            functional: false,
        });
        self
    }

    pub fn static_method(
        &mut self,
        name: &str,
        params: &[&str],
        return_type: &str,
        target: NativeFn,
    ) -> &mut Self {
        self.members.push(PendingMember::Method {
            name: name.to_string(),
            params: to_strings(params),
            return_type: return_type.to_string(),
            is_static: true,
            target,
            functional: false,
        });
        self
    }

    /// Declare the single abstract method of a functional interface. Calling
    /// it on a script function value invokes that function.
    pub fn functional(&mut self, name: &str, params: &[&str], return_type: &str) -> &mut Self {
        let target = native(|ctx, args| match args.split_first() {
            Some((receiver, rest)) => ctx.call_function(receiver, rest),
            None => ctx.call_function(&Value::Null, &[]),
        });
        self.members.push(PendingMember::Method {
            name: name.to_string(),
            params: to_strings(params),
            return_type: return_type.to_string(),
            is_static: false,
            target,
            functional: true,
        });
        self
    }

    /// Instance field with a getter and an optional setter.
    pub fn field(&mut self, name: &str, ty: &str, getter: NativeFn, setter: Option<NativeFn>) -> &mut Self {
        self.members.push(PendingMember::Field {
            name: name.to_string(),
            ty: ty.to_string(),
            is_static: false,
            constant: None,
            getter,
            setter,
        });
        self
    }

    /// Read-only static field whose value is known at compile time.
    pub fn constant(&mut self, name: &str, ty: &str, value: Value) -> &mut Self {
        let held = value.clone();
        self.members.push(PendingMember::Field {
            name: name.to_string(),
            ty: ty.to_string(),
            is_static: true,
            constant: Some(value),
            getter: native(move |_, _| Ok(held.clone())),
            setter: None,
        });
        self
    }
}

fn to_strings(items: &[&str]) -> Vec<String> {
    items.iter().map(|s| s.to_string()).collect()
}

enum PendingBinding {
    Class {
        name: String,
        constructor_params: Vec<String>,
        params: Vec<String>,
        return_type: String,
        factory: BindingFactory,
    },
    Instance {
        name: String,
        params: Vec<String>,
        return_type: String,
        target: NativeFn,
    },
}

/// Collects class and binding declarations, then resolves them into an
/// immutable [`Whitelist`].
pub struct WhitelistBuilder {
    classes: Vec<ClassDecl>,
    bindings: Vec<PendingBinding>,
}

impl Default for WhitelistBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl WhitelistBuilder {
    /// A builder with the root class `Object` already declared.
    pub fn new() -> Self {
        Self {
            classes: vec![ClassDecl::new("Object")],
            bindings: Vec::new(),
        }
    }

    /// Declare a class, or continue the declaration of an existing one.
    pub fn class(&mut self, name: &str) -> &mut ClassDecl {
        let index = match self.classes.iter().position(|c| c.name == name) {
            Some(index) => index,
            None => {
                self.classes.push(ClassDecl::new(name));
                self.classes.len() - 1
            }
        };
        &mut self.classes[index]
    }

    pub fn class_binding(
        &mut self,
        name: &str,
        constructor_params: &[&str],
        params: &[&str],
        return_type: &str,
        factory: BindingFactory,
    ) -> &mut Self {
        self.bindings.push(PendingBinding::Class {
            name: name.to_string(),
            constructor_params: to_strings(constructor_params),
            params: to_strings(params),
            return_type: return_type.to_string(),
            factory,
        });
        self
    }

    pub fn instance_binding(
        &mut self,
        name: &str,
        params: &[&str],
        return_type: &str,
        target: NativeFn,
    ) -> &mut Self {
        self.bindings.push(PendingBinding::Instance {
            name: name.to_string(),
            params: to_strings(params),
            return_type: return_type.to_string(),
            target,
        });
        self
    }

    pub fn build(self) -> Result<Whitelist, WhitelistError> {
        let mut class_names: FxHashMap<String, ClassId> = FxHashMap::default();
        for (index, decl) in self.classes.iter().enumerate() {
            let id = ClassId(index as u32);
            if class_names.insert(decl.name.clone(), id).is_some() {
                return Err(WhitelistError::DuplicateClass(decl.name.clone()));
            }
        }

        let resolver = TypeResolver { names: &class_names };
        let mut classes: Vec<ClassDef> = self
            .classes
            .iter()
            .enumerate()
            .map(|(index, decl)| ClassDef::new(ClassId(index as u32), decl.name.clone()))
            .collect();
        let object = ClassId(0);
        let mut members: Vec<Member> = Vec::new();

        for (index, decl) in self.classes.into_iter().enumerate() {
            let owner = ClassId(index as u32);
            let mut supers = Vec::new();
            for name in &decl.supers {
                let id = *class_names
                    .get(name.as_str())
                    .ok_or_else(|| WhitelistError::UnknownType {
                        context: decl.name.clone(),
                        name: name.clone(),
                    })?;
                if id == owner {
                    return Err(WhitelistError::CyclicHierarchy(decl.name.clone()));
                }
                supers.push(id);
            }
            if supers.is_empty() && owner != object {
                supers.push(object);
            }
            let class = &mut classes[index];
            class.supers = supers;
            if let Some(primitive) = &decl.boxes {
                let ty = ScriptType::from_primitive_name(primitive)
                    .filter(ScriptType::is_primitive)
                    .ok_or_else(|| WhitelistError::UnknownType {
                        context: decl.name.clone(),
                        name: primitive.clone(),
                    })?;
                class.boxes = Some(ty);
            }

            for pending in decl.members {
                let id = MemberId(members.len() as u32);
                match pending {
                    PendingMember::Constructor { params, target } => {
                        let params = resolver.resolve_all(&decl.name, &params)?;
                        if class.constructors.insert(params.len(), id).is_some() {
                            return Err(WhitelistError::DuplicateMember {
                                class: decl.name.clone(),
                                member: format!("<init>/{}", params.len()),
                            });
                        }
                        members.push(Member::Constructor(Constructor { owner, params, target }));
                    }
                    PendingMember::Method {
                        name,
                        params,
                        return_type,
                        is_static,
                        target,
                        functional,
                    } => {
                        let params = resolver.resolve_all(&decl.name, &params)?;
                        let return_type = resolver.resolve(&decl.name, &return_type)?;
                        let key = (name.clone(), params.len());
                        let table = if is_static {
                            &mut class.static_methods
                        } else {
                            &mut class.methods
                        };
                        if table.insert(key, id).is_some() {
                            return Err(WhitelistError::DuplicateMember {
                                class: decl.name.clone(),
                                member: format!("{}/{}", name, params.len()),
                            });
                        }
                        if functional {
                            if class.functional.is_some() {
                                return Err(WhitelistError::DuplicateMember {
                                    class: decl.name.clone(),
                                    member: format!("functional method {}", name),
                                });
                            }
                            class.functional = Some(id);
                        }
                        members.push(Member::Method(Method {
                            owner,
                            name,
                            params,
                            return_type,
                            is_static,
                            target,
                        }));
                    }
                    PendingMember::Field {
                        name,
                        ty,
                        is_static,
                        constant,
                        getter,
                        setter,
                    } => {
                        let ty = resolver.resolve(&decl.name, &ty)?;
                        let table = if is_static {
                            &mut class.static_fields
                        } else {
                            &mut class.fields
                        };
                        if table.insert(name.clone(), id).is_some() {
                            return Err(WhitelistError::DuplicateMember {
                                class: decl.name.clone(),
                                member: name,
                            });
                        }
                        members.push(Member::Field(Field {
                            owner,
                            name,
                            ty,
                            is_static,
                            constant,
                            getter,
                            setter,
                        }));
                    }
                }
            }
        }

        let mut bindings: FxHashMap<(String, usize), MemberId> = FxHashMap::default();
        for pending in self.bindings {
            let id = MemberId(members.len() as u32);
            let member = match pending {
                PendingBinding::Class {
                    name,
                    constructor_params,
                    params,
                    return_type,
                    factory,
                } => Member::ClassBinding(ClassBinding {
                    constructor_params: resolver.resolve_all(&name, &constructor_params)?,
                    params: resolver.resolve_all(&name, &params)?,
                    return_type: resolver.resolve(&name, &return_type)?,
                    name,
                    factory,
                }),
                PendingBinding::Instance {
                    name,
                    params,
                    return_type,
                    target,
                } => Member::InstanceBinding(InstanceBinding {
                    params: resolver.resolve_all(&name, &params)?,
                    return_type: resolver.resolve(&name, &return_type)?,
                    name,
                    target,
                }),
            };
            let (name, arity) = match &member {
                Member::ClassBinding(b) => (b.name.clone(), b.arity()),
                Member::InstanceBinding(b) => (b.name.clone(), b.params.len()),
                _ => continue,
            };
            if bindings.insert((name.clone(), arity), id).is_some() {
                return Err(WhitelistError::DuplicateMember {
                    class: "<bindings>".to_string(),
                    member: format!("{}/{}", name, arity),
                });
            }
            members.push(member);
        }

        check_acyclic(&classes)?;
        let core = CoreClasses::find(&class_names);
        Ok(Whitelist::from_parts(classes, class_names, members, bindings, core))
    }
}

struct TypeResolver<'a> {
    names: &'a FxHashMap<String, ClassId>,
}

impl TypeResolver<'_> {
    fn resolve(&self, context: &str, name: &str) -> Result<ScriptType, WhitelistError> {
        let (base, dims) = split_array_suffix(name);
        let ty = match ScriptType::from_primitive_name(base) {
            Some(ty) => ty,
            None => ScriptType::Class(*self.names.get(base).ok_or_else(|| {
                WhitelistError::UnknownType {
                    context: context.to_string(),
                    name: name.to_string(),
                }
            })?),
        };
        if dims > 0 && ty.is_void() {
            return Err(WhitelistError::UnknownType {
                context: context.to_string(),
                name: name.to_string(),
            });
        }
        Ok(ty.with_dims(dims))
    }

    fn resolve_all(&self, context: &str, names: &[String]) -> Result<Vec<ScriptType>, WhitelistError> {
        names
            .iter()
            .map(|name| {
                let ty = self.resolve(context, name)?;
                if ty.is_void() {
                    return Err(WhitelistError::UnknownType {
                        context: context.to_string(),
                        name: name.clone(),
                    });
                }
                Ok(ty)
            })
            .collect()
    }
}

/// Reject supertype cycles (depth-first with colouring).
fn check_acyclic(classes: &[ClassDef]) -> Result<(), WhitelistError> {
    #[derive(Clone, Copy, PartialEq)]
    enum Mark {
        New,
        Active,
        Done,
    }
    fn visit(classes: &[ClassDef], id: ClassId, marks: &mut [Mark]) -> Result<(), WhitelistError> {
        match marks[id.index()] {
            Mark::Done => return Ok(()),
            Mark::Active => return Err(WhitelistError::CyclicHierarchy(classes[id.index()].name.clone())),
            Mark::New => {}
        }
        marks[id.index()] = Mark::Active;
        for sup in &classes[id.index()].supers {
            visit(classes, *sup, marks)?;
        }
        marks[id.index()] = Mark::Done;
        Ok(())
    }

    let mut marks = vec![Mark::New; classes.len()];
    for class in classes {
        visit(classes, class.id, &mut marks)?;
    }
    Ok(())
}
