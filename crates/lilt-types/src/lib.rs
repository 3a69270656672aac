//! Type model and symbol universe for the Lilt inference engine.
//!
//! Types are plain values: a nominal class reference with generic arguments,
//! primitives, arrays, type variables, wildcards, and union/intersection
//! joins. Class metadata lives in a [`SymbolUniverse`], which is built once
//! per project revision, published immutably, and shared by concurrent
//! analysis passes.

mod generics;
mod store;
mod subtype;

use std::fmt;

use lilt_core::{Name, QualifiedName};
use serde::{Deserialize, Serialize};

pub use generics::{
    element_type, instantiate_as_supertype, lub, satisfies_bounds, substitute, unify, TypeParamMap,
};
pub use store::{
    ExtensionMethodRef, Revision, SymbolUniverse, SymbolUniverseBuilder, WellKnownTypes,
};
pub use subtype::{is_assignable, is_subtype, widens_to};

/// Identity of a class definition inside a [`SymbolUniverse`].
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ClassId(pub(crate) u32);

impl fmt::Debug for ClassId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ClassId({})", self.0)
    }
}

/// Identity of a class or method type parameter.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TypeVarId(pub(crate) u32);

impl fmt::Debug for TypeVarId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "TypeVarId({})", self.0)
    }
}

/// A field definition addressed by declaring class and index.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct FieldId {
    pub class: ClassId,
    pub index: u32,
}

/// A method definition addressed by declaring class and index.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MethodId {
    pub class: ClassId,
    pub index: u32,
}

/// A constructor definition addressed by declaring class and index.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CtorId {
    pub class: ClassId,
    pub index: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Primitive {
    Boolean,
    Byte,
    Short,
    Int,
    Long,
    Char,
    Float,
    Double,
}

impl Primitive {
    #[must_use]
    pub fn name(self) -> &'static str {
        match self {
            Primitive::Boolean => "boolean",
            Primitive::Byte => "byte",
            Primitive::Short => "short",
            Primitive::Int => "int",
            Primitive::Long => "long",
            Primitive::Char => "char",
            Primitive::Float => "float",
            Primitive::Double => "double",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum WildcardBound {
    Unbounded,
    Extends(Box<Type>),
    Super(Box<Type>),
}

/// A nominal class reference with its generic arguments.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ClassType {
    pub def: ClassId,
    pub args: Vec<Type>,
}

/// A static type as the engine reasons about it.
///
/// `Union` is the join of its members and carries no nominal name of its own;
/// `Unknown` is the honest answer for dynamic or unresolvable expressions.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Type {
    Class(ClassType),
    Primitive(Primitive),
    Array(Box<Type>),
    TypeVar(TypeVarId),
    Wildcard(WildcardBound),
    Union(Vec<Type>),
    Intersection(Vec<Type>),
    /// A nominal reference not (yet) resolved against the universe.
    Named(QualifiedName),
    Unknown,
}

impl Type {
    #[must_use]
    pub fn class(def: ClassId, args: Vec<Type>) -> Type {
        Type::Class(ClassType { def, args })
    }

    #[must_use]
    pub fn array(elem: Type) -> Type {
        Type::Array(Box::new(elem))
    }

    /// Build a union, flattening nested unions and deduplicating members.
    /// A single-member union collapses to that member.
    #[must_use]
    pub fn union(members: Vec<Type>) -> Type {
        let mut flat: Vec<Type> = Vec::with_capacity(members.len());
        let mut push = |ty: Type, flat: &mut Vec<Type>| {
            if !flat.contains(&ty) {
                flat.push(ty);
            }
        };
        for member in members {
            match member {
                Type::Union(inner) => {
                    for ty in inner {
                        push(ty, &mut flat);
                    }
                }
                other => push(other, &mut flat),
            }
        }
        match flat.len() {
            0 => Type::Unknown,
            1 => flat.into_iter().next().unwrap_or(Type::Unknown),
            _ => Type::Union(flat),
        }
    }

    #[must_use]
    pub fn is_unknown(&self) -> bool {
        matches!(self, Type::Unknown)
    }

    #[must_use]
    pub fn as_class(&self) -> Option<&ClassType> {
        match self {
            Type::Class(ct) => Some(ct),
            _ => None,
        }
    }
}

/// Ordered certainty attached to every inferred type and declaration.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, Default,
)]
pub enum Confidence {
    #[default]
    Unknown,
    Inferred,
    Exact,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Visibility {
    Public,
    Protected,
    Package,
    Private,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ClassKind {
    Class,
    Interface,
    Trait,
    Enum,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldDef {
    pub name: Name,
    pub ty: Type,
    pub is_static: bool,
    pub visibility: Visibility,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MethodDef {
    pub name: Name,
    pub type_params: Vec<TypeVarId>,
    pub params: Vec<Type>,
    pub ret: Type,
    pub is_static: bool,
    pub varargs: bool,
    pub visibility: Visibility,
}

impl MethodDef {
    /// Whether a call with `arity` arguments can bind to this signature,
    /// accounting for a trailing varargs parameter.
    #[must_use]
    pub fn accepts_arity(&self, arity: usize) -> bool {
        if self.varargs {
            arity + 1 >= self.params.len()
        } else {
            arity == self.params.len()
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConstructorDef {
    pub params: Vec<Type>,
    pub varargs: bool,
    pub visibility: Visibility,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TypeParamDef {
    pub name: String,
    pub upper_bounds: Vec<Type>,
    pub lower_bound: Option<Type>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClassDef {
    pub name: QualifiedName,
    pub kind: ClassKind,
    pub type_params: Vec<TypeVarId>,
    pub super_class: Option<Type>,
    pub interfaces: Vec<Type>,
    pub fields: Vec<FieldDef>,
    pub methods: Vec<MethodDef>,
    pub constructors: Vec<ConstructorDef>,
    /// Closed set of subtypes for sealed hierarchies; empty when open.
    pub permitted_subtypes: Vec<QualifiedName>,
}

impl ClassDef {
    #[must_use]
    pub fn new(name: impl Into<QualifiedName>, kind: ClassKind) -> Self {
        ClassDef {
            name: name.into(),
            kind,
            type_params: Vec::new(),
            super_class: None,
            interfaces: Vec::new(),
            fields: Vec::new(),
            methods: Vec::new(),
            constructors: Vec::new(),
            permitted_subtypes: Vec::new(),
        }
    }

    #[must_use]
    pub fn package(&self) -> &str {
        self.name.package()
    }
}

/// Read-only view over class and type-parameter metadata.
///
/// [`SymbolUniverse`] is the canonical implementation; algorithms take
/// `&dyn TypeEnv` so tests and adapters can supply their own.
pub trait TypeEnv {
    fn class(&self, id: ClassId) -> Option<&ClassDef>;
    fn type_param(&self, id: TypeVarId) -> Option<&TypeParamDef>;
    fn lookup_class(&self, name: &str) -> Option<ClassId>;
    fn well_known(&self) -> &WellKnownTypes;
}

/// Render a type as a human-readable name, mostly for tests and logging.
pub fn type_name(env: &dyn TypeEnv, ty: &Type) -> String {
    match ty {
        Type::Class(ClassType { def, args }) => {
            let base = env
                .class(*def)
                .map(|c| c.name.as_str().to_string())
                .unwrap_or_else(|| format!("<class#{:?}>", def));
            if args.is_empty() {
                base
            } else {
                let args = args
                    .iter()
                    .map(|a| type_name(env, a))
                    .collect::<Vec<_>>()
                    .join(", ");
                format!("{base}<{args}>")
            }
        }
        Type::Primitive(p) => p.name().to_string(),
        Type::Array(elem) => format!("{}[]", type_name(env, elem)),
        Type::TypeVar(tv) => env
            .type_param(*tv)
            .map(|tp| tp.name.clone())
            .unwrap_or_else(|| format!("<tv#{:?}>", tv)),
        Type::Wildcard(WildcardBound::Unbounded) => "?".to_string(),
        Type::Wildcard(WildcardBound::Extends(b)) => format!("? extends {}", type_name(env, b)),
        Type::Wildcard(WildcardBound::Super(b)) => format!("? super {}", type_name(env, b)),
        Type::Union(members) => members
            .iter()
            .map(|m| type_name(env, m))
            .collect::<Vec<_>>()
            .join(" | "),
        Type::Intersection(members) => members
            .iter()
            .map(|m| type_name(env, m))
            .collect::<Vec<_>>()
            .join(" & "),
        Type::Named(name) => name.as_str().to_string(),
        Type::Unknown => "<unknown>".to_string(),
    }
}
