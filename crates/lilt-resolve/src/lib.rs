//! Name, member, and overload resolution.
//!
//! This crate knows how an unqualified or qualified reference binds to a
//! concrete declaration: lexical scope and closure delegation chains
//! ([`scope`]), field/property/accessor/extension precedence ([`member`]),
//! and best-match overload selection ([`overload`]).

mod member;
mod overload;
mod scope;

use lilt_ast::{BodyId, ExprId, LocalId, MethodDeclId, TypeRef};
use lilt_core::Name;
use lilt_types::{
    ClassId, Confidence, CtorId, FieldId, MethodId, Primitive, Type, TypeEnv,
};
use serde::{Deserialize, Serialize};

pub use member::{resolve_member, resolve_methods, MemberQuery};
pub use overload::{select_constructor, select_overload, OverloadSelection, SelectedOverload};
pub use scope::{
    class_instance_type, resolve_unqualified, ClosureScope, ScopeError, ScopeKind, ScopeStack,
    SlotValue, VariableInfo,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AccessorKind {
    Getter,
    Setter,
}

/// A local variable declaration site.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct LocalRef {
    pub body: BodyId,
    pub local: LocalId,
}

/// A method or constructor parameter declaration site.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ParamRef {
    pub owner: MethodDeclId,
    pub index: usize,
}

/// A closure parameter declaration site (including the implicit `it`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ClosureParamRef {
    pub body: BodyId,
    pub closure: ExprId,
    pub index: usize,
}

/// What a reference resolved to.
///
/// `Property` is a field reached through property syntax: observably distinct
/// from `Field`, which only explicit attribute access (`.@name`) produces.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Declaration {
    Field(FieldId),
    Property(FieldId),
    Accessor { method: MethodId, kind: AccessorKind },
    Method(MethodId),
    ExtensionMethod(MethodId),
    Constructor(CtorId),
    /// A `propertyMissing`/`methodMissing`/`invokeMethod`-style fallback.
    MissingHook(MethodId),
    Local(LocalRef),
    Param(ParamRef),
    ClosureParam(ClosureParamRef),
    Class(ClassId),
    /// Implicit top-level script binding created on first write.
    DynamicVar(Name),
    /// `this`, `super`, `owner`, `delegate`: scope-provided references with
    /// no user declaration site.
    PseudoVar(Name),
}

/// One possible answer for a reference.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Candidate {
    pub ty: Type,
    pub declaring: Option<Type>,
    pub decl: Declaration,
    pub confidence: Confidence,
}

/// Outcome of a member or unqualified-name query.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MemberResolution {
    Resolved(Candidate),
    Ambiguous(Vec<Candidate>),
    Unresolved,
}

impl MemberResolution {
    #[must_use]
    pub fn into_option(self) -> Option<Candidate> {
        match self {
            MemberResolution::Resolved(c) => Some(c),
            MemberResolution::Ambiguous(mut cs) => {
                // Deterministic best guess, downgraded so callers can tell.
                let mut first = cs.drain(..).next()?;
                first.confidence = first.confidence.min(Confidence::Inferred);
                Some(first)
            }
            MemberResolution::Unresolved => None,
        }
    }

    #[must_use]
    pub fn is_resolved(&self) -> bool {
        matches!(self, MemberResolution::Resolved(_))
    }
}

/// Resolve a source-level type reference against the universe.
///
/// Simple names fall back to the usual implicit packages (`java.lang`,
/// `java.util`, the language runtime). Names that stay unresolved are kept as
/// [`Type::Named`] so downstream output still shows what the source said.
pub fn resolve_type_ref(env: &dyn TypeEnv, type_ref: &TypeRef) -> Type {
    let base = match type_ref.name.as_str() {
        "def" => Type::Unknown,
        "boolean" => Type::Primitive(Primitive::Boolean),
        "byte" => Type::Primitive(Primitive::Byte),
        "short" => Type::Primitive(Primitive::Short),
        "int" => Type::Primitive(Primitive::Int),
        "long" => Type::Primitive(Primitive::Long),
        "char" => Type::Primitive(Primitive::Char),
        "float" => Type::Primitive(Primitive::Float),
        "double" => Type::Primitive(Primitive::Double),
        name => match lookup_class_name(env, name) {
            Some(id) => {
                let args = type_ref
                    .args
                    .iter()
                    .map(|a| resolve_type_ref(env, a))
                    .collect();
                Type::class(id, args)
            }
            None => Type::Named(type_ref.name.clone()),
        },
    };

    (0..type_ref.dims).fold(base, |ty, _| Type::array(ty))
}

fn lookup_class_name(env: &dyn TypeEnv, name: &str) -> Option<ClassId> {
    if let Some(id) = env.lookup_class(name) {
        return Some(id);
    }
    if name.contains('.') {
        return None;
    }
    for package in ["java.lang", "java.util", "lang"] {
        if let Some(id) = env.lookup_class(&format!("{package}.{name}")) {
            return Some(id);
        }
    }
    None
}
