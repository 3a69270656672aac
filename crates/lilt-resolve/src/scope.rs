//! Lexical scope stack and closure delegation chains.
//!
//! Frames are pushed and popped by the traversal driver. A closure frame
//! carries the three reference slots (`thisObject`, `owner`, `delegate`) and
//! the strategy that orders them; unqualified names always prefer lexical
//! bindings over any slot, regardless of strategy.

use std::collections::HashMap;

use lilt_ast::ResolveStrategy;
use lilt_core::Name;
use lilt_types::{ClassId, Confidence, SymbolUniverse, Type, TypeEnv, WellKnownTypes};
use thiserror::Error;

use crate::member::{resolve_member, MemberQuery};
use crate::{Candidate, Declaration, MemberResolution};

#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum ScopeError {
    /// A frame was popped without a matching push. Fatal to the pass.
    #[error("scope stack underflow")]
    Underflow,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VariableInfo {
    pub ty: Type,
    pub decl: Declaration,
}

/// What a closure reference slot holds. The driver records this when it
/// seeds the frame, so staticness is never guessed back from a type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SlotValue {
    /// An object instance; members resolve against its type.
    Instance(Type),
    /// The class itself (static context); only static members are visible.
    ClassRef(Type),
    /// The enclosing closure frame, a nested closure's owner.
    Enclosing(Box<ClosureScope>),
}

impl SlotValue {
    /// The type a direct read of the slot reports.
    #[must_use]
    pub fn surface_type(&self, wk: &WellKnownTypes) -> Type {
        match self {
            SlotValue::Instance(ty) | SlotValue::ClassRef(ty) => ty.clone(),
            SlotValue::Enclosing(_) => Type::class(wk.closure, vec![]),
        }
    }
}

/// The three reference slots of a closure frame plus its resolve strategy.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClosureScope {
    pub this_object: Type,
    pub owner: SlotValue,
    pub delegate: SlotValue,
    pub strategy: ResolveStrategy,
}

impl ClosureScope {
    /// Slots in the order the strategy consults them.
    #[must_use]
    pub fn slots(&self) -> Vec<&SlotValue> {
        match self.strategy {
            ResolveStrategy::OwnerFirst => vec![&self.owner, &self.delegate],
            ResolveStrategy::DelegateFirst => vec![&self.delegate, &self.owner],
            ResolveStrategy::OwnerOnly => vec![&self.owner],
            ResolveStrategy::DelegateOnly => vec![&self.delegate],
            ResolveStrategy::SelfOnly => vec![],
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScopeKind {
    /// Top-level script scope; unresolved names become dynamic bindings.
    Script,
    Class {
        class: ClassId,
    },
    Method {
        class: ClassId,
        is_static: bool,
    },
    /// Field initializer context.
    FieldInit {
        class: ClassId,
        is_static: bool,
    },
    Block,
    Closure(ClosureScope),
}

#[derive(Debug, Clone)]
struct Frame {
    kind: ScopeKind,
    vars: HashMap<Name, VariableInfo>,
}

/// A stack of lexical and closure frames, owned by one analysis pass.
#[derive(Debug, Clone, Default)]
pub struct ScopeStack {
    frames: Vec<Frame>,
}

impl ScopeStack {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, kind: ScopeKind) {
        self.frames.push(Frame {
            kind,
            vars: HashMap::new(),
        });
    }

    pub fn pop(&mut self) -> Result<ScopeKind, ScopeError> {
        self.frames
            .pop()
            .map(|f| f.kind)
            .ok_or(ScopeError::Underflow)
    }

    #[must_use]
    pub fn depth(&self) -> usize {
        self.frames.len()
    }

    /// Bind a local/parameter in the innermost frame.
    ///
    /// Panics are avoided: declaring with an empty stack is a driver bug that
    /// surfaces as a lookup miss rather than a crash.
    pub fn declare(&mut self, name: Name, info: VariableInfo) {
        if let Some(frame) = self.frames.last_mut() {
            frame.vars.insert(name, info);
        }
    }

    /// Innermost-to-outermost lexical binding lookup.
    #[must_use]
    pub fn lookup_var(&self, name: &Name) -> Option<&VariableInfo> {
        self.frames.iter().rev().find_map(|f| f.vars.get(name))
    }

    /// The nearest enclosing closure frame, if any.
    #[must_use]
    pub fn enclosing_closure(&self) -> Option<&ClosureScope> {
        self.frames.iter().rev().find_map(|f| match &f.kind {
            ScopeKind::Closure(cs) => Some(cs),
            _ => None,
        })
    }

    #[must_use]
    pub fn enclosing_class(&self) -> Option<ClassId> {
        self.frames.iter().rev().find_map(|f| match &f.kind {
            ScopeKind::Class { class }
            | ScopeKind::Method { class, .. }
            | ScopeKind::FieldInit { class, .. } => Some(*class),
            _ => None,
        })
    }

    /// Whether the innermost method/initializer context is static.
    #[must_use]
    pub fn in_static_context(&self) -> bool {
        for frame in self.frames.iter().rev() {
            match &frame.kind {
                ScopeKind::Method { is_static, .. } | ScopeKind::FieldInit { is_static, .. } => {
                    return *is_static;
                }
                ScopeKind::Script => return false,
                _ => {}
            }
        }
        false
    }

    #[must_use]
    pub fn at_top_level(&self) -> bool {
        !self
            .frames
            .iter()
            .any(|f| matches!(f.kind, ScopeKind::Class { .. } | ScopeKind::Closure(_)))
    }
}

/// Resolve an unqualified name against the scope stack.
///
/// Order: lexical bindings innermost-out, then closure slots per each
/// enclosing closure's strategy (escalating outward through nested
/// closures), then the enclosing class's members. Top-level dynamic
/// bindings are the driver's fallback, not handled here.
pub fn resolve_unqualified(
    universe: &SymbolUniverse,
    scopes: &ScopeStack,
    name: &Name,
    call_arity: Option<usize>,
    write: bool,
) -> MemberResolution {
    if let Some(candidate) = resolve_pseudo_variable(universe, scopes, name) {
        return MemberResolution::Resolved(candidate);
    }

    // 1. Locals and parameters always shadow delegation.
    if let Some(info) = scopes.lookup_var(name) {
        return MemberResolution::Resolved(Candidate {
            ty: info.ty.clone(),
            declaring: None,
            decl: info.decl.clone(),
            confidence: Confidence::Exact,
        });
    }

    let from_class = scopes.enclosing_class();
    let static_only = scopes.in_static_context();

    // 2./3. Closure slots, innermost closure first, escalating outward.
    for frame in scopes.frames.iter().rev() {
        match &frame.kind {
            ScopeKind::Closure(cs) => {
                for slot in cs.slots() {
                    let (receiver, slot_static) = match slot {
                        SlotValue::Instance(ty) => (ty, false),
                        SlotValue::ClassRef(ty) => (ty, true),
                        // Escalation through an enclosing closure continues
                        // with the outer frames below.
                        SlotValue::Enclosing(_) => continue,
                    };
                    let query = MemberQuery {
                        receiver,
                        name,
                        call_arity,
                        write,
                        attribute: false,
                        from_class,
                        static_only: slot_static,
                    };
                    let resolution = resolve_member(universe, &query);
                    if !matches!(resolution, MemberResolution::Unresolved) {
                        return resolution;
                    }
                }
            }
            ScopeKind::Class { class }
            | ScopeKind::Method { class, .. }
            | ScopeKind::FieldInit { class, .. } => {
                let receiver = class_instance_type(universe, *class);
                let query = MemberQuery {
                    receiver: &receiver,
                    name,
                    call_arity,
                    write,
                    attribute: false,
                    from_class,
                    static_only,
                };
                let resolution = resolve_member(universe, &query);
                if !matches!(resolution, MemberResolution::Unresolved) {
                    return resolution;
                }
            }
            _ => {}
        }
    }

    MemberResolution::Unresolved
}

fn resolve_pseudo_variable(
    universe: &SymbolUniverse,
    scopes: &ScopeStack,
    name: &Name,
) -> Option<Candidate> {
    let exact = |ty: Type| Candidate {
        ty,
        declaring: None,
        decl: Declaration::PseudoVar(Name::new(name.as_str())),
        confidence: Confidence::Exact,
    };

    match name.as_str() {
        "this" => {
            if let Some(cs) = scopes.enclosing_closure() {
                return Some(exact(cs.this_object.clone()));
            }
            let class = scopes.enclosing_class()?;
            Some(exact(class_instance_type(universe, class)))
        }
        "super" => {
            let class = scopes.enclosing_class()?;
            let def = TypeEnv::class(universe, class)?;
            let sup = def
                .super_class
                .clone()
                .unwrap_or_else(|| Type::class(universe.well_known().object, vec![]));
            Some(exact(sup))
        }
        "owner" => {
            let cs = scopes.enclosing_closure()?;
            Some(slot_candidate(universe, &cs.owner, name))
        }
        "delegate" => {
            let cs = scopes.enclosing_closure()?;
            Some(slot_candidate(universe, &cs.delegate, name))
        }
        _ => None,
    }
}

/// A class-reference slot keeps its class declaration so member access on
/// the reference stays static; everything else reads as a pseudo-variable.
fn slot_candidate(universe: &SymbolUniverse, slot: &SlotValue, name: &Name) -> Candidate {
    let ty = slot.surface_type(universe.well_known());
    let decl = match slot {
        SlotValue::ClassRef(ty) => ty
            .as_class()
            .map(|ct| Declaration::Class(ct.def))
            .unwrap_or_else(|| Declaration::PseudoVar(Name::new(name.as_str()))),
        _ => Declaration::PseudoVar(Name::new(name.as_str())),
    };
    Candidate {
        ty,
        declaring: None,
        decl,
        confidence: Confidence::Exact,
    }
}

/// The type of `this` within a class body, with its own parameters as
/// arguments so member types substitute cleanly.
#[must_use]
pub fn class_instance_type(universe: &SymbolUniverse, class: ClassId) -> Type {
    let args = lilt_types::TypeEnv::class(universe, class)
        .map(|def| def.type_params.iter().map(|tv| Type::TypeVar(*tv)).collect())
        .unwrap_or_default();
    Type::class(class, args)
}
