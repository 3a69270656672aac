//! Subtyping and assignability.
//!
//! Assignability is deliberately permissive where the engine cannot know
//! better: `Unknown` is assignable in both directions, because refusing a
//! dynamic value would make the engine wrong rather than uncertain.

use crate::{generics, ClassType, Primitive, Type, TypeEnv, WildcardBound};

/// Primitive widening conversion.
#[must_use]
pub fn widens_to(from: Primitive, to: Primitive) -> bool {
    use Primitive::*;
    if from == to {
        return true;
    }
    match from {
        Byte => matches!(to, Short | Int | Long | Float | Double),
        Short => matches!(to, Int | Long | Float | Double),
        Char => matches!(to, Int | Long | Float | Double),
        Int => matches!(to, Long | Float | Double),
        Long => matches!(to, Float | Double),
        Float => matches!(to, Double),
        Double | Boolean => false,
    }
}

fn resolve_named(env: &dyn TypeEnv, ty: &Type) -> Type {
    match ty {
        Type::Named(name) => match env.lookup_class(name.as_str()) {
            Some(id) => Type::class(id, vec![]),
            None => ty.clone(),
        },
        _ => ty.clone(),
    }
}

/// Reference subtyping, including generic argument containment.
#[must_use]
pub fn is_subtype(env: &dyn TypeEnv, sub: &Type, sup: &Type) -> bool {
    let sub = resolve_named(env, sub);
    let sup = resolve_named(env, sup);

    if sub == sup {
        return true;
    }

    match (&sub, &sup) {
        (Type::Union(members), _) => members.iter().all(|m| is_subtype(env, m, &sup)),
        (_, Type::Union(members)) => members.iter().any(|m| is_subtype(env, &sub, m)),
        (Type::Intersection(members), _) => members.iter().any(|m| is_subtype(env, m, &sup)),
        (_, Type::Intersection(members)) => members.iter().all(|m| is_subtype(env, &sub, m)),
        (Type::TypeVar(tv), _) => {
            let Some(def) = env.type_param(*tv) else {
                return false;
            };
            def.upper_bounds.iter().any(|b| is_subtype(env, b, &sup))
        }
        (_, Type::TypeVar(tv)) => {
            // Best effort: accept when the candidate satisfies every bound.
            let Some(def) = env.type_param(*tv) else {
                return false;
            };
            def.lower_bound
                .as_ref()
                .map(|l| is_subtype(env, l, &sub))
                .unwrap_or(false)
                || def.upper_bounds.iter().all(|b| is_subtype(env, &sub, b))
        }
        (Type::Array(a), Type::Array(b)) => is_subtype(env, a, b),
        (Type::Array(_), Type::Class(ct)) => ct.def == env.well_known().object,
        (Type::Class(_), Type::Class(target)) => {
            let Some(as_target) = generics::instantiate_as_supertype(env, &sub, target.def) else {
                return false;
            };
            let Type::Class(ClassType { args, .. }) = as_target else {
                return false;
            };
            if target.args.is_empty() || args.is_empty() {
                // Raw on either side erases the comparison.
                return true;
            }
            if target.args.len() != args.len() {
                return false;
            }
            args.iter()
                .zip(target.args.iter())
                .all(|(actual, formal)| arg_contained(env, actual, formal))
        }
        (Type::Named(a), Type::Named(b)) => a == b,
        _ => false,
    }
}

/// Generic argument containment (`List<String>` vs `List<? extends Object>`).
fn arg_contained(env: &dyn TypeEnv, actual: &Type, formal: &Type) -> bool {
    match formal {
        Type::Wildcard(WildcardBound::Unbounded) => true,
        Type::Wildcard(WildcardBound::Extends(upper)) => match actual {
            Type::Wildcard(WildcardBound::Extends(a)) => is_subtype(env, a, upper),
            Type::Wildcard(_) => false,
            other => is_subtype(env, other, upper),
        },
        Type::Wildcard(WildcardBound::Super(lower)) => match actual {
            Type::Wildcard(WildcardBound::Super(a)) => is_subtype(env, lower, a),
            Type::Wildcard(_) => false,
            other => is_subtype(env, lower, other),
        },
        _ => actual == formal || actual.is_unknown(),
    }
}

/// Assignability: subtyping plus primitive widening, boxing and unboxing.
#[must_use]
pub fn is_assignable(env: &dyn TypeEnv, from: &Type, to: &Type) -> bool {
    if from.is_unknown() || to.is_unknown() {
        return true;
    }

    let from = resolve_named(env, from);
    let to = resolve_named(env, to);

    match (&from, &to) {
        (Type::Primitive(a), Type::Primitive(b)) => widens_to(*a, *b),
        (Type::Primitive(p), _) => {
            // Boxing conversion, then reference widening.
            let boxed = Type::class(env.well_known().boxed(*p), vec![]);
            is_subtype(env, &boxed, &to)
        }
        (Type::Class(ct), Type::Primitive(p)) => {
            // Unboxing conversion, then primitive widening.
            match env.well_known().unboxed(ct.def) {
                Some(unboxed) => widens_to(unboxed, *p),
                None => false,
            }
        }
        (Type::Union(members), _) => members.iter().all(|m| is_assignable(env, m, &to)),
        (_, Type::Union(members)) => members.iter().any(|m| is_assignable(env, &from, m)),
        _ => is_subtype(env, &from, &to),
    }
}
