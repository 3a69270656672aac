//! Type-parameter substitution, unification, and supertype instantiation.
//!
//! The walk over the supertype graph mirrors the rest of the engine: a
//! visited set guards against cyclic hierarchies, and every helper is
//! best-effort, returning `None` (never panicking) on missing metadata.

use std::collections::{HashMap, HashSet};

use crate::{is_assignable, ClassId, ClassType, Type, TypeEnv, TypeVarId, WildcardBound};

/// Bindings from type parameters to their inferred actual types.
pub type TypeParamMap = HashMap<TypeVarId, Type>;

/// Replace every bound type variable in `ty` with its binding.
///
/// Unbound variables are left in place so callers can distinguish "not yet
/// inferred" from "inferred to Unknown".
#[must_use]
pub fn substitute(env: &dyn TypeEnv, ty: &Type, bindings: &TypeParamMap) -> Type {
    match ty {
        Type::TypeVar(tv) => match bindings.get(tv) {
            Some(bound) => bound.clone(),
            None => ty.clone(),
        },
        Type::Class(ClassType { def, args }) => Type::class(
            *def,
            args.iter().map(|a| substitute(env, a, bindings)).collect(),
        ),
        Type::Array(elem) => Type::array(substitute(env, elem, bindings)),
        Type::Wildcard(WildcardBound::Extends(b)) => Type::Wildcard(WildcardBound::Extends(
            Box::new(substitute(env, b, bindings)),
        )),
        Type::Wildcard(WildcardBound::Super(b)) => {
            Type::Wildcard(WildcardBound::Super(Box::new(substitute(env, b, bindings))))
        }
        Type::Union(members) => Type::union(
            members
                .iter()
                .map(|m| substitute(env, m, bindings))
                .collect(),
        ),
        Type::Intersection(members) => Type::Intersection(
            members
                .iter()
                .map(|m| substitute(env, m, bindings))
                .collect(),
        ),
        _ => ty.clone(),
    }
}

/// View `ty` as an instantiation of `target` by walking the supertype graph
/// and substituting type arguments along the way.
///
/// `ArrayList<String>` viewed as `java.util.List` yields `List<String>`.
#[must_use]
pub fn instantiate_as_supertype(env: &dyn TypeEnv, ty: &Type, target: ClassId) -> Option<Type> {
    let ct = match ty {
        Type::Class(ct) => ct.clone(),
        Type::Array(_) => {
            // Arrays only widen to Object at the class level.
            if target == env.well_known().object {
                return Some(Type::class(target, vec![]));
            }
            return None;
        }
        Type::TypeVar(tv) => {
            let def = env.type_param(*tv)?;
            return def
                .upper_bounds
                .iter()
                .find_map(|b| instantiate_as_supertype(env, b, target));
        }
        Type::Intersection(members) => {
            return members
                .iter()
                .find_map(|m| instantiate_as_supertype(env, m, target));
        }
        Type::Named(name) => {
            let id = env.lookup_class(name.as_str())?;
            ClassType {
                def: id,
                args: vec![],
            }
        }
        _ => return None,
    };

    let mut seen: HashSet<ClassId> = HashSet::new();
    let mut queue: Vec<ClassType> = vec![ct];
    while let Some(current) = queue.pop() {
        if current.def == target {
            return Some(Type::Class(current));
        }
        if !seen.insert(current.def) {
            continue;
        }
        let Some(def) = env.class(current.def) else {
            continue;
        };

        // Bindings of the current class's own parameters, used to substitute
        // into its declared supertypes. Raw instantiations propagate rawness.
        let bindings: TypeParamMap = if current.args.len() == def.type_params.len() {
            def.type_params
                .iter()
                .copied()
                .zip(current.args.iter().cloned())
                .collect()
        } else {
            TypeParamMap::new()
        };
        let raw = current.args.is_empty() && !def.type_params.is_empty();

        for declared in def.super_class.iter().chain(def.interfaces.iter()) {
            let Some(sup_ct) = declared.as_class() else {
                continue;
            };
            let args = if raw {
                vec![]
            } else {
                sup_ct
                    .args
                    .iter()
                    .map(|a| substitute(env, a, &bindings))
                    .collect()
            };
            queue.push(ClassType {
                def: sup_ct.def,
                args,
            });
        }
    }

    None
}

/// Unify a declared (possibly generic) type against an actual argument type,
/// accumulating type-variable bindings.
///
/// Structural: `List<T>` against `List<String>` binds `T = String`. A
/// variable bound twice joins via [`lub`] so `max(1, 2L)` still infers.
pub fn unify(env: &dyn TypeEnv, declared: &Type, actual: &Type, bindings: &mut TypeParamMap) {
    match declared {
        Type::TypeVar(tv) => {
            let actual = boxed_if_primitive(env, actual);
            if actual.is_unknown() {
                return;
            }
            match bindings.get(tv) {
                Some(existing) => {
                    let joined = lub(env, existing, &actual);
                    bindings.insert(*tv, joined);
                }
                None => {
                    bindings.insert(*tv, actual);
                }
            }
        }
        Type::Class(ClassType { def, args }) => {
            if args.is_empty() {
                return;
            }
            let Some(as_declared) = instantiate_as_supertype(env, actual, *def) else {
                return;
            };
            let Type::Class(ClassType {
                args: actual_args, ..
            }) = as_declared
            else {
                return;
            };
            for (formal, actual_arg) in args.iter().zip(actual_args.iter()) {
                unify(env, formal, actual_arg, bindings);
            }
        }
        Type::Array(elem) => {
            if let Type::Array(actual_elem) = actual {
                unify(env, elem, actual_elem, bindings);
            }
        }
        Type::Wildcard(WildcardBound::Extends(b)) | Type::Wildcard(WildcardBound::Super(b)) => {
            unify(env, b, actual, bindings);
        }
        _ => {}
    }
}

/// Check an inferred binding against its type parameter's declared bounds.
///
/// Bounds may mention the parameter itself (`T extends Comparable<T>`), so
/// they are substituted under the accumulated bindings before the check.
#[must_use]
pub fn satisfies_bounds(
    env: &dyn TypeEnv,
    tv: TypeVarId,
    binding: &Type,
    bindings: &TypeParamMap,
) -> bool {
    let Some(def) = env.type_param(tv) else {
        return true;
    };
    def.upper_bounds.iter().all(|bound| {
        let bound = substitute(env, bound, bindings);
        is_assignable(env, binding, &bound)
    })
}

/// Least upper bound of two types, as the engine's merge join.
///
/// Subtype-directed when one side already covers the other; otherwise the
/// result is their union, which flow merges can observe directly.
#[must_use]
pub fn lub(env: &dyn TypeEnv, a: &Type, b: &Type) -> Type {
    if a == b {
        return a.clone();
    }
    if a.is_unknown() {
        return b.clone();
    }
    if b.is_unknown() {
        return a.clone();
    }
    if is_assignable(env, a, b) {
        return b.clone();
    }
    if is_assignable(env, b, a) {
        return a.clone();
    }
    Type::union(vec![a.clone(), b.clone()])
}

/// Element type of an iterable/list/array receiver, if recoverable.
#[must_use]
pub fn element_type(env: &dyn TypeEnv, ty: &Type) -> Option<Type> {
    match ty {
        Type::Array(elem) => Some((**elem).clone()),
        _ => {
            let wk = env.well_known();
            for container in [wk.list, wk.collection, wk.iterable] {
                if let Some(Type::Class(ClassType { args, .. })) =
                    instantiate_as_supertype(env, ty, container)
                {
                    if let Some(first) = args.first() {
                        return Some(first.clone());
                    }
                }
            }
            None
        }
    }
}

fn boxed_if_primitive(env: &dyn TypeEnv, ty: &Type) -> Type {
    match ty {
        Type::Primitive(p) => Type::class(env.well_known().boxed(*p), vec![]),
        _ => ty.clone(),
    }
}
