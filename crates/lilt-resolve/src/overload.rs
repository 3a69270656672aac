//! Best-match overload selection.
//!
//! Two phases, matching platform call semantics: fixed-arity application is
//! tried for every candidate first, and varargs expansion only when nothing
//! fits without it. Among the applicable signatures the most specific wins;
//! a genuine tie is reported as ambiguous with the candidates in their
//! original (nearest-declaration) order so callers stay deterministic.

use lilt_types::{
    is_assignable, satisfies_bounds, substitute, unify, ClassType, CtorId, MethodId,
    SymbolUniverse, Type, TypeEnv, TypeParamMap, TypeVarId,
};

/// A chosen method signature with everything the caller needs: inferred
/// type-variable bindings, the substituted parameter types aligned to the
/// call's arity, and the substituted return type.
#[derive(Debug, Clone, PartialEq)]
pub struct SelectedOverload {
    pub method: MethodId,
    pub bindings: TypeParamMap,
    pub params: Vec<Type>,
    pub ret: Type,
}

#[derive(Debug, Clone, PartialEq)]
pub enum OverloadSelection {
    Selected(SelectedOverload),
    Ambiguous(Vec<SelectedOverload>),
    NoMatch,
}

impl OverloadSelection {
    /// Deterministic best guess: the first of an ambiguous set.
    #[must_use]
    pub fn into_best(self) -> Option<SelectedOverload> {
        match self {
            OverloadSelection::Selected(s) => Some(s),
            OverloadSelection::Ambiguous(mut set) => {
                if set.is_empty() {
                    None
                } else {
                    Some(set.remove(0))
                }
            }
            OverloadSelection::NoMatch => None,
        }
    }
}

/// Select among method candidates for a call with the given argument types.
///
/// Each candidate carries the type-argument bindings of its declaring level
/// (receiver generics); argument-driven inference adds to those. Candidates
/// whose inferred bindings violate a declared bound are discarded.
pub fn select_overload(
    universe: &SymbolUniverse,
    candidates: &[(MethodId, TypeParamMap)],
    args: &[Type],
) -> OverloadSelection {
    let mut applicable: Vec<SelectedOverload> = Vec::new();

    // Phase 1: fixed arity, no varargs expansion.
    for (method, outer) in candidates {
        let Some(def) = universe.method(*method) else {
            continue;
        };
        if def.params.len() != args.len() {
            continue;
        }
        if let Some(sel) = try_apply(universe, *method, &def.params, &def.type_params, outer, args)
        {
            applicable.push(sel);
        }
    }

    // Phase 2: varargs expansion, only when nothing applied without it.
    if applicable.is_empty() {
        for (method, outer) in candidates {
            let Some(def) = universe.method(*method) else {
                continue;
            };
            if !def.varargs || args.len() + 1 < def.params.len() {
                continue;
            }
            let expanded = expand_varargs(&def.params, args.len());
            if let Some(sel) =
                try_apply(universe, *method, &expanded, &def.type_params, outer, args)
            {
                applicable.push(sel);
            }
        }
    }

    if applicable.len() <= 1 {
        return match applicable.pop() {
            Some(only) => OverloadSelection::Selected(only),
            None => OverloadSelection::NoMatch,
        };
    }

    let mut survivors = most_specific(universe, applicable);
    if survivors.len() == 1 {
        match survivors.pop() {
            Some(only) => OverloadSelection::Selected(only),
            None => OverloadSelection::NoMatch,
        }
    } else {
        OverloadSelection::Ambiguous(survivors)
    }
}

/// Select a constructor of `receiver` for the given arguments. Ties resolve
/// to the earliest declared constructor.
#[must_use]
pub fn select_constructor(
    universe: &SymbolUniverse,
    receiver: &ClassType,
    args: &[Type],
) -> Option<CtorId> {
    let def = universe.class(receiver.def)?;
    let outer: TypeParamMap = if receiver.args.len() == def.type_params.len() {
        def.type_params
            .iter()
            .copied()
            .zip(receiver.args.iter().cloned())
            .collect()
    } else {
        TypeParamMap::new()
    };

    let check = |params: &[Type]| -> bool {
        let mut bindings = outer.clone();
        params
            .iter()
            .zip(args.iter())
            .for_each(|(declared, actual)| unify(universe, declared, actual, &mut bindings));
        params.iter().zip(args.iter()).all(|(declared, actual)| {
            let declared = substitute(universe, declared, &bindings);
            is_assignable(universe, actual, &declared)
        })
    };

    // Fixed arity first, then varargs expansion.
    for (index, ctor) in def.constructors.iter().enumerate() {
        if ctor.params.len() == args.len() && check(&ctor.params) {
            return Some(CtorId {
                class: receiver.def,
                index: index as u32,
            });
        }
    }
    for (index, ctor) in def.constructors.iter().enumerate() {
        if !ctor.varargs || args.len() + 1 < ctor.params.len() {
            continue;
        }
        if check(&expand_varargs(&ctor.params, args.len())) {
            return Some(CtorId {
                class: receiver.def,
                index: index as u32,
            });
        }
    }
    None
}

fn try_apply(
    universe: &SymbolUniverse,
    method: MethodId,
    params: &[Type],
    type_params: &[TypeVarId],
    outer: &TypeParamMap,
    args: &[Type],
) -> Option<SelectedOverload> {
    let mut bindings = outer.clone();
    for (declared, actual) in params.iter().zip(args.iter()) {
        unify(universe, declared, actual, &mut bindings);
    }

    let substituted: Vec<Type> = params
        .iter()
        .map(|p| substitute(universe, p, &bindings))
        .collect();
    for (declared, actual) in substituted.iter().zip(args.iter()) {
        if !is_assignable(universe, actual, declared) {
            return None;
        }
    }

    for tv in type_params {
        if let Some(binding) = bindings.get(tv).cloned() {
            if !satisfies_bounds(universe, *tv, &binding, &bindings) {
                return None;
            }
        }
    }

    let ret = universe
        .method(method)
        .map(|def| substitute(universe, &def.ret, &bindings))
        .unwrap_or(Type::Unknown);
    Some(SelectedOverload {
        method,
        bindings,
        params: substituted,
        ret,
    })
}

/// Effective parameter list for a varargs call: fixed parameters followed by
/// the vararg element type repeated to match the arity.
fn expand_varargs(params: &[Type], arity: usize) -> Vec<Type> {
    let fixed = params.len().saturating_sub(1);
    let elem = match params.last() {
        Some(Type::Array(elem)) => (**elem).clone(),
        Some(other) => other.clone(),
        None => Type::Unknown,
    };
    let mut out: Vec<Type> = params[..fixed].to_vec();
    out.extend(std::iter::repeat(elem).take(arity - fixed));
    out
}

/// Keep only the maximally specific signatures: drop any that is strictly
/// more general than another applicable one.
fn most_specific(
    universe: &SymbolUniverse,
    applicable: Vec<SelectedOverload>,
) -> Vec<SelectedOverload> {
    let strictly_more_specific = |a: &SelectedOverload, b: &SelectedOverload| {
        a.params.len() == b.params.len()
            && a.params
                .iter()
                .zip(b.params.iter())
                .all(|(pa, pb)| is_assignable(universe, pa, pb))
            && a.params != b.params
    };

    let survivors: Vec<SelectedOverload> = applicable
        .iter()
        .filter(|candidate| {
            !applicable
                .iter()
                .any(|other| strictly_more_specific(other, candidate))
        })
        .cloned()
        .collect();

    if survivors.is_empty() {
        applicable
    } else {
        survivors
    }
}
