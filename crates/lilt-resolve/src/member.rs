//! Member resolution against a receiver type.
//!
//! One precedence chain for property-position access: explicit attribute
//! access sees fields only; plain access walks the hierarchy nearest-first
//! where an accessor pair beats a field declared on the same class, but a
//! nearer field beats a farther accessor. Instance members always beat
//! extension methods, which beat the dynamic missing hooks. A member that
//! matches by name but fails the visibility check stops the chain cold; it
//! does not fall through to a farther or weaker candidate.

use lilt_core::Name;
use lilt_types::{
    instantiate_as_supertype, is_assignable, lub, substitute, unify, ClassId, ClassType,
    Confidence, FieldId, MethodDef, MethodId, SymbolUniverse, Type, TypeEnv, TypeParamMap,
    Visibility,
};

use crate::{AccessorKind, Candidate, Declaration, MemberResolution};

/// A member lookup request.
#[derive(Debug, Clone, Copy)]
pub struct MemberQuery<'a> {
    pub receiver: &'a Type,
    pub name: &'a Name,
    /// `Some` for method-call position, with the argument count.
    pub call_arity: Option<usize>,
    /// Whether this is the target of an assignment.
    pub write: bool,
    /// Explicit attribute access (`.@name`): fields only, no accessors,
    /// no extensions, no hooks.
    pub attribute: bool,
    /// The class whose body the reference occurs in, for visibility.
    pub from_class: Option<ClassId>,
    /// Restrict to static members (class-reference receivers).
    pub static_only: bool,
}

/// Resolve a single member reference. For call position this returns the
/// nearest name match so callers can locate the owning receiver; precise
/// signature selection is the overload resolver's job.
pub fn resolve_member(universe: &SymbolUniverse, query: &MemberQuery<'_>) -> MemberResolution {
    match query.receiver {
        Type::Unknown => MemberResolution::Unresolved,
        Type::Union(members) => resolve_against_union(universe, query, members),
        Type::Intersection(members) => members
            .iter()
            .map(|m| {
                let inner = MemberQuery {
                    receiver: m,
                    ..*query
                };
                resolve_member(universe, &inner)
            })
            .find(|r| !matches!(r, MemberResolution::Unresolved))
            .unwrap_or(MemberResolution::Unresolved),
        _ => {
            let Some(ct) = receiver_class(universe, query.receiver) else {
                return MemberResolution::Unresolved;
            };
            resolve_on_class(universe, query, &ct)
        }
    }
}

/// All methods named `name` visible on the receiver's hierarchy,
/// nearest-first, each with the type-argument bindings of its declaring
/// level. Extension methods are not included.
pub fn resolve_methods(
    universe: &SymbolUniverse,
    receiver: &Type,
    name: &Name,
    static_only: bool,
    from_class: Option<ClassId>,
) -> Vec<(MethodId, TypeParamMap)> {
    let mut out = Vec::new();
    let Some(ct) = receiver_class(universe, receiver) else {
        return out;
    };
    for (class, bindings) in hierarchy_levels(universe, &ct) {
        let Some(def) = universe.class(class) else {
            continue;
        };
        for (index, method) in def.methods.iter().enumerate() {
            if &method.name != name {
                continue;
            }
            if static_only && !method.is_static {
                continue;
            }
            if !is_visible(universe, method.visibility, class, from_class) {
                continue;
            }
            out.push((
                MethodId {
                    class,
                    index: index as u32,
                },
                bindings.clone(),
            ));
        }
    }
    out
}

fn resolve_on_class(
    universe: &SymbolUniverse,
    query: &MemberQuery<'_>,
    ct: &ClassType,
) -> MemberResolution {
    let levels = hierarchy_levels(universe, ct);

    if query.attribute {
        return resolve_attribute(universe, query, &levels);
    }

    if query.call_arity.is_some() {
        return resolve_call_position(universe, query, ct, &levels);
    }

    // Plain property access, nearest level first.
    for (class, bindings) in &levels {
        if let Some(resolution) = property_at_level(universe, query, *class, bindings) {
            return resolution;
        }
    }

    // Extension accessor: a category getter/setter whose first parameter
    // accepts the receiver.
    if let Some(resolution) = extension_accessor(universe, query) {
        return resolution;
    }

    missing_property_hook(universe, query, &levels)
}

fn resolve_attribute(
    universe: &SymbolUniverse,
    query: &MemberQuery<'_>,
    levels: &[(ClassId, TypeParamMap)],
) -> MemberResolution {
    for (class, bindings) in levels {
        let Some(def) = universe.class(*class) else {
            continue;
        };
        for (index, field) in def.fields.iter().enumerate() {
            if &field.name != query.name {
                continue;
            }
            if query.static_only && !field.is_static {
                continue;
            }
            if !is_visible(universe, field.visibility, *class, query.from_class) {
                return MemberResolution::Unresolved;
            }
            return MemberResolution::Resolved(Candidate {
                ty: substitute(universe, &field.ty, bindings),
                declaring: Some(Type::class(*class, vec![])),
                decl: Declaration::Field(FieldId {
                    class: *class,
                    index: index as u32,
                }),
                confidence: Confidence::Exact,
            });
        }
    }
    MemberResolution::Unresolved
}

fn resolve_call_position(
    universe: &SymbolUniverse,
    query: &MemberQuery<'_>,
    ct: &ClassType,
    levels: &[(ClassId, TypeParamMap)],
) -> MemberResolution {
    let arity = query.call_arity.unwrap_or(0);

    for (class, bindings) in levels {
        let Some(def) = universe.class(*class) else {
            continue;
        };
        for (index, method) in def.methods.iter().enumerate() {
            if &method.name != query.name || !method.accepts_arity(arity) {
                continue;
            }
            if query.static_only && !method.is_static {
                continue;
            }
            if !is_visible(universe, method.visibility, *class, query.from_class) {
                return MemberResolution::Unresolved;
            }
            return MemberResolution::Resolved(Candidate {
                ty: substitute(universe, &method.ret, bindings),
                declaring: Some(Type::class(*class, vec![])),
                decl: Declaration::Method(MethodId {
                    class: *class,
                    index: index as u32,
                }),
                confidence: Confidence::Exact,
            });
        }
    }

    // A closure-typed property is callable: `foo.bar(x)` may invoke the
    // closure held in property `bar`.
    for (class, bindings) in levels {
        if let Some(MemberResolution::Resolved(candidate)) = property_at_level(
            universe,
            &MemberQuery {
                call_arity: None,
                write: false,
                ..*query
            },
            *class,
            bindings,
        ) {
            if is_closure_type(universe, &candidate.ty) {
                return MemberResolution::Resolved(candidate);
            }
        }
    }

    if let Some(resolution) = extension_call(universe, query, ct, arity) {
        return resolution;
    }

    missing_method_hook(universe, query, levels)
}

/// Property lookup at one hierarchy level. `Some(Unresolved)` means a match
/// was found but is not visible; the caller must stop, not fall through.
fn property_at_level(
    universe: &SymbolUniverse,
    query: &MemberQuery<'_>,
    class: ClassId,
    bindings: &TypeParamMap,
) -> Option<MemberResolution> {
    let def = universe.class(class)?;
    let declaring = Some(Type::class(class, vec![]));

    // Accessor beats field on the same class.
    let accessor = def.methods.iter().enumerate().find(|(_, m)| {
        if query.static_only && !m.is_static {
            return false;
        }
        if query.write {
            is_setter_for(m, query.name)
        } else {
            is_getter_for(m, query.name, universe)
        }
    });
    if let Some((index, method)) = accessor {
        if !is_visible(universe, method.visibility, class, query.from_class) {
            return Some(MemberResolution::Unresolved);
        }
        let (ty, kind) = if query.write {
            (method.params[0].clone(), AccessorKind::Setter)
        } else {
            (method.ret.clone(), AccessorKind::Getter)
        };
        return Some(MemberResolution::Resolved(Candidate {
            ty: substitute(universe, &ty, bindings),
            declaring,
            decl: Declaration::Accessor {
                method: MethodId {
                    class,
                    index: index as u32,
                },
                kind,
            },
            confidence: Confidence::Exact,
        }));
    }

    let field = def
        .fields
        .iter()
        .enumerate()
        .find(|(_, f)| &f.name == query.name && (!query.static_only || f.is_static));
    if let Some((index, field)) = field {
        if !is_visible(universe, field.visibility, class, query.from_class) {
            return Some(MemberResolution::Unresolved);
        }
        return Some(MemberResolution::Resolved(Candidate {
            ty: substitute(universe, &field.ty, bindings),
            declaring,
            decl: Declaration::Property(FieldId {
                class,
                index: index as u32,
            }),
            confidence: Confidence::Exact,
        }));
    }

    None
}

fn extension_call(
    universe: &SymbolUniverse,
    query: &MemberQuery<'_>,
    ct: &ClassType,
    arity: usize,
) -> Option<MemberResolution> {
    let receiver_ty = Type::Class(ct.clone());
    let mut matches: Vec<(MethodId, usize, TypeParamMap)> = Vec::new();
    for ext in universe.extension_methods(query.name) {
        let Some(method) = universe.method(ext.method) else {
            continue;
        };
        // The receiver binds the first parameter; the call supplies the rest.
        if !method.accepts_arity(arity + 1) {
            continue;
        }
        let Some(bindings) = self_param_bindings(universe, method, &receiver_ty) else {
            continue;
        };
        matches.push((ext.method, ext.provider_rank, bindings));
    }
    if matches.is_empty() {
        return None;
    }

    matches.sort_by_key(|(_, rank, _)| *rank);
    let best_rank = matches[0].1;
    let best: Vec<_> = matches
        .iter()
        .take_while(|(_, r, _)| *r == best_rank)
        .collect();

    let candidate_for = |id: MethodId, bindings: &TypeParamMap| {
        let method = universe.method(id)?;
        Some(Candidate {
            ty: substitute(universe, &method.ret, bindings),
            declaring: Some(Type::class(id.class, vec![])),
            decl: Declaration::ExtensionMethod(id),
            confidence: Confidence::Exact,
        })
    };

    if best.len() == 1 {
        let (id, _, bindings) = best[0];
        return candidate_for(*id, bindings).map(MemberResolution::Resolved);
    }
    tracing::debug!(name = %query.name, count = best.len(), "extension tie at equal provider rank");
    let candidates: Vec<_> = best
        .iter()
        .filter_map(|(id, _, bindings)| candidate_for(*id, bindings))
        .collect();
    Some(MemberResolution::Ambiguous(candidates))
}

/// Unify the receiver against an extension method's self parameter. `None`
/// if the receiver does not fit; otherwise the type-variable bindings the
/// receiver pinned down.
fn self_param_bindings(
    universe: &SymbolUniverse,
    method: &MethodDef,
    receiver: &Type,
) -> Option<TypeParamMap> {
    let first = method.params.first()?;
    let mut bindings = TypeParamMap::new();
    unify(universe, first, receiver, &mut bindings);
    let declared = substitute(universe, first, &bindings);
    is_assignable(universe, receiver, &declared).then_some(bindings)
}

fn extension_accessor(
    universe: &SymbolUniverse,
    query: &MemberQuery<'_>,
) -> Option<MemberResolution> {
    let suffix = capitalized(query.name.as_str());
    let accessor_names = if query.write {
        vec![(Name::new(format!("set{suffix}")), false)]
    } else {
        vec![
            (Name::new(format!("get{suffix}")), false),
            (Name::new(format!("is{suffix}")), true),
        ]
    };
    for (accessor_name, boolean_only) in &accessor_names {
        for ext in universe.extension_methods(accessor_name) {
            let Some(method) = universe.method(ext.method) else {
                continue;
            };
            let expected_params = if query.write { 2 } else { 1 };
            if method.params.len() != expected_params {
                continue;
            }
            // `is` accessors only count for boolean properties.
            if *boolean_only && !is_boolean_type(universe, &method.ret) {
                continue;
            }
            let Some(bindings) = self_param_bindings(universe, method, query.receiver) else {
                continue;
            };
            let ty = if query.write {
                method.params[1].clone()
            } else {
                method.ret.clone()
            };
            return Some(MemberResolution::Resolved(Candidate {
                ty: substitute(universe, &ty, &bindings),
                declaring: Some(Type::class(ext.method.class, vec![])),
                decl: Declaration::ExtensionMethod(ext.method),
                confidence: Confidence::Exact,
            }));
        }
    }
    None
}

fn missing_property_hook(
    universe: &SymbolUniverse,
    query: &MemberQuery<'_>,
    levels: &[(ClassId, TypeParamMap)],
) -> MemberResolution {
    if query.static_only {
        return MemberResolution::Unresolved;
    }
    find_hook(universe, levels, &["propertyMissing"])
}

fn missing_method_hook(
    universe: &SymbolUniverse,
    query: &MemberQuery<'_>,
    levels: &[(ClassId, TypeParamMap)],
) -> MemberResolution {
    if query.static_only {
        return MemberResolution::Unresolved;
    }
    find_hook(universe, levels, &["methodMissing", "invokeMethod"])
}

/// Dynamic fallback hooks resolve at reduced confidence: the hook will
/// answer at runtime, but statically we only know its declared return.
fn find_hook(
    universe: &SymbolUniverse,
    levels: &[(ClassId, TypeParamMap)],
    names: &[&str],
) -> MemberResolution {
    for hook_name in names {
        for (class, bindings) in levels {
            let Some(def) = universe.class(*class) else {
                continue;
            };
            let hook = def
                .methods
                .iter()
                .enumerate()
                .find(|(_, m)| m.name.as_str() == *hook_name && !m.is_static);
            if let Some((index, method)) = hook {
                return MemberResolution::Resolved(Candidate {
                    ty: substitute(universe, &method.ret, bindings),
                    declaring: Some(Type::class(*class, vec![])),
                    decl: Declaration::MissingHook(MethodId {
                        class: *class,
                        index: index as u32,
                    }),
                    confidence: Confidence::Inferred,
                });
            }
        }
    }
    MemberResolution::Unresolved
}

fn resolve_against_union(
    universe: &SymbolUniverse,
    query: &MemberQuery<'_>,
    members: &[Type],
) -> MemberResolution {
    // A union receiver resolves only if every member resolves; the result
    // joins their types and can never be better than inferred.
    let mut joined: Option<Type> = None;
    let mut first: Option<Candidate> = None;
    for member in members {
        let inner = MemberQuery {
            receiver: member,
            ..*query
        };
        let Some(candidate) = resolve_member(universe, &inner).into_option() else {
            return MemberResolution::Unresolved;
        };
        joined = Some(match joined {
            Some(existing) => lub(universe, &existing, &candidate.ty),
            None => candidate.ty.clone(),
        });
        if first.is_none() {
            first = Some(candidate);
        }
    }
    match (first, joined) {
        (Some(mut candidate), Some(ty)) => {
            candidate.ty = ty;
            candidate.confidence = candidate.confidence.min(Confidence::Inferred);
            MemberResolution::Resolved(candidate)
        }
        _ => MemberResolution::Unresolved,
    }
}

/// Normalize a receiver down to a nominal class: primitives box, arrays and
/// type variables widen, raw names resolve if the universe knows them.
fn receiver_class(universe: &SymbolUniverse, receiver: &Type) -> Option<ClassType> {
    match receiver {
        Type::Class(ct) => Some(ct.clone()),
        Type::Primitive(p) => Some(ClassType {
            def: universe.well_known().boxed(*p),
            args: vec![],
        }),
        Type::Array(_) => Some(ClassType {
            def: universe.well_known().object,
            args: vec![],
        }),
        Type::Named(name) => universe
            .lookup_class(name.as_str())
            .map(|def| ClassType { def, args: vec![] }),
        Type::TypeVar(tv) => {
            let def = universe.type_param(*tv)?;
            def.upper_bounds
                .iter()
                .find_map(|b| receiver_class(universe, b))
        }
        _ => None,
    }
}

/// The receiver's hierarchy as `(class, type-argument bindings)` pairs,
/// nearest level first, so member types substitute correctly at the level
/// that declared them.
fn hierarchy_levels(universe: &SymbolUniverse, ct: &ClassType) -> Vec<(ClassId, TypeParamMap)> {
    let receiver = Type::Class(ct.clone());
    let mut out = vec![(ct.def, bindings_of(universe, ct))];
    for ancestor in universe.ancestor_ids(ct.def).iter() {
        let bindings = instantiate_as_supertype(universe, &receiver, *ancestor)
            .and_then(|ty| ty.as_class().map(|sup| bindings_of(universe, sup)))
            .unwrap_or_default();
        out.push((*ancestor, bindings));
    }
    out
}

fn bindings_of(universe: &SymbolUniverse, ct: &ClassType) -> TypeParamMap {
    let Some(def) = universe.class(ct.def) else {
        return TypeParamMap::new();
    };
    if ct.args.len() != def.type_params.len() {
        // Raw usage erases to unbound parameters.
        return TypeParamMap::new();
    }
    def.type_params
        .iter()
        .copied()
        .zip(ct.args.iter().cloned())
        .collect()
}

fn is_visible(
    universe: &SymbolUniverse,
    visibility: Visibility,
    declaring: ClassId,
    from: Option<ClassId>,
) -> bool {
    match visibility {
        Visibility::Public => true,
        Visibility::Private => from == Some(declaring),
        Visibility::Protected => {
            let Some(from) = from else { return false };
            if from == declaring || universe.ancestor_ids(from).contains(&declaring) {
                return true;
            }
            same_package(universe, declaring, from)
        }
        Visibility::Package => from.is_some_and(|from| same_package(universe, declaring, from)),
    }
}

fn same_package(universe: &SymbolUniverse, a: ClassId, b: ClassId) -> bool {
    match (universe.class(a), universe.class(b)) {
        (Some(a), Some(b)) => a.package() == b.package(),
        _ => false,
    }
}

fn is_getter_for(method: &MethodDef, property: &Name, universe: &SymbolUniverse) -> bool {
    if !method.params.is_empty() {
        return false;
    }
    let suffix = capitalized(property.as_str());
    let name = method.name.as_str();
    if name == format!("get{suffix}") {
        return true;
    }
    // `is` accessors only count for boolean properties.
    name == format!("is{suffix}") && is_boolean_type(universe, &method.ret)
}

fn is_setter_for(method: &MethodDef, property: &Name) -> bool {
    method.params.len() == 1 && method.name.as_str() == format!("set{}", capitalized(property.as_str()))
}

fn is_boolean_type(universe: &SymbolUniverse, ty: &Type) -> bool {
    match ty {
        Type::Primitive(lilt_types::Primitive::Boolean) => true,
        Type::Class(ct) => ct.def == universe.well_known().boolean,
        _ => false,
    }
}

fn is_closure_type(universe: &SymbolUniverse, ty: &Type) -> bool {
    ty.as_class()
        .is_some_and(|ct| ct.def == universe.well_known().closure)
}

fn capitalized(name: &str) -> String {
    let mut chars = name.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}
