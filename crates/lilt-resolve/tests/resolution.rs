use lilt_ast::ResolveStrategy;
use lilt_core::{Name, Span};
use lilt_resolve::{
    resolve_member, resolve_methods, resolve_unqualified, select_overload, AccessorKind,
    Candidate, ClosureScope, Declaration, LocalRef, MemberQuery, MemberResolution,
    OverloadSelection, ScopeKind, ScopeStack, SlotValue, VariableInfo,
};
use lilt_types::{
    type_name, ClassDef, ClassId, ClassKind, Confidence, FieldDef, MethodDef, Primitive,
    SymbolUniverse, SymbolUniverseBuilder, Type, TypeEnv, TypeParamDef, Visibility,
};

use pretty_assertions::assert_eq;

fn field(name: &str, ty: Type, is_static: bool, visibility: Visibility) -> FieldDef {
    FieldDef {
        name: name.into(),
        ty,
        is_static,
        visibility,
    }
}

fn method(name: &str, params: Vec<Type>, ret: Type) -> MethodDef {
    MethodDef {
        name: name.into(),
        type_params: vec![],
        params,
        ret,
        is_static: false,
        varargs: false,
        visibility: Visibility::Public,
    }
}

/// A small project on top of the core library:
///
/// `app.Pogo` has a `name` field shadowed by a `getName` accessor, a private
/// `count`, a `getLabel` accessor, and an `isActive` boolean accessor.
/// `app.SubPogo` extends it and redeclares `label` as a field.
/// `app.Config` carries a `propertyMissing` hook.
fn project() -> (SymbolUniverse, ClassId, ClassId, ClassId) {
    let mut builder = SymbolUniverse::core_library_builder();
    let string = Type::Named("java.lang.String".into());
    let int = Type::Primitive(Primitive::Int);

    let pogo = {
        let mut def = ClassDef::new("app.Pogo", ClassKind::Class);
        def.super_class = Some(Type::Named("java.lang.Object".into()));
        def.fields = vec![
            field("name", string.clone(), false, Visibility::Public),
            field("count", int.clone(), false, Visibility::Private),
            field("shared", string.clone(), true, Visibility::Public),
        ];
        def.methods = vec![
            method("getName", vec![], string.clone()),
            method("getLabel", vec![], string.clone()),
            method("isActive", vec![], Type::Primitive(Primitive::Boolean)),
        ];
        builder.add_class(def)
    };

    let sub = {
        let mut def = ClassDef::new("app.SubPogo", ClassKind::Class);
        def.super_class = Some(Type::class(pogo, vec![]));
        def.fields = vec![field("label", int.clone(), false, Visibility::Public)];
        builder.add_class(def)
    };

    let config = {
        let mut def = ClassDef::new("app.Config", ClassKind::Class);
        def.super_class = Some(Type::Named("java.lang.Object".into()));
        def.fields = vec![field("port", int, false, Visibility::Private)];
        def.methods = vec![method(
            "propertyMissing",
            vec![string],
            Type::Named("java.lang.Object".into()),
        )];
        builder.add_class(def)
    };

    (builder.finish(), pogo, sub, config)
}

fn read_query<'a>(receiver: &'a Type, name: &'a Name) -> MemberQuery<'a> {
    MemberQuery {
        receiver,
        name,
        call_arity: None,
        write: false,
        attribute: false,
        from_class: None,
        static_only: false,
    }
}

fn resolved(resolution: MemberResolution) -> Candidate {
    match resolution {
        MemberResolution::Resolved(c) => c,
        other => panic!("expected resolved, got {other:?}"),
    }
}

#[test]
fn locals_shadow_closure_delegation() {
    let (env, pogo, _, _) = project();

    let mut ast = lilt_ast::AstRoot::new();
    let mut body = lilt_ast::Body::empty(Span::new(0, 0));
    let local = body.alloc_local(lilt_ast::Local {
        name: "name".into(),
        ty: None,
        name_span: Span::new(0, 4),
        span: Span::new(0, 10),
    });
    let body = ast.alloc_body(body);

    let mut scopes = ScopeStack::new();
    scopes.push(ScopeKind::Class { class: pogo });
    scopes.push(ScopeKind::Method {
        class: pogo,
        is_static: false,
    });
    scopes.declare(
        "name".into(),
        VariableInfo {
            ty: Type::Primitive(Primitive::Int),
            decl: Declaration::Local(LocalRef { body, local }),
        },
    );

    let candidate = resolved(resolve_unqualified(&env, &scopes, &"name".into(), None, false));
    assert_eq!(candidate.ty, Type::Primitive(Primitive::Int));
    assert_eq!(candidate.confidence, Confidence::Exact);
    assert!(matches!(candidate.decl, Declaration::Local(_)));
}

#[test]
fn closure_strategy_orders_slot_consultation() {
    let (env, pogo, _, config) = project();
    // Pogo declares `name`; Config does not (its hook would answer, but the
    // lookup should not reach it when the owner already resolves).
    let owner = Type::class(pogo, vec![]);
    let delegate = Type::class(config, vec![]);

    let with_strategy = |strategy| {
        let mut scopes = ScopeStack::new();
        scopes.push(ScopeKind::Class { class: pogo });
        scopes.push(ScopeKind::Method {
            class: pogo,
            is_static: false,
        });
        scopes.push(ScopeKind::Closure(ClosureScope {
            this_object: owner.clone(),
            owner: SlotValue::Instance(owner.clone()),
            delegate: SlotValue::Instance(delegate.clone()),
            strategy,
        }));
        resolve_unqualified(&env, &scopes, &"name".into(), None, false)
    };

    // Owner first: the accessor on Pogo, exact.
    let candidate = resolved(with_strategy(ResolveStrategy::OwnerFirst));
    assert!(matches!(
        candidate.decl,
        Declaration::Accessor {
            kind: AccessorKind::Getter,
            ..
        }
    ));
    assert_eq!(candidate.confidence, Confidence::Exact);

    // Delegate first: Config's propertyMissing hook answers at lower
    // confidence before the owner slot is consulted.
    let candidate = resolved(with_strategy(ResolveStrategy::DelegateFirst));
    assert!(matches!(candidate.decl, Declaration::MissingHook(_)));
    assert_eq!(candidate.confidence, Confidence::Inferred);

    // Owner only ignores the delegate entirely.
    let candidate = resolved(with_strategy(ResolveStrategy::OwnerOnly));
    assert!(matches!(candidate.decl, Declaration::Accessor { .. }));
}

#[test]
fn instance_delegate_serves_instance_members_in_static_method() {
    let (env, pogo, _, _) = project();
    let pogo_ty = Type::class(pogo, vec![]);
    let mut scopes = ScopeStack::new();
    scopes.push(ScopeKind::Class { class: pogo });
    scopes.push(ScopeKind::Method {
        class: pogo,
        is_static: true,
    });
    scopes.push(ScopeKind::Closure(ClosureScope {
        this_object: pogo_ty.clone(),
        owner: SlotValue::ClassRef(pogo_ty.clone()),
        delegate: SlotValue::Instance(pogo_ty),
        strategy: ResolveStrategy::DelegateFirst,
    }));

    // The delegate holds an instance, so its instance members stay visible
    // even though the enclosing method is static.
    let candidate = resolved(resolve_unqualified(&env, &scopes, &"name".into(), None, false));
    assert!(matches!(candidate.decl, Declaration::Accessor { .. }));

    // A class-reference slot still resolves statically only.
    let popped = scopes.pop();
    assert!(popped.is_ok());
    scopes.push(ScopeKind::Closure(ClosureScope {
        this_object: Type::class(pogo, vec![]),
        owner: SlotValue::ClassRef(Type::class(pogo, vec![])),
        delegate: SlotValue::ClassRef(Type::class(pogo, vec![])),
        strategy: ResolveStrategy::DelegateFirst,
    }));
    let resolution = resolve_unqualified(&env, &scopes, &"name".into(), None, false);
    assert_eq!(resolution, MemberResolution::Unresolved);
    let candidate = resolved(resolve_unqualified(&env, &scopes, &"shared".into(), None, false));
    assert!(matches!(candidate.decl, Declaration::Property(_)));
}

#[test]
fn accessor_beats_field_on_same_class() {
    let (env, pogo, _, _) = project();
    let receiver = Type::class(pogo, vec![]);
    let name = "name".into();

    let candidate = resolved(resolve_member(&env, &read_query(&receiver, &name)));
    assert!(matches!(
        candidate.decl,
        Declaration::Accessor {
            kind: AccessorKind::Getter,
            ..
        }
    ));
    assert_eq!(type_name(&env, &candidate.ty), "java.lang.String");
}

#[test]
fn nearer_field_beats_farther_accessor() {
    let (env, _, sub, _) = project();
    let receiver = Type::class(sub, vec![]);
    let name = "label".into();

    let candidate = resolved(resolve_member(&env, &read_query(&receiver, &name)));
    assert!(matches!(candidate.decl, Declaration::Property(_)));
    assert_eq!(candidate.ty, Type::Primitive(Primitive::Int));
}

#[test]
fn boolean_is_accessor_resolves_as_property() {
    let (env, pogo, _, _) = project();
    let receiver = Type::class(pogo, vec![]);
    let name = "active".into();

    let candidate = resolved(resolve_member(&env, &read_query(&receiver, &name)));
    assert!(matches!(candidate.decl, Declaration::Accessor { .. }));
    assert_eq!(candidate.ty, Type::Primitive(Primitive::Boolean));
}

#[test]
fn attribute_access_bypasses_accessors() {
    let (env, pogo, _, _) = project();
    let receiver = Type::class(pogo, vec![]);
    let name = "name".into();

    let mut query = read_query(&receiver, &name);
    query.attribute = true;
    let candidate = resolved(resolve_member(&env, &query));
    assert!(matches!(candidate.decl, Declaration::Field(_)));
}

#[test]
fn private_member_does_not_fall_through_to_hooks() {
    let (env, _, _, config) = project();
    let receiver = Type::class(config, vec![]);
    let name = "port".into();

    // From outside the declaring class the private field is a hard miss,
    // even though Config's propertyMissing could otherwise answer.
    let resolution = resolve_member(&env, &read_query(&receiver, &name));
    assert_eq!(resolution, MemberResolution::Unresolved);

    // From inside the declaring class it is visible and exact.
    let mut query = read_query(&receiver, &name);
    query.from_class = Some(config);
    let candidate = resolved(resolve_member(&env, &query));
    assert!(matches!(candidate.decl, Declaration::Property(_)));
    assert_eq!(candidate.confidence, Confidence::Exact);
}

#[test]
fn unknown_property_uses_missing_hook_at_inferred() {
    let (env, _, _, config) = project();
    let receiver = Type::class(config, vec![]);
    let name = "whatever".into();

    let candidate = resolved(resolve_member(&env, &read_query(&receiver, &name)));
    assert!(matches!(candidate.decl, Declaration::MissingHook(_)));
    assert_eq!(candidate.confidence, Confidence::Inferred);
}

#[test]
fn static_context_suppresses_instance_members() {
    let (env, pogo, _, _) = project();
    let mut scopes = ScopeStack::new();
    scopes.push(ScopeKind::Class { class: pogo });
    scopes.push(ScopeKind::Method {
        class: pogo,
        is_static: true,
    });

    let resolution = resolve_unqualified(&env, &scopes, &"name".into(), None, false);
    assert_eq!(resolution, MemberResolution::Unresolved);

    let candidate = resolved(resolve_unqualified(&env, &scopes, &"shared".into(), None, false));
    assert!(matches!(candidate.decl, Declaration::Property(_)));
}

#[test]
fn extension_call_substitutes_receiver_element() {
    let (env, _, _, _) = project();
    let array_list = env.class_id("java.util.ArrayList").unwrap();
    let string = Type::class(env.well_known().string, vec![]);
    let receiver = Type::class(array_list, vec![string]);
    let name = "sort".into();

    let mut query = read_query(&receiver, &name);
    query.call_arity = Some(1);
    let candidate = resolved(resolve_member(&env, &query));
    assert!(matches!(candidate.decl, Declaration::ExtensionMethod(_)));
    assert_eq!(type_name(&env, &candidate.ty), "java.util.List<java.lang.String>");
}

#[test]
fn instance_method_beats_extension_of_same_name() {
    let (env, _, _, _) = project();
    let array_list = env.class_id("java.util.ArrayList").unwrap();
    let string = Type::class(env.well_known().string, vec![]);
    let receiver = Type::class(array_list, vec![string]);
    let name = "add".into();

    let mut query = read_query(&receiver, &name);
    query.call_arity = Some(1);
    let candidate = resolved(resolve_member(&env, &query));
    assert!(matches!(candidate.decl, Declaration::Method(_)));
}

#[test]
fn is_extension_accessor_requires_boolean_return() {
    let mut builder = SymbolUniverse::core_library_builder();
    let thing = {
        let mut def = ClassDef::new("app.Thing", ClassKind::Class);
        def.super_class = Some(Type::Named("java.lang.Object".into()));
        builder.add_class(def)
    };
    let extension = |name: &str, ret: Type| MethodDef {
        name: name.into(),
        type_params: vec![],
        params: vec![Type::class(thing, vec![])],
        ret,
        is_static: true,
        varargs: false,
        visibility: Visibility::Public,
    };
    let provider = {
        let mut def = ClassDef::new("app.ThingExtensions", ClassKind::Class);
        def.super_class = Some(Type::Named("java.lang.Object".into()));
        def.methods = vec![
            extension("isBlank", Type::Named("java.lang.String".into())),
            extension("isFresh", Type::Primitive(Primitive::Boolean)),
        ];
        builder.add_class(def)
    };
    builder.register_extension_provider(provider);
    let env = builder.finish();
    let receiver = Type::class(thing, vec![]);

    // Non-boolean `is` method: no property.
    let blank = "blank".into();
    assert_eq!(
        resolve_member(&env, &read_query(&receiver, &blank)),
        MemberResolution::Unresolved
    );

    let fresh = "fresh".into();
    let candidate = resolved(resolve_member(&env, &read_query(&receiver, &fresh)));
    assert!(matches!(candidate.decl, Declaration::ExtensionMethod(_)));
    assert_eq!(candidate.ty, Type::Primitive(Primitive::Boolean));
}

fn calc_universe() -> (SymbolUniverse, ClassId) {
    let mut builder = SymbolUniverseBuilder::new();
    builder.add_core_library();
    let string = Type::Named("java.lang.String".into());
    let object = Type::Named("java.lang.Object".into());
    let int = Type::Primitive(Primitive::Int);
    let double = Type::Primitive(Primitive::Double);

    let max_t = builder.add_type_param("T");
    let comparable = builder.intern_class("java.lang.Comparable");
    builder.define_type_param(
        max_t,
        TypeParamDef {
            name: "T".into(),
            upper_bounds: vec![Type::class(comparable, vec![Type::TypeVar(max_t)])],
            lower_bound: None,
        },
    );

    let calc = {
        let mut def = ClassDef::new("app.Calc", ClassKind::Class);
        def.super_class = Some(object.clone());
        def.methods = vec![
            method("add", vec![int.clone(), int.clone()], int.clone()),
            method("add", vec![double.clone(), double.clone()], double),
            method("add", vec![object.clone(), object.clone()], object),
            MethodDef {
                name: "sum".into(),
                type_params: vec![],
                params: vec![Type::array(int.clone())],
                ret: int,
                is_static: false,
                varargs: true,
                visibility: Visibility::Public,
            },
            MethodDef {
                name: "max".into(),
                type_params: vec![max_t],
                params: vec![Type::TypeVar(max_t), Type::TypeVar(max_t)],
                ret: Type::TypeVar(max_t),
                is_static: false,
                varargs: false,
                visibility: Visibility::Public,
            },
            method("emit", vec![string.clone()], string.clone()),
            method("emit", vec![Type::Named("lang.GString".into())], string),
        ];
        builder.add_class(def)
    };

    (builder.finish(), calc)
}

#[test]
fn most_specific_overload_wins() {
    let (env, calc) = calc_universe();
    let receiver = Type::class(calc, vec![]);
    let candidates = resolve_methods(&env, &receiver, &"add".into(), false, None);
    assert_eq!(candidates.len(), 3);

    let int = Type::Primitive(Primitive::Int);
    let selection = select_overload(&env, &candidates, &[int.clone(), int]);
    let OverloadSelection::Selected(selected) = selection else {
        panic!("expected a unique selection");
    };
    assert_eq!(selected.ret, Type::Primitive(Primitive::Int));
}

#[test]
fn widening_falls_back_to_broader_overload() {
    let (env, calc) = calc_universe();
    let receiver = Type::class(calc, vec![]);
    let candidates = resolve_methods(&env, &receiver, &"add".into(), false, None);

    // int + double: the (double, double) overload applies via widening and
    // is more specific than (Object, Object).
    let selection = select_overload(
        &env,
        &candidates,
        &[Type::Primitive(Primitive::Int), Type::Primitive(Primitive::Double)],
    );
    let OverloadSelection::Selected(selected) = selection else {
        panic!("expected a unique selection");
    };
    assert_eq!(selected.ret, Type::Primitive(Primitive::Double));
}

#[test]
fn varargs_applies_only_when_fixed_arity_fails() {
    let (env, calc) = calc_universe();
    let receiver = Type::class(calc, vec![]);
    let candidates = resolve_methods(&env, &receiver, &"sum".into(), false, None);
    let int = Type::Primitive(Primitive::Int);

    let selection = select_overload(&env, &candidates, &[int.clone(), int.clone(), int.clone()]);
    assert!(matches!(selection, OverloadSelection::Selected(_)));

    // Passing the array directly binds without expansion.
    let selection = select_overload(&env, &candidates, &[Type::array(int)]);
    assert!(matches!(selection, OverloadSelection::Selected(_)));
}

#[test]
fn bound_violation_discards_candidate() {
    let (env, calc) = calc_universe();
    let receiver = Type::class(calc, vec![]);
    let candidates = resolve_methods(&env, &receiver, &"max".into(), false, None);

    let string = Type::class(env.well_known().string, vec![]);
    let selection = select_overload(&env, &candidates, &[string.clone(), string.clone()]);
    let OverloadSelection::Selected(selected) = selection else {
        panic!("expected a unique selection");
    };
    assert_eq!(selected.ret, string);

    // Object is not Comparable<Object>; the only candidate fails its bound.
    let object = Type::class(env.well_known().object, vec![]);
    let selection = select_overload(&env, &candidates, &[object.clone(), object]);
    assert_eq!(selection, OverloadSelection::NoMatch);
}

#[test]
fn ambiguous_overloads_report_in_declaration_order() {
    let (env, calc) = calc_universe();
    let receiver = Type::class(calc, vec![]);
    let candidates = resolve_methods(&env, &receiver, &"emit".into(), false, None);

    // Unknown argument applies to both unrelated parameter types.
    let selection = select_overload(&env, &candidates, &[Type::Unknown]);
    let OverloadSelection::Ambiguous(set) = selection else {
        panic!("expected ambiguity, got {selection:?}");
    };
    assert_eq!(set.len(), 2);
    assert_eq!(set[0].method, candidates[0].0);
}
