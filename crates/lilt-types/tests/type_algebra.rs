use lilt_types::{
    element_type, instantiate_as_supertype, is_assignable, is_subtype, lub, satisfies_bounds,
    substitute, type_name, unify, ClassDef, ClassKind, ClassType, Primitive, SymbolUniverse, Type,
    TypeEnv, TypeParamDef, TypeParamMap,
};

use pretty_assertions::assert_eq;

#[test]
fn inheritance_type_arg_substitution() {
    let env = SymbolUniverse::core_library_builder().finish();

    let array_list = env.class_id("java.util.ArrayList").unwrap();
    let list = env.class_id("java.util.List").unwrap();
    let string = env.well_known().string;
    let object = env.well_known().object;

    let array_list_string = Type::class(array_list, vec![Type::class(string, vec![])]);
    let list_string = Type::class(list, vec![Type::class(string, vec![])]);
    let list_object = Type::class(list, vec![Type::class(object, vec![])]);

    assert!(is_subtype(&env, &array_list_string, &list_string));
    assert!(!is_subtype(&env, &array_list_string, &list_object));

    let as_list = instantiate_as_supertype(&env, &array_list_string, list).unwrap();
    assert_eq!(type_name(&env, &as_list), "java.util.List<java.lang.String>");
}

#[test]
fn widening_boxing_and_unboxing() {
    let env = SymbolUniverse::core_library_builder().finish();
    let int = Type::Primitive(Primitive::Int);
    let long = Type::Primitive(Primitive::Long);
    let boolean = Type::Primitive(Primitive::Boolean);
    let integer = Type::class(env.well_known().integer, vec![]);
    let number = Type::class(env.well_known().number, vec![]);
    let object = Type::class(env.well_known().object, vec![]);

    assert!(is_assignable(&env, &int, &long));
    assert!(!is_assignable(&env, &long, &int));
    assert!(!is_assignable(&env, &boolean, &int));

    // Boxing, then reference widening.
    assert!(is_assignable(&env, &int, &integer));
    assert!(is_assignable(&env, &int, &number));
    assert!(is_assignable(&env, &int, &object));

    // Unboxing, then primitive widening.
    assert!(is_assignable(&env, &integer, &int));
    assert!(is_assignable(&env, &integer, &long));
    assert!(!is_assignable(&env, &number, &int));
}

#[test]
fn union_assignability_and_lub() {
    let env = SymbolUniverse::core_library_builder().finish();
    let exception = Type::Named("java.lang.Exception".into());
    let runtime = Type::Named("java.lang.RuntimeException".into());
    let throwable = Type::Named("java.lang.Throwable".into());
    let string = Type::class(env.well_known().string, vec![]);

    let both = Type::union(vec![exception.clone(), runtime.clone()]);
    assert!(is_assignable(&env, &both, &throwable));
    assert!(!is_assignable(&env, &both, &string));

    // Subtype-directed join collapses; unrelated types union.
    assert_eq!(lub(&env, &runtime, &exception), exception);
    let joined = lub(&env, &string, &exception);
    assert_eq!(joined, Type::union(vec![string, exception]));
}

#[test]
fn unify_binds_type_params_through_containers() {
    let env = SymbolUniverse::core_library_builder().finish();
    let list = env.well_known().list;
    let array_list = env.class_id("java.util.ArrayList").unwrap();
    let string = Type::class(env.well_known().string, vec![]);

    let list_def = env.class(list).unwrap();
    let elem = list_def.type_params[0];

    let declared = Type::class(list, vec![Type::TypeVar(elem)]);
    let actual = Type::class(array_list, vec![string.clone()]);

    let mut bindings = TypeParamMap::new();
    unify(&env, &declared, &actual, &mut bindings);
    assert_eq!(bindings.get(&elem), Some(&string));

    let ret = substitute(&env, &declared, &bindings);
    assert_eq!(type_name(&env, &ret), "java.util.List<java.lang.String>");
}

#[test]
fn recursive_bound_satisfaction() {
    let mut builder = SymbolUniverse::core_library_builder();

    // T extends Comparable<T>, two-pass so the bound can mention T.
    let t = builder.add_type_param("T");
    let comparable = builder.intern_class("java.lang.Comparable");
    builder.define_type_param(
        t,
        TypeParamDef {
            name: "T".into(),
            upper_bounds: vec![Type::class(comparable, vec![Type::TypeVar(t)])],
            lower_bound: None,
        },
    );
    let env = builder.finish();

    let string = Type::class(env.well_known().string, vec![]);
    let object = Type::class(env.well_known().object, vec![]);

    let mut bindings = TypeParamMap::new();
    bindings.insert(t, string.clone());
    assert!(satisfies_bounds(&env, t, &string, &bindings));

    bindings.insert(t, object.clone());
    assert!(!satisfies_bounds(&env, t, &object, &bindings));
}

#[test]
fn cyclic_hierarchy_does_not_hang() {
    let mut builder = SymbolUniverse::builder();
    let a = builder.intern_class("p.A");
    let b = builder.intern_class("p.B");

    let mut a_def = ClassDef::new("p.A", ClassKind::Trait);
    a_def.super_class = Some(Type::class(b, vec![]));
    builder.add_class(a_def);

    let mut b_def = ClassDef::new("p.B", ClassKind::Trait);
    b_def.super_class = Some(Type::class(a, vec![]));
    builder.add_class(b_def);

    let env = builder.finish();

    let ancestors = env.ancestor_ids(a);
    assert_eq!(ancestors.as_slice(), &[b]);

    // Target not in the (cyclic) hierarchy: must terminate with None.
    let missing = env.well_known().string;
    assert_eq!(
        instantiate_as_supertype(&env, &Type::class(a, vec![]), missing),
        None
    );
}

#[test]
fn element_type_recovery() {
    let env = SymbolUniverse::core_library_builder().finish();
    let array_list = env.class_id("java.util.ArrayList").unwrap();
    let string = Type::class(env.well_known().string, vec![]);

    let list_of_string = Type::class(array_list, vec![string.clone()]);
    assert_eq!(element_type(&env, &list_of_string), Some(string.clone()));
    assert_eq!(element_type(&env, &Type::array(string.clone())), Some(string));
    assert_eq!(element_type(&env, &Type::class(env.well_known().object, vec![])), None);
}

#[test]
fn extension_provider_priority_order() {
    let mut builder = SymbolUniverse::core_library_builder();
    let object = builder.intern_class("java.lang.Object");

    let mut category = ClassDef::new("app.TimeCategory", ClassKind::Class);
    category.methods = vec![lilt_types::MethodDef {
        name: "with".into(),
        type_params: vec![],
        params: vec![Type::class(object, vec![]), Type::class(object, vec![])],
        ret: Type::class(object, vec![]),
        is_static: true,
        varargs: false,
        visibility: lilt_types::Visibility::Public,
    }];
    let category_id = builder.add_class(category);
    builder.register_extension_provider(category_id);

    let env = builder.finish();
    let with = "with".into();
    let refs: Vec<_> = env.extension_methods(&with).collect();

    // User-registered category outranks the basic default-methods provider.
    assert!(refs.len() >= 2);
    assert_eq!(refs[0].method.class, category_id);
    assert!(refs[0].provider_rank < refs[refs.len() - 1].provider_rank);
}
