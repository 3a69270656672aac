//! The shared, immutable symbol universe.
//!
//! Built once per project-state revision by the host collaborator, then
//! published and read concurrently by analysis passes without locking (the
//! only interior mutability is a memo cache for supertype closures).

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, RwLock};

use lilt_core::{Name, QualifiedName};

use crate::{
    ClassDef, ClassId, ClassKind, ConstructorDef, CtorId, FieldDef, FieldId, MethodDef, MethodId,
    Primitive, Type, TypeEnv, TypeParamDef, TypeVarId, Visibility,
};

/// Monotonic identifier of the project state a universe was built from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub struct Revision(pub u64);

/// Class ids of frequently needed library types.
#[derive(Debug, Clone)]
pub struct WellKnownTypes {
    pub object: ClassId,
    pub string: ClassId,
    pub gstring: ClassId,
    pub closure: ClassId,
    pub iterable: ClassId,
    pub collection: ClassId,
    pub list: ClassId,
    pub map: ClassId,
    pub range: ClassId,
    pub number: ClassId,
    pub comparable: ClassId,
    pub comparator: ClassId,
    pub throwable: ClassId,
    pub boolean: ClassId,
    pub byte: ClassId,
    pub short: ClassId,
    pub integer: ClassId,
    pub long: ClassId,
    pub character: ClassId,
    pub float: ClassId,
    pub double: ClassId,
}

impl WellKnownTypes {
    /// The boxed counterpart of a primitive.
    #[must_use]
    pub fn boxed(&self, prim: Primitive) -> ClassId {
        match prim {
            Primitive::Boolean => self.boolean,
            Primitive::Byte => self.byte,
            Primitive::Short => self.short,
            Primitive::Int => self.integer,
            Primitive::Long => self.long,
            Primitive::Char => self.character,
            Primitive::Float => self.float,
            Primitive::Double => self.double,
        }
    }

    /// The primitive a box class unboxes to, if any.
    #[must_use]
    pub fn unboxed(&self, class: ClassId) -> Option<Primitive> {
        [
            (self.boolean, Primitive::Boolean),
            (self.byte, Primitive::Byte),
            (self.short, Primitive::Short),
            (self.integer, Primitive::Int),
            (self.long, Primitive::Long),
            (self.character, Primitive::Char),
            (self.float, Primitive::Float),
            (self.double, Primitive::Double),
        ]
        .into_iter()
        .find_map(|(id, prim)| (id == class).then_some(prim))
    }
}

/// An extension ("category") method candidate together with the rank of the
/// provider that contributed it. Lower rank means higher priority.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExtensionMethodRef {
    pub method: MethodId,
    pub provider_rank: usize,
}

/// Read-only, queryable symbol graph shared by analysis passes.
#[derive(Debug)]
pub struct SymbolUniverse {
    revision: Revision,
    classes: Vec<ClassDef>,
    by_name: HashMap<QualifiedName, ClassId>,
    type_params: Vec<TypeParamDef>,
    /// Extension providers in priority order; the basic default-methods
    /// provider, when present, is always last.
    extension_providers: Vec<ClassId>,
    /// Memoized transitive supertype ids, guarded against hierarchy cycles.
    ancestor_memo: RwLock<HashMap<ClassId, Arc<Vec<ClassId>>>>,
    well_known: WellKnownTypes,
}

impl SymbolUniverse {
    #[must_use]
    pub fn builder() -> SymbolUniverseBuilder {
        SymbolUniverseBuilder::new()
    }

    /// A builder pre-populated with the core library stubs used by tests and
    /// small hosts, including the basic default-methods extension provider.
    #[must_use]
    pub fn core_library_builder() -> SymbolUniverseBuilder {
        let mut builder = SymbolUniverseBuilder::new();
        builder.add_core_library();
        builder
    }

    #[must_use]
    pub fn revision(&self) -> Revision {
        self.revision
    }

    #[must_use]
    pub fn class_id(&self, name: &str) -> Option<ClassId> {
        self.by_name.get(name).copied()
    }

    #[must_use]
    pub fn field(&self, id: FieldId) -> Option<&FieldDef> {
        self.classes
            .get(id.class.0 as usize)?
            .fields
            .get(id.index as usize)
    }

    #[must_use]
    pub fn method(&self, id: MethodId) -> Option<&MethodDef> {
        self.classes
            .get(id.class.0 as usize)?
            .methods
            .get(id.index as usize)
    }

    #[must_use]
    pub fn constructor(&self, id: CtorId) -> Option<&ConstructorDef> {
        self.classes
            .get(id.class.0 as usize)?
            .constructors
            .get(id.index as usize)
    }

    #[must_use]
    pub fn extension_providers(&self) -> &[ClassId] {
        &self.extension_providers
    }

    /// All extension methods named `name`, in provider priority order, then
    /// declaration order within each provider.
    pub fn extension_methods<'a>(
        &'a self,
        name: &'a Name,
    ) -> impl Iterator<Item = ExtensionMethodRef> + 'a {
        self.extension_providers
            .iter()
            .enumerate()
            .flat_map(move |(rank, class)| {
                let methods = self
                    .class(*class)
                    .map(|def| def.methods.as_slice())
                    .unwrap_or(&[]);
                methods
                    .iter()
                    .enumerate()
                    .filter(move |(_, m)| m.is_static && &m.name == name && !m.params.is_empty())
                    .map(move |(index, _)| ExtensionMethodRef {
                        method: MethodId {
                            class: *class,
                            index: index as u32,
                        },
                        provider_rank: rank,
                    })
            })
    }

    /// Transitive supertype class ids (nearest first, self excluded).
    ///
    /// Computed lazily and memoized; a visited set keeps cyclic trait
    /// hierarchies from recursing forever.
    #[must_use]
    pub fn ancestor_ids(&self, id: ClassId) -> Arc<Vec<ClassId>> {
        if let Ok(memo) = self.ancestor_memo.read() {
            if let Some(cached) = memo.get(&id) {
                return Arc::clone(cached);
            }
        }

        let mut out = Vec::new();
        let mut seen = HashSet::new();
        seen.insert(id);
        let mut frontier = vec![id];
        while let Some(current) = frontier.pop() {
            let Some(def) = self.class(current) else {
                continue;
            };
            let direct = def
                .super_class
                .iter()
                .chain(def.interfaces.iter())
                .filter_map(|ty| ty.as_class().map(|ct| ct.def));
            for sup in direct {
                if seen.insert(sup) {
                    out.push(sup);
                    frontier.push(sup);
                }
            }
        }

        let out = Arc::new(out);
        if let Ok(mut memo) = self.ancestor_memo.write() {
            memo.insert(id, Arc::clone(&out));
        }
        out
    }
}

impl TypeEnv for SymbolUniverse {
    fn class(&self, id: ClassId) -> Option<&ClassDef> {
        self.classes.get(id.0 as usize)
    }

    fn type_param(&self, id: TypeVarId) -> Option<&TypeParamDef> {
        self.type_params.get(id.0 as usize)
    }

    fn lookup_class(&self, name: &str) -> Option<ClassId> {
        self.by_name.get(name).copied()
    }

    fn well_known(&self) -> &WellKnownTypes {
        &self.well_known
    }
}

/// Mutable construction side of [`SymbolUniverse`].
#[derive(Debug, Default)]
pub struct SymbolUniverseBuilder {
    revision: Revision,
    classes: Vec<ClassDef>,
    by_name: HashMap<QualifiedName, ClassId>,
    type_params: Vec<TypeParamDef>,
    user_providers: Vec<ClassId>,
    default_provider: Option<ClassId>,
}

impl SymbolUniverseBuilder {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn revision(&mut self, revision: Revision) -> &mut Self {
        self.revision = revision;
        self
    }

    /// Intern a class id for `name` without defining it yet.
    pub fn intern_class(&mut self, name: impl Into<QualifiedName>) -> ClassId {
        let name = name.into();
        if let Some(existing) = self.by_name.get(&name) {
            return *existing;
        }
        let id = ClassId(self.classes.len() as u32);
        self.classes
            .push(ClassDef::new(name.clone(), ClassKind::Class));
        self.by_name.insert(name, id);
        id
    }

    /// Define (or redefine) a class; the id is keyed by qualified name.
    pub fn add_class(&mut self, def: ClassDef) -> ClassId {
        let id = self.intern_class(def.name.clone());
        self.classes[id.0 as usize] = def;
        id
    }

    /// Allocate a type parameter with placeholder bounds.
    ///
    /// Self-referential bounds (`T extends Comparable<T>`) need the id before
    /// the bound can be written; allocate first, then fix the definition via
    /// [`SymbolUniverseBuilder::define_type_param`].
    pub fn add_type_param(&mut self, name: impl Into<String>) -> TypeVarId {
        let id = TypeVarId(self.type_params.len() as u32);
        self.type_params.push(TypeParamDef {
            name: name.into(),
            upper_bounds: Vec::new(),
            lower_bound: None,
        });
        id
    }

    pub fn define_type_param(&mut self, id: TypeVarId, def: TypeParamDef) {
        self.type_params[id.0 as usize] = def;
    }

    /// Register an extension ("category") provider class. Earlier
    /// registrations win ties; the default-methods provider stays last.
    pub fn register_extension_provider(&mut self, class: ClassId) -> &mut Self {
        self.user_providers.push(class);
        self
    }

    #[must_use]
    pub fn finish(self) -> SymbolUniverse {
        let mut providers = self.user_providers;
        if let Some(default) = self.default_provider {
            providers.push(default);
        }

        // Well-known types missing from a hand-built universe are interned as
        // empty stubs so the ids are still usable.
        let mut classes = self.classes;
        let mut by_name = self.by_name;
        let mut ensure = |name: &str| match by_name.get(name) {
            Some(id) => *id,
            None => {
                let id = ClassId(classes.len() as u32);
                let qn = QualifiedName::new(name);
                classes.push(ClassDef::new(qn.clone(), ClassKind::Class));
                by_name.insert(qn, id);
                id
            }
        };

        let well_known = WellKnownTypes {
            object: ensure("java.lang.Object"),
            string: ensure("java.lang.String"),
            gstring: ensure("lang.GString"),
            closure: ensure("lang.Closure"),
            iterable: ensure("java.lang.Iterable"),
            collection: ensure("java.util.Collection"),
            list: ensure("java.util.List"),
            map: ensure("java.util.Map"),
            range: ensure("lang.Range"),
            number: ensure("java.lang.Number"),
            comparable: ensure("java.lang.Comparable"),
            comparator: ensure("java.util.Comparator"),
            throwable: ensure("java.lang.Throwable"),
            boolean: ensure("java.lang.Boolean"),
            byte: ensure("java.lang.Byte"),
            short: ensure("java.lang.Short"),
            integer: ensure("java.lang.Integer"),
            long: ensure("java.lang.Long"),
            character: ensure("java.lang.Character"),
            float: ensure("java.lang.Float"),
            double: ensure("java.lang.Double"),
        };

        SymbolUniverse {
            revision: self.revision,
            classes,
            by_name,
            type_params: self.type_params,
            extension_providers: providers,
            ancestor_memo: RwLock::new(HashMap::new()),
            well_known,
        }
    }

    /// Seed the builder with the core library stubs the engine's own tests
    /// rely on: `java.lang`/`java.util` basics, the language runtime types,
    /// and the basic default-methods extension provider.
    pub fn add_core_library(&mut self) {
        let object = self.intern_class("java.lang.Object");
        let string = self.intern_class("java.lang.String");
        let comparable = self.intern_class("java.lang.Comparable");
        let number = self.intern_class("java.lang.Number");
        let iterable = self.intern_class("java.lang.Iterable");
        let collection = self.intern_class("java.util.Collection");
        let list = self.intern_class("java.util.List");
        let array_list = self.intern_class("java.util.ArrayList");
        let map = self.intern_class("java.util.Map");
        let hash_map = self.intern_class("java.util.HashMap");
        let comparator = self.intern_class("java.util.Comparator");
        let closure = self.intern_class("lang.Closure");
        let gstring = self.intern_class("lang.GString");
        let range = self.intern_class("lang.Range");
        let throwable = self.intern_class("java.lang.Throwable");
        let exception = self.intern_class("java.lang.Exception");
        let runtime_exception = self.intern_class("java.lang.RuntimeException");
        let integer = self.intern_class("java.lang.Integer");

        let obj_ty = Type::class(object, vec![]);
        let string_ty = Type::class(string, vec![]);

        // java.lang.Object
        {
            let mut def = ClassDef::new("java.lang.Object", ClassKind::Class);
            def.methods = vec![
                public_method("equals", vec![obj_ty.clone()], Type::Primitive(Primitive::Boolean)),
                public_method("hashCode", vec![], Type::Primitive(Primitive::Int)),
                public_method("toString", vec![], string_ty.clone()),
            ];
            def.constructors = vec![ConstructorDef {
                params: vec![],
                varargs: false,
                visibility: Visibility::Public,
            }];
            self.add_class(def);
        }

        // java.lang.Comparable<T>
        let comparable_t = self.add_type_param("T");
        {
            let mut def = ClassDef::new("java.lang.Comparable", ClassKind::Interface);
            def.type_params = vec![comparable_t];
            def.methods = vec![public_method(
                "compareTo",
                vec![Type::TypeVar(comparable_t)],
                Type::Primitive(Primitive::Int),
            )];
            self.add_class(def);
        }
        self.define_type_param(
            comparable_t,
            TypeParamDef {
                name: "T".into(),
                upper_bounds: vec![obj_ty.clone()],
                lower_bound: None,
            },
        );

        // java.lang.String
        {
            let mut def = ClassDef::new("java.lang.String", ClassKind::Class);
            def.super_class = Some(obj_ty.clone());
            def.interfaces = vec![Type::class(comparable, vec![string_ty.clone()])];
            def.methods = vec![
                public_method("length", vec![], Type::Primitive(Primitive::Int)),
                public_method("toUpperCase", vec![], string_ty.clone()),
                public_method("charAt", vec![Type::Primitive(Primitive::Int)], Type::Primitive(Primitive::Char)),
            ];
            self.add_class(def);
        }

        // java.lang.Number and the boxes.
        {
            let mut def = ClassDef::new("java.lang.Number", ClassKind::Class);
            def.super_class = Some(obj_ty.clone());
            self.add_class(def);
        }
        let number_ty = Type::class(number, vec![]);
        let boxes: [(&str, bool); 8] = [
            ("java.lang.Boolean", false),
            ("java.lang.Byte", true),
            ("java.lang.Short", true),
            ("java.lang.Integer", true),
            ("java.lang.Long", true),
            ("java.lang.Character", false),
            ("java.lang.Float", true),
            ("java.lang.Double", true),
        ];
        for (name, numeric) in boxes {
            let id = self.intern_class(name);
            let mut def = ClassDef::new(name, ClassKind::Class);
            def.super_class = Some(if numeric {
                number_ty.clone()
            } else {
                obj_ty.clone()
            });
            def.interfaces = vec![Type::class(comparable, vec![Type::class(id, vec![])])];
            self.add_class(def);
        }

        // Collections.
        let iterable_t = self.add_type_param("T");
        {
            let mut def = ClassDef::new("java.lang.Iterable", ClassKind::Interface);
            def.type_params = vec![iterable_t];
            self.add_class(def);
        }
        self.define_type_param(
            iterable_t,
            TypeParamDef {
                name: "T".into(),
                upper_bounds: vec![obj_ty.clone()],
                lower_bound: None,
            },
        );

        let collection_e = self.add_object_bounded_param("E", object);
        {
            let mut def = ClassDef::new("java.util.Collection", ClassKind::Interface);
            def.type_params = vec![collection_e];
            def.interfaces = vec![Type::class(iterable, vec![Type::TypeVar(collection_e)])];
            def.methods = vec![
                public_method("size", vec![], Type::Primitive(Primitive::Int)),
                public_method(
                    "add",
                    vec![Type::TypeVar(collection_e)],
                    Type::Primitive(Primitive::Boolean),
                ),
            ];
            self.add_class(def);
        }

        let list_e = self.add_object_bounded_param("E", object);
        {
            let mut def = ClassDef::new("java.util.List", ClassKind::Interface);
            def.type_params = vec![list_e];
            def.interfaces = vec![Type::class(collection, vec![Type::TypeVar(list_e)])];
            def.methods = vec![public_method(
                "get",
                vec![Type::Primitive(Primitive::Int)],
                Type::TypeVar(list_e),
            )];
            self.add_class(def);
        }

        let array_list_e = self.add_object_bounded_param("E", object);
        {
            let mut def = ClassDef::new("java.util.ArrayList", ClassKind::Class);
            def.type_params = vec![array_list_e];
            def.super_class = Some(obj_ty.clone());
            def.interfaces = vec![Type::class(list, vec![Type::TypeVar(array_list_e)])];
            def.constructors = vec![ConstructorDef {
                params: vec![],
                varargs: false,
                visibility: Visibility::Public,
            }];
            self.add_class(def);
        }

        let map_k = self.add_object_bounded_param("K", object);
        let map_v = self.add_object_bounded_param("V", object);
        {
            let mut def = ClassDef::new("java.util.Map", ClassKind::Interface);
            def.type_params = vec![map_k, map_v];
            def.methods = vec![
                public_method("get", vec![obj_ty.clone()], Type::TypeVar(map_v)),
                public_method(
                    "put",
                    vec![Type::TypeVar(map_k), Type::TypeVar(map_v)],
                    Type::TypeVar(map_v),
                ),
            ];
            self.add_class(def);
        }

        let hash_map_k = self.add_object_bounded_param("K", object);
        let hash_map_v = self.add_object_bounded_param("V", object);
        {
            let mut def = ClassDef::new("java.util.HashMap", ClassKind::Class);
            def.type_params = vec![hash_map_k, hash_map_v];
            def.super_class = Some(obj_ty.clone());
            def.interfaces = vec![Type::class(
                map,
                vec![Type::TypeVar(hash_map_k), Type::TypeVar(hash_map_v)],
            )];
            self.add_class(def);
        }

        let comparator_t = self.add_object_bounded_param("T", object);
        {
            let mut def = ClassDef::new("java.util.Comparator", ClassKind::Interface);
            def.type_params = vec![comparator_t];
            def.methods = vec![public_method(
                "compare",
                vec![Type::TypeVar(comparator_t), Type::TypeVar(comparator_t)],
                Type::Primitive(Primitive::Int),
            )];
            self.add_class(def);
        }

        // Language runtime types.
        {
            let mut def = ClassDef::new("lang.Closure", ClassKind::Class);
            def.super_class = Some(obj_ty.clone());
            def.methods = vec![MethodDef {
                name: Name::new("call"),
                type_params: vec![],
                params: vec![obj_ty.clone()],
                ret: obj_ty.clone(),
                is_static: false,
                varargs: true,
                visibility: Visibility::Public,
            }];
            self.add_class(def);
        }
        {
            let mut def = ClassDef::new("lang.GString", ClassKind::Class);
            def.super_class = Some(obj_ty.clone());
            def.methods = vec![public_method("toString", vec![], string_ty.clone())];
            self.add_class(def);
        }
        {
            let mut def = ClassDef::new("lang.Range", ClassKind::Class);
            def.super_class = Some(obj_ty.clone());
            def.interfaces = vec![Type::class(list, vec![Type::class(integer, vec![])])];
            self.add_class(def);
        }

        // Exceptions.
        {
            let mut def = ClassDef::new("java.lang.Throwable", ClassKind::Class);
            def.super_class = Some(obj_ty.clone());
            def.methods = vec![public_method("getMessage", vec![], string_ty.clone())];
            self.add_class(def);
        }
        {
            let mut def = ClassDef::new("java.lang.Exception", ClassKind::Class);
            def.super_class = Some(Type::class(throwable, vec![]));
            self.add_class(def);
        }
        {
            let mut def = ClassDef::new("java.lang.RuntimeException", ClassKind::Class);
            def.super_class = Some(Type::class(exception, vec![]));
            self.add_class(def);
        }
        let _ = runtime_exception;

        // Basic default-methods provider; always lowest priority.
        let closure_ty = Type::class(closure, vec![]);
        let provider = {
            let each_t = self.add_object_bounded_param("T", object);
            let sort_t = self.add_object_bounded_param("T", object);
            let collect_t = self.add_object_bounded_param("T", object);
            let find_t = self.add_object_bounded_param("T", object);

            let mut def = ClassDef::new("lang.DefaultExtensions", ClassKind::Class);
            def.super_class = Some(obj_ty.clone());
            def.methods = vec![
                static_method("with", vec![], vec![obj_ty.clone(), closure_ty.clone()], obj_ty.clone()),
                static_method(
                    "each",
                    vec![each_t],
                    vec![
                        Type::class(collection, vec![Type::TypeVar(each_t)]),
                        closure_ty.clone(),
                    ],
                    Type::class(collection, vec![Type::TypeVar(each_t)]),
                ),
                static_method(
                    "sort",
                    vec![sort_t],
                    vec![
                        Type::class(list, vec![Type::TypeVar(sort_t)]),
                        closure_ty.clone(),
                    ],
                    Type::class(list, vec![Type::TypeVar(sort_t)]),
                ),
                static_method(
                    "collect",
                    vec![collect_t],
                    vec![
                        Type::class(collection, vec![Type::TypeVar(collect_t)]),
                        closure_ty.clone(),
                    ],
                    Type::class(list, vec![obj_ty.clone()]),
                ),
                static_method(
                    "find",
                    vec![find_t],
                    vec![
                        Type::class(collection, vec![Type::TypeVar(find_t)]),
                        closure_ty.clone(),
                    ],
                    Type::TypeVar(find_t),
                ),
            ];
            self.add_class(def)
        };
        self.default_provider = Some(provider);

        let _ = (array_list, hash_map, map, gstring, range, comparator);
    }

    fn add_object_bounded_param(&mut self, name: &str, object: ClassId) -> TypeVarId {
        let id = self.add_type_param(name);
        self.define_type_param(
            id,
            TypeParamDef {
                name: name.into(),
                upper_bounds: vec![Type::class(object, vec![])],
                lower_bound: None,
            },
        );
        id
    }
}

fn public_method(name: &str, params: Vec<Type>, ret: Type) -> MethodDef {
    MethodDef {
        name: Name::new(name),
        type_params: vec![],
        params,
        ret,
        is_static: false,
        varargs: false,
        visibility: Visibility::Public,
    }
}

fn static_method(name: &str, type_params: Vec<TypeVarId>, params: Vec<Type>, ret: Type) -> MethodDef {
    MethodDef {
        name: Name::new(name),
        type_params,
        params,
        ret,
        is_static: true,
        varargs: false,
        visibility: Visibility::Public,
    }
}
