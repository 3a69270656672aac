//! The traversal driver: one pass over a parsed unit.
//!
//! The driver owns the scope stack and the narrowing state, pushes and pops
//! frames as it descends, and records a result for every expression and
//! reference it visits. It is strictly best-effort: malformed subtrees are
//! skipped, unresolved names degrade to `Unknown`, and the only hard stops
//! are cancellation and scope-stack corruption.

use std::collections::HashMap;

use lilt_ast::{
    AstRoot, BinaryOp, Body, BodyId, CallContract, ClosureParam, DelegateHint, Expr, ExprId,
    LiteralKind, ParamHint, Stmt, StmtId, TypeRef, UnaryOp,
};
use lilt_core::{CancellationToken, Name, Span};
use lilt_flow::{always_exits, condition_facts, narrowed_type, BindingKey, NarrowingState};
use lilt_resolve::{
    class_instance_type, resolve_member, resolve_methods, resolve_type_ref, resolve_unqualified,
    select_constructor, select_overload, Candidate, ClosureParamRef, ClosureScope, Declaration,
    LocalRef, MemberQuery, OverloadSelection, ParamRef, ScopeKind, ScopeStack, SlotValue,
    VariableInfo,
};
use lilt_types::{
    element_type, is_subtype, lub, ClassId, Confidence, Primitive, SymbolUniverse, Type, TypeEnv,
    TypeParamMap,
};
use tracing::debug;

use crate::index::{IndexBuilder, TypeLookupResult};
use crate::{Analysis, AnalysisError};

/// Analyze one unit against the universe. Cancellation is polled at every
/// statement and expression.
pub fn analyze(
    ast: &AstRoot,
    universe: &SymbolUniverse,
    token: &CancellationToken,
) -> Result<Analysis, AnalysisError> {
    let analyzer = Analyzer {
        universe,
        ast,
        token,
        scopes: ScopeStack::new(),
        index: IndexBuilder::default(),
        dynamic_vars: HashMap::new(),
    };
    analyzer.run()
}

/// The inferred value of one expression.
#[derive(Debug, Clone)]
struct Inferred {
    ty: Type,
    confidence: Confidence,
    decl: Option<Declaration>,
    declaring: Option<Type>,
}

impl Inferred {
    fn unknown() -> Self {
        Inferred {
            ty: Type::Unknown,
            confidence: Confidence::Unknown,
            decl: None,
            declaring: None,
        }
    }

    fn of(ty: Type, confidence: Confidence) -> Self {
        Inferred {
            ty,
            confidence,
            decl: None,
            declaring: None,
        }
    }

    fn from_candidate(candidate: Candidate) -> Self {
        Inferred {
            ty: candidate.ty,
            confidence: candidate.confidence,
            decl: Some(candidate.decl),
            declaring: candidate.declaring,
        }
    }

    fn result(&self) -> TypeLookupResult {
        TypeLookupResult {
            ty: self.ty.clone(),
            declaring_type: self.declaring.clone(),
            declaration: self.decl.clone(),
            confidence: self.confidence,
        }
    }
}

struct Analyzer<'a> {
    universe: &'a SymbolUniverse,
    ast: &'a AstRoot,
    token: &'a CancellationToken,
    scopes: ScopeStack,
    index: IndexBuilder,
    /// Top-level script bindings created by first assignment.
    dynamic_vars: HashMap<Name, Type>,
}

impl<'a> Analyzer<'a> {
    fn run(mut self) -> Result<Analysis, AnalysisError> {
        let ast = self.ast;
        tracing::trace!(classes = ast.classes.len(), script = ast.script.is_some(), "analysis pass start");
        for &class_id in &ast.classes {
            self.analyze_class(class_id)?;
        }
        if let Some(script) = ast.script {
            self.scopes.push(ScopeKind::Script);
            self.infer_body(script)?;
            self.scopes.pop()?;
        }
        let index = self.index.finish();
        tracing::trace!(results = index.len(), "analysis pass finish");
        Ok(Analysis {
            revision: self.universe.revision(),
            index,
        })
    }

    fn check_cancelled(&self) -> Result<(), AnalysisError> {
        if self.token.is_cancelled() {
            return Err(AnalysisError::Cancelled);
        }
        Ok(())
    }

    fn analyze_class(&mut self, decl_id: lilt_ast::ClassDeclId) -> Result<(), AnalysisError> {
        let ast = self.ast;
        let decl = ast.class(decl_id);
        let Some(class) = self.universe.class_id(decl.qualified.as_str()) else {
            debug!(name = %decl.qualified, "class declaration missing from universe, skipping");
            return Ok(());
        };

        self.index.record(
            decl.name_span,
            TypeLookupResult {
                ty: class_instance_type(self.universe, class),
                declaring_type: None,
                declaration: Some(Declaration::Class(class)),
                confidence: Confidence::Exact,
            },
        );

        self.scopes.push(ScopeKind::Class { class });
        for &field_id in &decl.fields {
            self.analyze_field(class, field_id)?;
        }
        for &method_id in &decl.methods {
            self.analyze_method(class, method_id)?;
        }
        self.scopes.pop()?;
        Ok(())
    }

    fn analyze_field(
        &mut self,
        class: ClassId,
        decl_id: lilt_ast::FieldDeclId,
    ) -> Result<(), AnalysisError> {
        let ast = self.ast;
        let decl = ast.field(decl_id);

        let indexed = self.universe.class(class).and_then(|def| {
            def.fields
                .iter()
                .position(|f| f.name == decl.name)
                .map(|index| (index as u32, def.fields[index].ty.clone()))
        });
        if let Some((index, ty)) = indexed {
            self.index.record(
                decl.name_span,
                TypeLookupResult {
                    ty,
                    declaring_type: Some(Type::class(class, vec![])),
                    declaration: Some(Declaration::Field(lilt_types::FieldId { class, index })),
                    confidence: Confidence::Exact,
                },
            );
        }

        if let Some(init) = decl.initializer {
            self.scopes.push(ScopeKind::FieldInit {
                class,
                is_static: decl.is_static,
            });
            self.infer_body(init)?;
            self.scopes.pop()?;
        }
        Ok(())
    }

    fn analyze_method(
        &mut self,
        class: ClassId,
        decl_id: lilt_ast::MethodDeclId,
    ) -> Result<(), AnalysisError> {
        let ast = self.ast;
        let decl = ast.method(decl_id);

        // Same-arity overloads are told apart by their declared parameter
        // types; an untyped parameter matches any.
        let param_tys: Vec<Type> = decl
            .params
            .iter()
            .map(|p| {
                p.ty.as_ref()
                    .map(|t| resolve_type_ref(self.universe, t))
                    .unwrap_or(Type::Unknown)
            })
            .collect();
        let universe = self.universe;
        let same_type = |declared: &Type, written: &Type| {
            written.is_unknown()
                || (is_subtype(universe, declared, written)
                    && is_subtype(universe, written, declared))
        };
        let indexed = universe.class(class).and_then(|def| {
            def.methods
                .iter()
                .position(|m| {
                    m.name == decl.name
                        && m.params.len() == param_tys.len()
                        && m.params
                            .iter()
                            .zip(&param_tys)
                            .all(|(declared, written)| same_type(declared, written))
                })
                .map(|index| (index as u32, def.methods[index].ret.clone()))
        });
        if let Some((index, ret)) = indexed {
            self.index.record(
                decl.name_span,
                TypeLookupResult {
                    ty: ret,
                    declaring_type: Some(Type::class(class, vec![])),
                    declaration: Some(Declaration::Method(lilt_types::MethodId { class, index })),
                    confidence: Confidence::Exact,
                },
            );
        }

        self.scopes.push(ScopeKind::Method {
            class,
            is_static: decl.is_static,
        });
        for (index, param) in decl.params.iter().enumerate() {
            let ty = param
                .ty
                .as_ref()
                .map(|t| resolve_type_ref(self.universe, t))
                .unwrap_or(Type::Unknown);
            let confidence = if ty.is_unknown() {
                Confidence::Unknown
            } else {
                Confidence::Exact
            };
            let param_decl = Declaration::Param(ParamRef {
                owner: decl_id,
                index,
            });
            self.index.record(
                param.name_span,
                TypeLookupResult {
                    ty: ty.clone(),
                    declaring_type: None,
                    declaration: Some(param_decl.clone()),
                    confidence,
                },
            );
            self.scopes.declare(
                param.name.clone(),
                VariableInfo {
                    ty,
                    decl: param_decl,
                },
            );
        }
        if let Some(body) = decl.body {
            self.infer_body(body)?;
        }
        self.scopes.pop()?;
        Ok(())
    }

    fn infer_body(&mut self, body_id: BodyId) -> Result<(), AnalysisError> {
        let body = self.ast.body(body_id);
        let mut flow = NarrowingState::new();
        self.infer_stmt(body, body_id, body.root, &mut flow)
    }

    fn infer_stmt(
        &mut self,
        body: &Body,
        body_id: BodyId,
        stmt: StmtId,
        flow: &mut NarrowingState,
    ) -> Result<(), AnalysisError> {
        self.check_cancelled()?;
        match body.stmt(stmt) {
            Stmt::Block { statements, .. } => {
                self.scopes.push(ScopeKind::Block);
                for &s in statements {
                    self.infer_stmt(body, body_id, s, flow)?;
                }
                self.scopes.pop()?;
            }
            Stmt::Let {
                local, initializer, ..
            } => {
                let init = match initializer {
                    Some(e) => Some(self.infer_expr(body, body_id, *e, flow)?),
                    None => None,
                };
                let local_data = body.local(*local);
                let declared = local_data
                    .ty
                    .as_ref()
                    .map(|t| resolve_type_ref(self.universe, t))
                    .filter(|t| !t.is_unknown());
                let (ty, confidence) = match (declared, init) {
                    (Some(t), _) => (t, Confidence::Exact),
                    (None, Some(iv)) if !iv.ty.is_unknown() => {
                        (iv.ty, iv.confidence.min(Confidence::Inferred))
                    }
                    _ => (Type::Unknown, Confidence::Unknown),
                };
                let decl = Declaration::Local(LocalRef {
                    body: body_id,
                    local: *local,
                });
                self.index.record(
                    local_data.name_span,
                    TypeLookupResult {
                        ty: ty.clone(),
                        declaring_type: None,
                        declaration: Some(decl.clone()),
                        confidence,
                    },
                );
                self.scopes
                    .declare(local_data.name.clone(), VariableInfo { ty, decl });
            }
            Stmt::Expr { expr, .. } => {
                self.infer_expr(body, body_id, *expr, flow)?;
            }
            Stmt::If {
                cond,
                then_branch,
                else_branch,
                ..
            } => {
                let facts = self.facts_for(body, *cond, flow);
                self.infer_expr(body, body_id, *cond, flow)?;

                let mut then_flow = flow.fork();
                then_flow.apply_facts(self.universe, &facts.when_true);
                self.infer_stmt(body, body_id, *then_branch, &mut then_flow)?;

                match else_branch {
                    Some(else_branch) => {
                        let mut else_flow = flow.fork();
                        else_flow.apply_facts(self.universe, &facts.when_false);
                        self.infer_stmt(body, body_id, *else_branch, &mut else_flow)?;
                        if always_exits(body, *then_branch) {
                            flow.adopt(else_flow);
                        } else if always_exits(body, *else_branch) {
                            flow.adopt(then_flow);
                        } else {
                            then_flow.merge(self.universe, &else_flow);
                            flow.adopt(then_flow);
                        }
                    }
                    None => {
                        // An always-exiting then branch leaves the negative
                        // facts in force for the rest of the block.
                        if always_exits(body, *then_branch) {
                            flow.apply_facts(self.universe, &facts.when_false);
                        } else {
                            let mut skip_flow = flow.fork();
                            skip_flow.apply_facts(self.universe, &facts.when_false);
                            then_flow.merge(self.universe, &skip_flow);
                            flow.adopt(then_flow);
                        }
                    }
                }
            }
            Stmt::While { cond, body: b, .. } => {
                let facts = self.facts_for(body, *cond, flow);
                self.infer_expr(body, body_id, *cond, flow)?;
                // The loop body sees the positive facts; nothing proven
                // inside survives the back edge.
                let mut body_flow = flow.fork();
                body_flow.apply_facts(self.universe, &facts.when_true);
                self.infer_stmt(body, body_id, *b, &mut body_flow)?;
            }
            Stmt::For {
                local,
                iterable,
                body: b,
                ..
            } => {
                let iter = self.infer_expr(body, body_id, *iterable, flow)?;
                let elem = element_type(self.universe, &iter.ty).unwrap_or(Type::Unknown);
                let confidence = if elem.is_unknown() {
                    Confidence::Unknown
                } else {
                    iter.confidence.min(Confidence::Inferred)
                };
                let local_data = body.local(*local);
                let decl = Declaration::Local(LocalRef {
                    body: body_id,
                    local: *local,
                });
                self.index.record(
                    local_data.name_span,
                    TypeLookupResult {
                        ty: elem.clone(),
                        declaring_type: None,
                        declaration: Some(decl.clone()),
                        confidence,
                    },
                );
                self.scopes.push(ScopeKind::Block);
                self.scopes
                    .declare(local_data.name.clone(), VariableInfo { ty: elem, decl });
                let mut body_flow = flow.fork();
                self.infer_stmt(body, body_id, *b, &mut body_flow)?;
                self.scopes.pop()?;
            }
            Stmt::Switch {
                subject,
                arms,
                default,
                ..
            } => {
                let subject_iv = self.infer_expr(body, body_id, *subject, flow)?;
                let subject_key = self.binding_key_of(body, *subject);
                for arm in arms {
                    let mut arm_flow = flow.fork();
                    if let Some(type_label) = &arm.ty {
                        let checked = resolve_type_ref(self.universe, type_label);
                        if let Some(key) = &subject_key {
                            if !checked.is_unknown() {
                                let narrowed =
                                    narrowed_type(self.universe, &subject_iv.ty, &checked);
                                arm_flow.narrow(self.universe, key.clone(), narrowed);
                            }
                        }
                    }
                    if let Some(value) = arm.value {
                        self.infer_expr(body, body_id, value, &mut arm_flow)?;
                    }
                    self.infer_stmt(body, body_id, arm.body, &mut arm_flow)?;
                }
                if let Some(default) = default {
                    let mut default_flow = flow.fork();
                    self.infer_stmt(body, body_id, *default, &mut default_flow)?;
                }
            }
            Stmt::Try {
                body: b,
                catches,
                finally,
                ..
            } => {
                let mut try_flow = flow.fork();
                self.infer_stmt(body, body_id, *b, &mut try_flow)?;
                for catch in catches {
                    let caught = Type::union(
                        catch
                            .types
                            .iter()
                            .map(|t| resolve_type_ref(self.universe, t))
                            .collect(),
                    );
                    let local_data = body.local(catch.local);
                    let decl = Declaration::Local(LocalRef {
                        body: body_id,
                        local: catch.local,
                    });
                    self.index.record(
                        local_data.name_span,
                        TypeLookupResult {
                            ty: caught.clone(),
                            declaring_type: None,
                            declaration: Some(decl.clone()),
                            confidence: Confidence::Exact,
                        },
                    );
                    self.scopes.push(ScopeKind::Block);
                    self.scopes
                        .declare(local_data.name.clone(), VariableInfo { ty: caught, decl });
                    let mut catch_flow = flow.fork();
                    self.infer_stmt(body, body_id, catch.body, &mut catch_flow)?;
                    self.scopes.pop()?;
                }
                if let Some(finally) = finally {
                    self.infer_stmt(body, body_id, *finally, flow)?;
                }
            }
            Stmt::Return { expr, .. } => {
                if let Some(expr) = expr {
                    self.infer_expr(body, body_id, *expr, flow)?;
                }
            }
            Stmt::Throw { expr, .. } => {
                self.infer_expr(body, body_id, *expr, flow)?;
            }
            Stmt::Break { .. } | Stmt::Continue { .. } | Stmt::Empty { .. } => {}
        }
        Ok(())
    }

    fn infer_expr(
        &mut self,
        body: &Body,
        body_id: BodyId,
        expr: ExprId,
        flow: &mut NarrowingState,
    ) -> Result<Inferred, AnalysisError> {
        self.check_cancelled()?;
        let span = body.expr(expr).span();
        let inferred = match body.expr(expr) {
            Expr::Missing { .. } => return Ok(Inferred::unknown()),
            Expr::Literal { kind, .. } => self.literal_type(*kind),
            Expr::Name { name, .. } => self.infer_name(name, flow),
            Expr::Property {
                receiver,
                name,
                name_span,
                attribute,
                spread,
                ..
            } => {
                let (receiver, name, name_span, attribute, spread) =
                    (*receiver, name.clone(), *name_span, *attribute, *spread);
                self.infer_property(
                    body, body_id, receiver, &name, name_span, attribute, spread, false, flow,
                )?
            }
            Expr::Call {
                receiver,
                name,
                name_span,
                args,
                contract,
                ..
            } => {
                let (receiver, name, name_span, args, contract) = (
                    *receiver,
                    name.clone(),
                    *name_span,
                    args.clone(),
                    contract.clone(),
                );
                self.infer_call(
                    body,
                    body_id,
                    receiver,
                    &name,
                    name_span,
                    &args,
                    contract.as_ref(),
                    flow,
                )?
            }
            Expr::ConstructorCall { ty, args, .. } => {
                let (ty, args) = (ty.clone(), args.clone());
                self.infer_constructor(body, body_id, &ty, &args, flow)?
            }
            Expr::Closure {
                params,
                body: closure_body,
                ..
            } => {
                let (params, closure_body) = (params.clone(), *closure_body);
                self.infer_closure(
                    body,
                    body_id,
                    expr,
                    &params,
                    closure_body,
                    None,
                    None,
                    false,
                    flow,
                )?
            }
            Expr::MethodPointer { receiver, name, .. } => {
                let (receiver, name) = (*receiver, name.clone());
                let recv = self.infer_expr(body, body_id, receiver, flow)?;
                let methods =
                    resolve_methods(self.universe, &recv.ty, &name, false, self.scopes.enclosing_class());
                let closure_ty = Type::class(self.universe.well_known().closure, vec![]);
                match methods.first() {
                    Some((method, _)) => Inferred {
                        ty: closure_ty,
                        confidence: if methods.len() == 1 {
                            Confidence::Exact
                        } else {
                            Confidence::Inferred
                        },
                        decl: Some(Declaration::Method(*method)),
                        declaring: Some(Type::class(method.class, vec![])),
                    },
                    None => Inferred::of(closure_ty, Confidence::Inferred),
                }
            }
            Expr::Binary { op, lhs, rhs, .. } => {
                let (op, lhs, rhs) = (*op, *lhs, *rhs);
                self.infer_binary(body, body_id, op, lhs, rhs, flow)?
            }
            Expr::Unary { op, expr: inner, .. } => {
                let (op, inner) = (*op, *inner);
                let operand = self.infer_expr(body, body_id, inner, flow)?;
                match op {
                    UnaryOp::Not => {
                        Inferred::of(Type::Primitive(Primitive::Boolean), Confidence::Exact)
                    }
                    UnaryOp::Neg => match self.numeric_kind(&operand.ty) {
                        Some(p) => Inferred::of(Type::Primitive(p), operand.confidence),
                        None => Inferred::unknown(),
                    },
                }
            }
            Expr::Ternary {
                cond,
                then_expr,
                else_expr,
                ..
            } => {
                let (cond, then_expr, else_expr) = (*cond, *then_expr, *else_expr);
                let facts = self.facts_for(body, cond, flow);
                self.infer_expr(body, body_id, cond, flow)?;

                let mut then_flow = flow.fork();
                then_flow.apply_facts(self.universe, &facts.when_true);
                let then_iv = self.infer_expr(body, body_id, then_expr, &mut then_flow)?;

                let mut else_flow = flow.fork();
                else_flow.apply_facts(self.universe, &facts.when_false);
                let else_iv = self.infer_expr(body, body_id, else_expr, &mut else_flow)?;

                Inferred::of(
                    lub(self.universe, &then_iv.ty, &else_iv.ty),
                    then_iv.confidence.min(else_iv.confidence),
                )
            }
            Expr::Elvis { lhs, rhs, .. } => {
                let (lhs, rhs) = (*lhs, *rhs);
                let lhs_iv = self.infer_expr(body, body_id, lhs, flow)?;
                let rhs_iv = self.infer_expr(body, body_id, rhs, flow)?;
                Inferred::of(
                    lub(self.universe, &lhs_iv.ty, &rhs_iv.ty),
                    lhs_iv.confidence.min(rhs_iv.confidence),
                )
            }
            Expr::InstanceOf { expr: inner, .. } => {
                let inner = *inner;
                self.infer_expr(body, body_id, inner, flow)?;
                Inferred::of(Type::Primitive(Primitive::Boolean), Confidence::Exact)
            }
            Expr::Cast { ty, expr: inner, .. } => {
                let (ty, inner) = (ty.clone(), *inner);
                self.infer_expr(body, body_id, inner, flow)?;
                let target = resolve_type_ref(self.universe, &ty);
                let confidence = if target.is_unknown() {
                    Confidence::Unknown
                } else {
                    Confidence::Exact
                };
                Inferred::of(target, confidence)
            }
            Expr::ListLiteral { elements, .. } => {
                let elements = elements.clone();
                let mut elem = Type::Unknown;
                let mut confidence = Confidence::Exact;
                for e in &elements {
                    let iv = self.infer_expr(body, body_id, *e, flow)?;
                    confidence = confidence.min(iv.confidence.max(Confidence::Inferred));
                    elem = lub(self.universe, &elem, &self.boxed(iv.ty));
                }
                let elem = if elem.is_unknown() {
                    Type::class(self.universe.well_known().object, vec![])
                } else {
                    elem
                };
                Inferred::of(
                    Type::class(self.universe.well_known().list, vec![elem]),
                    confidence,
                )
            }
            Expr::MapLiteral { entries, .. } => {
                let entries = entries.clone();
                let mut key = Type::Unknown;
                let mut value = Type::Unknown;
                for (k, v) in &entries {
                    let k_iv = self.infer_expr(body, body_id, *k, flow)?;
                    let v_iv = self.infer_expr(body, body_id, *v, flow)?;
                    key = lub(self.universe, &key, &self.boxed(k_iv.ty));
                    value = lub(self.universe, &value, &self.boxed(v_iv.ty));
                }
                let object = || Type::class(self.universe.well_known().object, vec![]);
                let key = if key.is_unknown() { object() } else { key };
                let value = if value.is_unknown() { object() } else { value };
                Inferred::of(
                    Type::class(self.universe.well_known().map, vec![key, value]),
                    Confidence::Exact,
                )
            }
            Expr::Range { from, to, .. } => {
                let (from, to) = (*from, *to);
                self.infer_expr(body, body_id, from, flow)?;
                self.infer_expr(body, body_id, to, flow)?;
                Inferred::of(
                    Type::class(self.universe.well_known().range, vec![]),
                    Confidence::Exact,
                )
            }
        };
        self.index.record(span, inferred.result());
        Ok(inferred)
    }

    fn literal_type(&self, kind: LiteralKind) -> Inferred {
        let wk = self.universe.well_known();
        let ty = match kind {
            LiteralKind::Int => Type::Primitive(Primitive::Int),
            LiteralKind::Float => Type::Primitive(Primitive::Double),
            LiteralKind::Bool => Type::Primitive(Primitive::Boolean),
            LiteralKind::Str => Type::class(wk.string, vec![]),
            LiteralKind::GStr => Type::class(wk.gstring, vec![]),
            LiteralKind::Null => Type::class(wk.object, vec![]),
        };
        Inferred::of(ty, Confidence::Exact)
    }

    fn infer_name(&mut self, name: &Name, flow: &NarrowingState) -> Inferred {
        let resolution = resolve_unqualified(self.universe, &self.scopes, name, None, false);
        if let Some(candidate) = resolution.into_option() {
            let mut inferred = Inferred::from_candidate(candidate);
            if let Some(decl) = &inferred.decl {
                if let Some(key) = BindingKey::from_declaration(decl) {
                    if let Some(narrowed) = flow.get(&key) {
                        inferred.ty = narrowed.clone();
                    }
                }
            }
            return inferred;
        }

        // A bare class name is a reference to the class itself.
        if let Some(class) = self.class_reference(name) {
            return Inferred {
                ty: class_instance_type(self.universe, class),
                confidence: Confidence::Exact,
                decl: Some(Declaration::Class(class)),
                declaring: None,
            };
        }

        // Top-level scripts read dynamic bindings created by assignment.
        if self.scopes.at_top_level() {
            if let Some(ty) = self.dynamic_vars.get(name) {
                let key = BindingKey::Dynamic(name.clone());
                let ty = flow.get(&key).cloned().unwrap_or_else(|| ty.clone());
                return Inferred {
                    ty,
                    confidence: Confidence::Inferred,
                    decl: Some(Declaration::DynamicVar(name.clone())),
                    declaring: None,
                };
            }
        }

        Inferred::unknown()
    }

    #[allow(clippy::too_many_arguments)]
    fn infer_property(
        &mut self,
        body: &Body,
        body_id: BodyId,
        receiver: ExprId,
        name: &Name,
        name_span: Span,
        attribute: bool,
        spread: bool,
        write: bool,
        flow: &mut NarrowingState,
    ) -> Result<Inferred, AnalysisError> {
        let recv = self.infer_expr(body, body_id, receiver, flow)?;

        // `owner`/`delegate`/`thisObject` read through a chain of closure
        // references resolves against the actual frames.
        if !attribute && !write {
            if let Some(inferred) = self.closure_slot_property(body, receiver, name) {
                self.index.record(name_span, inferred.result());
                return Ok(inferred);
            }
        }

        if recv.ty.is_unknown() {
            self.index.record(name_span, TypeLookupResult::unknown());
            return Ok(Inferred::unknown());
        }

        let static_only = matches!(recv.decl, Some(Declaration::Class(_)));
        let member_receiver = if spread {
            match element_type(self.universe, &recv.ty) {
                Some(elem) => elem,
                None => {
                    self.index.record(name_span, TypeLookupResult::unknown());
                    return Ok(Inferred::unknown());
                }
            }
        } else {
            recv.ty.clone()
        };

        let query = MemberQuery {
            receiver: &member_receiver,
            name,
            call_arity: None,
            write,
            attribute,
            from_class: self.scopes.enclosing_class(),
            static_only,
        };
        let Some(candidate) = resolve_member(self.universe, &query).into_option() else {
            self.index.record(name_span, TypeLookupResult::unknown());
            return Ok(Inferred::unknown());
        };

        let mut inferred = Inferred::from_candidate(candidate);
        self.index.record(name_span, inferred.result());
        if spread {
            // `list*.name` collects the member values.
            inferred.ty = Type::class(
                self.universe.well_known().list,
                vec![self.boxed(inferred.ty)],
            );
        }
        Ok(inferred)
    }

    #[allow(clippy::too_many_arguments)]
    fn infer_call(
        &mut self,
        body: &Body,
        body_id: BodyId,
        receiver: Option<ExprId>,
        name: &Name,
        name_span: Span,
        args: &[ExprId],
        contract: Option<&CallContract>,
        flow: &mut NarrowingState,
    ) -> Result<Inferred, AnalysisError> {
        let recv = match receiver {
            Some(r) => Some(self.infer_expr(body, body_id, r, flow)?),
            None => None,
        };
        let static_only = recv
            .as_ref()
            .is_some_and(|r| matches!(r.decl, Some(Declaration::Class(_))));
        let receiver_ty = recv.as_ref().map(|r| r.ty.clone());

        // Closure arguments are typed under the call's contract, after the
        // receiver is known; other arguments are inferred in order.
        let mut arg_tys = Vec::with_capacity(args.len());
        for &arg in args {
            let iv = match body.expr(arg) {
                Expr::Closure {
                    params,
                    body: closure_body,
                    ..
                } => {
                    let (params, closure_body) = (params.clone(), *closure_body);
                    let iv = self.infer_closure(
                        body,
                        body_id,
                        arg,
                        &params,
                        closure_body,
                        contract,
                        receiver_ty.as_ref(),
                        static_only,
                        flow,
                    )?;
                    self.index.record(body.expr(arg).span(), iv.result());
                    iv
                }
                _ => self.infer_expr(body, body_id, arg, flow)?,
            };
            arg_tys.push(iv.ty);
        }

        let inferred = match &receiver_ty {
            Some(rt) if rt.is_unknown() => Inferred::unknown(),
            Some(rt) => self
                .resolve_call(rt, name, &arg_tys, static_only)
                .unwrap_or_else(Inferred::unknown),
            None => self.resolve_unqualified_call(name, &arg_tys),
        };
        self.index.record(name_span, inferred.result());
        Ok(inferred)
    }

    /// Full call resolution against a known receiver type: hierarchy methods
    /// with overload selection, then extension methods, closure-typed
    /// properties, and missing hooks.
    fn resolve_call(
        &mut self,
        receiver: &Type,
        name: &Name,
        args: &[Type],
        static_only: bool,
    ) -> Option<Inferred> {
        let from_class = self.scopes.enclosing_class();
        let methods = resolve_methods(self.universe, receiver, name, static_only, from_class);
        if !methods.is_empty() {
            match select_overload(self.universe, &methods, args) {
                OverloadSelection::Selected(sel) => {
                    return Some(Inferred {
                        ty: sel.ret,
                        confidence: Confidence::Exact,
                        decl: Some(Declaration::Method(sel.method)),
                        declaring: Some(Type::class(sel.method.class, vec![])),
                    });
                }
                OverloadSelection::Ambiguous(set) => {
                    let first = set.into_iter().next()?;
                    return Some(Inferred {
                        ty: first.ret,
                        confidence: Confidence::Inferred,
                        decl: Some(Declaration::Method(first.method)),
                        declaring: Some(Type::class(first.method.class, vec![])),
                    });
                }
                OverloadSelection::NoMatch => {}
            }
        }

        let query = MemberQuery {
            receiver,
            name,
            call_arity: Some(args.len()),
            write: false,
            attribute: false,
            from_class,
            static_only,
        };
        let candidate = resolve_member(self.universe, &query).into_option()?;

        // Extension hits get a second pass with the argument types, so
        // generic extensions infer through their non-receiver parameters too.
        if let Declaration::ExtensionMethod(method) = &candidate.decl {
            let mut full_args = Vec::with_capacity(args.len() + 1);
            full_args.push(receiver.clone());
            full_args.extend(args.iter().cloned());
            let candidates = [(*method, TypeParamMap::new())];
            if let OverloadSelection::Selected(sel) =
                select_overload(self.universe, &candidates, &full_args)
            {
                return Some(Inferred {
                    ty: sel.ret,
                    confidence: candidate.confidence,
                    decl: Some(candidate.decl),
                    declaring: candidate.declaring,
                });
            }
        }

        // A closure-typed property or a missing hook: the call itself is
        // dynamic, so the result degrades.
        let result_ty = match &candidate.decl {
            Declaration::MissingHook(_) => candidate.ty.clone(),
            _ if self.is_closure(&candidate.ty) => Type::Unknown,
            _ => candidate.ty.clone(),
        };
        Some(Inferred {
            ty: result_ty,
            confidence: candidate.confidence.min(Confidence::Inferred),
            decl: Some(candidate.decl),
            declaring: candidate.declaring,
        })
    }

    fn resolve_unqualified_call(&mut self, name: &Name, args: &[Type]) -> Inferred {
        let resolution =
            resolve_unqualified(self.universe, &self.scopes, name, Some(args.len()), false);
        if let Some(candidate) = resolution.into_option() {
            // Variable-like answers mean a closure value is being invoked.
            if matches!(
                candidate.decl,
                Declaration::Local(_)
                    | Declaration::Param(_)
                    | Declaration::ClosureParam(_)
                    | Declaration::DynamicVar(_)
            ) {
                return Inferred {
                    ty: Type::Unknown,
                    confidence: Confidence::Inferred,
                    decl: Some(candidate.decl),
                    declaring: None,
                };
            }
            // Refine with full overload selection against the slot or class
            // that answered.
            if let Some(declaring) = candidate.declaring.clone() {
                if let Some(refined) =
                    self.resolve_call(&declaring, name, args, self.scopes.in_static_context())
                {
                    return refined;
                }
            }
            return Inferred::from_candidate(candidate);
        }

        if self.scopes.at_top_level() && self.dynamic_vars.contains_key(name) {
            return Inferred {
                ty: Type::Unknown,
                confidence: Confidence::Inferred,
                decl: Some(Declaration::DynamicVar(name.clone())),
                declaring: None,
            };
        }
        Inferred::unknown()
    }

    fn infer_constructor(
        &mut self,
        body: &Body,
        body_id: BodyId,
        type_ref: &TypeRef,
        args: &[ExprId],
        flow: &mut NarrowingState,
    ) -> Result<Inferred, AnalysisError> {
        let mut arg_tys = Vec::with_capacity(args.len());
        for &arg in args {
            arg_tys.push(self.infer_expr(body, body_id, arg, flow)?.ty);
        }

        let ty = resolve_type_ref(self.universe, type_ref);
        let Some(ct) = ty.as_class().cloned() else {
            return Ok(Inferred::of(ty, Confidence::Inferred));
        };
        match select_constructor(self.universe, &ct, &arg_tys) {
            Some(ctor) => Ok(Inferred {
                ty,
                confidence: Confidence::Exact,
                decl: Some(Declaration::Constructor(ctor)),
                declaring: Some(Type::class(ct.def, vec![])),
            }),
            None => Ok(Inferred::of(ty, Confidence::Inferred)),
        }
    }

    #[allow(clippy::too_many_arguments)]
    fn infer_closure(
        &mut self,
        body: &Body,
        body_id: BodyId,
        expr: ExprId,
        params: &[ClosureParam],
        closure_body: StmtId,
        contract: Option<&CallContract>,
        receiver_ty: Option<&Type>,
        receiver_is_class: bool,
        _flow: &mut NarrowingState,
    ) -> Result<Inferred, AnalysisError> {
        let wk = self.universe.well_known();
        let closure_ty = Type::class(wk.closure, vec![]);

        let this_object = match self.scopes.enclosing_closure() {
            Some(cs) => cs.this_object.clone(),
            None => match self.scopes.enclosing_class() {
                Some(class) => class_instance_type(self.universe, class),
                None => Type::class(wk.object, vec![]),
            },
        };
        // A nested closure's owner is the enclosing closure frame itself;
        // slot reads and name escalation walk that chain.
        let owner = match self.scopes.enclosing_closure() {
            Some(cs) => SlotValue::Enclosing(Box::new(cs.clone())),
            None if self.scopes.in_static_context() => {
                SlotValue::ClassRef(this_object.clone())
            }
            None => SlotValue::Instance(this_object.clone()),
        };
        let delegate = match contract.and_then(|c| c.delegate.as_ref()) {
            Some(DelegateHint::Receiver) => match receiver_ty {
                Some(ty) if receiver_is_class => SlotValue::ClassRef(ty.clone()),
                Some(ty) => SlotValue::Instance(ty.clone()),
                None => owner.clone(),
            },
            Some(DelegateHint::Type(tr)) => {
                SlotValue::Instance(resolve_type_ref(self.universe, tr))
            }
            None => owner.clone(),
        };
        let strategy = contract.and_then(|c| c.strategy).unwrap_or_default();

        self.scopes.push(ScopeKind::Closure(ClosureScope {
            this_object,
            owner,
            delegate,
            strategy,
        }));

        let universe = self.universe;
        let hint_type = move |index: usize| -> Option<Type> {
            let hints = &contract?.param_hints;
            match hints.get(index)? {
                ParamHint::Type(tr) => Some(resolve_type_ref(universe, tr)),
                ParamHint::Receiver => receiver_ty.cloned(),
                ParamHint::ReceiverElement => element_type(universe, receiver_ty?),
            }
        };

        if params.is_empty() {
            // The implicit `it` parameter; Object when nothing seeds it.
            let ty = hint_type(0).unwrap_or_else(|| Type::class(wk.object, vec![]));
            let decl = Declaration::ClosureParam(ClosureParamRef {
                body: body_id,
                closure: expr,
                index: 0,
            });
            self.scopes.declare(
                "it".into(),
                VariableInfo {
                    ty,
                    decl,
                },
            );
        } else {
            for (index, param) in params.iter().enumerate() {
                let explicit = param
                    .ty
                    .as_ref()
                    .map(|t| resolve_type_ref(self.universe, t))
                    .filter(|t| !t.is_unknown());
                let (ty, confidence) = match explicit {
                    Some(t) => (t, Confidence::Exact),
                    None => match hint_type(index) {
                        Some(t) => (t, Confidence::Inferred),
                        None => (Type::Unknown, Confidence::Unknown),
                    },
                };
                let decl = Declaration::ClosureParam(ClosureParamRef {
                    body: body_id,
                    closure: expr,
                    index,
                });
                self.index.record(
                    param.span,
                    TypeLookupResult {
                        ty: ty.clone(),
                        declaring_type: None,
                        declaration: Some(decl.clone()),
                        confidence,
                    },
                );
                self.scopes
                    .declare(param.name.clone(), VariableInfo { ty, decl });
            }
        }

        // Narrowings from the enclosing body do not flow in: the closure may
        // run at any later point.
        let mut inner_flow = NarrowingState::new();
        self.infer_stmt(body, body_id, closure_body, &mut inner_flow)?;
        self.scopes.pop()?;

        Ok(Inferred::of(closure_ty, Confidence::Exact))
    }

    fn infer_binary(
        &mut self,
        body: &Body,
        body_id: BodyId,
        op: BinaryOp,
        lhs: ExprId,
        rhs: ExprId,
        flow: &mut NarrowingState,
    ) -> Result<Inferred, AnalysisError> {
        match op {
            BinaryOp::Assign => self.infer_assignment(body, body_id, lhs, rhs, flow),
            BinaryOp::And | BinaryOp::Or => {
                // Short-circuit: the left operand's outcome governs the
                // right-hand operand.
                let facts = self.facts_for(body, lhs, flow);
                self.infer_expr(body, body_id, lhs, flow)?;
                let mut rhs_flow = flow.fork();
                let proven = if op == BinaryOp::And {
                    &facts.when_true
                } else {
                    &facts.when_false
                };
                rhs_flow.apply_facts(self.universe, proven);
                self.infer_expr(body, body_id, rhs, &mut rhs_flow)?;
                Ok(Inferred::of(
                    Type::Primitive(Primitive::Boolean),
                    Confidence::Exact,
                ))
            }
            BinaryOp::Eq
            | BinaryOp::Ne
            | BinaryOp::Lt
            | BinaryOp::Le
            | BinaryOp::Gt
            | BinaryOp::Ge => {
                self.infer_expr(body, body_id, lhs, flow)?;
                self.infer_expr(body, body_id, rhs, flow)?;
                Ok(Inferred::of(
                    Type::Primitive(Primitive::Boolean),
                    Confidence::Exact,
                ))
            }
            BinaryOp::Compare => {
                self.infer_expr(body, body_id, lhs, flow)?;
                self.infer_expr(body, body_id, rhs, flow)?;
                Ok(Inferred::of(
                    Type::Primitive(Primitive::Int),
                    Confidence::Exact,
                ))
            }
            BinaryOp::Add | BinaryOp::Sub | BinaryOp::Mul | BinaryOp::Div | BinaryOp::Rem => {
                let lhs_iv = self.infer_expr(body, body_id, lhs, flow)?;
                let rhs_iv = self.infer_expr(body, body_id, rhs, flow)?;
                if op == BinaryOp::Add
                    && (self.is_stringish(&lhs_iv.ty) || self.is_stringish(&rhs_iv.ty))
                {
                    return Ok(Inferred::of(
                        Type::class(self.universe.well_known().string, vec![]),
                        Confidence::Exact,
                    ));
                }
                match (self.numeric_kind(&lhs_iv.ty), self.numeric_kind(&rhs_iv.ty)) {
                    (Some(a), Some(b)) => Ok(Inferred::of(
                        Type::Primitive(promote(a, b)),
                        lhs_iv.confidence.min(rhs_iv.confidence),
                    )),
                    _ => Ok(Inferred::unknown()),
                }
            }
        }
    }

    fn infer_assignment(
        &mut self,
        body: &Body,
        body_id: BodyId,
        lhs: ExprId,
        rhs: ExprId,
        flow: &mut NarrowingState,
    ) -> Result<Inferred, AnalysisError> {
        let rhs_iv = self.infer_expr(body, body_id, rhs, flow)?;

        match body.expr(lhs) {
            Expr::Name { name, span } => {
                let (name, span) = (name.clone(), *span);
                let resolution =
                    resolve_unqualified(self.universe, &self.scopes, &name, None, true);
                match resolution.into_option() {
                    Some(candidate) => {
                        let inferred = Inferred::from_candidate(candidate);
                        self.index.record(span, inferred.result());
                        if let Some(decl) = &inferred.decl {
                            if let Some(key) = BindingKey::from_declaration(decl) {
                                // Reassignment resets narrowing to the
                                // assigned value's type.
                                flow.invalidate(&key);
                                if !rhs_iv.ty.is_unknown() {
                                    flow.narrow(self.universe, key, rhs_iv.ty.clone());
                                }
                            }
                        }
                    }
                    None if self.scopes.at_top_level() => {
                        // First write creates a dynamic script binding.
                        self.dynamic_vars.insert(name.clone(), rhs_iv.ty.clone());
                        let key = BindingKey::Dynamic(name.clone());
                        flow.invalidate(&key);
                        self.index.record(
                            span,
                            TypeLookupResult {
                                ty: rhs_iv.ty.clone(),
                                declaring_type: None,
                                declaration: Some(Declaration::DynamicVar(name)),
                                confidence: Confidence::Inferred,
                            },
                        );
                    }
                    None => {
                        self.index.record(span, TypeLookupResult::unknown());
                    }
                }
            }
            Expr::Property {
                receiver,
                name,
                name_span,
                attribute,
                spread,
                ..
            } => {
                let (receiver, name, name_span, attribute, spread) =
                    (*receiver, name.clone(), *name_span, *attribute, *spread);
                self.infer_property(
                    body, body_id, receiver, &name, name_span, attribute, spread, true, flow,
                )?;
            }
            _ => {
                self.infer_expr(body, body_id, lhs, flow)?;
            }
        }

        Ok(Inferred::of(
            rhs_iv.ty,
            rhs_iv.confidence.min(Confidence::Inferred),
        ))
    }

    /// Condition facts for branch narrowing: only variable-like bindings
    /// participate, fields can change between the check and the use.
    fn facts_for(
        &self,
        body: &Body,
        cond: ExprId,
        flow: &NarrowingState,
    ) -> lilt_flow::ConditionFacts {
        let scopes = &self.scopes;
        let dynamic_vars = &self.dynamic_vars;
        let mut resolve = |id: ExprId| -> Option<(BindingKey, Type)> {
            let Expr::Name { name, .. } = body.expr(id) else {
                return None;
            };
            if let Some(info) = scopes.lookup_var(name) {
                let key = BindingKey::from_declaration(&info.decl)?;
                let effective = flow.get(&key).cloned().unwrap_or_else(|| info.ty.clone());
                return Some((key, effective));
            }
            let ty = dynamic_vars.get(name)?;
            let key = BindingKey::Dynamic(name.clone());
            let effective = flow.get(&key).cloned().unwrap_or_else(|| ty.clone());
            Some((key, effective))
        };
        condition_facts(self.universe, body, cond, &mut resolve)
    }

    fn closure_slot_property(&self, body: &Body, receiver: ExprId, name: &Name) -> Option<Inferred> {
        let scope = self.referenced_closure(body, receiver)?;
        let wk = self.universe.well_known();
        let ty = match name.as_str() {
            "owner" => scope.owner.surface_type(wk),
            "delegate" => scope.delegate.surface_type(wk),
            "thisObject" => scope.this_object.clone(),
            _ => return None,
        };
        Some(Inferred::of(ty, Confidence::Exact))
    }

    /// The closure frame a receiver denotes, when it is `owner`/`delegate`
    /// (or a chain of them) referring to an enclosing closure.
    fn referenced_closure(&self, body: &Body, expr: ExprId) -> Option<ClosureScope> {
        match body.expr(expr) {
            Expr::Name { name, .. } => {
                let cs = self.scopes.enclosing_closure()?;
                let slot = match name.as_str() {
                    "owner" => &cs.owner,
                    "delegate" => &cs.delegate,
                    _ => return None,
                };
                match slot {
                    SlotValue::Enclosing(outer) => Some((**outer).clone()),
                    _ => None,
                }
            }
            Expr::Property { receiver, name, .. } => {
                let outer = self.referenced_closure(body, *receiver)?;
                let slot = match name.as_str() {
                    "owner" => outer.owner,
                    "delegate" => outer.delegate,
                    _ => return None,
                };
                match slot {
                    SlotValue::Enclosing(cs) => Some(*cs),
                    _ => None,
                }
            }
            _ => None,
        }
    }

    fn binding_key_of(&self, body: &Body, expr: ExprId) -> Option<BindingKey> {
        let Expr::Name { name, .. } = body.expr(expr) else {
            return None;
        };
        if let Some(info) = self.scopes.lookup_var(name) {
            return BindingKey::from_declaration(&info.decl);
        }
        self.dynamic_vars
            .contains_key(name)
            .then(|| BindingKey::Dynamic(name.clone()))
    }

    fn class_reference(&self, name: &Name) -> Option<ClassId> {
        let ty = resolve_type_ref(self.universe, &TypeRef::named(name.as_str()));
        ty.as_class().map(|ct| ct.def)
    }

    fn boxed(&self, ty: Type) -> Type {
        match ty {
            Type::Primitive(p) => Type::class(self.universe.well_known().boxed(p), vec![]),
            other => other,
        }
    }

    fn numeric_kind(&self, ty: &Type) -> Option<Primitive> {
        let prim = match ty {
            Type::Primitive(p) => *p,
            Type::Class(ct) => self.universe.well_known().unboxed(ct.def)?,
            _ => return None,
        };
        match prim {
            Primitive::Boolean => None,
            // Sub-int operands promote to int under arithmetic.
            Primitive::Byte | Primitive::Short | Primitive::Char => Some(Primitive::Int),
            other => Some(other),
        }
    }

    fn is_stringish(&self, ty: &Type) -> bool {
        let wk = self.universe.well_known();
        ty.as_class()
            .is_some_and(|ct| ct.def == wk.string || ct.def == wk.gstring)
    }

    fn is_closure(&self, ty: &Type) -> bool {
        ty.as_class()
            .is_some_and(|ct| ct.def == self.universe.well_known().closure)
    }
}

fn promote(a: Primitive, b: Primitive) -> Primitive {
    fn rank(p: Primitive) -> u8 {
        match p {
            Primitive::Double => 4,
            Primitive::Float => 3,
            Primitive::Long => 2,
            _ => 1,
        }
    }
    if rank(a) >= rank(b) {
        a
    } else {
        b
    }
}
