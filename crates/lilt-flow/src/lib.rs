//! Flow-sensitive type narrowing.
//!
//! Narrowing is a refinement layer over declared types: a binding's narrowed
//! type holds from the point a check establishes it until a merge point or a
//! reassignment invalidates it. Branch merges join with the least upper
//! bound, so information proven on only one path degrades rather than leaks.

use std::collections::HashMap;

use lilt_ast::{Body, Expr, ExprId, Stmt, StmtId, UnaryOp};
use lilt_core::Name;
use lilt_resolve::{ClosureParamRef, Declaration, LocalRef, ParamRef};
use lilt_types::{is_subtype, lub, Type, TypeEnv};

/// A binding that narrowing can refine. Only variable-like declarations
/// participate; fields and properties can change under the analysis's feet.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum BindingKey {
    Local(LocalRef),
    Param(ParamRef),
    ClosureParam(ClosureParamRef),
    Dynamic(Name),
}

impl BindingKey {
    #[must_use]
    pub fn from_declaration(decl: &Declaration) -> Option<BindingKey> {
        match decl {
            Declaration::Local(r) => Some(BindingKey::Local(*r)),
            Declaration::Param(r) => Some(BindingKey::Param(*r)),
            Declaration::ClosureParam(r) => Some(BindingKey::ClosureParam(*r)),
            Declaration::DynamicVar(name) => Some(BindingKey::Dynamic(name.clone())),
            _ => None,
        }
    }
}

/// The narrowed types in force at a program point.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct NarrowingState {
    narrowed: HashMap<BindingKey, Type>,
}

impl NarrowingState {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn get(&self, key: &BindingKey) -> Option<&Type> {
        self.narrowed.get(key)
    }

    /// Refine `key`, intersecting with any narrowing already in force.
    pub fn narrow(&mut self, env: &dyn TypeEnv, key: BindingKey, ty: Type) {
        let refined = match self.narrowed.get(&key) {
            Some(current) => narrowed_type(env, current, &ty),
            None => ty,
        };
        self.narrowed.insert(key, refined);
    }

    /// Reassignment wipes whatever a check had established.
    pub fn invalidate(&mut self, key: &BindingKey) {
        self.narrowed.remove(key);
    }

    /// Snapshot for analyzing one branch of a fork.
    #[must_use]
    pub fn fork(&self) -> NarrowingState {
        self.clone()
    }

    /// Join with the state of another path. A binding stays narrowed only if
    /// both paths narrowed it, to the lub of the two refinements.
    pub fn merge(&mut self, env: &dyn TypeEnv, other: &NarrowingState) {
        let mut joined = HashMap::new();
        for (key, ty) in &self.narrowed {
            if let Some(other_ty) = other.narrowed.get(key) {
                joined.insert(key.clone(), lub(env, ty, other_ty));
            }
        }
        self.narrowed = joined;
    }

    /// Replace this state wholesale, used when exactly one branch survives.
    pub fn adopt(&mut self, other: NarrowingState) {
        self.narrowed = other.narrowed;
    }

    pub fn apply_facts(&mut self, env: &dyn TypeEnv, facts: &[(BindingKey, Type)]) {
        for (key, ty) in facts {
            self.narrow(env, key.clone(), ty.clone());
        }
    }
}

/// What a condition proves about bindings on each outcome.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ConditionFacts {
    pub when_true: Vec<(BindingKey, Type)>,
    pub when_false: Vec<(BindingKey, Type)>,
}

impl ConditionFacts {
    #[must_use]
    pub fn negated(mut self) -> ConditionFacts {
        std::mem::swap(&mut self.when_true, &mut self.when_false);
        self
    }
}

/// Extract narrowing facts from a condition expression.
///
/// `resolve` maps a tested expression to its binding and declared type; the
/// caller owns name resolution, this layer only understands the boolean
/// structure: `instanceof` and its negation, `!`, `&&` (facts from both
/// operands hold when true), and `||` (facts hold only when false).
pub fn condition_facts(
    env: &dyn TypeEnv,
    body: &Body,
    condition: ExprId,
    resolve: &mut dyn FnMut(ExprId) -> Option<(BindingKey, Type)>,
) -> ConditionFacts {
    match body.expr(condition) {
        Expr::InstanceOf {
            expr, ty, negated, ..
        } => {
            let Some((key, declared)) = resolve(*expr) else {
                return ConditionFacts::default();
            };
            let checked = resolve_checked_type(env, ty);
            if checked.is_unknown() {
                return ConditionFacts::default();
            }
            let narrowed = narrowed_type(env, &declared, &checked);
            let facts = ConditionFacts {
                when_true: vec![(key, narrowed)],
                when_false: Vec::new(),
            };
            if *negated {
                facts.negated()
            } else {
                facts
            }
        }
        Expr::Unary {
            op: UnaryOp::Not,
            expr,
            ..
        } => condition_facts(env, body, *expr, resolve).negated(),
        Expr::Binary {
            op: lilt_ast::BinaryOp::And,
            lhs,
            rhs,
            ..
        } => {
            let mut lhs_facts = condition_facts(env, body, *lhs, resolve);
            let rhs_facts = condition_facts(env, body, *rhs, resolve);
            // Both conjuncts held; either may have failed.
            lhs_facts.when_true.extend(rhs_facts.when_true);
            lhs_facts.when_false.clear();
            lhs_facts
        }
        Expr::Binary {
            op: lilt_ast::BinaryOp::Or,
            lhs,
            rhs,
            ..
        } => {
            let mut lhs_facts = condition_facts(env, body, *lhs, resolve);
            let rhs_facts = condition_facts(env, body, *rhs, resolve);
            // Either disjunct may have held; both failed on the false path.
            lhs_facts.when_true.clear();
            lhs_facts.when_false.extend(rhs_facts.when_false);
            lhs_facts
        }
        _ => ConditionFacts::default(),
    }
}

/// Refine `declared` by a successful check against `checked`.
///
/// The checked type wins when it is at least as precise; checks against a
/// supertype add nothing; unrelated checks (an interface test on a class
/// variable) intersect.
#[must_use]
pub fn narrowed_type(env: &dyn TypeEnv, declared: &Type, checked: &Type) -> Type {
    if declared.is_unknown() {
        return checked.clone();
    }
    if is_subtype(env, checked, declared) {
        return checked.clone();
    }
    if is_subtype(env, declared, checked) {
        return declared.clone();
    }
    match declared {
        Type::Intersection(members) => {
            let mut members = members.clone();
            if !members.contains(checked) {
                members.push(checked.clone());
            }
            Type::Intersection(members)
        }
        _ => Type::Intersection(vec![declared.clone(), checked.clone()]),
    }
}

fn resolve_checked_type(env: &dyn TypeEnv, ty: &lilt_ast::TypeRef) -> Type {
    lilt_resolve::resolve_type_ref(env, ty)
}

/// Whether a statement always leaves the enclosing block: it returns,
/// throws, or breaks out on every path through it.
#[must_use]
pub fn always_exits(body: &Body, stmt: StmtId) -> bool {
    match body.stmt(stmt) {
        Stmt::Return { .. } | Stmt::Throw { .. } | Stmt::Break { .. } | Stmt::Continue { .. } => {
            true
        }
        Stmt::Block { statements, .. } => statements.iter().any(|s| always_exits(body, *s)),
        Stmt::If {
            then_branch,
            else_branch: Some(else_branch),
            ..
        } => always_exits(body, *then_branch) && always_exits(body, *else_branch),
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use lilt_ast::{BinaryOp, Local, TypeRef};
    use lilt_core::Span;
    use lilt_types::{type_name, SymbolUniverse};
    use pretty_assertions::assert_eq;

    fn span() -> Span {
        Span::new(0, 0)
    }

    struct Fixture {
        env: SymbolUniverse,
        body: Body,
        key: BindingKey,
        name_expr: ExprId,
        declared: Type,
    }

    fn fixture() -> Fixture {
        let env = SymbolUniverse::core_library_builder().finish();
        let mut body = Body::empty(span());
        let local = body.alloc_local(Local {
            name: "x".into(),
            ty: None,
            name_span: span(),
            span: span(),
        });
        let name_expr = body.alloc_expr(Expr::Name {
            name: "x".into(),
            span: span(),
        });
        let mut ast = lilt_ast::AstRoot::new();
        let placeholder = ast.alloc_body(Body::empty(span()));
        Fixture {
            declared: Type::class(env.well_known().object, vec![]),
            env,
            body,
            key: BindingKey::Local(LocalRef {
                body: placeholder,
                local,
            }),
            name_expr,
        }
    }

    fn instance_of(fx: &mut Fixture, type_name: &str, negated: bool) -> ExprId {
        let expr = fx.name_expr;
        fx.body.alloc_expr(Expr::InstanceOf {
            expr,
            ty: TypeRef::named(type_name),
            negated,
            span: span(),
        })
    }

    fn facts_of(fx: &Fixture, condition: ExprId) -> ConditionFacts {
        let key = fx.key.clone();
        let declared = fx.declared.clone();
        let name_expr = fx.name_expr;
        let mut resolve = move |id: ExprId| (id == name_expr).then(|| (key.clone(), declared.clone()));
        condition_facts(&fx.env, &fx.body, condition, &mut resolve)
    }

    #[test]
    fn instanceof_narrows_true_branch_only() {
        let mut fx = fixture();
        let cond = instance_of(&mut fx, "String", false);

        let facts = facts_of(&fx, cond);
        assert_eq!(facts.when_true.len(), 1);
        assert_eq!(
            type_name(&fx.env, &facts.when_true[0].1),
            "java.lang.String"
        );
        assert!(facts.when_false.is_empty());
    }

    #[test]
    fn negated_instanceof_narrows_false_branch() {
        let mut fx = fixture();
        let cond = instance_of(&mut fx, "String", true);

        let facts = facts_of(&fx, cond);
        assert!(facts.when_true.is_empty());
        assert_eq!(facts.when_false.len(), 1);
    }

    #[test]
    fn not_swaps_branches() {
        let mut fx = fixture();
        let inner = instance_of(&mut fx, "String", false);
        let cond = fx.body.alloc_expr(Expr::Unary {
            op: UnaryOp::Not,
            expr: inner,
            span: span(),
        });

        let facts = facts_of(&fx, cond);
        assert!(facts.when_true.is_empty());
        assert_eq!(facts.when_false.len(), 1);
    }

    #[test]
    fn conjunction_keeps_true_facts_drops_false() {
        let mut fx = fixture();
        let lhs = instance_of(&mut fx, "String", false);
        let rhs = instance_of(&mut fx, "Comparable", false);
        let cond = fx.body.alloc_expr(Expr::Binary {
            op: BinaryOp::And,
            lhs,
            rhs,
            span: span(),
        });

        let facts = facts_of(&fx, cond);
        assert_eq!(facts.when_true.len(), 2);
        assert!(facts.when_false.is_empty());
    }

    #[test]
    fn disjunction_keeps_false_facts_drops_true() {
        let mut fx = fixture();
        let lhs = instance_of(&mut fx, "String", true);
        let rhs = instance_of(&mut fx, "Comparable", true);
        let cond = fx.body.alloc_expr(Expr::Binary {
            op: BinaryOp::Or,
            lhs,
            rhs,
            span: span(),
        });

        let facts = facts_of(&fx, cond);
        assert!(facts.when_true.is_empty());
        assert_eq!(facts.when_false.len(), 2);
    }

    #[test]
    fn merge_joins_common_narrowings_and_drops_one_sided_ones() {
        let fx = fixture();
        let string = Type::class(fx.env.well_known().string, vec![]);
        let number = Type::class(fx.env.well_known().number, vec![]);
        let other_key = BindingKey::Dynamic("y".into());

        let mut left = NarrowingState::new();
        left.narrow(&fx.env, fx.key.clone(), string.clone());
        left.narrow(&fx.env, other_key.clone(), string.clone());

        let mut right = NarrowingState::new();
        right.narrow(&fx.env, fx.key.clone(), number.clone());

        left.merge(&fx.env, &right);
        // Joined across both paths; unrelated types union.
        assert_eq!(left.get(&fx.key), Some(&Type::union(vec![string, number])));
        // Narrowed on one path only: gone.
        assert_eq!(left.get(&other_key), None);
    }

    #[test]
    fn reassignment_invalidates_narrowing() {
        let fx = fixture();
        let string = Type::class(fx.env.well_known().string, vec![]);

        let mut state = NarrowingState::new();
        state.narrow(&fx.env, fx.key.clone(), string);
        state.invalidate(&fx.key);
        assert_eq!(state.get(&fx.key), None);
    }

    #[test]
    fn successive_checks_intersect() {
        let fx = fixture();
        let comparable = Type::class(fx.env.well_known().comparable, vec![]);
        let iterable = Type::class(fx.env.well_known().iterable, vec![]);

        let mut state = NarrowingState::new();
        state.narrow(&fx.env, fx.key.clone(), comparable.clone());
        state.narrow(&fx.env, fx.key.clone(), iterable.clone());
        assert_eq!(
            state.get(&fx.key),
            Some(&Type::Intersection(vec![comparable, iterable]))
        );
    }

    #[test]
    fn early_exit_detection() {
        let mut body = Body::empty(span());
        let ret = body.alloc_stmt(Stmt::Return {
            expr: None,
            span: span(),
        });
        let empty = body.alloc_stmt(Stmt::Empty { span: span() });
        let both = body.alloc_stmt(Stmt::Block {
            statements: vec![empty, ret],
            span: span(),
        });
        assert!(always_exits(&body, ret));
        assert!(always_exits(&body, both));
        assert!(!always_exits(&body, empty));
    }
}
