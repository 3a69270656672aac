//! Arena-allocated syntax tree consumed by the inference engine.
//!
//! The engine never parses text: an [`AstRoot`] is handed over fully built by
//! the host's parser, with every node annotated with its source [`Span`].
//! Malformed source shows up as [`Expr::Missing`] nodes, which the driver
//! skips without aborting the pass.

mod ids;

use lilt_core::{Name, QualifiedName, Span};
use serde::{Deserialize, Serialize};

pub use ids::{BodyId, ClassDeclId, ExprId, FieldDeclId, LocalId, MethodDeclId, StmtId};

/// Typed index arena, one per node category.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Arena<T> {
    data: Vec<T>,
}

// Manual impl: the derive would demand `T: Default`.
impl<T> Default for Arena<T> {
    fn default() -> Self {
        Arena { data: Vec::new() }
    }
}

impl<T> Arena<T> {
    pub fn alloc(&mut self, value: T) -> u32 {
        let idx = self.data.len() as u32;
        self.data.push(value);
        idx
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.data.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (u32, &T)> {
        self.data.iter().enumerate().map(|(i, v)| (i as u32, v))
    }

    #[must_use]
    pub fn get(&self, idx: u32) -> Option<&T> {
        self.data.get(idx as usize)
    }
}

macro_rules! arena_index {
    ($id:ty) => {
        impl<T> std::ops::Index<$id> for Arena<T> {
            type Output = T;

            fn index(&self, index: $id) -> &T {
                &self.data[index.idx()]
            }
        }
    };
}

arena_index!(ExprId);
arena_index!(StmtId);
arena_index!(LocalId);
arena_index!(ClassDeclId);
arena_index!(MethodDeclId);
arena_index!(FieldDeclId);
arena_index!(BodyId);

/// A source-level type reference, resolved against the symbol universe later.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TypeRef {
    pub name: QualifiedName,
    pub args: Vec<TypeRef>,
    pub dims: u8,
    pub span: Span,
}

impl TypeRef {
    #[must_use]
    pub fn named(name: impl Into<QualifiedName>) -> Self {
        TypeRef {
            name: name.into(),
            args: Vec::new(),
            dims: 0,
            span: Span::default(),
        }
    }

    #[must_use]
    pub fn with_args(name: impl Into<QualifiedName>, args: Vec<TypeRef>) -> Self {
        TypeRef {
            name: name.into(),
            args,
            dims: 0,
            span: Span::default(),
        }
    }
}

/// Order in which a closure consults its scope slots for unqualified names.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum ResolveStrategy {
    #[default]
    OwnerFirst,
    DelegateFirst,
    OwnerOnly,
    DelegateOnly,
    SelfOnly,
}

/// How a call-site contract seeds a closure parameter's type.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ParamHint {
    /// An explicit type supplied by the host.
    Type(TypeRef),
    /// The static type of the call receiver.
    Receiver,
    /// The first generic type argument of the call receiver (e.g. the element
    /// type of a `List<E>` receiver).
    ReceiverElement,
}

/// What a call-site contract names as the closure's delegate.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum DelegateHint {
    /// The call receiver becomes the delegate (`with`-style APIs).
    Receiver,
    /// An explicit delegate type.
    Type(TypeRef),
}

/// Collaborator-supplied annotation describing how an API treats a closure
/// argument: expected parameter types and/or a delegation target.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct CallContract {
    pub param_hints: Vec<ParamHint>,
    pub delegate: Option<DelegateHint>,
    pub strategy: Option<ResolveStrategy>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum LiteralKind {
    Int,
    Float,
    Bool,
    Str,
    /// Interpolated string literal.
    GStr,
    Null,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BinaryOp {
    Add,
    Sub,
    Mul,
    Div,
    Rem,
    /// `<=>`
    Compare,
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
    And,
    Or,
    Assign,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum UnaryOp {
    Not,
    Neg,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClosureParam {
    pub name: Name,
    pub ty: Option<TypeRef>,
    pub span: Span,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Expr {
    Name {
        name: Name,
        span: Span,
    },
    Literal {
        kind: LiteralKind,
        value: String,
        span: Span,
    },
    /// `recv.name`, `recv?.name`, `recv*.name` or `recv.@name`.
    Property {
        receiver: ExprId,
        name: Name,
        name_span: Span,
        /// `.@` direct field access: accessor methods are not considered.
        attribute: bool,
        safe: bool,
        spread: bool,
        span: Span,
    },
    Call {
        /// `None` for unqualified calls (implicit receiver).
        receiver: Option<ExprId>,
        name: Name,
        name_span: Span,
        args: Vec<ExprId>,
        safe: bool,
        contract: Option<CallContract>,
        span: Span,
    },
    ConstructorCall {
        ty: TypeRef,
        args: Vec<ExprId>,
        span: Span,
    },
    Closure {
        params: Vec<ClosureParam>,
        body: StmtId,
        span: Span,
    },
    /// `recv.&name`.
    MethodPointer {
        receiver: ExprId,
        name: Name,
        span: Span,
    },
    Binary {
        op: BinaryOp,
        lhs: ExprId,
        rhs: ExprId,
        span: Span,
    },
    Unary {
        op: UnaryOp,
        expr: ExprId,
        span: Span,
    },
    InstanceOf {
        expr: ExprId,
        ty: TypeRef,
        negated: bool,
        span: Span,
    },
    Ternary {
        cond: ExprId,
        then_expr: ExprId,
        else_expr: ExprId,
        span: Span,
    },
    /// `lhs ?: rhs`.
    Elvis {
        lhs: ExprId,
        rhs: ExprId,
        span: Span,
    },
    Cast {
        ty: TypeRef,
        expr: ExprId,
        span: Span,
    },
    ListLiteral {
        elements: Vec<ExprId>,
        span: Span,
    },
    MapLiteral {
        entries: Vec<(ExprId, ExprId)>,
        span: Span,
    },
    Range {
        from: ExprId,
        to: ExprId,
        span: Span,
    },
    /// Placeholder for unparseable source; skipped by the driver.
    Missing {
        span: Span,
    },
}

impl Expr {
    #[must_use]
    pub fn span(&self) -> Span {
        match self {
            Expr::Name { span, .. }
            | Expr::Literal { span, .. }
            | Expr::Property { span, .. }
            | Expr::Call { span, .. }
            | Expr::ConstructorCall { span, .. }
            | Expr::Closure { span, .. }
            | Expr::MethodPointer { span, .. }
            | Expr::Binary { span, .. }
            | Expr::Unary { span, .. }
            | Expr::InstanceOf { span, .. }
            | Expr::Ternary { span, .. }
            | Expr::Elvis { span, .. }
            | Expr::Cast { span, .. }
            | Expr::ListLiteral { span, .. }
            | Expr::MapLiteral { span, .. }
            | Expr::Range { span, .. }
            | Expr::Missing { span } => *span,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Local {
    pub name: Name,
    pub ty: Option<TypeRef>,
    pub name_span: Span,
    pub span: Span,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SwitchArm {
    /// `case T:` type label, narrowing the subject within the arm.
    pub ty: Option<TypeRef>,
    /// `case expr:` value label.
    pub value: Option<ExprId>,
    pub body: StmtId,
    pub span: Span,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CatchClause {
    /// Multi-catch lists more than one type; the binding gets their union.
    pub types: Vec<TypeRef>,
    pub local: LocalId,
    pub body: StmtId,
    pub span: Span,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Stmt {
    Block {
        statements: Vec<StmtId>,
        span: Span,
    },
    Let {
        local: LocalId,
        initializer: Option<ExprId>,
        span: Span,
    },
    Expr {
        expr: ExprId,
        span: Span,
    },
    If {
        cond: ExprId,
        then_branch: StmtId,
        else_branch: Option<StmtId>,
        span: Span,
    },
    While {
        cond: ExprId,
        body: StmtId,
        span: Span,
    },
    For {
        local: LocalId,
        iterable: ExprId,
        body: StmtId,
        span: Span,
    },
    Switch {
        subject: ExprId,
        arms: Vec<SwitchArm>,
        default: Option<StmtId>,
        span: Span,
    },
    Try {
        body: StmtId,
        catches: Vec<CatchClause>,
        finally: Option<StmtId>,
        span: Span,
    },
    Return {
        expr: Option<ExprId>,
        span: Span,
    },
    Throw {
        expr: ExprId,
        span: Span,
    },
    Break {
        span: Span,
    },
    Continue {
        span: Span,
    },
    Empty {
        span: Span,
    },
}

impl Stmt {
    #[must_use]
    pub fn span(&self) -> Span {
        match self {
            Stmt::Block { span, .. }
            | Stmt::Let { span, .. }
            | Stmt::Expr { span, .. }
            | Stmt::If { span, .. }
            | Stmt::While { span, .. }
            | Stmt::For { span, .. }
            | Stmt::Switch { span, .. }
            | Stmt::Try { span, .. }
            | Stmt::Return { span, .. }
            | Stmt::Throw { span, .. }
            | Stmt::Break { span }
            | Stmt::Continue { span }
            | Stmt::Empty { span } => *span,
        }
    }
}

/// A method or initializer body with its private statement/expression arenas.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Body {
    pub root: StmtId,
    pub stmts: Arena<Stmt>,
    pub exprs: Arena<Expr>,
    pub locals: Arena<Local>,
}

impl Body {
    /// An empty block body.
    #[must_use]
    pub fn empty(span: Span) -> Self {
        let mut stmts = Arena::default();
        let root = StmtId::from_raw(stmts.alloc(Stmt::Block {
            statements: Vec::new(),
            span,
        }));
        Body {
            root,
            stmts,
            exprs: Arena::default(),
            locals: Arena::default(),
        }
    }

    pub fn alloc_expr(&mut self, expr: Expr) -> ExprId {
        ExprId::from_raw(self.exprs.alloc(expr))
    }

    pub fn alloc_stmt(&mut self, stmt: Stmt) -> StmtId {
        StmtId::from_raw(self.stmts.alloc(stmt))
    }

    pub fn alloc_local(&mut self, local: Local) -> LocalId {
        LocalId::from_raw(self.locals.alloc(local))
    }

    #[must_use]
    pub fn expr(&self, id: ExprId) -> &Expr {
        &self.exprs[id]
    }

    #[must_use]
    pub fn stmt(&self, id: StmtId) -> &Stmt {
        &self.stmts[id]
    }

    #[must_use]
    pub fn local(&self, id: LocalId) -> &Local {
        &self.locals[id]
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Param {
    pub name: Name,
    pub ty: Option<TypeRef>,
    pub name_span: Span,
    pub span: Span,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MethodDecl {
    pub name: Name,
    pub name_span: Span,
    pub is_static: bool,
    pub params: Vec<Param>,
    pub return_ty: Option<TypeRef>,
    pub body: Option<BodyId>,
    pub span: Span,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldDecl {
    pub name: Name,
    pub name_span: Span,
    pub is_static: bool,
    pub ty: Option<TypeRef>,
    /// Initializer expression wrapped in a body of its own.
    pub initializer: Option<BodyId>,
    pub span: Span,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClassDecl {
    pub name: Name,
    pub name_span: Span,
    /// Binary name of this declaration in the symbol universe.
    pub qualified: QualifiedName,
    pub methods: Vec<MethodDeclId>,
    pub fields: Vec<FieldDeclId>,
    pub span: Span,
}

/// A fully parsed source unit.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct AstRoot {
    pub classes: Vec<ClassDeclId>,
    /// Top-level script statements, if the unit is a script.
    pub script: Option<BodyId>,
    class_decls: Arena<ClassDecl>,
    method_decls: Arena<MethodDecl>,
    field_decls: Arena<FieldDecl>,
    bodies: Arena<Body>,
}

impl AstRoot {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn alloc_class(&mut self, class: ClassDecl) -> ClassDeclId {
        let id = ClassDeclId::from_raw(self.class_decls.alloc(class));
        self.classes.push(id);
        id
    }

    pub fn alloc_method(&mut self, method: MethodDecl) -> MethodDeclId {
        MethodDeclId::from_raw(self.method_decls.alloc(method))
    }

    pub fn alloc_field(&mut self, field: FieldDecl) -> FieldDeclId {
        FieldDeclId::from_raw(self.field_decls.alloc(field))
    }

    pub fn alloc_body(&mut self, body: Body) -> BodyId {
        BodyId::from_raw(self.bodies.alloc(body))
    }

    #[must_use]
    pub fn class(&self, id: ClassDeclId) -> &ClassDecl {
        &self.class_decls[id]
    }

    #[must_use]
    pub fn method(&self, id: MethodDeclId) -> &MethodDecl {
        &self.method_decls[id]
    }

    #[must_use]
    pub fn field(&self, id: FieldDeclId) -> &FieldDecl {
        &self.field_decls[id]
    }

    #[must_use]
    pub fn body(&self, id: BodyId) -> &Body {
        &self.bodies[id]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_body_roots_an_empty_block() {
        let body = Body::empty(Span::new(0, 4));
        assert!(matches!(
            body.stmt(body.root),
            Stmt::Block { statements, .. } if statements.is_empty()
        ));
        assert!(body.exprs.is_empty());
        assert!(body.locals.is_empty());
    }

    #[test]
    fn fresh_root_holds_no_declarations() {
        let ast = AstRoot::new();
        assert!(ast.classes.is_empty());
        assert_eq!(ast.script, None);
    }
}
