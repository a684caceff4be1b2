//! Resolved syntax tree consumed by the analyzer
//!
//! The tree arrives already parsed and name-resolved: class and function
//! names are [`Fqsen`]s and declared types are [`UnionType`]s. Every
//! expression and statement carries a [`NodeId`] used to key inferred
//! types and recorded scopes.

pub mod builder;

pub use builder::AstBuilder;

use crate::core::{Fqsen, TemplateRef, UnionType};
use serde::Serialize;
use std::fmt;
use std::sync::Arc;

pub type Name = Arc<str>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize)]
pub struct NodeId(pub u32);

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize)]
pub struct Span {
    pub line: u32,
    pub col: u32,
}

impl fmt::Display for Span {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.line, self.col)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Expr {
    pub id: NodeId,
    pub span: Span,
    pub kind: ExprKind,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Literal {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    String(Arc<str>),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOp {
    Add,
    Sub,
    Mul,
    Div,
    Mod,
    Pow,
    Concat,
    BitAnd,
    BitOr,
    BitXor,
    ShiftLeft,
    ShiftRight,
    BoolAnd,
    BoolOr,
    BoolXor,
    Identical,
    NotIdentical,
    Equal,
    NotEqual,
    Less,
    LessEq,
    Greater,
    GreaterEq,
    Spaceship,
}

impl BinaryOp {
    pub fn is_comparison(self) -> bool {
        matches!(
            self,
            BinaryOp::Identical
                | BinaryOp::NotIdentical
                | BinaryOp::Equal
                | BinaryOp::NotEqual
                | BinaryOp::Less
                | BinaryOp::LessEq
                | BinaryOp::Greater
                | BinaryOp::GreaterEq
        )
    }

    pub fn is_arithmetic(self) -> bool {
        matches!(
            self,
            BinaryOp::Add | BinaryOp::Sub | BinaryOp::Mul | BinaryOp::Div | BinaryOp::Mod | BinaryOp::Pow
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnaryOp {
    Not,
    Neg,
    Plus,
    BitNot,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CastKind {
    Int,
    Float,
    String,
    Bool,
    Array,
    Object,
}

/// Class reference in `new`, static calls, `instanceof` and `X::class`
#[derive(Debug, Clone, PartialEq)]
pub enum ClassRef {
    Named(Fqsen),
    SelfRef,
    StaticRef,
    ParentRef,
    Dynamic(Box<Expr>),
}

#[derive(Debug, Clone, PartialEq)]
pub enum Callee {
    Name(Fqsen),
    Expr(Box<Expr>),
}

#[derive(Debug, Clone, PartialEq)]
pub struct Arg {
    pub value: Expr,
    pub unpack: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ArrayItem {
    pub key: Option<Expr>,
    pub value: Expr,
    pub by_ref: bool,
    pub unpack: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ListItem {
    pub key: Option<Expr>,
    pub target: Expr,
}

#[derive(Debug, Clone, PartialEq)]
pub struct MatchArm {
    /// `None` for the `default` arm
    pub conditions: Option<Vec<Expr>>,
    pub body: Expr,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ClosureUse {
    pub name: Name,
    pub by_ref: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ClosureBody {
    Block(Vec<Stmt>),
    /// Arrow function: captures the enclosing scope by value
    Arrow(Box<Expr>),
}

#[derive(Debug, Clone, PartialEq)]
pub struct ClosureExpr {
    pub params: Vec<ParamDecl>,
    pub uses: Vec<ClosureUse>,
    pub return_type: Option<UnionType>,
    pub body: ClosureBody,
    pub is_static: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ExprKind {
    Literal(Literal),
    Array(Vec<ArrayItem>),
    Variable(Name),
    Assign { target: Box<Expr>, value: Box<Expr> },
    AssignRef { target: Box<Expr>, value: Box<Expr> },
    AssignOp { op: BinaryOp, target: Box<Expr>, value: Box<Expr> },
    IncDec { target: Box<Expr>, increment: bool, prefix: bool },
    Binary { op: BinaryOp, left: Box<Expr>, right: Box<Expr> },
    Unary { op: UnaryOp, operand: Box<Expr> },
    Coalesce { left: Box<Expr>, right: Box<Expr> },
    /// `then` is `None` for the short form `a ?: b`
    Ternary { cond: Box<Expr>, then: Option<Box<Expr>>, otherwise: Box<Expr> },
    Isset(Vec<Expr>),
    Empty(Box<Expr>),
    Instanceof { expr: Box<Expr>, class: ClassRef },
    Call { callee: Callee, args: Vec<Arg> },
    MethodCall { object: Box<Expr>, method: Name, args: Vec<Arg>, nullsafe: bool },
    StaticCall { class: ClassRef, method: Name, args: Vec<Arg> },
    New { class: ClassRef, args: Vec<Arg> },
    PropertyFetch { object: Box<Expr>, property: Name, nullsafe: bool },
    StaticPropertyFetch { class: ClassRef, property: Name },
    /// `dim` is `None` for the append form `$a[]`
    ArrayDim { base: Box<Expr>, dim: Option<Box<Expr>> },
    ClassName(ClassRef),
    Cast { kind: CastKind, expr: Box<Expr> },
    Closure(Box<ClosureExpr>),
    Match { subject: Box<Expr>, arms: Vec<MatchArm> },
    List(Vec<Option<ListItem>>),
    Exit(Option<Box<Expr>>),
    Throw(Box<Expr>),
}

impl Expr {
    /// Variable name if this is a plain `$name`
    pub fn as_variable(&self) -> Option<&Name> {
        match &self.kind {
            ExprKind::Variable(name) => Some(name),
            _ => None,
        }
    }

    pub fn as_literal(&self) -> Option<&Literal> {
        match &self.kind {
            ExprKind::Literal(lit) => Some(lit),
            _ => None,
        }
    }

    pub fn is_null_literal(&self) -> bool {
        matches!(self.kind, ExprKind::Literal(Literal::Null))
    }

    /// Expressions that end evaluation of the enclosing statement
    pub fn is_terminal(&self) -> bool {
        matches!(self.kind, ExprKind::Exit(_) | ExprKind::Throw(_))
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Stmt {
    pub id: NodeId,
    pub span: Span,
    pub kind: StmtKind,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ElseIf {
    pub cond: Expr,
    pub body: Vec<Stmt>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SwitchCase {
    /// `None` for `default:`
    pub test: Option<Expr>,
    pub body: Vec<Stmt>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct CatchClause {
    pub types: Vec<Fqsen>,
    pub var: Option<Name>,
    pub body: Vec<Stmt>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct StaticVar {
    pub name: Name,
    pub default: Option<Expr>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum StmtKind {
    Expr(Expr),
    Echo(Vec<Expr>),
    Block(Vec<Stmt>),
    If { cond: Expr, then: Vec<Stmt>, elseifs: Vec<ElseIf>, otherwise: Option<Vec<Stmt>> },
    While { cond: Expr, body: Vec<Stmt> },
    DoWhile { body: Vec<Stmt>, cond: Expr },
    For { init: Vec<Expr>, cond: Vec<Expr>, step: Vec<Expr>, body: Vec<Stmt> },
    Foreach { subject: Expr, key: Option<Expr>, value: Expr, by_ref: bool, body: Vec<Stmt> },
    Switch { subject: Expr, cases: Vec<SwitchCase> },
    Try { body: Vec<Stmt>, catches: Vec<CatchClause>, finally: Option<Vec<Stmt>> },
    Return(Option<Expr>),
    Throw(Expr),
    Break(u32),
    Continue(u32),
    Global(Vec<Name>),
    Static(Vec<StaticVar>),
    Unset(Vec<Expr>),
    Nop,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ParamDecl {
    pub name: Name,
    /// Type from annotations, falling back to the signature type
    pub ty: Option<UnionType>,
    /// Type enforced by the signature itself
    pub real_ty: Option<UnionType>,
    pub default: Option<Expr>,
    pub by_ref: bool,
    pub variadic: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FunctionKind {
    Function,
    Method,
    Closure,
    FileScope,
}

/// Class the unit is declared in, for `self`, `static`, `parent` and `$this`
#[derive(Debug, Clone, PartialEq)]
pub struct ClassContext {
    pub class: Fqsen,
}

/// One analyzable unit: a function, method, closure or file-scope block
#[derive(Debug, Clone, PartialEq)]
pub struct FunctionLike {
    pub fqsen: Fqsen,
    pub kind: FunctionKind,
    pub params: Vec<ParamDecl>,
    pub return_type: Option<UnionType>,
    pub real_return_type: Option<UnionType>,
    pub body: Vec<Stmt>,
    pub class_context: Option<ClassContext>,
    pub is_static: bool,
    pub template_params: Vec<TemplateRef>,
    pub span: Span,
}

impl FunctionLike {
    pub fn declared_return(&self) -> Option<&UnionType> {
        self.return_type.as_ref().or(self.real_return_type.as_ref())
    }
}
