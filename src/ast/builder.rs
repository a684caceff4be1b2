//! Programmatic tree construction
//!
//! Front ends and tests build trees through `AstBuilder`, which hands out
//! unique node ids. Methods take `&self` so calls nest naturally.

use super::*;
use std::cell::Cell;

#[derive(Debug, Default)]
pub struct AstBuilder {
    next_id: Cell<u32>,
    line: Cell<u32>,
}

impl AstBuilder {
    pub fn new() -> Self {
        Self { next_id: Cell::new(1), line: Cell::new(1) }
    }

    /// Set the line recorded on subsequently built nodes
    pub fn line(&self, line: u32) -> &Self {
        self.line.set(line);
        self
    }

    pub fn next_id(&self) -> NodeId {
        let id = self.next_id.get();
        self.next_id.set(id + 1);
        NodeId(id)
    }

    fn span(&self) -> Span {
        Span { line: self.line.get(), col: 0 }
    }

    pub fn expr(&self, kind: ExprKind) -> Expr {
        Expr { id: self.next_id(), span: self.span(), kind }
    }

    pub fn stmt(&self, kind: StmtKind) -> Stmt {
        Stmt { id: self.next_id(), span: self.span(), kind }
    }

    // Expressions

    pub fn null(&self) -> Expr {
        self.expr(ExprKind::Literal(Literal::Null))
    }

    pub fn bool(&self, b: bool) -> Expr {
        self.expr(ExprKind::Literal(Literal::Bool(b)))
    }

    pub fn int(&self, n: i64) -> Expr {
        self.expr(ExprKind::Literal(Literal::Int(n)))
    }

    pub fn float(&self, f: f64) -> Expr {
        self.expr(ExprKind::Literal(Literal::Float(f)))
    }

    pub fn string(&self, s: &str) -> Expr {
        self.expr(ExprKind::Literal(Literal::String(Arc::from(s))))
    }

    pub fn var(&self, name: &str) -> Expr {
        self.expr(ExprKind::Variable(Arc::from(name)))
    }

    pub fn this(&self) -> Expr {
        self.var("this")
    }

    /// `[k => v, ...]`; a `None` key is an implicit index
    pub fn array(&self, items: Vec<(Option<Expr>, Expr)>) -> Expr {
        let items = items
            .into_iter()
            .map(|(key, value)| ArrayItem { key, value, by_ref: false, unpack: false })
            .collect();
        self.expr(ExprKind::Array(items))
    }

    /// `[v1, v2, ...]`
    pub fn list_literal(&self, values: Vec<Expr>) -> Expr {
        self.array(values.into_iter().map(|v| (None, v)).collect())
    }

    pub fn assign(&self, target: Expr, value: Expr) -> Expr {
        self.expr(ExprKind::Assign { target: Box::new(target), value: Box::new(value) })
    }

    pub fn assign_ref(&self, target: Expr, value: Expr) -> Expr {
        self.expr(ExprKind::AssignRef { target: Box::new(target), value: Box::new(value) })
    }

    pub fn assign_op(&self, op: BinaryOp, target: Expr, value: Expr) -> Expr {
        self.expr(ExprKind::AssignOp { op, target: Box::new(target), value: Box::new(value) })
    }

    /// `$x++`
    pub fn post_inc(&self, target: Expr) -> Expr {
        self.expr(ExprKind::IncDec { target: Box::new(target), increment: true, prefix: false })
    }

    pub fn binary(&self, op: BinaryOp, left: Expr, right: Expr) -> Expr {
        self.expr(ExprKind::Binary { op, left: Box::new(left), right: Box::new(right) })
    }

    pub fn identical(&self, left: Expr, right: Expr) -> Expr {
        self.binary(BinaryOp::Identical, left, right)
    }

    pub fn not_identical(&self, left: Expr, right: Expr) -> Expr {
        self.binary(BinaryOp::NotIdentical, left, right)
    }

    pub fn equal(&self, left: Expr, right: Expr) -> Expr {
        self.binary(BinaryOp::Equal, left, right)
    }

    pub fn and(&self, left: Expr, right: Expr) -> Expr {
        self.binary(BinaryOp::BoolAnd, left, right)
    }

    pub fn or(&self, left: Expr, right: Expr) -> Expr {
        self.binary(BinaryOp::BoolOr, left, right)
    }

    pub fn not(&self, operand: Expr) -> Expr {
        self.expr(ExprKind::Unary { op: UnaryOp::Not, operand: Box::new(operand) })
    }

    pub fn coalesce(&self, left: Expr, right: Expr) -> Expr {
        self.expr(ExprKind::Coalesce { left: Box::new(left), right: Box::new(right) })
    }

    pub fn ternary(&self, cond: Expr, then: Expr, otherwise: Expr) -> Expr {
        self.expr(ExprKind::Ternary {
            cond: Box::new(cond),
            then: Some(Box::new(then)),
            otherwise: Box::new(otherwise),
        })
    }

    pub fn short_ternary(&self, cond: Expr, otherwise: Expr) -> Expr {
        self.expr(ExprKind::Ternary { cond: Box::new(cond), then: None, otherwise: Box::new(otherwise) })
    }

    pub fn isset(&self, exprs: Vec<Expr>) -> Expr {
        self.expr(ExprKind::Isset(exprs))
    }

    pub fn empty(&self, expr: Expr) -> Expr {
        self.expr(ExprKind::Empty(Box::new(expr)))
    }

    pub fn instanceof(&self, expr: Expr, class: &str) -> Expr {
        self.expr(ExprKind::Instanceof { expr: Box::new(expr), class: ClassRef::Named(Fqsen::new(class)) })
    }

    fn args(values: Vec<Expr>) -> Vec<Arg> {
        values.into_iter().map(|value| Arg { value, unpack: false }).collect()
    }

    pub fn call(&self, name: &str, args: Vec<Expr>) -> Expr {
        self.expr(ExprKind::Call { callee: Callee::Name(Fqsen::new(name)), args: Self::args(args) })
    }

    pub fn call_expr(&self, callee: Expr, args: Vec<Expr>) -> Expr {
        self.expr(ExprKind::Call { callee: Callee::Expr(Box::new(callee)), args: Self::args(args) })
    }

    pub fn method_call(&self, object: Expr, method: &str, args: Vec<Expr>) -> Expr {
        self.expr(ExprKind::MethodCall {
            object: Box::new(object),
            method: Arc::from(method),
            args: Self::args(args),
            nullsafe: false,
        })
    }

    pub fn static_call(&self, class: ClassRef, method: &str, args: Vec<Expr>) -> Expr {
        self.expr(ExprKind::StaticCall { class, method: Arc::from(method), args: Self::args(args) })
    }

    pub fn new_object(&self, class: &str, args: Vec<Expr>) -> Expr {
        self.new_ref(ClassRef::Named(Fqsen::new(class)), args)
    }

    pub fn new_ref(&self, class: ClassRef, args: Vec<Expr>) -> Expr {
        self.expr(ExprKind::New { class, args: Self::args(args) })
    }

    pub fn prop(&self, object: Expr, property: &str) -> Expr {
        self.expr(ExprKind::PropertyFetch { object: Box::new(object), property: Arc::from(property), nullsafe: false })
    }

    pub fn static_prop(&self, class: ClassRef, property: &str) -> Expr {
        self.expr(ExprKind::StaticPropertyFetch { class, property: Arc::from(property) })
    }

    pub fn dim(&self, base: Expr, key: Expr) -> Expr {
        self.expr(ExprKind::ArrayDim { base: Box::new(base), dim: Some(Box::new(key)) })
    }

    /// `$base[]`
    pub fn append(&self, base: Expr) -> Expr {
        self.expr(ExprKind::ArrayDim { base: Box::new(base), dim: None })
    }

    pub fn class_name(&self, class: ClassRef) -> Expr {
        self.expr(ExprKind::ClassName(class))
    }

    pub fn cast(&self, kind: CastKind, expr: Expr) -> Expr {
        self.expr(ExprKind::Cast { kind, expr: Box::new(expr) })
    }

    pub fn closure(&self, params: Vec<ParamDecl>, uses: Vec<ClosureUse>, body: Vec<Stmt>) -> Expr {
        self.expr(ExprKind::Closure(Box::new(ClosureExpr {
            params,
            uses,
            return_type: None,
            body: ClosureBody::Block(body),
            is_static: false,
        })))
    }

    pub fn arrow_fn(&self, params: Vec<ParamDecl>, body: Expr) -> Expr {
        self.expr(ExprKind::Closure(Box::new(ClosureExpr {
            params,
            uses: Vec::new(),
            return_type: None,
            body: ClosureBody::Arrow(Box::new(body)),
            is_static: false,
        })))
    }

    pub fn use_var(&self, name: &str, by_ref: bool) -> ClosureUse {
        ClosureUse { name: Arc::from(name), by_ref }
    }

    pub fn match_expr(&self, subject: Expr, arms: Vec<MatchArm>) -> Expr {
        self.expr(ExprKind::Match { subject: Box::new(subject), arms })
    }

    pub fn match_arm(&self, conditions: Option<Vec<Expr>>, body: Expr) -> MatchArm {
        MatchArm { conditions, body }
    }

    /// `[$a, $b] = ...` target
    pub fn list(&self, targets: Vec<Expr>) -> Expr {
        self.expr(ExprKind::List(targets.into_iter().map(|target| Some(ListItem { key: None, target })).collect()))
    }

    pub fn exit(&self) -> Expr {
        self.expr(ExprKind::Exit(None))
    }

    pub fn throw_expr(&self, value: Expr) -> Expr {
        self.expr(ExprKind::Throw(Box::new(value)))
    }

    // Statements

    pub fn expr_stmt(&self, expr: Expr) -> Stmt {
        self.stmt(StmtKind::Expr(expr))
    }

    pub fn echo(&self, exprs: Vec<Expr>) -> Stmt {
        self.stmt(StmtKind::Echo(exprs))
    }

    pub fn block(&self, body: Vec<Stmt>) -> Stmt {
        self.stmt(StmtKind::Block(body))
    }

    pub fn if_then(&self, cond: Expr, then: Vec<Stmt>) -> Stmt {
        self.if_full(cond, then, Vec::new(), None)
    }

    pub fn if_else(&self, cond: Expr, then: Vec<Stmt>, otherwise: Vec<Stmt>) -> Stmt {
        self.if_full(cond, then, Vec::new(), Some(otherwise))
    }

    pub fn if_full(&self, cond: Expr, then: Vec<Stmt>, elseifs: Vec<ElseIf>, otherwise: Option<Vec<Stmt>>) -> Stmt {
        self.stmt(StmtKind::If { cond, then, elseifs, otherwise })
    }

    pub fn elseif(&self, cond: Expr, body: Vec<Stmt>) -> ElseIf {
        ElseIf { cond, body }
    }

    pub fn while_loop(&self, cond: Expr, body: Vec<Stmt>) -> Stmt {
        self.stmt(StmtKind::While { cond, body })
    }

    pub fn do_while(&self, body: Vec<Stmt>, cond: Expr) -> Stmt {
        self.stmt(StmtKind::DoWhile { body, cond })
    }

    pub fn for_loop(&self, init: Vec<Expr>, cond: Vec<Expr>, step: Vec<Expr>, body: Vec<Stmt>) -> Stmt {
        self.stmt(StmtKind::For { init, cond, step, body })
    }

    pub fn foreach(&self, subject: Expr, key: Option<Expr>, value: Expr, body: Vec<Stmt>) -> Stmt {
        self.stmt(StmtKind::Foreach { subject, key, value, by_ref: false, body })
    }

    pub fn switch(&self, subject: Expr, cases: Vec<SwitchCase>) -> Stmt {
        self.stmt(StmtKind::Switch { subject, cases })
    }

    pub fn case(&self, test: Expr, body: Vec<Stmt>) -> SwitchCase {
        SwitchCase { test: Some(test), body }
    }

    pub fn default_case(&self, body: Vec<Stmt>) -> SwitchCase {
        SwitchCase { test: None, body }
    }

    pub fn try_catch(&self, body: Vec<Stmt>, catches: Vec<CatchClause>, finally: Option<Vec<Stmt>>) -> Stmt {
        self.stmt(StmtKind::Try { body, catches, finally })
    }

    pub fn catch(&self, types: &[&str], var: Option<&str>, body: Vec<Stmt>) -> CatchClause {
        CatchClause {
            types: types.iter().map(|t| Fqsen::new(t)).collect(),
            var: var.map(Arc::from),
            body,
        }
    }

    pub fn ret(&self, value: Option<Expr>) -> Stmt {
        self.stmt(StmtKind::Return(value))
    }

    pub fn ret_value(&self, value: Expr) -> Stmt {
        self.ret(Some(value))
    }

    pub fn throw(&self, value: Expr) -> Stmt {
        self.stmt(StmtKind::Throw(value))
    }

    pub fn break_loop(&self, depth: u32) -> Stmt {
        self.stmt(StmtKind::Break(depth))
    }

    pub fn continue_loop(&self, depth: u32) -> Stmt {
        self.stmt(StmtKind::Continue(depth))
    }

    pub fn global(&self, names: &[&str]) -> Stmt {
        self.stmt(StmtKind::Global(names.iter().map(|n| Arc::from(*n)).collect()))
    }

    pub fn static_var(&self, name: &str, default: Option<Expr>) -> Stmt {
        self.stmt(StmtKind::Static(vec![StaticVar { name: Arc::from(name), default }]))
    }

    pub fn unset(&self, exprs: Vec<Expr>) -> Stmt {
        self.stmt(StmtKind::Unset(exprs))
    }

    // Declarations

    pub fn param(&self, name: &str) -> ParamDecl {
        ParamDecl { name: Arc::from(name), ty: None, real_ty: None, default: None, by_ref: false, variadic: false }
    }

    /// Parameter with a signature type
    pub fn typed_param(&self, name: &str, ty: UnionType) -> ParamDecl {
        ParamDecl { ty: Some(ty.clone()), real_ty: Some(ty), ..self.param(name) }
    }

    /// Parameter typed only through an annotation
    pub fn doc_param(&self, name: &str, ty: UnionType) -> ParamDecl {
        ParamDecl { ty: Some(ty), ..self.param(name) }
    }

    pub fn function(&self, name: &str, params: Vec<ParamDecl>, body: Vec<Stmt>) -> FunctionLike {
        FunctionLike {
            fqsen: Fqsen::new(name),
            kind: FunctionKind::Function,
            params,
            return_type: None,
            real_return_type: None,
            body,
            class_context: None,
            is_static: false,
            template_params: Vec::new(),
            span: self.span(),
        }
    }

    pub fn method(&self, class: &str, name: &str, params: Vec<ParamDecl>, body: Vec<Stmt>) -> FunctionLike {
        let class = Fqsen::new(class);
        FunctionLike {
            fqsen: Fqsen::method(&class, name),
            kind: FunctionKind::Method,
            class_context: Some(ClassContext { class }),
            ..self.function(name, params, body)
        }
    }

    pub fn file_scope(&self, body: Vec<Stmt>) -> FunctionLike {
        FunctionLike { fqsen: Fqsen::new("{file}"), kind: FunctionKind::FileScope, ..self.function("{file}", Vec::new(), body) }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ids_are_unique() {
        let b = AstBuilder::new();
        let e = b.assign(b.var("a"), b.int(1));
        let s = b.expr_stmt(e.clone());
        match &e.kind {
            ExprKind::Assign { target, value } => {
                assert_ne!(target.id, value.id);
                assert_ne!(e.id, target.id);
            }
            _ => panic!("expected assignment"),
        }
        assert_ne!(s.id, e.id);
    }

    #[test]
    fn test_method_context() {
        let b = AstBuilder::new();
        let m = b.method("App\\Repo", "find", vec![], vec![]);
        assert_eq!(m.fqsen.as_str(), "\\App\\Repo::find");
        assert_eq!(m.class_context.map(|c| c.class), Some(Fqsen::new("App\\Repo")));
    }
}
