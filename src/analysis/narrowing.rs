//! Condition narrowing
//!
//! [`FunctionAnalyzer::narrow`] splits a scope into the scope where a
//! condition holds and the scope where it does not. Narrowing targets are
//! plain variables and properties of plain variables. Both channels of a
//! [`FlowType`] are narrowed; the real channel falls back to unknown when
//! narrowing it would leave nothing.

use super::context::FunctionAnalyzer;
use crate::ast::{Arg, BinaryOp, Callee, ClassRef, Expr, ExprKind, Literal, UnaryOp};
use crate::core::cast::{exclude, intersect};
use crate::core::{
    ArrayKey, CallableType, ClassGraph, FlowType, Fqsen, LiteralValue, ScalarKind, ShapeField, TypeAtom, TypeLimits,
    UnionType,
};
use crate::errors::DiagnosticKind;
use crate::scope::{ScopeKey, ScopeSnapshot};
use crate::symbols::builtins;

/// Scope where the condition is true, scope where it is false
pub(crate) type Branches = (ScopeSnapshot, ScopeSnapshot);

struct Equality {
    current: UnionType,
    equal: UnionType,
    unequal: UnionType,
    branches: Branches,
}

impl<'a> FunctionAnalyzer<'a> {
    pub(crate) fn narrow(&mut self, cond: &Expr, scope: ScopeSnapshot) -> Branches {
        if scope.is_unreachable() || self.is_aborted() {
            return (scope.clone(), scope);
        }
        let limits = self.limits;
        match &cond.kind {
            ExprKind::Unary { op: UnaryOp::Not, operand } => {
                let (t, f) = self.narrow(operand, scope);
                self.record_type(cond.id, &UnionType::bool());
                (f, t)
            }
            ExprKind::Binary { op: BinaryOp::BoolAnd, left, right } => {
                let (lt, lf) = self.narrow(left, scope);
                let (rt, rf) = self.narrow(right, lt);
                self.record_type(cond.id, &UnionType::bool());
                (rt, ScopeSnapshot::merge_all(&[lf, rf], limits))
            }
            ExprKind::Binary { op: BinaryOp::BoolOr, left, right } => {
                let (lt, lf) = self.narrow(left, scope);
                let (rt, rf) = self.narrow(right, lf);
                self.record_type(cond.id, &UnionType::bool());
                (ScopeSnapshot::merge_all(&[lt, rt], limits), rf)
            }
            ExprKind::Literal(Literal::Bool(value)) => {
                self.record_type(cond.id, &UnionType::literal_bool(*value));
                if *value {
                    (scope.clone(), scope.mark_unreachable())
                } else {
                    (scope.mark_unreachable(), scope)
                }
            }
            _ => {
                let (ty, scope) = self.eval(cond, scope);
                if scope.is_unreachable() {
                    return (scope.clone(), scope);
                }
                let (t, f) = self.narrow_evaluated(cond, scope);
                let t = if ty.ty.can_be_truthy() { t } else { t.mark_unreachable() };
                let f = if ty.ty.can_be_falsey() { f } else { f.mark_unreachable() };
                (t, f)
            }
        }
    }

    /// Narrow on an already evaluated condition
    fn narrow_evaluated(&mut self, cond: &Expr, scope: ScopeSnapshot) -> Branches {
        match &cond.kind {
            ExprKind::Variable(_) | ExprKind::PropertyFetch { .. } => self.narrow_truthiness(cond, scope),
            ExprKind::Assign { target, .. } => self.narrow_truthiness(target, scope),
            ExprKind::Call { callee: Callee::Name(name), args } => self.narrow_call(cond, name, args, scope),
            ExprKind::Instanceof { expr, class } => self.narrow_instanceof(cond, expr, class, scope),
            ExprKind::Binary { op, left, right } => self.narrow_comparison(cond, *op, left, right, scope),
            ExprKind::Isset(items) => match items.as_slice() {
                [single] => self.narrow_isset(single, scope),
                _ => {
                    let mut t = scope.clone();
                    for item in items {
                        t = self.narrow_isset(item, t).0;
                    }
                    (t, scope)
                }
            },
            ExprKind::Empty(inner) => self.narrow_empty(inner, scope),
            _ => (scope.clone(), scope),
        }
    }

    /// Narrowing key and current type of an expression
    fn target(&self, expr: &Expr, scope: &ScopeSnapshot) -> Option<(ScopeKey, FlowType)> {
        let key = target_key(expr)?;
        let ty = match scope.entry_for(&key) {
            Some(entry) => entry.ty.clone(),
            None => match &key {
                ScopeKey::Property(..) => FlowType::declared(self.node_types.get(&expr.id)?.clone()),
                ScopeKey::Var(_) => return None,
            },
        };
        Some((key, ty))
    }

    /// Scope with `key` narrowed to `ty`; nothing left means unreachable
    fn refine(&self, scope: &ScopeSnapshot, key: &ScopeKey, ty: FlowType) -> ScopeSnapshot {
        if ty.ty.is_empty() {
            return scope.mark_unreachable();
        }
        let ty = if ty.real.is_empty() { FlowType::declared(ty.ty) } else { ty };
        scope.with_narrowed(key, ty)
    }

    fn narrow_truthiness(&mut self, expr: &Expr, scope: ScopeSnapshot) -> Branches {
        let Some((key, current)) = self.target(expr, &scope) else { return (scope.clone(), scope) };
        let t = current.map(UnionType::non_falsey);
        let f = current.map(UnionType::non_truthy);
        (self.refine(&scope, &key, t), self.refine(&scope, &key, f))
    }

    fn narrow_call(&mut self, cond: &Expr, name: &Fqsen, args: &[Arg], scope: ScopeSnapshot) -> Branches {
        let Some(first) = args.first().filter(|a| !a.unpack) else { return (scope.clone(), scope) };
        let short = name.short_name().to_ascii_lowercase();
        if args.len() == 1 && builtins::is_type_predicate(&Fqsen::new(&short)) {
            return self.narrow_predicate(cond, &short, &first.value, scope);
        }
        match short.as_str() {
            "array_key_exists" | "key_exists" if args.len() == 2 => {
                let key = self.node_types.get(&args[0].value.id).and_then(|t| t.literal_value()).map(LiteralValue::as_array_key);
                match key {
                    Some(key) => self.narrow_key_present(&args[1].value, &key, false, scope),
                    None => (scope.clone(), scope),
                }
            }
            "count" | "sizeof" => self.narrow_count(&first.value, scope),
            _ => (scope.clone(), scope),
        }
    }

    fn narrow_predicate(&mut self, cond: &Expr, name: &str, subject: &Expr, scope: ScopeSnapshot) -> Branches {
        let Some((key, current)) = self.target(subject, &scope) else { return (scope.clone(), scope) };
        let (t_ty, f_ty) = self.apply_predicate(name, &current.ty);
        let (t_real, f_real) = self.apply_predicate(name, &current.real);
        self.judge(cond, subject, &current.ty, &t_ty, &f_ty, format!("{}()", name));
        (
            self.refine(&scope, &key, FlowType::new(t_ty, t_real)),
            self.refine(&scope, &key, FlowType::new(f_ty, f_real)),
        )
    }

    /// Values of `ty` passing and failing an `is_*` predicate
    pub(crate) fn apply_predicate(&self, name: &str, ty: &UnionType) -> (UnionType, UnionType) {
        let graph = self.graph();
        let limits = self.limits;
        match name {
            "is_numeric" => (numeric_part(ty, limits), non_numeric_part(ty, limits)),
            "is_callable" => (callable_part(ty, limits), non_callable_part(ty, limits)),
            _ => match predicate_target(name) {
                Some(target) => (intersect(ty, &target, graph, limits), exclude(ty, &target, graph)),
                None => (ty.clone(), ty.clone()),
            },
        }
    }

    fn narrow_instanceof(&mut self, cond: &Expr, subject: &Expr, class: &ClassRef, scope: ScopeSnapshot) -> Branches {
        let class_name = match class {
            ClassRef::Named(name) => Some(name.clone()),
            ClassRef::SelfRef | ClassRef::StaticRef => self.class.clone(),
            ClassRef::ParentRef => self.class.as_ref().and_then(|c| self.hierarchy().parent_of(c)),
            ClassRef::Dynamic(_) => None,
        };
        let Some(class_name) = class_name else { return (scope.clone(), scope) };
        let Some((key, current)) = self.target(subject, &scope) else { return (scope.clone(), scope) };

        let target = UnionType::instance(class_name.clone());
        if self.hierarchy().class(&class_name).is_none() {
            // nothing is known about an undeclared class
            return (self.refine(&scope, &key, FlowType::declared(target)), scope);
        }
        let graph = self.graph();
        let limits = self.limits;
        let t = FlowType::new(intersect(&current.ty, &target, graph, limits), intersect(&current.real, &target, graph, limits));
        let f = FlowType::new(exclude(&current.ty, &target, graph), exclude(&current.real, &target, graph));
        self.judge(cond, subject, &current.ty, &t.ty, &f.ty, format!("instanceof {}", class_name));
        (self.refine(&scope, &key, t), self.refine(&scope, &key, f))
    }

    fn narrow_comparison(&mut self, cond: &Expr, op: BinaryOp, left: &Expr, right: &Expr, scope: ScopeSnapshot) -> Branches {
        if let Some((subject, non_empty_when_true)) = self.count_comparison(op, left, right) {
            let (non_empty, empty) = self.narrow_count(subject, scope);
            return if non_empty_when_true { (non_empty, empty) } else { (empty, non_empty) };
        }
        let (loose, negated) = match op {
            BinaryOp::Identical => (false, false),
            BinaryOp::NotIdentical => (false, true),
            BinaryOp::Equal => (true, false),
            BinaryOp::NotEqual => (true, true),
            _ => return (scope.clone(), scope),
        };
        let (subject, value) = if target_key(left).is_some() {
            (left, right)
        } else if target_key(right).is_some() {
            (right, left)
        } else {
            return (scope.clone(), scope);
        };
        let value_ty = self.node_types.get(&value.id).cloned().unwrap_or_else(UnionType::mixed);
        let Some(eq) = self.equality(subject, &value_ty, &scope, loose) else { return (scope.clone(), scope) };

        let symbol = match op {
            BinaryOp::Identical => "===",
            BinaryOp::NotIdentical => "!==",
            BinaryOp::Equal => "==",
            _ => "!=",
        };
        let check = format!("{} {}", symbol, value_ty);
        let (t_ty, f_ty, (t, f)) = if negated {
            (eq.unequal, eq.equal, (eq.branches.1, eq.branches.0))
        } else {
            (eq.equal, eq.unequal, eq.branches)
        };
        self.judge(cond, subject, &eq.current, &t_ty, &f_ty, check);
        (t, f)
    }

    /// `count($x) > 0` and friends: the counted expression and whether the
    /// true branch means non-empty
    fn count_comparison<'e>(&self, op: BinaryOp, left: &'e Expr, right: &'e Expr) -> Option<(&'e Expr, bool)> {
        let (counted, bound, op) = match (count_argument(left), count_argument(right)) {
            (Some(counted), None) => (counted, right, op),
            (None, Some(counted)) => (counted, left, flip(op)),
            _ => return None,
        };
        let n = match bound.as_literal()? {
            Literal::Int(n) => *n,
            _ => return None,
        };
        let non_empty = match (op, n) {
            (BinaryOp::Greater, 0) | (BinaryOp::GreaterEq, 1) => true,
            (BinaryOp::NotIdentical | BinaryOp::NotEqual, 0) => true,
            (BinaryOp::Identical | BinaryOp::Equal, 0) | (BinaryOp::Less, 1) | (BinaryOp::LessEq, 0) => false,
            _ => return None,
        };
        Some((counted, non_empty))
    }

    /// Scope where the counted value is non-empty, scope where it is empty
    fn narrow_count(&mut self, subject: &Expr, scope: ScopeSnapshot) -> Branches {
        let Some((key, current)) = self.target(subject, &scope) else { return (scope.clone(), scope) };
        let limits = self.limits;
        let non_empty = current.map(|t| non_empty_part(t, limits));
        let empty = current.map(|t| empty_part(t, limits));
        (self.refine(&scope, &key, non_empty), self.refine(&scope, &key, empty))
    }

    /// Equality narrowing of `subject` against a value of type `value`,
    /// without judging the condition. Used by `switch` and `match`.
    pub(crate) fn narrow_identical(&mut self, subject: &Expr, value: &UnionType, scope: ScopeSnapshot, loose: bool) -> Branches {
        match self.equality(subject, value, &scope, loose) {
            Some(eq) => eq.branches,
            None => (scope.clone(), scope),
        }
    }

    fn equality(&mut self, subject: &Expr, value: &UnionType, scope: &ScopeSnapshot, loose: bool) -> Option<Equality> {
        let (key, current) = self.target(subject, scope)?;
        let limits = self.limits;
        let graph = self.graph();
        let split = |ty: &UnionType| {
            if loose {
                loose_equality(ty, value, limits)
            } else {
                strict_identity(ty, value, graph, limits)
            }
        };
        let (equal, unequal) = split(&current.ty);
        let (equal_real, unequal_real) = split(&current.real);
        let branches = (
            self.refine(scope, &key, FlowType::new(equal.clone(), equal_real)),
            self.refine(scope, &key, FlowType::new(unequal.clone(), unequal_real)),
        );
        Some(Equality { current: current.ty, equal, unequal, branches })
    }

    fn narrow_isset(&mut self, item: &Expr, scope: ScopeSnapshot) -> Branches {
        match &item.kind {
            ExprKind::Variable(name) => {
                let Some(entry) = scope.entry(name) else {
                    return (scope.mark_unreachable(), scope);
                };
                let (nullable, possibly_undefined) = (entry.ty.ty.is_nullable(), entry.possibly_undefined);
                let key = ScopeKey::var(name);
                let set = entry.ty.without_null();
                let unset = entry.ty.map(|t| if t.is_nullable() { UnionType::null() } else { UnionType::empty() });
                let t = self.refine(&scope.with_defined(name), &key, set);
                let f = match (nullable, possibly_undefined) {
                    (true, _) => scope.with_narrowed(&key, FlowType::new(unset.ty, UnionType::null())),
                    (false, true) => scope.without(name),
                    (false, false) => scope.mark_unreachable(),
                };
                (t, f)
            }
            ExprKind::PropertyFetch { .. } => {
                let Some((key, current)) = self.target(item, &scope) else { return (scope.clone(), scope) };
                (self.refine(&scope, &key, current.without_null()), scope)
            }
            ExprKind::ArrayDim { base, dim: Some(dim) } => {
                let key = self.node_types.get(&dim.id).and_then(|t| t.literal_value()).map(LiteralValue::as_array_key);
                match key {
                    Some(key) => self.narrow_key_present(base, &key, true, scope),
                    None => (scope.clone(), scope),
                }
            }
            _ => (scope.clone(), scope),
        }
    }

    /// True branch of `isset($a['k'])` / `array_key_exists('k', $a)`
    fn narrow_key_present(&mut self, base: &Expr, key: &ArrayKey, non_null: bool, scope: ScopeSnapshot) -> Branches {
        let Some((target, current)) = self.target(base, &scope) else { return (scope.clone(), scope) };
        let limits = self.limits;
        let present = current.map(|t| with_key_present(t, key, non_null, limits));
        (self.refine(&scope, &target, present), scope)
    }

    /// `empty($x)`: true branch holds falsey or unset values
    fn narrow_empty(&mut self, inner: &Expr, scope: ScopeSnapshot) -> Branches {
        let Some(name) = inner.as_variable() else {
            return match target_key(inner) {
                Some(_) => {
                    let (t, f) = self.narrow_truthiness(inner, scope);
                    (f, t)
                }
                None => (scope.clone(), scope),
            };
        };
        if scope.entry(name).is_none() {
            return (scope.clone(), scope.mark_unreachable());
        }
        let (truthy, falsey) = self.narrow_truthiness(inner, scope);
        let truthy = if truthy.is_unreachable() { truthy } else { truthy.with_defined(name) };
        (falsey, truthy)
    }

    /// Report conditions whose outcome the declared type already decides
    fn judge(&mut self, cond: &Expr, subject: &Expr, current: &UnionType, t: &UnionType, f: &UnionType, check: String) {
        if !self.check.report_redundant_conditions || current.is_empty() || current.has_opaque_atom() {
            return;
        }
        let kind = if t.is_empty() {
            DiagnosticKind::ImpossibleCondition { subject: describe(subject), ty: current.to_string(), check }
        } else if f.is_empty() {
            DiagnosticKind::RedundantCondition { subject: describe(subject), ty: current.to_string(), check }
        } else {
            return;
        };
        self.report(kind, cond.id, cond.span);
    }
}

fn target_key(expr: &Expr) -> Option<ScopeKey> {
    match &expr.kind {
        ExprKind::Variable(name) if &**name != "this" => Some(ScopeKey::var(name)),
        ExprKind::PropertyFetch { object, property, nullsafe: false } => {
            object.as_variable().map(|base| ScopeKey::property(base, property))
        }
        _ => None,
    }
}

fn describe(expr: &Expr) -> String {
    match target_key(expr) {
        Some(key) => key.to_string(),
        None => "expression".to_string(),
    }
}

fn count_argument(expr: &Expr) -> Option<&Expr> {
    match &expr.kind {
        ExprKind::Call { callee: Callee::Name(name), args }
            if (name.is("count") || name.is("sizeof")) && args.len() == 1 && !args[0].unpack =>
        {
            Some(&args[0].value)
        }
        _ => None,
    }
}

fn flip(op: BinaryOp) -> BinaryOp {
    match op {
        BinaryOp::Less => BinaryOp::Greater,
        BinaryOp::LessEq => BinaryOp::GreaterEq,
        BinaryOp::Greater => BinaryOp::Less,
        BinaryOp::GreaterEq => BinaryOp::LessEq,
        other => other,
    }
}

fn predicate_target(name: &str) -> Option<UnionType> {
    let scalar = |kinds: &[ScalarKind]| UnionType::from_atoms(kinds.iter().map(|k| TypeAtom::Scalar(*k)), false);
    let ty = match name {
        "is_int" | "is_integer" | "is_long" => UnionType::int(),
        "is_float" | "is_double" => UnionType::float(),
        "is_string" => UnionType::string(),
        "is_bool" => UnionType::bool(),
        "is_array" => UnionType::array(),
        "is_object" => UnionType::object(),
        "is_null" => UnionType::null(),
        "is_resource" => UnionType::scalar(ScalarKind::Resource),
        "is_scalar" => scalar(&[ScalarKind::Int, ScalarKind::Float, ScalarKind::String, ScalarKind::Bool]),
        "is_iterable" => UnionType::array().union(&UnionType::instance(Fqsen::new("Traversable"))),
        "is_countable" => UnionType::array().union(&UnionType::instance(Fqsen::new("Countable"))),
        _ => return None,
    };
    Some(ty)
}

fn numeric_part(ty: &UnionType, limits: TypeLimits) -> UnionType {
    ty.flat_map_atoms(false, limits, |atom| match atom {
        TypeAtom::Scalar(ScalarKind::Int | ScalarKind::Float | ScalarKind::String) => vec![atom.clone()],
        TypeAtom::Literal(v) if v.is_numeric() => vec![atom.clone()],
        TypeAtom::Mixed | TypeAtom::Template(_) => vec![
            TypeAtom::Scalar(ScalarKind::Int),
            TypeAtom::Scalar(ScalarKind::Float),
            TypeAtom::Scalar(ScalarKind::String),
        ],
        _ => vec![],
    })
}

fn non_numeric_part(ty: &UnionType, limits: TypeLimits) -> UnionType {
    ty.flat_map_atoms(ty.is_nullable(), limits, |atom| match atom {
        TypeAtom::Scalar(ScalarKind::Int | ScalarKind::Float) => vec![],
        TypeAtom::Literal(v) if v.is_numeric() => vec![],
        other => vec![other.clone()],
    })
}

fn callable_part(ty: &UnionType, limits: TypeLimits) -> UnionType {
    ty.flat_map_atoms(false, limits, |atom| match atom {
        TypeAtom::Callable(_)
        | TypeAtom::Scalar(ScalarKind::String)
        | TypeAtom::Literal(LiteralValue::String(_))
        | TypeAtom::Instance { .. }
        | TypeAtom::Object
        | TypeAtom::ArrayShape(_)
        | TypeAtom::GenericArray(_)
        | TypeAtom::Template(_) => vec![atom.clone()],
        TypeAtom::Mixed => vec![TypeAtom::Callable(CallableType::any())],
        _ => vec![],
    })
}

fn non_callable_part(ty: &UnionType, limits: TypeLimits) -> UnionType {
    ty.flat_map_atoms(ty.is_nullable(), limits, |atom| match atom {
        TypeAtom::Callable(_) => vec![],
        a if a.is_instance_of_class("Closure") => vec![],
        other => vec![other.clone()],
    })
}

fn non_empty_part(ty: &UnionType, limits: TypeLimits) -> UnionType {
    ty.flat_map_atoms(false, limits, |atom| match atom {
        TypeAtom::ArrayShape(s) if s.is_empty() => vec![],
        TypeAtom::GenericArray(g) => vec![TypeAtom::GenericArray(g.with_non_empty(true))],
        other => vec![other.clone()],
    })
}

fn empty_part(ty: &UnionType, limits: TypeLimits) -> UnionType {
    ty.flat_map_atoms(false, limits, |atom| match atom {
        TypeAtom::ArrayShape(s) if s.has_required_field() => vec![],
        TypeAtom::ArrayShape(_) => vec![TypeAtom::ArrayShape(crate::core::ArrayShape::empty())],
        TypeAtom::GenericArray(g) if g.non_empty => vec![],
        TypeAtom::GenericArray(_) => vec![TypeAtom::ArrayShape(crate::core::ArrayShape::empty())],
        other => vec![other.clone()],
    })
}

/// Arrays of `ty` that have offset `key`; `non_null` also drops a null value
fn with_key_present(ty: &UnionType, key: &ArrayKey, non_null: bool, limits: TypeLimits) -> UnionType {
    ty.flat_map_atoms(false, limits, |atom| match atom {
        TypeAtom::ArrayShape(s) => match s.field(key) {
            Some(field) => {
                let value = if non_null { field.ty.without_null() } else { field.ty.clone() };
                if value.is_empty() {
                    vec![]
                } else {
                    vec![TypeAtom::ArrayShape(s.with_field(key.clone(), ShapeField::required(value)))]
                }
            }
            None => vec![atom.clone()],
        },
        TypeAtom::GenericArray(g) => vec![TypeAtom::GenericArray(g.with_non_empty(true))],
        other => vec![other.clone()],
    })
}

/// Split `ty` on `=== value`
fn strict_identity(ty: &UnionType, value: &UnionType, graph: &dyn ClassGraph, limits: TypeLimits) -> (UnionType, UnionType) {
    if value.is_null() {
        let equal = if ty.is_nullable() { UnionType::null() } else { UnionType::empty() };
        return (equal, ty.without_null());
    }
    match value.literal_value() {
        Some(lit) => {
            let equal = ty.flat_map_atoms(false, limits, |atom| match atom {
                TypeAtom::Literal(v) if v == lit => vec![atom.clone()],
                TypeAtom::Scalar(kind) if *kind == lit.kind() => vec![TypeAtom::Literal(lit.clone())],
                TypeAtom::Mixed | TypeAtom::Template(_) => vec![TypeAtom::Literal(lit.clone())],
                _ => vec![],
            });
            let unequal = ty.flat_map_atoms(ty.is_nullable(), limits, |atom| match atom {
                TypeAtom::Literal(v) if v == lit => vec![],
                TypeAtom::Scalar(ScalarKind::Bool) => match lit {
                    LiteralValue::Bool(b) => vec![TypeAtom::Literal(LiteralValue::Bool(!b))],
                    _ => vec![atom.clone()],
                },
                other => vec![other.clone()],
            });
            (equal, unequal)
        }
        None => (intersect(ty, value, graph, limits), ty.clone()),
    }
}

/// Split `ty` on `== value`
fn loose_equality(ty: &UnionType, value: &UnionType, limits: TypeLimits) -> (UnionType, UnionType) {
    if value.is_null() {
        return (ty.non_truthy(), ty.without_null());
    }
    match value.literal_value() {
        Some(LiteralValue::Bool(true)) => (ty.non_falsey(), ty.non_truthy()),
        Some(LiteralValue::Bool(false)) => (ty.non_truthy(), ty.non_falsey()),
        Some(lit) => {
            let equal = ty.flat_map_atoms(ty.is_nullable() && !lit.is_truthy(), limits, |atom| match atom {
                TypeAtom::Literal(v) if v.kind() == lit.kind() => {
                    if loosely_equal(v, lit) {
                        vec![atom.clone()]
                    } else {
                        vec![]
                    }
                }
                TypeAtom::Scalar(kind) if *kind == lit.kind() => vec![TypeAtom::Literal(lit.clone())],
                other => vec![other.clone()],
            });
            let unequal = ty.flat_map_atoms(ty.is_nullable(), limits, |atom| match atom {
                TypeAtom::Literal(v) if v == lit => vec![],
                other => vec![other.clone()],
            });
            (equal, unequal)
        }
        None => (ty.clone(), ty.clone()),
    }
}

fn loosely_equal(a: &LiteralValue, b: &LiteralValue) -> bool {
    if a == b {
        return true;
    }
    match (numeric_value(a), numeric_value(b)) {
        (Some(x), Some(y)) => x == y,
        _ => false,
    }
}

fn numeric_value(value: &LiteralValue) -> Option<f64> {
    match value {
        LiteralValue::Int(n) => Some(*n as f64),
        LiteralValue::String(s) => s.trim().parse::<f64>().ok(),
        LiteralValue::Bool(_) => None,
    }
}
