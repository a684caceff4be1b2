//! Expression evaluation
//!
//! [`FunctionAnalyzer::eval`] threads a scope snapshot through an
//! expression and returns the value's [`FlowType`] together with the scope
//! after its side effects. Every visited expression has its type recorded.

use super::context::{replace_static, FunctionAnalyzer};
use super::flow::BodyOutcome;
use crate::ast::{
    Arg, ArrayItem, BinaryOp, Callee, CastKind, ClassRef, ClosureBody, ClosureExpr, Expr, ExprKind, Literal,
    MatchArm, UnaryOp,
};
use crate::core::template::apply;
use crate::core::{
    bind_from_arguments, ArrayKey, ArrayShape, CallableType, FlowType, Fqsen, GenericArray, LiteralValue,
    ScalarKind, ShapeField, TemplateBindings, TemplateRef, TypeAtom, TypeLimits, UnionType,
};
use crate::errors::{find_similar_names, AnalysisError, DiagnosticKind};
use crate::scope::{ScopeKey, ScopeSnapshot, VarKind};
use crate::symbols::Signature;
use std::sync::Arc;

const SUPERGLOBALS: &[&str] =
    &["GLOBALS", "_SERVER", "_GET", "_POST", "_FILES", "_COOKIE", "_SESSION", "_REQUEST", "_ENV"];

/// Result of checking and applying one call
pub(crate) struct CallOutcome {
    pub ret: FlowType,
    pub args: Vec<FlowType>,
    pub scope: ScopeSnapshot,
}

impl<'a> FunctionAnalyzer<'a> {
    /// Type of `expr` and the scope after evaluating it
    pub(crate) fn eval(&mut self, expr: &Expr, scope: ScopeSnapshot) -> (FlowType, ScopeSnapshot) {
        if self.is_aborted() || !self.tick(expr.id, expr.span) {
            return (FlowType::mixed(), scope);
        }
        let (ty, scope) = self.eval_kind(expr, scope);
        self.record_type(expr.id, &ty.ty);
        (ty, scope)
    }

    fn eval_kind(&mut self, expr: &Expr, scope: ScopeSnapshot) -> (FlowType, ScopeSnapshot) {
        let limits = self.limits;
        match &expr.kind {
            ExprKind::Literal(lit) => (FlowType::exact(literal_type(lit)), scope),
            ExprKind::Array(items) => self.eval_array(items, scope),
            ExprKind::Variable(name) => {
                let ty = self.read_variable(expr, name, &scope);
                (ty, scope)
            }
            ExprKind::Assign { target, value } => {
                let (ty, scope) = self.eval(value, scope);
                let scope = self.assign_to(target, ty.clone(), scope);
                (ty, scope)
            }
            ExprKind::AssignRef { target, value } => {
                let (ty, scope) = self.eval_reference_source(value, scope);
                let scope = self.assign_to(target, ty.clone(), scope);
                let scope = match target.as_variable() {
                    Some(name) => scope.mark_reference(name),
                    None => scope,
                };
                (ty, scope)
            }
            ExprKind::AssignOp { op, target, value } => {
                let (current, scope) = self.eval(target, scope);
                let (operand, scope) = self.eval(value, scope);
                let ty = binary_flow(*op, &current, &operand, limits);
                let scope = self.assign_to(target, ty.clone(), scope);
                (ty, scope)
            }
            ExprKind::IncDec { target, increment, prefix } => {
                let (current, scope) = self.eval(target, scope);
                let next = current.map(|t| step_type(t, *increment, limits));
                let scope = self.assign_to(target, next.clone(), scope);
                (if *prefix { next } else { current }, scope)
            }
            ExprKind::Binary { op: BinaryOp::BoolAnd | BinaryOp::BoolOr, .. } => {
                let (t, f) = self.narrow(expr, scope);
                let ty = match (t.is_unreachable(), f.is_unreachable()) {
                    (false, true) => UnionType::literal_bool(true),
                    (true, false) => UnionType::literal_bool(false),
                    _ => UnionType::bool(),
                };
                (FlowType::exact(ty), ScopeSnapshot::merge_all(&[t, f], limits))
            }
            ExprKind::Binary { op, left, right } => {
                let (l, scope) = self.eval(left, scope);
                let (r, scope) = self.eval(right, scope);
                (binary_flow(*op, &l, &r, limits), scope)
            }
            ExprKind::Unary { op, operand } => {
                let (t, scope) = self.eval(operand, scope);
                (t.map(|ty| unary_type(*op, ty)), scope)
            }
            ExprKind::Coalesce { left, right } => self.eval_coalesce(expr, left, right, scope),
            ExprKind::Ternary { cond, then, otherwise } => self.eval_ternary(cond, then.as_deref(), otherwise, scope),
            ExprKind::Isset(items) => {
                let mut scope = scope;
                for item in items {
                    scope = self.in_isset(|this| this.eval(item, scope)).1;
                }
                (FlowType::exact(UnionType::bool()), scope)
            }
            ExprKind::Empty(inner) => {
                let (_, scope) = self.in_isset(|this| this.eval(inner, scope));
                (FlowType::exact(UnionType::bool()), scope)
            }
            ExprKind::Instanceof { expr: inner, class } => {
                let (_, mut scope) = self.eval(inner, scope);
                if let ClassRef::Dynamic(class) = class {
                    scope = self.eval(class, scope).1;
                }
                (FlowType::exact(UnionType::bool()), scope)
            }
            ExprKind::Call { callee, args } => self.eval_call(expr, callee, args, scope),
            ExprKind::MethodCall { object, method, args, nullsafe } => {
                self.eval_method_call(expr, object, method, args, *nullsafe, scope)
            }
            ExprKind::StaticCall { class, method, args } => self.eval_static_call(expr, class, method, args, scope),
            ExprKind::New { class, args } => self.eval_new(expr, class, args, scope),
            ExprKind::PropertyFetch { object, property, nullsafe } => {
                self.eval_property_fetch(expr, object, property, *nullsafe, scope)
            }
            ExprKind::StaticPropertyFetch { class, property } => {
                self.eval_static_property(expr, class, property, scope)
            }
            ExprKind::ArrayDim { base, dim } => match dim {
                Some(dim) => {
                    let (base_ty, scope) = self.eval(base, scope);
                    let (key_ty, scope) = self.eval(dim, scope);
                    let key = key_ty.ty.literal_value().map(LiteralValue::as_array_key);
                    (base_ty.map(|t| t.offset_type(key.as_ref(), limits)), scope)
                }
                None => {
                    self.fault(AnalysisError::malformed(expr.id, "cannot read from an append offset"));
                    (FlowType::mixed(), scope)
                }
            },
            ExprKind::ClassName(class) => {
                let late = matches!(class, ClassRef::StaticRef | ClassRef::Dynamic(_));
                let (name, scope) = self.resolve_class_operand(expr, class, scope);
                let ty = match name {
                    Some(name) if !late => UnionType::literal_string(name.as_str().trim_start_matches('\\')),
                    _ => UnionType::string(),
                };
                (FlowType::exact(ty), scope)
            }
            ExprKind::Cast { kind, expr: inner } => {
                let (t, scope) = self.eval(inner, scope);
                (FlowType::exact(cast_type(*kind, &t.ty)), scope)
            }
            ExprKind::Closure(closure) => self.eval_closure(expr, closure, scope),
            ExprKind::Match { subject, arms } => self.eval_match(subject, arms, scope),
            ExprKind::List(_) => {
                self.fault(AnalysisError::malformed(expr.id, "list() used as a value"));
                (FlowType::mixed(), scope)
            }
            ExprKind::Exit(value) => {
                let scope = match value {
                    Some(v) => self.eval(v, scope).1,
                    None => scope,
                };
                (FlowType::empty(), scope.mark_unreachable())
            }
            ExprKind::Throw(value) => {
                let (_, scope) = self.eval(value, scope);
                self.note_may_throw(&scope);
                (FlowType::empty(), scope.mark_unreachable())
            }
        }
    }

    fn read_variable(&mut self, expr: &Expr, name: &str, scope: &ScopeSnapshot) -> FlowType {
        if let Some(entry) = scope.entry(name) {
            if entry.possibly_undefined && self.isset_mode == 0 && self.check.report_possibly_undefined {
                self.report(DiagnosticKind::PossiblyUndefinedVariable { name: name.to_string() }, expr.id, expr.span);
            }
            return entry.ty.clone();
        }
        if SUPERGLOBALS.contains(&name) {
            return FlowType::declared(UnionType::array_of(UnionType::array_key(), UnionType::mixed()));
        }
        if self.isset_mode > 0 {
            return FlowType::exact(UnionType::null());
        }
        let known = scope.iter().filter_map(|(key, _)| match key {
            ScopeKey::Var(n) => Some(&**n),
            ScopeKey::Property(..) => None,
        });
        let mut suggestions = find_similar_names(name, known, 2);
        suggestions.truncate(3);
        self.report_with(DiagnosticKind::UndeclaredVariable { name: name.to_string() }, expr.id, expr.span, suggestions);
        FlowType::mixed()
    }

    fn eval_array(&mut self, items: &[ArrayItem], mut scope: ScopeSnapshot) -> (FlowType, ScopeSnapshot) {
        let limits = self.limits;
        let mut shape = Some(ArrayShape::empty());
        let mut keys = Vec::new();
        let mut values = Vec::new();
        let mut real_known = true;

        for item in items {
            let key = match &item.key {
                Some(k) => {
                    let (kt, s) = self.eval(k, scope);
                    scope = s;
                    Some(kt.ty)
                }
                None => None,
            };
            let (value, s) = if item.by_ref {
                self.eval_reference_source(&item.value, scope)
            } else {
                self.eval(&item.value, scope)
            };
            scope = s;
            real_known &= value.is_real_known();

            if item.unpack {
                shape = None;
                keys.push(value.ty.iterable_key_type(limits));
                values.push(value.ty.iterable_value_type(limits));
                continue;
            }
            let literal_key = match &key {
                None => shape.as_ref().map(|s| ArrayKey::Int(s.next_index())),
                Some(k) if k.is_null() => Some(ArrayKey::String(Arc::from(""))),
                Some(k) => k.literal_value().map(LiteralValue::as_array_key),
            };
            match (shape.take(), literal_key) {
                (Some(s), Some(k)) => {
                    keys.push(k.literal_type());
                    shape = Some(s.with_field(k, ShapeField::required(value.ty.clone())));
                }
                _ => keys.push(match &key {
                    Some(k) => k.generalize(limits),
                    None => UnionType::int(),
                }),
            }
            values.push(value.ty);
        }

        let ty = match shape {
            Some(s) => UnionType::shape(s),
            None => {
                let key = match keys.is_empty() {
                    true => UnionType::int(),
                    false => UnionType::union_all(keys, limits).generalize(limits),
                };
                UnionType::of(TypeAtom::GenericArray(GenericArray {
                    key: Box::new(key),
                    value: Box::new(UnionType::union_all(values, limits)),
                    non_empty: items.iter().any(|i| !i.unpack),
                    is_list: items.iter().all(|i| i.key.is_none()),
                }))
            }
        };
        let real = if real_known { ty.clone() } else { UnionType::array() };
        (FlowType::new(ty, real), scope)
    }

    /// Source of `=&`: an undefined variable is created as null
    fn eval_reference_source(&mut self, value: &Expr, scope: ScopeSnapshot) -> (FlowType, ScopeSnapshot) {
        let (ty, scope) = self.in_isset(|this| this.eval(value, scope));
        match value.as_variable() {
            Some(name) if scope.entry(name).is_none() => {
                let null = FlowType::exact(UnionType::null());
                (null.clone(), scope.with_assigned(name, null, true).mark_reference(name))
            }
            Some(name) => (ty, scope.with_defined(name).mark_reference(name)),
            None => (ty, scope),
        }
    }

    /// Store `ty` into an assignable expression
    pub(crate) fn assign_to(&mut self, target: &Expr, ty: FlowType, scope: ScopeSnapshot) -> ScopeSnapshot {
        if self.is_aborted() {
            return scope;
        }
        let limits = self.limits;
        match &target.kind {
            ExprKind::Variable(name) => {
                if &**name == "this" {
                    self.fault(AnalysisError::malformed(target.id, "cannot assign to $this"));
                    return scope;
                }
                self.record_type(target.id, &ty.ty);
                scope.with_assigned(name, ty, true)
            }
            ExprKind::ArrayDim { base, dim } => {
                let (key, dynamic, scope) = match dim {
                    None => (None, None, scope),
                    Some(d) => {
                        let (kt, scope) = self.eval(d, scope);
                        match kt.ty.literal_value() {
                            Some(lit) => (Some(lit.as_array_key()), None, scope),
                            None => (None, Some(kt.ty), scope),
                        }
                    }
                };
                let current = self.lvalue_type(base, &scope);
                let write = |t: &UnionType, v: &UnionType| t.with_offset_assigned(key.clone(), dynamic.as_ref(), v, limits);
                let real = if current.is_real_known() && ty.is_real_known() {
                    write(&current.real, &ty.real)
                } else {
                    UnionType::mixed()
                };
                let updated = FlowType::new(write(&current.ty, &ty.ty), real);
                self.record_type(target.id, &ty.ty);
                self.assign_to(base, updated, scope)
            }
            ExprKind::PropertyFetch { object, property, .. } => {
                let (receiver, scope) = self.eval(object, scope);
                self.check_object_receiver(target, &receiver.ty, property);
                self.check_property_write(target, &receiver.ty, property, &ty.ty);
                self.record_type(target.id, &ty.ty);
                match object.as_variable() {
                    Some(base) => scope.with_narrowed(&ScopeKey::property(base, property), ty),
                    None => scope,
                }
            }
            ExprKind::StaticPropertyFetch { class, property } => {
                let (class, scope) = self.resolve_class_operand(target, class, scope);
                if let Some((_, prop)) = class.as_ref().and_then(|c| self.hierarchy().find_property(c, property)) {
                    if let Some(declared) = &prop.ty {
                        let expected = self.member_type(declared, &TemplateBindings::new(), class.as_ref());
                        if !self.can_cast(&ty.ty, &expected) {
                            self.report(
                                DiagnosticKind::TypeMismatchProperty {
                                    property: format!("{}::${}", prop_owner(&class), property),
                                    expected: expected.to_string(),
                                    found: ty.ty.to_string(),
                                },
                                target.id,
                                target.span,
                            );
                        }
                    }
                }
                self.record_type(target.id, &ty.ty);
                scope
            }
            ExprKind::List(items) => {
                let pairs: Vec<(Option<&Expr>, Option<&Expr>)> = items
                    .iter()
                    .map(|item| match item {
                        Some(item) => (item.key.as_ref(), Some(&item.target)),
                        None => (None, None),
                    })
                    .collect();
                self.destructure(&pairs, ty, scope)
            }
            ExprKind::Array(items) => {
                let pairs: Vec<(Option<&Expr>, Option<&Expr>)> =
                    items.iter().map(|item| (item.key.as_ref(), Some(&item.value))).collect();
                self.destructure(&pairs, ty, scope)
            }
            _ => {
                self.fault(AnalysisError::malformed(target.id, "expression is not assignable"));
                scope
            }
        }
    }

    fn destructure(
        &mut self,
        items: &[(Option<&Expr>, Option<&Expr>)],
        ty: FlowType,
        mut scope: ScopeSnapshot,
    ) -> ScopeSnapshot {
        let limits = self.limits;
        let mut index = 0i64;
        for (key, target) in items {
            let key = match key {
                Some(k) => {
                    let (kt, s) = self.eval(k, scope);
                    scope = s;
                    kt.ty.literal_value().map(LiteralValue::as_array_key)
                }
                None => {
                    index += 1;
                    Some(ArrayKey::Int(index - 1))
                }
            };
            if let Some(target) = target {
                let element = ty.map(|t| t.offset_type(key.as_ref(), limits));
                scope = self.assign_to(target, element, scope);
            }
        }
        scope
    }

    /// Current type of an assignment target, without reporting reads
    fn lvalue_type(&mut self, base: &Expr, scope: &ScopeSnapshot) -> FlowType {
        let limits = self.limits;
        match &base.kind {
            ExprKind::Variable(name) => scope.entry(name).map(|e| e.ty.clone()).unwrap_or_else(FlowType::empty),
            ExprKind::ArrayDim { base: inner, dim: Some(dim) } => {
                let outer = self.lvalue_type(inner, scope);
                let key = dim.as_literal().and_then(literal_key);
                outer.map(|t| t.offset_type(key.as_ref(), limits))
            }
            ExprKind::ArrayDim { dim: None, .. } => FlowType::empty(),
            ExprKind::PropertyFetch { object, property, .. } => {
                let narrowed = object.as_variable().and_then(|v| scope.property(v, property));
                match narrowed {
                    Some(entry) => entry.ty.clone(),
                    None => self.quietly(|this| this.eval(base, scope.clone()).0),
                }
            }
            _ => self.quietly(|this| this.eval(base, scope.clone()).0),
        }
    }

    fn check_property_write(&mut self, target: &Expr, receiver: &UnionType, property: &str, value: &UnionType) {
        let limits = self.limits;
        for atom in receiver.atoms() {
            let TypeAtom::Instance { class, args } = atom else { continue };
            match self.hierarchy().find_property(class, property) {
                Some((owner, prop)) => {
                    let Some(declared) = &prop.ty else { continue };
                    let bindings = self.hierarchy().member_bindings(class, args, &owner, limits);
                    let expected = self.member_type(declared, &bindings, Some(class));
                    if !self.can_cast(value, &expected) {
                        self.report(
                            DiagnosticKind::TypeMismatchProperty {
                                property: format!("{}::${}", class, property),
                                expected: expected.to_string(),
                                found: value.to_string(),
                            },
                            target.id,
                            target.span,
                        );
                    }
                }
                None => {
                    if self.hierarchy().class(class).is_some() && self.hierarchy().find_method(class, "__set").is_none() {
                        self.report(
                            DiagnosticKind::UndeclaredProperty { class: class.to_string(), property: property.to_string() },
                            target.id,
                            target.span,
                        );
                    }
                }
            }
        }
    }

    /// Member access on a value that can never be an object
    fn check_object_receiver(&mut self, expr: &Expr, receiver: &UnionType, member: &str) {
        let maybe_object = receiver
            .atoms()
            .iter()
            .any(|a| a.is_object_like() || a.is_opaque() || matches!(a, TypeAtom::Callable(_)));
        if receiver.is_empty() || maybe_object {
            return;
        }
        self.report(
            DiagnosticKind::NonObjectMemberAccess { member: member.to_string(), ty: receiver.to_string() },
            expr.id,
            expr.span,
        );
    }

    fn eval_coalesce(&mut self, expr: &Expr, left: &Expr, right: &Expr, scope: ScopeSnapshot) -> (FlowType, ScopeSnapshot) {
        let limits = self.limits;
        let (left_ty, scope) = self.in_isset(|this| this.eval(left, scope));
        let definitely_set = left
            .as_variable()
            .and_then(|name| scope.entry(name))
            .map_or(false, |e| !e.possibly_undefined);
        let ty = &left_ty.ty;
        if definitely_set && !ty.is_nullable() && !ty.has_opaque_atom() && !ty.is_empty() {
            self.report(DiagnosticKind::RedundantCoalesce { ty: ty.to_string() }, expr.id, expr.span);
            return (left_ty, scope);
        }
        let (right_ty, right_scope) = self.eval(right, scope.clone());
        let result = left_ty.without_null().union_with(&right_ty, limits);
        (result, ScopeSnapshot::merge_all(&[scope, right_scope], limits))
    }

    fn eval_ternary(
        &mut self,
        cond: &Expr,
        then: Option<&Expr>,
        otherwise: &Expr,
        scope: ScopeSnapshot,
    ) -> (FlowType, ScopeSnapshot) {
        let limits = self.limits;
        let (t, f) = self.narrow(cond, scope);
        let mut types = Vec::new();
        let mut exits = Vec::new();
        if !t.is_unreachable() {
            let (ty, s) = match then {
                Some(e) => self.eval(e, t),
                None => {
                    let cond_ty = self.node_types.get(&cond.id).cloned().unwrap_or_else(UnionType::mixed);
                    (FlowType::declared(cond_ty.non_falsey()), t)
                }
            };
            types.push(ty);
            exits.push(s);
        }
        if !f.is_unreachable() {
            let (ty, s) = self.eval(otherwise, f);
            types.push(ty);
            exits.push(s);
        }
        let ty = types.into_iter().reduce(|a, b| a.union_with(&b, limits)).unwrap_or_else(FlowType::empty);
        (ty, ScopeSnapshot::merge_all(&exits, limits))
    }

    fn eval_call(&mut self, expr: &Expr, callee: &Callee, args: &[Arg], scope: ScopeSnapshot) -> (FlowType, ScopeSnapshot) {
        match callee {
            Callee::Name(name) if name.is("assert") && args.len() == 1 => {
                let (t, _) = self.narrow(&args[0].value, scope);
                (FlowType::exact(UnionType::bool()), t)
            }
            Callee::Name(name) => match self.lookup_function(name) {
                Some(sig) => {
                    let outcome = self.call_signature(expr, &sig, TemplateBindings::new(), None, args, scope);
                    (outcome.ret, outcome.scope)
                }
                None => {
                    self.report(DiagnosticKind::UndeclaredFunction { name: name.to_string() }, expr.id, expr.span);
                    let (_, scope) = self.eval_args(args, None, scope);
                    (FlowType::mixed(), scope.invalidate_after_call())
                }
            },
            Callee::Expr(target) => {
                let (callee_ty, scope) = self.eval(target, scope);
                let (_, scope) = self.eval_args(args, None, scope);
                let ret = callable_return(&callee_ty.ty, self.limits);
                (FlowType::declared(ret), scope.invalidate_after_call())
            }
        }
    }

    fn eval_args(&mut self, args: &[Arg], sig: Option<&Signature>, mut scope: ScopeSnapshot) -> (Vec<FlowType>, ScopeSnapshot) {
        let limits = self.limits;
        let mut types = Vec::with_capacity(args.len());
        for (i, arg) in args.iter().enumerate() {
            let by_ref = sig.and_then(|s| s.param_for_arg(i)).map_or(false, |p| p.by_ref);
            let (ty, s) = if by_ref && is_assignable(&arg.value) {
                self.in_isset(|this| this.eval(&arg.value, scope))
            } else {
                self.eval(&arg.value, scope)
            };
            scope = s;
            types.push(if arg.unpack { ty.map(|t| t.iterable_value_type(limits)) } else { ty });
        }
        (types, scope)
    }

    /// Check the arguments of a resolved call, write back by-reference
    /// arguments and compute the return type
    pub(crate) fn call_signature(
        &mut self,
        expr: &Expr,
        sig: &Signature,
        class_bindings: TemplateBindings,
        receiver: Option<&Fqsen>,
        args: &[Arg],
        scope: ScopeSnapshot,
    ) -> CallOutcome {
        let limits = self.limits;
        let (arg_types, mut scope) = self.eval_args(args, Some(sig), scope);

        let unpacks = args.iter().any(|a| a.unpack);
        if !unpacks && args.len() < sig.required_params() {
            self.report(
                DiagnosticKind::TooFewArguments {
                    function: sig.fqsen.to_string(),
                    expected: sig.required_params(),
                    found: args.len(),
                },
                expr.id,
                expr.span,
            );
        }

        let mut bindings = class_bindings;
        if !sig.template_params.is_empty() {
            let declared: Vec<UnionType> = sig
                .params
                .iter()
                .map(|p| apply(&bindings, &p.ty.clone().unwrap_or_else(UnionType::mixed), limits))
                .collect();
            let found: Vec<UnionType> = arg_types.iter().map(|t| t.ty.clone()).collect();
            bindings.extend(bind_from_arguments(&sig.template_params, &declared, &found, limits), limits);
        }

        for (i, (arg, found)) in args.iter().zip(&arg_types).enumerate() {
            if arg.unpack {
                continue;
            }
            let Some(param) = sig.param_for_arg(i) else { continue };
            let Some(declared) = param.ty.as_ref().filter(|_| !param.by_ref) else { continue };
            let expected = self.member_type(declared, &bindings, receiver);
            if !self.can_cast(&found.ty, &expected) {
                self.report(
                    DiagnosticKind::TypeMismatchArgument {
                        function: sig.fqsen.to_string(),
                        param: param.name.clone(),
                        position: i + 1,
                        expected: expected.to_string(),
                        found: found.ty.to_string(),
                    },
                    arg.value.id,
                    arg.value.span,
                );
            }
        }

        for (i, arg) in args.iter().enumerate() {
            let Some(param) = sig.param_for_arg(i) else { continue };
            if !param.by_ref || !is_assignable(&arg.value) {
                continue;
            }
            let written = match &param.ty {
                Some(t) => self.member_type(t, &bindings, receiver),
                None => UnionType::mixed(),
            };
            scope = self.assign_to(&arg.value, FlowType::declared(written), scope);
        }

        let ret = match &sig.return_type {
            Some(declared) => {
                let ty = self.member_type(declared, &bindings, receiver);
                let real = match &sig.real_return_type {
                    Some(t) => self.member_type(t, &bindings, receiver),
                    None => UnionType::mixed(),
                };
                FlowType::new(ty, real)
            }
            None if sig.body.is_some() => FlowType::declared(self.infer_return_type(sig, expr.id, expr.span)),
            None => FlowType::mixed(),
        };
        if !sig.is_pure {
            scope = scope.invalidate_after_call();
        }
        if ret.ty.is_empty() {
            scope = scope.mark_unreachable();
        }
        CallOutcome { ret, args: arg_types, scope }
    }

    /// Declared member type as seen through `receiver`
    pub(crate) fn member_type(&self, ty: &UnionType, bindings: &TemplateBindings, receiver: Option<&Fqsen>) -> UnionType {
        let bound = if bindings.is_empty() { ty.clone() } else { apply(bindings, ty, self.limits) };
        match receiver.or(self.class.as_ref()) {
            Some(class) => replace_static(&bound, class, self.limits),
            None => bound,
        }
    }

    fn eval_method_call(
        &mut self,
        expr: &Expr,
        object: &Expr,
        method: &str,
        args: &[Arg],
        nullsafe: bool,
        scope: ScopeSnapshot,
    ) -> (FlowType, ScopeSnapshot) {
        let limits = self.limits;
        let (receiver, scope) = self.eval(object, scope);
        let receiver = receiver.ty;
        if nullsafe && receiver.is_null() {
            return (FlowType::exact(UnionType::null()), scope);
        }
        let checked = if nullsafe { receiver.without_null() } else { receiver.clone() };
        self.check_object_receiver(expr, &checked, &format!("{}()", method));

        let mut candidates: Vec<(Arc<Signature>, TemplateBindings, Fqsen)> = Vec::new();
        let mut opaque = false;
        for atom in receiver.atoms() {
            match atom {
                TypeAtom::Instance { class, args: type_args } => match self.hierarchy().find_method(class, method) {
                    Some((owner, sig)) => {
                        let bindings = self.hierarchy().member_bindings(class, type_args, &owner, limits);
                        candidates.push((sig, bindings, class.clone()));
                    }
                    None => {
                        if self.hierarchy().class(class).is_some() && self.hierarchy().find_method(class, "__call").is_none() {
                            self.report(
                                DiagnosticKind::UndeclaredMethod { class: class.to_string(), method: method.to_string() },
                                expr.id,
                                expr.span,
                            );
                        }
                        opaque = true;
                    }
                },
                TypeAtom::Object | TypeAtom::StaticSelf | TypeAtom::Mixed | TypeAtom::Template(_) | TypeAtom::Callable(_) => {
                    opaque = true
                }
                _ => {}
            }
        }

        let (mut ret, scope) = match candidates.first() {
            Some((sig, bindings, class)) => {
                let outcome = self.call_signature(expr, sig, bindings.clone(), Some(class), args, scope);
                (outcome.ret, outcome.scope)
            }
            None => {
                let (_, scope) = self.eval_args(args, None, scope);
                (FlowType::mixed(), scope.invalidate_after_call())
            }
        };
        for (sig, bindings, class) in candidates.iter().skip(1) {
            let ty = match &sig.return_type {
                Some(t) => self.member_type(t, bindings, Some(class)),
                None => UnionType::mixed(),
            };
            ret = ret.union_with(&FlowType::declared(ty), limits);
        }
        if opaque && !candidates.is_empty() {
            ret = ret.union_with(&FlowType::mixed(), limits);
        }
        if nullsafe && receiver.is_nullable() {
            ret = ret.union_with(&FlowType::exact(UnionType::null()), limits);
        }
        (ret, scope)
    }

    fn eval_static_call(
        &mut self,
        expr: &Expr,
        class: &ClassRef,
        method: &str,
        args: &[Arg],
        scope: ScopeSnapshot,
    ) -> (FlowType, ScopeSnapshot) {
        let (class_name, scope) = self.resolve_class_operand(expr, class, scope);
        let hierarchy = self.hierarchy();
        if let Some(name) = &class_name {
            if hierarchy.class(name).is_none() {
                self.report(DiagnosticKind::UndeclaredClass { name: name.to_string() }, expr.id, expr.span);
            } else if let Some((owner, sig)) = hierarchy.find_method(name, method) {
                let bindings = hierarchy.member_bindings(name, &[], &owner, self.limits);
                // self:: and parent:: keep the late static binding of the caller
                let receiver = match (class, &self.class) {
                    (ClassRef::SelfRef | ClassRef::StaticRef | ClassRef::ParentRef, Some(current)) => current.clone(),
                    _ => name.clone(),
                };
                let outcome = self.call_signature(expr, &sig, bindings, Some(&receiver), args, scope);
                return (outcome.ret, outcome.scope);
            } else if hierarchy.find_method(name, "__callStatic").is_none() {
                self.report(
                    DiagnosticKind::UndeclaredMethod { class: name.to_string(), method: method.to_string() },
                    expr.id,
                    expr.span,
                );
            }
        }
        let (_, scope) = self.eval_args(args, None, scope);
        (FlowType::mixed(), scope.invalidate_after_call())
    }

    /// Class named by a class reference; dynamic references resolve only
    /// when their value is a known class name or a single instance
    fn resolve_class_operand(&mut self, expr: &Expr, class: &ClassRef, scope: ScopeSnapshot) -> (Option<Fqsen>, ScopeSnapshot) {
        match class {
            ClassRef::Dynamic(inner) => {
                let (ty, scope) = self.eval(inner, scope);
                let name = match (ty.ty.literal_value(), ty.ty.atoms()) {
                    (Some(LiteralValue::String(s)), _) => Some(Fqsen::new(s.as_ref())),
                    (None, [TypeAtom::Instance { class, .. }]) => Some(class.clone()),
                    _ => None,
                };
                (name, scope)
            }
            other => (self.resolve_class_ref(other, expr.id, expr.span).ok().flatten(), scope),
        }
    }

    fn eval_new(&mut self, expr: &Expr, class: &ClassRef, args: &[Arg], scope: ScopeSnapshot) -> (FlowType, ScopeSnapshot) {
        let limits = self.limits;
        let (class_name, scope) = self.resolve_class_operand(expr, class, scope);
        let Some(class_name) = class_name else {
            let (_, scope) = self.eval_args(args, None, scope);
            return (FlowType::exact(UnionType::object()), scope.invalidate_after_call());
        };
        let Some(desc) = self.hierarchy().class(&class_name) else {
            self.report(DiagnosticKind::UndeclaredClass { name: class_name.to_string() }, expr.id, expr.span);
            let (_, scope) = self.eval_args(args, None, scope);
            return (FlowType::exact(UnionType::instance(class_name)), scope.invalidate_after_call());
        };

        let templates: Vec<TemplateRef> = desc.template_params.iter().map(|n| desc.template(n)).collect();
        let (type_args, scope) = match self.hierarchy().find_method(&class_name, "__construct") {
            Some((_, ctor)) => {
                let outcome = self.call_signature(expr, &ctor, TemplateBindings::new(), Some(&class_name), args, scope);
                let declared: Vec<UnionType> =
                    ctor.params.iter().map(|p| p.ty.clone().unwrap_or_else(UnionType::mixed)).collect();
                let found: Vec<UnionType> = outcome.args.iter().map(|a| a.ty.clone()).collect();
                let bound = bind_from_arguments(&templates, &declared, &found, limits);
                let type_args = templates
                    .iter()
                    .map(|t| bound.get(t).cloned().unwrap_or_else(UnionType::mixed))
                    .collect();
                (type_args, outcome.scope)
            }
            None => {
                let (_, scope) = self.eval_args(args, None, scope);
                (vec![UnionType::mixed(); templates.len()], scope)
            }
        };
        let ty = if templates.is_empty() {
            UnionType::instance(class_name)
        } else {
            UnionType::instance_with_args(class_name, type_args)
        };
        (FlowType::exact(ty), scope)
    }

    fn eval_property_fetch(
        &mut self,
        expr: &Expr,
        object: &Expr,
        property: &str,
        nullsafe: bool,
        scope: ScopeSnapshot,
    ) -> (FlowType, ScopeSnapshot) {
        let limits = self.limits;
        let (receiver, scope) = self.eval(object, scope);
        if let Some(entry) = object.as_variable().and_then(|base| scope.property(base, property)) {
            let ty = entry.ty.clone();
            return (ty, scope);
        }
        let receiver = receiver.ty;
        if nullsafe && receiver.is_null() {
            return (FlowType::exact(UnionType::null()), scope);
        }
        let checked = if nullsafe { receiver.without_null() } else { receiver.clone() };
        self.check_object_receiver(expr, &checked, property);

        let mut result: Option<FlowType> = None;
        for atom in receiver.atoms() {
            let part = match atom {
                TypeAtom::Instance { class, args } => match self.hierarchy().find_property(class, property) {
                    Some((owner, prop)) => {
                        let bindings = self.hierarchy().member_bindings(class, args, &owner, limits);
                        let declared = match &prop.ty {
                            Some(t) => self.member_type(t, &bindings, Some(class)),
                            None => UnionType::mixed(),
                        };
                        let real = match &prop.real_ty {
                            Some(t) => self.member_type(t, &bindings, Some(class)),
                            None => UnionType::mixed(),
                        };
                        FlowType::new(declared, real)
                    }
                    None => {
                        let known = self.hierarchy().class(class).is_some();
                        if known && self.isset_mode == 0 && self.hierarchy().find_method(class, "__get").is_none() {
                            self.report(
                                DiagnosticKind::UndeclaredProperty { class: class.to_string(), property: property.to_string() },
                                expr.id,
                                expr.span,
                            );
                        }
                        FlowType::mixed()
                    }
                },
                TypeAtom::Object | TypeAtom::StaticSelf | TypeAtom::Mixed | TypeAtom::Template(_) => FlowType::mixed(),
                _ => continue,
            };
            result = Some(match result {
                Some(acc) => acc.union_with(&part, limits),
                None => part,
            });
        }
        let mut ty = result.unwrap_or_else(FlowType::mixed);
        if nullsafe && receiver.is_nullable() {
            ty = ty.union_with(&FlowType::exact(UnionType::null()), limits);
        }
        (ty, scope)
    }

    fn eval_static_property(&mut self, expr: &Expr, class: &ClassRef, property: &str, scope: ScopeSnapshot) -> (FlowType, ScopeSnapshot) {
        let (class_name, scope) = self.resolve_class_operand(expr, class, scope);
        let Some(class_name) = class_name else { return (FlowType::mixed(), scope) };
        match self.hierarchy().find_property(&class_name, property) {
            Some((_, prop)) => {
                let ty = match &prop.ty {
                    Some(t) => self.member_type(t, &TemplateBindings::new(), Some(&class_name)),
                    None => UnionType::mixed(),
                };
                (FlowType::declared(ty), scope)
            }
            None => {
                let kind = match self.hierarchy().class(&class_name) {
                    Some(_) => DiagnosticKind::UndeclaredProperty {
                        class: class_name.to_string(),
                        property: property.to_string(),
                    },
                    None => DiagnosticKind::UndeclaredClass { name: class_name.to_string() },
                };
                if self.isset_mode == 0 {
                    self.report(kind, expr.id, expr.span);
                }
                (FlowType::mixed(), scope)
            }
        }
    }

    fn eval_closure(&mut self, expr: &Expr, closure: &ClosureExpr, scope: ScopeSnapshot) -> (FlowType, ScopeSnapshot) {
        let limits = self.limits;
        let unit = Fqsen::new(&format!("{}::{{closure{}}}", self.unit, expr.id));

        let mut entry = match &closure.body {
            ClosureBody::Arrow(_) => scope.clone(),
            ClosureBody::Block(_) => ScopeSnapshot::new(),
        };
        if !closure.is_static {
            if let Some(this) = scope.entry("this") {
                entry = entry.with_entry(ScopeKey::var("this"), this.clone());
            }
        }
        for capture in &closure.uses {
            match scope.entry(&capture.name) {
                Some(found) => {
                    let mut captured = found.clone();
                    captured.is_reference |= capture.by_ref;
                    captured.kind = VarKind::Local;
                    entry = entry.with_entry(ScopeKey::var(&capture.name), captured);
                }
                None if capture.by_ref => {
                    entry = entry.with_assigned(&capture.name, FlowType::exact(UnionType::null()), true);
                }
                None => {
                    self.report(DiagnosticKind::UndeclaredVariable { name: capture.name.to_string() }, expr.id, expr.span);
                }
            }
        }

        let mut nested = FunctionAnalyzer::new(self.env, unit, None, closure.is_static);
        nested.class = self.class.clone();
        nested.check = self.check.clone();
        nested.quiet = self.quiet;
        nested.depth = self.depth;
        nested.inference_stack = self.inference_stack.clone();
        nested.steps = self.steps;
        nested.budget_exhausted = self.budget_exhausted;
        nested.declared_return = closure.return_type.as_ref().map(|t| self.resolve_static(t));
        for param in &closure.params {
            let (name, param_entry) = nested.param_entry(param);
            entry = entry.with_entry(ScopeKey::var(&name), param_entry);
        }
        let outcome = match &closure.body {
            ClosureBody::Block(body) => nested.run_body(body, entry),
            ClosureBody::Arrow(body) => {
                let (ty, exit) = nested.eval(body, entry);
                BodyOutcome { exit_scope: exit, return_type: ty.ty }
            }
        };
        self.absorb_nested(nested);

        let params = closure
            .params
            .iter()
            .map(|p| p.ty.clone().or_else(|| p.real_ty.clone()).unwrap_or_else(UnionType::mixed))
            .collect();
        let ret = closure.return_type.clone().unwrap_or_else(|| outcome.return_type.clone());
        let ty = UnionType::of(TypeAtom::Callable(CallableType { params: Some(params), ret: Box::new(ret) }));

        let mut scope = scope;
        for capture in closure.uses.iter().filter(|c| c.by_ref) {
            let written = match outcome.exit_scope.is_unreachable() {
                true => None,
                false => outcome.exit_scope.entry(&capture.name).map(|e| e.ty.clone()),
            };
            let null = FlowType::exact(UnionType::null());
            let merged = match (scope.entry(&capture.name).map(|e| e.ty.clone()), written) {
                (Some(current), Some(written)) => current.union_with(&written, limits),
                (Some(current), None) => current,
                (None, Some(written)) => written.union_with(&null, limits),
                (None, None) => null,
            };
            scope = scope.with_assigned(&capture.name, merged, true).mark_reference(&capture.name);
        }
        (FlowType::exact(ty), scope)
    }

    /// Fold a closure's results into the enclosing unit
    fn absorb_nested(&mut self, nested: FunctionAnalyzer<'a>) {
        self.steps = nested.steps;
        self.budget_exhausted |= nested.budget_exhausted;
        self.recursion_cutoff |= nested.recursion_cutoff;
        self.node_types.extend(nested.node_types);
        self.scopes.extend(nested.scopes);
        if self.fault.is_none() {
            self.fault = nested.fault;
        }
        for diagnostic in nested.diagnostics.into_diagnostics() {
            self.diagnostics.add(diagnostic);
        }
    }

    fn eval_match(&mut self, subject: &Expr, arms: &[MatchArm], scope: ScopeSnapshot) -> (FlowType, ScopeSnapshot) {
        let limits = self.limits;
        let (_, mut remaining) = self.eval(subject, scope);
        let mut types = Vec::new();
        let mut exits = Vec::new();

        for arm in arms {
            let Some(conditions) = &arm.conditions else { continue };
            let mut matched = Vec::new();
            for condition in conditions {
                let (value, s) = self.eval(condition, remaining);
                let (t, f) = self.narrow_identical(subject, &value.ty, s, false);
                matched.push(t);
                remaining = f;
            }
            let entry = ScopeSnapshot::merge_all(&matched, limits);
            if entry.is_unreachable() {
                continue;
            }
            let (ty, exit) = self.eval(&arm.body, entry);
            types.push(ty);
            exits.push(exit);
        }

        match arms.iter().find(|a| a.conditions.is_none()) {
            Some(default) if !remaining.is_unreachable() => {
                let (ty, exit) = self.eval(&default.body, remaining);
                types.push(ty);
                exits.push(exit);
            }
            Some(_) => {}
            // an unmatched subject raises
            None => self.note_may_throw(&remaining),
        }
        let ty = types.into_iter().reduce(|a, b| a.union_with(&b, limits)).unwrap_or_else(FlowType::empty);
        (ty, ScopeSnapshot::merge_all(&exits, limits))
    }
}

fn prop_owner(class: &Option<Fqsen>) -> String {
    class.as_ref().map(|c| c.to_string()).unwrap_or_default()
}

pub(crate) fn literal_type(lit: &Literal) -> UnionType {
    match lit {
        Literal::Null => UnionType::null(),
        Literal::Bool(b) => UnionType::literal_bool(*b),
        Literal::Int(n) => UnionType::literal_int(*n),
        Literal::Float(_) => UnionType::float(),
        Literal::String(s) => UnionType::literal_string(s),
    }
}

fn literal_key(lit: &Literal) -> Option<ArrayKey> {
    match lit {
        Literal::Int(n) => Some(ArrayKey::Int(*n)),
        Literal::String(s) => Some(ArrayKey::from_str_key(s)),
        Literal::Bool(b) => Some(ArrayKey::Int(i64::from(*b))),
        Literal::Null => Some(ArrayKey::String(Arc::from(""))),
        Literal::Float(f) if f.is_finite() => Some(ArrayKey::Int(f.trunc() as i64)),
        Literal::Float(_) => None,
    }
}

pub(crate) fn is_assignable(expr: &Expr) -> bool {
    matches!(
        expr.kind,
        ExprKind::Variable(_)
            | ExprKind::ArrayDim { .. }
            | ExprKind::PropertyFetch { .. }
            | ExprKind::StaticPropertyFetch { .. }
            | ExprKind::List(_)
    )
}

fn callable_return(ty: &UnionType, limits: TypeLimits) -> UnionType {
    if ty.atoms().is_empty() {
        return UnionType::mixed();
    }
    UnionType::union_all(
        ty.atoms().iter().map(|a| match a {
            TypeAtom::Callable(c) => (*c.ret).clone(),
            _ => UnionType::mixed(),
        }),
        limits,
    )
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Numeric {
    Int,
    Float,
    Mixed,
}

fn numeric_kind(ty: &UnionType) -> Numeric {
    let (mut int, mut float) = (false, false);
    for atom in ty.atoms() {
        match atom.scalar_kind() {
            Some(ScalarKind::Int | ScalarKind::Bool) => int = true,
            Some(ScalarKind::Float) => float = true,
            _ => return Numeric::Mixed,
        }
    }
    match (int, float) {
        (_, false) => Numeric::Int,
        (false, true) => Numeric::Float,
        (true, true) => Numeric::Mixed,
    }
}

fn arithmetic(left: &UnionType, right: &UnionType) -> UnionType {
    match (numeric_kind(left), numeric_kind(right)) {
        (Numeric::Int, Numeric::Int) => UnionType::int(),
        (Numeric::Float, _) | (_, Numeric::Float) => UnionType::float(),
        _ => UnionType::int_or_float(),
    }
}

fn literal_text(value: &LiteralValue) -> String {
    match value {
        LiteralValue::Int(n) => n.to_string(),
        LiteralValue::String(s) => s.to_string(),
        LiteralValue::Bool(true) => "1".to_string(),
        LiteralValue::Bool(false) => String::new(),
    }
}

fn fold_literals(op: BinaryOp, a: &LiteralValue, b: &LiteralValue) -> Option<UnionType> {
    use LiteralValue::Int;
    let int_or_float = |n: Option<i64>| n.map_or_else(UnionType::float, UnionType::literal_int);
    match (op, a, b) {
        (BinaryOp::Add, Int(x), Int(y)) => Some(int_or_float(x.checked_add(*y))),
        (BinaryOp::Sub, Int(x), Int(y)) => Some(int_or_float(x.checked_sub(*y))),
        (BinaryOp::Mul, Int(x), Int(y)) => Some(int_or_float(x.checked_mul(*y))),
        (BinaryOp::Mod, Int(x), Int(y)) if *y != 0 => x.checked_rem(*y).map(UnionType::literal_int),
        (BinaryOp::Div, Int(x), Int(y)) if *y != 0 && x.checked_rem(*y) == Some(0) => {
            x.checked_div(*y).map(UnionType::literal_int)
        }
        (BinaryOp::Concat, x, y) => Some(UnionType::literal_string(&format!("{}{}", literal_text(x), literal_text(y)))),
        (BinaryOp::Identical, x, y) => Some(UnionType::literal_bool(x == y)),
        (BinaryOp::NotIdentical, x, y) => Some(UnionType::literal_bool(x != y)),
        (BinaryOp::Less, Int(x), Int(y)) => Some(UnionType::literal_bool(x < y)),
        (BinaryOp::LessEq, Int(x), Int(y)) => Some(UnionType::literal_bool(x <= y)),
        (BinaryOp::Greater, Int(x), Int(y)) => Some(UnionType::literal_bool(x > y)),
        (BinaryOp::GreaterEq, Int(x), Int(y)) => Some(UnionType::literal_bool(x >= y)),
        _ => None,
    }
}

/// Result type of a binary operator
pub(crate) fn binary_type(op: BinaryOp, left: &UnionType, right: &UnionType, limits: TypeLimits) -> UnionType {
    if let (Some(a), Some(b)) = (left.literal_value(), right.literal_value()) {
        if let Some(folded) = fold_literals(op, a, b) {
            return folded;
        }
    }
    match op {
        BinaryOp::Add if left.is_array_like() && right.is_array_like() => {
            left.union_with(right, limits).generalize(limits)
        }
        BinaryOp::Add | BinaryOp::Sub | BinaryOp::Mul => arithmetic(left, right),
        BinaryOp::Div | BinaryOp::Pow => match (numeric_kind(left), numeric_kind(right)) {
            (Numeric::Float, _) | (_, Numeric::Float) => UnionType::float(),
            _ => UnionType::int_or_float(),
        },
        BinaryOp::Mod
        | BinaryOp::BitAnd
        | BinaryOp::BitOr
        | BinaryOp::BitXor
        | BinaryOp::ShiftLeft
        | BinaryOp::ShiftRight => UnionType::int(),
        BinaryOp::Concat => UnionType::string(),
        BinaryOp::Spaceship => UnionType::union_all(
            [UnionType::literal_int(-1), UnionType::literal_int(0), UnionType::literal_int(1)],
            limits,
        ),
        _ => UnionType::bool(),
    }
}

fn binary_flow(op: BinaryOp, left: &FlowType, right: &FlowType, limits: TypeLimits) -> FlowType {
    let ty = binary_type(op, &left.ty, &right.ty, limits);
    let real = if left.is_real_known() && right.is_real_known() {
        binary_type(op, &left.real, &right.real, limits)
    } else if op == BinaryOp::Add {
        // array + array stays an array
        UnionType::mixed()
    } else {
        binary_type(op, &left.real, &right.real, limits)
    };
    FlowType::new(ty, real)
}

fn unary_type(op: UnaryOp, ty: &UnionType) -> UnionType {
    match op {
        UnaryOp::Not => {
            if !ty.can_be_falsey() {
                UnionType::literal_bool(false)
            } else if !ty.can_be_truthy() {
                UnionType::literal_bool(true)
            } else {
                UnionType::bool()
            }
        }
        UnaryOp::Neg => match ty.literal_value() {
            Some(LiteralValue::Int(n)) => n.checked_neg().map_or_else(UnionType::float, UnionType::literal_int),
            _ => arithmetic(ty, &UnionType::int()),
        },
        UnaryOp::Plus => match ty.literal_value() {
            Some(LiteralValue::Int(n)) => UnionType::literal_int(*n),
            _ => arithmetic(ty, &UnionType::int()),
        },
        UnaryOp::BitNot => UnionType::int(),
    }
}

/// Type after `++` or `--`
fn step_type(ty: &UnionType, increment: bool, limits: TypeLimits) -> UnionType {
    if let Some(LiteralValue::Int(n)) = ty.literal_value() {
        let next = if increment { n.checked_add(1) } else { n.checked_sub(1) };
        return next.map_or_else(UnionType::float, UnionType::literal_int);
    }
    if ty.is_null() {
        // null++ is 1, null-- stays null
        return if increment { UnionType::literal_int(1) } else { UnionType::null() };
    }
    ty.flat_map_atoms(false, limits, |atom| match atom.scalar_kind() {
        Some(ScalarKind::Int) => vec![TypeAtom::Scalar(ScalarKind::Int), TypeAtom::Scalar(ScalarKind::Float)],
        Some(ScalarKind::Float) => vec![TypeAtom::Scalar(ScalarKind::Float)],
        Some(ScalarKind::String) => vec![
            TypeAtom::Scalar(ScalarKind::String),
            TypeAtom::Scalar(ScalarKind::Int),
            TypeAtom::Scalar(ScalarKind::Float),
        ],
        _ => vec![atom.clone()],
    })
}

fn cast_type(kind: CastKind, ty: &UnionType) -> UnionType {
    match kind {
        CastKind::Int => match ty.literal_value() {
            Some(LiteralValue::Int(n)) => UnionType::literal_int(*n),
            Some(LiteralValue::Bool(b)) => UnionType::literal_int(i64::from(*b)),
            Some(LiteralValue::String(s)) => {
                s.trim().parse::<i64>().map_or_else(|_| UnionType::int(), UnionType::literal_int)
            }
            None if ty.is_null() => UnionType::literal_int(0),
            None => UnionType::int(),
        },
        CastKind::Float => UnionType::float(),
        CastKind::String => match ty.literal_value() {
            Some(value) => UnionType::literal_string(&literal_text(value)),
            None if ty.is_null() => UnionType::literal_string(""),
            None => UnionType::string(),
        },
        CastKind::Bool => unary_type(UnaryOp::Not, &unary_type(UnaryOp::Not, ty)),
        CastKind::Array => {
            if ty.is_null() {
                UnionType::empty_array()
            } else if !ty.is_empty() && !ty.is_nullable() && ty.atoms().iter().all(TypeAtom::is_array_like) {
                ty.clone()
            } else {
                UnionType::array()
            }
        }
        CastKind::Object => {
            if !ty.is_empty() && !ty.is_nullable() && ty.atoms().iter().all(TypeAtom::is_object_like) {
                ty.clone()
            } else {
                UnionType::instance(Fqsen::new("stdClass"))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::context::AnalysisEnv;
    use crate::ast::AstBuilder;
    use crate::config::AnalysisConfig;
    use crate::errors::DiagnosticKind;
    use crate::symbols::{ClassDescriptor, MemorySymbolIndex, ParamSignature, PropertyDescriptor, SymbolIndex};

    fn env_with(index: MemorySymbolIndex) -> AnalysisEnv {
        AnalysisEnv::new(Arc::new(index) as Arc<dyn SymbolIndex>, AnalysisConfig::default())
    }

    fn analyzer(env: &AnalysisEnv) -> FunctionAnalyzer<'_> {
        FunctionAnalyzer::new(env, Fqsen::new("test"), None, false)
    }

    #[test]
    fn test_literal_arithmetic_folds() {
        let env = env_with(MemorySymbolIndex::new());
        let mut a = analyzer(&env);
        let b = AstBuilder::new();
        let sum = b.binary(BinaryOp::Add, b.int(2), b.int(3));
        let (ty, _) = a.eval(&sum, ScopeSnapshot::new());
        assert_eq!(ty.ty, UnionType::literal_int(5));

        let overflow = b.binary(BinaryOp::Mul, b.int(i64::MAX), b.int(2));
        let (ty, _) = a.eval(&overflow, ScopeSnapshot::new());
        assert_eq!(ty.ty, UnionType::float());

        let concat = b.binary(BinaryOp::Concat, b.string("a"), b.int(1));
        let (ty, _) = a.eval(&concat, ScopeSnapshot::new());
        assert_eq!(ty.ty, UnionType::literal_string("a1"));
    }

    #[test]
    fn test_array_literal_builds_shape() {
        let env = env_with(MemorySymbolIndex::new());
        let mut a = analyzer(&env);
        let b = AstBuilder::new();
        let array = b.array(vec![(Some(b.string("id")), b.int(1)), (None, b.string("x"))]);
        let (ty, _) = a.eval(&array, ScopeSnapshot::new());
        let expected = ArrayShape::empty()
            .with_field(ArrayKey::String(Arc::from("id")), ShapeField::required(UnionType::literal_int(1)))
            .with_field(ArrayKey::Int(0), ShapeField::required(UnionType::literal_string("x")));
        assert_eq!(ty.ty, UnionType::shape(expected));
        assert!(ty.is_real_known());
    }

    #[test]
    fn test_append_creates_list_entries() {
        let env = env_with(MemorySymbolIndex::new());
        let mut a = analyzer(&env);
        let b = AstBuilder::new();
        let scope = ScopeSnapshot::new().with_assigned("a", FlowType::exact(UnionType::empty_array()), true);
        let (_, scope) = a.eval(&b.assign(b.append(b.var("a")), b.int(7)), scope);
        let (ty, _) = a.eval(&b.dim(b.var("a"), b.int(0)), scope);
        assert_eq!(ty.ty, UnionType::literal_int(7));
    }

    #[test]
    fn test_undeclared_variable_suggests_similar_name() {
        let env = env_with(MemorySymbolIndex::new());
        let mut a = analyzer(&env);
        let b = AstBuilder::new();
        let scope = ScopeSnapshot::new().with_assigned("count", FlowType::exact(UnionType::int()), true);
        let (ty, _) = a.eval(&b.var("cuont"), scope);
        assert!(ty.ty.is_mixed());
        let diagnostics = a.diagnostics.diagnostics();
        assert_eq!(diagnostics.len(), 1);
        assert!(matches!(diagnostics[0].kind, DiagnosticKind::UndeclaredVariable { .. }));
        assert_eq!(diagnostics[0].suggestions, vec!["did you mean $count?".to_string()]);
    }

    #[test]
    fn test_coalesce_on_non_null_is_redundant() {
        let env = env_with(MemorySymbolIndex::new());
        let mut a = analyzer(&env);
        let b = AstBuilder::new();
        let scope = ScopeSnapshot::new().with_assigned("x", FlowType::exact(UnionType::int()), true);
        let (ty, _) = a.eval(&b.coalesce(b.var("x"), b.int(0)), scope);
        assert_eq!(ty.ty, UnionType::int());
        assert!(matches!(a.diagnostics.diagnostics()[0].kind, DiagnosticKind::RedundantCoalesce { .. }));

        let mut a = analyzer(&env);
        let scope = ScopeSnapshot::new().with_assigned("y", FlowType::exact(UnionType::int().with_null()), true);
        let (ty, _) = a.eval(&b.coalesce(b.var("y"), b.string("none")), scope);
        assert_eq!(ty.ty, UnionType::int().union(&UnionType::literal_string("none")));
        assert!(a.diagnostics.is_empty());
    }

    #[test]
    fn test_argument_mismatch_and_too_few_arguments() {
        let index = MemorySymbolIndex::new();
        index.register_function(
            Signature::new(Fqsen::new("takes_int"))
                .with_params(vec![ParamSignature::new("n", Some(UnionType::int()))])
                .returning(UnionType::string()),
        );
        let env = env_with(index);
        let mut a = analyzer(&env);
        let b = AstBuilder::new();
        let (ty, _) = a.eval(&b.call("takes_int", vec![b.string("x")]), ScopeSnapshot::new());
        assert_eq!(ty.ty, UnionType::string());
        let (_, _) = a.eval(&b.call("takes_int", vec![]), ScopeSnapshot::new());
        let kinds: Vec<_> = a.diagnostics.diagnostics().iter().map(|d| d.kind.clone()).collect();
        assert!(matches!(kinds[0], DiagnosticKind::TypeMismatchArgument { position: 1, .. }));
        assert!(matches!(kinds[1], DiagnosticKind::TooFewArguments { expected: 1, found: 0, .. }));
    }

    #[test]
    fn test_templated_builtin_keeps_element_type() {
        let env = env_with(MemorySymbolIndex::new());
        let mut a = analyzer(&env);
        let b = AstBuilder::new();
        let arg = UnionType::array_of(UnionType::string(), UnionType::int());
        let scope = ScopeSnapshot::new().with_assigned("m", FlowType::declared(arg), true);
        let (ty, _) = a.eval(&b.call("array_values", vec![b.var("m")]), scope);
        assert_eq!(ty.ty, UnionType::list_of(UnionType::int()));
    }

    #[test]
    fn test_method_and_property_access() {
        let index = MemorySymbolIndex::new();
        index.register_class(
            ClassDescriptor::new("Box")
                .with_templates(&["T"])
                .with_property(PropertyDescriptor::doc_typed("item", UnionType::template("T", Fqsen::new("Box"))))
                .with_method("get", |s| s.doc_returning(UnionType::template("T", Fqsen::new("Box")))),
        );
        let env = env_with(index);
        let mut a = analyzer(&env);
        let b = AstBuilder::new();
        let boxed = UnionType::instance_with_args(Fqsen::new("Box"), vec![UnionType::int()]);
        let scope = ScopeSnapshot::new().with_assigned("b", FlowType::exact(boxed), true);

        let (ty, scope) = a.eval(&b.method_call(b.var("b"), "get", vec![]), scope);
        assert_eq!(ty.ty, UnionType::int());
        let (ty, scope) = a.eval(&b.prop(b.var("b"), "item"), scope);
        assert_eq!(ty.ty, UnionType::int());
        let (_, _) = a.eval(&b.method_call(b.var("b"), "missing", vec![]), scope);
        assert!(matches!(
            a.diagnostics.diagnostics()[0].kind,
            DiagnosticKind::UndeclaredMethod { .. }
        ));
    }

    #[test]
    fn test_member_access_on_scalar() {
        let env = env_with(MemorySymbolIndex::new());
        let mut a = analyzer(&env);
        let b = AstBuilder::new();
        let scope = ScopeSnapshot::new().with_assigned("n", FlowType::exact(UnionType::int()), true);
        a.eval(&b.prop(b.var("n"), "x"), scope);
        assert!(matches!(
            a.diagnostics.diagnostics()[0].kind,
            DiagnosticKind::NonObjectMemberAccess { .. }
        ));
    }

    #[test]
    fn test_new_binds_class_templates() {
        let index = MemorySymbolIndex::new();
        let owner = Fqsen::new("Wrapper");
        index.register_class(ClassDescriptor::new("Wrapper").with_templates(&["T"]).with_method("__construct", |s| {
            s.with_params(vec![ParamSignature::new("value", Some(UnionType::template("T", owner.clone())))])
        }));
        let env = env_with(index);
        let mut a = analyzer(&env);
        let b = AstBuilder::new();
        let (ty, _) = a.eval(&b.new_object("Wrapper", vec![b.string("s")]), ScopeSnapshot::new());
        assert_eq!(
            ty.ty,
            UnionType::instance_with_args(Fqsen::new("Wrapper"), vec![UnionType::literal_string("s")])
        );
        assert!(ty.is_real_known());
    }

    #[test]
    fn test_closure_by_ref_use_writes_back() {
        let env = env_with(MemorySymbolIndex::new());
        let mut a = analyzer(&env);
        let b = AstBuilder::new();
        let body = vec![b.expr_stmt(b.assign(b.var("total"), b.string("done")))];
        let closure = b.closure(vec![], vec![b.use_var("total", true)], body);
        let scope = ScopeSnapshot::new().with_assigned("total", FlowType::exact(UnionType::literal_int(0)), true);
        let (ty, scope) = a.eval(&closure, scope);
        assert!(matches!(ty.ty.atoms()[0], TypeAtom::Callable(_)));
        let total = scope.entry("total").unwrap();
        assert!(total.is_reference);
        assert_eq!(total.ty.ty, UnionType::literal_int(0).union(&UnionType::literal_string("done")));
    }

    #[test]
    fn test_step_and_cast_types() {
        let limits = TypeLimits::default();
        assert_eq!(step_type(&UnionType::literal_int(4), true, limits), UnionType::literal_int(5));
        assert_eq!(step_type(&UnionType::null(), true, limits), UnionType::literal_int(1));
        assert_eq!(cast_type(CastKind::Int, &UnionType::literal_string(" 42")), UnionType::literal_int(42));
        assert_eq!(cast_type(CastKind::Bool, &UnionType::literal_int(0)), UnionType::literal_bool(false));
        assert_eq!(cast_type(CastKind::Array, &UnionType::null()), UnionType::empty_array());
    }
}
