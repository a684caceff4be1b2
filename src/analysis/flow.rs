//! Statement flow
//!
//! Threads one scope snapshot through a statement sequence. Branches fork
//! the snapshot and join it again with [`ScopeSnapshot::merge`]; loops are
//! iterated to a fixed point with widening at the configured cap;
//! `return`, `throw`, `break` and `continue` leave the sequence as
//! out-of-band edges.

use super::context::FunctionAnalyzer;
use crate::ast::{CatchClause, ElseIf, Expr, ExprKind, NodeId, StaticVar, Stmt, StmtKind, SwitchCase};
use crate::core::{FlowType, LiteralValue, TypeLimits, UnionType};
use crate::errors::{AnalysisError, DiagnosticKind};
use crate::infrastructure::metrics;
use crate::scope::{EdgeKind, ScopeKey, ScopeSnapshot, VarEntry, VarKind};
use tracing::{debug, warn};

/// A pending `break N` / `continue N`
#[derive(Debug, Clone)]
struct Jump {
    /// Loops (or switches) still to leave
    depth: u32,
    scope: ScopeSnapshot,
    node: NodeId,
}

/// Result of analyzing statements: the fallthrough scope plus jumps not yet
/// resolved by an enclosing loop
#[derive(Debug)]
pub(crate) struct Flow {
    pub scope: ScopeSnapshot,
    breaks: Vec<Jump>,
    continues: Vec<Jump>,
}

impl Flow {
    fn new(scope: ScopeSnapshot) -> Self {
        Self { scope, breaks: Vec::new(), continues: Vec::new() }
    }

    /// Take over `other`'s jumps and return its scope
    fn absorb(&mut self, other: Flow) -> ScopeSnapshot {
        self.breaks.extend(other.breaks);
        self.continues.extend(other.continues);
        other.scope
    }

    /// Scope flowing back to a loop head: fallthrough plus `continue`
    fn back_edge(&self, limits: TypeLimits) -> ScopeSnapshot {
        let mut inputs = vec![(self.scope.clone(), EdgeKind::Normal)];
        inputs.extend(
            self.continues
                .iter()
                .filter(|j| j.depth <= 1)
                .map(|j| (j.scope.clone(), EdgeKind::Continue)),
        );
        ScopeSnapshot::merge(&inputs, limits)
    }
}

/// Outcome of a whole unit body
#[derive(Debug, Clone)]
pub(crate) struct BodyOutcome {
    pub exit_scope: ScopeSnapshot,
    pub return_type: UnionType,
}

/// Jumps handled at this level, and the rest one level shallower
fn resolve_jumps(jumps: Vec<Jump>) -> (Vec<ScopeSnapshot>, Vec<Jump>) {
    let mut here = Vec::new();
    let mut outer = Vec::new();
    for jump in jumps {
        if jump.depth <= 1 {
            here.push(jump.scope);
        } else {
            outer.push(Jump { depth: jump.depth - 1, ..jump });
        }
    }
    (here, outer)
}

impl<'a> FunctionAnalyzer<'a> {
    /// Analyze a unit body and collect its return type. Falling off the
    /// end returns null.
    pub(crate) fn run_body(&mut self, body: &[Stmt], entry: ScopeSnapshot) -> BodyOutcome {
        let flow = self.analyze_block(body, entry);
        if let Some(stray) = flow.breaks.iter().chain(&flow.continues).next() {
            self.fault(AnalysisError::malformed(stray.node, "break or continue outside of a loop"));
        }

        let returns = std::mem::take(&mut self.returns);
        let mut return_type = UnionType::union_all(returns, self.limits);
        if !flow.scope.is_unreachable() {
            return_type = return_type.union_with(&UnionType::null(), self.limits);
        }
        if self.budget_exhausted {
            return_type = self.declared_return.clone().unwrap_or_else(UnionType::mixed);
        }
        BodyOutcome { exit_scope: flow.scope, return_type }
    }

    pub(crate) fn analyze_block(&mut self, body: &[Stmt], scope: ScopeSnapshot) -> Flow {
        let mut flow = Flow::new(scope);
        if flow.scope.is_unreachable() {
            return flow;
        }
        for (i, stmt) in body.iter().enumerate() {
            if self.is_aborted() {
                break;
            }
            if self.budget_exhausted || !self.tick(stmt.id, stmt.span) {
                flow.scope = flow.scope.all_declared();
                break;
            }
            self.record_scope(stmt.id, &flow.scope);
            self.note_may_throw(&flow.scope);

            let before = flow.scope.clone();
            let next = self.analyze_stmt(stmt, before.clone());
            flow.scope = flow.absorb(next);

            if flow.scope.is_unreachable() {
                self.analyze_dead(&body[i + 1..], before);
                break;
            }
        }
        flow
    }

    /// Statements after a terminal statement: reported once, analyzed from
    /// the last live scope, never merged
    fn analyze_dead(&mut self, rest: &[Stmt], scope: ScopeSnapshot) {
        let Some(first) = rest.iter().find(|s| !matches!(s.kind, StmtKind::Nop)) else { return };
        if self.check.report_unreachable {
            self.report(DiagnosticKind::UnreachableCode, first.id, first.span);
        }
        let returns = self.returns.len();
        let frames: Vec<usize> = self.try_frames.iter().map(Vec::len).collect();
        let _ = self.analyze_block(rest, scope);
        self.returns.truncate(returns);
        for (frame, len) in self.try_frames.iter_mut().zip(frames) {
            frame.truncate(len);
        }
    }

    fn analyze_stmt(&mut self, stmt: &Stmt, scope: ScopeSnapshot) -> Flow {
        match &stmt.kind {
            StmtKind::Expr(expr) => Flow::new(self.eval(expr, scope).1),
            StmtKind::Echo(exprs) => {
                let mut scope = scope;
                for expr in exprs {
                    scope = self.eval(expr, scope).1;
                }
                Flow::new(scope)
            }
            StmtKind::Block(body) => self.analyze_block(body, scope),
            StmtKind::If { cond, then, elseifs, otherwise } => {
                self.analyze_if(cond, then, elseifs, otherwise.as_deref(), scope)
            }
            StmtKind::While { cond, body } => self.analyze_while(stmt, cond, body, scope),
            StmtKind::DoWhile { body, cond } => self.analyze_do_while(stmt, body, cond, scope),
            StmtKind::For { init, cond, step, body } => self.analyze_for(stmt, init, cond, step, body, scope),
            StmtKind::Foreach { subject, key, value, by_ref, body } => {
                self.analyze_foreach(stmt, subject, key.as_ref(), value, *by_ref, body, scope)
            }
            StmtKind::Switch { subject, cases } => self.analyze_switch(subject, cases, scope),
            StmtKind::Try { body, catches, finally } => self.analyze_try(body, catches, finally.as_deref(), scope),
            StmtKind::Return(value) => self.analyze_return(stmt, value.as_ref(), scope),
            StmtKind::Throw(value) => {
                let (_, scope) = self.eval(value, scope);
                self.note_may_throw(&scope);
                Flow::new(scope.mark_unreachable())
            }
            StmtKind::Break(depth) | StmtKind::Continue(depth) => {
                if *depth == 0 {
                    self.fault(AnalysisError::malformed(stmt.id, "break/continue depth must be positive"));
                    return Flow::new(scope.mark_unreachable());
                }
                let jump = Jump { depth: *depth, scope: scope.clone(), node: stmt.id };
                let mut flow = Flow::new(scope.mark_unreachable());
                match stmt.kind {
                    StmtKind::Break(_) => flow.breaks.push(jump),
                    _ => flow.continues.push(jump),
                }
                flow
            }
            StmtKind::Global(names) => {
                let mut scope = scope;
                for name in names {
                    let declared = self.env.index.global_variable_type(name);
                    let ty = FlowType::declared(declared.clone().unwrap_or_else(UnionType::mixed));
                    let entry = VarEntry::local(ty).with_kind(VarKind::Global).with_declared(declared);
                    scope = scope.without_properties_of(name).with_entry(ScopeKey::var(name), entry);
                }
                Flow::new(scope)
            }
            StmtKind::Static(vars) => Flow::new(self.analyze_static(vars, scope)),
            StmtKind::Unset(exprs) => Flow::new(self.analyze_unset(exprs, scope)),
            StmtKind::Nop => Flow::new(scope),
        }
    }

    fn analyze_if(
        &mut self,
        cond: &Expr,
        then: &[Stmt],
        elseifs: &[ElseIf],
        otherwise: Option<&[Stmt]>,
        scope: ScopeSnapshot,
    ) -> Flow {
        let mut flow = Flow::new(ScopeSnapshot::unreachable());
        let mut exits = Vec::new();

        let (t, mut rest) = self.narrow(cond, scope);
        let branch = self.analyze_block(then, t);
        exits.push(flow.absorb(branch));

        for elseif in elseifs {
            let (t, f) = self.narrow(&elseif.cond, rest);
            let branch = self.analyze_block(&elseif.body, t);
            exits.push(flow.absorb(branch));
            rest = f;
        }

        match otherwise {
            Some(body) => {
                let branch = self.analyze_block(body, rest);
                exits.push(flow.absorb(branch));
            }
            None => exits.push(rest),
        }
        flow.scope = ScopeSnapshot::merge_all(&exits, self.limits);
        flow
    }

    /// Iterate `pass` from `entry` until the loop head scope stops changing.
    /// `pass` maps a head scope to the scope flowing back to the head. All
    /// passes but the last are quiet. Returns the stable head, the final
    /// back edge and the final pass's result.
    fn fixed_point<T>(
        &mut self,
        stmt: &Stmt,
        entry: ScopeSnapshot,
        mut pass: impl FnMut(&mut Self, ScopeSnapshot) -> (ScopeSnapshot, T),
    ) -> (ScopeSnapshot, ScopeSnapshot, T) {
        let limits = self.limits;
        let cap = self.env.config.limits.max_loop_iterations;
        let mut head = entry.clone();
        let mut iterations = 0;

        loop {
            iterations += 1;
            self.env.metrics.increment(metrics::LOOP_ITERATIONS);
            let (back, _) = self.quietly(|a| pass(a, head.clone()));
            let next = ScopeSnapshot::merge(&[(entry.clone(), EdgeKind::Normal), (back, EdgeKind::Continue)], limits);
            debug!(unit = %self.unit, iteration = iterations, "loop fixed-point iteration");
            if next == head || self.is_aborted() || self.budget_exhausted {
                break;
            }
            if iterations >= cap {
                self.env.metrics.increment(metrics::LOOP_WIDENINGS);
                warn!(unit = %self.unit, iterations, "loop did not stabilize, widening");
                self.report(DiagnosticKind::LoopFixedPointCap { iterations }, stmt.id, stmt.span);
                head = next.widened(&head, limits);
                // the widened head must absorb its own back edge
                for _ in 0..2 {
                    let (back, _) = self.quietly(|a| pass(a, head.clone()));
                    let check =
                        ScopeSnapshot::merge(&[(head.clone(), EdgeKind::Normal), (back, EdgeKind::Continue)], limits);
                    if check == head {
                        break;
                    }
                    head = check.saturated(&head);
                }
                break;
            }
            head = next;
        }

        let (back, result) = pass(self, head.clone());
        (head, back, result)
    }

    /// Scope after a loop: the normal exit joined with `break` edges
    fn finish_loop(&mut self, exit: ScopeSnapshot, body: Flow) -> Flow {
        let (breaks, outer_breaks) = resolve_jumps(body.breaks);
        let (_, outer_continues) = resolve_jumps(body.continues);
        let mut inputs = vec![(exit, EdgeKind::Normal)];
        inputs.extend(breaks.into_iter().map(|s| (s, EdgeKind::Break)));
        Flow {
            scope: ScopeSnapshot::merge(&inputs, self.limits),
            breaks: outer_breaks,
            continues: outer_continues,
        }
    }

    fn analyze_while(&mut self, stmt: &Stmt, cond: &Expr, body: &[Stmt], scope: ScopeSnapshot) -> Flow {
        let limits = self.limits;
        let (_, _, (exit, flow)) = self.fixed_point(stmt, scope, |a, head| {
            let (t, f) = a.narrow(cond, head);
            let flow = a.analyze_block(body, t);
            (flow.back_edge(limits), (f, flow))
        });
        self.finish_loop(exit, flow)
    }

    fn analyze_do_while(&mut self, stmt: &Stmt, body: &[Stmt], cond: &Expr, scope: ScopeSnapshot) -> Flow {
        let limits = self.limits;
        let (_, _, (exit, flow)) = self.fixed_point(stmt, scope, |a, head| {
            let flow = a.analyze_block(body, head);
            let (t, f) = a.narrow(cond, flow.back_edge(limits));
            (t, (f, flow))
        });
        self.finish_loop(exit, flow)
    }

    fn analyze_for(
        &mut self,
        stmt: &Stmt,
        init: &[Expr],
        cond: &[Expr],
        step: &[Expr],
        body: &[Stmt],
        scope: ScopeSnapshot,
    ) -> Flow {
        let limits = self.limits;
        let mut scope = scope;
        for expr in init {
            scope = self.eval(expr, scope).1;
        }
        let (_, _, (exit, flow)) = self.fixed_point(stmt, scope, |a, head| {
            let (t, f) = a.narrow_for_condition(cond, head);
            let flow = a.analyze_block(body, t);
            let mut tail = flow.back_edge(limits);
            for expr in step {
                tail = a.eval(expr, tail).1;
            }
            (tail, (f, flow))
        });
        self.finish_loop(exit, flow)
    }

    /// Every expression runs; the last one decides. No condition loops
    /// until a `break`.
    fn narrow_for_condition(&mut self, cond: &[Expr], scope: ScopeSnapshot) -> (ScopeSnapshot, ScopeSnapshot) {
        let Some((last, leading)) = cond.split_last() else {
            return (scope.clone(), scope.mark_unreachable());
        };
        let mut scope = scope;
        for expr in leading {
            scope = self.eval(expr, scope).1;
        }
        self.narrow(last, scope)
    }

    #[allow(clippy::too_many_arguments)]
    fn analyze_foreach(
        &mut self,
        stmt: &Stmt,
        subject: &Expr,
        key: Option<&Expr>,
        value: &Expr,
        by_ref: bool,
        body: &[Stmt],
        scope: ScopeSnapshot,
    ) -> Flow {
        let limits = self.limits;
        let (subject_ty, scope) = self.eval(subject, scope);
        if subject_ty.ty.is_definitely_empty_iterable() {
            return Flow::new(scope);
        }
        let non_empty = subject_ty.ty.is_definitely_non_empty_iterable();
        let key_ty = subject_ty.map(|t| t.iterable_key_type(limits));
        let value_ty = subject_ty.map(|t| t.iterable_value_type(limits));

        let (head, back, flow) = self.fixed_point(stmt, scope, |a, head| {
            let mut s = head;
            if let Some(key) = key {
                s = a.assign_to(key, key_ty.clone(), s);
            }
            s = a.assign_to(value, value_ty.clone(), s);
            if let (true, Some(name)) = (by_ref, value.as_variable()) {
                s = s.mark_reference(name);
            }
            let flow = a.analyze_block(body, s);
            (flow.back_edge(limits), flow)
        });
        // a non-empty subject always runs the body at least once
        let exit = if non_empty { back } else { head };
        self.finish_loop(exit, flow)
    }

    /// Case tests are matched in order with loose equality; bodies run in
    /// order with fallthrough. `break` and `continue` both leave the switch.
    fn analyze_switch(&mut self, subject: &Expr, cases: &[SwitchCase], scope: ScopeSnapshot) -> Flow {
        let limits = self.limits;
        let (_, mut remaining) = self.eval(subject, scope);

        let mut entries = Vec::with_capacity(cases.len());
        for case in cases {
            match &case.test {
                Some(test) => {
                    let (value, s) = self.eval(test, remaining);
                    let (t, f) = self.narrow_identical(subject, &value.ty, s, true);
                    entries.push(Some(t));
                    remaining = f;
                }
                None => entries.push(None),
            }
        }
        let has_default = entries.iter().any(Option::is_none);

        let mut exits = Vec::new();
        let mut outer = Flow::new(ScopeSnapshot::unreachable());
        let mut fallthrough = ScopeSnapshot::unreachable();
        for (case, entry) in cases.iter().zip(entries) {
            let entry = entry.unwrap_or_else(|| remaining.clone());
            let entry = ScopeSnapshot::merge_all(&[entry, fallthrough], limits);
            if entry.is_unreachable() {
                fallthrough = entry;
                continue;
            }
            let flow = self.analyze_block(&case.body, entry);
            let (breaks, outer_breaks) = resolve_jumps(flow.breaks);
            let (continues, outer_continues) = resolve_jumps(flow.continues);
            exits.extend(breaks.into_iter().map(|s| (s, EdgeKind::Break)));
            exits.extend(continues.into_iter().map(|s| (s, EdgeKind::Break)));
            outer.breaks.extend(outer_breaks);
            outer.continues.extend(outer_continues);
            fallthrough = flow.scope;
        }
        exits.push((fallthrough, EdgeKind::Normal));
        if !has_default {
            exits.push((remaining, EdgeKind::Normal));
        }
        outer.scope = ScopeSnapshot::merge(&exits, limits);
        outer
    }

    /// Each statement of the body may throw: catches start from the join of
    /// every point inside the body. `finally` runs on each way out.
    fn analyze_try(
        &mut self,
        body: &[Stmt],
        catches: &[CatchClause],
        finally: Option<&[Stmt]>,
        scope: ScopeSnapshot,
    ) -> Flow {
        let limits = self.limits;
        self.try_frames.push(Vec::new());
        let body_flow = self.analyze_block(body, scope);
        let thrown = self.try_frames.pop().unwrap_or_default();
        // uncaught types keep propagating outward
        if let Some(frame) = self.try_frames.last_mut() {
            frame.extend(thrown.iter().cloned());
        }

        let mut flow = Flow::new(ScopeSnapshot::unreachable());
        let mut exits = vec![flow.absorb(body_flow)];
        let caught = ScopeSnapshot::merge_all(&thrown, limits);
        for catch in catches {
            if caught.is_unreachable() {
                break;
            }
            let mut entry = caught.clone();
            if let Some(var) = &catch.var {
                let ty = UnionType::union_all(catch.types.iter().map(|t| UnionType::instance(t.clone())), limits);
                entry = entry.with_assigned(var, FlowType::exact(ty), true);
            }
            let branch = self.analyze_block(&catch.body, entry);
            exits.push(flow.absorb(branch));
        }

        let Some(finally) = finally else {
            flow.scope = ScopeSnapshot::merge_all(&exits, limits);
            return flow;
        };

        let live: Vec<ScopeSnapshot> = exits.into_iter().filter(|s| !s.is_unreachable()).collect();
        if live.is_empty() {
            // only reached on the way out of the unit
            let _ = self.analyze_block(finally, caught);
            flow.scope = ScopeSnapshot::unreachable();
            return flow;
        }
        let mut finished = Vec::with_capacity(live.len());
        for exit in live {
            let after = self.analyze_block(finally, exit);
            finished.push(flow.absorb(after));
        }
        for jump in flow.breaks.iter_mut().chain(flow.continues.iter_mut()) {
            let scope = std::mem::take(&mut jump.scope);
            jump.scope = self.quietly(|a| a.analyze_block(finally, scope)).scope;
        }
        flow.scope = ScopeSnapshot::merge_all(&finished, limits);
        flow
    }

    fn analyze_return(&mut self, stmt: &Stmt, value: Option<&Expr>, scope: ScopeSnapshot) -> Flow {
        let (ty, scope, node, span) = match value {
            Some(expr) => {
                let (ty, scope) = self.eval(expr, scope);
                (ty, scope, expr.id, expr.span)
            }
            None => (FlowType::exact(UnionType::null()), scope, stmt.id, stmt.span),
        };
        if let Some(declared) = self.declared_return.clone() {
            if !ty.ty.is_empty() && !self.can_cast(&ty.ty, &declared) {
                self.report(
                    DiagnosticKind::TypeMismatchReturn { expected: declared.to_string(), found: ty.ty.to_string() },
                    node,
                    span,
                );
            }
        }
        if !scope.is_unreachable() {
            self.returns.push(ty.ty);
        }
        Flow::new(scope.mark_unreachable())
    }

    /// `static $x = ...;` values persist between calls, so only the
    /// declaration is known
    fn analyze_static(&mut self, vars: &[StaticVar], scope: ScopeSnapshot) -> ScopeSnapshot {
        let mut scope = scope;
        for var in vars {
            if let Some(default) = &var.default {
                scope = self.eval(default, scope).1;
            }
            let entry = VarEntry::local(FlowType::declared(UnionType::mixed())).with_kind(VarKind::Static);
            scope = scope.without_properties_of(&var.name).with_entry(ScopeKey::var(&var.name), entry);
        }
        scope
    }

    fn analyze_unset(&mut self, exprs: &[Expr], scope: ScopeSnapshot) -> ScopeSnapshot {
        let mut scope = scope;
        for expr in exprs {
            match &expr.kind {
                ExprKind::Variable(name) => scope = scope.without(name),
                ExprKind::ArrayDim { base, dim: Some(dim) } => {
                    let (key, s) = self.in_isset(|a| a.eval(dim, scope));
                    scope = s;
                    let key = key.ty.literal_value().map(LiteralValue::as_array_key);
                    if let (Some(name), Some(key)) = (base.as_variable(), key) {
                        if let Some(entry) = scope.entry(name) {
                            let ty = entry.ty.map(|t| t.without_offset(&key));
                            scope = scope.with_narrowed(&ScopeKey::var(name), ty);
                        }
                    }
                }
                ExprKind::PropertyFetch { object, .. } => {
                    if let Some(base) = object.as_variable() {
                        scope = scope.without_properties_of(base);
                    }
                }
                _ => self.fault(AnalysisError::malformed(expr.id, "expression cannot be unset")),
            }
        }
        scope
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::context::AnalysisEnv;
    use crate::ast::{AstBuilder, BinaryOp};
    use crate::config::AnalysisConfig;
    use crate::core::{Fqsen, TypeAtom};
    use crate::symbols::{ClassDescriptor, MemorySymbolIndex, Signature, SymbolIndex};
    use std::sync::Arc;

    fn env() -> AnalysisEnv {
        let index = MemorySymbolIndex::new();
        index.register_class(ClassDescriptor::new("E"));
        index.register_global("config", UnionType::array());
        AnalysisEnv::new(Arc::new(index) as Arc<dyn SymbolIndex>, AnalysisConfig::default())
    }

    fn env_with_loop_cap(cap: usize) -> AnalysisEnv {
        let mut config = AnalysisConfig::default();
        config.limits.max_loop_iterations = cap;
        AnalysisEnv::new(Arc::new(MemorySymbolIndex::new()) as Arc<dyn SymbolIndex>, config)
    }

    fn run(env: &AnalysisEnv, body: Vec<Stmt>, entry: ScopeSnapshot) -> (BodyOutcome, FunctionAnalyzer<'_>) {
        let mut a = FunctionAnalyzer::new(env, Fqsen::new("f"), None, false);
        let outcome = a.run_body(&body, entry);
        (outcome, a)
    }

    #[test]
    fn test_if_merge_marks_possibly_undefined() {
        let env = env();
        let b = AstBuilder::new();
        let body = vec![b.if_then(b.var("c"), vec![b.expr_stmt(b.assign(b.var("a"), b.int(1)))])];
        let entry = ScopeSnapshot::new().with_assigned("c", FlowType::declared(UnionType::bool()), true);
        let (outcome, _) = run(&env, body, entry);
        let a = outcome.exit_scope.entry("a").unwrap();
        assert!(a.possibly_undefined);
        assert_eq!(a.ty.ty, UnionType::literal_int(1));
    }

    #[test]
    fn test_terminating_branch_is_excluded_from_merge() {
        let env = env();
        let b = AstBuilder::new();
        let body = vec![
            b.if_then(b.identical(b.var("x"), b.null()), vec![b.throw(b.new_object("E", vec![]))]),
            b.ret_value(b.var("x")),
        ];
        let entry = ScopeSnapshot::new().with_assigned("x", FlowType::declared(UnionType::int().with_null()), true);
        let (outcome, a) = run(&env, body, entry);
        assert_eq!(outcome.return_type, UnionType::int());
        assert!(a.diagnostics.is_empty());
    }

    #[test]
    fn test_unreachable_code_reported_once() {
        let env = env();
        let b = AstBuilder::new();
        let body = vec![
            b.ret_value(b.int(1)),
            b.expr_stmt(b.assign(b.var("a"), b.int(2))),
            b.ret_value(b.string("never")),
        ];
        let (outcome, a) = run(&env, body, ScopeSnapshot::new());
        assert_eq!(outcome.return_type, UnionType::literal_int(1));
        let kinds: Vec<_> = a.diagnostics.diagnostics().iter().map(|d| d.kind.clone()).collect();
        assert_eq!(kinds, vec![DiagnosticKind::UnreachableCode]);
    }

    #[test]
    fn test_while_true_exits_through_break() {
        let env = env();
        let b = AstBuilder::new();
        let body = vec![
            b.while_loop(
                b.bool(true),
                vec![b.expr_stmt(b.assign(b.var("done"), b.string("yes"))), b.break_loop(1)],
            ),
            b.ret_value(b.var("done")),
        ];
        let (outcome, a) = run(&env, body, ScopeSnapshot::new());
        assert_eq!(outcome.return_type, UnionType::literal_string("yes"));
        assert!(a.diagnostics.is_empty());
    }

    #[test]
    fn test_loop_counter_stabilizes() {
        let env = env();
        let b = AstBuilder::new();
        let body = vec![
            b.expr_stmt(b.assign(b.var("i"), b.int(0))),
            b.while_loop(
                b.binary(BinaryOp::Less, b.var("i"), b.int(10)),
                vec![b.expr_stmt(b.post_inc(b.var("i")))],
            ),
            b.ret_value(b.var("i")),
        ];
        let (outcome, _) = run(&env, body, ScopeSnapshot::new());
        // ++ on an int may overflow to float
        assert_eq!(outcome.return_type, UnionType::int_or_float());
        assert!(env.metrics.counter(metrics::LOOP_ITERATIONS) >= 2);
    }

    #[test]
    fn test_foreach_over_empty_array_skips_body() {
        let env = env();
        let b = AstBuilder::new();
        let body = vec![
            b.foreach(b.array(vec![]), None, b.var("v"), vec![b.expr_stmt(b.assign(b.var("seen"), b.int(1)))]),
            b.ret_value(b.var("v")),
        ];
        let (_, a) = run(&env, body, ScopeSnapshot::new());
        assert!(matches!(
            a.diagnostics.diagnostics()[0].kind,
            DiagnosticKind::UndeclaredVariable { .. }
        ));
    }

    #[test]
    fn test_foreach_binds_value_type() {
        let env = env();
        let b = AstBuilder::new();
        let body = vec![
            b.expr_stmt(b.assign(b.var("sum"), b.int(0))),
            b.foreach(
                b.var("items"),
                Some(b.var("k")),
                b.var("v"),
                vec![b.expr_stmt(b.assign_op(BinaryOp::Add, b.var("sum"), b.var("v")))],
            ),
            b.ret_value(b.var("sum")),
        ];
        let entry = ScopeSnapshot::new()
            .with_assigned("items", FlowType::declared(UnionType::list_of(UnionType::int())), true);
        let (outcome, a) = run(&env, body, entry);
        assert_eq!(outcome.return_type, UnionType::int());
        assert!(a.diagnostics.is_empty());
    }

    #[test]
    fn test_switch_fallthrough_merges_paths() {
        let env = env();
        let b = AstBuilder::new();
        let body = vec![
            b.switch(
                b.var("s"),
                vec![
                    b.case(b.string("a"), vec![b.expr_stmt(b.assign(b.var("r"), b.int(1))), b.break_loop(1)]),
                    b.case(b.string("b"), vec![]),
                    b.case(b.string("c"), vec![b.expr_stmt(b.assign(b.var("r"), b.int(2))), b.break_loop(1)]),
                ],
            ),
            b.ret_value(b.var("r")),
        ];
        let subject = UnionType::literal_string("a")
            .union(&UnionType::literal_string("b"))
            .union(&UnionType::literal_string("c"));
        let entry = ScopeSnapshot::new().with_assigned("s", FlowType::declared(subject), true);
        let (outcome, a) = run(&env, body, entry);
        assert_eq!(outcome.return_type, UnionType::literal_int(1).union(&UnionType::literal_int(2)));
        assert!(a.diagnostics.is_empty());
    }

    #[test]
    fn test_catch_sees_every_prefix_of_try() {
        let env = env();
        let b = AstBuilder::new();
        let body = vec![b.try_catch(
            vec![
                b.expr_stmt(b.assign(b.var("a"), b.int(1))),
                b.throw(b.new_object("E", vec![])),
            ],
            vec![b.catch(&["E"], Some("e"), vec![b.ret_value(b.var("a"))])],
            None,
        )];
        let (_, a) = run(&env, body, ScopeSnapshot::new());
        assert!(matches!(
            a.diagnostics.diagnostics()[0].kind,
            DiagnosticKind::PossiblyUndefinedVariable { .. }
        ));
    }

    #[test]
    fn test_finally_runs_on_every_exit() {
        let env = env();
        let b = AstBuilder::new();
        let body = vec![
            b.try_catch(
                vec![b.expr_stmt(b.assign(b.var("a"), b.int(1)))],
                vec![b.catch(&["E"], None, vec![b.expr_stmt(b.assign(b.var("a"), b.int(2)))])],
                Some(vec![b.expr_stmt(b.assign(b.var("done"), b.bool(true)))]),
            ),
            b.ret_value(b.var("done")),
        ];
        let (outcome, a) = run(&env, body, ScopeSnapshot::new());
        assert_eq!(outcome.return_type, UnionType::literal_bool(true));
        assert!(a.diagnostics.is_empty());
    }

    #[test]
    fn test_nested_break_leaves_outer_loop() {
        let env = env();
        let b = AstBuilder::new();
        let body = vec![
            b.while_loop(
                b.var("c"),
                vec![b.while_loop(
                    b.var("c"),
                    vec![b.expr_stmt(b.assign(b.var("x"), b.int(1))), b.break_loop(2)],
                )],
            ),
        ];
        let entry = ScopeSnapshot::new().with_assigned("c", FlowType::declared(UnionType::bool()), true);
        let (outcome, a) = run(&env, body, entry);
        assert!(a.fault.is_none());
        let x = outcome.exit_scope.entry("x").unwrap();
        assert!(x.possibly_undefined);
    }

    #[test]
    fn test_stray_break_is_a_fault() {
        let env = env();
        let b = AstBuilder::new();
        let (_, a) = run(&env, vec![b.break_loop(1)], ScopeSnapshot::new());
        assert!(matches!(a.fault, Some(AnalysisError::MalformedTree { .. })));
    }

    #[test]
    fn test_global_and_unset() {
        let env = env();
        let b = AstBuilder::new();
        let body = vec![
            b.global(&["config"]),
            b.expr_stmt(b.assign(b.var("tmp"), b.int(1))),
            b.unset(vec![b.var("tmp")]),
        ];
        let (outcome, _) = run(&env, body, ScopeSnapshot::new());
        let config = outcome.exit_scope.entry("config").unwrap();
        assert_eq!(config.kind, VarKind::Global);
        assert_eq!(config.ty.ty, UnionType::array());
        assert!(outcome.exit_scope.entry("tmp").is_none());
    }

    #[test]
    fn test_loop_append_widens_to_list() {
        let env = env();
        let b = AstBuilder::new();
        let body = vec![
            b.expr_stmt(b.assign(b.var("acc"), b.array(vec![]))),
            b.while_loop(b.var("c"), vec![b.expr_stmt(b.assign(b.append(b.var("acc")), b.int(1)))]),
            b.ret_value(b.var("acc")),
        ];
        let entry = ScopeSnapshot::new().with_assigned("c", FlowType::declared(UnionType::bool()), true);
        let (outcome, _) = run(&env, body, entry);
        assert!(outcome
            .return_type
            .atoms()
            .iter()
            .any(|atom| matches!(atom, TypeAtom::GenericArray(g) if *g.value == UnionType::int())));
    }

    #[test]
    fn test_unbounded_nesting_widens_to_mixed() {
        let env = env_with_loop_cap(2);
        let b = AstBuilder::new();
        let body = vec![
            b.while_loop(b.var("d"), vec![b.expr_stmt(b.assign(b.var("i"), b.list_literal(vec![b.var("i")])))]),
            b.ret_value(b.var("i")),
        ];
        let entry = ScopeSnapshot::new()
            .with_assigned("d", FlowType::declared(UnionType::bool()), true)
            .with_assigned("i", FlowType::exact(UnionType::int().union(&UnionType::string())), true);
        let (outcome, a) = run(&env, body, entry);
        assert_eq!(outcome.return_type, UnionType::mixed());
        assert!(a
            .diagnostics
            .diagnostics()
            .iter()
            .any(|d| matches!(d.kind, DiagnosticKind::LoopFixedPointCap { iterations: 2 })));
    }

    #[test]
    fn test_loop_cap_widens_declared_variable() {
        let env = env_with_loop_cap(2);
        let b = AstBuilder::new();
        let body = vec![
            b.while_loop(
                b.var("c"),
                vec![b.expr_stmt(b.assign(b.var("n"), b.binary(BinaryOp::Add, b.var("n"), b.int(1))))],
            ),
            b.ret_value(b.var("n")),
        ];
        let counter = VarEntry::local(FlowType::exact(UnionType::literal_int(0))).with_declared(Some(UnionType::int()));
        let entry = ScopeSnapshot::new()
            .with_assigned("c", FlowType::declared(UnionType::bool()), true)
            .with_entry(ScopeKey::var("n"), counter);
        let (outcome, a) = run(&env, body, entry);
        assert_eq!(outcome.return_type, UnionType::int());
        assert!(matches!(
            a.diagnostics.diagnostics()[0].kind,
            DiagnosticKind::LoopFixedPointCap { iterations: 2 }
        ));
        assert_eq!(env.metrics.counter(metrics::LOOP_WIDENINGS), 1);
    }

    #[test]
    fn test_opaque_call_reverts_narrowed_global() {
        let index = MemorySymbolIndex::new();
        index.register_global("limit", UnionType::int().with_null());
        index.register_function(Signature::new(Fqsen::new("refresh_settings")));
        index.register_function(Signature::new(Fqsen::new("measure_width")).pure());
        let env = AnalysisEnv::new(Arc::new(index) as Arc<dyn SymbolIndex>, AnalysisConfig::default());
        let b = AstBuilder::new();

        let after_pure = b.var("limit");
        let after_pure_id = after_pure.id;
        let after_call = b.var("limit");
        let after_call_id = after_call.id;
        let body = vec![
            b.global(&["limit"]),
            b.if_then(b.identical(b.var("limit"), b.null()), vec![b.ret_value(b.int(0))]),
            b.expr_stmt(b.call("measure_width", vec![])),
            b.expr_stmt(b.assign(b.var("seen"), after_pure)),
            b.expr_stmt(b.call("refresh_settings", vec![])),
            b.ret_value(after_call),
        ];
        let (_, a) = run(&env, body, ScopeSnapshot::new());
        assert_eq!(a.node_types.get(&after_pure_id), Some(&UnionType::int()));
        assert_eq!(a.node_types.get(&after_call_id), Some(&UnionType::int().with_null()));
    }
}
