//! Per-run and per-unit analysis state
//!
//! [`AnalysisEnv`] is shared read-only by every worker: symbol index,
//! configuration, caches and metrics. [`FunctionAnalyzer`] holds the
//! mutable state of one function-like unit; its expression, narrowing and
//! statement logic live in the sibling modules.

use crate::ast::{ClassContext, ClassRef, FunctionKind, FunctionLike, NodeId, ParamDecl, Span};
use crate::config::{AnalysisConfig, CheckConfig};
use crate::core::cast::{can_cast_to, CastMode};
use crate::core::{ClassGraph, FlowType, Fqsen, TypeAtom, TypeLimits, UnionType};
use crate::errors::{AnalysisError, Diagnostic, DiagnosticCollector, DiagnosticKind};
use crate::infrastructure::metrics::{self, AnalysisMetrics};
use crate::scope::{ScopeKey, ScopeSnapshot, VarEntry, VarKind};
use crate::symbols::{builtins, ClassHierarchy, Signature, SymbolIndex};
use dashmap::DashMap;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{error, warn};

/// Caches owned by one analysis driver and shared by its workers
pub struct AnalysisCaches {
    pub hierarchy: ClassHierarchy,
    /// Return types inferred from callee bodies
    inferred_returns: DashMap<Fqsen, UnionType>,
}

impl AnalysisCaches {
    pub fn new(index: Arc<dyn SymbolIndex>) -> Self {
        Self { hierarchy: ClassHierarchy::new(index), inferred_returns: DashMap::new() }
    }

    pub fn inferred_return(&self, fqsen: &Fqsen) -> Option<UnionType> {
        self.inferred_returns.get(fqsen).map(|r| r.value().clone())
    }

    pub(crate) fn remember_return(&self, fqsen: Fqsen, ty: UnionType) {
        self.inferred_returns.insert(fqsen, ty);
    }

    pub fn inferred_return_count(&self) -> usize {
        self.inferred_returns.len()
    }
}

pub struct AnalysisEnv {
    pub index: Arc<dyn SymbolIndex>,
    pub config: AnalysisConfig,
    pub caches: AnalysisCaches,
    pub metrics: AnalysisMetrics,
}

impl AnalysisEnv {
    pub fn new(index: Arc<dyn SymbolIndex>, config: AnalysisConfig) -> Self {
        Self {
            caches: AnalysisCaches::new(index.clone()),
            index,
            config,
            metrics: AnalysisMetrics::new(),
        }
    }
}

/// Analysis state of one function-like unit
pub struct FunctionAnalyzer<'a> {
    pub(crate) env: &'a AnalysisEnv,
    pub(crate) unit: Fqsen,
    pub(crate) class: Option<Fqsen>,
    pub(crate) is_static: bool,
    pub(crate) check: CheckConfig,
    pub(crate) limits: TypeLimits,
    pub(crate) declared_return: Option<UnionType>,
    pub(crate) diagnostics: DiagnosticCollector,
    /// Diagnostics are dropped while non-zero (fixed-point passes, dead code)
    pub(crate) quiet: u32,
    /// Reads under `isset`, `empty` and `??` do not report missing names
    pub(crate) isset_mode: u32,
    pub(crate) node_types: HashMap<NodeId, UnionType>,
    pub(crate) scopes: HashMap<NodeId, ScopeSnapshot>,
    pub(crate) steps: usize,
    pub(crate) budget_exhausted: bool,
    /// Scopes from which an exception may be raised, one frame per `try`
    pub(crate) try_frames: Vec<Vec<ScopeSnapshot>>,
    pub(crate) returns: Vec<UnionType>,
    pub(crate) fault: Option<AnalysisError>,
    /// Nesting of return-type inference through callee bodies
    pub(crate) depth: usize,
    pub(crate) inference_stack: Vec<Fqsen>,
    pub(crate) recursion_cutoff: bool,
}

impl<'a> FunctionAnalyzer<'a> {
    pub fn new(env: &'a AnalysisEnv, unit: Fqsen, class_context: Option<&ClassContext>, is_static: bool) -> Self {
        let check = env.config.check_for(&unit).clone();
        Self {
            env,
            class: class_context.map(|c| c.class.clone()),
            is_static,
            check,
            limits: env.config.limits(),
            declared_return: None,
            diagnostics: DiagnosticCollector::with_max(env.config.diagnostics.max_diagnostics),
            quiet: 0,
            isset_mode: 0,
            node_types: HashMap::new(),
            scopes: HashMap::new(),
            steps: 0,
            budget_exhausted: false,
            try_frames: Vec::new(),
            returns: Vec::new(),
            fault: None,
            depth: 0,
            inference_stack: vec![unit.clone()],
            recursion_cutoff: false,
            unit,
        }
    }

    /// Analyzer for a declaration, checking its class context exists
    pub fn for_declaration(env: &'a AnalysisEnv, decl: &FunctionLike) -> Result<Self, AnalysisError> {
        if let Some(ctx) = &decl.class_context {
            if env.index.resolve_class(&ctx.class).is_none() {
                return Err(AnalysisError::MissingDeclaration { fqsen: ctx.class.clone() });
            }
        }
        let mut analyzer = Self::new(env, decl.fqsen.clone(), decl.class_context.as_ref(), decl.is_static);
        analyzer.declared_return = decl.declared_return().map(|t| analyzer.resolve_static(t));
        Ok(analyzer)
    }

    pub(crate) fn graph(&self) -> &'a dyn ClassGraph {
        &self.env.caches.hierarchy
    }

    pub(crate) fn hierarchy(&self) -> &'a ClassHierarchy {
        &self.env.caches.hierarchy
    }

    pub(crate) fn cast_mode(&self) -> CastMode {
        if self.check.weak_typing {
            CastMode::Weak
        } else {
            CastMode::Strict
        }
    }

    pub(crate) fn can_cast(&self, source: &UnionType, target: &UnionType) -> bool {
        can_cast_to(source, target, self.graph(), self.cast_mode())
    }

    pub(crate) fn report(&mut self, kind: DiagnosticKind, node: NodeId, span: Span) {
        if self.quiet > 0 {
            return;
        }
        self.diagnostics.add(Diagnostic::new(kind, self.unit.clone(), node, span));
    }

    pub(crate) fn report_with(&mut self, kind: DiagnosticKind, node: NodeId, span: Span, suggestions: Vec<String>) {
        if self.quiet > 0 {
            return;
        }
        let diagnostic = Diagnostic::new(kind, self.unit.clone(), node, span)
            .with_suggestions(suggestions.into_iter().map(|s| format!("did you mean ${}?", s)).collect());
        self.diagnostics.add(diagnostic);
    }

    /// Run `f` with diagnostics suppressed
    pub(crate) fn quietly<T>(&mut self, f: impl FnOnce(&mut Self) -> T) -> T {
        self.quiet += 1;
        let result = f(self);
        self.quiet -= 1;
        result
    }

    /// Run `f` without missing-name diagnostics
    pub(crate) fn in_isset<T>(&mut self, f: impl FnOnce(&mut Self) -> T) -> T {
        self.isset_mode += 1;
        let result = f(self);
        self.isset_mode -= 1;
        result
    }

    /// Record a structural fault; the first one aborts the unit
    pub(crate) fn fault(&mut self, err: AnalysisError) {
        if self.fault.is_none() {
            error!(unit = %self.unit, error = %err, "structural fault, abandoning unit");
            self.fault = Some(err);
        }
    }

    pub(crate) fn is_aborted(&self) -> bool {
        self.fault.is_some()
    }

    /// Count one visited node. Returns false once the step budget is spent.
    pub(crate) fn tick(&mut self, node: NodeId, span: Span) -> bool {
        if self.budget_exhausted {
            return false;
        }
        self.steps += 1;
        if self.steps > self.env.config.limits.max_steps_per_unit {
            self.budget_exhausted = true;
            let steps = self.env.config.limits.max_steps_per_unit;
            warn!(unit = %self.unit, steps, "step budget exhausted, widening to declared types");
            self.env.metrics.increment(metrics::BUDGET_EXHAUSTIONS);
            // reported even from quiet passes: the unit's result is degraded
            self.diagnostics.add(Diagnostic::new(
                DiagnosticKind::StepBudgetExhausted { steps },
                self.unit.clone(),
                node,
                span,
            ));
            return false;
        }
        true
    }

    pub(crate) fn record_type(&mut self, node: NodeId, ty: &UnionType) {
        self.node_types.insert(node, ty.clone());
    }

    pub(crate) fn record_scope(&mut self, node: NodeId, scope: &ScopeSnapshot) {
        if self.check.record_scopes {
            self.scopes.insert(node, scope.clone());
        }
    }

    /// Note a point inside a `try` from which control may reach a catch
    pub(crate) fn note_may_throw(&mut self, scope: &ScopeSnapshot) {
        if scope.is_unreachable() {
            return;
        }
        if let Some(frame) = self.try_frames.last_mut() {
            frame.push(scope.clone());
        }
    }

    /// Replace `static` with the class the unit is analyzed in
    pub(crate) fn resolve_static(&self, ty: &UnionType) -> UnionType {
        match &self.class {
            Some(class) => replace_static(ty, class, self.limits),
            None => ty.clone(),
        }
    }

    /// Resolve `self`, `static` and `parent`. Dynamic references return
    /// `Ok(None)`.
    pub(crate) fn resolve_class_ref(&mut self, class: &ClassRef, node: NodeId, span: Span) -> Result<Option<Fqsen>, ()> {
        match class {
            ClassRef::Named(fqsen) => Ok(Some(fqsen.clone())),
            ClassRef::SelfRef | ClassRef::StaticRef => match &self.class {
                Some(c) => Ok(Some(c.clone())),
                None => {
                    self.fault(AnalysisError::malformed(node, "self/static used outside a class"));
                    Err(())
                }
            },
            ClassRef::ParentRef => {
                let class = match &self.class {
                    Some(c) => c.clone(),
                    None => {
                        self.fault(AnalysisError::malformed(node, "parent used outside a class"));
                        return Err(());
                    }
                };
                match self.hierarchy().parent_of(&class) {
                    Some(parent) => Ok(Some(parent)),
                    None => {
                        self.report(DiagnosticKind::ParentWithoutParentClass { class: class.to_string() }, node, span);
                        Err(())
                    }
                }
            }
            ClassRef::Dynamic(_) => Ok(None),
        }
    }

    /// Index first, then the builtin table. A namespaced name falls back to
    /// the global function of the same short name.
    pub(crate) fn lookup_function(&self, fqsen: &Fqsen) -> Option<Arc<Signature>> {
        let found = self.env.index.resolve_function_like(fqsen).or_else(|| builtins::lookup(fqsen));
        if found.is_some() || !fqsen.as_str()[1..].contains('\\') {
            return found;
        }
        let global = Fqsen::new(fqsen.short_name());
        self.env.index.resolve_function_like(&global).or_else(|| builtins::lookup(&global))
    }

    /// Return type of a callee without a declared return type, inferred by
    /// analyzing its body. Depth limited; cut-off results are not cached.
    pub(crate) fn infer_return_type(&mut self, sig: &Signature, node: NodeId, span: Span) -> UnionType {
        if let Some(cached) = self.env.caches.inferred_return(&sig.fqsen) {
            return cached;
        }
        let body = match &sig.body {
            Some(body) => body.clone(),
            None => return UnionType::mixed(),
        };
        let max_depth = self.env.config.limits.max_recursion_depth;
        if self.depth >= max_depth || self.inference_stack.contains(&sig.fqsen) {
            self.recursion_cutoff = true;
            self.env.metrics.increment(metrics::RECURSION_CUTOFFS);
            warn!(unit = %self.unit, callee = %sig.fqsen, depth = self.depth, "return inference depth limit");
            self.report(
                DiagnosticKind::RecursionDepthExceeded { function: sig.fqsen.to_string(), depth: self.depth },
                node,
                span,
            );
            return UnionType::mixed();
        }

        let mut nested = match FunctionAnalyzer::for_declaration(self.env, &body) {
            Ok(nested) => nested,
            Err(e) => {
                error!(callee = %sig.fqsen, error = %e, "cannot infer return type");
                return UnionType::mixed();
            }
        };
        nested.quiet = 1;
        nested.depth = self.depth + 1;
        nested.inference_stack = self.inference_stack.clone();
        nested.inference_stack.push(sig.fqsen.clone());
        self.env.metrics.increment(metrics::RETURN_INFERENCES);

        let entry = nested.entry_scope(&body);
        let outcome = nested.run_body(&body.body, entry);
        if nested.fault.is_some() {
            return UnionType::mixed();
        }
        let inferred = outcome.return_type;
        if nested.recursion_cutoff {
            // nested inferences run quietly
            self.recursion_cutoff = true;
            self.report(
                DiagnosticKind::RecursionDepthExceeded { function: sig.fqsen.to_string(), depth: nested.depth },
                node,
                span,
            );
        } else {
            self.env.caches.remember_return(sig.fqsen.clone(), inferred.clone());
        }
        inferred
    }

    /// Scope at entry of a unit: parameters and `$this`
    pub(crate) fn entry_scope(&self, decl: &FunctionLike) -> ScopeSnapshot {
        let mut scope = ScopeSnapshot::new();
        if decl.kind == FunctionKind::Method && !self.is_static {
            if let Some(class) = &self.class {
                let this = FlowType::exact(UnionType::instance(class.clone()));
                scope = scope.with_entry(ScopeKey::var("this"), VarEntry::local(this).with_kind(VarKind::Parameter));
            }
        }
        for param in &decl.params {
            let (name, entry) = self.param_entry(param);
            scope = scope.with_entry(ScopeKey::var(&name), entry);
        }
        scope
    }

    pub(crate) fn param_entry(&self, param: &ParamDecl) -> (String, VarEntry) {
        let declared = param.ty.as_ref().or(param.real_ty.as_ref()).map(|t| self.resolve_static(t));
        let real = param.real_ty.as_ref().map(|t| self.resolve_static(t));
        let nullable_default = param.default.as_ref().map_or(false, |d| d.is_null_literal());

        let adjust = |t: UnionType| {
            let t = if nullable_default { t.with_null() } else { t };
            if param.variadic {
                UnionType::list_of(t)
            } else {
                t
            }
        };
        let ty = adjust(declared.clone().unwrap_or_else(UnionType::mixed));
        let real = real.map(adjust).unwrap_or_else(UnionType::mixed);
        let entry = VarEntry {
            ty: FlowType::new(ty.clone(), real),
            declared: declared.map(|_| ty),
            possibly_undefined: false,
            kind: VarKind::Parameter,
            is_reference: param.by_ref,
        };
        (param.name.to_string(), entry)
    }
}

pub(crate) fn replace_static(ty: &UnionType, class: &Fqsen, limits: TypeLimits) -> UnionType {
    if !ty.atoms().iter().any(|a| matches!(a, TypeAtom::StaticSelf)) {
        return ty.clone();
    }
    ty.map_atoms(limits, |atom| match atom {
        TypeAtom::StaticSelf => TypeAtom::instance(class.clone()),
        other => other.clone(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::AstBuilder;
    use crate::symbols::{ClassDescriptor, MemorySymbolIndex, Signature};

    fn env() -> AnalysisEnv {
        AnalysisEnv::new(Arc::new(MemorySymbolIndex::new()), AnalysisConfig::default())
    }

    #[test]
    fn test_entry_scope_params() {
        let env = env();
        let b = AstBuilder::new();
        let mut nullable = b.typed_param("x", UnionType::int());
        nullable.default = Some(b.null());
        let mut rest = b.typed_param("rest", UnionType::string());
        rest.variadic = true;
        let decl = b.function("f", vec![nullable, rest, b.param("m")], vec![]);

        let analyzer = FunctionAnalyzer::for_declaration(&env, &decl).unwrap();
        let scope = analyzer.entry_scope(&decl);
        assert_eq!(scope.get("x"), Some(&UnionType::int().with_null()));
        assert_eq!(scope.get("rest"), Some(&UnionType::list_of(UnionType::string())));
        assert_eq!(scope.get("m"), Some(&UnionType::mixed()));
        assert!(scope.entry("x").unwrap().ty.is_real_known());
        assert!(scope.entry("m").unwrap().declared.is_none());
    }

    #[test]
    fn test_missing_class_context_is_structural() {
        let env = env();
        let b = AstBuilder::new();
        let decl = b.method("Nowhere", "run", vec![], vec![]);
        let err = FunctionAnalyzer::for_declaration(&env, &decl).err().unwrap();
        assert!(matches!(err, AnalysisError::MissingDeclaration { .. }));
    }

    #[test]
    fn test_budget_reported_once() {
        let mut config = AnalysisConfig::default();
        config.limits.max_steps_per_unit = 2;
        let env = AnalysisEnv::new(Arc::new(MemorySymbolIndex::new()), config);
        let mut analyzer = FunctionAnalyzer::new(&env, Fqsen::new("f"), None, false);
        assert!(analyzer.tick(NodeId(1), Span::default()));
        assert!(analyzer.tick(NodeId(2), Span::default()));
        assert!(!analyzer.tick(NodeId(3), Span::default()));
        assert!(!analyzer.tick(NodeId(4), Span::default()));
        assert_eq!(analyzer.diagnostics.len(), 1);
        assert_eq!(env.metrics.counter(metrics::BUDGET_EXHAUSTIONS), 1);
    }

    #[test]
    fn test_static_method_has_no_this() {
        let index = MemorySymbolIndex::new();
        index.register_class(ClassDescriptor::new("Counter"));
        let env = AnalysisEnv::new(Arc::new(index), AnalysisConfig::default());
        let b = AstBuilder::new();

        let instance = b.method("Counter", "next", vec![], vec![]);
        let analyzer = FunctionAnalyzer::for_declaration(&env, &instance).unwrap();
        let this = analyzer.entry_scope(&instance);
        assert_eq!(this.get("this"), Some(&UnionType::instance(Fqsen::new("Counter"))));

        let mut shared = b.method("Counter", "create", vec![], vec![]);
        shared.is_static = true;
        let analyzer = FunctionAnalyzer::for_declaration(&env, &shared).unwrap();
        assert!(analyzer.entry_scope(&shared).get("this").is_none());
    }

    #[test]
    fn test_self_recursion_is_cut_off_and_not_cached() {
        let b = AstBuilder::new();
        let spin = b.function(
            "spin",
            vec![b.param("n")],
            vec![
                b.if_then(b.var("n"), vec![b.ret_value(b.call("spin", vec![b.var("n")]))]),
                b.ret_value(b.int(1)),
            ],
        );
        let index = MemorySymbolIndex::new();
        index.register_function(Signature::new(Fqsen::new("spin")).with_body(spin));
        let env = AnalysisEnv::new(Arc::new(index), AnalysisConfig::default());

        let mut analyzer = FunctionAnalyzer::new(&env, Fqsen::new("caller"), None, false);
        let sig = analyzer.lookup_function(&Fqsen::new("spin")).unwrap();
        let inferred = analyzer.infer_return_type(&sig, NodeId(7), Span::default());

        assert_eq!(inferred, UnionType::mixed());
        assert!(analyzer.recursion_cutoff);
        assert!(env.caches.inferred_return(&Fqsen::new("spin")).is_none());
        assert_eq!(env.metrics.counter(metrics::RECURSION_CUTOFFS), 1);
        assert!(matches!(
            analyzer.diagnostics.diagnostics()[0].kind,
            DiagnosticKind::RecursionDepthExceeded { .. }
        ));
    }

    #[test]
    fn test_call_chain_deeper_than_limit() {
        let b = AstBuilder::new();
        let index = MemorySymbolIndex::new();
        let leaf = b.function("leaf", vec![], vec![b.ret_value(b.string("done"))]);
        let middle = b.function("middle", vec![], vec![b.ret_value(b.call("leaf", vec![]))]);
        let top = b.function("top", vec![], vec![b.ret_value(b.call("middle", vec![]))]);
        index.register_function(Signature::new(Fqsen::new("leaf")).with_body(leaf));
        index.register_function(Signature::new(Fqsen::new("middle")).with_body(middle));
        index.register_function(Signature::new(Fqsen::new("top")).with_body(top));

        let mut config = AnalysisConfig::default();
        config.limits.max_recursion_depth = 2;
        let env = AnalysisEnv::new(Arc::new(index), config);
        let mut analyzer = FunctionAnalyzer::new(&env, Fqsen::new("caller"), None, false);
        let sig = analyzer.lookup_function(&Fqsen::new("top")).unwrap();
        assert_eq!(analyzer.infer_return_type(&sig, NodeId(1), Span::default()), UnionType::mixed());
        assert!(env.caches.inferred_return(&Fqsen::new("top")).is_none());
        assert!(env.caches.inferred_return(&Fqsen::new("middle")).is_none());

        // within the limit the same chain resolves and is cached
        let env = AnalysisEnv::new(analyzer.env.index.clone(), AnalysisConfig::default());
        let mut analyzer = FunctionAnalyzer::new(&env, Fqsen::new("caller"), None, false);
        let sig = analyzer.lookup_function(&Fqsen::new("top")).unwrap();
        assert_eq!(analyzer.infer_return_type(&sig, NodeId(1), Span::default()), UnionType::literal_string("done"));
        assert!(analyzer.diagnostics.is_empty());
        assert_eq!(env.caches.inferred_return(&Fqsen::new("top")), Some(UnionType::literal_string("done")));
    }
}
