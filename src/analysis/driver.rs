//! Analysis entry points
//!
//! [`Analyzer`] owns the shared environment of one run (symbol index,
//! configuration, caches, metrics) and analyzes one function-like unit per
//! call. Calls on the same analyzer may run concurrently.

use super::context::{AnalysisCaches, AnalysisEnv, FunctionAnalyzer};
use crate::ast::{ClassContext, Expr, FunctionLike, NodeId};
use crate::config::AnalysisConfig;
use crate::core::{Fqsen, UnionType};
use crate::errors::{AnalysisError, Diagnostic, Severity};
use crate::infrastructure::metrics::{self, AnalysisMetrics, Timer};
use crate::scope::ScopeSnapshot;
use crate::symbols::SymbolIndex;
use serde_json::{json, Value};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tracing::{debug, error, instrument};

/// Everything inferred for one function-like unit
#[derive(Debug, Clone)]
pub struct FunctionAnalysis {
    pub unit: Fqsen,
    pub node_types: HashMap<NodeId, UnionType>,
    pub inferred_return_type: UnionType,
    pub diagnostics: Vec<Diagnostic>,
    /// Scope before each statement, when `check.record_scopes` is on
    pub scopes: HashMap<NodeId, ScopeSnapshot>,
    /// Scope at the end of the body; `None` if the end is unreachable
    pub exit_scope: Option<ScopeSnapshot>,
}

impl FunctionAnalysis {
    pub fn type_of(&self, node: NodeId) -> Option<&UnionType> {
        self.node_types.get(&node)
    }

    pub fn scope_before(&self, stmt: NodeId) -> Option<&ScopeSnapshot> {
        self.scopes.get(&stmt)
    }

    pub fn has_errors(&self) -> bool {
        self.diagnostics.iter().any(|d| d.severity == Severity::Error)
    }

    /// JSON summary: return type, diagnostics and exit scope
    pub fn to_report(&self) -> Value {
        json!({
            "unit": self.unit.to_string(),
            "inferred_return_type": self.inferred_return_type.to_string(),
            "diagnostics": serde_json::to_value(&self.diagnostics).unwrap_or(Value::Null),
            "exit_scope": self.exit_scope.as_ref().and_then(|s| serde_json::to_value(s).ok()),
        })
    }
}

pub struct Analyzer {
    env: AnalysisEnv,
}

impl Analyzer {
    pub fn new(index: Arc<dyn SymbolIndex>, config: AnalysisConfig) -> Self {
        Self { env: AnalysisEnv::new(index, config) }
    }

    pub fn with_default_config(index: Arc<dyn SymbolIndex>) -> Self {
        Self::new(index, AnalysisConfig::default())
    }

    pub fn config(&self) -> &AnalysisConfig {
        &self.env.config
    }

    pub fn metrics(&self) -> &AnalysisMetrics {
        &self.env.metrics
    }

    pub fn caches(&self) -> &AnalysisCaches {
        &self.env.caches
    }

    /// Analyze one unit. Only structural faults are errors; everything else
    /// ends up in the diagnostics.
    #[instrument(skip_all, fields(unit = %decl.fqsen))]
    pub fn analyze_function_like(&self, decl: &FunctionLike) -> Result<FunctionAnalysis, AnalysisError> {
        let _timer = Timer::new(&self.env.metrics, metrics::UNIT_TIME);
        let result = self.run(decl);
        match &result {
            Ok(analysis) => {
                self.env.metrics.increment(metrics::UNITS_ANALYZED);
                self.env.metrics.add(metrics::DIAGNOSTICS, analysis.diagnostics.len() as u64);
                debug!(
                    diagnostics = analysis.diagnostics.len(),
                    return_type = %analysis.inferred_return_type,
                    "unit analyzed"
                );
            }
            Err(e) => {
                self.env.metrics.increment(metrics::UNITS_FAILED);
                error!(error = %e, "unit analysis failed");
            }
        }
        result
    }

    fn run(&self, decl: &FunctionLike) -> Result<FunctionAnalysis, AnalysisError> {
        check_declaration(decl)?;
        let mut analyzer = FunctionAnalyzer::for_declaration(&self.env, decl)?;
        let entry = analyzer.entry_scope(decl);
        let outcome = analyzer.run_body(&decl.body, entry);
        if let Some(fault) = analyzer.fault.take() {
            return Err(fault);
        }

        // callers analyzed later reuse this instead of re-running the body
        if decl.declared_return().is_none() && !analyzer.recursion_cutoff && !analyzer.budget_exhausted {
            self.env.caches.remember_return(decl.fqsen.clone(), outcome.return_type.clone());
        }

        let exit_scope = (!outcome.exit_scope.is_unreachable()).then_some(outcome.exit_scope);
        Ok(FunctionAnalysis {
            unit: decl.fqsen.clone(),
            node_types: analyzer.node_types,
            inferred_return_type: outcome.return_type,
            diagnostics: analyzer.diagnostics.into_diagnostics(),
            scopes: analyzer.scopes,
            exit_scope,
        })
    }

    /// Type of `expr` evaluated in `scope`. Reports nothing and leaves no
    /// trace in the caches beyond memoized return types.
    pub fn type_of_expression(&self, expr: &Expr, scope: &ScopeSnapshot, class: Option<&ClassContext>) -> UnionType {
        let mut analyzer = self.query_analyzer(class);
        analyzer.eval(expr, scope.clone()).0.ty
    }

    /// Scopes where `cond` is true and where it is false
    pub fn narrow_condition(
        &self,
        cond: &Expr,
        scope: &ScopeSnapshot,
        class: Option<&ClassContext>,
    ) -> (ScopeSnapshot, ScopeSnapshot) {
        let mut analyzer = self.query_analyzer(class);
        analyzer.narrow(cond, scope.clone())
    }

    fn query_analyzer(&self, class: Option<&ClassContext>) -> FunctionAnalyzer<'_> {
        let mut analyzer = FunctionAnalyzer::new(&self.env, Fqsen::new("{query}"), class, false);
        analyzer.quiet = 1;
        analyzer.check.record_scopes = false;
        analyzer
    }
}

/// Analyze one unit with the default configuration
pub fn analyze_function_like(
    decl: &FunctionLike,
    index: Arc<dyn SymbolIndex>,
) -> Result<FunctionAnalysis, AnalysisError> {
    Analyzer::with_default_config(index).analyze_function_like(decl)
}

/// Shape checks the tree builder cannot express in types
fn check_declaration(decl: &FunctionLike) -> Result<(), AnalysisError> {
    let mut seen = HashSet::new();
    for param in &decl.params {
        if !seen.insert(&param.name) {
            return Err(AnalysisError::malformed(NodeId::default(), format!("duplicate parameter ${}", param.name)));
        }
    }
    if let Some(position) = decl.params.iter().position(|p| p.variadic) {
        if position + 1 != decl.params.len() {
            return Err(AnalysisError::malformed(NodeId::default(), "variadic parameter must be last"));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::AstBuilder;
    use crate::errors::DiagnosticKind;
    use crate::symbols::{ClassDescriptor, MemorySymbolIndex, Signature};

    fn index() -> Arc<dyn SymbolIndex> {
        let index = MemorySymbolIndex::new();
        index.register_class(ClassDescriptor::new("Box"));
        Arc::new(index)
    }

    #[test]
    fn test_nullable_param_scenario() {
        let b = AstBuilder::new();
        let x_plus_one = b.binary(crate::ast::BinaryOp::Add, b.var("x"), b.int(1));
        let x_read = match &x_plus_one.kind {
            crate::ast::ExprKind::Binary { left, .. } => left.id,
            _ => unreachable!(),
        };
        let decl = b.function(
            "f",
            vec![b.typed_param("x", UnionType::int().with_null())],
            vec![
                b.if_then(b.identical(b.var("x"), b.null()), vec![b.ret_value(b.int(0))]),
                b.ret_value(x_plus_one),
            ],
        );
        let analysis = analyze_function_like(&decl, index()).unwrap();
        assert_eq!(analysis.type_of(x_read), Some(&UnionType::int()));
        assert_eq!(analysis.inferred_return_type, UnionType::int());
        assert!(analysis.diagnostics.is_empty());
        assert!(analysis.exit_scope.is_none());
    }

    #[test]
    fn test_missing_class_context_is_an_error() {
        let b = AstBuilder::new();
        let decl = b.method("Missing", "run", vec![], vec![]);
        let analyzer = Analyzer::with_default_config(index());
        let err = analyzer.analyze_function_like(&decl).unwrap_err();
        assert!(matches!(err, AnalysisError::MissingDeclaration { .. }));
        assert_eq!(analyzer.metrics().counter(metrics::UNITS_FAILED), 1);
    }

    #[test]
    fn test_duplicate_parameter_is_malformed() {
        let b = AstBuilder::new();
        let decl = b.function("f", vec![b.param("a"), b.param("a")], vec![]);
        assert!(matches!(
            analyze_function_like(&decl, index()),
            Err(AnalysisError::MalformedTree { .. })
        ));
    }

    #[test]
    fn test_fault_aborts_only_the_unit() {
        let b = AstBuilder::new();
        let analyzer = Analyzer::with_default_config(index());
        let broken = b.function("broken", vec![], vec![b.break_loop(1)]);
        let fine = b.function("fine", vec![], vec![b.ret_value(b.int(1))]);
        assert!(analyzer.analyze_function_like(&broken).is_err());
        let analysis = analyzer.analyze_function_like(&fine).unwrap();
        assert_eq!(analysis.inferred_return_type, UnionType::literal_int(1));
        assert_eq!(analyzer.metrics().counter(metrics::UNITS_ANALYZED), 1);
    }

    #[test]
    fn test_inferred_return_is_memoized() {
        let b = AstBuilder::new();
        let analyzer = Analyzer::with_default_config(index());
        let decl = b.function("answer", vec![], vec![b.ret_value(b.int(42))]);
        analyzer.analyze_function_like(&decl).unwrap();
        assert_eq!(analyzer.caches().inferred_return(&Fqsen::new("answer")), Some(UnionType::literal_int(42)));
    }

    #[test]
    fn test_return_inference_through_callee_body() {
        let b = AstBuilder::new();
        let index = MemorySymbolIndex::new();
        let callee = b.function("make", vec![], vec![b.ret_value(b.new_object("Box", vec![]))]);
        index.register_class(ClassDescriptor::new("Box"));
        index.register_function(Signature::new(Fqsen::new("make")).with_body(callee));
        let decl = b.function("caller", vec![], vec![b.ret_value(b.call("make", vec![]))]);
        let analysis = analyze_function_like(&decl, Arc::new(index)).unwrap();
        assert_eq!(analysis.inferred_return_type, UnionType::instance(Fqsen::new("Box")));
    }

    #[test]
    fn test_type_of_expression_is_quiet() {
        let b = AstBuilder::new();
        let analyzer = Analyzer::with_default_config(index());
        let scope = ScopeSnapshot::new();
        let ty = analyzer.type_of_expression(&b.coalesce(b.var("missing"), b.string("d")), &scope, None);
        assert_eq!(ty, UnionType::literal_string("d"));
        let ty = analyzer.type_of_expression(&b.var("missing"), &scope, None);
        assert_eq!(ty, UnionType::mixed());
    }

    #[test]
    fn test_narrow_condition_query() {
        let b = AstBuilder::new();
        let analyzer = Analyzer::with_default_config(index());
        let scope = ScopeSnapshot::new()
            .with_assigned("v", crate::core::FlowType::declared(UnionType::string().with_null()), true);
        let (t, f) = analyzer.narrow_condition(&b.call("is_string", vec![b.var("v")]), &scope, None);
        assert_eq!(t.get("v"), Some(&UnionType::string()));
        assert_eq!(f.get("v"), Some(&UnionType::null()));
    }

    #[test]
    fn test_report_serializes_diagnostics() {
        let b = AstBuilder::new();
        let decl = b.function("f", vec![], vec![b.ret_value(b.var("nope"))]);
        let analysis = analyze_function_like(&decl, index()).unwrap();
        assert!(matches!(
            analysis.diagnostics[0].kind,
            DiagnosticKind::UndeclaredVariable { .. }
        ));
        let report = analysis.to_report();
        assert_eq!(report["unit"], "\\f");
        assert_eq!(report["diagnostics"].as_array().map(Vec::len), Some(1));
        assert_eq!(report["exit_scope"], Value::Null);
    }
}
