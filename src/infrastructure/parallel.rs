//! Parallel unit analysis
//!
//! Units are independent once the symbol index is built, so they are
//! spread over a rayon pool. Workers share one [`Analyzer`] and with it the
//! ancestry and return-type caches.

use crate::analysis::Analyzer;
use crate::ast::FunctionLike;
use crate::core::Fqsen;
use crate::errors::{AnalysisError, Diagnostic};
use dashmap::DashMap;
use rayon::prelude::*;
use serde::Serialize;
use std::sync::Arc;
use std::time::Instant;
use tracing::info;

/// Result of analyzing one unit
#[derive(Debug, Clone, Serialize)]
pub struct UnitReport {
    pub unit: Fqsen,
    /// `None` when the unit could not be analyzed
    pub inferred_return_type: Option<String>,
    pub diagnostics: Vec<Diagnostic>,
    /// Structural fault that abandoned the unit
    pub error: Option<String>,
    pub duration_ms: u64,
}

pub struct ParallelAnalyzer {
    analyzer: Arc<Analyzer>,
    pool: rayon::ThreadPool,
    /// Latest report per unit
    results: DashMap<Fqsen, UnitReport>,
}

impl ParallelAnalyzer {
    /// Pool size comes from `parallel.workers`; 0 uses the rayon default
    pub fn new(analyzer: Arc<Analyzer>) -> Result<Self, AnalysisError> {
        let mut builder = rayon::ThreadPoolBuilder::new().thread_name(|i| format!("phpflow-worker-{}", i));
        let workers = analyzer.config().parallel.workers;
        if workers > 0 {
            builder = builder.num_threads(workers);
        }
        let pool = builder
            .build()
            .map_err(|e| AnalysisError::InvalidConfig(format!("cannot start worker pool: {}", e)))?;
        Ok(Self { analyzer, pool, results: DashMap::new() })
    }

    /// Analyze every unit; reports come back in input order. A unit that
    /// fails does not stop the others.
    pub fn analyze_all(&self, units: &[FunctionLike]) -> Vec<UnitReport> {
        let start = Instant::now();
        self.results.clear();
        let reports: Vec<UnitReport> = self.pool.install(|| units.par_iter().map(|u| self.analyze_unit(u)).collect());
        for report in &reports {
            self.results.insert(report.unit.clone(), report.clone());
        }
        let failed = reports.iter().filter(|r| r.error.is_some()).count();
        info!(
            units = reports.len(),
            failed,
            workers = self.worker_count(),
            elapsed_ms = start.elapsed().as_millis() as u64,
            "batch analyzed"
        );
        reports
    }

    fn analyze_unit(&self, decl: &FunctionLike) -> UnitReport {
        let start = Instant::now();
        let (inferred_return_type, diagnostics, error) = match self.analyzer.analyze_function_like(decl) {
            Ok(analysis) => (Some(analysis.inferred_return_type.to_string()), analysis.diagnostics, None),
            Err(e) => (None, Vec::new(), Some(e.to_string())),
        };
        UnitReport {
            unit: decl.fqsen.clone(),
            inferred_return_type,
            diagnostics,
            error,
            duration_ms: start.elapsed().as_millis() as u64,
        }
    }

    pub fn get_result(&self, unit: &Fqsen) -> Option<UnitReport> {
        self.results.get(unit).map(|r| r.value().clone())
    }

    pub fn worker_count(&self) -> usize {
        self.pool.current_num_threads()
    }

    pub fn analyzer(&self) -> &Analyzer {
        &self.analyzer
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::AstBuilder;
    use crate::config::AnalysisConfig;
    use crate::infrastructure::metrics;
    use crate::symbols::{MemorySymbolIndex, SymbolIndex};

    fn parallel(workers: usize) -> ParallelAnalyzer {
        let mut config = AnalysisConfig::default();
        config.parallel.workers = workers;
        let index: Arc<dyn SymbolIndex> = Arc::new(MemorySymbolIndex::new());
        ParallelAnalyzer::new(Arc::new(Analyzer::new(index, config))).unwrap()
    }

    #[test]
    fn test_reports_follow_input_order() {
        let b = AstBuilder::new();
        let units: Vec<FunctionLike> = (0..16)
            .map(|i| b.function(&format!("f{}", i), vec![], vec![b.ret_value(b.int(i))]))
            .collect();
        let analyzer = parallel(2);
        assert_eq!(analyzer.worker_count(), 2);

        let reports = analyzer.analyze_all(&units);
        assert_eq!(reports.len(), 16);
        for (i, report) in reports.iter().enumerate() {
            assert_eq!(report.unit, Fqsen::new(&format!("f{}", i)));
            assert_eq!(report.inferred_return_type.as_deref(), Some(i.to_string().as_str()));
        }
        assert_eq!(analyzer.analyzer().metrics().counter(metrics::UNITS_ANALYZED), 16);
    }

    #[test]
    fn test_failed_unit_does_not_stop_batch() {
        let b = AstBuilder::new();
        let units = vec![
            b.function("broken", vec![], vec![b.continue_loop(1)]),
            b.function("fine", vec![], vec![b.ret_value(b.string("ok"))]),
        ];
        let analyzer = parallel(0);
        let reports = analyzer.analyze_all(&units);
        assert!(reports[0].error.is_some());
        assert!(reports[0].inferred_return_type.is_none());
        assert!(reports[1].error.is_none());

        let fine = analyzer.get_result(&Fqsen::new("fine")).unwrap();
        let json = serde_json::to_value(&fine).unwrap();
        assert_eq!(json["unit"], "\\fine");
        assert_eq!(json["inferred_return_type"], "'ok'");
    }
}
