//! Flow-sensitive function analysis
//!
//! This module walks one function-like unit at a time:
//! - Expression typing with literal tracking and return-type inference
//! - Condition narrowing into true and false branch scopes
//! - Statement flow with loop fixed points, switch fallthrough and try/finally
//! - The public driver that ties a unit to its symbol environment

pub mod context;
pub mod driver;
mod expr;
mod flow;
mod narrowing;

pub use context::{AnalysisCaches, AnalysisEnv, FunctionAnalyzer};
pub use driver::{analyze_function_like, Analyzer, FunctionAnalysis};
