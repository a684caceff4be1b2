//! phpflow: flow-sensitive type inference for PHP function bodies
//!
//! Given an already-parsed function, method or closure and a symbol index
//! describing the surrounding classes and functions, the analyzer computes
//! the type of every expression at every program point, narrows variables
//! through conditions, infers return types and reports type diagnostics.

// Core modules
pub mod core;
pub mod ast;
pub mod scope;
pub mod symbols;
pub mod analysis;
pub mod config;
pub mod errors;
pub mod infrastructure;

// Re-export commonly used items
pub use core::{FlowType, Fqsen, TypeAtom, TypeLimits, UnionType};
pub use ast::{AstBuilder, Expr, FunctionLike, NodeId, Stmt};
pub use scope::{EdgeKind, ScopeKey, ScopeSnapshot, VarEntry};
pub use symbols::{ClassDescriptor, MemorySymbolIndex, Signature, SymbolIndex};
pub use analysis::{analyze_function_like, Analyzer, FunctionAnalysis};
pub use config::AnalysisConfig;
pub use errors::{AnalysisError, Diagnostic, DiagnosticKind, Severity};
pub use infrastructure::{init_logging, LogConfig, ParallelAnalyzer, UnitReport};
