//! Diagnostics and structural analysis errors
//!
//! Type mismatches, impossible conditions and exceeded limits are
//! diagnostics: they are collected and analysis continues. Only structural
//! faults (malformed trees, declarations missing from the index) are
//! [`AnalysisError`]s, and they abort the current unit only.

use crate::ast::{NodeId, Span};
use crate::core::Fqsen;
use serde::Serialize;
use std::collections::HashSet;
use std::fmt;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum AnalysisError {
    #[error("declaration not found in symbol index: {fqsen}")]
    MissingDeclaration { fqsen: Fqsen },

    #[error("malformed tree at node {node}: {reason}")]
    MalformedTree { node: NodeId, reason: String },

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl AnalysisError {
    pub fn malformed(node: NodeId, reason: impl Into<String>) -> Self {
        AnalysisError::MalformedTree { node, reason: reason.into() }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Error,
    Warning,
    Info,
}

/// Which of the recoverable classes a diagnostic belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DiagnosticCategory {
    /// An operand does not satisfy the expected type
    TypeMismatch,
    /// A condition is provably always or never true
    Condition,
    /// An analysis limit degraded precision
    Limit,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Error, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum DiagnosticKind {
    #[error("undeclared variable ${name}")]
    UndeclaredVariable { name: String },

    #[error("variable ${name} might not be defined")]
    PossiblyUndefinedVariable { name: String },

    #[error("argument {position} (${param}) of {function} expects {expected}, got {found}")]
    TypeMismatchArgument { function: String, param: String, position: usize, expected: String, found: String },

    #[error("{function} expects at least {expected} arguments, got {found}")]
    TooFewArguments { function: String, expected: usize, found: usize },

    #[error("returning {found} where {expected} is declared")]
    TypeMismatchReturn { expected: String, found: String },

    #[error("assigning {found} to property {property} declared as {expected}")]
    TypeMismatchProperty { property: String, expected: String, found: String },

    #[error("accessing {member} on non-object type {ty}")]
    NonObjectMemberAccess { member: String, ty: String },

    #[error("call to undeclared method {class}::{method}()")]
    UndeclaredMethod { class: String, method: String },

    #[error("reference to undeclared property {class}::${property}")]
    UndeclaredProperty { class: String, property: String },

    #[error("call to undeclared function {name}()")]
    UndeclaredFunction { name: String },

    #[error("reference to undeclared class {name}")]
    UndeclaredClass { name: String },

    #[error("left side of ?? has type {ty}, which is never null")]
    RedundantCoalesce { ty: String },

    #[error("parent used in {class}, which has no parent class")]
    ParentWithoutParentClass { class: String },

    #[error("unreachable statement")]
    UnreachableCode,

    #[error("{check} on {subject} of type {ty} can never be true")]
    ImpossibleCondition { subject: String, ty: String, check: String },

    #[error("{check} on {subject} of type {ty} is always true")]
    RedundantCondition { subject: String, ty: String, check: String },

    #[error("loop did not stabilize after {iterations} iterations; types widened")]
    LoopFixedPointCap { iterations: usize },

    #[error("return type inference for {function} stopped at depth {depth}")]
    RecursionDepthExceeded { function: String, depth: usize },

    #[error("step budget of {steps} exhausted; remaining types widened to declarations")]
    StepBudgetExhausted { steps: usize },
}

impl DiagnosticKind {
    pub fn category(&self) -> DiagnosticCategory {
        match self {
            DiagnosticKind::ImpossibleCondition { .. } | DiagnosticKind::RedundantCondition { .. } => {
                DiagnosticCategory::Condition
            }
            DiagnosticKind::LoopFixedPointCap { .. }
            | DiagnosticKind::RecursionDepthExceeded { .. }
            | DiagnosticKind::StepBudgetExhausted { .. } => DiagnosticCategory::Limit,
            _ => DiagnosticCategory::TypeMismatch,
        }
    }

    pub fn severity(&self) -> Severity {
        match self {
            DiagnosticKind::UndeclaredVariable { .. }
            | DiagnosticKind::TypeMismatchArgument { .. }
            | DiagnosticKind::TooFewArguments { .. }
            | DiagnosticKind::TypeMismatchReturn { .. }
            | DiagnosticKind::TypeMismatchProperty { .. }
            | DiagnosticKind::NonObjectMemberAccess { .. }
            | DiagnosticKind::UndeclaredMethod { .. }
            | DiagnosticKind::UndeclaredFunction { .. }
            | DiagnosticKind::UndeclaredClass { .. }
            | DiagnosticKind::ParentWithoutParentClass { .. } => Severity::Error,
            DiagnosticKind::LoopFixedPointCap { .. }
            | DiagnosticKind::RecursionDepthExceeded { .. }
            | DiagnosticKind::StepBudgetExhausted { .. } => Severity::Info,
            _ => Severity::Warning,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Diagnostic {
    #[serde(flatten)]
    pub kind: DiagnosticKind,
    pub severity: Severity,
    pub unit: Fqsen,
    pub node: NodeId,
    pub span: Span,
    pub message: String,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub suggestions: Vec<String>,
}

impl Diagnostic {
    pub fn new(kind: DiagnosticKind, unit: Fqsen, node: NodeId, span: Span) -> Self {
        Self {
            severity: kind.severity(),
            message: kind.to_string(),
            kind,
            unit,
            node,
            span,
            suggestions: Vec::new(),
        }
    }

    pub fn with_suggestion(mut self, suggestion: String) -> Self {
        self.suggestions.push(suggestion);
        self
    }

    pub fn with_suggestions(mut self, suggestions: Vec<String>) -> Self {
        self.suggestions = suggestions;
        self
    }
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}: {}", self.unit, self.span, self.kind)?;
        for suggestion in &self.suggestions {
            write!(f, "\n  hint: {}", suggestion)?;
        }
        Ok(())
    }
}

/// Bounded, de-duplicating diagnostic sink for one unit
#[derive(Debug)]
pub struct DiagnosticCollector {
    diagnostics: Vec<Diagnostic>,
    seen: HashSet<(NodeId, DiagnosticKind)>,
    max_diagnostics: usize,
    dropped: usize,
}

impl DiagnosticCollector {
    pub fn new() -> Self {
        Self::with_max(1000)
    }

    pub fn with_max(max_diagnostics: usize) -> Self {
        Self { diagnostics: Vec::new(), seen: HashSet::new(), max_diagnostics, dropped: 0 }
    }

    /// Record a diagnostic; repeats at the same node are ignored and
    /// anything past the cap is only counted
    pub fn add(&mut self, diagnostic: Diagnostic) {
        if !self.seen.insert((diagnostic.node, diagnostic.kind.clone())) {
            return;
        }
        if self.diagnostics.len() < self.max_diagnostics {
            self.diagnostics.push(diagnostic);
        } else {
            self.dropped += 1;
        }
    }

    pub fn has_errors(&self) -> bool {
        self.diagnostics.iter().any(|d| d.severity == Severity::Error)
    }

    pub fn len(&self) -> usize {
        self.diagnostics.len()
    }

    pub fn is_empty(&self) -> bool {
        self.diagnostics.is_empty()
    }

    pub fn dropped(&self) -> usize {
        self.dropped
    }

    pub fn diagnostics(&self) -> &[Diagnostic] {
        &self.diagnostics
    }

    pub fn into_diagnostics(self) -> Vec<Diagnostic> {
        self.diagnostics
    }
}

impl Default for DiagnosticCollector {
    fn default() -> Self {
        Self::new()
    }
}

/// Edit distance for "did you mean" suggestions
pub fn levenshtein_distance(a: &str, b: &str) -> usize {
    let b_chars: Vec<char> = b.chars().collect();
    let mut prev: Vec<usize> = (0..=b_chars.len()).collect();
    let mut curr = vec![0; b_chars.len() + 1];

    for (i, ca) in a.chars().enumerate() {
        curr[0] = i + 1;
        for (j, cb) in b_chars.iter().enumerate() {
            let cost = if ca == *cb { 0 } else { 1 };
            curr[j + 1] = (prev[j + 1] + 1).min(curr[j] + 1).min(prev[j] + cost);
        }
        std::mem::swap(&mut prev, &mut curr);
    }

    prev[b_chars.len()]
}

/// Candidates within `max_distance` edits of `target`, closest first
pub fn find_similar_names<'a>(target: &str, candidates: impl IntoIterator<Item = &'a str>, max_distance: usize) -> Vec<String> {
    let mut results: Vec<(&str, usize)> = candidates
        .into_iter()
        .map(|c| (c, levenshtein_distance(target, c)))
        .filter(|(_, dist)| *dist <= max_distance && *dist > 0)
        .collect();
    results.sort_by_key(|(name, dist)| (*dist, *name));
    results.into_iter().map(|(name, _)| name.to_string()).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn diag(kind: DiagnosticKind, node: u32) -> Diagnostic {
        Diagnostic::new(kind, Fqsen::new("f"), NodeId(node), Span::default())
    }

    #[test]
    fn test_collector_dedups_and_caps() {
        let mut c = DiagnosticCollector::with_max(2);
        c.add(diag(DiagnosticKind::UnreachableCode, 1));
        c.add(diag(DiagnosticKind::UnreachableCode, 1));
        c.add(diag(DiagnosticKind::UnreachableCode, 2));
        c.add(diag(DiagnosticKind::UnreachableCode, 3));
        assert_eq!(c.len(), 2);
        assert_eq!(c.dropped(), 1);
        assert!(!c.has_errors());
    }

    #[test]
    fn test_messages_and_categories() {
        let k = DiagnosticKind::ImpossibleCondition {
            subject: "$v".into(),
            ty: "int".into(),
            check: "is_string".into(),
        };
        assert_eq!(k.to_string(), "is_string on $v of type int can never be true");
        assert_eq!(k.category(), DiagnosticCategory::Condition);
        assert_eq!(DiagnosticKind::StepBudgetExhausted { steps: 1 }.severity(), Severity::Info);
    }

    #[test]
    fn test_diagnostic_serializes_flat() {
        let d = diag(DiagnosticKind::UndeclaredVariable { name: "x".into() }, 4);
        let json = serde_json::to_value(&d).unwrap();
        assert_eq!(json["kind"], "undeclared_variable");
        assert_eq!(json["name"], "x");
        assert_eq!(json["severity"], "error");
    }

    #[test]
    fn test_similar_names() {
        assert_eq!(levenshtein_distance("kitten", "sitting"), 3);
        let names = find_similar_names("usre", ["user", "users", "other"], 2);
        assert_eq!(names, vec!["user".to_string(), "users".to_string()]);
    }
}
