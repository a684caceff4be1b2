//! Analysis configuration, loaded from `.phpflow.toml`

use crate::core::{Fqsen, TypeLimits};
use crate::errors::AnalysisError;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs;
use std::path::Path;

pub const CONFIG_FILE_NAME: &str = ".phpflow.toml";

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AnalysisConfig {
    #[serde(default)]
    pub limits: LimitsConfig,

    #[serde(default)]
    pub check: CheckConfig,

    #[serde(default)]
    pub diagnostics: DiagnosticsConfig,

    #[serde(default)]
    pub parallel: ParallelConfig,

    /// Check settings for units whose name starts with the key
    /// (e.g. `"App\\Legacy\\"`)
    #[serde(default)]
    pub overrides: HashMap<String, CheckConfig>,
}

/// Widening thresholds and iteration caps
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LimitsConfig {
    /// Literals of one kind kept in a union before collapsing to the scalar
    #[serde(default = "default_literal_fanout")]
    pub literal_fanout: usize,

    #[serde(default = "default_max_loop_iterations")]
    pub max_loop_iterations: usize,

    /// Nesting of return-type inference through undeclared callees
    #[serde(default = "default_max_recursion_depth")]
    pub max_recursion_depth: usize,

    #[serde(default = "default_max_shape_fields")]
    pub max_shape_fields: usize,

    /// Statements and expressions visited per unit before widening
    #[serde(default = "default_max_steps")]
    pub max_steps_per_unit: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CheckConfig {
    /// Allow scalar coercions when checking arguments
    #[serde(default = "default_true")]
    pub weak_typing: bool,

    #[serde(default = "default_true")]
    pub report_redundant_conditions: bool,

    #[serde(default = "default_true")]
    pub report_possibly_undefined: bool,

    #[serde(default = "default_true")]
    pub report_unreachable: bool,

    /// Keep the scope before every statement for later queries
    #[serde(default = "default_true")]
    pub record_scopes: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DiagnosticsConfig {
    #[serde(default = "default_max_diagnostics")]
    pub max_diagnostics: usize,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ParallelConfig {
    /// Worker threads; 0 uses the rayon default
    #[serde(default)]
    pub workers: usize,
}

impl Default for LimitsConfig {
    fn default() -> Self {
        Self {
            literal_fanout: default_literal_fanout(),
            max_loop_iterations: default_max_loop_iterations(),
            max_recursion_depth: default_max_recursion_depth(),
            max_shape_fields: default_max_shape_fields(),
            max_steps_per_unit: default_max_steps(),
        }
    }
}

impl Default for CheckConfig {
    fn default() -> Self {
        Self {
            weak_typing: true,
            report_redundant_conditions: true,
            report_possibly_undefined: true,
            report_unreachable: true,
            record_scopes: true,
        }
    }
}

impl Default for DiagnosticsConfig {
    fn default() -> Self {
        Self { max_diagnostics: default_max_diagnostics() }
    }
}

fn default_true() -> bool { true }
fn default_literal_fanout() -> usize { 8 }
fn default_max_loop_iterations() -> usize { 6 }
fn default_max_recursion_depth() -> usize { 3 }
fn default_max_shape_fields() -> usize { 64 }
fn default_max_steps() -> usize { 200_000 }
fn default_max_diagnostics() -> usize { 1000 }

impl AnalysisConfig {
    pub fn load(path: &Path) -> Result<Self, AnalysisError> {
        let content = fs::read_to_string(path)?;
        Self::parse(&content)
    }

    pub fn parse(content: &str) -> Result<Self, AnalysisError> {
        let config: Self = toml::from_str(content)
            .map_err(|e| AnalysisError::InvalidConfig(format!("failed to parse config: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    /// Look for `.phpflow.toml` in the current directory and its parents
    pub fn discover() -> Self {
        let mut current = std::env::current_dir().ok();
        while let Some(dir) = current {
            let path = dir.join(CONFIG_FILE_NAME);
            if path.exists() {
                match Self::load(&path) {
                    Ok(config) => return config,
                    Err(e) => tracing::warn!(path = %path.display(), error = %e, "ignoring config file"),
                }
            }
            current = dir.parent().map(|p| p.to_path_buf());
        }
        Self::default()
    }

    pub fn validate(&self) -> Result<(), AnalysisError> {
        let limits = &self.limits;
        let caps = [
            ("limits.literal_fanout", limits.literal_fanout),
            ("limits.max_loop_iterations", limits.max_loop_iterations),
            ("limits.max_shape_fields", limits.max_shape_fields),
            ("limits.max_steps_per_unit", limits.max_steps_per_unit),
        ];
        for (name, value) in caps {
            if value == 0 {
                return Err(AnalysisError::InvalidConfig(format!("{} must be at least 1", name)));
            }
        }
        if limits.literal_fanout < 2 {
            return Err(AnalysisError::InvalidConfig("limits.literal_fanout must be at least 2".to_string()));
        }
        Ok(())
    }

    pub fn generate_default() -> String {
        toml::to_string_pretty(&Self::default()).unwrap_or_default()
    }

    pub fn save(&self, path: &Path) -> Result<(), AnalysisError> {
        let content = toml::to_string_pretty(self)
            .map_err(|e| AnalysisError::InvalidConfig(format!("failed to serialize config: {}", e)))?;
        fs::write(path, content)?;
        Ok(())
    }

    pub fn limits(&self) -> TypeLimits {
        TypeLimits {
            literal_fanout: self.limits.literal_fanout,
            max_shape_fields: self.limits.max_shape_fields,
        }
    }

    /// Check settings for one unit, applying the longest matching override
    pub fn check_for(&self, unit: &Fqsen) -> &CheckConfig {
        let name = unit.key().trim_start_matches('\\');
        self.overrides
            .iter()
            .filter(|(prefix, _)| name.starts_with(&prefix.trim_start_matches('\\').to_ascii_lowercase()))
            .max_by_key(|(prefix, _)| prefix.len())
            .map(|(_, check)| check)
            .unwrap_or(&self.check)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_defaults() {
        let config = AnalysisConfig::default();
        assert_eq!(config.limits.literal_fanout, 8);
        assert_eq!(config.limits.max_loop_iterations, 6);
        assert!(config.check.weak_typing);
        assert_eq!(config.diagnostics.max_diagnostics, 1000);
        assert_eq!(config.limits().max_shape_fields, 64);
    }

    #[test]
    fn test_parse_partial() {
        let config = AnalysisConfig::parse(
            r#"
            [limits]
            max_loop_iterations = 3

            [check]
            weak_typing = false
            "#,
        )
        .unwrap();
        assert_eq!(config.limits.max_loop_iterations, 3);
        assert_eq!(config.limits.literal_fanout, 8);
        assert!(!config.check.weak_typing);
        assert!(config.check.report_unreachable);
    }

    #[test]
    fn test_rejects_zero_caps() {
        let err = AnalysisConfig::parse("[limits]\nmax_loop_iterations = 0\n").unwrap_err();
        assert!(matches!(err, AnalysisError::InvalidConfig(_)));
    }

    #[test]
    fn test_save_and_load() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join(CONFIG_FILE_NAME);
        let mut config = AnalysisConfig::default();
        config.parallel.workers = 4;
        config.save(&path).unwrap();
        let loaded = AnalysisConfig::load(&path).unwrap();
        assert_eq!(loaded, config);
    }

    #[test]
    fn test_generate_default_round_trips() {
        let text = AnalysisConfig::generate_default();
        assert!(text.contains("literal_fanout"));
        assert_eq!(AnalysisConfig::parse(&text).unwrap(), AnalysisConfig::default());
    }

    #[test]
    fn test_overrides_by_namespace() {
        let config = AnalysisConfig::parse(
            r#"
            [overrides."App\\Legacy\\"]
            report_possibly_undefined = false
            "#,
        )
        .unwrap();
        assert!(!config.check_for(&Fqsen::new("App\\Legacy\\run")).report_possibly_undefined);
        assert!(config.check_for(&Fqsen::new("App\\Modern\\run")).report_possibly_undefined);
    }
}
