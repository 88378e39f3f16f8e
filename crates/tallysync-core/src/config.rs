//! Configuration module for Tallysync.
//!
//! Provides typed configuration structs that map to the YAML configuration file,
//! with loading, validation, defaults, and a builder pattern for programmatic use.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Config struct with sub-sections
// ---------------------------------------------------------------------------

/// Top-level configuration for Tallysync.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub classifier: ClassifierConfig,
    pub learning: LearningConfig,
    pub retention: RetentionConfig,
    pub stats: StatsConfig,
    pub storage: StorageConfig,
    pub logging: LoggingConfig,
}

/// A cross-field invariant: when `field` changes, `linked` must change too.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BusinessRule {
    pub field: String,
    pub linked: String,
}

impl BusinessRule {
    pub fn new(field: impl Into<String>, linked: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            linked: linked.into(),
        }
    }
}

/// Conflict classification settings.
///
/// Field lists accept glob patterns (`*_balance`, `_*`).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ClassifierConfig {
    /// Fields whose divergence is inherently high-risk (balances, identity).
    pub protected_fields: Vec<String>,
    /// Fields that carry access control; a difference makes a `permission` conflict.
    pub access_control_fields: Vec<String>,
    /// Bookkeeping fields that never count as substantive changes.
    pub metadata_fields: Vec<String>,
    /// Field holding the record's schema version.
    pub schema_version_field: String,
    /// Cross-field invariants checked for `business_rule` conflicts.
    pub business_rules: Vec<BusinessRule>,
    /// Relative difference above which a protected field change is critical.
    pub protected_relative_threshold: f64,
    /// More substantive changed fields than this makes a conflict `high`.
    pub high_change_count: usize,
    /// Tolerance for numeric equality, scaled by magnitude.
    pub numeric_epsilon: f64,
}

/// Pattern learning settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LearningConfig {
    /// Number of trailing user choices kept per conflict type.
    pub window_size: usize,
    /// Pseudo-count that keeps confidence below 1 until evidence accumulates.
    pub prior_weight: f64,
    /// Minimum user choices before a learned suggestion is offered.
    pub min_samples: u32,
    /// Confidence attributed to the "later write wins" default suggestion.
    pub timestamp_confidence: f64,
}

/// Resolution history retention settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RetentionConfig {
    /// Resolved conflicts older than this are pruned by `prune_expired`.
    pub resolved_max_age_days: u32,
}

/// Statistics settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StatsConfig {
    /// Maximum number of entries in `common_conflict_types`.
    pub common_types_limit: usize,
}

/// Storage settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Path to the SQLite database file.
    pub database_path: PathBuf,
}

/// Logging / tracing settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level: `trace`, `debug`, `info`, `warn`, or `error`.
    pub level: String,
}

// ---------------------------------------------------------------------------
// Config::load()
// ---------------------------------------------------------------------------

impl Config {
    /// Load configuration from a YAML file at `path`.
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Config = serde_yaml::from_str(&content)?;
        Ok(config)
    }

    /// Try to load from `path`; fall back to [`Config::default`] on any error.
    pub fn load_or_default(path: &Path) -> Self {
        Self::load(path).unwrap_or_default()
    }

    /// Platform-appropriate default path for the configuration file.
    ///
    /// Typically `$XDG_CONFIG_HOME/tallysync/config.yaml` on Linux.
    pub fn default_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("~/.config"))
            .join("tallysync")
            .join("config.yaml")
    }
}

// ---------------------------------------------------------------------------
// Defaults
// ---------------------------------------------------------------------------

impl Default for ClassifierConfig {
    fn default() -> Self {
        Self {
            protected_fields: vec![
                "balance".into(),
                "*_balance".into(),
                "amount".into(),
                "*_amount".into(),
                "id".into(),
                "owner_id".into(),
                "user_id".into(),
                "account_number".into(),
            ],
            access_control_fields: vec![
                "permissions".into(),
                "acl".into(),
                "owner_id".into(),
                "shared_with".into(),
                "role".into(),
            ],
            metadata_fields: vec![
                "created_at".into(),
                "updated_at".into(),
                "modified_at".into(),
                "last_synced_at".into(),
                "version".into(),
                "_*".into(),
            ],
            schema_version_field: "schema_version".into(),
            business_rules: vec![
                BusinessRule::new("balance", "transaction_total"),
                BusinessRule::new("amount", "split_total"),
            ],
            protected_relative_threshold: 0.01,
            high_change_count: 3,
            numeric_epsilon: 1e-9,
        }
    }
}

impl Default for LearningConfig {
    fn default() -> Self {
        Self {
            window_size: 20,
            prior_weight: 1.0,
            min_samples: 3,
            timestamp_confidence: 0.5,
        }
    }
}

impl Default for RetentionConfig {
    fn default() -> Self {
        Self {
            resolved_max_age_days: 90,
        }
    }
}

impl Default for StatsConfig {
    fn default() -> Self {
        Self {
            common_types_limit: 5,
        }
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            database_path: dirs::data_local_dir()
                .unwrap_or_else(|| PathBuf::from("~/.local/share"))
                .join("tallysync")
                .join("conflicts.db"),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

// ---------------------------------------------------------------------------
// Config::validate()
// ---------------------------------------------------------------------------

/// A single validation error found in the configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationError {
    /// Dotted path to the offending field, e.g. `"learning.window_size"`.
    pub field: String,
    /// Human-readable explanation.
    pub message: String,
}

impl std::fmt::Display for ValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

/// Valid values for `logging.level`.
const VALID_LOG_LEVELS: &[&str] = &["trace", "debug", "info", "warn", "error"];

fn check_patterns(field: &str, patterns: &[String], errors: &mut Vec<ValidationError>) {
    for pattern in patterns {
        if let Err(e) = glob::Pattern::new(pattern) {
            errors.push(ValidationError {
                field: field.into(),
                message: format!("invalid pattern '{}': {}", pattern, e),
            });
        }
    }
}

impl Config {
    /// Validate the configuration and return all errors found.
    ///
    /// An empty vector means the configuration is valid.
    pub fn validate(&self) -> Vec<ValidationError> {
        let mut errors = Vec::new();

        // --- classifier ---
        check_patterns(
            "classifier.protected_fields",
            &self.classifier.protected_fields,
            &mut errors,
        );
        check_patterns(
            "classifier.access_control_fields",
            &self.classifier.access_control_fields,
            &mut errors,
        );
        check_patterns(
            "classifier.metadata_fields",
            &self.classifier.metadata_fields,
            &mut errors,
        );
        let threshold = self.classifier.protected_relative_threshold;
        if !threshold.is_finite() || threshold < 0.0 {
            errors.push(ValidationError {
                field: "classifier.protected_relative_threshold".into(),
                message: "must be a finite, non-negative number".into(),
            });
        }
        if self.classifier.high_change_count < 2 {
            errors.push(ValidationError {
                field: "classifier.high_change_count".into(),
                message: "must be at least 2".into(),
            });
        }
        let epsilon = self.classifier.numeric_epsilon;
        if !epsilon.is_finite() || epsilon < 0.0 {
            errors.push(ValidationError {
                field: "classifier.numeric_epsilon".into(),
                message: "must be a finite, non-negative number".into(),
            });
        }
        for rule in &self.classifier.business_rules {
            if rule.field.is_empty() || rule.linked.is_empty() || rule.field == rule.linked {
                errors.push(ValidationError {
                    field: "classifier.business_rules".into(),
                    message: format!(
                        "rule '{}' -> '{}' must name two distinct fields",
                        rule.field, rule.linked
                    ),
                });
            }
        }

        // --- learning ---
        if self.learning.window_size == 0 {
            errors.push(ValidationError {
                field: "learning.window_size".into(),
                message: "must be greater than 0".into(),
            });
        }
        if !self.learning.prior_weight.is_finite() || self.learning.prior_weight <= 0.0 {
            errors.push(ValidationError {
                field: "learning.prior_weight".into(),
                message: "must be a finite number greater than 0".into(),
            });
        }
        if !(0.0..=1.0).contains(&self.learning.timestamp_confidence) {
            errors.push(ValidationError {
                field: "learning.timestamp_confidence".into(),
                message: "must be in range 0.0..=1.0".into(),
            });
        }

        // --- retention ---
        if self.retention.resolved_max_age_days == 0 {
            errors.push(ValidationError {
                field: "retention.resolved_max_age_days".into(),
                message: "must be greater than 0".into(),
            });
        }

        // --- stats ---
        if self.stats.common_types_limit == 0 {
            errors.push(ValidationError {
                field: "stats.common_types_limit".into(),
                message: "must be greater than 0".into(),
            });
        }

        // --- logging ---
        if !VALID_LOG_LEVELS.contains(&self.logging.level.as_str()) {
            errors.push(ValidationError {
                field: "logging.level".into(),
                message: format!(
                    "invalid level '{}'; valid options: {}",
                    self.logging.level,
                    VALID_LOG_LEVELS.join(", ")
                ),
            });
        }

        errors
    }
}

// ---------------------------------------------------------------------------
// ConfigBuilder
// ---------------------------------------------------------------------------

/// Builder for constructing a [`Config`] programmatically.
///
/// Starts from [`Config::default`] and allows selective overrides.
///
/// # Example
///
/// ```rust
/// use tallysync_core::config::ConfigBuilder;
///
/// let config = ConfigBuilder::new()
///     .protected_relative_threshold(0.05)
///     .learning_window_size(10)
///     .logging_level("debug")
///     .build();
/// assert_eq!(config.learning.window_size, 10);
/// ```
#[derive(Debug, Clone)]
pub struct ConfigBuilder {
    config: Config,
}

impl ConfigBuilder {
    /// Create a new builder initialised with [`Config::default`] values.
    pub fn new() -> Self {
        Self {
            config: Config::default(),
        }
    }

    // --- classifier ---

    pub fn protected_fields<S: Into<String>>(mut self, fields: impl IntoIterator<Item = S>) -> Self {
        self.config.classifier.protected_fields = fields.into_iter().map(Into::into).collect();
        self
    }

    pub fn access_control_fields<S: Into<String>>(
        mut self,
        fields: impl IntoIterator<Item = S>,
    ) -> Self {
        self.config.classifier.access_control_fields =
            fields.into_iter().map(Into::into).collect();
        self
    }

    pub fn metadata_fields<S: Into<String>>(mut self, fields: impl IntoIterator<Item = S>) -> Self {
        self.config.classifier.metadata_fields = fields.into_iter().map(Into::into).collect();
        self
    }

    pub fn business_rule(mut self, field: impl Into<String>, linked: impl Into<String>) -> Self {
        self.config
            .classifier
            .business_rules
            .push(BusinessRule::new(field, linked));
        self
    }

    pub fn protected_relative_threshold(mut self, threshold: f64) -> Self {
        self.config.classifier.protected_relative_threshold = threshold;
        self
    }

    pub fn high_change_count(mut self, count: usize) -> Self {
        self.config.classifier.high_change_count = count;
        self
    }

    // --- learning ---

    pub fn learning_window_size(mut self, size: usize) -> Self {
        self.config.learning.window_size = size;
        self
    }

    pub fn learning_min_samples(mut self, n: u32) -> Self {
        self.config.learning.min_samples = n;
        self
    }

    pub fn learning_prior_weight(mut self, weight: f64) -> Self {
        self.config.learning.prior_weight = weight;
        self
    }

    pub fn timestamp_confidence(mut self, confidence: f64) -> Self {
        self.config.learning.timestamp_confidence = confidence;
        self
    }

    // --- retention / stats ---

    pub fn retention_days(mut self, days: u32) -> Self {
        self.config.retention.resolved_max_age_days = days;
        self
    }

    pub fn common_types_limit(mut self, limit: usize) -> Self {
        self.config.stats.common_types_limit = limit;
        self
    }

    // --- storage / logging ---

    pub fn database_path(mut self, path: PathBuf) -> Self {
        self.config.storage.database_path = path;
        self
    }

    pub fn logging_level(mut self, level: impl Into<String>) -> Self {
        self.config.logging.level = level.into();
        self
    }

    /// Consume the builder and return the finished [`Config`].
    pub fn build(self) -> Config {
        self.config
    }
}

impl Default for ConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use super::*;

    // -- Defaults --

    #[test]
    fn default_config_has_sensible_values() {
        let cfg = Config::default();
        assert!(cfg.classifier.protected_fields.contains(&"balance".to_string()));
        assert_eq!(cfg.classifier.protected_relative_threshold, 0.01);
        assert_eq!(cfg.classifier.high_change_count, 3);
        assert_eq!(cfg.classifier.schema_version_field, "schema_version");
        assert_eq!(
            cfg.classifier.business_rules[0],
            BusinessRule::new("balance", "transaction_total")
        );
        assert_eq!(cfg.learning.window_size, 20);
        assert_eq!(cfg.learning.min_samples, 3);
        assert_eq!(cfg.retention.resolved_max_age_days, 90);
        assert_eq!(cfg.stats.common_types_limit, 5);
        assert!(cfg
            .storage
            .database_path
            .to_string_lossy()
            .ends_with("conflicts.db"));
        assert_eq!(cfg.logging.level, "info");
    }

    #[test]
    fn default_config_passes_validation() {
        let errors = Config::default().validate();
        assert!(errors.is_empty(), "unexpected validation errors: {errors:?}");
    }

    // -- Loading --

    #[test]
    fn load_from_yaml_file() {
        let yaml = r#"
classifier:
  protected_fields: ["balance", "iban"]
  protected_relative_threshold: 0.05
  high_change_count: 4
  business_rules:
    - field: balance
      linked: ledger_total
learning:
  window_size: 10
  min_samples: 2
retention:
  resolved_max_age_days: 30
logging:
  level: debug
"#;
        let mut tmp = tempfile::NamedTempFile::new().expect("create temp file");
        tmp.write_all(yaml.as_bytes()).unwrap();
        tmp.flush().unwrap();

        let cfg = Config::load(tmp.path()).expect("load config");
        assert_eq!(cfg.classifier.protected_fields, vec!["balance", "iban"]);
        assert_eq!(cfg.classifier.protected_relative_threshold, 0.05);
        assert_eq!(cfg.classifier.high_change_count, 4);
        assert_eq!(
            cfg.classifier.business_rules,
            vec![BusinessRule::new("balance", "ledger_total")]
        );
        // Omitted keys keep their defaults
        assert_eq!(cfg.classifier.schema_version_field, "schema_version");
        assert_eq!(cfg.learning.window_size, 10);
        assert_eq!(cfg.learning.min_samples, 2);
        assert_eq!(cfg.learning.prior_weight, 1.0);
        assert_eq!(cfg.retention.resolved_max_age_days, 30);
        assert_eq!(cfg.stats.common_types_limit, 5);
        assert_eq!(cfg.logging.level, "debug");
    }

    #[test]
    fn load_or_default_returns_default_on_missing_file() {
        let cfg = Config::load_or_default(Path::new("/nonexistent/config.yaml"));
        assert_eq!(cfg.learning.window_size, 20);
    }

    #[test]
    fn load_returns_error_on_invalid_yaml() {
        let mut tmp = tempfile::NamedTempFile::new().expect("create temp file");
        tmp.write_all(b"not: [valid: yaml: {{{").unwrap();
        tmp.flush().unwrap();

        assert!(Config::load(tmp.path()).is_err());
    }

    // -- Validation --

    #[test]
    fn validation_reports_every_bad_field() {
        let cfg = ConfigBuilder::new()
            .protected_fields(["[unclosed"])
            .protected_relative_threshold(-1.0)
            .high_change_count(1)
            .learning_window_size(0)
            .learning_prior_weight(0.0)
            .timestamp_confidence(1.5)
            .retention_days(0)
            .common_types_limit(0)
            .logging_level("loud")
            .business_rule("balance", "balance")
            .build();

        let fields: Vec<String> = cfg.validate().into_iter().map(|e| e.field).collect();
        for expected in [
            "classifier.protected_fields",
            "classifier.protected_relative_threshold",
            "classifier.high_change_count",
            "classifier.business_rules",
            "learning.window_size",
            "learning.prior_weight",
            "learning.timestamp_confidence",
            "retention.resolved_max_age_days",
            "stats.common_types_limit",
            "logging.level",
        ] {
            assert!(fields.iter().any(|f| f == expected), "missing {expected}");
        }
    }

    #[test]
    fn validation_error_display() {
        let err = ValidationError {
            field: "learning.window_size".into(),
            message: "must be greater than 0".into(),
        };
        assert_eq!(err.to_string(), "learning.window_size: must be greater than 0");
    }

    // -- Builder --

    #[test]
    fn builder_overrides_selected_fields() {
        let cfg = ConfigBuilder::new()
            .metadata_fields(["stamp"])
            .access_control_fields(["acl"])
            .learning_min_samples(1)
            .database_path(PathBuf::from("/tmp/t.db"))
            .build();
        assert_eq!(cfg.classifier.metadata_fields, vec!["stamp"]);
        assert_eq!(cfg.classifier.access_control_fields, vec!["acl"]);
        assert_eq!(cfg.learning.min_samples, 1);
        assert_eq!(cfg.storage.database_path, PathBuf::from("/tmp/t.db"));
        assert_eq!(cfg.learning.window_size, 20);
    }
}
