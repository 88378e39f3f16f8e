//! Field-name matching for classifier rules
//!
//! Protected, access-control and metadata field lists come from
//! configuration as glob patterns. A field matches a set when any pattern in
//! the set matches its name.

use glob::Pattern;
use tracing::{debug, warn};

/// A compiled set of field-name patterns
#[derive(Debug, Clone, Default)]
pub struct FieldMatcher {
    patterns: Vec<Pattern>,
}

impl FieldMatcher {
    /// Compiles the given patterns
    ///
    /// Invalid patterns are logged and skipped.
    pub fn new<S: AsRef<str>>(label: &str, patterns: &[S]) -> Self {
        let compiled: Vec<Pattern> = patterns
            .iter()
            .filter_map(|raw| match Pattern::new(raw.as_ref()) {
                Ok(p) => Some(p),
                Err(e) => {
                    warn!(
                        set = label,
                        pattern = raw.as_ref(),
                        error = %e,
                        "Skipping invalid field pattern"
                    );
                    None
                }
            })
            .collect();

        debug!(set = label, patterns = compiled.len(), "Field matcher compiled");

        Self { patterns: compiled }
    }

    /// Returns true if any pattern matches the field name
    pub fn matches(&self, field: &str) -> bool {
        self.patterns.iter().any(|p| p.matches(field))
    }
}
