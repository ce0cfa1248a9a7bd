//! Processor configuration.

use serde::{Deserialize, Serialize};

/// Configuration for a [`crate::SqlProcessor`].
///
/// Deserializes from partial documents; absent fields keep their defaults.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProcessorConfig {
    /// Whether executed statements are logged at debug level.
    pub log_statements: bool,
    /// Maximum number of parts accepted in one batch.
    pub max_batch_parts: usize,
    /// Maximum number of requests accepted in one changeset.
    pub max_changeset_size: usize,
}

impl Default for ProcessorConfig {
    fn default() -> Self {
        Self {
            log_statements: true,
            max_batch_parts: 100,
            max_changeset_size: 1000,
        }
    }
}

impl ProcessorConfig {
    /// Creates a configuration with default values.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Enables or disables statement logging.
    #[must_use]
    pub const fn with_log_statements(mut self, enabled: bool) -> Self {
        self.log_statements = enabled;
        self
    }

    /// Sets the maximum number of batch parts.
    #[must_use]
    pub const fn with_max_batch_parts(mut self, max: usize) -> Self {
        self.max_batch_parts = max;
        self
    }

    /// Sets the maximum changeset size.
    #[must_use]
    pub const fn with_max_changeset_size(mut self, max: usize) -> Self {
        self.max_changeset_size = max;
        self
    }
}
