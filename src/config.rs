use serde::{Deserialize, Serialize};

use crate::measure::TextMetrics;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid config: {0}")]
    Json(#[from] serde_json::Error),
    #[error("Table prefix must not be empty")]
    EmptyPrefix,
    #[error("Default schema must not be empty")]
    EmptySchema,
}

/// Naming and sizing used by the builder service.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct BuilderConfig {
    /// Prefix for auto-named tables
    pub table_prefix: String,
    pub default_schema: String,
    /// First suffix handed out by the table counter
    pub first_table_suffix: i64,
    pub column_prefix: String,
    pub first_column_suffix: i64,
    pub metrics: TextMetrics,
}

impl Default for BuilderConfig {
    fn default() -> Self {
        Self {
            table_prefix: "untitled".to_string(),
            default_schema: "dbo".to_string(),
            first_table_suffix: -1,
            column_prefix: "column".to_string(),
            first_column_suffix: -1,
            metrics: TextMetrics::default(),
        }
    }
}

impl BuilderConfig {
    pub fn from_json(input: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_str(input)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.table_prefix.is_empty() || self.column_prefix.is_empty() {
            return Err(ConfigError::EmptyPrefix);
        }
        if self.default_schema.is_empty() {
            return Err(ConfigError::EmptySchema);
        }
        Ok(())
    }
}
