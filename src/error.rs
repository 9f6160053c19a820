//! Error types for dialect state and SQL rewriting.

use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SqlTraceError {
    /// The connector does not expose a capability the dialect state needs.
    #[error("configuration error: connector lacks `{0}`")]
    Configuration(&'static str),

    /// The observed call cannot be turned into SQL.
    #[error("invalid operation: {0}")]
    InvalidOperation(String),
}

impl SqlTraceError {
    pub(crate) fn invalid(msg: impl Into<String>) -> Self {
        Self::InvalidOperation(msg.into())
    }

    /// Short label used for metrics.
    pub fn reason(&self) -> &'static str {
        match self {
            Self::Configuration(_) => "configuration",
            Self::InvalidOperation(_) => "invalid_operation",
        }
    }
}

pub type Result<T> = std::result::Result<T, SqlTraceError>;
