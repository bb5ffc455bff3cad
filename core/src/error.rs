use thiserror::Error;

/// Error codes surfaced to agents in `structuredContent.error`.
pub mod codes {
    pub const VALIDATION_FAILED: &str = "validation_failed";
    pub const NOT_INITIALIZED: &str = "not_initialized";
    pub const UNKNOWN_TOOL: &str = "unknown_tool";
    pub const BACKEND_ERROR: &str = "backend_error";
}

/// Every failure a tool call can report.
///
/// None of these are fatal to the process: the protocol layer turns each
/// one into a failed tool result carrying [`GscError::code`] and the
/// display text.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum GscError {
    /// Malformed or missing arguments, detected before any backend call.
    #[error("{message}")]
    Validation {
        message: String,
        field: Option<String>,
    },
    /// No credential was resolved at startup.
    #[error(
        "Google Search Console client not initialized. Set GOOGLE_APPLICATION_CREDENTIALS \
         or pass --credentials, then restart the server."
    )]
    NotInitialized,
    #[error("Unknown tool: {0}")]
    UnknownTool(String),
    /// Anything the backend raised: auth rejection, quota, transport.
    #[error("Error {operation}: {cause}")]
    Backend {
        operation: &'static str,
        cause: String,
    },
}

impl GscError {
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation {
            message: message.into(),
            field: None,
        }
    }

    pub fn invalid_field(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Validation {
            message: message.into(),
            field: Some(field.into()),
        }
    }

    pub fn backend(operation: &'static str, cause: impl std::fmt::Display) -> Self {
        Self::Backend {
            operation,
            cause: cause.to_string(),
        }
    }

    /// Machine-readable code, stable across releases.
    pub fn code(&self) -> &'static str {
        match self {
            GscError::Validation { .. } => codes::VALIDATION_FAILED,
            GscError::NotInitialized => codes::NOT_INITIALIZED,
            GscError::UnknownTool(_) => codes::UNKNOWN_TOOL,
            GscError::Backend { .. } => codes::BACKEND_ERROR,
        }
    }

    pub fn field(&self) -> Option<&str> {
        match self {
            GscError::Validation { field, .. } => field.as_deref(),
            _ => None,
        }
    }
}
