//! Error handling types for modelgate.
//!
//! Pipeline failures carry the [`Operation`] they happened in, so callers get
//! an operation-specific code (`chat.no_model_found`, `embed.unsupported_operation`)
//! while the original cause stays reachable through `source()`.

use thiserror::Error;

use crate::hooks::HookStage;
use crate::registry::Rejection;
use crate::types::{Operation, SelectionCriteria};

/// Coarse classification used for reporting.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    /// No catalog entry matched.
    Selection,
    /// The chosen target lacks the endpoint or mode.
    Unsupported,
    /// A hook rejected the request (budget, tenancy policy).
    Policy,
    /// The provider or handler call failed.
    Provider,
    /// The caller cancelled.
    Cancelled,
    Configuration,
    Client,
    Internal,
}

#[derive(Error, Debug)]
pub enum LlmError {
    #[error(
        "No model satisfies the {operation} request ({count} candidates rejected)",
        count = .rejected.len()
    )]
    NoModelFound {
        operation: Operation,
        criteria: Box<SelectionCriteria>,
        rejected: Vec<Rejection>,
    },

    /// The criteria could not be evaluated, e.g. an unknown weight profile.
    #[error("Model selection for {operation} failed: {source}")]
    SelectionFailed {
        operation: Operation,
        #[source]
        source: Box<LlmError>,
    },

    #[error("{operation} is not supported by {provider}/{model}: {reason}")]
    UnsupportedOperation {
        operation: Operation,
        provider: String,
        model: String,
        reason: String,
    },

    #[error("{hook} hook aborted the {operation} request: {source}")]
    HookAborted {
        operation: Operation,
        hook: HookStage,
        #[source]
        source: Box<LlmError>,
    },

    #[error("{provider}/{model} failed during {operation}: {source}")]
    ProviderExecution {
        operation: Operation,
        provider: String,
        model: String,
        #[source]
        source: Box<LlmError>,
    },

    #[error("{operation} stream from {provider}/{model} was aborted")]
    StreamAborted {
        operation: Operation,
        provider: String,
        model: String,
    },

    #[error("{operation} request was cancelled")]
    Cancelled { operation: Operation },

    /// Raised by provider adapters and handlers.
    #[error("Provider error ({provider}): {message}")]
    ProviderError {
        provider: String,
        message: String,
        status: Option<u16>,
    },

    /// Raised by budget hooks; surfaces wrapped in `HookAborted`.
    #[error("Budget exceeded: estimated ${estimated:.6} against a limit of ${limit:.6}")]
    BudgetExceeded { limit: f64, estimated: f64 },

    #[error("Configuration error: {0}")]
    ConfigurationError(String),

    #[error("Invalid parameter: {0}")]
    InvalidParameter(String),

    #[error("JSON error: {0}")]
    JsonError(String),

    #[error("Internal error: {0}")]
    InternalError(String),
}

impl LlmError {
    pub fn provider(provider: impl Into<String>, message: impl Into<String>) -> Self {
        Self::ProviderError {
            provider: provider.into(),
            message: message.into(),
            status: None,
        }
    }

    /// The operation the error belongs to, when it came out of the pipeline.
    pub fn operation(&self) -> Option<Operation> {
        match self {
            Self::NoModelFound { operation, .. }
            | Self::SelectionFailed { operation, .. }
            | Self::UnsupportedOperation { operation, .. }
            | Self::HookAborted { operation, .. }
            | Self::ProviderExecution { operation, .. }
            | Self::StreamAborted { operation, .. }
            | Self::Cancelled { operation } => Some(*operation),
            _ => None,
        }
    }

    /// Stable machine-readable kind.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::NoModelFound { .. } => "no_model_found",
            Self::SelectionFailed { .. } => "selection_failed",
            Self::UnsupportedOperation { .. } => "unsupported_operation",
            Self::HookAborted { .. } => "hook_aborted",
            Self::ProviderExecution { .. } => "provider_execution_error",
            Self::StreamAborted { .. } => "stream_aborted",
            Self::Cancelled { .. } => "cancelled",
            Self::ProviderError { .. } => "provider_error",
            Self::BudgetExceeded { .. } => "budget_exceeded",
            Self::ConfigurationError(_) => "configuration_error",
            Self::InvalidParameter(_) => "invalid_parameter",
            Self::JsonError(_) => "json_error",
            Self::InternalError(_) => "internal_error",
        }
    }

    /// Operation-qualified code, e.g. `image.hook_aborted`.
    pub fn code(&self) -> String {
        match self.operation() {
            Some(op) => format!("{}.{}", op.as_str(), self.kind()),
            None => self.kind().to_string(),
        }
    }

    pub fn category(&self) -> ErrorCategory {
        match self {
            Self::NoModelFound { .. } | Self::SelectionFailed { .. } => ErrorCategory::Selection,
            Self::UnsupportedOperation { .. } => ErrorCategory::Unsupported,
            Self::HookAborted { .. } | Self::BudgetExceeded { .. } => ErrorCategory::Policy,
            Self::ProviderExecution { .. } | Self::ProviderError { .. } => ErrorCategory::Provider,
            Self::StreamAborted { .. } | Self::Cancelled { .. } => ErrorCategory::Cancelled,
            Self::ConfigurationError(_) => ErrorCategory::Configuration,
            Self::InvalidParameter(_) | Self::JsonError(_) => ErrorCategory::Client,
            Self::InternalError(_) => ErrorCategory::Internal,
        }
    }

    pub fn is_abort(&self) -> bool {
        self.category() == ErrorCategory::Cancelled
    }

    /// HTTP status reported by the provider, looking through wrappers.
    pub fn status_code(&self) -> Option<u16> {
        match self {
            Self::ProviderError { status, .. } => *status,
            Self::ProviderExecution { source, .. } | Self::HookAborted { source, .. } => {
                source.status_code()
            }
            _ => None,
        }
    }
}

impl From<serde_json::Error> for LlmError {
    fn from(err: serde_json::Error) -> Self {
        Self::JsonError(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, LlmError>;
