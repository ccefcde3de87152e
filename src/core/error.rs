//! Error handling for release publishing
//!
//! `PublishError` is the single error type shared by the release clients,
//! the stages and the pipeline runner. Provider wire failures are carried as
//! `ApiError` so the HTTP status survives for not-found classification.

use thiserror::Error;

/// Failure reported by a provider's wire API
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{}", describe_api_error(.status, .message))]
pub struct ApiError {
    /// HTTP status, when the provider answered at all
    pub status: Option<u16>,
    pub message: String,
}

fn describe_api_error(status: &Option<u16>, message: &str) -> String {
    match status {
        Some(code) => format!("HTTP {}: {}", code, message),
        None => message.to_string(),
    }
}

impl ApiError {
    /// Error carrying a provider response status
    pub fn status(code: u16, message: impl Into<String>) -> Self {
        Self {
            status: Some(code),
            message: message.into(),
        }
    }

    /// Error raised before any response was received
    pub fn transport(message: impl Into<String>) -> Self {
        Self {
            status: None,
            message: message.into(),
        }
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::status(404, message)
    }

    pub fn is_not_found(&self) -> bool {
        self.status == Some(404)
    }
}

impl From<reqwest::Error> for ApiError {
    fn from(err: reqwest::Error) -> Self {
        Self {
            status: err.status().map(|s| s.as_u16()),
            message: err.to_string(),
        }
    }
}

/// Main error type for release publishing operations
#[derive(Error, Debug)]
pub enum PublishError {
    // Configuration errors
    #[error("invalid configuration for {field}: {message}")]
    Config { field: String, message: String },

    #[error("template {template:?}: {message}")]
    Template { template: String, message: String },

    // Distinguished not-found conditions
    #[error("no milestone found with title {title:?}")]
    NoMilestoneFound { title: String },

    // Provider errors
    #[error("{repo}: {operation}: {source}")]
    Provider {
        repo: String,
        operation: &'static str,
        #[source]
        source: ApiError,
    },

    #[error("release for tag {tag} already has notes and the notes mode forbids replacing them")]
    ReleaseNotesConflict { tag: String },

    /// Marks the wrapped error as safe for a caller-side retry
    #[error(transparent)]
    Retriable(Box<PublishError>),

    // Pipeline errors
    /// Raised by a stage that has nothing to do; never reported as a failure
    #[error("skipped: {0}")]
    Skipped(String),

    #[error("{stage}: failed to publish artifacts: {source}")]
    Stage {
        stage: String,
        #[source]
        source: Box<PublishError>,
    },

    #[error("{stage}: {source}")]
    Continued {
        stage: String,
        #[source]
        source: Box<PublishError>,
    },

    #[error("{}", join_errors(.0))]
    Multiple(Vec<PublishError>),

    #[error("task failed: {0}")]
    TaskFailed(String),

    // Local errors
    #[error("git: {0}")]
    Git(String),

    #[error("failed to serialize {what}: {message}")]
    Serialization { what: String, message: String },

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

fn join_errors(errors: &[PublishError]) -> String {
    errors
        .iter()
        .map(|e| e.to_string())
        .collect::<Vec<_>>()
        .join("\n")
}

impl PublishError {
    pub fn config(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Config {
            field: field.into(),
            message: message.into(),
        }
    }

    /// Wrap a provider failure with the repository and operation it came from
    pub fn provider(repo: impl ToString, operation: &'static str, source: ApiError) -> Self {
        Self::Provider {
            repo: repo.to_string(),
            operation,
            source,
        }
    }

    pub fn retriable(err: PublishError) -> Self {
        match err {
            already @ Self::Retriable(_) => already,
            other => Self::Retriable(Box::new(other)),
        }
    }

    /// Check if a caller may retry the failed operation
    pub fn is_retriable(&self) -> bool {
        matches!(self, Self::Retriable(_))
    }

    /// Check if this error is a not-found condition reported by the provider
    pub fn is_not_found(&self) -> bool {
        match self {
            Self::NoMilestoneFound { .. } => true,
            Self::Provider { source, .. } => source.is_not_found(),
            Self::Retriable(inner) => inner.is_not_found(),
            _ => false,
        }
    }

    pub fn is_skip(&self) -> bool {
        matches!(self, Self::Skipped(_))
    }

    /// Get error code for this error
    pub fn code(&self) -> &'static str {
        match self {
            Self::Config { .. } => "CONFIG_ERROR",
            Self::Template { .. } => "TEMPLATE_ERROR",
            Self::NoMilestoneFound { .. } => "NO_MILESTONE_FOUND",
            Self::Provider { .. } => "PROVIDER_ERROR",
            Self::ReleaseNotesConflict { .. } => "RELEASE_NOTES_CONFLICT",
            Self::Retriable(_) => "RETRIABLE",
            Self::Skipped(_) => "SKIPPED",
            Self::Stage { .. } => "STAGE_FAILED",
            Self::Continued { .. } => "STAGE_FAILED_CONTINUED",
            Self::Multiple(_) => "MULTIPLE_FAILURES",
            Self::TaskFailed(_) => "TASK_FAILED",
            Self::Git(_) => "GIT_ERROR",
            Self::Serialization { .. } => "SERIALIZATION_ERROR",
            Self::Io(_) => "IO_ERROR",
        }
    }
}
