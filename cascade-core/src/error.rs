//! Render Errors
//!
//! Every failure that can surface from a render is a [`RenderError`]. The
//! type is `Clone` because a memoized element caches its terminal result and
//! hands the same failure to every consumer, and because spans keep a copy
//! of the error they were closed with.

use std::borrow::Cow;
use std::fmt;

/// Convenience alias used throughout the crate.
pub type Result<T, E = RenderError> = std::result::Result<T, E>;

/// Machine-readable classification of a [`RenderError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// A component failed, or one of its deferred values rejected.
    Evaluation,

    /// A component was invoked with parameters that violate its contract.
    Validation,

    /// An assertion inside the render machinery did not hold.
    Internal,

    /// The render was torn down before it produced a result.
    Cancelled,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ErrorKind::Evaluation => "evaluation",
            ErrorKind::Validation => "validation",
            ErrorKind::Internal => "internal",
            ErrorKind::Cancelled => "cancelled",
        };
        f.write_str(name)
    }
}

/// A failure observed while rendering a node.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum RenderError {
    /// A component returned an error or a deferred value rejected.
    #[error("evaluation failed: {message}")]
    Evaluation {
        message: String,
        code: Option<Cow<'static, str>>,
    },

    /// A component contract was violated by its caller.
    #[error("invalid parameters: {message}")]
    Validation {
        message: String,
        code: Option<Cow<'static, str>>,
    },

    /// The render machinery reached a state it should never reach.
    #[error("internal error: {0}")]
    Internal(String),

    /// The render was abandoned before it completed.
    #[error("render cancelled: {0}")]
    Cancelled(String),
}

impl RenderError {
    /// An evaluation failure with the given message.
    pub fn evaluation(message: impl Into<String>) -> Self {
        RenderError::Evaluation {
            message: message.into(),
            code: None,
        }
    }

    /// A validation failure with the given message.
    pub fn validation(message: impl Into<String>) -> Self {
        RenderError::Validation {
            message: message.into(),
            code: None,
        }
    }

    pub fn internal(message: impl Into<String>) -> Self {
        RenderError::Internal(message.into())
    }

    pub fn cancelled(message: impl Into<String>) -> Self {
        RenderError::Cancelled(message.into())
    }

    /// Attach a machine-readable code. Only evaluation and validation
    /// failures carry codes; other kinds are returned unchanged.
    pub fn with_code(mut self, new_code: impl Into<Cow<'static, str>>) -> Self {
        match &mut self {
            RenderError::Evaluation { code, .. } | RenderError::Validation { code, .. } => {
                *code = Some(new_code.into());
            }
            RenderError::Internal(_) | RenderError::Cancelled(_) => {}
        }
        self
    }

    /// The classification of this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            RenderError::Evaluation { .. } => ErrorKind::Evaluation,
            RenderError::Validation { .. } => ErrorKind::Validation,
            RenderError::Internal(_) => ErrorKind::Internal,
            RenderError::Cancelled(_) => ErrorKind::Cancelled,
        }
    }

    /// The machine-readable code, if one was attached.
    pub fn code(&self) -> Option<&str> {
        match self {
            RenderError::Evaluation { code, .. } | RenderError::Validation { code, .. } => {
                code.as_deref()
            }
            RenderError::Internal(_) | RenderError::Cancelled(_) => None,
        }
    }

    /// The human-readable message without the kind prefix.
    pub fn message(&self) -> &str {
        match self {
            RenderError::Evaluation { message, .. } | RenderError::Validation { message, .. } => {
                message
            }
            RenderError::Internal(message) | RenderError::Cancelled(message) => message,
        }
    }
}
