//! Error taxonomy shared by the resolver, codec, executor, registry, and router.
//!
//! Every variant maps to a stable machine-readable code that appears on the
//! WebSocket wire and in HTTP error bodies. Errors are data: a failed request
//! never leaves shared state half-modified and never takes the process down.

use thiserror::Error;

// ── Error code constants ────────────────────────────────────────────

/// No such object, property, function, preset, or field.
pub const NOT_FOUND: &str = "NOT_FOUND";
/// Path matches more than one candidate.
pub const AMBIGUOUS: &str = "AMBIGUOUS";
/// Value shape incompatible with the target's declared type.
pub const TYPE_MISMATCH: &str = "TYPE_MISMATCH";
/// Target property cannot be written.
pub const READ_ONLY: &str = "READ_ONLY";
/// Function ran but reported an engine-side failure.
pub const INVOCATION_FAILED: &str = "INVOCATION_FAILED";
/// Object existed at lookup time but is gone now.
pub const STALE_REFERENCE: &str = "STALE_REFERENCE";
/// Undecodable wire payload.
pub const MALFORMED: &str = "MALFORMED";
/// Binary blob found in a textual payload.
pub const UNSUPPORTED_IN_TEXT_FORMAT: &str = "UNSUPPORTED_IN_TEXT_FORMAT";
/// Engine work did not complete within the request timeout.
pub const TIMEOUT: &str = "TIMEOUT";
/// Field name already bound in the preset.
pub const DUPLICATE_FIELD: &str = "DUPLICATE_FIELD";
/// Binding target does not resolve.
pub const PATH_UNRESOLVABLE: &str = "PATH_UNRESOLVABLE";
/// Request envelope or parameters are invalid.
pub const INVALID_REQUEST: &str = "INVALID_REQUEST";
/// Named resource already exists.
pub const ALREADY_EXISTS: &str = "ALREADY_EXISTS";
/// The session the request belongs to is gone.
pub const SESSION_CLOSED: &str = "SESSION_CLOSED";
/// Unexpected internal failure.
pub const INTERNAL_ERROR: &str = "INTERNAL_ERROR";

/// Bridge error returned by every fallible operation.
#[derive(Clone, Debug, PartialEq, Error)]
pub enum RcError {
    /// Nothing matched. `segment` names the first path segment that failed.
    #[error("{message}")]
    NotFound {
        /// Human-readable description.
        message: String,
        /// First unresolved path segment, when a path was involved.
        segment: Option<String>,
    },

    /// A path resolved to several candidates.
    #[error("path '{path}' is ambiguous: {}", candidates.join(", "))]
    Ambiguous {
        /// The requested path.
        path: String,
        /// Every interpretation that matched.
        candidates: Vec<String>,
    },

    /// Value shape does not fit the declared type.
    #[error("{message}")]
    TypeMismatch {
        /// Description including expected and found kinds.
        message: String,
    },

    /// Write attempted on a read-only property.
    #[error("property '{property}' is read-only")]
    ReadOnly {
        /// Property name.
        property: String,
    },

    /// Function executed and reported a failure.
    #[error("function '{function}' failed: {message}")]
    InvocationFailed {
        /// Function name.
        function: String,
        /// Engine-reported reason.
        message: String,
    },

    /// The referenced object was destroyed after it was resolved.
    #[error("object '{object}' no longer exists")]
    StaleReference {
        /// Token of the destroyed object.
        object: String,
    },

    /// Wire payload could not be decoded.
    #[error("malformed payload: {message}")]
    Malformed {
        /// Decoder diagnostic.
        message: String,
    },

    /// Binary data in a text-format payload.
    #[error("{message}")]
    UnsupportedInTextFormat {
        /// Description.
        message: String,
    },

    /// Engine work exceeded the request timeout.
    #[error("engine did not complete the request within {after_ms} ms")]
    Timeout {
        /// Configured timeout in milliseconds.
        after_ms: u64,
    },

    /// Field already present in the preset.
    #[error("field '{field}' already exists in preset '{preset}'")]
    DuplicateField {
        /// Preset name.
        preset: String,
        /// Conflicting field name.
        field: String,
    },

    /// Binding target path does not resolve against the engine.
    #[error("cannot bind to '{path}': {reason}")]
    PathUnresolvable {
        /// Requested path.
        path: String,
        /// Why resolution failed.
        reason: String,
    },

    /// Bad envelope, unknown method, or bad parameters.
    #[error("{message}")]
    InvalidRequest {
        /// Description.
        message: String,
    },

    /// A uniquely named resource already exists.
    #[error("{message}")]
    AlreadyExists {
        /// Description.
        message: String,
    },

    /// The owning session was torn down.
    #[error("session closed")]
    SessionClosed,

    /// Anything else.
    #[error("{message}")]
    Internal {
        /// Description.
        message: String,
    },
}

/// Result alias for bridge operations.
pub type Result<T> = std::result::Result<T, RcError>;

impl RcError {
    /// Machine-readable error code for this variant.
    pub fn code(&self) -> &'static str {
        match self {
            Self::NotFound { .. } => NOT_FOUND,
            Self::Ambiguous { .. } => AMBIGUOUS,
            Self::TypeMismatch { .. } => TYPE_MISMATCH,
            Self::ReadOnly { .. } => READ_ONLY,
            Self::InvocationFailed { .. } => INVOCATION_FAILED,
            Self::StaleReference { .. } => STALE_REFERENCE,
            Self::Malformed { .. } => MALFORMED,
            Self::UnsupportedInTextFormat { .. } => UNSUPPORTED_IN_TEXT_FORMAT,
            Self::Timeout { .. } => TIMEOUT,
            Self::DuplicateField { .. } => DUPLICATE_FIELD,
            Self::PathUnresolvable { .. } => PATH_UNRESOLVABLE,
            Self::InvalidRequest { .. } => INVALID_REQUEST,
            Self::AlreadyExists { .. } => ALREADY_EXISTS,
            Self::SessionClosed => SESSION_CLOSED,
            Self::Internal { .. } => INTERNAL_ERROR,
        }
    }

    /// Path segment that failed resolution, if any.
    pub fn segment(&self) -> Option<&str> {
        match self {
            Self::NotFound { segment, .. } => segment.as_deref(),
            _ => None,
        }
    }

    /// Shorthand for a `NotFound` without segment information.
    pub fn not_found(message: impl Into<String>) -> Self {
        Self::NotFound {
            message: message.into(),
            segment: None,
        }
    }

    /// Shorthand for a `TypeMismatch`.
    pub fn type_mismatch(message: impl Into<String>) -> Self {
        Self::TypeMismatch {
            message: message.into(),
        }
    }

    /// Shorthand for a `Malformed` payload error.
    pub fn malformed(message: impl Into<String>) -> Self {
        Self::Malformed {
            message: message.into(),
        }
    }

    /// Shorthand for an `InvalidRequest`.
    pub fn invalid_request(message: impl Into<String>) -> Self {
        Self::InvalidRequest {
            message: message.into(),
        }
    }

    /// Shorthand for an `Internal` error.
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }
}
