//! Error handling primitives shared across the crate.
//!
//! Every fallible operation returns [`AttrResult`]. Each variant carries a
//! stable [`ErrorCode`] so the command driver can turn failures into
//! distinct process exit codes.

use thiserror::Error;

/// Stable error codes, also used as process exit statuses.
#[repr(u8)]
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum ErrorCode {
    /// Malformed input or missing columns.
    DataValidation = 2,
    /// Model artifact missing, unreadable or corrupt.
    ArtifactLoad = 3,
    /// Feature vector does not match the trained schema.
    SchemaMismatch = 4,
    /// Persistence layer or object store unreachable.
    Connection = 5,
    /// Raw data source unreachable.
    UpstreamFetch = 6,
    /// Configuration file missing or semantically invalid.
    Config = 7,
    /// Local filesystem failure.
    Io = 8,
}

impl ErrorCode {
    /// Short machine-readable name, used as a structured log field.
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorCode::DataValidation => "data_validation",
            ErrorCode::ArtifactLoad => "artifact_load",
            ErrorCode::SchemaMismatch => "schema_mismatch",
            ErrorCode::Connection => "connection",
            ErrorCode::UpstreamFetch => "upstream_fetch",
            ErrorCode::Config => "config",
            ErrorCode::Io => "io",
        }
    }

    pub fn exit_code(&self) -> u8 {
        *self as u8
    }
}

/// Canonical error type for the crate.
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum AttritionError {
    /// Input data failed validation (missing columns, unparsable values).
    #[error("data validation failed: {0}")]
    DataValidation(String),

    /// The classifier artifact could not be read or deserialized.
    #[error("failed to load artifact from {location}: {reason}")]
    ArtifactLoad { location: String, reason: String },

    /// The feature columns disagree with the columns the model was trained on.
    #[error(
        "feature schema mismatch: expected {} columns [{}], got {} columns [{}]",
        expected.len(),
        expected.join(", "),
        actual.len(),
        actual.join(", ")
    )]
    SchemaMismatch {
        expected: Vec<String>,
        actual: Vec<String>,
    },

    /// A persistence backend or object store could not be reached.
    #[error("connection to {target} failed: {reason}")]
    Connection { target: String, reason: String },

    /// The raw data source could not be fetched.
    #[error("failed to fetch {url}: {reason}")]
    UpstreamFetch { url: String, reason: String },

    /// Configuration is malformed or semantically invalid.
    #[error("invalid config: {reason}")]
    Config { reason: String },

    /// Underlying I/O error, with the path that was being accessed.
    #[error("io error at {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
}

/// Result alias used throughout the crate.
pub type AttrResult<T> = Result<T, AttritionError>;

impl AttritionError {
    /// Validation helper.
    pub fn invalid(msg: impl Into<String>) -> Self {
        Self::DataValidation(msg.into())
    }

    pub fn artifact_load(location: impl Into<String>, reason: impl ToString) -> Self {
        Self::ArtifactLoad {
            location: location.into(),
            reason: reason.to_string(),
        }
    }

    pub fn schema_mismatch(expected: &[String], actual: &[String]) -> Self {
        Self::SchemaMismatch {
            expected: expected.to_vec(),
            actual: actual.to_vec(),
        }
    }

    pub fn connection(target: impl Into<String>, reason: impl ToString) -> Self {
        Self::Connection {
            target: target.into(),
            reason: reason.to_string(),
        }
    }

    pub fn upstream(url: impl Into<String>, reason: impl ToString) -> Self {
        Self::UpstreamFetch {
            url: url.into(),
            reason: reason.to_string(),
        }
    }

    pub fn io(path: impl AsRef<std::path::Path>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.as_ref().display().to_string(),
            source,
        }
    }

    pub fn config(reason: impl Into<String>) -> Self {
        Self::Config {
            reason: reason.into(),
        }
    }

    /// Stable code for this error.
    pub fn code(&self) -> ErrorCode {
        match self {
            Self::DataValidation(_) => ErrorCode::DataValidation,
            Self::ArtifactLoad { .. } => ErrorCode::ArtifactLoad,
            Self::SchemaMismatch { .. } => ErrorCode::SchemaMismatch,
            Self::Connection { .. } => ErrorCode::Connection,
            Self::UpstreamFetch { .. } => ErrorCode::UpstreamFetch,
            Self::Config { .. } => ErrorCode::Config,
            Self::Io { .. } => ErrorCode::Io,
        }
    }
}
