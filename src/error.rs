//! Error types for the interception pipeline.

use std::path::PathBuf;

/// Failure to obtain scenario bytes for a file identifier.
///
/// Providers never surface this: a load failure means "nothing here".
#[derive(Debug, thiserror::Error)]
pub enum LoadError {
    #[error("scenario not found: {0}")]
    NotFound(String),

    #[error("failed to read scenario {id}: {source}")]
    Io {
        id: String,
        #[source]
        source: std::io::Error,
    },
}

/// Scenario bytes could not be turned into a usable descriptor.
#[derive(Debug, thiserror::Error)]
pub enum DecodeError {
    #[error("malformed {format} scenario: {message}")]
    Syntax { format: String, message: String },

    #[error("invalid rule {rule}: {message}")]
    InvalidRule { rule: String, message: String },
}

/// A recorded exchange could not be encoded.
#[derive(Debug, thiserror::Error)]
#[error("failed to encode {format} scenario: {message}")]
pub struct EncodeError {
    pub format: String,
    pub message: String,
}

/// Failure on the recording write-path.
#[derive(Debug, thiserror::Error)]
pub enum RecordingError {
    #[error(transparent)]
    Encode(#[from] EncodeError),

    #[error("failed to write scenario {id}: {source}")]
    Write {
        id: String,
        #[source]
        source: std::io::Error,
    },

    #[error("recording task failed: {0}")]
    Task(String),
}

/// Failure reported by the live transport.
#[derive(Debug, thiserror::Error)]
#[error("transport error: {message}")]
pub struct TransportError {
    pub message: String,
}

impl TransportError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

/// Invalid interceptor configuration, detected at build time.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("recording requires a storage root")]
    MissingStorageRoot,

    #[error("static scenarios require a scenario loader")]
    MissingLoader,

    #[error("storage root is not a directory: {0}")]
    InvalidStorageRoot(PathBuf),

    #[error("unknown scenario format: {0}")]
    UnknownFormat(String),
}

/// Error surfaced to the caller of an intercepted request.
#[derive(Debug, thiserror::Error)]
pub enum InterceptError {
    #[error("no scenario matched {method} {url}")]
    NoMatch { method: String, url: String },

    #[error(transparent)]
    Decode(#[from] DecodeError),

    #[error("failed to render response for rule {rule}: {message}")]
    Render { rule: String, message: String },

    #[error(transparent)]
    Recording(#[from] RecordingError),

    #[error(transparent)]
    Transport(#[from] TransportError),

    #[error("scenario resolution task failed: {0}")]
    Task(String),
}

impl InterceptError {
    /// Whether this is the ENABLED-mode "no scenario matched" failure.
    pub fn is_no_match(&self) -> bool {
        matches!(self, InterceptError::NoMatch { .. })
    }
}
