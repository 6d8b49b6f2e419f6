//! Error handling for Varispeed
//!
//! Failures are split by origin so callers can tell malformed input,
//! engine ("processing") failures and sink ("I/O") failures apart.

use std::io;

use thiserror::Error;

/// Result type alias for Varispeed operations
pub type Result<T> = std::result::Result<T, VarispeedError>;

/// Main error type for Varispeed operations
#[derive(Error, Debug)]
pub enum VarispeedError {
    // Caller Input Errors
    #[error("Invalid value: {reason}")]
    Invalid { reason: String },

    // Engine Errors
    #[error("Failed to create engine ({sample_rate} Hz, {channels} channels): {reason}")]
    EngineCreate {
        sample_rate: u32,
        channels: u32,
        reason: String,
    },

    #[error("Engine rejected input: {reason}")]
    EngineWrite { reason: String },

    #[error("Engine flush failed: {reason}")]
    EngineFlush { reason: String },

    // Sink Errors
    #[error("Failed to write to sink: {source}")]
    SinkWrite {
        #[source]
        source: io::Error,
    },

    // Lifecycle Errors
    #[error("Cannot {operation}: transformer is closed")]
    InvalidState { operation: &'static str },

    #[error("Internal error: {reason}")]
    Internal { reason: String },

    // Serialization Errors
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl VarispeedError {
    /// Shorthand for an [`VarispeedError::Invalid`] error
    pub fn invalid(reason: impl Into<String>) -> Self {
        VarispeedError::Invalid {
            reason: reason.into(),
        }
    }

    /// Get the error code for this error type
    pub fn error_code(&self) -> &'static str {
        match self {
            VarispeedError::Invalid { .. } => "INVALID",
            VarispeedError::EngineCreate { .. } => "ENGINE_CREATE",
            VarispeedError::EngineWrite { .. } => "ENGINE_WRITE",
            VarispeedError::EngineFlush { .. } => "ENGINE_FLUSH",
            VarispeedError::SinkWrite { .. } => "SINK_WRITE",
            VarispeedError::InvalidState { .. } => "INVALID_STATE",
            VarispeedError::Internal { .. } => "INTERNAL",
            VarispeedError::Serialization(_) => "SERIALIZATION_ERROR",
        }
    }

    /// True for failures reported by the transformation engine
    pub fn is_engine_failure(&self) -> bool {
        matches!(
            self,
            VarispeedError::EngineCreate { .. }
                | VarispeedError::EngineWrite { .. }
                | VarispeedError::EngineFlush { .. }
        )
    }

    /// True for failures reported by the downstream sink
    pub fn is_sink_failure(&self) -> bool {
        matches!(self, VarispeedError::SinkWrite { .. })
    }

    /// Check if retrying the operation can succeed
    ///
    /// Consumed byte counts are exact, so a caller can resume after a sink
    /// failure or reshape its input after an `Invalid` rejection.
    pub fn is_recoverable(&self) -> bool {
        match self {
            VarispeedError::Invalid { .. } => true,
            VarispeedError::SinkWrite { source } => !matches!(
                source.kind(),
                io::ErrorKind::BrokenPipe | io::ErrorKind::WriteZero
            ),
            _ => false,
        }
    }

    /// Get recovery suggestions for this error
    pub fn recovery_suggestions(&self) -> Vec<&'static str> {
        match self {
            VarispeedError::Invalid { .. } => vec![
                "Check that buffers hold whole samples of the selected encoding",
                "Sample rate must lie within the engine limits",
            ],
            VarispeedError::EngineCreate { .. } => vec![
                "Check the sample rate and channel count",
                "Try a different engine implementation",
            ],
            VarispeedError::SinkWrite { .. } => vec![
                "Retry with the bytes that were not reported as consumed",
                "Check that the destination is still writable",
            ],
            VarispeedError::InvalidState { .. } => {
                vec!["Create a new transformer; a closed one cannot be reused"]
            }
            _ => vec![],
        }
    }

    /// Re-tag a failure returned by [`Engine`](crate::engine::Engine) writes
    pub(crate) fn into_engine_write(self) -> Self {
        match self {
            err @ VarispeedError::EngineWrite { .. } => err,
            other => VarispeedError::EngineWrite {
                reason: other.to_string(),
            },
        }
    }

    /// Re-tag a failure returned by [`Engine`](crate::engine::Engine) flushes
    pub(crate) fn into_engine_flush(self) -> Self {
        match self {
            err @ VarispeedError::EngineFlush { .. } => err,
            other => VarispeedError::EngineFlush {
                reason: other.to_string(),
            },
        }
    }

    /// Re-tag a failure returned by an engine constructor
    pub(crate) fn into_engine_create(self, sample_rate: u32, channels: u32) -> Self {
        match self {
            err @ VarispeedError::EngineCreate { .. } => err,
            other => VarispeedError::EngineCreate {
                sample_rate,
                channels,
                reason: other.to_string(),
            },
        }
    }
}

impl From<VarispeedError> for io::Error {
    fn from(err: VarispeedError) -> Self {
        match err {
            VarispeedError::SinkWrite { source } => source,
            VarispeedError::Invalid { .. } => io::Error::new(io::ErrorKind::InvalidInput, err),
            other => io::Error::new(io::ErrorKind::Other, other),
        }
    }
}

/// A streaming write that stopped early
///
/// `consumed` counts the input bytes that were accepted before the failure.
/// Those bytes have been pushed to the engine; output derived from them may
/// not have reached the sink.
#[derive(Error, Debug)]
#[error("{source} (after consuming {consumed} bytes)")]
pub struct PartialWrite {
    pub consumed: usize,
    #[source]
    pub source: VarispeedError,
}

impl PartialWrite {
    pub(crate) fn new(consumed: usize, source: VarispeedError) -> Self {
        Self { consumed, source }
    }

    /// The underlying failure
    pub fn error(&self) -> &VarispeedError {
        &self.source
    }

    /// Discard the byte count and keep the failure
    pub fn into_inner(self) -> VarispeedError {
        self.source
    }
}

impl From<PartialWrite> for VarispeedError {
    fn from(err: PartialWrite) -> Self {
        err.source
    }
}

impl From<PartialWrite> for io::Error {
    fn from(err: PartialWrite) -> Self {
        err.source.into()
    }
}
