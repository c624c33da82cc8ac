//! Error types for the envelope codec.

use thiserror::Error;

/// Errors that can occur while encoding or decoding envelopes.
#[derive(Debug, Error)]
pub enum EnvelopeError {
    /// The envelope is missing a required field or carries a payload that
    /// is not valid for its kind.
    #[error("malformed envelope: {reason}")]
    Malformed {
        /// What was wrong with the envelope.
        reason: String,
    },

    /// JSON serialization failed
    #[error("serialization failed: {0}")]
    Serialization(#[source] serde_json::Error),

    /// A media payload did not carry valid base64
    #[error("invalid {kind} payload: {source}")]
    InvalidMedia {
        /// The media prefix that was declared.
        kind: &'static str,
        /// Underlying base64 error.
        #[source]
        source: base64::DecodeError,
    },
}

impl EnvelopeError {
    pub(crate) fn malformed(reason: impl Into<String>) -> Self {
        Self::Malformed {
            reason: reason.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_display() {
        let err = EnvelopeError::malformed("missing emitter");
        assert_eq!(err.to_string(), "malformed envelope: missing emitter");
    }

    #[test]
    fn error_is_send_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<EnvelopeError>();
    }
}
