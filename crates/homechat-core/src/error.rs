//! Error type shared by the stream pipeline, the conversation and the transport.

/// Errors from submitting a prompt or consuming a streamed reply.
///
/// Every error is scoped to the current submission; none of them leave the
/// conversation unusable.
#[derive(Debug, thiserror::Error)]
pub enum ChatError {
    /// A `data:` candidate that is not a completion event. The extractor
    /// recovers from this by skipping the candidate; it is never surfaced by
    /// the pump.
    #[error("malformed frame: {0}")]
    MalformedFrame(String),

    /// The byte stream or the connection failed.
    #[error("transport error: {0}")]
    Transport(#[source] Box<dyn std::error::Error + Send + Sync>),

    /// The endpoint answered with a non-success status.
    #[error("endpoint returned HTTP {status}: {body}")]
    Status { status: u16, body: String },

    /// The operation is not allowed in the current state (e.g. submitting
    /// while a reply is still streaming).
    #[error("invalid state: {0}")]
    InvalidState(&'static str),
}

impl ChatError {
    /// Whether this error ended a stream (as opposed to a rejected call).
    #[must_use]
    pub fn is_transport(&self) -> bool {
        matches!(self, Self::Transport(_) | Self::Status { .. })
    }
}

impl From<reqwest::Error> for ChatError {
    fn from(err: reqwest::Error) -> Self {
        ChatError::Transport(Box::new(err))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_is_a_transport_error() {
        let err = ChatError::Status {
            status: 502,
            body: "bad gateway".into(),
        };
        assert!(err.is_transport());
        assert_eq!(err.to_string(), "endpoint returned HTTP 502: bad gateway");
    }

    #[test]
    fn invalid_state_is_not_a_transport_error() {
        let err = ChatError::InvalidState("a reply is already streaming");
        assert!(!err.is_transport());
        assert!(!ChatError::MalformedFrame("[DONE]".into()).is_transport());
    }
}
