use thiserror::Error;

/// Errors raised while encoding or decoding channel frames.
#[derive(Debug, Error)]
pub enum CodecError {
    /// The frame is not a JSON object with an `event` string.
    #[error("malformed envelope: {0}")]
    Envelope(#[source] serde_json::Error),

    /// The event name is known but its `data` does not fit the decoder.
    #[error("malformed `{event}` payload: {source}")]
    Payload {
        event: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("failed to encode `{event}`: {source}")]
    Encode {
        event: &'static str,
        #[source]
        source: serde_json::Error,
    },
}
