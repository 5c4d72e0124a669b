use crate::event::EventKind;

/// Inbound text that could not be turned into a [`crate::Message`].
///
/// The runtime logs these and drops the message; no state changes.
#[derive(Debug, thiserror::Error)]
pub enum DecodeError {
    #[error("empty message")]
    Empty,

    /// Not JSON, unknown envelope `type`, or a required field missing.
    #[error("malformed message: {0}")]
    Malformed(#[from] serde_json::Error),
}

/// Outbound message that has no wire representation.
#[derive(Debug, thiserror::Error)]
pub enum EncodeError {
    #[error("event kind {0} is internal and never sent on the wire")]
    NotRepresentable(EventKind),

    /// `data` does not have the shape decoding would give it for this kind,
    /// so the peer would read back something else.
    #[error("payload does not fit event kind {0}")]
    PayloadMismatch(EventKind),

    #[error("encode failed: {0}")]
    Json(#[from] serde_json::Error),
}
