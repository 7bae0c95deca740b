use thiserror::Error;

/// Unified result type for the waymark crate.
pub type Result<T> = std::result::Result<T, NavError>;

/// Errors surfaced by the navigation core.
///
/// These cover the programmer-error half of the failure taxonomy: callers
/// must treat them as fatal rather than continue with a possibly corrupted
/// stack. User-navigation races (back at root, `back_to` with no match) are
/// deliberately *not* errors; those operations return `false` instead.
#[derive(Debug, Error)]
pub enum NavError {
    #[error("destination `{0}` is not declared on this controller")]
    UnknownDestination(String),
    #[error("no child controller available under key `{0}`")]
    UnknownChildKey(String),
    #[error("route aborted: {0}")]
    RouteAborted(String),
    #[error("back stack transform produced duplicate instance id `{0}`")]
    DuplicateInstance(String),
    #[error("argument codec failure for destination `{destination}`: {reason}")]
    ArgsCodec { destination: String, reason: String },
    #[error("saved state malformed: {0}")]
    Persistence(String),
    #[error("serialization error: {0}")]
    Serde(#[from] serde_json::Error),
}
