//! Client-core error types.

use thiserror::Error;

/// Errors from the negotiation core.
///
/// Engine failures are local to one peer link; the session tears that link
/// down and other pairs keep negotiating.
#[derive(Debug, Error)]
pub enum LinkError {
    /// The native media engine rejected an operation.
    #[error("Media engine error: {0}")]
    Engine(String),

    /// Operation on a link that has already reached its terminal state.
    #[error("Peer link is closed")]
    Closed,

    /// The signaling channel could not be established or has failed.
    #[error("Signaling error: {0}")]
    Signaling(String),
}
