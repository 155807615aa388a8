use std::io;

use thiserror::Error;

/// Errors surfaced by the wire protocol layer.
#[derive(Debug, Error)]
pub enum ProtoError {
    /// Transport-level failure.
    #[error("i/o error: {0}")]
    Io(#[from] io::Error),

    /// The peer closed the connection before answering.
    #[error("connection closed by peer")]
    ConnectionClosed,

    /// The peer answered with an error response.
    #[error("remote error: {0}")]
    Remote(String),

    /// The peer answered with a record the caller did not expect.
    #[error("protocol violation: {0}")]
    Protocol(String),
}
