use std::io;

use thiserror::Error;

/// Errors raised by the transport layer.
///
/// All of these are fatal for the exchange: both processes share a hard-coded layout and naming
/// contract, so there is nothing to renegotiate or retry.
#[derive(Debug, Error)]
pub enum IpcError {
    /// A read or write did not match the fixed capacity of a buffer.
    #[error("{what}: expected {expected} bytes, got {actual}")]
    SizeMismatch {
        what: &'static str,
        expected: usize,
        actual: usize,
    },

    /// An OS call failed, or a wait returned something other than success or timeout.
    #[error("`{op}` failed for `{name}`")]
    Os {
        op: &'static str,
        name: String,
        #[source]
        source: io::Error,
    },

    /// An object name that the platform cannot represent.
    #[error("invalid object name `{0}`")]
    InvalidName(String),
}

impl IpcError {
    pub(crate) fn os(op: &'static str, name: &str, source: io::Error) -> Self {
        Self::Os {
            op,
            name: name.to_string(),
            source,
        }
    }
}
