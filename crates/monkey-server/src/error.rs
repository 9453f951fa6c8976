//! Server error types.

use std::io;
use std::net::SocketAddr;

use thiserror::Error;

/// Errors raised while building, starting or stopping an HTTP server.
#[derive(Debug, Error)]
pub enum ServerError {
    /// A configured address could not be parsed.
    #[error("invalid address '{addr}': {reason}")]
    InvalidAddress {
        /// The configured value.
        addr: String,
        /// Why it was rejected.
        reason: String,
    },

    /// A connector could not bind its listener.
    #[error("failed to bind {connector} connector to {addr}: {source}")]
    Bind {
        /// Connector name.
        connector: &'static str,
        /// Requested address.
        addr: SocketAddr,
        /// Underlying I/O error.
        #[source]
        source: io::Error,
    },

    /// The server's runtime could not be created.
    #[error("failed to create server runtime: {0}")]
    Runtime(#[source] io::Error),

    /// `start` was called on a running server.
    #[error("server is already running")]
    AlreadyRunning,
}

impl ServerError {
    /// Creates an invalid address error.
    pub fn invalid_address(addr: impl Into<String>, reason: impl ToString) -> Self {
        Self::InvalidAddress {
            addr: addr.into(),
            reason: reason.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = ServerError::invalid_address("nope", "invalid socket address syntax");
        assert_eq!(
            err.to_string(),
            "invalid address 'nope': invalid socket address syntax"
        );

        let err = ServerError::Bind {
            connector: "admin",
            addr: "127.0.0.1:8081".parse().unwrap(),
            source: io::Error::new(io::ErrorKind::AddrInUse, "in use"),
        };
        assert_eq!(
            err.to_string(),
            "failed to bind admin connector to 127.0.0.1:8081: in use"
        );
    }
}
