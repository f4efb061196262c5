//! Error types for wirecall.
//!
//! One enum covers both sides of the wire. Variants are grouped by where they
//! originate: registration, dispatch (server side, reported through the
//! response envelope), and the client side (binding, transport, decoding).

use std::time::Duration;
use thiserror::Error;

/// Main error type for wirecall.
#[derive(Debug, Error)]
pub enum WirecallError {
    // Registration errors
    #[error("{endpoint}: {message}")]
    Signature { endpoint: String, message: String },

    #[error("{endpoint} has already been registered")]
    Duplicate { endpoint: String },

    // Dispatch errors
    #[error("malformed request: {message}")]
    MalformedRequest { message: String },

    #[error("api {endpoint} not registered")]
    UnknownEndpoint { endpoint: String },

    #[error("api {endpoint} params count unmatched: expected {expected}, got {actual}")]
    ArgumentCount {
        endpoint: String,
        expected: usize,
        actual: usize,
    },

    #[error("arg {argument} missing")]
    MissingArgument { argument: String },

    #[error("arg {argument} decode failed: {message}")]
    ArgumentDecode { argument: String, message: String },

    #[error("{endpoint} panicked: {message}")]
    Panicked { endpoint: String, message: String },

    /// An error returned by the handler itself. Displays the message verbatim.
    #[error("{0}")]
    Handler(String),

    #[error("{endpoint} result {index} encode failed: {message}")]
    ResultEncode {
        endpoint: String,
        index: usize,
        message: String,
    },

    // Client errors
    #[error("client configuration error: {message}")]
    Config { message: String },

    #[error("bind {endpoint}: {message}")]
    Binding { endpoint: String, message: String },

    #[error("{endpoint} argument {index} encode failed: {message}")]
    ArgumentEncode {
        endpoint: String,
        index: usize,
        message: String,
    },

    #[error("transport error calling {endpoint}: {message}")]
    Transport { endpoint: String, message: String },

    #[error("call to {endpoint} timed out after {timeout:?}")]
    Timeout { endpoint: String, timeout: Duration },

    #[error("decode response of {endpoint}: {message}")]
    ResponseDecode { endpoint: String, message: String },

    /// The server answered with `status = error`. Displays `detail` verbatim.
    #[error("{detail}")]
    Remote { endpoint: String, detail: String },

    // Server startup errors
    #[error("IO error: {message}")]
    Io {
        message: String,
        #[source]
        source: Option<std::io::Error>,
    },

    #[error("invalid listen address {addr}: {message}")]
    InvalidAddress { addr: String, message: String },
}

/// Result type alias for wirecall operations.
pub type Result<T> = std::result::Result<T, WirecallError>;

impl From<std::io::Error> for WirecallError {
    fn from(err: std::io::Error) -> Self {
        WirecallError::Io {
            message: err.to_string(),
            source: Some(err),
        }
    }
}

impl WirecallError {
    /// Map a reqwest failure for a call to `endpoint` into a client-side error.
    pub(crate) fn from_reqwest(endpoint: &str, timeout: Duration, err: reqwest::Error) -> Self {
        if err.is_timeout() {
            WirecallError::Timeout {
                endpoint: endpoint.to_string(),
                timeout,
            }
        } else {
            WirecallError::Transport {
                endpoint: endpoint.to_string(),
                message: err.to_string(),
            }
        }
    }

    /// Whether this error was raised while registering a receiver.
    pub fn is_registration(&self) -> bool {
        matches!(
            self,
            WirecallError::Signature { .. } | WirecallError::Duplicate { .. }
        )
    }

    /// Whether this error is a per-request dispatch failure.
    pub fn is_dispatch(&self) -> bool {
        matches!(
            self,
            WirecallError::MalformedRequest { .. }
                | WirecallError::UnknownEndpoint { .. }
                | WirecallError::ArgumentCount { .. }
                | WirecallError::MissingArgument { .. }
                | WirecallError::ArgumentDecode { .. }
                | WirecallError::Panicked { .. }
                | WirecallError::Handler(_)
                | WirecallError::ResultEncode { .. }
        )
    }

    /// Whether the call never produced a usable response envelope.
    pub fn is_transport(&self) -> bool {
        matches!(
            self,
            WirecallError::Transport { .. }
                | WirecallError::Timeout { .. }
                | WirecallError::ResponseDecode { .. }
        )
    }
}
