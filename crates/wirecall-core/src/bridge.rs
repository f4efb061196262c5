//! Failure normalization shared by the dispatcher and the client.
//!
//! Whatever goes wrong during a call (a recovered panic, an explicit error
//! returned by a handler, a string failure value in the final result slot)
//! ends up as exactly one [`WirecallError`]. Callers never see partial outputs
//! next to an error: the outputs only exist on the `Ok` side of the result.

use crate::{Result, WirecallError};
use serde_json::Value;
use std::any::Any;
use std::fmt;
use tracing::error;

/// Capability of the final return slot of every endpoint and proxy: it can
/// produce a human readable failure message.
pub trait ErrorCapable {
    fn failure_message(&self) -> String;
}

impl<T: fmt::Display + ?Sized> ErrorCapable for T {
    fn failure_message(&self) -> String {
        self.to_string()
    }
}

/// Convert an error returned by a handler into the dispatch error reported
/// to the caller.
pub(crate) fn handler_failure<E: ErrorCapable>(err: E) -> WirecallError {
    WirecallError::Handler(err.failure_message())
}

/// Extract a message from a panic payload.
pub(crate) fn panic_message(payload: Box<dyn Any + Send>) -> String {
    if let Some(message) = payload.downcast_ref::<&'static str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown error type on call api".to_string()
    }
}

/// Run a synchronous invocation on the blocking pool, turning a panic into
/// a dispatch error instead of tearing down the caller.
pub(crate) async fn invoke_recovering<F>(endpoint: &str, invocation: F) -> Result<Vec<Value>>
where
    F: FnOnce() -> Result<Vec<Value>> + Send + 'static,
{
    match tokio::task::spawn_blocking(invocation).await {
        Ok(outcome) => outcome,
        Err(join_err) => {
            let message = if join_err.is_panic() {
                panic_message(join_err.into_panic())
            } else {
                join_err.to_string()
            };
            error!("Recovered panic in {}: {}", endpoint, message);
            Err(WirecallError::Panicked {
                endpoint: endpoint.to_string(),
                message,
            })
        }
    }
}

/// Split a successful result list into its outputs and the final error slot.
///
/// The final slot must be `null`. A string there is a failure reported in
/// band and becomes a remote error; anything else is a malformed response.
pub(crate) fn split_error_slot(endpoint: &str, mut result: Vec<Value>) -> Result<Vec<Value>> {
    match result.pop() {
        None => Err(WirecallError::ResponseDecode {
            endpoint: endpoint.to_string(),
            message: "result is missing the final error slot".to_string(),
        }),
        Some(Value::Null) => Ok(result),
        Some(Value::String(detail)) => Err(WirecallError::Remote {
            endpoint: endpoint.to_string(),
            detail,
        }),
        Some(other) => Err(WirecallError::ResponseDecode {
            endpoint: endpoint.to_string(),
            message: format!("final result slot must be null or an error message, got {}", other),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_error_capable_display_types() {
        assert_eq!("boom".failure_message(), "boom");
        assert_eq!(String::from("bad").failure_message(), "bad");
        let io = std::io::Error::new(std::io::ErrorKind::Other, "disk");
        assert_eq!(io.failure_message(), "disk");
    }

    #[test]
    fn test_handler_failure_is_verbatim() {
        let err = handler_failure("boom");
        assert!(err.is_dispatch());
        assert_eq!(err.to_string(), "boom");
    }

    #[test]
    fn test_panic_message_payloads() {
        assert_eq!(panic_message(Box::new("static")), "static");
        assert_eq!(panic_message(Box::new(String::from("owned"))), "owned");
        assert_eq!(
            panic_message(Box::new(42_u32)),
            "unknown error type on call api"
        );
    }

    #[tokio::test]
    async fn test_invoke_recovering_catches_panic() {
        let result = invoke_recovering("Panic", || panic!("panic as expected")).await;
        match result {
            Err(WirecallError::Panicked { endpoint, message }) => {
                assert_eq!(endpoint, "Panic");
                assert_eq!(message, "panic as expected");
            }
            other => panic!("Expected Panicked, got: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_invoke_recovering_passes_outcome_through() {
        let result = invoke_recovering("Add", || Ok(vec![json!(5), Value::Null])).await;
        assert_eq!(result.unwrap(), vec![json!(5), Value::Null]);
    }

    #[test]
    fn test_split_error_slot() {
        let outputs = split_error_slot("Add", vec![json!(5), Value::Null]).unwrap();
        assert_eq!(outputs, vec![json!(5)]);

        let err = split_error_slot("Add", vec![json!(5), json!("bad")]).unwrap_err();
        assert_eq!(err.to_string(), "bad");
        assert!(!err.is_transport());

        let err = split_error_slot("Add", vec![]).unwrap_err();
        assert!(err.is_transport());

        let err = split_error_slot("Add", vec![json!(1), json!({"code": 1})]).unwrap_err();
        assert!(err.is_transport());
    }
}
