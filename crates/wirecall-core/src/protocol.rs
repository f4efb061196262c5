//! Wire envelopes shared by the dispatcher and the client.
//!
//! One HTTP request per call:
//!
//! ```text
//! POST <base>/<endpoint>   {"args": {"<param>": <json>, ...}}
//! 200 | 599                {"status": "OK" | "error", "detail": "...", "result": [<json>, ...]}
//! ```

use crate::config::RpcConfig;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};

/// Accept an explicit `null` wherever an empty collection is expected.
fn null_as_default<'de, D, T>(deserializer: D) -> std::result::Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

/// Request body: named arguments keyed by the endpoint's parameter names.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RequestEnvelope {
    #[serde(default, deserialize_with = "null_as_default")]
    pub args: Map<String, Value>,
}

impl RequestEnvelope {
    pub fn new(args: Map<String, Value>) -> Self {
        Self { args }
    }
}

/// Outcome marker of a response envelope.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Status {
    #[serde(rename = "OK")]
    Ok,
    #[serde(rename = "error")]
    Error,
}

/// Response body.
///
/// `detail` is empty iff the status is OK and `result` is empty iff it is an
/// error; the constructors are the only way the server builds one.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResponseEnvelope {
    pub status: Status,
    #[serde(default, deserialize_with = "null_as_default")]
    pub detail: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub result: Vec<Value>,
}

impl ResponseEnvelope {
    /// Successful call. `result` holds every output followed by the null error slot.
    pub fn ok(result: Vec<Value>) -> Self {
        Self {
            status: Status::Ok,
            detail: String::new(),
            result,
        }
    }

    /// Failed call.
    pub fn error(detail: impl Into<String>) -> Self {
        Self {
            status: Status::Error,
            detail: detail.into(),
            result: Vec::new(),
        }
    }

    pub fn is_ok(&self) -> bool {
        self.status == Status::Ok
    }

    /// HTTP status code the dispatcher writes for this envelope.
    pub fn http_status(&self) -> u16 {
        match self.status {
            Status::Ok => RpcConfig::STATUS_OK_CODE,
            Status::Error => RpcConfig::STATUS_ERROR_CODE,
        }
    }
}

/// A single client invocation before it hits the wire.
#[derive(Debug, Clone, PartialEq)]
pub struct CallDescriptor {
    pub endpoint: String,
    pub args: Vec<Value>,
}

impl CallDescriptor {
    pub fn new(endpoint: impl Into<String>, args: Vec<Value>) -> Self {
        Self {
            endpoint: endpoint.into(),
            args,
        }
    }

    /// Pair positional values with parameter names.
    ///
    /// Callers check that both sides have the same length.
    pub fn into_request(self, param_names: &[String]) -> RequestEnvelope {
        let args = param_names.iter().cloned().zip(self.args).collect();
        RequestEnvelope::new(args)
    }
}

/// URL path of an endpoint under a normalized base path (`/` or `/prefix/`).
pub fn endpoint_path(base_path: &str, endpoint: &str) -> String {
    format!("{}{}", base_path, endpoint)
}
