//! HTTP client and typed proxies.
//!
//! A [`Client`] knows one server. Stubs implementing [`Stub`] are bound with
//! [`Client::reg`], which hands out one [`Proxy`] per remote endpoint. A proxy
//! call encodes its arguments, posts them to `<base>/<endpoint>`, and decodes
//! the outputs positionally. Failures of any kind come back as the `Err` side
//! of the result; outputs are never partially filled.
//!
//! # Thread Safety
//!
//! `Client` is a cheap `Clone` around a shared `reqwest::Client`, so proxies
//! from the same client can be called concurrently from any task.

use crate::bridge::split_error_slot;
use crate::builtin::{Uptime, LIST_ENDPOINT, UPTIME_ENDPOINT};
use crate::codec::{Arguments, FromOutputs, ERROR_TYPE_NAME};
use crate::config::{normalize_base_path, ClientConfig, RpcConfig};
use crate::protocol::{endpoint_path, CallDescriptor, RequestEnvelope, ResponseEnvelope};
use crate::registry::EndpointDescriptor;
use crate::{Result, WirecallError};
use chrono::DateTime;
use serde_json::{Map, Value};
use std::collections::HashSet;
use std::marker::PhantomData;
use std::sync::{Arc, PoisonError, RwLock};
use std::time::Duration;
use tracing::debug;

struct ClientInner {
    http: reqwest::Client,
    /// `http://host:port`
    origin: String,
    /// Normalized `/` or `/prefix/`.
    base_path: String,
    config: ClientConfig,
    /// Descriptors of every proxy bound through `reg`, in binding order.
    bound: RwLock<Vec<EndpointDescriptor>>,
}

/// Client for one server.
#[derive(Clone)]
pub struct Client {
    inner: Arc<ClientInner>,
}

impl std::fmt::Debug for Client {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Client")
            .field("origin", &self.inner.origin)
            .field("base_path", &self.inner.base_path)
            .field("timeout", &self.inner.config.timeout)
            .finish_non_exhaustive()
    }
}

impl Client {
    /// Create a client for `addr` (`host:port` or a full `http://` URL).
    pub fn new(addr: &str) -> Result<Self> {
        Self::with_config(addr, ClientConfig::default())
    }

    pub fn with_config(addr: &str, config: ClientConfig) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(config.timeout)
            .user_agent(config.user_agent.as_str())
            .build()
            .map_err(|e| WirecallError::Config {
                message: format!("Failed to create HTTP client: {}", e),
            })?;

        let addr = addr.trim_end_matches('/');
        if addr.is_empty() {
            return Err(WirecallError::Config {
                message: "server address is empty".to_string(),
            });
        }
        let origin = if addr.starts_with("http://") || addr.starts_with("https://") {
            addr.to_string()
        } else {
            format!("http://{}", addr)
        };
        let base_path = normalize_base_path(&config.base_path);

        Ok(Self {
            inner: Arc::new(ClientInner {
                http,
                origin,
                base_path,
                config,
                bound: RwLock::new(Vec::new()),
            }),
        })
    }

    /// URL a call to `endpoint` is posted to.
    pub fn endpoint_url(&self, endpoint: &str) -> String {
        format!(
            "{}{}",
            self.inner.origin,
            endpoint_path(&self.inner.base_path, &urlencoding::encode(endpoint))
        )
    }

    pub fn timeout(&self) -> Duration {
        self.inner.config.timeout
    }

    /// Bind every proxy a stub declares.
    ///
    /// If any slot fails validation the error is returned and nothing from
    /// the stub is recorded.
    pub fn reg<S: Stub>(&self) -> Result<S> {
        let mut binder = Binder {
            client: self,
            bound: Vec::new(),
        };
        let stub = S::bind(&mut binder)?;

        let mut local = self
            .inner
            .bound
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        for descriptor in binder.bound {
            match local.iter_mut().find(|d| d.name == descriptor.name) {
                Some(existing) => *existing = descriptor,
                None => local.push(descriptor),
            }
        }
        Ok(stub)
    }

    /// Descriptors of every proxy bound on this client, in binding order.
    pub fn list(&self) -> Vec<EndpointDescriptor> {
        self.inner
            .bound
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Descriptors of every endpoint the server has registered.
    pub async fn remote_list(&self) -> Result<Vec<EndpointDescriptor>> {
        let proxy: Proxy<(), (Vec<EndpointDescriptor>,)> =
            Proxy::new(self.clone(), LIST_ENDPOINT, &[]);
        let (descriptors,) = proxy.call(()).await?;
        Ok(descriptors)
    }

    /// How long the server has been running.
    pub async fn uptime(&self) -> Result<Uptime> {
        let proxy: Proxy<(), (i64, u64)> = Proxy::new(self.clone(), UPTIME_ENDPOINT, &[]);
        let (started_at, elapsed) = proxy.call(()).await?;
        let started_at =
            DateTime::from_timestamp(started_at, 0).ok_or_else(|| WirecallError::ResponseDecode {
                endpoint: UPTIME_ENDPOINT.to_string(),
                message: format!("start time {} out of range", started_at),
            })?;
        Ok(Uptime {
            started_at,
            elapsed: Duration::from_secs(elapsed),
        })
    }

    /// Call `name` with positional arguments, without a pre-typed stub.
    ///
    /// Parameter names come from a locally bound proxy if there is one, and
    /// from the server's `Builtin.List` otherwise. Returns the outputs
    /// without the error slot.
    pub async fn call(&self, name: &str, args: Vec<Value>) -> Result<Vec<Value>> {
        let local = self.list().into_iter().find(|d| d.name == name);
        let descriptor = match local {
            Some(descriptor) => descriptor,
            None => self
                .remote_list()
                .await?
                .into_iter()
                .find(|d| d.name == name)
                .ok_or_else(|| WirecallError::UnknownEndpoint {
                    endpoint: name.to_string(),
                })?,
        };

        if descriptor.arg_names.len() != args.len() {
            return Err(WirecallError::ArgumentCount {
                endpoint: name.to_string(),
                expected: descriptor.arg_names.len(),
                actual: args.len(),
            });
        }

        let request = CallDescriptor::new(name, args).into_request(&descriptor.arg_names);
        self.invoke(name, &request).await
    }

    /// Call `name` with an explicit named-argument map.
    pub async fn call_named(&self, name: &str, args: Map<String, Value>) -> Result<Vec<Value>> {
        self.invoke(name, &RequestEnvelope::new(args)).await
    }

    /// Post a request and normalize the response to the outputs only.
    async fn invoke(&self, endpoint: &str, request: &RequestEnvelope) -> Result<Vec<Value>> {
        let envelope = self.post(endpoint, request).await?;
        if !envelope.is_ok() {
            return Err(WirecallError::Remote {
                endpoint: endpoint.to_string(),
                detail: envelope.detail,
            });
        }
        split_error_slot(endpoint, envelope.result)
    }

    async fn post(&self, endpoint: &str, request: &RequestEnvelope) -> Result<ResponseEnvelope> {
        let timeout = self.inner.config.timeout;
        let url = self.endpoint_url(endpoint);
        debug!("RPC call: POST {}", url);

        let response = self
            .inner
            .http
            .post(&url)
            .json(request)
            .send()
            .await
            .map_err(|e| WirecallError::from_reqwest(endpoint, timeout, e))?;

        let status = response.status().as_u16();
        if status != RpcConfig::STATUS_OK_CODE && status != RpcConfig::STATUS_ERROR_CODE {
            return Err(WirecallError::Transport {
                endpoint: endpoint.to_string(),
                message: format!("unexpected HTTP status {}", status),
            });
        }

        let body = response
            .bytes()
            .await
            .map_err(|e| WirecallError::from_reqwest(endpoint, timeout, e))?;

        serde_json::from_slice(&body).map_err(|e| WirecallError::ResponseDecode {
            endpoint: endpoint.to_string(),
            message: format!("Failed to parse response envelope: {}", e),
        })
    }
}

/// Typed local stand-in for one remote endpoint.
///
/// `A` is the argument tuple and `O` the output tuple; the error slot is the
/// `Err` side of [`Proxy::call`].
pub struct Proxy<A, O> {
    client: Client,
    name: Arc<str>,
    params: Arc<[String]>,
    _marker: PhantomData<fn(A) -> O>,
}

impl<A, O> Clone for Proxy<A, O> {
    fn clone(&self) -> Self {
        Self {
            client: self.client.clone(),
            name: Arc::clone(&self.name),
            params: Arc::clone(&self.params),
            _marker: PhantomData,
        }
    }
}

impl<A, O> std::fmt::Debug for Proxy<A, O> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Proxy")
            .field("name", &self.name)
            .field("params", &self.params)
            .finish()
    }
}

impl<A: Arguments, O: FromOutputs> Proxy<A, O> {
    fn new(client: Client, name: &str, params: &[&str]) -> Self {
        Self {
            client,
            name: Arc::from(name),
            params: params.iter().map(|p| p.to_string()).collect(),
            _marker: PhantomData,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn param_names(&self) -> &[String] {
        &self.params
    }

    /// Perform the remote call.
    pub async fn call(&self, args: A) -> Result<O> {
        let values = args.encode().map_err(|slot| WirecallError::ArgumentEncode {
            endpoint: self.name.to_string(),
            index: slot.index,
            message: slot.message,
        })?;

        let request = CallDescriptor::new(self.name.as_ref(), values).into_request(&self.params);
        let outputs = self.client.invoke(&self.name, &request).await?;

        O::decode(outputs).map_err(|slot| WirecallError::ResponseDecode {
            endpoint: self.name.to_string(),
            message: format!("result {}: {}", slot.index, slot.message),
        })
    }
}

/// A set of proxies bound together, usually a struct with one field per
/// remote endpoint.
pub trait Stub: Sized {
    fn bind(binder: &mut Binder<'_>) -> Result<Self>;
}

/// Hands out validated proxies while a [`Stub`] is bound.
pub struct Binder<'a> {
    client: &'a Client,
    bound: Vec<EndpointDescriptor>,
}

impl Binder<'_> {
    /// Create the proxy for `name` whose parameters are named `params`.
    ///
    /// `O` is the tuple of outputs in front of the error slot; the error slot
    /// itself is the `Err` side of [`Proxy::call`].
    ///
    /// ```
    /// use wirecall::{Binder, Client, Proxy, Stub};
    ///
    /// struct CounterStub {
    ///     get: Proxy<(), (i64,)>,
    /// }
    ///
    /// impl Stub for CounterStub {
    ///     fn bind(binder: &mut Binder<'_>) -> wirecall::Result<Self> {
    ///         Ok(Self {
    ///             get: binder.proxy("Get", &[])?,
    ///         })
    ///     }
    /// }
    ///
    /// let client = Client::new("127.0.0.1:8080").unwrap();
    /// let stub: CounterStub = client.reg().unwrap();
    /// assert_eq!(stub.get.name(), "Get");
    /// ```
    ///
    /// A slot whose outputs are not an output tuple does not bind:
    ///
    /// ```compile_fail
    /// use wirecall::{Binder, Proxy, Stub};
    ///
    /// struct CounterStub {
    ///     get: Proxy<(), i64>,
    /// }
    ///
    /// impl Stub for CounterStub {
    ///     fn bind(binder: &mut Binder<'_>) -> wirecall::Result<Self> {
    ///         Ok(Self {
    ///             get: binder.proxy("Get", &[])?,
    ///         })
    ///     }
    /// }
    /// ```
    ///
    /// Nor does one whose outputs cannot be decoded:
    ///
    /// ```compile_fail
    /// use wirecall::{Binder, Proxy, Stub};
    ///
    /// struct Opaque;
    ///
    /// struct CounterStub {
    ///     get: Proxy<(), (Opaque,)>,
    /// }
    ///
    /// impl Stub for CounterStub {
    ///     fn bind(binder: &mut Binder<'_>) -> wirecall::Result<Self> {
    ///         Ok(Self {
    ///             get: binder.proxy("Get", &[])?,
    ///         })
    ///     }
    /// }
    /// ```
    pub fn proxy<A, O>(&mut self, name: &str, params: &[&str]) -> Result<Proxy<A, O>>
    where
        A: Arguments,
        O: FromOutputs,
    {
        let binding_error = |message: String| WirecallError::Binding {
            endpoint: name.to_string(),
            message,
        };

        if name.trim().is_empty() || name.contains('/') {
            return Err(binding_error(
                "endpoint name must be non-empty and must not contain '/'".to_string(),
            ));
        }
        if params.len() != A::COUNT {
            return Err(binding_error(format!(
                "{} parameter names declared for {} arguments",
                params.len(),
                A::COUNT
            )));
        }
        let mut unique = HashSet::new();
        if let Some(repeated) = params.iter().find(|p| !unique.insert(**p)) {
            return Err(binding_error(format!("parameter {} declared twice", repeated)));
        }
        if self.bound.iter().any(|d| d.name == name) {
            return Err(binding_error("bound twice in the same stub".to_string()));
        }

        let mut return_types = O::type_names();
        return_types.push(ERROR_TYPE_NAME.to_string());
        self.bound.push(EndpointDescriptor {
            name: name.to_string(),
            arg_names: params.iter().map(|p| p.to_string()).collect(),
            arg_types: A::type_names(),
            return_types,
        });

        Ok(Proxy::new(self.client.clone(), name, params))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct CalcStub {
        add: Proxy<(i64, i64), (i64,)>,
        fail: Proxy<(), ()>,
    }

    impl Stub for CalcStub {
        fn bind(binder: &mut Binder<'_>) -> Result<Self> {
            Ok(Self {
                add: binder.proxy("Add", &["a", "b"])?,
                fail: binder.proxy("Fail", &[])?,
            })
        }
    }

    #[derive(Debug)]
    struct BadStub {
        _add: Proxy<(i64, i64), (i64,)>,
    }

    impl Stub for BadStub {
        fn bind(binder: &mut Binder<'_>) -> Result<Self> {
            Ok(Self {
                _add: binder.proxy("Add", &["a"])?,
            })
        }
    }

    #[test]
    fn test_endpoint_url() {
        let client = Client::new("127.0.0.1:8080").unwrap();
        assert_eq!(client.endpoint_url("Add"), "http://127.0.0.1:8080/Add");
        assert_eq!(
            client.endpoint_url("Builtin.List"),
            "http://127.0.0.1:8080/Builtin.List"
        );
        assert_eq!(client.endpoint_url("Say Hi"), "http://127.0.0.1:8080/Say%20Hi");

        let config = ClientConfig::default().with_base_path("/rpc");
        let client = Client::with_config("http://localhost:9000/", config).unwrap();
        assert_eq!(client.endpoint_url("Add"), "http://localhost:9000/rpc/Add");
    }

    #[test]
    fn test_empty_address_rejected() {
        assert!(matches!(
            Client::new(""),
            Err(WirecallError::Config { .. })
        ));
    }

    #[test]
    fn test_reg_records_descriptors() {
        let client = Client::new("127.0.0.1:8080").unwrap();
        let stub: CalcStub = client.reg().unwrap();
        assert_eq!(stub.add.name(), "Add");
        assert_eq!(stub.fail.param_names().len(), 0);

        let listed = client.list();
        assert_eq!(listed.len(), 2);
        assert_eq!(listed[0].to_string(), "Add(i64 a, i64 b) => (i64, error)");
        assert_eq!(listed[1].return_types, vec!["error".to_string()]);
        assert_eq!(client.list(), listed);
    }

    #[test]
    fn test_reg_binding_error_installs_nothing() {
        let client = Client::new("127.0.0.1:8080").unwrap();
        let err = client.reg::<BadStub>().unwrap_err();
        assert!(matches!(err, WirecallError::Binding { ref endpoint, .. } if endpoint == "Add"));
        assert!(client.list().is_empty());
    }

    #[test]
    fn test_reg_twice_replaces_descriptors() {
        let client = Client::new("127.0.0.1:8080").unwrap();
        let _first: CalcStub = client.reg().unwrap();
        let _second: CalcStub = client.reg().unwrap();
        assert_eq!(client.list().len(), 2);
    }

    #[tokio::test]
    async fn test_call_against_dead_server_is_transport_error() {
        let config = ClientConfig::default().with_timeout(Duration::from_secs(2));
        let client = Client::with_config("127.0.0.1:1", config).unwrap();
        let stub: CalcStub = client.reg().unwrap();

        let err = stub.add.call((1, 2)).await.unwrap_err();
        assert!(err.is_transport());
    }

    #[tokio::test]
    async fn test_adhoc_call_checks_argument_count_locally() {
        let client = Client::new("127.0.0.1:1").unwrap();
        let _stub: CalcStub = client.reg().unwrap();

        let err = client
            .call("Add", vec![serde_json::json!(1)])
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            WirecallError::ArgumentCount { expected: 2, actual: 1, .. }
        ));
    }
}
