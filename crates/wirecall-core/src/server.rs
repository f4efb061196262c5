//! HTTP dispatcher and server built on axum.
//!
//! Every request is handled in its own task. The handler decodes the request
//! envelope, looks the endpoint up in the [`Registry`], and invokes it on the
//! blocking pool so a panic or a slow endpoint only affects its own request.
//! Every per-request failure is reported through the response envelope; none
//! of them can take the listener down.

use crate::bridge::invoke_recovering;
use crate::builtin::Builtin;
use crate::config::{normalize_base_path, RpcConfig};
use crate::protocol::{RequestEnvelope, ResponseEnvelope};
use crate::registry::{EndpointDescriptor, Registry, Service};
use crate::{Result, WirecallError};
use axum::{
    body::Bytes,
    extract::{rejection::BytesRejection, DefaultBodyLimit, State},
    http::{header, StatusCode, Uri},
    response::{IntoResponse, Response},
    routing::any,
    Router,
};
use serde_json::Value;
use std::borrow::Cow;
use std::net::{AddrParseError, SocketAddr};
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::sync::oneshot;
use tower::ServiceBuilder;
use tower_http::trace::TraceLayer;
use tracing::{debug, error, info, warn};

/// State shared by every request of one router.
struct DispatchState {
    registry: Arc<Registry>,
    base_path: String,
}

impl DispatchState {
    /// Registry key for a request path: the base path and leading `/`
    /// stripped, then percent-decoded.
    fn endpoint_name<'a>(&self, path: &'a str) -> Cow<'a, str> {
        let raw = path
            .strip_prefix(self.base_path.as_str())
            .unwrap_or(path)
            .trim_start_matches('/');
        urlencoding::decode(raw).unwrap_or(Cow::Borrowed(raw))
    }
}

/// RPC server owning an endpoint registry.
///
/// Cloning is cheap and every clone shares the same registry.
#[derive(Clone)]
pub struct Server {
    registry: Arc<Registry>,
}

impl Server {
    /// Create a server with the built-in endpoints already registered.
    pub fn new() -> Result<Self> {
        let registry = Arc::new(Registry::new());
        registry.register(Builtin::new(&registry))?;
        Ok(Self { registry })
    }

    /// Register every operation of `receiver`.
    pub fn register<S: Service>(&self, receiver: S) -> Result<()> {
        self.registry.register(receiver)
    }

    pub fn registry(&self) -> &Arc<Registry> {
        &self.registry
    }

    /// Descriptors of every registered endpoint, ordered by name.
    pub fn list(&self) -> Vec<EndpointDescriptor> {
        self.registry.list()
    }

    /// Build the axum router serving every endpoint under `base_path`.
    pub fn router(&self, base_path: &str) -> Router {
        let base_path = normalize_base_path(base_path);
        let state = Arc::new(DispatchState {
            registry: Arc::clone(&self.registry),
            base_path: base_path.clone(),
        });

        Router::new()
            .route(&format!("{}*endpoint", base_path), any(handle_call))
            .fallback(handle_unrouted)
            .layer(
                ServiceBuilder::new()
                    .layer(TraceLayer::new_for_http())
                    .layer(DefaultBodyLimit::max(RpcConfig::MAX_BODY_SIZE)),
            )
            .with_state(state)
    }

    /// Serve on every interface at `port` until the listener terminates.
    pub async fn run(&self, base_path: &str, port: u16) -> Result<()> {
        self.serve("0.0.0.0", port, base_path).await
    }

    /// Serve on `host:port` until the listener terminates.
    pub async fn serve(&self, host: &str, port: u16, base_path: &str) -> Result<()> {
        let listener = listen(host, port).await?;
        info!("Server listening on {}", listener.local_addr()?);
        axum::serve(listener, self.router(base_path)).await?;
        Ok(())
    }

    /// Bind `host:port` and serve in the background.
    ///
    /// Returns a handle with the bound address (useful when `port` is 0).
    pub async fn bind(&self, host: &str, port: u16, base_path: &str) -> Result<ServerHandle> {
        let listener = listen(host, port).await?;
        let addr = listener.local_addr()?;
        let app = self.router(base_path);

        info!("Server listening on {}", addr);

        let (shutdown_tx, shutdown_rx) = oneshot::channel::<()>();
        let task_handle = tokio::spawn(async move {
            let shutdown = async {
                let _ = shutdown_rx.await;
            };
            if let Err(e) = axum::serve(listener, app)
                .with_graceful_shutdown(shutdown)
                .await
            {
                error!("Server error: {}", e);
            }
        });

        Ok(ServerHandle {
            addr,
            shutdown_tx: Some(shutdown_tx),
            task_handle: Some(task_handle),
        })
    }
}

async fn listen(host: &str, port: u16) -> Result<TcpListener> {
    let authority = format!("{}:{}", host, port);
    let addr: SocketAddr = authority
        .parse()
        .map_err(|e: AddrParseError| WirecallError::InvalidAddress {
            addr: authority.clone(),
            message: e.to_string(),
        })?;
    Ok(TcpListener::bind(addr).await?)
}

/// Handle to a server running in the background. Dropping shuts it down.
pub struct ServerHandle {
    addr: SocketAddr,
    shutdown_tx: Option<oneshot::Sender<()>>,
    task_handle: Option<tokio::task::JoinHandle<()>>,
}

impl ServerHandle {
    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    pub fn port(&self) -> u16 {
        self.addr.port()
    }

    /// `host:port` form accepted by [`crate::Client::new`].
    pub fn authority(&self) -> String {
        self.addr.to_string()
    }

    /// Stop accepting connections and let in-flight requests finish.
    pub fn shutdown(&mut self) {
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
        }
    }

    /// Shut down and wait for the serve task to finish.
    pub async fn stop(mut self) {
        self.shutdown();
        if let Some(handle) = self.task_handle.take() {
            let _ = handle.await;
        }
    }
}

impl Drop for ServerHandle {
    fn drop(&mut self) {
        self.shutdown();
        if let Some(handle) = self.task_handle.take() {
            handle.abort();
        }
    }
}

/// Decode, look up and invoke one call.
pub(crate) async fn dispatch(registry: &Registry, name: &str, body: &[u8]) -> Result<Vec<Value>> {
    let request: RequestEnvelope =
        serde_json::from_slice(body).map_err(|e| WirecallError::MalformedRequest {
            message: e.to_string(),
        })?;

    let endpoint = registry
        .lookup(name)
        .ok_or_else(|| WirecallError::UnknownEndpoint {
            endpoint: name.to_string(),
        })?;

    debug!("RPC call: {}({:?})", name, request.args);

    invoke_recovering(name, move || endpoint.invoke(request.args)).await
}

async fn handle_call(
    State(state): State<Arc<DispatchState>>,
    uri: Uri,
    body: std::result::Result<Bytes, BytesRejection>,
) -> Response {
    let name = state.endpoint_name(uri.path());
    let outcome = match body {
        Ok(body) => dispatch(&state.registry, &name, &body).await,
        Err(rejection) => Err(WirecallError::MalformedRequest {
            message: rejection.body_text(),
        }),
    };
    respond(&name, outcome)
}

async fn handle_unrouted(State(state): State<Arc<DispatchState>>, uri: Uri) -> Response {
    let name = state.endpoint_name(uri.path());
    respond(
        &name,
        Err(WirecallError::UnknownEndpoint {
            endpoint: name.to_string(),
        }),
    )
}

fn respond(name: &str, outcome: Result<Vec<Value>>) -> Response {
    let envelope = match outcome {
        Ok(result) => ResponseEnvelope::ok(result),
        Err(e) => {
            warn!("RPC error for {}: {}", name, e);
            ResponseEnvelope::error(e.to_string())
        }
    };
    encode_response(envelope)
}

/// Serialize an envelope and pick the HTTP status.
///
/// An OK envelope that fails to encode is replaced by an error envelope. An
/// error envelope is plain strings and must always encode; failing that is a
/// bug in this crate, not a request error.
fn encode_response(envelope: ResponseEnvelope) -> Response {
    let (envelope, body) = match serde_json::to_vec(&envelope) {
        Ok(body) => (envelope, body),
        Err(e) if envelope.is_ok() => {
            let fallback = ResponseEnvelope::error(format!("rpc server error: {}", e));
            let body = encode_error_envelope(&fallback);
            (fallback, body)
        }
        Err(e) => panic!("encoding an error envelope must not fail: {}", e),
    };

    let status =
        StatusCode::from_u16(envelope.http_status()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
    (status, [(header::CONTENT_TYPE, RpcConfig::CONTENT_TYPE)], body).into_response()
}

fn encode_error_envelope(envelope: &ResponseEnvelope) -> Vec<u8> {
    match serde_json::to_vec(envelope) {
        Ok(body) => body,
        Err(e) => panic!("encoding an error envelope must not fail: {}", e),
    }
}
