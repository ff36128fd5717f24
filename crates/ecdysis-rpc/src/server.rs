// crates/ecdysis-rpc/src/server.rs
//
// RPC server setup: EcdysisRpcServer and RpcConfig.
//
// A single tonic service accepts JSON-encoded requests carrying a method
// name, dispatches to the matching handler, and returns a JSON-encoded
// response envelope. No proto codegen is involved; tonic provides the
// transport (HTTP/1 and HTTP/2) and the interceptor stack.

use std::sync::Arc;
use std::time::Instant;

use http_body::Body as HttpBody;
use http_body_util::BodyExt;
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;
use tonic::transport::Server;
use tonic::Status;

use ecdysis_core::traits::UpgradeBackend;

use crate::handlers;
use crate::handlers::node::NodeStatus;
use crate::middleware;

// ---------------------------------------------------------------------------
// RpcConfig
// ---------------------------------------------------------------------------

/// Configuration for the RPC server.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RpcConfig {
    /// Host to bind to (e.g., "127.0.0.1" or "0.0.0.0").
    pub host: String,
    /// Port to listen on.
    pub port: u16,
}

impl Default for RpcConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 50052,
        }
    }
}

// ---------------------------------------------------------------------------
// JSON-RPC Envelope
// ---------------------------------------------------------------------------

/// A JSON-RPC-style request envelope.
/// The client sends a method name and a JSON params payload.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JsonRpcRequest {
    /// The RPC method to invoke (e.g., "upgrade/submit", "node/info").
    pub method: String,
    /// JSON-encoded parameters for the method.
    pub params: serde_json::Value,
}

/// A JSON-RPC-style response envelope.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JsonRpcResponse {
    /// Whether the request succeeded.
    pub success: bool,
    /// The result data (if success).
    pub result: Option<serde_json::Value>,
    /// Error message (if not success).
    pub error: Option<String>,
}

// ---------------------------------------------------------------------------
// EcdysisRpcServer
// ---------------------------------------------------------------------------

/// The operator control server for a node's upgrade subsystem.
#[derive(Clone)]
pub struct EcdysisRpcServer {
    config: RpcConfig,
    backend: Arc<dyn UpgradeBackend>,
    /// Live status published by the block driver.
    status: Option<Arc<RwLock<NodeStatus>>>,
    /// Migration handler names compiled into this binary.
    handler_names: Vec<String>,
    /// Version string of the running binary.
    version: String,
    start_time: Option<Instant>,
}

impl std::fmt::Debug for EcdysisRpcServer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EcdysisRpcServer")
            .field("config", &self.config)
            .field("version", &self.version)
            .finish()
    }
}

impl EcdysisRpcServer {
    /// Create a new server over the given upgrade backend.
    pub fn new(config: RpcConfig, backend: Arc<dyn UpgradeBackend>) -> Self {
        Self {
            config,
            backend,
            status: None,
            handler_names: Vec::new(),
            version: env!("CARGO_PKG_VERSION").to_string(),
            start_time: None,
        }
    }

    /// Set the shared node status for info and health queries.
    pub fn with_status(mut self, status: Arc<RwLock<NodeStatus>>) -> Self {
        self.status = Some(status);
        self
    }

    /// Set the names of the migration handlers this binary can run.
    pub fn with_handler_names(mut self, names: Vec<String>) -> Self {
        self.handler_names = names;
        self
    }

    /// Set the reported software version.
    pub fn with_version(mut self, version: impl Into<String>) -> Self {
        self.version = version.into();
        self
    }

    /// Set the daemon start time for uptime calculation.
    pub fn with_start_time(mut self, st: Instant) -> Self {
        self.start_time = Some(st);
        self
    }

    /// Start the RPC server and serve requests until the task is dropped.
    pub async fn start(&self) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        let addr = format!("{}:{}", self.config.host, self.config.port).parse()?;

        tracing::info!("Ecdysis RPC server starting on {}", addr);

        Server::builder()
            .accept_http1(true)
            .add_service(tonic::service::interceptor::InterceptedService::new(
                EcdysisJsonRpcServer::new(self.service()),
                middleware::logging_interceptor,
            ))
            .serve(addr)
            .await?;

        Ok(())
    }

    fn service(&self) -> EcdysisServiceImpl {
        EcdysisServiceImpl {
            backend: self.backend.clone(),
            status: self.status.clone(),
            handler_names: self.handler_names.clone(),
            version: self.version.clone(),
            start_time: self.start_time,
        }
    }
}

// ---------------------------------------------------------------------------
// Dispatch
// ---------------------------------------------------------------------------

/// Shared state behind the tonic service; dispatches JSON-RPC calls.
#[derive(Clone)]
struct EcdysisServiceImpl {
    backend: Arc<dyn UpgradeBackend>,
    status: Option<Arc<RwLock<NodeStatus>>>,
    handler_names: Vec<String>,
    version: String,
    start_time: Option<Instant>,
}

impl EcdysisServiceImpl {
    async fn current_status(&self) -> NodeStatus {
        match &self.status {
            Some(status) => status.read().await.clone(),
            None => NodeStatus::default(),
        }
    }

    /// Dispatch a JSON-RPC request to the appropriate handler based on the method name.
    async fn dispatch(&self, request: JsonRpcRequest) -> JsonRpcResponse {
        let result = match request.method.as_str() {
            // Upgrade control
            "upgrade/submit" => {
                dispatch_handler(request.params, |r| {
                    let backend = self.backend.clone();
                    async move { handlers::upgrade::handle_submit_descriptor(backend.as_ref(), r).await }
                })
                .await
            }
            "upgrade/pending" => {
                dispatch_handler(request.params, |r| {
                    let backend = self.backend.clone();
                    async move { handlers::upgrade::handle_pending_upgrades(backend.as_ref(), r).await }
                })
                .await
            }
            "upgrade/cancel" => {
                dispatch_handler(request.params, |r| {
                    let backend = self.backend.clone();
                    async move { handlers::upgrade::handle_cancel_upgrade(backend.as_ref(), r).await }
                })
                .await
            }

            // Node status
            "node/info" => {
                let status = self.current_status().await;
                let uptime = self
                    .start_time
                    .map(|st| st.elapsed().as_secs())
                    .unwrap_or(0);
                let version = self.version.clone();
                let names = self.handler_names.clone();
                dispatch_handler(request.params, |r| async move {
                    handlers::node::handle_get_node_info(r, version, uptime, status, names).await
                })
                .await
            }
            "node/health" => {
                let status = self.current_status().await;
                let pending = self.backend.pending_upgrades().len();
                dispatch_handler(request.params, |r| async move {
                    handlers::node::handle_get_health(r, status, pending).await
                })
                .await
            }

            unknown => Err(format!("Unknown RPC method: {}", unknown)),
        };

        match result {
            Ok(value) => JsonRpcResponse {
                success: true,
                result: Some(value),
                error: None,
            },
            Err(e) => {
                tracing::warn!(method = %request.method, error = %e, "RPC request failed");
                JsonRpcResponse {
                    success: false,
                    result: None,
                    error: Some(e),
                }
            }
        }
    }
}

/// Deserialize params, run the handler, and serialize its response.
async fn dispatch_handler<Req, Resp, F, Fut>(
    params: serde_json::Value,
    handler: F,
) -> Result<serde_json::Value, String>
where
    Req: serde::de::DeserializeOwned,
    Resp: serde::Serialize,
    F: FnOnce(Req) -> Fut,
    Fut: std::future::Future<Output = Result<Resp, String>>,
{
    // Parameterless methods accept a missing params field.
    let params = if params.is_null() {
        serde_json::Value::Object(serde_json::Map::new())
    } else {
        params
    };
    let request: Req = serde_json::from_value(params)
        .map_err(|e| format!("Failed to deserialize request: {}", e))?;
    let response = handler(request).await?;
    serde_json::to_value(response).map_err(|e| format!("Failed to serialize response: {}", e))
}

// ---------------------------------------------------------------------------
// Tonic Service Wiring
// ---------------------------------------------------------------------------
// One service, one method. Request and response bodies are the JSON-encoded
// JsonRpcRequest/JsonRpcResponse envelopes.

/// The tonic service wrapper around the dispatcher.
#[derive(Clone)]
pub struct EcdysisJsonRpcServer {
    inner: EcdysisServiceImpl,
}

impl std::fmt::Debug for EcdysisJsonRpcServer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EcdysisJsonRpcServer").finish()
    }
}

impl EcdysisJsonRpcServer {
    fn new(inner: EcdysisServiceImpl) -> Self {
        Self { inner }
    }
}

impl tonic::server::NamedService for EcdysisJsonRpcServer {
    const NAME: &'static str = "ecdysis.rpc.UpgradeControl";
}

impl<B> tower_service::Service<http::Request<B>> for EcdysisJsonRpcServer
where
    B: HttpBody + Send + 'static,
    B::Error: Into<Box<dyn std::error::Error + Send + Sync>> + Send,
    B::Data: Send,
{
    type Response = http::Response<tonic::body::BoxBody>;
    type Error = std::convert::Infallible;
    type Future = std::pin::Pin<
        Box<dyn std::future::Future<Output = Result<Self::Response, Self::Error>> + Send>,
    >;

    fn poll_ready(
        &mut self,
        _cx: &mut std::task::Context<'_>,
    ) -> std::task::Poll<Result<(), Self::Error>> {
        std::task::Poll::Ready(Ok(()))
    }

    fn call(&mut self, req: http::Request<B>) -> Self::Future {
        let inner = self.inner.clone();

        Box::pin(async move {
            let body_bytes = match collect_body(req.into_body()).await {
                Ok(b) => b,
                Err(e) => {
                    tracing::error!("Failed to read request body: {}", e);
                    return Ok(error_response(format!("Failed to read request body: {}", e)));
                }
            };

            let rpc_request: JsonRpcRequest = match serde_json::from_slice(&body_bytes) {
                Ok(r) => r,
                Err(e) => return Ok(error_response(format!("Invalid JSON-RPC request: {}", e))),
            };

            let rpc_response = inner.dispatch(rpc_request).await;
            let json = serde_json::to_vec(&rpc_response).unwrap_or_default();
            Ok(build_response(json))
        })
    }
}

/// Collect the body of an HTTP request into bytes.
async fn collect_body<B>(body: B) -> Result<Vec<u8>, String>
where
    B: HttpBody + Send,
    B::Error: Into<Box<dyn std::error::Error + Send + Sync>>,
    B::Data: Send,
{
    let mut collected = Vec::new();
    let mut body = std::pin::pin!(body);

    loop {
        match std::future::poll_fn(|cx| HttpBody::poll_frame(body.as_mut(), cx)).await {
            Some(Ok(frame)) => {
                if let Ok(data) = frame.into_data() {
                    use bytes::Buf;
                    collected.extend_from_slice(data.chunk());
                }
            }
            Some(Err(e)) => return Err(e.into().to_string()),
            None => break,
        }
    }

    Ok(collected)
}

fn error_response(message: String) -> http::Response<tonic::body::BoxBody> {
    let resp = JsonRpcResponse {
        success: false,
        result: None,
        error: Some(message),
    };
    build_response(serde_json::to_vec(&resp).unwrap_or_default())
}

/// Build an HTTP 200 response with the given JSON body.
fn build_response(json: Vec<u8>) -> http::Response<tonic::body::BoxBody> {
    let body = tonic::body::BoxBody::new(
        http_body_util::Full::new(bytes::Bytes::from(json))
            .map_err(|e| Status::internal(format!("body error: {}", e))),
    );

    let mut response = http::Response::new(body);
    response.headers_mut().insert(
        http::header::CONTENT_TYPE,
        http::HeaderValue::from_static("application/json"),
    );
    response
}
