// crates/moodle-gate-mcp/src/server.rs
// ============================================================================
// Module: MCP Server
// Description: Session-oriented JSON-RPC transport over HTTP.
// Purpose: Bind MCP sessions to tenants and route calls into the dispatcher.
// Dependencies: axum, moodle-gate-client, moodle-gate-config, moodle-gate-core
// ============================================================================

//! ## Overview
//! The server speaks the MCP subset the gateway needs: `initialize` performs
//! the credential exchange and binds a fresh session, `tools/list` and
//! `tools/call` route through the dispatcher under the session's tenant,
//! `ping` answers liveness, and notifications are acknowledged without a
//! body. The MCP key travels in the URL path; the session identifier in the
//! `Mcp-Session-Id` header. DELETE closes a session explicitly; the sweep
//! reclaims abandoned ones.
//! Security posture: every inbound value is untrusted until it has passed
//! resolution, role gating, and schema validation.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::net::SocketAddr;
use std::sync::Arc;

use axum::Router;
use axum::body::Bytes;
use axum::extract::DefaultBodyLimit;
use axum::extract::Path;
use axum::extract::State;
use axum::http::HeaderMap;
use axum::http::StatusCode;
use axum::http::header::HeaderName;
use axum::response::IntoResponse;
use axum::response::Response;
use axum::routing::get;
use axum::routing::post;
use moodle_gate_client::MoodleClient;
use moodle_gate_client::MoodleClientOptions;
use moodle_gate_client::PanelResolver;
use moodle_gate_config::GatewayConfig;
use moodle_gate_core::GatewayError;
use moodle_gate_core::ToolDescriptor;
use moodle_gate_core::ToolRegistry;
use serde::Deserialize;
use serde::Serialize;
use serde_json::Value;
use serde_json::json;
use thiserror::Error;
use uuid::Uuid;

use crate::audit::GatewayAuditEvent;
use crate::audit::GatewayAuditSink;
use crate::audit::StderrAuditSink;
use crate::catalog::builtin_tools;
use crate::router::Dispatcher;
use crate::sessions::NoopTransport;
use crate::sessions::SessionManager;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Header carrying the session identifier.
const MCP_SESSION_HEADER: &str = "mcp-session-id";
/// Protocol revision answered during `initialize`.
const PROTOCOL_VERSION: &str = "2024-11-05";

// ============================================================================
// SECTION: Server Errors
// ============================================================================

/// Fatal server construction or serving failures.
#[derive(Debug, Error)]
pub enum McpServerError {
    /// Invalid configuration value.
    #[error("server config error: {0}")]
    Config(String),
    /// Startup failure, such as a malformed catalogue schema.
    #[error("server startup error: {0}")]
    Startup(String),
    /// Transport-level failure while serving.
    #[error("server transport error: {0}")]
    Transport(String),
}

// ============================================================================
// SECTION: Server
// ============================================================================

/// MCP gateway server bound to one configuration.
pub struct GatewayServer {
    /// Loaded configuration.
    config: GatewayConfig,
    /// Shared handler state.
    state: Arc<ServerState>,
}

/// Shared state for the HTTP handlers.
pub struct ServerState {
    /// Dispatch pipeline.
    dispatcher: Dispatcher,
    /// Control-plane resolver.
    resolver: PanelResolver,
    /// Session store.
    sessions: Arc<SessionManager>,
    /// Audit sink for session lifecycle events.
    audit: Arc<dyn GatewayAuditSink>,
}

impl GatewayServer {
    /// Builds a server from configuration with the stderr audit sink.
    ///
    /// # Errors
    ///
    /// Returns [`McpServerError`] when the catalogue, clients, or config are
    /// unusable.
    pub fn new(config: GatewayConfig) -> Result<Self, McpServerError> {
        Self::with_audit(config, Arc::new(StderrAuditSink))
    }

    /// Builds a server with an explicit audit sink.
    ///
    /// # Errors
    ///
    /// Returns [`McpServerError`] when the catalogue, clients, or config are
    /// unusable.
    pub fn with_audit(
        config: GatewayConfig,
        audit: Arc<dyn GatewayAuditSink>,
    ) -> Result<Self, McpServerError> {
        let registry = ToolRegistry::register(builtin_tools())
            .map_err(|err| McpServerError::Startup(err.to_string()))?;
        let client = MoodleClient::new(MoodleClientOptions {
            timeout_ms: config.moodle.timeout_ms,
            allow_http: config.moodle.allow_http,
            user_agent: config.moodle.user_agent.clone(),
        })
        .map_err(|err| McpServerError::Startup(err.to_string()))?;
        let dispatcher = Dispatcher::new(Arc::new(registry), client, Arc::clone(&audit))
            .map_err(|err| McpServerError::Startup(err.to_string()))?;
        let resolver = PanelResolver::new(config.panel.endpoint.clone(), config.panel.timeout_ms)
            .map_err(|err| McpServerError::Startup(err.to_string()))?;
        let sessions = Arc::new(SessionManager::new(
            config.sessions.ttl_ms,
            config.sessions.sweep_interval_ms,
        ));
        Ok(Self {
            config,
            state: Arc::new(ServerState {
                dispatcher,
                resolver,
                sessions,
                audit,
            }),
        })
    }

    /// Serves the gateway until the listener fails.
    ///
    /// # Errors
    ///
    /// Returns [`McpServerError`] when binding or serving fails.
    pub async fn serve(self) -> Result<(), McpServerError> {
        let addr: SocketAddr = self
            .config
            .server
            .bind_addr()
            .map_err(|err| McpServerError::Config(err.to_string()))?;
        self.state.sessions.start();
        let app = router(Arc::clone(&self.state), self.config.server.max_body_bytes);
        let listener = tokio::net::TcpListener::bind(addr)
            .await
            .map_err(|_| McpServerError::Transport("http bind failed".to_string()))?;
        let served = axum::serve(listener, app)
            .await
            .map_err(|_| McpServerError::Transport("http server failed".to_string()));
        self.state.sessions.stop();
        served
    }
}

/// Builds the axum router over shared state.
fn router(state: Arc<ServerState>, max_body_bytes: usize) -> Router {
    Router::new()
        .route("/mcp/{mcp_key}", post(handle_post).delete(handle_delete))
        .route("/health", get(handle_health))
        .layer(DefaultBodyLimit::max(max_body_bytes))
        .with_state(state)
}

// ============================================================================
// SECTION: JSON-RPC Envelope
// ============================================================================

/// Incoming JSON-RPC request payload.
#[derive(Debug, Deserialize)]
struct JsonRpcRequest {
    /// JSON-RPC protocol version.
    jsonrpc: String,
    /// Request identifier; absent for notifications.
    #[serde(default)]
    id: Option<Value>,
    /// Method name.
    method: String,
    /// Method parameters.
    #[serde(default)]
    params: Option<Value>,
}

/// Outgoing JSON-RPC response payload.
#[derive(Debug, Serialize)]
struct JsonRpcResponse {
    /// JSON-RPC protocol version.
    jsonrpc: &'static str,
    /// Request identifier echoed back.
    id: Value,
    /// Successful result payload.
    #[serde(skip_serializing_if = "Option::is_none")]
    result: Option<Value>,
    /// Error payload.
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<JsonRpcError>,
}

/// JSON-RPC error object.
#[derive(Debug, Serialize)]
struct JsonRpcError {
    /// Error code.
    code: i64,
    /// Error message.
    message: String,
    /// Structured error detail, such as a validation payload.
    #[serde(skip_serializing_if = "Option::is_none")]
    data: Option<Value>,
}

/// Parameters for `tools/call`.
#[derive(Debug, Deserialize)]
struct ToolCallParams {
    /// Tool name.
    name: String,
    /// Tool arguments.
    #[serde(default)]
    arguments: Option<Value>,
}

/// Result payload for `tools/list`.
#[derive(Debug, Serialize)]
struct ToolListResult {
    /// Tools visible to the session's tenant.
    tools: Vec<ToolDescriptor>,
}

/// One processed request, ready to render as HTTP.
struct RpcOutcome {
    /// HTTP status.
    status: StatusCode,
    /// Response body; absent for acknowledged notifications.
    body: Option<JsonRpcResponse>,
    /// Session identifier assigned by `initialize`.
    assigned_session: Option<String>,
}

// ============================================================================
// SECTION: HTTP Handlers
// ============================================================================

/// Handles JSON-RPC POSTs on the session endpoint.
async fn handle_post(
    State(state): State<Arc<ServerState>>,
    Path(mcp_key): Path<String>,
    headers: HeaderMap,
    bytes: Bytes,
) -> Response {
    let session_header = header_value(&headers, MCP_SESSION_HEADER);
    let outcome = process_request(&state, &mcp_key, session_header.as_deref(), &bytes).await;
    render(outcome)
}

/// Handles explicit session shutdown.
async fn handle_delete(
    State(state): State<Arc<ServerState>>,
    Path(_mcp_key): Path<String>,
    headers: HeaderMap,
) -> Response {
    let Some(session_id) = header_value(&headers, MCP_SESSION_HEADER) else {
        return StatusCode::BAD_REQUEST.into_response();
    };
    state.sessions.evict(&session_id);
    state.audit.record(&GatewayAuditEvent::allowed("session/delete", Some(&session_id)));
    StatusCode::NO_CONTENT.into_response()
}

/// Liveness probe.
async fn handle_health() -> Response {
    (StatusCode::OK, axum::Json(json!({"status": "ok"}))).into_response()
}

/// Reads one header as a string.
fn header_value(headers: &HeaderMap, name: &str) -> Option<String> {
    let name = HeaderName::from_bytes(name.as_bytes()).ok()?;
    headers.get(&name).and_then(|value| value.to_str().ok()).map(ToString::to_string)
}

/// Renders a processed outcome as an HTTP response.
fn render(outcome: RpcOutcome) -> Response {
    let mut response = match outcome.body {
        Some(body) => (outcome.status, axum::Json(body)).into_response(),
        None => outcome.status.into_response(),
    };
    if let Some(session_id) = outcome.assigned_session {
        if let Ok(value) = session_id.parse() {
            response.headers_mut().insert(HeaderName::from_static(MCP_SESSION_HEADER), value);
        }
    }
    response
}

// ============================================================================
// SECTION: Request Processing
// ============================================================================

/// Parses and dispatches one JSON-RPC request.
async fn process_request(
    state: &ServerState,
    mcp_key: &str,
    session_header: Option<&str>,
    bytes: &[u8],
) -> RpcOutcome {
    let Ok(request) = serde_json::from_slice::<JsonRpcRequest>(bytes) else {
        return rpc_failure(Value::Null, StatusCode::BAD_REQUEST, -32700, "parse error", None);
    };
    if request.jsonrpc != "2.0" {
        return rpc_failure(
            request.id.unwrap_or(Value::Null),
            StatusCode::BAD_REQUEST,
            -32600,
            "invalid json-rpc version",
            None,
        );
    }
    // Notifications are acknowledged without a body.
    let Some(id) = request.id else {
        return RpcOutcome {
            status: StatusCode::ACCEPTED,
            body: None,
            assigned_session: None,
        };
    };

    match request.method.as_str() {
        "initialize" => initialize(state, mcp_key, id).await,
        "ping" => rpc_success(id, json!({}), None),
        "tools/list" => match bound_tenant(state, session_header, &id) {
            Ok(tenant) => {
                let tools = state.dispatcher.list_tools(&tenant);
                match serde_json::to_value(ToolListResult {
                    tools,
                }) {
                    Ok(value) => rpc_success(id, value, None),
                    Err(_) => serialization_failure(id),
                }
            }
            Err(outcome) => outcome,
        },
        "tools/call" => match bound_tenant(state, session_header, &id) {
            Ok(tenant) => {
                let params = request.params.unwrap_or(Value::Null);
                let Ok(call) = serde_json::from_value::<ToolCallParams>(params) else {
                    return rpc_failure(
                        id,
                        StatusCode::BAD_REQUEST,
                        -32602,
                        "invalid tool params",
                        None,
                    );
                };
                let arguments = call.arguments.unwrap_or_else(|| json!({}));
                match state
                    .dispatcher
                    .call_tool(&tenant, session_header, &call.name, &arguments, None)
                    .await
                {
                    Ok(result) => rpc_success(
                        id,
                        json!({"content": [{"type": "json", "json": result}]}),
                        None,
                    ),
                    Err(err) => gateway_failure(id, &err),
                }
            }
            Err(outcome) => outcome,
        },
        _ => rpc_failure(id, StatusCode::BAD_REQUEST, -32601, "method not found", None),
    }
}

/// Performs the credential exchange and binds a fresh session.
async fn initialize(state: &ServerState, mcp_key: &str, id: Value) -> RpcOutcome {
    match state.resolver.resolve(mcp_key).await {
        Ok(tenant) => {
            let session_id = Uuid::new_v4().to_string();
            state.sessions.insert(session_id.clone(), Arc::new(tenant), Arc::new(NoopTransport));
            state.audit.record(&GatewayAuditEvent::allowed("session/create", Some(&session_id)));
            rpc_success(
                id,
                json!({
                    "protocolVersion": PROTOCOL_VERSION,
                    "capabilities": {"tools": {}},
                    "serverInfo": {
                        "name": "moodle-gate",
                        "version": env!("CARGO_PKG_VERSION"),
                    },
                }),
                Some(session_id),
            )
        }
        Err(err) => {
            state.audit.record(&GatewayAuditEvent::denied("session/create", None, &err));
            gateway_failure(id, &err)
        }
    }
}

/// Resolves the tenant bound to the presented session header.
fn bound_tenant(
    state: &ServerState,
    session_header: Option<&str>,
    id: &Value,
) -> Result<Arc<moodle_gate_core::Tenant>, RpcOutcome> {
    let Some(session_id) = session_header else {
        return Err(gateway_failure(
            id.clone(),
            &GatewayError::UnknownSession("missing Mcp-Session-Id header".to_string()),
        ));
    };
    state.sessions.get(session_id).ok_or_else(|| {
        gateway_failure(id.clone(), &GatewayError::UnknownSession(session_id.to_string()))
    })
}

// ============================================================================
// SECTION: Response Builders
// ============================================================================

/// Builds a success outcome.
fn rpc_success(id: Value, result: Value, assigned_session: Option<String>) -> RpcOutcome {
    RpcOutcome {
        status: StatusCode::OK,
        body: Some(JsonRpcResponse {
            jsonrpc: "2.0",
            id,
            result: Some(result),
            error: None,
        }),
        assigned_session,
    }
}

/// Builds a failure outcome with an explicit code.
fn rpc_failure(
    id: Value,
    status: StatusCode,
    code: i64,
    message: &str,
    data: Option<Value>,
) -> RpcOutcome {
    RpcOutcome {
        status,
        body: Some(JsonRpcResponse {
            jsonrpc: "2.0",
            id,
            result: None,
            error: Some(JsonRpcError {
                code,
                message: message.to_string(),
                data,
            }),
        }),
        assigned_session: None,
    }
}

/// Builds the serialization failure outcome.
fn serialization_failure(id: Value) -> RpcOutcome {
    rpc_failure(id, StatusCode::INTERNAL_SERVER_ERROR, -32603, "serialization failed", None)
}

/// Maps a gateway error onto HTTP status and JSON-RPC code.
fn gateway_failure(id: Value, error: &GatewayError) -> RpcOutcome {
    let (status, code) = match error {
        GatewayError::CredentialNotFound => (StatusCode::UNAUTHORIZED, -32001),
        GatewayError::CredentialForbidden | GatewayError::RoleForbidden(_) => {
            (StatusCode::FORBIDDEN, -32003)
        }
        GatewayError::UnknownSession(_) => (StatusCode::NOT_FOUND, -32002),
        GatewayError::UnknownTool(_) => (StatusCode::BAD_REQUEST, -32601),
        GatewayError::Validation(_) => (StatusCode::BAD_REQUEST, -32602),
        GatewayError::ControlPlaneUpstream(_)
        | GatewayError::InvalidTenantData(_)
        | GatewayError::InvalidUpstreamResponse(_)
        | GatewayError::RemoteTransport(_)
        | GatewayError::RemoteApplication(_)
        | GatewayError::InvalidRemoteJson(_) => (StatusCode::BAD_GATEWAY, -32010),
        GatewayError::RemoteCancelled => (StatusCode::GATEWAY_TIMEOUT, -32011),
    };
    let data = error
        .validation_payload()
        .and_then(|payload| serde_json::to_value(payload).ok());
    rpc_failure(id, status, code, &error.to_string(), data)
}

// ============================================================================
// SECTION: Tests
// ============================================================================

#[cfg(test)]
mod tests {
    #![allow(
        clippy::panic,
        clippy::unwrap_used,
        clippy::expect_used,
        reason = "Test-only assertions are permitted."
    )]

    use std::sync::Arc;
    use std::thread;

    use axum::http::StatusCode;
    use moodle_gate_client::MoodleClient;
    use moodle_gate_client::MoodleClientOptions;
    use moodle_gate_client::PanelResolver;
    use moodle_gate_core::GatewayError;
    use moodle_gate_core::ToolRegistry;
    use serde_json::Value;
    use serde_json::json;
    use tiny_http::Response;
    use tiny_http::Server;

    use super::ServerState;
    use super::gateway_failure;
    use super::process_request;
    use crate::audit::NoopAuditSink;
    use crate::catalog::builtin_tools;
    use crate::router::Dispatcher;
    use crate::sessions::SessionManager;

    /// Spawns a stub that answers `count` requests with the given body.
    fn spawn_stub(body: &'static str, count: usize) -> (String, thread::JoinHandle<()>) {
        let server = Server::http("127.0.0.1:0").unwrap();
        let addr = server.server_addr().to_ip().unwrap();
        let url = format!("http://{addr}");
        let handle = thread::spawn(move || {
            for _ in 0..count {
                if let Ok(request) = server.recv() {
                    let _ = request.respond(Response::from_string(body));
                }
            }
        });
        (url, handle)
    }

    /// Builds server state resolving against the given panel stub.
    fn state_with_panel(panel_url: String) -> ServerState {
        let registry = Arc::new(ToolRegistry::register(builtin_tools()).unwrap());
        let client = MoodleClient::new(MoodleClientOptions {
            allow_http: true,
            ..MoodleClientOptions::default()
        })
        .unwrap();
        ServerState {
            dispatcher: Dispatcher::new(registry, client, Arc::new(NoopAuditSink)).unwrap(),
            resolver: PanelResolver::new(panel_url, 5_000).unwrap(),
            sessions: Arc::new(SessionManager::new(60_000, 60_000)),
            audit: Arc::new(NoopAuditSink),
        }
    }

    /// Runs one JSON-RPC request through the processing pipeline.
    async fn send(
        state: &ServerState,
        session: Option<&str>,
        payload: Value,
    ) -> super::RpcOutcome {
        let bytes = serde_json::to_vec(&payload).unwrap();
        process_request(state, "the-key", session, &bytes).await
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn initialize_then_list_then_call_round_trip() {
        let (moodle_url, moodle_stub) = spawn_stub(
            r#"{"sitename":"Campus","username":"svc","userid":3,"release":"4.4"}"#,
            1,
        );
        let panel_body: &'static str = Box::leak(
            format!(
                r#"{{"moodleUrl":"{moodle_url}","moodleToken":"tok","moodleRoles":["student"]}}"#
            )
            .into_boxed_str(),
        );
        let (panel_url, panel_stub) = spawn_stub(panel_body, 1);
        let state = state_with_panel(panel_url);

        let init = send(&state, None, json!({"jsonrpc":"2.0","id":1,"method":"initialize"})).await;
        assert_eq!(init.status, StatusCode::OK);
        let session = init.assigned_session.clone().unwrap();
        assert_eq!(state.sessions.len(), 1);

        let list =
            send(&state, Some(&session), json!({"jsonrpc":"2.0","id":2,"method":"tools/list"}))
                .await;
        let body = serde_json::to_value(list.body.unwrap()).unwrap();
        let tools = body["result"]["tools"].as_array().unwrap();
        let names: Vec<&str> =
            tools.iter().map(|tool| tool["name"].as_str().unwrap()).collect();
        assert!(names.contains(&"core_webservice_get_site_info"));
        assert!(!names.contains(&"core_user_delete_users"));

        let call = send(&state, Some(&session), json!({
            "jsonrpc": "2.0",
            "id": 3,
            "method": "tools/call",
            "params": {"name": "core_webservice_get_site_info", "arguments": {}}
        }))
        .await;
        assert_eq!(call.status, StatusCode::OK);
        let body = serde_json::to_value(call.body.unwrap()).unwrap();
        assert_eq!(body["result"]["content"][0]["json"]["sitename"], "Campus");

        panel_stub.join().unwrap();
        moodle_stub.join().unwrap();
    }

    #[tokio::test]
    async fn failed_credential_exchange_creates_no_session() {
        let (panel_url, panel_stub) = spawn_stub("unknown key", 1);
        let state = state_with_panel(panel_url);
        // The stub helper cannot set a status code, so drive the refusal
        // through a 200 with an unusable record instead.
        let init = send(&state, None, json!({"jsonrpc":"2.0","id":1,"method":"initialize"})).await;
        assert_eq!(init.status, StatusCode::BAD_GATEWAY);
        assert!(init.assigned_session.is_none());
        assert_eq!(state.sessions.len(), 0);
        panel_stub.join().unwrap();
    }

    #[tokio::test]
    async fn calls_without_session_header_are_refused() {
        let (panel_url, _stub) = spawn_stub("{}", 0);
        let state = state_with_panel(panel_url);
        let outcome =
            send(&state, None, json!({"jsonrpc":"2.0","id":1,"method":"tools/list"})).await;
        assert_eq!(outcome.status, StatusCode::NOT_FOUND);
        assert_eq!(outcome.body.unwrap().error.unwrap().code, -32002);
    }

    #[tokio::test]
    async fn forbidden_tool_is_denied_for_student_session() {
        let (panel_url, panel_stub) = spawn_stub(
            r#"{"moodleUrl":"https://moodle.test","moodleToken":"tok","moodleRoles":"student"}"#,
            1,
        );
        let state = state_with_panel(panel_url);
        let init = send(&state, None, json!({"jsonrpc":"2.0","id":1,"method":"initialize"})).await;
        let session = init.assigned_session.unwrap();

        let call = send(&state, Some(&session), json!({
            "jsonrpc": "2.0",
            "id": 2,
            "method": "tools/call",
            "params": {"name": "core_user_delete_users", "arguments": {"userids": [1]}}
        }))
        .await;
        assert_eq!(call.status, StatusCode::FORBIDDEN);
        assert_eq!(call.body.unwrap().error.unwrap().code, -32003);
        panel_stub.join().unwrap();
    }

    #[tokio::test]
    async fn notifications_are_acknowledged_without_body() {
        let (panel_url, _stub) = spawn_stub("{}", 0);
        let state = state_with_panel(panel_url);
        let outcome = send(
            &state,
            None,
            json!({"jsonrpc":"2.0","method":"notifications/initialized"}),
        )
        .await;
        assert_eq!(outcome.status, StatusCode::ACCEPTED);
        assert!(outcome.body.is_none());
    }

    #[test]
    fn notification_shape_has_no_id_field() {
        let request: super::JsonRpcRequest =
            serde_json::from_str(r#"{"jsonrpc":"2.0","method":"notifications/initialized"}"#)
                .unwrap();
        assert!(request.id.is_none());
    }

    #[test]
    fn unknown_session_maps_to_not_found() {
        let outcome = gateway_failure(json!(1), &GatewayError::UnknownSession("x".to_string()));
        assert_eq!(outcome.status, StatusCode::NOT_FOUND);
        assert_eq!(outcome.body.unwrap().error.unwrap().code, -32002);
    }

    #[test]
    fn credential_refusals_map_to_auth_statuses() {
        let not_found = gateway_failure(json!(1), &GatewayError::CredentialNotFound);
        assert_eq!(not_found.status, StatusCode::UNAUTHORIZED);
        let forbidden = gateway_failure(json!(1), &GatewayError::CredentialForbidden);
        assert_eq!(forbidden.status, StatusCode::FORBIDDEN);
    }

    #[test]
    fn remote_cancellation_maps_to_gateway_timeout() {
        let outcome = gateway_failure(Value::Null, &GatewayError::RemoteCancelled);
        assert_eq!(outcome.status, StatusCode::GATEWAY_TIMEOUT);
    }
}
