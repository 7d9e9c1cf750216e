// crates/moodle-gate-client/tests/remote_calls.rs
// ============================================================================
// Module: Remote Call Tests
// Description: End-to-end tests for panel resolution and Moodle calls.
// Purpose: Validate status mapping, parameter flattening, and cancellation.
// Dependencies: moodle-gate-client, moodle-gate-core, tiny_http, tokio
// ============================================================================

//! ## Overview
//! Tests both outbound clients against local stub servers:
//! - Panel resolution: 200 with bare-string roles, 404, 403, 5xx mapping
//!   with excerpted failure bodies
//! - Moodle calls: required REST parameters, bracketed flattening on the
//!   wire, in-band exception mapping, bare-boolean results, raw-text
//!   passthrough for plain-text bodies
//! - Cancellation: a stalled server trips the timeout deadline; a caller
//!   token owns cancellation outright
//!
//! Security posture: both upstreams are adversary-controlled in these tests.

#![allow(
    clippy::panic,
    clippy::print_stdout,
    clippy::print_stderr,
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::use_debug,
    clippy::dbg_macro,
    clippy::panic_in_result_fn,
    clippy::unwrap_in_result,
    reason = "Test-only output and panic-based assertions are permitted."
)]

use std::thread;
use std::time::Duration;

use moodle_gate_client::CallOptions;
use moodle_gate_client::MoodleClient;
use moodle_gate_client::MoodleClientOptions;
use moodle_gate_client::PanelResolver;
use moodle_gate_core::GatewayError;
use moodle_gate_core::RemoteMethod;
use moodle_gate_core::Role;
use serde_json::json;
use tiny_http::Header;
use tiny_http::Response;
use tiny_http::Server;
use tokio_util::sync::CancellationToken;

// ============================================================================
// SECTION: Test Helpers
// ============================================================================

/// Spawns a local stub that answers one request with the given JSON body
/// and status, reporting the request URL it saw.
fn spawn_server(body: &'static str, status: u16) -> (String, thread::JoinHandle<String>) {
    let server = Server::http("127.0.0.1:0").unwrap();
    let addr = server.server_addr().to_ip().unwrap();
    let url = format!("http://{addr}");

    let handle = thread::spawn(move || {
        let mut seen = String::new();
        if let Ok(request) = server.recv() {
            seen = request.url().to_string();
            let response = Response::from_string(body)
                .with_status_code(status)
                .with_header(json_content_type());
            let _ = request.respond(response);
        }
        seen
    });

    (url, handle)
}

/// Builds an `application/json` content-type header for stub responses.
fn json_content_type() -> Header {
    Header::from_bytes(&b"Content-Type"[..], &b"application/json"[..]).unwrap()
}

/// Creates a Moodle client that accepts the stub's plain-HTTP URL.
fn local_client() -> MoodleClient {
    MoodleClient::new(MoodleClientOptions {
        allow_http: true,
        timeout_ms: 5_000,
        ..MoodleClientOptions::default()
    })
    .unwrap()
}

// ============================================================================
// SECTION: Panel Resolution Tests
// ============================================================================

/// Tests that a 200 with a bare-string role resolves to a singleton set.
#[tokio::test]
async fn panel_bare_string_role_resolves() {
    let (url, handle) = spawn_server(
        r#"{"moodleUrl":"https://moodle.test","moodleToken":"tok","moodleRoles":"teacher"}"#,
        200,
    );
    let resolver = PanelResolver::new(url, 5_000).unwrap();
    let tenant = resolver.resolve("good-key").await.unwrap();
    assert!(tenant.roles().contains(&Role::Teacher));
    assert_eq!(tenant.roles().len(), 1);
    handle.join().unwrap();
}

/// Tests that a 404 maps to `CredentialNotFound`.
#[tokio::test]
async fn panel_404_maps_to_credential_not_found() {
    let (url, handle) = spawn_server("not found", 404);
    let resolver = PanelResolver::new(url, 5_000).unwrap();
    let err = resolver.resolve("bad-key").await.unwrap_err();
    assert!(matches!(err, GatewayError::CredentialNotFound));
    handle.join().unwrap();
}

/// Tests that a 403 maps to `CredentialForbidden`.
#[tokio::test]
async fn panel_403_maps_to_credential_forbidden() {
    let (url, handle) = spawn_server("forbidden", 403);
    let resolver = PanelResolver::new(url, 5_000).unwrap();
    let err = resolver.resolve("revoked-key").await.unwrap_err();
    assert!(matches!(err, GatewayError::CredentialForbidden));
    handle.join().unwrap();
}

/// Tests that any other non-2xx maps to `ControlPlaneUpstream`.
#[tokio::test]
async fn panel_5xx_maps_to_upstream_error() {
    let (url, handle) = spawn_server("boom", 502);
    let resolver = PanelResolver::new(url, 5_000).unwrap();
    let err = resolver.resolve("any-key").await.unwrap_err();
    assert!(matches!(err, GatewayError::ControlPlaneUpstream(_)));
    handle.join().unwrap();
}

/// Tests that a long failure body is excerpted before entering the error.
#[tokio::test]
async fn panel_error_body_is_excerpted() {
    let body: &'static str = Box::leak("x".repeat(5_000).into_boxed_str());
    let (url, handle) = spawn_server(body, 502);
    let resolver = PanelResolver::new(url, 5_000).unwrap();
    let err = resolver.resolve("any-key").await.unwrap_err();
    let message = err.to_string();
    assert!(message.contains("HTTP 502"));
    assert!(message.ends_with("..."));
    assert!(message.len() < 900, "unexpected message length {}", message.len());
    handle.join().unwrap();
}

/// Tests that a 2xx with a missing field maps to `InvalidTenantData`.
#[tokio::test]
async fn panel_missing_field_maps_to_invalid_tenant_data() {
    let (url, handle) = spawn_server(r#"{"moodleUrl":"https://moodle.test"}"#, 200);
    let resolver = PanelResolver::new(url, 5_000).unwrap();
    let err = resolver.resolve("any-key").await.unwrap_err();
    assert!(matches!(err, GatewayError::InvalidTenantData(_)));
    handle.join().unwrap();
}

// ============================================================================
// SECTION: Moodle Call Tests
// ============================================================================

/// Tests that a GET call carries the required REST parameters and the
/// bracketed flattening of array arguments.
#[tokio::test]
async fn moodle_get_carries_rest_parameters() {
    let (url, handle) = spawn_server("[]", 200);
    let client = local_client();
    let result = client
        .call(&url, "tok", "core_course_get_courses", &json!({"options": {"ids": [1, 2]}}),
            CallOptions::default())
        .await
        .unwrap();
    assert_eq!(result, json!([]));

    let seen = handle.join().unwrap();
    assert!(seen.contains("/webservice/rest/server.php"));
    assert!(seen.contains("wstoken=tok"));
    assert!(seen.contains("wsfunction=core_course_get_courses"));
    assert!(seen.contains("moodlewsrestformat=json"));
    assert!(seen.contains("options%5Bids%5D%5B0%5D=1"));
    assert!(seen.contains("options%5Bids%5D%5B1%5D=2"));
}

/// Tests that a POST call sends the form body rather than the query string.
#[tokio::test]
async fn moodle_post_uses_form_body() {
    let (url, handle) = spawn_server("true", 200);
    let client = local_client();
    let result = client
        .call(&url, "tok", "core_user_delete_users", &json!({"userids": [42]}), CallOptions {
            method: RemoteMethod::Post,
            ..CallOptions::default()
        })
        .await
        .unwrap();
    assert_eq!(result, json!(true));

    let seen = handle.join().unwrap();
    assert!(!seen.contains("wstoken"));
    assert!(seen.contains("/webservice/rest/server.php"));
}

/// Tests that a 2xx body without a JSON content type or JSON shape is
/// returned as raw text.
#[tokio::test]
async fn moodle_plain_text_body_passes_through() {
    let server = Server::http("127.0.0.1:0").unwrap();
    let addr = server.server_addr().to_ip().unwrap();
    let url = format!("http://{addr}");
    // tiny_http labels string responses text/plain by default.
    let stub = thread::spawn(move || {
        if let Ok(request) = server.recv() {
            let _ = request.respond(Response::from_string("504 upstream timeout"));
        }
    });

    let client = local_client();
    let result = client
        .call(&url, "tok", "core_webservice_get_site_info", &json!({}), CallOptions::default())
        .await
        .unwrap();
    assert_eq!(result, json!("504 upstream timeout"));
    stub.join().unwrap();
}

/// Tests that an in-band exception body maps to `RemoteApplication`.
#[tokio::test]
async fn moodle_exception_maps_to_application_error() {
    let (url, handle) = spawn_server(
        r#"{"exception":"invalid_parameter_exception","errorcode":"invalidparameter","message":"Invalid parameter"}"#,
        200,
    );
    let client = local_client();
    let err = client
        .call(&url, "tok", "core_user_create_users", &json!({}), CallOptions::default())
        .await
        .unwrap_err();
    match err {
        GatewayError::RemoteApplication(message) => {
            assert!(message.contains("invalid_parameter_exception"));
            assert!(message.contains("invalidparameter"));
        }
        other => panic!("unexpected error: {other}"),
    }
    handle.join().unwrap();
}

/// Tests that a non-2xx remote response maps to `RemoteTransport`.
#[tokio::test]
async fn moodle_http_error_maps_to_transport_error() {
    let (url, handle) = spawn_server("<html>down</html>", 503);
    let client = local_client();
    let err = client
        .call(&url, "tok", "core_webservice_get_site_info", &json!({}), CallOptions::default())
        .await
        .unwrap_err();
    assert!(matches!(err, GatewayError::RemoteTransport(_)));
    handle.join().unwrap();
}

/// Tests that a pre-cancelled token aborts the call before any response.
#[tokio::test]
async fn moodle_cancelled_token_aborts_call() {
    let server = Server::http("127.0.0.1:0").unwrap();
    let addr = server.server_addr().to_ip().unwrap();
    let url = format!("http://{addr}");
    // Server never responds; cancellation must win.
    let stall = thread::spawn(move || {
        if let Ok(request) = server.recv() {
            thread::sleep(Duration::from_secs(2));
            let _ = request.respond(Response::from_string("late"));
        }
    });

    let token = CancellationToken::new();
    token.cancel();
    let client = local_client();
    let err = client
        .call(&url, "tok", "core_webservice_get_site_info", &json!({}), CallOptions {
            cancel: Some(token),
            ..CallOptions::default()
        })
        .await
        .unwrap_err();
    assert!(matches!(err, GatewayError::RemoteCancelled));
    drop(stall);
}

/// Tests that the per-call timeout trips against a stalled server.
#[tokio::test]
async fn moodle_timeout_maps_to_cancelled() {
    let server = Server::http("127.0.0.1:0").unwrap();
    let addr = server.server_addr().to_ip().unwrap();
    let url = format!("http://{addr}");
    let stall = thread::spawn(move || {
        if let Ok(request) = server.recv() {
            thread::sleep(Duration::from_secs(2));
            let _ = request.respond(Response::from_string("late"));
        }
    });

    let client = local_client();
    let err = client
        .call(&url, "tok", "core_webservice_get_site_info", &json!({}), CallOptions {
            timeout_ms: Some(100),
            ..CallOptions::default()
        })
        .await
        .unwrap_err();
    assert!(matches!(err, GatewayError::RemoteCancelled));
    drop(stall);
}

/// Tests that a caller-supplied token disables the internal deadline: a
/// server slower than the timeout override still completes the call.
#[tokio::test]
async fn moodle_caller_token_disables_internal_deadline() {
    let server = Server::http("127.0.0.1:0").unwrap();
    let addr = server.server_addr().to_ip().unwrap();
    let url = format!("http://{addr}");
    let slow = thread::spawn(move || {
        if let Ok(request) = server.recv() {
            thread::sleep(Duration::from_millis(600));
            let response = Response::from_string("[]").with_header(json_content_type());
            let _ = request.respond(response);
        }
    });

    let token = CancellationToken::new();
    let client = local_client();
    let result = client
        .call(&url, "tok", "core_course_get_courses", &json!({}), CallOptions {
            cancel: Some(token),
            timeout_ms: Some(100),
            ..CallOptions::default()
        })
        .await
        .unwrap();
    assert_eq!(result, json!([]));
    slow.join().unwrap();
}
