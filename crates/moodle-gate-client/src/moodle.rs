// crates/moodle-gate-client/src/moodle.rs
// ============================================================================
// Module: Moodle REST Client
// Description: Single-call client for the Moodle web-service REST endpoint.
// Purpose: Flatten parameters, enforce timeouts, and normalize failures.
// Dependencies: moodle-gate-core, reqwest, serde_json, tokio, tokio-util
// ============================================================================

//! ## Overview
//! Moodle exposes every web-service function through one REST endpoint that
//! takes url-encoded parameters and reports application errors inside a 200
//! response body. This client performs exactly one call: it flattens nested
//! JSON arguments into Moodle's bracketed key convention, sends the request
//! as a GET query or POST form, races it against a cancellation token, and
//! maps the heterogeneous failure surface into the gateway taxonomy.
//! Security posture: the web-service token never appears in errors, and
//! response bodies are excerpted to a hard cap before reaching an error.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::time::Duration;

use moodle_gate_core::GatewayError;
use moodle_gate_core::RemoteMethod;
use serde_json::Map;
use serde_json::Value;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use url::Url;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Fixed path of the Moodle REST endpoint under the site base URL.
const MOODLE_REST_PATH: &str = "/webservice/rest/server.php";
/// Fixed response format marker sent with every call.
const MOODLE_REST_FORMAT: &str = "json";
/// Maximum length of a response body excerpt carried in an error.
const ERROR_SNIPPET_MAX_LENGTH: usize = 800;
/// Default remote call timeout in milliseconds.
pub const DEFAULT_TIMEOUT_MS: u64 = 30_000;

// ============================================================================
// SECTION: Configuration
// ============================================================================

/// Configuration for the Moodle REST client.
///
/// # Invariants
/// - `allow_http = false` blocks cleartext `http://` base URLs.
/// - `timeout_ms` bounds the full request lifecycle of every call.
#[derive(Debug, Clone)]
pub struct MoodleClientOptions {
    /// Default timeout applied when a call does not override it.
    pub timeout_ms: u64,
    /// Allow cleartext HTTP base URLs (disabled by default).
    pub allow_http: bool,
    /// User agent string for outbound requests.
    pub user_agent: String,
}

impl Default for MoodleClientOptions {
    fn default() -> Self {
        Self {
            timeout_ms: DEFAULT_TIMEOUT_MS,
            allow_http: false,
            user_agent: concat!("moodle-gate/", env!("CARGO_PKG_VERSION")).to_string(),
        }
    }
}

/// Per-call options.
#[derive(Debug, Clone, Default)]
pub struct CallOptions {
    /// HTTP method for the call.
    pub method: RemoteMethod,
    /// Caller-supplied cancellation token. When present the caller owns
    /// cancellation outright and no internal deadline is armed.
    pub cancel: Option<CancellationToken>,
    /// Per-call timeout override in milliseconds; applies only when no
    /// caller token is supplied.
    pub timeout_ms: Option<u64>,
}

// ============================================================================
// SECTION: Client
// ============================================================================

/// Client for the Moodle web-service REST endpoint.
///
/// # Invariants
/// - One HTTP call per invocation; no retries, no response caching.
/// - Every exit path releases the internal timeout timer.
pub struct MoodleClient {
    /// Shared HTTP client.
    http: reqwest::Client,
    /// Client configuration, including limits and policy.
    options: MoodleClientOptions,
}

impl MoodleClient {
    /// Creates a new Moodle client with the given options.
    ///
    /// # Errors
    ///
    /// Returns [`GatewayError::RemoteTransport`] when the HTTP client cannot
    /// be constructed.
    pub fn new(options: MoodleClientOptions) -> Result<Self, GatewayError> {
        let http = reqwest::Client::builder()
            .user_agent(options.user_agent.clone())
            .redirect(reqwest::redirect::Policy::none())
            .build()
            .map_err(|err| GatewayError::RemoteTransport(err.to_string()))?;
        Ok(Self {
            http,
            options,
        })
    }

    /// Calls one Moodle web-service function and returns its JSON result.
    ///
    /// # Errors
    ///
    /// Returns [`GatewayError::RemoteTransport`] for connection and non-2xx
    /// HTTP failures, [`GatewayError::RemoteApplication`] when Moodle reports
    /// an exception in the body, [`GatewayError::RemoteCancelled`] on timeout
    /// or caller cancellation, and [`GatewayError::InvalidRemoteJson`] when a
    /// body that claims to be JSON fails to parse.
    pub async fn call(
        &self,
        base_url: &str,
        token: &str,
        function: &str,
        params: &Value,
        call: CallOptions,
    ) -> Result<Value, GatewayError> {
        let endpoint = self.endpoint_url(base_url)?;
        let mut form: Vec<(String, String)> = vec![
            ("wstoken".to_string(), token.to_string()),
            ("wsfunction".to_string(), function.to_string()),
            ("moodlewsrestformat".to_string(), MOODLE_REST_FORMAT.to_string()),
        ];
        form.extend(flatten_params(params));

        let request = match call.method {
            RemoteMethod::Get => self.http.get(endpoint).query(&form),
            RemoteMethod::Post => self.http.post(endpoint).form(&form),
        };

        // Exactly one cancellation source per call: the caller's token when
        // supplied, otherwise an internal token armed with the deadline.
        let (deadline, _timer) = match call.cancel {
            Some(token) => (token, None),
            None => {
                let timeout_ms = call.timeout_ms.unwrap_or(self.options.timeout_ms);
                let owned = CancellationToken::new();
                let timer = DeadlineTimer::arm(owned.clone(), timeout_ms);
                (owned, Some(timer))
            }
        };

        let response = tokio::select! {
            () = deadline.cancelled() => return Err(GatewayError::RemoteCancelled),
            outcome = request.send() => {
                outcome.map_err(map_transport_error)?
            }
        };

        let status = response.status();
        let content_type = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|value| value.to_str().ok())
            .unwrap_or_default()
            .to_string();
        let body = tokio::select! {
            () = deadline.cancelled() => return Err(GatewayError::RemoteCancelled),
            outcome = response.text() => outcome.map_err(map_transport_error)?,
        };

        if !status.is_success() {
            return Err(GatewayError::RemoteTransport(format!(
                "Moodle returned HTTP {}: {}",
                status.as_u16(),
                excerpt(&body)
            )));
        }
        parse_moodle_body(&body, &content_type)
    }

    /// Builds the REST endpoint URL from a tenant base URL.
    fn endpoint_url(&self, base_url: &str) -> Result<Url, GatewayError> {
        let trimmed = base_url.trim_end_matches('/');
        let url = Url::parse(&format!("{trimmed}{MOODLE_REST_PATH}"))
            .map_err(|err| GatewayError::RemoteTransport(format!("invalid Moodle URL: {err}")))?;
        match url.scheme() {
            "https" => Ok(url),
            "http" if self.options.allow_http => Ok(url),
            other => Err(GatewayError::RemoteTransport(format!(
                "Moodle URL scheme not allowed: {other}"
            ))),
        }
    }
}

// ============================================================================
// SECTION: Timeout Guard
// ============================================================================

/// Timer task that cancels a token after a deadline.
///
/// Dropping the guard aborts the timer, so a call that finishes early never
/// leaves a pending cancellation behind.
struct DeadlineTimer {
    /// Handle of the spawned timer task.
    handle: JoinHandle<()>,
}

impl DeadlineTimer {
    /// Spawns a timer that cancels `token` after `timeout_ms`.
    fn arm(token: CancellationToken, timeout_ms: u64) -> Self {
        let handle = tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(timeout_ms)).await;
            token.cancel();
        });
        Self {
            handle,
        }
    }
}

impl Drop for DeadlineTimer {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

// ============================================================================
// SECTION: Parameter Flattening
// ============================================================================

/// Flattens a JSON argument object into Moodle's bracketed key convention.
///
/// `{users: [{username: "jdoe"}]}` becomes `users[0][username]=jdoe`.
/// Scalars render via their JSON text form; strings are unquoted.
#[must_use]
pub fn flatten_params(params: &Value) -> Vec<(String, String)> {
    let mut pairs = Vec::new();
    if let Value::Object(map) = params {
        for (key, value) in map {
            flatten_into(&mut pairs, key, value);
        }
    }
    pairs
}

/// Recursively flattens one value under a bracketed key prefix.
fn flatten_into(pairs: &mut Vec<(String, String)>, key: &str, value: &Value) {
    match value {
        Value::Null => {}
        Value::Array(items) => {
            for (index, item) in items.iter().enumerate() {
                flatten_into(pairs, &format!("{key}[{index}]"), item);
            }
        }
        Value::Object(map) => {
            for (field, nested) in map {
                flatten_into(pairs, &format!("{key}[{field}]"), nested);
            }
        }
        Value::String(text) => pairs.push((key.to_string(), text.clone())),
        scalar => pairs.push((key.to_string(), scalar.to_string())),
    }
}

// ============================================================================
// SECTION: Response Handling
// ============================================================================

/// Parses a 2xx Moodle body, surfacing in-band application errors.
///
/// Bodies that neither declare a JSON content type nor look like JSON are
/// returned as raw text, which tolerates misconfigured proxies in front of
/// the Moodle site.
fn parse_moodle_body(body: &str, content_type: &str) -> Result<Value, GatewayError> {
    if !content_type.contains("json") && !looks_like_json(body) {
        return Ok(Value::String(body.to_string()));
    }
    let value: Value = serde_json::from_str(body).map_err(|_| {
        GatewayError::InvalidRemoteJson(format!(
            "content type {content_type}: {}",
            excerpt(body)
        ))
    })?;
    if let Value::Object(map) = &value {
        if map.contains_key("exception") {
            return Err(GatewayError::RemoteApplication(application_error_message(map)));
        }
    }
    Ok(value)
}

/// Builds a one-line message from Moodle's exception fields.
fn application_error_message(map: &Map<String, Value>) -> String {
    let field = |name: &str| map.get(name).and_then(Value::as_str).unwrap_or_default();
    let exception = field("exception");
    let errorcode = field("errorcode");
    let message = field("message");
    let debuginfo = field("debuginfo");
    let mut text = String::new();
    if !exception.is_empty() {
        text.push_str(exception);
    }
    if !errorcode.is_empty() {
        if !text.is_empty() {
            text.push(' ');
        }
        text.push('(');
        text.push_str(errorcode);
        text.push(')');
    }
    if !message.is_empty() {
        if !text.is_empty() {
            text.push_str(": ");
        }
        text.push_str(message);
    }
    if !debuginfo.is_empty() {
        if !text.is_empty() {
            text.push_str(" | ");
        }
        text.push_str(debuginfo);
    }
    if text.is_empty() {
        text.push_str("Moodle API error");
    }
    excerpt(&text)
}

/// Cheap check that a body is object- or array-shaped before parsing.
///
/// Bare scalars are deliberately excluded: a proxy error page reading
/// `504 upstream timeout` must pass through as text, not fail JSON parsing.
/// Scalar results from Moodle itself arrive under a JSON content type and
/// never reach this check.
fn looks_like_json(body: &str) -> bool {
    let trimmed = body.trim_start();
    trimmed.starts_with('{') || trimmed.starts_with('[')
}

/// Truncates a body to the error excerpt cap on a character boundary.
pub(crate) fn excerpt(body: &str) -> String {
    if body.chars().count() <= ERROR_SNIPPET_MAX_LENGTH {
        return body.to_string();
    }
    let mut cut: String = body.chars().take(ERROR_SNIPPET_MAX_LENGTH).collect();
    cut.push_str("...");
    cut
}

/// Maps a reqwest failure into the gateway taxonomy.
fn map_transport_error(err: reqwest::Error) -> GatewayError {
    if err.is_timeout() {
        GatewayError::RemoteCancelled
    } else {
        GatewayError::RemoteTransport(err.to_string())
    }
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

    use serde_json::json;

    use super::excerpt;
    use super::flatten_params;
    use super::parse_moodle_body;
    use moodle_gate_core::GatewayError;

    #[test]
    fn flattens_scalar_array_with_indexed_keys() {
        let pairs = flatten_params(&json!({"ids": [1, 2]}));
        assert_eq!(
            pairs,
            vec![
                ("ids[0]".to_string(), "1".to_string()),
                ("ids[1]".to_string(), "2".to_string()),
            ]
        );
    }

    #[test]
    fn flattens_nested_objects_with_bracketed_fields() {
        let pairs = flatten_params(&json!({
            "users": [{"username": "jdoe", "suspended": 0}]
        }));
        assert!(pairs.contains(&("users[0][username]".to_string(), "jdoe".to_string())));
        assert!(pairs.contains(&("users[0][suspended]".to_string(), "0".to_string())));
    }

    #[test]
    fn null_values_are_omitted() {
        let pairs = flatten_params(&json!({"criteria": null, "id": 7}));
        assert_eq!(pairs, vec![("id".to_string(), "7".to_string())]);
    }

    #[test]
    fn exception_body_maps_to_application_error() {
        let body = r#"{"exception":"invalid_parameter_exception","errorcode":"invalidparameter","message":"Invalid parameter"}"#;
        let err = parse_moodle_body(body, "application/json").unwrap_err();
        match err {
            GatewayError::RemoteApplication(message) => {
                assert!(message.contains("invalid_parameter_exception"));
                assert!(message.contains("invalidparameter"));
                assert!(message.contains("Invalid parameter"));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn bare_boolean_body_parses_under_json_content_type() {
        assert_eq!(parse_moodle_body("true", "application/json").unwrap(), json!(true));
    }

    #[test]
    fn scalar_text_body_passes_through_raw() {
        let value = parse_moodle_body("504 upstream timeout", "text/plain");
        assert_eq!(value.unwrap(), json!("504 upstream timeout"));
    }

    #[test]
    fn html_body_passes_through_as_raw_text() {
        let value = parse_moodle_body("<html><body>maintenance</body></html>", "text/html");
        assert_eq!(value.unwrap(), json!("<html><body>maintenance</body></html>"));
    }

    #[test]
    fn truncated_json_body_maps_to_invalid_json() {
        let err = parse_moodle_body(r#"{"sitename": "Cam"#, "application/json").unwrap_err();
        match err {
            GatewayError::InvalidRemoteJson(message) => {
                assert!(message.contains("application/json"));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn excerpt_caps_long_bodies() {
        let long = "x".repeat(5000);
        let cut = excerpt(&long);
        assert_eq!(cut.chars().count(), 803);
        assert!(cut.ends_with("..."));
    }
}
