use std::io::Write;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::json;

/// Session stored by `croprec login`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredSession {
    pub api_url: String,
    pub token: String,
    pub username: String,
    pub role: String,
    pub expires_at: DateTime<Utc>,
}

impl StoredSession {
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at
    }
}

pub fn client() -> reqwest::Client {
    reqwest::Client::new()
}

pub fn exit_error(message: &str, docs_hint: Option<&str>) -> ! {
    let mut err = json!({
        "error": "cli_error",
        "message": message
    });
    if let Some(hint) = docs_hint {
        err["docs_hint"] = json!(hint);
    }
    eprintln!("{}", pretty(&err));
    std::process::exit(1);
}

pub fn pretty(value: &serde_json::Value) -> String {
    serde_json::to_string_pretty(value).unwrap_or_else(|_| value.to_string())
}

pub fn session_path() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("croprec")
        .join("session.json")
}

pub fn load_session(path: &Path) -> Option<StoredSession> {
    let data = std::fs::read_to_string(path).ok()?;
    serde_json::from_str(&data).ok()
}

pub fn save_session(path: &Path, session: &StoredSession) -> Result<(), Box<dyn std::error::Error>> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    let data = serde_json::to_string_pretty(session)?;

    // Written 0600: the file holds a live bearer token
    let mut file = std::fs::OpenOptions::new()
        .write(true)
        .create(true)
        .truncate(true)
        .mode(0o600)
        .open(path)?;
    file.write_all(data.as_bytes())?;

    Ok(())
}

/// Remove the stored session. Returns whether there was one.
pub fn clear_session(path: &Path) -> Result<bool, std::io::Error> {
    match std::fs::remove_file(path) {
        Ok(()) => Ok(true),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
        Err(e) => Err(e),
    }
}

/// Resolve a bearer token for API requests (priority order):
/// 1. CROPREC_SESSION_TOKEN env var
/// 2. the session stored by `croprec login`, unless it has expired
pub fn resolve_token() -> Result<String, String> {
    if let Ok(token) = std::env::var("CROPREC_SESSION_TOKEN") {
        if !token.trim().is_empty() {
            return Ok(token.trim().to_string());
        }
    }

    match load_session(&session_path()) {
        Some(session) if session.is_expired(Utc::now()) => Err(format!(
            "Session expired at {}. Run `croprec login` again.",
            session.expires_at
        )),
        Some(session) => Ok(session.token),
        None => Err("Not signed in. Run `croprec login` or set CROPREC_SESSION_TOKEN.".to_string()),
    }
}

/// Token or exit with a usage error.
pub fn require_token() -> String {
    resolve_token().unwrap_or_else(|message| {
        exit_error(&message, Some("Predictions and history require a signed-in session."))
    })
}

/// Execute an API request, print the response, exit with a structured code.
///
/// Exit codes: 0=success (2xx), 1=client error (4xx), 2=server error (5xx),
///             3=connection error, 4=usage error
pub async fn api_request(
    api_url: &str,
    method: reqwest::Method,
    path: &str,
    token: Option<&str>,
    body: Option<serde_json::Value>,
    query: &[(String, String)],
) -> i32 {
    match send(api_url, method, path, token, body, query).await {
        Ok((status, resp_body)) => {
            let exit_code = exit_code_for(status);
            if exit_code == 0 {
                println!("{}", pretty(&resp_body));
            } else {
                eprintln!("{}", pretty(&resp_body));
            }
            exit_code
        }
        Err(RequestError::Url(message)) => {
            eprintln!("{}", pretty(&json!({"error": "cli_error", "message": message})));
            4
        }
        Err(RequestError::Connection(message)) => {
            let err = json!({
                "error": "connection_error",
                "message": message,
                "docs_hint": "Is the API server running? Check CROPREC_API_URL."
            });
            eprintln!("{}", pretty(&err));
            3
        }
    }
}

pub enum RequestError {
    Url(String),
    Connection(String),
}

/// Send a request and return status and JSON body without printing.
pub async fn send(
    api_url: &str,
    method: reqwest::Method,
    path: &str,
    token: Option<&str>,
    body: Option<serde_json::Value>,
    query: &[(String, String)],
) -> Result<(u16, serde_json::Value), RequestError> {
    let url = build_url(api_url, path, query)?;

    let mut req = client().request(method, url);
    if let Some(t) = token {
        req = req.header("Authorization", format!("Bearer {t}"));
    }
    if let Some(b) = body {
        req = req.json(&b);
    }

    let resp = req
        .send()
        .await
        .map_err(|e| RequestError::Connection(e.to_string()))?;
    let status = resp.status().as_u16();
    let text = resp.text().await.unwrap_or_default();
    let body = if text.is_empty() {
        serde_json::Value::Null
    } else {
        serde_json::from_str(&text).unwrap_or_else(|_| json!({ "raw": text }))
    };
    Ok((status, body))
}

fn build_url(api_url: &str, path: &str, query: &[(String, String)]) -> Result<reqwest::Url, RequestError> {
    let base = api_url.trim_end_matches('/');
    let mut url = reqwest::Url::parse(&format!("{base}{path}"))
        .map_err(|e| RequestError::Url(format!("Invalid URL: {base}{path}: {e}")))?;
    if !query.is_empty() {
        let mut pairs = url.query_pairs_mut();
        for (k, v) in query {
            pairs.append_pair(k, v);
        }
    }
    Ok(url)
}

pub fn exit_code_for(status: u16) -> i32 {
    match status {
        200..=299 => 0,
        400..=499 => 1,
        _ => 2,
    }
}

// Unix-specific imports for file permissions
#[cfg(unix)]
use std::os::unix::fs::OpenOptionsExt;

// No-op on non-unix (won't compile for Windows without this)
#[cfg(not(unix))]
trait OpenOptionsExt {
    fn mode(&mut self, _mode: u32) -> &mut Self;
}

#[cfg(not(unix))]
impl OpenOptionsExt for std::fs::OpenOptions {
    fn mode(&mut self, _mode: u32) -> &mut Self {
        self
    }
}
