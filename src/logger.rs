//! Per-request log lines with credential redaction
//!
//! One JSON line per probe invocation, written to stdout before the
//! network action begins. A logging failure is swallowed; it must never
//! affect the HTTP response.

use axum::http::Method;
use chrono::{SecondsFormat, Utc};
use serde_json::{Value, json};
use std::{io::Write, net::SocketAddr};

/// Marker substituted for the password before logging
pub const REDACTION_MARKER: &str = "***";

/// Replace a non-empty `db_pass` field with the redaction marker
#[must_use]
pub fn redact(mut payload: Value) -> Value {
    if let Some(pass) = payload.get_mut("db_pass")
        && pass.as_str().is_some_and(|current| !current.is_empty())
    {
        *pass = Value::String(REDACTION_MARKER.to_string());
    }

    payload
}

/// Emit one structured line for an inbound probe request
pub fn log_request(method: &Method, endpoint: &str, remote: Option<SocketAddr>, payload: &Value) {
    let record = json!({
        "time": Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true),
        "remote": remote.map_or_else(|| "unknown".to_string(), |addr| addr.to_string()),
        "method": method.as_str(),
        "endpoint": endpoint,
        "payload": payload,
    });

    let mut stdout = std::io::stdout().lock();
    let _ = writeln!(stdout, "{record}");
}
