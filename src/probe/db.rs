use serde::Deserialize;
use serde_json::{Value, json};
use sqlx::{
    ConnectOptions, Connection,
    mysql::{MySqlConnectOptions, MySqlDatabaseError},
};
use std::time::Duration;
use tokio::time;

pub const DEFAULT_MYSQL_PORT: u16 = 3306;

pub const ACCESS_DENIED: &str = "Access denied. Please check your username and password.";
pub const CONNECTION_REFUSED: &str =
    "Could not connect to database server. Please check if the server is running and the host is correct.";
pub const UNKNOWN_DATABASE: &str = "Database does not exist.";
pub const TIMED_OUT: &str = "Connection timed out. Please check your host and port.";

/// Prioritized (signatures, replacement) pairs, evaluated in order; the
/// first signature found in the raw driver text wins. Matching is
/// case-sensitive. The `ECONNREFUSED`/`ETIMEDOUT` spellings cover raw
/// OS-code text some drivers surface instead of the prose form.
const NORMALIZATIONS: &[(&[&str], &str)] = &[
    (&["Access denied"], ACCESS_DENIED),
    (
        &[
            "Connection refused",
            "ECONNREFUSED",
            "No route to host",
            "unreachable",
        ],
        CONNECTION_REFUSED,
    ),
    (&["Unknown database"], UNKNOWN_DATABASE),
    (&["timed out", "timeout", "ETIMEDOUT"], TIMED_OUT),
];

/// Caller-supplied credentials for a single connection attempt
///
/// Missing body fields deserialize to empty strings so validation can
/// answer with the stable missing-fields message instead of a
/// deserialization error.
#[derive(Debug, Deserialize)]
pub struct ConnectionRequest {
    #[serde(default)]
    pub db_host: String,
    #[serde(default)]
    pub db_name: String,
    #[serde(default)]
    pub db_user: String,
    #[serde(default)]
    pub db_pass: String,
    #[serde(default)]
    pub db_port: Option<u16>,
}

impl ConnectionRequest {
    /// Host, database name, and username must be non-empty after trimming;
    /// the password carries no such requirement.
    #[must_use]
    pub fn has_required_fields(&self) -> bool {
        !(self.db_host.trim().is_empty()
            || self.db_name.trim().is_empty()
            || self.db_user.trim().is_empty())
    }

    /// Loggable copy of the request body (redaction happens in the logger)
    #[must_use]
    pub fn log_payload(&self) -> Value {
        json!({
            "db_host": self.db_host,
            "db_name": self.db_name,
            "db_user": self.db_user,
            "db_pass": self.db_pass,
        })
    }
}

/// Raw failure details kept alongside the normalized message for debugging
#[derive(Debug)]
pub struct ProbeFailure {
    pub raw: String,
    pub error_code: Option<u16>,
    pub sql_state: Option<String>,
}

impl ProbeFailure {
    fn from_sqlx(err: &sqlx::Error) -> Self {
        let (error_code, sql_state) = if let sqlx::Error::Database(db_err) = err {
            (
                db_err
                    .as_error()
                    .downcast_ref::<MySqlDatabaseError>()
                    .map(MySqlDatabaseError::number),
                db_err.code().map(|code| code.to_string()),
            )
        } else {
            (None, None)
        };

        Self {
            raw: err.to_string(),
            error_code,
            sql_state,
        }
    }

    fn timed_out(timeout: Duration) -> Self {
        Self {
            raw: format!("Connection timed out after {}s", timeout.as_secs()),
            error_code: None,
            sql_state: None,
        }
    }
}

/// Outcome of a single connection probe
///
/// A failed verification query is reported separately from a failed
/// connect: the session opened, so the root cause is different.
#[derive(Debug)]
pub enum DbProbe {
    Connected,
    ConnectFailed(ProbeFailure),
    QueryFailed(ProbeFailure),
}

/// Open a short-lived connection with the supplied credentials, confirm the
/// session is usable with `SELECT 1`, and release it. No retries; a single
/// failed attempt is final.
pub async fn run(request: &ConnectionRequest, connect_timeout: Duration) -> DbProbe {
    let options = MySqlConnectOptions::new()
        .host(request.db_host.trim())
        .port(request.db_port.unwrap_or(DEFAULT_MYSQL_PORT))
        .username(request.db_user.trim())
        .password(&request.db_pass)
        .database(request.db_name.trim());

    let mut conn = match time::timeout(connect_timeout, options.connect()).await {
        Ok(Ok(conn)) => conn,
        Ok(Err(err)) => return DbProbe::ConnectFailed(ProbeFailure::from_sqlx(&err)),
        Err(_) => return DbProbe::ConnectFailed(ProbeFailure::timed_out(connect_timeout)),
    };

    // SELECT 1 confirms the session is usable, not merely that the socket
    // opened
    let query = time::timeout(
        connect_timeout,
        sqlx::query("SELECT 1").fetch_one(&mut conn),
    )
    .await;

    let outcome = match query {
        Ok(Ok(_)) => DbProbe::Connected,
        Ok(Err(err)) => DbProbe::QueryFailed(ProbeFailure::from_sqlx(&err)),
        Err(_) => DbProbe::QueryFailed(ProbeFailure::timed_out(connect_timeout)),
    };

    // The connection is released exactly once, on success and failure alike
    let _ = conn.close().await;

    outcome
}

/// Translate a raw driver error into a stable user-facing message; text
/// with no known signature passes through unchanged.
#[must_use]
pub fn normalize_error(raw: &str) -> &str {
    for (signatures, message) in NORMALIZATIONS {
        if signatures.iter().any(|signature| raw.contains(signature)) {
            return message;
        }
    }

    raw
}
