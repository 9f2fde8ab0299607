use crate::{
    logger,
    probe::{db, tls},
};
use axum::{
    Json, Router,
    extract::{ConnectInfo, Query, State},
    http::{Method, StatusCode, header},
    response::{IntoResponse, Response},
    routing::{get, post},
};
use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use std::{
    net::{IpAddr, SocketAddr},
    time::Duration,
};
use tokio::net::TcpListener;
use tower_http::cors::{Any, CorsLayer};

const MISSING_FIELDS_MESSAGE: &str = "Missing required fields";
const MISSING_FIELDS_ERROR: &str = "Host, database name, and username are required";
const CONNECT_SUCCESS: &str = "Database connection successful!";
const CONNECT_FAILED: &str = "Database connection failed";
const QUERY_FAILED: &str = "Connection established but test query failed";
const MISSING_DOMAIN: &str = "Please provide ?domain=example.com";
const NO_CERTIFICATE: &str = "No valid SSL certificate found.";

/// Per-process configuration handed to every handler; no globals
#[derive(Debug, Clone, Copy)]
pub struct AppState {
    pub connect_timeout: Duration,
}

/// Build the two-endpoint router with permissive CORS
///
/// A plain `OPTIONS` on any path answers 204; everything that matches no
/// route or method answers 404 with a JSON body.
#[must_use]
pub fn router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers([header::CONTENT_TYPE]);

    Router::new()
        .route("/api/test-connection", post(test_connection))
        .route("/check-ssl", get(check_ssl))
        .fallback(fallback)
        .method_not_allowed_fallback(fallback)
        .layer(cors)
        .with_state(state)
}

/// Start the HTTP service
///
/// # Errors
///
/// Returns an error if the service fails to bind or to serve
pub async fn start(listen: Option<IpAddr>, port: u16, timeout: u64) -> anyhow::Result<()> {
    let state = AppState {
        connect_timeout: Duration::from_secs(timeout),
    };
    let app = router(state);

    // Bind to socket with smart fallback
    let (listener, bind_addr) = match listen {
        Some(addr) => {
            // Explicit address specified - bind to it
            let socket_addr = SocketAddr::new(addr, port);
            let listener = TcpListener::bind(socket_addr).await?;
            (listener, socket_addr.to_string())
        }
        None => {
            // Auto mode: try IPv6 first, fallback to IPv4
            if let Ok(l) = TcpListener::bind(format!("[::]:{port}")).await {
                (l, format!("[::]:{port}"))
            } else {
                let socket_addr = format!("0.0.0.0:{port}");
                (TcpListener::bind(&socket_addr).await?, socket_addr)
            }
        }
    };

    println!(
        "{} - Listening on {bind_addr}, connect timeout: {timeout}s",
        Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true),
    );

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .await?;

    Ok(())
}

/// Outcome envelope for the DB probe; always HTTP 200, success flag inside
#[derive(Debug, Serialize)]
struct ConnectionOutcome {
    success: bool,
    message: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    details: Option<Value>,
}

impl ConnectionOutcome {
    fn missing_fields() -> Self {
        Self {
            success: false,
            message: MISSING_FIELDS_MESSAGE,
            error: Some(MISSING_FIELDS_ERROR.to_string()),
            details: None,
        }
    }

    fn connected(request: &db::ConnectionRequest) -> Self {
        Self {
            success: true,
            message: CONNECT_SUCCESS,
            error: None,
            details: Some(json!({
                "host": request.db_host.trim(),
                "database": request.db_name.trim(),
                "user": request.db_user.trim(),
            })),
        }
    }

    fn failed(message: &'static str, failure: &db::ProbeFailure) -> Self {
        Self {
            success: false,
            message,
            error: Some(db::normalize_error(&failure.raw).to_string()),
            details: Some(json!({
                "errorCode": failure.error_code,
                "sqlState": failure.sql_state,
                "raw": failure.raw,
            })),
        }
    }
}

async fn test_connection(
    State(state): State<AppState>,
    ConnectInfo(remote): ConnectInfo<SocketAddr>,
    Json(request): Json<db::ConnectionRequest>,
) -> Json<ConnectionOutcome> {
    logger::log_request(
        &Method::POST,
        "/api/test-connection",
        Some(remote),
        &logger::redact(request.log_payload()),
    );

    if !request.has_required_fields() {
        return Json(ConnectionOutcome::missing_fields());
    }

    let outcome = match db::run(&request, state.connect_timeout).await {
        db::DbProbe::Connected => ConnectionOutcome::connected(&request),
        db::DbProbe::ConnectFailed(failure) => ConnectionOutcome::failed(CONNECT_FAILED, &failure),
        db::DbProbe::QueryFailed(failure) => ConnectionOutcome::failed(QUERY_FAILED, &failure),
    };

    Json(outcome)
}

/// Certificate report; `score` is only meaningful when `ssl` is true
#[derive(Debug, Serialize)]
struct SslReport {
    domain: String,
    ssl: bool,
    score: u8,
    #[serde(skip_serializing_if = "Option::is_none")]
    valid_from: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    valid_to: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    days_remaining: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    issuer: Option<String>,
    #[serde(rename = "issuedTo", skip_serializing_if = "Option::is_none")]
    issued_to: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    protocol: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    message: Option<&'static str>,
    last_checked: String,
}

impl SslReport {
    fn from_cert(domain: String, info: &tls::CertInfo) -> Self {
        let now = Utc::now();
        let days = tls::days_remaining(info.not_after, now);

        Self {
            domain,
            ssl: true,
            score: tls::score(days, Some(&info.signature_algorithm)),
            valid_from: Some(rfc3339(info.not_before)),
            valid_to: Some(rfc3339(info.not_after)),
            days_remaining: Some(days),
            issuer: Some(info.issuer.clone()),
            issued_to: Some(info.subject.clone()),
            protocol: info.protocol.clone(),
            error: None,
            message: None,
            last_checked: rfc3339(now),
        }
    }

    fn no_certificate(domain: String) -> Self {
        Self {
            message: Some(NO_CERTIFICATE),
            ..Self::without_ssl(domain)
        }
    }

    fn unreachable(domain: String, error: String) -> Self {
        Self {
            error: Some(error),
            ..Self::without_ssl(domain)
        }
    }

    fn without_ssl(domain: String) -> Self {
        Self {
            domain,
            ssl: false,
            score: 0,
            valid_from: None,
            valid_to: None,
            days_remaining: None,
            issuer: None,
            issued_to: None,
            protocol: None,
            error: None,
            message: None,
            last_checked: rfc3339(Utc::now()),
        }
    }
}

#[derive(Debug, Deserialize)]
struct SslQuery {
    #[serde(default)]
    domain: Option<String>,
}

async fn check_ssl(
    State(state): State<AppState>,
    ConnectInfo(remote): ConnectInfo<SocketAddr>,
    Query(query): Query<SslQuery>,
) -> Response {
    let domain = query.domain.unwrap_or_default().trim().to_string();

    logger::log_request(
        &Method::GET,
        "/check-ssl",
        Some(remote),
        &json!({ "domain": domain }),
    );

    if domain.is_empty() {
        return (
            StatusCode::BAD_REQUEST,
            Json(ErrorBody {
                error: MISSING_DOMAIN,
            }),
        )
            .into_response();
    }

    let report = match tls::inspect(&domain, tls::HTTPS_PORT, state.connect_timeout).await {
        Ok(Some(info)) => SslReport::from_cert(domain, &info),
        Ok(None) => SslReport::no_certificate(domain),
        Err(err) => SslReport::unreachable(domain, format!("{err:#}")),
    };

    Json(report).into_response()
}

#[derive(Debug, Serialize)]
struct ErrorBody {
    error: &'static str,
}

async fn fallback(method: Method) -> Response {
    // Pre-flight OPTIONS answers empty on any path
    if method == Method::OPTIONS {
        StatusCode::NO_CONTENT.into_response()
    } else {
        (
            StatusCode::NOT_FOUND,
            Json(ErrorBody { error: "Not found" }),
        )
            .into_response()
    }
}

fn rfc3339(timestamp: DateTime<Utc>) -> String {
    timestamp.to_rfc3339_opts(SecondsFormat::Secs, true)
}
