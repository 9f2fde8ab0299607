//! dbprobe - stateless HTTP diagnostics for database connectivity and TLS
//! certificates.
//!
//! Two endpoints, no retained state:
//!
//! - `POST /api/test-connection` opens a short-lived MySQL connection with
//!   caller-supplied credentials, runs `SELECT 1`, and reports the outcome
//!   with a normalized error message.
//! - `GET /check-ssl?domain=<host>` performs a TLS handshake against
//!   `domain:443` (verification disabled on purpose), extracts the peer
//!   certificate, and computes a 0-100 freshness/strength score.

pub mod cli;
pub mod logger;
pub mod probe;
pub mod server;
