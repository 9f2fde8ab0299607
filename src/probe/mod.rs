//! Single-shot diagnostic probes
//!
//! - `db` - open a short-lived MySQL connection and run a trivial query
//! - `tls` - handshake against `host:port` and extract the peer certificate
//!
//! Both probes are stateless: every invocation opens its own connection,
//! bounded by the configured connect timeout, and releases it before
//! returning.

pub mod db;
pub mod tls;
