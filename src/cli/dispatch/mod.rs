use crate::cli::actions::Action;
use anyhow::{Context, Result};
use clap::ArgMatches;
use std::net::IpAddr;

/// Convert `ArgMatches` into typed Action enum with validation
///
/// # Errors
///
/// Returns an error if the listen address is not a valid IP
pub fn dispatch(matches: &ArgMatches) -> Result<Action> {
    // Extract and validate listen address
    let listen = matches
        .get_one::<String>("listen")
        .map(|addr| {
            addr.parse::<IpAddr>()
                .with_context(|| format!("Invalid IP address: {addr}"))
        })
        .transpose()?;

    // Extract port and connect timeout with defaults
    let port = matches.get_one::<u16>("port").copied().unwrap_or(3000);
    let timeout = matches.get_one::<u64>("timeout").copied().unwrap_or(10);

    Ok(Action::Serve {
        listen,
        port,
        timeout,
    })
}
