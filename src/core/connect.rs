/// Connect-string parsing
///
/// The first whitespace-separated token of an invocation may carry
/// `user[:password]@server[:port][/database]`, split at the last `@` so
/// users and passwords may contain one. Everything after it is the
/// command body. When the first token is not a connect string the whole
/// input is the command.
use super::{ConnectSpec, DEFAULT_PORT, DEFAULT_SERVER};
use crate::error::{DbmuxError, DbmuxResult};
use lazy_static::lazy_static;
use regex::Regex;

lazy_static! {
    static ref IDENTITY: Regex = Regex::new(r"^([^:\s]+)(?::([^:\s]+))?@([^@\s]+)$")
        .expect("Failed to compile connect-string identity pattern");
    static ref LOCATION: Regex = Regex::new(r"^([^:/]+)(?::([^:/]*))?(?:/([^:/]+))?$")
        .expect("Failed to compile connect-string location pattern");
}

/// Parse an invocation using the built-in defaults (`localhost:2424`).
pub fn parse(raw: &str) -> DbmuxResult<(ConnectSpec, String)> {
    parse_with_defaults(raw, &ConnectSpec::with_defaults(DEFAULT_SERVER, DEFAULT_PORT))
}

/// Parse an invocation, filling omitted parts from `defaults`.
///
/// Returns the connection intent and the command remainder (trimmed).
pub fn parse_with_defaults(
    raw: &str,
    defaults: &ConnectSpec,
) -> DbmuxResult<(ConnectSpec, String)> {
    let mut spec = defaults.clone();
    let trimmed = raw.trim();

    let (first, rest) = match trimmed.split_once(char::is_whitespace) {
        Some((first, rest)) => (first, rest.trim()),
        None => (trimmed, ""),
    };

    let identity = match IDENTITY.captures(first) {
        Some(caps) => caps,
        None => {
            tracing::debug!("No connect string in invocation");
            return Ok((spec, trimmed.to_string()));
        }
    };

    spec.user = identity[1].to_string();
    if let Some(password) = identity.get(2) {
        spec.password = password.as_str().to_string();
    }

    let location = &identity[3];
    let caps = LOCATION
        .captures(location)
        .ok_or_else(|| {
            DbmuxError::parse(format!("Malformed connect string location '{}'", location))
        })?;

    let server = caps.get(1).map(|m| m.as_str());
    let port = caps.get(2).map(|m| m.as_str());
    let database = caps.get(3).map(|m| m.as_str());

    match (server, port, database) {
        // user[:password]@name resolves to a database on the default server
        (Some(name), None, None) => {
            spec.database = name.to_string();
        }
        _ => {
            if let Some(server) = server {
                spec.server = server.to_string();
            }
            if let Some(port) = port {
                spec.port = parse_port(port)?;
            }
            if let Some(database) = database {
                spec.database = database.to_string();
            }
        }
    }

    tracing::debug!(
        "Parsed connect string: user={} server={} port={} database={}",
        spec.user,
        spec.server,
        spec.port,
        spec.database
    );

    Ok((spec, rest.to_string()))
}

fn parse_port(port: &str) -> DbmuxResult<u16> {
    match port.parse::<u16>() {
        Ok(0) => Err(DbmuxError::parse("Port must be a positive integer")),
        Ok(port) => Ok(port),
        Err(_) => Err(DbmuxError::parse(format!("Invalid port '{}'", port))),
    }
}
