/// Core abstractions: connect-string parsing, command classification,
/// session pooling, result normalization and the dispatcher tying them together
pub mod classify;
pub mod connect;
pub mod dispatcher;
pub mod normalize;
pub mod record;
pub mod session;

use std::fmt;

/// Default server used when a connect string omits it
pub const DEFAULT_SERVER: &str = "localhost";
/// Default binary-protocol port
pub const DEFAULT_PORT: u16 = 2424;

/// Pooling identity: `user@server` or `user@server/database`
pub type SessionKey = String;

/// Parsed connection intent for one invocation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectSpec {
    pub user: String,
    pub password: String,
    pub server: String,
    pub port: u16,
    pub database: String,
}

impl Default for ConnectSpec {
    fn default() -> Self {
        Self {
            user: String::new(),
            password: String::new(),
            server: DEFAULT_SERVER.to_string(),
            port: DEFAULT_PORT,
            database: String::new(),
        }
    }
}

impl ConnectSpec {
    /// Defaults with a configured server and port
    pub fn with_defaults(server: &str, port: u16) -> Self {
        Self {
            server: server.to_string(),
            port,
            ..Default::default()
        }
    }

    /// `user@server` when both parts are known
    pub fn server_key(&self) -> Option<SessionKey> {
        if self.user.is_empty() || self.server.is_empty() {
            return None;
        }
        Some(format!("{}@{}", self.user, self.server))
    }

    /// `user@server/database` when all three parts are known
    pub fn database_key(&self) -> Option<SessionKey> {
        if self.database.is_empty() {
            return None;
        }
        self.server_key()
            .map(|server_key| format!("{}/{}", server_key, self.database))
    }

    /// `server:port`, the transport address
    pub fn address(&self) -> String {
        format!("{}:{}", self.server, self.port)
    }
}

/// Pool a session lives in
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Scope {
    /// Authenticated against the server, no database bound
    Server,
    /// Bound to one open database
    Database,
}

impl fmt::Display for Scope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Scope::Server => write!(f, "server"),
            Scope::Database => write!(f, "database"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_connect_spec_defaults() {
        let spec = ConnectSpec::default();
        assert_eq!(spec.server, "localhost");
        assert_eq!(spec.port, 2424);
        assert!(spec.user.is_empty());
        assert!(spec.server_key().is_none());
        assert!(spec.database_key().is_none());
    }

    #[test]
    fn test_session_keys() {
        let spec = ConnectSpec {
            user: "admin".to_string(),
            password: "secret".to_string(),
            server: "db1".to_string(),
            port: 2424,
            database: "demo".to_string(),
        };

        assert_eq!(spec.server_key().as_deref(), Some("admin@db1"));
        assert_eq!(spec.database_key().as_deref(), Some("admin@db1/demo"));
        assert_eq!(spec.address(), "db1:2424");
    }

    #[test]
    fn test_database_key_requires_database() {
        let spec = ConnectSpec {
            user: "admin".to_string(),
            ..Default::default()
        };
        assert_eq!(spec.server_key().as_deref(), Some("admin@localhost"));
        assert!(spec.database_key().is_none());
    }
}
