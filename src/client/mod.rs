/// Database client capability consumed by the front-end
///
/// The wire protocol, authentication and query languages belong to the
/// client. The front-end only pools its connections and routes commands to
/// the entry point matching the command category.
pub mod memory;

use crate::core::record::{BackendRecord, BackendResult};
use crate::error::DbmuxResult;
use async_trait::async_trait;
use std::fmt;
use std::str::FromStr;

/// Storage engine requested when creating a database
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StorageMode {
    /// Persistent local storage (default)
    PLocal,
    /// Volatile in-memory storage
    Memory,
}

impl FromStr for StorageMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "plocal" => Ok(StorageMode::PLocal),
            "memory" => Ok(StorageMode::Memory),
            _ => Err(format!("Unknown storage mode '{}', expected plocal or memory", s)),
        }
    }
}

impl fmt::Display for StorageMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StorageMode::PLocal => write!(f, "plocal"),
            StorageMode::Memory => write!(f, "memory"),
        }
    }
}

/// Data model of a new database
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DatabaseType {
    Graph,
    Document,
}

impl FromStr for DatabaseType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "graph" => Ok(DatabaseType::Graph),
            "document" => Ok(DatabaseType::Document),
            _ => Err(format!("Unknown database type '{}', expected graph or document", s)),
        }
    }
}

impl fmt::Display for DatabaseType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DatabaseType::Graph => write!(f, "graph"),
            DatabaseType::Document => write!(f, "document"),
        }
    }
}

/// Backend capability: connections, execution entry points and administration.
///
/// Every method taking a connection gets exclusive access to it; the
/// session registry serializes use of each pooled handle.
#[async_trait]
pub trait DatabaseClient: Send + Sync + 'static {
    /// One logical connection to the server
    type Connection: Send + 'static;

    /// Open a transport and authenticate against the server
    async fn connect(
        &self,
        server: &str,
        port: u16,
        user: &str,
        password: &str,
    ) -> DbmuxResult<Self::Connection>;

    /// Bind an authenticated connection to one database
    async fn open_database(
        &self,
        connection: &mut Self::Connection,
        name: &str,
        user: &str,
        password: &str,
    ) -> DbmuxResult<()>;

    async fn execute_query(
        &self,
        connection: &mut Self::Connection,
        text: &str,
    ) -> DbmuxResult<Vec<BackendRecord>>;

    /// Fire-and-forget command path
    async fn execute_command(&self, connection: &mut Self::Connection, text: &str)
        -> DbmuxResult<()>;

    /// Graph traversal path; result-shape coercion is the client's concern
    async fn execute_traversal(
        &self,
        connection: &mut Self::Connection,
        text: &str,
    ) -> DbmuxResult<Vec<BackendResult>>;

    async fn list_databases(&self, connection: &mut Self::Connection) -> DbmuxResult<Vec<String>>;

    /// Schema class names of the open database
    async fn list_classes(&self, connection: &mut Self::Connection) -> DbmuxResult<Vec<String>>;

    async fn create_database(
        &self,
        connection: &mut Self::Connection,
        name: &str,
        storage: StorageMode,
        db_type: DatabaseType,
    ) -> DbmuxResult<()>;

    async fn drop_database(&self, connection: &mut Self::Connection, name: &str) -> DbmuxResult<()>;

    async fn close(&self, connection: &mut Self::Connection) -> DbmuxResult<()>;
}
