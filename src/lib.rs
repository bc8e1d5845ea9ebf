/// dbmux - session-multiplexing front-end for graph/document databases
///
/// Each invocation carries an optional connect string and a command. dbmux
/// keeps one pooled connection per identity at two scopes:
/// 1. Server scope: `user@server`, for listing, creating and dropping databases
/// 2. Database scope: `user@server/database`, for queries, traversals and commands
///
/// Invocations without a connect string reuse the most recently referenced
/// session of the scope they need. Results come back normalized, or are
/// rendered as JSON or a table.
pub mod client;
pub mod config;
pub mod core;
pub mod error;
pub mod render;
pub mod utils;

use crate::client::memory::{MemoryClient, MemoryServer};
use crate::client::DatabaseClient;
use crate::config::Config;
use crate::core::dispatcher::{DispatchDefaults, Dispatcher};
use crate::core::record::NormalizedResult;
use crate::core::session::TeardownReport;
use crate::error::{DbmuxError, DbmuxResult};
use crate::render::{DisplayMode, DEFAULT_FIELD_LIMIT};
use std::io::Write;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info};

/// Per-invocation options, validated once at the boundary
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InvocationOptions {
    pub display_as_json: bool,
    pub display_as_table: bool,
    pub table_field_limit: usize,
    pub use_graph_traversal: bool,
}

impl Default for InvocationOptions {
    fn default() -> Self {
        Self {
            display_as_json: false,
            display_as_table: false,
            table_field_limit: DEFAULT_FIELD_LIMIT,
            use_graph_traversal: false,
        }
    }
}

impl InvocationOptions {
    /// Create invocation options with validation
    pub fn new(
        display_as_json: bool,
        display_as_table: bool,
        table_field_limit: usize,
        use_graph_traversal: bool,
    ) -> DbmuxResult<Self> {
        if table_field_limit == 0 {
            return Err(DbmuxError::invalid_options(
                "Table field limit must be greater than 0",
            ));
        }

        Ok(Self {
            display_as_json,
            display_as_table,
            table_field_limit,
            use_graph_traversal,
        })
    }

    /// Options that return results instead of rendering them
    pub fn returning() -> Self {
        Self::default()
    }

    /// Rendering honors at most one mode; JSON wins
    pub fn display(&self) -> Option<DisplayMode> {
        if self.display_as_json {
            Some(DisplayMode::Json)
        } else if self.display_as_table {
            Some(DisplayMode::Table {
                field_limit: self.table_field_limit,
            })
        } else {
            None
        }
    }
}

/// Front-end instance owning the session registry for its lifetime
pub struct Dbmux<C: DatabaseClient> {
    dispatcher: Dispatcher<C>,
}

impl<C: DatabaseClient> Dbmux<C> {
    pub fn new(client: Arc<C>, defaults: DispatchDefaults) -> Self {
        Self {
            dispatcher: Dispatcher::new(client, defaults),
        }
    }

    pub fn dispatcher(&self) -> &Dispatcher<C> {
        &self.dispatcher
    }

    /// Run one invocation, rendering to stdout when a display mode is set.
    pub async fn run(
        &self,
        header: &str,
        body: &str,
        options: &InvocationOptions,
    ) -> DbmuxResult<Option<NormalizedResult>> {
        self.run_with_output(header, body, options, &mut std::io::stdout())
            .await
    }

    /// Run one invocation, rendering to `out` when a display mode is set.
    ///
    /// Returns the normalized result only when nothing was rendered.
    pub async fn run_with_output<W: Write>(
        &self,
        header: &str,
        body: &str,
        options: &InvocationOptions,
        out: &mut W,
    ) -> DbmuxResult<Option<NormalizedResult>> {
        let started = Instant::now();
        let input = format!("{}\n{}", header, body);
        let result = self
            .dispatcher
            .dispatch(&input, options.use_graph_traversal)
            .await?;
        debug!(
            "Invocation finished in {}",
            utils::format_duration(started.elapsed())
        );

        match (result, options.display()) {
            (Some(result), Some(mode)) => {
                render::render(&result, mode, out)?;
                Ok(None)
            }
            (result, _) => Ok(result),
        }
    }

    /// Close every pooled session; call once when the front-end goes away.
    pub async fn shutdown(&self) -> TeardownReport {
        self.dispatcher.shutdown().await
    }
}

impl Dbmux<MemoryClient> {
    /// Front-end over an in-process server built from configuration
    pub async fn from_config(config: &Config) -> DbmuxResult<Self> {
        config.validate()?;
        let defaults = config.dispatch_defaults()?;

        let server = config
            .backend
            .users
            .iter()
            .fold(MemoryServer::new(), |server, user| {
                server.with_user(&user.name, &user.password)
            });
        for name in &config.backend.seed_databases {
            server
                .create_database(name, defaults.storage, defaults.db_type)
                .await?;
        }
        info!(
            "Memory backend at {} with {} users and {} databases",
            defaults.connect.address(),
            config.backend.users.len(),
            config.backend.seed_databases.len()
        );

        let client = MemoryClient::new().with_server(
            &config.connection.server,
            config.connection.port,
            Arc::new(server),
        );
        Ok(Self::new(Arc::new(client), defaults))
    }
}
