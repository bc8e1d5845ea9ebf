/// Dispatcher: one invocation from raw input to a normalized result
///
/// Parse the connect string, resolve both session keys, classify the
/// remainder, open the session the command needs, execute it on the matching
/// backend entry point and normalize what comes back. Rendering is left to
/// the caller.
use super::classify::{classify, CommandCategory, ControlCommand};
use super::connect::parse_with_defaults;
use super::normalize::normalize_many;
use super::record::{BackendResult, NormalizedResult, NormalizedValue};
use super::session::{SessionRegistry, SharedConnection, TeardownReport};
use super::{ConnectSpec, Scope, SessionKey};
use crate::client::{DatabaseClient, DatabaseType, StorageMode};
use crate::error::{DbmuxError, DbmuxResult};
use std::sync::Arc;
use tracing::{debug, info};

/// Defaults applied when an invocation leaves something unspecified
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DispatchDefaults {
    /// Server and port for connect strings that omit them
    pub connect: ConnectSpec,
    /// Storage mode for `create database` without one
    pub storage: StorageMode,
    /// Database type for `create database` without one
    pub db_type: DatabaseType,
}

impl Default for DispatchDefaults {
    fn default() -> Self {
        Self {
            connect: ConnectSpec::default(),
            storage: StorageMode::PLocal,
            db_type: DatabaseType::Graph,
        }
    }
}

/// Keys resolved for one invocation
struct Resolved {
    spec: ConnectSpec,
    server_key: SessionKey,
    database_key: SessionKey,
}

pub struct Dispatcher<C: DatabaseClient> {
    registry: SessionRegistry<C>,
    defaults: DispatchDefaults,
}

impl<C: DatabaseClient> Dispatcher<C> {
    pub fn new(client: Arc<C>, defaults: DispatchDefaults) -> Self {
        Self {
            registry: SessionRegistry::new(client),
            defaults,
        }
    }

    pub fn registry(&self) -> &SessionRegistry<C> {
        &self.registry
    }

    /// Run one invocation; `Ok(None)` when the command produces no value.
    pub async fn dispatch(
        &self,
        input: &str,
        use_graph_traversal: bool,
    ) -> DbmuxResult<Option<NormalizedResult>> {
        let (spec, remainder) = parse_with_defaults(input, &self.defaults.connect)?;

        let resolved = Resolved {
            server_key: self.registry.resolve_server_key(&spec).await,
            database_key: self.registry.resolve_database_key(&spec).await,
            spec,
        };

        if remainder.is_empty() {
            self.establish(&resolved).await?;
            return Ok(None);
        }

        let category = classify(&remainder, use_graph_traversal);
        debug!(
            "Classified as {} (server: '{}', database: '{}')",
            category.name(),
            resolved.server_key,
            resolved.database_key
        );

        match category {
            CommandCategory::Control(control) => self.control(control, &resolved).await,
            CommandCategory::GraphTraversal => {
                let connection = self.database_session(&resolved).await?;
                let mut connection = connection.lock().await;
                let results = self
                    .registry
                    .client()
                    .execute_traversal(&mut connection, &remainder)
                    .await?;
                Ok(Some(NormalizedResult::Sequence(normalize_many(&results))))
            }
            CommandCategory::Query => {
                let connection = self.database_session(&resolved).await?;
                let mut connection = connection.lock().await;
                let records = self
                    .registry
                    .client()
                    .execute_query(&mut connection, &remainder)
                    .await?;
                let results: Vec<BackendResult> =
                    records.into_iter().map(BackendResult::Record).collect();
                Ok(Some(NormalizedResult::Sequence(normalize_many(&results))))
            }
            CommandCategory::GenericCommand => {
                let connection = self.database_session(&resolved).await?;
                let mut connection = connection.lock().await;
                self.registry
                    .client()
                    .execute_command(&mut connection, &remainder)
                    .await?;
                Ok(None)
            }
        }
    }

    /// Connect-string-only invocation: open what the string names
    async fn establish(&self, resolved: &Resolved) -> DbmuxResult<()> {
        if resolved.spec.server_key().is_some() {
            self.server_session(resolved).await?;
        }
        if resolved.spec.database_key().is_some() {
            self.database_session(resolved).await?;
        }
        Ok(())
    }

    async fn server_session(
        &self,
        resolved: &Resolved,
    ) -> DbmuxResult<SharedConnection<C::Connection>> {
        self.registry
            .get_or_open_server(&resolved.server_key, &resolved.spec)
            .await
    }

    async fn database_session(
        &self,
        resolved: &Resolved,
    ) -> DbmuxResult<SharedConnection<C::Connection>> {
        self.registry
            .get_or_open_database(&resolved.database_key, &resolved.spec)
            .await
    }

    async fn control(
        &self,
        control: ControlCommand,
        resolved: &Resolved,
    ) -> DbmuxResult<Option<NormalizedResult>> {
        let client = self.registry.client();

        match control {
            ControlCommand::CurrentServer => {
                self.server_session(resolved).await?;
                Ok(Some(key_result(&resolved.server_key)))
            }
            ControlCommand::CurrentDatabase => {
                self.database_session(resolved).await?;
                Ok(Some(key_result(&resolved.database_key)))
            }
            ControlCommand::Disconnect => {
                if resolved.database_key.is_empty() {
                    return Err(DbmuxError::NoDatabaseSession);
                }
                self.registry.close(&resolved.database_key, Scope::Database).await?;
                Ok(None)
            }
            ControlCommand::ListDatabases => {
                let connection = self.server_session(resolved).await?;
                let mut connection = connection.lock().await;
                let names = client.list_databases(&mut connection).await?;
                Ok(Some(string_sequence(names)))
            }
            ControlCommand::ListClasses => {
                let connection = self.database_session(resolved).await?;
                let mut connection = connection.lock().await;
                let names = client.list_classes(&mut connection).await?;
                Ok(Some(string_sequence(names)))
            }
            ControlCommand::DropDatabase { name } => {
                let connection = self.server_session(resolved).await?;
                let mut connection = connection.lock().await;
                client.drop_database(&mut connection, &name).await?;
                info!("Dropped database {} via {}", name, resolved.server_key);
                Ok(None)
            }
            ControlCommand::CreateDatabase {
                name,
                storage,
                db_type,
            } => {
                let storage = match storage {
                    Some(storage) => storage.parse().map_err(DbmuxError::execution)?,
                    None => self.defaults.storage,
                };
                let db_type = match db_type {
                    Some(db_type) => db_type.parse().map_err(DbmuxError::execution)?,
                    None => self.defaults.db_type,
                };

                let connection = self.server_session(resolved).await?;
                let mut connection = connection.lock().await;
                client
                    .create_database(&mut connection, &name, storage, db_type)
                    .await?;
                info!(
                    "Created {} {} database {} via {}",
                    storage, db_type, name, resolved.server_key
                );
                Ok(None)
            }
        }
    }

    /// Close every pooled session in both scopes
    pub async fn shutdown(&self) -> TeardownReport {
        self.registry.close_all().await
    }
}

fn key_result(key: &str) -> NormalizedResult {
    NormalizedResult::Scalar(NormalizedValue::String(key.to_string()))
}

fn string_sequence(mut names: Vec<String>) -> NormalizedResult {
    names.sort();
    NormalizedResult::Sequence(
        names
            .into_iter()
            .map(|name| NormalizedResult::Scalar(NormalizedValue::String(name)))
            .collect(),
    )
}
