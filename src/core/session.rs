/// Session registry: server-scope and database-scope connection pools
///
/// Each pool maps a session key to at most one logical connection and
/// remembers the most recently referenced key, used when an invocation
/// carries no connect string. Opening is serialized per key so concurrent
/// invocations on the same unopened key open exactly one connection, while
/// different keys proceed independently.
use super::{ConnectSpec, Scope, SessionKey};
use crate::client::DatabaseClient;
use crate::error::{DbmuxError, DbmuxResult};
use futures::future::join_all;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, info, warn};

/// A pooled connection; the mutex serializes commands on the handle
pub type SharedConnection<T> = Arc<Mutex<T>>;

type Slot<T> = Arc<Mutex<Option<SharedConnection<T>>>>;

/// One close that failed during teardown
#[derive(Debug)]
pub struct CloseFailure {
    pub key: SessionKey,
    pub scope: Scope,
    pub error: DbmuxError,
}

/// Outcome of [`SessionRegistry::close_all`]
#[derive(Debug, Default)]
pub struct TeardownReport {
    pub closed: usize,
    pub failures: Vec<CloseFailure>,
}

impl TeardownReport {
    pub fn is_clean(&self) -> bool {
        self.failures.is_empty()
    }
}

struct Pool<T> {
    scope: Scope,
    slots: RwLock<HashMap<SessionKey, Slot<T>>>,
    last_key: RwLock<SessionKey>,
}

impl<T> Pool<T> {
    fn new(scope: Scope) -> Self {
        Self {
            scope,
            slots: RwLock::new(HashMap::new()),
            last_key: RwLock::new(String::new()),
        }
    }

    /// Get or create the slot for a key
    async fn slot(&self, key: &str) -> Slot<T> {
        if let Some(slot) = self.slots.read().await.get(key) {
            return Arc::clone(slot);
        }
        let mut slots = self.slots.write().await;
        Arc::clone(
            slots
                .entry(key.to_string())
                .or_insert_with(|| Arc::new(Mutex::new(None))),
        )
    }

    /// Whether `slot` is still the pooled slot for `key`
    async fn is_current(&self, key: &str, slot: &Slot<T>) -> bool {
        self.slots
            .read()
            .await
            .get(key)
            .map(|current| Arc::ptr_eq(current, slot))
            .unwrap_or(false)
    }

    /// Drop a slot that never got a connection, unless it was replaced
    async fn discard(&self, key: &str, slot: &Slot<T>) {
        let mut slots = self.slots.write().await;
        if slots
            .get(key)
            .map(|current| Arc::ptr_eq(current, slot))
            .unwrap_or(false)
        {
            slots.remove(key);
        }
    }

    async fn resolve(&self, explicit: Option<SessionKey>) -> SessionKey {
        let mut last_key = self.last_key.write().await;
        if let Some(key) = explicit {
            *last_key = key;
        }
        last_key.clone()
    }

    async fn get(&self, key: &str) -> Option<SharedConnection<T>> {
        let slot = self.slots.read().await.get(key).cloned()?;
        let guard = slot.lock().await;
        guard.clone()
    }

    async fn keys(&self) -> Vec<SessionKey> {
        let slots: Vec<(SessionKey, Slot<T>)> = self
            .slots
            .read()
            .await
            .iter()
            .map(|(key, slot)| (key.clone(), Arc::clone(slot)))
            .collect();

        let mut keys = Vec::new();
        for (key, slot) in slots {
            if slot.lock().await.is_some() {
                keys.push(key);
            }
        }
        keys.sort();
        keys
    }

    /// Remove a key, returning its connection if one was open
    async fn take(&self, key: &str) -> Option<SharedConnection<T>> {
        let slot = self.slots.write().await.remove(key)?;
        let connection = slot.lock().await.take();

        let mut last_key = self.last_key.write().await;
        if *last_key == key {
            last_key.clear();
        }
        connection
    }

    async fn drain(&self) -> Vec<(SessionKey, SharedConnection<T>)> {
        let slots: Vec<(SessionKey, Slot<T>)> = self.slots.write().await.drain().collect();
        self.last_key.write().await.clear();

        let mut connections = Vec::new();
        for (key, slot) in slots {
            if let Some(connection) = slot.lock().await.take() {
                connections.push((key, connection));
            }
        }
        connections
    }
}

/// Dual-level connection pool owned by one front-end instance
pub struct SessionRegistry<C: DatabaseClient> {
    client: Arc<C>,
    servers: Pool<C::Connection>,
    databases: Pool<C::Connection>,
}

impl<C: DatabaseClient> SessionRegistry<C> {
    pub fn new(client: Arc<C>) -> Self {
        Self {
            client,
            servers: Pool::new(Scope::Server),
            databases: Pool::new(Scope::Database),
        }
    }

    pub fn client(&self) -> &Arc<C> {
        &self.client
    }

    fn pool(&self, scope: Scope) -> &Pool<C::Connection> {
        match scope {
            Scope::Server => &self.servers,
            Scope::Database => &self.databases,
        }
    }

    /// `user@server` when the spec names both, else the last server key
    /// (empty if none established yet).
    pub async fn resolve_server_key(&self, spec: &ConnectSpec) -> SessionKey {
        self.servers.resolve(spec.server_key()).await
    }

    /// `user@server/database` when the spec names all three, else the last
    /// database key (empty if none established yet).
    pub async fn resolve_database_key(&self, spec: &ConnectSpec) -> SessionKey {
        self.databases.resolve(spec.database_key()).await
    }

    /// Most recently referenced key of a pool
    pub async fn last_key(&self, scope: Scope) -> SessionKey {
        self.pool(scope).last_key.read().await.clone()
    }

    /// Pooled server connection for `key`, opening it from `spec` if absent.
    pub async fn get_or_open_server(
        &self,
        key: &str,
        spec: &ConnectSpec,
    ) -> DbmuxResult<SharedConnection<C::Connection>> {
        if key.is_empty() {
            return Err(DbmuxError::NoServerSession);
        }
        self.get_or_open(Scope::Server, key, spec).await
    }

    /// Pooled database connection for `key`, opening it and the named
    /// database from `spec` if absent.
    pub async fn get_or_open_database(
        &self,
        key: &str,
        spec: &ConnectSpec,
    ) -> DbmuxResult<SharedConnection<C::Connection>> {
        if key.is_empty() {
            return Err(DbmuxError::NoDatabaseSession);
        }
        self.get_or_open(Scope::Database, key, spec).await
    }

    async fn get_or_open(
        &self,
        scope: Scope,
        key: &str,
        spec: &ConnectSpec,
    ) -> DbmuxResult<SharedConnection<C::Connection>> {
        let pool = self.pool(scope);

        loop {
            let slot = pool.slot(key).await;
            let mut guard = slot.lock().await;

            // Closed while we waited; start over with a fresh slot.
            if !pool.is_current(key, &slot).await {
                continue;
            }

            if let Some(connection) = guard.as_ref() {
                debug!("Reusing {} session {}", scope, key);
                return Ok(Arc::clone(connection));
            }

            let connection = match self.open(scope, key, spec).await {
                Ok(connection) => connection,
                Err(e) => {
                    // Waiters on this slot see it is no longer current and retry.
                    pool.discard(key, &slot).await;
                    return Err(e);
                }
            };
            let connection = Arc::new(Mutex::new(connection));
            *guard = Some(Arc::clone(&connection));
            info!("Opened {} session {} ({})", scope, key, spec.address());
            return Ok(connection);
        }
    }

    async fn open(
        &self,
        scope: Scope,
        key: &str,
        spec: &ConnectSpec,
    ) -> DbmuxResult<C::Connection> {
        if spec.user.is_empty() || spec.server.is_empty() {
            // Inherited key whose connection was never opened here.
            return Err(match scope {
                Scope::Server => DbmuxError::NoServerSession,
                Scope::Database => DbmuxError::NoDatabaseSession,
            });
        }

        if scope == Scope::Database && spec.database.is_empty() {
            return Err(DbmuxError::NoDatabaseSession);
        }

        let mut connection = self
            .client
            .connect(&spec.server, spec.port, &spec.user, &spec.password)
            .await?;

        if scope == Scope::Database {
            if let Err(e) = self
                .client
                .open_database(&mut connection, &spec.database, &spec.user, &spec.password)
                .await
            {
                if let Err(close_error) = self.client.close(&mut connection).await {
                    warn!("Failed to close half-open session {}: {}", key, close_error);
                }
                return Err(e);
            }
        }

        Ok(connection)
    }

    /// Pooled connection without opening
    pub async fn get(&self, key: &str, scope: Scope) -> Option<SharedConnection<C::Connection>> {
        self.pool(scope).get(key).await
    }

    pub async fn contains(&self, key: &str, scope: Scope) -> bool {
        self.get(key, scope).await.is_some()
    }

    /// Open keys of a pool, sorted
    pub async fn keys(&self, scope: Scope) -> Vec<SessionKey> {
        self.pool(scope).keys().await
    }

    /// Remove and close the connection for `key`.
    pub async fn close(&self, key: &str, scope: Scope) -> DbmuxResult<()> {
        let connection = self
            .pool(scope)
            .take(key)
            .await
            .ok_or_else(|| DbmuxError::not_connected(key))?;

        let mut connection = connection.lock().await;
        self.client.close(&mut connection).await?;
        info!("Closed {} session {}", scope, key);
        Ok(())
    }

    /// Best-effort close of every pooled connection in both pools.
    ///
    /// Failures are collected in the report and logged, never raised.
    pub async fn close_all(&self) -> TeardownReport {
        let mut pending = Vec::new();
        for pool in [&self.servers, &self.databases] {
            for (key, connection) in pool.drain().await {
                pending.push((pool.scope, key, connection));
            }
        }

        let client = &self.client;
        let outcomes = join_all(pending.into_iter().map(|(scope, key, connection)| async move {
            let mut connection = connection.lock().await;
            let result = client.close(&mut connection).await;
            (scope, key, result)
        }))
        .await;

        let mut report = TeardownReport::default();
        for (scope, key, result) in outcomes {
            match result {
                Ok(()) => report.closed += 1,
                Err(error) => {
                    warn!("Failed to close {} session {}: {}", scope, key, error);
                    report.failures.push(CloseFailure { key, scope, error });
                }
            }
        }

        info!(
            "Teardown closed {} sessions ({} failures)",
            report.closed,
            report.failures.len()
        );
        report
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::memory::{MemoryClient, MemoryServer};
    use crate::client::{DatabaseType, StorageMode};

    fn spec(user: &str, password: &str, server: &str, database: &str) -> ConnectSpec {
        ConnectSpec {
            user: user.to_string(),
            password: password.to_string(),
            server: server.to_string(),
            port: 2424,
            database: database.to_string(),
        }
    }

    async fn registry() -> (SessionRegistry<MemoryClient>, Arc<MemoryServer>) {
        let server = Arc::new(MemoryServer::new().with_user("u", "p"));
        server
            .create_database("mydb", StorageMode::Memory, DatabaseType::Graph)
            .await
            .unwrap();
        let client = MemoryClient::new().with_server("localhost", 2424, Arc::clone(&server));
        (SessionRegistry::new(Arc::new(client)), server)
    }

    #[tokio::test]
    async fn test_resolve_keys_and_fallback() {
        let (registry, _) = registry().await;

        assert_eq!(registry.resolve_server_key(&ConnectSpec::default()).await, "");
        assert_eq!(registry.resolve_database_key(&ConnectSpec::default()).await, "");

        let explicit = spec("u", "p", "localhost", "mydb");
        assert_eq!(registry.resolve_server_key(&explicit).await, "u@localhost");
        assert_eq!(registry.resolve_database_key(&explicit).await, "u@localhost/mydb");

        // No identity: fall back to the last keys
        assert_eq!(registry.resolve_server_key(&ConnectSpec::default()).await, "u@localhost");
        assert_eq!(
            registry.resolve_database_key(&ConnectSpec::default()).await,
            "u@localhost/mydb"
        );

        // A server-only spec moves the server pointer, not the database one
        let other = spec("admin", "", "localhost", "");
        assert_eq!(registry.resolve_server_key(&other).await, "admin@localhost");
        assert_eq!(registry.resolve_database_key(&other).await, "u@localhost/mydb");
    }

    #[tokio::test]
    async fn test_same_key_shares_connection() {
        let (registry, server) = registry().await;
        let spec = spec("u", "p", "localhost", "mydb");
        let key = registry.resolve_database_key(&spec).await;

        let first = registry.get_or_open_database(&key, &spec).await.unwrap();
        let second = registry.get_or_open_database(&key, &spec).await.unwrap();

        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(server.connection_count(), 1);
    }

    #[tokio::test]
    async fn test_reopen_after_close_is_new_connection() {
        let (registry, server) = registry().await;
        let spec = spec("u", "p", "localhost", "mydb");
        let key = registry.resolve_database_key(&spec).await;

        let first = registry.get_or_open_database(&key, &spec).await.unwrap();
        registry.close(&key, Scope::Database).await.unwrap();
        assert!(!registry.contains(&key, Scope::Database).await);
        assert_eq!(registry.last_key(Scope::Database).await, "");

        let key = registry.resolve_database_key(&spec).await;
        let second = registry.get_or_open_database(&key, &spec).await.unwrap();
        assert!(!Arc::ptr_eq(&first, &second));
        assert_eq!(server.connection_count(), 2);
    }

    #[tokio::test]
    async fn test_close_unknown_key() {
        let (registry, _) = registry().await;
        let result = registry.close("nobody@localhost", Scope::Server).await;
        assert!(matches!(result, Err(DbmuxError::NotConnected { .. })));
    }

    #[tokio::test]
    async fn test_close_keeps_other_last_key() {
        let (registry, _) = registry().await;
        let a = spec("u", "p", "localhost", "mydb");
        let key_a = registry.resolve_server_key(&a).await;
        registry.get_or_open_server(&key_a, &a).await.unwrap();

        let b = spec("u", "p", "127.0.0.1", "");
        let key_b = registry.resolve_server_key(&b).await;
        assert_eq!(key_b, "u@127.0.0.1");

        // Closing a key that is not the last one leaves the pointer alone
        registry.close(&key_a, Scope::Server).await.unwrap();
        assert_eq!(registry.last_key(Scope::Server).await, "u@127.0.0.1");
    }

    #[tokio::test]
    async fn test_failed_open_is_not_stored() {
        let (registry, _) = registry().await;

        let bad_password = spec("u", "wrong", "localhost", "mydb");
        let key = registry.resolve_database_key(&bad_password).await;
        let result = registry.get_or_open_database(&key, &bad_password).await;
        assert!(matches!(result, Err(DbmuxError::Connection { .. })));
        assert!(!registry.contains(&key, Scope::Database).await);
        assert!(registry.keys(Scope::Database).await.is_empty());
        assert!(registry.databases.slots.read().await.is_empty());

        let missing_db = spec("u", "p", "localhost", "nope");
        let key = registry.resolve_database_key(&missing_db).await;
        let result = registry.get_or_open_database(&key, &missing_db).await;
        assert!(matches!(result, Err(DbmuxError::Connection { .. })));
        assert!(!registry.contains(&key, Scope::Database).await);

        assert!(registry.databases.slots.read().await.is_empty());

        // The same key succeeds once the input is corrected
        let good = spec("u", "p", "localhost", "mydb");
        let key = registry.resolve_database_key(&good).await;
        registry.get_or_open_database(&key, &good).await.unwrap();
        assert!(registry.contains(&key, Scope::Database).await);
    }

    #[tokio::test]
    async fn test_failed_opens_do_not_accumulate() {
        let (registry, _) = registry().await;

        for i in 0..100 {
            let bad = spec("u", "wrong", "localhost", &format!("db{}", i));
            let key = registry.resolve_database_key(&bad).await;
            assert!(registry.get_or_open_database(&key, &bad).await.is_err());

            let key = registry.resolve_server_key(&bad).await;
            assert!(registry.get_or_open_server(&key, &bad).await.is_err());
        }

        assert!(registry.databases.slots.read().await.is_empty());
        assert!(registry.servers.slots.read().await.is_empty());
    }

    #[tokio::test]
    async fn test_empty_key_has_no_session() {
        let (registry, _) = registry().await;
        let defaults = ConnectSpec::default();

        let result = registry.get_or_open_server("", &defaults).await;
        assert!(matches!(result, Err(DbmuxError::NoServerSession)));

        let result = registry.get_or_open_database("", &defaults).await;
        assert!(matches!(result, Err(DbmuxError::NoDatabaseSession)));
    }

    #[tokio::test]
    async fn test_concurrent_open_same_key_opens_once() {
        let (registry, server) = registry().await;
        let registry = Arc::new(registry);
        let spec = spec("u", "p", "localhost", "mydb");
        let key = registry.resolve_database_key(&spec).await;

        let mut handles = Vec::new();
        for _ in 0..8 {
            let registry = Arc::clone(&registry);
            let spec = spec.clone();
            let key = key.clone();
            handles.push(tokio::spawn(async move {
                registry.get_or_open_database(&key, &spec).await.unwrap()
            }));
        }

        let mut connections = Vec::new();
        for handle in handles {
            connections.push(handle.await.unwrap());
        }

        assert!(connections.windows(2).all(|w| Arc::ptr_eq(&w[0], &w[1])));
        assert_eq!(server.connection_count(), 1);
    }

    #[tokio::test]
    async fn test_close_all_collects_everything() {
        let (registry, server) = registry().await;

        let db = spec("u", "p", "localhost", "mydb");
        let db_key = registry.resolve_database_key(&db).await;
        registry.get_or_open_database(&db_key, &db).await.unwrap();

        let srv_key = registry.resolve_server_key(&db).await;
        registry.get_or_open_server(&srv_key, &db).await.unwrap();
        assert_eq!(server.connection_count(), 2);

        let report = registry.close_all().await;
        assert_eq!(report.closed, 2);
        assert!(report.is_clean());
        assert!(registry.keys(Scope::Server).await.is_empty());
        assert!(registry.keys(Scope::Database).await.is_empty());
        assert_eq!(registry.last_key(Scope::Server).await, "");
        assert_eq!(server.connection_count(), 0);
    }

    #[tokio::test]
    async fn test_close_all_reports_failures() {
        let (registry, server) = registry().await;

        let db = spec("u", "p", "localhost", "mydb");
        let db_key = registry.resolve_database_key(&db).await;
        registry.get_or_open_database(&db_key, &db).await.unwrap();
        let srv_key = registry.resolve_server_key(&db).await;
        registry.get_or_open_server(&srv_key, &db).await.unwrap();

        server.fail_closes(true);
        let report = registry.close_all().await;

        assert_eq!(report.closed, 0);
        assert_eq!(report.failures.len(), 2);
        assert!(registry.keys(Scope::Database).await.is_empty());
    }
}
