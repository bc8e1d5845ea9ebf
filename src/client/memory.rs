/// In-process reference backend
///
/// Hosts graph/document databases in memory behind the `DatabaseClient`
/// capability, so the front-end can be driven end to end without a network
/// server. Supports a small statement set:
/// - `create class <Name>`, `insert into <Class> set k = v, ...`, `delete from <Class>`
/// - `select from <Class|#c:p> [where <field> = <literal>]`
/// - `g.V()`, `g.E()`, `g.V('#c:p')`, `g.V().count()`, `g.E().count()`
use super::{DatabaseClient, DatabaseType, StorageMode};
use crate::core::record::{BackendRecord, BackendResult, BackendValue, RecordId};
use crate::error::{DbmuxError, DbmuxResult};
use crate::utils::generate_id;
use async_trait::async_trait;
use bytes::Bytes;
use lazy_static::lazy_static;
use regex::Regex;
use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::debug;

lazy_static! {
    static ref SELECT: Regex =
        Regex::new(r"(?s)^select\s+from\s+(\S+)(?:\s+where\s+(\w+)\s*=\s*(.+?))?\s*$")
            .expect("Failed to compile select pattern");
    static ref CREATE_CLASS: Regex = Regex::new(r"^create\s+class\s+(\w+)\s*$")
        .expect("Failed to compile create class pattern");
    static ref INSERT: Regex = Regex::new(r"(?s)^insert\s+into\s+(\w+)\s+set\s+(.+)$")
        .expect("Failed to compile insert pattern");
    static ref DELETE: Regex = Regex::new(r"^delete\s+from\s+(\w+)\s*$")
        .expect("Failed to compile delete pattern");
    static ref TRAVERSAL: Regex =
        Regex::new(r"^g\.(V|E)\((?:'(#-?\d+:\d+)')?\)(\.count\(\))?$")
            .expect("Failed to compile traversal pattern");
}

/// First cluster id handed to user classes
const FIRST_CLUSTER: i16 = 9;

#[derive(Debug)]
struct MemoryClass {
    cluster: i16,
    next_position: i64,
    records: BTreeMap<i64, BackendRecord>,
}

#[derive(Debug)]
struct MemoryDatabase {
    storage: StorageMode,
    db_type: DatabaseType,
    next_cluster: i16,
    classes: BTreeMap<String, MemoryClass>,
}

impl MemoryDatabase {
    fn new(storage: StorageMode, db_type: DatabaseType) -> Self {
        let mut database = Self {
            storage,
            db_type,
            next_cluster: FIRST_CLUSTER,
            classes: BTreeMap::new(),
        };
        if db_type == DatabaseType::Graph {
            // Graph databases come with the base vertex and edge classes
            let _ = database.create_class("V");
            let _ = database.create_class("E");
        }
        database
    }

    fn create_class(&mut self, name: &str) -> DbmuxResult<()> {
        if self.classes.contains_key(name) {
            return Err(DbmuxError::execution(format!("Class '{}' already exists", name)));
        }
        let cluster = self.next_cluster;
        self.next_cluster = cluster
            .checked_add(1)
            .ok_or_else(|| DbmuxError::execution("No cluster ids left for a new class"))?;
        self.classes.insert(
            name.to_string(),
            MemoryClass {
                cluster,
                next_position: 0,
                records: BTreeMap::new(),
            },
        );
        Ok(())
    }

    fn class(&self, name: &str) -> DbmuxResult<&MemoryClass> {
        self.classes
            .get(name)
            .ok_or_else(|| DbmuxError::execution(format!("Class '{}' not found", name)))
    }

    fn insert(
        &mut self,
        class: &str,
        properties: BTreeMap<String, BackendValue>,
    ) -> DbmuxResult<RecordId> {
        let entry = self
            .classes
            .get_mut(class)
            .ok_or_else(|| DbmuxError::execution(format!("Class '{}' not found", class)))?;

        let rid = RecordId::new(entry.cluster, entry.next_position);
        entry.next_position += 1;
        entry.records.insert(
            rid.position,
            BackendRecord {
                class: class.to_string(),
                rid: Some(rid),
                version: 1,
                properties,
            },
        );
        Ok(rid)
    }

    fn record(&self, rid: RecordId) -> Option<&BackendRecord> {
        self.classes
            .values()
            .find(|class| class.cluster == rid.cluster)
            .and_then(|class| class.records.get(&rid.position))
    }
}

/// One simulated server with its users and databases
pub struct MemoryServer {
    users: HashMap<String, String>,
    databases: RwLock<BTreeMap<String, MemoryDatabase>>,
    open_connections: AtomicUsize,
    fail_closes: AtomicBool,
}

impl Default for MemoryServer {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryServer {
    pub fn new() -> Self {
        Self {
            users: HashMap::new(),
            databases: RwLock::new(BTreeMap::new()),
            open_connections: AtomicUsize::new(0),
            fail_closes: AtomicBool::new(false),
        }
    }

    /// Register credentials accepted by `connect` and `open_database`
    pub fn with_user(mut self, name: &str, password: &str) -> Self {
        self.users.insert(name.to_string(), password.to_string());
        self
    }

    /// Number of connections opened and not yet closed
    pub fn connection_count(&self) -> usize {
        self.open_connections.load(Ordering::SeqCst)
    }

    /// Make every subsequent close fail, for teardown testing
    pub fn fail_closes(&self, fail: bool) {
        self.fail_closes.store(fail, Ordering::SeqCst);
    }

    fn authenticate(&self, user: &str, password: &str) -> DbmuxResult<()> {
        match self.users.get(user) {
            Some(expected) if expected == password => Ok(()),
            _ => Err(DbmuxError::connection(format!(
                "Authentication failed for user '{}'",
                user
            ))),
        }
    }

    pub async fn create_database(
        &self,
        name: &str,
        storage: StorageMode,
        db_type: DatabaseType,
    ) -> DbmuxResult<()> {
        let mut databases = self.databases.write().await;
        if databases.contains_key(name) {
            return Err(DbmuxError::execution(format!("Database '{}' already exists", name)));
        }
        databases.insert(name.to_string(), MemoryDatabase::new(storage, db_type));
        debug!("Created {} {} database {}", storage, db_type, name);
        Ok(())
    }

    pub async fn drop_database(&self, name: &str) -> DbmuxResult<()> {
        self.databases
            .write()
            .await
            .remove(name)
            .map(|_| ())
            .ok_or_else(|| DbmuxError::execution(format!("Database '{}' not found", name)))
    }

    pub async fn database_names(&self) -> Vec<String> {
        self.databases.read().await.keys().cloned().collect()
    }

    /// Storage mode and type of a database, if it exists
    pub async fn database_info(&self, name: &str) -> Option<(StorageMode, DatabaseType)> {
        self.databases
            .read()
            .await
            .get(name)
            .map(|db| (db.storage, db.db_type))
    }
}

/// Client addressing memory servers by `server:port`
#[derive(Default)]
pub struct MemoryClient {
    servers: HashMap<String, Arc<MemoryServer>>,
}

/// Connection handle of the memory backend
#[derive(Debug)]
pub struct MemoryConnection {
    pub id: String,
    address: String,
    database: Option<String>,
    closed: bool,
}

impl MemoryClient {
    pub fn new() -> Self {
        Self::default()
    }

    /// Expose `server` at `host:port`
    pub fn with_server(mut self, host: &str, port: u16, server: Arc<MemoryServer>) -> Self {
        self.servers.insert(format!("{}:{}", host, port), server);
        self
    }

    fn server_for(&self, connection: &MemoryConnection) -> DbmuxResult<&Arc<MemoryServer>> {
        if connection.closed {
            return Err(DbmuxError::execution(format!(
                "Connection {} is closed",
                connection.id
            )));
        }
        self.servers
            .get(&connection.address)
            .ok_or_else(|| {
                DbmuxError::execution(format!("Server {} went away", connection.address))
            })
    }

    fn database_name(connection: &MemoryConnection) -> DbmuxResult<&str> {
        connection
            .database
            .as_deref()
            .ok_or_else(|| DbmuxError::execution("No database open on this connection"))
    }
}

#[async_trait]
impl DatabaseClient for MemoryClient {
    type Connection = MemoryConnection;

    async fn connect(
        &self,
        server: &str,
        port: u16,
        user: &str,
        password: &str,
    ) -> DbmuxResult<MemoryConnection> {
        let address = format!("{}:{}", server, port);
        let backend = self
            .servers
            .get(&address)
            .ok_or_else(|| DbmuxError::connection(format!("Connection refused: {}", address)))?;
        backend.authenticate(user, password)?;
        backend.open_connections.fetch_add(1, Ordering::SeqCst);

        let connection = MemoryConnection {
            id: generate_id("conn"),
            address,
            database: None,
            closed: false,
        };
        debug!("Memory connection {} opened to {}", connection.id, connection.address);
        Ok(connection)
    }

    async fn open_database(
        &self,
        connection: &mut MemoryConnection,
        name: &str,
        user: &str,
        password: &str,
    ) -> DbmuxResult<()> {
        let backend = self
            .server_for(connection)
            .map_err(|e| DbmuxError::connection(e.to_string()))?;
        backend.authenticate(user, password)?;
        if !backend.databases.read().await.contains_key(name) {
            return Err(DbmuxError::connection(format!("Database '{}' not found", name)));
        }
        connection.database = Some(name.to_string());
        Ok(())
    }

    async fn execute_query(
        &self,
        connection: &mut MemoryConnection,
        text: &str,
    ) -> DbmuxResult<Vec<BackendRecord>> {
        let backend = self.server_for(connection)?;
        let name = Self::database_name(connection)?;
        let databases = backend.databases.read().await;
        let database = find_database(&databases, name)?;

        let caps = SELECT
            .captures(text.trim())
            .ok_or_else(|| DbmuxError::execution(format!("Unsupported query: {}", text.trim())))?;
        let target = &caps[1];

        let filter = match (caps.get(2), caps.get(3)) {
            (Some(field), Some(literal)) => Some((
                field.as_str(),
                parse_literal(literal.as_str()).map_err(DbmuxError::execution)?,
            )),
            _ => None,
        };

        let candidates: Vec<&BackendRecord> = if target.starts_with('#') {
            let rid: RecordId = target.parse().map_err(DbmuxError::execution)?;
            database.record(rid).into_iter().collect()
        } else {
            database.class(target)?.records.values().collect()
        };

        Ok(candidates
            .into_iter()
            .filter(|record| match &filter {
                Some((field, expected)) => record.properties.get(*field) == Some(expected),
                None => true,
            })
            .cloned()
            .collect())
    }

    async fn execute_command(
        &self,
        connection: &mut MemoryConnection,
        text: &str,
    ) -> DbmuxResult<()> {
        let backend = self.server_for(connection)?;
        let name = Self::database_name(connection)?;
        let mut databases = backend.databases.write().await;
        let database = databases
            .get_mut(name)
            .ok_or_else(|| DbmuxError::execution(format!("Database '{}' not found", name)))?;
        let text = text.trim();

        if let Some(caps) = CREATE_CLASS.captures(text) {
            return database.create_class(&caps[1]);
        }

        if let Some(caps) = INSERT.captures(text) {
            let properties = parse_assignments(&caps[2]).map_err(DbmuxError::execution)?;
            let rid = database.insert(&caps[1], properties)?;
            debug!("Inserted {} into {}", rid, &caps[1]);
            return Ok(());
        }

        if let Some(caps) = DELETE.captures(text) {
            let class = database
                .classes
                .get_mut(&caps[1])
                .ok_or_else(|| DbmuxError::execution(format!("Class '{}' not found", &caps[1])))?;
            class.records.clear();
            return Ok(());
        }

        Err(DbmuxError::execution(format!("Unsupported command: {}", text)))
    }

    async fn execute_traversal(
        &self,
        connection: &mut MemoryConnection,
        text: &str,
    ) -> DbmuxResult<Vec<BackendResult>> {
        let backend = self.server_for(connection)?;
        let name = Self::database_name(connection)?;
        let databases = backend.databases.read().await;
        let database = find_database(&databases, name)?;

        if database.db_type != DatabaseType::Graph {
            return Err(DbmuxError::execution(format!(
                "Database '{}' is not a graph database",
                name
            )));
        }

        let caps = TRAVERSAL
            .captures(text.trim())
            .ok_or_else(|| {
                DbmuxError::execution(format!("Unsupported traversal: {}", text.trim()))
            })?;
        let class = database.class(&caps[1])?;

        let records: Vec<&BackendRecord> = match caps.get(2) {
            Some(rid) => {
                let rid: RecordId = rid.as_str().parse().map_err(DbmuxError::execution)?;
                class
                    .records
                    .get(&rid.position)
                    .filter(|_| rid.cluster == class.cluster)
                    .into_iter()
                    .collect()
            }
            None => class.records.values().collect(),
        };

        if caps.get(3).is_some() {
            return Ok(vec![BackendResult::Scalar(BackendValue::Integer(records.len() as i64))]);
        }

        Ok(records
            .into_iter()
            .map(|record| BackendResult::Record(record.clone()))
            .collect())
    }

    async fn list_databases(&self, connection: &mut MemoryConnection) -> DbmuxResult<Vec<String>> {
        let backend = self.server_for(connection)?;
        Ok(backend.database_names().await)
    }

    async fn list_classes(&self, connection: &mut MemoryConnection) -> DbmuxResult<Vec<String>> {
        let backend = self.server_for(connection)?;
        let name = Self::database_name(connection)?;
        let databases = backend.databases.read().await;
        Ok(find_database(&databases, name)?.classes.keys().cloned().collect())
    }

    async fn create_database(
        &self,
        connection: &mut MemoryConnection,
        name: &str,
        storage: StorageMode,
        db_type: DatabaseType,
    ) -> DbmuxResult<()> {
        let backend = self.server_for(connection)?;
        backend.create_database(name, storage, db_type).await
    }

    async fn drop_database(
        &self,
        connection: &mut MemoryConnection,
        name: &str,
    ) -> DbmuxResult<()> {
        let backend = self.server_for(connection)?;
        backend.drop_database(name).await
    }

    async fn close(&self, connection: &mut MemoryConnection) -> DbmuxResult<()> {
        let backend = self.server_for(connection)?;
        if backend.fail_closes.load(Ordering::SeqCst) {
            return Err(DbmuxError::connection(format!(
                "Failed to close connection {}",
                connection.id
            )));
        }
        connection.closed = true;
        backend.open_connections.fetch_sub(1, Ordering::SeqCst);
        debug!("Memory connection {} closed", connection.id);
        Ok(())
    }
}

fn find_database<'a>(
    databases: &'a BTreeMap<String, MemoryDatabase>,
    name: &str,
) -> DbmuxResult<&'a MemoryDatabase> {
    databases
        .get(name)
        .ok_or_else(|| DbmuxError::execution(format!("Database '{}' not found", name)))
}

/// Split on `separator` outside quotes and brackets
fn split_top_level(input: &str, separator: char) -> Vec<&str> {
    let mut parts = Vec::new();
    let mut depth = 0i32;
    let mut quote: Option<char> = None;
    let mut start = 0;

    for (i, c) in input.char_indices() {
        match quote {
            Some(q) if c == q => quote = None,
            Some(_) => {}
            None => match c {
                '\'' | '"' => quote = Some(c),
                '[' | '{' => depth += 1,
                ']' | '}' => depth -= 1,
                c if c == separator && depth == 0 => {
                    parts.push(input[start..i].trim());
                    start = i + c.len_utf8();
                }
                _ => {}
            },
        }
    }
    parts.push(input[start..].trim());
    parts
}

fn parse_assignments(input: &str) -> Result<BTreeMap<String, BackendValue>, String> {
    let mut properties = BTreeMap::new();
    for assignment in split_top_level(input, ',') {
        let (name, value) = assignment
            .split_once('=')
            .ok_or_else(|| format!("Expected name = value, got '{}'", assignment))?;
        let name = name.trim();
        if name.is_empty() || !name.chars().all(|c| c.is_alphanumeric() || c == '_') {
            return Err(format!("Invalid property name '{}'", name));
        }
        properties.insert(name.to_string(), parse_literal(value)?);
    }
    Ok(properties)
}

/// Parse a statement literal into a backend value
fn parse_literal(input: &str) -> Result<BackendValue, String> {
    let input = input.trim();

    match input {
        "" => return Err("Missing value".to_string()),
        "null" => return Ok(BackendValue::Null),
        "true" => return Ok(BackendValue::Bool(true)),
        "false" => return Ok(BackendValue::Bool(false)),
        _ => {}
    }

    for quote in ['\'', '"'] {
        if input.len() >= 2 && input.starts_with(quote) && input.ends_with(quote) {
            return Ok(BackendValue::String(input[1..input.len() - 1].to_string()));
        }
    }

    if input.starts_with('#') {
        return input.parse::<RecordId>().map(BackendValue::Link);
    }

    if let Some(digits) = input.strip_prefix("0x") {
        return hex::decode(digits)
            .map(|bytes| BackendValue::Binary(Bytes::from(bytes)))
            .map_err(|e| format!("Invalid binary literal '{}': {}", input, e));
    }

    if let Some(inner) = input.strip_prefix('[').and_then(|s| s.strip_suffix(']')) {
        if inner.trim().is_empty() {
            return Ok(BackendValue::List(Vec::new()));
        }
        return split_top_level(inner, ',')
            .into_iter()
            .map(parse_literal)
            .collect::<Result<Vec<_>, _>>()
            .map(BackendValue::List);
    }

    if let Ok(i) = input.parse::<i64>() {
        return Ok(BackendValue::Integer(i));
    }
    if let Ok(f) = input.parse::<f64>() {
        return Ok(BackendValue::Float(f));
    }

    Err(format!("Unrecognized literal '{}'", input))
}
