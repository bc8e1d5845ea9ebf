/// Command classification
///
/// Purely syntactic: the remainder left after connect-string stripping is
/// matched against the control command set, then the graph flag, then the
/// `select ` prefix. Anything else goes to the backend's generic command path.
use super::Scope;
use std::fmt;

/// Execution branch selected for an invocation, in priority order
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CommandCategory {
    Control(ControlCommand),
    GraphTraversal,
    Query,
    GenericCommand,
}

impl CommandCategory {
    pub fn name(&self) -> &'static str {
        match self {
            CommandCategory::Control(_) => "control",
            CommandCategory::GraphTraversal => "graph-traversal",
            CommandCategory::Query => "query",
            CommandCategory::GenericCommand => "command",
        }
    }

    /// Session scope the command runs against
    pub fn required_scope(&self) -> Scope {
        match self {
            CommandCategory::Control(control) => control.required_scope(),
            _ => Scope::Database,
        }
    }
}

/// Administrative instructions handled without the generic backend path
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ControlCommand {
    CurrentServer,
    CurrentDatabase,
    Disconnect,
    ListDatabases,
    ListClasses,
    DropDatabase {
        name: String,
    },
    CreateDatabase {
        name: String,
        storage: Option<String>,
        db_type: Option<String>,
    },
}

impl ControlCommand {
    /// Match a remainder against the control literal/prefix set
    pub fn parse(remainder: &str) -> Option<Self> {
        let remainder = remainder.trim();

        match remainder {
            "current server" => return Some(ControlCommand::CurrentServer),
            "current database" => return Some(ControlCommand::CurrentDatabase),
            "disconnect" => return Some(ControlCommand::Disconnect),
            "list databases" => return Some(ControlCommand::ListDatabases),
            "list classes" => return Some(ControlCommand::ListClasses),
            _ => {}
        }

        if let Some(args) = remainder.strip_prefix("drop database ") {
            let args: Vec<&str> = args.split_whitespace().collect();
            return match args.as_slice() {
                [name] => Some(ControlCommand::DropDatabase {
                    name: name.to_string(),
                }),
                _ => None,
            };
        }

        if let Some(args) = remainder.strip_prefix("create database ") {
            let args: Vec<&str> = args.split_whitespace().collect();
            return match args.as_slice() {
                [name] => Some(ControlCommand::CreateDatabase {
                    name: name.to_string(),
                    storage: None,
                    db_type: None,
                }),
                [name, storage] => Some(ControlCommand::CreateDatabase {
                    name: name.to_string(),
                    storage: Some(storage.to_string()),
                    db_type: None,
                }),
                [name, storage, db_type] => Some(ControlCommand::CreateDatabase {
                    name: name.to_string(),
                    storage: Some(storage.to_string()),
                    db_type: Some(db_type.to_string()),
                }),
                _ => None,
            };
        }

        None
    }

    /// Server-scoped controls must work with no database open
    pub fn required_scope(&self) -> Scope {
        match self {
            ControlCommand::CurrentServer
            | ControlCommand::ListDatabases
            | ControlCommand::DropDatabase { .. }
            | ControlCommand::CreateDatabase { .. } => Scope::Server,
            ControlCommand::CurrentDatabase
            | ControlCommand::Disconnect
            | ControlCommand::ListClasses => Scope::Database,
        }
    }
}

impl fmt::Display for ControlCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ControlCommand::CurrentServer => write!(f, "current server"),
            ControlCommand::CurrentDatabase => write!(f, "current database"),
            ControlCommand::Disconnect => write!(f, "disconnect"),
            ControlCommand::ListDatabases => write!(f, "list databases"),
            ControlCommand::ListClasses => write!(f, "list classes"),
            ControlCommand::DropDatabase { name } => write!(f, "drop database {}", name),
            ControlCommand::CreateDatabase { name, storage, db_type } => {
                write!(f, "create database {}", name)?;
                if let Some(storage) = storage {
                    write!(f, " {}", storage)?;
                }
                if let Some(db_type) = db_type {
                    write!(f, " {}", db_type)?;
                }
                Ok(())
            }
        }
    }
}

/// Map a command remainder and the graph flag to a category.
///
/// Total: every input yields exactly one category.
pub fn classify(remainder: &str, use_graph_traversal: bool) -> CommandCategory {
    if let Some(control) = ControlCommand::parse(remainder) {
        return CommandCategory::Control(control);
    }

    if use_graph_traversal {
        return CommandCategory::GraphTraversal;
    }

    if remainder.trim_start().starts_with("select ") {
        return CommandCategory::Query;
    }

    CommandCategory::GenericCommand
}
