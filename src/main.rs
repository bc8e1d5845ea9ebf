use anyhow::{anyhow, bail, Context};
use clap::{Args, Parser, Subcommand};
use dbmux::client::memory::MemoryClient;
use dbmux::config::{Config, ConfigError};
use dbmux::core::record::NormalizedResult;
use dbmux::error::{DbmuxError, ErrorSeverity};
use dbmux::{Dbmux, InvocationOptions};
use std::path::PathBuf;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "dbmux")]
#[command(
    about = "An interactive session-multiplexing front-end for graph/document database servers"
)]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(author = "dbmux Team")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Read invocations from stdin, one per line
    Shell {
        /// Path to configuration file
        #[arg(short, long)]
        config: Option<PathBuf>,
    },
    /// Run a single invocation
    Exec {
        /// Path to configuration file
        #[arg(short, long)]
        config: Option<PathBuf>,
        #[command(flatten)]
        flags: DisplayFlags,
        /// Connect string and/or command
        header: String,
        /// Command body
        #[arg(default_value = "")]
        body: String,
    },
    /// Generate an example configuration file
    Config {
        /// Output file path
        #[arg(short, long)]
        output: PathBuf,
    },
    /// Validate configuration file
    Validate {
        /// Path to configuration file to validate
        #[arg(short, long)]
        config: PathBuf,
    },
    /// Show version information
    Version,
}

/// Per-invocation flags overriding the configured display
#[derive(Args, Debug, Default, Clone)]
struct DisplayFlags {
    /// Run the command as a graph traversal
    #[arg(short = 'g', long)]
    graph: bool,
    /// Pretty-print results as JSON
    #[arg(short = 'j', long)]
    json: bool,
    /// Render results as a table, keeping N characters per field
    #[arg(short = 't', long, value_name = "N")]
    table: Option<usize>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Shell { config } => {
            let config = load_config(config.as_ref())?;
            init_logging(&config)?;
            run_shell(&config).await?;
        }
        Commands::Exec {
            config,
            flags,
            header,
            body,
        } => {
            let config = load_config(config.as_ref())?;
            init_logging(&config)?;
            run_exec(&config, &flags, &header, &body).await?;
        }
        Commands::Config { output } => {
            generate_config(output)?;
        }
        Commands::Validate { config } => {
            validate_config(config)?;
        }
        Commands::Version => {
            show_version();
        }
    }

    Ok(())
}

fn load_config(path: Option<&PathBuf>) -> anyhow::Result<Config> {
    match path {
        Some(path) => Config::load_from_file(path)
            .with_context(|| format!("Failed to load config from {:?}", path)),
        None => Ok(Config::default()),
    }
}

/// Options from the configured display format, overridden by flags
fn invocation_options(
    config: &Config,
    flags: &DisplayFlags,
) -> anyhow::Result<InvocationOptions> {
    let format = config.display.format.as_str();
    let options = InvocationOptions::new(
        flags.json || (flags.table.is_none() && format == "json"),
        flags.table.is_some() || format == "table",
        flags.table.unwrap_or(config.display.table_field_limit),
        flags.graph,
    )?;
    Ok(options)
}

/// Split leading `-g`, `-j` and `-t N` flags off a shell line
fn parse_shell_line(line: &str) -> anyhow::Result<(DisplayFlags, &str)> {
    let mut flags = DisplayFlags::default();
    let mut rest = line.trim_start();

    loop {
        let (token, tail) = match rest.split_once(char::is_whitespace) {
            Some((token, tail)) => (token, tail.trim_start()),
            None => (rest, ""),
        };

        match token {
            "-g" => flags.graph = true,
            "-j" => flags.json = true,
            "-t" => {
                let (limit, tail) = match tail.split_once(char::is_whitespace) {
                    Some((limit, tail)) => (limit, tail.trim_start()),
                    None => (tail, ""),
                };
                let limit = limit
                    .parse::<usize>()
                    .map_err(|_| anyhow!("-t expects an integer, got '{}'", limit))?;
                flags.table = Some(limit);
                rest = tail;
                continue;
            }
            _ => return Ok((flags, rest)),
        }
        rest = tail;
    }
}

async fn run_shell(config: &Config) -> anyhow::Result<()> {
    let dbmux = Dbmux::from_config(config).await?;
    info!("dbmux v{} shell started", env!("CARGO_PKG_VERSION"));

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Some(line) = lines.next_line().await? {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        if line == "\\q" || line == "quit" {
            break;
        }

        let outcome = match parse_shell_line(line) {
            Ok((flags, input)) => invoke(&dbmux, config, &flags, input, "").await,
            Err(e) => Err(e),
        };
        if let Err(e) = outcome {
            report_error(&e);
            if !should_continue(&e) {
                break;
            }
        }
    }

    shutdown(&dbmux).await;
    Ok(())
}

async fn run_exec(
    config: &Config,
    flags: &DisplayFlags,
    header: &str,
    body: &str,
) -> anyhow::Result<()> {
    let dbmux = Dbmux::from_config(config).await?;
    let outcome = invoke(&dbmux, config, flags, header, body).await;
    shutdown(&dbmux).await;
    outcome
}

async fn invoke(
    dbmux: &Dbmux<MemoryClient>,
    config: &Config,
    flags: &DisplayFlags,
    header: &str,
    body: &str,
) -> anyhow::Result<()> {
    let options = invocation_options(config, flags)?;
    if let Some(result) = dbmux.run(header, body, &options).await? {
        print_summary(&result);
    }
    Ok(())
}

fn print_summary(result: &NormalizedResult) {
    let count = result.elements().len();
    println!("({} {})", count, if count == 1 { "element" } else { "elements" });
}

fn report_error(error: &anyhow::Error) {
    match error.downcast_ref::<DbmuxError>() {
        Some(e) => eprintln!("✗ [{}] {}", e.severity(), e),
        None => eprintln!("✗ {}", error),
    }
}

/// The shell keeps reading after anything short of a critical failure
fn should_continue(error: &anyhow::Error) -> bool {
    match error.downcast_ref::<DbmuxError>() {
        Some(e) => e.is_recoverable() || e.severity() != ErrorSeverity::Critical,
        None => true,
    }
}

async fn shutdown(dbmux: &Dbmux<MemoryClient>) {
    let report = dbmux.shutdown().await;
    for failure in &report.failures {
        warn!(
            "Could not close {} session {}: {}",
            failure.scope, failure.key, failure.error
        );
    }
    info!(
        "Closed {} sessions, {} failures",
        report.closed,
        report.failures.len()
    );
}

fn generate_config(output: PathBuf) -> anyhow::Result<()> {
    println!("Generating configuration file: {:?}", output);

    Config::create_example_config(&output).context("Failed to generate config")?;

    println!("Configuration file generated successfully!");
    println!("Edit the file to match your environment and run:");
    println!("  dbmux shell --config {:?}", output);

    Ok(())
}

fn validate_config(config_path: PathBuf) -> anyhow::Result<()> {
    println!("Validating configuration file: {:?}", config_path);

    match Config::load_from_file(&config_path) {
        Ok(config) => {
            println!("✓ Configuration file is valid");
            println!(
                "  Default server: {}:{}",
                config.connection.server, config.connection.port
            );
            println!(
                "  New databases: {} / {}",
                config.database.storage, config.database.db_type
            );
            println!(
                "  Display: {} (field limit {})",
                config.display.format, config.display.table_field_limit
            );
            println!("  Backend: {}", config.backend.kind);
            println!("  Users: {}", config.backend.users.len());
            for (i, name) in config.backend.seed_databases.iter().enumerate() {
                println!("    {}: {}", i + 1, name);
            }
        }
        Err(e) => {
            eprintln!("✗ Configuration file validation failed:");
            match &e {
                ConfigError::IoError(msg) => eprintln!("  File error: {}", msg),
                ConfigError::ParseError(msg) => eprintln!("  Parse error: {}", msg),
                ConfigError::ValidationError(msg) => eprintln!("  Validation error: {}", msg),
                ConfigError::SerializeError(msg) => eprintln!("  Serialization error: {}", msg),
            }
            bail!(e);
        }
    }

    Ok(())
}

fn show_version() {
    println!("dbmux v{}", env!("CARGO_PKG_VERSION"));
    println!("An interactive session-multiplexing front-end for graph/document database servers");
    println!();
    println!("Target: {}", std::env::consts::ARCH);
    println!();
    println!("Features:");
    println!("  • Pooled server and database sessions keyed by user@server[/database]");
    println!("  • Queries, graph traversals and administrative commands");
    println!("  • Normalized results rendered as JSON or tables");
}

fn init_logging(config: &Config) -> anyhow::Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.logging.level));

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);

    let installed = match config.logging.format.as_str() {
        "compact" => builder.compact().try_init(),
        _ => builder.try_init(),
    };
    installed.map_err(|e| anyhow!("Failed to initialize logging: {}", e))?;

    info!("Logging initialized at level: {}", config.logging.level);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_shell_line_flags() {
        let (flags, rest) = parse_shell_line("-g -t 40 u@mydb g.V()").unwrap();
        assert!(flags.graph);
        assert!(!flags.json);
        assert_eq!(flags.table, Some(40));
        assert_eq!(rest, "u@mydb g.V()");

        let (flags, rest) = parse_shell_line("list databases").unwrap();
        assert!(!flags.graph && !flags.json && flags.table.is_none());
        assert_eq!(rest, "list databases");

        assert!(parse_shell_line("-t many select from V").is_err());
    }

    #[test]
    fn test_flags_override_config_display() {
        let config = Config::default();

        let options = invocation_options(&config, &DisplayFlags::default()).unwrap();
        assert_eq!(
            options.display(),
            Some(dbmux::render::DisplayMode::Table { field_limit: 25 })
        );

        let json = DisplayFlags {
            json: true,
            ..Default::default()
        };
        let options = invocation_options(&config, &json).unwrap();
        assert_eq!(options.display(), Some(dbmux::render::DisplayMode::Json));

        let mut quiet = Config::default();
        quiet.display.format = "none".to_string();
        let options = invocation_options(&quiet, &DisplayFlags::default()).unwrap();
        assert_eq!(options.display(), None);
    }

    #[test]
    fn test_shell_stops_only_on_critical_errors() {
        assert!(should_continue(&anyhow!(DbmuxError::execution("syntax"))));
        assert!(should_continue(&anyhow!(DbmuxError::NoDatabaseSession)));
        assert!(should_continue(&anyhow!(DbmuxError::parse("bad port"))));
        assert!(should_continue(&anyhow!("-t expects an integer")));

        let io = std::io::Error::new(std::io::ErrorKind::BrokenPipe, "stdout closed");
        assert!(!should_continue(&anyhow!(DbmuxError::Io(io))));
    }
}
