mod report;

use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use taskbook_config::loader::ENV_LOG;
use taskbook_config::{AppConfig, ConfigLoader, LogConfig, apply_env_overrides};
use taskbook_db::{Database, catalog};
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;
use tracing_subscriber::fmt::MakeWriter;

#[derive(Parser)]
#[command(name = "taskbook", version, about = "Apply and inspect taskbook schema migrations")]
struct Cli {
    /// Config file (YAML or TOML). Defaults to the platform config directory.
    #[arg(short, long, global = true, env = "TASKBOOK_CONFIG")]
    config: Option<PathBuf>,

    /// SQLite database file, overriding the configured path.
    #[arg(short, long, global = true)]
    database: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Apply pending migrations
    #[command(alias = "up")]
    Migrate {
        /// Stop after this version
        #[arg(long)]
        to: Option<u64>,
    },
    /// Revert the most recently applied migrations
    #[command(alias = "down")]
    Rollback {
        #[arg(long, default_value_t = 1)]
        steps: usize,
    },
    /// Show every migration and whether it is applied
    Status {
        #[arg(long)]
        json: bool,
    },
    /// Print the current schema version
    Version,
    /// Schema snapshot commands
    #[command(subcommand)]
    Schema(SchemaCommand),
}

#[derive(Subcommand)]
enum SchemaCommand {
    /// Write the current schema to the snapshot file
    Dump {
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
    /// Compare the committed snapshot with the schema the migrations produce
    Verify {
        #[arg(long)]
        snapshot: Option<PathBuf>,
    },
    /// List the declared tables, columns and indexes
    Describe,
}

fn main() -> ExitCode {
    let _ = dotenvy::dotenv();
    let cli = Cli::parse();

    // The configured subscriber depends on the config, so loading logs
    // through a stderr subscriber filtered by TASKBOOK_LOG alone.
    let loaded = tracing::subscriber::with_default(bootstrap_subscriber(std::io::stderr), || {
        load_config(&cli)
    });
    let config = match loaded {
        Ok(config) => config,
        Err(e) => {
            eprintln!("error: {e:#}");
            return ExitCode::FAILURE;
        }
    };
    init_tracing(&config.log);

    match run(cli.command, &config) {
        Ok(true) => ExitCode::SUCCESS,
        Ok(false) => ExitCode::FAILURE,
        Err(e) => {
            error!("{e:#}");
            eprintln!("error: {e:#}");
            ExitCode::FAILURE
        }
    }
}

fn load_config(cli: &Cli) -> Result<AppConfig> {
    let mut config = match &cli.config {
        Some(path) => {
            let mut config = ConfigLoader::load_from(path)
                .with_context(|| format!("failed to load config {}", path.display()))?;
            apply_env_overrides(&mut config, |key| std::env::var(key).ok());
            config
        }
        None => ConfigLoader::new().load().context("failed to load config")?,
    };
    if let Some(path) = &cli.database {
        config.database.path = path.clone();
    }
    Ok(config)
}

fn bootstrap_subscriber<W>(writer: W) -> impl tracing::Subscriber + Send + Sync
where
    W: for<'w> MakeWriter<'w> + Send + Sync + 'static,
{
    let filter = EnvFilter::try_from_env(ENV_LOG).unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(writer)
        .finish()
}

fn init_tracing(log: &LogConfig) {
    let filter = EnvFilter::try_new(&log.level).unwrap_or_else(|_| EnvFilter::new("info"));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);
    if log.json {
        builder.json().init();
    } else {
        builder.init();
    }
}

/// Open for commands that change the schema; creates the file if needed.
fn open(config: &AppConfig) -> Result<Database> {
    Database::open(&config.database.path, &config.database)
        .with_context(|| format!("failed to open {}", config.database.path.display()))
}

/// Open for commands that only read the schema; the file must exist.
fn open_existing(config: &AppConfig) -> Result<Database> {
    Database::open_existing(&config.database.path, &config.database)
        .with_context(|| format!("failed to open {}", config.database.path.display()))
}

/// Returns `false` when the command ran but found a problem to report,
/// such as a stale snapshot.
fn run(command: Command, config: &AppConfig) -> Result<bool> {
    match command {
        Command::Migrate { to } => {
            let db = open(config)?;
            let applied = match to {
                Some(version) => db.migrate_to(version)?,
                None => db.migrate()?,
            };
            info!(count = applied.len(), "migrations applied");
            for version in applied {
                println!("applied {version}");
            }
        }
        Command::Rollback { steps } => {
            let db = open(config)?;
            let reverted = db.rollback(steps)?;
            info!(count = reverted.len(), "migrations rolled back");
            for version in reverted {
                println!("rolled back {version}");
            }
        }
        Command::Status { json } => {
            let db = open_existing(config)?;
            let statuses = db.status()?;
            if json {
                println!("{}", serde_json::to_string_pretty(&statuses)?);
            } else {
                print!(
                    "{}",
                    report::status_table(&config.database.path, db.version()?, &statuses)
                );
            }
        }
        Command::Version => {
            let db = open_existing(config)?;
            match db.version()? {
                Some(version) => println!("{version}"),
                None => println!("none"),
            }
        }
        Command::Schema(SchemaCommand::Dump { output }) => {
            let db = open_existing(config)?;
            let path = output.unwrap_or_else(|| config.snapshot.path.clone());
            if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
                std::fs::create_dir_all(parent)
                    .with_context(|| format!("failed to create {}", parent.display()))?;
            }
            std::fs::write(&path, db.snapshot()?.render())
                .with_context(|| format!("failed to write {}", path.display()))?;
            info!("schema snapshot written to {}", path.display());
        }
        Command::Schema(SchemaCommand::Verify { snapshot }) => {
            let path = snapshot.unwrap_or_else(|| config.snapshot.path.clone());
            let text = std::fs::read_to_string(&path)
                .with_context(|| format!("failed to read {}", path.display()))?;
            let diff = Database::verify_snapshot(&text)?;
            print!("{diff}");
            if !diff.is_clean() {
                println!();
                warn!("{} is out of date", path.display());
                return Ok(false);
            }
            println!();
        }
        Command::Schema(SchemaCommand::Describe) => {
            print!("{}", report::describe_catalog(catalog()));
        }
    }
    Ok(true)
}
