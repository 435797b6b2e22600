use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use pgfetch::mapper::Selector;
use pgfetch::{compile, compile_literal, Database, DatabaseSettings, Statement};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing_subscriber::EnvFilter;

/// Compile and run JSON-described PostgreSQL statements
#[derive(Parser)]
#[command(version, about)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Print the SQL a statement compiles to
    Compile {
        /// Statement file (JSON)
        statement: PathBuf,
        /// Inline bound values instead of emitting placeholders
        #[arg(long)]
        literal: bool,
    },
    /// Run a statement and print its rows as JSON
    Fetch {
        statement: PathBuf,
        /// Expect at most one row
        #[arg(long)]
        one: bool,
        #[command(flatten)]
        conn: ConnArgs,
    },
    /// Run a statement and print the command status
    Execute {
        statement: PathBuf,
        #[command(flatten)]
        conn: ConnArgs,
    },
    /// Print the server's JSON plan for a statement
    Explain {
        statement: PathBuf,
        /// Run the statement to collect actual timings
        #[arg(long)]
        analyze: bool,
        #[command(flatten)]
        conn: ConnArgs,
    },
}

#[derive(clap::Args)]
struct ConnArgs {
    /// Settings file (TOML). Defaults to the user config directory.
    #[arg(long)]
    config: Option<PathBuf>,
    /// Per-call timeout in seconds
    #[arg(long)]
    timeout: Option<u64>,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    match cli.command {
        Command::Compile { statement, literal } => {
            let statement = load_statement(&statement)?;
            if literal {
                println!("{}", compile_literal(&statement)?);
            } else {
                let compiled = compile(&statement)?;
                let params: Vec<serde_json::Value> =
                    compiled.params.iter().map(|v| v.to_json()).collect();
                let out = serde_json::json!({ "sql": compiled.sql, "params": params });
                println!("{}", serde_json::to_string_pretty(&out)?);
            }
        }
        Command::Fetch {
            statement,
            one,
            conn,
        } => {
            let statement = load_statement(&statement)?;
            let db = open_database(&conn).await?;
            let timeout = conn.timeout.map(Duration::from_secs);
            let out = if one {
                let row = statement.fetch_one(&db, &Selector::raw(), timeout).await?;
                serde_json::to_string_pretty(&row)?
            } else {
                let rows = statement.fetch_all(&db, &Selector::raw(), timeout).await?;
                serde_json::to_string_pretty(&rows)?
            };
            println!("{}", out);
        }
        Command::Execute { statement, conn } => {
            let statement = load_statement(&statement)?;
            let db = open_database(&conn).await?;
            let timeout = conn.timeout.map(Duration::from_secs);
            let status = statement.execute(&db, timeout).await?;
            println!("{}", status);
        }
        Command::Explain {
            statement,
            analyze,
            conn,
        } => {
            let statement = load_statement(&statement)?;
            let db = open_database(&conn).await?;
            let timeout = conn.timeout.map(Duration::from_secs);
            let args = compile(&statement)?.params;
            let connection = db.acquire(timeout).await?;
            let prepared = connection.prepare(&statement, None, timeout).await?;
            let plan = prepared.explain(&args, analyze, timeout).await?;
            println!("{}", serde_json::to_string_pretty(&plan)?);
        }
    }

    Ok(())
}

fn load_statement(path: &Path) -> Result<Statement> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read statement file {}", path.display()))?;
    serde_json::from_str(&text)
        .with_context(|| format!("Invalid statement JSON in {}", path.display()))
}

async fn open_database(args: &ConnArgs) -> Result<Database> {
    let mut settings = match &args.config {
        Some(path) => DatabaseSettings::load(path)?,
        None => DatabaseSettings::load_default()?,
    };

    // Resolve password: settings file / PGPASSWORD, then interactive prompt
    if settings.password.is_empty() {
        let prompt = format!("Password for {}: ", settings.display_string());
        settings.password = rpassword::read_password_from_tty(Some(&prompt))?;
    }

    let mut db = Database::new(settings);
    db.connect()
        .await
        .context("Failed to connect to PostgreSQL")?;
    Ok(db)
}
