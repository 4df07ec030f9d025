//! Journal Vault - CLI
//!
//! Command-line interface for vault operations.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use rusqlite::types::ValueRef;
use tracing_subscriber::EnvFilter;
use zeroize::Zeroizing;

use journal_vault::{run_until_shutdown, shutdown_signal, StoreConfig, VaultSession, VaultStore};

/// Read instead of prompting when set
const ENV_PASSPHRASE: &str = "JOURNAL_VAULT_PASSPHRASE";

#[derive(Parser)]
#[command(name = "journal-vault")]
#[command(version = journal_vault::VERSION)]
#[command(about = "Journal Vault - Passphrase-protected encrypted journals")]
struct Cli {
    /// Vault directory (overrides config and JOURNAL_VAULT_DIR)
    #[arg(short = 'd', long)]
    vault_dir: Option<PathBuf>,

    /// JSON config file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Debug logging
    #[arg(short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create a new vault
    Create {
        /// Vault name
        name: String,
    },

    /// List vaults
    List {
        /// Print as JSON
        #[arg(long)]
        json: bool,
    },

    /// Unlock a vault and run the engine integrity check
    Check {
        /// Vault name
        name: String,
    },

    /// Run one SQL statement against a vault and save
    Sql {
        /// Vault name
        name: String,

        /// Statement to execute
        statement: String,
    },

    /// Keep a vault unlocked with auto-save until Ctrl-C / SIGTERM
    Serve {
        /// Vault name
        name: String,

        /// Auto-save interval in seconds
        #[arg(short, long)]
        interval: Option<u64>,
    },

    /// Delete a vault
    Remove {
        /// Vault name
        name: String,

        /// Skip the confirmation prompt
        #[arg(short, long)]
        yes: bool,
    },
}

fn main() {
    let cli = Cli::parse();

    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    if let Err(e) = run(cli) {
        eprintln!("Error: {:#}", e);
        std::process::exit(1);
    }
}

fn run(cli: Cli) -> Result<()> {
    let config = load_config(&cli)?;
    let store = VaultStore::new(config);

    match cli.command {
        Commands::Create { name } => {
            let passphrase = read_passphrase(&format!("Passphrase for new vault '{}': ", name), true)?;
            let path = store.create_vault(&name, &passphrase)?;
            println!("Vault created at: {}", path.display());
        }

        Commands::List { json } => {
            let names = store.list_vaults()?;
            if json {
                println!("{}", serde_json::to_string_pretty(&names)?);
            } else if names.is_empty() {
                println!("No vaults in {}", store.config().vault_dir.display());
            } else {
                for name in names {
                    println!("{}", name);
                }
            }
        }

        Commands::Check { name } => {
            let session = unlock(&store, &name)?;
            let ok = session.integrity_check()?;
            store.close_vault(&session)?;

            if !ok {
                bail!("integrity check failed for '{}'", session.name());
            }
            println!("Vault '{}' is healthy", session.name());
        }

        Commands::Sql { name, statement } => {
            let session = unlock(&store, &name)?;
            let result = session.with_connection(|conn| run_statement(conn, &statement))?;
            let closed = store.close_vault(&session);

            let (rows, changed) = result?;
            closed?;
            for row in rows {
                println!("{}", row.join("\t"));
            }
            if let Some(changed) = changed {
                eprintln!("{} row(s) changed", changed);
            }
        }

        Commands::Serve { name, interval } => {
            let period = match interval {
                Some(0) => bail!("interval must be at least 1 second"),
                Some(secs) => std::time::Duration::from_secs(secs),
                None => store.config().autosave_interval(),
            };
            let session = Arc::new(unlock(&store, &name)?);
            println!(
                "Vault '{}' unlocked, auto-saving every {}s. Press Ctrl-C to lock.",
                session.name(),
                period.as_secs()
            );

            let runtime = tokio::runtime::Runtime::new().context("starting runtime")?;
            runtime.block_on(run_until_shutdown(Arc::clone(&session), period, shutdown_signal()))?;
            println!("Vault '{}' saved and locked", session.name());
        }

        Commands::Remove { name, yes } => {
            if !yes && !confirm(&format!("Delete vault '{}' permanently?", name))? {
                println!("Aborted");
                return Ok(());
            }
            store.remove_vault(&name)?;
            println!("Vault '{}' removed", name);
        }
    }

    Ok(())
}

/// Defaults, then `--config`, then environment, then flags.
fn load_config(cli: &Cli) -> Result<StoreConfig> {
    let base = match &cli.config {
        Some(path) => StoreConfig::load(path)?,
        None => StoreConfig::default(),
    };
    let mut config = base.with_env()?;
    if let Some(dir) = &cli.vault_dir {
        config.vault_dir = dir.clone();
    }
    config.validate()?;
    Ok(config)
}

fn unlock(store: &VaultStore, name: &str) -> Result<VaultSession> {
    let passphrase = read_passphrase(&format!("Passphrase for '{}': ", name), false)?;
    let session = store
        .open_vault(name, &passphrase)
        .with_context(|| format!("unlocking '{}'", name))?;
    Ok(session)
}

fn read_passphrase(prompt: &str, confirm: bool) -> Result<Zeroizing<String>> {
    if let Ok(pass) = std::env::var(ENV_PASSPHRASE) {
        return Ok(Zeroizing::new(pass));
    }

    let pass = Zeroizing::new(rpassword::prompt_password(prompt)?);
    if confirm {
        let again = Zeroizing::new(rpassword::prompt_password("Repeat passphrase: ")?);
        if *pass != *again {
            bail!("passphrases do not match");
        }
    }
    Ok(pass)
}

fn confirm(question: &str) -> Result<bool> {
    eprint!("{} [y/N] ", question);
    let mut answer = String::new();
    std::io::stdin().read_line(&mut answer)?;
    Ok(matches!(answer.trim(), "y" | "Y" | "yes"))
}

/// Rows rendered as text, plus the change count for statements without
/// result columns.
fn run_statement(
    conn: &rusqlite::Connection,
    sql: &str,
) -> rusqlite::Result<(Vec<Vec<String>>, Option<usize>)> {
    let mut stmt = conn.prepare(sql)?;
    let columns = stmt.column_count();
    if columns == 0 {
        let changed = stmt.execute([])?;
        return Ok((Vec::new(), Some(changed)));
    }

    let mut out = Vec::new();
    let mut rows = stmt.query([])?;
    while let Some(row) = rows.next()? {
        let mut cells = Vec::with_capacity(columns);
        for i in 0..columns {
            cells.push(render(row.get_ref(i)?));
        }
        out.push(cells);
    }
    Ok((out, None))
}

fn render(value: ValueRef<'_>) -> String {
    match value {
        ValueRef::Null => "NULL".to_string(),
        ValueRef::Integer(i) => i.to_string(),
        ValueRef::Real(f) => f.to_string(),
        ValueRef::Text(t) => String::from_utf8_lossy(t).into_owned(),
        ValueRef::Blob(b) => format!("x'{}'", hex::encode(b)),
    }
}
