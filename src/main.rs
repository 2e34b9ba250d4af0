// ABOUTME: Entry point for the razonable binary.
// ABOUTME: Parses CLI arguments, initializes tracing, opens the store, and runs one command.

use std::io::Write;
use std::path::PathBuf;

use anyhow::{Context, bail};
use clap::{Parser, Subcommand};
use razonable_store::{CancellationToken, Cursor, Direction, Index, Location, Store, StoreConfig};
use serde_json::Value;

#[derive(Debug, Parser)]
#[command(name = "razonable", version, about = "Timestamped key-value records with resumable cursors")]
struct Cli {
    /// Database file (defaults to RAZONABLE_HOME/RAZONABLE_DB)
    #[arg(long, global = true)]
    db: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Print the number of records
    Count,
    /// Print the records stored under the given keys (null when absent)
    Get { keys: Vec<String> },
    /// Store a JSON value under a key
    Set { key: String, value: String },
    /// Delete keys; missing keys are ignored
    Rm { keys: Vec<String> },
    /// List every key in ascending order
    Keys,
    /// Page through records, printing one JSON record per line
    Scan {
        /// Ordering to walk: key, created, or updated
        #[arg(long, default_value = "key")]
        index: String,
        /// Walk the ordering from the end
        #[arg(long)]
        reverse: bool,
        /// Records per page (defaults to RAZONABLE_PAGE_SIZE)
        #[arg(long)]
        page_size: Option<usize>,
        /// Resume token printed by a previous scan
        #[arg(long)]
        resume: Option<String>,
        /// Stop after this many pages
        #[arg(long)]
        pages: Option<usize>,
    },
    /// Delete every record
    Clear,
    /// Delete the database file
    Destroy,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let _ = dotenvy::dotenv();

    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "razonable=info,razonable_store=info".into()),
        )
        .init();

    let cli = Cli::parse();

    let mut config = StoreConfig::from_env()?;
    if let Some(db) = cli.db {
        config.location = Location::File(db);
    }
    let page_size = config.page_size;
    let store = Store::open_with(config).context("failed to open store")?;

    let stdout = std::io::stdout();
    let mut out = stdout.lock();

    match cli.command {
        Command::Count => {
            writeln!(out, "{}", store.count().await?)?;
        }

        Command::Get { keys } => {
            let found = store.multi_get::<Value, _>(&keys).await?;
            writeln!(out, "{}", serde_json::to_string_pretty(&found)?)?;
        }

        Command::Set { key, value } => {
            let value: Value = serde_json::from_str(&value)
                .with_context(|| format!("value for {key} is not valid JSON"))?;
            let record = store.set(&key, value).await?;
            writeln!(out, "{}", serde_json::to_string(&record)?)?;
        }

        Command::Rm { keys } => {
            let removed = store.multi_remove(&keys).await?;
            tracing::info!("removed {} of {} keys", removed, keys.len());
        }

        Command::Keys => {
            for key in store.keys().await? {
                writeln!(out, "{}", key)?;
            }
        }

        Command::Scan {
            index,
            reverse,
            page_size: requested,
            resume,
            pages,
        } => {
            let index = match index.parse::<Index>()? {
                Index::Key => None,
                secondary => Some(secondary),
            };
            let direction = if reverse { Direction::Reverse } else { Direction::Forward };
            let page_size = requested.unwrap_or(page_size);
            if page_size == 0 {
                bail!("--page-size must be a positive integer");
            }

            let mut cursor: Cursor<Value> = match resume {
                Some(token) => {
                    let cursor = store.restore_cursor(&token, index)?;
                    if reverse && cursor.direction() != Direction::Reverse {
                        tracing::warn!("--reverse ignored; the resume token fixes the direction");
                    }
                    cursor
                }
                None => match index {
                    Some(index) => store.cursor_with_index(index, direction),
                    None if reverse => store.cursor_with_index(Index::Key, direction),
                    None => store.cursor(),
                },
            };

            // Ctrl-C stops at the next page boundary so the resume token stays valid
            let cancel = CancellationToken::new();
            let on_interrupt = cancel.clone();
            tokio::spawn(async move {
                if tokio::signal::ctrl_c().await.is_ok() {
                    on_interrupt.cancel();
                }
            });

            let mut fetched = 0;
            while cursor.has_more() && pages.is_none_or(|limit| fetched < limit) {
                if cancel.is_cancelled() {
                    tracing::info!("scan interrupted after {} pages", fetched);
                    break;
                }
                for record in cursor.next_page(page_size).await? {
                    writeln!(out, "{}", serde_json::to_string(&record)?)?;
                }
                fetched += 1;
            }

            if cursor.has_more() {
                eprintln!("resume: {}", cursor.save());
            }
        }

        Command::Clear => {
            let removed = store.clear().await?;
            tracing::info!("cleared {} records", removed);
        }

        Command::Destroy => {
            store.destroy().await?;
        }
    }

    Ok(())
}
