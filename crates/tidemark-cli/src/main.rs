use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use tidemark_core::{
    CoreConfig, CursorDb, FeedTransport, MemoryTransport, OptimisticMutator, SharedFeedStats,
    SignalBus, SubscriptionSet, UnreadTracker,
};
use tracing::warn;

#[derive(Parser)]
#[command(name = "tidemark-cli")]
#[command(about = "Inspect and drive tidemark feeds")]
struct Cli {
    /// Directory holding the cursor database
    #[arg(long)]
    data_dir: Option<PathBuf>,

    /// Print machine-readable JSON where supported
    #[arg(long, short)]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Replay a JSONL record log through a live subscription and print
    /// the classified feed
    Replay {
        /// Feed name
        feed: String,

        /// Path to a JSONL file, one record object per line
        log: PathBuf,

        /// Mirror size cap
        #[arg(long, default_value_t = 50)]
        limit: usize,

        /// Mark everything read after the replay
        #[arg(long)]
        mark_read: bool,

        /// Optimistically update one field after the replay
        #[arg(long, value_name = "ID:FIELD=VALUE")]
        set: Option<String>,
    },

    /// Show the persisted cursor for a feed
    Status {
        /// Feed name
        feed: String,
    },

    /// Acknowledge feed items
    MarkRead {
        /// Feed name
        feed: String,

        /// Acknowledge a single item id without moving the watermark
        #[arg(long)]
        id: Option<String>,

        /// Advance the watermark over everything seen so far
        #[arg(long)]
        all: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();
    let config = CoreConfig::new(cli.data_dir.clone().unwrap_or_else(default_data_dir));
    let db = CursorDb::open(&config.data_dir)
        .with_context(|| format!("opening cursor database in {}", config.data_dir.display()))?;

    match cli.command {
        Commands::Replay {
            feed,
            log,
            limit,
            mark_read,
            set,
        } => replay(&db, &feed, &log, limit, mark_read, set).await,
        Commands::Status { feed } => status(&db, &feed, cli.json),
        Commands::MarkRead { feed, id, all } => mark(&db, &feed, id, all),
    }
}

fn default_data_dir() -> PathBuf {
    dirs::data_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("tidemark")
}

async fn replay(
    db: &CursorDb,
    feed: &str,
    log: &PathBuf,
    limit: usize,
    mark_read: bool,
    set: Option<String>,
) -> Result<()> {
    let tracker = UnreadTracker::new(feed, db.clone(), SignalBus::new());

    let transport = MemoryTransport::new();
    let stats = SharedFeedStats::new();
    let mut subscriptions = SubscriptionSet::new(Arc::new(transport.clone()), stats.clone());
    let store = subscriptions.subscribe(feed, limit)?;

    let contents =
        std::fs::read_to_string(log).with_context(|| format!("reading {}", log.display()))?;
    for (lineno, line) in contents.lines().enumerate() {
        if line.trim().is_empty() {
            continue;
        }
        match serde_json::from_str(line) {
            Ok(record) => {
                transport.append(feed, record).await?;
            }
            Err(e) => warn!("Skipping line {}: {}", lineno + 1, e),
        }
    }

    if let Some(expr) = set {
        let (id, field, value) = parse_set(&expr)?;
        let mutator =
            OptimisticMutator::new(feed, store.clone(), Arc::new(transport.clone()));
        let mut fields = serde_json::Map::new();
        fields.insert(field.to_string(), serde_json::Value::String(value.to_string()));
        match mutator.mutate(id, fields).await {
            Ok(()) => println!("updated '{}'", id),
            Err(e) => println!("update of '{}' failed and was rolled back: {}", id, e),
        }
    }

    let items = store.items();
    for item in &items {
        let marker = if tracker.is_unread(item) { "*" } else { " " };
        let preview: String = serde_json::to_string(&item.payload)
            .unwrap_or_default()
            .chars()
            .take(60)
            .collect();
        println!("[{}] {}  {}  {}", marker, item.created_at, item.id, preview);
    }

    let counters = stats.snapshot().counters(feed);
    println!(
        "\n{} items, {} unread, new since last visit: {}",
        items.len(),
        tracker.unread_count(&items),
        tracker.has_new(store.latest_seen()),
    );
    println!(
        "applied {} snapshots, {} increments ({} duplicates, {} discarded)",
        counters.snapshots, counters.increments, counters.duplicates, counters.discarded
    );

    if mark_read {
        tracker.mark_all_read(&items)?;
        println!("marked {} items read", items.len());
    }

    subscriptions.unsubscribe_all();
    Ok(())
}

fn status(db: &CursorDb, feed: &str, json: bool) -> Result<()> {
    let cursor = db.load(feed);
    if json {
        println!("{}", serde_json::to_string_pretty(&cursor)?);
        return Ok(());
    }
    println!("feed:          {}", feed);
    println!(
        "last seen:     {} ({})",
        cursor.last_seen_at,
        format_ms(cursor.last_seen_at)
    );
    println!("acknowledged:  {} item(s)", cursor.ack_ids.len());
    Ok(())
}

fn mark(db: &CursorDb, feed: &str, id: Option<String>, all: bool) -> Result<()> {
    let tracker = UnreadTracker::new(feed, db.clone(), SignalBus::new());
    match (id, all) {
        (Some(id), false) => {
            tracker.mark_one_read(&id)?;
            println!("acknowledged '{}'", id);
        }
        (None, true) => {
            tracker.mark_all_read(&[])?;
            println!("watermark advanced to now");
        }
        _ => bail!("pass exactly one of --id <id> or --all"),
    }
    Ok(())
}

fn parse_set(expr: &str) -> Result<(&str, &str, &str)> {
    let (id, assignment) = expr
        .split_once(':')
        .context("expected ID:FIELD=VALUE")?;
    let (field, value) = assignment
        .split_once('=')
        .context("expected ID:FIELD=VALUE")?;
    Ok((id, field, value))
}

fn format_ms(ms: u64) -> String {
    chrono::DateTime::from_timestamp_millis(ms as i64)
        .map(|dt| dt.to_rfc3339())
        .unwrap_or_else(|| "invalid".to_string())
}
