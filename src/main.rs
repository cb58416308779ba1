//! History Cache CLI
//!
//! Entry point for the `history-cache` command-line tool.

use std::path::PathBuf;
use std::process;
use std::time::Duration;

use clap::{Parser, Subcommand};
use history_cache::history_store::{FileStore, StringSerializer};
use history_cache::{logging, CacheActor, CacheError, CacheHandle, CacheResult, EffectiveConfig};

#[derive(Parser)]
#[command(name = "history-cache")]
#[command(about = "Inspect and hold a task history cache", version)]
struct Cli {
    /// Store directory
    #[arg(long, short = 'd', default_value = ".history")]
    dir: PathBuf,

    /// Path to a TOML config file
    #[arg(long, short = 'c')]
    config: Option<PathBuf>,

    /// Override the idle time before the store lock is released
    #[arg(long)]
    unlock_interval_ms: Option<u64>,

    /// Print the actor summary when done
    #[arg(long)]
    stats: bool,

    /// Debug logging (ignored when RUST_LOG is set)
    #[arg(long, short = 'v')]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Print a value; exits with status 2 when the key is absent
    Get { cache: String, key: String },

    /// Store a value
    Put {
        cache: String,
        key: String,
        value: String,
    },

    /// Remove a key
    Remove { cache: String, key: String },

    /// Keep the store open and idle so the lock release can be observed
    Hold {
        #[arg(long, default_value_t = 10)]
        seconds: u64,
    },
}

fn main() {
    let cli = Cli::parse();
    logging::init_logging(cli.verbose);

    match run(cli) {
        Ok(code) => process::exit(code),
        Err(e) => {
            eprintln!("Error: {}", e);
            process::exit(1);
        }
    }
}

fn run(cli: Cli) -> CacheResult<i32> {
    let Cli {
        dir,
        config,
        unlock_interval_ms,
        stats,
        verbose: _,
        command,
    } = cli;

    let overrides =
        unlock_interval_ms.map(|ms| serde_json::json!({ "actor": { "unlock_interval_ms": ms } }));
    let effective = EffectiveConfig::build(config.as_deref(), overrides)?;
    for source in &effective.sources {
        tracing::debug!(origin = ?source.origin, path = ?source.path, digest = ?source.digest, "config layer");
    }
    let config = effective.actor_config()?;
    tracing::debug!(
        unlock_interval_ms = ?effective.get_u64("actor.unlock_interval_ms"),
        thread = ?effective.get("actor.thread_name"),
        "effective configuration"
    );

    let lock_timeout = config.lock_timeout;
    let actor = CacheActor::new(move || FileStore::open(&dir, lock_timeout), config);

    let code = match command {
        Commands::Get { cache, key } => {
            let handle = string_cache(&actor, &cache)?;
            actor.start()?;
            match handle.get(&key)? {
                Some(value) => {
                    println!("{}", value);
                    0
                }
                None => 2,
            }
        }
        Commands::Put { cache, key, value } => {
            let handle = string_cache(&actor, &cache)?;
            actor.start()?;
            handle.put(&key, &value)?;
            0
        }
        Commands::Remove { cache, key } => {
            let handle = string_cache(&actor, &cache)?;
            actor.start()?;
            handle.remove(&key)?;
            0
        }
        Commands::Hold { seconds } => hold(&actor, Duration::from_secs(seconds))?,
    };

    let summary = actor.stop()?;
    if summary.failed {
        return Err(CacheError::ActorFailed);
    }
    if stats {
        eprintln!("{}", summary);
    }
    Ok(code)
}

fn string_cache(actor: &CacheActor<FileStore>, name: &str) -> CacheResult<CacheHandle<str, String>> {
    actor.create_cache_with_serializer::<str, String, _>(name, StringSerializer)
}

/// Run the actor idle for `duration`, or until Ctrl-C.
fn hold(actor: &CacheActor<FileStore>, duration: Duration) -> CacheResult<i32> {
    let (interrupt_tx, interrupt_rx) = crossbeam_channel::bounded(1);
    if let Err(e) = ctrlc::set_handler(move || {
        let _ = interrupt_tx.try_send(());
    }) {
        tracing::warn!(error = %e, "could not install Ctrl-C handler");
    }

    actor.start()?;
    tracing::info!(
        seconds = duration.as_secs(),
        unlock_interval_ms = actor.config().unlock_interval.as_millis() as u64,
        "holding the history store"
    );

    if interrupt_rx.recv_timeout(duration).is_ok() {
        tracing::info!("interrupted, stopping");
    }
    Ok(0)
}
