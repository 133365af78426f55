use clap::{Parser, Subcommand};
use mirrorcache::{CacheManager, ReplicationReport};
use tracing::{info, warn};
use tracing_appender::non_blocking;
// no EnvFilter feature; use a simple level switch via RUST_LOG

static LOG_GUARD: std::sync::OnceLock<tracing_appender::non_blocking::WorkerGuard> =
    std::sync::OnceLock::new();

#[derive(Parser)]
#[command(name = "mirrorcache")]
#[command(about = "Mirrored Redis cache client")]
struct Args {
    /// Path to configuration file
    #[arg(short, long, default_value = "demos/mirrorcache.yaml")]
    config: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug, PartialEq, Eq)]
enum Command {
    /// Read a key from the primary
    Get { key: String },
    /// Write a key to the mirrors and the primary
    Set {
        key: String,
        value: String,
        /// TTL in seconds; defaults to the configured `expire`
        #[arg(long)]
        ttl: Option<u64>,
    },
    /// Delete a key from the mirrors and the primary
    Del { key: String },
    /// Empty the primary and every mirror
    Flush,
    /// Number of keys on the primary
    Size,
    /// Keys on the primary matching a glob pattern
    Keys {
        #[arg(default_value = "*")]
        pattern: String,
    },
}

fn init_logging() {
    let (non_blocking_writer, guard) = non_blocking(std::io::stderr());
    // Keep guard alive for the program lifetime to avoid log loss
    let _ = LOG_GUARD.set(guard);

    let fmt = tracing_subscriber::fmt()
        .with_writer(non_blocking_writer)
        .with_ansi(true)
        .with_target(false)
        .with_thread_ids(false)
        .with_thread_names(false)
        .with_level(true)
        .compact();

    // Map RUST_LOG to a max level (debug/info/warn/error/trace)
    let level = match std::env::var("RUST_LOG")
        .unwrap_or_else(|_| "info".to_string())
        .to_lowercase()
        .as_str()
    {
        "trace" => tracing::Level::TRACE,
        "debug" => tracing::Level::DEBUG,
        "warn" => tracing::Level::WARN,
        "error" => tracing::Level::ERROR,
        _ => tracing::Level::INFO,
    };

    let _ = fmt.with_max_level(level).try_init();
}

fn log_report(operation: &str, report: &ReplicationReport) {
    if !report.is_complete() {
        warn!(
            "{}: {} of {} mirror(s) not updated: {:?}",
            operation,
            report.failed(),
            report.attempted(),
            report.failed_endpoints()
        );
    }
}

/// Run one command and return the text to print
async fn run_command(
    manager: &CacheManager,
    command: Command,
) -> Result<String, Box<dyn std::error::Error>> {
    manager.init().await?;

    let output = match command {
        Command::Get { key } => match manager.get(key.as_bytes()).await? {
            Some(value) => String::from_utf8_lossy(&value).into_owned(),
            None => "(nil)".to_string(),
        },
        Command::Set { key, value, ttl } => {
            let ttl = ttl.unwrap_or(manager.config().expire);
            let (_, report) = manager
                .set_reporting(key.as_bytes(), value.into_bytes(), ttl)
                .await?;
            log_report("set", &report);
            "OK".to_string()
        }
        Command::Del { key } => {
            let report = manager.delete_reporting(key.as_bytes()).await?;
            log_report("del", &report);
            "OK".to_string()
        }
        Command::Flush => {
            let report = manager.flush_reporting().await?;
            log_report("flush", &report);
            "OK".to_string()
        }
        Command::Size => manager.size().await?.to_string(),
        Command::Keys { pattern } => {
            let mut keys: Vec<String> = manager
                .keys(&pattern)
                .await?
                .iter()
                .map(|key| String::from_utf8_lossy(key).into_owned())
                .collect();
            keys.sort();
            keys.join("\n")
        }
    };

    Ok(output)
}

async fn run_with_config_path(
    config_path: &str,
    command: Command,
) -> Result<String, Box<dyn std::error::Error>> {
    let manager = CacheManager::from_yaml_file(config_path).await?;
    info!(
        "Primary: {} ({} mirror host(s) configured)",
        manager.config().primary_endpoint(),
        manager.config().sibling_hosts.as_deref().unwrap_or("no")
    );
    run_command(&manager, command).await
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    init_logging();
    let args = Args::parse();
    let output = run_with_config_path(&args.config, args.command).await?;
    if !output.is_empty() {
        println!("{}", output);
    }
    Ok(())
}
