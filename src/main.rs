//! Redis Lite - interactive cache shell
//!
//! Reads text commands from stdin and runs them against a durable LRU cache.

use std::path::Path;
use std::sync::Arc;

use anyhow::Context;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader, Stdout};
use tokio::signal;
use tokio::sync::Mutex;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use redis_lite::shell::{decode_line, execute, Command, Reply};
use redis_lite::{spawn_snapshot_task, Config, LruCache, SharedCache};

/// Main entry point for the Redis Lite shell.
///
/// # Startup Sequence
/// 1. Initialize tracing subscriber for logging (stderr)
/// 2. Load configuration from environment variables; argv[1] overrides capacity
/// 3. Open the cache, replaying snapshot and log
/// 4. Start the background snapshot task if an interval is configured
/// 5. Serve commands until EXIT, end of input or Ctrl+C
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Defaults to "info" level, can be overridden with RUST_LOG env var
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "redis_lite=info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let mut config = Config::from_env();
    if let Some(arg) = std::env::args().nth(1) {
        config.capacity = arg
            .parse()
            .with_context(|| format!("invalid capacity argument '{}'", arg))?;
    }
    info!(?config, "Configuration loaded");

    ensure_parent_dir(&config.aof_path);
    ensure_parent_dir(&config.snapshot_path);

    let cache = LruCache::open(&config).context("failed to open cache")?;
    let cache: SharedCache = Arc::new(Mutex::new(cache));

    let snapshot_handle = (config.snapshot_interval > 0)
        .then(|| spawn_snapshot_task(cache.clone(), config.snapshot_interval));

    let mut stdout = tokio::io::stdout();
    write_line(
        &mut stdout,
        &format!("redis-lite capacity={}", config.capacity),
    )
    .await?;
    write_line(
        &mut stdout,
        "Commands: SET key value | GET key | DEL key | INFO | SAVE | FLUSH | EXIT",
    )
    .await?;

    let mut stdin = BufReader::new(tokio::io::stdin());
    let mut raw = Vec::new();
    loop {
        stdout.write_all(b"rl> ").await?;
        stdout.flush().await?;

        raw.clear();
        let line = tokio::select! {
            read = stdin.read_until(b'\n', &mut raw) => match read {
                Ok(0) => None,
                Ok(_) => Some(decode_line(&raw)),
                Err(e) => {
                    warn!(error = %e, "stdin read failed; shutting down");
                    None
                }
            },
            _ = signal::ctrl_c() => {
                info!("Received Ctrl+C, initiating shutdown...");
                None
            }
        };

        let Some(line) = line else {
            // End of input: keep the state compact for the next start
            if let Err(e) = cache.lock().await.save_snapshot() {
                warn!(error = %e, "final snapshot failed; log retained");
            }
            break;
        };

        let (reply, exit) = match Command::parse(&line) {
            Ok(Some(command)) => {
                let exit = command == Command::Exit;
                (execute(&mut *cache.lock().await, command), exit)
            }
            Ok(None) => continue,
            Err(msg) => (Reply::Error(msg), false),
        };
        write_line(&mut stdout, &reply.to_string()).await?;
        if exit {
            break;
        }
    }

    if let Some(handle) = snapshot_handle {
        handle.abort();
        warn!("Snapshot task aborted");
    }
    info!("Shutdown complete");
    Ok(())
}

async fn write_line(stdout: &mut Stdout, text: &str) -> std::io::Result<()> {
    stdout.write_all(text.as_bytes()).await?;
    stdout.write_all(b"\n").await?;
    stdout.flush().await
}

/// Creates the directory holding a data file. Failure only costs durability.
fn ensure_parent_dir(path: &Path) {
    let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) else {
        return;
    };
    if let Err(e) = std::fs::create_dir_all(parent) {
        warn!(dir = %parent.display(), error = %e, "cannot create data directory");
    }
}
