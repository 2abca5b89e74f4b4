use clap::{Parser, Subcommand};
use color_eyre::{eyre::eyre, Result};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::oneshot;
use tracing_appender::{non_blocking::WorkerGuard, rolling};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use mapworker::cache::SqliteStorage;
use mapworker::config::Config;
use mapworker::control::ControlMessage;
use mapworker::db::Database;
use mapworker::host::LogHost;
use mapworker::network::HttpFetcher;
use mapworker::request::{Destination, Request};
use mapworker::sync::SqliteActionStore;
use mapworker::{EventOutcome, ServiceWorker, WorkerEvent};

type Worker = ServiceWorker<SqliteStorage, SqliteActionStore, HttpFetcher>;

#[derive(Parser, Debug)]
#[command(name = "mapworker")]
#[command(about = "Offline resource manager for the map app")]
#[command(version)]
struct Args {
  /// Path to config file (default: $XDG_CONFIG_HOME/mapworker/config.yaml)
  #[arg(short, long)]
  config: Option<PathBuf>,

  #[command(subcommand)]
  command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
  /// Pre-fetch the app shell and activate this version
  Install,
  /// Answer a request the way the worker would
  Fetch {
    /// Absolute URL, or a path relative to the configured origin
    url: String,
    #[arg(short = 'X', long, default_value = "GET")]
    method: String,
    /// Treat the request as a page navigation
    #[arg(long)]
    document: bool,
    /// Extra header, as `Name: value`
    #[arg(short = 'H', long = "header")]
    headers: Vec<String>,
    /// Request body
    #[arg(short, long)]
    data: Option<String>,
    /// Print status and headers before the body
    #[arg(short, long)]
    include: bool,
  },
  /// Send a control message, e.g. '{"type":"GET_VERSION"}'
  ///
  /// Every run starts a fresh, not yet installed worker, so SKIP_WAITING has
  /// nothing to activate here; `install` already activates.
  Message { json: String },
  /// Queue an action for background sync
  Enqueue {
    url: String,
    #[arg(short = 'X', long, default_value = "POST")]
    method: String,
    #[arg(short, long)]
    data: Option<String>,
  },
  /// Drop a queued action
  Cancel { id: i64 },
  /// List queued actions
  Queue,
  /// Replay queued actions (connectivity restored)
  Sync {
    /// Sync tag (default: the configured one)
    #[arg(long)]
    tag: Option<String>,
  },
  /// Show the notification for a push payload
  Push { payload: Option<String> },
  /// Click a notification action
  Click { action: Option<String> },
  /// List cache tiers with their entry counts
  Tiers,
}

#[tokio::main]
async fn main() -> Result<()> {
  color_eyre::install()?;

  let args = Args::parse();
  let config = Config::load(args.config.as_deref())?;
  let _guard = init_tracing(&config)?;

  let db = Arc::new(Database::open(&config.database_path()?)?);
  let storage = Arc::new(SqliteStorage::new(Arc::clone(&db)));
  let worker: Worker = ServiceWorker::new(
    &config,
    Arc::clone(&storage),
    SqliteActionStore::new(Arc::clone(&db)),
    Arc::new(HttpFetcher::new()?),
    Arc::new(LogHost),
  );

  let result = run(args.command, &config, &worker, &storage).await;
  // Let revalidation finish before the process exits
  worker.settle().await;
  result
}

async fn run(
  command: Command,
  config: &Config,
  worker: &Worker,
  storage: &SqliteStorage,
) -> Result<()> {
  match command {
    Command::Install => {
      let outcome = worker.dispatch(WorkerEvent::Install).await?;
      if let EventOutcome::Installed { activate_now: true } = outcome {
        let outcome = worker.dispatch(WorkerEvent::Activate).await?;
        if let EventOutcome::Activated { evicted } = outcome {
          for tier in evicted {
            println!("deleted {}", tier);
          }
        }
      }
      println!("active {}", worker.version());
    }
    Command::Fetch {
      url,
      method,
      document,
      headers,
      data,
      include,
    } => {
      let mut request = Request::new(&method, config.origin.join(&url)?);
      if document {
        request = request.with_destination(Destination::Document);
      }
      for header in &headers {
        let (name, value) = header
          .split_once(':')
          .ok_or_else(|| eyre!("Invalid header '{}', expected 'Name: value'", header))?;
        request = request.with_header(name.trim(), value.trim());
      }
      if let Some(data) = data {
        request = request.with_body(data);
      }

      let served = worker.fetch(request).await?;
      let mut stdout = std::io::stdout().lock();
      if include {
        writeln!(stdout, "{} ({:?})", served.snapshot.status, served.source)?;
        for (name, value) in &served.snapshot.headers {
          writeln!(stdout, "{}: {}", name, value)?;
        }
        writeln!(stdout)?;
      }
      stdout.write_all(&served.snapshot.body)?;
      stdout.flush()?;
    }
    Command::Message { json } => {
      let message: ControlMessage = serde_json::from_str(&json)
        .map_err(|e| eyre!("Invalid control message: {}", e))?;
      let (tx, rx) = oneshot::channel();
      let outcome = worker
        .dispatch(WorkerEvent::Message {
          message,
          reply: Some(tx),
        })
        .await?;
      if let Ok(reply) = rx.await {
        println!("{}", serde_json::to_string(&reply)?);
      } else if let EventOutcome::Activated { .. } = outcome {
        println!("active {}", worker.version());
      }
    }
    Command::Enqueue { url, method, data } => {
      let mut request = Request::new(&method, config.origin.join(&url)?);
      if let Some(data) = data {
        request = request
          .with_header("Content-Type", "application/json")
          .with_body(data);
      }
      let action = worker.queue().enqueue(&request)?;
      println!("{}", action.id);
    }
    Command::Cancel { id } => {
      if !worker.queue().cancel(id)? {
        return Err(eyre!("No queued action with id {}", id));
      }
    }
    Command::Queue => {
      for action in worker.queue().pending()? {
        println!(
          "{}\t{}\t{}\t{}",
          action.id,
          action.enqueued_at.format("%Y-%m-%d %H:%M:%S"),
          action.method,
          action.url
        );
      }
    }
    Command::Sync { tag } => {
      let tag = tag.unwrap_or_else(|| config.sync.tag.clone());
      match worker.dispatch(WorkerEvent::Sync { tag }).await? {
        EventOutcome::Synced(report) => {
          println!(
            "replayed {}, still queued {}",
            report.replayed.len(),
            report.failed.len()
          );
          for failure in &report.failed {
            println!("  {}: {}", failure.id, failure.error);
          }
        }
        _ => println!("ignored"),
      }
    }
    Command::Push { payload } => {
      worker.dispatch(WorkerEvent::Push { payload }).await?;
    }
    Command::Click { action } => {
      worker
        .dispatch(WorkerEvent::NotificationClick { action })
        .await?;
    }
    Command::Tiers => {
      for (tier, count) in storage.entry_counts()? {
        let marker = if worker.tiers().names().is_current(&tier) {
          "*"
        } else {
          " "
        };
        println!("{} {}\t{}", marker, tier, count);
      }
    }
  }

  Ok(())
}

/// Log to stderr, or to `log_file` when configured. `RUST_LOG` overrides the level.
fn init_tracing(config: &Config) -> Result<Option<WorkerGuard>> {
  let filter =
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("mapworker=info"));

  let Some(path) = &config.log_file else {
    tracing_subscriber::registry()
      .with(fmt::layer().with_writer(std::io::stderr))
      .with(filter)
      .init();
    return Ok(None);
  };

  let file_name = path
    .file_name()
    .ok_or_else(|| eyre!("Invalid log file path: {}", path.display()))?;
  let dir = path
    .parent()
    .filter(|p| !p.as_os_str().is_empty())
    .unwrap_or_else(|| Path::new("."));
  let (writer, guard) = tracing_appender::non_blocking(rolling::never(dir, file_name));

  tracing_subscriber::registry()
    .with(fmt::layer().with_writer(writer).with_ansi(false))
    .with(filter)
    .init();
  Ok(Some(guard))
}
