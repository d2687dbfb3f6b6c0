use anicache::cache::{CacheStore, NoopStore, SqliteStore};
use anicache::config::Config;
use anicache::connectivity::{ConnectivityOracle, ManualConnectivity, ProbeConnectivity};
use anicache::jikan::{CachedJikanClient, JikanClient, ListItem};
use anicache::pagination::PageAccumulator;
use anicache::query::LoadState;
use clap::{Parser, Subcommand};
use color_eyre::eyre::eyre;
use color_eyre::Result;
use futures::StreamExt;
use std::path::PathBuf;
use std::sync::Arc;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::EnvFilter;

type Client = CachedJikanClient<JikanClient, Arc<dyn CacheStore>, Arc<dyn ConnectivityOracle>>;

#[derive(Parser, Debug)]
#[command(name = "anicache")]
#[command(about = "Browse the Jikan top anime list, with an offline cache")]
#[command(version)]
struct Args {
  /// Path to config file (default: $XDG_CONFIG_HOME/anicache/config.yaml)
  #[arg(short, long)]
  config: Option<PathBuf>,

  /// Never touch the network; answer from the cache only
  #[arg(long)]
  offline: bool,

  #[command(subcommand)]
  command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
  /// Show one page of the top list
  Top {
    #[arg(short, long, default_value_t = 1)]
    page: i64,

    /// Replace the cache with fresh data (page 1 only)
    #[arg(short, long)]
    refresh: bool,
  },
  /// Show a single entry
  Detail { id: i64 },
  /// Load pages one after another, as a scrolling list would
  Browse {
    #[arg(short, long, default_value_t = 3)]
    pages: i64,

    #[arg(short, long)]
    refresh: bool,
  },
  /// Print connectivity changes until interrupted
  Watch,
  /// Remove every cached entry
  Clear,
}

#[tokio::main]
async fn main() -> Result<()> {
  color_eyre::install()?;

  let args = Args::parse();
  let config = Config::load(args.config.as_deref())?;
  let _log_guard = init_logging()?;

  let cache: Arc<dyn CacheStore> = if config.cache.enabled {
    Arc::new(SqliteStore::open(&config.cache_path()?)?)
  } else {
    Arc::new(NoopStore)
  };

  let connectivity: Arc<dyn ConnectivityOracle> = if args.offline {
    Arc::new(ManualConnectivity::new(false))
  } else {
    Arc::new(ProbeConnectivity::start(&config.connectivity).await)
  };

  let source = JikanClient::new(&config.api)?;
  let client = Arc::new(
    CachedJikanClient::new(source, cache, connectivity).with_page_limit(config.api.page_limit),
  );

  match args.command {
    Command::Top { page, refresh } => top(&client, page, refresh).await,
    Command::Detail { id } => detail(&client, id).await,
    Command::Browse { pages, refresh } => browse(client, pages, refresh).await,
    Command::Watch => watch(&client).await,
    Command::Clear => {
      client.cache().clear_all().await?;
      println!("Cache cleared");
      Ok(())
    }
  }
}

/// Log to a daily file in the data directory so stdout stays clean.
fn init_logging() -> Result<WorkerGuard> {
  let log_dir = Config::data_dir()?;
  std::fs::create_dir_all(&log_dir)?;

  let appender = tracing_appender::rolling::daily(&log_dir, "anicache.log");
  let (writer, guard) = tracing_appender::non_blocking(appender);

  let filter =
    EnvFilter::try_from_env("ANICACHE_LOG").unwrap_or_else(|_| EnvFilter::new("anicache=info"));

  tracing_subscriber::fmt()
    .with_env_filter(filter)
    .with_writer(writer)
    .with_ansi(false)
    .init();

  Ok(guard)
}

async fn top(client: &Client, page: i64, refresh: bool) -> Result<()> {
  if page < 1 {
    return Err(eyre!("Page must be 1 or greater"));
  }

  let result = client.fetch_list_page(page, refresh).await?;
  for item in &result.items {
    print_row(item);
  }

  let more = if result.has_next_page { "more available" } else { "end of list" };
  println!("-- page {}, {}", result.current_page, more);
  Ok(())
}

async fn detail(client: &Client, id: i64) -> Result<()> {
  let item = client.fetch_detail(id).await?;

  println!("{} (#{})", item.title, item.id);
  if let Some(japanese) = &item.title_japanese {
    println!("  {}", japanese);
  }
  println!(
    "  {} | {} episodes | {}",
    item.kind.as_deref().unwrap_or("?"),
    item.episodes.map(|e| e.to_string()).unwrap_or_else(|| "?".to_string()),
    item.status.as_deref().unwrap_or("unknown status"),
  );
  println!(
    "  score {} | rank {} | {}",
    item.score.map(|s| format!("{:.2}", s)).unwrap_or_else(|| "-".to_string()),
    item.rank.map(|r| r.to_string()).unwrap_or_else(|| "-".to_string()),
    item.rating.as_deref().unwrap_or("unrated"),
  );
  if !item.genres.is_empty() {
    println!("  {}", item.genres.join(", "));
  }
  println!("  {}", item.trailer.label());
  if let Some(synopsis) = &item.synopsis {
    println!();
    println!("{}", synopsis);
  }
  Ok(())
}

async fn browse(client: Arc<Client>, pages: i64, refresh: bool) -> Result<()> {
  let mut session = PageAccumulator::new(client);
  if session.is_offline() {
    eprintln!("Offline, showing cached entries");
  }

  session.refresh(refresh);
  let mut printed = 0;

  while session.next_update().await {
    let items = match session.state() {
      LoadState::Success(items) => items,
      LoadState::Error(message) => return Err(eyre!("{}", message)),
      _ => continue,
    };

    for item in &items[printed..] {
      print_row(item);
    }
    printed = items.len();

    if session.pagination_failed() {
      eprintln!("Could not load page {}", session.current_page() + 1);
      break;
    }
    if session.is_loading_more() {
      continue;
    }
    if !session.has_next_page() || session.current_page() >= pages {
      break;
    }
    session.load_next_page();
  }

  println!("-- {} entries, through page {}", printed, session.current_page());
  Ok(())
}

async fn watch(client: &Client) -> Result<()> {
  let mut changes = client.connectivity().observe_changes();
  loop {
    tokio::select! {
      change = changes.next() => match change {
        Some(true) => println!("online"),
        Some(false) => println!("offline"),
        None => return Ok(()),
      },
      _ = tokio::signal::ctrl_c() => return Ok(()),
    }
  }
}

fn print_row(item: &ListItem) {
  let rank = item.rank.map(|r| r.to_string()).unwrap_or_else(|| "-".to_string());
  let score = item.score.map(|s| format!("{:.2}", s)).unwrap_or_default();
  println!("{:>5}  {:<60} {:>5}  {}", rank, item.title, score, item.trailer.label());
}
