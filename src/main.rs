use chrono::{DateTime, Utc};
use clap::{Parser, Subcommand};
use color_eyre::{eyre::eyre, Result};
use std::path::PathBuf;
use std::time::Duration;
use tracing::{info, warn};

use suitesync::cache::{KeyValueStorage, MemoryStorage, NoopStorage, OfflineStore, SqliteStorage};
use suitesync::config::Config;
use suitesync::orders::{NewOrder, Order, OrderItem, OrderStatus, StaffRole};
use suitesync::remote::{MockOrderService, OrderBackend, OrderService, RestOrderService};
use suitesync::sync::{NetworkEvent, NetworkObserver, PendingAction, Reconciler, ReplayReport};

type AppReconciler = Reconciler<Box<dyn KeyValueStorage>, OrderBackend>;

#[derive(Parser, Debug)]
#[command(name = "suitesync")]
#[command(about = "Offline-first order cache for suite operations")]
#[command(version)]
struct Args {
  /// Path to config file (default: $XDG_CONFIG_HOME/suitesync/config.yaml)
  #[arg(short, long, global = true)]
  config: Option<PathBuf>,

  /// Use the built-in mock backend
  #[arg(long, global = true)]
  mock: bool,

  /// Treat the backend as unreachable; writes are queued
  #[arg(long, global = true)]
  offline: bool,

  /// Keep the cache in memory only
  #[arg(long, global = true)]
  ephemeral: bool,

  /// Only log warnings and errors
  #[arg(short, long, global = true)]
  quiet: bool,

  #[command(subcommand)]
  command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
  /// List orders (backend first, cache as fallback)
  Orders {
    /// Only show orders this role works on
    #[arg(short, long, value_enum)]
    role: Option<StaffRole>,
  },
  /// Change an order's status
  SetStatus {
    order_id: String,
    #[arg(value_parser = parse_status)]
    status: OrderStatus,
  },
  /// Place a new order
  NewOrder {
    /// Suite the order is for
    #[arg(short, long)]
    suite: String,
    /// Item as name:quantity, repeatable
    #[arg(short, long = "item", value_parser = parse_item, required = true)]
    items: Vec<OrderItem>,
    /// Order placed before the event
    #[arg(long)]
    pre_order: bool,
    /// Requested delivery time (RFC 3339)
    #[arg(long)]
    delivery_time: Option<DateTime<Utc>>,
  },
  /// Show queued actions
  Queue,
  /// Drop every queued action
  QueueClear,
  /// Replay queued actions now
  Sync,
  /// Follow connectivity and replay whenever the backend comes back
  Watch,
  /// Show connectivity, queue and cache health
  Status,
}

fn parse_status(s: &str) -> std::result::Result<OrderStatus, String> {
  s.parse().map_err(|e: color_eyre::Report| e.to_string())
}

fn parse_item(s: &str) -> std::result::Result<OrderItem, String> {
  s.parse().map_err(|e: color_eyre::Report| e.to_string())
}

#[tokio::main]
async fn main() -> Result<()> {
  color_eyre::install()?;

  let args = Args::parse();

  // Load configuration
  let config = Config::load(args.config.as_deref())?;
  let config = if args.mock {
    Config {
      use_mock: true,
      ..config
    }
  } else {
    config
  };

  let _log_guard = suitesync::logging::init(config.log_dir().as_deref(), args.quiet);
  info!(version = env!("CARGO_PKG_VERSION"), "starting suitesync");

  let reconciler = build_reconciler(&config, args.ephemeral)?;

  match args.command {
    Command::Orders { role } => {
      connect(&reconciler, args.offline).await;
      let result = reconciler.load_orders(role).await;
      println!("source: {}", result.source);
      if let Some(cached_at) = result.cached_at {
        println!("cached at: {}", cached_at.to_rfc3339());
      }
      if result.is_stale() {
        println!("warning: orders may be out of date");
      }
      print_orders(&result.data);
    }
    Command::SetStatus { order_id, status } => {
      connect(&reconciler, args.offline).await;
      let outcome = reconciler.change_status(&order_id, status).await?;
      println!("{} -> {} ({:?})", order_id, status, outcome);
    }
    Command::NewOrder {
      suite,
      items,
      pre_order,
      delivery_time,
    } => {
      connect(&reconciler, args.offline).await;
      let request = NewOrder::new(suite, items, pre_order, delivery_time)?;
      let (order, outcome) = reconciler.create_order(request).await?;
      println!("created {} for suite {} ({:?})", order.id, order.suite_id, outcome);
    }
    Command::Queue => print_queue(&reconciler.store().get_pending_actions()),
    Command::QueueClear => {
      let count = reconciler.pending_count();
      reconciler.store().clear_pending_actions();
      println!("dropped {} queued action(s)", count);
    }
    Command::Sync => {
      if args.offline {
        return Err(eyre!("Cannot sync while --offline is set"));
      }
      reconciler.remote().ping().await?;
      let report = reconciler.replay().await;
      print_report(&report);
    }
    Command::Watch => {
      let online = if args.offline {
        false
      } else {
        connect(&reconciler, false).await
      };
      let interval = Duration::from_secs(config.network.probe_interval_secs.max(1));
      let observer = NetworkObserver::spawn_probe(reconciler.remote().clone(), interval, online);
      println!("watching connectivity every {:?}, ctrl-c to stop", interval);

      tokio::select! {
        _ = reconciler.run(observer) => {}
        _ = tokio::signal::ctrl_c() => {
          info!(pending = reconciler.pending_count(), "stopping watch");
        }
      }
    }
    Command::Status => print_status(&reconciler, args.offline).await,
  }

  Ok(())
}

fn build_reconciler(config: &Config, ephemeral: bool) -> Result<AppReconciler> {
  let storage: Box<dyn KeyValueStorage> = if !config.cache.enabled {
    Box::new(NoopStorage)
  } else if ephemeral {
    Box::new(MemoryStorage::new())
  } else {
    match &config.cache.path {
      Some(path) => Box::new(SqliteStorage::open_at(path)?),
      None => Box::new(SqliteStorage::open()?),
    }
  };

  let store = OfflineStore::new(storage)
    .with_stale_after(chrono::Duration::hours(config.cache.stale_after_hours.into()));

  let backend = if config.uses_mock() {
    OrderBackend::Mock(MockOrderService::with_sample_data())
  } else {
    OrderBackend::Rest(RestOrderService::new(config)?)
  };

  Ok(Reconciler::new(store, backend))
}

/// Probe the backend once and feed the result in as a connectivity change,
/// replaying the queue if we are online. Returns whether we are online.
async fn connect(reconciler: &AppReconciler, force_offline: bool) -> bool {
  let reachable = !force_offline && reconciler.remote().ping().await.is_ok();
  if !reachable && !force_offline {
    warn!(backend = reconciler.remote().name(), "backend unreachable, working offline");
  }

  // Start from offline so reaching the backend counts as a reconnect
  reconciler.set_online(false);
  let event = if reachable {
    NetworkEvent::Online
  } else {
    NetworkEvent::Offline
  };
  if let Some(report) = reconciler.handle_network_event(event).await {
    print_report(&report);
  }
  reachable
}

fn print_orders(orders: &[Order]) {
  if orders.is_empty() {
    println!("no orders");
    return;
  }

  println!(
    "{:<16} {:<8} {:<12} {:<4} ITEMS",
    "ID", "SUITE", "STATUS", "PRE"
  );
  for order in orders {
    let items: Vec<String> = order
      .items
      .iter()
      .map(|item| format!("{} x{}", item.name, item.quantity))
      .collect();
    println!(
      "{:<16} {:<8} {:<12} {:<4} {}",
      order.id,
      order.suite_id,
      order.status,
      if order.is_pre_order { "yes" } else { "" },
      items.join(", ")
    );
  }
}

fn print_queue(actions: &[PendingAction]) {
  if actions.is_empty() {
    println!("queue is empty");
    return;
  }

  for (position, action) in actions.iter().enumerate() {
    let detail = match action {
      PendingAction::StatusChange { new_status, .. } => format!("-> {}", new_status),
      PendingAction::NewOrder { order, .. } => format!("suite {}", order.suite_id),
    };
    println!(
      "{:>3}. {:<14} {:<16} {:<18} {}",
      position + 1,
      action.kind(),
      action.order_id(),
      detail,
      action.timestamp().to_rfc3339()
    );
  }
}

fn print_report(report: &ReplayReport) {
  println!(
    "replayed {} action(s), skipped {}, dropped {}, {} remaining",
    report.applied, report.skipped, report.dropped, report.remaining
  );
  if let Some(failure) = &report.failure {
    println!(
      "stopped at {} for {}: {}",
      failure.kind, failure.order_id, failure.error
    );
  }
}

async fn print_status(reconciler: &AppReconciler, force_offline: bool) {
  let reachable = !force_offline && reconciler.remote().ping().await.is_ok();
  println!(
    "backend: {} ({})",
    reconciler.remote().name(),
    if reachable { "reachable" } else { "unreachable" }
  );
  println!("pending actions: {}", reconciler.pending_count());

  let cached = reconciler.store().get_cached_orders();
  match (&cached.orders, cached.captured_at) {
    (Some(orders), Some(at)) => println!(
      "cache: {} order(s) captured {}{}",
      orders.len(),
      at.to_rfc3339(),
      if cached.is_stale { " (stale)" } else { "" }
    ),
    (Some(orders), None) => println!("cache: {} order(s), capture time unknown", orders.len()),
    (None, _) => println!("cache: empty"),
  }

  let diagnostics = reconciler.store().diagnostics();
  if diagnostics.total() > 0 {
    println!(
      "storage failures: read {} write {} decode {} encode {}",
      diagnostics.read_failures,
      diagnostics.write_failures,
      diagnostics.decode_failures,
      diagnostics.encode_failures
    );
  }
}
