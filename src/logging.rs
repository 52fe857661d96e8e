//! Structured logging: stderr plus a daily rolling file.

use std::path::Path;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

const DEFAULT_FILTER: &str = "info,suitesync=debug";

/// Install the global subscriber.
///
/// The returned guard flushes the file writer when dropped, so keep it alive
/// until exit. Without a usable log directory only stderr is written.
pub fn init(log_dir: Option<&Path>, quiet: bool) -> Option<WorkerGuard> {
  let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
    if quiet {
      EnvFilter::new("warn")
    } else {
      EnvFilter::new(DEFAULT_FILTER)
    }
  });

  let console_layer = fmt::layer().with_writer(std::io::stderr).with_target(true);

  let (file_layer, guard) = match log_dir.filter(|dir| std::fs::create_dir_all(dir).is_ok()) {
    Some(dir) => {
      let file_appender = tracing_appender::rolling::daily(dir, "suitesync");
      let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);
      let layer = fmt::layer()
        .with_writer(non_blocking)
        .with_ansi(false)
        .with_target(true);
      (Some(layer), Some(guard))
    }
    None => (None, None),
  };

  // A second init (e.g. from tests) is not an error worth failing over
  let _ = tracing_subscriber::registry()
    .with(env_filter)
    .with(console_layer)
    .with(file_layer)
    .try_init();

  guard
}
