//! Counters for storage failures the store absorbs instead of surfacing.

use std::sync::atomic::{AtomicU64, Ordering};
use tracing::warn;

/// Which step of a store operation failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StorageOp {
  Read,
  Write,
  Decode,
  Encode,
}

impl StorageOp {
  pub fn as_str(&self) -> &'static str {
    match self {
      StorageOp::Read => "read",
      StorageOp::Write => "write",
      StorageOp::Decode => "decode",
      StorageOp::Encode => "encode",
    }
  }
}

/// Failure counters, one per [`StorageOp`].
#[derive(Debug, Default)]
pub struct StorageDiagnostics {
  read: AtomicU64,
  write: AtomicU64,
  decode: AtomicU64,
  encode: AtomicU64,
}

/// Point-in-time copy of [`StorageDiagnostics`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DiagnosticsSnapshot {
  pub read_failures: u64,
  pub write_failures: u64,
  pub decode_failures: u64,
  pub encode_failures: u64,
}

impl DiagnosticsSnapshot {
  pub fn total(&self) -> u64 {
    self.read_failures + self.write_failures + self.decode_failures + self.encode_failures
  }
}

impl StorageDiagnostics {
  /// Log a structured event for an absorbed failure and count it.
  pub fn record(&self, op: StorageOp, key: &str, error: &dyn std::fmt::Display) {
    let count = self.counter(op).fetch_add(1, Ordering::Relaxed) + 1;
    warn!(
      op = op.as_str(),
      key,
      error = %error,
      failures = count,
      "storage failure absorbed"
    );
  }

  pub fn snapshot(&self) -> DiagnosticsSnapshot {
    DiagnosticsSnapshot {
      read_failures: self.read.load(Ordering::Relaxed),
      write_failures: self.write.load(Ordering::Relaxed),
      decode_failures: self.decode.load(Ordering::Relaxed),
      encode_failures: self.encode.load(Ordering::Relaxed),
    }
  }

  fn counter(&self, op: StorageOp) -> &AtomicU64 {
    match op {
      StorageOp::Read => &self.read,
      StorageOp::Write => &self.write,
      StorageOp::Decode => &self.decode,
      StorageOp::Encode => &self.encode,
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_record_counts_per_op() {
    let diagnostics = StorageDiagnostics::default();
    diagnostics.record(StorageOp::Write, "k", &"quota exceeded");
    diagnostics.record(StorageOp::Write, "k", &"quota exceeded");
    diagnostics.record(StorageOp::Decode, "k", &"bad json");

    let snapshot = diagnostics.snapshot();
    assert_eq!(snapshot.write_failures, 2);
    assert_eq!(snapshot.decode_failures, 1);
    assert_eq!(snapshot.read_failures, 0);
    assert_eq!(snapshot.total(), 3);
  }
}
