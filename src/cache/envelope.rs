//! Versioned wrapper around every persisted structure.
//!
//! Current layout is `{"version": 1, "data": ...}`. Data written before
//! versioning existed (a bare JSON value) is read as version 0 and migrated
//! in place instead of being thrown away.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Format version written by this build.
pub const CURRENT_VERSION: u32 = 1;

#[derive(Serialize)]
struct EnvelopeRef<'a, T> {
  version: u32,
  data: &'a T,
}

#[derive(Deserialize)]
struct RawEnvelope {
  version: u32,
  data: Value,
}

/// Why a stored value could not be read back.
#[derive(Debug)]
pub enum DecodeError {
  /// Not JSON at all, or JSON of the wrong shape
  Corrupt(String),
  /// Written by a newer build than this one
  UnsupportedVersion(u32),
}

impl std::fmt::Display for DecodeError {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    match self {
      DecodeError::Corrupt(e) => write!(f, "corrupt data: {}", e),
      DecodeError::UnsupportedVersion(v) => write!(f, "unsupported format version {}", v),
    }
  }
}

/// A decoded value plus the version it was stored under.
#[derive(Debug)]
pub struct Decoded<T> {
  pub data: T,
  pub version: u32,
}

impl<T> Decoded<T> {
  /// Whether the stored text predates the current format.
  pub fn needs_migration(&self) -> bool {
    self.version < CURRENT_VERSION
  }
}

pub fn encode<T: Serialize>(data: &T) -> serde_json::Result<String> {
  serde_json::to_string(&EnvelopeRef {
    version: CURRENT_VERSION,
    data,
  })
}

pub fn decode<T: DeserializeOwned>(text: &str) -> Result<Decoded<T>, DecodeError> {
  let value: Value =
    serde_json::from_str(text).map_err(|e| DecodeError::Corrupt(e.to_string()))?;

  let is_envelope = value
    .as_object()
    .map(|obj| obj.contains_key("version") && obj.contains_key("data"))
    .unwrap_or(false);

  let (version, data) = if is_envelope {
    let raw: RawEnvelope =
      serde_json::from_value(value).map_err(|e| DecodeError::Corrupt(e.to_string()))?;
    (raw.version, raw.data)
  } else {
    (0, value)
  };

  if version > CURRENT_VERSION {
    return Err(DecodeError::UnsupportedVersion(version));
  }

  // Versions 0 and 1 share the same inner shape.
  let data = serde_json::from_value(data).map_err(|e| DecodeError::Corrupt(e.to_string()))?;
  Ok(Decoded { data, version })
}
