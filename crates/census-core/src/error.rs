//! Error types for `census-core`.

use thiserror::Error;

use crate::person::{PersonId, Version};

#[derive(Debug, Error)]
pub enum Error {
  /// The person does not exist or has been soft-deleted.
  #[error("person not found: {0}")]
  NotFound(PersonId),

  /// The national id is already held by another active person.
  #[error("national id {0:?} is already registered")]
  Conflict(String),

  #[error("invalid version: {0}")]
  InvalidVersion(Version),

  /// The client claims a version the server has never reached.
  #[error("client version {claimed} is ahead of server version {current}")]
  VersionAhead { claimed: Version, current: Version },

  /// A delete was attempted from an outdated view.
  #[error("client version {claimed} is stale (current is {current})")]
  Stale { claimed: Version, current: Version },

  /// A historical version required for reconciliation is missing from the
  /// event log.
  #[error("version {version} of person {person_id} is not in the event log")]
  VersionNotFound { person_id: PersonId, version: Version },

  #[error("invalid {field}: {reason}")]
  InvalidField { field: &'static str, reason: String },

  /// The conditional write lost a race against another writer.
  #[error("person {person_id} changed concurrently (expected version {expected})")]
  WriteConflict { person_id: PersonId, expected: Version },

  #[error("unsupported snapshot format: {0}")]
  UnsupportedFormat(u32),

  #[error("serialization error: {0}")]
  Serialization(#[from] serde_json::Error),
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
