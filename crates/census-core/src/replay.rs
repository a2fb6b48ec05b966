//! Replay engine — reconstructs historical snapshots from the event log and
//! re-applies later deltas on top of them.
//!
//! Nothing here writes; every function only reads through [`EventLog`].

use crate::{
  Error, Result,
  changes::Snapshot,
  event::Event,
  ledger::{EventLog, TxResult},
  person::{PersonId, Version},
};

/// The snapshot of `person_id` as it was immediately after `version` was
/// committed.
pub fn snapshot_at<L: EventLog>(
  log: &L,
  person_id: PersonId,
  version: Version,
) -> TxResult<Snapshot, L> {
  match log.find_at_version(person_id, version)? {
    Some(event) => Ok(event.state_after),
    None => Err(Error::VersionNotFound { person_id, version }.into()),
  }
}

/// Apply every event in `(from, to]` onto `start`, in version order.
///
/// A range with `to <= from` is a no-op and returns `start` unchanged. A gap
/// in the log is reported as [`Error::VersionNotFound`] for the first
/// missing version.
pub fn replay_forward<L: EventLog>(
  log: &L,
  person_id: PersonId,
  from: Version,
  to: Version,
  start: Snapshot,
) -> TxResult<Snapshot, L> {
  if to <= from {
    return Ok(start);
  }
  let events = log.find_range(person_id, from, to)?;
  check_contiguous(person_id, from, to, &events)?;
  Ok(fold(start, &events))
}

/// Fold `events` onto `start`, last writer wins per field.
///
/// Each event contributes the values it committed for the fields it touched
/// ([`Event::applied`]), never a stale writer's losing value. `version` and
/// `updated_at` follow the last event applied, so folding the tail of a log
/// onto one of its snapshots reproduces the latest snapshot.
pub fn fold(start: Snapshot, events: &[Event]) -> Snapshot {
  events.iter().fold(start, |state, event| {
    let mut next = state.apply(&event.applied());
    next.version = event.new_version;
    next.updated_at = event.state_after.updated_at;
    next
  })
}

/// Check that `events` hold exactly the versions `after + 1 ..= through`.
pub fn check_contiguous(
  person_id: PersonId,
  after: Version,
  through: Version,
  events: &[Event],
) -> Result<()> {
  let mut expected = after + 1;
  for event in events {
    if event.new_version != expected || event.base_version != expected - 1 {
      return Err(Error::VersionNotFound { person_id, version: expected });
    }
    expected += 1;
  }
  if expected <= through {
    return Err(Error::VersionNotFound { person_id, version: expected });
  }
  Ok(())
}
