//! Reconciliation controller — the OCC decision procedure run for every
//! mutating request.
//!
//! Each function expects to run inside one transaction: it reads the current
//! version, decides a path, commits the new snapshot and appends exactly one
//! event through the same handle. Any error leaves the caller to roll the
//! whole transaction back.
//!
//! | Claimed vs current | Patch | Delete |
//! |--------------------|-------|--------|
//! | `claimed <= 0`      | `InvalidVersion` | `InvalidVersion` |
//! | `claimed > current` | `VersionAhead` | `VersionAhead` |
//! | `claimed == current`| direct | soft delete |
//! | `claimed < current` | replay and merge | `Stale` |

use chrono::{DateTime, Utc};

use crate::{
  Error,
  changes::{Changes, Snapshot},
  event::NewEvent,
  ledger::{EventLog, SnapshotStore, TxResult},
  person::{NewPerson, Person, PersonId, PersonPatch, Version},
  replay::{replay_forward, snapshot_at},
};

/// Which branch of the controller produced a [`Reconciled`] result.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Path {
  /// Nothing was requested; no version was consumed.
  Unchanged,
  /// The client was up to date.
  Direct,
  /// The client was stale; its edit was layered under `replayed_events`
  /// later events.
  Replayed { replayed_events: i64 },
}

/// Outcome of [`patch`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reconciled {
  pub person: Person,
  pub path:   Path,
}

/// Insert a new person at version 1 together with its founding event
/// (`base_version = 0`).
pub fn create<T>(tx: &T, input: NewPerson, now: DateTime<Utc>) -> TxResult<Person, T>
where
  T: SnapshotStore + EventLog,
{
  input.validate()?;
  if tx.find_active_by_national_id(&input.national_id)?.is_some() {
    return Err(Error::Conflict(input.national_id).into());
  }

  let person = tx.create(&input, now)?;
  let state_after = person.snapshot();
  tx.append(NewEvent {
    person_id: person.id,
    base_version: 0,
    changes: Changes::full(&state_after),
    state_after,
    created_at: now,
  })?;
  Ok(person)
}

/// Apply a partial update claimed against `claimed`.
///
/// A stale claim is reconciled rather than rejected: the client's edit is
/// applied to the snapshot it last saw and every later event is replayed on
/// top, so later writes to the same field win while edits to other fields
/// survive. The appended event records the client's change-set as given;
/// replay reads the committed values of those fields from its `state_after`.
pub fn patch<T>(
  tx: &T,
  id: PersonId,
  claimed: Version,
  patch: PersonPatch,
  now: DateTime<Utc>,
) -> TxResult<Reconciled, T>
where
  T: SnapshotStore + EventLog,
{
  let current = load_active(tx, id)?;
  check_claim(claimed, current.version)?;
  patch.validate()?;

  if let Some(national_id) = &patch.national_id
    && let Some(holder) = tx.find_active_by_national_id(national_id)?
    && holder.id != id
  {
    return Err(Error::Conflict(national_id.clone()).into());
  }

  let changes = Changes::from(patch);
  if changes.is_empty() {
    return Ok(Reconciled { person: current, path: Path::Unchanged });
  }

  let (merged, path) = if claimed == current.version {
    (current.snapshot().apply(&changes), Path::Direct)
  } else {
    let base = snapshot_at(tx, id, claimed)?.apply(&changes);
    let merged = replay_forward(tx, id, claimed, current.version, base)?;
    (merged, Path::Replayed { replayed_events: current.version - claimed })
  };

  let person = commit_next(tx, &current, merged, changes, now)?;
  Ok(Reconciled { person, path })
}

/// Soft-delete a person. Deletion requires an up-to-date view and is never
/// reconciled.
pub fn delete<T>(
  tx: &T,
  id: PersonId,
  claimed: Version,
  now: DateTime<Utc>,
) -> TxResult<Person, T>
where
  T: SnapshotStore + EventLog,
{
  let current = load_active(tx, id)?;
  check_claim(claimed, current.version)?;
  if claimed < current.version {
    return Err(Error::Stale { claimed, current: current.version }.into());
  }

  let changes = Changes::deletion();
  let next = current.snapshot().apply(&changes);
  commit_next(tx, &current, next, changes, now)
}

fn load_active<T: SnapshotStore>(tx: &T, id: PersonId) -> TxResult<Person, T> {
  match tx.get(id)? {
    Some(person) if !person.deleted => Ok(person),
    _ => Err(Error::NotFound(id).into()),
  }
}

fn check_claim(claimed: Version, current: Version) -> crate::Result<()> {
  if claimed <= 0 {
    return Err(Error::InvalidVersion(claimed));
  }
  if claimed > current {
    return Err(Error::VersionAhead { claimed, current });
  }
  Ok(())
}

/// Commit `next` as `current.version + 1` and append the matching event.
fn commit_next<T>(
  tx: &T,
  current: &Person,
  mut next: Snapshot,
  changes: Changes,
  now: DateTime<Utc>,
) -> TxResult<Person, T>
where
  T: SnapshotStore + EventLog,
{
  next.id = current.id;
  next.version = current.version + 1;
  next.updated_at = now;

  let person = tx.commit(current.id, current.version, &next)?;
  tx.append(NewEvent {
    person_id: person.id,
    base_version: current.version,
    changes,
    state_after: person.snapshot(),
    created_at: now,
  })?;
  Ok(person)
}
