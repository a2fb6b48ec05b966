//! Transaction-scoped storage contracts used by the reconciliation
//! controller.
//!
//! A backend hands the controller one handle implementing both traits for
//! the duration of a single transaction. Everything the controller does
//! through that handle either commits together or not at all; the core never
//! opens, commits or rolls back anything itself.

use chrono::{DateTime, Utc};

use crate::{
  Error,
  changes::Snapshot,
  event::{Event, NewEvent},
  person::{NewPerson, Person, PersonFilter, PersonId, Version},
};

/// Shared error type for a transaction handle.
pub trait Transaction {
  type Error: From<Error>;
}

/// `Result` specialised to the error type of transaction handle `X`.
pub type TxResult<T, X> = Result<T, <X as Transaction>::Error>;

/// Current materialised state of each person.
pub trait SnapshotStore: Transaction {
  /// Fetch a person by id, including soft-deleted rows.
  fn get(&self, id: PersonId) -> Result<Option<Person>, Self::Error>;

  /// The non-deleted person holding `national_id`, if any.
  fn find_active_by_national_id(
    &self,
    national_id: &str,
  ) -> Result<Option<Person>, Self::Error>;

  /// Persons matching `filter`, ordered by id ascending.
  fn list(&self, filter: &PersonFilter) -> Result<Vec<Person>, Self::Error>;

  /// Insert a new person at version 1.
  ///
  /// Fails with [`Error::Conflict`] if the national id is held by another
  /// active person.
  fn create(&self, input: &NewPerson, now: DateTime<Utc>) -> Result<Person, Self::Error>;

  /// Overwrite the row with `next` if and only if its stored version is
  /// still `expected`.
  ///
  /// Fails with [`Error::WriteConflict`] when the version moved, and with
  /// [`Error::Conflict`] on a national-id collision.
  fn commit(
    &self,
    id: PersonId,
    expected: Version,
    next: &Snapshot,
  ) -> Result<Person, Self::Error>;
}

/// Append-only, per-person ordered log of version transitions.
pub trait EventLog: Transaction {
  /// Insert one event. A second event for the same `new_version` fails with
  /// [`Error::WriteConflict`].
  fn append(&self, event: NewEvent) -> Result<Event, Self::Error>;

  /// The event whose `new_version == version`.
  fn find_at_version(
    &self,
    person_id: PersonId,
    version: Version,
  ) -> Result<Option<Event>, Self::Error>;

  /// Events with `after < new_version <= through`, ascending.
  fn find_range(
    &self,
    person_id: PersonId,
    after: Version,
    through: Version,
  ) -> Result<Vec<Event>, Self::Error>;
}
