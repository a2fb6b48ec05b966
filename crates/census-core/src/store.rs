//! The `PersonStore` trait — the operations exposed to the transport layer.
//!
//! The trait is implemented by storage backends (e.g. `census-store-sqlite`),
//! which run each mutation through [`crate::reconcile`] inside a single
//! transaction. Higher layers (`census-api`) depend on this abstraction, not
//! on any concrete backend.

use std::future::Future;

use crate::{
  changes::Snapshot,
  event::Event,
  person::{NewPerson, Person, PersonFilter, PersonId, PersonPatch, Version},
  reconcile::Reconciled,
};

/// Abstraction over a person registry backend.
///
/// All methods return `Send` futures so the trait can be used in multi-threaded
/// async runtimes (e.g. tokio with `axum`).
pub trait PersonStore: Send + Sync {
  type Error: std::error::Error + Send + Sync + 'static;

  // ── Reads ─────────────────────────────────────────────────────────────

  /// Persons matching `filter`, ordered by id ascending.
  fn list_persons(
    &self,
    filter: PersonFilter,
  ) -> impl Future<Output = Result<Vec<Person>, Self::Error>> + Send + '_;

  /// Retrieve a person by id. Returns `None` if absent or soft-deleted.
  fn get_person(
    &self,
    id: PersonId,
  ) -> impl Future<Output = Result<Option<Person>, Self::Error>> + Send + '_;

  // ── Mutations ─────────────────────────────────────────────────────────

  /// Create a person at version 1 and append its founding event.
  fn create_person(
    &self,
    input: NewPerson,
  ) -> impl Future<Output = Result<Person, Self::Error>> + Send + '_;

  /// Apply `patch` against the client's `claimed` version, reconciling a
  /// stale claim by replay.
  fn patch_person(
    &self,
    id: PersonId,
    claimed: Version,
    patch: PersonPatch,
  ) -> impl Future<Output = Result<Reconciled, Self::Error>> + Send + '_;

  /// Soft-delete a person; `claimed` must equal the current version.
  fn delete_person(
    &self,
    id: PersonId,
    claimed: Version,
  ) -> impl Future<Output = Result<Person, Self::Error>> + Send + '_;

  // ── History ───────────────────────────────────────────────────────────

  /// Every event recorded for a person, ascending by version, including
  /// soft-deleted persons. Returns `None` if the person never existed.
  fn person_events(
    &self,
    id: PersonId,
  ) -> impl Future<Output = Result<Option<Vec<Event>>, Self::Error>> + Send + '_;

  /// The person's snapshot as of `version`.
  fn person_at_version(
    &self,
    id: PersonId,
    version: Version,
  ) -> impl Future<Output = Result<Snapshot, Self::Error>> + Send + '_;
}
