//! [`SqliteStore`] — the SQLite implementation of [`PersonStore`].

use std::path::Path;

use census_core::{
  changes::Snapshot,
  event::Event,
  ledger::{EventLog as _, SnapshotStore as _},
  person::{NewPerson, Person, PersonFilter, PersonId, PersonPatch, Version},
  reconcile::{self, Path as ReconcilePath, Reconciled},
  replay,
  store::PersonStore,
};

use crate::{
  Error, Result,
  encode::now,
  ledger::{SqliteLedger, in_transaction},
  schema::SCHEMA,
};

/// How many times a mutation is re-run after losing a conditional write.
const COMMIT_ATTEMPTS: usize = 3;

// ─── Store ───────────────────────────────────────────────────────────────────

/// A Census person registry backed by a single SQLite file.
///
/// Cloning is cheap — the inner connection is reference-counted.
#[derive(Clone)]
pub struct SqliteStore {
  conn: tokio_rusqlite::Connection,
}

impl SqliteStore {
  /// Open (or create) a store at `path` and run schema initialisation.
  pub async fn open(path: impl AsRef<Path>) -> Result<Self> {
    let conn = tokio_rusqlite::Connection::open(path).await?;
    let store = Self { conn };
    store.init_schema().await?;
    Ok(store)
  }

  /// Open an in-memory store — useful for testing.
  pub async fn open_in_memory() -> Result<Self> {
    let conn = tokio_rusqlite::Connection::open_in_memory().await?;
    let store = Self { conn };
    store.init_schema().await?;
    Ok(store)
  }

  async fn init_schema(&self) -> Result<()> {
    self
      .conn
      .call(|conn| {
        conn.execute_batch(SCHEMA)?;
        Ok(())
      })
      .await?;
    Ok(())
  }

  /// Run `f` against a plain connection, outside any explicit transaction.
  async fn read<T, F>(&self, f: F) -> Result<T>
  where
    T: Send + 'static,
    F: FnOnce(&SqliteLedger<'_>) -> Result<T> + Send + 'static,
  {
    self
      .conn
      .call(move |conn| Ok(f(&SqliteLedger::new(conn))))
      .await?
  }

  /// Run a mutation in its own transaction, re-running it when the
  /// conditional write finds that another writer got there first.
  ///
  /// A re-run re-enters the controller with the same claimed version, which
  /// is now stale: a patch takes the replay path and a delete fails `Stale`.
  pub(crate) async fn write<T, F>(&self, op: &'static str, f: F) -> Result<T>
  where
    T: Send + 'static,
    F: Fn(&SqliteLedger<'_>) -> Result<T> + Clone + Send + 'static,
  {
    let mut attempt = 1;
    loop {
      let f = f.clone();
      let result = self
        .conn
        .call(move |conn| Ok(in_transaction(conn, f)))
        .await?;

      match result {
        Err(Error::Core(census_core::Error::WriteConflict { person_id, expected }))
          if attempt < COMMIT_ATTEMPTS =>
        {
          tracing::warn!(op, person_id, expected, attempt, "write conflict; retrying");
          attempt += 1;
        }
        other => return other,
      }
    }
  }
}

// ─── PersonStore impl ────────────────────────────────────────────────────────

impl PersonStore for SqliteStore {
  type Error = Error;

  // ── Reads ─────────────────────────────────────────────────────────────────

  async fn list_persons(&self, filter: PersonFilter) -> Result<Vec<Person>> {
    self.read(move |ledger| ledger.list(&filter)).await
  }

  async fn get_person(&self, id: PersonId) -> Result<Option<Person>> {
    let person = self.read(move |ledger| ledger.get(id)).await?;
    Ok(person.filter(|p| !p.deleted))
  }

  // ── Mutations ─────────────────────────────────────────────────────────────

  async fn create_person(&self, input: NewPerson) -> Result<Person> {
    let person = self
      .write("create", move |ledger| {
        reconcile::create(ledger, input.clone(), now())
      })
      .await?;
    tracing::debug!(person_id = person.id, "created person");
    Ok(person)
  }

  async fn patch_person(
    &self,
    id:      PersonId,
    claimed: Version,
    patch:   PersonPatch,
  ) -> Result<Reconciled> {
    let out = self
      .write("patch", move |ledger| {
        reconcile::patch(ledger, id, claimed, patch.clone(), now())
      })
      .await?;

    match out.path {
      ReconcilePath::Unchanged => {
        tracing::debug!(person_id = id, claimed, "empty patch; nothing to apply");
      }
      ReconcilePath::Direct => {
        tracing::debug!(person_id = id, version = out.person.version, "patched directly");
      }
      ReconcilePath::Replayed { replayed_events } => {
        tracing::debug!(
          person_id = id,
          claimed,
          replayed_events,
          version = out.person.version,
          "reconciled stale patch by replay"
        );
      }
    }
    Ok(out)
  }

  async fn delete_person(&self, id: PersonId, claimed: Version) -> Result<Person> {
    let person = self
      .write("delete", move |ledger| reconcile::delete(ledger, id, claimed, now()))
      .await?;
    tracing::debug!(person_id = id, version = person.version, "soft-deleted person");
    Ok(person)
  }

  // ── History ───────────────────────────────────────────────────────────────

  async fn person_events(&self, id: PersonId) -> Result<Option<Vec<Event>>> {
    self
      .read(move |ledger| {
        let Some(person) = ledger.get(id)? else {
          return Ok(None);
        };
        let events = ledger.find_range(id, 0, person.version)?;
        replay::check_contiguous(id, 0, person.version, &events)?;
        Ok(Some(events))
      })
      .await
  }

  async fn person_at_version(&self, id: PersonId, version: Version) -> Result<Snapshot> {
    self
      .read(move |ledger| {
        if ledger.get(id)?.is_none() {
          return Err(census_core::Error::NotFound(id).into());
        }
        replay::snapshot_at(ledger, id, version)
      })
      .await
  }
}
