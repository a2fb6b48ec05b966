//! [`SqliteLedger`] — the SQLite implementation of the transaction-scoped
//! [`SnapshotStore`] and [`EventLog`] contracts.

use chrono::{DateTime, Utc};
use census_core::{
  changes::{FORMAT, Snapshot},
  event::{Event, NewEvent},
  ledger::{EventLog, SnapshotStore, Transaction},
  person::{NewPerson, Person, PersonFilter, PersonId, Version},
};
use rusqlite::{Connection, OptionalExtension as _, TransactionBehavior};
use uuid::Uuid;

use crate::{
  Error, Result,
  encode::{
    EVENT_COLUMNS, PERSON_COLUMNS, RawEvent, RawPerson, encode_changes, encode_date,
    encode_dt, encode_dt_lower_bound, encode_snapshot, encode_uuid,
  },
};

/// A borrowed connection, usually inside an open transaction.
pub struct SqliteLedger<'a> {
  conn: &'a Connection,
}

impl<'a> SqliteLedger<'a> {
  pub fn new(conn: &'a Connection) -> Self { Self { conn } }
}

/// Run `f` inside an `IMMEDIATE` transaction and commit if it succeeds.
///
/// The write lock is taken up front, so the version read at the start of `f`
/// stays current until commit. On error the transaction is dropped, rolling
/// back the row update and the event append together.
pub fn in_transaction<T>(
  conn: &mut Connection,
  f: impl FnOnce(&SqliteLedger<'_>) -> Result<T>,
) -> Result<T> {
  let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
  let out = f(&SqliteLedger::new(&tx))?;
  tx.commit()?;
  Ok(out)
}

fn is_constraint_violation(e: &rusqlite::Error) -> bool {
  matches!(
    e,
    rusqlite::Error::SqliteFailure(f, _) if f.code == rusqlite::ErrorCode::ConstraintViolation
  )
}

impl SqliteLedger<'_> {
  fn select_person(&self, id: PersonId) -> Result<Option<Person>> {
    let raw = self
      .conn
      .query_row(
        &format!("SELECT {PERSON_COLUMNS} FROM persons WHERE id = ?1"),
        rusqlite::params![id],
        RawPerson::from_row,
      )
      .optional()?;
    raw.map(RawPerson::into_person).transpose()
  }
}

impl Transaction for SqliteLedger<'_> {
  type Error = Error;
}

impl SnapshotStore for SqliteLedger<'_> {
  fn get(&self, id: PersonId) -> Result<Option<Person>> { self.select_person(id) }

  fn find_active_by_national_id(&self, national_id: &str) -> Result<Option<Person>> {
    let raw = self
      .conn
      .query_row(
        &format!(
          "SELECT {PERSON_COLUMNS} FROM persons WHERE national_id = ?1 AND deleted = 0"
        ),
        rusqlite::params![national_id],
        RawPerson::from_row,
      )
      .optional()?;
    raw.map(RawPerson::into_person).transpose()
  }

  fn list(&self, filter: &PersonFilter) -> Result<Vec<Person>> {
    let since = filter.modified_since.map(encode_dt_lower_bound);
    let mut stmt = self.conn.prepare(&format!(
      "SELECT {PERSON_COLUMNS} FROM persons
       WHERE (?1 OR deleted = 0)
         AND (?2 IS NULL OR updated_at >= ?2)
       ORDER BY id ASC"
    ))?;
    let raws = stmt
      .query_map(
        rusqlite::params![filter.include_deleted, since],
        RawPerson::from_row,
      )?
      .collect::<rusqlite::Result<Vec<_>>>()?;
    raws.into_iter().map(RawPerson::into_person).collect()
  }

  fn create(&self, input: &NewPerson, now: DateTime<Utc>) -> Result<Person> {
    let at_str = encode_dt(now);
    let inserted = self.conn.execute(
      "INSERT INTO persons (name, national_id, birth_date, version, deleted, created_at, updated_at)
       VALUES (?1, ?2, ?3, 1, 0, ?4, ?4)",
      rusqlite::params![
        input.name,
        input.national_id,
        encode_date(input.birth_date),
        at_str,
      ],
    );
    match inserted {
      Ok(_) => {}
      Err(e) if is_constraint_violation(&e) => {
        return Err(census_core::Error::Conflict(input.national_id.clone()).into());
      }
      Err(e) => return Err(e.into()),
    }

    Ok(Person {
      id:          self.conn.last_insert_rowid(),
      name:        input.name.clone(),
      national_id: input.national_id.clone(),
      birth_date:  input.birth_date,
      version:     1,
      deleted:     false,
      created_at:  now,
      updated_at:  now,
    })
  }

  fn commit(&self, id: PersonId, expected: Version, next: &Snapshot) -> Result<Person> {
    let updated = self.conn.execute(
      "UPDATE persons
          SET name = ?1, national_id = ?2, birth_date = ?3,
              deleted = ?4, version = ?5, updated_at = ?6
        WHERE id = ?7 AND version = ?8",
      rusqlite::params![
        next.name,
        next.national_id,
        encode_date(next.birth_date),
        next.deleted,
        next.version,
        encode_dt(next.updated_at),
        id,
        expected,
      ],
    );
    let rows = match updated {
      Ok(rows) => rows,
      Err(e) if is_constraint_violation(&e) => {
        return Err(census_core::Error::Conflict(next.national_id.clone()).into());
      }
      Err(e) => return Err(e.into()),
    };
    if rows == 0 {
      return Err(census_core::Error::WriteConflict { person_id: id, expected }.into());
    }

    self
      .select_person(id)?
      .ok_or_else(|| census_core::Error::NotFound(id).into())
  }
}

impl EventLog for SqliteLedger<'_> {
  fn append(&self, event: NewEvent) -> Result<Event> {
    let event = event.into_event(Uuid::new_v4());
    let inserted = self.conn.execute(
      "INSERT INTO person_events (
         event_id, person_id, base_version, new_version,
         changes, state_after, format, created_at
       ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
      rusqlite::params![
        encode_uuid(event.event_id),
        event.person_id,
        event.base_version,
        event.new_version,
        encode_changes(&event.changes)?,
        encode_snapshot(&event.state_after)?,
        FORMAT,
        encode_dt(event.created_at),
      ],
    );
    match inserted {
      Ok(_) => Ok(event),
      Err(e) if is_constraint_violation(&e) => Err(
        census_core::Error::WriteConflict {
          person_id: event.person_id,
          expected:  event.base_version,
        }
        .into(),
      ),
      Err(e) => Err(e.into()),
    }
  }

  fn find_at_version(&self, person_id: PersonId, version: Version) -> Result<Option<Event>> {
    let raw = self
      .conn
      .query_row(
        &format!(
          "SELECT {EVENT_COLUMNS} FROM person_events
           WHERE person_id = ?1 AND new_version = ?2"
        ),
        rusqlite::params![person_id, version],
        RawEvent::from_row,
      )
      .optional()?;
    raw.map(RawEvent::into_event).transpose()
  }

  fn find_range(
    &self,
    person_id: PersonId,
    after: Version,
    through: Version,
  ) -> Result<Vec<Event>> {
    let mut stmt = self.conn.prepare(&format!(
      "SELECT {EVENT_COLUMNS} FROM person_events
       WHERE person_id = ?1 AND new_version > ?2 AND new_version <= ?3
       ORDER BY new_version ASC"
    ))?;
    let raws = stmt
      .query_map(rusqlite::params![person_id, after, through], RawEvent::from_row)?
      .collect::<rusqlite::Result<Vec<_>>>()?;
    raws.into_iter().map(RawEvent::into_event).collect()
  }
}
