//! In-memory transaction handle for unit tests.

use std::cell::RefCell;

use chrono::{DateTime, TimeZone, Utc};
use uuid::Uuid;

use crate::{
  Error, Result,
  changes::Snapshot,
  event::{Event, NewEvent},
  ledger::{EventLog, SnapshotStore, Transaction},
  person::{NewPerson, Person, PersonFilter, PersonId, Version},
};

/// A fixed instant `secs` seconds after a base time.
pub fn at(secs: i64) -> DateTime<Utc> {
  Utc.timestamp_opt(1_700_000_000 + secs, 0).unwrap()
}

#[derive(Default)]
pub struct MemoryLedger {
  persons: RefCell<Vec<Person>>,
  events:  RefCell<Vec<Event>>,
}

impl MemoryLedger {
  pub fn person(&self, id: PersonId) -> Person {
    self.get(id).unwrap().expect("person exists")
  }

  pub fn event_count(&self, person_id: PersonId) -> usize {
    self.events.borrow().iter().filter(|e| e.person_id == person_id).count()
  }

  /// Simulate log corruption.
  pub fn drop_event(&self, person_id: PersonId, version: Version) {
    self
      .events
      .borrow_mut()
      .retain(|e| !(e.person_id == person_id && e.new_version == version));
  }

  fn national_id_taken(&self, national_id: &str, except: PersonId) -> bool {
    self
      .persons
      .borrow()
      .iter()
      .any(|p| !p.deleted && p.national_id == national_id && p.id != except)
  }
}

impl Transaction for MemoryLedger {
  type Error = Error;
}

impl SnapshotStore for MemoryLedger {
  fn get(&self, id: PersonId) -> Result<Option<Person>> {
    Ok(self.persons.borrow().iter().find(|p| p.id == id).cloned())
  }

  fn find_active_by_national_id(&self, national_id: &str) -> Result<Option<Person>> {
    Ok(
      self
        .persons
        .borrow()
        .iter()
        .find(|p| !p.deleted && p.national_id == national_id)
        .cloned(),
    )
  }

  fn list(&self, filter: &PersonFilter) -> Result<Vec<Person>> {
    Ok(self.persons.borrow().iter().filter(|p| filter.matches(p)).cloned().collect())
  }

  fn create(&self, input: &NewPerson, now: DateTime<Utc>) -> Result<Person> {
    if self.national_id_taken(&input.national_id, 0) {
      return Err(Error::Conflict(input.national_id.clone()));
    }
    let mut persons = self.persons.borrow_mut();
    let person = Person {
      id:          persons.len() as PersonId + 1,
      name:        input.name.clone(),
      national_id: input.national_id.clone(),
      birth_date:  input.birth_date,
      version:     1,
      deleted:     false,
      created_at:  now,
      updated_at:  now,
    };
    persons.push(person.clone());
    Ok(person)
  }

  fn commit(&self, id: PersonId, expected: Version, next: &Snapshot) -> Result<Person> {
    if !next.deleted && self.national_id_taken(&next.national_id, id) {
      return Err(Error::Conflict(next.national_id.clone()));
    }
    let mut persons = self.persons.borrow_mut();
    let row = persons
      .iter_mut()
      .find(|p| p.id == id && p.version == expected)
      .ok_or(Error::WriteConflict { person_id: id, expected })?;
    row.name = next.name.clone();
    row.national_id = next.national_id.clone();
    row.birth_date = next.birth_date;
    row.version = next.version;
    row.deleted = next.deleted;
    row.updated_at = next.updated_at;
    Ok(row.clone())
  }
}

impl EventLog for MemoryLedger {
  fn append(&self, event: NewEvent) -> Result<Event> {
    let mut events = self.events.borrow_mut();
    let new_version = event.new_version();
    if events
      .iter()
      .any(|e| e.person_id == event.person_id && e.new_version == new_version)
    {
      return Err(Error::WriteConflict {
        person_id: event.person_id,
        expected:  event.base_version,
      });
    }
    let event = event.into_event(Uuid::new_v4());
    events.push(event.clone());
    Ok(event)
  }

  fn find_at_version(&self, person_id: PersonId, version: Version) -> Result<Option<Event>> {
    Ok(
      self
        .events
        .borrow()
        .iter()
        .find(|e| e.person_id == person_id && e.new_version == version)
        .cloned(),
    )
  }

  fn find_range(
    &self,
    person_id: PersonId,
    after: Version,
    through: Version,
  ) -> Result<Vec<Event>> {
    let mut out: Vec<Event> = self
      .events
      .borrow()
      .iter()
      .filter(|e| {
        e.person_id == person_id && e.new_version > after && e.new_version <= through
      })
      .cloned()
      .collect();
    out.sort_by_key(|e| e.new_version);
    Ok(out)
  }
}
