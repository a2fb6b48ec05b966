//! Encoding and decoding helpers between Rust domain types and the plain-text
//! representations stored in SQLite columns.
//!
//! Timestamps are stored as fixed-width RFC 3339 UTC strings with microsecond
//! precision, so lexical order in SQL equals chronological order. Dates are
//! ISO 8601 (`YYYY-MM-DD`). Changes and snapshots are compact JSON tagged with
//! their key-set version. UUIDs are hyphenated lowercase strings.

use chrono::{DateTime, NaiveDate, SecondsFormat, SubsecRound as _, TimeDelta, Utc};
use census_core::{
  changes::{Changes, FORMAT, Snapshot},
  event::Event,
  person::{Person, PersonId, Version},
};
use uuid::Uuid;

use crate::{Error, Result};

// ─── Uuid ─────────────────────────────────────────────────────────────────────

pub fn encode_uuid(id: Uuid) -> String { id.hyphenated().to_string() }

pub fn decode_uuid(s: &str) -> Result<Uuid> { Ok(Uuid::parse_str(s)?) }

// ─── DateTime<Utc> ────────────────────────────────────────────────────────────

/// The current time at the precision the store persists.
pub fn now() -> DateTime<Utc> { Utc::now().trunc_subsecs(6) }

pub fn encode_dt(dt: DateTime<Utc>) -> String {
  dt.to_rfc3339_opts(SecondsFormat::Micros, true)
}

/// Encode a lower bound, rounding sub-microsecond precision up so that a
/// `>=` comparison against stored values stays exact.
pub fn encode_dt_lower_bound(dt: DateTime<Utc>) -> String {
  let truncated = dt.trunc_subsecs(6);
  if truncated < dt {
    encode_dt(truncated + TimeDelta::microseconds(1))
  } else {
    encode_dt(truncated)
  }
}

pub fn decode_dt(s: &str) -> Result<DateTime<Utc>> {
  DateTime::parse_from_rfc3339(s)
    .map(|dt| dt.with_timezone(&Utc))
    .map_err(|e| Error::DateParse(e.to_string()))
}

// ─── NaiveDate ────────────────────────────────────────────────────────────────

pub fn encode_date(d: NaiveDate) -> String { d.format("%Y-%m-%d").to_string() }

pub fn decode_date(s: &str) -> Result<NaiveDate> {
  NaiveDate::parse_from_str(s, "%Y-%m-%d").map_err(|e| Error::DateParse(e.to_string()))
}

// ─── Changes / Snapshot ───────────────────────────────────────────────────────

pub fn encode_changes(c: &Changes) -> Result<String> { Ok(serde_json::to_string(c)?) }

pub fn encode_snapshot(s: &Snapshot) -> Result<String> { Ok(serde_json::to_string(s)?) }

fn check_format(format: i64) -> Result<()> {
  if format != i64::from(FORMAT) {
    let format = u32::try_from(format).unwrap_or(u32::MAX);
    return Err(census_core::Error::UnsupportedFormat(format).into());
  }
  Ok(())
}

// ─── Row types ───────────────────────────────────────────────────────────────

/// Column list matching [`RawPerson::from_row`].
pub const PERSON_COLUMNS: &str =
  "id, name, national_id, birth_date, version, deleted, created_at, updated_at";

/// Raw values read directly from a `persons` row.
pub struct RawPerson {
  pub id:          PersonId,
  pub name:        String,
  pub national_id: String,
  pub birth_date:  String,
  pub version:     Version,
  pub deleted:     bool,
  pub created_at:  String,
  pub updated_at:  String,
}

impl RawPerson {
  pub fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
    Ok(RawPerson {
      id:          row.get(0)?,
      name:        row.get(1)?,
      national_id: row.get(2)?,
      birth_date:  row.get(3)?,
      version:     row.get(4)?,
      deleted:     row.get(5)?,
      created_at:  row.get(6)?,
      updated_at:  row.get(7)?,
    })
  }

  pub fn into_person(self) -> Result<Person> {
    Ok(Person {
      id:          self.id,
      name:        self.name,
      national_id: self.national_id,
      birth_date:  decode_date(&self.birth_date)?,
      version:     self.version,
      deleted:     self.deleted,
      created_at:  decode_dt(&self.created_at)?,
      updated_at:  decode_dt(&self.updated_at)?,
    })
  }
}

/// Column list matching [`RawEvent::from_row`].
pub const EVENT_COLUMNS: &str =
  "event_id, person_id, base_version, new_version, changes, state_after, format, created_at";

/// Raw values read directly from a `person_events` row.
pub struct RawEvent {
  pub event_id:     String,
  pub person_id:    PersonId,
  pub base_version: Version,
  pub new_version:  Version,
  pub changes:      String,
  pub state_after:  String,
  pub format:       i64,
  pub created_at:   String,
}

impl RawEvent {
  pub fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
    Ok(RawEvent {
      event_id:     row.get(0)?,
      person_id:    row.get(1)?,
      base_version: row.get(2)?,
      new_version:  row.get(3)?,
      changes:      row.get(4)?,
      state_after:  row.get(5)?,
      format:       row.get(6)?,
      created_at:   row.get(7)?,
    })
  }

  pub fn into_event(self) -> Result<Event> {
    check_format(self.format)?;
    Ok(Event {
      event_id:     decode_uuid(&self.event_id)?,
      person_id:    self.person_id,
      base_version: self.base_version,
      new_version:  self.new_version,
      changes:      serde_json::from_str(&self.changes)?,
      state_after:  serde_json::from_str(&self.state_after)?,
      created_at:   decode_dt(&self.created_at)?,
    })
  }
}
