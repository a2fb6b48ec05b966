//! Person — the single mutable entity managed by the registry.
//!
//! The stored row is a cache of the latest event's snapshot. Its `version`
//! increases by exactly one per committed mutation, and rows are never
//! physically removed; deletion is the `deleted` flag.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use crate::{Error, Result, changes::Snapshot};

/// Store-assigned identity; ascending in creation order.
pub type PersonId = i64;

/// Version numbers start at 1 on creation. Claimed versions arrive from
/// clients unchecked, so the type is signed.
pub type Version = i64;

pub const NAME_MAX_LEN: usize = 120;
pub const NATIONAL_ID_MAX_LEN: usize = 14;

// ─── Person ──────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Person {
  pub id:          PersonId,
  pub name:        String,
  pub national_id: String,
  pub birth_date:  NaiveDate,
  pub version:     Version,
  pub deleted:     bool,
  pub created_at:  DateTime<Utc>,
  pub updated_at:  DateTime<Utc>,
}

impl Person {
  /// The full materialised state of this person at its current version.
  pub fn snapshot(&self) -> Snapshot {
    Snapshot {
      id:          self.id,
      name:        self.name.clone(),
      national_id: self.national_id.clone(),
      birth_date:  self.birth_date,
      version:     self.version,
      deleted:     self.deleted,
      updated_at:  self.updated_at,
    }
  }
}

// ─── Inputs ──────────────────────────────────────────────────────────────────

/// Input to [`crate::store::PersonStore::create_person`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewPerson {
  pub name:        String,
  pub national_id: String,
  pub birth_date:  NaiveDate,
}

impl NewPerson {
  pub fn validate(&self) -> Result<()> {
    check_name(&self.name)?;
    check_national_id(&self.national_id)
  }
}

/// A partial update; `None` leaves the field untouched.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PersonPatch {
  pub name:        Option<String>,
  pub national_id: Option<String>,
  pub birth_date:  Option<NaiveDate>,
}

impl PersonPatch {
  pub fn validate(&self) -> Result<()> {
    if let Some(name) = &self.name {
      check_name(name)?;
    }
    if let Some(national_id) = &self.national_id {
      check_national_id(national_id)?;
    }
    Ok(())
  }
}

/// Parameters for [`crate::store::PersonStore::list_persons`].
#[derive(Debug, Clone, Default)]
pub struct PersonFilter {
  pub include_deleted: bool,
  /// Keep only persons with `updated_at >= modified_since`.
  pub modified_since:  Option<DateTime<Utc>>,
}

impl PersonFilter {
  pub fn matches(&self, person: &Person) -> bool {
    (self.include_deleted || !person.deleted)
      && self.modified_since.is_none_or(|since| person.updated_at >= since)
  }
}

fn check_name(name: &str) -> Result<()> {
  if name.chars().count() > NAME_MAX_LEN {
    return Err(Error::InvalidField {
      field:  "name",
      reason: format!("longer than {NAME_MAX_LEN} characters"),
    });
  }
  Ok(())
}

fn check_national_id(national_id: &str) -> Result<()> {
  if national_id.chars().count() > NATIONAL_ID_MAX_LEN {
    return Err(Error::InvalidField {
      field:  "national_id",
      reason: format!("longer than {NATIONAL_ID_MAX_LEN} characters"),
    });
  }
  Ok(())
}
