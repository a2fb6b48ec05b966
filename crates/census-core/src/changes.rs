//! Snapshots, change-sets and the merge primitive.
//!
//! Both types are persisted as JSON inside event rows, so their key set is
//! versioned by [`FORMAT`].

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use crate::person::{PersonId, PersonPatch, Version};

/// Version of the [`Snapshot`] / [`Changes`] key set stored with each event.
pub const FORMAT: u32 = 1;

// ─── Snapshot ────────────────────────────────────────────────────────────────

/// The full materialised state of a person at one version.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Snapshot {
  pub id:          PersonId,
  pub name:        String,
  pub national_id: String,
  pub birth_date:  NaiveDate,
  pub version:     Version,
  pub deleted:     bool,
  pub updated_at:  DateTime<Utc>,
}

impl Snapshot {
  /// Shorthand for [`apply_changes`].
  pub fn apply(&self, changes: &Changes) -> Snapshot { apply_changes(self, changes) }
}

// ─── Changes ─────────────────────────────────────────────────────────────────

/// A partial mapping of field name to new value. Serialises as a JSON object
/// holding only the keys that are present.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Changes {
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub name:        Option<String>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub national_id: Option<String>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub birth_date:  Option<NaiveDate>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub deleted:     Option<bool>,
}

impl Changes {
  /// Every field of `snapshot`; used for the founding event.
  pub fn full(snapshot: &Snapshot) -> Self {
    Self {
      name:        Some(snapshot.name.clone()),
      national_id: Some(snapshot.national_id.clone()),
      birth_date:  Some(snapshot.birth_date),
      deleted:     Some(snapshot.deleted),
    }
  }

  pub fn deletion() -> Self {
    Self { deleted: Some(true), ..Self::default() }
  }

  pub fn is_empty(&self) -> bool { self.fields().is_empty() }

  /// The same keys as `self`, each valued as it stands in `snapshot`.
  pub fn valued_from(&self, snapshot: &Snapshot) -> Changes {
    Changes {
      name:        self.name.as_ref().map(|_| snapshot.name.clone()),
      national_id: self.national_id.as_ref().map(|_| snapshot.national_id.clone()),
      birth_date:  self.birth_date.map(|_| snapshot.birth_date),
      deleted:     self.deleted.map(|_| snapshot.deleted),
    }
  }

  /// Names of the fields present, in declaration order.
  pub fn fields(&self) -> Vec<&'static str> {
    let mut out = Vec::new();
    if self.name.is_some() {
      out.push("name");
    }
    if self.national_id.is_some() {
      out.push("national_id");
    }
    if self.birth_date.is_some() {
      out.push("birth_date");
    }
    if self.deleted.is_some() {
      out.push("deleted");
    }
    out
  }
}

impl From<PersonPatch> for Changes {
  fn from(p: PersonPatch) -> Self {
    Changes {
      name:        p.name,
      national_id: p.national_id,
      birth_date:  p.birth_date,
      deleted:     None,
    }
  }
}

// ─── Merge primitive ─────────────────────────────────────────────────────────

/// Overwrite every field present in `changes`; leave the rest untouched.
///
/// All reconciliation paths reduce to sequential application of this
/// function, which makes it last-writer-wins per field.
pub fn apply_changes(base: &Snapshot, changes: &Changes) -> Snapshot {
  let mut next = base.clone();
  if let Some(name) = &changes.name {
    next.name = name.clone();
  }
  if let Some(national_id) = &changes.national_id {
    next.national_id = national_id.clone();
  }
  if let Some(birth_date) = changes.birth_date {
    next.birth_date = birth_date;
  }
  if let Some(deleted) = changes.deleted {
    next.deleted = deleted;
  }
  next
}
