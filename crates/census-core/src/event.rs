//! Events — immutable records of one version transition.
//!
//! The event log is the sole source of historical truth. Each event records
//! the change-set as the writer intended it (`changes`) and the resulting
//! state (`state_after`). A stale writer's value can lose to a later write,
//! so replay folds [`Event::applied`] rather than the raw intent.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{
  changes::{Changes, Snapshot},
  person::{PersonId, Version},
};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Event {
  pub event_id:     Uuid,
  pub person_id:    PersonId,
  pub base_version: Version,
  /// Always `base_version + 1`; unique per person.
  pub new_version:  Version,
  pub changes:      Changes,
  pub state_after:  Snapshot,
  pub created_at:   DateTime<Utc>,
}

impl Event {
  /// The fields this transition touched, valued as they were committed.
  ///
  /// Equals `changes` unless a reconciled edit lost a field to a later write.
  pub fn applied(&self) -> Changes { self.changes.valued_from(&self.state_after) }
}

/// Input to [`crate::ledger::EventLog::append`]. `event_id` is assigned by
/// the log.
#[derive(Debug, Clone)]
pub struct NewEvent {
  pub person_id:    PersonId,
  pub base_version: Version,
  pub changes:      Changes,
  pub state_after:  Snapshot,
  pub created_at:   DateTime<Utc>,
}

impl NewEvent {
  pub fn new_version(&self) -> Version { self.base_version + 1 }

  pub fn into_event(self, event_id: Uuid) -> Event {
    Event {
      event_id,
      person_id: self.person_id,
      base_version: self.base_version,
      new_version: self.base_version + 1,
      changes: self.changes,
      state_after: self.state_after,
      created_at: self.created_at,
    }
  }
}
