//! Integration tests for `SqliteStore` against an in-memory database.

use std::sync::{
  Arc,
  atomic::{AtomicUsize, Ordering},
};

use chrono::{Duration, NaiveDate};
use census_core::{
  changes::Changes,
  ledger::{EventLog as _, SnapshotStore as _},
  person::{NewPerson, PersonFilter, PersonPatch},
  reconcile::Path,
  store::PersonStore,
};

use crate::{Error, SqliteLedger, SqliteStore, encode::now, in_transaction, schema::SCHEMA};

async fn store() -> SqliteStore {
  SqliteStore::open_in_memory()
    .await
    .expect("in-memory store")
}

fn new_person(name: &str, national_id: &str) -> NewPerson {
  NewPerson {
    name:        name.into(),
    national_id: national_id.into(),
    birth_date:  NaiveDate::from_ymd_opt(1985, 10, 26).unwrap(),
  }
}

fn rename(name: &str) -> PersonPatch {
  PersonPatch { name: Some(name.into()), ..Default::default() }
}

fn core_err(err: Error) -> census_core::Error {
  match err {
    Error::Core(e) => e,
    other => panic!("expected a core error, got {other:?}"),
  }
}

// ─── Create / read ───────────────────────────────────────────────────────────

#[tokio::test]
async fn create_and_get_person() {
  let s = store().await;

  let person = s.create_person(new_person("Ana", "111")).await.unwrap();
  assert_eq!(person.version, 1);
  assert!(!person.deleted);

  let fetched = s.get_person(person.id).await.unwrap().unwrap();
  assert_eq!(fetched, person);
}

#[tokio::test]
async fn get_missing_person_returns_none() {
  let s = store().await;
  assert!(s.get_person(404).await.unwrap().is_none());
}

#[tokio::test]
async fn founding_event_is_version_one() {
  let s = store().await;
  let person = s.create_person(new_person("Ana", "111")).await.unwrap();

  let events = s.person_events(person.id).await.unwrap().unwrap();
  assert_eq!(events.len(), 1);
  assert_eq!(events[0].base_version, 0);
  assert_eq!(events[0].new_version, 1);
  assert_eq!(events[0].changes.deleted, Some(false));
  assert_eq!(events[0].state_after, person.snapshot());
}

#[tokio::test]
async fn duplicate_national_id_conflicts() {
  let s = store().await;
  s.create_person(new_person("Ana", "111")).await.unwrap();

  let err = s.create_person(new_person("Bia", "111")).await.unwrap_err();
  assert!(matches!(core_err(err), census_core::Error::Conflict(_)));
}

#[tokio::test]
async fn concurrent_creates_with_same_national_id_admit_one() {
  let s = Arc::new(store().await);

  let handles: Vec<_> = (0..8)
    .map(|i| {
      let s = s.clone();
      tokio::spawn(async move { s.create_person(new_person(&format!("P{i}"), "777")).await })
    })
    .collect();

  let mut created = 0;
  let mut conflicts = 0;
  for h in handles {
    match h.await.unwrap() {
      Ok(_) => created += 1,
      Err(e) => {
        assert!(matches!(core_err(e), census_core::Error::Conflict(_)));
        conflicts += 1;
      }
    }
  }
  assert_eq!(created, 1);
  assert_eq!(conflicts, 7);
}

#[tokio::test]
async fn unique_index_backs_the_pre_check() {
  let mut conn = rusqlite::Connection::open_in_memory().unwrap();
  conn.execute_batch(SCHEMA).unwrap();

  in_transaction(&mut conn, |ledger| ledger.create(&new_person("Ana", "111"), now()))
    .unwrap();
  // Bypasses the controller's pre-check and hits the partial unique index.
  let err = in_transaction(&mut conn, |ledger| {
    ledger.create(&new_person("Bia", "111"), now())
  })
  .unwrap_err();
  assert!(matches!(core_err(err), census_core::Error::Conflict(_)));
}

// ─── List ────────────────────────────────────────────────────────────────────

#[tokio::test]
async fn list_orders_by_id_and_hides_deleted() {
  let s = store().await;
  let a = s.create_person(new_person("A", "1")).await.unwrap();
  let b = s.create_person(new_person("B", "2")).await.unwrap();
  let c = s.create_person(new_person("C", "3")).await.unwrap();
  s.delete_person(b.id, 1).await.unwrap();

  let active = s.list_persons(PersonFilter::default()).await.unwrap();
  let ids: Vec<_> = active.iter().map(|p| p.id).collect();
  assert_eq!(ids, [a.id, c.id]);

  let all = s
    .list_persons(PersonFilter { include_deleted: true, ..Default::default() })
    .await
    .unwrap();
  let ids: Vec<_> = all.iter().map(|p| p.id).collect();
  assert_eq!(ids, [a.id, b.id, c.id]);
  assert!(all[1].deleted);
}

#[tokio::test]
async fn list_modified_since() {
  let s = store().await;
  let a = s.create_person(new_person("A", "1")).await.unwrap();
  let b = s.create_person(new_person("B", "2")).await.unwrap();
  tokio::time::sleep(std::time::Duration::from_millis(5)).await;

  let patched = s.patch_person(a.id, 1, rename("A2")).await.unwrap().person;

  let recent = s
    .list_persons(PersonFilter {
      modified_since: Some(patched.updated_at),
      ..Default::default()
    })
    .await
    .unwrap();
  assert_eq!(recent.len(), 1);
  assert_eq!(recent[0].id, a.id);

  let everything = s
    .list_persons(PersonFilter {
      modified_since: Some(b.created_at - Duration::days(1)),
      ..Default::default()
    })
    .await
    .unwrap();
  assert_eq!(everything.len(), 2);
}

#[tokio::test]
async fn list_modified_since_respects_sub_microsecond_bounds() {
  let s = store().await;
  let a = s.create_person(new_person("A", "1")).await.unwrap();

  let just_after = a.updated_at + Duration::nanoseconds(1);
  let recent = s
    .list_persons(PersonFilter { modified_since: Some(just_after), ..Default::default() })
    .await
    .unwrap();
  assert!(recent.is_empty());

  let exact = s
    .list_persons(PersonFilter { modified_since: Some(a.updated_at), ..Default::default() })
    .await
    .unwrap();
  assert_eq!(exact.len(), 1);
}

// ─── Patch ───────────────────────────────────────────────────────────────────

#[tokio::test]
async fn direct_patch_records_event() {
  let s = store().await;
  let person = s.create_person(new_person("A", "1")).await.unwrap();
  s.patch_person(person.id, 1, rename("A1")).await.unwrap();
  s.patch_person(person.id, 2, rename("A2")).await.unwrap();

  let out = s.patch_person(person.id, 3, rename("B")).await.unwrap();
  assert_eq!(out.path, Path::Direct);
  assert_eq!(out.person.version, 4);
  assert_eq!(out.person.name, "B");

  let events = s.person_events(person.id).await.unwrap().unwrap();
  let last = events.last().unwrap();
  assert_eq!((last.base_version, last.new_version), (3, 4));
  assert_eq!(last.changes, Changes { name: Some("B".into()), ..Default::default() });
}

#[tokio::test]
async fn stale_patch_is_replayed() {
  let s = store().await;
  let person = s.create_person(new_person("A", "1")).await.unwrap();
  s.patch_person(person.id, 1, rename("B")).await.unwrap();

  let stale = PersonPatch { national_id: Some("123".into()), ..Default::default() };
  let out = s.patch_person(person.id, 1, stale).await.unwrap();
  assert_eq!(out.path, Path::Replayed { replayed_events: 1 });
  assert_eq!(out.person.version, 3);
  assert_eq!(out.person.name, "B");
  assert_eq!(out.person.national_id, "123");

  let events = s.person_events(person.id).await.unwrap().unwrap();
  let versions: Vec<_> = events.iter().map(|e| e.new_version).collect();
  assert_eq!(versions, [1, 2, 3]);
  assert_eq!(
    events[2].changes,
    Changes { national_id: Some("123".into()), ..Default::default() }
  );
  assert_eq!(events[2].state_after, out.person.snapshot());
}

#[tokio::test]
async fn version_errors_surface_as_core_errors() {
  let s = store().await;
  let person = s.create_person(new_person("A", "1")).await.unwrap();

  let err = s.patch_person(person.id, 0, rename("B")).await.unwrap_err();
  assert!(matches!(core_err(err), census_core::Error::InvalidVersion(0)));

  let err = s
    .patch_person(person.id, 9, PersonPatch::default())
    .await
    .unwrap_err();
  assert!(matches!(core_err(err), census_core::Error::VersionAhead { .. }));

  // Nothing was committed by the failed requests.
  let events = s.person_events(person.id).await.unwrap().unwrap();
  assert_eq!(events.len(), 1);
}

#[tokio::test]
async fn patch_conflicting_national_id_rolls_back() {
  let s = store().await;
  let a = s.create_person(new_person("A", "1")).await.unwrap();
  s.create_person(new_person("B", "2")).await.unwrap();

  let p = PersonPatch {
    name:        Some("A2".into()),
    national_id: Some("2".into()),
    ..Default::default()
  };
  let err = s.patch_person(a.id, 1, p).await.unwrap_err();
  assert!(matches!(core_err(err), census_core::Error::Conflict(_)));

  let fetched = s.get_person(a.id).await.unwrap().unwrap();
  assert_eq!(fetched.version, 1);
  assert_eq!(fetched.name, "A");
}

// ─── Delete ──────────────────────────────────────────────────────────────────

#[tokio::test]
async fn delete_soft_deletes_and_keeps_history() {
  let s = store().await;
  let person = s.create_person(new_person("A", "1")).await.unwrap();

  let deleted = s.delete_person(person.id, 1).await.unwrap();
  assert!(deleted.deleted);
  assert_eq!(deleted.version, 2);

  assert!(s.get_person(person.id).await.unwrap().is_none());
  let events = s.person_events(person.id).await.unwrap().unwrap();
  assert_eq!(events.len(), 2);
  assert_eq!(events[1].changes, Changes::deletion());

  // The national id is free again.
  s.create_person(new_person("A again", "1")).await.unwrap();
}

#[tokio::test]
async fn stale_delete_is_rejected() {
  let s = store().await;
  let person = s.create_person(new_person("A", "1")).await.unwrap();
  s.patch_person(person.id, 1, rename("B")).await.unwrap();

  let err = s.delete_person(person.id, 1).await.unwrap_err();
  assert!(matches!(
    core_err(err),
    census_core::Error::Stale { claimed: 1, current: 2 }
  ));
}

// ─── Concurrent writers ──────────────────────────────────────────────────────

#[tokio::test]
async fn concurrent_patches_on_one_version_all_land_in_order() {
  let s = Arc::new(store().await);
  let id = s.create_person(new_person("A", "1")).await.unwrap().id;

  let handles: Vec<_> = (0..6)
    .map(|i| {
      let s = s.clone();
      tokio::spawn(async move { s.patch_person(id, 1, rename(&format!("N{i}"))).await })
    })
    .collect();

  let mut versions = Vec::new();
  let mut direct = 0;
  for h in handles {
    let out = h.await.unwrap().unwrap();
    match out.path {
      Path::Direct => direct += 1,
      Path::Replayed { replayed_events } => {
        assert_eq!(replayed_events, out.person.version - 2);
      }
      Path::Unchanged => panic!("a rename is never unchanged"),
    }
    versions.push(out.person.version);
  }
  versions.sort_unstable();
  assert_eq!(versions, (2..=7).collect::<Vec<_>>());
  assert_eq!(direct, 1);

  // The first writer's name survives every later stale rename.
  let events = s.person_events(id).await.unwrap().unwrap();
  assert_eq!(events.len(), 7);
  let winner = events[1].state_after.name.clone();
  assert_eq!(s.get_person(id).await.unwrap().unwrap().name, winner);
}

#[tokio::test]
async fn delete_racing_a_patch_on_one_version_is_stale() {
  let s = store().await;
  let person = s.create_person(new_person("A", "1")).await.unwrap();

  // `join!` polls in order, so the patch reaches the connection first.
  let (patched, deleted) = tokio::join!(
    s.patch_person(person.id, 1, rename("B")),
    s.delete_person(person.id, 1),
  );
  assert_eq!(patched.unwrap().person.version, 2);
  assert!(matches!(
    core_err(deleted.unwrap_err()),
    census_core::Error::Stale { claimed: 1, current: 2 }
  ));
  assert!(!s.get_person(person.id).await.unwrap().unwrap().deleted);
}

#[tokio::test]
async fn lost_conditional_write_is_retried() {
  let s = store().await;
  let attempts = Arc::new(AtomicUsize::new(0));

  let counter = attempts.clone();
  let out = s
    .write("test", move |_ledger| {
      if counter.fetch_add(1, Ordering::SeqCst) == 0 {
        return Err(census_core::Error::WriteConflict { person_id: 1, expected: 1 }.into());
      }
      Ok("committed")
    })
    .await
    .unwrap();
  assert_eq!(out, "committed");
  assert_eq!(attempts.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn retries_give_up_after_three_attempts() {
  let s = store().await;
  let attempts = Arc::new(AtomicUsize::new(0));

  let counter = attempts.clone();
  let err = s
    .write("test", move |_ledger| -> crate::Result<()> {
      counter.fetch_add(1, Ordering::SeqCst);
      Err(census_core::Error::WriteConflict { person_id: 1, expected: 1 }.into())
    })
    .await
    .unwrap_err();
  assert!(matches!(core_err(err), census_core::Error::WriteConflict { .. }));
  assert_eq!(attempts.load(Ordering::SeqCst), 3);
}

// ─── History ─────────────────────────────────────────────────────────────────

#[tokio::test]
async fn snapshot_at_each_version() {
  let s = store().await;
  let person = s.create_person(new_person("A", "1")).await.unwrap();
  s.patch_person(person.id, 1, rename("B")).await.unwrap();
  s.patch_person(person.id, 2, rename("C")).await.unwrap();

  for (version, name) in [(1, "A"), (2, "B"), (3, "C")] {
    let snap = s.person_at_version(person.id, version).await.unwrap();
    assert_eq!(snap.version, version);
    assert_eq!(snap.name, name);
  }

  let err = s.person_at_version(person.id, 4).await.unwrap_err();
  assert!(matches!(
    core_err(err),
    census_core::Error::VersionNotFound { version: 4, .. }
  ));
  let err = s.person_at_version(999, 1).await.unwrap_err();
  assert!(matches!(core_err(err), census_core::Error::NotFound(999)));
}

#[tokio::test]
async fn events_for_unknown_person_is_none() {
  let s = store().await;
  assert!(s.person_events(1).await.unwrap().is_none());
}

// ─── Ledger invariants ───────────────────────────────────────────────────────

#[tokio::test]
async fn event_log_rejects_updates_and_deletes() {
  let mut conn = rusqlite::Connection::open_in_memory().unwrap();
  conn.execute_batch(SCHEMA).unwrap();
  in_transaction(&mut conn, |ledger| {
    census_core::reconcile::create(ledger, new_person("A", "1"), now())
  })
  .unwrap();

  assert!(conn.execute("UPDATE person_events SET base_version = 5", []).is_err());
  assert!(conn.execute("DELETE FROM person_events", []).is_err());
}

#[tokio::test]
async fn commit_with_moved_version_is_a_write_conflict() {
  let mut conn = rusqlite::Connection::open_in_memory().unwrap();
  conn.execute_batch(SCHEMA).unwrap();
  let person = in_transaction(&mut conn, |ledger| {
    census_core::reconcile::create(ledger, new_person("A", "1"), now())
  })
  .unwrap();

  let mut next = person.snapshot();
  next.version = 3;
  let err = in_transaction(&mut conn, |ledger| ledger.commit(person.id, 2, &next))
    .unwrap_err();
  assert!(matches!(
    core_err(err),
    census_core::Error::WriteConflict { expected: 2, .. }
  ));
}

#[tokio::test]
async fn duplicate_event_version_is_a_write_conflict() {
  let mut conn = rusqlite::Connection::open_in_memory().unwrap();
  conn.execute_batch(SCHEMA).unwrap();
  let person = in_transaction(&mut conn, |ledger| {
    census_core::reconcile::create(ledger, new_person("A", "1"), now())
  })
  .unwrap();

  let ledger = SqliteLedger::new(&conn);
  let founding = ledger.find_at_version(person.id, 1).unwrap().unwrap();
  let err = ledger
    .append(census_core::event::NewEvent {
      person_id:    person.id,
      base_version: 0,
      changes:      founding.changes,
      state_after:  founding.state_after,
      created_at:   now(),
    })
    .unwrap_err();
  assert!(matches!(core_err(err), census_core::Error::WriteConflict { .. }));
}
