//! Handlers for `/persons` endpoints.
//!
//! | Method   | Path | Notes |
//! |----------|------|-------|
//! | `GET`    | `/persons` | Optional `?include_deleted=true&modified_since=<RFC 3339>` |
//! | `POST`   | `/persons` | Body: `{"name":…,"national_id":…,"birth_date":"YYYY-MM-DD"}` |
//! | `GET`    | `/persons/:id` | 404 if absent or soft-deleted |
//! | `PATCH`  | `/persons/:id` | Body: `{"version":N, …changed fields}` |
//! | `DELETE` | `/persons/:id` | `?version=N` |
//! | `GET`    | `/persons/:id/events` | Full audit history |
//! | `GET`    | `/persons/:id/versions/:version` | Historical snapshot |

use std::sync::Arc;

use axum::{
  Json,
  extract::{Path, Query, State},
  http::StatusCode,
  response::IntoResponse,
};
use census_core::{
  changes::Snapshot,
  event::Event,
  person::{NewPerson, Person, PersonFilter, PersonId, PersonPatch, Version},
  store::PersonStore,
};
use chrono::{DateTime, Utc};
use serde::Deserialize;

use crate::error::ApiError;

// ─── List ─────────────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
pub struct ListParams {
  #[serde(default)]
  pub include_deleted: bool,
  pub modified_since:  Option<DateTime<Utc>>,
}

/// `GET /persons[?include_deleted=true][&modified_since=<ts>]`
pub async fn list<S: PersonStore>(
  State(store): State<Arc<S>>,
  Query(params): Query<ListParams>,
) -> Result<Json<Vec<Person>>, ApiError> {
  let filter = PersonFilter {
    include_deleted: params.include_deleted,
    modified_since:  params.modified_since,
  };
  let persons = store
    .list_persons(filter)
    .await
    .map_err(ApiError::from_store)?;
  Ok(Json(persons))
}

// ─── Create ───────────────────────────────────────────────────────────────────

/// `POST /persons`
pub async fn create<S: PersonStore>(
  State(store): State<Arc<S>>,
  Json(body): Json<NewPerson>,
) -> Result<impl IntoResponse, ApiError> {
  let person = store
    .create_person(body)
    .await
    .map_err(ApiError::from_store)?;
  Ok((StatusCode::CREATED, Json(person)))
}

// ─── Get one ──────────────────────────────────────────────────────────────────

/// `GET /persons/:id`
pub async fn get_one<S: PersonStore>(
  State(store): State<Arc<S>>,
  Path(id): Path<PersonId>,
) -> Result<Json<Person>, ApiError> {
  let person = store
    .get_person(id)
    .await
    .map_err(ApiError::from_store)?
    .ok_or_else(|| ApiError::NotFound(format!("person {id} not found")))?;
  Ok(Json(person))
}

// ─── Patch ────────────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
pub struct PatchBody {
  /// The version the client last read.
  pub version: Version,
  #[serde(flatten)]
  pub patch:   PersonPatch,
}

/// `PATCH /persons/:id` — body: `{"version":3,"name":"B"}`
///
/// Returns the person as committed, whichever reconciliation path ran.
pub async fn patch_one<S: PersonStore>(
  State(store): State<Arc<S>>,
  Path(id): Path<PersonId>,
  Json(body): Json<PatchBody>,
) -> Result<Json<Person>, ApiError> {
  let out = store
    .patch_person(id, body.version, body.patch)
    .await
    .map_err(ApiError::from_store)?;
  Ok(Json(out.person))
}

// ─── Delete ───────────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
pub struct DeleteParams {
  pub version: Version,
}

/// `DELETE /persons/:id?version=N`
pub async fn delete_one<S: PersonStore>(
  State(store): State<Arc<S>>,
  Path(id): Path<PersonId>,
  Query(params): Query<DeleteParams>,
) -> Result<Json<Person>, ApiError> {
  let person = store
    .delete_person(id, params.version)
    .await
    .map_err(ApiError::from_store)?;
  Ok(Json(person))
}

// ─── History ──────────────────────────────────────────────────────────────────

/// `GET /persons/:id/events`
pub async fn events<S: PersonStore>(
  State(store): State<Arc<S>>,
  Path(id): Path<PersonId>,
) -> Result<Json<Vec<Event>>, ApiError> {
  let events = store
    .person_events(id)
    .await
    .map_err(ApiError::from_store)?
    .ok_or_else(|| ApiError::NotFound(format!("person {id} not found")))?;
  Ok(Json(events))
}

/// `GET /persons/:id/versions/:version`
pub async fn at_version<S: PersonStore>(
  State(store): State<Arc<S>>,
  Path((id, version)): Path<(PersonId, Version)>,
) -> Result<Json<Snapshot>, ApiError> {
  let snapshot = store
    .person_at_version(id, version)
    .await
    .map_err(ApiError::from_store)?;
  Ok(Json(snapshot))
}
