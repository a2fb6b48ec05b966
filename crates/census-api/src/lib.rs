//! JSON REST API for Census.
//!
//! Exposes an axum [`Router`] backed by any [`census_core::store::PersonStore`].
//! Auth, TLS, and transport concerns are the caller's responsibility.
//!
//! # Mounting
//!
//! ```rust,ignore
//! let app = census_api::api_router(Arc::new(store));
//! ```

pub mod error;
pub mod persons;


use std::sync::Arc;

use axum::{Json, Router, routing::get};
use census_core::store::PersonStore;
use serde_json::{Value, json};

pub use error::ApiError;

/// Build a fully-materialised API router for `store`.
///
/// The returned `Router<()>` can be nested into any parent router regardless
/// of its own state type.
pub fn api_router<S>(store: Arc<S>) -> Router<()>
where
  S: PersonStore + 'static,
{
  Router::new()
    .route("/health", get(health))
    .route("/persons", get(persons::list::<S>).post(persons::create::<S>))
    .route(
      "/persons/{id}",
      get(persons::get_one::<S>)
        .patch(persons::patch_one::<S>)
        .delete(persons::delete_one::<S>),
    )
    .route("/persons/{id}/events", get(persons::events::<S>))
    .route("/persons/{id}/versions/{version}", get(persons::at_version::<S>))
    .with_state(store)
}

/// `GET /health`
async fn health() -> Json<Value> { Json(json!({ "status": "ok" })) }
