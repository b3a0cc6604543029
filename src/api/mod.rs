//! HTTP surface of the control plane.
//!
//! Routes are mounted under `/api/v1`. Every failure is answered with a
//! `{ "code", "message" }` body whose status follows the error kind.
//! Mutations identify the caller through the `x-user-id` header.

mod error;
mod follow;
mod identity;
mod tasks;

pub use error::{ApiError, ApiErrorBody, ApiResult};
pub use identity::{CallerId, USER_ID_HEADER};

use crate::orchestrator::ControlPlane;
use axum::Router;
use axum::routing::{get, post};
use mockable::DefaultClock;

/// Shared handler state.
pub type AppState = ControlPlane<DefaultClock>;

/// Builds the API router over `plane`.
#[must_use]
pub fn router(plane: AppState) -> Router {
    Router::new()
        .route("/api/v1/check", get(tasks::check))
        .route("/api/v1/envs/{id}/deploy", post(tasks::deploy))
        .route("/api/v1/envs/{id}/destroy", post(tasks::destroy))
        .route("/api/v1/scans", post(tasks::scan))
        .route("/api/v1/tasks/{id}", get(tasks::get_task))
        .route("/api/v1/tasks/{id}/log", get(tasks::read_log))
        .route("/api/v1/tasks/{id}/log/follow", get(follow::follow_log))
        .route("/api/v1/tasks/{id}/approve", post(tasks::approve))
        .route("/api/v1/tasks/{id}/cancel", post(tasks::cancel))
        .route("/api/v1/tasks/{id}/policy_results", get(tasks::policy_results))
        .with_state(plane)
}
