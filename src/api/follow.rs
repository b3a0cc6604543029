//! Live log follow over WebSocket.

use super::tasks::{OffsetQuery, offset, path_id};
use super::{ApiError, ApiResult, AppState};
use crate::logs::adapters::websocket;
use crate::task::domain::TaskId;
use axum::extract::rejection::{PathRejection, QueryRejection};
use axum::extract::ws::rejection::WebSocketUpgradeRejection;
use axum::extract::{Path, Query, State, WebSocketUpgrade};
use axum::response::Response;
use tracing::debug;
use uuid::Uuid;

pub(super) async fn follow_log(
    State(plane): State<AppState>,
    path: Result<Path<Uuid>, PathRejection>,
    query: Result<Query<OffsetQuery>, QueryRejection>,
    ws: Result<WebSocketUpgrade, WebSocketUpgradeRejection>,
) -> ApiResult<Response> {
    let task_id = TaskId::from_uuid(path_id(path)?);
    let start = offset(query)?;
    let task = plane.task(task_id).await?;
    let upgrade = ws.map_err(|rejection| ApiError::validation(rejection.body_text()))?;
    Ok(upgrade.on_upgrade(move |socket| async move {
        let (mut sink, watcher) = websocket::split(socket);
        let end = plane
            .follow(&task, start, &mut sink, watcher.peer_closed())
            .await;
        debug!(task_id = %task.id(), end = ?end, "follow session ended");
    }))
}
