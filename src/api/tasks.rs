//! Task handlers.

use super::{ApiError, ApiResult, AppState, CallerId};
use crate::scan::domain::PolicyResult;
use crate::task::domain::{EnvironmentId, Task, TaskId, TemplateId};
use crate::task::ports::TaskCreation;
use crate::task::services::{CreateScanRequest, CreateTaskRequest, TaskOptions};
use axum::Json;
use axum::extract::rejection::{JsonRejection, PathRejection, QueryRejection};
use axum::extract::{Path, Query, State};
use axum::http::{StatusCode, header};
use axum::response::IntoResponse;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use uuid::Uuid;

/// Execution options shared by every task submission.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub(super) struct OptionsBody {
    tf_vars_file: Option<String>,
    play_vars_file: Option<String>,
    playbook: Option<String>,
    targets: Vec<String>,
    variables: BTreeMap<String, String>,
    step_timeout_secs: Option<u64>,
    runner_id: Option<String>,
    reference: Option<String>,
}

impl From<OptionsBody> for TaskOptions {
    fn from(body: OptionsBody) -> Self {
        Self {
            tf_vars_file: body.tf_vars_file,
            play_vars_file: body.play_vars_file,
            playbook: body.playbook,
            targets: body.targets,
            variables: body.variables,
            step_timeout_secs: body.step_timeout_secs,
            runner_id: body.runner_id,
            reference: body.reference,
        }
    }
}

/// Deploy request body.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub(super) struct DeployBody {
    task_type: Option<String>,
    #[serde(flatten)]
    options: OptionsBody,
}

/// Scan request body.
#[derive(Debug, Clone, Deserialize)]
pub(super) struct ScanBody {
    template_id: Uuid,
    #[serde(default)]
    environment_id: Option<Uuid>,
    #[serde(flatten)]
    options: OptionsBody,
}

/// Response of a deploy or destroy submission.
#[derive(Debug, Clone, Serialize)]
pub(super) struct CreatedTasks {
    task: Task,
    mirror: Option<Task>,
}

impl From<TaskCreation> for CreatedTasks {
    fn from(creation: TaskCreation) -> Self {
        Self {
            task: creation.task,
            mirror: creation.mirror,
        }
    }
}

/// Log read query.
#[derive(Debug, Clone, Copy, Default, Deserialize)]
pub(super) struct OffsetQuery {
    #[serde(default)]
    offset: u64,
}

#[derive(Debug, Serialize)]
pub(super) struct Health {
    status: &'static str,
}

pub(super) async fn check() -> Json<Health> {
    Json(Health { status: "ok" })
}

pub(super) fn path_id(path: Result<Path<Uuid>, PathRejection>) -> ApiResult<Uuid> {
    path.map(|Path(id)| id)
        .map_err(|rejection| ApiError::validation(rejection.body_text()))
}

pub(super) fn offset(query: Result<Query<OffsetQuery>, QueryRejection>) -> ApiResult<u64> {
    query
        .map(|Query(params)| params.offset)
        .map_err(|rejection| ApiError::validation(rejection.body_text()))
}

fn json<T>(body: Result<Json<T>, JsonRejection>) -> ApiResult<T> {
    body.map(|Json(value)| value)
        .map_err(|rejection| ApiError::validation(rejection.body_text()))
}

async fn submit(
    plane: &AppState,
    environment_id: EnvironmentId,
    task_type: Option<String>,
    creator: CallerId,
    options: OptionsBody,
) -> ApiResult<(StatusCode, Json<CreatedTasks>)> {
    let creation = plane
        .submit_task(CreateTaskRequest {
            environment_id,
            task_type,
            creator: creator.0,
            options: options.into(),
        })
        .await?;
    Ok((StatusCode::CREATED, Json(creation.into())))
}

pub(super) async fn deploy(
    State(plane): State<AppState>,
    caller: CallerId,
    path: Result<Path<Uuid>, PathRejection>,
    body: Result<Json<DeployBody>, JsonRejection>,
) -> ApiResult<(StatusCode, Json<CreatedTasks>)> {
    let environment_id = EnvironmentId::from_uuid(path_id(path)?);
    let request = json(body)?;
    submit(&plane, environment_id, request.task_type, caller, request.options).await
}

pub(super) async fn destroy(
    State(plane): State<AppState>,
    caller: CallerId,
    path: Result<Path<Uuid>, PathRejection>,
    body: Result<Json<OptionsBody>, JsonRejection>,
) -> ApiResult<(StatusCode, Json<CreatedTasks>)> {
    let environment_id = EnvironmentId::from_uuid(path_id(path)?);
    let options = json(body)?;
    submit(
        &plane,
        environment_id,
        Some("destroy".to_owned()),
        caller,
        options,
    )
    .await
}

pub(super) async fn scan(
    State(plane): State<AppState>,
    caller: CallerId,
    body: Result<Json<ScanBody>, JsonRejection>,
) -> ApiResult<(StatusCode, Json<Task>)> {
    let request = json(body)?;
    let task = plane
        .submit_scan(CreateScanRequest {
            template_id: TemplateId::from_uuid(request.template_id),
            environment_id: request.environment_id.map(EnvironmentId::from_uuid),
            creator: caller.0,
            options: request.options.into(),
        })
        .await?;
    Ok((StatusCode::CREATED, Json(task)))
}

pub(super) async fn get_task(
    State(plane): State<AppState>,
    path: Result<Path<Uuid>, PathRejection>,
) -> ApiResult<Json<Task>> {
    let task_id = TaskId::from_uuid(path_id(path)?);
    Ok(Json(plane.task(task_id).await?))
}

pub(super) async fn read_log(
    State(plane): State<AppState>,
    path: Result<Path<Uuid>, PathRejection>,
    query: Result<Query<OffsetQuery>, QueryRejection>,
) -> ApiResult<impl IntoResponse> {
    let task_id = TaskId::from_uuid(path_id(path)?);
    let content = plane.read_log(task_id, offset(query)?).await?;
    Ok((
        [(header::CONTENT_TYPE, "text/plain; charset=utf-8")],
        content,
    ))
}

pub(super) async fn approve(
    State(plane): State<AppState>,
    caller: CallerId,
    path: Result<Path<Uuid>, PathRejection>,
) -> ApiResult<Json<Task>> {
    let task_id = TaskId::from_uuid(path_id(path)?);
    Ok(Json(plane.approve(task_id, caller.0).await?))
}

pub(super) async fn cancel(
    State(plane): State<AppState>,
    caller: CallerId,
    path: Result<Path<Uuid>, PathRejection>,
) -> ApiResult<(StatusCode, Json<Task>)> {
    let task_id = TaskId::from_uuid(path_id(path)?);
    let task = plane.cancel(task_id, caller.0).await?;
    Ok((StatusCode::ACCEPTED, Json(task)))
}

pub(super) async fn policy_results(
    State(plane): State<AppState>,
    path: Result<Path<Uuid>, PathRejection>,
) -> ApiResult<Json<Vec<PolicyResult>>> {
    let task_id = TaskId::from_uuid(path_id(path)?);
    Ok(Json(plane.policy_results(task_id).await?))
}
