//! HTTP routes exercised with `tower::ServiceExt::oneshot`.

use crate::test_helpers::{Harness, harness, template};
use axum::Router;
use axum::body::{Body, to_bytes};
use axum::http::{Method, Request, StatusCode};
use caisson::api::{USER_ID_HEADER, router};
use caisson::runner::adapters::StepBehaviour;
use caisson::task::domain::{Environment, StepName, TaskId, TaskStatus};
use eyre::{OptionExt, ensure};
use rstest::rstest;
use serde_json::{Value, json};
use tower::ServiceExt;
use uuid::Uuid;

struct Response {
    status: StatusCode,
    body: Vec<u8>,
}

impl Response {
    fn json(&self) -> eyre::Result<Value> {
        Ok(serde_json::from_slice(&self.body)?)
    }

    fn code(&self) -> eyre::Result<String> {
        Ok(self.json()?["code"]
            .as_str()
            .ok_or_eyre("error body has no code")?
            .to_owned())
    }
}

async fn call(app: &Router, request: Request<Body>) -> eyre::Result<Response> {
    let response = app.clone().oneshot(request).await?;
    let status = response.status();
    let body = to_bytes(response.into_body(), usize::MAX).await?;
    Ok(Response {
        status,
        body: body.to_vec(),
    })
}

fn get(uri: &str) -> eyre::Result<Request<Body>> {
    Ok(Request::builder().uri(uri).body(Body::empty())?)
}

fn post(uri: &str, body: &Value) -> eyre::Result<Request<Body>> {
    Ok(Request::builder()
        .method(Method::POST)
        .uri(uri)
        .header("content-type", "application/json")
        .header(USER_ID_HEADER, Uuid::new_v4().to_string())
        .body(Body::from(body.to_string()))?)
}

async fn deploy(app: &Router, environment: &Environment, body: &Value) -> eyre::Result<TaskId> {
    let response = call(
        app,
        post(&format!("/api/v1/envs/{}/deploy", environment.id()), body)?,
    )
    .await?;
    ensure!(
        response.status == StatusCode::CREATED,
        "status {}: {}",
        response.status,
        String::from_utf8_lossy(&response.body)
    );
    let id = response.json()?["task"]["id"]
        .as_str()
        .ok_or_eyre("task id missing")?
        .parse::<Uuid>()?;
    Ok(TaskId::from_uuid(id))
}

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn check_reports_ok(harness: Harness) -> eyre::Result<()> {
    let app = router(harness.plane.clone());

    let response = call(&app, get("/api/v1/check")?).await?;

    ensure!(response.status == StatusCode::OK, "status {}", response.status);
    ensure!(response.json()? == json!({"status": "ok"}), "body mismatch");
    Ok(())
}

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn deploy_then_fetch_task_and_log(harness: Harness) -> eyre::Result<()> {
    let environment = harness.seed(&template(), |env| env).await?;
    let app = router(harness.plane.clone());

    let task_id = deploy(&app, &environment, &json!({"task_type": "plan"})).await?;
    harness.reached(task_id, TaskStatus::Complete).await?;
    let task = call(&app, get(&format!("/api/v1/tasks/{task_id}"))?).await?;
    let log = call(&app, get(&format!("/api/v1/tasks/{task_id}/log?offset=9"))?).await?;

    ensure!(task.status == StatusCode::OK, "status {}", task.status);
    let body = task.json()?;
    ensure!(body["status"] == "complete", "task {body}");
    ensure!(body["steps"][1]["log_offset"] == 9, "steps {}", body["steps"]);
    ensure!(log.status == StatusCode::OK, "status {}", log.status);
    ensure!(log.body == b"plan: ok\n", "log {}", String::from_utf8_lossy(&log.body));
    Ok(())
}

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn mutation_without_caller_is_rejected(harness: Harness) -> eyre::Result<()> {
    let environment = harness.seed(&template(), |env| env).await?;
    let app = router(harness.plane.clone());
    let request = Request::builder()
        .method(Method::POST)
        .uri(format!("/api/v1/envs/{}/deploy", environment.id()))
        .header("content-type", "application/json")
        .body(Body::from(r#"{"task_type":"plan"}"#))?;

    let response = call(&app, request).await?;

    ensure!(response.status == StatusCode::BAD_REQUEST, "status {}", response.status);
    ensure!(response.code()? == "validation", "code {}", response.code()?);
    ensure!(
        !harness.environment(&environment).await?.is_deploying(),
        "environment locked by a rejected request"
    );
    Ok(())
}

#[rstest]
#[case(json!({"task_type": "teardown"}))]
#[case(json!({}))]
#[tokio::test(flavor = "multi_thread")]
async fn bad_task_type_is_a_validation_error(
    harness: Harness,
    #[case] body: Value,
) -> eyre::Result<()> {
    let environment = harness.seed(&template(), |env| env).await?;
    let app = router(harness.plane.clone());

    let response = call(
        &app,
        post(&format!("/api/v1/envs/{}/deploy", environment.id()), &body)?,
    )
    .await?;

    ensure!(response.status == StatusCode::BAD_REQUEST, "status {}", response.status);
    ensure!(response.code()? == "validation", "code {}", response.code()?);
    Ok(())
}

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn second_deploy_conflicts(harness: Harness) -> eyre::Result<()> {
    let environment = harness.seed(&template(), |env| env).await?;
    harness.worker.set_behaviour(
        StepName::Plan,
        StepBehaviour::Hang(Vec::new()),
    )?;
    let app = router(harness.plane.clone());
    let first = deploy(&app, &environment, &json!({"task_type": "plan"})).await?;

    let response = call(
        &app,
        post(
            &format!("/api/v1/envs/{}/deploy", environment.id()),
            &json!({"task_type": "plan"}),
        )?,
    )
    .await?;
    let cancel = call(
        &app,
        post(&format!("/api/v1/tasks/{first}/cancel"), &json!({}))?,
    )
    .await?;

    ensure!(response.status == StatusCode::CONFLICT, "status {}", response.status);
    ensure!(response.code()? == "conflict", "code {}", response.code()?);
    ensure!(cancel.status == StatusCode::ACCEPTED, "cancel status {}", cancel.status);
    let cancelled = harness.finished(first).await?;
    ensure!(cancelled.status() == TaskStatus::Cancelled, "status {:?}", cancelled.status());
    Ok(())
}

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn unknown_and_malformed_task_ids(harness: Harness) -> eyre::Result<()> {
    let app = router(harness.plane.clone());

    let unknown = call(&app, get(&format!("/api/v1/tasks/{}", Uuid::new_v4()))?).await?;
    let malformed = call(&app, get("/api/v1/tasks/not-a-uuid")?).await?;
    let follow = call(
        &app,
        get(&format!("/api/v1/tasks/{}/log/follow", Uuid::new_v4()))?,
    )
    .await?;

    ensure!(unknown.status == StatusCode::NOT_FOUND, "status {}", unknown.status);
    ensure!(unknown.code()? == "not_found", "code {}", unknown.code()?);
    ensure!(malformed.status == StatusCode::BAD_REQUEST, "status {}", malformed.status);
    ensure!(follow.status == StatusCode::NOT_FOUND, "status {}", follow.status);
    Ok(())
}

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn follow_without_upgrade_is_rejected(harness: Harness) -> eyre::Result<()> {
    let environment = harness.seed(&template(), |env| env).await?;
    let app = router(harness.plane.clone());
    let task_id = deploy(&app, &environment, &json!({"task_type": "plan"})).await?;

    let response = call(&app, get(&format!("/api/v1/tasks/{task_id}/log/follow"))?).await?;

    ensure!(response.status == StatusCode::BAD_REQUEST, "status {}", response.status);
    ensure!(response.code()? == "validation", "code {}", response.code()?);
    Ok(())
}

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn approving_a_plan_conflicts(harness: Harness) -> eyre::Result<()> {
    let environment = harness.seed(&template(), |env| env).await?;
    let app = router(harness.plane.clone());
    let task_id = deploy(&app, &environment, &json!({"task_type": "plan"})).await?;
    harness.finished(task_id).await?;

    let response = call(
        &app,
        post(&format!("/api/v1/tasks/{task_id}/approve"), &json!({}))?,
    )
    .await?;

    ensure!(response.status == StatusCode::CONFLICT, "status {}", response.status);
    Ok(())
}

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn scan_for_unknown_template_is_not_found(harness: Harness) -> eyre::Result<()> {
    let app = router(harness.plane.clone());

    let response = call(
        &app,
        post("/api/v1/scans", &json!({"template_id": Uuid::new_v4()}))?,
    )
    .await?;

    ensure!(response.status == StatusCode::NOT_FOUND, "status {}", response.status);
    ensure!(response.code()? == "not_found", "code {}", response.code()?);
    Ok(())
}
