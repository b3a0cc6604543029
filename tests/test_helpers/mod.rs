//! Control plane harness shared by integration and behaviour tests.

use async_trait::async_trait;
use bytes::Bytes;
use caisson::logs::adapters::LogStore;
use caisson::logs::domain::CloseFrame;
use caisson::logs::ports::{LogSink, SinkError};
use caisson::orchestrator::{ControlPlane, ControlPlaneParts, ControlPlaneSettings};
use caisson::runner::adapters::{InMemoryWorker, StaticRunnerSelector};
use caisson::runner::ports::RunnerSelector;
use caisson::runner::services::{DispatcherSettings, WorkerRegistry};
use caisson::scan::adapters::memory::{InMemoryPolicyCatalog, InMemoryPolicyResultRepository};
use caisson::scan::domain::{Policy, PolicyId, PolicyResult, PolicyResultStatus, ScanTarget};
use caisson::scan::ports::PolicyResultRepository;
use caisson::task::adapters::access::AllowAll;
use caisson::task::adapters::memory::InMemoryTaskRepository;
use caisson::task::domain::{
    Environment, RunnerId, Task, TaskId, TaskStatus, Template, TemplateDefaults, TemplateSource,
    UserId,
};
use caisson::task::ports::TaskRepository;
use caisson::task::services::{CreateTaskRequest, TaskOptions};
use caisson::vcs::adapters::InMemoryVcs;
use caisson::vcs::{VcsProvider, VcsRegistry};
use camino::Utf8Path;
use mockable::DefaultClock;
use rstest::fixture;
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;

/// Terrascan report violating P1 and passing P2.
pub const REPORT: &str = r#"{
  "results": {
    "violations": [
      {
        "rule_name": "s3BucketPublic",
        "description": "S3 bucket is publicly readable",
        "rule_id": "P1",
        "severity": "HIGH",
        "category": "Data Protection",
        "resource_name": "logs",
        "resource_type": "aws_s3_bucket",
        "module_name": "root",
        "file": "main.tf",
        "plan_root": "./",
        "line": 12
      }
    ],
    "passed_rules": [
      {
        "rule_name": "rdsEncrypted",
        "description": "RDS storage is encrypted",
        "rule_id": "P2",
        "severity": "MEDIUM",
        "category": "Encryption"
      }
    ]
  }
}"#;

const POLL: Duration = Duration::from_millis(10);
const DEADLINE: Duration = Duration::from_secs(5);

/// Control plane wired to in-memory adapters and a scripted worker.
pub struct Harness {
    /// Plane under test.
    pub plane: ControlPlane<DefaultClock>,
    /// Task persistence shared with the plane.
    pub repository: Arc<InMemoryTaskRepository>,
    /// Policy catalog shared with the plane.
    pub catalog: InMemoryPolicyCatalog,
    /// Scripted worker registered as runner `local`.
    pub worker: InMemoryWorker,
    _logs: TempDir,
}

/// Adapters replacing the harness defaults.
#[derive(Default)]
pub struct Overrides {
    /// Runner selection; the static `local` selector when absent.
    pub selector: Option<Arc<dyn RunnerSelector>>,
    /// Policy result persistence; a fresh in-memory store when absent.
    pub results: Option<Arc<dyn PolicyResultRepository>>,
}

/// Provides a fresh control plane per test.
#[fixture]
pub fn harness() -> Harness {
    build_harness()
}

/// Builds a control plane wired to in-memory adapters.
///
/// # Panics
///
/// Panics if the temporary log directory cannot be prepared.
#[must_use]
pub fn build_harness() -> Harness {
    build_harness_with(Overrides::default())
}

/// Builds a control plane with some adapters replaced.
///
/// # Panics
///
/// Panics if the temporary log directory cannot be prepared.
#[must_use]
pub fn build_harness_with(overrides: Overrides) -> Harness {
    let dir = TempDir::new().expect("create log directory");
    let base = Utf8Path::from_path(dir.path()).expect("utf-8 temp path");
    let logs = LogStore::open(base).expect("open log store");
    let repository = Arc::new(InMemoryTaskRepository::new());
    let catalog = InMemoryPolicyCatalog::new();
    let worker = InMemoryWorker::new(logs.clone());
    let runner = RunnerId::new("local").expect("valid runner id");

    let host = InMemoryVcs::new();
    host.add_repository("infra/network", "main", "a1b2c3")
        .expect("seed repository");
    let vcs = VcsRegistry::new().with_backend(VcsProvider::Gitea, Arc::new(host));

    let parts = ControlPlaneParts {
        tasks: Arc::clone(&repository) as Arc<dyn TaskRepository>,
        catalog: Arc::new(catalog.clone()),
        results: overrides
            .results
            .unwrap_or_else(|| Arc::new(InMemoryPolicyResultRepository::new())),
        vcs: Arc::new(vcs),
        access: Arc::new(AllowAll),
        workers: WorkerRegistry::new().with_worker(runner.clone(), Arc::new(worker.clone())),
        selector: overrides
            .selector
            .unwrap_or_else(|| Arc::new(StaticRunnerSelector::new(Some(runner)))),
        logs,
        clock: Arc::new(DefaultClock),
    };
    let settings = ControlPlaneSettings {
        default_step_timeout_secs: 60,
        follow_backoff: POLL,
        dispatcher: DispatcherSettings {
            poll_interval: POLL,
            abort_grace: Duration::from_secs(1),
            persist_attempts: 3,
            retry_backoff: POLL,
        },
        reconcile_attempts: 4,
        reconcile_backoff: POLL,
    };
    Harness {
        plane: ControlPlane::new(parts, settings),
        repository,
        catalog,
        worker,
        _logs: dir,
    }
}

/// Builds the network template used throughout the suite.
///
/// # Panics
///
/// Panics if the template name is rejected.
#[must_use]
pub fn template() -> Template {
    Template::new(
        "network",
        TemplateSource {
            provider: VcsProvider::Gitea,
            repository: "infra/network".to_owned(),
            reference: "main".to_owned(),
            address: "https://git.local/infra/network.git".to_owned(),
        },
    )
    .expect("valid template")
    .with_defaults(TemplateDefaults {
        workdir: "stacks/vpc".to_owned(),
        tf_vars_file: Some("prod.tfvars".to_owned()),
        play_vars_file: None,
        playbook: None,
        step_timeout_secs: Some(30),
    })
}

/// Builds a policy with `id`.
#[must_use]
pub fn policy(id: &str) -> Policy {
    Policy {
        id: PolicyId::new(id),
        group_id: "aws".to_owned(),
        name: format!("policy {id}"),
    }
}

/// Builds a deploy request for `environment`.
#[must_use]
pub fn deploy(environment: &Environment, task_type: &str) -> CreateTaskRequest {
    CreateTaskRequest {
        environment_id: environment.id(),
        task_type: Some(task_type.to_owned()),
        creator: UserId::new(),
        options: TaskOptions::default(),
    }
}

impl Harness {
    /// Stores `template` and an environment built from it.
    ///
    /// # Errors
    ///
    /// Returns an error if the repository rejects either row.
    pub async fn seed(
        &self,
        template: &Template,
        environment: impl FnOnce(Environment) -> Environment,
    ) -> eyre::Result<Environment> {
        let environment = environment(Environment::new(template.id(), "prod"));
        self.repository.save_template(template).await?;
        self.repository.save_environment(&environment).await?;
        Ok(environment)
    }

    /// Binds policies P1, P2 and P3 to `target`.
    ///
    /// # Errors
    ///
    /// Returns an error if the catalog lock is poisoned.
    pub fn bind_policies(&self, target: ScanTarget) -> eyre::Result<()> {
        for id in ["P1", "P2", "P3"] {
            self.catalog.bind(target, policy(id))?;
        }
        Ok(())
    }

    /// Reloads an environment.
    ///
    /// # Errors
    ///
    /// Returns an error if the environment is missing.
    pub async fn environment(&self, environment: &Environment) -> eyre::Result<Environment> {
        self.repository
            .find_environment(environment.id())
            .await?
            .ok_or_else(|| eyre::eyre!("environment {} missing", environment.id()))
    }

    /// Polls `task_id` until `accept` holds.
    ///
    /// # Errors
    ///
    /// Returns an error if the condition does not hold within the deadline.
    pub async fn wait_until(
        &self,
        task_id: TaskId,
        accept: impl Fn(&Task) -> bool,
    ) -> eyre::Result<Task> {
        let deadline = tokio::time::Instant::now() + DEADLINE;
        loop {
            let task = self.plane.task(task_id).await?;
            if accept(&task) {
                return Ok(task);
            }
            if tokio::time::Instant::now() >= deadline {
                eyre::bail!("task {task_id} stuck in {:?}", task.status());
            }
            tokio::time::sleep(POLL).await;
        }
    }

    /// Polls `task_id` until it is terminal.
    ///
    /// # Errors
    ///
    /// Returns an error if the task does not finish within the deadline.
    pub async fn finished(&self, task_id: TaskId) -> eyre::Result<Task> {
        self.wait_until(task_id, Task::is_terminal).await
    }

    /// Polls `task_id` until it reaches `status`.
    ///
    /// # Errors
    ///
    /// Returns an error if the status is not reached within the deadline.
    pub async fn reached(&self, task_id: TaskId, status: TaskStatus) -> eyre::Result<Task> {
        self.wait_until(task_id, |task| task.status() == status).await
    }

    /// Polls the policy results of `task_id` until none is pending.
    ///
    /// # Errors
    ///
    /// Returns an error if results remain pending past the deadline.
    pub async fn reconciled(&self, task_id: TaskId) -> eyre::Result<Vec<PolicyResult>> {
        let deadline = tokio::time::Instant::now() + DEADLINE;
        loop {
            let results = self.plane.policy_results(task_id).await?;
            if !results.is_empty()
                && results
                    .iter()
                    .all(|row| row.status != PolicyResultStatus::Pending)
            {
                return Ok(results);
            }
            if tokio::time::Instant::now() >= deadline {
                eyre::bail!("results of {task_id} still pending");
            }
            tokio::time::sleep(POLL).await;
        }
    }
}

/// Returns the status of `policy` among `results`.
#[must_use]
pub fn status_of(results: &[PolicyResult], policy: &str) -> Option<PolicyResultStatus> {
    results
        .iter()
        .find(|row| row.policy_id.as_str() == policy)
        .map(|row| row.status)
}

/// Sink collecting everything a follow session delivers.
#[derive(Debug, Default)]
pub struct CollectingSink {
    /// Delivered content, in delivery order.
    pub content: Vec<u8>,
    /// Closure frame, if one was sent.
    pub close: Option<CloseFrame>,
}

#[async_trait]
impl LogSink for CollectingSink {
    async fn send(&mut self, chunk: Bytes) -> Result<(), SinkError> {
        self.content.extend_from_slice(&chunk);
        Ok(())
    }

    async fn close(&mut self, frame: CloseFrame) -> Result<(), SinkError> {
        self.close = Some(frame);
        Ok(())
    }
}
