//! Shared builders for scan unit tests.

use crate::scan::domain::{Policy, PolicyId};
use crate::task::domain::{
    EnvironmentId, ExecutionSnapshot, NewTaskParams, StepStatus, Task, TaskType, TemplateId,
    UserId,
};
use mockable::DefaultClock;

pub(super) fn policy(id: &str) -> Policy {
    Policy {
        id: PolicyId::new(id),
        group_id: "aws".to_owned(),
        name: format!("policy {id}"),
    }
}

pub(super) fn scan_task(
    template_id: TemplateId,
    environment_id: Option<EnvironmentId>,
    task_type: TaskType,
) -> Task {
    Task::new(
        NewTaskParams {
            task_type,
            template_id,
            environment_id,
            creator: UserId::new(),
            runner_id: None,
            snapshot: ExecutionSnapshot::default(),
            step_timeout_secs: 60,
            auto_approve: true,
        },
        &DefaultClock,
    )
    .expect("valid task")
}

/// Drives every step of `task` to completion.
pub(super) fn complete(mut task: Task) -> Task {
    for index in 0..task.steps().len() {
        task.start_step(index, 0, &DefaultClock).expect("start step");
        task.finish_step(index, StepStatus::Complete, None, &DefaultClock)
            .expect("finish step");
    }
    task
}

pub(super) const REPORT: &str = r#"{
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
