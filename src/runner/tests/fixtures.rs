//! Shared builders for runner unit tests.

use crate::task::domain::{ExecutionSnapshot, NewTaskParams, Task, TaskType, TemplateId, UserId};
use mockable::DefaultClock;
use std::collections::BTreeMap;

pub(super) fn snapshot() -> ExecutionSnapshot {
    ExecutionSnapshot {
        repo_addr: "https://git.local/infra/network.git".to_owned(),
        revision: "a1b2c3".to_owned(),
        workdir: "stacks/vpc/".to_owned(),
        tf_vars_file: Some("prod.tfvars".to_owned()),
        play_vars_file: None,
        playbook: Some("site.yml".to_owned()),
        targets: vec!["module.vpc".to_owned()],
        variables: BTreeMap::from([("region".to_owned(), "eu-west-1".to_owned())]),
    }
}

pub(super) fn task_with_timeout(task_type: TaskType, auto_approve: bool, timeout_secs: u64) -> Task {
    Task::new(
        NewTaskParams {
            task_type,
            template_id: TemplateId::new(),
            environment_id: None,
            creator: UserId::new(),
            runner_id: None,
            snapshot: snapshot(),
            step_timeout_secs: timeout_secs,
            auto_approve,
        },
        &DefaultClock,
    )
    .expect("valid task")
}

pub(super) fn task(task_type: TaskType, auto_approve: bool) -> Task {
    task_with_timeout(task_type, auto_approve, 60)
}
