//! Workspace assignments sent to workers.

use super::shell_escape;
use crate::task::domain::{ExecutionSnapshot, StepName, Task, TaskId, TaskType, TemplateId};
use minijinja::{Environment, context};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Directory, relative to the worker workspace, the repository is cloned
/// into.
pub const CODE_DIR: &str = "code";

/// File, relative to the worker workspace, the scan step writes its report
/// to.
pub const SCAN_RESULT_FILE: &str = "scan_result.json";

const TF_ARGS: &str = r#"{% if tf_vars_file %} -var-file={{ tf_vars_file|sh }}{% endif %}
{%- for target in targets %} -target={{ target|sh }}{% endfor %}
{%- for name, value in variables|items %} -var {{ (name ~ "=" ~ value)|sh }}{% endfor %}"#;

const INIT: &str = r#"set -e
git clone --quiet {{ repo_addr|sh }} {{ code_root|sh }}
git -C {{ code_root|sh }} checkout --quiet {{ revision|sh }}
cd {{ code_dir|sh }}
{% if task_type != "scan" %}terraform init -input=false -no-color
{% endif %}"#;

const PLAN: &str = r#"set -e
cd {{ code_dir|sh }}
terraform plan -input=false -no-color -out=_caisson.tfplan{% include "tf_args" %}
"#;

const APPLY: &str = r#"set -e
cd {{ code_dir|sh }}
terraform apply -input=false -no-color -auto-approve _caisson.tfplan
{% if playbook %}ansible-playbook -i /caisson/assets/terraform.py
{%- if play_vars_file %} -e @{{ play_vars_file|sh }}{% endif %} {{ playbook|sh }}
{% endif %}"#;

const DESTROY: &str = r#"set -e
cd {{ code_dir|sh }}
terraform destroy -input=false -no-color -auto-approve{% include "tf_args" %}
"#;

const SCAN: &str = r#"set -e
terrascan scan -i terraform -d {{ code_dir|sh }} -o json > {{ scan_result|sh }} || test $? -eq 3
"#;

/// Error raised when a step script cannot be rendered.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("failed to render {step} script: {reason}")]
pub struct AssignmentError {
    /// Step whose script failed.
    pub step: StepName,
    /// Renderer message.
    pub reason: String,
}

/// Rendered script of one worker step.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StepScript {
    /// Position in the task flow.
    pub index: usize,
    /// Step name.
    pub name: StepName,
    /// Shell script run from the worker workspace root.
    pub script: String,
}

/// Everything a worker needs to execute a task.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Assignment {
    /// Task being executed.
    pub task_id: TaskId,
    /// Template of the task; keys the log artifact.
    pub template_id: TemplateId,
    /// Task type.
    pub task_type: TaskType,
    /// Repository, revision, files and variables.
    pub workspace: ExecutionSnapshot,
    /// Step timeout in seconds.
    pub step_timeout_secs: u64,
    /// Scripts of worker steps in flow order; review steps have none.
    pub steps: Vec<StepScript>,
}

/// Request to run one step, as sent to a worker.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StepRequest {
    /// Task being executed.
    pub task_id: TaskId,
    /// Template of the task.
    pub template_id: TemplateId,
    /// Step to run.
    pub step: StepScript,
    /// Repository, revision, files and variables.
    pub workspace: ExecutionSnapshot,
    /// Step timeout in seconds.
    pub timeout_secs: u64,
}

impl Assignment {
    /// Renders the assignment for `task`.
    ///
    /// # Errors
    ///
    /// Returns [`AssignmentError`] when a script template fails to render.
    pub fn render(task: &Task) -> Result<Self, AssignmentError> {
        let snapshot = task.snapshot();
        let code_dir = if snapshot.workdir.trim_matches('/').is_empty() {
            CODE_DIR.to_owned()
        } else {
            format!("{CODE_DIR}/{}", snapshot.workdir.trim_matches('/'))
        };
        let mut environment = Environment::new();
        environment.add_filter("sh", |value: String| shell_escape(&value));
        let templates = [
            ("tf_args", TF_ARGS),
            ("init", INIT),
            ("plan", PLAN),
            ("apply", APPLY),
            ("destroy", DESTROY),
            ("scan", SCAN),
        ];
        for (name, source) in templates {
            environment
                .add_template(name, source)
                .map_err(|err| AssignmentError {
                    step: StepName::Init,
                    reason: format!("template {name}: {err}"),
                })?;
        }
        let values = context! {
            task_type => task.task_type().as_str(),
            repo_addr => &snapshot.repo_addr,
            revision => &snapshot.revision,
            code_root => CODE_DIR,
            code_dir => code_dir,
            tf_vars_file => &snapshot.tf_vars_file,
            play_vars_file => &snapshot.play_vars_file,
            playbook => &snapshot.playbook,
            targets => &snapshot.targets,
            variables => &snapshot.variables,
            scan_result => SCAN_RESULT_FILE,
        };

        let steps = task
            .steps()
            .iter()
            .enumerate()
            .filter(|(_, step)| step.name.runs_on_worker())
            .map(|(index, step)| {
                let render_error = |err: minijinja::Error| AssignmentError {
                    step: step.name,
                    reason: err.to_string(),
                };
                let script = environment
                    .get_template(step.name.as_str())
                    .and_then(|template| template.render(&values))
                    .map_err(render_error)?;
                Ok(StepScript {
                    index,
                    name: step.name,
                    script,
                })
            })
            .collect::<Result<Vec<_>, AssignmentError>>()?;

        Ok(Self {
            task_id: task.id(),
            template_id: task.template_id(),
            task_type: task.task_type(),
            workspace: snapshot.clone(),
            step_timeout_secs: task.step_timeout_secs(),
            steps,
        })
    }

    /// Returns the worker request for the step at flow position `index`.
    #[must_use]
    pub fn step_request(&self, index: usize) -> Option<StepRequest> {
        let step = self.steps.iter().find(|step| step.index == index)?;
        Some(StepRequest {
            task_id: self.task_id,
            template_id: self.template_id,
            step: step.clone(),
            workspace: self.workspace.clone(),
            timeout_secs: self.step_timeout_secs,
        })
    }
}
