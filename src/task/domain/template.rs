//! IaC templates and their execution defaults.

use super::{ParseStatusError, TaskDomainError, TemplateId};
use crate::vcs::VcsProvider;
use serde::{Deserialize, Serialize};

/// Whether a template accepts new tasks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TemplateStatus {
    /// Template accepts new tasks.
    #[default]
    Enabled,
    /// Template rejects new tasks.
    Disabled,
}

impl TemplateStatus {
    /// Returns the canonical storage representation.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Enabled => "enable",
            Self::Disabled => "disable",
        }
    }
}

impl TryFrom<&str> for TemplateStatus {
    type Error = ParseStatusError;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        match value.trim().to_ascii_lowercase().as_str() {
            "enable" | "enabled" => Ok(Self::Enabled),
            "disable" | "disabled" => Ok(Self::Disabled),
            _ => Err(ParseStatusError(value.to_owned())),
        }
    }
}

/// Where a template's source lives.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TemplateSource {
    /// Hosting provider.
    pub provider: VcsProvider,
    /// Repository id or `namespace/name` path at the provider.
    pub repository: String,
    /// Default branch or tag to deploy.
    pub reference: String,
    /// Clone address handed to workers.
    pub address: String,
}

/// Execution defaults inherited by tasks unless a request overrides them.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TemplateDefaults {
    /// Working directory inside the repository.
    pub workdir: String,
    /// Terraform variable file.
    pub tf_vars_file: Option<String>,
    /// Ansible variable file.
    pub play_vars_file: Option<String>,
    /// Ansible playbook.
    pub playbook: Option<String>,
    /// Step timeout in seconds.
    pub step_timeout_secs: Option<u64>,
}

/// IaC template.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Template {
    id: TemplateId,
    name: String,
    status: TemplateStatus,
    source: TemplateSource,
    defaults: TemplateDefaults,
    policy_enabled: bool,
}

/// Parameter object for reconstructing a persisted template.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PersistedTemplateData {
    /// Persisted identifier.
    pub id: TemplateId,
    /// Display name.
    pub name: String,
    /// Whether the template accepts tasks.
    pub status: TemplateStatus,
    /// Source location.
    pub source: TemplateSource,
    /// Execution defaults.
    pub defaults: TemplateDefaults,
    /// Whether plan and apply tasks get a mirror scan.
    pub policy_enabled: bool,
}

impl Template {
    /// Creates an enabled template.
    ///
    /// # Errors
    ///
    /// Returns [`TaskDomainError::EmptyTemplateName`] when the name is blank.
    pub fn new(name: impl Into<String>, source: TemplateSource) -> Result<Self, TaskDomainError> {
        let raw = name.into();
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return Err(TaskDomainError::EmptyTemplateName);
        }
        Ok(Self {
            id: TemplateId::new(),
            name: trimmed.to_owned(),
            status: TemplateStatus::Enabled,
            source,
            defaults: TemplateDefaults::default(),
            policy_enabled: false,
        })
    }

    /// Reconstructs a template from persisted storage.
    #[must_use]
    pub fn from_persisted(data: PersistedTemplateData) -> Self {
        Self {
            id: data.id,
            name: data.name,
            status: data.status,
            source: data.source,
            defaults: data.defaults,
            policy_enabled: data.policy_enabled,
        }
    }

    /// Replaces the execution defaults.
    #[must_use]
    pub fn with_defaults(mut self, defaults: TemplateDefaults) -> Self {
        self.defaults = defaults;
        self
    }

    /// Enables or disables mirror scans for plan and apply tasks.
    #[must_use]
    pub const fn with_policy_enabled(mut self, enabled: bool) -> Self {
        self.policy_enabled = enabled;
        self
    }

    /// Sets the template status.
    #[must_use]
    pub const fn with_status(mut self, status: TemplateStatus) -> Self {
        self.status = status;
        self
    }

    /// Returns the template identifier.
    #[must_use]
    pub const fn id(&self) -> TemplateId {
        self.id
    }

    /// Returns the display name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the template status.
    #[must_use]
    pub const fn status(&self) -> TemplateStatus {
        self.status
    }

    /// Returns `true` when the template rejects new tasks.
    #[must_use]
    pub const fn is_disabled(&self) -> bool {
        matches!(self.status, TemplateStatus::Disabled)
    }

    /// Returns the source location.
    #[must_use]
    pub const fn source(&self) -> &TemplateSource {
        &self.source
    }

    /// Returns the execution defaults.
    #[must_use]
    pub const fn defaults(&self) -> &TemplateDefaults {
        &self.defaults
    }

    /// Returns `true` when plan and apply tasks get a mirror scan.
    #[must_use]
    pub const fn policy_enabled(&self) -> bool {
        self.policy_enabled
    }
}
