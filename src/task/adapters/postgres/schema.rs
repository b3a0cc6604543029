//! Diesel schema for task lifecycle persistence.

diesel::table! {
    /// IaC templates.
    templates (id) {
        /// Template identifier.
        id -> Uuid,
        /// Display name.
        #[max_length = 255]
        name -> Varchar,
        /// `enable` or `disable`.
        #[max_length = 16]
        status -> Varchar,
        /// Hosting provider tag.
        #[max_length = 32]
        vcs_provider -> Varchar,
        /// Repository id or path at the provider.
        #[max_length = 255]
        repository -> Varchar,
        /// Default branch or tag.
        #[max_length = 255]
        reference -> Varchar,
        /// Clone address.
        repo_addr -> Text,
        /// Execution defaults payload.
        defaults -> Jsonb,
        /// Whether plan and apply tasks get a mirror scan.
        policy_enabled -> Bool,
    }
}

diesel::table! {
    /// Deployment environments and their lock.
    environments (id) {
        /// Environment identifier.
        id -> Uuid,
        /// Template deployed into the environment.
        template_id -> Uuid,
        /// Display name.
        #[max_length = 255]
        name -> Varchar,
        /// Archived flag.
        archived -> Bool,
        /// Lock flag, set while a task holds the environment.
        deploying -> Bool,
        /// Most recent task.
        last_task_id -> Nullable<Uuid>,
        /// Whether apply flows skip review.
        auto_approval -> Bool,
        /// Pinned runner.
        #[max_length = 64]
        runner_id -> Nullable<Varchar>,
        /// Step timeout override.
        step_timeout_secs -> Nullable<Int8>,
    }
}

diesel::table! {
    /// Tasks, including scan and mirror scan tasks.
    tasks (id) {
        /// Task identifier.
        id -> Uuid,
        /// `plan`, `apply`, `destroy` or `scan`.
        #[max_length = 16]
        task_type -> Varchar,
        /// Template executed.
        template_id -> Uuid,
        /// Environment deployed, if any.
        environment_id -> Nullable<Uuid>,
        /// Deploy task shadowed by this scan.
        mirror_of -> Nullable<Uuid>,
        /// Steps payload in flow order.
        steps -> Jsonb,
        /// Task lifecycle state.
        #[max_length = 16]
        status -> Varchar,
        /// Creator.
        creator -> Uuid,
        /// Assigned runner.
        #[max_length = 64]
        runner_id -> Nullable<Varchar>,
        /// Workspace inputs payload.
        snapshot -> Jsonb,
        /// Per-step timeout.
        step_timeout_secs -> Int8,
        /// Creation timestamp.
        created_at -> Timestamptz,
        /// Last update timestamp.
        updated_at -> Timestamptz,
    }
}
