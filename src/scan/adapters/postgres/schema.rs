//! Diesel schema for policy persistence.

diesel::table! {
    /// Compliance policies.
    policies (id) {
        /// Policy identifier.
        #[max_length = 128]
        id -> Varchar,
        /// Policy group.
        #[max_length = 128]
        group_id -> Varchar,
        /// Display name.
        #[max_length = 255]
        name -> Varchar,
    }
}

diesel::table! {
    /// Policies bound to templates and environments.
    policy_bindings (policy_id, target_kind, target_id) {
        /// Bound policy.
        #[max_length = 128]
        policy_id -> Varchar,
        /// `template` or `environment`.
        #[max_length = 16]
        target_kind -> Varchar,
        /// Template or environment identifier.
        target_id -> Uuid,
    }
}

diesel::table! {
    /// Policies suppressed for templates and environments.
    policy_suppressions (policy_id, target_kind, target_id) {
        /// Suppressed policy.
        #[max_length = 128]
        policy_id -> Varchar,
        /// `template` or `environment`.
        #[max_length = 16]
        target_kind -> Varchar,
        /// Template or environment identifier.
        target_id -> Uuid,
        /// Operator note.
        reason -> Text,
    }
}

diesel::table! {
    /// Per-task policy verdicts.
    policy_results (id) {
        /// Row identifier.
        id -> Uuid,
        /// Scan task.
        task_id -> Uuid,
        /// Evaluated policy.
        #[max_length = 128]
        policy_id -> Varchar,
        /// Group of the evaluated policy.
        #[max_length = 128]
        policy_group_id -> Varchar,
        /// Verdict tag.
        #[max_length = 16]
        status -> Varchar,
        /// Violation detail.
        violation -> Nullable<Jsonb>,
        /// Last change.
        updated_at -> Timestamptz,
    }
}

diesel::joinable!(policy_bindings -> policies (policy_id));
diesel::allow_tables_to_appear_in_same_query!(policies, policy_bindings, policy_suppressions);
