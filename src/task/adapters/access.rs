//! Static authorization backends.

use crate::task::{
    domain::UserId,
    ports::{AccessControl, AccessError, Action, Resource},
};
use async_trait::async_trait;
use std::collections::HashSet;

/// Grants every request.
#[derive(Debug, Clone, Copy, Default)]
pub struct AllowAll;

#[async_trait]
impl AccessControl for AllowAll {
    async fn authorize(
        &self,
        _user: UserId,
        _action: Action,
        _resource: Resource,
    ) -> Result<(), AccessError> {
        Ok(())
    }
}

/// Denies listed users every mutation and grants everyone else.
#[derive(Debug, Clone, Default)]
pub struct DenyList {
    denied: HashSet<UserId>,
}

impl DenyList {
    /// Creates a deny list.
    #[must_use]
    pub fn new(denied: impl IntoIterator<Item = UserId>) -> Self {
        Self {
            denied: denied.into_iter().collect(),
        }
    }
}

#[async_trait]
impl AccessControl for DenyList {
    async fn authorize(
        &self,
        user: UserId,
        action: Action,
        resource: Resource,
    ) -> Result<(), AccessError> {
        if self.denied.contains(&user) {
            return Err(AccessError::Denied {
                user,
                action,
                resource,
            });
        }
        Ok(())
    }
}
