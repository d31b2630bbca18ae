//! Authorization policies for datasets and endpoints.

use std::collections::BTreeSet;
use std::sync::Arc;

pub trait AuthPolicy: Send + Sync {
    fn is_allowed(&self, user: Option<&str>) -> bool;
}

pub struct AllowAll;

impl AuthPolicy for AllowAll {
    fn is_allowed(&self, _user: Option<&str>) -> bool {
        true
    }
}

pub struct DenyAll;

impl AuthPolicy for DenyAll {
    fn is_allowed(&self, _user: Option<&str>) -> bool {
        false
    }
}

/// Named users only. `*` admits any authenticated user.
pub struct AllowedUsers {
    users: BTreeSet<String>,
}

impl AllowedUsers {
    pub fn new<I, S>(users: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self { users: users.into_iter().map(Into::into).collect() }
    }
}

impl AuthPolicy for AllowedUsers {
    fn is_allowed(&self, user: Option<&str>) -> bool {
        match user {
            Some(user) => self.users.contains("*") || self.users.contains(user),
            None => false,
        }
    }
}

pub fn allow_all() -> Arc<dyn AuthPolicy> {
    Arc::new(AllowAll)
}
