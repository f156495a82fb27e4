//! Permission policies and the decision contract of the ancestor cascade.

use crate::error::{AppError, ConfigError};
use crate::resource::Action;
use crate::service::RequestContext;
use crate::store::Record;
use axum::http::StatusCode;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

/// Outcome of a single policy check.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Access {
    Granted,
    Denied,
    /// Denied because the caller is anonymous.
    Unauthenticated,
}

impl Access {
    pub fn into_result(self) -> Result<(), AppError> {
        match self {
            Access::Granted => Ok(()),
            Access::Denied => Err(AppError::PermissionDenied),
            Access::Unauthenticated => Err(AppError::NotAuthenticated),
        }
    }
}

/// A resource's own access policy. Both checks grant by default.
pub trait Permission: Send + Sync + fmt::Debug {
    fn has_permission(&self, _ctx: &RequestContext, _action: Action) -> Access {
        Access::Granted
    }

    fn has_object_permission(&self, _ctx: &RequestContext, _action: Action, _record: &Record) -> Access {
        Access::Granted
    }
}

#[derive(Clone, Copy, Debug, Default)]
pub struct AllowAny;

impl Permission for AllowAny {}

#[derive(Clone, Copy, Debug, Default)]
pub struct DenyAll;

impl Permission for DenyAll {
    fn has_permission(&self, _ctx: &RequestContext, _action: Action) -> Access {
        Access::Denied
    }
}

#[derive(Clone, Copy, Debug, Default)]
pub struct IsAuthenticated;

impl Permission for IsAuthenticated {
    fn has_permission(&self, ctx: &RequestContext, _action: Action) -> Access {
        if ctx.auth.is_authenticated() {
            Access::Granted
        } else {
            Access::Unauthenticated
        }
    }
}

/// Safe actions only (list, retrieve, head).
#[derive(Clone, Copy, Debug, Default)]
pub struct ReadOnly;

impl Permission for ReadOnly {
    fn has_permission(&self, _ctx: &RequestContext, action: Action) -> Access {
        if action.is_safe() {
            Access::Granted
        } else {
            Access::Denied
        }
    }
}

/// What the check of a parent's detail view means for the child request.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Decision {
    Allow,
    NotFound,
    Forbidden,
    Unauthenticated,
}

impl Decision {
    /// `None` means there was no parent to check.
    pub fn from_status(status: Option<StatusCode>) -> Result<Self, ConfigError> {
        match status {
            None | Some(StatusCode::OK) => Ok(Decision::Allow),
            Some(StatusCode::NOT_FOUND) => Ok(Decision::NotFound),
            Some(StatusCode::FORBIDDEN) => Ok(Decision::Forbidden),
            Some(StatusCode::UNAUTHORIZED) => Ok(Decision::Unauthenticated),
            Some(other) => Err(ConfigError::UnhandledStatus(other.as_u16())),
        }
    }

    pub fn into_result(self, parent: &str) -> Result<(), AppError> {
        match self {
            Decision::Allow => Ok(()),
            Decision::NotFound => Err(AppError::NotFound(format!("{} not found", parent))),
            Decision::Forbidden => Err(AppError::PermissionDenied),
            Decision::Unauthenticated => Err(AppError::NotAuthenticated),
        }
    }
}

/// Named policies for declarations loaded from JSON.
#[derive(Clone, Debug)]
pub struct PolicyRegistry {
    policies: HashMap<String, Arc<dyn Permission>>,
}

impl Default for PolicyRegistry {
    fn default() -> Self {
        let mut registry = PolicyRegistry {
            policies: HashMap::new(),
        };
        registry.register("allow_any", Arc::new(AllowAny));
        registry.register("deny_all", Arc::new(DenyAll));
        registry.register("is_authenticated", Arc::new(IsAuthenticated));
        registry.register("read_only", Arc::new(ReadOnly));
        registry
    }
}

impl PolicyRegistry {
    pub fn register(&mut self, name: impl Into<String>, policy: Arc<dyn Permission>) {
        self.policies.insert(name.into(), policy);
    }

    pub fn get(&self, name: &str) -> Result<Arc<dyn Permission>, ConfigError> {
        self.policies
            .get(name)
            .cloned()
            .ok_or_else(|| ConfigError::UnknownPermission(name.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::extractors::AuthContext;
    use crate::routing::PathVars;

    fn ctx(auth: AuthContext) -> RequestContext {
        RequestContext::new("developer", PathVars::new(), auth)
    }

    #[test]
    fn statuses_map_to_decisions() {
        assert_eq!(Decision::from_status(None), Ok(Decision::Allow));
        assert_eq!(Decision::from_status(Some(StatusCode::OK)), Ok(Decision::Allow));
        assert_eq!(Decision::from_status(Some(StatusCode::NOT_FOUND)), Ok(Decision::NotFound));
        assert_eq!(Decision::from_status(Some(StatusCode::FORBIDDEN)), Ok(Decision::Forbidden));
        assert_eq!(
            Decision::from_status(Some(StatusCode::UNAUTHORIZED)),
            Ok(Decision::Unauthenticated)
        );
        assert_eq!(
            Decision::from_status(Some(StatusCode::IM_A_TEAPOT)),
            Err(ConfigError::UnhandledStatus(418))
        );
    }

    #[test]
    fn built_in_policies() {
        let anon = ctx(AuthContext::anonymous());
        let user = ctx(AuthContext::user("1"));
        assert_eq!(IsAuthenticated.has_permission(&anon, Action::List), Access::Unauthenticated);
        assert_eq!(IsAuthenticated.has_permission(&user, Action::List), Access::Granted);
        assert_eq!(ReadOnly.has_permission(&anon, Action::Head), Access::Granted);
        assert_eq!(ReadOnly.has_permission(&anon, Action::Destroy), Access::Denied);
        assert_eq!(DenyAll.has_permission(&user, Action::Retrieve), Access::Denied);
        assert!(matches!(Access::Unauthenticated.into_result(), Err(AppError::NotAuthenticated)));
    }

    #[test]
    fn registry_resolves_names() {
        let registry = PolicyRegistry::default();
        assert!(registry.get("read_only").is_ok());
        assert_eq!(
            registry.get("owner_only").unwrap_err(),
            ConfigError::UnknownPermission("owner_only".into())
        );
    }
}
