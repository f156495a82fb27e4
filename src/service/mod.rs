//! Request-time services: scoping, permission cascade, link generation, serialization.

pub mod dispatch;
pub mod permission;
pub mod scope;
pub mod serializer;
pub mod urls;
pub mod validation;

pub use dispatch::{DispatchRequest, Dispatcher, Outcome};
pub use permission::{Access, Decision, Permission, PolicyRegistry};
pub use scope::scope;
pub use serializer::Serializer;
pub use urls::{path_of, LinkTarget, UrlGenerator};
pub use validation::{validate_fields, ValidationRule, WriteMode};

use crate::extractors::AuthContext;
use crate::routing::PathVars;

/// What the pipeline knows about the request being served.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RequestContext {
    /// Name of the resource the request addresses.
    pub route: String,
    pub auth: AuthContext,
    pub path_vars: PathVars,
    /// `Host` header; links are absolute when present.
    pub host: Option<String>,
    /// Requested `format` query parameter.
    pub format: Option<String>,
}

impl RequestContext {
    pub fn new(route: impl Into<String>, path_vars: PathVars, auth: AuthContext) -> Self {
        RequestContext {
            route: route.into(),
            auth,
            path_vars,
            host: None,
            format: None,
        }
    }

    pub fn with_host(mut self, host: impl Into<String>) -> Self {
        self.host = Some(host.into());
        self
    }

    pub fn with_format(mut self, format: impl Into<String>) -> Self {
        self.format = Some(format.into());
        self
    }
}
