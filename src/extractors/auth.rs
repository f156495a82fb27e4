//! Caller identity from request headers (`X-User-Id`, `X-Session-Id`).
//! Carried unchanged into the ancestor checks of the permission cascade.

use async_trait::async_trait;
use axum::{extract::FromRequestParts, http::request::Parts};

pub const USER_ID_HEADER: &str = "X-User-Id";
pub const SESSION_ID_HEADER: &str = "X-Session-Id";

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct AuthContext {
    pub user_id: Option<String>,
    pub session_id: Option<String>,
}

impl AuthContext {
    pub fn anonymous() -> Self {
        Self::default()
    }

    pub fn user(user_id: impl Into<String>) -> Self {
        AuthContext {
            user_id: Some(user_id.into()),
            session_id: None,
        }
    }

    pub fn is_authenticated(&self) -> bool {
        self.user_id.is_some()
    }
}

fn header(parts: &Parts, name: &str) -> Option<String> {
    parts
        .headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
}

#[async_trait]
impl<S> FromRequestParts<S> for AuthContext
where
    S: Send + Sync,
{
    type Rejection = std::convert::Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        Ok(AuthContext {
            user_id: header(parts, USER_ID_HEADER),
            session_id: header(parts, SESSION_ID_HEADER),
        })
    }
}
