//! Runtime settings from the environment.

use crate::store::{DEFAULT_PAGE_LIMIT, MAX_PAGE_LIMIT};
use std::env;

pub const DEFAULT_BODY_LIMIT: usize = 1024 * 1024;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Settings {
    pub database_url: Option<String>,
    /// Directory holding models.json and resources.json.
    pub config_path: Option<String>,
    /// Prefix the API is served under, e.g. "/api/v1". Empty for the root.
    pub mount_path: String,
    /// Scheme of absolute links.
    pub scheme: String,
    pub body_limit: usize,
    pub db_schema: String,
    pub page_limit: u32,
}

impl Default for Settings {
    fn default() -> Self {
        Settings {
            database_url: None,
            config_path: None,
            mount_path: String::new(),
            scheme: "http".into(),
            body_limit: DEFAULT_BODY_LIMIT,
            db_schema: "public".into(),
            page_limit: DEFAULT_PAGE_LIMIT,
        }
    }
}

impl Settings {
    /// Read `DATABASE_URL` and the `NESTED_*` variables. Unset or unparsable values keep their defaults.
    pub fn from_env() -> Self {
        let defaults = Settings::default();
        let var = |name: &str| env::var(name).ok().filter(|v| !v.trim().is_empty());
        Settings {
            database_url: var("DATABASE_URL"),
            config_path: var("NESTED_CONFIG_PATH"),
            mount_path: var("NESTED_MOUNT_PATH")
                .map(|m| normalize_mount(&m))
                .unwrap_or(defaults.mount_path),
            scheme: var("NESTED_SCHEME").unwrap_or(defaults.scheme),
            body_limit: var("NESTED_BODY_LIMIT")
                .and_then(|v| v.parse().ok())
                .unwrap_or(defaults.body_limit),
            db_schema: var("NESTED_DB_SCHEMA").unwrap_or(defaults.db_schema),
            page_limit: var("NESTED_PAGE_LIMIT")
                .and_then(|v| v.parse::<u32>().ok())
                .map(|n| n.clamp(1, MAX_PAGE_LIMIT))
                .unwrap_or(defaults.page_limit),
        }
    }

    pub fn with_mount_path(mut self, mount: &str) -> Self {
        self.mount_path = normalize_mount(mount);
        self
    }
}

/// "api/v1/" -> "/api/v1"; "/" -> "".
pub fn normalize_mount(mount: &str) -> String {
    let trimmed = mount.trim().trim_matches('/');
    if trimmed.is_empty() {
        String::new()
    } else {
        format!("/{}", trimmed)
    }
}
