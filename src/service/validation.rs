//! Per-field write rules checked before create and update.

use crate::error::AppError;
use crate::store::{value_eq, Fields};
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct ValidationRule {
    #[serde(default)]
    pub required: Option<bool>,
    /// "email" or "uuid".
    #[serde(default)]
    pub format: Option<String>,
    #[serde(default)]
    pub max_length: Option<u32>,
    #[serde(default)]
    pub min_length: Option<u32>,
    #[serde(default)]
    pub pattern: Option<String>,
    #[serde(default)]
    pub allowed: Option<Vec<Value>>,
    #[serde(default)]
    pub minimum: Option<f64>,
    #[serde(default)]
    pub maximum: Option<f64>,
}

impl ValidationRule {
    pub fn required() -> Self {
        ValidationRule {
            required: Some(true),
            ..Default::default()
        }
    }
}

/// Full writes (create, PUT) enforce `required`; partial writes (PATCH) check only what is sent.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum WriteMode {
    Full,
    Partial,
}

pub fn validate_fields(
    fields: &Fields,
    rules: &HashMap<String, ValidationRule>,
    mode: WriteMode,
) -> Result<(), AppError> {
    let mut names: Vec<&String> = rules.keys().collect();
    names.sort();
    for name in names {
        let rule = &rules[name];
        match fields.get(name.as_str()) {
            Some(v) if !v.is_null() => check_value(name, v, rule)?,
            _ if mode == WriteMode::Full && rule.required == Some(true) => {
                return Err(AppError::Validation(format!("{} is required", name)));
            }
            _ => {}
        }
    }
    Ok(())
}

fn check_value(name: &str, v: &Value, rule: &ValidationRule) -> Result<(), AppError> {
    if let Some(format) = &rule.format {
        check_format(name, v, format)?;
    }
    if let Some(s) = v.as_str() {
        let len = s.chars().count();
        if let Some(max) = rule.max_length {
            if len > max as usize {
                return Err(AppError::Validation(format!("{} must be at most {} characters", name, max)));
            }
        }
        if let Some(min) = rule.min_length {
            if len < min as usize {
                return Err(AppError::Validation(format!("{} must be at least {} characters", name, min)));
            }
        }
        if let Some(pattern) = &rule.pattern {
            let re = Regex::new(pattern).map_err(|_| AppError::Validation(format!("invalid pattern for {}", name)))?;
            if !re.is_match(s) {
                return Err(AppError::Validation(format!("{} does not match required pattern", name)));
            }
        }
    }
    if let Some(allowed) = &rule.allowed {
        if !allowed.iter().any(|a| value_eq(v, a)) {
            return Err(AppError::Validation(format!(
                "{} must be one of: {:?}",
                name,
                allowed.iter().take(5).collect::<Vec<_>>()
            )));
        }
    }
    if let Some(n) = v.as_f64() {
        if let Some(min) = rule.minimum.filter(|min| n < *min) {
            return Err(AppError::Validation(format!("{} must be at least {}", name, min)));
        }
        if let Some(max) = rule.maximum.filter(|max| n > *max) {
            return Err(AppError::Validation(format!("{} must be at most {}", name, max)));
        }
    }
    Ok(())
}

fn check_format(name: &str, v: &Value, format: &str) -> Result<(), AppError> {
    let Some(s) = v.as_str() else { return Ok(()) };
    let valid = match format.to_lowercase().as_str() {
        "email" => s.len() >= 3 && s.contains('@'),
        "uuid" => uuid::Uuid::parse_str(s).is_ok(),
        _ => true,
    };
    if valid {
        Ok(())
    } else {
        Err(AppError::Validation(format!("{} must be a valid {}", name, format)))
    }
}
