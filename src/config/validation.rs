//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Validate value ranges (capacities > 0, sweep interval > 0)
//! - Flag questionable-but-legal settings as warnings
//!
//! # Design Decisions
//! - Returns all validation issues, not just first
//! - Validation is pure function: ClientConfig → issues
//! - Runs before config is accepted by the factory

use std::fmt;

use crate::config::schema::ClientConfig;

/// How serious a validation issue is.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    /// Logged, construction proceeds.
    Warning,
    /// Construction is refused.
    Error,
}

/// A single validation issue.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationError {
    pub field: &'static str,
    pub message: String,
    pub severity: Severity,
}

impl ValidationError {
    fn error(field: &'static str, message: impl Into<String>) -> Self {
        Self {
            field,
            message: message.into(),
            severity: Severity::Error,
        }
    }

    fn warning(field: &'static str, message: impl Into<String>) -> Self {
        Self {
            field,
            message: message.into(),
            severity: Severity::Warning,
        }
    }

    pub fn is_fatal(&self) -> bool {
        self.severity == Severity::Error
    }
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

impl std::error::Error for ValidationError {}

/// Validate a configuration.
///
/// Returns `Ok(warnings)` when nothing is fatal, otherwise `Err` with every
/// issue found (warnings included).
pub fn validate_config(config: &ClientConfig) -> Result<Vec<ValidationError>, Vec<ValidationError>> {
    let mut issues = Vec::new();
    let pool = &config.pool;
    let trust = &config.trust;

    if pool.max_total == 0 {
        issues.push(ValidationError::error("pool.max_total", "must be greater than 0"));
    }
    if pool.max_per_route == 0 {
        issues.push(ValidationError::error("pool.max_per_route", "must be greater than 0"));
    }
    if pool.max_per_route > pool.max_total {
        issues.push(ValidationError::warning(
            "pool.max_per_route",
            format!(
                "{} exceeds pool.max_total {}; the total limit wins",
                pool.max_per_route, pool.max_total
            ),
        ));
    }
    if pool.sweep_interval_ms == 0 {
        issues.push(ValidationError::error("pool.sweep_interval_ms", "must be greater than 0"));
    }
    if pool.request_timeout_ms == 0 {
        issues.push(ValidationError::warning(
            "pool.request_timeout_ms",
            "0 fails every request that has to wait for a connection",
        ));
    }
    if pool.name.trim().is_empty() {
        issues.push(ValidationError::error("pool.name", "must not be empty"));
    }
    if pool.secure_name.trim().is_empty() {
        issues.push(ValidationError::error("pool.secure_name", "must not be empty"));
    }

    if matches!(&trust.trust_store_path, Some(p) if p.as_os_str().is_empty()) {
        issues.push(ValidationError::error("trust.trust_store_path", "must not be empty"));
    }
    if matches!(&trust.client_key_store_path, Some(p) if p.as_os_str().is_empty()) {
        issues.push(ValidationError::error("trust.client_key_store_path", "must not be empty"));
    }
    if trust.client_key_store_password.is_some() && trust.client_key_store_path.is_none() {
        issues.push(ValidationError::warning(
            "trust.client_key_store_password",
            "set without trust.client_key_store_path; ignored",
        ));
    }
    if trust.allowed_hostnames.iter().any(|h| h.trim().is_empty()) {
        issues.push(ValidationError::error(
            "trust.allowed_hostnames",
            "entries must not be empty",
        ));
    }

    if issues.iter().any(ValidationError::is_fatal) {
        Err(issues)
    } else {
        Ok(issues)
    }
}
