//! Core runtime configuration.
//!
//! Configuration is resolved once at process startup and passed into the reconciler. Binaries
//! read environment variables and hand the raw values to [`CoreConfig::from_env_values`]; nothing
//! in this crate reads the environment while handling requests.

use crate::error::{NotifyError, NotifyResult};
use crate::notification::Department;
use crate::store::Query;

/// Which notifications a view shows and how it alerts.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CoreConfig {
    scope: Option<String>,
    alerts_enabled: bool,
}

impl CoreConfig {
    /// Create a new `CoreConfig`. `scope: None` is the super-admin view over every department.
    pub fn new(scope: Option<String>, alerts_enabled: bool) -> NotifyResult<Self> {
        if let Some(tag) = &scope {
            validate_scope_tag(tag)?;
        }
        Ok(Self {
            scope,
            alerts_enabled,
        })
    }

    /// Builds a config from raw `CLINIC_SCOPE` / `CLINIC_ALERTS` values.
    ///
    /// The scope may be a department name, a department tag, any other safe tag, or `all` / empty
    /// for the super-admin view. Alerts default to on.
    pub fn from_env_values(scope: Option<String>, alerts: Option<String>) -> NotifyResult<Self> {
        let scope = match scope.as_deref().map(str::trim) {
            None | Some("") => None,
            Some(s) if s.eq_ignore_ascii_case("all") => None,
            Some(s) => match Department::parse(s) {
                Some(department) => Some(department.scope_tag().to_owned()),
                None => Some(s.to_owned()),
            },
        };

        let alerts_enabled = match alerts.as_deref().map(str::trim) {
            None | Some("") => true,
            Some(v) => parse_flag(v).ok_or_else(|| {
                NotifyError::InvalidInput(format!("CLINIC_ALERTS must be a boolean, got {:?}", v))
            })?,
        };

        Self::new(scope, alerts_enabled)
    }

    pub fn scope(&self) -> Option<&str> {
        self.scope.as_deref()
    }

    pub fn alerts_enabled(&self) -> bool {
        self.alerts_enabled
    }

    /// The live query for this view. The super-admin variant asks the store for newest-first
    /// ordering; department views rely on local sorting.
    pub fn query(&self) -> Query {
        match &self.scope {
            Some(tag) => Query::scoped(tag.clone()),
            None => Query::all(),
        }
    }
}

/// Validates that a scope tag is a short, plain identifier.
///
/// # Errors
///
/// Returns [`NotifyError::InvalidInput`] if the tag is empty, longer than 64 characters, or
/// contains anything other than ASCII alphanumerics, `-` and `_`.
pub fn validate_scope_tag(tag: &str) -> NotifyResult<()> {
    const MAX_SCOPE_LEN: usize = 64;

    if tag.trim().is_empty() {
        return Err(NotifyError::InvalidInput("scope cannot be empty".into()));
    }

    if tag.len() > MAX_SCOPE_LEN {
        return Err(NotifyError::InvalidInput(format!(
            "scope exceeds maximum length of {} characters",
            MAX_SCOPE_LEN
        )));
    }

    let ok = tag
        .bytes()
        .all(|b| matches!(b, b'0'..=b'9' | b'a'..=b'z' | b'A'..=b'Z' | b'-' | b'_'));
    if !ok {
        return Err(NotifyError::InvalidInput(
            "scope contains invalid characters (only alphanumeric, '-', '_' allowed)".into(),
        ));
    }

    Ok(())
}

fn parse_flag(value: &str) -> Option<bool> {
    match value.to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}
