use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// One stored Google account. `email` is the unique key within the store.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AccountRecord {
    pub email: String,
    /// Opaque refresh credential. Either a bare refresh token or the
    /// composite `refreshToken|projectId|managedProjectId` form; parse it
    /// with [`RefreshCredential::parse`] instead of splitting ad hoc.
    #[serde(rename = "refreshToken")]
    pub refresh_token: String,
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// Set when the account is known broken (e.g. revoked refresh token).
    #[serde(default, alias = "isInvalid")]
    pub invalid: bool,
    #[serde(default, rename = "projectId", skip_serializing_if = "Option::is_none")]
    pub project_id: Option<String>,
    #[serde(default, rename = "addedAt", skip_serializing_if = "Option::is_none")]
    pub added_at: Option<i64>,
    #[serde(default, rename = "updatedAt", skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<i64>,
    /// Per-model rate-limit bookkeeping. Shape is owned by whoever writes it;
    /// we only have to round-trip it without choking.
    #[serde(default, rename = "rateLimits", skip_serializing_if = "HashMap::is_empty")]
    pub rate_limits: HashMap<String, Value>,
}

fn default_true() -> bool {
    true
}

impl AccountRecord {
    pub fn new(email: String, refresh_token: String) -> Self {
        let now = chrono::Utc::now().timestamp();
        Self {
            email,
            refresh_token,
            enabled: true,
            invalid: false,
            project_id: None,
            added_at: Some(now),
            updated_at: Some(now),
            rate_limits: HashMap::new(),
        }
    }

    pub fn selectable(&self) -> bool {
        self.enabled && !self.invalid
    }
}

/// On-disk account file: `{ "accounts": [...], "settings": {...} }`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AccountStore {
    #[serde(default)]
    pub accounts: Vec<AccountRecord>,
    #[serde(default)]
    pub settings: HashMap<String, Value>,
}

/// Parsed form of the composite refresh credential
/// `refreshToken|projectId|managedProjectId`. Everything after the token is
/// optional; empty segments count as absent.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RefreshCredential {
    pub refresh_token: String,
    pub project_id: Option<String>,
    pub managed_project_id: Option<String>,
}

impl RefreshCredential {
    pub fn parse(raw: &str) -> Self {
        let mut parts = raw.splitn(3, '|');
        let refresh_token = parts.next().unwrap_or_default().to_string();
        let project_id = parts
            .next()
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_string);
        let managed_project_id = parts
            .next()
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_string);
        Self {
            refresh_token,
            project_id,
            managed_project_id,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_bare_refresh_token() {
        let cred = RefreshCredential::parse("1//0abc");
        assert_eq!(cred.refresh_token, "1//0abc");
        assert_eq!(cred.project_id, None);
        assert_eq!(cred.managed_project_id, None);
    }

    #[test]
    fn parses_composite_credential() {
        let cred = RefreshCredential::parse("1//0abc|my-project|managed-42");
        assert_eq!(cred.refresh_token, "1//0abc");
        assert_eq!(cred.project_id.as_deref(), Some("my-project"));
        assert_eq!(cred.managed_project_id.as_deref(), Some("managed-42"));
    }

    #[test]
    fn empty_segments_are_absent() {
        let cred = RefreshCredential::parse("1//0abc||managed-42");
        assert_eq!(cred.project_id, None);
        assert_eq!(cred.managed_project_id.as_deref(), Some("managed-42"));
    }

    #[test]
    fn account_defaults_tolerate_sparse_json() {
        let acc: AccountRecord =
            serde_json::from_str(r#"{"email":"a@b.c","refreshToken":"tok"}"#).unwrap();
        assert!(acc.enabled);
        assert!(!acc.invalid);
        assert!(acc.selectable());
    }

    #[test]
    fn is_invalid_alias_is_accepted() {
        let acc: AccountRecord =
            serde_json::from_str(r#"{"email":"a@b.c","refreshToken":"tok","isInvalid":true}"#)
                .unwrap();
        assert!(acc.invalid);
        assert!(!acc.selectable());
    }

    #[test]
    fn unknown_rate_limit_shape_round_trips() {
        let raw = r#"{"email":"a@b.c","refreshToken":"tok",
            "rateLimits":{"gemini-3-flash":{"until":12345,"weird":[1,2]}}}"#;
        let acc: AccountRecord = serde_json::from_str(raw).unwrap();
        assert!(acc.rate_limits.contains_key("gemini-3-flash"));
    }
}
