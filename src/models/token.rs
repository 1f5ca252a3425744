use serde::{Deserialize, Serialize};

/// Google token endpoint response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TokenResponse {
    pub access_token: String,
    pub expires_in: i64,
    #[serde(default)]
    pub token_type: String,
    #[serde(default)]
    pub refresh_token: Option<String>,
}

/// Process-local cached access token, keyed by account email. Never persisted.
#[derive(Debug, Clone)]
pub struct CachedToken {
    pub access_token: String,
    /// Absolute unix timestamp; the entry is usable iff `now < expires_at`.
    pub expires_at: i64,
}

impl CachedToken {
    pub fn is_valid(&self, now: i64) -> bool {
        now < self.expires_at
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn token_is_valid_strictly_before_expiry() {
        let t = CachedToken {
            access_token: "ya29.x".into(),
            expires_at: 100,
        };
        assert!(t.is_valid(99));
        assert!(!t.is_valid(100));
        assert!(!t.is_valid(101));
    }
}
