use thiserror::Error;

#[derive(Error, Debug)]
pub enum AppError {
    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Refresh-token exchange failed; carries the upstream error body.
    #[error("Auth error: {0}")]
    Auth(String),

    #[error("Configuration error: {0}")]
    Config(String),

    /// No account is configured (or every account is disabled/invalid).
    #[error("No accounts configured. Run `gemini-bridge login` to add a Google account.")]
    NoAccounts,

    /// Non-retryable upstream response (4xx other than 429).
    #[error("Upstream error {status}: {body}")]
    UpstreamClient { status: u16, body: String },

    /// Every candidate endpoint failed with a retryable error.
    #[error("Upstream unavailable: {0}")]
    UpstreamRetryable(String),

    #[error("Parse error: {0}")]
    Parse(String),
}

pub type AppResult<T> = Result<T, AppError>;

impl AppError {
    /// True when a response status should be hopped to the next upstream
    /// endpoint instead of being surfaced immediately.
    pub fn retryable_status(status: u16) -> bool {
        status == 429 || status >= 500
    }
}
