// Google OAuth: refresh-grant exchange plus the interactive login flow
// helpers (authorization URL with PKCE, code exchange, userinfo).

use base64::Engine as _;
use serde::Deserialize;
use sha2::{Digest, Sha256};

use crate::error::{AppError, AppResult};
use crate::models::TokenResponse;

const CLIENT_ID: &str =
    "1071006060591-tmhssin2h21lcre235vtolojh4g403ep.apps.googleusercontent.com";
const CLIENT_SECRET: &str = "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";
const TOKEN_URL: &str = "https://oauth2.googleapis.com/token";
const USERINFO_URL: &str = "https://www.googleapis.com/oauth2/v2/userinfo";
const AUTH_URL: &str = "https://accounts.google.com/o/oauth2/v2/auth";

#[derive(Debug, Deserialize)]
pub struct UserInfo {
    pub email: String,
    #[serde(default)]
    pub name: Option<String>,
}

/// PKCE verifier/challenge pair for one login attempt.
pub struct PkcePair {
    pub verifier: String,
    pub challenge: String,
}

impl PkcePair {
    pub fn generate() -> Self {
        // 64 bytes of uuid-sourced entropy, URL-safe encoded.
        let mut seed = Vec::with_capacity(64);
        for _ in 0..4 {
            seed.extend_from_slice(uuid::Uuid::new_v4().as_bytes());
        }
        let verifier = base64::engine::general_purpose::URL_SAFE_NO_PAD.encode(&seed);
        let digest = Sha256::digest(verifier.as_bytes());
        let challenge = base64::engine::general_purpose::URL_SAFE_NO_PAD.encode(digest);
        Self {
            verifier,
            challenge,
        }
    }
}

/// Builds the browser authorization URL for the login flow.
pub fn get_auth_url(redirect_uri: &str, pkce: &PkcePair) -> String {
    let scopes = [
        "https://www.googleapis.com/auth/cloud-platform",
        "https://www.googleapis.com/auth/userinfo.email",
        "https://www.googleapis.com/auth/userinfo.profile",
    ]
    .join(" ");

    let params = [
        ("client_id", CLIENT_ID),
        ("redirect_uri", redirect_uri),
        ("response_type", "code"),
        ("scope", &scopes),
        ("access_type", "offline"),
        ("prompt", "consent"),
        ("code_challenge", &pkce.challenge),
        ("code_challenge_method", "S256"),
    ];

    // AUTH_URL is a constant; parse cannot fail on it.
    let url = url::Url::parse_with_params(AUTH_URL, &params).expect("invalid auth url");
    url.to_string()
}

/// Exchanges an authorization code for tokens.
pub async fn exchange_code(
    client: &reqwest::Client,
    code: &str,
    redirect_uri: &str,
    verifier: &str,
) -> AppResult<TokenResponse> {
    let params = [
        ("client_id", CLIENT_ID),
        ("client_secret", CLIENT_SECRET),
        ("code", code),
        ("redirect_uri", redirect_uri),
        ("grant_type", "authorization_code"),
        ("code_verifier", verifier),
    ];

    let response = client.post(TOKEN_URL).form(&params).send().await?;
    if response.status().is_success() {
        Ok(response.json::<TokenResponse>().await?)
    } else {
        let body = response.text().await.unwrap_or_default();
        Err(AppError::Auth(format!("code exchange failed: {}", body)))
    }
}

/// Exchanges a refresh token for a fresh access token. This is the only
/// place refresh tokens go over the wire.
pub async fn refresh_access_token(
    client: &reqwest::Client,
    refresh_token: &str,
) -> AppResult<TokenResponse> {
    let params = [
        ("client_id", CLIENT_ID),
        ("client_secret", CLIENT_SECRET),
        ("refresh_token", refresh_token),
        ("grant_type", "refresh_token"),
    ];

    let response = client.post(TOKEN_URL).form(&params).send().await?;
    if response.status().is_success() {
        let token = response.json::<TokenResponse>().await?;
        tracing::debug!("token refresh ok, expires_in={}s", token.expires_in);
        Ok(token)
    } else {
        let body = response.text().await.unwrap_or_default();
        Err(AppError::Auth(body))
    }
}

pub async fn get_user_info(
    client: &reqwest::Client,
    access_token: &str,
) -> AppResult<UserInfo> {
    let response = client
        .get(USERINFO_URL)
        .bearer_auth(access_token)
        .send()
        .await?;
    if response.status().is_success() {
        Ok(response.json::<UserInfo>().await?)
    } else {
        let body = response.text().await.unwrap_or_default();
        Err(AppError::Auth(format!("userinfo failed: {}", body)))
    }
}
