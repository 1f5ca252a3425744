// Quota and model-catalog views over the `fetchAvailableModels` response,
// plus the `loadCodeAssist` project-id probe used at login time.

use serde::Deserialize;
use serde_json::Value;

use crate::error::{AppError, AppResult};

const CLOUD_CODE_BASE_URL: &str = "https://cloudcode-pa.googleapis.com";

#[derive(Debug, Clone)]
pub struct ModelQuota {
    pub model: String,
    pub remaining_fraction: Option<f64>,
    pub reset_time: Option<String>,
}

/// Extracts the model ids from a `fetchAvailableModels` response. The
/// endpoint has answered with both a map keyed by model id and a list of
/// `{name: ...}` objects; both shapes are accepted.
pub fn parse_model_ids(response: &Value) -> Vec<String> {
    let mut ids: Vec<String> = match response.get("models") {
        Some(Value::Object(map)) => map.keys().cloned().collect(),
        Some(Value::Array(items)) => items
            .iter()
            .filter_map(|m| {
                m.get("name")
                    .or_else(|| m.get("model"))
                    .and_then(|v| v.as_str())
                    .map(|s| s.rsplit('/').next().unwrap_or(s).to_string())
            })
            .collect(),
        _ => Vec::new(),
    };
    ids.sort();
    ids.dedup();
    ids
}

/// Per-model quota summary from the same response.
pub fn parse_quota(response: &Value) -> Vec<ModelQuota> {
    let mut out = Vec::new();
    if let Some(Value::Object(map)) = response.get("models") {
        for (model, info) in map {
            let quota_info = info.get("quotaInfo");
            out.push(ModelQuota {
                model: model.clone(),
                remaining_fraction: quota_info
                    .and_then(|q| q.get("remainingFraction"))
                    .and_then(|v| v.as_f64()),
                reset_time: quota_info
                    .and_then(|q| q.get("resetTime"))
                    .and_then(|v| v.as_str())
                    .map(str::to_string),
            });
        }
    }
    out.sort_by(|a, b| a.model.cmp(&b.model));
    out
}

#[derive(Debug, Deserialize)]
struct LoadProjectResponse {
    #[serde(rename = "cloudaicompanionProject")]
    project_id: Option<String>,
}

/// Asks `loadCodeAssist` which project the account is attached to. Used once
/// at login to stamp the account record; absence is not an error.
pub async fn fetch_project_id(
    client: &reqwest::Client,
    access_token: &str,
) -> AppResult<Option<String>> {
    let body = serde_json::json!({"metadata": {"ideType": "ANTIGRAVITY"}});
    let response = client
        .post(format!("{}/v1internal:loadCodeAssist", CLOUD_CODE_BASE_URL))
        .bearer_auth(access_token)
        .json(&body)
        .send()
        .await?;

    if !response.status().is_success() {
        let status = response.status().as_u16();
        let body = response.text().await.unwrap_or_default();
        return Err(AppError::UpstreamClient { status, body });
    }
    let parsed: LoadProjectResponse = response.json().await?;
    Ok(parsed.project_id)
}
