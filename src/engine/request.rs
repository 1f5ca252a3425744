// v1internal payload construction and the model thinking-capability
// classification shared with the transport decision.

use serde_json::{json, Map, Value};

use crate::models::{GenerationRequest, MessageContent};

/// Hard provider ceiling for generated tokens; caller requests are clamped.
pub const MAX_OUTPUT_TOKENS: u32 = 16384;
/// Thinking budget attached when extended reasoning is active.
const THINKING_BUDGET: u32 = 16000;
/// Project sent when neither the credential nor the account carries one.
const DEFAULT_PROJECT_ID: &str = "cloudcode-default-project";
const USER_AGENT: &str = "antigravity/1.11.9 windows/amd64";
const REQUEST_TYPE: &str = "agent";
const DEFAULT_IMAGE_MIME: &str = "image/png";

/// Baseline system instruction, always first; caller text is appended after
/// it, never instead of it.
const BASE_SYSTEM_INSTRUCTION: &str =
    "You are a helpful coding and general-purpose assistant. Answer directly and precisely.";

/// Single source of truth for "does this model emit thought parts": the name
/// mentions thinking, or the gemini major version is 3+. Used both for the
/// thinking generation config and for the streaming-transport decision.
pub fn is_thinking_model(model: &str) -> bool {
    let lower = model.to_ascii_lowercase();
    if lower.contains("thinking") {
        return true;
    }
    gemini_major_version(&lower).is_some_and(|v| v >= 3)
}

fn gemini_major_version(model: &str) -> Option<u32> {
    let rest = model.strip_prefix("gemini-")?;
    let digits: String = rest.chars().take_while(|c| c.is_ascii_digit()).collect();
    digits.parse().ok()
}

/// Maps the provider-agnostic request onto the project-enveloped v1internal
/// wire shape. Every payload carries a fresh request id.
pub fn build_payload(request: &GenerationRequest, project_id: Option<&str>) -> Value {
    let contents: Vec<Value> = request
        .messages
        .iter()
        .map(|m| {
            json!({
                "role": m.role.wire_label(),
                "parts": content_parts(&m.content),
            })
        })
        .collect();

    let mut system_parts = vec![json!({"text": BASE_SYSTEM_INSTRUCTION})];
    if let Some(system) = request.system.as_deref() {
        if !system.is_empty() {
            system_parts.push(json!({"text": system}));
        }
    }

    let mut generation_config = Map::new();
    if let Some(max_tokens) = request.max_tokens {
        generation_config.insert(
            "maxOutputTokens".into(),
            json!(max_tokens.min(MAX_OUTPUT_TOKENS)),
        );
    }
    if let Some(temperature) = request.temperature {
        generation_config.insert("temperature".into(), json!(temperature));
    }
    if let Some(top_p) = request.top_p {
        generation_config.insert("topP".into(), json!(top_p));
    }
    if let Some(top_k) = request.top_k {
        generation_config.insert("topK".into(), json!(top_k));
    }
    if request.thinking && is_thinking_model(&request.model) {
        generation_config.insert(
            "thinkingConfig".into(),
            json!({"includeThoughts": true, "thinkingBudget": THINKING_BUDGET}),
        );
    }

    json!({
        "project": project_id.unwrap_or(DEFAULT_PROJECT_ID),
        "requestId": uuid::Uuid::new_v4().to_string(),
        "request": {
            "contents": contents,
            "systemInstruction": {"parts": system_parts},
            "generationConfig": Value::Object(generation_config),
        },
        "model": request.model,
        "userAgent": USER_AGENT,
        "requestType": REQUEST_TYPE,
    })
}

/// Converts message content to provider parts. Plain text becomes one text
/// part; typed blocks map `text` and `image`, anything else is dropped.
fn content_parts(content: &MessageContent) -> Vec<Value> {
    match content {
        MessageContent::Text(text) => vec![json!({"text": text})],
        MessageContent::Parts(parts) => parts
            .iter()
            .filter_map(|part| match part.get("type").and_then(|t| t.as_str()) {
                Some("text") => part
                    .get("text")
                    .and_then(|t| t.as_str())
                    .map(|t| json!({"text": t})),
                Some("image") => {
                    let mime = part
                        .get("media_type")
                        .or_else(|| part.get("mimeType"))
                        .and_then(|m| m.as_str())
                        .unwrap_or(DEFAULT_IMAGE_MIME);
                    part.get("data").and_then(|d| d.as_str()).map(|data| {
                        json!({"inlineData": {"mimeType": mime, "data": data}})
                    })
                }
                _ => None,
            })
            .collect(),
    }
}
