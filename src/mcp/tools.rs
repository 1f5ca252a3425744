// Tool catalog and dispatch. Upstream failures come back as `isError` tool
// results; malformed arguments are protocol-level invalid-params.

use once_cell::sync::Lazy;
use serde_json::{json, Value};

use crate::engine::dispatch::UpstreamTransport;
use crate::engine::token_cache::TokenExchanger;
use crate::engine::Engine;
use crate::error::AppError;
use crate::models::{ChatMessage, GenerationRequest, GenerationResult};
use crate::modules::quota;

pub const DEFAULT_MODEL: &str = "gemini-3-flash";
pub const DEFAULT_MAX_TOKENS: u32 = 8192;

#[derive(Debug)]
pub enum ToolCallError {
    InvalidParams(String),
    App(AppError),
}

impl From<AppError> for ToolCallError {
    fn from(err: AppError) -> Self {
        ToolCallError::App(err)
    }
}

pub static TOOLS: Lazy<Vec<Value>> = Lazy::new(|| {
    vec![
        json!({
            "name": "generate",
            "description": "Generate a response to a single prompt via the Gemini Cloud Code API.",
            "inputSchema": {
                "type": "object",
                "properties": {
                    "prompt": {"type": "string", "description": "The user prompt."},
                    "model": {"type": "string", "default": DEFAULT_MODEL},
                    "system": {"type": "string", "description": "Extra system instruction."},
                    "max_tokens": {"type": "integer", "default": DEFAULT_MAX_TOKENS},
                    "temperature": {"type": "number"},
                    "thinking": {"type": "boolean", "default": true}
                },
                "required": ["prompt"]
            }
        }),
        json!({
            "name": "chat",
            "description": "Multi-turn conversation. Messages alternate user/assistant roles.",
            "inputSchema": {
                "type": "object",
                "properties": {
                    "messages": {
                        "type": "array",
                        "items": {
                            "type": "object",
                            "properties": {
                                "role": {"type": "string", "enum": ["user", "assistant"]},
                                "content": {}
                            },
                            "required": ["role", "content"]
                        }
                    },
                    "model": {"type": "string", "default": DEFAULT_MODEL},
                    "system": {"type": "string"},
                    "max_tokens": {"type": "integer", "default": DEFAULT_MAX_TOKENS},
                    "thinking": {"type": "boolean", "default": true}
                },
                "required": ["messages"]
            }
        }),
        json!({
            "name": "list_models",
            "description": "List the model ids currently available to the configured accounts.",
            "inputSchema": {"type": "object", "properties": {}}
        }),
        json!({
            "name": "get_quota",
            "description": "Per-model remaining quota and reset time.",
            "inputSchema": {"type": "object", "properties": {}}
        }),
        json!({
            "name": "list_accounts",
            "description": "Configured accounts and their status.",
            "inputSchema": {"type": "object", "properties": {}}
        }),
    ]
});

pub fn list_tools() -> Value {
    json!({ "tools": *TOOLS })
}

pub async fn call_tool<T: UpstreamTransport, E: TokenExchanger>(
    engine: &Engine<T, E>,
    name: &str,
    args: &Value,
) -> Result<Value, ToolCallError> {
    match name {
        "generate" => {
            let request = parse_generate_args(args)?;
            let result = engine.generate(request).await?;
            Ok(render_generation(&result))
        }
        "chat" => {
            let request = parse_chat_args(args)?;
            let result = engine.generate(request).await?;
            Ok(render_generation(&result))
        }
        "list_models" => {
            let response = engine.fetch_models_response().await?;
            let ids = quota::parse_model_ids(&response);
            Ok(text_result(&json!({ "models": ids }).to_string()))
        }
        "get_quota" => {
            let response = engine.fetch_models_response().await?;
            let rows: Vec<Value> = quota::parse_quota(&response)
                .into_iter()
                .map(|q| {
                    json!({
                        "model": q.model,
                        "remainingFraction": q.remaining_fraction,
                        "resetTime": q.reset_time,
                    })
                })
                .collect();
            Ok(text_result(&json!({ "quota": rows }).to_string()))
        }
        "list_accounts" => {
            let rows: Vec<Value> = engine
                .list_accounts()
                .into_iter()
                .map(|a| {
                    json!({
                        "email": a.email,
                        "enabled": a.enabled,
                        "invalid": a.invalid,
                        "projectId": a.project_id,
                    })
                })
                .collect();
            Ok(text_result(&json!({ "accounts": rows }).to_string()))
        }
        other => Err(ToolCallError::InvalidParams(format!(
            "Unknown tool: {}",
            other
        ))),
    }
}

fn parse_generate_args(args: &Value) -> Result<GenerationRequest, ToolCallError> {
    let prompt = args
        .get("prompt")
        .and_then(|v| v.as_str())
        .filter(|p| !p.is_empty())
        .ok_or_else(|| ToolCallError::InvalidParams("generate: prompt is required".into()))?;

    Ok(GenerationRequest {
        model: string_arg(args, "model").unwrap_or_else(|| DEFAULT_MODEL.into()),
        messages: vec![ChatMessage::user_text(prompt)],
        system: string_arg(args, "system"),
        max_tokens: Some(u32_arg(args, "max_tokens").unwrap_or(DEFAULT_MAX_TOKENS)),
        temperature: args.get("temperature").and_then(|v| v.as_f64()),
        thinking: args
            .get("thinking")
            .and_then(|v| v.as_bool())
            .unwrap_or(true),
        ..Default::default()
    })
}

fn parse_chat_args(args: &Value) -> Result<GenerationRequest, ToolCallError> {
    let raw = args
        .get("messages")
        .and_then(|v| v.as_array())
        .filter(|m| !m.is_empty())
        .ok_or_else(|| {
            ToolCallError::InvalidParams("chat: messages must be a non-empty array".into())
        })?;

    let messages: Vec<ChatMessage> = raw
        .iter()
        .map(|m| {
            serde_json::from_value(m.clone()).map_err(|e| {
                ToolCallError::InvalidParams(format!("chat: bad message: {}", e))
            })
        })
        .collect::<Result<_, _>>()?;

    Ok(GenerationRequest {
        model: string_arg(args, "model").unwrap_or_else(|| DEFAULT_MODEL.into()),
        messages,
        system: string_arg(args, "system"),
        max_tokens: Some(u32_arg(args, "max_tokens").unwrap_or(DEFAULT_MAX_TOKENS)),
        thinking: args
            .get("thinking")
            .and_then(|v| v.as_bool())
            .unwrap_or(true),
        ..Default::default()
    })
}

fn string_arg(args: &Value, key: &str) -> Option<String> {
    args.get(key)
        .and_then(|v| v.as_str())
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

fn u32_arg(args: &Value, key: &str) -> Option<u32> {
    args.get(key)
        .and_then(|v| v.as_u64())
        .map(|n| n.min(u32::MAX as u64) as u32)
}

fn render_generation(result: &GenerationResult) -> Value {
    let mut content = Vec::new();
    if let Some(thinking) = result.thinking_text() {
        content.push(json!({"type": "text", "text": format!("[thinking]\n{}", thinking)}));
    }
    content.push(json!({"type": "text", "text": result.answer_text()}));
    json!({
        "content": content,
        "isError": false,
        "metadata": {
            "model": result.model,
            "stop_reason": result.stop_reason.as_str(),
            "usage": result.usage,
        }
    })
}

fn text_result(text: &str) -> Value {
    json!({
        "content": [{"type": "text", "text": text}],
        "isError": false
    })
}

/// Renders an engine failure as a tool-level error result. The text carries
/// enough to self-diagnose without reading server logs.
pub fn error_result(err: &AppError) -> Value {
    json!({
        "content": [{"type": "text", "text": err.to_string()}],
        "isError": true
    })
}
