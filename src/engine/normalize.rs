// Normalizes v1internal responses (buffered JSON or SSE frames) into the
// canonical result model.

use serde_json::Value;

use crate::error::{AppError, AppResult};
use crate::models::{ContentBlock, GenerationResult, StopReason, Usage};

const SSE_DATA_PREFIX: &str = "data:";

/// Removes the one-level `{"response": ...}` wrapper when present.
pub fn unwrap_envelope(value: Value) -> Value {
    match value {
        Value::Object(mut map) => match map.remove("response") {
            Some(inner) => inner,
            None => Value::Object(map),
        },
        other => other,
    }
}

enum PartText {
    Thinking(String),
    Text(String),
}

/// A part carrying a `thought` field is thinking output: a string `thought`
/// is the thinking text itself, a boolean marker falls back to the part's
/// `text`. Parts with neither `thought` nor `text` are ignored.
fn classify_part(part: &Value) -> Option<PartText> {
    if let Some(thought) = part.get("thought") {
        if thought.as_bool() == Some(false) {
            // Explicitly marked as not-a-thought.
        } else {
            let text = thought
                .as_str()
                .map(str::to_string)
                .or_else(|| part.get("text").and_then(|t| t.as_str()).map(str::to_string))
                .unwrap_or_default();
            return Some(PartText::Thinking(text));
        }
    }
    part.get("text")
        .and_then(|t| t.as_str())
        .map(|t| PartText::Text(t.to_string()))
}

fn first_candidate(value: &Value) -> Option<&Value> {
    value.get("candidates").and_then(|c| c.as_array())?.first()
}

fn candidate_parts(candidate: &Value) -> Option<&Vec<Value>> {
    candidate
        .get("content")
        .and_then(|c| c.get("parts"))
        .and_then(|p| p.as_array())
}

fn read_usage(value: &Value) -> Option<Usage> {
    let meta = value.get("usageMetadata")?;
    Some(Usage {
        input_tokens: meta
            .get("promptTokenCount")
            .and_then(|v| v.as_u64())
            .unwrap_or(0),
        output_tokens: meta
            .get("candidatesTokenCount")
            .and_then(|v| v.as_u64())
            .unwrap_or(0),
    })
}

/// Buffered mode: one JSON document, first candidate only, adjacent blocks
/// of the same type merged.
pub fn normalize_buffered(model: &str, body: &str) -> AppResult<GenerationResult> {
    let parsed: Value = serde_json::from_str(body)
        .map_err(|e| AppError::Parse(format!("upstream response is not JSON: {}", e)))?;
    let response = unwrap_envelope(parsed);

    let mut content: Vec<ContentBlock> = Vec::new();
    let mut stop_reason = StopReason::EndTurn;

    if let Some(candidate) = first_candidate(&response) {
        if let Some(parts) = candidate_parts(candidate) {
            for part in parts {
                match classify_part(part) {
                    Some(PartText::Thinking(text)) => match content.last_mut() {
                        Some(ContentBlock::Thinking { thinking }) => thinking.push_str(&text),
                        _ => content.push(ContentBlock::Thinking { thinking: text }),
                    },
                    Some(PartText::Text(text)) => match content.last_mut() {
                        Some(ContentBlock::Text { text: existing }) => existing.push_str(&text),
                        _ => content.push(ContentBlock::Text { text }),
                    },
                    None => {}
                }
            }
        }
        stop_reason = StopReason::from_finish_reason(
            candidate.get("finishReason").and_then(|v| v.as_str()),
        );
    }

    Ok(GenerationResult {
        model: model.to_string(),
        content,
        usage: read_usage(&response).unwrap_or_default(),
        stop_reason,
    })
}

/// Streaming mode: `data:` frames, one JSON payload each. Malformed frames
/// are skipped, usage is last-write-wins (cumulative counters), thinking and
/// text are concatenated per category and collapsed into at most one block
/// each.
pub fn normalize_stream(model: &str, body: &str) -> GenerationResult {
    let mut thinking = String::new();
    let mut text = String::new();
    let mut usage = Usage::default();
    let mut finish_reason: Option<String> = None;

    for line in body.lines() {
        let line = line.trim();
        let Some(payload) = line.strip_prefix(SSE_DATA_PREFIX) else {
            continue;
        };
        let payload = payload.trim();
        if payload.is_empty() || payload == "[DONE]" {
            continue;
        }
        let frame: Value = match serde_json::from_str(payload) {
            Ok(v) => v,
            Err(e) => {
                tracing::debug!("skipping malformed stream frame: {}", e);
                continue;
            }
        };
        let frame = unwrap_envelope(frame);

        if let Some(u) = read_usage(&frame) {
            usage = u;
        }
        if let Some(candidate) = first_candidate(&frame) {
            if let Some(parts) = candidate_parts(candidate) {
                for part in parts {
                    match classify_part(part) {
                        Some(PartText::Thinking(t)) => thinking.push_str(&t),
                        Some(PartText::Text(t)) => text.push_str(&t),
                        None => {}
                    }
                }
            }
            if let Some(reason) = candidate.get("finishReason").and_then(|v| v.as_str()) {
                finish_reason = Some(reason.to_string());
            }
        }
    }

    let mut content = Vec::new();
    if !thinking.is_empty() {
        content.push(ContentBlock::Thinking { thinking });
    }
    if !text.is_empty() {
        content.push(ContentBlock::Text { text });
    }

    GenerationResult {
        model: model.to_string(),
        content,
        usage,
        stop_reason: StopReason::from_finish_reason(finish_reason.as_deref()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const BUFFERED: &str = r#"{
        "candidates": [{
            "content": {"parts": [
                {"thought": "let me think"},
                {"text": "Hello"},
                {"text": " world"}
            ]},
            "finishReason": "STOP"
        }],
        "usageMetadata": {"promptTokenCount": 7, "candidatesTokenCount": 3}
    }"#;

    #[test]
    fn buffered_normalization_merges_adjacent_text() {
        let result = normalize_buffered("gemini-3-flash", BUFFERED).unwrap();
        assert_eq!(
            result.content,
            vec![
                ContentBlock::Thinking {
                    thinking: "let me think".into()
                },
                ContentBlock::Text {
                    text: "Hello world".into()
                },
            ]
        );
        assert_eq!(result.usage.input_tokens, 7);
        assert_eq!(result.usage.output_tokens, 3);
        assert_eq!(result.stop_reason, StopReason::EndTurn);
        assert_eq!(result.model, "gemini-3-flash");
    }

    #[test]
    fn envelope_unwrap_is_equivalent_to_bare_response() {
        let wrapped = format!(r#"{{"response": {}}}"#, BUFFERED);
        let a = normalize_buffered("m", BUFFERED).unwrap();
        let b = normalize_buffered("m", &wrapped).unwrap();
        assert_eq!(a.content, b.content);
        assert_eq!(a.usage, b.usage);
        assert_eq!(a.stop_reason, b.stop_reason);
    }

    #[test]
    fn buffered_ignores_secondary_candidates_and_odd_parts() {
        let body = r#"{
            "candidates": [
                {"content": {"parts": [{"text": "first"}, {"functionCall": {}}]}},
                {"content": {"parts": [{"text": "second"}]}}
            ]
        }"#;
        let result = normalize_buffered("m", body).unwrap();
        assert_eq!(
            result.content,
            vec![ContentBlock::Text {
                text: "first".into()
            }]
        );
        assert_eq!(result.usage, Usage::default());
    }

    #[test]
    fn buffered_non_json_is_a_parse_error() {
        assert!(matches!(
            normalize_buffered("m", "<html>bad gateway</html>"),
            Err(AppError::Parse(_))
        ));
    }

    #[test]
    fn thought_marker_with_text_field() {
        let body = r#"{"candidates":[{"content":{"parts":[
            {"thought": true, "text": "reasoning"},
            {"thought": false, "text": "answer"}
        ]}}]}"#;
        let result = normalize_buffered("m", body).unwrap();
        assert_eq!(
            result.content,
            vec![
                ContentBlock::Thinking {
                    thinking: "reasoning".into()
                },
                ContentBlock::Text {
                    text: "answer".into()
                },
            ]
        );
    }

    #[test]
    fn stream_collapses_to_one_block_per_category() {
        let body = concat!(
            "data: {\"candidates\":[{\"content\":{\"parts\":[{\"thought\":\"a\"}]}}]}\n\n",
            "data: {\"candidates\":[{\"content\":{\"parts\":[{\"text\":\"b\"}]}}]}\n\n",
            "data: {\"candidates\":[{\"content\":{\"parts\":[{\"text\":\"c\"}]},\"finishReason\":\"STOP\"}]}\n\n",
        );
        let result = normalize_stream("gemini-3-flash", body);
        assert_eq!(
            result.content,
            vec![
                ContentBlock::Thinking {
                    thinking: "a".into()
                },
                ContentBlock::Text { text: "bc".into() },
            ]
        );
        assert_eq!(result.stop_reason, StopReason::EndTurn);
    }

    #[test]
    fn stream_malformed_frame_is_skipped() {
        let body = concat!(
            "data: {\"candidates\":[{\"content\":{\"parts\":[{\"text\":\"b\"}]}}]}\n\n",
            "data: {not valid json\n\n",
            ": comment line\n",
            "data: {\"candidates\":[{\"content\":{\"parts\":[{\"text\":\"c\"}]}}]}\n\n",
        );
        let result = normalize_stream("m", body);
        assert_eq!(
            result.content,
            vec![ContentBlock::Text { text: "bc".into() }]
        );
    }

    #[test]
    fn stream_usage_is_last_write_wins() {
        let body = concat!(
            "data: {\"usageMetadata\":{\"promptTokenCount\":5,\"candidatesTokenCount\":1}}\n\n",
            "data: {\"usageMetadata\":{\"promptTokenCount\":5,\"candidatesTokenCount\":9}}\n\n",
        );
        let result = normalize_stream("m", body);
        assert_eq!(result.usage.input_tokens, 5);
        assert_eq!(result.usage.output_tokens, 9);
    }

    #[test]
    fn stream_frames_may_be_enveloped() {
        let body =
            "data: {\"response\":{\"candidates\":[{\"content\":{\"parts\":[{\"text\":\"x\"}]},\"finishReason\":\"MAX_TOKENS\"}]}}\n\n";
        let result = normalize_stream("m", body);
        assert_eq!(
            result.content,
            vec![ContentBlock::Text { text: "x".into() }]
        );
        assert_eq!(result.stop_reason, StopReason::MaxTokens);
    }

    #[test]
    fn safety_finish_maps_to_content_filter() {
        let body = r#"{"candidates":[{"content":{"parts":[{"text":"x"}]},"finishReason":"SAFETY"}]}"#;
        let result = normalize_buffered("m", body).unwrap();
        assert_eq!(result.stop_reason, StopReason::ContentFilter);
    }

    #[test]
    fn empty_stream_yields_empty_end_turn() {
        let result = normalize_stream("m", "");
        assert!(result.content.is_empty());
        assert_eq!(result.usage, Usage::default());
        assert_eq!(result.stop_reason, StopReason::EndTurn);
    }
}
