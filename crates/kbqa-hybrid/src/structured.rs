//! Lenient decoding of model replies that are supposed to be JSON objects.

use kbqa_core::types::{AnswerResult, JudgeResult, RouteAction, RouterDecision};
use serde_json::{Map, Value};

/// The first balanced `{...}` in `text`, ignoring code fences and prose.
pub fn extract_json_object(text: &str) -> Option<&str> {
    let start = text.find('{')?;
    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;
    for (i, ch) in text[start..].char_indices() {
        if in_string {
            match ch {
                _ if escaped => escaped = false,
                '\\' => escaped = true,
                '"' => in_string = false,
                _ => {}
            }
            continue;
        }
        match ch {
            '"' => in_string = true,
            '{' => depth += 1,
            '}' => {
                depth -= 1;
                if depth == 0 {
                    return Some(&text[start..=start + i]);
                }
            }
            _ => {}
        }
    }
    None
}

fn parse_object(text: &str) -> Option<Map<String, Value>> {
    match serde_json::from_str::<Value>(extract_json_object(text)?) {
        Ok(Value::Object(map)) => Some(map),
        _ => None,
    }
}

#[allow(clippy::cast_possible_truncation)]
fn get_f32(map: &Map<String, Value>, key: &str) -> Option<f32> {
    match map.get(key)? {
        Value::Number(n) => n.as_f64().map(|v| v as f32),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
    .filter(|v: &f32| v.is_finite())
}

fn get_bool(map: &Map<String, Value>, key: &str) -> Option<bool> {
    match map.get(key)? {
        Value::Bool(b) => Some(*b),
        Value::String(s) => match s.trim().to_ascii_lowercase().as_str() {
            "true" | "yes" => Some(true),
            "false" | "no" => Some(false),
            _ => None,
        },
        _ => None,
    }
}

fn get_string(map: &Map<String, Value>, key: &str) -> Option<String> {
    match map.get(key)? {
        Value::String(s) => Some(s.clone()),
        Value::Null => None,
        other => Some(other.to_string()),
    }
}

fn get_string_list(map: &Map<String, Value>, key: &str) -> Option<Vec<String>> {
    match map.get(key)? {
        Value::Array(items) => Some(
            items
                .iter()
                .filter_map(|v| match v {
                    Value::String(s) => Some(s.clone()),
                    Value::Null => None,
                    other => Some(other.to_string()),
                })
                .collect(),
        ),
        _ => None,
    }
}

/// An answer-pass reply. Missing fields take defaults: `can_answer` true,
/// `confidence` 0.5, `sources` the context chunk ids. A reply with no JSON
/// object is taken as a plain-text answer at `plain_text_confidence`.
#[derive(Debug, Clone, PartialEq)]
pub struct ParsedAnswer {
    pub result: AnswerResult,
    pub structured: bool,
}

pub fn parse_answer(raw: &str, chunk_ids: &[String], plain_text_confidence: f32) -> ParsedAnswer {
    match parse_object(raw) {
        Some(map) => ParsedAnswer {
            result: AnswerResult {
                can_answer: get_bool(&map, "can_answer").unwrap_or(true),
                confidence: get_f32(&map, "confidence").unwrap_or(0.5).clamp(0.0, 1.0),
                answer: get_string(&map, "answer").unwrap_or_else(|| raw.trim().to_string()),
                reason: get_string(&map, "reason").unwrap_or_default(),
                sources: get_string_list(&map, "sources").unwrap_or_else(|| chunk_ids.to_vec()),
            },
            structured: true,
        },
        None => ParsedAnswer {
            result: AnswerResult {
                can_answer: true,
                confidence: plain_text_confidence.clamp(0.0, 1.0),
                answer: raw.trim().to_string(),
                reason: "Plain text answer".to_string(),
                sources: chunk_ids.to_vec(),
            },
            structured: false,
        },
    }
}

/// A judge reply, or `None` when no JSON object can be read from it.
/// `overall_confidence` defaults to the answer's own confidence.
#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
pub fn parse_judge(raw: &str, answer_confidence: f32) -> Option<JudgeResult> {
    let map = parse_object(raw)?;
    let level = match map.get("hallucination_level") {
        Some(Value::Bool(b)) => u8::from(*b),
        _ => get_f32(&map, "hallucination_level").map_or(0, |v| v.round().clamp(0.0, 2.0) as u8),
    };
    Some(JudgeResult {
        is_supported: get_bool(&map, "is_supported").unwrap_or(true),
        hallucination_level: level,
        overall_confidence: get_f32(&map, "overall_confidence").unwrap_or(answer_confidence).clamp(0.0, 1.0),
        comment: get_string(&map, "comment").unwrap_or_else(|| "Judge detected issues".to_string()),
    })
}

/// A router reply with a known action. A missing confidence becomes
/// `default_confidence`.
pub fn parse_router_decision(raw: &str, default_confidence: f32) -> Option<RouterDecision> {
    let map = parse_object(raw)?;
    let action = match get_string(&map, "action")?.trim().to_ascii_lowercase().as_str() {
        "rag" => RouteAction::Rag,
        "escalate" => RouteAction::Escalate,
        "db" => RouteAction::Db,
        "api" => RouteAction::Api,
        _ => return None,
    };
    Some(RouterDecision {
        action,
        confidence: get_f32(&map, "confidence").unwrap_or(default_confidence).clamp(0.0, 1.0),
        reason: get_string(&map, "reason").unwrap_or_default(),
    })
}
