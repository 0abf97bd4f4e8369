//! Tolerant parsing of retrieval signals arriving as text.
//!
//! Accepts strict JSON, JSON wrapped in an extra pair of quotes, single-quoted
//! or Python-literal dicts, and dicts with bare keys or list items. Anything
//! still unreadable becomes the default (all-zero) signals, which routes to
//! escalation.

use std::sync::OnceLock;

use kbqa_core::error::{Error, Result};
use kbqa_core::types::RetrievalSignals;
use regex::Regex;
use serde_json::Value;
use tracing::warn;

/// Parse `raw` or fall back to default signals. Never fails.
pub fn parse_signals(raw: &str) -> RetrievalSignals {
    match try_parse_signals(raw) {
        Ok(s) => s,
        Err(e) => {
            warn!(error = %e, "using default retrieval signals");
            RetrievalSignals::default()
        }
    }
}

pub fn try_parse_signals(raw: &str) -> Result<RetrievalSignals> {
    let s = raw.trim();
    if s.is_empty() {
        return Err(Error::SignalParse("empty input".into()));
    }

    let unquoted = strip_outer_quotes(s);
    let double_quoted = unquoted.replace('\'', "\"");
    let repaired = quote_bare_tokens(&double_quoted);
    let literal = quote_bare_tokens(&normalize_python_literal(unquoted));

    for candidate in [s, unquoted, double_quoted.as_str(), repaired.as_str(), literal.as_str()] {
        if let Ok(v) = serde_json::from_str::<Value>(candidate) {
            if let Some(signals) = signals_from_value(&v) {
                return Ok(signals);
            }
        }
    }
    Err(Error::SignalParse(truncate_for_log(s)))
}

fn strip_outer_quotes(s: &str) -> &str {
    let b = s.as_bytes();
    if b.len() >= 2 && (b[0] == b'"' || b[0] == b'\'') && b[b.len() - 1] == b[0] {
        s[1..s.len() - 1].trim()
    } else {
        s
    }
}

fn bare_key_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r#"([{,]\s*)([A-Za-z_][A-Za-z0-9_]*)\s*:"#).expect("static regex"))
}

fn list_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\[([^\[\]]*)\]").expect("static regex"))
}

fn literal_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\b(True|False|None)\b").expect("static regex"))
}

fn trailing_comma_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r",\s*([}\]])").expect("static regex"))
}

/// Quote bare object keys and bare list items.
fn quote_bare_tokens(s: &str) -> String {
    let keyed = bare_key_re().replace_all(s, r#"$1"$2":"#);
    list_re()
        .replace_all(&keyed, |caps: &regex::Captures<'_>| {
            let items: Vec<String> = caps[1]
                .split(',')
                .map(str::trim)
                .filter(|item| !item.is_empty())
                .map(|item| {
                    if item.starts_with('"') || item.parse::<f64>().is_ok() || matches!(item, "true" | "false" | "null") {
                        item.to_string()
                    } else {
                        format!("\"{item}\"")
                    }
                })
                .collect();
            format!("[{}]", items.join(", "))
        })
        .into_owned()
}

fn normalize_python_literal(s: &str) -> String {
    let s = s.replace('\'', "\"");
    let s = literal_re().replace_all(&s, |caps: &regex::Captures<'_>| match &caps[1] {
        "True" => "true",
        "False" => "false",
        _ => "null",
    });
    trailing_comma_re().replace_all(&s, "$1").into_owned()
}

#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
fn signals_from_value(v: &Value) -> Option<RetrievalSignals> {
    let obj = v.as_object()?;
    // "inf" and "NaN" parse as floats; they count as missing.
    let number = |key: &str| -> f64 {
        let v = match obj.get(key) {
            Some(Value::Number(n)) => n.as_f64().unwrap_or(0.0),
            Some(Value::String(s)) => s.trim().parse().unwrap_or(0.0),
            Some(Value::Bool(b)) => f64::from(u8::from(*b)),
            _ => 0.0,
        };
        if v.is_finite() { v } else { 0.0 }
    };
    let sections = match obj.get("sections") {
        Some(Value::Array(items)) => items
            .iter()
            .filter_map(|i| match i {
                Value::String(s) => Some(s.clone()),
                Value::Null => None,
                other => Some(other.to_string()),
            })
            .collect(),
        Some(Value::String(s)) if !s.is_empty() => vec![s.clone()],
        _ => Vec::new(),
    };
    Some(RetrievalSignals {
        top1: number("top1") as f32,
        avg_top5: number("avg_top5") as f32,
        hits: number("hits").max(0.0) as usize,
        sections,
    })
}

fn truncate_for_log(s: &str) -> String {
    const MAX: usize = 120;
    match s.char_indices().nth(MAX) {
        Some((i, _)) => format!("{}...", &s[..i]),
        None => s.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn approx(a: f32, b: f32) -> bool {
        (a - b).abs() < 1e-6
    }

    #[test]
    fn non_finite_strings_read_as_zero() {
        let s = parse_signals(r#"{"top1": "inf", "avg_top5": "NaN", "hits": 5}"#);
        assert!(approx(s.top1, 0.0));
        assert!(approx(s.avg_top5, 0.0));
        assert_eq!(s.hits, 5);
    }

    #[test]
    fn strict_json() {
        let s = parse_signals(r#"{"top1": 0.82, "avg_top5": 0.6, "hits": 5, "sections": ["Cleaning"]}"#);
        assert!(approx(s.top1, 0.82));
        assert_eq!(s.hits, 5);
        assert_eq!(s.sections, vec!["Cleaning".to_string()]);
    }

    #[test]
    fn single_quoted_and_wrapped() {
        let s = parse_signals(r#""{'top1': 0.5, 'avg_top5': 0.4, 'hits': 4}""#);
        assert!(approx(s.top1, 0.5));
        assert_eq!(s.hits, 4);
    }

    #[test]
    fn bare_keys_and_list_items() {
        let s = parse_signals("{top1: 0.9, avg_top5: 0.7, hits: 6, sections: [Cleaning, Milk]}");
        assert!(approx(s.avg_top5, 0.7));
        assert_eq!(s.sections, vec!["Cleaning".to_string(), "Milk".to_string()]);
    }

    #[test]
    fn python_literal() {
        let s = parse_signals("{'top1': 0.4, 'avg_top5': 0.35, 'hits': 3, 'sections': None,}");
        assert!(approx(s.top1, 0.4));
        assert!(s.sections.is_empty());
    }

    #[test]
    fn garbage_defaults_to_zero() {
        assert_eq!(parse_signals("not signals at all"), RetrievalSignals::default());
        assert_eq!(parse_signals(""), RetrievalSignals::default());
        assert!(matches!(try_parse_signals("[1, 2]"), Err(Error::SignalParse(_))));
    }
}
