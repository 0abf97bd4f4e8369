//! The read-only corpus: every indexed unit plus the `(source, block_idx)`
//! lookup used for neighbor expansion.

use serde::Deserialize;
use std::collections::HashMap;
use std::fs;
use std::path::Path;
use tracing::{debug, warn};

use crate::error::{Error, Result};
use crate::types::{CorpusUnit, UnitKey};

#[derive(Debug, Clone, Default)]
pub struct Corpus {
    units: Vec<CorpusUnit>,
    by_key: HashMap<UnitKey, usize>,
}

#[derive(Deserialize)]
struct RawUnit {
    source: String,
    block_idx: serde_json::Value,
    #[serde(default)]
    section_path: String,
    #[serde(default)]
    text: String,
}

impl Corpus {
    /// A repeated `(source, block_idx)` replaces the earlier unit in place,
    /// so `units()` and `get` always agree.
    pub fn from_units(input: Vec<CorpusUnit>) -> Self {
        let mut units: Vec<CorpusUnit> = Vec::with_capacity(input.len());
        let mut by_key = HashMap::with_capacity(input.len());
        for u in input {
            let key = u.key();
            if let Some(&i) = by_key.get(&key) {
                warn!(key = %key, "duplicate corpus unit, keeping the later one");
                units[i] = u;
            } else {
                by_key.insert(key, units.len());
                units.push(u);
            }
        }
        Self { units, by_key }
    }

    /// Read a JSONL chunk file: one object per line with `source`,
    /// `block_idx`, `section_path` and `text`. Blank lines are skipped.
    pub fn load_jsonl(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)?;
        let mut units = Vec::new();
        for (lineno, line) in content.lines().enumerate() {
            let line = line.trim();
            if line.is_empty() {
                continue;
            }
            let raw: RawUnit = serde_json::from_str(line)
                .map_err(|e| Error::Corpus(format!("{}:{}: {}", path.display(), lineno + 1, e)))?;
            let block_idx = parse_block_idx(&raw.block_idx).ok_or_else(|| {
                Error::Corpus(format!("{}:{}: block_idx must be a non-negative integer", path.display(), lineno + 1))
            })?;
            units.push(CorpusUnit { source: raw.source, block_idx, section_path: raw.section_path, text: raw.text });
        }
        debug!(path = %path.display(), units = units.len(), "corpus loaded");
        Ok(Self::from_units(units))
    }

    pub fn get(&self, key: &UnitKey) -> Option<&CorpusUnit> {
        self.by_key.get(key).map(|&i| &self.units[i])
    }

    pub fn units(&self) -> &[CorpusUnit] { &self.units }

    pub fn len(&self) -> usize { self.units.len() }

    pub fn is_empty(&self) -> bool { self.units.is_empty() }
}

fn parse_block_idx(v: &serde_json::Value) -> Option<usize> {
    match v {
        serde_json::Value::Number(n) => n.as_u64().and_then(|n| usize::try_from(n).ok()),
        serde_json::Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn block_idx_accepts_numeric_strings() {
        assert_eq!(parse_block_idx(&serde_json::json!(3)), Some(3));
        assert_eq!(parse_block_idx(&serde_json::json!("7")), Some(7));
        assert_eq!(parse_block_idx(&serde_json::json!(-1)), None);
        assert_eq!(parse_block_idx(&serde_json::json!(null)), None);
    }

    #[test]
    fn later_duplicate_wins() {
        let a = CorpusUnit { source: "s".into(), block_idx: 0, section_path: String::new(), text: "old".into() };
        let b = CorpusUnit { text: "new".into(), ..a.clone() };
        let other = CorpusUnit { block_idx: 1, text: "next".into(), ..a.clone() };
        let c = Corpus::from_units(vec![a, other, b]);
        assert_eq!(c.get(&UnitKey::new("s", 0)).map(|u| u.text.as_str()), Some("new"));
        assert_eq!(c.len(), 2);
        let texts: Vec<_> = c.units().iter().map(|u| u.text.as_str()).collect();
        assert_eq!(texts, vec!["new", "next"]);
    }
}
