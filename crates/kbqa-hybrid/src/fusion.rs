//! Reciprocal Rank Fusion of the dense and sparse channels.
//!
//! Each list contributes `1 / (k + rank)` per id, ranks starting at 1. Raw
//! channel scores never enter the sum, so the two scales need no calibration.

use std::collections::HashMap;

use kbqa_core::types::{FusedCandidate, RetrievalHit};

/// Default RRF constant.
pub const DEFAULT_RRF_K: usize = 60;

struct Entry<'a> {
    total: f64,
    hit: &'a RetrievalHit,
}

/// Fuse `dense` and `sparse` into at most `top_n` candidates, best first.
///
/// An id keeps the metadata and text of the list that referenced it first.
/// Equal sums keep first-insertion order, so the dense list wins ties.
#[allow(clippy::cast_precision_loss, clippy::cast_possible_truncation)]
pub fn rrf_fuse(dense: &[RetrievalHit], sparse: &[RetrievalHit], k_rrf: usize, top_n: usize) -> Vec<FusedCandidate> {
    let mut pool: Vec<Entry<'_>> = Vec::with_capacity(dense.len() + sparse.len());
    let mut by_id: HashMap<&str, usize> = HashMap::new();

    for list in [dense, sparse] {
        for (i, hit) in list.iter().enumerate() {
            let contrib = 1.0 / (k_rrf + i + 1) as f64;
            match by_id.get(hit.id.as_str()) {
                Some(&slot) => pool[slot].total += contrib,
                None => {
                    by_id.insert(hit.id.as_str(), pool.len());
                    pool.push(Entry { total: contrib, hit });
                }
            }
        }
    }

    pool.sort_by(|a, b| b.total.total_cmp(&a.total));
    pool.truncate(top_n);
    pool.into_iter()
        .map(|e| FusedCandidate {
            id: e.hit.id.clone(),
            fused_score: e.total as f32,
            metadata: e.hit.metadata.clone(),
            text: e.hit.text.clone(),
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use kbqa_core::types::UnitRef;

    fn hit(id: &str, text: &str) -> RetrievalHit {
        RetrievalHit {
            id: id.into(),
            score: 0.0,
            metadata: UnitRef { source: "m".into(), block_idx: 0, section_path: String::new() },
            text: text.into(),
        }
    }

    #[test]
    fn shared_id_outranks_singletons() {
        let dense = vec![hit("a", "dense a"), hit("b", "b")];
        let sparse = vec![hit("c", "c"), hit("a", "sparse a")];
        let fused = rrf_fuse(&dense, &sparse, 60, 10);
        assert_eq!(fused[0].id, "a");
        assert_eq!(fused[0].text, "dense a");
        let expected = 1.0 / 61.0 + 1.0 / 62.0;
        assert!((f64::from(fused[0].fused_score) - expected).abs() < 1e-6);
    }

    #[test]
    fn ties_prefer_dense_list() {
        let fused = rrf_fuse(&[hit("d", "")], &[hit("s", "")], 60, 10);
        assert_eq!(fused.iter().map(|c| c.id.as_str()).collect::<Vec<_>>(), vec!["d", "s"]);
    }

    #[test]
    fn truncates_and_handles_empty() {
        assert!(rrf_fuse(&[], &[], 60, 5).is_empty());
        let dense: Vec<_> = (0..10).map(|i| hit(&format!("d{i}"), "")).collect();
        assert_eq!(rrf_fuse(&dense, &[], 60, 3).len(), 3);
    }
}
