mod common;

use std::collections::HashSet;

use common::CharTokenizer;
use kbqa_core::corpus::Corpus;
use kbqa_core::types::{AnswerResult, CorpusUnit, JudgeResult, RerankedResult, RetrievalHit, UnitRef};
use kbqa_hybrid::{dedup_results, reconcile, rrf_fuse, ContextAssembler};
use proptest::prelude::*;

fn hit(id: usize) -> RetrievalHit {
    RetrievalHit {
        id: format!("doc-{id}"),
        score: 0.0,
        metadata: UnitRef { source: "doc".into(), block_idx: id, section_path: String::new() },
        text: String::new(),
    }
}

fn reranked(source: usize, idx: usize, section: usize) -> RerankedResult {
    RerankedResult {
        id: format!("s{source}:{idx}"),
        rerank_score: 0.5,
        metadata: UnitRef { source: format!("s{source}"), block_idx: idx, section_path: format!("sec{section}") },
        text: "fallback text".into(),
    }
}

/// Two sources of twelve units each, sections changing every four units.
fn sectioned_corpus(lengths: &[usize]) -> Corpus {
    let mut units = Vec::new();
    for source in 0..2 {
        for idx in 0..12 {
            let len = lengths[(source * 12 + idx) % lengths.len()];
            units.push(CorpusUnit {
                source: format!("s{source}"),
                block_idx: idx,
                section_path: format!("sec{}", idx / 4),
                text: "x".repeat(len),
            });
        }
    }
    Corpus::from_units(units)
}

proptest! {
    #[test]
    fn fused_scores_never_increase(
        dense in proptest::collection::vec(0usize..30, 0..20),
        sparse in proptest::collection::vec(0usize..30, 0..20),
        k in 1usize..100,
        top in 1usize..50,
    ) {
        let d: Vec<_> = dense.into_iter().map(hit).collect();
        let s: Vec<_> = sparse.into_iter().map(hit).collect();
        let fused = rrf_fuse(&d, &s, k, top);
        prop_assert!(fused.len() <= top);
        for w in fused.windows(2) {
            prop_assert!(w[0].fused_score >= w[1].fused_score);
        }
        let ids: HashSet<_> = fused.iter().map(|c| c.id.clone()).collect();
        prop_assert_eq!(ids.len(), fused.len());
    }

    #[test]
    fn dedup_is_unique_ordered_subsequence(items in proptest::collection::vec((0usize..3, 0usize..6), 0..30)) {
        let input: Vec<_> = items.iter().enumerate().map(|(n, &(s, i))| {
            let mut r = reranked(s, i, 0);
            r.id = format!("n{n}");
            r
        }).collect();
        let out = dedup_results(input.clone());

        let keys: HashSet<_> = out.iter().map(|r| r.metadata.key()).collect();
        prop_assert_eq!(keys.len(), out.len());
        let all_keys: HashSet<_> = input.iter().map(|r| r.metadata.key()).collect();
        prop_assert_eq!(keys.len(), all_keys.len());

        let mut pos = input.iter();
        for r in &out {
            prop_assert!(pos.any(|x| x.id == r.id), "output is not a subsequence of input");
        }
    }

    #[test]
    fn context_respects_budget_and_sections(
        lengths in proptest::collection::vec(0usize..40, 1..24),
        hits in proptest::collection::vec((0usize..2, 0usize..12), 0..8),
        radius in 0usize..4,
        max_tokens in 1usize..200,
    ) {
        let corpus = sectioned_corpus(&lengths);
        let hits: Vec<_> = hits.iter().map(|&(s, i)| reranked(s, i, i / 4)).collect();
        let ctx = ContextAssembler::new(&corpus, &CharTokenizer, radius, max_tokens).assemble(&hits).expect("context");

        let total: usize = ctx.chunks.iter().map(|c| c.text.chars().count()).sum();
        prop_assert!(total <= max_tokens);
        prop_assert_eq!(total, ctx.tokens_used);

        if !ctx.fallback {
            let allowed: HashSet<(String, String)> = hits.iter().map(|h| (h.metadata.source.clone(), h.metadata.section_path.clone())).collect();
            let mut seen = HashSet::new();
            for c in &ctx.chunks {
                let (source, idx) = c.chunk_id.rsplit_once(':').expect("chunk id");
                let idx: usize = idx.parse().expect("index");
                let unit = corpus.get(&kbqa_core::types::UnitKey::new(source, idx)).expect("unit exists");
                prop_assert!(allowed.contains(&(unit.source.clone(), unit.section_path.clone())));
                prop_assert!(seen.insert(c.chunk_id.clone()), "chunk emitted twice");
            }
            // Only the last chunk may be a truncated prefix.
            for c in ctx.chunks.iter().rev().skip(1) {
                let (source, idx) = c.chunk_id.rsplit_once(':').expect("chunk id");
                let unit = corpus.get(&kbqa_core::types::UnitKey::new(source, idx.parse().expect("index"))).expect("unit");
                prop_assert_eq!(&c.text, &unit.text);
            }
        }
    }

    #[test]
    fn unsupported_verdict_always_vetoes(
        answer_conf in 0.0f32..=1.0,
        judge_conf in 0.0f32..=1.0,
        level in 0u8..=2,
        can_answer in any::<bool>(),
    ) {
        let answer = AnswerResult { can_answer, confidence: answer_conf, answer: "a".into(), reason: "r".into(), sources: vec![] };
        let judge = JudgeResult { is_supported: false, hallucination_level: level, overall_confidence: judge_conf, comment: "no".into() };
        let out = reconcile(answer, Some(&judge));
        prop_assert!(!out.can_answer);
        prop_assert!((out.confidence - answer_conf.min(judge_conf)).abs() < 1e-6);
    }
}

#[test]
fn shared_hit_outranks_single_list_hits() {
    let dense = vec![hit(0), hit(1)];
    let sparse = vec![hit(1), hit(2)];
    let fused = rrf_fuse(&dense, &sparse, 60, 10);
    let ids: Vec<_> = fused.iter().map(|c| c.id.as_str()).collect();
    assert_eq!(ids, vec!["doc-1", "doc-0", "doc-2"]);
    assert!((f64::from(fused[0].fused_score) - (1.0 / 62.0 + 1.0 / 61.0)).abs() < 1e-6);
    assert!((f64::from(fused[1].fused_score) - 1.0 / 61.0).abs() < 1e-6);
    assert!((f64::from(fused[2].fused_score) - 1.0 / 62.0).abs() < 1e-6);
}

#[test]
fn oversized_first_unit_yields_one_truncated_chunk() {
    let corpus = Corpus::from_units(
        (0..6)
            .map(|i| CorpusUnit { source: "m".into(), block_idx: i, section_path: "S".into(), text: "y".repeat(50) })
            .collect(),
    );
    let hits: Vec<_> = (0..6)
        .map(|i| RerankedResult {
            id: format!("m:{i}"),
            rerank_score: 0.9,
            metadata: UnitRef { source: "m".into(), block_idx: i, section_path: "S".into() },
            text: "y".repeat(50),
        })
        .collect();
    let ctx = ContextAssembler::new(&corpus, &CharTokenizer, 2, 20).assemble(&hits).expect("context");
    assert_eq!(ctx.chunks.len(), 1);
    assert!(ctx.truncated);
    assert_eq!(ctx.tokens_used, 20);
}
