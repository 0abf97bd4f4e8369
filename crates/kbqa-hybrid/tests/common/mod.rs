#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use kbqa_core::config::PipelineConfig;
use kbqa_core::corpus::Corpus;
use kbqa_core::traits::{ChatModel, CrossEncoder, Embedder, TextTokenizer, VectorIndex, VectorMatch};
use kbqa_core::types::CorpusUnit;
use kbqa_hybrid::{Pipeline, Services};
use kbqa_text::TantivyKeywordIndex;

pub fn manual_corpus() -> Arc<Corpus> {
    let rows = [
        ("manual.md", 0, "Cleaning", "Rinse the brew group under warm water every week."),
        ("manual.md", 1, "Cleaning", "Run the descaling program when the descale light blinks."),
        ("manual.md", 2, "Cleaning", "Empty the drip tray after descaling."),
        ("manual.md", 3, "Grinder", "Turn the grinder dial to adjust coarseness."),
        ("faq.md", 0, "Errors", "A blinking red light means the water tank is empty."),
        ("faq.md", 1, "Errors", "A steady red light means the brew group is missing."),
    ];
    Arc::new(Corpus::from_units(
        rows.iter()
            .map(|(s, i, sec, t)| CorpusUnit { source: (*s).into(), block_idx: *i, section_path: (*sec).into(), text: (*t).into() })
            .collect(),
    ))
}

/// One token per character.
pub struct CharTokenizer;

impl TextTokenizer for CharTokenizer {
    fn encode(&self, text: &str) -> anyhow::Result<Vec<u32>> {
        Ok(text.chars().map(u32::from).collect())
    }
    fn decode(&self, ids: &[u32]) -> anyhow::Result<String> {
        Ok(ids.iter().filter_map(|&c| char::from_u32(c)).collect())
    }
}

pub struct ConstEmbedder;

impl Embedder for ConstEmbedder {
    fn dim(&self) -> usize { 4 }
    fn max_len(&self) -> usize { 64 }
    fn embed_batch(&self, texts: &[String]) -> anyhow::Result<Vec<Vec<f32>>> {
        Ok(texts.iter().map(|_| vec![1.0, 0.0, 0.0, 0.0]).collect())
    }
}

/// Returns the corpus in order with growing distances, or fails on demand.
pub struct MemoryVectorIndex {
    pub corpus: Arc<Corpus>,
    pub fail: bool,
}

#[async_trait]
impl VectorIndex for MemoryVectorIndex {
    async fn query(&self, _embedding: &[f32], k: usize) -> anyhow::Result<Vec<VectorMatch>> {
        if self.fail {
            anyhow::bail!("vector table missing");
        }
        Ok(self
            .corpus
            .units()
            .iter()
            .take(k)
            .enumerate()
            .map(|(i, u)| VectorMatch { id: u.chunk_id(), metadata: u.unit_ref(), distance: 0.1 * f32::from(u16::try_from(i).unwrap_or(u16::MAX)), text: u.text.clone() })
            .collect())
    }
}

/// Gives every candidate the same score.
pub struct UniformScorer(pub f32);

impl CrossEncoder for UniformScorer {
    fn score(&self, _query: &str, candidates: &[&str]) -> anyhow::Result<Vec<f32>> {
        Ok(vec![self.0; candidates.len()])
    }
}

pub enum Reply {
    Text(String),
    Fail(String),
    Hang,
}

/// Replays canned replies in order and records every prompt it receives.
#[derive(Default)]
pub struct ScriptedChat {
    replies: Mutex<VecDeque<Reply>>,
    calls: AtomicUsize,
    prompts: Mutex<Vec<(String, String)>>,
}

impl ScriptedChat {
    pub fn new(replies: Vec<Reply>) -> Arc<Self> {
        Arc::new(Self { replies: Mutex::new(replies.into()), ..Self::default() })
    }

    pub fn texts(replies: &[&str]) -> Arc<Self> {
        Self::new(replies.iter().map(|r| Reply::Text((*r).to_string())).collect())
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn user_prompts(&self) -> Vec<String> {
        self.prompts.lock().expect("lock").iter().map(|(_, u)| u.clone()).collect()
    }
}

#[async_trait]
impl ChatModel for ScriptedChat {
    async fn complete(&self, system_prompt: &str, user_prompt: &str) -> anyhow::Result<String> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.prompts.lock().expect("lock").push((system_prompt.to_string(), user_prompt.to_string()));
        let next = self.replies.lock().expect("lock").pop_front();
        match next {
            Some(Reply::Text(t)) => Ok(t),
            Some(Reply::Fail(m)) => Err(anyhow::anyhow!(m)),
            Some(Reply::Hang) => {
                tokio::time::sleep(Duration::from_secs(30)).await;
                Ok(String::new())
            }
            None => Err(anyhow::anyhow!("no scripted reply left")),
        }
    }
}

pub fn test_config() -> PipelineConfig {
    let mut cfg = PipelineConfig::default();
    cfg.timeouts.chat_ms = 200;
    cfg
}

pub struct Harness {
    pub pipeline: Pipeline,
    pub answer_llm: Arc<ScriptedChat>,
    pub router_llm: Arc<ScriptedChat>,
}

pub fn harness(score: f32, answer_llm: Arc<ScriptedChat>, router_llm: Arc<ScriptedChat>) -> Harness {
    harness_with(test_config(), score, false, answer_llm, router_llm)
}

pub fn harness_with(
    config: PipelineConfig,
    score: f32,
    vector_fails: bool,
    answer_llm: Arc<ScriptedChat>,
    router_llm: Arc<ScriptedChat>,
) -> Harness {
    let corpus = manual_corpus();
    let services = Services {
        embedder: Arc::new(ConstEmbedder),
        vector_index: Arc::new(MemoryVectorIndex { corpus: Arc::clone(&corpus), fail: vector_fails }),
        keyword_index: Arc::new(TantivyKeywordIndex::build(Arc::clone(&corpus)).expect("keyword index")),
        cross_encoder: Arc::new(UniformScorer(score)),
        tokenizer: Arc::new(CharTokenizer),
        answer_llm: answer_llm.clone(),
        router_llm: router_llm.clone(),
    };
    let pipeline = Pipeline::new(config, corpus, services).expect("pipeline");
    Harness { pipeline, answer_llm, router_llm }
}
