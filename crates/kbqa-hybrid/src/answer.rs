//! Two-pass grounded generation: an answer pass over the assembled context,
//! then a judge pass that may veto it.

use std::sync::Arc;
use std::time::Duration;

use kbqa_core::config::AnswerPolicy;
use kbqa_core::error::{Result, Stage};
use kbqa_core::traits::ChatModel;
use kbqa_core::types::{AnswerResult, JudgeResult, RetrievalSignals};
use tracing::{debug, info, warn};

use crate::context::AssembledContext;
use crate::prompts::{answer_prompt, judge_prompt, NO_RELIABLE_INFO};
use crate::stage::with_deadline;
use crate::structured::{parse_answer, parse_judge};

/// True when retrieval alone is too weak to trust any answer.
pub fn low_retrieval_conf(signals: &RetrievalSignals, policy: &AnswerPolicy) -> bool {
    signals.top1 < policy.low_retrieval_top1 || signals.avg_top5 < policy.low_retrieval_avg_top5
}

/// Decline answers the model itself declined, answers below
/// `min_confidence`, and any answer over weak retrieval.
pub fn enforce_answer_contract(mut result: AnswerResult, low_retrieval_conf: bool, min_confidence: f32) -> AnswerResult {
    let reason = if !result.can_answer {
        if result.reason.is_empty() { "Context insufficient".to_string() } else { std::mem::take(&mut result.reason) }
    } else if low_retrieval_conf {
        "Retrieval confidence too low".to_string()
    } else if result.confidence < min_confidence {
        format!("Answer confidence {:.2} below threshold {:.2}", result.confidence, min_confidence)
    } else {
        return result;
    };
    AnswerResult { can_answer: false, confidence: 0.0, answer: NO_RELIABLE_INFO.to_string(), reason, sources: Vec::new() }
}

/// Apply a judge verdict. A verdict of "unsupported" or any hallucination
/// vetoes the answer and caps its confidence at the judge's.
pub fn reconcile(mut answer: AnswerResult, judge: Option<&JudgeResult>) -> AnswerResult {
    if let Some(j) = judge {
        if !j.is_supported || j.hallucination_level >= 1 {
            answer.can_answer = false;
            answer.confidence = answer.confidence.min(j.overall_confidence);
            answer.reason.clone_from(&j.comment);
        }
    }
    answer.confidence = answer.confidence.clamp(0.0, 1.0);
    answer
}

#[derive(Debug, Clone, PartialEq)]
pub struct AnswerOutcome {
    pub answer: AnswerResult,
    pub judge: Option<JudgeResult>,
}

pub struct AnswerJudge {
    llm: Arc<dyn ChatModel>,
    policy: AnswerPolicy,
    timeout: Duration,
}

impl AnswerJudge {
    pub fn new(llm: Arc<dyn ChatModel>, policy: AnswerPolicy, timeout: Duration) -> Self {
        Self { llm, policy, timeout }
    }

    /// Errors only when a generation call fails or times out; unreadable
    /// replies are recovered with defaults.
    pub async fn run(&self, query: &str, context: &AssembledContext, low_retrieval_conf: bool) -> Result<AnswerOutcome> {
        let p = &self.policy;
        let chunk_ids = context.chunk_ids();

        let prompt = answer_prompt(query, &context.chunks, low_retrieval_conf, p.min_confidence, &p.language);
        let raw = with_deadline(Stage::Answer, self.timeout, self.llm.complete(&prompt.system, &prompt.user)).await?;
        let parsed = parse_answer(&raw, &chunk_ids, p.plain_text_confidence);
        if !parsed.structured {
            warn!("answer pass replied in plain text");
        }
        let answer = enforce_answer_contract(parsed.result, low_retrieval_conf, p.min_confidence);
        debug!(can_answer = answer.can_answer, confidence = answer.confidence, "answer pass");

        let prompt = judge_prompt(query, &context.chunks, &answer.answer, &p.language);
        let raw_judge = with_deadline(Stage::Judge, self.timeout, self.llm.complete(&prompt.system, &prompt.user)).await?;
        let judge = parse_judge(&raw_judge, answer.confidence);
        match &judge {
            Some(j) => info!(supported = j.is_supported, hallucination = j.hallucination_level, confidence = j.overall_confidence, "judge verdict"),
            None => warn!("judge reply not understood, keeping answer"),
        }

        let was_answerable = answer.can_answer;
        let answer = reconcile(answer, judge.as_ref());
        if was_answerable && !answer.can_answer {
            warn!(reason = %answer.reason, confidence = answer.confidence, "judge vetoed answer");
        }
        Ok(AnswerOutcome { answer, judge })
    }
}
