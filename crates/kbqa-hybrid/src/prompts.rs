//! Prompt templates for the router, answer and judge passes.

use std::fmt::Write as _;

use kbqa_core::config::RouterThresholds;
use kbqa_core::types::{ContextChunk, RetrievalSignals};

/// Reply shown to the user whenever the assistant declines.
pub const NO_RELIABLE_INFO: &str = "No reliable information found, please contact support";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Prompt {
    pub system: String,
    pub user: String,
}

/// `[CTX i] chunk_id=<id>` blocks, numbered from 1.
pub fn render_context(chunks: &[ContextChunk]) -> String {
    chunks
        .iter()
        .enumerate()
        .map(|(i, c)| format!("[CTX {}] chunk_id={}\n{}", i + 1, c.chunk_id, c.text))
        .collect::<Vec<_>>()
        .join("\n\n")
}

pub fn answer_prompt(query: &str, chunks: &[ContextChunk], low_retrieval_conf: bool, min_confidence: f32, language: &str) -> Prompt {
    let system = format!(
        "You are a product manual assistant experienced in maintenance and troubleshooting. \
         Only use the provided context; do not fabricate. \
         If the context is insufficient, say you cannot find reliable information and tell the customer to contact support. \
         Always cite chunk_id and section/source. Provide a confidence score (0.0-1.0) reflecting how well the context supports the answer. \
         If confidence < {min_confidence} OR low_retrieval_conf=true, set can_answer=false and suggest contacting support."
    );
    let mut user = String::new();
    let _ = writeln!(user, "low_retrieval_conf: {low_retrieval_conf}");
    let _ = writeln!(user, "Question: {query}");
    let _ = writeln!(user, "Context:\n{}", render_context(chunks));
    let _ = writeln!(user, "Respond ONLY in JSON, no extra text:");
    let _ = writeln!(user, "{{");
    let _ = writeln!(user, "  \"can_answer\": true/false,");
    let _ = writeln!(user, "  \"confidence\": number 0.0-1.0,");
    let _ = writeln!(user, "  \"answer\": \"text answer in {language}\",");
    let _ = writeln!(user, "  \"reason\": \"brief reason\",");
    let _ = writeln!(user, "  \"sources\": [\"chunk_id1\", \"chunk_id2\"]");
    let _ = writeln!(user, "}}");
    let _ = write!(
        user,
        "Rules: If can_answer=false OR confidence<{min_confidence} OR low_retrieval_conf=true, set can_answer=false, \
         confidence=0.0, answer='{NO_RELIABLE_INFO}', reason explains the insufficiency, sources=[]"
    );
    Prompt { system, user }
}

pub fn judge_prompt(query: &str, chunks: &[ContextChunk], answer_text: &str, language: &str) -> Prompt {
    let system = "You are a strict judge. Evaluate whether the assistant answer is supported by the context. \
                  Only judge support; do not invent new information."
        .to_string();
    let user = format!(
        "Question: {query}\n\
         Context:\n{ctx}\n\
         Assistant answer:\n{answer_text}\n\
         Respond ONLY in JSON:\n\
         {{\n  \"is_supported\": true/false,\n  \"hallucination_level\": 0/1/2,\n  \"missing_info\": true/false,\n  \
         \"overall_confidence\": 0.0-1.0,\n  \"comment\": \"brief reason\"\n}}\n\
         If not supported OR hallucination_level>=1, set overall_confidence<=0.5. Write the comment in {language}.",
        ctx = render_context(chunks),
    );
    Prompt { system, user }
}

/// Intent classification for the gray band. The numeric rules are restated
/// from `t` so the model sees the same bands the gate applies.
pub fn router_prompt(query: &str, signals: &RetrievalSignals, t: &RouterThresholds) -> Prompt {
    let mut system = String::new();
    let _ = writeln!(system, "You are a routing assistant for a product support system. Decide the best action for the user query.");
    let _ = writeln!(system, "Possible actions: rag, escalate, db, api.\n");
    let _ = writeln!(system, "## Hard rules (always apply first)");
    let _ = writeln!(
        system,
        "1. If top1>={} AND avg_top5>={} AND hits>={} -> action=rag, confidence={}",
        t.high_top1, t.high_avg_top5, t.high_min_hits, t.band_confidence
    );
    let _ = writeln!(
        system,
        "2. If top1<{} OR avg_top5<{} OR hits<{} -> action=escalate, confidence={}",
        t.low_top1, t.low_avg_top5, t.low_min_hits, t.band_confidence
    );
    let _ = writeln!(system, "3. Otherwise route by intent as below.\n");
    let _ = writeln!(system, "## Intent routing");
    let _ = writeln!(
        system,
        "- api (confidence 0.85): live data such as order status, tracking, inventory, stock, price, shipping, payment, service status. \
         Low retrieval scores are expected for these, since the manuals do not hold live data."
    );
    let _ = writeln!(
        system,
        "- rag (confidence 0.75): static manual knowledge such as how-to steps, troubleshooting, error lights, features, specifications."
    );
    let _ = writeln!(
        system,
        "- escalate (confidence 0.85): complaints, refunds, warranty claims, legal or safety concerns, requests for a human agent."
    );
    let _ = writeln!(system, "- db (confidence 0.80): structured lookups such as customer records or purchase history.\n");
    let _ = write!(system, "Respond ONLY in JSON: {{\"action\": \"rag|escalate|db|api\", \"confidence\": 0.0-1.0, \"reason\": \"...\"}}");

    let signals_json = serde_json::to_string(signals).unwrap_or_else(|_| "{}".to_string());
    let user = format!(
        "query: {query}\nretrieval_signals: {signals_json}\n\
         Apply the numeric rules first. If a rule matches, output it directly. Otherwise, decide by intent."
    );
    Prompt { system, user }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn chunk(id: &str, text: &str) -> ContextChunk {
        ContextChunk { chunk_id: id.into(), text: text.into() }
    }

    #[test]
    fn context_blocks_are_numbered() {
        let ctx = render_context(&[chunk("m:1", "alpha"), chunk("m:2", "beta")]);
        assert_eq!(ctx, "[CTX 1] chunk_id=m:1\nalpha\n\n[CTX 2] chunk_id=m:2\nbeta");
    }

    #[test]
    fn answer_prompt_carries_flag_and_language() {
        let p = answer_prompt("how to descale?", &[chunk("m:1", "use descaler")], true, 0.6, "German");
        assert!(p.user.starts_with("low_retrieval_conf: true\n"));
        assert!(p.user.contains("text answer in German"));
        assert!(p.system.contains("confidence < 0.6"));
    }

    #[test]
    fn router_prompt_restates_thresholds() {
        let p = router_prompt("where is my order", &RetrievalSignals::default(), &RouterThresholds::default());
        assert!(p.system.contains("top1>=0.7 AND avg_top5>=0.5 AND hits>=3"));
        assert!(p.system.contains("top1<0.35 OR avg_top5<0.3 OR hits<3"));
        assert!(p.user.contains("\"top1\":0.0"));
    }
}
