//! The confidence gate: numeric bands first, an intent classifier only for
//! the gray band between them.

use std::sync::Arc;
use std::time::Duration;

use kbqa_core::config::RouterThresholds;
use kbqa_core::error::Stage;
use kbqa_core::traits::ChatModel;
use kbqa_core::types::{RetrievalSignals, RouteAction, RouterDecision};
use tracing::{debug, info, warn};

use crate::prompts::router_prompt;
use crate::stage::with_deadline;
use crate::structured::parse_router_decision;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Band {
    High,
    Low,
    Gray,
}

/// High needs every `high_*` bound met; low needs any `low_*` bound missed.
/// Non-finite scores are low.
pub fn classify_band(s: &RetrievalSignals, t: &RouterThresholds) -> Band {
    if !s.top1.is_finite() || !s.avg_top5.is_finite() {
        Band::Low
    } else if s.top1 >= t.high_top1 && s.avg_top5 >= t.high_avg_top5 && s.hits >= t.high_min_hits {
        Band::High
    } else if s.top1 < t.low_top1 || s.avg_top5 < t.low_avg_top5 || s.hits < t.low_min_hits {
        Band::Low
    } else {
        Band::Gray
    }
}

pub struct ConfidenceGate {
    llm: Arc<dyn ChatModel>,
    thresholds: RouterThresholds,
    timeout: Duration,
}

impl ConfidenceGate {
    pub fn new(llm: Arc<dyn ChatModel>, thresholds: RouterThresholds, timeout: Duration) -> Self {
        Self { llm, thresholds, timeout }
    }

    pub fn thresholds(&self) -> &RouterThresholds {
        &self.thresholds
    }

    /// Decide what to do with `query`. Never fails: an unusable classifier
    /// reply or an unreachable classifier escalates.
    pub async fn route(&self, query: &str, signals: &RetrievalSignals) -> RouterDecision {
        let t = &self.thresholds;
        let band = classify_band(signals, t);
        debug!(?band, top1 = signals.top1, avg_top5 = signals.avg_top5, hits = signals.hits, "gate band");
        let decision = match band {
            Band::High => RouterDecision {
                action: RouteAction::Rag,
                confidence: t.band_confidence,
                reason: "High retrieval scores".to_string(),
            },
            Band::Low => RouterDecision {
                action: RouteAction::Escalate,
                confidence: t.band_confidence,
                reason: "Low retrieval scores".to_string(),
            },
            Band::Gray => self.classify_intent(query, signals).await,
        };
        info!(action = %decision.action, confidence = decision.confidence, reason = %decision.reason, "routed");
        decision
    }

    async fn classify_intent(&self, query: &str, signals: &RetrievalSignals) -> RouterDecision {
        let t = &self.thresholds;
        let prompt = router_prompt(query, signals, t);
        match with_deadline(Stage::Router, self.timeout, self.llm.complete(&prompt.system, &prompt.user)).await {
            Ok(reply) => parse_router_decision(&reply, t.fallback_confidence).unwrap_or_else(|| {
                warn!(reply = %reply, "router reply not understood");
                escalate(t.fallback_confidence, "router parse failure".to_string())
            }),
            Err(e) => {
                warn!(error = %e, "router unavailable");
                escalate(t.fallback_confidence, format!("router unavailable: {e}"))
            }
        }
    }
}

fn escalate(confidence: f32, reason: String) -> RouterDecision {
    RouterDecision { action: RouteAction::Escalate, confidence, reason }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn signals(top1: f32, avg_top5: f32, hits: usize) -> RetrievalSignals {
        RetrievalSignals { top1, avg_top5, hits, sections: Vec::new() }
    }

    #[test]
    fn non_finite_scores_fall_in_low_band() {
        let t = RouterThresholds::default();
        assert_eq!(classify_band(&signals(f32::INFINITY, f32::INFINITY, 5), &t), Band::Low);
        assert_eq!(classify_band(&signals(f32::NAN, 0.6, 5), &t), Band::Low);
        assert_eq!(classify_band(&signals(0.5, f32::NAN, 5), &t), Band::Low);
    }

    #[test]
    fn bands_follow_thresholds() {
        let t = RouterThresholds::default();
        assert_eq!(classify_band(&signals(0.82, 0.6, 5), &t), Band::High);
        assert_eq!(classify_band(&signals(0.2, 0.6, 5), &t), Band::Low);
        assert_eq!(classify_band(&signals(0.9, 0.9, 2), &t), Band::Low);
        assert_eq!(classify_band(&signals(0.5, 0.4, 4), &t), Band::Gray);
        assert_eq!(classify_band(&RetrievalSignals::default(), &t), Band::Low);
    }
}
