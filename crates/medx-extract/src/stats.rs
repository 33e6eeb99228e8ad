//! Running extraction statistics and the per-request processing cost.
//!
//! Costs are integer micro-dollars. A local-only classification costs a
//! flat fee; a request that reached Tier 2 pays per thousand characters,
//! with a one-thousand-character minimum. Savings are measured against
//! sending every text to a full language model.

use medx_core::{EscalationStatus, ProcessingMethod, Score};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

pub const LOCAL_COST_MICROS: u64 = 10_000;
/// Per thousand characters sent to Tier 2.
pub const ESCALATED_COST_PER_1K_MICROS: u64 = 20_000;
/// What the same request would cost on a full language model.
pub const FULL_MODEL_COST_MICROS: u64 = 260_000;

/// Cost of one extraction. Escalation that never reached a Tier 2
/// classifier is billed as local.
pub fn processing_cost_micros(
    method: ProcessingMethod,
    escalation: EscalationStatus,
    text_chars: usize,
) -> u64 {
    let reached_tier2 = method == ProcessingMethod::Escalated
        && escalation != EscalationStatus::Unavailable
        && escalation != EscalationStatus::NotRequired;
    if !reached_tier2 {
        return LOCAL_COST_MICROS;
    }
    let chars = (text_chars as u64).max(1_000);
    ESCALATED_COST_PER_1K_MICROS.saturating_mul(chars) / 1_000
}

/// Snapshot of [`StatsRecorder`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProcessingStats {
    pub total_processed: u64,
    pub local_only_count: u64,
    pub escalated_count: u64,
    pub average_confidence: Score,
    pub total_cost_micros: u64,
    /// Share of the full-model cost avoided; zero when nothing was saved.
    pub cost_savings: Score,
    pub average_processing_ms: u64,
}

#[derive(Debug, Default)]
struct Totals {
    processed: u64,
    local_only: u64,
    escalated: u64,
    confidence_bp: u64,
    cost_micros: u64,
    elapsed_ms: u64,
}

/// Accumulates one entry per extraction.
#[derive(Debug, Default)]
pub struct StatsRecorder {
    totals: Mutex<Totals>,
}

impl StatsRecorder {
    pub fn record(&self, method: ProcessingMethod, aggregate: Score, cost_micros: u64, elapsed_ms: u64) {
        let mut t = self.totals.lock();
        t.processed += 1;
        match method {
            ProcessingMethod::LocalOnly => t.local_only += 1,
            ProcessingMethod::Escalated => t.escalated += 1,
        }
        t.confidence_bp += u64::from(aggregate.basis_points());
        t.cost_micros = t.cost_micros.saturating_add(cost_micros);
        t.elapsed_ms = t.elapsed_ms.saturating_add(elapsed_ms);
    }

    pub fn snapshot(&self) -> ProcessingStats {
        let t = self.totals.lock();
        if t.processed == 0 {
            return ProcessingStats::default();
        }
        let n = t.processed;
        let baseline = FULL_MODEL_COST_MICROS.saturating_mul(n);
        let saved = baseline.saturating_sub(t.cost_micros);
        let savings_bp = saved.saturating_mul(u64::from(Score::SCALE)) / baseline;
        ProcessingStats {
            total_processed: n,
            local_only_count: t.local_only,
            escalated_count: t.escalated,
            average_confidence: Score::saturating_from_basis_points(((t.confidence_bp + n / 2) / n) as u16),
            total_cost_micros: t.cost_micros,
            cost_savings: Score::saturating_from_basis_points(savings_bp as u16),
            average_processing_ms: t.elapsed_ms / n,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn local_cost_is_flat() {
        let c = processing_cost_micros(ProcessingMethod::LocalOnly, EscalationStatus::NotRequired, 50_000);
        assert_eq!(c, 10_000);
        let c = processing_cost_micros(ProcessingMethod::Escalated, EscalationStatus::Unavailable, 50_000);
        assert_eq!(c, 10_000);
    }

    #[test]
    fn escalated_cost_scales_past_one_thousand_chars() {
        let cost = |n| processing_cost_micros(ProcessingMethod::Escalated, EscalationStatus::Completed, n);
        assert_eq!(cost(10), 20_000);
        assert_eq!(cost(1_000), 20_000);
        assert_eq!(cost(2_500), 50_000);
        assert_eq!(
            processing_cost_micros(ProcessingMethod::Escalated, EscalationStatus::TimedOut, 3_000),
            60_000
        );
    }

    #[test]
    fn empty_recorder_reports_zeroes() {
        assert_eq!(StatsRecorder::default().snapshot(), ProcessingStats::default());
    }

    #[test]
    fn snapshot_averages_and_savings() {
        let r = StatsRecorder::default();
        r.record(ProcessingMethod::LocalOnly, Score::from_f64(0.9), 10_000, 4);
        r.record(ProcessingMethod::Escalated, Score::from_f64(0.7), 50_000, 10);
        let s = r.snapshot();
        assert_eq!(s.total_processed, 2);
        assert_eq!(s.local_only_count, 1);
        assert_eq!(s.escalated_count, 1);
        assert_eq!(s.average_confidence, Score::from_f64(0.8));
        assert_eq!(s.total_cost_micros, 60_000);
        // 1 - 60_000 / 520_000
        assert_eq!(s.cost_savings.basis_points(), 8_846);
        assert_eq!(s.average_processing_ms, 7);
    }

    #[test]
    fn savings_never_go_negative() {
        let r = StatsRecorder::default();
        r.record(ProcessingMethod::Escalated, Score::ZERO, 400_000, 1);
        assert_eq!(r.snapshot().cost_savings, Score::ZERO);
    }
}
