//! A/B test model and raw-rate evaluation.
//!
//! Counters are owned by the delivery side; everything here reads a snapshot
//! and never mutates it. The winner comparison is an instantaneous point
//! estimate, not a significance test.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// One arm of a split test.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Variant {
    A,
    B,
}

impl std::fmt::Display for Variant {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Variant::A => write!(f, "A"),
            Variant::B => write!(f, "B"),
        }
    }
}

/// Outcome of comparing the two variants' conversion rates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Winner {
    A,
    B,
    Tie,
}

impl std::fmt::Display for Winner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Winner::A => write!(f, "A"),
            Winner::B => write!(f, "B"),
            Winner::Tie => write!(f, "Tie"),
        }
    }
}

/// Monotonically non-decreasing enrollment/conversion counters for one arm.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct VariantStats {
    pub enrolled: u64,
    pub converted: u64,
}

impl VariantStats {
    pub fn new(enrolled: u64, converted: u64) -> Self {
        Self { enrolled, converted }
    }

    /// Conversion percentage in `[0, 100]`. Zero enrollment yields 0 rather
    /// than a division by zero, keeping the evaluator total.
    pub fn conversion_rate(&self) -> f64 {
        if self.enrolled == 0 {
            return 0.0;
        }
        self.converted as f64 / self.enrolled as f64 * 100.0
    }
}

/// Split-test snapshot attached to a workflow's `ab_test` node.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AbTest {
    pub id: Uuid,
    pub workflow_id: Uuid,
    pub name: String,
    /// Share of traffic routed to variant A, in percent.
    pub split_percentage: u8,
    pub variant_a: VariantStats,
    pub variant_b: VariantStats,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
}

impl AbTest {
    pub fn new(workflow_id: Uuid, name: impl Into<String>, split_percentage: u8) -> Self {
        Self {
            id: Uuid::new_v4(),
            workflow_id,
            name: name.into(),
            split_percentage,
            variant_a: VariantStats::default(),
            variant_b: VariantStats::default(),
            is_active: true,
            created_at: Utc::now(),
        }
    }

    pub fn variant(&self, variant: Variant) -> &VariantStats {
        match variant {
            Variant::A => &self.variant_a,
            Variant::B => &self.variant_b,
        }
    }

    /// Strictly higher conversion rate wins; exactly equal rates tie,
    /// including the degenerate case where both arms are empty.
    pub fn winner(&self) -> Winner {
        let rate_a = self.variant_a.conversion_rate();
        let rate_b = self.variant_b.conversion_rate();
        if rate_a > rate_b {
            Winner::A
        } else if rate_b > rate_a {
            Winner::B
        } else {
            Winner::Tie
        }
    }
}

/// Read-only evaluation of a test snapshot for reporting.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AbTestReport {
    pub test_id: Uuid,
    pub conversion_rate_a: f64,
    pub conversion_rate_b: f64,
    pub winner: Winner,
    pub total_enrolled: u64,
    pub required_samples: u64,
    /// False while either arm is below `required_samples`. Informational
    /// only; `winner` above is always the raw comparison.
    pub is_conclusive: bool,
}

/// Evaluate a snapshot against a per-variant minimum sample size.
/// `min_sample_size = 0` disables the conclusiveness gate.
pub fn evaluate(test: &AbTest, min_sample_size: u64) -> AbTestReport {
    let smaller_arm = test.variant_a.enrolled.min(test.variant_b.enrolled);
    AbTestReport {
        test_id: test.id,
        conversion_rate_a: test.variant_a.conversion_rate(),
        conversion_rate_b: test.variant_b.conversion_rate(),
        winner: test.winner(),
        total_enrolled: test.variant_a.enrolled + test.variant_b.enrolled,
        required_samples: min_sample_size,
        is_conclusive: smaller_arm >= min_sample_size,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn make_test(a: VariantStats, b: VariantStats) -> AbTest {
        let mut test = AbTest::new(Uuid::new_v4(), "subject line test", 50);
        test.variant_a = a;
        test.variant_b = b;
        test
    }

    #[test]
    fn test_conversion_rate_basic() {
        let stats = VariantStats::new(100, 25);
        assert_eq!(stats.conversion_rate(), 25.0);
    }

    #[test]
    fn test_conversion_rate_zero_enrollment() {
        let stats = VariantStats::new(0, 0);
        assert_eq!(stats.conversion_rate(), 0.0);
    }

    #[test]
    fn test_conversion_rate_bounds() {
        for enrolled in [1u64, 3, 10, 97, 1000] {
            for converted in 0..=enrolled.min(10) {
                let rate = VariantStats::new(enrolled, converted).conversion_rate();
                assert!((0.0..=100.0).contains(&rate), "rate {rate} out of bounds");
            }
        }
        assert_eq!(VariantStats::new(50, 50).conversion_rate(), 100.0);
    }

    #[test]
    fn test_winner_b_on_higher_rate() {
        // A: 25/100 = 25%, B: 30/100 = 30%
        let test = make_test(VariantStats::new(100, 25), VariantStats::new(100, 30));
        assert_eq!(test.variant(Variant::A).conversion_rate(), 25.0);
        assert_eq!(test.variant(Variant::B).conversion_rate(), 30.0);
        assert_eq!(test.winner(), Winner::B);
    }

    #[test]
    fn test_winner_tie_on_equal_rates() {
        let test = make_test(VariantStats::new(200, 50), VariantStats::new(100, 25));
        assert_eq!(test.winner(), Winner::Tie);
    }

    #[test]
    fn test_winner_tie_on_empty_test() {
        let test = make_test(VariantStats::default(), VariantStats::default());
        assert_eq!(test.winner(), Winner::Tie);
    }

    #[test]
    fn test_winner_symmetry() {
        let cases = [
            (VariantStats::new(100, 25), VariantStats::new(100, 30)),
            (VariantStats::new(10, 9), VariantStats::new(50, 1)),
            (VariantStats::new(100, 50), VariantStats::new(200, 100)),
            (VariantStats::new(0, 0), VariantStats::new(40, 0)),
        ];
        for (a, b) in cases {
            let forward = make_test(a, b).winner();
            let swapped = make_test(b, a).winner();
            let expected = match forward {
                Winner::A => Winner::B,
                Winner::B => Winner::A,
                Winner::Tie => Winner::Tie,
            };
            assert_eq!(swapped, expected, "swap broke symmetry for {a:?} vs {b:?}");
        }
    }

    #[test]
    fn test_report_conclusive_gate() {
        let test = make_test(VariantStats::new(40, 10), VariantStats::new(100, 30));

        let ungated = evaluate(&test, 0);
        assert!(ungated.is_conclusive);
        assert_eq!(ungated.winner, Winner::B);
        assert_eq!(ungated.total_enrolled, 140);

        let gated = evaluate(&test, 50);
        assert!(!gated.is_conclusive, "smaller arm has 40 < 50 samples");
        // The raw winner is reported either way.
        assert_eq!(gated.winner, Winner::B);
    }
}
