//! Variant assignment for split traffic.
//!
//! Sticky assignment hashes the contact id against a per-test scope so the
//! same contact always lands on the same arm; random assignment rolls fresh
//! on every entry.

use crate::evaluator::Variant;
use rand::Rng;
use tracing::debug;
use uuid::Uuid;

/// How contacts are routed at an `ab_test` node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SplitStrategy {
    Sticky,
    Random,
}

impl Default for SplitStrategy {
    fn default() -> Self {
        SplitStrategy::Sticky
    }
}

/// Pick a variant for `contact_id` under the given split.
///
/// `split_percentage` is the share routed to variant A in percent; values
/// above 100 saturate. `scope` distinguishes tests so one contact can land
/// on different arms of different tests.
pub fn assign_variant(
    split_percentage: u8,
    contact_id: &Uuid,
    scope: &str,
    strategy: SplitStrategy,
) -> Variant {
    let variant = match strategy {
        SplitStrategy::Sticky => sticky_assign(split_percentage, contact_id, scope),
        SplitStrategy::Random => random_assign(split_percentage),
    };
    debug!(
        contact_id = %contact_id,
        scope = scope,
        variant = %variant,
        "assigned split variant"
    );
    variant
}

fn sticky_assign(split_percentage: u8, contact_id: &Uuid, scope: &str) -> Variant {
    // Deterministic assignment based on contact id + scope hash
    let hash = contact_id
        .as_bytes()
        .iter()
        .copied()
        .chain(scope.bytes())
        .fold(0u64, |acc, b| acc.wrapping_mul(31).wrapping_add(b as u64));
    let bucket = hash % 10_000;
    let threshold = (split_percentage.min(100) as u64) * 100;
    if bucket < threshold {
        Variant::A
    } else {
        Variant::B
    }
}

fn random_assign(split_percentage: u8) -> Variant {
    let roll = rand::thread_rng().gen_range(1..=100u32);
    if roll <= split_percentage as u32 {
        Variant::A
    } else {
        Variant::B
    }
}
