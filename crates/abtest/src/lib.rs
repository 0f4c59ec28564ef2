pub mod assign;
pub mod evaluator;

pub use assign::{assign_variant, SplitStrategy};
pub use evaluator::{evaluate, AbTest, AbTestReport, Variant, VariantStats, Winner};
