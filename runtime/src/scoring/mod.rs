//! Divergence scoring between paired captures.

pub mod scorer;

pub use scorer::{round2, DivergenceScorer, Metric, ScoreBreakdown};
