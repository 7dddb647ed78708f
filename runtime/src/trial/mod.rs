//! Trial aggregation across iterations and URLs.

pub mod aggregator;

pub use aggregator::{average, Trial, TrialAggregator, TrialFailure, UrlResult};
