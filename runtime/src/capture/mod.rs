//! Single-session capture: instrumentation, resource classification, and traces.

pub mod classifier;
pub mod instrument;
pub mod profile;
pub mod runner;
pub mod trace;
