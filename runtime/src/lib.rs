//! Cloakscope runtime: detect sites that serve performance auditors a different page.
//!
//! Each target URL is captured in two hermetic browser sessions, one presenting a plain
//! mobile browser identity and one presenting the auditor's user-agent. The resulting
//! capture profiles are compared with a weighted divergence score, and repeated trials
//! are averaged into a single cloaking probability.

pub mod capture;
pub mod cli;
pub mod config;
pub mod error;
pub mod identity;
pub mod renderer;
pub mod report;
pub mod scoring;
pub mod trial;
