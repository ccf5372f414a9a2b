//! quizscore-core: scoring and classification engine for psychological quizzes.
//!
//! A quiz ([`model::TestDefinition`]) defines questions whose options carry
//! per-scale weights, scales with qualitative bands, and prioritized
//! classification rules. Scoring an [`model::AnswerSet`] sums the weights of
//! the selected options per scale, resolves each scale's band, picks the
//! first matching rule (or the default result) and assembles a
//! [`results::ScoringResult`].
//!
//! The engine itself is pure and deterministic. Loading, configuration,
//! persistence and batch reporting live in the surrounding modules.

pub mod aggregate;
pub mod bands;
pub mod config;
pub mod engine;
pub mod error;
pub mod formula;
pub mod model;
pub mod parser;
pub mod report;
pub mod results;
pub mod rules;
pub mod statistics;
pub mod store;
pub mod traits;

pub use engine::{score, ScoringEngine};
pub use error::ScoringError;
