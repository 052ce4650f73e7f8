//! Engine analysis pipeline: evaluate a game's positions, classify moves into
//! highlights, turn blunders into quiz tasks and verify answers to them.

pub mod classifier;
pub mod config;
pub mod engine;
pub mod error;
pub mod evaluation;
pub mod highlights;
pub mod import;
pub mod models;
pub mod pipeline;
pub mod store;
pub mod tasks;
pub mod verifier;
pub mod worker;

pub use error::WorkerError;
