//! # Conversion Module
//!
//! The orchestrator that turns an ordered image list into a video: it stages
//! the frames, builds the encoder command, runs the encoder in the background,
//! and always removes the staging workspace before reporting the outcome.

pub mod engine;

// Re-exports for convenience
pub use engine::{
    ConversionOrchestrator, ConversionOutcome, ConversionReport, ConversionState, FailureReason,
    RunHandle,
};
