//! # imgseq
//!
//! Turn an ordered list of still images into an MP4 video or an animated GIF.
//!
//! The heavy lifting is done by an external `ffmpeg` executable. This library
//! stages the images into a numbered sequence the encoder can read, builds the
//! encoder command for the chosen format, runs it as a cancellable child
//! process while streaming its diagnostic output, and maps the exit status to
//! a single outcome. The staging workspace is always removed afterwards.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use imgseq::{ConversionOptions, ConversionOrchestrator, ImageList};
//!
//! # #[tokio::main]
//! # async fn main() -> anyhow::Result<()> {
//! let mut images = ImageList::new();
//! images.add("frames/a.png")?;
//! images.add("frames/b.png")?;
//! images.add("frames/c.png")?;
//!
//! let (log_tx, mut log_rx) = tokio::sync::mpsc::unbounded_channel();
//! let orchestrator = ConversionOrchestrator::new("ffmpeg");
//! let run = orchestrator.start(
//!     images.entries(),
//!     ConversionOptions::mp4(25, "libx264", 18),
//!     "out.mp4".into(),
//!     log_tx,
//! )?;
//!
//! tokio::spawn(async move {
//!     while let Some(line) = log_rx.recv().await {
//!         eprintln!("{line}");
//!     }
//! });
//!
//! let report = run.wait().await;
//! println!("{:?}", report.outcome);
//! # Ok(())
//! # }
//! ```
//!
//! ## Architecture
//!
//! - [`sequence`] - Ordered image list and staging into a numbered workspace
//! - [`encoder`] - Options, command building and the encoder child process
//! - [`conversion`] - The orchestrator and its lifecycle state machine
//! - [`config`] - Configuration management

pub mod config;
pub mod conversion;
pub mod encoder;
pub mod error;
pub mod sequence;

// Re-export commonly used types for convenience
pub use crate::{
    config::Config,
    conversion::{ConversionOrchestrator, ConversionOutcome, ConversionReport, ConversionState},
    encoder::{CancelToken, ConversionOptions, OutputFormat, ProcessRunner, RunStatus},
    error::{ConverterError, Result},
    sequence::{ImageEntry, ImageList, SequenceStager},
};
