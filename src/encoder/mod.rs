//! # Encoder Module
//!
//! Everything that talks to the external video encoder: conversion options,
//! the argument vector for MP4 and GIF output, locating the executable, and
//! running it as a cancellable child process whose diagnostic output is
//! streamed line by line.
//!
//! ## Usage
//!
//! ```rust,no_run
//! use std::path::Path;
//! use imgseq::encoder::{CancelToken, CommandBuilder, ConversionOptions, ProcessRunner};
//!
//! # #[tokio::main]
//! # async fn main() -> anyhow::Result<()> {
//! let options = ConversionOptions::mp4(25, "libx264", 18);
//! let args = CommandBuilder::build(Path::new("frames/img%04d.png"), &options, Path::new("out.mp4"))?;
//!
//! let mut log: Vec<String> = Vec::new();
//! let status = ProcessRunner::new()
//!     .run(std::ffi::OsStr::new("ffmpeg"), &args, &mut log, &CancelToken::new())
//!     .await;
//! println!("{:?}", status);
//! # Ok(())
//! # }
//! ```

pub mod command;
pub mod locate;
pub mod runner;
pub mod types;

pub use command::{render_command_line, CommandBuilder};
pub use locate::resolve_encoder;
pub use runner::{CancelToken, DiagnosticSink, ProcessRunner, RunStatus, TracingSink};
pub use types::{
    parse_scale_width, ConversionOptions, FormatOptions, OutputFormat, MAX_CRF, RECOMMENDED_CODECS,
};
