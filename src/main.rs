use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::{anyhow, Result};
use clap::Parser;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use imgseq::{
    config::Config,
    conversion::{ConversionOrchestrator, ConversionOutcome, ConversionState},
    encoder::{parse_scale_width, OutputFormat, RECOMMENDED_CODECS},
    sequence::ImageList,
};

#[derive(Parser)]
#[command(
    name = "imgseq",
    version,
    about = "Turn an ordered list of images into an MP4 or animated GIF",
    long_about = "imgseq copies the given images into a numbered sequence, in the order given, and hands them to ffmpeg to produce an MP4 video or a palette-optimised animated GIF."
)]
struct Cli {
    /// Image files or folders, in frame order (folders are read in file-name order)
    #[arg(required = true)]
    inputs: Vec<PathBuf>,

    /// Output file path (defaults to output.mp4 / output.gif)
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Output format
    #[arg(short, long, value_enum)]
    format: Option<OutputFormat>,

    /// Frames per second
    #[arg(long)]
    fps: Option<u32>,

    /// MP4 codec passed to ffmpeg
    #[arg(long, long_help = codec_help())]
    codec: Option<String>,

    /// MP4 quality, 0 (best) to 51 (worst)
    #[arg(long)]
    crf: Option<u8>,

    /// GIF width in pixels; aspect ratio is preserved
    #[arg(long)]
    scale_width: Option<String>,

    /// Path to the ffmpeg executable
    #[arg(long)]
    ffmpeg: Option<PathBuf>,

    /// Configuration file (optional)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    let cli = Cli::parse();

    // Initialize logging
    let default_level = if cli.verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    info!("Starting imgseq v{}", env!("CARGO_PKG_VERSION"));

    // Load configuration
    let mut config = match &cli.config {
        Some(config_path) => {
            info!("Loading configuration from {:?}", config_path);
            Config::from_file(config_path).map_err(|e| anyhow!(e.user_message()))?
        }
        None => Config::default(),
    };
    apply_overrides(&mut config, &cli)?;
    config.validate().map_err(|e| anyhow!(e.user_message()))?;

    let images = collect_images(&cli.inputs);
    info!("Collected {} images", images.len());

    let options = config.defaults.options();
    if !options.uses_recommended_codec() {
        warn!(
            "Codec '{}' is not one of the recommended codecs ({}); ffmpeg may reject it",
            config.defaults.codec,
            RECOMMENDED_CODECS.join(", ")
        );
    }
    let output = cli
        .output
        .clone()
        .unwrap_or_else(|| config.defaults.format.default_file_name());

    let orchestrator = ConversionOrchestrator::from_config(&config);
    info!("Encoder: {}", orchestrator.executable().display());

    let (log_tx, mut log_rx) = tokio::sync::mpsc::unbounded_channel::<String>();
    let handle = orchestrator
        .start(images.entries(), options, output, log_tx)
        .map_err(|e| anyhow!(e.user_message()))?;

    let printer = tokio::spawn(async move {
        while let Some(line) = log_rx.recv().await {
            eprintln!("{line}");
        }
    });

    let wait = handle.wait();
    tokio::pin!(wait);
    let mut cancel_held = false;
    let report = loop {
        tokio::select! {
            report = &mut wait => break report,
            _ = orchestrator.cancel_after_staging(), if cancel_held => {
                cancel_held = false;
            }
            signal = tokio::signal::ctrl_c() => match signal {
                Ok(()) => match orchestrator.state() {
                    ConversionState::Staging => {
                        warn!("Interrupt received while staging; cancelling once the encoder starts");
                        cancel_held = true;
                    }
                    ConversionState::Running => {
                        warn!("Interrupt received, cancelling conversion");
                        orchestrator.cancel();
                    }
                    ConversionState::Idle { .. } => {}
                },
                Err(e) => {
                    warn!("Cannot listen for Ctrl-C: {}", e);
                    break (&mut wait).await;
                }
            },
        }
    };

    let _ = printer.await;

    if let Some(cleanup_error) = &report.cleanup_error {
        warn!("Temporary files were left behind: {}", cleanup_error);
    }

    Ok(match report.outcome {
        ConversionOutcome::Completed { output } => {
            info!("Exported: {}", output.display());
            ExitCode::SUCCESS
        }
        ConversionOutcome::Cancelled => {
            warn!("Conversion cancelled");
            ExitCode::from(130)
        }
        ConversionOutcome::Failed(reason) => {
            error!("Conversion failed: {}", reason);
            ExitCode::FAILURE
        }
    })
}

fn codec_help() -> String {
    format!(
        "MP4 codec passed to ffmpeg. Recommended: {}; any other encoder name ffmpeg knows is accepted",
        RECOMMENDED_CODECS.join(", ")
    )
}

/// Fold command-line flags into the loaded configuration
fn apply_overrides(config: &mut Config, cli: &Cli) -> Result<()> {
    if let Some(ffmpeg) = &cli.ffmpeg {
        config.encoder.executable = Some(ffmpeg.clone());
    }

    let defaults = &mut config.defaults;
    if let Some(format) = cli.format {
        defaults.format = format;
    }
    if let Some(fps) = cli.fps {
        defaults.frame_rate = fps;
    }
    if let Some(codec) = &cli.codec {
        defaults.codec = codec.clone();
    }
    if let Some(crf) = cli.crf {
        defaults.crf = crf;
    }
    if let Some(scale_width) = &cli.scale_width {
        defaults.scale_width = parse_scale_width(scale_width)?;
    }

    Ok(())
}

/// Build the ordered image list, skipping anything that cannot be added
fn collect_images(inputs: &[PathBuf]) -> ImageList {
    let mut images = ImageList::new();

    for input in inputs {
        if input.is_dir() {
            match images.add_folder(input) {
                Ok(count) => info!("Added {} images from {:?}", count, input),
                Err(e) => warn!("Skipping folder: {}", e),
            }
        } else if let Err(e) = images.add(input.clone()) {
            warn!("Skipping {:?}: {}", input, e);
        }
    }

    images
}
