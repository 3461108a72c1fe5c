use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::{
    config::Config,
    encoder::{
        render_command_line, resolve_encoder, CancelToken, CommandBuilder, ConversionOptions,
        DiagnosticSink, ProcessRunner, RunStatus,
    },
    error::{ConverterError, OptionError, Result, StageError},
    sequence::{ImageEntry, SequenceStager, StagedSequence},
};

/// Why a run did not produce its output
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FailureReason {
    /// Images could not be staged; the encoder was never started
    Staging(StageError),

    /// Options were rejected while building the encoder command
    InvalidOption(OptionError),

    /// The encoder ran and exited with a non-zero code
    ExitCode(i32),

    /// The encoder executable could not be started
    ExecutableMissing { executable: String, cause: String },

    /// The run was torn down unexpectedly
    Internal(String),
}

impl std::fmt::Display for FailureReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Staging(e) => write!(f, "{}", e),
            Self::InvalidOption(e) => write!(f, "{}", e),
            Self::ExitCode(code) => write!(f, "encoder exited with code {}", code),
            Self::ExecutableMissing { executable, cause } => write!(
                f,
                "encoder executable '{}' could not be started ({}); install ffmpeg or configure its path",
                executable, cause
            ),
            Self::Internal(reason) => write!(f, "conversion aborted: {}", reason),
        }
    }
}

/// Terminal result of one run
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConversionOutcome {
    Completed { output: PathBuf },
    Failed(FailureReason),
    Cancelled,
}

impl ConversionOutcome {
    pub fn is_completed(&self) -> bool {
        matches!(self, Self::Completed { .. })
    }
}

/// Where the orchestrator is in its lifecycle
///
/// `Idle` remembers how the previous run ended, if there was one.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConversionState {
    Idle { last_outcome: Option<ConversionOutcome> },
    Staging,
    Running,
}

impl Default for ConversionState {
    fn default() -> Self {
        Self::Idle { last_outcome: None }
    }
}

impl ConversionState {
    /// Staging or running
    pub fn is_active(&self) -> bool {
        !matches!(self, Self::Idle { .. })
    }
}

/// Everything the host needs to know about a finished run
#[derive(Debug, Clone)]
pub struct ConversionReport {
    /// Exactly one terminal outcome
    pub outcome: ConversionOutcome,

    /// Program and arguments that were launched; empty if staging failed
    pub argv: Vec<OsString>,

    /// Exit code when the encoder exited on its own
    pub exit_code: Option<i32>,

    /// Workspace removal problem, reported next to the outcome and never instead of it
    pub cleanup_error: Option<String>,
}

/// Handle to one in-flight conversion
pub struct RunHandle {
    token: CancelToken,
    state: Arc<watch::Sender<ConversionState>>,
    task: JoinHandle<ConversionReport>,
}

impl RunHandle {
    /// Request cancellation; ignored unless the encoder is running
    pub fn cancel(&self) {
        if *self.state.borrow() == ConversionState::Running {
            self.token.cancel();
        }
    }

    /// Wait for the run to reach its terminal state
    pub async fn wait(self) -> ConversionReport {
        match self.task.await {
            Ok(report) => report,
            Err(e) => ConversionReport {
                outcome: ConversionOutcome::Failed(FailureReason::Internal(e.to_string())),
                argv: Vec::new(),
                exit_code: None,
                cleanup_error: None,
            },
        }
    }
}

/// Shared bookkeeping between the orchestrator and its background run
#[derive(Clone)]
struct RunSlot {
    state: Arc<watch::Sender<ConversionState>>,
    token: Arc<Mutex<Option<CancelToken>>>,
}

impl RunSlot {
    fn set_token(&self, token: Option<CancelToken>) {
        let mut slot = self.token.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        *slot = token;
    }

    fn token(&self) -> Option<CancelToken> {
        self.token
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    fn finish(&self, outcome: ConversionOutcome) {
        self.set_token(None);
        self.state.send_replace(ConversionState::Idle {
            last_outcome: Some(outcome),
        });
    }
}

/// Returns the slot to `Idle` if a run is torn down before reporting
struct FinishGuard {
    slot: RunSlot,
    armed: bool,
}

impl Drop for FinishGuard {
    fn drop(&mut self) {
        if self.armed {
            warn!("Conversion task ended without reporting; resetting state");
            self.slot.finish(ConversionOutcome::Failed(FailureReason::Internal(
                "conversion task was aborted".to_string(),
            )));
        }
    }
}

/// Sequences staging, command building and the encoder run
///
/// At most one run is active at a time: `Idle -> Staging -> Running -> Idle`.
/// The staging workspace is removed before the state returns to `Idle`,
/// whatever the outcome.
pub struct ConversionOrchestrator {
    executable: PathBuf,
    stager: SequenceStager,
    runner: ProcessRunner,
    slot: RunSlot,
}

impl ConversionOrchestrator {
    /// Create an orchestrator driving the given encoder executable
    pub fn new<P: Into<PathBuf>>(executable: P) -> Self {
        let (state, _) = watch::channel(ConversionState::default());
        Self {
            executable: executable.into(),
            stager: SequenceStager::new(),
            runner: ProcessRunner::new(),
            slot: RunSlot {
                state: Arc::new(state),
                token: Arc::new(Mutex::new(None)),
            },
        }
    }

    /// Build an orchestrator from configuration, resolving the encoder executable
    pub fn from_config(config: &Config) -> Self {
        let executable = resolve_encoder(config.encoder.executable.as_deref());

        let mut stager = SequenceStager::new().with_prefix(config.staging.prefix.clone());
        if let Some(root) = &config.staging.temp_root {
            stager = stager.with_temp_root(root.clone());
        }

        Self::new(executable)
            .with_stager(stager)
            .with_runner(ProcessRunner::new().with_grace_period(config.encoder.grace_period()))
    }

    pub fn with_stager(mut self, stager: SequenceStager) -> Self {
        self.stager = stager;
        self
    }

    pub fn with_runner(mut self, runner: ProcessRunner) -> Self {
        self.runner = runner;
        self
    }

    pub fn executable(&self) -> &Path {
        &self.executable
    }

    /// Current lifecycle state
    pub fn state(&self) -> ConversionState {
        self.slot.state.borrow().clone()
    }

    /// Watch lifecycle transitions
    pub fn subscribe(&self) -> watch::Receiver<ConversionState> {
        self.slot.state.subscribe()
    }

    /// Request cancellation of the running encoder; a no-op in any other state
    pub fn cancel(&self) {
        if *self.slot.state.borrow() != ConversionState::Running {
            debug!("Cancel requested while not running; ignoring");
            return;
        }
        if let Some(token) = self.slot.token() {
            token.cancel();
        }
    }

    /// Cancel the run as soon as it leaves `Staging`
    ///
    /// Staging cannot be interrupted, so a request made while copying is held
    /// until the encoder starts. Returns immediately when no run is active.
    pub async fn cancel_after_staging(&self) {
        let mut states = self.subscribe();
        // The sender lives in `self`, so this cannot fail while we wait
        let _ = states
            .wait_for(|state| *state != ConversionState::Staging)
            .await;
        self.cancel();
    }

    /// Start converting `images` into `output`
    ///
    /// Input and option problems are reported here, before anything touches
    /// the filesystem. Staging, encoding and cleanup then run on a background
    /// task; diagnostic lines go to `sink` as they arrive. Must be called from
    /// within a Tokio runtime.
    pub fn start<S>(
        &self,
        images: &[ImageEntry],
        options: ConversionOptions,
        output: PathBuf,
        sink: S,
    ) -> Result<RunHandle>
    where
        S: DiagnosticSink + 'static,
    {
        if self.slot.state.borrow().is_active() {
            return Err(ConverterError::AlreadyRunning);
        }

        SequenceStager::check(images)?;
        options.validate()?;
        if output.as_os_str().is_empty() {
            return Err(OptionError::invalid("output", "", "an output path is required").into());
        }

        let accepted = self.slot.state.send_if_modified(|state| {
            if state.is_active() {
                false
            } else {
                *state = ConversionState::Staging;
                true
            }
        });
        if !accepted {
            return Err(ConverterError::AlreadyRunning);
        }

        let token = CancelToken::new();
        self.slot.set_token(Some(token.clone()));

        info!(
            "🎬 Starting {} conversion of {} images to {:?}",
            options.output_format(),
            images.len(),
            output
        );

        let run = Run {
            images: images.to_vec(),
            options,
            output,
            executable: self.executable.clone(),
            stager: self.stager.clone(),
            runner: self.runner.clone(),
            token: token.clone(),
            slot: self.slot.clone(),
        };
        let task = tokio::spawn(run.execute(sink));

        Ok(RunHandle {
            token,
            state: self.slot.state.clone(),
            task,
        })
    }
}

/// One conversion, owned by its background task
struct Run {
    images: Vec<ImageEntry>,
    options: ConversionOptions,
    output: PathBuf,
    executable: PathBuf,
    stager: SequenceStager,
    runner: ProcessRunner,
    token: CancelToken,
    slot: RunSlot,
}

impl Run {
    async fn execute<S: DiagnosticSink>(self, mut sink: S) -> ConversionReport {
        let mut guard = FinishGuard {
            slot: self.slot.clone(),
            armed: true,
        };

        let report = self.stage_and_encode(&mut sink).await;

        match &report.outcome {
            ConversionOutcome::Completed { output } => info!("🎉 Conversion complete: {:?}", output),
            ConversionOutcome::Cancelled => info!("Conversion cancelled"),
            ConversionOutcome::Failed(reason) => warn!("Conversion failed: {}", reason),
        }

        guard.armed = false;
        self.slot.finish(report.outcome.clone());
        report
    }

    async fn stage_and_encode<S: DiagnosticSink>(&self, sink: &mut S) -> ConversionReport {
        let staged = match self.stage().await {
            Ok(staged) => staged,
            Err(e) => {
                sink.line(format!("Staging failed: {}", e));
                return ConversionReport {
                    outcome: ConversionOutcome::Failed(FailureReason::Staging(e)),
                    argv: Vec::new(),
                    exit_code: None,
                    cleanup_error: None,
                };
            }
        };

        let (outcome, argv, exit_code) = self.encode(&staged, sink).await;
        let cleanup_error = Self::cleanup(staged, sink).await;

        ConversionReport {
            outcome,
            argv,
            exit_code,
            cleanup_error,
        }
    }

    async fn stage(&self) -> std::result::Result<StagedSequence, StageError> {
        let stager = self.stager.clone();
        let images = self.images.clone();

        tokio::task::spawn_blocking(move || stager.stage(&images))
            .await
            .unwrap_or_else(|e| {
                Err(StageError::WorkspaceFailed {
                    cause: format!("staging task failed: {}", e),
                })
            })
    }

    async fn encode<S: DiagnosticSink>(
        &self,
        staged: &StagedSequence,
        sink: &mut S,
    ) -> (ConversionOutcome, Vec<OsString>, Option<i32>) {
        let args = match CommandBuilder::build(staged.pattern(), &self.options, &self.output) {
            Ok(args) => args,
            Err(e) => {
                return (
                    ConversionOutcome::Failed(FailureReason::InvalidOption(e)),
                    Vec::new(),
                    None,
                )
            }
        };

        let mut argv = Vec::with_capacity(args.len() + 1);
        argv.push(self.executable.as_os_str().to_owned());
        argv.extend(args.iter().cloned());

        self.slot.state.send_replace(ConversionState::Running);

        let command_line = render_command_line(self.executable.as_os_str(), &args);
        debug!("Encoder command: {}", command_line);
        sink.line(format!("Running: {}", command_line));

        let status = self
            .runner
            .run(self.executable.as_os_str(), &args, sink, &self.token)
            .await;

        let (outcome, exit_code) = match status {
            RunStatus::Success => {
                sink.line("Finished successfully.".to_string());
                (
                    ConversionOutcome::Completed {
                        output: self.output.clone(),
                    },
                    Some(0),
                )
            }
            RunStatus::NonZeroExit { code } => {
                sink.line(format!("Encoder exited with code {}", code));
                (ConversionOutcome::Failed(FailureReason::ExitCode(code)), Some(code))
            }
            RunStatus::Cancelled => {
                sink.line("Encoder terminated by user.".to_string());
                (ConversionOutcome::Cancelled, None)
            }
            RunStatus::LaunchFailed { cause, .. } => {
                let executable = self.executable.display().to_string();
                sink.line(format!("Encoder executable not found or not startable: {}", executable));
                (
                    ConversionOutcome::Failed(FailureReason::ExecutableMissing { executable, cause }),
                    None,
                )
            }
        };

        (outcome, argv, exit_code)
    }

    async fn cleanup<S: DiagnosticSink>(staged: StagedSequence, sink: &mut S) -> Option<String> {
        let dir = staged.dir().to_path_buf();

        let result = tokio::task::spawn_blocking(move || staged.cleanup())
            .await
            .map_err(|e| e.to_string())
            .and_then(|removed| removed.map_err(|e| e.to_string()));

        match result {
            Ok(()) => None,
            Err(e) => {
                warn!("Failed to remove staging directory {:?}: {}", dir, e);
                sink.line(format!("Warning: could not remove temporary files in {}: {}", dir.display(), e));
                Some(e)
            }
        }
    }
}
