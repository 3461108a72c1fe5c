use std::ffi::{OsStr, OsString};
use std::process::{ExitStatus, Stdio};
use std::sync::Arc;
use std::time::Duration;

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWriteExt};
use tokio::process::{Child, ChildStdin, Command};
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::timeout;
use tracing::{debug, info, warn};

/// Default time a cancelled encoder gets to quit on its own before it is killed
pub const DEFAULT_GRACE_PERIOD: Duration = Duration::from_secs(3);

/// Interactive quit command understood by ffmpeg on its standard input
const QUIT_COMMAND: &[u8] = b"q";

const READ_CHUNK: usize = 8 * 1024;

/// Receives encoder diagnostic lines in the order they were written
pub trait DiagnosticSink: Send {
    fn line(&mut self, line: String);
}

impl DiagnosticSink for mpsc::UnboundedSender<String> {
    fn line(&mut self, line: String) {
        // A host that stopped listening must not stall the encoder
        let _ = self.send(line);
    }
}

impl DiagnosticSink for Vec<String> {
    fn line(&mut self, line: String) {
        self.push(line);
    }
}

impl<S: DiagnosticSink + ?Sized> DiagnosticSink for Box<S> {
    fn line(&mut self, line: String) {
        (**self).line(line);
    }
}

impl<S: DiagnosticSink + ?Sized> DiagnosticSink for &mut S {
    fn line(&mut self, line: String) {
        (**self).line(line);
    }
}

/// Re-emits every diagnostic line as a `tracing` event under target `encoder`
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingSink;

impl DiagnosticSink for TracingSink {
    fn line(&mut self, line: String) {
        debug!(target: "encoder", "{}", line);
    }
}

/// Cooperative cancellation flag shared between a run and its controllers
///
/// Cloning yields another handle to the same flag. Cancelling is idempotent.
#[derive(Debug, Clone)]
pub struct CancelToken {
    flag: Arc<watch::Sender<bool>>,
}

impl Default for CancelToken {
    fn default() -> Self {
        Self::new()
    }
}

impl CancelToken {
    pub fn new() -> Self {
        let (flag, _) = watch::channel(false);
        Self {
            flag: Arc::new(flag),
        }
    }

    /// Request cancellation
    pub fn cancel(&self) {
        self.flag.send_replace(true);
    }

    pub fn is_cancelled(&self) -> bool {
        *self.flag.borrow()
    }

    /// Resolves once [`CancelToken::cancel`] has been called on any clone
    pub async fn cancelled(&self) {
        let mut rx = self.flag.subscribe();
        // The sender lives in `self`, so this cannot fail while we wait
        let _ = rx.wait_for(|cancelled| *cancelled).await;
    }
}

/// How an encoder invocation ended
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunStatus {
    /// Exit code 0
    Success,

    /// The process ran and failed; `-1` when no code was reported (killed by a signal)
    NonZeroExit { code: i32 },

    /// Terminated because cancellation was requested
    Cancelled,

    /// The executable could not be started at all
    LaunchFailed { cause: String, not_found: bool },
}

impl RunStatus {
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success)
    }
}

/// Splits a byte stream into lines on `\n`, `\r` or `\r\n`
///
/// Bytes are decoded lossily and blank lines are dropped, which also
/// swallows the empty piece between `\r` and `\n`.
#[derive(Debug, Default)]
pub(crate) struct LineSplitter {
    pending: Vec<u8>,
}

impl LineSplitter {
    pub(crate) fn push(&mut self, chunk: &[u8], out: &mut Vec<String>) {
        for &byte in chunk {
            if byte == b'\n' || byte == b'\r' {
                self.flush(out);
            } else {
                self.pending.push(byte);
            }
        }
    }

    pub(crate) fn finish(mut self, out: &mut Vec<String>) {
        self.flush(out);
    }

    fn flush(&mut self, out: &mut Vec<String>) {
        if !self.pending.is_empty() {
            out.push(String::from_utf8_lossy(&self.pending).into_owned());
            self.pending.clear();
        }
    }
}

/// Drain `reader` into `lines` until end of stream
///
/// Keeps reading even after the receiver is gone so the child never blocks
/// on a full pipe.
async fn pump_lines<R>(mut reader: R, lines: mpsc::UnboundedSender<String>)
where
    R: AsyncRead + Unpin,
{
    let mut buf = vec![0u8; READ_CHUNK];
    let mut splitter = LineSplitter::default();
    let mut ready = Vec::new();

    loop {
        match reader.read(&mut buf).await {
            Ok(0) => break,
            Ok(n) => {
                splitter.push(&buf[..n], &mut ready);
                for line in ready.drain(..) {
                    let _ = lines.send(line);
                }
            }
            Err(e) if e.kind() == std::io::ErrorKind::Interrupted => continue,
            Err(e) => {
                warn!("Failed to read encoder output: {}", e);
                break;
            }
        }
    }

    splitter.finish(&mut ready);
    for line in ready {
        let _ = lines.send(line);
    }
}

fn abandon_reader(reader: Option<JoinHandle<()>>) {
    if let Some(reader) = reader {
        reader.abort();
    }
}

/// Runs the encoder as a child process and streams its diagnostics
#[derive(Debug, Clone)]
pub struct ProcessRunner {
    grace_period: Duration,
}

impl Default for ProcessRunner {
    fn default() -> Self {
        Self {
            grace_period: DEFAULT_GRACE_PERIOD,
        }
    }
}

impl ProcessRunner {
    pub fn new() -> Self {
        Self::default()
    }

    /// How long a cancelled encoder may take to exit before it is killed
    pub fn with_grace_period(mut self, grace_period: Duration) -> Self {
        self.grace_period = grace_period;
        self
    }

    pub fn grace_period(&self) -> Duration {
        self.grace_period
    }

    /// Run `program args...`, forwarding each diagnostic line to `sink`
    ///
    /// The diagnostic stream is read on its own task, so a slow sink never
    /// stalls the child. Cancelling `cancel` while the process is alive asks
    /// it to quit, kills it after the grace period, and yields
    /// [`RunStatus::Cancelled`].
    pub async fn run<S>(
        &self,
        program: &OsStr,
        args: &[OsString],
        sink: &mut S,
        cancel: &CancelToken,
    ) -> RunStatus
    where
        S: DiagnosticSink + ?Sized,
    {
        if cancel.is_cancelled() {
            return RunStatus::Cancelled;
        }

        let mut command = Command::new(program);
        command
            .args(args)
            .stdin(Stdio::piped())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let mut child = match command.spawn() {
            Ok(child) => child,
            Err(e) => {
                warn!("Failed to start encoder {:?}: {}", program, e);
                return RunStatus::LaunchFailed {
                    not_found: e.kind() == std::io::ErrorKind::NotFound,
                    cause: e.to_string(),
                };
            }
        };

        debug!("Encoder started (pid {:?})", child.id());

        let mut stdin = child.stdin.take();
        let (line_tx, mut line_rx) = mpsc::unbounded_channel();
        let reader = child
            .stderr
            .take()
            .map(|stderr| tokio::spawn(pump_lines(stderr, line_tx)));

        let mut lines_open = true;
        let exit = loop {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => break None,
                line = line_rx.recv(), if lines_open => match line {
                    Some(line) => sink.line(line),
                    None => lines_open = false,
                },
                status = child.wait() => break Some(status),
            }
        };

        match exit {
            Some(status) => {
                // Something the encoder spawned may still hold the pipe open
                loop {
                    tokio::select! {
                        biased;
                        _ = cancel.cancelled() => {
                            info!("Cancelled while draining encoder output");
                            abandon_reader(reader);
                            return RunStatus::Cancelled;
                        }
                        line = timeout(self.grace_period, line_rx.recv()) => match line {
                            Ok(Some(line)) => sink.line(line),
                            Ok(None) => break,
                            Err(_) => {
                                warn!("Encoder output still open after exit; abandoning reader");
                                abandon_reader(reader);
                                break;
                            }
                        },
                    }
                }
                Self::map_exit(status)
            }
            None => {
                info!("Cancelling encoder");
                if let Err(e) = self.terminate(&mut child, stdin.take()).await {
                    warn!("Failed to terminate encoder: {}", e);
                }

                let drained = timeout(self.grace_period, async {
                    while let Some(line) = line_rx.recv().await {
                        sink.line(line);
                    }
                })
                .await;

                if drained.is_err() {
                    warn!("Encoder output still open after termination; abandoning reader");
                    abandon_reader(reader);
                }

                RunStatus::Cancelled
            }
        }
    }

    /// Ask politely, then kill
    async fn terminate(
        &self,
        child: &mut Child,
        stdin: Option<ChildStdin>,
    ) -> std::io::Result<ExitStatus> {
        if let Some(mut stdin) = stdin {
            if let Err(e) = stdin.write_all(QUIT_COMMAND).await {
                debug!("Could not send quit command to encoder: {}", e);
            }
            let _ = stdin.flush().await;
        }

        match timeout(self.grace_period, child.wait()).await {
            Ok(status) => status,
            Err(_) => {
                warn!(
                    "Encoder did not exit within {:?} of the quit request; killing it",
                    self.grace_period
                );
                child.kill().await?;
                child.wait().await
            }
        }
    }

    fn map_exit(status: std::io::Result<ExitStatus>) -> RunStatus {
        match status {
            Ok(status) if status.success() => RunStatus::Success,
            Ok(status) => RunStatus::NonZeroExit {
                code: status.code().unwrap_or(-1),
            },
            Err(e) => {
                warn!("Failed to wait for encoder: {}", e);
                RunStatus::NonZeroExit { code: -1 }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn split(chunks: &[&[u8]]) -> Vec<String> {
        let mut splitter = LineSplitter::default();
        let mut out = Vec::new();
        for chunk in chunks {
            splitter.push(chunk, &mut out);
        }
        splitter.finish(&mut out);
        out
    }

    #[test]
    fn test_splits_on_all_line_endings() {
        assert_eq!(
            split(&[b"one\ntwo\r\nthree\rfour"]),
            vec!["one", "two", "three", "four"]
        );
    }

    #[test]
    fn test_lines_span_chunks() {
        assert_eq!(split(&[b"fra", b"me=1\r", b"\nframe=2\n"]), vec!["frame=1", "frame=2"]);
    }

    #[test]
    fn test_invalid_utf8_is_replaced() {
        let lines = split(&[b"bad \xff byte\n"]);
        assert_eq!(lines.len(), 1);
        assert!(lines[0].starts_with("bad "));
        assert!(lines[0].contains('\u{FFFD}'));
    }

    #[test]
    fn test_cancel_token_is_shared_and_idempotent() {
        let token = CancelToken::new();
        let clone = token.clone();
        assert!(!clone.is_cancelled());

        token.cancel();
        token.cancel();
        assert!(clone.is_cancelled());
    }

    #[tokio::test]
    async fn test_cancelled_resolves_after_cancel() {
        let token = CancelToken::new();
        let waiter = {
            let token = token.clone();
            tokio::spawn(async move { token.cancelled().await })
        };

        token.cancel();
        timeout(Duration::from_secs(5), waiter).await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn test_missing_executable() {
        let mut lines: Vec<String> = Vec::new();
        let status = ProcessRunner::new()
            .run(
                OsStr::new("imgseq-definitely-not-an-encoder"),
                &[],
                &mut lines,
                &CancelToken::new(),
            )
            .await;

        match status {
            RunStatus::LaunchFailed { not_found, .. } => assert!(not_found),
            other => panic!("unexpected status: {other:?}"),
        }
        assert!(lines.is_empty());
    }

    #[tokio::test]
    async fn test_pre_cancelled_token_skips_launch() {
        let token = CancelToken::new();
        token.cancel();

        let mut lines: Vec<String> = Vec::new();
        let status = ProcessRunner::new()
            .run(OsStr::new("imgseq-definitely-not-an-encoder"), &[], &mut lines, &token)
            .await;
        assert_eq!(status, RunStatus::Cancelled);
    }

    #[cfg(unix)]
    mod process {
        use super::*;

        fn sh(script: &str) -> Vec<OsString> {
            vec!["-c".into(), script.into()]
        }

        #[tokio::test]
        async fn test_streams_lines_in_order() {
            let mut lines: Vec<String> = Vec::new();
            let status = ProcessRunner::new()
                .run(
                    OsStr::new("sh"),
                    &sh("for i in 1 2 3; do echo \"frame=$i\" >&2; done; printf 'done\\r' >&2"),
                    &mut lines,
                    &CancelToken::new(),
                )
                .await;

            assert_eq!(status, RunStatus::Success);
            assert_eq!(lines, vec!["frame=1", "frame=2", "frame=3", "done"]);
        }

        #[tokio::test]
        async fn test_non_zero_exit() {
            let mut lines: Vec<String> = Vec::new();
            let status = ProcessRunner::new()
                .run(
                    OsStr::new("sh"),
                    &sh("echo 'Invalid argument' >&2; exit 3"),
                    &mut lines,
                    &CancelToken::new(),
                )
                .await;

            assert_eq!(status, RunStatus::NonZeroExit { code: 3 });
            assert_eq!(lines, vec!["Invalid argument"]);
        }

        #[tokio::test]
        async fn test_stdout_is_not_captured() {
            let mut lines: Vec<String> = Vec::new();
            let status = ProcessRunner::new()
                .run(
                    OsStr::new("sh"),
                    &sh("echo to-stdout; echo to-stderr >&2"),
                    &mut lines,
                    &CancelToken::new(),
                )
                .await;

            assert!(status.is_success());
            assert_eq!(lines, vec!["to-stderr"]);
        }

        #[tokio::test]
        async fn test_large_output_does_not_stall() {
            let mut lines: Vec<String> = Vec::new();
            let status = ProcessRunner::new()
                .run(
                    OsStr::new("sh"),
                    &sh("i=0; while [ $i -lt 5000 ]; do echo \"line $i with some padding text\" >&2; i=$((i+1)); done"),
                    &mut lines,
                    &CancelToken::new(),
                )
                .await;

            assert!(status.is_success());
            assert_eq!(lines.len(), 5000);
            assert_eq!(lines[4999], "line 4999 with some padding text");
        }

        #[tokio::test]
        async fn test_cancel_kills_unresponsive_process() {
            let token = CancelToken::new();
            let runner = ProcessRunner::new().with_grace_period(Duration::from_millis(200));

            let canceller = {
                let token = token.clone();
                tokio::spawn(async move {
                    tokio::time::sleep(Duration::from_millis(200)).await;
                    token.cancel();
                })
            };

            let mut lines: Vec<String> = Vec::new();
            let status = timeout(
                Duration::from_secs(10),
                runner.run(
                    OsStr::new("sh"),
                    &sh("echo started >&2; exec sleep 30"),
                    &mut lines,
                    &token,
                ),
            )
            .await
            .expect("cancelled run should finish promptly");

            canceller.await.unwrap();
            assert_eq!(status, RunStatus::Cancelled);
            assert_eq!(lines, vec!["started"]);
        }

        #[tokio::test]
        async fn test_cancel_honours_quit_command() {
            let token = CancelToken::new();
            let runner = ProcessRunner::new().with_grace_period(Duration::from_secs(5));

            let canceller = {
                let token = token.clone();
                tokio::spawn(async move {
                    tokio::time::sleep(Duration::from_millis(200)).await;
                    token.cancel();
                })
            };

            // Exits as soon as a byte arrives on stdin
            let mut lines: Vec<String> = Vec::new();
            let started = std::time::Instant::now();
            let status = runner
                .run(
                    OsStr::new("sh"),
                    &sh("head -c 1 >/dev/null; echo quitting >&2"),
                    &mut lines,
                    &token,
                )
                .await;

            canceller.await.unwrap();
            assert_eq!(status, RunStatus::Cancelled);
            assert!(started.elapsed() < Duration::from_secs(5));
            assert_eq!(lines, vec!["quitting"]);
        }

        #[tokio::test]
        async fn test_exit_with_inherited_stderr_does_not_hang() {
            let runner = ProcessRunner::new().with_grace_period(Duration::from_millis(200));

            let mut lines: Vec<String> = Vec::new();
            let status = timeout(
                Duration::from_secs(10),
                runner.run(
                    OsStr::new("sh"),
                    &sh("sleep 20 >&2 & echo bye >&2; exit 0"),
                    &mut lines,
                    &CancelToken::new(),
                ),
            )
            .await
            .expect("run should return once the encoder has exited");

            assert_eq!(status, RunStatus::Success);
            assert_eq!(lines, vec!["bye"]);
        }

        #[tokio::test]
        async fn test_cancel_while_output_held_open() {
            let token = CancelToken::new();
            let runner = ProcessRunner::new().with_grace_period(Duration::from_secs(60));

            let canceller = {
                let token = token.clone();
                tokio::spawn(async move {
                    tokio::time::sleep(Duration::from_millis(300)).await;
                    token.cancel();
                })
            };

            let mut lines: Vec<String> = Vec::new();
            let status = timeout(
                Duration::from_secs(10),
                runner.run(
                    OsStr::new("sh"),
                    &sh("sleep 20 >&2 & echo bye >&2; exit 0"),
                    &mut lines,
                    &token,
                ),
            )
            .await
            .expect("cancel should unblock the reader");

            canceller.await.unwrap();
            assert_eq!(status, RunStatus::Cancelled);
            assert_eq!(lines, vec!["bye"]);
        }

        #[tokio::test]
        async fn test_cancel_after_exit_is_noop() {
            let token = CancelToken::new();
            let mut lines: Vec<String> = Vec::new();
            let status = ProcessRunner::new()
                .run(OsStr::new("sh"), &sh("exit 0"), &mut lines, &token)
                .await;

            token.cancel();
            assert_eq!(status, RunStatus::Success);
        }
    }
}
