//! Sentinel-based command execution over an interactive shell channel.
//!
//! The shell protocol has no structured exit signaling on an
//! interactive channel, so completion is inferred from content: a
//! random sentinel is queued behind the command, and the read loop
//! stops at the first line equal to the bare sentinel. A line where the
//! shell echoes the queued sentinel back inside its own prompt means
//! the command text itself was rejected and never ran.

use std::sync::Arc;
use std::time::Duration;

use regex::Regex;
use tokio::time::{timeout, Instant};
use tracing::{debug, warn};
use uuid::Uuid;

use crate::error::{FlowError, Result};
use crate::ports::ChannelIo;

const SENTINEL_PREFIX: &str = "__TFLOW_DONE_";

/// One executable remote command. Cloned per attempt so retries never
/// mutate caller state.
#[derive(Debug, Clone)]
pub struct Command {
    pub text: String,
    /// Target system id, resolved against the configured system map
    pub system: String,
    pub timeout: Duration,
    /// Regex template with a `{sentinel}` placeholder for wrong-exit
    /// detection
    pub reject_template: String,
}

impl Command {
    #[must_use]
    pub fn new(text: impl Into<String>, system: impl Into<String>, timeout: Duration) -> Self {
        Self {
            text: text.into(),
            system: system.into(),
            timeout,
            reject_template: crate::config::CompletionConfig::default().reject_template,
        }
    }
}

/// Captured result of one sentinel run.
#[derive(Debug, Clone)]
pub struct CapturedOutput {
    /// All output lines preceding the sentinel, sentinel excluded
    pub lines: Vec<String>,
    pub duration: Duration,
}

/// Line-level verdict while scanning the output stream.
#[derive(Debug, PartialEq, Eq)]
pub enum ScanOutcome {
    /// Keep reading
    Continue,
    /// Bare sentinel seen, command finished
    Complete,
    /// Prompt-wrapped sentinel echo: the shell rejected the command
    Rejected(String),
}

/// Incremental scanner over the raw output stream. Pure and
/// synchronous, so the protocol rules are testable without a channel.
#[derive(Debug)]
pub struct SentinelScanner {
    sentinel: String,
    reject: Regex,
    buffer: String,
    lines: Vec<String>,
}

impl SentinelScanner {
    pub fn new(sentinel: &str, reject_template: &str) -> Result<Self> {
        let pattern = reject_template.replace("{sentinel}", &regex::escape(sentinel));
        let reject = Regex::new(&pattern).map_err(|e| FlowError::InvalidMarker {
            pattern: reject_template.to_string(),
            reason: e.to_string(),
        })?;
        Ok(Self {
            sentinel: sentinel.to_string(),
            reject,
            buffer: String::new(),
            lines: Vec::new(),
        })
    }

    /// Feeds a chunk of raw output. Stops consuming at the first
    /// terminal outcome; anything after the sentinel is discarded.
    pub fn push(&mut self, chunk: &str) -> ScanOutcome {
        self.buffer.push_str(chunk);

        while let Some(pos) = self.buffer.find('\n') {
            let line: String = self.buffer.drain(..=pos).collect();
            let line = line.trim_end_matches(['\n', '\r']);

            if line.trim() == self.sentinel {
                return ScanOutcome::Complete;
            }
            if self.reject.is_match(line) {
                return ScanOutcome::Rejected(line.to_string());
            }
            self.lines.push(line.to_string());
        }

        ScanOutcome::Continue
    }

    /// Captured lines so far; the sentinel line is never included.
    #[must_use]
    pub fn into_lines(self) -> Vec<String> {
        self.lines
    }
}

/// Content-specific pre-processing applied to the command text before
/// the sentinel echo is queued.
pub trait CommandPatch: Send + Sync {
    fn apply(&self, text: &str) -> String;
}

/// Privilege-escalation commands of the form `su - user -c "..."` are
/// sometimes authored without the trailing quote; the shell would then
/// swallow the sentinel echo into the open string. Balance the quote
/// before queuing.
pub struct EscalationQuotePatch;

impl CommandPatch for EscalationQuotePatch {
    fn apply(&self, text: &str) -> String {
        let escalates = text.trim_start().starts_with("su ") || text.contains(" su ");
        if escalates && text.matches('"').count() % 2 == 1 {
            let mut patched = text.to_string();
            patched.push('"');
            return patched;
        }
        text.to_string()
    }
}

/// Drives the sentinel protocol over one channel.
pub struct ShellRunner {
    patches: Vec<Arc<dyn CommandPatch>>,
}

impl Default for ShellRunner {
    fn default() -> Self {
        Self {
            patches: vec![Arc::new(EscalationQuotePatch)],
        }
    }
}

impl ShellRunner {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_patch(mut self, patch: Arc<dyn CommandPatch>) -> Self {
        self.patches.push(patch);
        self
    }

    /// Runs a command with a fresh random sentinel.
    pub async fn run<Io: ChannelIo + ?Sized>(
        &self,
        io: &mut Io,
        host: &str,
        routing_prefix: Option<&str>,
        command: &Command,
    ) -> Result<CapturedOutput> {
        let sentinel = format!("{SENTINEL_PREFIX}{}", Uuid::new_v4().simple());
        self.run_with_sentinel(io, host, routing_prefix, command, &sentinel)
            .await
    }

    /// Protocol body with an explicit sentinel, used directly by tests.
    pub async fn run_with_sentinel<Io: ChannelIo + ?Sized>(
        &self,
        io: &mut Io,
        host: &str,
        routing_prefix: Option<&str>,
        command: &Command,
        sentinel: &str,
    ) -> Result<CapturedOutput> {
        let started = Instant::now();
        let mut scanner = SentinelScanner::new(sentinel, &command.reject_template)?;

        let mut text = command.text.clone();
        for patch in &self.patches {
            text = patch.apply(&text);
        }

        let mut script = String::new();
        if let Some(prefix) = routing_prefix {
            script.push_str(prefix);
            script.push('\n');
        }
        script.push_str(&text);
        script.push('\n');
        script.push_str("echo ");
        script.push_str(sentinel);
        script.push('\n');
        script.push_str("exit\n");

        debug!(host = %host, bytes = script.len(), "sending command script");
        io.send(script.as_bytes()).await?;

        let read_result = timeout(command.timeout, async {
            loop {
                match io.next_chunk().await? {
                    Some(chunk) => {
                        match scanner.push(&String::from_utf8_lossy(&chunk)) {
                            ScanOutcome::Continue => {}
                            ScanOutcome::Complete => return Ok(()),
                            ScanOutcome::Rejected(line) => {
                                return Err(FlowError::WrongExit {
                                    host: host.to_string(),
                                    line,
                                });
                            }
                        }
                    }
                    None => {
                        return Err(FlowError::ChannelClosed {
                            host: host.to_string(),
                        });
                    }
                }
            }
        })
        .await;

        match read_result {
            Ok(Ok(())) => {
                let duration = started.elapsed();
                debug!(host = %host, duration_ms = duration.as_millis(), "command completed");
                Ok(CapturedOutput {
                    lines: scanner.into_lines(),
                    duration,
                })
            }
            Ok(Err(e)) => {
                io.interrupt().await;
                Err(e)
            }
            Err(_) => {
                // Watchdog expiry: interrupt the remote side and close
                // the channel; the caller sees a distinct timeout error.
                warn!(
                    host = %host,
                    timeout_s = command.timeout.as_secs(),
                    "command watchdog expired"
                );
                io.interrupt().await;
                Err(FlowError::Timeout {
                    host: host.to_string(),
                    seconds: command.timeout.as_secs(),
                })
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ports::channel::mock::{FakeChannel, FakeEvent};

    const SENTINEL: &str = "__TFLOW_DONE_abc123";

    fn command(timeout_s: u64) -> Command {
        Command::new("ls /data", "app", Duration::from_secs(timeout_s))
    }

    fn scanner() -> SentinelScanner {
        SentinelScanner::new(SENTINEL, &command(5).reject_template).unwrap()
    }

    // ============== SentinelScanner ==============

    #[test]
    fn test_scanner_completes_on_bare_sentinel() {
        let mut s = scanner();
        assert_eq!(s.push("one\ntwo\n"), ScanOutcome::Continue);
        assert_eq!(s.push(&format!("{SENTINEL}\n")), ScanOutcome::Complete);
        assert_eq!(s.into_lines(), vec!["one", "two"]);
    }

    #[test]
    fn test_scanner_excludes_sentinel_from_capture() {
        let mut s = scanner();
        assert_eq!(
            s.push(&format!("only line\n{SENTINEL}\ntrailing junk\n")),
            ScanOutcome::Complete
        );
        assert_eq!(s.into_lines(), vec!["only line"]);
    }

    #[test]
    fn test_scanner_rejects_prompt_wrapped_echo() {
        let mut s = scanner();
        let outcome = s.push(&format!("app01:~ $ echo {SENTINEL}\n"));
        match outcome {
            ScanOutcome::Rejected(line) => assert!(line.contains(SENTINEL)),
            other => panic!("expected rejection, got {other:?}"),
        }
    }

    #[test]
    fn test_scanner_rejects_hash_prompt() {
        let mut s = scanner();
        assert!(matches!(
            s.push(&format!("root# {SENTINEL}\n")),
            ScanOutcome::Rejected(_)
        ));
    }

    #[test]
    fn test_scanner_rejection_before_bare_sentinel_wins() {
        let mut s = scanner();
        let outcome = s.push(&format!("$ echo {SENTINEL}\n{SENTINEL}\n"));
        assert!(matches!(outcome, ScanOutcome::Rejected(_)));
    }

    #[test]
    fn test_scanner_handles_split_chunks() {
        let mut s = scanner();
        let (head, tail) = SENTINEL.split_at(7);
        assert_eq!(s.push("partial out"), ScanOutcome::Continue);
        assert_eq!(s.push("put line\n"), ScanOutcome::Continue);
        assert_eq!(s.push(head), ScanOutcome::Continue);
        assert_eq!(s.push(&format!("{tail}\n")), ScanOutcome::Complete);
        assert_eq!(s.into_lines(), vec!["partial output line"]);
    }

    #[test]
    fn test_scanner_strips_carriage_returns() {
        let mut s = scanner();
        assert_eq!(s.push("pty line\r\n"), ScanOutcome::Continue);
        assert_eq!(s.push(&format!("{SENTINEL}\r\n")), ScanOutcome::Complete);
        assert_eq!(s.into_lines(), vec!["pty line"]);
    }

    #[test]
    fn test_scanner_sentinel_with_whitespace_completes() {
        let mut s = scanner();
        assert_eq!(s.push(&format!("  {SENTINEL}  \n")), ScanOutcome::Complete);
    }

    #[test]
    fn test_scanner_custom_reject_template() {
        let mut s = SentinelScanner::new(SENTINEL, r"PS1>\s*{sentinel}").unwrap();
        assert!(matches!(
            s.push(&format!("PS1> {SENTINEL}x\n")),
            ScanOutcome::Rejected(_)
        ));
        // Default prompt shapes no longer trigger rejection.
        let mut s = SentinelScanner::new(SENTINEL, r"PS1>\s*{sentinel}").unwrap();
        assert_eq!(s.push(&format!("$ echo {SENTINEL}x\n")), ScanOutcome::Continue);
    }

    #[test]
    fn test_scanner_bad_template_rejected() {
        let err = SentinelScanner::new(SENTINEL, "[broken{sentinel}").unwrap_err();
        assert!(matches!(err, FlowError::InvalidMarker { .. }));
    }

    // ============== EscalationQuotePatch ==============

    #[test]
    fn test_patch_appends_missing_quote() {
        let patch = EscalationQuotePatch;
        assert_eq!(
            patch.apply(r#"su - appuser -c "restart.sh"#),
            r#"su - appuser -c "restart.sh""#
        );
    }

    #[test]
    fn test_patch_leaves_balanced_command_alone() {
        let patch = EscalationQuotePatch;
        assert_eq!(
            patch.apply(r#"su - appuser -c "restart.sh""#),
            r#"su - appuser -c "restart.sh""#
        );
    }

    #[test]
    fn test_patch_ignores_non_escalation() {
        let patch = EscalationQuotePatch;
        assert_eq!(patch.apply(r#"echo "unbalanced"#), r#"echo "unbalanced"#);
    }

    // ============== ShellRunner ==============

    #[tokio::test]
    async fn test_run_returns_lines_before_sentinel() {
        let runner = ShellRunner::new();
        let mut io = FakeChannel::completing(&["file-a", "file-b"], SENTINEL);

        let output = runner
            .run_with_sentinel(&mut io, "app01", None, &command(5), SENTINEL)
            .await
            .unwrap();

        assert_eq!(output.lines, vec!["file-a", "file-b"]);
        let sent = io.sent_text();
        assert!(sent.contains("ls /data\n"));
        assert!(sent.contains(&format!("echo {SENTINEL}\n")));
        assert!(sent.ends_with("exit\n"));
    }

    #[tokio::test]
    async fn test_run_prepends_routing_prefix() {
        let runner = ShellRunner::new();
        let mut io = FakeChannel::completing(&[], SENTINEL);

        runner
            .run_with_sentinel(&mut io, "app01", Some("ssh hop01"), &command(5), SENTINEL)
            .await
            .unwrap();

        assert!(io.sent_text().starts_with("ssh hop01\n"));
    }

    #[tokio::test]
    async fn test_run_wrong_exit() {
        let runner = ShellRunner::new();
        let mut io = FakeChannel::new(vec![FakeEvent::Chunk(
            format!("app01:~ $ echo {SENTINEL}\n").into_bytes(),
        )]);

        let err = runner
            .run_with_sentinel(&mut io, "app01", None, &command(5), SENTINEL)
            .await
            .unwrap_err();

        assert!(matches!(err, FlowError::WrongExit { .. }));
        assert!(io.interrupted);
    }

    #[tokio::test]
    async fn test_run_channel_closed_before_sentinel() {
        let runner = ShellRunner::new();
        let mut io = FakeChannel::new(vec![
            FakeEvent::Chunk(b"some output\n".to_vec()),
            FakeEvent::Eof,
        ]);

        let err = runner
            .run_with_sentinel(&mut io, "app01", None, &command(5), SENTINEL)
            .await
            .unwrap_err();

        assert!(matches!(err, FlowError::ChannelClosed { .. }));
    }

    #[tokio::test(start_paused = true)]
    async fn test_run_watchdog_timeout() {
        let runner = ShellRunner::new();
        let mut io = FakeChannel::new(vec![
            FakeEvent::Chunk(b"still working\n".to_vec()),
            FakeEvent::Hang,
        ]);

        let started = Instant::now();
        let err = runner
            .run_with_sentinel(&mut io, "app01", None, &command(2), SENTINEL)
            .await
            .unwrap_err();

        match err {
            FlowError::Timeout { seconds, .. } => assert_eq!(seconds, 2),
            other => panic!("expected timeout, got {other}"),
        }
        assert!(io.interrupted);
        assert!(started.elapsed() >= Duration::from_secs(2));
    }

    #[tokio::test(start_paused = true)]
    async fn test_run_slow_output_completes_before_watchdog() {
        let runner = ShellRunner::new();
        let mut io = FakeChannel::new(vec![
            FakeEvent::Chunk(b"phase one\n".to_vec()),
            FakeEvent::Delay(Duration::from_secs(3)),
            FakeEvent::Chunk(format!("phase two\n{SENTINEL}\n").into_bytes()),
        ]);

        let output = runner
            .run_with_sentinel(&mut io, "app01", None, &command(10), SENTINEL)
            .await
            .unwrap();

        assert_eq!(output.lines, vec!["phase one", "phase two"]);
        assert!(!io.interrupted);
    }

    #[tokio::test]
    async fn test_run_random_sentinels_differ() {
        // Two runs must never share a completion marker.
        let a = format!("{SENTINEL_PREFIX}{}", Uuid::new_v4().simple());
        let b = format!("{SENTINEL_PREFIX}{}", Uuid::new_v4().simple());
        assert_ne!(a, b);
    }
}
