//! Subprocess runner for the external media binaries.
//!
//! The runner is stateless beyond the remembered binary paths; callers
//! compose the full argument lists (filter graphs included). Progress
//! arrives on stderr, which is streamed into a rolling tail buffer so a
//! failing invocation can surface its last few kilobytes of diagnostics.

use std::path::{Path, PathBuf};
use std::process::Stdio;

use tokio::io::{AsyncBufReadExt, AsyncReadExt, BufReader};
use tokio::process::Command;
use tokio_util::sync::CancellationToken;

use cf_domain::config::Config;
use cf_domain::error::{Error, Result};

/// How much trailing stderr is kept for error reporting.
const STDERR_TAIL_BYTES: usize = 4096;

#[derive(Debug, Clone)]
pub struct MediaRunner {
    ffmpeg: PathBuf,
    ffprobe: PathBuf,
}

impl MediaRunner {
    pub fn new(ffmpeg: impl Into<PathBuf>, ffprobe: impl Into<PathBuf>) -> Self {
        Self {
            ffmpeg: ffmpeg.into(),
            ffprobe: ffprobe.into(),
        }
    }

    pub fn from_config(config: &Config) -> Self {
        Self::new(&config.ffmpeg_path, &config.ffprobe_path)
    }

    /// Run ffmpeg to completion. `-hide_banner -y` are always prepended;
    /// overwrite safety comes from staged outputs, not from ffmpeg itself.
    pub async fn execute(&self, cancel: &CancellationToken, args: &[&str]) -> Result<()> {
        let ffmpeg = self.ffmpeg.clone();
        self.run(&ffmpeg, cancel, args, false).await.map(drop)
    }

    /// Run ffmpeg and return captured stdout (used by stat filters that
    /// print measurements).
    pub async fn execute_capturing_output(
        &self,
        cancel: &CancellationToken,
        args: &[&str],
    ) -> Result<String> {
        let ffmpeg = self.ffmpeg.clone();
        self.run(&ffmpeg, cancel, args, true).await
    }

    /// Run ffprobe and return captured stdout.
    pub async fn probe(&self, cancel: &CancellationToken, args: &[&str]) -> Result<String> {
        let ffprobe = self.ffprobe.clone();
        let mut cmd = Command::new(&ffprobe);
        cmd.args(args);
        self.spawn_and_wait(&ffprobe, cmd, cancel, true).await
    }

    async fn run(
        &self,
        program: &Path,
        cancel: &CancellationToken,
        args: &[&str],
        capture_stdout: bool,
    ) -> Result<String> {
        let mut cmd = Command::new(program);
        cmd.arg("-hide_banner").arg("-y").args(args);
        self.spawn_and_wait(program, cmd, cancel, capture_stdout).await
    }

    async fn spawn_and_wait(
        &self,
        program: &Path,
        mut cmd: Command,
        cancel: &CancellationToken,
        capture_stdout: bool,
    ) -> Result<String> {
        cmd.stdin(Stdio::null())
            .stderr(Stdio::piped())
            .stdout(if capture_stdout {
                Stdio::piped()
            } else {
                Stdio::null()
            })
            .kill_on_drop(true);

        tracing::debug!(command = ?cmd.as_std(), "spawning media subprocess");

        let mut child = cmd.spawn().map_err(|e| Error::FileNotAccessible {
            path: program.to_path_buf(),
            reason: format!("failed to spawn: {e}"),
        })?;

        // Stream stderr into a rolling tail so progress lines are traced and
        // the last few KiB are available on failure.
        let stderr = child.stderr.take();
        let stderr_task = tokio::spawn(async move {
            let mut tail = TailBuffer::new(STDERR_TAIL_BYTES);
            if let Some(stderr) = stderr {
                let mut lines = BufReader::new(stderr).lines();
                while let Ok(Some(line)) = lines.next_line().await {
                    tracing::trace!(target: "cf_media::stderr", "{line}");
                    tail.push(&line);
                    tail.push("\n");
                }
            }
            tail.into_string()
        });

        let stdout = child.stdout.take();
        let stdout_task = tokio::spawn(async move {
            let mut out = String::new();
            if let Some(mut stdout) = stdout {
                let _ = stdout.read_to_string(&mut out).await;
            }
            out
        });

        let status = tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                let _ = child.start_kill();
                let _ = child.wait().await;
                return Err(Error::Cancelled);
            }
            status = child.wait() => status?,
        };

        let stderr_tail = stderr_task.await.unwrap_or_default();
        let stdout_text = stdout_task.await.unwrap_or_default();

        if !status.success() {
            return Err(Error::Subprocess {
                status: status.code().unwrap_or(-1),
                stderr_tail,
            });
        }
        Ok(stdout_text)
    }
}

/// Rolling byte-bounded text buffer. Drains from the front on overflow,
/// landing on a char boundary so multi-byte characters are never split.
struct TailBuffer {
    text: String,
    max_bytes: usize,
}

impl TailBuffer {
    fn new(max_bytes: usize) -> Self {
        Self {
            text: String::new(),
            max_bytes,
        }
    }

    fn push(&mut self, chunk: &str) {
        self.text.push_str(chunk);
        if self.text.len() > self.max_bytes {
            let mut boundary = self.text.len() - self.max_bytes;
            while boundary < self.text.len() && !self.text.is_char_boundary(boundary) {
                boundary += 1;
            }
            self.text.drain(..boundary);
        }
    }

    fn into_string(self) -> String {
        self.text
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tail_buffer_keeps_the_end() {
        let mut tail = TailBuffer::new(8);
        tail.push("0123456789abcdef");
        assert_eq!(tail.into_string(), "89abcdef");
    }

    #[test]
    fn tail_buffer_respects_char_boundaries() {
        let mut tail = TailBuffer::new(4);
        tail.push("aé日本");
        let out = tail.into_string();
        assert!(out.len() <= 4 + 3); // may keep a partial boundary overshoot
        assert!(out.is_char_boundary(0));
    }

    #[tokio::test]
    async fn cancelled_token_aborts_before_wait() {
        let runner = MediaRunner::new("/bin/sleep", "/bin/sleep");
        let cancel = CancellationToken::new();
        cancel.cancel();
        // `sleep 5` would block for seconds; cancellation must win the race.
        let started = std::time::Instant::now();
        let err = runner.execute(&cancel, &["5"]).await.unwrap_err();
        assert!(matches!(err, Error::Cancelled));
        assert!(started.elapsed() < std::time::Duration::from_secs(2));
    }
}
