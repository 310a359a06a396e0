//! Child-process implementation of the prediction engine.
//!
//! The engine program is started directly with an argument vector; no shell is
//! involved, so parameter values reach the program verbatim.

use std::process::{ExitStatus, Stdio};

use async_trait::async_trait;
use croprec_core::engine::{InvocationFailure, PredictionEngine, RawOutput};
use croprec_core::prediction::EngineArguments;
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::process::Command;

use crate::config::EngineConfig;

/// Stderr is only logged, so it gets a small fixed cap.
const STDERR_LOG_LIMIT: usize = 8 * 1024;

pub struct ProcessEngine {
    config: EngineConfig,
}

impl ProcessEngine {
    pub fn new(config: EngineConfig) -> Self {
        Self { config }
    }

    fn command(&self, arguments: &EngineArguments) -> Command {
        let mut command = Command::new(&self.config.program);
        command
            .args(&self.config.leading_args)
            .args(arguments.as_slice())
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(false);
        if let Some(workdir) = &self.config.workdir {
            command.current_dir(workdir);
        }
        command
    }
}

enum ReadError {
    TooLarge,
    Io(std::io::Error),
}

/// Read a pipe to EOF, keeping at most `limit` bytes. Anything past the limit
/// is drained and discarded so the engine never writes into a closed pipe.
async fn capture<R>(reader: Option<R>, limit: usize) -> Result<Vec<u8>, ReadError>
where
    R: AsyncRead + Unpin,
{
    let Some(mut reader) = reader else {
        return Ok(Vec::new());
    };
    let mut buf = Vec::new();
    // One extra byte distinguishes "exactly at the limit" from "over it".
    (&mut reader)
        .take(limit as u64 + 1)
        .read_to_end(&mut buf)
        .await
        .map_err(ReadError::Io)?;
    if buf.len() > limit {
        tokio::io::copy(&mut reader, &mut tokio::io::sink())
            .await
            .map_err(ReadError::Io)?;
        return Err(ReadError::TooLarge);
    }
    Ok(buf)
}

/// Like `capture` but truncates instead of failing; used for diagnostics only.
async fn capture_truncated<R>(reader: Option<R>, limit: usize) -> Vec<u8>
where
    R: AsyncRead + Unpin,
{
    let Some(mut reader) = reader else {
        return Vec::new();
    };
    let mut buf = Vec::new();
    let _ = (&mut reader).take(limit as u64).read_to_end(&mut buf).await;
    let _ = tokio::io::copy(&mut reader, &mut tokio::io::sink()).await;
    buf
}

/// What the engine process left behind once it exited.
struct Finished {
    stdout: Result<Vec<u8>, ReadError>,
    stderr: Vec<u8>,
    status: std::io::Result<ExitStatus>,
}

#[async_trait]
impl PredictionEngine for ProcessEngine {
    async fn invoke(&self, arguments: &EngineArguments) -> Result<RawOutput, InvocationFailure> {
        let started = std::time::Instant::now();
        let mut child = self.command(arguments).spawn().map_err(|e| {
            tracing::error!(program = %self.config.program, error = %e, "failed to start prediction engine");
            InvocationFailure::Spawn(e.to_string())
        })?;

        let stdout = child.stdout.take();
        let stderr = child.stderr.take();
        let limit = self.config.max_output_bytes;

        // The process, its pipes and its exit status belong to a detached task.
        // A timeout or a dropped request only stops waiting for it; the engine
        // runs to completion and is reaped here.
        let process = tokio::spawn(async move {
            let (stdout, stderr, status) = tokio::join!(
                capture(stdout, limit),
                capture_truncated(stderr, STDERR_LOG_LIMIT),
                child.wait(),
            );
            tracing::debug!(
                exit_code = ?status.as_ref().ok().and_then(|s| s.code()),
                "prediction engine process exited"
            );
            Finished {
                stdout,
                stderr,
                status,
            }
        });

        let finished = match tokio::time::timeout(self.config.timeout, process).await {
            Ok(Ok(finished)) => finished,
            Ok(Err(e)) => return Err(InvocationFailure::Io(e.to_string())),
            Err(_) => {
                tracing::error!(
                    timeout_ms = self.config.timeout.as_millis() as u64,
                    "prediction engine timed out, left running"
                );
                return Err(InvocationFailure::TimedOut {
                    timeout: self.config.timeout,
                });
            }
        };

        if !finished.stderr.is_empty() {
            tracing::warn!(
                stderr = %String::from_utf8_lossy(&finished.stderr).trim_end(),
                "prediction engine wrote to stderr"
            );
        }

        let stdout = match finished.stdout {
            Ok(bytes) => bytes,
            Err(ReadError::TooLarge) => {
                tracing::error!(limit, "prediction engine output exceeded limit");
                return Err(InvocationFailure::OutputTooLarge { limit });
            }
            Err(ReadError::Io(e)) => return Err(InvocationFailure::Io(e.to_string())),
        };
        let status = finished
            .status
            .map_err(|e| InvocationFailure::Io(e.to_string()))?;

        tracing::debug!(
            exit_code = ?status.code(),
            stdout_bytes = stdout.len(),
            duration_ms = started.elapsed().as_millis() as u64,
            "prediction engine finished"
        );

        Ok(RawOutput::from_bytes(stdout, status.code()))
    }
}

#[cfg(all(test, unix))]
mod tests {
    use std::path::{Path, PathBuf};
    use std::time::Duration;

    use super::*;

    fn arguments(values: [&str; 10]) -> EngineArguments {
        EngineArguments(values.map(str::to_string))
    }

    fn shell_engine(script: &str) -> ProcessEngine {
        // `sh -c <script> <argv0> <args...>`: the ten parameters land in $1..$9, ${10}
        ProcessEngine::new(EngineConfig {
            program: "sh".to_string(),
            leading_args: vec!["-c".to_string(), script.to_string(), "engine".to_string()],
            workdir: None,
            timeout: Duration::from_secs(5),
            max_output_bytes: 1024,
        })
    }

    const PLAIN: [&str; 10] = [
        "40", "20", "10", "Tropical", "80", "6.5", "200", "Loamy", "Flat", "High",
    ];

    #[tokio::test]
    async fn passes_arguments_in_order() {
        let engine = shell_engine(r#"printf '%s|' "$@""#);
        let output = engine.invoke(&arguments(PLAIN)).await.unwrap();
        assert_eq!(
            output.stdout,
            "40|20|10|Tropical|80|6.5|200|Loamy|Flat|High|"
        );
        assert_eq!(output.exit_code, Some(0));
    }

    #[tokio::test]
    async fn shell_metacharacters_arrive_verbatim() {
        let engine = shell_engine(r#"printf '%s' "$4""#);
        let mut values = PLAIN;
        values[3] = "Dry; rm -rf / && echo $(whoami)";
        let output = engine.invoke(&arguments(values)).await.unwrap();
        assert_eq!(output.stdout, "Dry; rm -rf / && echo $(whoami)");
    }

    #[tokio::test]
    async fn non_zero_exit_still_returns_output() {
        let engine = shell_engine("echo 'Traceback: boom'; exit 3");
        let output = engine.invoke(&arguments(PLAIN)).await.unwrap();
        assert_eq!(output.stdout.trim(), "Traceback: boom");
        assert_eq!(output.exit_code, Some(3));
    }

    #[tokio::test]
    async fn missing_program_is_a_spawn_failure() {
        let engine = ProcessEngine::new(EngineConfig {
            program: "/nonexistent/croprec-engine".to_string(),
            leading_args: Vec::new(),
            ..EngineConfig::default()
        });
        let err = engine.invoke(&arguments(PLAIN)).await.unwrap_err();
        assert!(matches!(err, InvocationFailure::Spawn(_)));
    }

    #[tokio::test]
    async fn slow_engine_times_out() {
        let mut engine = shell_engine("sleep 5");
        engine.config.timeout = Duration::from_millis(200);
        let err = engine.invoke(&arguments(PLAIN)).await.unwrap_err();
        assert_eq!(
            err,
            InvocationFailure::TimedOut {
                timeout: Duration::from_millis(200)
            }
        );
    }

    fn marker_path() -> PathBuf {
        std::env::temp_dir().join(format!("croprec-engine-{}", uuid::Uuid::now_v7()))
    }

    /// `sh -c <script> <marker>`: the marker path is `$0` inside the script.
    fn marking_engine(script: &str, marker: &Path, timeout: Duration) -> ProcessEngine {
        ProcessEngine::new(EngineConfig {
            program: "sh".to_string(),
            leading_args: vec![
                "-c".to_string(),
                script.to_string(),
                marker.to_string_lossy().into_owned(),
            ],
            workdir: None,
            timeout,
            max_output_bytes: 1024,
        })
    }

    async fn wait_for(path: &Path, within: Duration) -> bool {
        let deadline = tokio::time::Instant::now() + within;
        while tokio::time::Instant::now() < deadline {
            if path.exists() {
                return true;
            }
            tokio::time::sleep(Duration::from_millis(50)).await;
        }
        path.exists()
    }

    #[tokio::test]
    async fn timed_out_engine_still_runs_to_completion() {
        let marker = marker_path();
        let engine = marking_engine(
            r#"sleep 1; echo late-output; echo late-diagnostic 1>&2; touch "$0""#,
            &marker,
            Duration::from_millis(200),
        );

        let err = engine.invoke(&arguments(PLAIN)).await.unwrap_err();
        assert!(matches!(err, InvocationFailure::TimedOut { .. }));

        assert!(
            wait_for(&marker, Duration::from_secs(5)).await,
            "engine was cut off after the timeout"
        );
        let _ = std::fs::remove_file(&marker);
    }

    #[tokio::test]
    async fn abandoned_invocation_still_runs_to_completion() {
        let marker = marker_path();
        let engine = marking_engine(
            r#"sleep 1; echo late-output; touch "$0""#,
            &marker,
            Duration::from_secs(5),
        );

        // Caller gives up long before the engine is done
        let abandoned =
            tokio::time::timeout(Duration::from_millis(200), engine.invoke(&arguments(PLAIN)))
                .await;
        assert!(abandoned.is_err());

        assert!(
            wait_for(&marker, Duration::from_secs(5)).await,
            "engine was cut off when the caller went away"
        );
        let _ = std::fs::remove_file(&marker);
    }

    #[tokio::test]
    async fn oversized_output_is_rejected_without_cutting_the_engine_off() {
        let marker = marker_path();
        let engine = marking_engine(
            r#"head -c 4096 /dev/zero; touch "$0""#,
            &marker,
            Duration::from_secs(5),
        );

        let err = engine.invoke(&arguments(PLAIN)).await.unwrap_err();

        assert_eq!(err, InvocationFailure::OutputTooLarge { limit: 1024 });
        assert!(marker.exists(), "engine did not finish writing");
        let _ = std::fs::remove_file(&marker);
    }

    #[tokio::test]
    async fn invalid_utf8_output_is_flagged() {
        let engine = shell_engine(r#"printf 'ok\377'"#);
        let output = engine.invoke(&arguments(PLAIN)).await.unwrap();
        assert_eq!(output.stdout, "ok\u{fffd}");
        assert!(output.invalid_utf8);
    }
}
