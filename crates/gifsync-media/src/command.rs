//! gifsicle command builder and runner.

use std::path::PathBuf;
use std::process::Stdio;
use std::time::{Duration, Instant};

use metrics::histogram;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tracing::{debug, warn};

use crate::error::{MediaError, MediaResult};

/// Histogram of encoder wall-clock time, labelled by mode.
pub const ENCODER_DURATION_SECONDS: &str = "gifsync_encoder_duration_seconds";

/// gifsicle runner configuration.
#[derive(Debug, Clone)]
pub struct GifsicleConfig {
    /// Executable name or path
    pub binary: String,
    /// Kill the process after this many seconds
    pub timeout_secs: Option<u64>,
}

impl Default for GifsicleConfig {
    fn default() -> Self {
        Self {
            binary: "gifsicle".to_string(),
            timeout_secs: None,
        }
    }
}

impl GifsicleConfig {
    /// Create config from environment variables.
    pub fn from_env() -> Self {
        Self {
            binary: std::env::var("GIFSICLE_PATH").unwrap_or_else(|_| "gifsicle".to_string()),
            timeout_secs: std::env::var("GIFSICLE_TIMEOUT_SECS")
                .ok()
                .and_then(|s| s.parse().ok()),
        }
    }
}

/// Builder for gifsicle commands. Input is always read from stdin.
#[derive(Debug, Clone)]
pub struct GifsicleCommand {
    args: Vec<String>,
    mode: &'static str,
}

impl Default for GifsicleCommand {
    fn default() -> Self {
        Self::new()
    }
}

impl GifsicleCommand {
    /// Create an empty command.
    pub fn new() -> Self {
        Self {
            args: Vec::new(),
            mode: "custom",
        }
    }

    /// Info mode: print a description of the input instead of writing a gif.
    pub fn info() -> Self {
        Self {
            args: vec!["-I".to_string()],
            mode: "info",
        }
    }

    /// Write the resulting gif to stdout.
    pub fn output_to_stdout() -> Self {
        Self {
            args: vec!["-o".to_string(), "-".to_string()],
            mode: "apply",
        }
    }

    /// Add a raw argument.
    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    /// Set the delay of one frame, in centiseconds.
    pub fn frame_delay(self, frame_index: usize, centiseconds: u32) -> Self {
        self.arg(format!("-d{}", centiseconds))
            .arg(format!("#{}", frame_index))
    }

    /// Set the delay of every frame, in frame order.
    pub fn frame_delays(self, durations: &[u32]) -> Self {
        durations
            .iter()
            .enumerate()
            .fold(self, |cmd, (index, delay)| cmd.frame_delay(index, *delay))
    }

    /// Label used for logging and metrics.
    pub fn mode(&self) -> &'static str {
        self.mode
    }

    /// Build the command arguments.
    pub fn build_args(&self) -> Vec<String> {
        self.args.clone()
    }
}

/// Runs gifsicle with a blob on stdin and collects stdout.
#[derive(Debug, Clone)]
pub struct GifsicleRunner {
    config: GifsicleConfig,
}

impl Default for GifsicleRunner {
    fn default() -> Self {
        Self::new(GifsicleConfig::default())
    }
}

impl GifsicleRunner {
    /// Create a new runner.
    pub fn new(config: GifsicleConfig) -> Self {
        Self { config }
    }

    /// Create a runner using a specific executable.
    pub fn with_binary(binary: impl Into<String>) -> Self {
        Self::new(GifsicleConfig {
            binary: binary.into(),
            ..Default::default()
        })
    }

    pub fn binary(&self) -> &str {
        &self.config.binary
    }

    /// Run a command, feeding `input` on stdin. Returns stdout on a zero exit status.
    pub async fn run(&self, cmd: &GifsicleCommand, input: &[u8]) -> MediaResult<Vec<u8>> {
        which::which(&self.config.binary)
            .map_err(|_| MediaError::GifsicleNotFound(self.config.binary.clone()))?;

        let args = cmd.build_args();
        debug!(
            "Running gifsicle: {} {} ({} bytes on stdin)",
            self.config.binary,
            args.join(" "),
            input.len()
        );

        let started = Instant::now();
        let mut child = Command::new(&self.config.binary)
            .args(&args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()?;

        let mut stdin = child
            .stdin
            .take()
            .ok_or_else(|| MediaError::internal("stdin not captured"))?;
        let input = input.to_vec();
        let writer = tokio::spawn(async move {
            let result = stdin.write_all(&input).await;
            drop(stdin);
            result
        });

        let output = match self.config.timeout_secs {
            Some(secs) => {
                let limit = Duration::from_secs(secs);
                match tokio::time::timeout(limit, child.wait_with_output()).await {
                    Ok(output) => output?,
                    Err(_) => {
                        // Dropping the future kills the child (kill_on_drop)
                        warn!("gifsicle timed out after {} seconds, killing process", secs);
                        return Err(MediaError::Timeout(secs));
                    }
                }
            }
            None => child.wait_with_output().await?,
        };

        // The tool may exit before draining stdin; its exit status is what matters then.
        if let Ok(Err(e)) = writer.await {
            if e.kind() != std::io::ErrorKind::BrokenPipe {
                return Err(e.into());
            }
        }

        histogram!(ENCODER_DURATION_SECONDS, "mode" => cmd.mode())
            .record(started.elapsed().as_secs_f64());

        if output.status.success() {
            Ok(output.stdout)
        } else {
            let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
            Err(MediaError::encoding_failed(
                format!("gifsicle exited with non-zero status in {} mode", cmd.mode()),
                (!stderr.is_empty()).then_some(stderr),
                output.status.code(),
            ))
        }
    }
}

/// Check if gifsicle is available.
pub fn check_gifsicle(binary: &str) -> MediaResult<PathBuf> {
    which::which(binary).map_err(|_| MediaError::GifsicleNotFound(binary.to_string()))
}
