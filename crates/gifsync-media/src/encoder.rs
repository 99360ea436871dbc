//! Encoder seam used by the retiming job.

use async_trait::async_trait;
use tracing::debug;

use crate::command::{GifsicleCommand, GifsicleConfig, GifsicleRunner};
use crate::error::MediaResult;
use crate::info;

/// Introspects and re-encodes animated images.
#[async_trait]
pub trait FrameEncoder: Send + Sync {
    /// Number of frames in the image, or `None` if the tool did not report one.
    async fn frame_count(&self, image: &[u8]) -> MediaResult<Option<u32>>;

    /// Re-encode the image with one delay (centiseconds) per frame, in frame order.
    async fn apply_durations(&self, image: &[u8], durations: &[u32]) -> MediaResult<Vec<u8>>;
}

/// gifsicle-backed encoder.
#[derive(Debug, Clone, Default)]
pub struct Gifsicle {
    runner: GifsicleRunner,
}

impl Gifsicle {
    pub fn new(config: GifsicleConfig) -> Self {
        Self {
            runner: GifsicleRunner::new(config),
        }
    }

    /// Create from environment variables.
    pub fn from_env() -> Self {
        Self::new(GifsicleConfig::from_env())
    }

    pub fn runner(&self) -> &GifsicleRunner {
        &self.runner
    }
}

#[async_trait]
impl FrameEncoder for Gifsicle {
    async fn frame_count(&self, image: &[u8]) -> MediaResult<Option<u32>> {
        info::frame_count(&self.runner, image).await
    }

    async fn apply_durations(&self, image: &[u8], durations: &[u32]) -> MediaResult<Vec<u8>> {
        debug!("Applying {} frame delays", durations.len());
        let cmd = GifsicleCommand::output_to_stdout().frame_delays(durations);
        self.runner.run(&cmd, image).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::MediaError;

    #[cfg(unix)]
    #[tokio::test]
    async fn test_apply_durations_failure_surfaces() {
        let encoder = Gifsicle::new(GifsicleConfig {
            binary: "false".to_string(),
            timeout_secs: Some(5),
        });
        let err = encoder
            .apply_durations(b"GIF89a", &[10, 10])
            .await
            .unwrap_err();
        assert!(matches!(err, MediaError::EncodingFailed { .. }));
    }
}
