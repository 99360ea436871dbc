//! Gif retiming job.

use std::sync::Arc;

use async_trait::async_trait;
use gifsync_media::{plan_frame_durations, FrameEncoder};
use gifsync_models::RetimeRequest;
use gifsync_queue::{HandlerResult, JobHandler, QueueJob};
use gifsync_storage::BlobStore;
use tracing::Instrument;

use crate::error::WorkerResult;
use crate::logging::JobLogger;

/// Re-time a stored gif so one loop spans `beats_per_loop` beats at `tempo`.
///
/// Returns `false` if the gif does not exist, without running the encoder, or if it was
/// deleted while re-encoding. The gif is only overwritten once re-encoding has succeeded
/// and never recreated.
pub async fn retime_gif(
    store: &dyn BlobStore,
    encoder: &dyn FrameEncoder,
    request: &RetimeRequest,
    logger: &JobLogger,
) -> WorkerResult<bool> {
    let Some(image) = store.get(&request.gif_name).await? else {
        logger.log_warning(&format!("gif {} not found", request.gif_name));
        return Ok(false);
    };

    let frame_count = match encoder.frame_count(&image).await? {
        Some(count) => count,
        None => {
            logger.log_warning("encoder did not report a frame count");
            0
        }
    };

    let durations = plan_frame_durations(request.tempo, request.beats_per_loop, frame_count)?;
    logger.log_progress(&format!(
        "{} frames, {} cs per loop at {} bpm",
        frame_count,
        durations.iter().map(|d| u64::from(*d)).sum::<u64>(),
        request.tempo
    ));

    let retimed = encoder.apply_durations(&image, &durations).await?;
    let Some(written) = store.update(&request.gif_name, retimed).await? else {
        logger.log_warning(&format!("gif {} deleted during re-encoding", request.gif_name));
        return Ok(false);
    };

    logger.log_completion(&format!("wrote {} bytes to {}", written, request.gif_name));
    Ok(true)
}

/// Runs queue jobs against a blob store and an encoder.
#[derive(Clone)]
pub struct RetimeHandler {
    store: Arc<dyn BlobStore>,
    encoder: Arc<dyn FrameEncoder>,
}

impl RetimeHandler {
    pub fn new(store: Arc<dyn BlobStore>, encoder: Arc<dyn FrameEncoder>) -> Self {
        Self { store, encoder }
    }
}

#[async_trait]
impl JobHandler for RetimeHandler {
    async fn handle(&self, job: &QueueJob) -> HandlerResult {
        match job {
            QueueJob::RetimeGif(j) => {
                let logger = JobLogger::new(&j.job_id, job.kind());
                logger.log_start(&format!(
                    "retime {} to {} bpm over {} beats",
                    j.gif_name, j.tempo, j.beats_per_loop
                ));
                let request = j.request();
                let store = self.store.as_ref();
                let result = retime_gif(store, self.encoder.as_ref(), &request, &logger)
                    .instrument(logger.span())
                    .await;
                if let Err(e) = &result {
                    logger.log_error(&e.to_string());
                }
                Ok(result?)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use gifsync_media::{MediaError, MediaResult};
    use gifsync_models::JobId;
    use gifsync_queue::RetimeGifJob;
    use gifsync_storage::{MemoryStore, StorageResult};
    use mockall::mock;

    mock! {
        pub Encoder {}

        #[async_trait]
        impl FrameEncoder for Encoder {
            async fn frame_count(&self, image: &[u8]) -> MediaResult<Option<u32>>;
            async fn apply_durations(
                &self,
                image: &[u8],
                durations: &[u32],
            ) -> MediaResult<Vec<u8>>;
        }
    }

    mock! {
        pub Store {}

        #[async_trait]
        impl BlobStore for Store {
            async fn get(&self, name: &str) -> StorageResult<Option<Vec<u8>>>;
            async fn put(&self, name: &str, data: Vec<u8>) -> StorageResult<u64>;
            async fn update(&self, name: &str, data: Vec<u8>) -> StorageResult<Option<u64>>;
        }
    }

    fn logger() -> JobLogger {
        JobLogger::new(&JobId::new(), "retime_gif")
    }

    #[tokio::test]
    async fn test_missing_gif_skips_encoder() {
        let mut store = MockStore::new();
        store
            .expect_get()
            .withf(|name| name == "ghost")
            .times(1)
            .returning(|_| Ok(None));
        store.expect_update().never();

        let mut encoder = MockEncoder::new();
        encoder.expect_frame_count().never();
        encoder.expect_apply_durations().never();

        let request = RetimeRequest::new("ghost", 120.0, 4.0);
        let retimed = retime_gif(&store, &encoder, &request, &logger()).await.unwrap();
        assert!(!retimed);
    }

    #[tokio::test]
    async fn test_frame_count_failure_leaves_storage_untouched() {
        let mut store = MockStore::new();
        store
            .expect_get()
            .returning(|_| Ok(Some(b"GIF89a-original".to_vec())));
        store.expect_update().never();

        let mut encoder = MockEncoder::new();
        encoder
            .expect_frame_count()
            .times(1)
            .returning(|_| Err(MediaError::encoding_failed("gifsicle -I failed", None, Some(1))));
        encoder.expect_apply_durations().never();

        let request = RetimeRequest::new("broken", 120.0, 4.0);
        let err = retime_gif(&store, &encoder, &request, &logger()).await.unwrap_err();
        assert!(matches!(
            err,
            crate::WorkerError::Media(MediaError::EncodingFailed { .. })
        ));
    }

    #[tokio::test]
    async fn test_apply_failure_leaves_storage_untouched() {
        let store = MemoryStore::with_blobs([("loop", b"original".to_vec())]);

        let mut encoder = MockEncoder::new();
        encoder.expect_frame_count().returning(|_| Ok(Some(8)));
        encoder
            .expect_apply_durations()
            .returning(|_, _| Err(MediaError::encoding_failed("gifsicle exited", None, Some(1))));

        let request = RetimeRequest::new("loop", 120.0, 4.0);
        assert!(retime_gif(&store, &encoder, &request, &logger()).await.is_err());
        assert_eq!(store.get("loop").await.unwrap(), Some(b"original".to_vec()));
    }

    #[tokio::test]
    async fn test_success_writes_retimed_gif() {
        let store = MemoryStore::with_blobs([("loop", b"original".to_vec())]);

        let mut encoder = MockEncoder::new();
        encoder
            .expect_frame_count()
            .withf(|image| image == b"original")
            .returning(|_| Ok(Some(8)));
        encoder
            .expect_apply_durations()
            .withf(|image, durations| image == b"original" && durations == [25u32; 8].as_slice())
            .times(1)
            .returning(|_, _| Ok(b"retimed".to_vec()));

        let request = RetimeRequest::new("loop", 120.0, 4.0);
        assert!(retime_gif(&store, &encoder, &request, &logger()).await.unwrap());
        assert_eq!(store.get("loop").await.unwrap(), Some(b"retimed".to_vec()));
    }

    /// Encoder that deletes the gif from the store while it "encodes".
    struct DeletingEncoder {
        store: MemoryStore,
    }

    #[async_trait]
    impl FrameEncoder for DeletingEncoder {
        async fn frame_count(&self, _image: &[u8]) -> MediaResult<Option<u32>> {
            Ok(Some(4))
        }

        async fn apply_durations(&self, _image: &[u8], _durations: &[u32]) -> MediaResult<Vec<u8>> {
            self.store.remove("loop").await;
            Ok(b"retimed".to_vec())
        }
    }

    #[tokio::test]
    async fn test_gif_deleted_during_encoding_is_not_recreated() {
        let store = MemoryStore::with_blobs([("loop", b"original".to_vec())]);
        let encoder = DeletingEncoder {
            store: store.clone(),
        };

        let request = RetimeRequest::new("loop", 120.0, 4.0);
        let retimed = retime_gif(&store, &encoder, &request, &logger()).await.unwrap();

        assert!(!retimed);
        assert!(!store.contains("loop").await);
    }

    #[tokio::test]
    async fn test_update_skipped_reports_false() {
        let mut store = MockStore::new();
        store
            .expect_get()
            .returning(|_| Ok(Some(b"original".to_vec())));
        store
            .expect_update()
            .withf(|name, data| name == "loop" && data == b"retimed")
            .times(1)
            .returning(|_, _| Ok(None));
        store.expect_put().never();

        let mut encoder = MockEncoder::new();
        encoder.expect_frame_count().returning(|_| Ok(Some(8)));
        encoder
            .expect_apply_durations()
            .returning(|_, _| Ok(b"retimed".to_vec()));

        let request = RetimeRequest::new("loop", 120.0, 4.0);
        assert!(!retime_gif(&store, &encoder, &request, &logger()).await.unwrap());
    }

    #[tokio::test]
    async fn test_unreported_frame_count_is_invalid() {
        let store = MemoryStore::with_blobs([("still", b"single".to_vec())]);

        let mut encoder = MockEncoder::new();
        encoder.expect_frame_count().returning(|_| Ok(None));
        encoder.expect_apply_durations().never();

        let request = RetimeRequest::new("still", 120.0, 4.0);
        let err = retime_gif(&store, &encoder, &request, &logger()).await.unwrap_err();
        assert!(matches!(
            err,
            crate::WorkerError::Media(MediaError::InvalidArgument(_))
        ));
    }

    #[tokio::test]
    async fn test_handler_maps_outcomes() {
        let store = Arc::new(MemoryStore::with_blobs([("loop", b"original".to_vec())]));
        let mut encoder = MockEncoder::new();
        encoder.expect_frame_count().returning(|_| Ok(Some(4)));
        encoder
            .expect_apply_durations()
            .returning(|_, _| Ok(b"retimed".to_vec()));

        let handler = RetimeHandler::new(store, Arc::new(encoder));

        let found = QueueJob::from(RetimeGifJob::new(RetimeRequest::new("loop", 90.0, 2.0)));
        assert!(handler.handle(&found).await.unwrap());

        let missing = QueueJob::from(RetimeGifJob::new(RetimeRequest::new("gone", 90.0, 2.0)));
        assert!(!handler.handle(&missing).await.unwrap());

        let invalid = QueueJob::from(RetimeGifJob::new(RetimeRequest::new("loop", 0.0, 2.0)));
        assert!(handler.handle(&invalid).await.is_err());
    }
}
