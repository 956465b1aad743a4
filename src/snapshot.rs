use crate::config::StreamConfig;
use crate::error::{Error, Result};
use crate::persistence::{ArtifactId, Persistence};
use crate::processor::{self, FrameProcessor};
use crate::registry::CameraRegistry;
use crate::stream::encode_jpeg;
use crate::CameraId;
use chrono::Utc;
use std::sync::Arc;

/// Captures single frames and hands them to persistence
pub struct SnapshotCapture {
    registry: Arc<CameraRegistry>,
    processor: Option<Arc<dyn FrameProcessor>>,
    persistence: Arc<dyn Persistence>,
    config: StreamConfig,
}

impl SnapshotCapture {
    pub fn new(
        registry: Arc<CameraRegistry>,
        processor: Option<Arc<dyn FrameProcessor>>,
        persistence: Arc<dyn Persistence>,
        config: StreamConfig,
    ) -> Self {
        Self {
            registry,
            processor,
            persistence,
            config,
        }
    }

    /// Read one frame from `camera_id`, process, encode and store it.
    ///
    /// Opens the camera if no stream has done so yet. Failures only affect
    /// this call.
    pub fn capture(&self, camera_id: CameraId) -> Result<ArtifactId> {
        let handle = self.registry.ensure_open(camera_id)?;

        let frame = handle
            .read()
            .map_err(|source| Error::ReadFailure { camera_id, source })?;
        let frame = processor::process(self.processor.as_deref(), camera_id, frame)?;
        let jpeg = encode_jpeg(&frame, self.config.jpeg_quality)?;

        let artifact_id = self.persistence.save(&jpeg, camera_id, Utc::now())?;
        tracing::info!(camera_id, artifact_id = %artifact_id, "Snapshot captured");
        Ok(artifact_id)
    }

    /// Delete a stored snapshot; `Error::NotFound` if it does not exist
    pub fn delete_snapshot(&self, artifact_id: &str) -> Result<()> {
        self.persistence.delete(artifact_id)?;
        tracing::info!(artifact_id, "Snapshot deleted");
        Ok(())
    }
}
