use crate::capture::DeviceFactory;
use crate::config::{MultiplexMode, RegistryConfig, StreamConfig};
use crate::error::Result;
use crate::persistence::{ArtifactId, Persistence};
use crate::processor::FrameProcessor;
use crate::registry::CameraRegistry;
use crate::snapshot::SnapshotCapture;
use crate::stream::{FrameStream, FrameStreamer};
use crate::CameraId;
use std::sync::Arc;

/// Registry state reported by `status`
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
pub struct ServiceStatus {
    pub mode: &'static str,
    pub open_cameras: Vec<CameraId>,
    pub devices: Vec<DeviceStatus>,
}

/// One registered camera and the device behind it
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
pub struct DeviceStatus {
    pub camera_id: CameraId,
    pub device_index: u32,
    pub width: u32,
    pub height: u32,
}

/// The operations offered to the transport layer
pub struct CameraService {
    registry: Arc<CameraRegistry>,
    processor: Option<Arc<dyn FrameProcessor>>,
    streamer: FrameStreamer,
    snapshots: SnapshotCapture,
}

impl CameraService {
    pub fn new(
        registry_config: RegistryConfig,
        stream_config: StreamConfig,
        factory: Arc<dyn DeviceFactory>,
        processor: Option<Arc<dyn FrameProcessor>>,
        persistence: Arc<dyn Persistence>,
    ) -> Self {
        let registry = Arc::new(CameraRegistry::new(registry_config, factory));
        let streamer = FrameStreamer::new(registry.clone(), processor.clone(), stream_config);
        let snapshots =
            SnapshotCapture::new(registry.clone(), processor.clone(), persistence, stream_config);

        Self {
            registry,
            processor,
            streamer,
            snapshots,
        }
    }

    pub fn registry(&self) -> &Arc<CameraRegistry> {
        &self.registry
    }

    pub fn list_cameras(&self) -> Vec<CameraId> {
        self.registry.list_available()
    }

    pub fn stream(&self, camera_id: CameraId) -> Result<FrameStream> {
        self.streamer.stream(camera_id)
    }

    /// Release a camera and drop its processor state; releasing an unknown
    /// camera is not an error
    pub fn release(&self, camera_id: CameraId) {
        self.registry.release(camera_id);
        if let Some(processor) = &self.processor {
            processor.reset_state(camera_id);
        }
    }

    pub fn capture(&self, camera_id: CameraId) -> Result<ArtifactId> {
        self.snapshots.capture(camera_id)
    }

    pub fn delete_snapshot(&self, artifact_id: &str) -> Result<()> {
        self.snapshots.delete_snapshot(artifact_id)
    }

    pub fn status(&self) -> ServiceStatus {
        let handles = self.registry.handles();
        ServiceStatus {
            mode: self.registry.mode().as_str(),
            open_cameras: handles.iter().map(|(camera_id, _)| *camera_id).collect(),
            devices: handles
                .iter()
                .map(|(camera_id, handle)| {
                    let (width, height) = handle.resolution();
                    DeviceStatus {
                        camera_id: *camera_id,
                        device_index: handle.index(),
                        width,
                        height,
                    }
                })
                .collect(),
        }
    }

    pub fn mode(&self) -> MultiplexMode {
        self.registry.mode()
    }

    /// Close every open device
    pub fn shutdown(&self) {
        tracing::info!("Releasing all cameras");
        let released = self.registry.release_all();
        if let Some(processor) = &self.processor {
            for camera_id in released {
                processor.reset_state(camera_id);
            }
        }
    }
}
