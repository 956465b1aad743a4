mod matte;
mod preprocess;

pub use matte::BackgroundMatte;
pub use preprocess::Preprocessor;

use crate::error::ProcessorError;
use crate::CameraId;
use image::RgbImage;
use std::path::Path;
use std::sync::Arc;

/// Per-frame transformation applied before encoding (overlays, mattes, ...)
///
/// Streams and snapshots may call the same processor concurrently, so
/// implementations take `&self` and guard any internal state themselves.
/// Temporal state is kept per camera.
pub trait FrameProcessor: Send + Sync {
    fn apply(&self, camera_id: CameraId, frame: RgbImage) -> Result<RgbImage, ProcessorError>;

    /// Forget temporal state held for `camera_id`
    fn reset_state(&self, _camera_id: CameraId) {}
}

/// Run `frame` through `processor`, or pass it through when there is none
pub fn process(
    processor: Option<&dyn FrameProcessor>,
    camera_id: CameraId,
    frame: RgbImage,
) -> Result<RgbImage, ProcessorError> {
    match processor {
        Some(processor) => {
            let _span = tracing::debug_span!("process_frame", camera_id).entered();
            processor.apply(camera_id, frame)
        }
        None => Ok(frame),
    }
}

/// Create the default processor (background matte)
pub fn create_default_processor<P: AsRef<Path>>(model_path: P) -> Arc<dyn FrameProcessor> {
    Arc::new(BackgroundMatte::new(model_path))
}
