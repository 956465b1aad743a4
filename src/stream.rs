//! Continuous MJPEG frame streaming.
//!
//! A `FrameStream` pulls one frame from the device per `next()` call and never
//! reads ahead, so a slow consumer delays the next device read.

use crate::capture::DeviceHandle;
use crate::config::StreamConfig;
use crate::error::{Error, Result};
use crate::processor::{self, FrameProcessor};
use crate::registry::CameraRegistry;
use crate::CameraId;
use image::codecs::jpeg::JpegEncoder;
use image::RgbImage;
use std::iter::FusedIterator;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Multipart boundary between frames
pub const BOUNDARY: &str = "frame";

/// Content type of a multipart MJPEG response
pub const CONTENT_TYPE: &str = "multipart/x-mixed-replace; boundary=frame";

/// Encode a frame as JPEG
pub fn encode_jpeg(frame: &RgbImage, quality: u8) -> std::result::Result<Vec<u8>, image::ImageError> {
    let mut jpeg = Vec::new();
    JpegEncoder::new_with_quality(&mut jpeg, quality.clamp(1, 100)).encode_image(frame)?;
    Ok(jpeg)
}

/// One JPEG-encoded frame of a stream
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncodedFrame {
    pub jpeg: Vec<u8>,
}

impl EncodedFrame {
    /// Frame as one multipart part:
    /// `--frame\r\nContent-Type: image/jpeg\r\n\r\n<jpeg>\r\n`
    pub fn to_multipart(&self) -> Vec<u8> {
        let header = format!("--{BOUNDARY}\r\nContent-Type: image/jpeg\r\n\r\n");
        let mut part = Vec::with_capacity(header.len() + self.jpeg.len() + 2);
        part.extend_from_slice(header.as_bytes());
        part.extend_from_slice(&self.jpeg);
        part.extend_from_slice(b"\r\n");
        part
    }
}

/// Set by the transport when the viewer goes away
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

pub struct FrameStreamer {
    registry: Arc<CameraRegistry>,
    processor: Option<Arc<dyn FrameProcessor>>,
    config: StreamConfig,
}

impl FrameStreamer {
    pub fn new(
        registry: Arc<CameraRegistry>,
        processor: Option<Arc<dyn FrameProcessor>>,
        config: StreamConfig,
    ) -> Self {
        Self {
            registry,
            processor,
            config,
        }
    }

    /// Start a new frame sequence for `camera_id`, opening the camera if needed.
    ///
    /// Fails before producing anything if the device cannot be opened.
    pub fn stream(&self, camera_id: CameraId) -> Result<FrameStream> {
        let handle = self.registry.ensure_open(camera_id)?;
        tracing::debug!(camera_id, "Frame stream started");

        Ok(FrameStream {
            camera_id,
            handle,
            processor: self.processor.clone(),
            jpeg_quality: self.config.jpeg_quality,
            cancel: CancelToken::new(),
            frames: 0,
            finished: false,
        })
    }
}

/// Infinite sequence of encoded frames from one camera.
///
/// Ends when a read fails or the token is cancelled. A processor or encoder
/// failure is yielded once as `Err`, after which the stream is finished.
/// Ending never releases the camera.
pub struct FrameStream {
    camera_id: CameraId,
    handle: Arc<DeviceHandle>,
    processor: Option<Arc<dyn FrameProcessor>>,
    jpeg_quality: u8,
    cancel: CancelToken,
    frames: u64,
    finished: bool,
}

impl FrameStream {
    pub fn camera_id(&self) -> CameraId {
        self.camera_id
    }

    pub fn cancel_token(&self) -> CancelToken {
        self.cancel.clone()
    }

    /// Frames produced so far
    pub fn frames(&self) -> u64 {
        self.frames
    }

    fn finish(&mut self) {
        self.finished = true;
        tracing::debug!(
            camera_id = self.camera_id,
            frames = self.frames,
            "Frame stream finished"
        );
    }
}

impl Iterator for FrameStream {
    type Item = Result<EncodedFrame>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.finished {
            return None;
        }
        if self.cancel.is_cancelled() {
            self.finish();
            return None;
        }

        let frame = match self.handle.read() {
            Ok(frame) => frame,
            Err(e) => {
                tracing::warn!(
                    camera_id = self.camera_id,
                    error = %e,
                    "Frame read failed, ending stream"
                );
                self.finish();
                return None;
            }
        };

        // Viewer left while we were blocked on the device
        if self.cancel.is_cancelled() {
            self.finish();
            return None;
        }

        let encoded = processor::process(self.processor.as_deref(), self.camera_id, frame)
            .map_err(Error::from)
            .and_then(|frame| encode_jpeg(&frame, self.jpeg_quality).map_err(Error::from));

        match encoded {
            Ok(jpeg) => {
                self.frames += 1;
                Some(Ok(EncodedFrame { jpeg }))
            }
            Err(e) => {
                tracing::warn!(camera_id = self.camera_id, error = %e, "Frame stream aborted");
                self.finish();
                Some(Err(e))
            }
        }
    }
}

impl FusedIterator for FrameStream {}
