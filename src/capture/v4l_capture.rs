use super::{CaptureSource, DeviceFactory};
use crate::error::DeviceError;
use image::RgbImage;
use nokhwa::pixel_format::RgbFormat;
use nokhwa::utils::{CameraIndex, RequestedFormat, RequestedFormatType};
use nokhwa::Camera;

pub struct WebcamCapture {
    camera: Camera,
    width: u32,
    height: u32,
}

// SAFETY: a WebcamCapture is only reached through DeviceHandle, whose mutex
// guarantees one thread touches the camera at a time.
unsafe impl Send for WebcamCapture {}

impl WebcamCapture {
    pub fn new(device_index: u32, width: u32, height: u32) -> Result<Self, DeviceError> {
        tracing::info!(
            "Initializing webcam {} at {}x{}",
            device_index,
            width,
            height
        );

        let open_error = |reason: String| DeviceError::Open {
            index: device_index,
            reason,
        };

        let index = CameraIndex::Index(device_index);
        let requested =
            RequestedFormat::new::<RgbFormat>(RequestedFormatType::AbsoluteHighestResolution);

        let mut camera = Camera::new(index, requested).map_err(|e| open_error(e.to_string()))?;

        camera
            .open_stream()
            .map_err(|e| open_error(format!("failed to open camera stream: {e}")))?;

        tracing::info!(device_index, "Webcam initialized successfully");

        Ok(Self {
            camera,
            width,
            height,
        })
    }
}

impl CaptureSource for WebcamCapture {
    fn capture_frame(&mut self) -> Result<RgbImage, DeviceError> {
        let frame = self
            .camera
            .frame()
            .map_err(|e| DeviceError::Read(e.to_string()))?;

        frame
            .decode_image::<RgbFormat>()
            .map_err(|e| DeviceError::Read(format!("failed to decode frame: {e}")))
    }

    fn resolution(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    fn close(&mut self) {
        if let Err(e) = self.camera.stop_stream() {
            tracing::warn!(error = %e, "Failed to stop camera stream");
        }
    }
}

/// Opens real webcams through nokhwa
pub struct WebcamFactory {
    width: u32,
    height: u32,
}

impl WebcamFactory {
    pub fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }
}

impl DeviceFactory for WebcamFactory {
    fn open(&self, index: u32) -> Result<Box<dyn CaptureSource>, DeviceError> {
        let capture = WebcamCapture::new(index, self.width, self.height)?;
        Ok(Box::new(capture))
    }

    /// Opening the v4l node is enough to tell a device exists; it is closed
    /// again when the handle drops, without starting a stream.
    fn probe(&self, index: u32) -> bool {
        match v4l::Device::new(index as usize) {
            Ok(_device) => true,
            Err(e) => {
                tracing::debug!(index, error = %e, "No capture device at index");
                false
            }
        }
    }
}
