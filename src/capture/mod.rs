mod synthetic;
mod v4l_capture;

pub use synthetic::{SyntheticFactory, SyntheticSource};
pub use v4l_capture::{WebcamCapture, WebcamFactory};

use crate::error::DeviceError;
use image::RgbImage;
use std::sync::{Mutex, MutexGuard, PoisonError};

/// Trait for camera capture sources
pub trait CaptureSource: Send {
    /// Capture a single frame
    fn capture_frame(&mut self) -> Result<RgbImage, DeviceError>;

    /// Resolution of captured frames, queried once when the device opens
    fn resolution(&self) -> (u32, u32);

    /// Release the underlying device. Called at most once, by `DeviceHandle`.
    fn close(&mut self) {}
}

/// Opens capture sources by physical device index
pub trait DeviceFactory: Send + Sync {
    fn open(&self, index: u32) -> Result<Box<dyn CaptureSource>, DeviceError>;

    /// Check whether a device exists at `index`, closing it again right away
    fn probe(&self, index: u32) -> bool {
        match self.open(index) {
            Ok(mut source) => {
                source.close();
                true
            }
            Err(_) => false,
        }
    }
}

/// One opened physical capture device.
///
/// Reads are serialized by an internal lock, so several logical cameras
/// sharing this handle never interleave calls on the device. `close` takes
/// the same lock and is idempotent.
pub struct DeviceHandle {
    index: u32,
    resolution: (u32, u32),
    source: Mutex<Option<Box<dyn CaptureSource>>>,
}

impl DeviceHandle {
    pub fn new(index: u32, source: Box<dyn CaptureSource>) -> Self {
        Self {
            index,
            resolution: source.resolution(),
            source: Mutex::new(Some(source)),
        }
    }

    /// Physical index this handle was opened with
    pub fn index(&self) -> u32 {
        self.index
    }

    /// Read one frame. Blocks while another reader holds the device.
    pub fn read(&self) -> Result<RgbImage, DeviceError> {
        match self.lock().as_mut() {
            Some(source) => source.capture_frame(),
            None => Err(DeviceError::Closed),
        }
    }

    /// Close the device. Returns false if it was already closed.
    pub fn close(&self) -> bool {
        let taken = self.lock().take();
        match taken {
            Some(mut source) => {
                source.close();
                tracing::info!(device_index = self.index, "Capture device closed");
                true
            }
            None => false,
        }
    }

    pub fn is_closed(&self) -> bool {
        self.lock().is_none()
    }

    /// Frame size reported at open. Does not wait for an in-flight read.
    pub fn resolution(&self) -> (u32, u32) {
        self.resolution
    }

    fn lock(&self) -> MutexGuard<'_, Option<Box<dyn CaptureSource>>> {
        self.source.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Drop for DeviceHandle {
    fn drop(&mut self) {
        let slot = self
            .source
            .get_mut()
            .unwrap_or_else(PoisonError::into_inner);
        if let Some(mut source) = slot.take() {
            source.close();
        }
    }
}

impl std::fmt::Debug for DeviceHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DeviceHandle")
            .field("index", &self.index)
            .field("resolution", &self.resolution)
            .field("closed", &self.is_closed())
            .finish()
    }
}
