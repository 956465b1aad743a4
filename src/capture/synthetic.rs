use super::{CaptureSource, DeviceFactory};
use crate::error::DeviceError;
use image::{Rgb, RgbImage};
use std::time::{Duration, Instant};

/// Test-pattern source used in simulation mode.
///
/// Produces a gradient that shifts every frame so consecutive JPEGs differ.
/// With a non-zero fps, reads block like a real camera would.
pub struct SyntheticSource {
    width: u32,
    height: u32,
    frame_interval: Option<Duration>,
    last_frame: Option<Instant>,
    frame_number: u64,
}

impl SyntheticSource {
    pub fn new(width: u32, height: u32, fps: u32) -> Self {
        Self {
            width,
            height,
            frame_interval: (fps > 0).then(|| Duration::from_secs_f32(1.0 / fps as f32)),
            last_frame: None,
            frame_number: 0,
        }
    }

    fn pace(&mut self) {
        if let (Some(interval), Some(last)) = (self.frame_interval, self.last_frame) {
            let elapsed = last.elapsed();
            if elapsed < interval {
                std::thread::sleep(interval - elapsed);
            }
        }
        self.last_frame = Some(Instant::now());
    }
}

impl CaptureSource for SyntheticSource {
    fn capture_frame(&mut self) -> Result<RgbImage, DeviceError> {
        self.pace();
        let base = (self.frame_number % 256) as u8;
        self.frame_number += 1;

        Ok(RgbImage::from_fn(self.width, self.height, |x, y| {
            Rgb([
                base.wrapping_add((x % 256) as u8),
                base.wrapping_add((y % 256) as u8),
                base.wrapping_add(((x + y) % 256) as u8),
            ])
        }))
    }

    fn resolution(&self) -> (u32, u32) {
        (self.width, self.height)
    }
}

pub struct SyntheticFactory {
    width: u32,
    height: u32,
    fps: u32,
}

impl SyntheticFactory {
    /// `fps` of 0 produces frames as fast as they are read
    pub fn new(width: u32, height: u32, fps: u32) -> Self {
        Self { width, height, fps }
    }
}

impl DeviceFactory for SyntheticFactory {
    fn open(&self, index: u32) -> Result<Box<dyn CaptureSource>, DeviceError> {
        tracing::info!(index, "Opening synthetic capture device");
        Ok(Box::new(SyntheticSource::new(self.width, self.height, self.fps)))
    }
}
