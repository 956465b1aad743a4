//! Scripted capture devices shared by the integration tests.

#![allow(dead_code)]

use camfeed::capture::{CaptureSource, DeviceFactory};
use camfeed::error::{DeviceError, ProcessorError};
use camfeed::persistence::SnapshotStore;
use camfeed::processor::FrameProcessor;
use camfeed::{CameraId, CameraService, RegistryConfig, StreamConfig};
use image::{Rgb, RgbImage};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// What a scripted device does
#[derive(Debug, Clone, Copy)]
pub enum Behavior {
    /// Frames forever
    Endless,
    /// This many frames, then every read fails
    Frames(usize),
    /// Opens fine, every read fails
    FailReads,
    /// Cannot be opened
    FailOpen,
}

/// Counters shared by a factory and every source it opened
#[derive(Default)]
pub struct Counters {
    pub opens: AtomicUsize,
    pub closes: AtomicUsize,
    pub probes: AtomicUsize,
    pub reads: AtomicUsize,
    in_read: AtomicUsize,
    pub overlapping_reads: AtomicBool,
}

impl Counters {
    pub fn opens(&self) -> usize {
        self.opens.load(Ordering::SeqCst)
    }

    pub fn closes(&self) -> usize {
        self.closes.load(Ordering::SeqCst)
    }

    pub fn probes(&self) -> usize {
        self.probes.load(Ordering::SeqCst)
    }

    pub fn reads(&self) -> usize {
        self.reads.load(Ordering::SeqCst)
    }
}

pub struct ScriptedFactory {
    pub counters: Arc<Counters>,
    default: Behavior,
    overrides: Mutex<HashMap<u32, Behavior>>,
    available: Vec<u32>,
    open_delay: Duration,
    read_delay: Duration,
}

impl ScriptedFactory {
    pub fn new(default: Behavior) -> Self {
        Self {
            counters: Arc::new(Counters::default()),
            default,
            overrides: Mutex::new(HashMap::new()),
            available: Vec::new(),
            open_delay: Duration::ZERO,
            read_delay: Duration::ZERO,
        }
    }

    pub fn with_behavior(self, index: u32, behavior: Behavior) -> Self {
        self.overrides.lock().unwrap().insert(index, behavior);
        self
    }

    /// Indices that `probe` reports as present
    pub fn with_available(mut self, indices: &[u32]) -> Self {
        self.available = indices.to_vec();
        self
    }

    pub fn with_open_delay(mut self, delay: Duration) -> Self {
        self.open_delay = delay;
        self
    }

    pub fn with_read_delay(mut self, delay: Duration) -> Self {
        self.read_delay = delay;
        self
    }

    fn behavior(&self, index: u32) -> Behavior {
        self.overrides
            .lock()
            .unwrap()
            .get(&index)
            .copied()
            .unwrap_or(self.default)
    }
}

impl DeviceFactory for ScriptedFactory {
    fn open(&self, index: u32) -> Result<Box<dyn CaptureSource>, DeviceError> {
        std::thread::sleep(self.open_delay);
        let remaining = match self.behavior(index) {
            Behavior::FailOpen => {
                return Err(DeviceError::Open {
                    index,
                    reason: "scripted open failure".to_string(),
                })
            }
            Behavior::Endless => None,
            Behavior::Frames(n) => Some(n),
            Behavior::FailReads => Some(0),
        };
        self.counters.opens.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(ScriptedSource {
            index,
            remaining,
            read_delay: self.read_delay,
            counters: self.counters.clone(),
        }))
    }

    fn probe(&self, index: u32) -> bool {
        self.counters.probes.fetch_add(1, Ordering::SeqCst);
        self.available.contains(&index)
    }
}

pub struct ScriptedSource {
    index: u32,
    remaining: Option<usize>,
    read_delay: Duration,
    counters: Arc<Counters>,
}

impl CaptureSource for ScriptedSource {
    fn capture_frame(&mut self) -> Result<RgbImage, DeviceError> {
        let counters = &self.counters;
        if counters.in_read.fetch_add(1, Ordering::SeqCst) > 0 {
            counters.overlapping_reads.store(true, Ordering::SeqCst);
        }
        std::thread::sleep(self.read_delay);
        counters.reads.fetch_add(1, Ordering::SeqCst);

        let result = match self.remaining.as_mut() {
            Some(0) => Err(DeviceError::Read("scripted read failure".to_string())),
            Some(n) => {
                *n -= 1;
                Ok(test_frame(self.index))
            }
            None => Ok(test_frame(self.index)),
        };

        counters.in_read.fetch_sub(1, Ordering::SeqCst);
        result
    }

    fn resolution(&self) -> (u32, u32) {
        (8, 8)
    }

    fn close(&mut self) {
        self.counters.closes.fetch_add(1, Ordering::SeqCst);
    }
}

pub fn test_frame(index: u32) -> RgbImage {
    RgbImage::from_pixel(8, 8, Rgb([(index * 30 % 256) as u8, 128, 64]))
}

/// Paints the whole frame pure red
pub struct FillRed;

impl FrameProcessor for FillRed {
    fn apply(&self, _camera_id: CameraId, mut frame: RgbImage) -> Result<RgbImage, ProcessorError> {
        for pixel in frame.pixels_mut() {
            *pixel = Rgb([255, 0, 0]);
        }
        Ok(frame)
    }
}

/// Fails the first call, passes frames through afterwards
#[derive(Default)]
pub struct FailOnce {
    tripped: AtomicBool,
}

impl FrameProcessor for FailOnce {
    fn apply(&self, _camera_id: CameraId, frame: RgbImage) -> Result<RgbImage, ProcessorError> {
        if self.tripped.swap(true, Ordering::SeqCst) {
            Ok(frame)
        } else {
            Err(ProcessorError::Failed("scripted processor failure".to_string()))
        }
    }
}

pub struct AlwaysFail;

impl FrameProcessor for AlwaysFail {
    fn apply(&self, _camera_id: CameraId, _frame: RgbImage) -> Result<RgbImage, ProcessorError> {
        Err(ProcessorError::Unavailable("no model".to_string()))
    }
}

/// Passes frames through, recording what it saw and which cameras were reset
#[derive(Default)]
pub struct RecordingProcessor {
    pub applied: Mutex<Vec<CameraId>>,
    pub resets: Mutex<Vec<CameraId>>,
}

impl RecordingProcessor {
    pub fn applied(&self) -> Vec<CameraId> {
        self.applied.lock().unwrap().clone()
    }

    pub fn resets(&self) -> Vec<CameraId> {
        self.resets.lock().unwrap().clone()
    }
}

impl FrameProcessor for RecordingProcessor {
    fn apply(&self, camera_id: CameraId, frame: RgbImage) -> Result<RgbImage, ProcessorError> {
        self.applied.lock().unwrap().push(camera_id);
        Ok(frame)
    }

    fn reset_state(&self, camera_id: CameraId) {
        self.resets.lock().unwrap().push(camera_id);
    }
}

pub fn service_with(
    config: RegistryConfig,
    factory: Arc<ScriptedFactory>,
    processor: Option<Arc<dyn FrameProcessor>>,
    snapshot_dir: &std::path::Path,
) -> CameraService {
    let store = SnapshotStore::open(snapshot_dir).expect("snapshot store");
    CameraService::new(
        config,
        StreamConfig::default(),
        factory,
        processor,
        Arc::new(store),
    )
}
