//! Multi-viewer camera feeds with still snapshots.
//!
//! A [`registry::CameraRegistry`] owns the open capture devices, keyed by
//! logical camera id. Streams and snapshots both go through it, so any number
//! of viewers can share one device, and in simulation mode several logical
//! feeds can share a single physical camera.

pub mod capture;
pub mod config;
pub mod error;
pub mod persistence;
pub mod processor;
pub mod registry;
pub mod server;
pub mod service;
pub mod snapshot;
pub mod stream;

/// Viewer-facing camera identifier, independent of physical device indexing
pub type CameraId = u32;

pub use config::{Discovery, MultiplexMode, RegistryConfig, StreamConfig};
pub use error::{Error, Result};
pub use service::CameraService;
