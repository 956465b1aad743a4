//! Camera instance lifecycle.
//!
//! Maps logical camera ids to open `DeviceHandle`s. Entries are created lazily
//! by `ensure_open` and removed only by `release`; ending a stream never
//! releases a camera.

use crate::capture::{DeviceFactory, DeviceHandle};
use crate::config::{Discovery, MultiplexMode, RegistryConfig};
use crate::error::{Error, Result};
use crate::CameraId;
use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

/// The one physical device behind every id in `SharedSingle` mode
struct SharedSlot {
    handle: Arc<DeviceHandle>,
    refs: usize,
}

#[derive(Default)]
struct Entries {
    cameras: BTreeMap<CameraId, Arc<DeviceHandle>>,
    shared: Option<SharedSlot>,
}

pub struct CameraRegistry {
    config: RegistryConfig,
    factory: Arc<dyn DeviceFactory>,
    entries: Mutex<Entries>,
}

impl CameraRegistry {
    pub fn new(config: RegistryConfig, factory: Arc<dyn DeviceFactory>) -> Self {
        tracing::info!(
            mode = config.mode.as_str(),
            shared_index = config.shared_index,
            "Camera registry created"
        );
        Self {
            config,
            factory,
            entries: Mutex::new(Entries::default()),
        }
    }

    pub fn mode(&self) -> MultiplexMode {
        self.config.mode
    }

    /// Return the handle for `camera_id`, opening a device if it is not registered.
    ///
    /// Calling this again for a registered id returns the same handle without
    /// touching the device. On open failure the id stays unregistered.
    pub fn ensure_open(&self, camera_id: CameraId) -> Result<Arc<DeviceHandle>> {
        let mut entries = self.lock();

        if let Some(handle) = entries.cameras.get(&camera_id) {
            return Ok(handle.clone());
        }

        let handle = match self.config.mode {
            MultiplexMode::Exclusive => Arc::new(self.open_physical(camera_id, camera_id)?),
            MultiplexMode::SharedSingle => {
                let existing = entries.shared.as_mut().map(|slot| {
                    slot.refs += 1;
                    slot.handle.clone()
                });
                match existing {
                    Some(handle) => handle,
                    None => {
                        let handle =
                            Arc::new(self.open_physical(camera_id, self.config.shared_index)?);
                        entries.shared = Some(SharedSlot {
                            handle: handle.clone(),
                            refs: 1,
                        });
                        handle
                    }
                }
            }
        };

        entries.cameras.insert(camera_id, handle.clone());
        tracing::debug!(camera_id, "Camera registered");
        Ok(handle)
    }

    /// Unregister `camera_id`. Unknown ids are ignored.
    ///
    /// In `SharedSingle` mode the shared device closes when its last id goes.
    /// The device is closed after the registry lock is dropped, so a release
    /// waiting on an in-flight read never stalls other cameras.
    pub fn release(&self, camera_id: CameraId) {
        let to_close = {
            let mut entries = self.lock();

            let Some(handle) = entries.cameras.remove(&camera_id) else {
                tracing::debug!(camera_id, "Release of unregistered camera ignored");
                return;
            };

            match self.config.mode {
                MultiplexMode::Exclusive => Some(handle),
                MultiplexMode::SharedSingle => {
                    let last = match entries.shared.as_mut() {
                        Some(slot) => {
                            slot.refs -= 1;
                            slot.refs == 0
                        }
                        None => true,
                    };
                    if last {
                        entries.shared = None;
                        Some(handle)
                    } else {
                        None
                    }
                }
            }
        };

        if let Some(handle) = to_close {
            handle.close();
        }
        tracing::info!(camera_id, "Camera released");
    }

    /// Release every registered camera, returning the released ids
    pub fn release_all(&self) -> Vec<CameraId> {
        let ids = self.registered();
        for &camera_id in &ids {
            self.release(camera_id);
        }
        ids
    }

    pub fn is_open(&self, camera_id: CameraId) -> bool {
        self.lock().cameras.contains_key(&camera_id)
    }

    /// Registered ids in ascending order
    pub fn registered(&self) -> Vec<CameraId> {
        self.lock().cameras.keys().copied().collect()
    }

    /// Registered ids with their handles, ascending by id
    pub fn handles(&self) -> Vec<(CameraId, Arc<DeviceHandle>)> {
        self.lock()
            .cameras
            .iter()
            .map(|(id, handle)| (*id, handle.clone()))
            .collect()
    }

    /// Cameras a viewer may open
    pub fn list_available(&self) -> Vec<CameraId> {
        match &self.config.discovery {
            Discovery::Catalog(ids) => ids.clone(),
            Discovery::Probe { max_index } => {
                let found: Vec<CameraId> = (0..*max_index)
                    .filter(|&index| self.factory.probe(index))
                    .collect();
                tracing::info!(?found, max_index, "Probed capture devices");
                found
            }
        }
    }

    fn open_physical(&self, camera_id: CameraId, index: u32) -> Result<DeviceHandle> {
        let source = self
            .factory
            .open(index)
            .map_err(|source| Error::DeviceOpen { camera_id, source })?;
        tracing::info!(camera_id, device_index = index, "Capture device opened");
        Ok(DeviceHandle::new(index, source))
    }

    fn lock(&self) -> MutexGuard<'_, Entries> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl std::fmt::Debug for CameraRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CameraRegistry")
            .field("config", &self.config)
            .field("registered", &self.registered())
            .finish()
    }
}
