use crate::CameraId;

/// How logical camera ids map onto physical capture devices
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MultiplexMode {
    /// Every logical id opens the physical device with the same index
    Exclusive,
    /// All logical ids share one physical device (simulation setups)
    SharedSingle,
}

impl MultiplexMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            MultiplexMode::Exclusive => "exclusive",
            MultiplexMode::SharedSingle => "shared_single",
        }
    }
}

/// How `list_available` discovers cameras
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Discovery {
    /// Fixed list of ids, returned as-is without touching any device
    Catalog(Vec<CameraId>),
    /// Try every index in `[0, max_index)` and keep the ones that open
    Probe { max_index: u32 },
}

/// Ids advertised in simulation mode
pub const SIMULATED_CAMERA_IDS: [CameraId; 7] = [0, 1, 2, 3, 4, 5, 6];

/// Default upper bound for probe discovery
pub const DEFAULT_PROBE_MAX: u32 = 10;

/// Registry configuration, fixed for the lifetime of a registry
#[derive(Debug, Clone)]
pub struct RegistryConfig {
    pub mode: MultiplexMode,
    pub discovery: Discovery,
    /// Physical index opened in `SharedSingle` mode
    pub shared_index: u32,
}

impl RegistryConfig {
    pub fn exclusive() -> Self {
        Self {
            mode: MultiplexMode::Exclusive,
            discovery: Discovery::Probe {
                max_index: DEFAULT_PROBE_MAX,
            },
            shared_index: 0,
        }
    }

    /// Seven simulated feeds multiplexed onto physical device 0
    pub fn simulated() -> Self {
        Self {
            mode: MultiplexMode::SharedSingle,
            discovery: Discovery::Catalog(SIMULATED_CAMERA_IDS.to_vec()),
            shared_index: 0,
        }
    }
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self::exclusive()
    }
}

/// Encoding settings shared by streams and snapshots
#[derive(Debug, Clone, Copy)]
pub struct StreamConfig {
    /// JPEG quality, 1-100
    pub jpeg_quality: u8,
}

impl Default for StreamConfig {
    fn default() -> Self {
        Self { jpeg_quality: 80 }
    }
}
