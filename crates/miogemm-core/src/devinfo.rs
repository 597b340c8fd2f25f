//! Queried device capabilities consumed by graph construction and derive.

use serde::{Deserialize, Serialize};

/// Capabilities of the target device, as reported by its runtime.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DevInfo {
    /// Marketing or driver name of the device.
    pub device_name: String,
    /// Threads per hardware scheduling unit (wavefront / warp).
    pub wavefront_size: usize,
    /// Bytes of on-chip local memory per work group.
    pub local_mem_bytes: usize,
    /// Number of compute units.
    pub compute_units: usize,
    /// Whether the device supports 64-bit floats.
    pub supports_f64: bool,
}

impl DevInfo {
    /// Reference device used throughout the test suites: wavefront 64,
    /// 32 KiB local memory, 64 compute units, f64 capable.
    pub fn default_test_device() -> Self {
        Self {
            device_name: "reference-device".to_string(),
            wavefront_size: 64,
            local_mem_bytes: 32 * 1024,
            compute_units: 64,
            supports_f64: true,
        }
    }
}
