//! Host-side scalar payloads passed to kernels at their native width.

use serde::{Deserialize, Serialize};

use crate::geometry::FloatType;

/// Alpha or beta held at full precision and narrowed on demand.
///
/// The scalar is always stored as both widths; [`HostScalar::as_bytes`]
/// selects the representation matching the kernel's element type. Bytes are
/// produced through value conversion, never pointer aliasing.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct HostScalar {
    v_f64: f64,
    v_f32: f32,
}

impl HostScalar {
    /// Creates the payload from a double-precision value.
    pub fn new(v: f64) -> Self {
        Self {
            v_f64: v,
            v_f32: v as f32,
        }
    }

    /// The value at f64 precision.
    pub fn as_f64(&self) -> f64 {
        self.v_f64
    }

    /// The value at f32 precision.
    pub fn as_f32(&self) -> f32 {
        self.v_f32
    }

    /// Little-endian bytes of the value at the requested width.
    pub fn as_bytes(&self, width: FloatType) -> Vec<u8> {
        match width {
            FloatType::F32 => self.v_f32.to_le_bytes().to_vec(),
            FloatType::F64 => self.v_f64.to_le_bytes().to_vec(),
        }
    }
}

/// Default alpha used by benchmarking when the caller supplies none.
pub const DEFAULT_ALPHA: f64 = 0.415693029182343;
/// Default beta used by benchmarking when the caller supplies none.
pub const DEFAULT_BETA: f64 = 0.273539340934342;
