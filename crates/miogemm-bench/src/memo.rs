//! Kernel compile memo: one compilation per distinct source.

use std::collections::HashMap;
use std::sync::RwLock;

use sha2::{Digest, Sha256};

use miogemm_core::MiogError;

use crate::device::{DeviceHandle, ProgramId};

/// Hex digest identifying a kernel source.
pub fn source_hash(source: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(source.as_bytes());
    let digest = hasher.finalize();
    let mut out = String::with_capacity(32);
    for byte in digest.iter().take(16) {
        out.push_str(&format!("{byte:02x}"));
    }
    out
}

/// Memoized `source hash → compiled program` mapping for one open device.
///
/// Entries are written once, on first compilation, and only read after
/// that; reads take the shared lock and never block each other.
#[derive(Debug, Default)]
pub struct CompileMemo {
    inner: RwLock<HashMap<String, ProgramId>>,
}

impl CompileMemo {
    /// An empty memo.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the memoized program for the source, compiling it first if
    /// this source has never been seen.
    pub fn get_or_compile(
        &self,
        device: &mut dyn DeviceHandle,
        source: &str,
        entry_name: &str,
    ) -> Result<ProgramId, MiogError> {
        let hash = source_hash(source);
        if let Ok(memo) = self.inner.read() {
            if let Some(&program) = memo.get(&hash) {
                return Ok(program);
            }
        }
        let program = device.compile(source, entry_name)?;
        if let Ok(mut memo) = self.inner.write() {
            memo.insert(hash, program);
        }
        Ok(program)
    }

    /// Number of memoized programs.
    pub fn len(&self) -> usize {
        self.inner.read().map(|memo| memo.len()).unwrap_or(0)
    }

    /// Whether the memo is empty.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
