//! The device-runtime boundary.
//!
//! The tuner drives any runtime implementing [`DeviceHandle`]; the trait is
//! the only place real polymorphism exists in the workspace, injected at
//! driver construction as a trait object. Identifiers are opaque
//! device-issued integers.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use miogemm_core::{DevInfo, MiogError};

/// Per-operation timeout: a compile or enqueue exceeding this is cancelled
/// at the handle level and reported as a soft failure.
pub const OP_TIMEOUT: Duration = Duration::from_secs(30);

macro_rules! opaque_id {
    ($(#[$doc:meta])* $name:ident) => {
        $(#[$doc])*
        #[derive(
            Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
        )]
        pub struct $name(u64);

        impl $name {
            /// Wraps a raw device-issued identifier.
            pub fn from_raw(raw: u64) -> Self {
                Self(raw)
            }

            /// The raw identifier.
            pub fn as_raw(self) -> u64 {
                self.0
            }
        }
    };
}

opaque_id!(
    /// Identifier of an open submission queue.
    QueueId
);
opaque_id!(
    /// Identifier of a device buffer.
    BufferId
);
opaque_id!(
    /// Identifier of a compiled program.
    ProgramId
);
opaque_id!(
    /// Identifier of an enqueued operation's completion event.
    EventId
);

/// One kernel argument: a device buffer or raw bytes passed by value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum KernelArg {
    /// A device buffer.
    Buf(BufferId),
    /// By-value bytes (scalars, offsets), little-endian.
    Bytes(Vec<u8>),
}

impl KernelArg {
    /// A by-value `unsigned` argument, as kernels take offsets.
    pub fn uint(v: usize) -> Self {
        KernelArg::Bytes((v as u64).to_le_bytes().to_vec())
    }
}

/// The capabilities the tuner requires from a device runtime.
///
/// All waits are blocking with the [`OP_TIMEOUT`] bound. Implementations
/// report refusals through the recoverable error variants (`Compile`,
/// `Enqueue`, `ProfilingMissing`) and reserve `DeviceFatal` for lost
/// devices and failed queue creation.
pub trait DeviceHandle {
    /// Opens the submission queue, optionally with event profiling.
    fn open_queue(&mut self, profiling: bool) -> Result<QueueId, MiogError>;

    /// Allocates a buffer of the given size.
    fn alloc(&mut self, queue: QueueId, size_bytes: usize, read_write: bool)
        -> Result<BufferId, MiogError>;

    /// Writes host bytes into a buffer at a byte offset.
    fn write(
        &mut self,
        queue: QueueId,
        buf: BufferId,
        offset_bytes: usize,
        host_bytes: &[u8],
    ) -> Result<EventId, MiogError>;

    /// Reads a buffer region back into a host slice.
    fn read(
        &mut self,
        queue: QueueId,
        buf: BufferId,
        offset_bytes: usize,
        host_dst: &mut [u8],
    ) -> Result<EventId, MiogError>;

    /// Compiles a kernel source for the given entry point.
    fn compile(&mut self, source: &str, entry_name: &str) -> Result<ProgramId, MiogError>;

    /// Enqueues a compiled kernel after the given events.
    fn enqueue(
        &mut self,
        queue: QueueId,
        program: ProgramId,
        args: &[KernelArg],
        global_work_size: usize,
        local_work_size: usize,
        wait_on: &[EventId],
    ) -> Result<EventId, MiogError>;

    /// Blocks until all events complete.
    fn wait(&mut self, events: &[EventId]) -> Result<(), MiogError>;

    /// Start and end of an event in device nanoseconds. Requires the queue
    /// to have been opened with profiling.
    fn event_profile(&self, event: EventId) -> Result<(u64, u64), MiogError>;

    /// Capabilities of the device.
    fn device_info(&self) -> DevInfo;

    /// Releases a buffer.
    fn release_buffer(&mut self, buf: BufferId) -> Result<(), MiogError>;
}
