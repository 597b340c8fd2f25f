#![deny(missing_docs)]

//! Benchmarking and search: the device boundary, the compile memo, the
//! benchmark loop, the accuracy checker, and the descent driver.

pub mod accuracy;
mod bench;
mod device;
mod driver;
mod findparams;
mod memo;
mod sim;

pub use bench::{gflops_at, BenchResult, BenchStatus, Benchmarker};
pub use device::{
    BufferId, DeviceHandle, EventId, KernelArg, ProgramId, QueueId, OP_TIMEOUT,
};
pub use driver::{solution_from_bundle, Tuner};
pub use findparams::{FindParams, SummStat};
pub use memo::{source_hash, CompileMemo};
pub use sim::{CostModel, SimConfig, SimDevice};
