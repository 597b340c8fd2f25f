#![deny(missing_docs)]

//! Core value types of the miogemm auto-tuner: problem geometry, device
//! capabilities, hyperparameter assignments and their derived quantities,
//! search constraints, solutions, and the structured output writer.

pub mod constraints;
pub mod derived;
pub mod devinfo;
pub mod errors;
pub mod floating;
pub mod geometry;
pub mod hypas;
pub mod outwriter;
pub mod rng;
pub mod solution;

pub use constraints::{Constraint, Constraints};
pub use derived::{derive, DerivedParams, EffectiveAccess};
pub use devinfo::DevInfo;
pub use errors::{DeriveError, DeriveFailure, ErrorInfo, MiogError};
pub use floating::{HostScalar, DEFAULT_ALPHA, DEFAULT_BETA};
pub use geometry::{FloatType, Geometry, Offsets};
pub use hypas::{Chi, GraphRole, HyPas, NonChi, SubHy, SKEW_CENTRE};
pub use outwriter::{OutPart, Ver, Writer};
pub use rng::{derive_substream_seed, RngHandle};
pub use solution::{KernelSource, Solution};
