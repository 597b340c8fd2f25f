//! Quantities derived from (geometry, device, hyperparameters).
//!
//! Derivation doubles as the validity check: a hyperparameter set is valid
//! for a geometry exactly when `derive` succeeds. Failures carry a reason
//! class and are recovered by the search driver.

use serde::{Deserialize, Serialize};

use crate::devinfo::DevInfo;
use crate::errors::{DeriveError, DeriveFailure};
use crate::geometry::{FloatType, Geometry};
use crate::hypas::{Chi, GraphRole, HyPas, NonChi, SKEW_CENTRE};

/// Per-matrix description of how the main kernel reads A or B.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct EffectiveAccess {
    /// Whether the matrix is read from the workspace instead of its buffer.
    pub from_workspace: bool,
    /// Leading dimension at the read site.
    pub ld: usize,
    /// Transpose flag at the read site.
    pub transposed: bool,
    /// Element offset inside the workspace (0 when `from_workspace` is false).
    pub ws_offset_elements: usize,
}

/// Work sizes, tile shapes, memory requirements and strides for one
/// hyperparameter assignment on one geometry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DerivedParams {
    /// Work-group grid dimension along m.
    pub wg_dim_m: usize,
    /// Work-group grid dimension along n.
    pub wg_dim_n: usize,
    /// Macro tile height (m direction).
    pub macro_tile_m: usize,
    /// Macro tile width (n direction).
    pub macro_tile_n: usize,
    /// Work groups along m.
    pub n_groups_m: usize,
    /// Work groups along n.
    pub n_groups_n: usize,
    /// k-split factor (the ICE knob).
    pub split_k: usize,
    /// k-extent handled by one split chunk, rounded up to whole unrolls.
    pub k_per_chunk: usize,
    /// Global work size of the main kernel.
    pub main_global_work_size: usize,
    /// Local work size of the main kernel.
    pub main_local_work_size: usize,
    /// Local memory bytes required per work group.
    pub local_mem_bytes: usize,
    /// C elements accumulated per work item.
    pub per_thread_work: usize,
    /// A elements loaded per work item per unroll pass.
    pub loads_per_thread_a: usize,
    /// B elements loaded per work item per unroll pass.
    pub loads_per_thread_b: usize,
    /// Workspace elements staged for A.
    pub ws_elements_a: usize,
    /// Workspace elements staged for B.
    pub ws_elements_b: usize,
    /// Total workspace bytes required.
    pub required_ws_bytes: usize,
    /// How the main kernel reads A.
    pub access_a: EffectiveAccess,
    /// How the main kernel reads B.
    pub access_b: EffectiveAccess,
    /// Whether the main kernel applies the beta scaling itself.
    pub beta_in_main: bool,
    /// Whether C accumulation goes through atomics.
    pub uses_atomics: bool,
}

impl DerivedParams {
    /// Grid sizes of the main kernel for a new problem size under the same
    /// hyperparameters. Valid as long as the macro tile fits in `m` × `n`.
    pub fn main_worksize_params(&self, m: usize, n: usize) -> (usize, usize) {
        let groups_m = div_ceil(m, self.macro_tile_m);
        let groups_n = div_ceil(n, self.macro_tile_n);
        let gws = groups_m * groups_n * self.split_k * self.main_local_work_size;
        (gws, self.main_local_work_size)
    }
}

/// Computes derived parameters, or explains why the assignment is invalid.
pub fn derive(gg: &Geometry, devinfo: &DevInfo, hp: &HyPas) -> Result<DerivedParams, DeriveError> {
    if gg.floattype == FloatType::F64 && !devinfo.supports_f64 {
        return Err(DeriveError::new(
            DeriveFailure::Other,
            "geometry is f64 but the device does not support 64-bit floats",
        ));
    }

    let mic_a = hp.chi(GraphRole::A, Chi::Mic);
    let mic_b = hp.chi(GraphRole::B, Chi::Mic);
    if mic_a == 0 || mic_b == 0 {
        return Err(DeriveError::new(
            DeriveFailure::IllegalMicroTile,
            "micro tile dimensions must be positive",
        ));
    }

    let mac = hp.non_chi(NonChi::Mac);
    if mac == 0 || !mac.is_power_of_two() {
        return Err(DeriveError::new(
            DeriveFailure::Other,
            format!("work group size {mac} is not a power of two"),
        ));
    }
    let p = mac.trailing_zeros() as isize;
    let skw = hp.non_chi(NonChi::Skw) as isize;
    let exp_m = (p + 1) / 2 + skw - SKEW_CENTRE as isize;
    if exp_m < 0 || exp_m > p {
        return Err(DeriveError::new(
            DeriveFailure::SkewInfeasible,
            format!("skew {skw} places the m-exponent at {exp_m}, outside [0, {p}]"),
        ));
    }
    let wg_dim_m = 1usize << exp_m;
    let wg_dim_n = mac / wg_dim_m;

    let macro_tile_m = mic_a * wg_dim_m;
    let macro_tile_n = mic_b * wg_dim_n;
    if macro_tile_m > gg.m || macro_tile_n > gg.n {
        return Err(DeriveError::new(
            DeriveFailure::TileExceedsProblem,
            format!(
                "macro tile {macro_tile_m}x{macro_tile_n} exceeds problem {}x{}",
                gg.m, gg.n
            ),
        ));
    }

    let unr = hp.non_chi(NonChi::Unr);
    if unr == 0 {
        return Err(DeriveError::new(DeriveFailure::Other, "unroll must be positive"));
    }
    // Each work item takes an equal share of the tile loads per unroll pass.
    if (macro_tile_m * unr) % mac != 0 || (macro_tile_n * unr) % mac != 0 {
        return Err(DeriveError::new(
            DeriveFailure::IllegalMicroTile,
            format!(
                "tile loads not divisible over the work group: \
                 ({macro_tile_m}*{unr}) and ({macro_tile_n}*{unr}) vs {mac} work items"
            ),
        ));
    }
    let loads_per_thread_a = macro_tile_m * unr / mac;
    let loads_per_thread_b = macro_tile_n * unr / mac;

    let fs = gg.float_size_bytes();
    let pad_a = hp.chi(GraphRole::A, Chi::Pad);
    let pad_b = hp.chi(GraphRole::B, Chi::Pad);
    let buffers_a = 1 + hp.chi(GraphRole::A, Chi::Miw);
    let buffers_b = 1 + hp.chi(GraphRole::B, Chi::Miw);
    let local_mem_bytes =
        unr * (macro_tile_m + pad_a) * buffers_a * fs + unr * (macro_tile_n + pad_b) * buffers_b * fs;
    if local_mem_bytes > devinfo.local_mem_bytes {
        return Err(DeriveError::new(
            DeriveFailure::LocalMemoryOverflow,
            format!(
                "work group needs {local_mem_bytes} bytes of local memory, \
                 device advertises {}",
                devinfo.local_mem_bytes
            ),
        ));
    }

    let ice = hp.non_chi(NonChi::Ice);
    if ice == 0 {
        return Err(DeriveError::new(DeriveFailure::Other, "split factor must be positive"));
    }
    let n_unroll_chunks = div_ceil(gg.k, unr);
    if ice > n_unroll_chunks {
        return Err(DeriveError::new(
            DeriveFailure::Other,
            format!("split factor {ice} exceeds the {n_unroll_chunks} unroll chunks of k"),
        ));
    }
    let k_per_chunk = div_ceil(n_unroll_chunks, ice) * unr;

    let gal = hp.non_chi(NonChi::Gal);
    if !(1..=3).contains(&gal) {
        return Err(DeriveError::new(
            DeriveFailure::Other,
            format!("unknown group allocation strategy {gal}"),
        ));
    }

    let wos_a = hp.chi(GraphRole::A, Chi::Wos);
    let wos_b = hp.chi(GraphRole::B, Chi::Wos);
    if wos_a > 2 || wos_b > 2 {
        return Err(DeriveError::new(
            DeriveFailure::Other,
            "workspace-use flag out of range (0, 1 or 2)",
        ));
    }
    let ws_elements_a = if wos_a > 0 { gg.m * gg.k } else { 0 };
    let ws_elements_b = if wos_b > 0 { gg.k * gg.n } else { 0 };
    let required_ws_bytes = (ws_elements_a + ws_elements_b) * fs;
    if required_ws_bytes > gg.ws_size {
        return Err(DeriveError::new(
            DeriveFailure::WorkspaceMissing,
            format!(
                "staging requires {required_ws_bytes} workspace bytes, geometry provides {}",
                gg.ws_size
            ),
        ));
    }

    let access_a = effective_access(gg, GraphRole::A, wos_a, 0);
    let access_b = effective_access(gg, GraphRole::B, wos_b, ws_elements_a);

    let n_groups_m = div_ceil(gg.m, macro_tile_m);
    let n_groups_n = div_ceil(gg.n, macro_tile_n);
    let main_global_work_size = n_groups_m * n_groups_n * ice * mac;

    Ok(DerivedParams {
        wg_dim_m,
        wg_dim_n,
        macro_tile_m,
        macro_tile_n,
        n_groups_m,
        n_groups_n,
        split_k: ice,
        k_per_chunk,
        main_global_work_size,
        main_local_work_size: mac,
        local_mem_bytes,
        per_thread_work: mic_a * mic_b,
        loads_per_thread_a,
        loads_per_thread_b,
        ws_elements_a,
        ws_elements_b,
        required_ws_bytes,
        access_a,
        access_b,
        beta_in_main: ice == 1,
        uses_atomics: ice > 1,
    })
}

fn effective_access(
    gg: &Geometry,
    role: GraphRole,
    wos: usize,
    ws_offset_elements: usize,
) -> EffectiveAccess {
    match wos {
        // Read straight from the source buffer.
        0 => EffectiveAccess {
            from_workspace: false,
            ld: gg.ld(role),
            transposed: gg.transposed(role),
            ws_offset_elements: 0,
        },
        // Packed copy: same orientation, gap-free leading dimension.
        1 => EffectiveAccess {
            from_workspace: true,
            ld: gg.coal_dim(role),
            transposed: gg.transposed(role),
            ws_offset_elements,
        },
        // Coalescing copy: orientation flipped so the main loop reads the
        // workspace contiguously.
        _ => EffectiveAccess {
            from_workspace: true,
            ld: gg.uncoal_dim(role),
            transposed: !gg.transposed(role),
            ws_offset_elements,
        },
    }
}

/// Integer ceiling division.
pub fn div_ceil(num: usize, den: usize) -> usize {
    num.div_ceil(den.max(1))
}
