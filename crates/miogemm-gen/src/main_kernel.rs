//! The main tiled GEMM kernel emitter.
//!
//! Every tuning knob and derived quantity is materialized as a preprocessor
//! definition in the source header; the body below the definitions is the
//! same for all assignments. Emission is a pure function of its inputs, so
//! identical inputs yield byte-identical source.

use std::fmt::Write as _;

use miogemm_core::{Chi, DerivedParams, FloatType, Geometry, GraphRole, HyPas, NonChi};

use crate::kernelstring::{KernUses, KernelString, KernelType};

/// Emits the main kernel for a derivable assignment.
pub fn main_kernel(gg: &Geometry, hp: &HyPas, dp: &DerivedParams) -> KernelString {
    let entry = KernelType::Main.entry_name();
    let uses = KernUses {
        a: !dp.access_a.from_workspace,
        b: !dp.access_b.from_workspace,
        c: true,
        w: dp.access_a.from_workspace || dp.access_b.from_workspace,
        alpha: true,
        beta: dp.beta_in_main,
    };

    let mut ss = String::new();
    ss.push_str("/* C <- alpha * op(A) * op(B)");
    if dp.beta_in_main {
        ss.push_str(" + beta * C");
    }
    ss.push_str(" */\n");
    let _ = writeln!(ss, "#define MIOG_KTYPE {}", KernelType::Main.tag());
    if gg.floattype == FloatType::F64 {
        ss.push_str("#pragma OPENCL EXTENSION cl_khr_fp64 : enable\n");
    }
    let _ = writeln!(ss, "#define TFLOAT {}", gg.floattype.type_name());
    let _ = writeln!(ss, "#define MIOG_FSIZE {}", gg.floattype.size_bytes());

    ss.push_str("\n/* geometry */\n");
    let _ = writeln!(ss, "#define MIOG_M {}", gg.m);
    let _ = writeln!(ss, "#define MIOG_N {}", gg.n);
    let _ = writeln!(ss, "#define MIOG_K {}", gg.k);
    let _ = writeln!(ss, "#define MIOG_COLMAJ {}", u8::from(gg.is_col_major));
    let _ = writeln!(ss, "#define MIOG_TC {}", u8::from(gg.t_c));
    let _ = writeln!(ss, "#define MIOG_LDC {}", gg.ld_c);

    ss.push_str("\n/* where and how the main loop reads A and B */\n");
    let _ = writeln!(ss, "#define MIOG_A_FROM_WS {}", u8::from(dp.access_a.from_workspace));
    let _ = writeln!(ss, "#define MIOG_TA_EFF {}", u8::from(dp.access_a.transposed));
    let _ = writeln!(ss, "#define MIOG_LDA_EFF {}", dp.access_a.ld);
    let _ = writeln!(ss, "#define MIOG_A_WS_OFFSET {}", dp.access_a.ws_offset_elements);
    let _ = writeln!(ss, "#define MIOG_B_FROM_WS {}", u8::from(dp.access_b.from_workspace));
    let _ = writeln!(ss, "#define MIOG_TB_EFF {}", u8::from(dp.access_b.transposed));
    let _ = writeln!(ss, "#define MIOG_LDB_EFF {}", dp.access_b.ld);
    let _ = writeln!(ss, "#define MIOG_B_WS_OFFSET {}", dp.access_b.ws_offset_elements);

    ss.push_str("\n/* tuning parameters */\n");
    let _ = writeln!(ss, "#define MICRO_TILE_A {}", hp.chi(GraphRole::A, Chi::Mic));
    let _ = writeln!(ss, "#define MICRO_TILE_B {}", hp.chi(GraphRole::B, Chi::Mic));
    let _ = writeln!(ss, "#define PAD_A {}", hp.chi(GraphRole::A, Chi::Pad));
    let _ = writeln!(ss, "#define PAD_B {}", hp.chi(GraphRole::B, Chi::Pad));
    let _ = writeln!(ss, "#define LOAD_TO_LDS_INTERWOVEN_A {}", hp.chi(GraphRole::A, Chi::Plu));
    let _ = writeln!(ss, "#define LOAD_TO_LDS_INTERWOVEN_B {}", hp.chi(GraphRole::B, Chi::Plu));
    let _ = writeln!(ss, "#define LOAD_INTERLEAVE_WIDTH_A {}", hp.chi(GraphRole::A, Chi::Liw));
    let _ = writeln!(ss, "#define LOAD_INTERLEAVE_WIDTH_B {}", hp.chi(GraphRole::B, Chi::Liw));
    let _ = writeln!(ss, "#define MICRO_INTERWEAVE_A {}", hp.chi(GraphRole::A, Chi::Miw));
    let _ = writeln!(ss, "#define MICRO_INTERWEAVE_B {}", hp.chi(GraphRole::B, Chi::Miw));
    let _ = writeln!(ss, "#define UNROLL {}", hp.non_chi(NonChi::Unr));
    let _ = writeln!(ss, "#define GROUP_ALLOCATION {}", hp.non_chi(NonChi::Gal));
    let _ = writeln!(ss, "#define PARTIAL_UNROLL {}", hp.non_chi(NonChi::Pun));
    let _ = writeln!(ss, "#define MIOG_ICE {}", hp.non_chi(NonChi::Ice));
    let _ = writeln!(ss, "#define N_TARGET_ACTIVE_WORKGROUPS {}", hp.non_chi(NonChi::Naw));
    let _ = writeln!(ss, "#define UNROLL_FOR_OFFSET {}", hp.non_chi(NonChi::Ufo));
    let _ = writeln!(ss, "#define N_WORK_ITEMS_PER_GROUP {}", hp.non_chi(NonChi::Mac));
    let _ = writeln!(ss, "#define SKEW {}", hp.non_chi(NonChi::Skw));

    ss.push_str("\n/* derived */\n");
    let _ = writeln!(ss, "#define WG_DIM_M {}", dp.wg_dim_m);
    let _ = writeln!(ss, "#define WG_DIM_N {}", dp.wg_dim_n);
    let _ = writeln!(ss, "#define MACRO_TILE_M {}", dp.macro_tile_m);
    let _ = writeln!(ss, "#define MACRO_TILE_N {}", dp.macro_tile_n);
    let _ = writeln!(ss, "#define N_GROUPS_M {}", dp.n_groups_m);
    let _ = writeln!(ss, "#define N_GROUPS_N {}", dp.n_groups_n);
    let _ = writeln!(ss, "#define K_PER_CHUNK {}", dp.k_per_chunk);
    let _ = writeln!(ss, "#define LOADS_PER_THREAD_A {}", dp.loads_per_thread_a);
    let _ = writeln!(ss, "#define LOADS_PER_THREAD_B {}", dp.loads_per_thread_b);
    let _ = writeln!(ss, "#define MIOG_BETA_IN_MAIN {}", u8::from(dp.beta_in_main));

    ss.push_str(local_tile_declarations());
    append_entry(&mut ss, entry, &uses);
    ss.push_str(group_remap_text());
    ss.push_str(pointer_setup_text(&uses));
    ss.push_str(load_and_accumulate_text());
    ss.push_str(writeback_text(dp.beta_in_main));
    ss.push_str("}\n");

    KernelString {
        ktype: KernelType::Main,
        source: ss,
        entry_name: entry.to_string(),
        uses,
        global_work_size: dp.main_global_work_size,
        local_work_size: dp.main_local_work_size,
    }
}

fn local_tile_declarations() -> &'static str {
    r#"
/* local tiles, padded to steer bank conflicts */
#define LOCAL_A_STRIDE (MACRO_TILE_M + PAD_A)
#define LOCAL_B_STRIDE (MACRO_TILE_N + PAD_B)
#define LOCAL_A_ELEMENTS (LOCAL_A_STRIDE * UNROLL * (1 + MICRO_INTERWEAVE_A))
#define LOCAL_B_ELEMENTS (LOCAL_B_STRIDE * UNROLL * (1 + MICRO_INTERWEAVE_B))
"#
}

fn append_entry(ss: &mut String, entry: &str, uses: &KernUses) {
    ss.push_str("\n__attribute__((reqd_work_group_size(N_WORK_ITEMS_PER_GROUP, 1, 1)))\n");
    let _ = write!(ss, "__kernel void {entry}(");
    let mut params: Vec<String> = Vec::new();
    for ptr in uses.pointers() {
        let qualifier = if ptr == 'c' || ptr == 'w' {
            "__global TFLOAT* restrict"
        } else {
            "__global const TFLOAT* restrict"
        };
        params.push(format!("{qualifier} {ptr}"));
    }
    if uses.alpha {
        params.push("TFLOAT alpha".to_string());
    }
    if uses.beta {
        params.push("TFLOAT beta".to_string());
    }
    for ptr in uses.pointers() {
        params.push(format!("unsigned {ptr}_offset"));
    }
    let _ = write!(ss, "{}", params.join(", "));
    ss.push_str(")\n{\n");
}

fn group_remap_text() -> &'static str {
    r#"
unsigned group_id = get_group_id(0);
unsigned local_id = get_local_id(0);

/* split-k chunk handled by this group */
unsigned chunk = group_id % MIOG_ICE;
unsigned tile_id = group_id / MIOG_ICE;

/* group allocation: 1 marches down columns, 2 along rows, 3 walks
 * super-columns N_TARGET_ACTIVE_WORKGROUPS wide */
#if (GROUP_ALLOCATION == 1)
unsigned group_m = tile_id % N_GROUPS_M;
unsigned group_n = tile_id / N_GROUPS_M;
#elif (GROUP_ALLOCATION == 2)
unsigned group_m = tile_id / N_GROUPS_N;
unsigned group_n = tile_id % N_GROUPS_N;
#else
unsigned supercol = tile_id / (N_TARGET_ACTIVE_WORKGROUPS * N_GROUPS_M);
unsigned in_super = tile_id % (N_TARGET_ACTIVE_WORKGROUPS * N_GROUPS_M);
unsigned group_m = in_super % N_GROUPS_M;
unsigned group_n = supercol * N_TARGET_ACTIVE_WORKGROUPS + in_super / N_GROUPS_M;
if (group_n >= N_GROUPS_N) {
  group_m = tile_id % N_GROUPS_M;
  group_n = tile_id / N_GROUPS_M;
}
#endif

unsigned row_in_tile = local_id % WG_DIM_M;
unsigned col_in_tile = local_id / WG_DIM_M;
"#
}

fn pointer_setup_text(uses: &KernUses) -> &'static str {
    // The workspace pointer doubles for A and B when both are staged; the
    // per-matrix region is selected by the baked-in offsets.
    if uses.w {
        r#"
#if MIOG_A_FROM_WS
__global const TFLOAT* a_src = w + MIOG_A_WS_OFFSET + w_offset;
#else
__global const TFLOAT* a_src = a + a_offset;
#endif
#if MIOG_B_FROM_WS
__global const TFLOAT* b_src = w + MIOG_B_WS_OFFSET + w_offset;
#else
__global const TFLOAT* b_src = b + b_offset;
#endif
c += c_offset;
"#
    } else {
        r#"
__global const TFLOAT* a_src = a + a_offset;
__global const TFLOAT* b_src = b + b_offset;
c += c_offset;
"#
    }
}

fn load_and_accumulate_text() -> &'static str {
    r#"
__local TFLOAT local_a[LOCAL_A_ELEMENTS];
__local TFLOAT local_b[LOCAL_B_ELEMENTS];

TFLOAT acc[MICRO_TILE_A][MICRO_TILE_B];
for (unsigned i = 0; i < MICRO_TILE_A; ++i) {
  for (unsigned j = 0; j < MICRO_TILE_B; ++j) {
    acc[i][j] = 0;
  }
}

/* index of a stored element, honouring layout and transposition */
#define A_GLOBAL(row, kk) \
  (MIOG_TA_EFF != MIOG_COLMAJ ? (row) + (kk) * MIOG_LDA_EFF : (row) * MIOG_LDA_EFF + (kk))
#define B_GLOBAL(kk, col) \
  (MIOG_TB_EFF != MIOG_COLMAJ ? (kk) + (col) * MIOG_LDB_EFF : (kk) * MIOG_LDB_EFF + (col))

unsigned k_begin = chunk * K_PER_CHUNK;
unsigned k_end = (k_begin + K_PER_CHUNK < MIOG_K) ? k_begin + K_PER_CHUNK : MIOG_K;

#if UNROLL_FOR_OFFSET
/* align the first window downwards so later windows start on an unroll
 * boundary even when the chunk begins mid-window */
k_begin -= k_begin % UNROLL;
#endif

for (unsigned k_outer = k_begin; k_outer < k_end; k_outer += UNROLL) {
  unsigned k_window = (k_end - k_outer < UNROLL) ? k_end - k_outer : UNROLL;

  /* cooperative load of the A slab */
  for (unsigned l = 0; l < LOADS_PER_THREAD_A; ++l) {
#if LOAD_TO_LDS_INTERWOVEN_A
    unsigned flat = local_id + l * N_WORK_ITEMS_PER_GROUP;
#else
    unsigned flat = local_id * LOADS_PER_THREAD_A + l;
#endif
    unsigned row = flat % MACRO_TILE_M;
    unsigned kk = flat / MACRO_TILE_M;
    unsigned grow = group_m * MACRO_TILE_M + row;
    TFLOAT value = 0;
    if (grow < MIOG_M && kk < k_window) {
      value = a_src[A_GLOBAL(grow, k_outer + kk)];
    }
    local_a[kk * LOCAL_A_STRIDE + row] = value;
  }

  /* cooperative load of the B slab */
  for (unsigned l = 0; l < LOADS_PER_THREAD_B; ++l) {
#if LOAD_TO_LDS_INTERWOVEN_B
    unsigned flat = local_id + l * N_WORK_ITEMS_PER_GROUP;
#else
    unsigned flat = local_id * LOADS_PER_THREAD_B + l;
#endif
    unsigned col = flat % MACRO_TILE_N;
    unsigned kk = flat / MACRO_TILE_N;
    unsigned gcol = group_n * MACRO_TILE_N + col;
    TFLOAT value = 0;
    if (gcol < MIOG_N && kk < k_window) {
      value = b_src[B_GLOBAL(k_outer + kk, gcol)];
    }
    local_b[kk * LOCAL_B_STRIDE + col] = value;
  }

  barrier(CLK_LOCAL_MEM_FENCE);

#if PARTIAL_UNROLL
#pragma unroll 4
#endif
  for (unsigned kk = 0; kk < k_window; ++kk) {
    TFLOAT frag_a[MICRO_TILE_A];
    TFLOAT frag_b[MICRO_TILE_B];
    for (unsigned i = 0; i < MICRO_TILE_A; ++i) {
#if MICRO_INTERWEAVE_A
      frag_a[i] = local_a[kk * LOCAL_A_STRIDE + row_in_tile + i * WG_DIM_M];
#else
      frag_a[i] = local_a[kk * LOCAL_A_STRIDE + row_in_tile * MICRO_TILE_A + i];
#endif
    }
    for (unsigned j = 0; j < MICRO_TILE_B; ++j) {
#if MICRO_INTERWEAVE_B
      frag_b[j] = local_b[kk * LOCAL_B_STRIDE + col_in_tile + j * WG_DIM_N];
#else
      frag_b[j] = local_b[kk * LOCAL_B_STRIDE + col_in_tile * MICRO_TILE_B + j];
#endif
    }
    for (unsigned i = 0; i < MICRO_TILE_A; ++i) {
      for (unsigned j = 0; j < MICRO_TILE_B; ++j) {
        acc[i][j] += frag_a[i] * frag_b[j];
      }
    }
  }

  barrier(CLK_LOCAL_MEM_FENCE);
}
"#
}

fn writeback_text(beta_in_main: bool) -> &'static str {
    if beta_in_main {
        r#"
#define C_GLOBAL(row, col) \
  (MIOG_TC != MIOG_COLMAJ ? (row) + (col) * MIOG_LDC : (row) * MIOG_LDC + (col))

for (unsigned i = 0; i < MICRO_TILE_A; ++i) {
  for (unsigned j = 0; j < MICRO_TILE_B; ++j) {
#if MICRO_INTERWEAVE_A
    unsigned row = group_m * MACRO_TILE_M + row_in_tile + i * WG_DIM_M;
#else
    unsigned row = group_m * MACRO_TILE_M + row_in_tile * MICRO_TILE_A + i;
#endif
#if MICRO_INTERWEAVE_B
    unsigned col = group_n * MACRO_TILE_N + col_in_tile + j * WG_DIM_N;
#else
    unsigned col = group_n * MACRO_TILE_N + col_in_tile * MICRO_TILE_B + j;
#endif
    if (row < MIOG_M && col < MIOG_N) {
      c[C_GLOBAL(row, col)] = alpha * acc[i][j] + beta * c[C_GLOBAL(row, col)];
    }
  }
}
"#
    } else {
        r#"
#define C_GLOBAL(row, col) \
  (MIOG_TC != MIOG_COLMAJ ? (row) + (col) * MIOG_LDC : (row) * MIOG_LDC + (col))

/* split-k groups accumulate concurrently into the same C element */
for (unsigned i = 0; i < MICRO_TILE_A; ++i) {
  for (unsigned j = 0; j < MICRO_TILE_B; ++j) {
#if MICRO_INTERWEAVE_A
    unsigned row = group_m * MACRO_TILE_M + row_in_tile + i * WG_DIM_M;
#else
    unsigned row = group_m * MACRO_TILE_M + row_in_tile * MICRO_TILE_A + i;
#endif
#if MICRO_INTERWEAVE_B
    unsigned col = group_n * MACRO_TILE_N + col_in_tile + j * WG_DIM_N;
#else
    unsigned col = group_n * MACRO_TILE_N + col_in_tile * MICRO_TILE_B + j;
#endif
    if (row < MIOG_M && col < MIOG_N) {
      volatile __global TFLOAT* addr = &c[C_GLOBAL(row, col)];
      TFLOAT value = alpha * acc[i][j];
#if MIOG_FSIZE == 4
      union { unsigned u; float f; } prev, next;
      do {
        prev.f = *addr;
        next.f = prev.f + value;
      } while (atomic_cmpxchg((volatile __global unsigned*)addr, prev.u, next.u) != prev.u);
#else
      union { ulong u; double f; } prev, next;
      do {
        prev.f = *addr;
        next.f = prev.f + value;
      } while (atom_cmpxchg((volatile __global ulong*)addr, prev.u, next.u) != prev.u);
#endif
    }
  }
}
"#
    }
}
