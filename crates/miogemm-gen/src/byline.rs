//! Line-oriented preparation kernels: beta scaling and workspace staging.
//!
//! These kernels sweep one matrix line-by-line along its coalesced axis,
//! each work item handling `WORK_PER_THREAD` contiguous elements plus a
//! possible tail item per line.

use std::fmt::Write as _;

use miogemm_core::{FloatType, Geometry, GraphRole};

use crate::kernelstring::{KernUses, KernelString, KernelType};

/// Elements processed by each full work item.
const WORK_PER_THREAD: usize = 4;
/// Work items per group for all preparation kernels.
const LOCAL_WORK_SIZE: usize = 64;

/// Work decomposition of one by-line sweep.
struct ByLineShape {
    coal: usize,
    uncoal: usize,
    n_full_work_items_per_line: usize,
    n_work_items_per_line: usize,
    n_full_work_items: usize,
    n_work_items: usize,
    start_in_coal_last_work_item: usize,
    work_for_last_item_in_coal: usize,
}

impl ByLineShape {
    fn new(coal: usize, uncoal: usize) -> Self {
        let n_full_work_items_per_line = coal / WORK_PER_THREAD;
        let n_work_items_per_line =
            n_full_work_items_per_line + usize::from(coal % WORK_PER_THREAD != 0);
        let n_full_work_items = n_full_work_items_per_line * uncoal;
        let n_work_items = n_work_items_per_line * uncoal;
        Self {
            coal,
            uncoal,
            n_full_work_items_per_line,
            n_work_items_per_line,
            n_full_work_items,
            n_work_items,
            start_in_coal_last_work_item: WORK_PER_THREAD * n_full_work_items_per_line,
            work_for_last_item_in_coal: coal % WORK_PER_THREAD,
        }
    }

    fn n_work_groups(&self) -> usize {
        self.n_work_items / LOCAL_WORK_SIZE
            + usize::from(self.n_work_items % LOCAL_WORK_SIZE != 0)
    }

    fn global_work_size(&self) -> usize {
        self.n_work_groups() * LOCAL_WORK_SIZE
    }
}

fn preamble(ss: &mut String, floattype: FloatType) {
    if floattype == FloatType::F64 {
        ss.push_str("#pragma OPENCL EXTENSION cl_khr_fp64 : enable\n");
    }
    let _ = writeln!(ss, "#define TFLOAT {}", floattype.type_name());
    let _ = writeln!(ss, "#define MIOG_FSIZE {}", floattype.size_bytes());
}

fn how_definitions(ss: &mut String) {
    ss.push_str("/* elements each non-edge work item processes along the coalesced axis */\n");
    let _ = writeln!(ss, "#define WORK_PER_THREAD {WORK_PER_THREAD}");
    ss.push_str("/* work items per work group */\n");
    let _ = writeln!(ss, "#define N_WORK_ITEMS_PER_GROUP {LOCAL_WORK_SIZE}\n");
}

fn derived_definitions(ss: &mut String, shape: &ByLineShape) {
    let _ = writeln!(ss, "#define MIOG_DIM_COAL {}", shape.coal);
    let _ = writeln!(ss, "#define MIOG_DIM_UNCOAL {}", shape.uncoal);
    ss.push_str("/* work items per coalesced line is DIM_COAL / WORK_PER_THREAD, */\n");
    let _ = writeln!(
        ss,
        "#define N_FULL_WORK_ITEMS_PER_LINE {}",
        shape.n_full_work_items_per_line
    );
    ss.push_str("/* plus the possible tail item */\n");
    let _ = writeln!(ss, "#define N_WORK_ITEMS_PER_LINE {}", shape.n_work_items_per_line);
    let _ = writeln!(ss, "#define N_FULL_WORK_ITEMS {}", shape.n_full_work_items);
    let _ = writeln!(ss, "#define N_WORK_ITEMS {}", shape.n_work_items);
    ss.push_str("/* tail items start here in the coalesced direction */\n");
    let _ = writeln!(
        ss,
        "#define START_IN_COAL_LAST_WORK_ITEM {}",
        shape.start_in_coal_last_work_item
    );
    let _ = writeln!(
        ss,
        "#define WORK_FOR_LAST_ITEM_IN_COAL {}",
        shape.work_for_last_item_in_coal
    );
}

fn setup_coordinates(ss: &mut String) {
    ss.push_str(
        r#"
/* where this work item works */
unsigned group_id = get_group_id(0);
unsigned local_id = get_local_id(0);
unsigned global_id = group_id * N_WORK_ITEMS_PER_GROUP + local_id;

unsigned start_uncoal = 0;
unsigned start_coal = 0;

bool is_in_full_zone = (global_id < N_FULL_WORK_ITEMS);
if (is_in_full_zone) {
  start_uncoal = global_id / N_FULL_WORK_ITEMS_PER_LINE;
  start_coal = WORK_PER_THREAD * (global_id % N_FULL_WORK_ITEMS_PER_LINE);
}
else if (global_id < N_WORK_ITEMS) {
  start_uncoal = (global_id - N_FULL_WORK_ITEMS) % MIOG_DIM_UNCOAL;
  start_coal = START_IN_COAL_LAST_WORK_ITEM;
}
"#,
    );
}

fn work_loop(ss: &mut String, inner: &str) {
    let _ = writeln!(
        ss,
        r#"
if (is_in_full_zone) {{
#pragma unroll WORK_PER_THREAD
  for (unsigned i = 0; i < WORK_PER_THREAD; ++i) {{
    {inner}
  }}
}}
else if (global_id < N_WORK_ITEMS) {{
  for (unsigned i = 0; i < WORK_FOR_LAST_ITEM_IN_COAL; ++i) {{
    {inner}
  }}
}}
"#
    );
}

/// Emits the kernel scaling C by beta, used when the main kernel splits k
/// and therefore cannot scale C itself.
pub fn betac_kernel(gg: &Geometry) -> KernelString {
    let shape = ByLineShape::new(gg.coal_dim(GraphRole::C), gg.uncoal_dim(GraphRole::C));
    let entry = KernelType::BetaC.entry_name();

    let mut ss = String::new();
    ss.push_str("/* scales the used region of C by beta, one line at a time */\n");
    let _ = writeln!(ss, "#define MIOG_KTYPE {}", KernelType::BetaC.tag());
    preamble(&mut ss, gg.floattype);
    let _ = writeln!(ss, "#define MIOG_LD {}", gg.ld_c);
    how_definitions(&mut ss);
    derived_definitions(&mut ss, &shape);

    let _ = writeln!(
        ss,
        r#"
__attribute__((reqd_work_group_size(N_WORK_ITEMS_PER_GROUP, 1, 1)))
__kernel void {entry}(__global TFLOAT* restrict c, TFLOAT beta, unsigned c_offset)
{{"#
    );
    setup_coordinates(&mut ss);
    ss.push_str(
        r#"
/* move the c pointer to the first element to process */
c += c_offset;
c += start_uncoal * MIOG_LD;
c += start_coal;
"#,
    );
    work_loop(&mut ss, "c[i] *= beta;");
    ss.push_str("}\n");

    KernelString {
        ktype: KernelType::BetaC,
        source: ss,
        entry_name: entry.to_string(),
        uses: KernUses {
            c: true,
            beta: true,
            ..KernUses::default()
        },
        global_work_size: shape.global_work_size(),
        local_work_size: LOCAL_WORK_SIZE,
    }
}

/// Emits a workspace staging kernel for A or B.
///
/// `wos = 1` copies the used region into a packed buffer with the source
/// orientation; `wos = 2` transposes it so the main loop reads the
/// workspace contiguously.
pub fn ws_kernel(
    gg: &Geometry,
    role: GraphRole,
    wos: usize,
    ws_offset_elements: usize,
) -> KernelString {
    debug_assert!(role != GraphRole::C && wos >= 1 && wos <= 2);
    let shape = ByLineShape::new(gg.coal_dim(role), gg.uncoal_dim(role));
    let ktype = if role == GraphRole::A { KernelType::Wsa } else { KernelType::Wsb };
    let entry = ktype.entry_name();
    let src = if role == GraphRole::A { 'a' } else { 'b' };

    let mut ss = String::new();
    let _ = writeln!(
        ss,
        "/* stages the used region of {} into the workspace */",
        src.to_ascii_uppercase()
    );
    let _ = writeln!(ss, "#define MIOG_KTYPE {}", ktype.tag());
    preamble(&mut ss, gg.floattype);
    let _ = writeln!(ss, "#define MIOG_LD_SRC {}", gg.ld(role));
    let _ = writeln!(ss, "#define MIOG_WOS {wos}");
    let _ = writeln!(ss, "#define MIOG_WS_OFFSET {ws_offset_elements}");
    how_definitions(&mut ss);
    derived_definitions(&mut ss, &shape);

    let _ = writeln!(
        ss,
        r#"
__attribute__((reqd_work_group_size(N_WORK_ITEMS_PER_GROUP, 1, 1)))
__kernel void {entry}(__global const TFLOAT* restrict {src}, __global TFLOAT* restrict w,
                      unsigned {src}_offset, unsigned w_offset)
{{"#
    );
    setup_coordinates(&mut ss);
    let _ = writeln!(
        ss,
        r#"
/* move the {src} pointer to the first element to process */
{src} += {src}_offset;
{src} += start_uncoal * MIOG_LD_SRC;
{src} += start_coal;

/* move the w pointer to the staging region */
w += MIOG_WS_OFFSET;
w += w_offset;
"#
    );
    let inner = if wos == 1 {
        format!("w[start_uncoal * MIOG_DIM_COAL + start_coal + i] = {src}[i];")
    } else {
        format!("w[(start_coal + i) * MIOG_DIM_UNCOAL + start_uncoal] = {src}[i];")
    };
    work_loop(&mut ss, &inner);
    ss.push_str("}\n");

    let uses = if role == GraphRole::A {
        KernUses {
            a: true,
            w: true,
            ..KernUses::default()
        }
    } else {
        KernUses {
            b: true,
            w: true,
            ..KernUses::default()
        }
    };

    KernelString {
        ktype,
        source: ss,
        entry_name: entry.to_string(),
        uses,
        global_work_size: shape.global_work_size(),
        local_work_size: LOCAL_WORK_SIZE,
    }
}
