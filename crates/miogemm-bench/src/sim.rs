//! A deterministic host-side device.
//!
//! `SimDevice` implements [`DeviceHandle`] without any GPU: kernels are
//! "compiled" by parsing the preprocessor definitions the generator bakes
//! into every source header, and enqueues execute the corresponding
//! computation on host buffers under an arithmetic cost model. Identical
//! inputs produce identical buffers and identical simulated timings, which
//! is what the driver and the test suites need. Real runtimes implement
//! [`DeviceHandle`] outside this workspace.

use std::collections::{BTreeMap, HashMap};
use std::time::Duration;

use miogemm_core::errors::{ErrorInfo, MiogError};
use miogemm_core::DevInfo;

use crate::device::{BufferId, DeviceHandle, EventId, KernelArg, ProgramId, QueueId};

/// How enqueue durations are simulated.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum CostModel {
    /// Arithmetic model rewarding balanced tiles and large work groups.
    Modeled,
    /// Every enqueue takes the same simulated time.
    ConstantNs(u64),
}

/// Behaviour switches for fault injection and timing tests.
#[derive(Debug, Clone)]
pub struct SimConfig {
    /// Duration model for enqueues.
    pub cost: CostModel,
    /// Real host sleep per main-kernel enqueue, for wall-clock tests.
    pub sleep_per_main_enqueue: Option<Duration>,
    /// Corrupt the output of the first main program ever compiled.
    pub corrupt_first_main: bool,
    /// Report profiling as unavailable even on profiling queues.
    pub deny_profiling: bool,
    /// Refuse to compile sources containing this marker.
    pub fail_compile_marker: Option<String>,
}

impl Default for SimConfig {
    fn default() -> Self {
        Self {
            cost: CostModel::Modeled,
            sleep_per_main_enqueue: None,
            corrupt_first_main: false,
            deny_profiling: false,
            fail_compile_marker: None,
        }
    }
}

#[derive(Debug, Clone)]
struct ProgramMeta {
    ktype: i64,
    defines: BTreeMap<String, i64>,
    corrupt: bool,
}

impl ProgramMeta {
    fn def(&self, name: &str) -> Result<i64, MiogError> {
        self.defines.get(name).copied().ok_or_else(|| {
            MiogError::Enqueue(
                ErrorInfo::new("sim-missing-define", "kernel source lacks a required definition")
                    .with_context("define", name),
            )
        })
    }

    fn def_usize(&self, name: &str) -> Result<usize, MiogError> {
        Ok(self.def(name)? as usize)
    }

    fn def_flag(&self, name: &str) -> Result<bool, MiogError> {
        Ok(self.def(name)? != 0)
    }
}

/// Deterministic in-process device.
#[derive(Debug)]
pub struct SimDevice {
    devinfo: DevInfo,
    config: SimConfig,
    next_id: u64,
    clock_ns: u64,
    queue: Option<(QueueId, bool)>,
    buffers: HashMap<u64, Vec<u8>>,
    programs: HashMap<u64, ProgramMeta>,
    events: HashMap<u64, (u64, u64)>,
    mains_compiled: usize,
}

impl SimDevice {
    /// A device with the given capabilities and default behaviour.
    pub fn new(devinfo: DevInfo) -> Self {
        Self::with_config(devinfo, SimConfig::default())
    }

    /// A device with explicit behaviour switches.
    pub fn with_config(devinfo: DevInfo, config: SimConfig) -> Self {
        Self {
            devinfo,
            config,
            next_id: 1,
            clock_ns: 0,
            queue: None,
            buffers: HashMap::new(),
            programs: HashMap::new(),
            events: HashMap::new(),
            mains_compiled: 0,
        }
    }

    fn fresh_id(&mut self) -> u64 {
        let id = self.next_id;
        self.next_id += 1;
        id
    }

    fn record_event(&mut self, cost_ns: u64) -> EventId {
        let start = self.clock_ns;
        self.clock_ns += cost_ns;
        let id = self.fresh_id();
        self.events.insert(id, (start, self.clock_ns));
        EventId::from_raw(id)
    }

    fn buffer(&self, buf: BufferId) -> Result<&Vec<u8>, MiogError> {
        self.buffers.get(&buf.as_raw()).ok_or_else(|| unknown_id("buffer"))
    }

    fn queue_profiling(&self, queue: QueueId) -> Result<bool, MiogError> {
        match self.queue {
            Some((id, profiling)) if id == queue => Ok(profiling),
            _ => Err(MiogError::DeviceFatal(ErrorInfo::new(
                "sim-bad-queue",
                "operation on a queue this device did not open",
            ))),
        }
    }

    fn enqueue_cost_ns(&self, meta: &ProgramMeta) -> u64 {
        match self.config.cost {
            CostModel::ConstantNs(ns) => ns,
            CostModel::Modeled => modeled_cost_ns(meta),
        }
    }
}

fn unknown_id(what: &str) -> MiogError {
    MiogError::DeviceFatal(
        ErrorInfo::new("sim-unknown-id", "identifier was not issued by this device")
            .with_context("kind", what),
    )
}

impl DeviceHandle for SimDevice {
    fn open_queue(&mut self, profiling: bool) -> Result<QueueId, MiogError> {
        let id = QueueId::from_raw(self.fresh_id());
        self.queue = Some((id, profiling && !self.config.deny_profiling));
        Ok(id)
    }

    fn alloc(
        &mut self,
        queue: QueueId,
        size_bytes: usize,
        _read_write: bool,
    ) -> Result<BufferId, MiogError> {
        self.queue_profiling(queue)?;
        let id = self.fresh_id();
        self.buffers.insert(id, vec![0u8; size_bytes]);
        Ok(BufferId::from_raw(id))
    }

    fn write(
        &mut self,
        queue: QueueId,
        buf: BufferId,
        offset_bytes: usize,
        host_bytes: &[u8],
    ) -> Result<EventId, MiogError> {
        self.queue_profiling(queue)?;
        let data = self
            .buffers
            .get_mut(&buf.as_raw())
            .ok_or_else(|| unknown_id("buffer"))?;
        if offset_bytes + host_bytes.len() > data.len() {
            return Err(MiogError::Enqueue(ErrorInfo::new(
                "sim-write-oob",
                "write past the end of the buffer",
            )));
        }
        data[offset_bytes..offset_bytes + host_bytes.len()].copy_from_slice(host_bytes);
        let cost = 1 + host_bytes.len() as u64 / 256;
        Ok(self.record_event(cost))
    }

    fn read(
        &mut self,
        queue: QueueId,
        buf: BufferId,
        offset_bytes: usize,
        host_dst: &mut [u8],
    ) -> Result<EventId, MiogError> {
        self.queue_profiling(queue)?;
        let data = self.buffer(buf)?;
        if offset_bytes + host_dst.len() > data.len() {
            return Err(MiogError::Enqueue(ErrorInfo::new(
                "sim-read-oob",
                "read past the end of the buffer",
            )));
        }
        host_dst.copy_from_slice(&data[offset_bytes..offset_bytes + host_dst.len()]);
        let cost = 1 + host_dst.len() as u64 / 256;
        Ok(self.record_event(cost))
    }

    fn compile(&mut self, source: &str, entry_name: &str) -> Result<ProgramId, MiogError> {
        if let Some(marker) = &self.config.fail_compile_marker {
            if source.contains(marker.as_str()) {
                return Err(MiogError::Compile(
                    ErrorInfo::new("sim-compile-refused", "source rejected by fault injection")
                        .with_context("entry", entry_name),
                ));
            }
        }
        let defines = parse_defines(source);
        let ktype = *defines.get("MIOG_KTYPE").ok_or_else(|| {
            MiogError::Compile(
                ErrorInfo::new("sim-no-ktype", "source carries no kernel-type definition")
                    .with_context("entry", entry_name),
            )
        })?;
        let corrupt = self.config.corrupt_first_main && ktype == 3 && self.mains_compiled == 0;
        if ktype == 3 {
            self.mains_compiled += 1;
        }
        let id = self.fresh_id();
        self.programs.insert(
            id,
            ProgramMeta {
                ktype,
                defines,
                corrupt,
            },
        );
        Ok(ProgramId::from_raw(id))
    }

    fn enqueue(
        &mut self,
        queue: QueueId,
        program: ProgramId,
        args: &[KernelArg],
        _global_work_size: usize,
        _local_work_size: usize,
        _wait_on: &[EventId],
    ) -> Result<EventId, MiogError> {
        self.queue_profiling(queue)?;
        let meta = self
            .programs
            .get(&program.as_raw())
            .ok_or_else(|| unknown_id("program"))?
            .clone();
        match meta.ktype {
            0 | 1 => exec_ws(self, &meta, args)?,
            2 => exec_betac(self, &meta, args)?,
            3 => {
                exec_main(self, &meta, args)?;
                if let Some(sleep) = self.config.sleep_per_main_enqueue {
                    std::thread::sleep(sleep);
                }
            }
            other => {
                return Err(MiogError::Enqueue(
                    ErrorInfo::new("sim-bad-ktype", "unknown kernel type")
                        .with_context("ktype", other.to_string()),
                ))
            }
        }
        let cost = self.enqueue_cost_ns(&meta);
        Ok(self.record_event(cost))
    }

    fn wait(&mut self, _events: &[EventId]) -> Result<(), MiogError> {
        // Execution is eager; completion is immediate.
        Ok(())
    }

    fn event_profile(&self, event: EventId) -> Result<(u64, u64), MiogError> {
        let profiling = match self.queue {
            Some((_, profiling)) => profiling,
            None => false,
        };
        if !profiling {
            return Err(MiogError::ProfilingMissing(ErrorInfo::new(
                "sim-no-profiling",
                "queue was opened without profiling",
            )));
        }
        self.events
            .get(&event.as_raw())
            .copied()
            .ok_or_else(|| unknown_id("event"))
    }

    fn device_info(&self) -> DevInfo {
        self.devinfo.clone()
    }

    fn release_buffer(&mut self, buf: BufferId) -> Result<(), MiogError> {
        self.buffers
            .remove(&buf.as_raw())
            .map(|_| ())
            .ok_or_else(|| unknown_id("buffer"))
    }
}

fn parse_defines(source: &str) -> BTreeMap<String, i64> {
    let mut out = BTreeMap::new();
    for line in source.lines() {
        if let Some(rest) = line.strip_prefix("#define ") {
            let mut parts = rest.split_whitespace();
            if let (Some(name), Some(value)) = (parts.next(), parts.next()) {
                if let Ok(v) = value.parse::<i64>() {
                    out.insert(name.to_string(), v);
                }
            }
        }
    }
    out
}

/// Index of a stored matrix element, honouring layout and transposition.
fn mat_index(colmaj: bool, transposed: bool, ld: usize, row: usize, col: usize) -> usize {
    let (r, c) = if transposed { (col, row) } else { (row, col) };
    if colmaj {
        r + c * ld
    } else {
        r * ld + c
    }
}

fn read_elem(data: &[u8], fsize: usize, idx: usize) -> f64 {
    let at = idx * fsize;
    if fsize == 4 {
        let mut b = [0u8; 4];
        b.copy_from_slice(&data[at..at + 4]);
        f32::from_le_bytes(b) as f64
    } else {
        let mut b = [0u8; 8];
        b.copy_from_slice(&data[at..at + 8]);
        f64::from_le_bytes(b)
    }
}

fn write_elem(data: &mut [u8], fsize: usize, idx: usize, v: f64) {
    let at = idx * fsize;
    if fsize == 4 {
        data[at..at + 4].copy_from_slice(&(v as f32).to_le_bytes());
    } else {
        data[at..at + 8].copy_from_slice(&v.to_le_bytes());
    }
}

fn arg_buf(args: &[KernelArg], at: usize) -> Result<BufferId, MiogError> {
    match args.get(at) {
        Some(KernelArg::Buf(id)) => Ok(*id),
        _ => Err(bad_args("expected a buffer argument")),
    }
}

fn arg_uint(args: &[KernelArg], at: usize) -> Result<usize, MiogError> {
    match args.get(at) {
        Some(KernelArg::Bytes(bytes)) if bytes.len() == 8 => {
            let mut b = [0u8; 8];
            b.copy_from_slice(bytes);
            Ok(u64::from_le_bytes(b) as usize)
        }
        _ => Err(bad_args("expected an 8-byte unsigned argument")),
    }
}

fn arg_scalar(args: &[KernelArg], at: usize, fsize: usize) -> Result<f64, MiogError> {
    match args.get(at) {
        Some(KernelArg::Bytes(bytes)) if bytes.len() == fsize => {
            if fsize == 4 {
                let mut b = [0u8; 4];
                b.copy_from_slice(bytes);
                Ok(f32::from_le_bytes(b) as f64)
            } else {
                let mut b = [0u8; 8];
                b.copy_from_slice(bytes);
                Ok(f64::from_le_bytes(b))
            }
        }
        _ => Err(bad_args("expected a scalar argument of the kernel's width")),
    }
}

fn bad_args(why: &str) -> MiogError {
    MiogError::Enqueue(ErrorInfo::new("sim-bad-args", why))
}

/// Argument layout: `(src, w, src_offset, w_offset)`.
fn exec_ws(dev: &mut SimDevice, meta: &ProgramMeta, args: &[KernelArg]) -> Result<(), MiogError> {
    let fsize = meta.def_usize("MIOG_FSIZE")?;
    let coal = meta.def_usize("MIOG_DIM_COAL")?;
    let uncoal = meta.def_usize("MIOG_DIM_UNCOAL")?;
    let ld_src = meta.def_usize("MIOG_LD_SRC")?;
    let wos = meta.def_usize("MIOG_WOS")?;
    let ws_offset = meta.def_usize("MIOG_WS_OFFSET")?;

    let src = dev.buffer(arg_buf(args, 0)?)?.clone();
    let w_id = arg_buf(args, 1)?;
    let src_off = arg_uint(args, 2)?;
    let w_off = arg_uint(args, 3)?;

    let w = dev
        .buffers
        .get_mut(&w_id.as_raw())
        .ok_or_else(|| unknown_id("buffer"))?;
    for u in 0..uncoal {
        for c in 0..coal {
            let value = read_elem(&src, fsize, src_off + u * ld_src + c);
            let dst_idx = if wos == 1 {
                u * coal + c
            } else {
                c * uncoal + u
            };
            write_elem(w, fsize, ws_offset + w_off + dst_idx, value);
        }
    }
    Ok(())
}

/// Argument layout: `(c, beta, c_offset)`.
fn exec_betac(dev: &mut SimDevice, meta: &ProgramMeta, args: &[KernelArg]) -> Result<(), MiogError> {
    let fsize = meta.def_usize("MIOG_FSIZE")?;
    let coal = meta.def_usize("MIOG_DIM_COAL")?;
    let uncoal = meta.def_usize("MIOG_DIM_UNCOAL")?;
    let ld = meta.def_usize("MIOG_LD")?;

    let c_id = arg_buf(args, 0)?;
    let beta = arg_scalar(args, 1, fsize)?;
    let c_off = arg_uint(args, 2)?;

    let c = dev
        .buffers
        .get_mut(&c_id.as_raw())
        .ok_or_else(|| unknown_id("buffer"))?;
    for u in 0..uncoal {
        for cc in 0..coal {
            let idx = c_off + u * ld + cc;
            let value = read_elem(c, fsize, idx);
            write_elem(c, fsize, idx, value * beta);
        }
    }
    Ok(())
}

/// Argument layout: present pointers in `a, b, c, w` order, then alpha,
/// then beta when the kernel scales C itself, then one offset per pointer.
fn exec_main(dev: &mut SimDevice, meta: &ProgramMeta, args: &[KernelArg]) -> Result<(), MiogError> {
    let fsize = meta.def_usize("MIOG_FSIZE")?;
    let m = meta.def_usize("MIOG_M")?;
    let n = meta.def_usize("MIOG_N")?;
    let k = meta.def_usize("MIOG_K")?;
    let colmaj = meta.def_flag("MIOG_COLMAJ")?;
    let t_c = meta.def_flag("MIOG_TC")?;
    let ld_c = meta.def_usize("MIOG_LDC")?;
    let a_from_ws = meta.def_flag("MIOG_A_FROM_WS")?;
    let t_a = meta.def_flag("MIOG_TA_EFF")?;
    let ld_a = meta.def_usize("MIOG_LDA_EFF")?;
    let a_ws_offset = meta.def_usize("MIOG_A_WS_OFFSET")?;
    let b_from_ws = meta.def_flag("MIOG_B_FROM_WS")?;
    let t_b = meta.def_flag("MIOG_TB_EFF")?;
    let ld_b = meta.def_usize("MIOG_LDB_EFF")?;
    let b_ws_offset = meta.def_usize("MIOG_B_WS_OFFSET")?;
    let beta_in_main = meta.def_flag("MIOG_BETA_IN_MAIN")?;

    let uses_w = a_from_ws || b_from_ws;
    let mut at = 0usize;
    let a_id = if a_from_ws { None } else { Some(arg_buf(args, at)?) };
    at += usize::from(a_id.is_some());
    let b_id = if b_from_ws { None } else { Some(arg_buf(args, at)?) };
    at += usize::from(b_id.is_some());
    let c_id = arg_buf(args, at)?;
    at += 1;
    let w_id = if uses_w { Some(arg_buf(args, at)?) } else { None };
    at += usize::from(w_id.is_some());
    let alpha = arg_scalar(args, at, fsize)?;
    at += 1;
    let beta = if beta_in_main {
        let v = arg_scalar(args, at, fsize)?;
        at += 1;
        v
    } else {
        0.0
    };
    let a_arg_off = if a_id.is_some() { let v = arg_uint(args, at)?; at += 1; v } else { 0 };
    let b_arg_off = if b_id.is_some() { let v = arg_uint(args, at)?; at += 1; v } else { 0 };
    let c_off = arg_uint(args, at)?;
    at += 1;
    let w_arg_off = if w_id.is_some() { arg_uint(args, at)? } else { 0 };

    let w_data = match w_id {
        Some(id) => dev.buffer(id)?.clone(),
        None => Vec::new(),
    };
    let a_data = match a_id {
        Some(id) => dev.buffer(id)?.clone(),
        None => w_data.clone(),
    };
    let a_base = if a_from_ws { a_ws_offset + w_arg_off } else { a_arg_off };
    let b_data = match b_id {
        Some(id) => dev.buffer(id)?.clone(),
        None => w_data,
    };
    let b_base = if b_from_ws { b_ws_offset + w_arg_off } else { b_arg_off };

    let c = dev
        .buffers
        .get_mut(&c_id.as_raw())
        .ok_or_else(|| unknown_id("buffer"))?;
    for i in 0..m {
        for j in 0..n {
            let mut sum = 0.0f64;
            for l in 0..k {
                let av = read_elem(&a_data, fsize, a_base + mat_index(colmaj, t_a, ld_a, i, l));
                let bv = read_elem(&b_data, fsize, b_base + mat_index(colmaj, t_b, ld_b, l, j));
                sum += av * bv;
            }
            let idx = c_off + mat_index(colmaj, t_c, ld_c, i, j);
            let old = read_elem(c, fsize, idx);
            let updated = if beta_in_main {
                alpha * sum + beta * old
            } else {
                old + alpha * sum
            };
            write_elem(c, fsize, idx, updated);
        }
    }
    if meta.corrupt {
        let idx = c_off + mat_index(colmaj, t_c, ld_c, 0, 0);
        let old = read_elem(c, fsize, idx);
        write_elem(c, fsize, idx, old + 1.0e3);
    }
    Ok(())
}

/// Arithmetic cost model: a smooth landscape with an optimum at balanced
/// micro tiles, full work groups, and mid-range unrolls, so that descent
/// has a gradient to follow.
fn modeled_cost_ns(meta: &ProgramMeta) -> u64 {
    let def = |name: &str, fallback: i64| meta.defines.get(name).copied().unwrap_or(fallback);
    match meta.ktype {
        3 => {
            let m = def("MIOG_M", 1) as f64;
            let n = def("MIOG_N", 1) as f64;
            let k = def("MIOG_K", 1) as f64;
            let flops = 2.0 * m * n * k;
            let mic_work = (def("MICRO_TILE_A", 1) * def("MICRO_TILE_B", 1)) as f64;
            let u_tile = 1.0 / (1.0 + (mic_work / 32.0).ln().abs());
            let mac = def("N_WORK_ITEMS_PER_GROUP", 64) as f64;
            let u_mac = 0.55 + 0.45 * (mac / 256.0).min(1.0);
            let unr = def("UNROLL", 8) as f64;
            let u_unr = 1.0 / (1.0 + 0.35 * (unr / 16.0).log2().abs());
            let pads = (if def("PAD_A", 0) >= 1 { 1.0 } else { 0.88 })
                * (if def("PAD_B", 0) >= 1 { 1.0 } else { 0.88 });
            let split = if def("MIOG_ICE", 1) > 1 { 0.9 } else { 1.0 };
            // flops-per-nanosecond at the optimum.
            let gflops = 96.0 * u_tile * u_mac * u_unr * pads * split;
            (flops / gflops).max(1.0) as u64
        }
        _ => {
            let coal = def("MIOG_DIM_COAL", 1) as f64;
            let uncoal = def("MIOG_DIM_UNCOAL", 1) as f64;
            (2_000.0 + coal * uncoal * 0.05) as u64
        }
    }
}
