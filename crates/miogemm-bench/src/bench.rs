//! Compiles, enqueues, times, and validates candidate kernel bundles.

use std::time::Instant;

use rand::RngCore;
use serde::{Deserialize, Serialize};

use miogemm_core::errors::ErrorInfo;
use miogemm_core::{
    DevInfo, FloatType, Geometry, GraphRole, HostScalar, HyPas, MiogError, Offsets, OutPart,
    RngHandle, Writer, DEFAULT_ALPHA, DEFAULT_BETA,
};
use miogemm_gen::{Bundle, KernelString};

use crate::accuracy;
use crate::device::{BufferId, DeviceHandle, EventId, KernelArg, ProgramId, QueueId};
use crate::findparams::FindParams;
use crate::memo::CompileMemo;

/// Seed of the deterministic host input matrices.
const INPUT_SEED: u64 = 0x41B2_C3D4_E5F6_0718;
/// Warmup iterations discarded before timing.
const N_WARMUP: usize = 1;

/// Outcome class of one benchmark attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BenchStatus {
    /// Statistics are valid.
    Ok,
    /// The hyperparameters do not derive on this geometry and device.
    DeriveFailed,
    /// The device refused a kernel source.
    CompileFailed,
    /// The device refused an enqueue.
    EnqueueFailed,
    /// Event timing was requested but is unavailable.
    ProfilingMissing,
    /// The accuracy check failed; the candidate is poisoned.
    NumericSanityFailed,
}

/// Statistics of one benchmarked candidate.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BenchResult {
    /// Outcome class; statistics are meaningful only for `Ok`.
    pub status: BenchStatus,
    /// Summary statistic of the timed iterations, milliseconds.
    pub median_time_ms: f64,
    /// Throughput at the summary time.
    pub median_gflops: f64,
    /// Every timed iteration, milliseconds.
    pub per_iter_times_ms: Vec<f64>,
}

impl BenchResult {
    fn failed(status: BenchStatus) -> Self {
        Self {
            status,
            median_time_ms: f64::INFINITY,
            median_gflops: 0.0,
            per_iter_times_ms: Vec::new(),
        }
    }
}

struct DeviceBuffers {
    a: BufferId,
    b: BufferId,
    c: BufferId,
    w: Option<BufferId>,
}

/// Owns the device handle, queue, input data and buffers for one geometry,
/// and benchmarks candidate hyperparameter assignments on it.
pub struct Benchmarker {
    device: Box<dyn DeviceHandle>,
    queue: QueueId,
    devinfo: DevInfo,
    memo: CompileMemo,
    geometry: Geometry,
    toff: Offsets,
    alpha: HostScalar,
    beta: HostScalar,
    host_a: Vec<f64>,
    host_b: Vec<f64>,
    host_c: Vec<f64>,
    buffers: Option<DeviceBuffers>,
}

impl Benchmarker {
    /// Opens a profiling queue on the device and prepares deterministic
    /// host inputs for the geometry. Queue creation failure is fatal.
    pub fn new(
        mut device: Box<dyn DeviceHandle>,
        geometry: Geometry,
        toff: Offsets,
    ) -> Result<Self, MiogError> {
        let queue = device.open_queue(true).map_err(|err| {
            MiogError::DeviceFatal(
                ErrorInfo::new("queue-open", "device refused to open a submission queue")
                    .with_context("cause", err.to_string()),
            )
        })?;
        let devinfo = device.device_info();

        let mut rng = RngHandle::from_seed(INPUT_SEED);
        let host_a = host_matrix(&mut rng, &geometry, GraphRole::A, toff.a);
        let host_b = host_matrix(&mut rng, &geometry, GraphRole::B, toff.b);
        let host_c = host_matrix(&mut rng, &geometry, GraphRole::C, toff.c);

        Ok(Self {
            device,
            queue,
            devinfo,
            memo: CompileMemo::new(),
            geometry,
            toff,
            alpha: HostScalar::new(DEFAULT_ALPHA),
            beta: HostScalar::new(DEFAULT_BETA),
            host_a,
            host_b,
            host_c,
            buffers: None,
        })
    }

    /// Capabilities of the underlying device.
    pub fn devinfo(&self) -> &DevInfo {
        &self.devinfo
    }

    /// Geometry the benchmarker was opened for.
    pub fn geometry(&self) -> &Geometry {
        &self.geometry
    }

    /// Scalars applied by the benchmarked GEMM.
    pub fn set_scalars(&mut self, alpha: f64, beta: f64) {
        self.alpha = HostScalar::new(alpha);
        self.beta = HostScalar::new(beta);
    }

    /// Timed iterations for this geometry: enough to cover a minimum
    /// wall-clock interval, clamped to `[2, 1000]`.
    pub fn adaptive_n_runs(&self) -> usize {
        let flops = 2.0 * self.geometry.m as f64 * self.geometry.n as f64 * self.geometry.k as f64;
        ((1.0e11 / flops).ceil() as usize).clamp(2, 1000)
    }

    /// Benchmarks one candidate: generate, compile, stage, run, aggregate.
    ///
    /// Recoverable failures come back as a failed [`BenchResult`]; only
    /// fatal device errors are returned as `Err`. When `deadline` passes,
    /// the loop stops at the next iteration boundary with the statistics
    /// gathered so far.
    pub fn benchmark(
        &mut self,
        hp: &HyPas,
        params: &FindParams,
        check_accuracy: bool,
        deadline: Option<Instant>,
        writer: &mut Writer,
    ) -> Result<BenchResult, MiogError> {
        let bundle = match Bundle::generate(&self.geometry, &self.devinfo, hp) {
            Ok(bundle) => bundle,
            Err(MiogError::Derive(err)) => {
                writer.write(OutPart::Wrn, &format!("derive rejected candidate: {err}"));
                return Ok(BenchResult::failed(BenchStatus::DeriveFailed));
            }
            Err(other) => return Err(other),
        };

        let mut programs: Vec<ProgramId> = Vec::with_capacity(bundle.kernels.len());
        for kernel in &bundle.kernels {
            match self
                .memo
                .get_or_compile(self.device.as_mut(), &kernel.source, &kernel.entry_name)
            {
                Ok(program) => programs.push(program),
                Err(MiogError::Compile(info)) => {
                    writer.write(OutPart::Wrn, &format!("compile rejected candidate: {info}"));
                    return Ok(BenchResult::failed(BenchStatus::CompileFailed));
                }
                Err(other) => return Err(other),
            }
        }

        self.ensure_buffers()?;
        self.restore_c()?;

        let dep_lines: Vec<String> = bundle
            .kernels
            .iter()
            .enumerate()
            .map(|(i, k)| {
                let prereqs: Vec<&str> = bundle
                    .prerequisites(i)
                    .into_iter()
                    .map(|p| bundle.kernels[p].ktype.as_str())
                    .collect();
                format!("{} <= [{}]", k.ktype.as_str(), prereqs.join(", "))
            })
            .collect();
        writer.write(OutPart::Dep, &dep_lines.join("; "));

        let n_timed = params
            .n_runs_per_bench
            .map(|n| n as usize)
            .unwrap_or_else(|| self.adaptive_n_runs())
            .max(2);
        let n_total = N_WARMUP + n_timed;

        let mut per_iter_ns: Vec<u64> = Vec::with_capacity(n_timed);
        let host_loop_start = Instant::now();
        let mut host_timed_iters = 0usize;

        for iteration in 0..n_total {
            let events = match self.enqueue_iteration(&bundle, &programs) {
                Ok(events) => events,
                Err(MiogError::Enqueue(info)) => {
                    writer.write(OutPart::Wrn, &format!("enqueue rejected candidate: {info}"));
                    return Ok(BenchResult::failed(BenchStatus::EnqueueFailed));
                }
                Err(other) => return Err(other),
            };
            self.device.wait(&events)?;

            if iteration == 0 && check_accuracy {
                match self.run_accuracy_check(writer) {
                    Ok(()) => {}
                    Err(MiogError::NumericSanity(info)) => {
                        writer.write(OutPart::Acc, &format!("accuracy FAILED: {info}"));
                        return Ok(BenchResult::failed(BenchStatus::NumericSanityFailed));
                    }
                    Err(other) => return Err(other),
                }
            }

            if iteration >= N_WARMUP {
                host_timed_iters += 1;
                match self.iteration_span_ns(&events) {
                    Ok(span) => per_iter_ns.push(span),
                    Err(MiogError::ProfilingMissing(_)) => {
                        // Fall back to the host clock for the whole loop.
                    }
                    Err(other) => return Err(other),
                }
            }

            if let Some(deadline) = deadline {
                if Instant::now() >= deadline && host_timed_iters > 0 {
                    break;
                }
            }
        }

        let per_iter_times_ms: Vec<f64> = if per_iter_ns.is_empty() {
            // Host-clock bracket over the timed region, divided evenly.
            let elapsed_ms = host_loop_start.elapsed().as_secs_f64() * 1.0e3;
            let per_iter = elapsed_ms / (host_timed_iters + N_WARMUP).max(1) as f64;
            vec![per_iter; host_timed_iters.max(1)]
        } else {
            per_iter_ns.iter().map(|&ns| ns as f64 / 1.0e6).collect()
        };

        let summary_ms = params.sum_stat.reduce(&per_iter_times_ms);
        let gflops = gflops_at(&self.geometry, summary_ms);
        writer.write(
            OutPart::Tra,
            &format!("{}  {summary_ms:.6} ms  {gflops:.2} gflops", hp.canonical_string()),
        );

        Ok(BenchResult {
            status: BenchStatus::Ok,
            median_time_ms: summary_ms,
            median_gflops: gflops,
            per_iter_times_ms,
        })
    }

    /// Reads the device C back as f64 values.
    pub fn read_back_c(&mut self) -> Result<Vec<f64>, MiogError> {
        let buffers = self
            .buffers
            .as_ref()
            .ok_or_else(|| MiogError::DeviceFatal(ErrorInfo::new("no-buffers", "buffers not staged")))?;
        let c = buffers.c;
        let fsize = self.geometry.float_size_bytes();
        let elements = self.toff.c + self.geometry.stored_elements(GraphRole::C);
        let mut bytes = vec![0u8; elements * fsize];
        let event = self.device.read(self.queue, c, 0, &mut bytes)?;
        self.device.wait(&[event])?;
        Ok(bytes_to_f64(&bytes, self.geometry.floattype))
    }

    fn run_accuracy_check(&mut self, writer: &mut Writer) -> Result<(), MiogError> {
        let device_c = self.read_back_c()?;
        let reference = accuracy::reference_gemm(
            &self.geometry,
            &self.toff,
            &self.host_a,
            &self.host_b,
            &self.host_c,
            self.alpha.as_f64(),
            self.beta.as_f64(),
        );
        let summary = accuracy::compare(&self.geometry, &self.toff, &device_c, &reference)?;
        writer.write(
            OutPart::Acc,
            &format!(
                "accuracy ok: max |diff| {:.3e} within {:.3e}",
                summary.max_abs_diff, summary.tolerance
            ),
        );
        Ok(())
    }

    fn enqueue_iteration(
        &mut self,
        bundle: &Bundle,
        programs: &[ProgramId],
    ) -> Result<Vec<EventId>, MiogError> {
        let mut events: Vec<EventId> = Vec::with_capacity(bundle.kernels.len());
        for (index, kernel) in bundle.kernels.iter().enumerate() {
            let wait_on: Vec<EventId> = bundle
                .prerequisites(index)
                .into_iter()
                .filter_map(|p| events.get(p).copied())
                .collect();
            let args = self.kernel_args(kernel)?;
            let event = self.device.enqueue(
                self.queue,
                programs[index],
                &args,
                kernel.global_work_size,
                kernel.local_work_size,
                &wait_on,
            )?;
            events.push(event);
        }
        Ok(events)
    }

    fn iteration_span_ns(&self, events: &[EventId]) -> Result<u64, MiogError> {
        let mut begin = u64::MAX;
        let mut end = 0u64;
        for &event in events {
            let (start_ns, end_ns) = self.device.event_profile(event)?;
            begin = begin.min(start_ns);
            end = end.max(end_ns);
        }
        Ok(end.saturating_sub(begin))
    }

    fn kernel_args(&self, kernel: &KernelString) -> Result<Vec<KernelArg>, MiogError> {
        let buffers = self
            .buffers
            .as_ref()
            .ok_or_else(|| MiogError::DeviceFatal(ErrorInfo::new("no-buffers", "buffers not staged")))?;
        let width = self.geometry.floattype;
        let mut args = Vec::new();
        for ptr in kernel.uses.pointers() {
            let id = match ptr {
                'a' => buffers.a,
                'b' => buffers.b,
                'c' => buffers.c,
                _ => buffers.w.ok_or_else(|| {
                    MiogError::Enqueue(ErrorInfo::new(
                        "no-workspace",
                        "kernel takes a workspace but none is allocated",
                    ))
                })?,
            };
            args.push(KernelArg::Buf(id));
        }
        if kernel.uses.alpha {
            args.push(KernelArg::Bytes(self.alpha.as_bytes(width)));
        }
        if kernel.uses.beta {
            args.push(KernelArg::Bytes(self.beta.as_bytes(width)));
        }
        for ptr in kernel.uses.pointers() {
            let offset = match ptr {
                'a' => self.toff.a,
                'b' => self.toff.b,
                'c' => self.toff.c,
                _ => self.toff.w,
            };
            args.push(KernelArg::uint(offset));
        }
        Ok(args)
    }

    fn ensure_buffers(&mut self) -> Result<(), MiogError> {
        if self.buffers.is_some() {
            return Ok(());
        }
        let gg = &self.geometry;
        let fsize = gg.float_size_bytes();
        let width = gg.floattype;

        let a_bytes = f64_to_bytes(&self.host_a, width);
        let b_bytes = f64_to_bytes(&self.host_b, width);
        let a = self.device.alloc(self.queue, a_bytes.len(), false)?;
        let b = self.device.alloc(self.queue, b_bytes.len(), false)?;
        let c_len = (self.toff.c + gg.stored_elements(GraphRole::C)) * fsize;
        let c = self.device.alloc(self.queue, c_len, true)?;
        let w = if gg.ws_size > 0 {
            Some(self.device.alloc(self.queue, self.toff.w * fsize + gg.ws_size, true)?)
        } else {
            None
        };

        let ev_a = self.device.write(self.queue, a, 0, &a_bytes)?;
        let ev_b = self.device.write(self.queue, b, 0, &b_bytes)?;
        self.device.wait(&[ev_a, ev_b])?;

        self.buffers = Some(DeviceBuffers { a, b, c, w });
        self.restore_c()
    }

    /// Rewrites C with its initial contents so every candidate starts from
    /// the same state.
    fn restore_c(&mut self) -> Result<(), MiogError> {
        let c_bytes = f64_to_bytes(&self.host_c, self.geometry.floattype);
        let buffers = self
            .buffers
            .as_ref()
            .ok_or_else(|| MiogError::DeviceFatal(ErrorInfo::new("no-buffers", "buffers not staged")))?;
        let c = buffers.c;
        let event = self.device.write(self.queue, c, 0, &c_bytes)?;
        self.device.wait(&[event])
    }

    /// Releases the device buffers, forcing reallocation on the next use.
    pub fn release_buffers(&mut self) -> Result<(), MiogError> {
        if let Some(buffers) = self.buffers.take() {
            self.device.release_buffer(buffers.a)?;
            self.device.release_buffer(buffers.b)?;
            self.device.release_buffer(buffers.c)?;
            if let Some(w) = buffers.w {
                self.device.release_buffer(w)?;
            }
        }
        Ok(())
    }
}

/// Throughput in gflop/s for this geometry at the given time.
pub fn gflops_at(gg: &Geometry, time_ms: f64) -> f64 {
    if time_ms <= 0.0 || !time_ms.is_finite() {
        return 0.0;
    }
    2.0 * gg.m as f64 * gg.n as f64 * gg.k as f64 / (time_ms * 1.0e6)
}

/// Deterministic input values in `[-0.5, 0.5)`, rounded through the
/// geometry's element width so staging is exact.
fn host_matrix(rng: &mut RngHandle, gg: &Geometry, role: GraphRole, offset: usize) -> Vec<f64> {
    let len = offset + gg.stored_elements(role);
    (0..len)
        .map(|_| {
            let v = rng.next_u64() as f64 / u64::MAX as f64 - 0.5;
            match gg.floattype {
                FloatType::F32 => (v as f32) as f64,
                FloatType::F64 => v,
            }
        })
        .collect()
}

fn f64_to_bytes(values: &[f64], width: FloatType) -> Vec<u8> {
    let mut out = Vec::with_capacity(values.len() * width.size_bytes());
    for &v in values {
        match width {
            FloatType::F32 => out.extend_from_slice(&(v as f32).to_le_bytes()),
            FloatType::F64 => out.extend_from_slice(&v.to_le_bytes()),
        }
    }
    out
}

fn bytes_to_f64(bytes: &[u8], width: FloatType) -> Vec<f64> {
    match width {
        FloatType::F32 => bytes
            .chunks_exact(4)
            .map(|c| {
                let mut b = [0u8; 4];
                b.copy_from_slice(c);
                f32::from_le_bytes(b) as f64
            })
            .collect(),
        FloatType::F64 => bytes
            .chunks_exact(8)
            .map(|c| {
                let mut b = [0u8; 8];
                b.copy_from_slice(c);
                f64::from_le_bytes(b)
            })
            .collect(),
    }
}
