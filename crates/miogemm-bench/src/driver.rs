//! The descent driver: local search over the graph under a time budget.

use std::time::{Duration, Instant};

use indexmap::IndexSet;

use miogemm_core::errors::ErrorInfo;
use miogemm_core::{
    derive, derive_substream_seed, Constraints, Geometry, HyPas, KernelSource, MiogError, Offsets,
    OutPart, RngHandle, Solution, Ver, Writer,
};
use miogemm_gen::{Bundle, KernelType};

use miogemm_graph::SearchGraph;

use crate::bench::{BenchResult, BenchStatus, Benchmarker};
use crate::device::DeviceHandle;
use crate::findparams::FindParams;

/// Owns one device queue and drives searches and explicit benchmarks on a
/// fixed geometry.
pub struct Tuner {
    bench: Benchmarker,
}

impl Tuner {
    /// Opens the device for the geometry.
    pub fn new(
        device: Box<dyn DeviceHandle>,
        geometry: Geometry,
        toff: Offsets,
    ) -> Result<Self, MiogError> {
        Ok(Self {
            bench: Benchmarker::new(device, geometry, toff)?,
        })
    }

    /// The benchmarker, for callers that stage their own runs.
    pub fn benchmarker_mut(&mut self) -> &mut Benchmarker {
        &mut self.bench
    }

    /// Searches for the fastest hyperparameters under a wall-clock budget.
    ///
    /// Maintains the best solution found; every recoverable failure reduces
    /// to "this neighbor is unusable". A fatal device error aborts with the
    /// best solution so far, or propagates when there is none yet.
    pub fn find(
        &mut self,
        budget_s: f64,
        constraints: &Constraints,
        params: &FindParams,
        writer: &mut Writer,
    ) -> Result<Solution, MiogError> {
        let start = Instant::now();
        let deadline = start + Duration::from_secs_f64(budget_s.max(0.0));
        let geometry = self.bench.geometry().clone();
        let devinfo = self.bench.devinfo().clone();
        let graph = SearchGraph::new(geometry.clone(), devinfo.clone(), constraints)?;
        let check_accuracy = params.verbosity == Ver::Accuracy;

        writer.write(
            OutPart::Mai,
            &format!(
                "find: geometry {} budget {budget_s}s seed {}",
                geometry.canonical_string(),
                params.seed
            ),
        );

        let mut visited: IndexSet<String> = IndexSet::new();
        let mut poisoned: IndexSet<String> = IndexSet::new();
        let mut best: Option<Solution> = None;
        let mut descent = 0u64;

        'descents: loop {
            let mut rng = RngHandle::from_seed(derive_substream_seed(params.seed, descent));
            let mut current = match graph.random_valid_start(&mut rng) {
                Ok(hp) => hp,
                Err(err) => {
                    // A failed restart ends the search with what we have.
                    if let Some(best) = best {
                        return Ok(best);
                    }
                    return Err(err);
                }
            };

            self.consider(
                &current,
                params,
                check_accuracy,
                deadline,
                start,
                &mut visited,
                &mut poisoned,
                &mut best,
                writer,
            )?;

            loop {
                if Instant::now() >= deadline {
                    break 'descents;
                }
                let mut improved = false;
                for neighbor in graph.get_neighbors(&current) {
                    if Instant::now() >= deadline {
                        break 'descents;
                    }
                    let key = neighbor.canonical_string();
                    if visited.contains(&key) || poisoned.contains(&key) {
                        continue;
                    }
                    if params.enforce_deterministic && neighbor.uses_atomics() {
                        visited.insert(key);
                        continue;
                    }
                    if derive(&geometry, &devinfo, &neighbor).is_err() {
                        visited.insert(key);
                        continue;
                    }
                    if self.consider(
                        &neighbor,
                        params,
                        check_accuracy,
                        deadline,
                        start,
                        &mut visited,
                        &mut poisoned,
                        &mut best,
                        writer,
                    )? {
                        current = neighbor;
                        improved = true;
                        break;
                    }
                }
                if !improved {
                    visited.insert(current.canonical_string());
                    if params.allow_restart && Instant::now() < deadline {
                        descent += 1;
                        writer.write(
                            OutPart::Mai,
                            &format!("neighborhood exhausted, restarting (descent {descent})"),
                        );
                        continue 'descents;
                    }
                    break 'descents;
                }
            }
        }

        match best {
            Some(solution) => {
                writer.write(
                    OutPart::Mai,
                    &format!(
                        "best: {}  {:.6} ms  {:.2} gflops (found at {:.2}s)",
                        solution.hypas.canonical_string(),
                        solution.median_time_ms,
                        solution.median_gflops,
                        solution.discovery_time_s
                    ),
                );
                Ok(solution)
            }
            None => Err(MiogError::NoValidStart(ErrorInfo::new(
                "find-empty",
                "budget exhausted before any candidate was benchmarked",
            ))),
        }
    }

    /// Benchmarks an explicit list of assignments without searching.
    /// Summaries go to the BEN channel; aggregates only.
    pub fn benchgemm(
        &mut self,
        hypas_list: &[HyPas],
        params: &FindParams,
        writer: &mut Writer,
    ) -> Result<Vec<BenchResult>, MiogError> {
        let mut out = Vec::with_capacity(hypas_list.len());
        for hp in hypas_list {
            let result = self.bench.benchmark(hp, params, false, None, writer)?;
            writer.write(
                OutPart::Ben,
                &format!(
                    "{}  status {:?}  {:.6} ms  {:.2} gflops",
                    hp.canonical_string(),
                    result.status,
                    result.median_time_ms,
                    result.median_gflops
                ),
            );
            out.push(result);
        }
        Ok(out)
    }

    /// Benchmarks one candidate and folds it into the best-so-far state.
    /// Returns whether the candidate became the new best.
    #[allow(clippy::too_many_arguments)]
    fn consider(
        &mut self,
        hp: &HyPas,
        params: &FindParams,
        check_accuracy: bool,
        deadline: Instant,
        search_start: Instant,
        visited: &mut IndexSet<String>,
        poisoned: &mut IndexSet<String>,
        best: &mut Option<Solution>,
        writer: &mut Writer,
    ) -> Result<bool, MiogError> {
        let key = hp.canonical_string();
        if visited.contains(&key) || poisoned.contains(&key) {
            return Ok(false);
        }
        if params.enforce_deterministic && hp.uses_atomics() {
            visited.insert(key);
            return Ok(false);
        }

        let result = match self
            .bench
            .benchmark(hp, params, check_accuracy, Some(deadline), writer)
        {
            Ok(result) => result,
            Err(fatal) => {
                // Fatal device errors abort the search; the caller falls
                // back to the best solution if one exists.
                return Err(fatal);
            }
        };

        match result.status {
            BenchStatus::Ok => {
                visited.insert(key);
                let is_better = match best.as_ref() {
                    Some(existing) => {
                        result.median_time_ms < existing.median_time_ms - params.epsilon_ms
                    }
                    None => true,
                };
                if is_better {
                    let solution = self.solution_for(
                        hp,
                        &result,
                        search_start.elapsed().as_secs_f64(),
                    )?;
                    writer.write(
                        OutPart::Mai,
                        &format!(
                            "new best {:.6} ms: {}",
                            result.median_time_ms,
                            hp.canonical_string()
                        ),
                    );
                    *best = Some(solution);
                    return Ok(true);
                }
                Ok(false)
            }
            BenchStatus::NumericSanityFailed => {
                poisoned.insert(key);
                Ok(false)
            }
            _ => {
                visited.insert(key);
                Ok(false)
            }
        }
    }

    fn solution_for(
        &self,
        hp: &HyPas,
        result: &BenchResult,
        discovery_time_s: f64,
    ) -> Result<Solution, MiogError> {
        let bundle = Bundle::generate(self.bench.geometry(), self.bench.devinfo(), hp)?;
        Ok(solution_from_bundle(bundle, result, discovery_time_s))
    }
}

/// Assembles a solution from an emitted bundle and its statistics.
pub fn solution_from_bundle(
    bundle: Bundle,
    result: &BenchResult,
    discovery_time_s: f64,
) -> Solution {
    let mut main_kernel = None;
    let mut betac_kernel = None;
    let mut ws_kernels = Vec::new();
    for kernel in bundle.kernels {
        let source = KernelSource {
            name: kernel.entry_name,
            source: kernel.source,
        };
        match kernel.ktype {
            KernelType::Main => main_kernel = Some(source),
            KernelType::BetaC => betac_kernel = Some(source),
            KernelType::Wsa | KernelType::Wsb => ws_kernels.push(source),
        }
    }
    Solution {
        geometry: bundle.geometry,
        hypas: bundle.hypas,
        median_time_ms: result.median_time_ms,
        median_gflops: result.median_gflops,
        discovery_time_s,
        // A bundle always carries a main kernel.
        main_kernel: main_kernel.unwrap_or(KernelSource {
            name: String::new(),
            source: String::new(),
        }),
        betac_kernel,
        ws_kernels,
    }
}
