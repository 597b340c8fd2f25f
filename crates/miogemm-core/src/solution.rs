//! The emitted result of a search: kernels, hyperparameters, statistics.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::errors::{ErrorInfo, MiogError};
use crate::geometry::{FloatType, Geometry};
use crate::hypas::{Chi, GraphRole, HyPas, NonChi, SKEW_CENTRE};

/// One kernel of a solution: its entry name and full source.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KernelSource {
    /// Entry point name (`__kernel void <name>`).
    pub name: String,
    /// Full device source.
    pub source: String,
}

/// Best solution found for one geometry: the kernel program plus the
/// hyperparameters that produced it and its measured statistics.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Solution {
    /// Geometry the solution was benchmarked on.
    pub geometry: Geometry,
    /// Hyperparameters realised by the kernels.
    pub hypas: HyPas,
    /// Median (or configured statistic) kernel time in milliseconds.
    pub median_time_ms: f64,
    /// Throughput at the recorded time.
    pub median_gflops: f64,
    /// Seconds into the search at which this solution was found.
    pub discovery_time_s: f64,
    /// The main GEMM kernel.
    pub main_kernel: KernelSource,
    /// Separate beta-scaling kernel, present when the main kernel does not
    /// scale C itself.
    pub betac_kernel: Option<KernelSource>,
    /// Workspace staging kernels, in enqueue order.
    pub ws_kernels: Vec<KernelSource>,
}

impl Solution {
    /// Element type of the solution's kernels.
    pub fn floattype(&self) -> FloatType {
        self.geometry.floattype
    }

    /// Work-size parameters of the main kernel for a new problem size under
    /// the same hyperparameters. The macro tile must fit inside `m` × `n`.
    pub fn main_worksize_params(&self, m: usize, n: usize) -> Result<BTreeMap<String, usize>, MiogError> {
        let mac = self.hypas.non_chi(NonChi::Mac);
        let skw = self.hypas.non_chi(NonChi::Skw) as isize;
        if mac == 0 || !mac.is_power_of_two() {
            return Err(MiogError::UserInput(ErrorInfo::new(
                "worksize-mac",
                "work group size is not a power of two",
            )));
        }
        let p = mac.trailing_zeros() as isize;
        let exp_m = (p + 1) / 2 + skw - SKEW_CENTRE as isize;
        if exp_m < 0 || exp_m > p {
            return Err(MiogError::UserInput(ErrorInfo::new(
                "worksize-skew",
                "skew is infeasible for this work group size",
            )));
        }
        let wg_dim_m = 1usize << exp_m;
        let wg_dim_n = mac / wg_dim_m;
        let mt_m = self.hypas.chi(GraphRole::A, Chi::Mic) * wg_dim_m;
        let mt_n = self.hypas.chi(GraphRole::B, Chi::Mic) * wg_dim_n;
        if mt_m > m || mt_n > n {
            return Err(MiogError::UserInput(
                ErrorInfo::new("worksize-tile", "macro tile exceeds the requested problem size")
                    .with_context("macro_tile", format!("{mt_m}x{mt_n}"))
                    .with_context("problem", format!("{m}x{n}")),
            ));
        }
        let n_groups = m.div_ceil(mt_m) * n.div_ceil(mt_n) * self.hypas.non_chi(NonChi::Ice);
        let mut out = BTreeMap::new();
        out.insert("n_work_groups".to_string(), n_groups);
        out.insert("local_work_size".to_string(), mac);
        out.insert("global_work_size".to_string(), n_groups * mac);
        Ok(out)
    }

    /// All kernels in enqueue order: workspace stagers, beta-scale, main.
    pub fn kernels(&self) -> Vec<&KernelSource> {
        let mut out: Vec<&KernelSource> = self.ws_kernels.iter().collect();
        if let Some(betac) = &self.betac_kernel {
            out.push(betac);
        }
        out.push(&self.main_kernel);
        out
    }

    /// Serializes the solution as line-oriented text.
    ///
    /// Kernel sources must not contain a line consisting solely of `---`;
    /// the generator never emits one.
    pub fn to_text(&self) -> String {
        let mut out = String::new();
        out.push_str(&format!("# geometry={}\n", self.geometry.canonical_string()));
        out.push_str(&format!("# hypas={}\n", self.hypas.canonical_string()));
        out.push_str(&format!("# median_ms={}\n", self.median_time_ms));
        out.push_str(&format!("# gflops={}\n", self.median_gflops));
        out.push_str(&format!("# discovered_s={}\n", self.discovery_time_s));
        for kernel in self.kernels() {
            out.push_str(&kernel.name);
            out.push_str(":\n");
            out.push_str(&kernel.source);
            if !kernel.source.ends_with('\n') {
                out.push('\n');
            }
            out.push_str("---\n");
        }
        out
    }

    /// Parses the text produced by [`Solution::to_text`].
    pub fn from_text(text: &str) -> Result<Self, MiogError> {
        let mut geometry = None;
        let mut hypas = None;
        let mut median_ms = None;
        let mut gflops = None;
        let mut discovered_s = 0.0f64;
        let mut kernels: Vec<KernelSource> = Vec::new();

        let mut lines = text.lines().peekable();
        while let Some(&line) = lines.peek() {
            if let Some(rest) = line.strip_prefix("# ") {
                lines.next();
                let (key, value) = rest
                    .split_once('=')
                    .ok_or_else(|| bad_solution("header line without '='"))?;
                match key {
                    "geometry" => geometry = Some(Geometry::from_string(value)?),
                    "hypas" => hypas = Some(HyPas::from_string(value)?),
                    "median_ms" => median_ms = Some(parse_float(value)?),
                    "gflops" => gflops = Some(parse_float(value)?),
                    "discovered_s" => discovered_s = parse_float(value)?,
                    other => {
                        return Err(bad_solution(format!("unknown header '{other}'")));
                    }
                }
            } else {
                break;
            }
        }

        while let Some(line) = lines.next() {
            let name = line
                .strip_suffix(':')
                .ok_or_else(|| bad_solution("expected '<kernel-name>:' line"))?
                .to_string();
            let mut source = String::new();
            let mut terminated = false;
            for body_line in lines.by_ref() {
                if body_line == "---" {
                    terminated = true;
                    break;
                }
                source.push_str(body_line);
                source.push('\n');
            }
            if !terminated {
                return Err(bad_solution(format!("kernel '{name}' missing '---' terminator")));
            }
            kernels.push(KernelSource { name, source });
        }

        let geometry = geometry.ok_or_else(|| bad_solution("missing geometry header"))?;
        let hypas = hypas.ok_or_else(|| bad_solution("missing hypas header"))?;
        let median_time_ms = median_ms.ok_or_else(|| bad_solution("missing median_ms header"))?;
        let median_gflops = gflops.ok_or_else(|| bad_solution("missing gflops header"))?;

        let main_kernel = kernels
            .pop()
            .ok_or_else(|| bad_solution("no kernels in solution"))?;
        let betac_kernel = match kernels.last() {
            Some(k) if k.name.contains("betac") => kernels.pop(),
            _ => None,
        };

        Ok(Solution {
            geometry,
            hypas,
            median_time_ms,
            median_gflops,
            discovery_time_s: discovered_s,
            main_kernel,
            betac_kernel,
            ws_kernels: kernels,
        })
    }
}

fn parse_float(s: &str) -> Result<f64, MiogError> {
    s.parse::<f64>()
        .map_err(|_| bad_solution(format!("'{s}' is not a float")))
}

fn bad_solution(why: impl Into<String>) -> MiogError {
    MiogError::UserInput(ErrorInfo::new("solution-parse", why))
}
