//! Per-role knob ranges, edges, and start ranges.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use miogemm_core::errors::{ErrorInfo, MiogError};
use miogemm_core::{Chi, Constraint, DevInfo, Geometry, GraphRole, NonChi, SKEW_CENTRE};

/// Largest k-split factor ever considered.
const MAX_ICE: usize = 14;
/// Smallest unroll in the UNR range, used to bound the split factor.
const MIN_UNR: usize = 8;

/// The admissible values, edge relation, and seeding values of every knob
/// of one role.
///
/// Role-specific behaviour (edge shape, start-range refinement) dispatches
/// on the `role` tag; the shared mechanics live on this one concrete type.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubGraph {
    /// Role this sub-graph describes.
    pub role: GraphRole,
    /// Ascending admissible values per knob (declaration order).
    pub range: Vec<Vec<usize>>,
    /// Sparse undirected edge relation per knob; neighbor lists ascending.
    pub edges: Vec<BTreeMap<usize, Vec<usize>>>,
    /// Ascending seeding values per knob, a subset of `range`.
    pub start_range: Vec<Vec<usize>>,
}

impl SubGraph {
    /// Builds the sub-graph for one role: materialise ranges, build edges,
    /// refine the start range, then intersect everything with the
    /// constraint. Emptiness is validated by the caller across all roles.
    pub fn new(
        role: GraphRole,
        gg: &Geometry,
        devinfo: &DevInfo,
        constraint: &Constraint,
    ) -> Result<Self, MiogError> {
        let range = base_ranges(role, gg, devinfo);
        let edges = base_edges(role, &range);
        let mut sub = Self {
            role,
            start_range: range.clone(),
            range,
            edges,
        };
        sub.refine_start_range(gg, devinfo);
        sub.apply_constraint(constraint)?;
        Ok(sub)
    }

    /// Whether the value is admissible for the knob.
    pub fn contains(&self, knob: usize, value: usize) -> bool {
        self.range[knob].binary_search(&value).is_ok()
    }

    /// Edge neighbors of a value, ascending. Empty when the value has no
    /// edges inside the intersected range.
    pub fn neighbors_of(&self, knob: usize, value: usize) -> &[usize] {
        self.edges[knob]
            .get(&value)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    fn refine_start_range(&mut self, gg: &Geometry, devinfo: &DevInfo) {
        match self.role {
            GraphRole::A | GraphRole::B => {
                let dim = if self.role == GraphRole::A { gg.m } else { gg.n };
                // Small problems cannot seed with large micro tiles.
                refine(&mut self.start_range[Chi::Mic.index()], |v| v * MIN_UNR <= dim);
                // Seeding never stages through the workspace.
                refine(&mut self.start_range[Chi::Wos.index()], |v| v == 0);
                refine(&mut self.start_range[Chi::Pad.index()], |v| v == 1);
            }
            GraphRole::C => {
                // Split-k and off-centre skews are reachable, not seeds.
                refine(&mut self.start_range[NonChi::Ice.index()], |v| v == 1);
                refine(&mut self.start_range[NonChi::Skw.index()], |v| v == SKEW_CENTRE);
                refine(&mut self.start_range[NonChi::Unr.index()], |v| v <= 32);
                let cap = devinfo.wavefront_size * devinfo.compute_units;
                refine(&mut self.start_range[NonChi::Mac.index()], |v| v <= cap);
            }
        }
    }

    fn apply_constraint(&mut self, constraint: &Constraint) -> Result<(), MiogError> {
        if constraint.role != self.role {
            return Err(MiogError::UserInput(
                ErrorInfo::new("subgraph-role", "constraint role does not match sub-graph role")
                    .with_context("graph", self.role.tag())
                    .with_context("constraint", constraint.role.tag()),
            ));
        }
        for knob in 0..self.role.n_knobs() {
            if let Some(subset) = constraint.range_subset(knob) {
                self.range[knob].retain(|v| subset.contains(v));
            }
            if let Some(subset) = constraint.start_subset(knob) {
                self.start_range[knob].retain(|v| subset.contains(v));
            }
            // Start values and edges survive only inside the final range.
            let range = &self.range[knob];
            self.start_range[knob].retain(|v| range.contains(v));
            self.edges[knob].retain(|v, _| range.contains(v));
            for targets in self.edges[knob].values_mut() {
                targets.retain(|v| range.contains(v));
            }
        }
        Ok(())
    }
}

fn refine(values: &mut Vec<usize>, keep: impl Fn(usize) -> bool) {
    let refined: Vec<usize> = values.iter().copied().filter(|&v| keep(v)).collect();
    // A refinement that empties the range is ignored: the unrefined values
    // remain reachable seeds and emptiness then only arises from constraints.
    if !refined.is_empty() {
        *values = refined;
    }
}

fn base_ranges(role: GraphRole, gg: &Geometry, devinfo: &DevInfo) -> Vec<Vec<usize>> {
    match role {
        GraphRole::A | GraphRole::B => {
            let wos = if gg.ws_size == 0 { vec![0] } else { vec![0, 1, 2] };
            vec![
                vec![1, 2, 3, 4, 5, 6, 8], // MIC
                vec![0, 1, 2],             // PAD
                vec![0, 1],                // PLU
                vec![0, 1],                // LIW
                vec![0, 1],                // MIW
                wos,                       // WOS
            ]
        }
        GraphRole::C => {
            let ice_cap = MAX_ICE.min(gg.k.div_ceil(MIN_UNR)).max(1);
            let mac = if devinfo.wavefront_size >= 64 {
                vec![64, 256]
            } else {
                vec![32, 64, 128, 256]
            };
            vec![
                vec![8, 16, 32, 64],            // UNR
                vec![1, 2, 3],                  // GAL
                vec![0, 1],                     // PUN
                (1..=ice_cap).collect(),        // ICE
                vec![16, 64],                   // NAW
                vec![0, 1],                     // UFO
                mac,                            // MAC
                (7..=13).collect(),             // SKW
            ]
        }
    }
}

fn base_edges(role: GraphRole, range: &[Vec<usize>]) -> Vec<BTreeMap<usize, Vec<usize>>> {
    let mut out = Vec::with_capacity(range.len());
    for (knob, values) in range.iter().enumerate() {
        let pairs: Vec<(usize, usize)> = match role {
            GraphRole::A | GraphRole::B => match knob {
                0 => vec![(1, 2), (1, 3), (2, 3), (2, 4), (3, 4), (4, 5), (4, 6), (5, 6), (6, 8)],
                _ => path_pairs(values),
            },
            GraphRole::C => match knob {
                // UNR: doubling steps plus skip-a-step shortcuts.
                0 => vec![(8, 16), (16, 32), (32, 64), (8, 32), (16, 64)],
                // GAL: the three strategies are mutually adjacent.
                1 => vec![(1, 2), (1, 3), (2, 3)],
                // ICE: steps of one and two.
                3 => step_pairs(values, &[1, 2]),
                _ => path_pairs(values),
            },
        };
        out.push(symmetric_adjacency(values, &pairs));
    }
    out
}

/// Adjacent pairs along the ascending range.
fn path_pairs(values: &[usize]) -> Vec<(usize, usize)> {
    values.windows(2).map(|w| (w[0], w[1])).collect()
}

/// Pairs at the given distances along the value axis.
fn step_pairs(values: &[usize], steps: &[usize]) -> Vec<(usize, usize)> {
    let mut out = Vec::new();
    for &v in values {
        for &s in steps {
            if values.contains(&(v + s)) {
                out.push((v, v + s));
            }
        }
    }
    out
}

fn symmetric_adjacency(values: &[usize], pairs: &[(usize, usize)]) -> BTreeMap<usize, Vec<usize>> {
    let mut map: BTreeMap<usize, Vec<usize>> = values.iter().map(|&v| (v, Vec::new())).collect();
    for &(x, y) in pairs {
        if !values.contains(&x) || !values.contains(&y) {
            continue;
        }
        if let Some(list) = map.get_mut(&x) {
            if !list.contains(&y) {
                list.push(y);
            }
        }
        if let Some(list) = map.get_mut(&y) {
            if !list.contains(&x) {
                list.push(x);
            }
        }
    }
    for list in map.values_mut() {
        list.sort_unstable();
    }
    map
}
