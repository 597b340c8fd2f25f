//! The search graph over hyperparameter assignments.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use miogemm_core::errors::{ErrorInfo, MiogError};
use miogemm_core::{
    derive, Chi, Constraints, DevInfo, Geometry, GraphRole, HyPas, NonChi, RngHandle, SubHy,
    SKEW_CENTRE,
};

use crate::subgraph::SubGraph;

/// Retry budget of [`SearchGraph::random_valid_start`].
pub const MAX_START_ATTEMPTS: usize = 1_000_000;

/// One coupled-pair entry: two (role, knob, value) assignments that flip
/// together.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CoupledPair {
    /// First assignment.
    pub first: (GraphRole, usize, usize),
    /// Second assignment.
    pub second: (GraphRole, usize, usize),
}

/// Immutable search graph built from a geometry, device, and constraints.
///
/// Provides containment tests, the three neighbor families, and seeded
/// random starts. All orderings are deterministic so that identical inputs
/// replay identical searches.
#[derive(Debug, Clone)]
pub struct SearchGraph {
    geometry: Geometry,
    devinfo: DevInfo,
    sub: [SubGraph; 3],
    coupled: Vec<CoupledPair>,
}

impl SearchGraph {
    /// Builds the graph and validates that every knob retains at least one
    /// seeding value under the constraints.
    pub fn new(
        geometry: Geometry,
        devinfo: DevInfo,
        constraints: &Constraints,
    ) -> Result<Self, MiogError> {
        let sub = [
            SubGraph::new(GraphRole::A, &geometry, &devinfo, constraints.at(GraphRole::A))?,
            SubGraph::new(GraphRole::B, &geometry, &devinfo, constraints.at(GraphRole::B))?,
            SubGraph::new(GraphRole::C, &geometry, &devinfo, constraints.at(GraphRole::C))?,
        ];
        for sub_graph in &sub {
            for (knob, start) in sub_graph.start_range.iter().enumerate() {
                if start.is_empty() {
                    return Err(MiogError::GraphEmpty(
                        ErrorInfo::new(
                            "graph-empty",
                            "a knob has no admissible seeding values under the constraints",
                        )
                        .with_context("role", sub_graph.role.tag())
                        .with_context("knob", sub_graph.role.knob_tags()[knob]),
                    ));
                }
            }
        }
        let coupled = build_coupled_pairs(&sub);
        Ok(Self {
            geometry,
            devinfo,
            sub,
            coupled,
        })
    }

    /// Geometry the graph was built for.
    pub fn geometry(&self) -> &Geometry {
        &self.geometry
    }

    /// Device the graph was built for.
    pub fn devinfo(&self) -> &DevInfo {
        &self.devinfo
    }

    /// Sub-graph of one role.
    pub fn at(&self, role: GraphRole) -> &SubGraph {
        &self.sub[role.index()]
    }

    /// Coupled-pair table in construction order.
    pub fn coupled_pairs(&self) -> &[CoupledPair] {
        &self.coupled
    }

    /// Elementary containment test.
    pub fn contains_value(&self, role: GraphRole, knob: usize, value: usize) -> bool {
        self.sub[role.index()].contains(knob, value)
    }

    /// Whether every knob of the assignment lies in its range.
    pub fn contains(&self, hp: &HyPas) -> bool {
        GraphRole::ALL.into_iter().all(|role| {
            hp.at(role)
                .values()
                .iter()
                .enumerate()
                .all(|(knob, &v)| self.contains_value(role, knob, v))
        })
    }

    /// Neighbor family 1: single-knob moves along graph edges.
    pub fn one_aways(&self, hp: &HyPas) -> Vec<HyPas> {
        let mut out = Vec::new();
        for role in GraphRole::ALL {
            for knob in 0..role.n_knobs() {
                let current = hp.at(role).get(knob);
                for &next in self.sub[role.index()].neighbors_of(knob, current) {
                    let mut candidate = hp.clone();
                    candidate.at_mut(role).set(knob, next);
                    out.push(candidate);
                }
            }
        }
        out
    }

    /// Neighbor family 2: joint micro-tile / work-group reshapes that
    /// preserve the macro tile area.
    pub fn mic_mac_transformed(&self, hp: &HyPas) -> Vec<HyPas> {
        let mic_a = hp.chi(GraphRole::A, Chi::Mic);
        let mic_b = hp.chi(GraphRole::B, Chi::Mic);
        let mac = hp.non_chi(NonChi::Mac);
        let skw = hp.non_chi(NonChi::Skw);
        let mut out = Vec::new();

        // Swap the micro tiles and mirror the skew about its centre.
        if mic_a != mic_b || skw != SKEW_CENTRE {
            let mut swapped = hp.clone();
            swapped.at_mut(GraphRole::A).set(Chi::Mic.index(), mic_b);
            swapped.at_mut(GraphRole::B).set(Chi::Mic.index(), mic_a);
            if 2 * SKEW_CENTRE >= skw {
                swapped
                    .at_mut(GraphRole::C)
                    .set(NonChi::Skw.index(), 2 * SKEW_CENTRE - skw);
                out.push(swapped);
            }
        }

        // Coarser work group, finer micro tiles.
        if mic_a % 2 == 0 && mic_b % 2 == 0 {
            let mut coarse = hp.clone();
            coarse.at_mut(GraphRole::A).set(Chi::Mic.index(), mic_a / 2);
            coarse.at_mut(GraphRole::B).set(Chi::Mic.index(), mic_b / 2);
            coarse.at_mut(GraphRole::C).set(NonChi::Mac.index(), mac * 4);
            out.push(coarse);
        }

        // Finer work group, coarser micro tiles.
        if mac % 4 == 0 {
            let mut fine = hp.clone();
            fine.at_mut(GraphRole::A).set(Chi::Mic.index(), mic_a * 2);
            fine.at_mut(GraphRole::B).set(Chi::Mic.index(), mic_b * 2);
            fine.at_mut(GraphRole::C).set(NonChi::Mac.index(), mac / 4);
            out.push(fine);
        }

        out.retain(|candidate| self.contains(candidate));
        out
    }

    /// Neighbor family 3: coupled pairs applied wherever the assignment
    /// differs from either half of the pair.
    pub fn coupled_away(&self, hp: &HyPas) -> Vec<HyPas> {
        let mut out = Vec::new();
        for pair in &self.coupled {
            let (role_i, knob_i, val_i) = pair.first;
            let (role_j, knob_j, val_j) = pair.second;
            if hp.at(role_i).get(knob_i) != val_i || hp.at(role_j).get(knob_j) != val_j {
                let mut candidate = hp.clone();
                candidate.at_mut(role_i).set(knob_i, val_i);
                candidate.at_mut(role_j).set(knob_j, val_j);
                out.push(candidate);
            }
        }
        out.retain(|candidate| self.contains(candidate));
        out
    }

    /// All unique neighbors of an assignment, in deterministic order:
    /// one-away moves first (roles A, B, C; knobs in declaration order;
    /// values ascending), then the tile reshapes, then coupled pairs.
    /// The source assignment is never a neighbor of itself.
    pub fn get_neighbors(&self, hp: &HyPas) -> Vec<HyPas> {
        let mut unique: IndexMap<String, HyPas> = IndexMap::new();
        let families = [
            self.one_aways(hp),
            self.mic_mac_transformed(hp),
            self.coupled_away(hp),
        ];
        for candidate in families.into_iter().flatten() {
            if &candidate == hp {
                continue;
            }
            unique
                .entry(candidate.canonical_string())
                .or_insert(candidate);
        }
        unique.into_values().collect()
    }

    /// Samples each knob independently and uniformly from its start range.
    pub fn random_start(&self, rng: &mut RngHandle) -> HyPas {
        let mut sample = |role: GraphRole| {
            let sub_graph = &self.sub[role.index()];
            SubHy::from_fn(role, |knob| {
                let start = &sub_graph.start_range[knob];
                start[rng.sample_index(start.len())]
            })
        };
        HyPas {
            sub: [
                sample(GraphRole::A),
                sample(GraphRole::B),
                sample(GraphRole::C),
            ],
        }
    }

    /// Retries random starts until one derives, up to
    /// [`MAX_START_ATTEMPTS`]; surfaces `NoValidStart` past the budget.
    pub fn random_valid_start(&self, rng: &mut RngHandle) -> Result<HyPas, MiogError> {
        for _ in 0..MAX_START_ATTEMPTS {
            let candidate = self.random_start(rng);
            if derive(&self.geometry, &self.devinfo, &candidate).is_ok() {
                return Ok(candidate);
            }
        }
        Err(MiogError::NoValidStart(
            ErrorInfo::new(
                "no-valid-start",
                format!("no derivable start found in {MAX_START_ATTEMPTS} attempts"),
            )
            .with_context("geometry", self.geometry.canonical_string()),
        ))
    }
}

/// Micro-tile and workspace flags of A and B flip together: the coupled
/// table pairs every shared value of those knobs across the two roles.
fn build_coupled_pairs(sub: &[SubGraph; 3]) -> Vec<CoupledPair> {
    let mut out = Vec::new();
    for knob in [Chi::Mic.index(), Chi::Wos.index()] {
        let range_a = &sub[GraphRole::A.index()].range[knob];
        let range_b = &sub[GraphRole::B.index()].range[knob];
        for &v in range_a {
            if range_b.contains(&v) {
                out.push(CoupledPair {
                    first: (GraphRole::A, knob, v),
                    second: (GraphRole::B, knob, v),
                });
            }
        }
    }
    out
}
