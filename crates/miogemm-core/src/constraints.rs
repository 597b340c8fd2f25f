//! Partial hyperparameter assignments used to restrict the search.

use serde::{Deserialize, Serialize};

use crate::errors::{ErrorInfo, MiogError};
use crate::hypas::{parse_role_tokens, GraphRole, HyPas};

/// Restriction on one role's knobs.
///
/// Each knob is either fixed to a single value, free but restricted to a
/// declared subset of the graph range, or unrestricted. A separate start
/// subset narrows only the seeding range used for random starts.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Constraint {
    /// Role the restriction applies to.
    pub role: GraphRole,
    fixed: Vec<Option<usize>>,
    range_subset: Vec<Option<Vec<usize>>>,
    start_subset: Vec<Option<Vec<usize>>>,
}

impl Constraint {
    /// An unrestricted constraint for the given role.
    pub fn empty(role: GraphRole) -> Self {
        let n = role.n_knobs();
        Self {
            role,
            fixed: vec![None; n],
            range_subset: vec![None; n],
            start_subset: vec![None; n],
        }
    }

    /// Parses a partial assignment string, e.g. `A_WOS0_PAD1`.
    ///
    /// Every named knob becomes fixed; unnamed knobs stay free. The empty
    /// string yields an unrestricted constraint (role taken from `role`).
    pub fn from_string(role: GraphRole, s: &str) -> Result<Self, MiogError> {
        let mut constraint = Constraint::empty(role);
        if s.is_empty() {
            return Ok(constraint);
        }
        let (parsed_role, assignments) = parse_role_tokens(s)?;
        if parsed_role != role {
            return Err(MiogError::UserInput(
                ErrorInfo::new("constraint-role", "constraint string tagged with the wrong role")
                    .with_context("expected", role.tag())
                    .with_context("got", parsed_role.tag()),
            ));
        }
        for (knob, value) in assignments {
            constraint.fixed[knob] = Some(value);
        }
        Ok(constraint)
    }

    /// Narrows the seeding range from a partial assignment string.
    pub fn apply_start_string(&mut self, s: &str) -> Result<(), MiogError> {
        if s.is_empty() {
            return Ok(());
        }
        let (parsed_role, assignments) = parse_role_tokens(s)?;
        if parsed_role != self.role {
            return Err(MiogError::UserInput(
                ErrorInfo::new("constraint-role", "start-range string tagged with the wrong role")
                    .with_context("expected", self.role.tag())
                    .with_context("got", parsed_role.tag()),
            ));
        }
        for (knob, value) in assignments {
            self.start_subset[knob] = Some(vec![value]);
        }
        Ok(())
    }

    /// Restricts a knob's admissible values without fixing it.
    pub fn restrict_range(&mut self, knob: usize, mut values: Vec<usize>) {
        values.sort_unstable();
        values.dedup();
        self.range_subset[knob] = Some(values);
    }

    /// Restricts a knob's seeding values without fixing it.
    pub fn restrict_start(&mut self, knob: usize, mut values: Vec<usize>) {
        values.sort_unstable();
        values.dedup();
        self.start_subset[knob] = Some(values);
    }

    /// Fixed value of a knob, if any.
    pub fn fixed(&self, knob: usize) -> Option<usize> {
        self.fixed[knob]
    }

    /// Declared range subset of a knob, if any. A fixed knob is reported as
    /// a singleton subset.
    pub fn range_subset(&self, knob: usize) -> Option<Vec<usize>> {
        if let Some(v) = self.fixed[knob] {
            return Some(vec![v]);
        }
        self.range_subset[knob].clone()
    }

    /// Declared seeding subset of a knob, if any.
    pub fn start_subset(&self, knob: usize) -> Option<Vec<usize>> {
        if let Some(subset) = &self.start_subset[knob] {
            return Some(subset.clone());
        }
        self.range_subset(knob)
    }
}

/// Per-role restrictions plus start-range hints, applied to the search graph.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Constraints {
    /// Restrictions indexed by role (A, B, C).
    pub sub: [Constraint; 3],
}

impl Constraints {
    /// No restrictions at all.
    pub fn empty() -> Self {
        Self {
            sub: [
                Constraint::empty(GraphRole::A),
                Constraint::empty(GraphRole::B),
                Constraint::empty(GraphRole::C),
            ],
        }
    }

    /// Builds constraints from one partial-assignment string per role.
    pub fn from_role_strings(strings: &[&str; 3]) -> Result<Self, MiogError> {
        Ok(Self {
            sub: [
                Constraint::from_string(GraphRole::A, strings[0])?,
                Constraint::from_string(GraphRole::B, strings[1])?,
                Constraint::from_string(GraphRole::C, strings[2])?,
            ],
        })
    }

    /// Builds constraints from a single colon-joined string.
    ///
    /// Segments are role-tagged partial assignments in any order, e.g.
    /// `A_WOS0__...` is not accepted here; use `A_WOS0:C_ICE1`. Empty
    /// segments are allowed and ignored.
    pub fn from_string(joined: &str) -> Result<Self, MiogError> {
        let mut out = Constraints::empty();
        for segment in joined.split(':') {
            if segment.is_empty() {
                continue;
            }
            let (role, assignments) = parse_role_tokens(segment)?;
            for (knob, value) in assignments {
                out.sub[role.index()].fixed[knob] = Some(value);
            }
        }
        Ok(out)
    }

    /// Builds constraints from a range string and a start-range string,
    /// where the latter narrows only the seeding range.
    pub fn from_strings(r: &str, sr: &str) -> Result<Self, MiogError> {
        let mut out = Constraints::from_string(r)?;
        for segment in sr.split(':') {
            if segment.is_empty() {
                continue;
            }
            let (role, assignments) = parse_role_tokens(segment)?;
            for (knob, value) in assignments {
                out.sub[role.index()].start_subset[knob] = Some(vec![value]);
            }
        }
        Ok(out)
    }

    /// Restriction for the given role.
    pub fn at(&self, role: GraphRole) -> &Constraint {
        &self.sub[role.index()]
    }
}

impl HyPas {
    /// Overwrites exactly the knobs the constraints fix; free knobs keep
    /// their values. Applying the same constraints twice is a no-op after
    /// the first application.
    pub fn apply_constraints(&mut self, constraints: &Constraints) {
        for role in GraphRole::ALL {
            let constraint = constraints.at(role);
            for knob in 0..role.n_knobs() {
                if let Some(value) = constraint.fixed(knob) {
                    self.at_mut(role).set(knob, value);
                }
            }
        }
    }
}
