//! Hyperparameter assignments: knob tables, sub-hypers, and the `HyPas` set.

use serde::{Deserialize, Serialize};

use crate::errors::{ErrorInfo, MiogError};

/// Matrix role a sub-hyper or sub-graph is attached to.
///
/// A and B carry the `Chi` knob family; C carries the `NonChi` family.
/// Role-specific behaviour dispatches on this tag rather than on a type
/// hierarchy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum GraphRole {
    /// Left operand of the product.
    A,
    /// Right operand of the product.
    B,
    /// Output / update matrix.
    C,
}

impl GraphRole {
    /// All roles in canonical iteration order.
    pub const ALL: [GraphRole; 3] = [GraphRole::A, GraphRole::B, GraphRole::C];

    /// Single-letter tag used in canonical strings.
    pub fn tag(self) -> &'static str {
        match self {
            GraphRole::A => "A",
            GraphRole::B => "B",
            GraphRole::C => "C",
        }
    }

    /// Parses a role tag.
    pub fn from_tag(tag: &str) -> Option<Self> {
        match tag {
            "A" => Some(GraphRole::A),
            "B" => Some(GraphRole::B),
            "C" => Some(GraphRole::C),
            _ => None,
        }
    }

    /// Dense index for array-backed per-role storage.
    pub fn index(self) -> usize {
        match self {
            GraphRole::A => 0,
            GraphRole::B => 1,
            GraphRole::C => 2,
        }
    }

    /// Knob abbreviations for this role, in declaration order.
    pub fn knob_tags(self) -> &'static [&'static str] {
        match self {
            GraphRole::A | GraphRole::B => Chi::TAGS,
            GraphRole::C => NonChi::TAGS,
        }
    }

    /// Number of knobs carried by this role.
    pub fn n_knobs(self) -> usize {
        self.knob_tags().len()
    }

    /// Resolves a knob abbreviation to its declaration index.
    pub fn knob_index(self, tag: &str) -> Option<usize> {
        self.knob_tags().iter().position(|&t| t == tag)
    }
}

/// Knobs tied to the A and B matrices.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Chi {
    /// Micro-tile size.
    Mic,
    /// Local-memory pad.
    Pad,
    /// Local-memory access pattern.
    Plu,
    /// Load interleave width.
    Liw,
    /// Micro interleave (double buffering of the local tile).
    Miw,
    /// Workspace-use flag (0 none, 1 packed copy, 2 coalescing copy).
    Wos,
}

impl Chi {
    /// Abbreviations in declaration order.
    pub const TAGS: &'static [&'static str] = &["MIC", "PAD", "PLU", "LIW", "MIW", "WOS"];
    /// All knobs in declaration order.
    pub const ALL: [Chi; 6] = [Chi::Mic, Chi::Pad, Chi::Plu, Chi::Liw, Chi::Miw, Chi::Wos];

    /// Declaration index of this knob.
    pub fn index(self) -> usize {
        match self {
            Chi::Mic => 0,
            Chi::Pad => 1,
            Chi::Plu => 2,
            Chi::Liw => 3,
            Chi::Miw => 4,
            Chi::Wos => 5,
        }
    }
}

/// Knobs tied to the C update.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum NonChi {
    /// k-unroll depth of the main loop.
    Unr,
    /// Work-group allocation strategy (1 by-col, 2 by-row, 3 super-column).
    Gal,
    /// Partial unrolling of the k-loop remainder.
    Pun,
    /// Inter-chunk split factor over k.
    Ice,
    /// Active warps used by the super-column remapping.
    Naw,
    /// Unroll-for-offset variant.
    Ufo,
    /// Work-items per work group.
    Mac,
    /// Skew of the work-group grid split.
    Skw,
}

impl NonChi {
    /// Abbreviations in declaration order.
    pub const TAGS: &'static [&'static str] =
        &["UNR", "GAL", "PUN", "ICE", "NAW", "UFO", "MAC", "SKW"];
    /// All knobs in declaration order.
    pub const ALL: [NonChi; 8] = [
        NonChi::Unr,
        NonChi::Gal,
        NonChi::Pun,
        NonChi::Ice,
        NonChi::Naw,
        NonChi::Ufo,
        NonChi::Mac,
        NonChi::Skw,
    ];

    /// Declaration index of this knob.
    pub fn index(self) -> usize {
        match self {
            NonChi::Unr => 0,
            NonChi::Gal => 1,
            NonChi::Pun => 2,
            NonChi::Ice => 3,
            NonChi::Naw => 4,
            NonChi::Ufo => 5,
            NonChi::Mac => 6,
            NonChi::Skw => 7,
        }
    }
}

/// Centre value of the SKW knob; the work-group grid is square there.
pub const SKEW_CENTRE: usize = 10;

/// Hyperparameter assignment for one matrix role.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SubHy {
    /// Role this sub-hyper belongs to.
    pub role: GraphRole,
    vals: Vec<usize>,
}

impl SubHy {
    /// Creates a sub-hyper from per-knob values in declaration order.
    pub fn new(role: GraphRole, vals: Vec<usize>) -> Result<Self, MiogError> {
        if vals.len() != role.n_knobs() {
            return Err(MiogError::UserInput(
                ErrorInfo::new("subhy-arity", "wrong number of knob values for role")
                    .with_context("role", role.tag())
                    .with_context("expected", role.n_knobs().to_string())
                    .with_context("got", vals.len().to_string()),
            ));
        }
        Ok(Self { role, vals })
    }

    /// Builds a sub-hyper by evaluating `f` at every knob index in
    /// declaration order. Infallible: the arity comes from the role.
    pub fn from_fn(role: GraphRole, mut f: impl FnMut(usize) -> usize) -> Self {
        Self {
            role,
            vals: (0..role.n_knobs()).map(&mut f).collect(),
        }
    }

    /// Parses a sub-hyper string, e.g. `A_MIC8_PAD1_PLU0_LIW0_MIW1_WOS0`.
    ///
    /// Knobs may appear in any order but each must appear exactly once.
    pub fn from_string(s: &str) -> Result<Self, MiogError> {
        let (role, assignments) = parse_role_tokens(s)?;
        let mut vals = vec![None; role.n_knobs()];
        for (idx, val) in assignments {
            if vals[idx].is_some() {
                return Err(bad_hypas(s, format!("knob '{}' appears twice", role.knob_tags()[idx])));
            }
            vals[idx] = Some(val);
        }
        let mut out = Vec::with_capacity(role.n_knobs());
        for (idx, v) in vals.into_iter().enumerate() {
            match v {
                Some(v) => out.push(v),
                None => {
                    return Err(bad_hypas(
                        s,
                        format!("knob '{}' is missing", role.knob_tags()[idx]),
                    ))
                }
            }
        }
        SubHy::new(role, out)
    }

    /// Value of the knob at the given declaration index.
    pub fn get(&self, knob: usize) -> usize {
        self.vals[knob]
    }

    /// Overwrites the knob at the given declaration index.
    pub fn set(&mut self, knob: usize, value: usize) {
        self.vals[knob] = value;
    }

    /// All values in declaration order.
    pub fn values(&self) -> &[usize] {
        &self.vals
    }

    /// Emits the canonical sub-hyper string (knobs in declaration order).
    pub fn canonical_string(&self) -> String {
        let mut s = String::from(self.role.tag());
        for (tag, val) in self.role.knob_tags().iter().zip(self.vals.iter()) {
            s.push('_');
            s.push_str(tag);
            s.push_str(&val.to_string());
        }
        s
    }
}

/// A complete hyperparameter assignment over all three roles.
///
/// Validity (whether the assignment can actually be realised on a geometry
/// and device) is decided by derived-parameter computation, not here.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct HyPas {
    /// Sub-hypers indexed by role (A, B, C).
    pub sub: [SubHy; 3],
}

impl HyPas {
    /// Builds a hyperparameter set from its three sub-hypers.
    pub fn new(a: SubHy, b: SubHy, c: SubHy) -> Result<Self, MiogError> {
        for (sub, want) in [&a, &b, &c].iter().zip(GraphRole::ALL) {
            if sub.role != want {
                return Err(MiogError::UserInput(
                    ErrorInfo::new("hypas-role-order", "sub-hypers must be supplied in A, B, C order")
                        .with_context("got", sub.role.tag()),
                ));
            }
        }
        Ok(Self { sub: [a, b, c] })
    }

    /// Parses the canonical string: per-role sub-strings joined by `__`.
    pub fn from_string(s: &str) -> Result<Self, MiogError> {
        let parts: Vec<&str> = s.split("__").collect();
        if parts.len() != 3 {
            return Err(bad_hypas(s, "expected three role sub-strings joined by '__'"));
        }
        let mut subs: [Option<SubHy>; 3] = [None, None, None];
        for part in parts {
            let sub = SubHy::from_string(part)?;
            let slot = sub.role.index();
            if subs[slot].is_some() {
                return Err(bad_hypas(s, format!("role '{}' appears twice", sub.role.tag())));
            }
            subs[slot] = Some(sub);
        }
        match subs {
            [Some(a), Some(b), Some(c)] => HyPas::new(a, b, c),
            _ => Err(bad_hypas(s, "each of roles A, B, C must appear exactly once")),
        }
    }

    /// Sub-hyper of the given role.
    pub fn at(&self, role: GraphRole) -> &SubHy {
        &self.sub[role.index()]
    }

    /// Mutable sub-hyper of the given role.
    pub fn at_mut(&mut self, role: GraphRole) -> &mut SubHy {
        &mut self.sub[role.index()]
    }

    /// Value of a Chi knob on role A or B.
    pub fn chi(&self, role: GraphRole, knob: Chi) -> usize {
        debug_assert!(role != GraphRole::C);
        self.sub[role.index()].get(knob.index())
    }

    /// Value of a NonChi knob (role C).
    pub fn non_chi(&self, knob: NonChi) -> usize {
        self.sub[GraphRole::C.index()].get(knob.index())
    }

    /// Emits the canonical string, the inverse of [`HyPas::from_string`].
    pub fn canonical_string(&self) -> String {
        let subs: Vec<String> = self.sub.iter().map(SubHy::canonical_string).collect();
        subs.join("__")
    }

    /// Whether the kernels realising this assignment accumulate through
    /// atomics (k split over more than one work group).
    pub fn uses_atomics(&self) -> bool {
        self.non_chi(NonChi::Ice) > 1
    }
}

/// Splits `"A_MIC8_PAD1..."` into a role and `(knob_index, value)` pairs.
///
/// Shared between hyperparameter parsing (complete assignments) and
/// constraint parsing (partial assignments).
pub(crate) fn parse_role_tokens(s: &str) -> Result<(GraphRole, Vec<(usize, usize)>), MiogError> {
    let mut tokens = s.split('_');
    let role_tag = tokens.next().unwrap_or_default();
    let role = GraphRole::from_tag(role_tag)
        .ok_or_else(|| bad_hypas(s, format!("unknown role tag '{role_tag}'")))?;
    let mut out = Vec::new();
    for token in tokens {
        if token.len() < 4 {
            return Err(bad_hypas(s, format!("malformed knob token '{token}'")));
        }
        let (tag, digits) = token.split_at(3);
        let idx = role
            .knob_index(tag)
            .ok_or_else(|| bad_hypas(s, format!("unknown knob '{tag}' for role {}", role.tag())))?;
        let val = digits
            .parse::<usize>()
            .map_err(|_| bad_hypas(s, format!("knob '{tag}' has no unsigned value")))?;
        out.push((idx, val));
    }
    Ok((role, out))
}

fn bad_hypas(s: &str, why: impl Into<String>) -> MiogError {
    MiogError::UserInput(
        ErrorInfo::new("hypas-parse", why)
            .with_context("input", s.to_string())
            .with_hint("example: A_MIC8_PAD1_PLU0_LIW0_MIW1_WOS0"),
    )
}
