//! GEMM problem geometry: shape, layout, transposes, dtype, leading dims.

use serde::{Deserialize, Serialize};

use crate::errors::{ErrorInfo, MiogError};
use crate::hypas::GraphRole;

/// Element type of the matrices.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FloatType {
    /// 32-bit IEEE float.
    F32,
    /// 64-bit IEEE float.
    F64,
}

impl FloatType {
    /// Size of one element in bytes.
    pub fn size_bytes(self) -> usize {
        match self {
            FloatType::F32 => 4,
            FloatType::F64 => 8,
        }
    }

    /// Device-source type name.
    pub fn type_name(self) -> &'static str {
        match self {
            FloatType::F32 => "float",
            FloatType::F64 => "double",
        }
    }

    /// Tag used in the canonical geometry string (`f32` / `f64`).
    pub fn tag(self) -> &'static str {
        match self {
            FloatType::F32 => "32",
            FloatType::F64 => "64",
        }
    }
}

/// Immutable description of one GEMM problem instance.
///
/// Equality is field-wise; two geometries describing the same problem
/// compare equal regardless of how they were constructed.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Geometry {
    /// Column-major storage when true, row-major otherwise.
    pub is_col_major: bool,
    /// Transpose flag for A.
    pub t_a: bool,
    /// Transpose flag for B.
    pub t_b: bool,
    /// Transpose flag for C.
    pub t_c: bool,
    /// Rows of op(A) and C.
    pub m: usize,
    /// Columns of op(B) and C.
    pub n: usize,
    /// Inner dimension.
    pub k: usize,
    /// Leading dimension of A.
    pub ld_a: usize,
    /// Leading dimension of B.
    pub ld_b: usize,
    /// Leading dimension of C.
    pub ld_c: usize,
    /// Provided workspace size in bytes.
    pub ws_size: usize,
    /// Element type.
    pub floattype: FloatType,
}

impl Geometry {
    /// Constructs a geometry, checking dimension and leading-dim invariants.
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        is_col_major: bool,
        t_a: bool,
        t_b: bool,
        t_c: bool,
        m: usize,
        n: usize,
        k: usize,
        ld_a: usize,
        ld_b: usize,
        ld_c: usize,
        ws_size: usize,
        floattype: FloatType,
    ) -> Result<Self, MiogError> {
        let gg = Self {
            is_col_major,
            t_a,
            t_b,
            t_c,
            m,
            n,
            k,
            ld_a,
            ld_b,
            ld_c,
            ws_size,
            floattype,
        };
        gg.checks()?;
        Ok(gg)
    }

    fn checks(&self) -> Result<(), MiogError> {
        if self.m == 0 || self.n == 0 || self.k == 0 {
            return Err(MiogError::UserInput(
                ErrorInfo::new("geometry-zero-dim", "m, n and k must all be positive")
                    .with_context("m", self.m.to_string())
                    .with_context("n", self.n.to_string())
                    .with_context("k", self.k.to_string()),
            ));
        }
        for role in GraphRole::ALL {
            let ld = self.ld(role);
            let coal = self.coal_dim(role);
            if ld < coal {
                return Err(MiogError::UserInput(
                    ErrorInfo::new(
                        "geometry-bad-ld",
                        format!("leading dimension of {} below coalesced axis length", role.tag()),
                    )
                    .with_context("ld", ld.to_string())
                    .with_context("coal_dim", coal.to_string()),
                ));
            }
        }
        Ok(())
    }

    /// Size of one element in bytes.
    pub fn float_size_bytes(&self) -> usize {
        self.floattype.size_bytes()
    }

    /// Transpose flag of the given matrix.
    pub fn transposed(&self, role: GraphRole) -> bool {
        match role {
            GraphRole::A => self.t_a,
            GraphRole::B => self.t_b,
            GraphRole::C => self.t_c,
        }
    }

    /// Leading dimension of the given matrix.
    pub fn ld(&self, role: GraphRole) -> usize {
        match role {
            GraphRole::A => self.ld_a,
            GraphRole::B => self.ld_b,
            GraphRole::C => self.ld_c,
        }
    }

    /// Length of the coalesced (fast, contiguous) axis of the given matrix.
    pub fn coal_dim(&self, role: GraphRole) -> usize {
        match role {
            GraphRole::A => {
                if self.t_a == self.is_col_major {
                    self.k
                } else {
                    self.m
                }
            }
            GraphRole::B => {
                if self.t_b == self.is_col_major {
                    self.n
                } else {
                    self.k
                }
            }
            GraphRole::C => {
                if self.t_c == self.is_col_major {
                    self.n
                } else {
                    self.m
                }
            }
        }
    }

    /// Length of the uncoalesced (slow) axis of the given matrix.
    pub fn uncoal_dim(&self, role: GraphRole) -> usize {
        match role {
            GraphRole::A => self.m + self.k - self.coal_dim(GraphRole::A),
            GraphRole::B => self.n + self.k - self.coal_dim(GraphRole::B),
            GraphRole::C => self.m + self.n - self.coal_dim(GraphRole::C),
        }
    }

    /// Number of stored elements spanned by the given matrix, including the
    /// leading-dimension gap.
    pub fn stored_elements(&self, role: GraphRole) -> usize {
        self.ld(role) * self.uncoal_dim(role)
    }

    /// Index of the logical element `(row, col)` of op(X) inside X's
    /// stored buffer. Rows and columns are those of the un-transposed
    /// operand: `(i, l)` for A, `(l, j)` for B, `(i, j)` for C.
    pub fn element_index(&self, role: GraphRole, row: usize, col: usize) -> usize {
        let (r, c) = if self.transposed(role) {
            (col, row)
        } else {
            (row, col)
        };
        if self.is_col_major {
            r + c * self.ld(role)
        } else {
            r * self.ld(role) + c
        }
    }

    /// Emits the canonical geometry string.
    ///
    /// `emit(parse(s)) == s` for every legal canonical string `s`.
    pub fn canonical_string(&self) -> String {
        format!(
            "tC{}_tA{}_tB{}_colMaj{}_m{}_n{}_k{}_lda{}_ldb{}_ldc{}_ws{}_f{}",
            u8::from(self.t_c),
            u8::from(self.t_a),
            u8::from(self.t_b),
            u8::from(self.is_col_major),
            self.m,
            self.n,
            self.k,
            self.ld_a,
            self.ld_b,
            self.ld_c,
            self.ws_size,
            self.floattype.tag(),
        )
    }

    /// Parses the canonical geometry string (field order fixed).
    pub fn from_string(s: &str) -> Result<Self, MiogError> {
        const FIELDS: [&str; 12] = [
            "tC", "tA", "tB", "colMaj", "m", "n", "k", "lda", "ldb", "ldc", "ws", "f",
        ];
        let parts: Vec<&str> = s.split('_').collect();
        if parts.len() != FIELDS.len() {
            return Err(bad_geometry(s, "expected 12 underscore-separated fields"));
        }
        let mut vals = [0usize; 12];
        for (i, (part, field)) in parts.iter().zip(FIELDS.iter()).enumerate() {
            let digits = part
                .strip_prefix(field)
                .ok_or_else(|| bad_geometry(s, format!("field {i} should start with '{field}'")))?;
            vals[i] = digits
                .parse::<usize>()
                .map_err(|_| bad_geometry(s, format!("field '{field}' has no unsigned value")))?;
        }
        for (i, field) in FIELDS.iter().enumerate().take(4) {
            if vals[i] > 1 {
                return Err(bad_geometry(s, format!("flag '{field}' must be 0 or 1")));
            }
        }
        let floattype = match vals[11] {
            32 => FloatType::F32,
            64 => FloatType::F64,
            other => return Err(bad_geometry(s, format!("unknown float width f{other}"))),
        };
        Geometry::new(
            vals[3] == 1,
            vals[1] == 1,
            vals[2] == 1,
            vals[0] == 1,
            vals[4],
            vals[5],
            vals[6],
            vals[7],
            vals[8],
            vals[9],
            vals[10],
            floattype,
        )
    }

    /// Convenience constructor: square col-major f32 problem with packed
    /// leading dimensions and no workspace.
    pub fn default_packed(m: usize, n: usize, k: usize) -> Result<Self, MiogError> {
        Geometry::new(true, false, false, false, m, n, k, m, k, m, 0, FloatType::F32)
    }
}

fn bad_geometry(s: &str, why: impl Into<String>) -> MiogError {
    MiogError::UserInput(
        ErrorInfo::new("geometry-parse", why)
            .with_context("input", s.to_string())
            .with_hint("canonical form: tC0_tA0_tB0_colMaj1_m64_n64_k64_lda64_ldb64_ldc64_ws0_f32"),
    )
}

/// Per-buffer element offsets carried alongside a geometry.
///
/// Offsets shift where each matrix starts inside its device buffer; the
/// workspace offset is only meaningful when workspace staging is active.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct Offsets {
    /// Element offset of A.
    pub a: usize,
    /// Element offset of B.
    pub b: usize,
    /// Element offset of C.
    pub c: usize,
    /// Element offset of the workspace.
    pub w: usize,
}

impl Offsets {
    /// All-zero offsets.
    pub fn zero() -> Self {
        Self::default()
    }
}
