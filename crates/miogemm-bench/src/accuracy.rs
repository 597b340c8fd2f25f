//! Accuracy checking against a double-precision host reference.

use miogemm_core::errors::{ErrorInfo, MiogError};
use miogemm_core::{FloatType, Geometry, GraphRole, Offsets};

/// Computes `alpha * op(A) * op(B) + beta * C0` at f64 precision.
///
/// Inputs are full stored buffers (offsets included); the returned buffer
/// is `c0` with only the used region of C updated.
pub fn reference_gemm(
    gg: &Geometry,
    toff: &Offsets,
    a: &[f64],
    b: &[f64],
    c0: &[f64],
    alpha: f64,
    beta: f64,
) -> Vec<f64> {
    let mut c = c0.to_vec();
    for i in 0..gg.m {
        for j in 0..gg.n {
            let mut sum = 0.0;
            for l in 0..gg.k {
                let av = a[toff.a + gg.element_index(GraphRole::A, i, l)];
                let bv = b[toff.b + gg.element_index(GraphRole::B, l, j)];
                sum += av * bv;
            }
            let idx = toff.c + gg.element_index(GraphRole::C, i, j);
            c[idx] = alpha * sum + beta * c0[idx];
        }
    }
    c
}

/// Result of one accuracy comparison.
#[derive(Debug, Clone, PartialEq)]
pub struct AccuracySummary {
    /// Largest absolute elementwise difference over the used region.
    pub max_abs_diff: f64,
    /// Sum of the used region on the device side.
    pub device_sum: f64,
    /// Sum of the used region on the reference side.
    pub reference_sum: f64,
    /// Tolerance the difference was held against.
    pub tolerance: f64,
}

/// Compares a device C against the reference, elementwise over the used
/// region. The tolerance scales with the reduction length and the element
/// width, so well-formed kernels pass at both precisions.
pub fn compare(
    gg: &Geometry,
    toff: &Offsets,
    device_c: &[f64],
    reference_c: &[f64],
) -> Result<AccuracySummary, MiogError> {
    let eps = match gg.floattype {
        FloatType::F32 => 1.0e-5,
        FloatType::F64 => 1.0e-11,
    };

    let mut max_abs_diff = 0.0f64;
    let mut device_sum = 0.0f64;
    let mut reference_sum = 0.0f64;
    let mut max_abs_ref = 0.0f64;
    for i in 0..gg.m {
        for j in 0..gg.n {
            let idx = toff.c + gg.element_index(GraphRole::C, i, j);
            let dv = device_c[idx];
            let rv = reference_c[idx];
            device_sum += dv;
            reference_sum += rv;
            max_abs_diff = max_abs_diff.max((dv - rv).abs());
            max_abs_ref = max_abs_ref.max(rv.abs());
        }
    }
    let tolerance = eps * gg.k as f64 * max_abs_ref.max(1.0);

    let summary = AccuracySummary {
        max_abs_diff,
        device_sum,
        reference_sum,
        tolerance,
    };
    if max_abs_diff > tolerance {
        return Err(MiogError::NumericSanity(
            ErrorInfo::new("accuracy-mismatch", "device result disagrees with the host reference")
                .with_context("max_abs_diff", format!("{max_abs_diff:e}"))
                .with_context("tolerance", format!("{tolerance:e}"))
                .with_context("device_sum", format!("{device_sum:e}"))
                .with_context("reference_sum", format!("{reference_sum:e}")),
        ));
    }
    Ok(summary)
}
