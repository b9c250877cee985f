//! Distance metrics and the SIMD kernels backing them.
//!
//! All metrics are surfaced as *distances*: smaller is closer. Cosine
//! similarity is mapped to `1 - cos` and dot product is negated so that
//! search results sort ascending regardless of the configured metric.

use serde::{Deserialize, Serialize};
use wide::f32x8;

use crate::error::{Error, Result};

/// The distance function used for similarity calculations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Distance {
    /// Euclidean (L2) distance.
    Euclidean,
    /// Cosine distance, `1 - cosine similarity`.
    Cosine,
    /// Negated dot product.
    Dot,
}

impl Default for Distance {
    fn default() -> Self {
        Self::Euclidean
    }
}

impl Distance {
    /// Parses a metric name. Accepts `euclidean`, `cosine`, and `dot`.
    pub fn parse(name: &str) -> Result<Self> {
        match name {
            "euclidean" => Ok(Self::Euclidean),
            "cosine" => Ok(Self::Cosine),
            "dot" => Ok(Self::Dot),
            other => Err(Error::InvalidConfig(format!(
                "unknown distance metric '{other}'"
            ))),
        }
    }

    /// Stable string form, the inverse of [`Distance::parse`].
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Euclidean => "euclidean",
            Self::Cosine => "cosine",
            Self::Dot => "dot",
        }
    }

    /// Computes the distance between two same-length vectors.
    ///
    /// Length equality is the caller's responsibility; the collection layer
    /// validates dimensions before any distance is computed.
    pub fn calculate(&self, a: &[f32], b: &[f32]) -> f32 {
        debug_assert_eq!(a.len(), b.len());
        match self {
            Self::Euclidean => simd_l2_squared(a, b).sqrt(),
            Self::Cosine => {
                let (dot, a_sq, b_sq) = simd_dot_and_norms(a, b);
                if a_sq <= f32::EPSILON || b_sq <= f32::EPSILON {
                    // A zero-norm vector has no direction; treat it as
                    // maximally distant rather than failing mid-search.
                    return 1.0;
                }
                1.0 - dot / (a_sq.sqrt() * b_sq.sqrt())
            }
            Self::Dot => -simd_dot(a, b),
        }
    }
}

const SIMD_WIDTH: usize = 8;

fn load_f32x8(values: &[f32]) -> f32x8 {
    debug_assert_eq!(values.len(), SIMD_WIDTH);
    f32x8::from([
        values[0], values[1], values[2], values[3], values[4], values[5], values[6], values[7],
    ])
}

fn simd_scan(
    a: &[f32],
    b: &[f32],
    mut simd_step: impl FnMut(f32x8, f32x8),
    mut scalar_step: impl FnMut(f32, f32),
) {
    let mut a_chunks = a.chunks_exact(SIMD_WIDTH);
    let mut b_chunks = b.chunks_exact(SIMD_WIDTH);

    for (a_chunk, b_chunk) in a_chunks.by_ref().zip(b_chunks.by_ref()) {
        simd_step(load_f32x8(a_chunk), load_f32x8(b_chunk));
    }

    for (&a_value, &b_value) in a_chunks.remainder().iter().zip(b_chunks.remainder()) {
        scalar_step(a_value, b_value);
    }
}

fn simd_dot(a: &[f32], b: &[f32]) -> f32 {
    let mut simd_sum = f32x8::ZERO;
    let mut scalar_sum = 0.0;

    simd_scan(
        a,
        b,
        |a_v, b_v| {
            simd_sum += a_v * b_v;
        },
        |a_value, b_value| {
            scalar_sum += a_value * b_value;
        },
    );

    simd_sum.reduce_add() + scalar_sum
}

fn simd_l2_squared(a: &[f32], b: &[f32]) -> f32 {
    let mut simd_sum = f32x8::ZERO;
    let mut scalar_sum = 0.0;

    simd_scan(
        a,
        b,
        |a_v, b_v| {
            let delta = a_v - b_v;
            simd_sum += delta * delta;
        },
        |a_value, b_value| {
            let delta = a_value - b_value;
            scalar_sum += delta * delta;
        },
    );

    simd_sum.reduce_add() + scalar_sum
}

fn simd_dot_and_norms(a: &[f32], b: &[f32]) -> (f32, f32, f32) {
    let mut dot_sum = f32x8::ZERO;
    let mut a_sq_sum = f32x8::ZERO;
    let mut b_sq_sum = f32x8::ZERO;
    let mut dot_scalar = 0.0;
    let mut a_sq_scalar = 0.0;
    let mut b_sq_scalar = 0.0;

    simd_scan(
        a,
        b,
        |a_v, b_v| {
            dot_sum += a_v * b_v;
            a_sq_sum += a_v * a_v;
            b_sq_sum += b_v * b_v;
        },
        |a_value, b_value| {
            dot_scalar += a_value * b_value;
            a_sq_scalar += a_value * a_value;
            b_sq_scalar += b_value * b_value;
        },
    );

    (
        dot_sum.reduce_add() + dot_scalar,
        a_sq_sum.reduce_add() + a_sq_scalar,
        b_sq_sum.reduce_add() + b_sq_scalar,
    )
}
