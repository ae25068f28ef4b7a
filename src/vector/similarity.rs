//! Vector Similarity Functions
//!
//! Cosine similarity and distance over `f32` embeddings.
//!
//! Sums are accumulated in `f64` so that a vector compared with itself
//! yields a distance of exactly `0.0`.

/// Basic vector operations used by the ranker and the projection.
pub trait VectorOps {
    fn dot(&self, other: &Self) -> f64;
    fn squared_norm(&self) -> f64;
    fn magnitude(&self) -> f64;
}

impl VectorOps for [f32] {
    #[inline]
    fn dot(&self, other: &Self) -> f64 {
        dot_product(self, other)
    }

    #[inline]
    fn squared_norm(&self) -> f64 {
        dot_product(self, self)
    }

    #[inline]
    fn magnitude(&self) -> f64 {
        self.squared_norm().sqrt()
    }
}

/// Compute dot product of two vectors
///
/// Uses unrolled loop for better CPU performance.
#[inline]
pub fn dot_product(a: &[f32], b: &[f32]) -> f64 {
    debug_assert_eq!(a.len(), b.len(), "Vector dimensions must match");

    let len = a.len();
    let mut sum = 0.0f64;

    // Process 4 elements at a time (manual unrolling)
    let chunks = len / 4;
    let remainder = len % 4;

    for i in 0..chunks {
        let idx = i * 4;
        sum += a[idx] as f64 * b[idx] as f64;
        sum += a[idx + 1] as f64 * b[idx + 1] as f64;
        sum += a[idx + 2] as f64 * b[idx + 2] as f64;
        sum += a[idx + 3] as f64 * b[idx + 3] as f64;
    }

    for i in (len - remainder)..len {
        sum += a[i] as f64 * b[i] as f64;
    }

    sum
}

/// Cosine similarity from precomputed parts, clamped to [-1, 1].
///
/// `norm_sq_a` and `norm_sq_b` must be the squared norms as returned by
/// [`VectorOps::squared_norm`]. Returns `None` when either norm is zero.
#[inline]
pub fn cosine_similarity_from_parts(dot: f64, norm_sq_a: f64, norm_sq_b: f64) -> Option<f64> {
    if norm_sq_a == 0.0 || norm_sq_b == 0.0 {
        return None;
    }
    Some((dot / (norm_sq_a * norm_sq_b).sqrt()).clamp(-1.0, 1.0))
}

/// Cosine distance from precomputed parts.
///
/// Same contract as [`cosine_similarity_from_parts`], mapped to [0, 2].
#[inline]
pub fn cosine_distance_from_parts(dot: f64, norm_sq_a: f64, norm_sq_b: f64) -> Option<f32> {
    cosine_similarity_from_parts(dot, norm_sq_a, norm_sq_b)
        .map(|similarity| ((1.0 - similarity) as f32).clamp(0.0, 2.0))
}

/// Compute cosine similarity between two vectors
///
/// Returns a value in [-1, 1] where 1 means identical direction, or `None`
/// if either vector has zero norm.
#[inline]
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> Option<f32> {
    debug_assert_eq!(a.len(), b.len(), "Vector dimensions must match");
    cosine_similarity_from_parts(dot_product(a, b), a.squared_norm(), b.squared_norm())
        .map(|similarity| similarity as f32)
}

/// Compute cosine distance (`1 - cosine_similarity`) between two vectors
///
/// Returns a value in [0, 2], or `None` if either vector has zero norm.
#[inline]
pub fn cosine_distance(a: &[f32], b: &[f32]) -> Option<f32> {
    debug_assert_eq!(a.len(), b.len(), "Vector dimensions must match");
    cosine_distance_from_parts(dot_product(a, b), a.squared_norm(), b.squared_norm())
}

/// Normalize a vector in place
pub fn normalize_vector(v: &mut [f64]) {
    let mag = v.iter().map(|x| x * x).sum::<f64>().sqrt();
    if mag > 0.0 {
        for x in v.iter_mut() {
            *x /= mag;
        }
    }
}
