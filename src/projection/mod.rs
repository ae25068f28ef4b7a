//! 2D Projection
//!
//! Principal component projection of embedding vectors onto a plane, for
//! scatter-plot style visualisation of query neighborhoods.
//!
//! The two leading principal axes are found with the power iteration
//! method on the covariance matrix of the mean-centred input:
//!
//! ```text
//! v_{t+1} = C v_t / ||C v_t||
//! ```
//!
//! The second axis is obtained the same way after deflating the first one
//! out of `C`. The start vector is fixed, so projections are reproducible.
//!
//! # Example
//!
//! ```
//! use wordnear::projection::{project_2d, ProjectionConfig};
//!
//! let vectors: Vec<Vec<f32>> = vec![vec![1.0, 0.0, 0.0], vec![0.0, 1.0, 0.0], vec![0.0, 0.0, 1.0]];
//! let points = project_2d(&vectors, &ProjectionConfig::default());
//! assert_eq!(points.len(), 3);
//! ```

use std::sync::Arc;
use tracing::debug;

use crate::vector::{normalize_vector, SimilarityResult};

/// Configuration for the principal component search.
#[derive(Debug, Clone)]
pub struct ProjectionConfig {
    /// Maximum number of power iterations per axis.
    /// Default: 100
    pub max_iterations: usize,

    /// Convergence tolerance. Iteration stops when the largest component
    /// change of the axis is below this value.
    /// Default: 1e-6
    pub tolerance: f64,
}

impl Default for ProjectionConfig {
    fn default() -> Self {
        Self {
            max_iterations: 100,
            tolerance: 1e-6,
        }
    }
}

impl ProjectionConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub const fn with_max_iterations(mut self, max_iterations: usize) -> Self {
        self.max_iterations = max_iterations;
        self
    }

    pub const fn with_tolerance(mut self, tolerance: f64) -> Self {
        self.tolerance = tolerance;
        self
    }
}

/// A projected point
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Point2D {
    pub x: f64,
    pub y: f64,
}

/// A neighbor's token with its projected position
#[derive(Debug, Clone, PartialEq)]
pub struct LabeledPoint {
    pub token: Arc<str>,
    pub point: Point2D,
}

/// Project vectors onto their two leading principal axes.
///
/// Returns one point per input in input order. Empty input gives empty
/// output; a single vector projects to the origin.
///
/// # Panics
///
/// Panics if the vectors do not all share one dimensionality.
pub fn project_2d<V: AsRef<[f32]>>(vectors: &[V], config: &ProjectionConfig) -> Vec<Point2D> {
    let n = vectors.len();
    if n == 0 {
        return Vec::new();
    }
    let dim = vectors[0].as_ref().len();
    assert!(
        vectors.iter().all(|v| v.as_ref().len() == dim),
        "project_2d: vectors must share one dimensionality"
    );

    let centred = centre(vectors, dim);
    let mut covariance = covariance(&centred, dim);

    // Residual variance below this is rounding noise, not an axis
    let trace: f64 = (0..dim).map(|i| covariance[i][i]).sum();
    let floor = trace * 1e-9;

    let first = principal_axis(&covariance, floor, config);
    deflate(&mut covariance, &first);
    let second = principal_axis(&covariance, floor, config);

    centred
        .iter()
        .map(|row| Point2D {
            x: dot(row, &first.vector),
            y: dot(row, &second.vector),
        })
        .collect()
}

/// Project the vectors of a similarity result, pairing each point with its token
pub fn project_neighbors(result: &SimilarityResult, config: &ProjectionConfig) -> Vec<LabeledPoint> {
    let vectors: Vec<&[f32]> = result.iter().map(|n| &*n.vector).collect();
    project_2d(&vectors, config)
        .into_iter()
        .zip(result.iter())
        .map(|(point, neighbor)| LabeledPoint {
            token: neighbor.token.clone(),
            point,
        })
        .collect()
}

struct Axis {
    vector: Vec<f64>,
    eigenvalue: f64,
}

fn centre<V: AsRef<[f32]>>(vectors: &[V], dim: usize) -> Vec<Vec<f64>> {
    let n = vectors.len() as f64;
    let mut mean = vec![0.0f64; dim];
    for v in vectors {
        for (m, &x) in mean.iter_mut().zip(v.as_ref()) {
            *m += x as f64;
        }
    }
    for m in mean.iter_mut() {
        *m /= n;
    }

    vectors
        .iter()
        .map(|v| v.as_ref().iter().zip(&mean).map(|(&x, m)| x as f64 - m).collect())
        .collect()
}

/// Row-major `dim x dim` covariance
fn covariance(rows: &[Vec<f64>], dim: usize) -> Vec<Vec<f64>> {
    let mut c = vec![vec![0.0f64; dim]; dim];
    for row in rows {
        for i in 0..dim {
            if row[i] == 0.0 {
                continue;
            }
            for j in i..dim {
                c[i][j] += row[i] * row[j];
            }
        }
    }
    let scale = rows.len().max(1) as f64;
    for i in 0..dim {
        for j in i..dim {
            c[i][j] /= scale;
            c[j][i] = c[i][j];
        }
    }
    c
}

fn dot(a: &[f64], b: &[f64]) -> f64 {
    a.iter().zip(b).map(|(x, y)| x * y).sum()
}

fn mat_vec(m: &[Vec<f64>], v: &[f64]) -> Vec<f64> {
    m.iter().map(|row| dot(row, v)).collect()
}

fn principal_axis(c: &[Vec<f64>], floor: f64, config: &ProjectionConfig) -> Axis {
    let dim = c.len();
    // Uneven start vector so it is unlikely to be orthogonal to the leading axis
    let mut v: Vec<f64> = (0..dim).map(|i| 1.0 + (i as f64) * 0.1).collect();
    normalize_vector(&mut v);

    let mut iterations = 0;
    let mut converged = false;

    while iterations < config.max_iterations {
        iterations += 1;
        let mut next = mat_vec(c, &v);
        let norm = next.iter().map(|x| x * x).sum::<f64>().sqrt();
        if norm <= floor {
            // Degenerate axis: no variance left
            return Axis {
                vector: vec![0.0; dim],
                eigenvalue: 0.0,
            };
        }
        normalize_vector(&mut next);

        // Sign-align with the previous iterate
        if dot(&next, &v) < 0.0 {
            for x in next.iter_mut() {
                *x = -*x;
            }
        }

        let delta = next
            .iter()
            .zip(&v)
            .map(|(a, b)| (a - b).abs())
            .fold(0.0f64, f64::max);
        v = next;

        if delta < config.tolerance {
            converged = true;
            break;
        }
    }

    let eigenvalue = dot(&v, &mat_vec(c, &v));
    debug!(iterations, converged, eigenvalue, "Principal axis found");

    Axis {
        vector: v,
        eigenvalue,
    }
}

/// Remove an axis' contribution: C <- C - λ v vᵀ
fn deflate(c: &mut [Vec<f64>], axis: &Axis) {
    for (i, row) in c.iter_mut().enumerate() {
        for (j, value) in row.iter_mut().enumerate() {
            *value -= axis.eigenvalue * axis.vector[i] * axis.vector[j];
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::vector::{nearest, EmbeddingStore};

    fn config() -> ProjectionConfig {
        ProjectionConfig::default().with_max_iterations(500).with_tolerance(1e-10)
    }

    #[test]
    #[should_panic(expected = "share one dimensionality")]
    fn test_ragged_input_panics() {
        let vectors: Vec<Vec<f32>> = vec![vec![1.0, 0.0, 0.0], vec![0.0, 1.0], vec![1.0, 1.0, 1.0]];
        project_2d(&vectors, &config());
    }

    #[test]
    fn test_empty_input() {
        let vectors: Vec<Vec<f32>> = Vec::new();
        assert!(project_2d(&vectors, &config()).is_empty());
    }

    #[test]
    fn test_single_vector_projects_to_origin() {
        let points = project_2d(&[vec![3.0f32, -1.0, 2.0]], &config());
        assert_eq!(points, vec![Point2D { x: 0.0, y: 0.0 }]);
    }

    #[test]
    fn test_points_on_a_line() {
        // All variance along (1, 1, 0); the second axis is empty
        let vectors: Vec<Vec<f32>> = vec![vec![0.0, 0.0, 5.0], vec![1.0, 1.0, 5.0], vec![2.0, 2.0, 5.0]];
        let points = project_2d(&vectors, &config());

        let spread = (points[2].x - points[0].x).abs();
        assert!((spread - 2.0 * 2f64.sqrt()).abs() < 1e-6);
        assert!(points.iter().all(|p| p.y.abs() < 1e-6));
        assert!(points[1].x.abs() < 1e-9);
    }

    #[test]
    fn test_planar_data_preserves_distances() {
        let vectors: Vec<Vec<f32>> = vec![
            vec![0.0, 0.0, 1.0],
            vec![4.0, 0.0, 1.0],
            vec![0.0, 1.0, 1.0],
            vec![4.0, 1.0, 1.0],
        ];
        let points = project_2d(&vectors, &config());

        let dist = |a: Point2D, b: Point2D| ((a.x - b.x).powi(2) + (a.y - b.y).powi(2)).sqrt();
        assert!((dist(points[0], points[1]) - 4.0).abs() < 1e-6);
        assert!((dist(points[0], points[2]) - 1.0).abs() < 1e-6);
        assert!((dist(points[0], points[3]) - 17f64.sqrt()).abs() < 1e-6);
    }

    #[test]
    fn test_deterministic() {
        let vectors: Vec<Vec<f32>> = vec![vec![0.2, 0.9, -0.4], vec![0.5, -0.1, 0.3], vec![-0.7, 0.2, 0.8]];
        assert_eq!(project_2d(&vectors, &config()), project_2d(&vectors, &config()));
    }

    #[test]
    fn test_project_neighbors_keeps_order() {
        let store = EmbeddingStore::build(vec![
            ("a", vec![1.0, 0.0, 0.0]),
            ("b", vec![0.0, 1.0, 0.0]),
            ("c", vec![1.0, 1.0, 0.0]),
        ])
        .unwrap();
        let result = nearest(&store, &[1.0, 0.0, 0.0], 3).unwrap();
        let labeled = project_neighbors(&result, &ProjectionConfig::default());

        let tokens: Vec<&str> = labeled.iter().map(|p| &*p.token).collect();
        assert_eq!(tokens, vec!["a", "c", "b"]);
    }
}
