//! K-means vector quantisation of 3D feature points
//!
//! Centroids are seeded uniformly inside the bounding box of the data.
//! Lloyd iterations then alternate nearest-centroid assignment and mean
//! recomputation until no centroid moves. A cluster left empty by an
//! assignment is refilled with up to three points taken one at a time from
//! random clusters holding more than one point, so every returned cluster
//! owns at least one point.

use nalgebra::{Point3, Vector3};
use rand::Rng;

use crate::errors::GestureError;

/// Points moved into an empty cluster per repair
const REPAIR_POINTS: usize = 3;

/// Clustering result
#[derive(Debug, Clone, PartialEq)]
pub struct Clustering {
    /// One centroid per cluster
    pub centroids: Vec<Point3<f64>>,
    /// Cluster index of every input point
    pub assignments: Vec<usize>,
    /// Lloyd iterations performed
    pub iterations: usize,
    /// False when the iteration cap stopped the loop
    pub converged: bool,
}

impl Clustering {
    /// Number of points assigned to each cluster
    pub fn cluster_sizes(&self) -> Vec<usize> {
        let mut sizes = vec![0; self.centroids.len()];
        for &c in &self.assignments {
            sizes[c] += 1;
        }
        sizes
    }
}

/// Index of the centroid closest to `point` (first one on ties).
///
/// Returns 0 for an empty centroid list.
pub fn nearest_centroid(point: &Point3<f64>, centroids: &[Point3<f64>]) -> usize {
    let mut best = 0;
    let mut best_distance = f64::INFINITY;
    for (i, c) in centroids.iter().enumerate() {
        let d = (point - c).norm_squared();
        if d < best_distance {
            best_distance = d;
            best = i;
        }
    }
    best
}

/// Number of exactly distinct points
pub fn distinct_count(points: &[Point3<f64>]) -> usize {
    let mut sorted: Vec<&Point3<f64>> = points.iter().collect();
    sorted.sort_by(|a, b| {
        a.x.total_cmp(&b.x)
            .then(a.y.total_cmp(&b.y))
            .then(a.z.total_cmp(&b.z))
    });
    sorted.dedup();
    sorted.len()
}

fn seed_centroids<R: Rng + ?Sized>(points: &[Point3<f64>], k: usize, rng: &mut R) -> Vec<Point3<f64>> {
    let mut lo = points[0].coords;
    let mut hi = points[0].coords;
    for p in points {
        lo = lo.inf(&p.coords);
        hi = hi.sup(&p.coords);
    }

    let mut centroids: Vec<Point3<f64>> = Vec::with_capacity(k);
    while centroids.len() < k {
        let candidate = Point3::new(
            rng.gen_range(lo.x..=hi.x),
            rng.gen_range(lo.y..=hi.y),
            rng.gen_range(lo.z..=hi.z),
        );
        if !centroids.contains(&candidate) {
            centroids.push(candidate);
        }
    }
    centroids
}

fn assign(points: &[Point3<f64>], centroids: &[Point3<f64>], assignments: &mut [usize]) {
    for (slot, p) in assignments.iter_mut().zip(points) {
        *slot = nearest_centroid(p, centroids);
    }
}

fn repair_empty_clusters<R: Rng + ?Sized>(k: usize, assignments: &mut [usize], rng: &mut R) {
    let mut sizes = vec![0usize; k];
    for &c in assignments.iter() {
        sizes[c] += 1;
    }

    for empty in 0..k {
        if sizes[empty] > 0 {
            continue;
        }
        for _ in 0..REPAIR_POINTS {
            let donors: Vec<usize> = (0..k).filter(|&c| sizes[c] > 1).collect();
            if donors.is_empty() {
                break;
            }
            let donor = donors[rng.gen_range(0..donors.len())];
            let members: Vec<usize> = assignments
                .iter()
                .enumerate()
                .filter(|&(_, &c)| c == donor)
                .map(|(i, _)| i)
                .collect();
            let moved = members[rng.gen_range(0..members.len())];
            assignments[moved] = empty;
            sizes[donor] -= 1;
            sizes[empty] += 1;
        }
    }
}

/// Recompute centroids as incremental means; returns the summed displacement
fn update_centroids(
    points: &[Point3<f64>],
    assignments: &[usize],
    centroids: &mut [Point3<f64>],
) -> f64 {
    let k = centroids.len();
    let mut means = vec![Vector3::zeros(); k];
    let mut counts = vec![0usize; k];
    for (p, &c) in points.iter().zip(assignments) {
        counts[c] += 1;
        let delta = (p.coords - means[c]) / counts[c] as f64;
        means[c] += delta;
    }

    let mut displacement = 0.0;
    for c in 0..k {
        if counts[c] == 0 {
            continue;
        }
        displacement += (means[c] - centroids[c].coords).norm();
        centroids[c] = Point3::from(means[c]);
    }
    displacement
}

/// Cluster `points` into `k` groups.
///
/// # Arguments
/// * `points` - data to cluster
/// * `k` - number of clusters
/// * `max_iterations` - cap on Lloyd iterations
/// * `rng` - source of seeding and repair randomness
///
/// # Returns
/// [`GestureError::NotEnoughPoints`] when fewer than `k` distinct points exist
pub fn kmeans<R: Rng + ?Sized>(
    points: &[Point3<f64>],
    k: usize,
    max_iterations: usize,
    rng: &mut R,
) -> Result<Clustering, GestureError> {
    let distinct = distinct_count(points);
    if k == 0 || distinct < k {
        return Err(GestureError::NotEnoughPoints {
            required: k,
            found: distinct,
        });
    }

    let mut centroids = seed_centroids(points, k, rng);
    let mut assignments = vec![0; points.len()];
    let mut iterations = 0;
    let mut converged = false;

    while iterations < max_iterations.max(1) {
        iterations += 1;
        assign(points, &centroids, &mut assignments);
        repair_empty_clusters(k, &mut assignments, rng);
        let displacement = update_centroids(points, &assignments, &mut centroids);
        log::debug!("k-means iteration {}: displacement {:.6}", iterations, displacement);
        if displacement == 0.0 {
            converged = true;
            break;
        }
    }

    if !converged {
        log::debug!("k-means stopped at the {} iteration cap", max_iterations);
    }

    Ok(Clustering {
        centroids,
        assignments,
        iterations,
        converged,
    })
}
