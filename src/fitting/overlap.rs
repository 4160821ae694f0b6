//! Removal of fitted cross-sections whose disks cut through each other.
//!
//! Two disks overlap when the line where their planes meet passes through
//! both of them. Resolution greedily drops the worst offender until no pair
//! of valid disks overlaps.

use nalgebra::{Matrix2, Vector2, Vector3};

const EPSILON: f64 = 1e-6;

/// A fitted cross-section: a disk in the plane normal to the node's tangent.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Disk {
    pub center: Vector3<f64>,
    pub normal: Vector3<f64>,
    pub radius: f64,
}

fn unit(v: &Vector3<f64>) -> Option<Vector3<f64>> {
    let norm = v.norm();
    if norm < EPSILON || !norm.is_finite() {
        None
    } else {
        Some(v / norm)
    }
}

/// Parameter interval `[lo, hi]` of `base + u * dir` lying inside `disk`,
/// or `None` when the line misses it. `Err` flags a degenerate quadratic.
fn chord(disk: &Disk, base: &Vector3<f64>, dir: &Vector3<f64>) -> Result<Option<(f64, f64)>, ()> {
    let offset = base - disk.center;
    let a = dir.dot(dir);
    let b = 2.0 * dir.dot(&offset);
    let c = offset.dot(&offset) - disk.radius * disk.radius;
    if a < f64::EPSILON {
        return Err(());
    }
    let discriminant = b * b - 4.0 * a * c;
    if discriminant < 0.0 {
        return Ok(None);
    }
    let root = discriminant.sqrt();
    Ok(Some(((-b - root) / (2.0 * a), (-b + root) / (2.0 * a))))
}

/// Whether two fitted disks intersect. Degenerate input is reported as
/// overlapping.
pub fn disks_overlap(d1: &Disk, d2: &Disk) -> bool {
    let (n1, n2) = match (unit(&d1.normal), unit(&d2.normal)) {
        (Some(n1), Some(n2)) => (n1, n2),
        _ => {
            log::warn!("Disk with degenerate normal, assuming overlap");
            return true;
        }
    };

    let cos = n1.dot(&n2);
    let det = 1.0 - cos * cos;
    // |n1 x n2|^2 == det, so this bounds the cross product by EPSILON
    if det < EPSILON * EPSILON {
        // parallel planes only meet when they coincide
        return (d2.center - d1.center).dot(&n1).abs() < EPSILON;
    }

    let h = Vector2::new(n1.dot(&d1.center), n2.dot(&d2.center));
    let gram = Matrix2::new(1.0, cos, cos, 1.0);
    let coeffs = match gram.try_inverse() {
        Some(inv) => inv * h,
        None => {
            log::warn!("Singular plane system (cos = {}), assuming overlap", cos);
            return true;
        }
    };
    let base = n1 * coeffs.x + n2 * coeffs.y;
    let dir = n1.cross(&n2);

    let (i1, i2) = match (chord(d1, &base, &dir), chord(d2, &base, &dir)) {
        (Err(()), _) | (_, Err(())) => {
            log::warn!("Degenerate plane intersection line, assuming overlap");
            return true;
        }
        (Ok(None), _) | (_, Ok(None)) => return false,
        (Ok(Some(i1)), Ok(Some(i2))) => (i1, i2),
    };

    if [i1.0, i1.1, i2.0, i2.1].iter().any(|u| u.is_nan()) {
        log::warn!("Non-finite chord interval, assuming overlap");
        return true;
    }
    i1.0 <= i2.1 && i2.0 <= i1.1
}

/// Invalidates nodes until no two valid disks overlap. Returns how many
/// nodes were discarded.
///
/// Each round drops the first node holding the highest overlap count. If the
/// next valid node holds the same count and has the smaller radius, that
/// neighbour is dropped instead.
pub fn resolve_overlaps(disks: &[Disk], valid: &mut [bool]) -> usize {
    let n = disks.len().min(valid.len());
    let mut overlaps = vec![false; n * n];
    for i in 0..n {
        if !valid[i] {
            continue;
        }
        for j in (i + 1)..n {
            if valid[j] && disks_overlap(&disks[i], &disks[j]) {
                overlaps[i * n + j] = true;
                overlaps[j * n + i] = true;
            }
        }
    }

    let mut removed = 0;
    loop {
        let counts: Vec<usize> = (0..n)
            .map(|i| {
                if !valid[i] {
                    return 0;
                }
                (0..n).filter(|&j| valid[j] && overlaps[i * n + j]).count()
            })
            .collect();

        let max = counts.iter().copied().max().unwrap_or(0);
        if max == 0 {
            break;
        }
        let Some(i) = (0..n).find(|&i| valid[i] && counts[i] == max) else {
            break;
        };

        let discard = match ((i + 1)..n).find(|&j| valid[j]) {
            Some(j) if counts[j] == max && disks[j].radius < disks[i].radius => j,
            _ => i,
        };
        log::debug!("Discarding node {} with {} overlapping neighbours", discard, max);
        valid[discard] = false;
        removed += 1;
    }
    removed
}
