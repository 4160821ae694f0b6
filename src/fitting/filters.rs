use nalgebra::Vector3;
use std::f64::consts::{FRAC_PI_2, PI};

/// Local reference radius per node, in grid units.
///
/// Each node looks at the `2 * half_window + 1` fitted radii centred on it.
/// Slots before the path start hold a tiny sentinel and slots past the end a
/// huge one, so the sorted middle stays balanced near the ends.
pub fn mode_radii(radii_grid: &[f64], half_window: usize) -> Vec<f64> {
    let n = radii_grid.len() as i64;
    let w = half_window as i64;
    let mut window = Vec::with_capacity(2 * half_window + 1);

    (0..n)
        .map(|i| {
            window.clear();
            window.extend((i - w..=i + w).map(|k| {
                if k < 0 {
                    f64::MIN_POSITIVE
                } else if k >= n {
                    f64::MAX
                } else {
                    radii_grid[k as usize].max(1.0)
                }
            }));
            window.sort_by(|a, b| a.total_cmp(b));
            window[window.len() / 2]
        })
        .collect()
}

/// A node keeps its fit only if it moved less than its local mode radius.
/// Both quantities are compared in world units.
pub fn drift_validity(moved: &[f64], mode_radii_grid: &[f64], step: f64) -> Vec<bool> {
    moved
        .iter()
        .zip(mode_radii_grid)
        .map(|(&d, &mode)| d < mode * step)
        .collect()
}

fn angle_between(a: &Vector3<f64>, b: &Vector3<f64>) -> f64 {
    let denom = a.norm() * b.norm();
    if denom == 0.0 || !denom.is_finite() {
        return PI;
    }
    (a.dot(b) / denom).clamp(-1.0, 1.0).acos()
}

/// Angle, in radians, at every node between the directions to its nearest
/// valid neighbours. Interior nodes with an angle under 90 degrees are
/// marked invalid in `valid`; endpoints are fixed at 180 degrees.
pub fn bend_angles(centers: &[Vector3<f64>], valid: &mut [bool]) -> Vec<f64> {
    let n = centers.len();
    let mut angles = vec![PI; n];
    if n < 3 {
        return angles;
    }

    // next_valid[i]: first valid index > i, defaulting to the last node
    let mut next_valid = vec![n - 1; n];
    for i in (0..n - 1).rev() {
        next_valid[i] = if valid[i + 1] { i + 1 } else { next_valid[i + 1] };
    }

    let mut previous = 0;
    for i in 1..n - 1 {
        let to_prev = centers[previous] - centers[i];
        let to_next = centers[next_valid[i]] - centers[i];
        angles[i] = angle_between(&to_prev, &to_next);
        if angles[i] < FRAC_PI_2 {
            valid[i] = false;
        }
        if valid[i] {
            previous = i;
        }
    }
    angles
}
