use nalgebra::Vector3;

use super::sampler::sample;
use crate::io::volume::Volume;

const EPSILON: f64 = 1e-6;

/// Square intensity grid sampled in the plane normal to a node's tangent.
///
/// Cell `(i, j)` is stored at `values[j * side + i]` and was sampled at
/// `origin + (m - i) * basis_x + (m - j) * basis_y` with `m = (side - 1) / 2`.
#[derive(Debug, Clone, PartialEq)]
pub struct CrossSection {
    pub side: usize,
    pub values: Vec<f32>,
    pub origin: Vector3<f64>,
    pub basis_x: Vector3<f64>,
    pub basis_y: Vector3<f64>,
}

impl CrossSection {
    /// Grid coordinate of the sampling origin.
    pub fn midpoint(&self) -> f64 {
        grid_midpoint(self.side)
    }

    /// World position of a (sub-cell) grid coordinate.
    pub fn grid_to_world(&self, gx: f64, gy: f64) -> Vector3<f64> {
        let m = self.midpoint();
        self.origin - self.basis_x * (gx - m) - self.basis_y * (gy - m)
    }

    pub fn min_max(&self) -> (f32, f32) {
        self.values
            .iter()
            .fold((f32::MAX, f32::MIN), |(lo, hi), &v| (lo.min(v), hi.max(v)))
    }
}

pub fn grid_midpoint(side: usize) -> f64 {
    (side as f64 - 1.0) / 2.0
}

/// Two unit vectors spanning the plane normal to `tangent`.
///
/// The reference axis crossed with the tangent is picked from the tangent's
/// dominant component, so axis-aligned tangents never produce a zero vector.
pub fn in_plane_basis(tangent: &Vector3<f64>) -> (Vector3<f64>, Vector3<f64>) {
    let n = if tangent.norm() < EPSILON || !tangent.iter().all(|c| c.is_finite()) {
        log::warn!("Degenerate tangent {:?}, sampling in the xy plane", tangent);
        Vector3::z()
    } else {
        tangent.normalize()
    };

    let reference = if n.z.abs() >= n.x.abs().max(n.y.abs()) {
        Vector3::y()
    } else {
        Vector3::z()
    };

    let a = reference.cross(&n).normalize();
    let b = a.cross(&n).normalize();
    (a, b)
}

/// Samples a `side` × `side` grid with cell pitch `step` around `center`.
pub fn build(
    volume: &Volume,
    center: &Vector3<f64>,
    tangent: &Vector3<f64>,
    side: usize,
    step: f64,
) -> CrossSection {
    let (a, b) = in_plane_basis(tangent);
    let basis_x = a * step;
    let basis_y = b * step;
    let m = grid_midpoint(side);

    let mut values = vec![0.0f32; side * side];
    for j in 0..side {
        let gj = m - j as f64;
        for i in 0..side {
            let gi = m - i as f64;
            let point = center + basis_x * gi + basis_y * gj;
            values[j * side + i] = sample(volume, &point) as f32;
        }
    }

    CrossSection {
        side,
        values,
        origin: *center,
        basis_x,
        basis_y,
    }
}

#[cfg(test)]
mod cross_section_tests {
    use super::*;
    use crate::utils::test_utils::tube_volume;
    use approx::assert_relative_eq;

    fn assert_orthonormal(t: &Vector3<f64>) {
        let (a, b) = in_plane_basis(t);
        assert!(a.iter().chain(b.iter()).all(|c| c.is_finite()));
        assert_relative_eq!(a.norm(), 1.0, epsilon = 1e-12);
        assert_relative_eq!(b.norm(), 1.0, epsilon = 1e-12);
        assert_relative_eq!(a.dot(&b), 0.0, epsilon = 1e-12);
        let n = t.normalize();
        assert_relative_eq!(a.dot(&n), 0.0, epsilon = 1e-12);
        assert_relative_eq!(b.dot(&n), 0.0, epsilon = 1e-12);
    }

    #[test]
    fn test_axis_aligned_tangents_give_orthonormal_basis() {
        for t in [
            Vector3::x(),
            Vector3::y(),
            Vector3::z(),
            -Vector3::x(),
            -Vector3::y(),
            Vector3::new(0.0, 0.0, -8.0),
        ] {
            assert_orthonormal(&t);
        }
    }

    #[test]
    fn test_oblique_tangents_give_orthonormal_basis() {
        for t in [
            Vector3::new(1.0, 1.0, 1.0),
            Vector3::new(1e-9, 0.0, 1.0),
            Vector3::new(-3.0, 0.2, 0.1),
        ] {
            assert_orthonormal(&t);
        }
    }

    #[test]
    fn test_zero_tangent_falls_back() {
        let (a, b) = in_plane_basis(&Vector3::zeros());
        assert_relative_eq!(a.norm(), 1.0, epsilon = 1e-12);
        assert_relative_eq!(b.norm(), 1.0, epsilon = 1e-12);
        assert_relative_eq!(a.z, 0.0, epsilon = 1e-12);
        assert_relative_eq!(b.z, 0.0, epsilon = 1e-12);
    }

    #[test]
    fn test_grid_to_world_inverts_sampling_positions() {
        let vol = tube_volume(20, 20, 10, 3.0, 200, 10);
        let center = Vector3::new(10.0, 10.0, 5.0);
        let section = build(&vol, &center, &Vector3::z(), 9, 0.5);
        let m = section.midpoint();
        assert_relative_eq!((section.grid_to_world(m, m) - center).norm(), 0.0, epsilon = 1e-12);

        // cell (0, 0) was sampled at origin + m * basis_x + m * basis_y
        let expected = center + section.basis_x * m + section.basis_y * m;
        assert_relative_eq!((section.grid_to_world(0.0, 0.0) - expected).norm(), 0.0, epsilon = 1e-12);
    }

    #[test]
    fn test_section_across_tube_is_bright_in_the_middle() {
        let vol = tube_volume(20, 20, 10, 3.0, 200, 10);
        let section = build(&vol, &Vector3::new(10.0, 10.0, 5.0), &Vector3::new(0.0, 0.0, 4.0), 15, 1.0);
        let mid = 7;
        assert_relative_eq!(section.values[mid * 15 + mid], 200.0, epsilon = 1e-4);
        assert_relative_eq!(section.values[0], 10.0, epsilon = 1e-4);
        let (lo, hi) = section.min_max();
        assert_relative_eq!(lo, 10.0, epsilon = 1e-4);
        assert_relative_eq!(hi, 200.0, epsilon = 1e-4);
    }
}
