use nalgebra::Vector3;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::io::volume::{Volume, VoxelData};

/// An 8-bit volume with a bright cylinder along z, centred on the xy middle,
/// at unit spacing.
pub fn tube_volume(width: usize, height: usize, depth: usize, radius: f64, inside: u8, outside: u8) -> Volume {
    let cx = width as f64 / 2.0;
    let cy = height as f64 / 2.0;
    let mut data = Vec::with_capacity(width * height * depth);
    for _ in 0..depth {
        for y in 0..height {
            for x in 0..width {
                let dx = x as f64 - cx;
                let dy = y as f64 - cy;
                data.push(if dx * dx + dy * dy <= radius * radius { inside } else { outside });
            }
        }
    }
    Volume::new(width, height, depth, Vector3::new(1.0, 1.0, 1.0), VoxelData::U8(data)).unwrap()
}

/// `n` evenly spaced points starting at `start`.
pub fn straight_positions(start: Vector3<f64>, step: Vector3<f64>, n: usize) -> Vec<Vector3<f64>> {
    (0..n).map(|i| start + step * i as f64).collect()
}

/// Straight positions with reproducible uniform noise of up to `amplitude`
/// on x and y.
pub fn jittered_positions(
    start: Vector3<f64>,
    step: Vector3<f64>,
    n: usize,
    amplitude: f64,
    seed: u64,
) -> Vec<Vector3<f64>> {
    let mut rng = StdRng::seed_from_u64(seed);
    straight_positions(start, step, n)
        .into_iter()
        .map(|p| {
            p + Vector3::new(
                rng.random_range(-amplitude..=amplitude),
                rng.random_range(-amplitude..=amplitude),
                0.0,
            )
        })
        .collect()
}
