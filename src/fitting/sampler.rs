use nalgebra::Vector3;

use crate::io::volume::Volume;

/// Trilinear intensity at a world-space point.
///
/// Corners falling outside the volume read as zero, so the value fades to
/// zero across the volume border instead of failing.
pub fn sample(volume: &Volume, point: &Vector3<f64>) -> f64 {
    let spacing = volume.spacing();
    let ix = point.x / spacing.x;
    let iy = point.y / spacing.y;
    let iz = point.z / spacing.z;
    if !(ix.is_finite() && iy.is_finite() && iz.is_finite()) {
        return 0.0;
    }
    // every corner would be off-volume; also keeps the i64 casts in range
    let beyond = |i: f64, dim: usize| i <= -1.0 || i >= dim as f64;
    if beyond(ix, volume.width()) || beyond(iy, volume.height()) || beyond(iz, volume.depth()) {
        return 0.0;
    }

    let x0 = ix.floor();
    let y0 = iy.floor();
    let z0 = iz.floor();
    let xd = ix - x0;
    let yd = iy - y0;
    let zd = iz - z0;
    let (x0, y0, z0) = (x0 as i64, y0 as i64, z0 as i64);

    let at = |x: i64, y: i64, z: i64| f64::from(volume.voxel(x, y, z).unwrap_or(0.0));

    let c000 = at(x0, y0, z0);
    let c100 = at(x0 + 1, y0, z0);
    let c010 = at(x0, y0 + 1, z0);
    let c110 = at(x0 + 1, y0 + 1, z0);
    let c001 = at(x0, y0, z0 + 1);
    let c101 = at(x0 + 1, y0, z0 + 1);
    let c011 = at(x0, y0 + 1, z0 + 1);
    let c111 = at(x0 + 1, y0 + 1, z0 + 1);

    let c00 = c000 * (1.0 - xd) + c100 * xd;
    let c10 = c010 * (1.0 - xd) + c110 * xd;
    let c01 = c001 * (1.0 - xd) + c101 * xd;
    let c11 = c011 * (1.0 - xd) + c111 * xd;

    let c0 = c00 * (1.0 - yd) + c10 * yd;
    let c1 = c01 * (1.0 - yd) + c11 * yd;

    c0 * (1.0 - zd) + c1 * zd
}
