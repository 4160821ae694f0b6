use nalgebra::Vector3;

use super::config::FitScope;
use crate::io::input::{PathNode, TracedPath};
use crate::io::output::{RefinedNode, RefinedPath};

/// Working state of one node between fitting and assembly.
#[derive(Debug, Clone, PartialEq)]
pub struct FittedNode {
    pub center: Vector3<f64>,
    pub radius: f64,
    pub tangent: Vector3<f64>,
    pub valid: bool,
}

/// Indices that must be re-admitted so no run of discarded nodes grows past
/// `max_gap`. Endpoints are always re-admitted.
pub fn gap_restorations(valid: &[bool], max_gap: usize) -> Vec<usize> {
    let n = valid.len();
    let mut restored = Vec::new();
    let mut last_valid = 0;
    for i in 0..n {
        if valid[i] {
            last_valid = i;
            continue;
        }
        let endpoint = i == 0 || i == n - 1;
        let next_valid = i + 1 < n && valid[i + 1];
        if endpoint || (i - last_valid >= max_gap && !next_valid) {
            restored.push(i);
            last_valid = i;
        }
    }
    restored
}

/// Re-admits nodes at their traced position with a radius of one `step`,
/// then floors every kept radius at `step`. Returns the restored indices.
///
/// A restored node takes the traced tangent when the source carries one and
/// keeps its finite-difference tangent otherwise.
pub fn fill_gaps(nodes: &mut [FittedNode], originals: &[PathNode], step: f64, max_gap: usize) -> Vec<usize> {
    let valid: Vec<bool> = nodes.iter().map(|n| n.valid).collect();
    let restored = gap_restorations(&valid, max_gap);
    for &i in &restored {
        let node = &mut nodes[i];
        node.center = originals[i].position;
        if let Some(tangent) = originals[i].tangent {
            node.tangent = tangent;
        }
        node.radius = step;
        node.valid = true;
    }
    for node in nodes.iter_mut().filter(|n| n.valid) {
        node.radius = node.radius.max(step);
    }
    restored
}

/// Builds the fitted path from the valid nodes, taking positions and radii
/// from the fit or from the source according to `scope`.
pub fn assemble(source: &TracedPath, nodes: &[FittedNode], scope: FitScope) -> RefinedPath {
    let keep_source_radii = !scope.fits_radii() && source.has_radii();
    let refined = nodes
        .iter()
        .zip(&source.nodes)
        .enumerate()
        .filter(|(_, (fitted, _))| fitted.valid)
        .map(|(i, (fitted, original))| {
            let position = if scope.fits_midpoints() {
                fitted.center
            } else {
                original.position
            };
            let (radius, tangent) = if scope.fits_radii() {
                (Some(fitted.radius), Some(fitted.tangent))
            } else {
                (original.radius.filter(|_| keep_source_radii), original.tangent)
            };
            RefinedNode {
                source_index: i,
                position,
                radius,
                tangent,
            }
        })
        .collect();
    RefinedPath::for_source(source, refined)
}
