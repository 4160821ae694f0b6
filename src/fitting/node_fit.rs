use nalgebra::Vector3;
use rayon::prelude::*;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use super::cross_section::{self, CrossSection};
use super::optimizer::{optimize, CircleParams};
use super::progress::ProgressSink;
use crate::error::{FitError, Result};
use crate::io::volume::Volume;

/// Radius, in grid cells, the circle search starts from.
const INITIAL_RADIUS: f64 = 3.0;

/// Finite-difference tangent at node `i`, clamped at the path ends.
pub fn path_tangent(positions: &[Vector3<f64>], i: usize, half_window: usize) -> Vector3<f64> {
    if positions.is_empty() {
        return Vector3::zeros();
    }
    let last = positions.len() - 1;
    let ahead = (i + half_window).min(last);
    let behind = i.saturating_sub(half_window);
    positions[ahead] - positions[behind]
}

/// Outcome of the circle fit on one node's cross-section.
#[derive(Debug, Clone, PartialEq)]
pub struct NodeFit {
    pub tangent: Vector3<f64>,
    /// Refined center in world coordinates.
    pub center: Vector3<f64>,
    /// World-unit radius.
    pub radius: f64,
    pub radius_grid: f64,
    pub grid_x: f64,
    pub grid_y: f64,
    pub score: f64,
    /// World distance between the refined and the traced center.
    pub moved: f64,
}

pub(crate) struct NodeFitJob<'a> {
    pub volume: &'a Volume,
    pub positions: &'a [Vector3<f64>],
    pub tangent_half_window: usize,
    pub side: usize,
    pub step: f64,
}

impl NodeFitJob<'_> {
    /// Fits node `i`, returning the fit and the sampled cross-section.
    pub fn fit_node(&self, i: usize) -> Result<(NodeFit, CrossSection)> {
        let origin = self.positions[i];
        let tangent = path_tangent(self.positions, i, self.tangent_half_window);
        let section = cross_section::build(self.volume, &origin, &tangent, self.side, self.step);

        let m = section.midpoint();
        let start = CircleParams {
            x: m,
            y: m,
            r: INITIAL_RADIUS,
        };
        let result = optimize(&section.values, self.side, start)
            .map_err(|source| FitError::Optimizer { node: i, source })?;

        let center = section.grid_to_world(result.center_x, result.center_y);
        let moved = (center - origin).norm();
        log::debug!(
            "Node {}: ({:.3}, {:.3}, {:.3}) -> ({:.3}, {:.3}, {:.3}), r = {:.3}, score = {:.5}",
            i,
            origin.x,
            origin.y,
            origin.z,
            center.x,
            center.y,
            center.z,
            result.radius * self.step,
            result.score
        );

        let fit = NodeFit {
            tangent,
            center,
            radius: result.radius * self.step,
            radius_grid: result.radius,
            grid_x: result.center_x,
            grid_y: result.center_y,
            score: result.score,
            moved,
        };
        Ok((fit, section))
    }

    /// Fits every node in parallel. The first failure aborts the whole run.
    pub fn fit_all(
        &self,
        progress: Option<(&dyn ProgressSink, usize)>,
        cancel: Option<&AtomicBool>,
    ) -> Result<Vec<(NodeFit, CrossSection)>> {
        let total = self.positions.len();
        let finished = AtomicUsize::new(0);

        (0..total)
            .into_par_iter()
            .map(|i| {
                if cancel.is_some_and(|flag| flag.load(Ordering::Relaxed)) {
                    return Err(FitError::Cancelled);
                }
                let fitted = self.fit_node(i)?;
                let done = finished.fetch_add(1, Ordering::Relaxed) + 1;
                if let Some((sink, task_index)) = progress {
                    sink.update_progress(done as f64 / total as f64, task_index);
                }
                Ok(fitted)
            })
            .collect()
    }
}
