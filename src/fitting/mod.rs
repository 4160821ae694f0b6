pub mod assemble;
pub mod config;
pub mod cross_section;
pub mod filters;
pub mod node_fit;
pub mod optimizer;
pub mod overlap;
pub mod progress;
pub mod sampler;

use serde::Serialize;
use std::sync::atomic::AtomicBool;
use std::sync::Arc;

use crate::error::Result;
use crate::io::input::TracedPath;
use crate::io::output::RefinedPath;
use crate::io::volume::Volume;
use assemble::FittedNode;
use config::FitConfig;
use cross_section::CrossSection;
use node_fit::{NodeFit, NodeFitJob};
use overlap::Disk;
use progress::ProgressSink;

/// Per-node record of how the fit went, for inspection and export.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NodeDiagnostics {
    pub index: usize,
    pub grid_x: f64,
    pub grid_y: f64,
    pub radius_grid: f64,
    pub radius: f64,
    pub score: f64,
    pub moved: f64,
    pub mode_radius: f64,
    pub angle_degrees: f64,
    pub center: [f64; 3],
    pub tangent: [f64; 3],
    pub accepted: bool,
    /// Node was re-admitted at its traced position to close a gap.
    pub restored: bool,
}

#[derive(Debug, Clone)]
pub struct FitOutcome {
    pub refined: RefinedPath,
    pub diagnostics: Vec<NodeDiagnostics>,
    pub cross_sections: Option<Vec<CrossSection>>,
}

/// Refines one traced path against a volume.
///
/// Every node gets a cross-section normal to the local tangent and a circle
/// fit on it. Fits that drift too far, fold back on their neighbours or cut
/// through another fitted disk are discarded, and the gaps left behind are
/// closed with traced nodes.
pub struct PathFitter<'a> {
    volume: &'a Volume,
    path: &'a TracedPath,
    config: FitConfig,
    progress: Option<(&'a dyn ProgressSink, usize)>,
    cancel: Option<Arc<AtomicBool>>,
}

impl<'a> PathFitter<'a> {
    pub fn new(volume: &'a Volume, path: &'a TracedPath) -> Result<Self> {
        path.check_fittable()?;
        Ok(Self {
            volume,
            path,
            config: FitConfig::default(),
            progress: None,
            cancel: None,
        })
    }

    pub fn with_config(mut self, config: FitConfig) -> Result<Self> {
        config.validate()?;
        self.config = config;
        Ok(self)
    }

    pub fn with_progress(mut self, sink: &'a dyn ProgressSink, task_index: usize) -> Self {
        self.progress = Some((sink, task_index));
        self
    }

    pub fn with_cancel_flag(mut self, flag: Arc<AtomicBool>) -> Self {
        self.cancel = Some(flag);
        self
    }

    pub fn config(&self) -> &FitConfig {
        &self.config
    }

    pub fn fit(&self) -> Result<FitOutcome> {
        self.config.validate()?;
        let path = self.path;
        let step = path.minimum_separation();
        let positions = path.positions();
        let n = positions.len();
        log::info!(
            "Fitting {} ({} nodes): {}, max radius {}",
            path.name,
            n,
            self.config.scope,
            self.config.max_radius
        );

        let job = NodeFitJob {
            volume: self.volume,
            positions: &positions,
            tangent_half_window: self.config.tangent_half_window,
            side: self.config.max_radius,
            step,
        };
        let (fits, sections): (Vec<NodeFit>, Vec<CrossSection>) =
            job.fit_all(self.progress, self.cancel.as_deref())?.into_iter().unzip();

        let radii_grid: Vec<f64> = fits.iter().map(|f| f.radius_grid).collect();
        let moved: Vec<f64> = fits.iter().map(|f| f.moved).collect();
        let modes = filters::mode_radii(&radii_grid, self.config.mode_half_window);
        let mut valid = filters::drift_validity(&moved, &modes, step);
        let drifted = valid.iter().filter(|&&v| !v).count();

        let centers: Vec<_> = fits.iter().map(|f| f.center).collect();
        let angles = filters::bend_angles(&centers, &mut valid);

        let disks: Vec<Disk> = fits
            .iter()
            .map(|f| Disk {
                center: f.center,
                normal: f.tangent,
                radius: f.radius,
            })
            .collect();
        let overlapping = overlap::resolve_overlaps(&disks, &mut valid);

        let accepted = valid.iter().filter(|&&v| v).count();
        let mut nodes: Vec<FittedNode> = fits
            .iter()
            .zip(&valid)
            .map(|(f, &v)| FittedNode {
                center: f.center,
                radius: f.radius,
                tangent: f.tangent,
                valid: v,
            })
            .collect();
        let restored = assemble::fill_gaps(&mut nodes, &path.nodes, step, self.config.max_gap);
        log::debug!(
            "{}: {} drifted, {} overlapping, {} restored",
            path.name,
            drifted,
            overlapping,
            restored.len()
        );

        let refined = assemble::assemble(path, &nodes, self.config.scope);
        log::info!("{}: {}/{} accepted fits", path.name, accepted, n);

        let diagnostics = fits
            .iter()
            .enumerate()
            .map(|(i, f)| NodeDiagnostics {
                index: i,
                grid_x: f.grid_x,
                grid_y: f.grid_y,
                radius_grid: f.radius_grid,
                radius: f.radius,
                score: f.score,
                moved: f.moved,
                mode_radius: modes[i] * step,
                angle_degrees: angles[i].to_degrees(),
                center: f.center.into(),
                tangent: f.tangent.into(),
                accepted: valid[i],
                restored: restored.contains(&i),
            })
            .collect();

        Ok(FitOutcome {
            refined,
            diagnostics,
            cross_sections: self.config.keep_cross_sections.then_some(sections),
        })
    }

    /// Runs the fit, reducing any failure to `(None, false)`.
    pub fn call(&self) -> (Option<RefinedPath>, bool) {
        match self.fit() {
            Ok(outcome) => (Some(outcome.refined), true),
            Err(e) => {
                log::warn!("Fitting {} failed: {}", self.path.name, e);
                (None, false)
            }
        }
    }
}

#[cfg(test)]
mod fitting_tests {
    use super::*;
    use crate::error::FitError;
    use crate::fitting::config::FitScope;
    use crate::io::input::PathNode;
    use crate::utils::test_utils::{jittered_positions, straight_positions, tube_volume};
    use nalgebra::Vector3;

    fn axis_path(x: f64, y: f64) -> TracedPath {
        let nodes = straight_positions(Vector3::new(x, y, 3.0), Vector3::new(0.0, 0.0, 1.0), 25)
            .into_iter()
            .map(|p| PathNode::new(p.x, p.y, p.z).with_radius(2.0))
            .collect();
        TracedPath::new(1, nodes, Vector3::new(1.0, 1.0, 1.0))
    }

    fn config(scope: FitScope) -> FitConfig {
        FitConfig {
            max_radius: 24,
            scope,
            ..FitConfig::default()
        }
    }

    #[test]
    fn test_tube_radius_is_recovered() {
        let volume = tube_volume(40, 40, 30, 5.0, 200, 10);
        let path = axis_path(20.0, 20.0);
        let outcome = PathFitter::new(&volume, &path)
            .unwrap()
            .with_config(config(FitScope::RadiiAndMidpoints))
            .unwrap()
            .fit()
            .unwrap();

        let refined = outcome.refined;
        assert_eq!(refined.name, "Fitted Path [1]");
        assert_eq!(refined.len(), 25);
        for node in &refined.nodes[1..24] {
            let r = node.radius.unwrap();
            assert!((r - 5.0).abs() <= 1.0, "node {} radius {}", node.source_index, r);
        }
        assert_eq!(outcome.diagnostics.len(), 25);
        assert!(outcome.cross_sections.is_none());
    }

    #[test]
    fn test_offset_path_is_pulled_onto_axis() {
        let volume = tube_volume(40, 40, 30, 5.0, 200, 10);
        let path = axis_path(22.0, 21.0);
        let (refined, success) = PathFitter::new(&volume, &path)
            .unwrap()
            .with_config(config(FitScope::Midpoints))
            .unwrap()
            .call();
        assert!(success);
        let refined = refined.unwrap();
        for node in &refined.nodes[1..refined.len() - 1] {
            assert!((node.position.x - 20.0).abs() < 1.0, "x {}", node.position.x);
            assert!((node.position.y - 20.0).abs() < 1.0, "y {}", node.position.y);
        }
    }

    #[test]
    fn test_scope_selectivity() {
        let volume = tube_volume(40, 40, 30, 5.0, 200, 10);
        let path = axis_path(21.0, 20.0);

        let fitter = PathFitter::new(&volume, &path).unwrap();
        let midpoints = fitter.with_config(config(FitScope::Midpoints)).unwrap().fit().unwrap();
        for node in &midpoints.refined.nodes {
            assert_eq!(node.radius, path.nodes[node.source_index].radius);
        }

        let fitter = PathFitter::new(&volume, &path).unwrap();
        let radii = fitter.with_config(config(FitScope::Radii)).unwrap().fit().unwrap();
        for node in &radii.refined.nodes {
            assert_eq!(node.position, path.nodes[node.source_index].position);
        }
    }

    #[test]
    fn test_noisy_path_keeps_gap_invariant() {
        let volume = tube_volume(40, 40, 30, 5.0, 200, 10);
        let nodes = jittered_positions(Vector3::new(20.0, 20.0, 3.0), Vector3::new(0.0, 0.0, 1.0), 25, 0.5, 7)
            .into_iter()
            .map(|p| PathNode::new(p.x, p.y, p.z))
            .collect();
        let path = TracedPath::new(2, nodes, Vector3::new(1.0, 1.0, 1.0));
        let cfg = FitConfig {
            keep_cross_sections: true,
            ..config(FitScope::RadiiAndMidpoints)
        };
        let outcome = PathFitter::new(&volume, &path).unwrap().with_config(cfg).unwrap().fit().unwrap();

        assert_eq!(outcome.cross_sections.as_ref().map(|s| s.len()), Some(25));
        let kept: Vec<usize> = outcome.refined.nodes.iter().map(|n| n.source_index).collect();
        assert_eq!(kept.first(), Some(&0));
        assert_eq!(kept.last(), Some(&24));
        for pair in kept.windows(2) {
            assert!(pair[1] - pair[0] - 1 <= 2, "gap between {} and {}", pair[0], pair[1]);
        }
        for node in &outcome.refined.nodes {
            let off_axis = ((node.position.x - 20.0).powi(2) + (node.position.y - 20.0).powi(2)).sqrt();
            assert!(off_axis < 1.5, "node {} is {} off axis", node.source_index, off_axis);
            assert!(node.radius.unwrap() >= 1.0);
        }

        // nodes that survived the overlap pass are pairwise disjoint
        let accepted: Vec<Disk> = outcome
            .diagnostics
            .iter()
            .filter(|d| d.accepted)
            .map(|d| Disk {
                center: Vector3::from(d.center),
                normal: Vector3::from(d.tangent),
                radius: d.radius,
            })
            .collect();
        for (i, a) in accepted.iter().enumerate() {
            for b in &accepted[i + 1..] {
                assert!(!overlap::disks_overlap(a, b), "{:?} overlaps {:?}", a, b);
            }
        }
    }

    #[test]
    fn test_fitted_path_is_refused() {
        let volume = tube_volume(40, 40, 30, 5.0, 200, 10);
        let mut path = axis_path(20.0, 20.0);
        path.fitted_from = Some(0);
        assert!(matches!(PathFitter::new(&volume, &path), Err(FitError::InvalidPath(_))));
    }

    #[test]
    fn test_invalid_config_is_rejected_before_work() {
        let volume = tube_volume(20, 20, 10, 3.0, 200, 10);
        let path = axis_path(10.0, 10.0);
        let bad = FitConfig {
            max_radius: 0,
            ..FitConfig::default()
        };
        let result = PathFitter::new(&volume, &path).unwrap().with_config(bad);
        assert!(matches!(result, Err(FitError::InvalidConfig(_))));
    }

    #[test]
    fn test_cancelled_fit_yields_nothing() {
        let volume = tube_volume(20, 20, 10, 3.0, 200, 10);
        let path = axis_path(10.0, 10.0);
        let flag = Arc::new(AtomicBool::new(true));
        let fitter = PathFitter::new(&volume, &path).unwrap().with_cancel_flag(flag);
        assert!(matches!(fitter.fit(), Err(FitError::Cancelled)));
        assert_eq!(fitter.call(), (None, false));
    }
}
