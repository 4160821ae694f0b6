use nalgebra::Vector3;
use pyo3::exceptions::{PyRuntimeError, PyValueError};
use pyo3::prelude::*;

use crate::entry::run_fit_files;
use crate::fitting::config::{FitConfig, FitScope};
use crate::fitting::PathFitter;
use crate::io::input::{PathNode, TracedPath};
use crate::io::output::{RefinedNode, RefinedPath};
use crate::io::volume::{Volume, VoxelData};

#[pyclass]
#[derive(Debug, Clone)]
pub struct PyRefinedNode {
    #[pyo3(get, set)]
    pub source_index: usize,
    #[pyo3(get, set)]
    pub x: f64,
    #[pyo3(get, set)]
    pub y: f64,
    #[pyo3(get, set)]
    pub z: f64,
    #[pyo3(get, set)]
    pub radius: Option<f64>,
    #[pyo3(get, set)]
    pub tangent: Option<(f64, f64, f64)>,
}

#[pymethods]
impl PyRefinedNode {
    fn __repr__(&self) -> String {
        format!(
            "RefinedNode(i={}, x={:.2}, y={:.2}, z={:.2}, r={:?})",
            self.source_index, self.x, self.y, self.z, self.radius
        )
    }
}

impl From<&RefinedNode> for PyRefinedNode {
    fn from(node: &RefinedNode) -> Self {
        Self {
            source_index: node.source_index,
            x: node.position.x,
            y: node.position.y,
            z: node.position.z,
            radius: node.radius,
            tangent: node.tangent.map(|t| (t.x, t.y, t.z)),
        }
    }
}

#[pyclass]
#[derive(Debug, Clone)]
pub struct PyRefinedPath {
    #[pyo3(get)]
    pub name: String,
    #[pyo3(get)]
    pub source_id: u32,
    #[pyo3(get)]
    pub nodes: Vec<PyRefinedNode>,
    #[pyo3(get)]
    pub channel: u32,
    #[pyo3(get)]
    pub frame: u32,
}

#[pymethods]
impl PyRefinedPath {
    fn __repr__(&self) -> String {
        format!("RefinedPath(name={:?}, nodes={})", self.name, self.nodes.len())
    }

    fn __len__(&self) -> usize {
        self.nodes.len()
    }
}

impl From<RefinedPath> for PyRefinedPath {
    fn from(path: RefinedPath) -> Self {
        Self {
            nodes: path.nodes.iter().map(PyRefinedNode::from).collect(),
            name: path.name,
            source_id: path.source_id,
            channel: path.channel,
            frame: path.frame,
        }
    }
}

fn build_config(max_radius: usize, scope: &str, keep_cross_sections: bool) -> PyResult<FitConfig> {
    let scope: FitScope = scope
        .parse()
        .map_err(|e: crate::error::FitError| PyValueError::new_err(e.to_string()))?;
    let config = FitConfig {
        max_radius,
        scope,
        keep_cross_sections,
        ..FitConfig::default()
    };
    config
        .validate()
        .map_err(|e| PyValueError::new_err(e.to_string()))?;
    Ok(config)
}

/// Fits a traced path stored as CSV against a directory of image slices and
/// writes the results to `output_dir`.
#[pyfunction]
#[pyo3(signature = (
    slice_dir,
    path_csv,
    output_dir,
    spacing = (1.0, 1.0, 1.0),
    max_radius = 40usize,
    scope = "radii_and_midpoints",
    keep_cross_sections = false
))]
fn fit_path_files(
    slice_dir: &str,
    path_csv: &str,
    output_dir: &str,
    spacing: (f64, f64, f64),
    max_radius: usize,
    scope: &str,
    keep_cross_sections: bool,
) -> PyResult<PyRefinedPath> {
    let config = build_config(max_radius, scope, keep_cross_sections)?;
    let refined = run_fit_files(slice_dir, spacing, path_csv, output_dir, &config)
        .map_err(|e| PyRuntimeError::new_err(format!("{:#}", e)))?;
    Ok(refined.into())
}

/// Fits in-memory points against a flat `float32` volume in z, y, x order.
#[pyfunction]
#[pyo3(signature = (
    voxels,
    shape,
    points,
    spacing = (1.0, 1.0, 1.0),
    max_radius = 40usize,
    scope = "radii_and_midpoints"
))]
fn fit_points(
    voxels: Vec<f32>,
    shape: (usize, usize, usize),
    points: Vec<(f64, f64, f64)>,
    spacing: (f64, f64, f64),
    max_radius: usize,
    scope: &str,
) -> PyResult<Option<PyRefinedPath>> {
    let config = build_config(max_radius, scope, false)?;
    let spacing = Vector3::new(spacing.0, spacing.1, spacing.2);
    let (depth, height, width) = shape;
    let volume = Volume::new(width, height, depth, spacing, VoxelData::F32(voxels))
        .map_err(|e| PyValueError::new_err(e.to_string()))?;

    let nodes = points
        .into_iter()
        .map(|(x, y, z)| PathNode::new(x, y, z))
        .collect();
    let path = TracedPath::new(0, nodes, spacing);

    let fitter = PathFitter::new(&volume, &path)
        .and_then(|f| f.with_config(config))
        .map_err(|e| PyValueError::new_err(e.to_string()))?;
    let (refined, _success) = fitter.call();
    Ok(refined.map(PyRefinedPath::from))
}

/// ```python
/// import pathfitrs
/// fitted = pathfitrs.fit_path_files("stack/", "trace.csv", "out/", spacing=(0.3, 0.3, 1.0))
/// ```
#[pymodule]
fn pathfitrs(m: &Bound<'_, PyModule>) -> PyResult<()> {
    m.add("__version__", env!("CARGO_PKG_VERSION"))?;
    m.add_function(wrap_pyfunction!(fit_path_files, m)?)?;
    m.add_function(wrap_pyfunction!(fit_points, m)?)?;
    m.add_class::<PyRefinedNode>()?;
    m.add_class::<PyRefinedPath>()?;
    Ok(())
}
