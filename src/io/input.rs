use anyhow::{bail, Context};
use csv::ReaderBuilder;
use nalgebra::Vector3;
use serde::Deserialize;
use std::path::Path;

use crate::error::{FitError, Result};

/// One traced node in world (physical) coordinates.
#[derive(Debug, Clone, PartialEq)]
pub struct PathNode {
    pub position: Vector3<f64>,
    pub radius: Option<f64>,
    pub tangent: Option<Vector3<f64>>,
}

impl PathNode {
    pub fn new(x: f64, y: f64, z: f64) -> Self {
        Self {
            position: Vector3::new(x, y, z),
            radius: None,
            tangent: None,
        }
    }

    pub fn with_radius(mut self, radius: f64) -> Self {
        self.radius = Some(radius);
        self
    }
}

/// A traced centerline as handed over by the tracer. Read-only while fitting.
#[derive(Debug, Clone, PartialEq)]
pub struct TracedPath {
    pub id: u32,
    pub name: String,
    pub nodes: Vec<PathNode>,
    pub spacing: Vector3<f64>,
    pub channel: u32,
    pub frame: u32,
    /// Set when this path is itself the fitted version of path `id`.
    pub fitted_from: Option<u32>,
}

impl TracedPath {
    pub fn new(id: u32, nodes: Vec<PathNode>, spacing: Vector3<f64>) -> Self {
        Self {
            id,
            name: format!("Path [{}]", id),
            nodes,
            spacing,
            channel: 1,
            frame: 1,
            fitted_from: None,
        }
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn positions(&self) -> Vec<Vector3<f64>> {
        self.nodes.iter().map(|n| n.position).collect()
    }

    pub fn has_radii(&self) -> bool {
        !self.nodes.is_empty() && self.nodes.iter().all(|n| n.radius.is_some())
    }

    /// Smallest absolute calibration step; used as the in-plane sampling step.
    pub fn minimum_separation(&self) -> f64 {
        self.spacing
            .x
            .abs()
            .min(self.spacing.y.abs())
            .min(self.spacing.z.abs())
    }

    /// Nearest voxel indices of node `i`.
    pub fn voxel_index(&self, i: usize) -> [i64; 3] {
        let p = &self.nodes[i].position;
        [
            (p.x / self.spacing.x).round() as i64,
            (p.y / self.spacing.y).round() as i64,
            (p.z / self.spacing.z).round() as i64,
        ]
    }

    pub fn check_fittable(&self) -> Result<()> {
        if self.nodes.is_empty() {
            return Err(FitError::InvalidPath(format!("path {} has no nodes", self.id)));
        }
        if let Some(parent) = self.fitted_from {
            return Err(FitError::InvalidPath(format!(
                "path {} is already the fitted version of path {}",
                self.id, parent
            )));
        }
        if self.spacing.iter().any(|s| !s.is_finite() || *s <= 0.0) {
            return Err(FitError::InvalidPath(format!(
                "path {} has invalid spacing {:?}",
                self.id, self.spacing
            )));
        }
        if let Some(i) = self
            .nodes
            .iter()
            .position(|n| n.position.iter().any(|c| !c.is_finite()))
        {
            return Err(FitError::InvalidPath(format!(
                "node {} of path {} has a non-finite position",
                i, self.id
            )));
        }
        Ok(())
    }

    /// Reads nodes from a CSV with header `x,y,z` and optional `radius`,
    /// `tx`, `ty`, `tz` columns.
    pub fn read_csv<P: AsRef<Path>>(
        path: P,
        id: u32,
        spacing: Vector3<f64>,
    ) -> anyhow::Result<TracedPath> {
        let path = path.as_ref();
        let mut rdr = ReaderBuilder::new()
            .has_headers(true)
            .trim(csv::Trim::All)
            .from_path(path)
            .with_context(|| format!("Failed to open path file {}", path.display()))?;

        let mut nodes = Vec::new();
        for (row, result) in rdr.deserialize::<NodeRecord>().enumerate() {
            let record =
                result.with_context(|| format!("Failed to parse row {} of {}", row + 1, path.display()))?;
            nodes.push(record.into_node());
        }

        if nodes.is_empty() {
            bail!("Path file {} contains no nodes", path.display());
        }
        log::info!("Loaded {} nodes from {}", nodes.len(), path.display());

        let mut traced = TracedPath::new(id, nodes, spacing);
        if let Some(stem) = path.file_stem().and_then(|s| s.to_str()) {
            traced.name = stem.to_string();
        }
        Ok(traced)
    }
}

#[derive(Debug, Deserialize)]
struct NodeRecord {
    x: f64,
    y: f64,
    z: f64,
    #[serde(default)]
    radius: Option<f64>,
    #[serde(default)]
    tx: Option<f64>,
    #[serde(default)]
    ty: Option<f64>,
    #[serde(default)]
    tz: Option<f64>,
}

impl NodeRecord {
    fn into_node(self) -> PathNode {
        let tangent = match (self.tx, self.ty, self.tz) {
            (Some(x), Some(y), Some(z)) => Some(Vector3::new(x, y, z)),
            _ => None,
        };
        PathNode {
            position: Vector3::new(self.x, self.y, self.z),
            radius: self.radius,
            tangent,
        }
    }
}
