use anyhow::{bail, Context};
use csv::WriterBuilder;
use image::{GrayImage, Luma};
use nalgebra::Vector3;
use serde::Serialize;
use std::fs::File;
use std::io::BufWriter;
use std::path::Path;

use crate::fitting::cross_section::CrossSection;
use crate::fitting::NodeDiagnostics;
use crate::io::input::{PathNode, TracedPath};

/// Node of a fitted path. `source_index` points back into the traced path.
#[derive(Debug, Clone, PartialEq)]
pub struct RefinedNode {
    pub source_index: usize,
    pub position: Vector3<f64>,
    pub radius: Option<f64>,
    pub tangent: Option<Vector3<f64>>,
}

/// Fitted version of a traced path; owns its nodes independently of the source.
#[derive(Debug, Clone, PartialEq)]
pub struct RefinedPath {
    pub name: String,
    pub source_id: u32,
    pub nodes: Vec<RefinedNode>,
    pub spacing: Vector3<f64>,
    pub channel: u32,
    pub frame: u32,
}

impl RefinedPath {
    pub fn for_source(source: &TracedPath, nodes: Vec<RefinedNode>) -> Self {
        Self {
            name: format!("Fitted Path [{}]", source.id),
            source_id: source.id,
            nodes,
            spacing: source.spacing,
            channel: source.channel,
            frame: source.frame,
        }
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn has_radii(&self) -> bool {
        !self.nodes.is_empty() && self.nodes.iter().all(|n| n.radius.is_some())
    }

    /// Turns the fitted path into a traced path tagged as fitted, so it is
    /// refused if handed back to the fitter.
    pub fn into_traced(self, id: u32) -> TracedPath {
        let nodes = self
            .nodes
            .into_iter()
            .map(|n| PathNode {
                position: n.position,
                radius: n.radius,
                tangent: n.tangent,
            })
            .collect();
        TracedPath {
            id,
            name: self.name,
            nodes,
            spacing: self.spacing,
            channel: self.channel,
            frame: self.frame,
            fitted_from: Some(self.source_id),
        }
    }
}

#[derive(Serialize)]
struct NodeRow {
    source_index: usize,
    x: f64,
    y: f64,
    z: f64,
    radius: Option<f64>,
    tx: Option<f64>,
    ty: Option<f64>,
    tz: Option<f64>,
}

/// Writes the fitted nodes as CSV; columns match what
/// [`TracedPath::read_csv`] reads back.
pub fn write_refined_csv<P: AsRef<Path>>(path: &RefinedPath, filename: P) -> anyhow::Result<()> {
    let filename = filename.as_ref();
    let mut wtr = WriterBuilder::new()
        .has_headers(true)
        .from_path(filename)
        .with_context(|| format!("Failed to create {}", filename.display()))?;

    for node in &path.nodes {
        wtr.serialize(NodeRow {
            source_index: node.source_index,
            x: node.position.x,
            y: node.position.y,
            z: node.position.z,
            radius: node.radius,
            tx: node.tangent.map(|t| t.x),
            ty: node.tangent.map(|t| t.y),
            tz: node.tangent.map(|t| t.z),
        })?;
    }
    wtr.flush()?;
    Ok(())
}

pub fn write_diagnostics_json<P: AsRef<Path>>(
    diagnostics: &[NodeDiagnostics],
    filename: P,
) -> anyhow::Result<()> {
    let filename = filename.as_ref();
    let file = File::create(filename)
        .with_context(|| format!("Failed to create {}", filename.display()))?;
    serde_json::to_writer_pretty(BufWriter::new(file), diagnostics)
        .with_context(|| format!("Failed to write diagnostics to {}", filename.display()))?;
    Ok(())
}

/// Stretches a cross-section to the full 8-bit range.
pub fn cross_section_image(section: &CrossSection) -> GrayImage {
    let (lo, hi) = section.min_max();
    let range = hi - lo;
    let side = section.side as u32;
    GrayImage::from_fn(side, side, |x, y| {
        let v = section.values[(y * side + x) as usize];
        let scaled = if range > 0.0 { (v - lo) / range * 255.0 } else { 0.0 };
        Luma([scaled.round().clamp(0.0, 255.0) as u8])
    })
}

/// Saves one PNG per cross-section as `<prefix>_<index>.png` inside `dir`.
pub fn write_cross_sections<P: AsRef<Path>>(
    sections: &[CrossSection],
    dir: P,
    prefix: &str,
) -> anyhow::Result<()> {
    let dir = dir.as_ref();
    if sections.is_empty() {
        bail!("No cross-sections to write");
    }
    std::fs::create_dir_all(dir)
        .with_context(|| format!("Failed to create directory {}", dir.display()))?;

    let width = sections.len().to_string().len();
    for (i, section) in sections.iter().enumerate() {
        let file = dir.join(format!("{}_{:0width$}.png", prefix, i, width = width));
        cross_section_image(section)
            .save(&file)
            .with_context(|| format!("Failed to save {}", file.display()))?;
    }
    Ok(())
}

#[cfg(test)]
mod output_tests {
    use super::*;
    use approx::assert_relative_eq;

    fn sample_source() -> TracedPath {
        let mut path = TracedPath::new(
            7,
            vec![PathNode::new(0.0, 0.0, 0.0), PathNode::new(0.0, 0.0, 1.0)],
            Vector3::new(0.5, 0.5, 1.0),
        );
        path.channel = 2;
        path.frame = 3;
        path
    }

    fn sample_refined() -> RefinedPath {
        let nodes = vec![
            RefinedNode {
                source_index: 0,
                position: Vector3::new(1.0, 2.0, 3.0),
                radius: Some(1.5),
                tangent: Some(Vector3::new(0.0, 0.0, 1.0)),
            },
            RefinedNode {
                source_index: 2,
                position: Vector3::new(1.5, 2.5, 4.0),
                radius: Some(2.0),
                tangent: Some(Vector3::new(0.0, 0.0, 1.0)),
            },
        ];
        RefinedPath::for_source(&sample_source(), nodes)
    }

    #[test]
    fn test_refined_path_copies_source_tags() {
        let refined = sample_refined();
        assert_eq!(refined.name, "Fitted Path [7]");
        assert_eq!(refined.source_id, 7);
        assert_eq!((refined.channel, refined.frame), (2, 3));
        assert!(refined.has_radii());

        let traced = refined.into_traced(8);
        assert_eq!(traced.fitted_from, Some(7));
        assert!(traced.check_fittable().is_err());
    }

    #[test]
    fn test_csv_reads_back() {
        let refined = sample_refined();
        let file = std::env::temp_dir().join("pathfitrs_refined_test.csv");
        write_refined_csv(&refined, &file).unwrap();

        let back = TracedPath::read_csv(&file, 1, refined.spacing).unwrap();
        assert_eq!(back.len(), 2);
        assert_relative_eq!(back.nodes[1].position, Vector3::new(1.5, 2.5, 4.0));
        assert_eq!(back.nodes[0].radius, Some(1.5));
        assert_eq!(back.nodes[1].tangent, Some(Vector3::new(0.0, 0.0, 1.0)));
        std::fs::remove_file(&file).ok();
    }

    #[test]
    fn test_cross_section_image_is_normalized() {
        let section = CrossSection {
            side: 2,
            values: vec![10.0, 20.0, 30.0, 50.0],
            origin: Vector3::zeros(),
            basis_x: Vector3::x(),
            basis_y: Vector3::y(),
        };
        let img = cross_section_image(&section);
        assert_eq!(img.get_pixel(0, 0)[0], 0);
        assert_eq!(img.get_pixel(1, 1)[0], 255);
        assert_eq!(img.get_pixel(1, 0)[0], 64);

        let dir = std::env::temp_dir().join("pathfitrs_sections_test");
        write_cross_sections(&[section.clone(), section], &dir, "node").unwrap();
        assert!(dir.join("node_0.png").exists());
        assert!(dir.join("node_1.png").exists());
        std::fs::remove_dir_all(&dir).ok();
    }
}
