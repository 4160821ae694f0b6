use anyhow::{bail, Context};
use image::DynamicImage;
use nalgebra::Vector3;
use std::path::{Path, PathBuf};

use crate::error::{FitError, Result};

/// Raw voxel buffer as delivered by the image source, x fastest, then y, then z.
#[derive(Debug, Clone, PartialEq)]
pub enum VoxelData {
    U8(Vec<u8>),
    U16(Vec<u16>),
    F32(Vec<f32>),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PixelKind {
    Gray8,
    Gray16,
    Gray32,
}

impl VoxelData {
    fn len(&self) -> usize {
        match self {
            VoxelData::U8(v) => v.len(),
            VoxelData::U16(v) => v.len(),
            VoxelData::F32(v) => v.len(),
        }
    }

    fn kind(&self) -> PixelKind {
        match self {
            VoxelData::U8(_) => PixelKind::Gray8,
            VoxelData::U16(_) => PixelKind::Gray16,
            VoxelData::F32(_) => PixelKind::Gray32,
        }
    }

    fn into_f32(self) -> Vec<f32> {
        match self {
            VoxelData::U8(v) => v.into_iter().map(f32::from).collect(),
            VoxelData::U16(v) => v.into_iter().map(f32::from).collect(),
            VoxelData::F32(v) => v,
        }
    }
}

/// Calibrated scalar volume. Whatever the source bit depth, voxels are held as
/// `f32` so sampling has a single code path.
#[derive(Debug, Clone)]
pub struct Volume {
    width: usize,
    height: usize,
    depth: usize,
    spacing: Vector3<f64>,
    source_kind: PixelKind,
    voxels: Vec<f32>,
}

impl Volume {
    pub fn new(
        width: usize,
        height: usize,
        depth: usize,
        spacing: Vector3<f64>,
        data: VoxelData,
    ) -> Result<Self> {
        if width == 0 || height == 0 || depth == 0 {
            return Err(FitError::InvalidVolume(format!(
                "dimensions must be non-zero, got {}x{}x{}",
                width, height, depth
            )));
        }
        let expected = width * height * depth;
        if data.len() != expected {
            return Err(FitError::InvalidVolume(format!(
                "expected {} voxels for {}x{}x{}, got {}",
                expected,
                width,
                height,
                depth,
                data.len()
            )));
        }
        if spacing.iter().any(|s| !s.is_finite() || *s <= 0.0) {
            return Err(FitError::InvalidVolume(format!(
                "spacing must be finite and positive, got {:?}",
                spacing
            )));
        }

        Ok(Self {
            width,
            height,
            depth,
            spacing,
            source_kind: data.kind(),
            voxels: data.into_f32(),
        })
    }

    /// Builds a volume from 2D grayscale slices, one file per z plane in the
    /// order given.
    pub fn from_slice_files<P: AsRef<Path>>(
        slices: &[P],
        spacing: Vector3<f64>,
    ) -> anyhow::Result<Self> {
        if slices.is_empty() {
            bail!("no slice images given");
        }

        let mut planes = Vec::with_capacity(slices.len());
        for slice in slices {
            let slice = slice.as_ref();
            let img = image::open(slice)
                .with_context(|| format!("Failed to read slice {}", slice.display()))?;
            planes.push(img);
        }

        let width = planes[0].width() as usize;
        let height = planes[0].height() as usize;
        for (z, plane) in planes.iter().enumerate() {
            if plane.width() as usize != width || plane.height() as usize != height {
                bail!(
                    "slice {} is {}x{}, expected {}x{}",
                    z,
                    plane.width(),
                    plane.height(),
                    width,
                    height
                );
            }
        }

        let data = match &planes[0] {
            DynamicImage::ImageLuma8(_) => VoxelData::U8(
                planes
                    .into_iter()
                    .flat_map(|p| p.into_luma8().into_raw())
                    .collect(),
            ),
            DynamicImage::ImageLuma16(_) => VoxelData::U16(
                planes
                    .into_iter()
                    .flat_map(|p| p.into_luma16().into_raw())
                    .collect(),
            ),
            _ => VoxelData::F32(
                planes
                    .into_iter()
                    .flat_map(|p| p.to_luma32f().into_raw())
                    .collect(),
            ),
        };

        let depth = slices.len();
        Ok(Volume::new(width, height, depth, spacing, data)?)
    }

    /// Loads every `.png`/`.tif`/`.tiff` file of a directory as one z plane,
    /// sorted by file name.
    pub fn from_slice_dir<P: AsRef<Path>>(dir: P, spacing: Vector3<f64>) -> anyhow::Result<Self> {
        let dir = dir.as_ref();
        let mut files: Vec<PathBuf> = std::fs::read_dir(dir)
            .with_context(|| format!("Failed to list slice directory {}", dir.display()))?
            .filter_map(|entry| entry.ok().map(|e| e.path()))
            .filter(|p| {
                p.extension()
                    .and_then(|e| e.to_str())
                    .map(|e| matches!(e.to_lowercase().as_str(), "png" | "tif" | "tiff"))
                    .unwrap_or(false)
            })
            .collect();
        files.sort();

        if files.is_empty() {
            bail!("slice directory {} contains no images", dir.display());
        }
        log::info!("Loading {} slices from {}", files.len(), dir.display());

        Self::from_slice_files(&files, spacing)
    }

    pub fn width(&self) -> usize {
        self.width
    }

    pub fn height(&self) -> usize {
        self.height
    }

    pub fn depth(&self) -> usize {
        self.depth
    }

    pub fn spacing(&self) -> &Vector3<f64> {
        &self.spacing
    }

    pub fn source_kind(&self) -> PixelKind {
        self.source_kind
    }

    /// Voxel value at integer indices, `None` outside the volume.
    #[inline]
    pub fn voxel(&self, x: i64, y: i64, z: i64) -> Option<f32> {
        if x < 0 || y < 0 || z < 0 {
            return None;
        }
        let (x, y, z) = (x as usize, y as usize, z as usize);
        if x >= self.width || y >= self.height || z >= self.depth {
            return None;
        }
        Some(self.voxels[(z * self.height + y) * self.width + x])
    }
}
