//! Refines traced centerlines against a 3D image by fitting a circle to the
//! cross-section at every node.
//!
//! ```no_run
//! use nalgebra::Vector3;
//! use pathfitrs::{FitConfig, PathFitter, TracedPath, Volume};
//!
//! # fn main() -> anyhow::Result<()> {
//! let spacing = Vector3::new(0.3, 0.3, 1.0);
//! let volume = Volume::from_slice_dir("stack/", spacing)?;
//! let path = TracedPath::read_csv("trace.csv", 1, spacing)?;
//! let outcome = PathFitter::new(&volume, &path)?
//!     .with_config(FitConfig::default())?
//!     .fit()?;
//! println!("{} nodes kept", outcome.refined.len());
//! # Ok(())
//! # }
//! ```

pub mod entry;
pub mod error;
pub mod fitting;
pub mod io;
mod utils;

#[cfg(feature = "python")]
mod python_bind;

pub use entry::{fit_paths_concurrently, run_fit_files};
pub use error::{FitError, OptimizerError};
pub use fitting::config::{FitConfig, FitScope};
pub use fitting::progress::{MultiTaskProgress, ProgressSink};
pub use fitting::{FitOutcome, NodeDiagnostics, PathFitter};
pub use io::{PathNode, RefinedNode, RefinedPath, TracedPath, Volume, VoxelData};
