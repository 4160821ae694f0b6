pub mod input;
pub mod output;
pub mod volume;

pub use input::{PathNode, TracedPath};
pub use output::{RefinedNode, RefinedPath};
pub use volume::{PixelKind, Volume, VoxelData};
