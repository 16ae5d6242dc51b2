pub mod adaptive_grid;
pub mod any_grid;
pub mod boundary;
pub mod cartesian;
pub mod geometry;
pub mod hierarchical;
pub mod hierarchy;
pub mod interpolation;
pub mod snapshot;
pub mod topology;
pub mod traversal;

pub use adaptive_grid::AdaptiveGrid;
pub use any_grid::AnyGrid;
pub use traversal::{CellIter, Traversal, VECLEN};

/// Global cell index.
pub type CellIndex = usize;

/// Reserved index meaning "no cell". Never a valid address.
pub const NO_CELL: CellIndex = CellIndex::MAX;

/// Width of the ghost layer surrounding the base grid.
pub const NB: usize = 1;
