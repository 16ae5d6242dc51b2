//! Distributed adaptive Cartesian grid index.
//!
//! The global cell index space of an [`AdaptiveGrid`](grid::AdaptiveGrid) is
//! spread over the processing elements (PEs) of a run through
//! [`DistributedArray`](distributed::DistributedArray)s. Every cell carries a
//! packed [`CellState`](cell_state::CellState) word, optional cell and
//! surface data, and a place in the refinement hierarchy.

pub mod cell_state;
pub mod config;
pub mod distributed;
pub mod errors;
pub mod grid;
pub mod interpolation_cache;
pub mod serialization;
pub mod utilities;
