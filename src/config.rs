use serde::{Deserialize, Serialize};

use crate::errors::HCError;

/// Which topology a grid is built with. Selected once, at construction.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum GridKind
{
    /// Uniform base grid, cells can never be subdivided.
    Cartesian,
    /// Base grid whose cells may be refined into 2^D children.
    #[default]
    Hierarchical,
}

///
/// Run-time switches for a grid. Dimensionality is checked against the
/// const generic of the grid it is used to build.
///
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct GridConfig
{
    pub dimension: usize,
    pub kind: GridKind,
    /// Interior cells per axis, ghost layer not included.
    pub base_cells: Vec<usize>,
    /// Base grid spacing.
    pub dx: f64,
    /// Lower corner of the interior box.
    pub xmin: Vec<f64>,
    /// Number of cell data items.
    pub ncd: usize,
    /// Number of surface data items per face.
    pub nsd: usize,
    /// Cell capacity of a hierarchical grid.
    pub max_cells: usize,
    /// Consecutive cells kept on one PE before the distribution rotates.
    pub chunksize: usize,
    /// Sub-cell bits used when quantizing interpolation cache keys.
    pub cache_nbits: u32,
    pub cache_interpolations: bool,
}

impl Default for GridConfig
{
    fn default() -> Self {
        Self {
            dimension: 2,
            kind: GridKind::Hierarchical,
            base_cells: vec![8, 8],
            dx: 0.125,
            xmin: vec![0.0, 0.0],
            ncd: 1,
            nsd: 0,
            max_cells: 4096,
            chunksize: 1,
            cache_nbits: 10,
            cache_interpolations: false,
        }
    }
}

impl GridConfig
{
    /// A regular grid of `n` cells per axis covering the unit box.
    pub fn unit_box(dimension: usize, n: usize) -> Self
    {
        Self {
            dimension,
            base_cells: vec![n; dimension],
            dx: 1.0 / n as f64,
            xmin: vec![0.0; dimension],
            ..Default::default()
        }
    }

    pub fn validate(&self) -> Result<(), HCError>
    {
        if !(1..=3).contains(&self.dimension)
        {
            log::error!("invalid dimensionality {}", self.dimension);
            return Err(HCError::InvalidDimension);
        }
        if self.base_cells.len() != self.dimension || self.xmin.len() != self.dimension
        {
            return Err(HCError::InvalidConfig);
        }
        if self.base_cells.contains(&0) || self.ncd == 0 || self.chunksize == 0
        {
            return Err(HCError::InvalidConfig);
        }
        if !(self.dx > 0.0) || self.cache_nbits > 20
        {
            return Err(HCError::InvalidConfig);
        }
        Ok(())
    }

    #[inline]
    pub fn base_cell_count(&self) -> usize
    {
        self.base_cells.iter().map(|n| n + 2 * crate::grid::NB).product()
    }
}
