use std::ops::Range;

use crate::config::{GridConfig, GridKind};
use crate::distributed::PeContext;
use crate::errors::HCError;
use crate::grid::adaptive_grid::AdaptiveGrid;
use crate::grid::snapshot::peek_dimension;
use crate::grid::{CellIndex, Traversal};
use crate::serialization::SerializationFormat;

///
/// A grid whose dimensionality is only known at run time, e.g. from a
/// configuration file or a snapshot. Each variant is a fully monomorphized
/// grid; the dispatch happens once per call.
///
pub enum AnyGrid
{
    D1(AdaptiveGrid<1>),
    D2(AdaptiveGrid<2>),
    D3(AdaptiveGrid<3>),
}

macro_rules! with_grid {
    ($self:expr, $g:ident => $e:expr) => {
        match $self
        {
            AnyGrid::D1($g) => $e,
            AnyGrid::D2($g) => $e,
            AnyGrid::D3($g) => $e,
        }
    };
}

fn point<const D: usize>(x: &[f64]) -> Result<[f64; D], HCError>
{
    x.try_into().map_err(|_| HCError::InvalidDimension)
}

impl AnyGrid
{
    pub fn new(ctx: &PeContext, config: &GridConfig) -> Result<Self, HCError>
    {
        match config.dimension
        {
            1 => Ok(AnyGrid::D1(AdaptiveGrid::new(ctx, config)?)),
            2 => Ok(AnyGrid::D2(AdaptiveGrid::new(ctx, config)?)),
            3 => Ok(AnyGrid::D3(AdaptiveGrid::new(ctx, config)?)),
            d =>
            {
                log::error!("invalid dimensionality {d}");
                Err(HCError::InvalidDimension)
            }
        }
    }

    /// Load a snapshot of any dimensionality. Collective.
    pub fn load<R: std::io::Read>(
        ctx: &PeContext,
        mut reader: R,
        format: SerializationFormat,
        runtime: &GridConfig) -> Result<Self, HCError>
    {
        let mut bytes = Vec::new();
        reader.read_to_end(&mut bytes).map_err(|_| HCError::ReadBufferFailed)?;
        match peek_dimension(&bytes, format)?
        {
            1 => Ok(AnyGrid::D1(AdaptiveGrid::load(ctx, bytes.as_slice(), format, runtime)?)),
            2 => Ok(AnyGrid::D2(AdaptiveGrid::load(ctx, bytes.as_slice(), format, runtime)?)),
            3 => Ok(AnyGrid::D3(AdaptiveGrid::load(ctx, bytes.as_slice(), format, runtime)?)),
            _ => Err(HCError::InvalidDimension),
        }
    }

    pub fn dimension(&self) -> usize
    {
        with_grid!(self, g => g.dimension())
    }

    pub fn kind(&self) -> GridKind
    {
        with_grid!(self, g => g.kind())
    }

    pub fn ncells(&self) -> usize
    {
        with_grid!(self, g => g.ncells())
    }

    pub fn count(&self, tr: Traversal) -> usize
    {
        with_grid!(self, g => g.cells(tr).count())
    }

    pub fn subdivide(&mut self, i: CellIndex) -> Result<Range<CellIndex>, HCError>
    {
        with_grid!(self, g => g.subdivide(i))
    }

    pub fn mature_cells(&self, bottom: CellIndex, top: CellIndex) -> bool
    {
        with_grid!(self, g => g.mature_cells(bottom, top))
    }

    pub fn centroid(&self, i: CellIndex) -> Vec<f64>
    {
        with_grid!(self, g => g.centroid(i).to_vec())
    }

    pub fn find(&self, x: &[f64]) -> Result<Option<CellIndex>, HCError>
    {
        with_grid!(self, g => Ok(g.find(&point(x)?)))
    }

    pub fn intpol(&mut self, x: &[f64], order: u32) -> Result<Vec<f64>, HCError>
    {
        with_grid!(self, g => g.intpol(&point(x)?, order))
    }

    pub fn get_cell(&self, i: CellIndex) -> Result<Vec<f64>, HCError>
    {
        with_grid!(self, g => g.get_cell(i))
    }

    pub fn put_cell(&self, i: CellIndex, values: &[f64]) -> Result<(), HCError>
    {
        with_grid!(self, g => g.put_cell(i, values))
    }

    pub fn apply_bcs(&self, t: f64) -> Result<usize, HCError>
    {
        with_grid!(self, g => g.apply_bcs(t))
    }

    pub fn pe_coherency(&self)
    {
        with_grid!(self, g => g.pe_coherency())
    }

    pub fn save<W: std::io::Write>(&self, writer: W, format: SerializationFormat) -> Result<(), HCError>
    {
        with_grid!(self, g => g.save(writer, format))
    }

    pub fn write_meminfo(&self) -> String
    {
        with_grid!(self, g => g.write_meminfo())
    }
}

#[cfg(test)]
mod tests
{
    use super::*;

    #[test]
    fn dispatch_on_runtime_dimension()
    {
        let ctx = PeContext::single();
        for dim in 1..=3
        {
            let grid = AnyGrid::new(&ctx, &GridConfig::unit_box(dim, 2)).unwrap();
            assert_eq!(grid.dimension(), dim);
            assert_eq!(grid.ncells(), 4_usize.pow(dim as u32));
            assert_eq!(grid.count(Traversal::LeafOnly), 2_usize.pow(dim as u32));
        }
        let bad = GridConfig { dimension: 4, ..GridConfig::unit_box(3, 2) };
        assert_eq!(AnyGrid::new(&ctx, &bad).err(), Some(HCError::InvalidDimension));
    }

    #[test]
    fn points_must_match_dimension()
    {
        let mut grid = AnyGrid::new(&PeContext::single(), &GridConfig::unit_box(3, 2)).unwrap();
        assert!(grid.find(&[0.2, 0.2, 0.2]).unwrap().is_some());
        assert_eq!(grid.find(&[0.2, 0.2]), Err(HCError::InvalidDimension));
        assert_eq!(grid.intpol(&[0.7, 0.2, 0.9], 0).unwrap(), vec![0.0]);
    }

    #[test]
    fn load_picks_variant_from_snapshot()
    {
        let ctx = PeContext::single();
        let config = GridConfig::unit_box(1, 8);
        let mut grid = AnyGrid::new(&ctx, &config).unwrap();
        grid.subdivide(3).unwrap();
        let mut bytes = Vec::new();
        grid.save(&mut bytes, SerializationFormat::BincodeLz4).unwrap();
        let loaded = AnyGrid::load(&ctx, bytes.as_slice(), SerializationFormat::BincodeLz4, &config).unwrap();
        assert_eq!(loaded.dimension(), 1);
        assert_eq!(loaded.ncells(), 12);
        assert_eq!(loaded.centroid(11), grid.centroid(11));
    }
}
