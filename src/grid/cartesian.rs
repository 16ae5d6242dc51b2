use crate::config::GridKind;
use crate::errors::HCError;
use crate::grid::geometry::BaseGeometry;
use crate::grid::topology::GridTopology;
use crate::grid::CellIndex;

/// Base grid only: every cell is a level-0 leaf and neighbours come from index arithmetic.
pub struct CartesianTopology<const D: usize>
{
    geometry: BaseGeometry<D>,
}

impl<const D: usize> CartesianTopology<D>
{
    pub fn new(geometry: BaseGeometry<D>) -> Self
    {
        Self { geometry }
    }
}

impl<const D: usize> GridTopology<D> for CartesianTopology<D>
{
    fn kind(&self) -> GridKind
    {
        GridKind::Cartesian
    }

    fn can_subdivide(&self) -> bool
    {
        false
    }

    #[inline]
    fn ncells(&self) -> usize
    {
        self.geometry.ntot()
    }

    fn capacity(&self) -> usize
    {
        self.geometry.ntot()
    }

    #[inline]
    fn level(&self, _i: CellIndex) -> u8
    {
        0
    }

    #[inline]
    fn parent(&self, _i: CellIndex) -> Option<CellIndex>
    {
        None
    }

    #[inline]
    fn first_child(&self, _i: CellIndex) -> Option<CellIndex>
    {
        None
    }

    #[inline]
    fn neighbour(&self, i: CellIndex, d: usize, dir: usize) -> Option<CellIndex>
    {
        self.geometry.base_neighbour(i, d, dir)
    }

    fn allocate_children(&self, _count: usize) -> Result<CellIndex, HCError>
    {
        Err(HCError::NotSubdividable)
    }

    fn init_cell(&self, _i: CellIndex, _parent: Option<CellIndex>, _level: u8) {}

    fn link_children(&self, _parent: CellIndex, _first_child: Option<CellIndex>) {}

    fn set_ncells(&self, ncells: usize) -> Result<(), HCError>
    {
        if ncells == self.geometry.ntot()
        {
            Ok(())
        }
        else
        {
            Err(HCError::SnapshotMismatch)
        }
    }

    fn set_geometry(&mut self, geometry: BaseGeometry<D>)
    {
        debug_assert_eq!(geometry.ntot(), self.geometry.ntot());
        self.geometry = geometry;
    }
}
