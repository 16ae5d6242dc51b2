use crate::config::GridKind;
use crate::errors::HCError;
use crate::grid::cartesian::CartesianTopology;
use crate::grid::geometry::BaseGeometry;
use crate::grid::hierarchical::HierarchicalTopology;
use crate::grid::CellIndex;

///
/// Structural queries every grid variant answers. Cell state and data are
/// kept by the grid itself; a topology only knows how cells relate.
///
pub trait GridTopology<const D: usize>
{
    fn kind(&self) -> GridKind;
    fn can_subdivide(&self) -> bool;
    /// Number of cell indices in use, removed cells included.
    fn ncells(&self) -> usize;
    fn capacity(&self) -> usize;
    fn level(&self, i: CellIndex) -> u8;
    fn parent(&self, i: CellIndex) -> Option<CellIndex>;
    fn first_child(&self, i: CellIndex) -> Option<CellIndex>;
    #[inline]
    fn is_leaf(&self, i: CellIndex) -> bool
    {
        self.first_child(i).is_none()
    }
    /// Neighbour across face (d, dir) at the same level, or the coarser leaf covering it.
    fn neighbour(&self, i: CellIndex, d: usize, dir: usize) -> Option<CellIndex>;
    /// Reserve `count` consecutive fresh indices.
    fn allocate_children(&self, count: usize) -> Result<CellIndex, HCError>;
    fn init_cell(&self, i: CellIndex, parent: Option<CellIndex>, level: u8);
    fn link_children(&self, parent: CellIndex, first_child: Option<CellIndex>);
    /// Overwrite the number of indices in use, used when restoring snapshots.
    fn set_ncells(&self, ncells: usize) -> Result<(), HCError>;
    /// Replace the base geometry after a rescale. Cell numbering must not change.
    fn set_geometry(&mut self, geometry: BaseGeometry<D>);
}

/// The closed set of grid variants.
pub enum Topology<const D: usize>
{
    Cartesian(CartesianTopology<D>),
    Hierarchical(HierarchicalTopology<D>),
}

macro_rules! dispatch {
    ($self:ident, $t:ident => $e:expr) => {
        match $self
        {
            Topology::Cartesian($t) => $e,
            Topology::Hierarchical($t) => $e,
        }
    };
}

impl<const D: usize> GridTopology<D> for Topology<D>
{
    fn kind(&self) -> GridKind
    {
        dispatch!(self, t => t.kind())
    }

    fn can_subdivide(&self) -> bool
    {
        dispatch!(self, t => t.can_subdivide())
    }

    #[inline]
    fn ncells(&self) -> usize
    {
        dispatch!(self, t => t.ncells())
    }

    fn capacity(&self) -> usize
    {
        dispatch!(self, t => t.capacity())
    }

    #[inline]
    fn level(&self, i: CellIndex) -> u8
    {
        dispatch!(self, t => t.level(i))
    }

    #[inline]
    fn parent(&self, i: CellIndex) -> Option<CellIndex>
    {
        dispatch!(self, t => t.parent(i))
    }

    #[inline]
    fn first_child(&self, i: CellIndex) -> Option<CellIndex>
    {
        dispatch!(self, t => t.first_child(i))
    }

    #[inline]
    fn neighbour(&self, i: CellIndex, d: usize, dir: usize) -> Option<CellIndex>
    {
        dispatch!(self, t => t.neighbour(i, d, dir))
    }

    fn allocate_children(&self, count: usize) -> Result<CellIndex, HCError>
    {
        dispatch!(self, t => t.allocate_children(count))
    }

    fn init_cell(&self, i: CellIndex, parent: Option<CellIndex>, level: u8)
    {
        dispatch!(self, t => t.init_cell(i, parent, level))
    }

    fn link_children(&self, parent: CellIndex, first_child: Option<CellIndex>)
    {
        dispatch!(self, t => t.link_children(parent, first_child))
    }

    fn set_ncells(&self, ncells: usize) -> Result<(), HCError>
    {
        dispatch!(self, t => t.set_ncells(ncells))
    }

    fn set_geometry(&mut self, geometry: BaseGeometry<D>)
    {
        dispatch!(self, t => t.set_geometry(geometry))
    }
}
