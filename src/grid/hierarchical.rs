use crate::config::GridKind;
use crate::distributed::{DistributedArray, PeContext};
use crate::errors::HCError;
use crate::grid::geometry::BaseGeometry;
use crate::grid::topology::GridTopology;
use crate::grid::{CellIndex, NO_CELL};
use crate::utilities::bits::{get_bit, invert_bit};

const LOCK: usize = 0;
const COUNT: usize = 1;

///
/// Refinement tree over the base grid. The 2^D children of a cell occupy
/// consecutive indices starting at its first child; child `k` sits in the
/// upper half of its parent along every axis `d` whose bit is set in `k`.
///
/// New indices are handed out from a shared counter guarded by a lock word
/// taken with `atomic_swap`, so any PE may refine.
///
pub struct HierarchicalTopology<const D: usize>
{
    geometry: BaseGeometry<D>,
    capacity: usize,
    parent: DistributedArray<CellIndex>,
    first_child: DistributedArray<CellIndex>,
    level: DistributedArray<u8>,
    counter: DistributedArray<usize>,
}

impl<const D: usize> HierarchicalTopology<D>
{
    /// Collective. The caller is responsible for the barrier that publishes the initial state.
    pub fn new(ctx: &PeContext, geometry: BaseGeometry<D>, capacity: usize, chunksize: usize) -> Result<Self, HCError>
    {
        let capacity = capacity.max(geometry.ntot());
        let topology = Self {
            geometry,
            capacity,
            parent: DistributedArray::new(ctx, capacity, chunksize)?,
            first_child: DistributedArray::new(ctx, capacity, chunksize)?,
            level: DistributedArray::new(ctx, capacity, chunksize)?,
            counter: DistributedArray::new(ctx, 2, 1)?,
        };
        let layout = *topology.parent.layout();
        for il in 0..layout.locallen()
        {
            let i = layout.compose(il, ctx.mype());
            topology.parent.local_put(i, NO_CELL);
            topology.first_child.local_put(i, NO_CELL);
        }
        if topology.counter.is_local(COUNT)
        {
            topology.counter.local_put(COUNT, geometry.ntot());
        }
        Ok(topology)
    }

    /// Position of `i` among its parent's children; `None` once the parent has let go of it.
    #[inline]
    fn child_code(&self, i: CellIndex, parent: CellIndex) -> Option<usize>
    {
        i.checked_sub(self.first_child.read(parent)).filter(|&k| k < 1 << D)
    }
}

impl<const D: usize> GridTopology<D> for HierarchicalTopology<D>
{
    fn kind(&self) -> GridKind
    {
        GridKind::Hierarchical
    }

    fn can_subdivide(&self) -> bool
    {
        true
    }

    #[inline]
    fn ncells(&self) -> usize
    {
        self.counter.read(COUNT)
    }

    fn capacity(&self) -> usize
    {
        self.capacity
    }

    #[inline]
    fn level(&self, i: CellIndex) -> u8
    {
        self.level.read(i)
    }

    #[inline]
    fn parent(&self, i: CellIndex) -> Option<CellIndex>
    {
        Some(self.parent.read(i)).filter(|&p| p != NO_CELL)
    }

    #[inline]
    fn first_child(&self, i: CellIndex) -> Option<CellIndex>
    {
        Some(self.first_child.read(i)).filter(|&c| c != NO_CELL)
    }

    fn neighbour(&self, i: CellIndex, d: usize, dir: usize) -> Option<CellIndex>
    {
        let Some(p) = self.parent(i)
        else
        {
            return self.geometry.base_neighbour(i, d, dir);
        };
        let k = self.child_code(i, p)?;
        if get_bit(d, k) != (dir == 1)
        {
            // sibling inside the same parent
            return Some(self.first_child.read(p) + invert_bit(d, k));
        }
        let np = self.neighbour(p, d, dir)?;
        match self.first_child(np)
        {
            Some(fc) => Some(fc + invert_bit(d, k)),
            None => Some(np),
        }
    }

    fn allocate_children(&self, count: usize) -> Result<CellIndex, HCError>
    {
        while self.counter.atomic_swap(LOCK, 1) != 0
        {
            std::hint::spin_loop();
        }
        let n = self.counter.read(COUNT);
        let result = if n + count > self.capacity
        {
            log::warn!("cell capacity {} exhausted ({} in use, {} requested)", self.capacity, n, count);
            Err(HCError::CapacityExceeded)
        }
        else
        {
            self.counter.write(COUNT, n + count);
            Ok(n)
        };
        self.counter.atomic_swap(LOCK, 0);
        result
    }

    fn init_cell(&self, i: CellIndex, parent: Option<CellIndex>, level: u8)
    {
        self.parent.write(i, parent.unwrap_or(NO_CELL));
        self.first_child.write(i, NO_CELL);
        self.level.write(i, level);
    }

    fn link_children(&self, parent: CellIndex, first_child: Option<CellIndex>)
    {
        self.first_child.write(parent, first_child.unwrap_or(NO_CELL));
    }

    fn set_ncells(&self, ncells: usize) -> Result<(), HCError>
    {
        if ncells > self.capacity
        {
            return Err(HCError::CapacityExceeded);
        }
        if self.counter.is_local(COUNT)
        {
            self.counter.local_put(COUNT, ncells);
        }
        Ok(())
    }

    fn set_geometry(&mut self, geometry: BaseGeometry<D>)
    {
        debug_assert_eq!(geometry.ntot(), self.geometry.ntot());
        self.geometry = geometry;
    }
}
