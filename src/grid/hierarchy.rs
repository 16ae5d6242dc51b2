use std::ops::Range;

use crate::cell_state::CellType;
use crate::errors::HCError;
use crate::grid::adaptive_grid::AdaptiveGrid;
use crate::grid::topology::GridTopology;
use crate::grid::{CellIndex, Traversal};

impl<const D: usize> AdaptiveGrid<D>
{
    pub const NCHILDREN: usize = 1 << D;

    ///
    /// Split leaf `i` into 2^D children and return their index range. The
    /// children start out provisional ([`CellType::Dead`]) with a copy of the
    /// parent's data and flags; call [`mature_cells`](Self::mature_cells) on
    /// the range once they are ready to take part in traversals.
    ///
    /// Any PE may subdivide any cell. Only this PE's interpolation cache is
    /// cleared; other PEs must clear theirs before interpolating again. When
    /// PEs refine neighbouring cells in the same phase, the dense flags of
    /// shared neighbours may be stale until
    /// [`refresh_all_dense_flags`](Self::refresh_all_dense_flags) runs.
    ///
    pub fn subdivide(&mut self, i: CellIndex) -> Result<Range<CellIndex>, HCError>
    {
        if !self.topology.can_subdivide()
        {
            return Err(HCError::NotSubdividable);
        }
        let state = self.state(i);
        if !self.is_leaf(i) || !state.may_subdivide() || !state.cell_type().is_live()
        {
            log::debug!("cell {i} ({:?}) cannot be subdivided", state.cell_type());
            return Err(HCError::NotSubdividable);
        }
        let fc = self.topology.allocate_children(Self::NCHILDREN)?;
        let level = self.level(i) + 1;
        let data = self.get_cell(i)?;
        let child_state = state
            .clear_dense_flags()
            .with_no_recoarsen(false)
            .with_cell_type(CellType::Dead);
        for c in fc..fc + Self::NCHILDREN
        {
            self.topology.init_cell(c, Some(i), level);
            self.set_state(c, child_state);
            self.put_cell(c, &data)?;
        }
        self.topology.link_children(i, Some(fc));
        for c in fc..fc + Self::NCHILDREN
        {
            self.refresh_dense_flags(c);
        }
        self.refresh_neighbour_flags(i);
        self.cache.clear();
        Ok(fc..fc + Self::NCHILDREN)
    }

    ///
    /// Recompute the dense flags of `i`: face (d, dir) is dense when the
    /// neighbour across it sits on the same level and has children, so that
    /// 2^(D-1) finer cells touch the face.
    ///
    pub fn refresh_dense_flags(&self, i: CellIndex)
    {
        let level = self.level(i);
        let mut state = self.state(i);
        for d in 0..D
        {
            for dir in 0..2
            {
                let dense = self.neighbour(i, d, dir)
                    .is_some_and(|nb| self.level(nb) == level && !self.is_leaf(nb));
                state = state.set_dense(d, dir, dense);
            }
        }
        self.set_state(i, state);
    }

    /// Refresh the same-level neighbours of `i` after its children changed.
    fn refresh_neighbour_flags(&self, i: CellIndex)
    {
        let level = self.level(i);
        for d in 0..D
        {
            for dir in 0..2
            {
                if let Some(nb) = self.neighbour(i, d, dir).filter(|&nb| self.level(nb) == level)
                {
                    self.refresh_dense_flags(nb);
                }
            }
        }
    }

    /// Recompute the dense flags of every owned cell. Collective.
    pub fn refresh_all_dense_flags(&self)
    {
        self.pe_coherency();
        for i in self.cells(Traversal::ActiveOnly)
        {
            self.refresh_dense_flags(i);
        }
        self.pe_coherency();
    }

    ///
    /// Promote the provisional cells this PE owns in `bottom..top` to the
    /// type of their parent. Returns whether any of them became a ghost.
    ///
    pub fn mature_cells(&self, bottom: CellIndex, top: CellIndex) -> bool
    {
        let mut were_ghosts = false;
        let layout = *self.cellinfo.layout();
        let mut i = layout.first_owned(self.ctx.mype());
        while i < top
        {
            if i >= bottom && self.celltype(i) == CellType::Dead
            {
                let ct = self.parent(i).map_or(CellType::Interior, |p| self.celltype(p));
                self.set_celltype(i, ct);
                were_ghosts |= ct == CellType::Ghost;
            }
            i = layout.next_owned(i);
        }
        were_ghosts
    }

    ///
    /// Merge the children of `i` back into it. The parent receives the mean
    /// of the children's data and the children are marked removed. Their
    /// indices are not reused.
    ///
    pub fn coarsen(&mut self, i: CellIndex) -> Result<(), HCError>
    {
        let Some(fc) = self.first_child(i)
        else
        {
            return Err(HCError::NotCoarsenable);
        };
        let children = fc..fc + Self::NCHILDREN;
        if !children.clone().all(|c| self.is_leaf(c) && self.state(c).may_recoarsen())
        {
            log::debug!("children of cell {i} cannot be merged");
            return Err(HCError::NotCoarsenable);
        }
        let mut mean = vec![0.0; self.ncd];
        let mut buf = vec![0.0; self.ncd];
        for c in children.clone()
        {
            self.get_cell_into(c, &mut buf)?;
            mean.iter_mut().zip(&buf).for_each(|(m, v)| *m += v);
        }
        let w = 1.0 / Self::NCHILDREN as f64;
        mean.iter_mut().for_each(|m| *m *= w);
        self.put_cell(i, &mean)?;
        for c in children
        {
            self.set_celltype(c, CellType::Removed);
        }
        self.topology.link_children(i, None);
        self.refresh_dense_flags(i);
        self.refresh_neighbour_flags(i);
        self.cache.clear();
        Ok(())
    }

    /// Lock every cell owned by this PE against recoarsening.
    pub fn forbid_recoarsen(&self)
    {
        for i in self.cells(Traversal::All)
        {
            self.set_state(i, self.state(i).with_no_recoarsen(true));
        }
    }
}

#[cfg(test)]
mod tests
{
    use super::*;
    use crate::config::{GridConfig, GridKind};
    use crate::distributed::PeContext;

    fn grid(kind: GridKind) -> AdaptiveGrid<2>
    {
        let config = GridConfig { kind, ncd: 2, ..GridConfig::unit_box(2, 4) };
        AdaptiveGrid::new(&PeContext::single(), &config).unwrap()
    }

    #[test]
    fn cartesian_grid_refuses_subdivision()
    {
        let mut g = grid(GridKind::Cartesian);
        assert_eq!(g.subdivide(7), Err(HCError::NotSubdividable));
    }

    #[test]
    fn subdivide_then_mature()
    {
        let mut g = grid(GridKind::Hierarchical);
        let geo = *g.geometry();
        let i = geo.compose([2, 2]);
        g.put_cell(i, &[1.0, -1.0]).unwrap();
        let children = g.subdivide(i).unwrap();
        assert_eq!(children, 36..40);
        assert_eq!(g.ncells(), 40);
        assert!(!g.is_leaf(i));
        assert_eq!(g.cells(Traversal::LeafOnly).count(), 15);
        for c in children.clone()
        {
            assert_eq!(g.celltype(c), CellType::Dead);
            assert_eq!(g.parent(c), Some(i));
            assert_eq!(g.level(c), 1);
            assert_eq!(g.get_cell(c).unwrap(), vec![1.0, -1.0]);
        }
        assert!(!g.mature_cells(children.start, children.end));
        assert_eq!(g.cells(Traversal::LeafOnly).count(), 19);
        assert_eq!(g.centroid(38), [0.3125, 0.4375]);
        assert_eq!(g.cellsize(38), 0.125);
        assert_eq!(g.minimum_grid_spacing(), 0.125);
    }

    #[test]
    fn neighbours_across_levels()
    {
        let mut g = grid(GridKind::Hierarchical);
        let geo = *g.geometry();
        let i = geo.compose([2, 2]);
        let right = geo.compose([3, 2]);
        let fc = g.subdivide(i).unwrap().start;
        // siblings
        assert_eq!(g.neighbour(fc, 0, 1), Some(fc + 1));
        assert_eq!(g.neighbour(fc + 1, 0, 0), Some(fc));
        // coarser leaf on the far side
        assert_eq!(g.neighbour(fc + 1, 0, 1), Some(right));
        // dense face seen from the coarse side
        assert!(g.state(right).is_dense(0, 0));
        assert_eq!(g.n_neighbours(right, 0, 0), 2);
        assert_eq!(g.neighbours(right, 0, 0), vec![fc + 1, fc + 3]);
        let fc2 = g.subdivide(right).unwrap().start;
        assert_eq!(g.neighbour(fc + 1, 0, 1), Some(fc2));
        assert_eq!(g.neighbour(fc2 + 2, 0, 0), Some(fc + 3));
    }

    #[test]
    fn coarsen_averages_children()
    {
        let mut g = grid(GridKind::Hierarchical);
        let i = g.geometry().compose([1, 1]);
        let children = g.subdivide(i).unwrap();
        g.mature_cells(children.start, children.end);
        for (k, c) in children.clone().enumerate()
        {
            g.put_cell(c, &[k as f64, 2.0]).unwrap();
        }
        g.coarsen(i).unwrap();
        assert!(g.is_leaf(i));
        assert_eq!(g.get_cell(i).unwrap(), vec![1.5, 2.0]);
        assert!(children.clone().all(|c| g.celltype(c) == CellType::Removed));
        assert_eq!(g.cells(Traversal::LeafOnly).count(), 16);
        assert!(!g.state(g.geometry().compose([2, 1])).is_dense(0, 0));
        assert_eq!(g.coarsen(i), Err(HCError::NotCoarsenable));
    }

    #[test]
    fn removed_cells_have_no_neighbours()
    {
        let mut g = grid(GridKind::Hierarchical);
        let i = g.geometry().compose([2, 1]);
        let children = g.subdivide(i).unwrap();
        g.mature_cells(children.start, children.end);
        g.coarsen(i).unwrap();
        for c in children.clone()
        {
            for (d, dir) in [(0, 0), (0, 1), (1, 0), (1, 1)]
            {
                assert_eq!(g.neighbour(c, d, dir), None);
            }
        }
        // refined again, the old indices still do not resolve
        let again = g.subdivide(i).unwrap();
        assert_eq!(again.start, children.end);
        assert_eq!(g.neighbour(children.start, 0, 1), None);
        assert_eq!(g.neighbour(again.start, 0, 1), Some(again.start + 1));
        assert_eq!(g.cells(Traversal::All).count(), 44);
    }

    #[test]
    fn recoarsen_lock()
    {
        let mut g = grid(GridKind::Hierarchical);
        let i = g.geometry().compose([1, 2]);
        let children = g.subdivide(i).unwrap();
        g.forbid_recoarsen();
        assert!(!g.state(children.start).may_recoarsen());
        assert_eq!(g.coarsen(i), Err(HCError::NotCoarsenable));
    }

    #[test]
    fn capacity_is_enforced()
    {
        let config = GridConfig { max_cells: 40, ..GridConfig::unit_box(2, 4) };
        let mut g = AdaptiveGrid::<2>::new(&PeContext::single(), &config).unwrap();
        g.subdivide(14).unwrap();
        assert_eq!(g.subdivide(15), Err(HCError::CapacityExceeded));
        assert_eq!(g.ncells(), 40);
    }
}
