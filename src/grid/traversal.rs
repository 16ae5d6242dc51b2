use crate::cell_state::CellType;
use crate::grid::adaptive_grid::AdaptiveGrid;
use crate::grid::CellIndex;

/// Batch length of the vectorized traversal.
pub const VECLEN: usize = 64;

/// Cell subsets a traversal can be restricted to.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Hash)]
pub enum Traversal
{
    #[default]
    All,
    /// Interior leaves.
    LeafOnly,
    /// Interior cells at every level.
    DomainOnly,
    /// Interior and ghost cells, i.e. no provisional or removed ones.
    ActiveOnly,
    /// Leaves that are interior or ghost.
    LeafGhostOnly,
}

impl<const D: usize> AdaptiveGrid<D>
{
    pub fn accepts(&self, tr: Traversal, i: CellIndex) -> bool
    {
        match tr
        {
            Traversal::All => true,
            Traversal::LeafOnly => self.celltype(i) == CellType::Interior && self.is_leaf(i),
            Traversal::DomainOnly => self.celltype(i) == CellType::Interior,
            Traversal::ActiveOnly => self.celltype(i).is_live(),
            Traversal::LeafGhostOnly => self.celltype(i).is_live() && self.is_leaf(i),
        }
    }

    /// True once a traversal has run past the last cell in use.
    #[inline]
    pub fn is_over(&self, i: CellIndex) -> bool
    {
        i >= self.ncells()
    }

    #[inline]
    fn step(&self, i: CellIndex, single_pe: bool) -> CellIndex
    {
        if single_pe
        {
            i + 1
        }
        else
        {
            self.cellinfo.layout().next_owned(i)
        }
    }

    fn skip_to_accepted(&self, tr: Traversal, mut i: CellIndex, single_pe: bool) -> CellIndex
    {
        let n = self.ncells();
        while i < n && !self.accepts(tr, i)
        {
            i = self.step(i, single_pe);
        }
        i
    }

    ///
    /// First cell owned by this PE that passes `tr`. Together with
    /// [`next`](Self::next) every PE visits exactly the cells it owns, so the
    /// union over all PEs covers the grid once.
    ///
    pub fn first(&self, tr: Traversal) -> CellIndex
    {
        let start = self.cellinfo.layout().first_owned(self.ctx.mype());
        self.skip_to_accepted(tr, start, false)
    }

    pub fn next(&self, tr: Traversal, i: CellIndex) -> CellIndex
    {
        self.skip_to_accepted(tr, self.step(i, false), false)
    }

    /// Visits every cell regardless of owner. Meant for debugging on one PE.
    pub fn first_1pe(&self, tr: Traversal) -> CellIndex
    {
        self.skip_to_accepted(tr, 0, true)
    }

    pub fn next_1pe(&self, tr: Traversal, i: CellIndex) -> CellIndex
    {
        self.skip_to_accepted(tr, i + 1, true)
    }

    fn vfill(&self, tr: Traversal, mut i: CellIndex, iv: &mut [CellIndex], single_pe: bool) -> usize
    {
        let mut n = 0;
        while n < iv.len() && !self.is_over(i)
        {
            iv[n] = i;
            n += 1;
            i = self.skip_to_accepted(tr, self.step(i, single_pe), single_pe);
        }
        n
    }

    ///
    /// Fill `iv` with up to `iv.len()` (normally [`VECLEN`]) accepted cells
    /// owned by this PE, returning how many were written. Zero means the
    /// traversal is over.
    ///
    pub fn vfirst(&self, tr: Traversal, iv: &mut [CellIndex]) -> usize
    {
        self.vfill(tr, self.first(tr), iv, false)
    }

    /// Continue after a batch of `n > 0` cells returned by `vfirst` or `vnext`.
    pub fn vnext(&self, tr: Traversal, iv: &mut [CellIndex], n: usize) -> usize
    {
        debug_assert!(n > 0 && n <= iv.len());
        let start = self.next(tr, iv[n - 1]);
        self.vfill(tr, start, iv, false)
    }

    pub fn vfirst_1pe(&self, tr: Traversal, iv: &mut [CellIndex]) -> usize
    {
        self.vfill(tr, self.first_1pe(tr), iv, true)
    }

    pub fn vnext_1pe(&self, tr: Traversal, iv: &mut [CellIndex], n: usize) -> usize
    {
        debug_assert!(n > 0 && n <= iv.len());
        let start = self.next_1pe(tr, iv[n - 1]);
        self.vfill(tr, start, iv, true)
    }

    pub fn cells(&self, tr: Traversal) -> CellIter<'_, D>
    {
        CellIter { grid: self, tr, cur: self.first(tr), single_pe: false }
    }

    pub fn cells_1pe(&self, tr: Traversal) -> CellIter<'_, D>
    {
        CellIter { grid: self, tr, cur: self.first_1pe(tr), single_pe: true }
    }
}

/// Iterator form of the scalar traversal.
pub struct CellIter<'a, const D: usize>
{
    grid: &'a AdaptiveGrid<D>,
    tr: Traversal,
    cur: CellIndex,
    single_pe: bool,
}

impl<const D: usize> Iterator for CellIter<'_, D>
{
    type Item = CellIndex;

    fn next(&mut self) -> Option<Self::Item>
    {
        if self.grid.is_over(self.cur)
        {
            return None;
        }
        let i = self.cur;
        self.cur = if self.single_pe
        {
            self.grid.next_1pe(self.tr, i)
        }
        else
        {
            self.grid.next(self.tr, i)
        };
        Some(i)
    }
}
