use indexmap::IndexMap;
use rustc_hash::FxBuildHasher;

use crate::errors::HCError;
use crate::grid::adaptive_grid::AdaptiveGrid;
use crate::grid::CellIndex;
use crate::utilities::bits::get_bit;

/// Cells an interpolated value depends on, with their weights.
pub type DepList = IndexMap<CellIndex, f64, FxBuildHasher>;

impl<const D: usize> AdaptiveGrid<D>
{
    /// Leaf containing `x`, or `None` outside the interior box.
    pub fn find(&self, x: &[f64; D]) -> Option<CellIndex>
    {
        let base = self.geometry.locate(x, true)?;
        Some(self.descend(base, x))
    }

    /// Like [`find`](Self::find), but the ghost layer counts as part of the grid.
    pub fn find_any(&self, x: &[f64; D]) -> Option<CellIndex>
    {
        let base = self.geometry.locate(x, false)?;
        Some(self.descend(base, x))
    }

    /// Walk down from `i` to the finest active cell containing `x`.
    fn descend(&self, mut i: CellIndex, x: &[f64; D]) -> CellIndex
    {
        let mut centre = self.centroid(i);
        let mut half = 0.5 * self.cellsize(i);
        while let Some(fc) = self.first_child(i)
        {
            let mut k = 0;
            for d in 0..D
            {
                if x[d] >= centre[d]
                {
                    k |= 1 << d;
                }
            }
            let child = fc + k;
            if !self.is_active(child)
            {
                break;
            }
            half *= 0.5;
            for (d, c) in centre.iter_mut().enumerate()
            {
                if k & (1 << d) != 0 { *c += half } else { *c -= half }
            }
            i = child;
        }
        i
    }

    ///
    /// Cells and weights whose weighted sum gives the value at `x`. Order 0
    /// is the containing cell alone. Higher orders blend the containing cell
    /// with its face neighbours on the side of `x`, one corner per
    /// combination of axes, using multilinear weights in the cell's own
    /// spacing. Corners beyond the grid fall back to the nearer cell, and
    /// refined corners are replaced by their leaves along the shared face.
    ///
    pub fn corner_deplist(&self, x: &[f64; D], order: u32) -> Option<DepList>
    {
        let cell = self.find(x)?;
        let mut deps = DepList::with_capacity_and_hasher(1 << D, FxBuildHasher);
        if order == 0
        {
            deps.insert(cell, 1.0);
            return Some(deps);
        }
        let xc = self.centroid(cell);
        let h = self.cellsize(cell);
        let dirs: [usize; D] = std::array::from_fn(|d| usize::from(x[d] >= xc[d]));
        let t: [f64; D] = std::array::from_fn(|d| ((x[d] - xc[d]).abs() / h).min(1.0));
        for k in 0..1_usize << D
        {
            let mut corner = cell;
            let mut w = 1.0;
            for d in 0..D
            {
                if k & (1 << d) != 0
                {
                    corner = self.neighbour(corner, d, dirs[d]).unwrap_or(corner);
                    w *= t[d];
                }
                else
                {
                    w *= 1.0 - t[d];
                }
            }
            if w != 0.0
            {
                self.spread_corner(corner, k, &dirs, w, &mut deps);
            }
        }
        Some(deps)
    }

    ///
    /// Add `corner` to `deps` with weight `w`. A refined corner holds no
    /// current data, so its weight is shared equally by the active children
    /// facing back across the stepped axes `mask`, recursively down to leaves.
    ///
    fn spread_corner(&self, corner: CellIndex, mask: usize, dirs: &[usize; D], w: f64, deps: &mut DepList)
    {
        let nchildren = 1_usize << D;
        let children = self.first_child(corner)
            .filter(|&fc| (fc..fc + nchildren).all(|c| self.is_active(c)));
        let Some(fc) = children
        else
        {
            *deps.entry(corner).or_insert(0.0) += w;
            return;
        };
        let facing = (0..nchildren).filter(|&k| {
            (0..D).all(|d| mask & (1 << d) == 0 || get_bit(d, k) == (dirs[d] == 0))
        });
        let share = w / (1_usize << (D - mask.count_ones() as usize)) as f64;
        for k in facing
        {
            self.spread_corner(fc + k, mask, dirs, share, deps);
        }
    }

    /// Interpolate without consulting or filling the cache.
    pub fn intpol_uncached(&self, x: &[f64; D], order: u32) -> Result<Vec<f64>, HCError>
    {
        let deps = self.corner_deplist(x, order).ok_or(HCError::OutOfDomain)?;
        let mut out = vec![0.0; self.ncd];
        let mut buf = vec![0.0; self.ncd];
        for (&cell, &w) in deps.iter()
        {
            self.get_cell_into(cell, &mut buf)?;
            out.iter_mut().zip(&buf).for_each(|(o, v)| *o += w * v);
        }
        Ok(out)
    }

    ///
    /// Cell data interpolated at `x`. Points outside the interior box give
    /// [`HCError::OutOfDomain`].
    ///
    /// With caching enabled, results are memoized by position for one and
    /// two dimensional grids. The cache holds values of one order at a time
    /// and is emptied when a different order is asked for. Cached values go
    /// stale as soon as cell data changes: clear the cache whenever that
    /// happens.
    ///
    pub fn intpol(&mut self, x: &[f64; D], order: u32) -> Result<Vec<f64>, HCError>
    {
        if !self.cache_intpols || D > 2
        {
            return self.intpol_uncached(x, order);
        }
        if order != self.cache_order
        {
            self.cache.clear();
            self.cache_order = order;
        }
        let (cx, cy) = (x[0], if D > 1 { x[1] } else { 0.0 });
        if let Some(u) = self.cache.read(cx, cy)
        {
            return Ok(u);
        }
        let u = self.intpol_uncached(x, order)?;
        self.cache.store(u.clone(), cx, cy);
        Ok(u)
    }

    /// Interpolate many points in parallel. The cache is not used.
    #[cfg(feature="rayon")]
    pub fn intpol_batch(&self, xs: &[[f64; D]], order: u32) -> Vec<Result<Vec<f64>, HCError>>
    {
        use rayon::iter::{IndexedParallelIterator, IntoParallelRefIterator, IntoParallelRefMutIterator, ParallelIterator};
        let mut results = vec![Ok(Vec::new()); xs.len()];
        xs.par_iter().zip(results.par_iter_mut()).for_each(
            |(x, y)|
            {
                *y = self.intpol_uncached(x, order);
            }
        );
        results
    }

    #[cfg(not(feature="rayon"))]
    pub fn intpol_batch(&self, xs: &[[f64; D]], order: u32) -> Vec<Result<Vec<f64>, HCError>>
    {
        xs.iter().map(|x| self.intpol_uncached(x, order)).collect()
    }

    pub fn set_intpol_caching(&mut self, flag: bool)
    {
        if flag != self.cache_intpols
        {
            self.cache.clear();
        }
        self.cache_intpols = flag;
    }

    pub fn intpol_caching(&self) -> bool
    {
        self.cache_intpols
    }

    pub fn clear_intpol_cache(&mut self)
    {
        self.cache.clear();
    }

    pub fn cache_hit_ratio(&self) -> f64
    {
        self.cache.hit_ratio()
    }

    pub fn print_cache_stats(&self)
    {
        self.cache.print_stats();
    }
}
