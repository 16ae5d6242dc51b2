use serde::{Deserialize, Serialize};
use serde_with::serde_as;

use crate::grid::{CellIndex, NB};

///
/// The uniform base grid: `interior[d]` cells per axis inside the box,
/// surrounded by a ghost layer `NB` cells wide. Base cells are numbered
/// row-major with the last axis running fastest.
///
#[serde_as]
#[derive(Copy, Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct BaseGeometry<const D: usize>
{
    #[serde_as(as = "[_; D]")]
    pub(crate) interior: [usize; D],
    #[serde_as(as = "[_; D]")]
    pub(crate) n: [usize; D],
    pub(crate) dx: f64,
    #[serde_as(as = "[_; D]")]
    pub(crate) xmin: [f64; D],
}

impl<const D: usize> BaseGeometry<D>
{
    pub fn new(interior: [usize; D], dx: f64, xmin: [f64; D]) -> Self
    {
        let n = interior.map(|m| m + 2 * NB);
        Self { interior, n, dx, xmin }
    }

    /// Number of base cells, ghost layer included.
    #[inline]
    pub fn ntot(&self) -> usize
    {
        self.n.iter().product()
    }

    #[inline]
    pub fn dx(&self) -> f64
    {
        self.dx
    }

    #[inline]
    pub fn interior(&self) -> [usize; D]
    {
        self.interior
    }

    /// Stretch the box about the origin: cell size and lower corner are multiplied by `scaling`.
    pub fn scale(&mut self, scaling: f64)
    {
        self.dx *= scaling;
        self.xmin = self.xmin.map(|x| x * scaling);
    }

    #[inline]
    pub fn compose(&self, ijk: [usize; D]) -> CellIndex
    {
        let mut p = 0;
        for d in 0..D
        {
            p = p * self.n[d] + ijk[d];
        }
        p
    }

    #[inline]
    pub fn decompose(&self, mut p: CellIndex) -> [usize; D]
    {
        let mut ijk = [0; D];
        for d in (0..D).rev()
        {
            ijk[d] = p % self.n[d];
            p /= self.n[d];
        }
        ijk
    }

    /// Face neighbour of a base cell, `None` past the ghost layer.
    #[inline]
    pub fn base_neighbour(&self, i: CellIndex, d: usize, dir: usize) -> Option<CellIndex>
    {
        let mut ijk = self.decompose(i);
        if dir == 0
        {
            ijk[d] = ijk[d].checked_sub(1)?;
        }
        else
        {
            ijk[d] += 1;
            if ijk[d] >= self.n[d]
            {
                return None;
            }
        }
        Some(self.compose(ijk))
    }

    /// First box face (axis, side) whose ghost layer contains base cell `i`.
    pub fn ghost_face(&self, i: CellIndex) -> Option<(usize, usize)>
    {
        let ijk = self.decompose(i);
        (0..D).find_map(|d| {
            if ijk[d] < NB
            {
                Some((d, 0))
            }
            else if ijk[d] >= self.interior[d] + NB
            {
                Some((d, 1))
            }
            else
            {
                None
            }
        })
    }

    pub fn base_centroid(&self, i: CellIndex) -> [f64; D]
    {
        let ijk = self.decompose(i);
        std::array::from_fn(|d| self.xmin[d] + (ijk[d] as f64 - NB as f64 + 0.5) * self.dx)
    }

    /// Interior box.
    pub fn get_box(&self) -> ([f64; D], [f64; D])
    {
        let xmax = std::array::from_fn(|d| self.xmin[d] + self.interior[d] as f64 * self.dx);
        (self.xmin, xmax)
    }

    /// Box including the ghost layer.
    pub fn get_exterior_box(&self) -> ([f64; D], [f64; D])
    {
        let (lo, hi) = self.get_box();
        let pad = NB as f64 * self.dx;
        (lo.map(|x| x - pad), hi.map(|x| x + pad))
    }

    #[inline]
    pub fn in_box(&self, x: &[f64; D]) -> bool
    {
        let (lo, hi) = self.get_box();
        (0..D).all(|d| lo[d] <= x[d] && x[d] <= hi[d])
    }

    ///
    /// Base cell containing `x`. With `interior_only` the point must lie in
    /// the interior box (upper faces included) and only interior base cells
    /// are returned; otherwise the ghost layer counts too.
    ///
    pub fn locate(&self, x: &[f64; D], interior_only: bool) -> Option<CellIndex>
    {
        if interior_only && !self.in_box(x)
        {
            return None;
        }
        let mut ijk = [0; D];
        for d in 0..D
        {
            let s = ((x[d] - self.xmin[d]) / self.dx).floor() + NB as f64;
            if !(s >= 0.0 && s < self.n[d] as f64) && !interior_only
            {
                return None;
            }
            ijk[d] = if interior_only
            {
                (s.max(NB as f64) as usize).min(self.interior[d] + NB - 1)
            }
            else
            {
                s as usize
            };
        }
        Some(self.compose(ijk))
    }
}
