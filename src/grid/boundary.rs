use std::sync::Arc;

use crate::cell_state::{CellType, MAX_N_BC};
use crate::errors::HCError;
use crate::grid::adaptive_grid::AdaptiveGrid;
use crate::grid::geometry::BaseGeometry;
use crate::grid::{CellIndex, Traversal};

#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum BcType
{
    /// Ghost values are set once and left alone.
    Fixed,
    /// Ghost values copy the adjacent interior cell.
    #[default]
    ZeroGradient,
    /// Ghost values come from the evaluator.
    Function,
}

/// Shape of a boundary; decides which cells lie inside a body.
pub trait BoundaryGeometry<const D: usize>: Send + Sync
{
    fn is_inside(&self, x: &[f64; D]) -> bool;
}

/// Half space beyond one face of the base box.
#[derive(Copy, Clone, Debug)]
pub struct BoxFace
{
    pub d: usize,
    pub dir: usize,
    pub bound: f64,
}

impl<const D: usize> BoundaryGeometry<D> for BoxFace
{
    fn is_inside(&self, x: &[f64; D]) -> bool
    {
        if self.dir == 0 { x[self.d] < self.bound } else { x[self.d] > self.bound }
    }
}

#[derive(Copy, Clone, Debug)]
pub struct Sphere<const D: usize>
{
    pub centre: [f64; D],
    pub radius: f64,
}

impl<const D: usize> BoundaryGeometry<D> for Sphere<D>
{
    fn is_inside(&self, x: &[f64; D]) -> bool
    {
        let r2: f64 = (0..D).map(|d| (x[d] - self.centre[d]).powi(2)).sum();
        r2 < self.radius * self.radius
    }
}

/// What an evaluator gets to know about the ghost cell it fills.
#[derive(Clone, Debug)]
pub struct BcContext
{
    pub cell: CellIndex,
    pub bc_index: usize,
    pub level: u8,
    pub ncd: usize,
}

/// `(cell, position, time) -> cell data`.
pub type Evaluator<const D: usize> = Arc<dyn Fn(&BcContext, &[f64; D], f64) -> Vec<f64> + Send + Sync>;

#[derive(Clone)]
pub struct BoundaryCondition<const D: usize>
{
    pub bctype: BcType,
    pub evaluator: Option<Evaluator<D>>,
    pub geometry: Option<Arc<dyn BoundaryGeometry<D>>>,
}

///
/// Per-PE table of boundary conditions addressed by the 8-bit index stored
/// in each ghost cell. Slots `2d + dir` are reserved for the faces of the
/// base box; further conditions are appended after them.
///
pub struct BoundaryTable<const D: usize>
{
    entries: Vec<BoundaryCondition<D>>,
}

fn box_face<const D: usize>(geometry: &BaseGeometry<D>, d: usize, dir: usize) -> Arc<dyn BoundaryGeometry<D>>
{
    let (lo, hi) = geometry.get_box();
    let bound = if dir == 0 { lo[d] } else { hi[d] };
    Arc::new(BoxFace { d, dir, bound })
}

impl<const D: usize> BoundaryTable<D>
{
    pub fn with_box_faces(geometry: &BaseGeometry<D>) -> Self
    {
        let entries = (0..2 * D)
            .map(|slot| BoundaryCondition {
                bctype: BcType::ZeroGradient,
                evaluator: None,
                geometry: Some(box_face(geometry, slot / 2, slot % 2)),
            })
            .collect();
        Self { entries }
    }

    /// Move the box face shapes onto the faces of `geometry`.
    pub fn fit_box_faces(&mut self, geometry: &BaseGeometry<D>)
    {
        for (slot, bc) in self.entries.iter_mut().take(2 * D).enumerate()
        {
            bc.geometry = Some(box_face(geometry, slot / 2, slot % 2));
        }
    }

    #[inline]
    pub fn box_slot(&self, d: usize, dir: usize) -> usize
    {
        2 * d + dir
    }

    #[inline]
    pub fn is_box(&self, bcindex: usize) -> bool
    {
        bcindex < 2 * D
    }

    pub fn len(&self) -> usize
    {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool
    {
        self.entries.is_empty()
    }

    pub fn get(&self, bcindex: usize) -> Option<&BoundaryCondition<D>>
    {
        self.entries.get(bcindex)
    }

    pub fn get_mut(&mut self, bcindex: usize) -> Option<&mut BoundaryCondition<D>>
    {
        self.entries.get_mut(bcindex)
    }

    pub fn add(&mut self, bc: BoundaryCondition<D>) -> Result<usize, HCError>
    {
        if self.entries.len() >= MAX_N_BC
        {
            log::error!("boundary condition table is full ({MAX_N_BC} entries)");
            return Err(HCError::TooManyBoundaryConditions);
        }
        self.entries.push(bc);
        Ok(self.entries.len() - 1)
    }

    pub fn set_box(&mut self, d: usize, dir: usize, bctype: BcType, evaluator: Option<Evaluator<D>>)
    {
        let slot = self.box_slot(d, dir);
        self.entries[slot].bctype = bctype;
        self.entries[slot].evaluator = evaluator;
    }
}

impl<const D: usize> AdaptiveGrid<D>
{
    ///
    /// Register a boundary condition and return its table index. Tables are
    /// per PE; register conditions in the same order everywhere so indices
    /// stored in cells mean the same thing on every PE.
    ///
    pub fn add_bc(
        &mut self,
        bctype: BcType,
        evaluator: Option<Evaluator<D>>,
        geometry: Option<Arc<dyn BoundaryGeometry<D>>>) -> Result<usize, HCError>
    {
        self.boundaries.add(BoundaryCondition { bctype, evaluator, geometry })
    }

    pub fn set_box_bc(&mut self, d: usize, dir: usize, bctype: BcType, evaluator: Option<Evaluator<D>>)
    {
        debug_assert!(d < D && dir < 2);
        self.boundaries.set_box(d, dir, bctype, evaluator);
    }

    pub fn n_boundaries(&self) -> usize
    {
        self.boundaries.len()
    }

    pub fn is_box_ghost(&self, i: CellIndex) -> bool
    {
        let state = self.state(i);
        state.cell_type() == CellType::Ghost && self.boundaries.is_box(state.bc_index() as usize)
    }

    pub fn boundary_type(&self, bcindex: usize) -> Option<BcType>
    {
        self.boundaries.get(bcindex).map(|bc| bc.bctype)
    }

    pub fn boundary_geometry(&self, bcindex: usize) -> Option<Arc<dyn BoundaryGeometry<D>>>
    {
        self.boundaries.get(bcindex).and_then(|bc| bc.geometry.clone())
    }

    ///
    /// Turn every owned interior cell whose centroid lies inside the geometry
    /// of `bcindex` into a ghost of that condition. Collective; returns the
    /// number of cells this PE marked.
    ///
    pub fn mark_body_ghosts(&self, bcindex: usize) -> Result<usize, HCError>
    {
        let Some(shape) = self.boundary_geometry(bcindex)
        else
        {
            log::error!("boundary condition {bcindex} has no geometry to mark cells with");
            return Err(HCError::InvalidIndex);
        };
        let mut marked = 0;
        for i in self.cells(Traversal::DomainOnly)
        {
            if shape.is_inside(&self.centroid(i))
            {
                let state = self.state(i)
                    .with_cell_type(CellType::Ghost)
                    .with_bc_index_masked(bcindex as u32);
                self.set_state(i, state);
                marked += 1;
            }
        }
        self.pe_coherency();
        log::debug!("PE {}: {marked} cells marked as ghosts of boundary {bcindex}", self.ctx.mype());
        Ok(marked)
    }

    ///
    /// Fill ghost cell `i` at time `t` from its boundary condition. Returns
    /// whether the cell's data was written; non-ghost cells are left alone.
    ///
    pub fn apply_bc(&self, i: CellIndex, t: f64) -> Result<bool, HCError>
    {
        let state = self.state(i);
        if state.cell_type() != CellType::Ghost
        {
            return Ok(false);
        }
        let bcindex = state.bc_index() as usize;
        let Some(bc) = self.boundaries.get(bcindex)
        else
        {
            log::error!("ghost cell {i} refers to unregistered boundary condition {bcindex}");
            return Err(HCError::InvalidIndex);
        };
        if let Some(evaluator) = &bc.evaluator
        {
            let context = BcContext { cell: i, bc_index: bcindex, level: self.level(i), ncd: self.ncd };
            let mut values = evaluator(&context, &self.centroid(i), t);
            if values.len() > self.ncd
            {
                log::warn!("evaluator of boundary condition {bcindex} returned {} values, keeping {}", values.len(), self.ncd);
                values.truncate(self.ncd);
            }
            self.put_cell(i, &values)?;
            return Ok(true);
        }
        match bc.bctype
        {
            BcType::Fixed => Ok(false),
            BcType::ZeroGradient => match self.interior_neighbour(i)
            {
                Some(j) =>
                {
                    let values = self.get_cell(j)?;
                    self.put_cell(i, &values)?;
                    Ok(true)
                }
                None => Ok(false),
            },
            BcType::Function =>
            {
                log::warn!("boundary condition {bcindex} is a function condition without an evaluator");
                Ok(false)
            }
        }
    }

    /// Apply boundary conditions to every owned ghost leaf. Returns how many were written.
    pub fn apply_bcs(&self, t: f64) -> Result<usize, HCError>
    {
        let mut written = 0;
        for i in self.cells(Traversal::LeafGhostOnly)
        {
            if self.apply_bc(i, t)?
            {
                written += 1;
            }
        }
        Ok(written)
    }

    fn interior_neighbour(&self, i: CellIndex) -> Option<CellIndex>
    {
        (0..D)
            .flat_map(|d| [(d, 0), (d, 1)])
            .filter_map(|(d, dir)| self.neighbour(i, d, dir))
            .find(|&j| self.celltype(j) == CellType::Interior)
    }
}
