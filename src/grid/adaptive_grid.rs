use std::ops::Range;

use crate::cell_state::{CellState, CellType, SurfSpec};
use crate::config::{GridConfig, GridKind};
use crate::distributed::{DistributedArray, PeContext};
use crate::errors::HCError;
use crate::grid::boundary::BoundaryTable;
use crate::grid::cartesian::CartesianTopology;
use crate::grid::geometry::BaseGeometry;
use crate::grid::hierarchical::HierarchicalTopology;
use crate::grid::topology::{GridTopology, Topology};
use crate::grid::CellIndex;
use crate::interpolation_cache::IntpolCache;
use crate::utilities::bits::neighbour_child;
use crate::utilities::work_divide::block_work_divide;

///
/// Cell index, hierarchy and data fields of one adaptive grid, spread over
/// all PEs of a run. Cell `i` is owned by the PE the cell layout assigns it
/// to; with the default chunksize of one that is `i % npes`.
///
/// Construction is collective: every PE builds the grid with the same
/// configuration, in the same order relative to its other allocations.
///
pub struct AdaptiveGrid<const D: usize>
{
    pub(crate) ctx: PeContext,
    pub(crate) config: GridConfig,
    pub(crate) geometry: BaseGeometry<D>,
    pub(crate) topology: Topology<D>,
    pub(crate) ncd: usize,
    pub(crate) nsd: usize,
    pub(crate) cellinfo: DistributedArray<u32>,
    pub(crate) cell_data: DistributedArray<f64>,
    pub(crate) surf_data: DistributedArray<f64>,
    pub(crate) boundaries: BoundaryTable<D>,
    pub(crate) cache: IntpolCache<Vec<f64>>,
    pub(crate) cache_intpols: bool,
    /// Interpolation order the cached values were computed with.
    pub(crate) cache_order: u32,
    pub(crate) remove_gaps: bool,
}

impl<const D: usize> AdaptiveGrid<D>
{
    /// Faces stored per cell: two sides per axis, 2^(D-1) sub-faces each.
    pub const SURF_SLOTS: usize = D << D;

    pub fn new(ctx: &PeContext, config: &GridConfig) -> Result<Self, HCError>
    {
        config.validate()?;
        if config.dimension != D
        {
            log::error!("grid of dimension {D} built from a {}-dimensional configuration", config.dimension);
            return Err(HCError::InvalidDimension);
        }
        let geometry = BaseGeometry::new(
            std::array::from_fn(|d| config.base_cells[d]),
            config.dx,
            std::array::from_fn(|d| config.xmin[d]));
        let chunk = config.chunksize;
        let topology = match config.kind
        {
            GridKind::Cartesian => Topology::Cartesian(CartesianTopology::new(geometry)),
            GridKind::Hierarchical => Topology::Hierarchical(HierarchicalTopology::new(ctx, geometry, config.max_cells, chunk)?),
        };
        let capacity = topology.capacity();
        let (ncd, nsd) = (config.ncd, config.nsd);
        let cellinfo = DistributedArray::new(ctx, capacity, chunk)?;
        let cell_data = DistributedArray::new(ctx, capacity * ncd, chunk * ncd)?;
        let surf_data = DistributedArray::new(ctx, capacity * nsd * Self::SURF_SLOTS, chunk * nsd * Self::SURF_SLOTS)?;
        let boundaries = BoundaryTable::with_box_faces(&geometry);
        let y0 = if D > 1 { geometry.xmin[1] } else { 0.0 };
        let cache = IntpolCache::with_nbits(geometry.dx, geometry.xmin[0], y0, config.cache_nbits);
        let grid = Self {
            ctx: ctx.clone(),
            config: config.clone(),
            geometry,
            topology,
            ncd,
            nsd,
            cellinfo,
            cell_data,
            surf_data,
            boundaries,
            cache,
            cache_intpols: config.cache_interpolations,
            cache_order: 0,
            remove_gaps: false,
        };
        grid.mark_base_cells();
        ctx.barrier();
        log::debug!("PE {}: {}", ctx.mype(), grid.write_meminfo());
        Ok(grid)
    }

    /// Owned base cells in the ghost layer become ghosts of their box face.
    fn mark_base_cells(&self)
    {
        let ntot = self.geometry.ntot();
        let layout = *self.cellinfo.layout();
        let mut i = layout.first_owned(self.ctx.mype());
        while i < ntot
        {
            let state = match self.geometry.ghost_face(i)
            {
                Some((d, dir)) => CellState::new()
                    .with_cell_type(CellType::Ghost)
                    .with_bc_index_masked(self.boundaries.box_slot(d, dir) as u32),
                None => CellState::new(),
            };
            self.cellinfo.local_put(i, state.into_bits());
            i = layout.next_owned(i);
        }
    }

    #[inline]
    pub fn context(&self) -> &PeContext
    {
        &self.ctx
    }

    #[inline]
    pub fn config(&self) -> &GridConfig
    {
        &self.config
    }

    #[inline]
    pub fn geometry(&self) -> &BaseGeometry<D>
    {
        &self.geometry
    }

    #[inline]
    pub fn dimension(&self) -> usize
    {
        D
    }

    pub fn kind(&self) -> GridKind
    {
        self.topology.kind()
    }

    pub fn can_subdivide(&self) -> bool
    {
        self.topology.can_subdivide()
    }

    #[inline]
    pub fn ncells(&self) -> usize
    {
        self.topology.ncells()
    }

    pub fn max_ncells(&self) -> usize
    {
        self.topology.capacity()
    }

    pub fn ncelldata(&self) -> usize
    {
        self.ncd
    }

    pub fn nsurfdata(&self) -> usize
    {
        self.nsd
    }

    // ---------------------------------------------------------------- state

    #[inline]
    pub fn state(&self, i: CellIndex) -> CellState
    {
        CellState::from_bits(self.cellinfo.read(i))
    }

    #[inline]
    pub fn set_state(&self, i: CellIndex, state: CellState)
    {
        self.cellinfo.write(i, state.into_bits());
    }

    #[inline]
    pub fn celltype(&self, i: CellIndex) -> CellType
    {
        self.state(i).cell_type()
    }

    pub fn set_celltype(&self, i: CellIndex, ct: CellType)
    {
        self.set_state(i, self.state(i).with_cell_type(ct));
    }

    pub fn bc_index(&self, i: CellIndex) -> usize
    {
        self.state(i).bc_index() as usize
    }

    pub fn set_bc_index(&self, i: CellIndex, bcindex: u32)
    {
        self.set_state(i, self.state(i).with_bc_index_masked(bcindex));
    }

    pub fn timeclass(&self, i: CellIndex) -> u8
    {
        self.state(i).timeclass()
    }

    pub fn set_timeclass(&self, i: CellIndex, timeclass: u32)
    {
        self.set_state(i, self.state(i).with_timeclass_masked(timeclass));
    }

    // ------------------------------------------------------------ hierarchy

    #[inline]
    pub fn level(&self, i: CellIndex) -> u8
    {
        self.topology.level(i)
    }

    #[inline]
    pub fn is_leaf(&self, i: CellIndex) -> bool
    {
        self.topology.is_leaf(i)
    }

    /// Interior or ghost, i.e. neither provisional nor removed.
    #[inline]
    pub fn is_active(&self, i: CellIndex) -> bool
    {
        self.celltype(i).is_live()
    }

    #[inline]
    pub fn parent(&self, i: CellIndex) -> Option<CellIndex>
    {
        self.topology.parent(i)
    }

    #[inline]
    pub fn first_child(&self, i: CellIndex) -> Option<CellIndex>
    {
        self.topology.first_child(i)
    }

    pub fn child(&self, i: CellIndex, k: usize) -> Option<CellIndex>
    {
        debug_assert!(k < 1 << D);
        self.first_child(i).map(|fc| fc + k)
    }

    #[inline]
    pub fn cellsize(&self, i: CellIndex) -> f64
    {
        self.geometry.dx / (1_u64 << self.level(i)) as f64
    }

    pub fn centroid(&self, i: CellIndex) -> [f64; D]
    {
        let mut codes = Vec::new();
        let mut c = i;
        while let Some(p) = self.parent(c)
        {
            let k = self.topology.first_child(p).and_then(|fc| c.checked_sub(fc)).unwrap_or(0);
            codes.push((k, self.level(c)));
            c = p;
        }
        let mut x = self.geometry.base_centroid(c);
        for &(k, level) in codes.iter().rev()
        {
            let half = 0.5 * self.geometry.dx / (1_u64 << level) as f64;
            for (d, xd) in x.iter_mut().enumerate()
            {
                if k & (1 << d) != 0 { *xd += half } else { *xd -= half }
            }
        }
        x
    }

    #[inline]
    pub fn neighbour(&self, i: CellIndex, d: usize, dir: usize) -> Option<CellIndex>
    {
        self.topology.neighbour(i, d, dir)
    }

    pub fn n_neighbours(&self, i: CellIndex, d: usize, dir: usize) -> usize
    {
        if self.state(i).is_dense(d, dir)
        {
            1 << (D - 1)
        }
        else
        {
            usize::from(self.neighbour(i, d, dir).is_some())
        }
    }

    /// Every cell sharing face (d, dir) with `i`.
    pub fn neighbours(&self, i: CellIndex, d: usize, dir: usize) -> Vec<CellIndex>
    {
        let Some(nb) = self.neighbour(i, d, dir)
        else
        {
            return Vec::new();
        };
        match self.first_child(nb)
        {
            Some(fc) if self.state(i).is_dense(d, dir) =>
                (0..1 << (D - 1)).map(|k| fc + neighbour_child(d, dir, k)).collect(),
            _ => vec![nb],
        }
    }

    pub fn n_levels(&self) -> usize
    {
        (0..self.ncells()).map(|i| self.level(i) as usize).max().map_or(0, |l| l + 1)
    }

    pub fn minimum_grid_spacing(&self) -> f64
    {
        self.geometry.dx / (1_u64 << self.n_levels().saturating_sub(1)) as f64
    }

    pub fn basegrid_cell_size(&self) -> f64
    {
        self.geometry.dx
    }

    pub fn get_box(&self) -> ([f64; D], [f64; D])
    {
        self.geometry.get_box()
    }

    pub fn get_exterior_box(&self) -> ([f64; D], [f64; D])
    {
        self.geometry.get_exterior_box()
    }

    ///
    /// Multiply all lengths by `scaling`: base cell size, lower box corner
    /// and the box face boundaries. Cell indices, hierarchy and data are
    /// untouched. Shapes of registered body boundaries are not rescaled.
    ///
    pub fn scale(&mut self, scaling: f64) -> Result<(), HCError>
    {
        if !(scaling.is_finite() && scaling > 0.0)
        {
            log::error!("invalid scaling factor {scaling}");
            return Err(HCError::InvalidConfig);
        }
        self.geometry.scale(scaling);
        self.topology.set_geometry(self.geometry);
        self.config.dx = self.geometry.dx;
        self.config.xmin = self.geometry.xmin.to_vec();
        self.boundaries.fit_box_faces(&self.geometry);
        let y0 = if D > 1 { self.geometry.xmin[1] } else { 0.0 };
        self.cache = IntpolCache::with_nbits(self.geometry.dx, self.geometry.xmin[0], y0, self.config.cache_nbits);
        Ok(())
    }

    // ------------------------------------------------------------------ data

    /// Cell data items of cell `i`. One block transfer from the owner PE.
    pub fn get_cell(&self, i: CellIndex) -> Result<Vec<f64>, HCError>
    {
        let mut out = vec![0.0; self.ncd];
        self.get_cell_into(i, &mut out)?;
        Ok(out)
    }

    pub fn get_cell_into(&self, i: CellIndex, out: &mut [f64]) -> Result<(), HCError>
    {
        let n = out.len().min(self.ncd);
        self.cell_data.get(i * self.ncd, &mut out[..n])
    }

    ///
    /// Write cell data. Cached interpolations are not invalidated; clear the
    /// cache explicitly when values it may hold change.
    ///
    pub fn put_cell(&self, i: CellIndex, values: &[f64]) -> Result<(), HCError>
    {
        debug_assert!(values.len() <= self.ncd);
        let n = values.len().min(self.ncd);
        self.cell_data.put(i * self.ncd, &values[..n])
    }

    #[inline]
    fn surf_offset(&self, i: CellIndex, s: SurfSpec) -> usize
    {
        (i * Self::SURF_SLOTS + s.slot::<D>()) * self.nsd
    }

    pub fn get_surf(&self, i: CellIndex, s: SurfSpec) -> Result<Vec<f64>, HCError>
    {
        let mut out = vec![0.0; self.nsd];
        self.surf_data.get(self.surf_offset(i, s), &mut out)?;
        Ok(out)
    }

    pub fn put_surf(&self, i: CellIndex, s: SurfSpec, values: &[f64]) -> Result<(), HCError>
    {
        let n = values.len().min(self.nsd);
        self.surf_data.put(self.surf_offset(i, s), &values[..n])
    }

    /// Component `c` of every cell in `iv`, gathered across PEs.
    pub fn vget_component(&self, iv: &[CellIndex], c: usize) -> Vec<f64>
    {
        debug_assert!(c < self.ncd);
        let mut out = vec![0.0; iv.len()];
        self.cell_data.gather(c, iv, self.ncd, &mut out, 1);
        out
    }

    pub fn vput_component(&self, iv: &[CellIndex], c: usize, values: &[f64])
    {
        debug_assert!(c < self.ncd && values.len() >= iv.len());
        self.cell_data.scatter(c, iv, self.ncd, values, 1);
    }

    // -------------------------------------------------------- coordination

    /// This PE's contiguous share of the iteration range `a..b`.
    pub fn block_work_divide(&self, a: usize, b: usize) -> Range<usize>
    {
        block_work_divide(a, b, self.ctx.npes(), self.ctx.mype())
    }

    /// Barrier after which writes from every PE are visible everywhere.
    pub fn pe_coherency(&self)
    {
        self.ctx.barrier();
    }

    pub fn write_meminfo(&self) -> String
    {
        let bytes = self.cellinfo.layout().locallen() * std::mem::size_of::<u32>()
            + (self.cell_data.layout().locallen() + self.surf_data.layout().locallen()) * std::mem::size_of::<f64>();
        format!(
            "{:?} grid, D={}, {} of {} cells in use, ncd={}, nsd={}, {} BCs, {:.1} KiB of field storage per PE",
            self.kind(), D, self.ncells(), self.max_ncells(), self.ncd, self.nsd,
            self.boundaries.len(), bytes as f64 / 1024.0)
    }
}

#[cfg(test)]
mod tests
{
    use super::*;

    pub(crate) fn unit_grid(kind: GridKind) -> AdaptiveGrid<2>
    {
        let config = GridConfig { kind, ncd: 2, nsd: 1, ..GridConfig::unit_box(2, 4) };
        AdaptiveGrid::new(&PeContext::single(), &config).unwrap()
    }

    #[test]
    fn ghost_layer_is_marked()
    {
        let grid = unit_grid(GridKind::Cartesian);
        assert_eq!(grid.ncells(), 36);
        let g = grid.geometry();
        assert_eq!(grid.celltype(g.compose([0, 3])), CellType::Ghost);
        assert_eq!(grid.bc_index(g.compose([0, 3])), grid.boundaries.box_slot(0, 0));
        assert_eq!(grid.bc_index(g.compose([5, 3])), grid.boundaries.box_slot(0, 1));
        assert_eq!(grid.celltype(g.compose([2, 3])), CellType::Interior);
    }

    #[test]
    fn rejects_wrong_dimension()
    {
        let config = GridConfig::unit_box(3, 2);
        assert_eq!(AdaptiveGrid::<2>::new(&PeContext::single(), &config).err(), Some(HCError::InvalidDimension));
    }

    #[test]
    fn cell_and_surface_data()
    {
        let grid = unit_grid(GridKind::Hierarchical);
        grid.put_cell(7, &[1.0, 2.0]).unwrap();
        assert_eq!(grid.get_cell(7).unwrap(), vec![1.0, 2.0]);
        let s = SurfSpec::face(1, 0, 1);
        grid.put_surf(7, s, &[3.5]).unwrap();
        assert_eq!(grid.get_surf(7, s).unwrap(), vec![3.5]);
        assert_eq!(grid.get_surf(7, SurfSpec::face(1, 1, 1)).unwrap(), vec![0.0]);
        assert_eq!(grid.get_cell(8).unwrap(), vec![0.0, 0.0]);
    }

    #[test]
    fn vector_component_access()
    {
        let grid = unit_grid(GridKind::Cartesian);
        grid.vput_component(&[3, 9, 14], 1, &[0.5, 1.5, 2.5]);
        assert_eq!(grid.vget_component(&[14, 3], 1), vec![2.5, 0.5]);
        assert_eq!(grid.get_cell(9).unwrap(), vec![0.0, 1.5]);
    }

    #[test]
    fn cartesian_geometry_queries()
    {
        let grid = unit_grid(GridKind::Cartesian);
        let g = grid.geometry();
        let i = g.compose([1, 1]);
        assert_eq!(grid.centroid(i), [0.125, 0.125]);
        assert_eq!(grid.cellsize(i), 0.25);
        assert_eq!(grid.neighbour(i, 0, 1), Some(g.compose([2, 1])));
        assert_eq!(grid.n_neighbours(i, 1, 0), 1);
        assert_eq!(grid.n_neighbours(g.compose([0, 0]), 0, 0), 0);
        assert_eq!(grid.minimum_grid_spacing(), 0.25);
        assert_eq!(grid.get_exterior_box(), ([-0.25, -0.25], [1.25, 1.25]));
    }

    #[test]
    fn scaling_stretches_geometry()
    {
        use crate::grid::boundary::BoundaryGeometry;
        let mut grid = unit_grid(GridKind::Hierarchical);
        let i = grid.geometry().compose([2, 3]);
        let children = grid.subdivide(i).unwrap();
        grid.mature_cells(children.start, children.end);
        let before = grid.centroid(children.start + 3);
        grid.scale(2.0).unwrap();
        assert_eq!(grid.centroid(children.start + 3), before.map(|x| 2.0 * x));
        assert_eq!(grid.cellsize(children.start), 0.25);
        assert_eq!(grid.get_box(), ([0.0, 0.0], [2.0, 2.0]));
        assert_eq!(grid.config().dx, 0.5);
        assert_eq!(grid.find(&[0.6, 1.4]), Some(children.start + 2));
        let upper_x = grid.boundary_geometry(1).unwrap();
        assert!(upper_x.is_inside(&[2.1, 1.0]));
        assert!(!upper_x.is_inside(&[1.5, 1.0]));
        assert_eq!(grid.scale(0.0), Err(HCError::InvalidConfig));
        assert_eq!(grid.scale(f64::NAN), Err(HCError::InvalidConfig));
    }

    #[test]
    fn state_setters_round_trip()
    {
        let grid = unit_grid(GridKind::Cartesian);
        grid.set_timeclass(10, 3);
        grid.set_bc_index(10, 7);
        grid.set_celltype(10, CellType::Dead);
        assert_eq!(grid.timeclass(10), 3);
        assert_eq!(grid.bc_index(10), 7);
        assert_eq!(grid.celltype(10), CellType::Dead);
        assert!(!grid.is_active(10));
    }
}
