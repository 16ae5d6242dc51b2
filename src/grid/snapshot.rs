use serde::{Deserialize, Serialize};

use crate::cell_state::{CellState, CellType};
use crate::config::{GridConfig, GridKind};
use crate::distributed::PeContext;
use crate::errors::HCError;
use crate::grid::adaptive_grid::AdaptiveGrid;
use crate::grid::boundary::BcType;
use crate::grid::geometry::BaseGeometry;
use crate::grid::topology::GridTopology;
use crate::grid::{CellIndex, NO_CELL};
use crate::serialization::{deserialize, serialize, SerializationFormat};

///
/// Everything needed to rebuild a grid, listed in cell index order. Field
/// data is flattened cell by cell. Evaluators and boundary shapes are not
/// part of a snapshot; only the boundary types are kept.
///
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct GridSnapshot<const D: usize>
{
    /// Always first, so readers can dispatch on it before decoding the rest.
    pub dimension: usize,
    pub kind: GridKind,
    pub geometry: BaseGeometry<D>,
    pub ncd: usize,
    pub nsd: usize,
    pub ncells: usize,
    pub states: Vec<u32>,
    pub parents: Vec<CellIndex>,
    pub first_children: Vec<CellIndex>,
    pub levels: Vec<u8>,
    pub cell_data: Vec<f64>,
    pub surf_data: Vec<f64>,
    pub bc_types: Vec<BcType>,
}

#[derive(Deserialize)]
struct SnapshotHeader
{
    dimension: usize,
}

/// Dimensionality of an encoded snapshot, read without decoding the cells.
pub fn peek_dimension(bytes: &[u8], format: SerializationFormat) -> Result<usize, HCError>
{
    let header: SnapshotHeader = if format.is_compressed()
    {
        let raw = lz4_flex::decompress_size_prepended(bytes).map_err(|_| HCError::LZ4DecompressionFailed)?;
        bincode::serde::decode_from_slice(&raw, bincode::config::standard())
            .map_err(|_| HCError::DeserializationFailed)?.0
    }
    else
    {
        bincode::serde::decode_from_slice(bytes, bincode::config::standard())
            .map_err(|_| HCError::DeserializationFailed)?.0
    };
    Ok(header.dimension)
}

impl<const D: usize> GridSnapshot<D>
{
    /// Configuration that rebuilds this grid, taking run-time switches from `runtime`.
    pub fn config(&self, runtime: &GridConfig) -> GridConfig
    {
        GridConfig {
            dimension: D,
            kind: self.kind,
            base_cells: self.geometry.interior.to_vec(),
            dx: self.geometry.dx,
            xmin: self.geometry.xmin.to_vec(),
            ncd: self.ncd,
            nsd: self.nsd,
            max_cells: runtime.max_cells.max(self.ncells),
            ..runtime.clone()
        }
    }

    ///
    /// Whether every per-cell vector covers exactly `ncells` cells and every
    /// parent and child link points inside the snapshot.
    ///
    pub fn is_consistent(&self) -> bool
    {
        let n = self.ncells;
        let nchildren = 1_usize << D;
        let surf_per_cell = self.nsd * (D << D);
        let in_range = |p: CellIndex| p == NO_CELL || p < n;
        let children_in_range = |fc: CellIndex| fc == NO_CELL || fc.checked_add(nchildren).is_some_and(|end| end <= n);
        self.states.len() == n
            && self.parents.len() == n
            && self.first_children.len() == n
            && self.levels.len() == n
            && Some(self.cell_data.len()) == n.checked_mul(self.ncd)
            && Some(self.surf_data.len()) == n.checked_mul(surf_per_cell)
            && self.parents.iter().all(|&p| in_range(p))
            && self.first_children.iter().all(|&fc| children_in_range(fc))
    }
}

impl<const D: usize> AdaptiveGrid<D>
{
    ///
    /// Copy of the whole grid, fetched from every PE. With gap removal
    /// switched on (see [`set_remove_gaps`](Self::set_remove_gaps)) cells
    /// removed by coarsening are left out and the remaining cells are
    /// renumbered in index order, links included.
    ///
    pub fn snapshot(&self) -> Result<GridSnapshot<D>, HCError>
    {
        let kept: Vec<CellIndex> = (0..self.ncells())
            .filter(|&i| !self.remove_gaps || self.celltype(i) != CellType::Removed)
            .collect();
        let mut renumber = vec![NO_CELL; self.ncells()];
        for (new, &old) in kept.iter().enumerate()
        {
            renumber[old] = new;
        }
        let relink = |link: Option<CellIndex>| link.map_or(NO_CELL, |old| renumber[old]);
        let n = kept.len();
        let mut cell_data = vec![0.0; n * self.ncd];
        for (&i, chunk) in kept.iter().zip(cell_data.chunks_mut(self.ncd.max(1)))
        {
            self.get_cell_into(i, chunk)?;
        }
        let per_cell = self.nsd * Self::SURF_SLOTS;
        let mut surf_data = vec![0.0; n * per_cell];
        if per_cell > 0
        {
            for (&i, chunk) in kept.iter().zip(surf_data.chunks_mut(per_cell))
            {
                self.surf_data.get(i * per_cell, chunk)?;
            }
        }
        if n < self.ncells()
        {
            log::debug!("snapshot drops {} removed cells", self.ncells() - n);
        }
        Ok(GridSnapshot {
            dimension: D,
            kind: self.kind(),
            geometry: self.geometry,
            ncd: self.ncd,
            nsd: self.nsd,
            ncells: n,
            states: kept.iter().map(|&i| self.cellinfo.read(i)).collect(),
            parents: kept.iter().map(|&i| relink(self.parent(i))).collect(),
            first_children: kept.iter().map(|&i| relink(self.first_child(i))).collect(),
            levels: kept.iter().map(|&i| self.level(i)).collect(),
            cell_data,
            surf_data,
            bc_types: (0..self.boundaries.len()).filter_map(|b| self.boundary_type(b)).collect(),
        })
    }

    /// Leave removed cells out of snapshots and saved grids.
    pub fn set_remove_gaps(&mut self, flag: bool)
    {
        self.remove_gaps = flag;
    }

    pub fn remove_gaps(&self) -> bool
    {
        self.remove_gaps
    }

    ///
    /// Write grid to buffer with the specified serialization format.
    ///
    pub fn write_buffer(&self, format: SerializationFormat) -> Result<Vec<u8>, HCError>
    {
        serialize(&self.snapshot()?, format)
    }

    pub fn save<W: std::io::Write>(&self, mut writer: W, format: SerializationFormat) -> Result<(), HCError>
    {
        let buffer = self.write_buffer(format)?;
        writer.write_all(&buffer).map_err(|_| HCError::WriteBufferFailed)?;
        writer.flush().map_err(|_| HCError::WriteBufferFailed)
    }

    ///
    /// Writes the grid to a file. Every PE holds the same view after a
    /// coherency barrier, so usually only one PE calls this.
    ///
    pub fn write(&self, path: &str, format: SerializationFormat) -> Result<(), HCError>
    {
        let file = std::io::BufWriter::new(std::fs::File::create(path).map_err(|_| HCError::FileIOError)?);
        self.save(file, format)
    }

    ///
    /// Build a grid from a saved snapshot. Collective: every PE reads the same
    /// stream. Chunksize, capacity and cache settings come from `runtime`, so a
    /// grid may be reloaded on a different number of PEs or with a different
    /// distribution.
    ///
    pub fn load<R: std::io::Read>(
        ctx: &PeContext,
        reader: R,
        format: SerializationFormat,
        runtime: &GridConfig) -> Result<Self, HCError>
    {
        let snapshot = read_snapshot::<D, R>(reader, format)?;
        let mut grid = Self::new(ctx, &snapshot.config(runtime))?;
        grid.restore(&snapshot)?;
        Ok(grid)
    }

    pub fn read(ctx: &PeContext, path: &str, format: SerializationFormat, runtime: &GridConfig) -> Result<Self, HCError>
    {
        let file = std::io::BufReader::new(std::fs::File::open(path).map_err(|_| HCError::FileIOError)?);
        Self::load(ctx, file, format, runtime)
    }

    ///
    /// Load a snapshot into this grid's existing storage. The snapshot must
    /// describe the same base grid and field widths and fit in the current
    /// capacity. Collective.
    ///
    pub fn load_merge<R: std::io::Read>(&mut self, reader: R, format: SerializationFormat) -> Result<(), HCError>
    {
        let snapshot = read_snapshot::<D, R>(reader, format)?;
        self.restore(&snapshot)
    }

    /// Overwrite this PE's share of the grid with `snapshot`. Collective.
    pub fn restore(&mut self, snapshot: &GridSnapshot<D>) -> Result<(), HCError>
    {
        if snapshot.dimension != D
            || snapshot.kind != self.kind()
            || snapshot.geometry != self.geometry
            || snapshot.ncd != self.ncd
            || snapshot.nsd != self.nsd
            || !snapshot.is_consistent()
        {
            log::error!("snapshot does not match the grid it is loaded into");
            return Err(HCError::SnapshotMismatch);
        }
        if snapshot.ncells > self.max_ncells()
        {
            log::error!("snapshot holds {} cells, grid capacity is {}", snapshot.ncells, self.max_ncells());
            return Err(HCError::CapacityExceeded);
        }
        self.ctx.barrier();
        let per_cell = self.nsd * Self::SURF_SLOTS;
        let layout = *self.cellinfo.layout();
        let mut i = layout.first_owned(self.ctx.mype());
        while i < snapshot.ncells
        {
            self.cellinfo.local_put(i, snapshot.states[i]);
            let parent = Some(snapshot.parents[i]).filter(|&p| p != NO_CELL);
            self.topology.init_cell(i, parent, snapshot.levels[i]);
            self.topology.link_children(i, Some(snapshot.first_children[i]).filter(|&c| c != NO_CELL));
            self.put_cell(i, &snapshot.cell_data[i * self.ncd..(i + 1) * self.ncd])?;
            if per_cell > 0
            {
                self.surf_data.put(i * per_cell, &snapshot.surf_data[i * per_cell..(i + 1) * per_cell])?;
            }
            i = layout.next_owned(i);
        }
        self.topology.set_ncells(snapshot.ncells)?;
        for (b, &bctype) in snapshot.bc_types.iter().enumerate()
        {
            if b < self.boundaries.len()
            {
                if let Some(bc) = self.boundaries.get_mut(b)
                {
                    bc.bctype = bctype;
                }
            }
            else
            {
                self.add_bc(bctype, None, None)?;
            }
        }
        self.cache.clear();
        self.ctx.barrier();
        log::info!(
            "PE {}: restored {} cells ({} interior leaves in total)",
            self.ctx.mype(), snapshot.ncells, count_interior_leaves(snapshot));
        Ok(())
    }
}

fn read_snapshot<const D: usize, R: std::io::Read>(mut reader: R, format: SerializationFormat) -> Result<GridSnapshot<D>, HCError>
{
    let mut bytes = Vec::new();
    reader.read_to_end(&mut bytes).map_err(|_| HCError::ReadBufferFailed)?;
    let dimension = peek_dimension(&bytes, format)?;
    if dimension != D
    {
        log::error!("snapshot of dimension {dimension} read into a {D}-dimensional grid");
        return Err(HCError::InvalidDimension);
    }
    deserialize(&bytes, format)
}

fn count_interior_leaves<const D: usize>(snapshot: &GridSnapshot<D>) -> usize
{
    snapshot.states.iter().zip(&snapshot.first_children)
        .filter(|&(&s, &fc)| fc == NO_CELL && CellState::from_bits(s).cell_type() == CellType::Interior)
        .count()
}
