//!
//! Packed per-cell metadata. One 32-bit word per cell:
//!
//! ```text
//!  31..27   26..19     18..11    10          9         8..3        2..0
//! | free | timeclass | bcindex | norecoars | nosubdiv | denseflags | type |
//! ```
//!
//! Dense flag `b = 2*d + dir` is set when the neighbour in direction
//! (d, dir) exists and is refined. The all-zero word is an interior cell
//! with no dense neighbours, time class zero and no locks.
//!
use bitfield_struct::bitfield;

pub const TYPE_OFFSET: u32 = 0;
pub const TYPE_BITS: u32 = 3;
pub const DENSE_OFFSET: u32 = 3;
pub const DENSE_BITS: u32 = 6;
pub const NOSUBDIV_OFFSET: u32 = 9;
pub const NORECOARS_OFFSET: u32 = 10;
pub const BCINDEX_OFFSET: u32 = 11;
pub const BCINDEX_BITS: u32 = 8;
pub const TIMECLASS_OFFSET: u32 = 19;
pub const TIMECLASS_BITS: u32 = 8;

pub const DENSE_MASK: u32 = ((1 << DENSE_BITS) - 1) << DENSE_OFFSET;
pub const BCINDEX_MASK: u32 = ((1 << BCINDEX_BITS) - 1) << BCINDEX_OFFSET;
pub const TIMECLASS_MASK: u32 = ((1 << TIMECLASS_BITS) - 1) << TIMECLASS_OFFSET;

/// Number of distinct boundary condition slots addressable from a cell.
pub const MAX_N_BC: usize = 1 << BCINDEX_BITS;

#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
#[repr(u32)]
pub enum CellType
{
    Interior = 0,
    Ghost = 1,
    Dead = 2,
    Removed = 3,
}

impl CellType
{
    pub const fn into_bits(self) -> u32
    {
        self as u32
    }

    /// Codes 4..7 are unused; they decode as `Removed` so stray words are never live.
    pub const fn from_bits(value: u32) -> Self
    {
        match value
        {
            0 => Self::Interior,
            1 => Self::Ghost,
            2 => Self::Dead,
            _ => Self::Removed,
        }
    }

    #[inline]
    pub fn is_live(self) -> bool
    {
        matches!(self, Self::Interior | Self::Ghost)
    }
}

#[bitfield(u32)]
#[derive(PartialEq, Eq, Hash)]
pub struct CellState
{
    #[bits(3)]
    pub cell_type: CellType,
    #[bits(6)]
    pub dense_flags: u8,
    pub no_subdivide: bool,
    pub no_recoarsen: bool,
    #[bits(8)]
    pub bc_index: u8,
    #[bits(8)]
    pub timeclass: u8,
    #[bits(5)]
    __: u8,
}

#[inline(always)]
fn dense_bit(d: usize, dir: usize) -> u32
{
    debug_assert!(d < 3 && dir < 2);
    DENSE_OFFSET + (2 * d + dir) as u32
}

impl CellState
{
    #[inline]
    pub fn is_dense(self, d: usize, dir: usize) -> bool
    {
        self.into_bits() & (1 << dense_bit(d, dir)) != 0
    }

    #[inline]
    pub fn set_dense(self, d: usize, dir: usize, flag: bool) -> Self
    {
        let bit = 1 << dense_bit(d, dir);
        let word = self.into_bits();
        Self::from_bits(if flag { word | bit } else { word & !bit })
    }

    #[inline]
    pub fn any_neighbour_dense(self) -> bool
    {
        self.into_bits() & DENSE_MASK != 0
    }

    #[inline]
    pub fn clear_dense_flags(self) -> Self
    {
        Self::from_bits(self.into_bits() & !DENSE_MASK)
    }

    #[inline]
    pub fn may_subdivide(self) -> bool
    {
        !self.no_subdivide()
    }

    #[inline]
    pub fn may_recoarsen(self) -> bool
    {
        !self.no_recoarsen()
    }

    /// Stores the low 8 bits of `bcindex`; wider values are silently truncated.
    #[inline]
    pub fn with_bc_index_masked(self, bcindex: u32) -> Self
    {
        self.with_bc_index((bcindex & ((1 << BCINDEX_BITS) - 1)) as u8)
    }

    /// Stores the low 8 bits of `timeclass`; wider values are silently truncated.
    #[inline]
    pub fn with_timeclass_masked(self, timeclass: u32) -> Self
    {
        self.with_timeclass((timeclass & ((1 << TIMECLASS_BITS) - 1)) as u8)
    }

    /// Local time step as a fraction of the base step, 2^(-timeclass).
    #[inline]
    pub fn time_step_fraction(self) -> f64
    {
        (-(self.timeclass() as f64)).exp2()
    }
}

///
/// Address of one face of a cell: axis `d`, side `dir` (0 left, 1 right)
/// and sub-face `k` when the neighbour across the face is dense.
///
#[bitfield(u8)]
#[derive(PartialEq, Eq)]
pub struct SurfSpec
{
    #[bits(2)]
    pub d: u8,
    #[bits(1)]
    pub dir: u8,
    #[bits(2)]
    pub k: u8,
    #[bits(3)]
    __: u8,
}

impl SurfSpec
{
    pub fn face(d: usize, dir: usize, k: usize) -> Self
    {
        Self::new().with_d(d as u8).with_dir(dir as u8).with_k(k as u8)
    }

    /// Slot of this face in a per-cell table of `D << D` faces.
    #[inline]
    pub fn slot<const D: usize>(self) -> usize
    {
        ((2 * self.d() as usize + self.dir() as usize) << (D - 1)) + self.k() as usize
    }
}
