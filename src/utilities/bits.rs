//! Bit helpers used for child and neighbour addressing. A child code has one
//! bit per axis; bit `d` set means the child sits in the upper half along `d`.

/// Return the d'th bit of `ch`.
#[inline(always)]
pub fn get_bit(d: usize, ch: usize) -> bool
{
    ch & (1 << d) != 0
}

#[inline(always)]
pub fn invert_bit(d: usize, ch: usize) -> usize
{
    ch ^ (1 << d)
}

#[inline(always)]
pub fn set_bit(d: usize, ch: usize) -> usize
{
    ch | (1 << d)
}

#[inline(always)]
pub fn clear_bit(d: usize, ch: usize) -> usize
{
    ch & !(1 << d)
}

///
/// Make room for a new bit at position `n` of `ch` and give it value `b`.
/// Bits below `n` stay put, bits at `n` and above move up by one.
///
#[inline(always)]
pub fn insert_bit(n: usize, b: bool, ch: usize) -> usize
{
    let highmask = usize::MAX << n;
    let lowmask = !highmask;
    ((ch & highmask) << 1) | ((b as usize) << n) | (ch & lowmask)
}

///
/// Child code of a dense neighbour facing us across axis `d`, where `k` is the
/// (D-1)-bit code of the child within that face. Looking left (`dir == 0`) we
/// see the neighbour's upper children, looking right its lower ones.
///
#[inline(always)]
pub fn neighbour_child(d: usize, dir: usize, k: usize) -> usize
{
    insert_bit(d, dir == 0, k)
}
