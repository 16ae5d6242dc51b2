use std::ops::Range;

///
/// Split the iteration range `a..b` as evenly as possible over `npes`
/// processors and return the share of processor `mype`. Shares are
/// contiguous, ordered by rank, and differ in length by at most one.
///
pub fn block_work_divide(a: usize, b: usize, npes: usize, mype: usize) -> Range<usize>
{
    debug_assert!(mype < npes);
    if b <= a
    {
        return a..a;
    }
    let n = b - a;
    let q = n / npes;
    let r = n % npes;
    let start = a + mype * q + mype.min(r);
    let len = q + usize::from(mype < r);
    start..start + len
}

#[cfg(test)]
mod tests
{
    use super::*;

    #[test]
    fn covers_range_in_rank_order()
    {
        let parts: Vec<_> = (0..4).map(|pe| block_work_divide(3, 13, 4, pe)).collect();
        assert_eq!(parts, vec![3..6, 6..9, 9..11, 11..13]);
    }

    #[test]
    fn more_pes_than_work()
    {
        let parts: Vec<_> = (0..5).map(|pe| block_work_divide(0, 2, 5, pe)).collect();
        assert_eq!(parts, vec![0..1, 1..2, 2..2, 2..2, 2..2]);
    }

    #[test]
    fn empty_range()
    {
        assert!(block_work_divide(7, 7, 3, 1).is_empty());
        assert!(block_work_divide(7, 2, 3, 1).is_empty());
    }
}
