///
/// Placement of a global index space over `npes` partitions. Runs of
/// `chunksize` consecutive global indices live on the same PE, after which
/// placement rotates to the next PE. With `chunksize == 1` global index `i`
/// sits at local slot `i / npes` on PE `i % npes`.
///
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct Layout
{
    len: usize,
    chunksize: usize,
    locallen: usize,
    npes: usize,
}

impl Layout
{
    ///
    /// Layout for at least `length` elements. The per-PE length is rounded up
    /// to whole chunks so every index below `length` has a local slot; the
    /// resulting `len()` is always `locallen() * npes`.
    ///
    pub fn new(length: usize, chunksize: usize, npes: usize) -> Self
    {
        debug_assert!(npes > 0);
        let chunksize = chunksize.max(1);
        let per_round = chunksize * npes;
        let rounds = length.div_ceil(per_round);
        let locallen = rounds * chunksize;
        Self { len: locallen * npes, chunksize, locallen, npes }
    }

    #[inline(always)]
    pub fn len(&self) -> usize
    {
        self.len
    }

    #[inline(always)]
    pub fn is_empty(&self) -> bool
    {
        self.len == 0
    }

    #[inline(always)]
    pub fn locallen(&self) -> usize
    {
        self.locallen
    }

    #[inline(always)]
    pub fn chunksize(&self) -> usize
    {
        self.chunksize
    }

    #[inline(always)]
    pub fn npes(&self) -> usize
    {
        self.npes
    }

    /// Owner PE of global index `i`.
    #[inline(always)]
    pub fn pe(&self, i: usize) -> usize
    {
        if self.chunksize == 1
        {
            i % self.npes
        }
        else
        {
            (i / self.chunksize) % self.npes
        }
    }

    /// Local slot of global index `i` on its owner.
    #[inline(always)]
    pub fn local_index(&self, i: usize) -> usize
    {
        if self.chunksize == 1
        {
            i / self.npes
        }
        else
        {
            (i / (self.npes * self.chunksize)) * self.chunksize + i % self.chunksize
        }
    }

    /// Global index of local slot `il` on PE `pe`.
    #[inline(always)]
    pub fn compose(&self, il: usize, pe: usize) -> usize
    {
        if self.chunksize == 1
        {
            il * self.npes + pe
        }
        else
        {
            (il / self.chunksize) * (self.npes * self.chunksize) + il % self.chunksize + self.chunksize * pe
        }
    }

    /// First global index owned by `pe`.
    #[inline]
    pub fn first_owned(&self, pe: usize) -> usize
    {
        self.compose(0, pe)
    }

    /// The owned global index following `i`, on the same PE as `i`.
    #[inline]
    pub fn next_owned(&self, i: usize) -> usize
    {
        if (i + 1) % self.chunksize != 0
        {
            i + 1
        }
        else
        {
            i + 1 + (self.npes - 1) * self.chunksize
        }
    }
}

#[cfg(test)]
mod tests
{
    use super::*;

    #[test]
    fn round_robin_placement()
    {
        let layout = Layout::new(10, 1, 3);
        assert_eq!(layout.len(), 12);
        assert_eq!(layout.locallen(), 4);
        assert_eq!((layout.pe(7), layout.local_index(7)), (1, 2));
        assert_eq!(layout.compose(2, 1), 7);
    }

    #[test]
    fn chunked_placement()
    {
        let layout = Layout::new(10, 4, 2);
        // 0..4 -> pe0, 4..8 -> pe1, 8..12 -> pe0
        assert_eq!(layout.locallen(), 8);
        assert_eq!(layout.len(), 16);
        assert_eq!((layout.pe(9), layout.local_index(9)), (0, 5));
        assert_eq!((layout.pe(5), layout.local_index(5)), (1, 1));
        assert_eq!(layout.compose(5, 0), 9);
    }

    #[test]
    fn owned_walk_visits_only_own_indices()
    {
        let layout = Layout::new(40, 3, 2);
        let mut i = layout.first_owned(1);
        let mut visited = Vec::new();
        while i < 20
        {
            assert_eq!(layout.pe(i), 1);
            visited.push(i);
            i = layout.next_owned(i);
        }
        assert_eq!(visited, vec![3, 4, 5, 9, 10, 11, 15, 16, 17]);
    }

    #[test]
    fn empty_layout()
    {
        let layout = Layout::new(0, 1, 4);
        assert!(layout.is_empty());
        assert_eq!(layout.locallen(), 0);
    }
}
