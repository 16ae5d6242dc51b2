///
/// Number of hash buckets. Prime, so that power-of-two strides in the
/// quantized coordinates spread over all buckets.
///
pub const INTPOL_CACHE_LEN: usize = 1223;

pub const DEFAULT_NBITS: u32 = 10;

struct CacheEntry<T>
{
    ix: i32,
    iy: i32,
    value: T,
}

///
/// Memoizes interpolated values by quantized 2D position.
///
/// Entries are never evicted one by one: the cache is only valid while the
/// underlying field does not change, and must be [`clear`](Self::clear)ed
/// whenever it does. Storing the same position twice keeps both entries;
/// lookups return the most recent one.
///
pub struct IntpolCache<T>
{
    nstores: usize,
    nreads: usize,
    nhits: usize,
    dx: f64,
    x0: f64,
    y0: f64,
    nbits: u32,
    buckets: Vec<Vec<CacheEntry<T>>>,
}

impl<T: Clone> IntpolCache<T>
{
    pub fn new(dx: f64, x0: f64, y0: f64) -> Self
    {
        Self::with_nbits(dx, x0, y0, DEFAULT_NBITS)
    }

    /// `nbits` sub-cell bits are kept per axis when quantizing a position.
    pub fn with_nbits(dx: f64, x0: f64, y0: f64, nbits: u32) -> Self
    {
        debug_assert!(dx > 0.0);
        let buckets = (0..INTPOL_CACHE_LEN).map(|_| Vec::new()).collect();
        Self { nstores: 0, nreads: 0, nhits: 0, dx, x0, y0, nbits, buckets }
    }

    #[inline]
    pub fn quantize(&self, x: f64, y: f64) -> (i32, i32)
    {
        let scale = (1_u64 << self.nbits) as f64;
        let ix = (scale * ((x - self.x0) / self.dx) + 0.5).floor() as i32;
        let iy = (scale * ((y - self.y0) / self.dx) + 0.5).floor() as i32;
        (ix, iy)
    }

    #[inline]
    pub fn hashkey(ix: i32, iy: i32) -> usize
    {
        ((ix as u32).wrapping_add((iy as u32) << 15) % INTPOL_CACHE_LEN as u32) as usize
    }

    pub fn store(&mut self, value: T, x: f64, y: f64)
    {
        let (ix, iy) = self.quantize(x, y);
        self.buckets[Self::hashkey(ix, iy)].push(CacheEntry { ix, iy, value });
        self.nstores += 1;
    }

    pub fn read(&mut self, x: f64, y: f64) -> Option<T>
    {
        let (ix, iy) = self.quantize(x, y);
        self.nreads += 1;
        let found = self.buckets[Self::hashkey(ix, iy)]
            .iter()
            .rev()
            .find(|e| e.ix == ix && e.iy == iy)
            .map(|e| e.value.clone());
        if found.is_some()
        {
            self.nhits += 1;
        }
        found
    }

    pub fn hit_ratio(&self) -> f64
    {
        if self.nreads == 0
        {
            0.0
        }
        else
        {
            self.nhits as f64 / self.nreads as f64
        }
    }

    pub fn clear(&mut self)
    {
        for bucket in self.buckets.iter_mut()
        {
            bucket.clear();
        }
    }

    /// Number of entries currently held, duplicates included.
    pub fn len(&self) -> usize
    {
        self.buckets.iter().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool
    {
        self.buckets.iter().all(Vec::is_empty)
    }

    pub fn longest_chain(&self) -> usize
    {
        self.buckets.iter().map(Vec::len).max().unwrap_or(0)
    }

    pub fn nstores(&self) -> usize
    {
        self.nstores
    }

    pub fn nreads(&self) -> usize
    {
        self.nreads
    }

    pub fn nhits(&self) -> usize
    {
        self.nhits
    }

    pub fn print_stats(&self)
    {
        log::info!(
            "interpolation cache: {} stores, {} reads, hit ratio {:.3}, {} entries, longest chain {}",
            self.nstores, self.nreads, self.hit_ratio(), self.len(), self.longest_chain());
    }
}

#[cfg(test)]
mod tests
{
    use super::*;

    #[test]
    fn store_then_read()
    {
        let mut cache = IntpolCache::new(0.5, -1.0, -1.0);
        assert_eq!(cache.read(0.3, 0.7), None);
        cache.store(4.0, 0.3, 0.7);
        assert_eq!(cache.read(0.3, 0.7), Some(4.0));
        assert_eq!(cache.nstores(), 1);
        assert_eq!(cache.nreads(), 2);
        assert_eq!(cache.nhits(), 1);
    }

    #[test]
    fn hit_ratio_counts_every_read()
    {
        let mut cache = IntpolCache::new(1.0, 0.0, 0.0);
        assert_eq!(cache.hit_ratio(), 0.0);
        cache.store(1.0, 2.0, 3.0);
        for _ in 0..3
        {
            assert_eq!(cache.read(2.0, 3.0), Some(1.0));
        }
        assert_eq!(cache.hit_ratio(), 1.0);
        cache.read(9.0, 9.0);
        assert_eq!(cache.hit_ratio(), 0.75);
    }

    #[test]
    fn latest_store_wins()
    {
        let mut cache = IntpolCache::new(1.0, 0.0, 0.0);
        cache.store(1, 0.25, 0.25);
        cache.store(2, 0.25, 0.25);
        assert_eq!(cache.len(), 2);
        assert_eq!(cache.read(0.25, 0.25), Some(2));
    }

    #[test]
    fn colliding_keys_are_told_apart()
    {
        let mut cache = IntpolCache::with_nbits(1.0, 0.0, 0.0, 0);
        // (0,0) and (1223,0) share bucket 0
        assert_eq!(IntpolCache::<u8>::hashkey(0, 0), IntpolCache::<u8>::hashkey(1223, 0));
        cache.store(1_u8, 0.0, 0.0);
        cache.store(2_u8, 1223.0, 0.0);
        assert_eq!(cache.longest_chain(), 2);
        assert_eq!(cache.read(0.0, 0.0), Some(1));
        assert_eq!(cache.read(1223.0, 0.0), Some(2));
        assert_eq!(cache.read(2446.0, 0.0), None);
    }

    #[test]
    fn quantization_is_deterministic()
    {
        let cache = IntpolCache::<f64>::with_nbits(0.1, 0.0, 0.0, 4);
        assert_eq!(cache.quantize(0.33, 0.71), cache.quantize(0.33, 0.71));
        // 16 * 3.3 = 52.8 -> 53
        assert_eq!(cache.quantize(0.33, 0.0), (53, 0));
    }

    #[test]
    fn clear_drops_everything()
    {
        let mut cache = IntpolCache::new(1.0, 0.0, 0.0);
        cache.store(1.0, 0.0, 0.0);
        cache.clear();
        assert!(cache.is_empty());
        assert_eq!(cache.read(0.0, 0.0), None);
    }
}
