use std::sync::Arc;

use num_traits::Zero;
use parking_lot::Mutex;

use crate::distributed::layout::Layout;
use crate::distributed::world::PeContext;
use crate::errors::HCError;

/// One memory partition per PE. A PE touching another PE's partition is a remote access.
struct Partitions<T>
{
    parts: Vec<Mutex<Vec<T>>>,
}

impl<T: Copy + Zero> Partitions<T>
{
    fn allocate(npes: usize, locallen: usize) -> Result<Self, HCError>
    {
        let mut parts = Vec::new();
        parts.try_reserve_exact(npes).map_err(|_| HCError::AllocationFailed)?;
        for _ in 0..npes
        {
            let mut part = Vec::new();
            part.try_reserve_exact(locallen).map_err(|_| HCError::AllocationFailed)?;
            part.resize(locallen, T::zero());
            parts.push(Mutex::new(part));
        }
        Ok(Self { parts })
    }
}

///
/// A one-dimensional array whose global index space is spread over the
/// partitions of all PEs, see [`Layout`]. Every operation takes a global
/// index; accesses to indices owned by another PE block until the remote
/// partition is available and observe or publish a whole element at once.
///
/// There is no ordering between writes issued by different PEs; use
/// [`PeContext::barrier`] between phases when visibility matters.
///
pub struct DistributedArray<T>
{
    ctx: PeContext,
    layout: Layout,
    partitions: Arc<Partitions<T>>,
}

impl<T> DistributedArray<T>
where
    T: Copy + Zero + Send + 'static,
{
    ///
    /// Collective allocation of `length` elements, `chunksize` consecutive
    /// elements per PE before rotating. All elements start at zero.
    ///
    pub fn new(ctx: &PeContext, length: usize, chunksize: usize) -> Result<Self, HCError>
    {
        let layout = Layout::new(length, chunksize, ctx.npes());
        let partitions = ctx.symmetric_alloc(|| Partitions::allocate(layout.npes(), layout.locallen()))
            .inspect_err(|_| log::error!(
                "PE {}: allocation of {} elements ({} per PE) failed",
                ctx.mype(), layout.len(), layout.locallen()))?;
        log::debug!(
            "PE {}: distributed array of {} elements, chunksize {}, {} per PE",
            ctx.mype(), layout.len(), layout.chunksize(), layout.locallen());
        Ok(Self { ctx: ctx.clone(), layout, partitions })
    }

    #[inline]
    pub fn len(&self) -> usize
    {
        self.layout.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool
    {
        self.layout.is_empty()
    }

    #[inline]
    pub fn layout(&self) -> &Layout
    {
        &self.layout
    }

    #[inline]
    pub fn context(&self) -> &PeContext
    {
        &self.ctx
    }

    #[inline]
    pub fn is_local(&self, i: usize) -> bool
    {
        self.layout.pe(i) == self.ctx.mype()
    }

    /// Value at global index `i`, fetched from the owner PE if necessary.
    #[inline]
    pub fn read(&self, i: usize) -> T
    {
        debug_assert!(i < self.len(), "index {i} out of range");
        self.partitions.parts[self.layout.pe(i)].lock()[self.layout.local_index(i)]
    }

    #[inline]
    pub fn write(&self, i: usize, value: T)
    {
        debug_assert!(i < self.len(), "index {i} out of range");
        self.partitions.parts[self.layout.pe(i)].lock()[self.layout.local_index(i)] = value;
    }

    /// Fast path for indices owned by the calling PE.
    #[inline]
    pub fn local_get(&self, i: usize) -> T
    {
        debug_assert!(self.is_local(i), "PE {} does not own index {i}", self.ctx.mype());
        self.partitions.parts[self.ctx.mype()].lock()[self.layout.local_index(i)]
    }

    #[inline]
    pub fn local_put(&self, i: usize, value: T)
    {
        debug_assert!(self.is_local(i), "PE {} does not own index {i}", self.ctx.mype());
        self.partitions.parts[self.ctx.mype()].lock()[self.layout.local_index(i)] = value;
    }

    /// Replace the value at `i` and return the previous one, as one indivisible step.
    pub fn atomic_swap(&self, i: usize, value: T) -> T
    {
        debug_assert!(i < self.len(), "index {i} out of range");
        let mut part = self.partitions.parts[self.layout.pe(i)].lock();
        std::mem::replace(&mut part[self.layout.local_index(i)], value)
    }

    ///
    /// All of `i, i+stride, .., i+(count-1)*stride` must live on one PE.
    /// Returns that PE, or logs the offending index and fails.
    ///
    fn block_owner(&self, i: usize, count: usize, stride: usize) -> Result<usize, HCError>
    {
        let last = i + (count - 1) * stride;
        if last >= self.len()
        {
            log::error!("PE {}: block {i}..={last} exceeds array length {}", self.ctx.mype(), self.len());
            return Err(HCError::InvalidIndex);
        }
        let owner = self.layout.pe(i);
        for p in 1..count
        {
            let j = i + p * stride;
            if self.layout.pe(j) != owner
            {
                log::error!(
                    "PE {}: block transfer from {i} (stride {stride}, {count} elements) spans PEs {owner} and {}",
                    self.ctx.mype(), self.layout.pe(j));
                return Err(HCError::BlockSpansPes);
            }
        }
        Ok(owner)
    }

    ///
    /// Copy `count` elements starting at global index `i` with global stride
    /// `stride` into `out[0], out[out_stride], ..`. Nothing is copied when the
    /// block does not live on a single PE.
    ///
    pub fn block_get(&self, i: usize, count: usize, stride: usize, out: &mut [T], out_stride: usize) -> Result<(), HCError>
    {
        if count == 0
        {
            return Ok(());
        }
        debug_assert!(out.len() > (count - 1) * out_stride);
        let owner = self.block_owner(i, count, stride)?;
        let part = self.partitions.parts[owner].lock();
        for p in 0..count
        {
            out[p * out_stride] = part[self.layout.local_index(i + p * stride)];
        }
        Ok(())
    }

    pub fn block_put(&self, i: usize, count: usize, stride: usize, source: &[T], source_stride: usize) -> Result<(), HCError>
    {
        if count == 0
        {
            return Ok(());
        }
        debug_assert!(source.len() > (count - 1) * source_stride);
        let owner = self.block_owner(i, count, stride)?;
        let mut part = self.partitions.parts[owner].lock();
        for p in 0..count
        {
            part[self.layout.local_index(i + p * stride)] = source[p * source_stride];
        }
        Ok(())
    }

    /// Unit-stride block read.
    #[inline]
    pub fn get(&self, i: usize, out: &mut [T]) -> Result<(), HCError>
    {
        self.block_get(i, out.len(), 1, out, 1)
    }

    /// Unit-stride block write.
    #[inline]
    pub fn put(&self, i: usize, source: &[T]) -> Result<(), HCError>
    {
        self.block_put(i, source.len(), 1, source, 1)
    }

    ///
    /// `out[v * out_stride] = self[base + indices[v] * multiplier]` for every `v`.
    /// Elements are fetched one by one and may come from any PE.
    ///
    pub fn gather(&self, base: usize, indices: &[usize], multiplier: usize, out: &mut [T], out_stride: usize)
    {
        for (v, &iv) in indices.iter().enumerate()
        {
            out[v * out_stride] = self.read(base + iv * multiplier);
        }
    }

    pub fn scatter(&self, base: usize, indices: &[usize], multiplier: usize, source: &[T], source_stride: usize)
    {
        for (v, &iv) in indices.iter().enumerate()
        {
            self.write(base + iv * multiplier, source[v * source_stride]);
        }
    }

    /// Zero the calling PE's partition. Call on every PE to clear the whole array.
    pub fn zero(&self)
    {
        self.partitions.parts[self.ctx.mype()].lock().fill(T::zero());
    }
}

#[cfg(test)]
mod tests
{
    use super::*;
    use crate::distributed::world::World;

    #[test]
    fn storage_is_released_on_drop()
    {
        let weak = World::run(2, |ctx| {
            let mut weak = Vec::new();
            for _ in 0..50
            {
                let a = DistributedArray::<f64>::new(&ctx, 1 << 16, 1).unwrap();
                weak.push(Arc::downgrade(&a.partitions));
                ctx.barrier();
            }
            ctx.barrier();
            weak
        });
        assert!(weak.iter().flatten().all(|w| w.upgrade().is_none()));
    }

    #[test]
    fn single_pe_read_write()
    {
        let ctx = PeContext::single();
        let a = DistributedArray::<f64>::new(&ctx, 10, 1).unwrap();
        assert_eq!(a.len(), 10);
        a.write(3, 2.5);
        assert_eq!(a.read(3), 2.5);
        assert_eq!(a.local_get(3), 2.5);
        assert_eq!(a.atomic_swap(3, 1.0), 2.5);
        assert_eq!(a.read(3), 1.0);
        a.zero();
        assert_eq!(a.read(3), 0.0);
    }

    #[test]
    fn strided_block_transfer()
    {
        let ctx = PeContext::single();
        let a = DistributedArray::<u32>::new(&ctx, 16, 1).unwrap();
        let src = [1, 0, 2, 0, 3, 0];
        a.block_put(1, 3, 4, &src, 2).unwrap();
        assert_eq!((a.read(1), a.read(5), a.read(9)), (1, 2, 3));
        let mut out = [0; 3];
        a.block_get(1, 3, 4, &mut out, 1).unwrap();
        assert_eq!(out, [1, 2, 3]);
    }

    #[test]
    fn length_is_padded_to_whole_rounds()
    {
        let lens = World::run(3, |ctx| DistributedArray::<u8>::new(&ctx, 10, 1).unwrap().len());
        assert_eq!(lens, vec![12, 12, 12]);
    }

    #[test]
    fn block_spanning_two_pes_is_rejected()
    {
        let results = World::run(2, |ctx| {
            let a = DistributedArray::<u32>::new(&ctx, 8, 1).unwrap();
            ctx.barrier();
            let mut out = [7; 2];
            let r = a.block_get(2, 2, 1, &mut out, 1);
            (r, out)
        });
        for (r, out) in results
        {
            assert_eq!(r, Err(HCError::BlockSpansPes));
            assert_eq!(out, [7, 7]);
        }
    }

    #[test]
    fn remote_writes_visible_after_barrier()
    {
        let seen = World::run(2, |ctx| {
            let a = DistributedArray::<usize>::new(&ctx, 8, 1).unwrap();
            // each PE fills the other PE's slots
            let other = 1 - ctx.mype();
            for il in 0..a.layout().locallen()
            {
                a.write(a.layout().compose(il, other), 100 + ctx.mype());
            }
            ctx.barrier();
            (0..a.len()).filter(|&i| a.is_local(i)).map(|i| a.local_get(i)).collect::<Vec<_>>()
        });
        assert_eq!(seen[0], vec![101; 4]);
        assert_eq!(seen[1], vec![100; 4]);
    }

    #[test]
    fn gather_scatter_cross_pes()
    {
        let results = World::run(2, |ctx| {
            let a = DistributedArray::<i64>::new(&ctx, 12, 2).unwrap();
            if ctx.mype() == 0
            {
                a.scatter(1, &[0, 1, 2, 3, 4], 2, &[10, 11, 12, 13, 14], 1);
            }
            ctx.barrier();
            let mut out = vec![0; 5];
            a.gather(1, &[4, 3, 2, 1, 0], 2, &mut out, 1);
            out
        });
        assert_eq!(results[0], vec![14, 13, 12, 11, 10]);
        assert_eq!(results[1], results[0]);
    }

    #[test]
    fn atomic_swap_as_lock()
    {
        let counts = World::run(4, |ctx| {
            let lock = DistributedArray::<u32>::new(&ctx, 1, 1).unwrap();
            let counter = DistributedArray::<u64>::new(&ctx, 1, 1).unwrap();
            ctx.barrier();
            for _ in 0..100
            {
                while lock.atomic_swap(0, 1) != 0
                {
                    std::hint::spin_loop();
                }
                counter.write(0, counter.read(0) + 1);
                lock.write(0, 0);
            }
            ctx.barrier();
            counter.read(0)
        });
        assert!(counts.iter().all(|&c| c == 400));
    }
}
