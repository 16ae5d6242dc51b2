//!
//! The fabric shared by all processing elements (PEs) of one run.
//!
//! Every PE executes the same program on its own thread and carries a
//! [`PeContext`] naming its rank. Symmetric allocations behave like a
//! shmalloc heap: the n-th allocation made by each PE resolves to the same
//! shared object, so allocations are collective and must be issued in the
//! same order on every PE. The heap only brokers the hand-over: once every
//! PE has its handle the slot is dropped, and the object lives exactly as
//! long as those handles.
//!
use std::any::Any;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Barrier};

use parking_lot::Mutex;
use rustc_hash::FxHashMap;

use crate::errors::HCError;

type SymmetricObject = Arc<dyn Any + Send + Sync>;

/// An allocation still waiting for `remaining` PEs to pick it up.
struct PendingObject
{
    object: SymmetricObject,
    remaining: usize,
}

#[derive(Default)]
struct SymmetricHeap
{
    /// Allocations created so far; the next one gets this sequence number.
    created: usize,
    pending: FxHashMap<usize, PendingObject>,
}

pub struct World
{
    npes: usize,
    barrier: Barrier,
    heap: Mutex<SymmetricHeap>,
}

impl World
{
    fn new(npes: usize) -> Self
    {
        assert!(npes > 0, "a run needs at least one PE");
        Self { npes, barrier: Barrier::new(npes), heap: Mutex::new(SymmetricHeap::default()) }
    }

    #[inline]
    pub fn npes(&self) -> usize
    {
        self.npes
    }

    ///
    /// Run `f` on `npes` PEs concurrently and collect the per-PE results in
    /// rank order. A panic on any PE is propagated to the caller.
    ///
    pub fn run<R, F>(npes: usize, f: F) -> Vec<R>
    where
        R: Send,
        F: Fn(PeContext) -> R + Sync,
    {
        let world = Arc::new(World::new(npes));
        log::debug!("starting SPMD run on {npes} PEs");
        std::thread::scope(|s| {
            let handles: Vec<_> = (0..npes)
                .map(|mype| {
                    let ctx = PeContext::new(world.clone(), mype);
                    let f = &f;
                    s.spawn(move || f(ctx))
                })
                .collect();
            handles
                .into_iter()
                .map(|h| h.join().unwrap_or_else(|e| std::panic::resume_unwind(e)))
                .collect()
        })
    }
}

///
/// Rank of the calling PE plus a handle on the shared fabric. Passed to
/// every distributed component at construction.
///
#[derive(Clone)]
pub struct PeContext
{
    world: Arc<World>,
    mype: usize,
    alloc_seq: Arc<AtomicUsize>,
}

impl PeContext
{
    fn new(world: Arc<World>, mype: usize) -> Self
    {
        Self { world, mype, alloc_seq: Arc::new(AtomicUsize::new(0)) }
    }

    /// A run with a single PE.
    pub fn single() -> Self
    {
        Self::new(Arc::new(World::new(1)), 0)
    }

    #[inline(always)]
    pub fn npes(&self) -> usize
    {
        self.world.npes
    }

    #[inline(always)]
    pub fn mype(&self) -> usize
    {
        self.mype
    }

    /// Block until every PE has reached the same barrier.
    pub fn barrier(&self)
    {
        self.world.barrier.wait();
    }

    ///
    /// Collective allocation. The first PE to reach allocation number n runs
    /// `make`; every other PE receives the object it created. The object is
    /// freed when the last PE drops its handle.
    ///
    pub(crate) fn symmetric_alloc<T, F>(&self, make: F) -> Result<Arc<T>, HCError>
    where
        T: Any + Send + Sync,
        F: FnOnce() -> Result<T, HCError>,
    {
        let seq = self.alloc_seq.fetch_add(1, Ordering::Relaxed);
        let mut heap = self.world.heap.lock();
        if seq < heap.created
        {
            let Some(slot) = heap.pending.get_mut(&seq)
            else
            {
                log::error!("PE {}: symmetric allocation {seq} was already claimed by every PE", self.mype);
                return Err(HCError::AllocationFailed);
            };
            let object = slot.object.clone();
            slot.remaining -= 1;
            if slot.remaining == 0
            {
                heap.pending.remove(&seq);
            }
            return object.downcast::<T>().map_err(|_| {
                log::error!("PE {}: symmetric allocation {seq} has a different type on another PE", self.mype);
                HCError::AllocationFailed
            });
        }
        debug_assert_eq!(heap.created, seq);
        let object = Arc::new(make()?);
        heap.created += 1;
        let remaining = self.world.npes - 1;
        if remaining > 0
        {
            heap.pending.insert(seq, PendingObject { object: object.clone(), remaining });
        }
        Ok(object)
    }

    /// Allocations created but not yet picked up by every PE.
    #[cfg(test)]
    fn pending_allocations(&self) -> usize
    {
        self.world.heap.lock().pending.len()
    }
}

#[cfg(test)]
mod tests
{
    use super::*;

    #[test]
    fn ranks_are_distinct_and_ordered()
    {
        let ranks = World::run(4, |ctx| (ctx.mype(), ctx.npes()));
        assert_eq!(ranks, vec![(0, 4), (1, 4), (2, 4), (3, 4)]);
    }

    #[test]
    fn symmetric_allocations_are_shared()
    {
        let ptrs = World::run(3, |ctx| {
            let a = ctx.symmetric_alloc(|| Ok(Mutex::new(0_u32))).unwrap();
            *a.lock() += 1;
            ctx.barrier();
            let total = *a.lock();
            (Arc::as_ptr(&a) as usize, total)
        });
        assert!(ptrs.iter().all(|&(p, total)| p == ptrs[0].0 && total == 3));
    }

    #[test]
    fn dropped_allocations_are_freed()
    {
        let ctx = PeContext::single();
        let mut handles = Vec::new();
        for n in 0..200_u32
        {
            let a = ctx.symmetric_alloc(|| Ok(vec![n; 1024])).unwrap();
            handles.push(Arc::downgrade(&a));
        }
        assert_eq!(ctx.pending_allocations(), 0);
        assert!(handles.iter().all(|w| w.upgrade().is_none()));

        let freed = World::run(3, |ctx| {
            let a = ctx.symmetric_alloc(|| Ok(Mutex::new(0_u32))).unwrap();
            let w = Arc::downgrade(&a);
            ctx.barrier();
            assert_eq!(ctx.pending_allocations(), 0);
            drop(a);
            ctx.barrier();
            w.upgrade().is_none()
        });
        assert_eq!(freed, vec![true; 3]);
    }

    #[test]
    fn single_pe_context()
    {
        let ctx = PeContext::single();
        assert_eq!((ctx.mype(), ctx.npes()), (0, 1));
        ctx.barrier();
    }
}
