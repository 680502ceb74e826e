use core::iter::FusedIterator;
use core::mem;
use core::ptr;
use core::sync::atomic::{AtomicPtr, AtomicUsize, Ordering};

#[cfg(not(feature = "std"))]
use alloc::boxed::Box;

use crossbeam_utils::CachePadded;

use crate::hazard::HazardRecord;

/// Append-only linked list of all hazard records allocated by a domain.
#[derive(Debug, Default)]
pub(crate) struct HazardList {
    head: AtomicPtr<HazardNode>,
    count: AtomicUsize,
}

impl HazardList {
    /// Creates a new empty list.
    #[inline]
    pub const fn new() -> Self {
        Self { head: AtomicPtr::new(ptr::null_mut()), count: AtomicUsize::new(0) }
    }

    /// Returns the number of records that have been allocated so far.
    #[inline]
    pub fn count(&self) -> usize {
        self.count.load(Ordering::Relaxed)
    }

    #[inline]
    pub fn iter(&self) -> Iter<'_> {
        // (LIS:1) this `Acquire` load synchronizes-with the `Release` CAS (LIS:2)
        Iter { current: unsafe { self.head.load(Ordering::Acquire).as_ref() } }
    }

    /// Acquires an inactive record or allocates a new one, if all records
    /// are currently in use.
    #[inline]
    pub fn acquire(&self) -> &HazardRecord {
        let mut prev = &self.head;
        let mut curr = self.head.load(Ordering::Acquire);

        while let Some(node) = unsafe { curr.as_ref() } {
            if node.record.try_acquire() {
                return &*node.record;
            }

            prev = &node.next;
            curr = node.next.load(Ordering::Acquire);
        }

        self.insert_back(prev)
    }

    #[cold]
    fn insert_back(&self, mut tail: &AtomicPtr<HazardNode>) -> &HazardRecord {
        let node = Box::leak(Box::new(HazardNode {
            record: CachePadded::new(HazardRecord::new_active()),
            next: CachePadded::new(AtomicPtr::default()),
        }));

        self.count.fetch_add(1, Ordering::Relaxed);

        loop {
            // (LIS:2) this `Release` CAS ensures the previous allocation (write) is published and
            // synchronizes-with all `Acquire` loads on the same `next` field
            let res = tail
                .compare_exchange_weak(ptr::null_mut(), node, Ordering::Release, Ordering::Acquire)
                .map_err(|ptr| unsafe { ptr.as_ref() });

            match res {
                Ok(_) => return &*node.record,
                Err(Some(curr)) => tail = &curr.next,
                Err(None) => {}
            }
        }
    }
}

impl Drop for HazardList {
    #[inline]
    fn drop(&mut self) {
        // `Relaxed` ordering is sufficient here because no other threads have access during `drop`
        let mut curr = self.head.load(Ordering::Relaxed);
        while let Some(node) = unsafe { curr.as_mut() } {
            curr = node.next.load(Ordering::Relaxed);
            mem::drop(unsafe { Box::from_raw(node) });
        }
    }
}

////////////////////////////////////////////////////////////////////////////////////////////////////
// Iter
////////////////////////////////////////////////////////////////////////////////////////////////////

pub(crate) struct Iter<'a> {
    current: Option<&'a HazardNode>,
}

impl<'a> Iterator for Iter<'a> {
    type Item = &'a HazardRecord;

    #[inline]
    fn next(&mut self) -> Option<Self::Item> {
        let next = self.current.take();
        if let Some(node) = next {
            // (LIS:3) this `Acquire` load synchronizes-with the `Release` CAS (LIS:2)
            self.current = unsafe { node.next.load(Ordering::Acquire).as_ref() };
        }

        next.map(|node| &*node.record)
    }
}

impl FusedIterator for Iter<'_> {}

////////////////////////////////////////////////////////////////////////////////////////////////////
// HazardNode
////////////////////////////////////////////////////////////////////////////////////////////////////

#[derive(Debug)]
struct HazardNode {
    record: CachePadded<HazardRecord>,
    next: CachePadded<AtomicPtr<HazardNode>>,
}
