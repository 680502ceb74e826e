//! Retired records and the batches in which they are handed from a thread to
//! a domain.
//!
//! # Retired
//!
//! A retired record is a record that has been unlinked from a shared data
//! structure but could still be accessed by other threads.
//! Each one is wrapped in a heap allocated [`Retired`] node that stores the
//! record's type erased address, the function for eventually reclaiming it and
//! an intrusive `next` link.
//! The link is owned by whichever list currently holds the node.
//!
//! # Retired Lists
//!
//! A [`RetiredList`] is a linked chain of such nodes together with its head,
//! its tail and the number of nodes.
//! It is the unit of ownership transfer between a thread's private list and
//! the domain: once a chain has been detached and packaged, the list owns
//! every node in it.

use core::fmt;
use core::marker::PhantomData;
use core::mem;
use core::ptr::{self, NonNull};

#[cfg(not(feature = "std"))]
use alloc::boxed::Box;

use crate::queue::RawNode;

////////////////////////////////////////////////////////////////////////////////////////////////////
// Retired
////////////////////////////////////////////////////////////////////////////////////////////////////

/// A node wrapping a retired record, which has not yet been reclaimed.
pub struct Retired {
    record: NonNull<()>,
    reclaim: unsafe fn(NonNull<()>),
    next: *mut Retired,
}

/********** impl inherent *************************************************************************/

impl Retired {
    /// Creates a new node for a record that was allocated through a `Box` and
    /// will be dropped and de-allocated once it is reclaimed.
    ///
    /// # Safety
    ///
    /// The caller has to ensure `record` has been obtained by
    /// `Box::into_raw`, is no longer reachable from any shared memory location
    /// and is retired only once.
    /// The record will be dropped at an unspecified time, which means it may
    /// potentially outlive any (non-static) lifetime, so the type's `Drop`
    /// implementation must not access any non-static references.
    #[inline]
    pub unsafe fn new<T>(record: NonNull<T>) -> Box<Self> {
        Self::with_reclaim(record.cast(), reclaim_box::<T>)
    }

    /// Creates a new node for a record that is reclaimed by calling `reclaim`
    /// with its address.
    ///
    /// # Safety
    ///
    /// The caller has to ensure `record` is no longer reachable from any
    /// shared memory location, is retired only once and that calling
    /// `reclaim` with it is sound at any time after it is no longer
    /// protected.
    #[inline]
    pub unsafe fn with_reclaim(record: NonNull<()>, reclaim: unsafe fn(NonNull<()>)) -> Box<Self> {
        Box::new(Self { record, reclaim, next: ptr::null_mut() })
    }

    /// Gets the memory address of the retired record.
    #[inline]
    pub fn address(&self) -> usize {
        self.record.as_ptr() as usize
    }

    /// Reclaims the record and de-allocates the node.
    ///
    /// # Safety
    ///
    /// `node` must be a valid node, which is not part of any list anymore and
    /// whose record is not protected by any hazard record.
    #[inline]
    pub(crate) unsafe fn reclaim(node: NonNull<Self>) {
        let Retired { record, reclaim, .. } = *Box::from_raw(node.as_ptr());
        reclaim(record);
    }
}

/********** impl Debug ****************************************************************************/

impl fmt::Debug for Retired {
    #[inline]
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("Retired").field("address", &(self.address() as *const ())).finish()
    }
}

/********** impl RawNode **************************************************************************/

impl RawNode for Retired {
    #[inline]
    unsafe fn next(node: *mut Self) -> *mut Self {
        (*node).next
    }

    #[inline]
    unsafe fn set_next(node: *mut Self, next: *mut Self) {
        (*node).next = next;
    }
}

unsafe fn reclaim_box<T>(record: NonNull<()>) {
    mem::drop(Box::from_raw(record.cast::<T>().as_ptr()));
}

////////////////////////////////////////////////////////////////////////////////////////////////////
// RetiredList
////////////////////////////////////////////////////////////////////////////////////////////////////

/// An owned, non-empty chain of retired records.
///
/// Dropping a `RetiredList` reclaims all of its records, so only a domain that
/// has determined that none of them are protected anymore may do so.
#[derive(Debug)]
pub struct RetiredList {
    head: NonNull<Retired>,
    tail: NonNull<Retired>,
    count: usize,
}

/********** impl inherent *************************************************************************/

impl RetiredList {
    /// Wraps a single retired record in a list of length one.
    #[inline]
    pub fn single(retired: Box<Retired>) -> Self {
        let node = NonNull::from(Box::leak(retired));
        unsafe { Retired::set_next(node.as_ptr(), ptr::null_mut()) };
        Self { head: node, tail: node, count: 1 }
    }

    /// Packages the chain starting at `head` and ending at `tail`.
    ///
    /// # Safety
    ///
    /// `head` and `tail` must be the first and last node of a consecutively
    /// linked chain, which is not accessed by any other means afterwards.
    /// `count` is informational and should equal the number of nodes.
    #[inline]
    pub unsafe fn from_raw_parts(head: NonNull<Retired>, tail: NonNull<Retired>, count: usize) -> Self {
        Self { head, tail, count }
    }

    /// Consumes the list and returns its head, its tail and its count.
    ///
    /// The caller becomes responsible for eventually reclaiming all records.
    #[inline]
    pub fn into_raw_parts(self) -> (NonNull<Retired>, NonNull<Retired>, usize) {
        let parts = (self.head, self.tail, self.count);
        mem::forget(self);
        parts
    }

    /// Returns the number of records in the list.
    #[inline]
    pub fn len(&self) -> usize {
        self.count
    }

    /// Returns an iterator over all retired records from head to tail.
    #[inline]
    pub fn iter(&self) -> Iter<'_> {
        Iter { curr: Some(self.head), tail: self.tail, _marker: PhantomData }
    }
}

/********** impl Drop *****************************************************************************/

impl Drop for RetiredList {
    #[inline(never)]
    fn drop(&mut self) {
        let mut curr = Some(self.head);
        while let Some(node) = curr {
            curr = if node == self.tail {
                None
            } else {
                NonNull::new(unsafe { Retired::next(node.as_ptr()) })
            };

            unsafe { Retired::reclaim(node) };
        }
    }
}

////////////////////////////////////////////////////////////////////////////////////////////////////
// Iter
////////////////////////////////////////////////////////////////////////////////////////////////////

/// An iterator over the records of a [`RetiredList`].
#[derive(Debug)]
pub struct Iter<'a> {
    curr: Option<NonNull<Retired>>,
    tail: NonNull<Retired>,
    _marker: PhantomData<&'a Retired>,
}

impl<'a> Iterator for Iter<'a> {
    type Item = &'a Retired;

    #[inline]
    fn next(&mut self) -> Option<Self::Item> {
        let node = self.curr.take()?;
        if node != self.tail {
            self.curr = NonNull::new(unsafe { Retired::next(node.as_ptr()) });
        }

        Some(unsafe { &*node.as_ptr() })
    }
}

#[cfg(test)]
mod tests {
    use std::ptr::NonNull;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    use crate::queue::RawNode;

    use super::{Retired, RetiredList};

    struct DropCount(Arc<AtomicUsize>);
    impl Drop for DropCount {
        fn drop(&mut self) {
            self.0.fetch_add(1, Ordering::Relaxed);
        }
    }

    fn retired(count: &Arc<AtomicUsize>) -> Box<Retired> {
        let record = Box::into_raw(Box::new(DropCount(Arc::clone(count))));
        unsafe { Retired::new(NonNull::new_unchecked(record)) }
    }

    #[test]
    fn single() {
        let count = Arc::new(AtomicUsize::new(0));
        let node = retired(&count);
        let address = node.address();

        let list = RetiredList::single(node);
        assert_eq!(list.len(), 1);
        assert_eq!(list.iter().map(Retired::address).collect::<Vec<_>>(), vec![address]);

        drop(list);
        assert_eq!(count.load(Ordering::Relaxed), 1);
    }

    #[test]
    fn chain_drop_reclaims_all() {
        let count = Arc::new(AtomicUsize::new(0));
        let nodes: Vec<_> =
            (0..4).map(|_| NonNull::from(Box::leak(retired(&count)))).collect();
        for pair in nodes.windows(2) {
            unsafe { Retired::set_next(pair[0].as_ptr(), pair[1].as_ptr()) };
        }

        let list = unsafe { RetiredList::from_raw_parts(nodes[0], nodes[3], 4) };
        let addresses: Vec<_> = list.iter().map(Retired::address).collect();
        let expected: Vec<_> = nodes.iter().map(|node| unsafe { node.as_ref() }.address()).collect();
        assert_eq!(addresses, expected);

        drop(list);
        assert_eq!(count.load(Ordering::Relaxed), 4);
    }

    #[test]
    fn custom_reclaim() {
        static RECLAIMED: AtomicUsize = AtomicUsize::new(0);
        unsafe fn reclaim(record: NonNull<()>) {
            RECLAIMED.store(record.as_ptr() as usize, Ordering::Relaxed);
        }

        let value = 7u64;
        let record = NonNull::from(&value).cast();
        drop(RetiredList::single(unsafe { Retired::with_reclaim(record, reclaim) }));
        assert_eq!(RECLAIMED.load(Ordering::Relaxed), &value as *const u64 as usize);
    }

    #[test]
    fn into_raw_parts_transfers_ownership() {
        let count = Arc::new(AtomicUsize::new(0));
        let list = RetiredList::single(retired(&count));
        let (head, tail, len) = list.into_raw_parts();
        assert_eq!((head, len), (tail, 1));
        assert_eq!(count.load(Ordering::Relaxed), 0);

        drop(unsafe { RetiredList::from_raw_parts(head, tail, len) });
        assert_eq!(count.load(Ordering::Relaxed), 1);
    }
}
