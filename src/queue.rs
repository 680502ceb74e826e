//! A simple lock-free stack that uses *compare-and-swap* to insert chains of
//! elements at the head and *swap* (exchange) to consume all elements at once,
//! thereby not requiring any dedicated memory reclamation mechanism.

use core::ptr;
use core::sync::atomic::{AtomicPtr, Ordering};

////////////////////////////////////////////////////////////////////////////////////////////////////
// RawNode (trait)
////////////////////////////////////////////////////////////////////////////////////////////////////

/// A trait for node types that contain `next` pointers and can be accessed
/// through raw pointers.
pub(crate) trait RawNode {
    /// Returns the `node`'s next pointer.
    ///
    /// # Safety
    ///
    /// The caller has to ensure `node` is a valid pointer to a mutable node and
    /// that the aliasing rules are not violated.
    unsafe fn next(node: *mut Self) -> *mut Self;

    /// Sets the `node`'s next pointer to `next`.
    ///
    /// # Safety
    ///
    /// The caller has to ensure `node` is a valid pointer to a mutable node and
    /// that the aliasing rules are not violated.
    unsafe fn set_next(node: *mut Self, next: *mut Self);
}

////////////////////////////////////////////////////////////////////////////////////////////////////
// RawQueue
////////////////////////////////////////////////////////////////////////////////////////////////////

/// A concurrent linked-list based queue operating on raw pointers.
///
/// Elements are inserted at the front and can only be removed all at once by
/// returning the first node which contains a link to the next node and so on
/// and switching the queue to empty.
#[derive(Debug, Default)]
pub(crate) struct RawQueue<N> {
    head: AtomicPtr<N>,
}

/********** impl inherent *************************************************************************/

impl<N> RawQueue<N> {
    /// Creates a new empty `RawQueue`.
    #[inline]
    pub const fn new() -> Self {
        Self { head: AtomicPtr::new(ptr::null_mut()) }
    }
}

impl<N: RawNode> RawQueue<N> {
    /// Returns `true` if the queue is empty.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.head.load(Ordering::Relaxed).is_null()
    }

    /// Pushes the sub-list formed by `first` and `last` to the head of the
    /// queue
    ///
    /// # Safety
    ///
    /// `(first, last)` must form the head and the tail of a consecutively
    /// linked sub-list.
    /// Both must be non-null and valid.
    #[inline]
    pub unsafe fn push_many(&self, (first, last): (*mut N, *mut N)) {
        loop {
            let head = self.head.load(Ordering::Relaxed);
            N::set_next(last, head);

            // (QUE:1) this `Release` CAS synchronizes-with the `Acquire` swap (QUE:2)
            if self
                .head
                .compare_exchange_weak(head, first, Ordering::Release, Ordering::Relaxed)
                .is_ok()
            {
                return;
            }
        }
    }

    /// Swaps out the first node and leaves the `RawQueue` empty.
    ///
    /// The returned node (if it is non-`null`) effectively owns all following
    /// nodes and can deallocate or mutate them as desired.
    #[inline]
    pub fn take_all(&self) -> *mut N {
        // (QUE:2) this `Acquire` swap synchronizes-with the `Release` CAS (QUE:1)
        self.head.swap(ptr::null_mut(), Ordering::Acquire)
    }

    /// Same as take all, but without synchronization or ordering constraints.
    /// Requires exclusive access through the `&mut self` receiver.
    #[inline]
    pub fn take_all_unsync(&mut self) -> *mut N {
        self.head.swap(ptr::null_mut(), Ordering::Relaxed)
    }
}

#[cfg(test)]
mod tests {
    use std::ptr;

    use super::{RawNode, RawQueue};

    struct Node {
        value: u32,
        next: *mut Node,
    }

    impl RawNode for Node {
        unsafe fn next(node: *mut Self) -> *mut Self {
            (*node).next
        }

        unsafe fn set_next(node: *mut Self, next: *mut Self) {
            (*node).next = next;
        }
    }

    fn node(value: u32) -> *mut Node {
        Box::into_raw(Box::new(Node { value, next: ptr::null_mut() }))
    }

    fn drain(mut curr: *mut Node) -> Vec<u32> {
        let mut values = Vec::new();
        while !curr.is_null() {
            let boxed = unsafe { Box::from_raw(curr) };
            values.push(boxed.value);
            curr = boxed.next;
        }

        values
    }

    #[test]
    fn push_many_and_take_all() {
        let queue = RawQueue::new();
        assert!(queue.is_empty());

        let (a, b) = (node(1), node(2));
        unsafe { Node::set_next(a, b) };
        unsafe { queue.push_many((a, b)) };

        let c = node(3);
        unsafe { queue.push_many((c, c)) };
        assert!(!queue.is_empty());

        assert_eq!(drain(queue.take_all()), vec![3, 1, 2]);
        assert!(queue.is_empty());
        assert!(queue.take_all().is_null());
    }
}
