//! Hazard records, the shared slots through which threads announce the
//! pointers they are currently protecting from reclamation.

mod list;

use core::cmp;
use core::ptr::{self, NonNull};
use core::sync::atomic::{AtomicBool, AtomicPtr, Ordering};

pub(crate) use self::list::HazardList;

////////////////////////////////////////////////////////////////////////////////////////////////////
// HazardRecord
////////////////////////////////////////////////////////////////////////////////////////////////////

/// A shared and reusable slot, which a thread can claim in order to publish a
/// pointer that must not be reclaimed while it is protected.
///
/// Records are owned by the domain that allocated them and are never
/// de-allocated while that domain is alive.
/// A thread may only use a record after it has been acquired, either directly
/// from the domain or from its thread local cache.
#[derive(Debug)]
pub struct HazardRecord {
    protected: AtomicPtr<()>,
    active: AtomicBool,
}

/********** impl inherent *************************************************************************/

impl HazardRecord {
    /// Publishes `ptr` as protected.
    ///
    /// The store is sequentially consistent, so it is ordered before any
    /// subsequent validating load of the pointer's source.
    #[inline]
    pub fn protect<T>(&self, ptr: NonNull<T>) {
        self.protected.store(ptr.cast().as_ptr(), Ordering::SeqCst);
    }

    /// Clears the protected pointer, the record remains acquired.
    #[inline]
    pub fn reset(&self) {
        self.protected.store(ptr::null_mut(), Ordering::Release);
    }

    /// Returns the currently protected pointer, if there is any.
    #[inline]
    pub fn protected(&self, order: Ordering) -> Option<ProtectedPtr> {
        NonNull::new(self.protected.load(order)).map(ProtectedPtr)
    }

    /// Returns `true` if the record is currently acquired by some thread.
    #[inline]
    pub fn is_active(&self) -> bool {
        self.active.load(Ordering::Acquire)
    }

    /// Creates a new record, which is already acquired by the calling thread.
    #[inline]
    pub(crate) const fn new_active() -> Self {
        Self { protected: AtomicPtr::new(ptr::null_mut()), active: AtomicBool::new(true) }
    }

    /// Attempts to acquire an inactive record.
    #[inline]
    pub(crate) fn try_acquire(&self) -> bool {
        !self.active.load(Ordering::Relaxed)
            && self
                .active
                .compare_exchange(false, true, Ordering::AcqRel, Ordering::Relaxed)
                .is_ok()
    }

    /// Resets the record and makes it available for acquisition by other
    /// threads.
    #[inline]
    pub(crate) fn release(&self) {
        self.reset();
        self.active.store(false, Ordering::Release);
    }
}

////////////////////////////////////////////////////////////////////////////////////////////////////
// ProtectedPtr
////////////////////////////////////////////////////////////////////////////////////////////////////

/// An untyped pointer protected from reclamation, because it is stored within
/// a hazard record.
///
/// The type information is deliberately stripped as it is not needed in order
/// to determine whether a pointer is protected or not.
#[derive(Clone, Copy, Debug, Eq, Ord, PartialEq, PartialOrd)]
pub struct ProtectedPtr(NonNull<()>);

/********** impl inherent *************************************************************************/

impl ProtectedPtr {
    /// Gets the internal non-nullable pointer.
    #[inline]
    pub fn into_inner(self) -> NonNull<()> {
        self.0
    }

    /// Gets the protected address.
    #[inline]
    pub fn address(self) -> usize {
        self.0.as_ptr() as usize
    }

    #[inline]
    pub(crate) fn compare_with(self, address: usize) -> cmp::Ordering {
        self.address().cmp(&address)
    }
}

#[cfg(test)]
mod tests {
    use core::ptr::NonNull;
    use core::sync::atomic::Ordering;

    use super::HazardRecord;

    #[test]
    fn protect_and_reset() {
        let value = 1;
        let record = HazardRecord::new_active();
        assert!(record.protected(Ordering::Relaxed).is_none());

        record.protect(NonNull::from(&value));
        let protected = record.protected(Ordering::Relaxed).unwrap();
        assert_eq!(protected.address(), &value as *const i32 as usize);

        record.reset();
        assert!(record.protected(Ordering::Relaxed).is_none());
        assert!(record.is_active());
    }

    #[test]
    fn acquire_release() {
        let record = HazardRecord::new_active();
        assert!(!record.try_acquire());

        record.protect(NonNull::from(&1));
        record.release();
        assert!(!record.is_active());
        assert!(record.protected(Ordering::Relaxed).is_none());

        assert!(record.try_acquire());
        assert!(!record.try_acquire());
    }
}
