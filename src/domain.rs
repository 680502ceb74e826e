//! The shared domain owning all hazard records and the queue of retired
//! records that have been handed over by threads.

use core::ptr::{self, NonNull};
use core::sync::atomic::{self, AtomicUsize, Ordering};

#[cfg(not(feature = "std"))]
use alloc::vec::Vec;

use crate::config::Config;
use crate::hazard::{HazardList, HazardRecord, ProtectedPtr};
use crate::queue::{RawNode, RawQueue};
use crate::retired::{Retired, RetiredList};
use crate::sanitize;

/// The minimum ratio between the number of retired records and hazard
/// records before a reclamation attempt is made.
const HAZARD_MULTIPLIER: usize = 2;

////////////////////////////////////////////////////////////////////////////////////////////////////
// Domain (trait)
////////////////////////////////////////////////////////////////////////////////////////////////////

/// The interface through which the thread local caches interact with the
/// shared reclamation state.
pub trait Domain: Sync {
    /// Acquires a hazard record and reserves it for the calling thread.
    ///
    /// This may allocate a new record, but it never fails.
    fn acquire_record(&self) -> &HazardRecord;

    /// Resets `record` and makes it available for other threads again.
    ///
    /// The record must have been acquired from the same domain and must not
    /// be used by the calling thread afterwards.
    fn release_record(&self, record: &HazardRecord);

    /// Takes ownership of an entire batch of retired records, which are
    /// eventually reclaimed once they are no longer protected.
    ///
    /// This may be called concurrently by any number of threads.
    fn push_retired(&self, list: RetiredList);
}

////////////////////////////////////////////////////////////////////////////////////////////////////
// Global
////////////////////////////////////////////////////////////////////////////////////////////////////

/// The default [`Domain`] implementation.
///
/// All retired records pushed by any thread are stored in a single queue.
/// Once enough records have accumulated, the pushing thread attempts to
/// reclaim all records in the queue that are not protected by any hazard
/// record.
#[derive(Debug)]
pub struct Global {
    config: Config,
    hazards: HazardList,
    retired: RawQueue<Retired>,
    retired_count: AtomicUsize,
}

/********** impl Default **************************************************************************/

impl Default for Global {
    #[inline]
    fn default() -> Self {
        Self::new(Config::default())
    }
}

/********** impl inherent *************************************************************************/

impl Global {
    /// Creates a new empty domain.
    #[inline]
    pub const fn new(config: Config) -> Self {
        Self {
            config,
            hazards: HazardList::new(),
            retired: RawQueue::new(),
            retired_count: AtomicUsize::new(0),
        }
    }

    /// Returns the domain's configuration.
    #[inline]
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Returns the number of hazard records allocated by this domain.
    #[inline]
    pub fn hazard_count(&self) -> usize {
        self.hazards.count()
    }

    /// Returns the (approximate) number of retired records that have not yet
    /// been reclaimed.
    #[inline]
    pub fn retired_count(&self) -> usize {
        self.retired_count.load(Ordering::Relaxed)
    }

    /// Attempts to reclaim all currently retired records regardless of any
    /// threshold and returns the number of reclaimed records.
    #[inline]
    pub fn cleanup(&self) -> usize {
        self.try_reclaim()
    }

    #[inline]
    fn reached_threshold(&self, retired: usize) -> bool {
        let threshold = self.config.reclaim_threshold() as usize;
        retired >= threshold && retired >= HAZARD_MULTIPLIER * self.hazards.count()
    }

    #[cold]
    fn try_reclaim(&self) -> usize {
        let mut curr = self.retired.take_all();
        if curr.is_null() {
            return 0;
        }

        // (DOM:1) this `SeqCst` fence orders the detaching of all retired records before the
        // collection of all protected pointers and synchronizes-with the `SeqCst` stores that
        // publish protected pointers
        atomic::fence(Ordering::SeqCst);
        let protected = self.collect_protected();

        let (mut first, mut last): (*mut Retired, *mut Retired) = (ptr::null_mut(), ptr::null_mut());
        let (mut reclaimed, mut remaining) = (0, 0);

        while let Some(node) = NonNull::new(curr) {
            let address = unsafe { node.as_ref() }.address();
            curr = unsafe { Retired::next(node.as_ptr()) };

            match protected.binary_search_by(|protected| protected.compare_with(address)) {
                // the record is still protected by some hazard record and is re-linked
                Ok(_) => {
                    unsafe { Retired::set_next(node.as_ptr(), ptr::null_mut()) };
                    if first.is_null() {
                        first = node.as_ptr();
                    } else {
                        unsafe { Retired::set_next(last, node.as_ptr()) };
                    }

                    last = node.as_ptr();
                    remaining += 1;
                }
                Err(_) => {
                    unsafe { Retired::reclaim(node) };
                    reclaimed += 1;
                }
            }
        }

        if !first.is_null() {
            unsafe { self.retired.push_many((first, last)) };
        }

        // the counter is only an estimate, records that were retired concurrently may already have
        // been subtracted by another thread's reclamation attempt
        let _ = self.retired_count.fetch_update(Ordering::Relaxed, Ordering::Relaxed, |count| {
            Some(count.saturating_sub(reclaimed))
        });

        tracing::debug!(reclaimed, remaining, "reclamation attempt finished");
        reclaimed
    }

    #[inline]
    fn collect_protected(&self) -> Vec<ProtectedPtr> {
        let mut protected: Vec<_> = self
            .hazards
            .iter()
            .filter(|record| record.is_active())
            .filter_map(|record| record.protected(sanitize::RELAXED_LOAD))
            .collect();

        protected.sort_unstable();
        protected
    }
}

/********** impl Domain ***************************************************************************/

impl Domain for Global {
    #[inline]
    fn acquire_record(&self) -> &HazardRecord {
        self.hazards.acquire()
    }

    #[inline]
    fn release_record(&self, record: &HazardRecord) {
        record.release();
    }

    #[inline]
    fn push_retired(&self, list: RetiredList) {
        let (head, tail, count) = list.into_raw_parts();
        unsafe { self.retired.push_many((head.as_ptr(), tail.as_ptr())) };

        let retired = self.retired_count.fetch_add(count, Ordering::Relaxed) + count;
        if self.reached_threshold(retired) {
            self.try_reclaim();
        }
    }
}

/********** impl Drop *****************************************************************************/

impl Drop for Global {
    #[inline(never)]
    fn drop(&mut self) {
        // when the domain is dropped, no thread can still hold any protected reference, so all
        // remaining records can simply be reclaimed
        let mut curr = self.retired.take_all_unsync();
        while let Some(node) = NonNull::new(curr) {
            unsafe {
                curr = Retired::next(node.as_ptr());
                Retired::reclaim(node);
            }
        }
    }
}
