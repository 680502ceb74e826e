//! The default domain and the per-thread singletons bound to it.

use std::cell::UnsafeCell;
use std::ptr::NonNull;

use arrayvec::ArrayVec;
use conquer_once::Lazy;

use crate::domain::{Domain, Global};
use crate::hazard::HazardRecord;
use crate::local::{PrivateList, RecycleError, ThreadCache, CAPACITY};
use crate::retired::{Retired, RetiredList};

type Cache = ThreadCache<'static, Global>;

/********** globals & thread-locals ***************************************************************/

/// The global default domain, which is created on first use.
static DOMAIN: Lazy<Global> = Lazy::new(build_domain);

thread_local!(static THREAD_CACHE: LocalCache = LocalCache::new());
thread_local!(static PRIVATE_LIST: PrivateList<'static, Global> = PrivateList::new(domain()));

fn build_domain() -> Global {
    Global::new(crate::global_config())
}

/********** public functions **********************************************************************/

/// Returns the default domain.
#[inline]
pub fn domain() -> &'static Global {
    &DOMAIN
}

/// Acquires a hazard record from the calling thread's cache or from the
/// default domain, if the cache is empty or has already been destroyed.
#[inline]
pub fn acquire_record() -> &'static HazardRecord {
    match THREAD_CACHE.try_with(|local| local.with(Cache::acquire)) {
        Ok(record) => record,
        Err(_) => {
            tracing::debug!("thread cache destroyed, acquiring hazard record from domain");
            DOMAIN.acquire_record()
        }
    }
}

/// Returns `record` to the calling thread's cache or releases it to the
/// default domain, if the cache is full or has already been destroyed.
#[inline]
pub fn release_record(record: &'static HazardRecord) {
    if try_return(record).is_err() {
        DOMAIN.release_record(record);
    }
}

/// Claims a hazard record from the calling thread's cache without falling
/// back to the domain.
#[inline]
pub fn try_claim() -> Option<&'static HazardRecord> {
    THREAD_CACHE.try_with(|local| local.with(Cache::try_claim)).ok().flatten()
}

/// Attempts to return `record` to the calling thread's cache.
///
/// # Errors
///
/// Fails if the cache is full ([`RecycleError::Capacity`]) or has already
/// been destroyed ([`RecycleError::Access`]).
#[inline]
pub fn try_return(record: &'static HazardRecord) -> Result<(), RecycleError> {
    THREAD_CACHE
        .try_with(|local| local.with(|cache| cache.try_return(record)))
        .unwrap_or(Err(RecycleError::Access))
}

/// Claims `num` records at once from the calling thread's cache, which is
/// refilled from the default domain first, if it does not contain enough
/// records.
///
/// If the cache has already been destroyed, all records are acquired from the
/// domain directly.
///
/// # Panics
///
/// This function panics, if `num` exceeds [`CAPACITY`].
#[inline]
pub fn claim_batch(num: usize) -> ArrayVec<[&'static HazardRecord; CAPACITY]> {
    assert!(num <= CAPACITY, "batch of {} records exceeds the thread cache capacity", num);
    match THREAD_CACHE.try_with(|local| local.with(|cache| cache.claim_batch(num))) {
        Ok(records) => records,
        Err(_) => (0..num).map(|_| DOMAIN.acquire_record()).collect(),
    }
}

/// Returns all `records` at once to the calling thread's cache, which first
/// releases as many of its records to the default domain as is necessary to
/// make room for them.
///
/// If the cache has already been destroyed, all records are released to the
/// domain directly.
///
/// # Panics
///
/// This function panics, if the number of records exceeds [`CAPACITY`].
#[inline]
pub fn return_batch(records: &[&'static HazardRecord]) {
    assert!(
        records.len() <= CAPACITY,
        "batch of {} records exceeds the thread cache capacity",
        records.len()
    );

    if THREAD_CACHE.try_with(|local| local.with(|cache| cache.return_batch(records))).is_err() {
        records.iter().for_each(|record| DOMAIN.release_record(record));
    }
}

/// Retires a record, which will be dropped and de-allocated once it is no
/// longer protected by any hazard record.
///
/// # Safety
///
/// The caller has to ensure `record` has been obtained by `Box::into_raw`,
/// is no longer reachable from any shared memory location and is retired only
/// once.
/// The type's `Drop` implementation must not access any non-static
/// references.
#[inline]
pub unsafe fn retire<T>(record: NonNull<T>) {
    retire_node(Retired::new(record));
}

/// Retires a record, which will be reclaimed by `reclaim` once it is no longer
/// protected by any hazard record.
///
/// # Safety
///
/// The caller has to ensure `record` is no longer reachable from any shared
/// memory location, is retired only once and that calling `reclaim` with it is
/// sound once it is no longer protected.
#[inline]
pub unsafe fn retire_with(record: NonNull<()>, reclaim: unsafe fn(NonNull<()>)) {
    retire_node(Retired::with_reclaim(record, reclaim));
}

/// Pushes all records privately retired by the calling thread to the default
/// domain and attempts to reclaim all unprotected records.
///
/// Returns the number of reclaimed records.
#[inline]
pub fn cleanup() -> usize {
    let _ = PRIVATE_LIST.try_with(PrivateList::push_all_to_domain);
    DOMAIN.cleanup()
}

#[inline]
fn retire_node(retired: Box<Retired>) {
    let mut retired = Some(retired);
    let _ = PRIVATE_LIST.try_with(|list| {
        if let Some(retired) = retired.take() {
            list.push(retired);
        }
    });

    // the private list has already been destroyed
    if let Some(retired) = retired {
        tracing::debug!("private list destroyed, pushing retired record to domain");
        DOMAIN.push_retired(RetiredList::single(retired));
    }
}

////////////////////////////////////////////////////////////////////////////////////////////////////
// LocalCache
////////////////////////////////////////////////////////////////////////////////////////////////////

/// The thread local container for a thread's cache.
#[derive(Debug)]
struct LocalCache(UnsafeCell<Cache>);

/********** impl inherent *************************************************************************/

impl LocalCache {
    #[inline]
    fn new() -> Self {
        Self(UnsafeCell::new(ThreadCache::new(domain())))
    }

    /// Runs `f` with exclusive access to the cache.
    ///
    /// `f` must not access the thread's cache again, which is why the cache
    /// is never handed to code outside of this module.
    #[inline]
    fn with<R>(&self, f: impl FnOnce(&mut Cache) -> R) -> R {
        let cache = self.0.get();
        debug_assert!(!unsafe { (*cache).is_local() }, "reentrant access to the thread cache");

        let guard = LocalGuard::new(cache);
        f(unsafe { &mut *guard.0 })
    }
}

////////////////////////////////////////////////////////////////////////////////////////////////////
// LocalGuard
////////////////////////////////////////////////////////////////////////////////////////////////////

/// Marks the cache as checked out for as long as it is alive, even if the
/// access panics.
struct LocalGuard(*mut Cache);

impl LocalGuard {
    #[inline]
    fn new(cache: *mut Cache) -> Self {
        unsafe { (*cache).set_local(true) };
        Self(cache)
    }
}

impl Drop for LocalGuard {
    #[inline]
    fn drop(&mut self) {
        unsafe { (*self.0).set_local(false) };
    }
}

#[cfg(test)]
mod tests {
    use std::panic::{self, AssertUnwindSafe};
    use std::ptr;
    use std::sync::{Arc, Barrier};
    use std::thread;

    use matches::assert_matches;

    use super::*;

    fn with_cache<R>(f: impl FnOnce(&mut Cache) -> R) -> R {
        THREAD_CACHE.with(|local| local.with(f))
    }

    #[test]
    fn cached_records_are_reused() {
        thread::spawn(|| {
            let record = acquire_record();
            release_record(record);

            assert!(ptr::eq(record, try_claim().unwrap()));
            assert!(try_claim().is_none());
            try_return(record).unwrap();
            assert_eq!(with_cache(|cache| cache.count()), 1);
        })
        .join()
        .unwrap();
    }

    #[test]
    fn full_cache_rejects_records() {
        thread::spawn(|| {
            let extra = domain().acquire_record();
            with_cache(|cache| cache.bulk_refill(CAPACITY));

            assert_matches!(try_return(extra), Err(RecycleError::Capacity));
            release_record(extra);
            assert_eq!(with_cache(|cache| cache.count()), CAPACITY);
        })
        .join()
        .unwrap();
    }

    #[test]
    fn batches_go_through_the_cache() {
        thread::spawn(|| {
            let single = acquire_record();
            release_record(single);

            let batch = claim_batch(4);
            assert_eq!(batch.len(), 4);
            assert!(batch.iter().any(|&record| ptr::eq(record, single)));
            assert_eq!(with_cache(|cache| cache.count()), 0);

            // the cache is not borrowed between batch operations
            let record = acquire_record();
            release_record(record);
            assert_eq!(with_cache(|cache| cache.count()), 1);

            return_batch(&batch);
            assert_eq!(with_cache(|cache| cache.count()), 5);
            assert!(batch.iter().all(|record| record.is_active()));
        })
        .join()
        .unwrap();
    }

    #[test]
    #[should_panic]
    fn oversized_batch() {
        let _ = claim_batch(CAPACITY + 1);
    }

    #[test]
    #[cfg(debug_assertions)]
    fn local_flag_is_set_during_access() {
        thread::spawn(|| {
            assert!(with_cache(|cache| cache.is_local()));
        })
        .join()
        .unwrap();
    }

    #[test]
    fn panicking_access_releases_the_cache() {
        thread::spawn(|| {
            let res = panic::catch_unwind(AssertUnwindSafe(|| {
                with_cache(|cache| cache.bulk_drain(1));
            }));
            assert!(res.is_err());

            // the cache is accessible again after the panic
            assert_eq!(with_cache(|cache| cache.count()), 0);
            let record = acquire_record();
            release_record(record);
            assert_eq!(with_cache(|cache| cache.count()), 1);
        })
        .join()
        .unwrap();
    }

    #[test]
    fn concurrent_first_access_to_lazy_domain() {
        const THREADS: usize = 8;

        for _ in 0..100 {
            let lazy: Arc<Lazy<Global>> = Arc::new(Lazy::new(build_domain));
            let barrier = Arc::new(Barrier::new(THREADS));

            let handles: Vec<_> = (0..THREADS)
                .map(|_| {
                    let lazy = Arc::clone(&lazy);
                    let barrier = Arc::clone(&barrier);
                    thread::spawn(move || {
                        barrier.wait();
                        lazy.hazard_count()
                    })
                })
                .collect();

            for handle in handles {
                assert_eq!(handle.join().unwrap(), 0);
            }
        }
    }
}
