//! The thread local cache of hazard records.

#[cfg(feature = "std")]
use std::error;

use core::fmt;

use arrayvec::{ArrayVec, CapacityError};
use cfg_if::cfg_if;

use crate::config::Config;
use crate::domain::Domain;
use crate::hazard::HazardRecord;

/// The number of hazard records a thread can cache locally.
pub const CAPACITY: usize = 6;

////////////////////////////////////////////////////////////////////////////////////////////////////
// CacheEntry
////////////////////////////////////////////////////////////////////////////////////////////////////

/// A holder for a single hazard record that is reserved for the owning thread.
///
/// An entry neither acquires nor releases its record on its own, it is filled
/// and evicted explicitly by the [`ThreadCache`] containing it.
#[derive(Copy, Clone, Debug)]
pub struct CacheEntry<'d> {
    record: &'d HazardRecord,
}

/********** impl inherent *************************************************************************/

impl<'d> CacheEntry<'d> {
    #[inline]
    fn fill(record: &'d HazardRecord) -> Self {
        Self { record }
    }

    /// Returns the held record.
    #[inline]
    pub fn get(&self) -> &'d HazardRecord {
        self.record
    }

    #[inline]
    fn evict(self, domain: &impl Domain) {
        domain.release_record(self.record);
    }
}

////////////////////////////////////////////////////////////////////////////////////////////////////
// ThreadCache
////////////////////////////////////////////////////////////////////////////////////////////////////

/// A fixed-capacity stack of hazard records that have been acquired from a
/// domain and are reserved for one thread.
///
/// Claiming and returning records does not access any shared state as long as
/// the cache is neither empty nor full.
/// All remaining records are released back to the domain, when the cache is
/// dropped.
#[derive(Debug)]
pub struct ThreadCache<'d, D: Domain> {
    domain: &'d D,
    entries: ArrayVec<[CacheEntry<'d>; CAPACITY]>,
    fills: FillCheck,
    #[cfg(debug_assertions)]
    local: bool,
}

/********** impl inherent *************************************************************************/

impl<'d, D: Domain> ThreadCache<'d, D> {
    /// Creates a new empty cache for records of `domain` using the global
    /// configuration.
    #[inline]
    pub fn new(domain: &'d D) -> Self {
        Self::with_config(domain, crate::global_config())
    }

    /// Creates a new empty cache for records of `domain`.
    #[inline]
    pub fn with_config(domain: &'d D, config: Config) -> Self {
        Self {
            domain,
            entries: ArrayVec::new(),
            fills: FillCheck::new(&config),
            #[cfg(debug_assertions)]
            local: false,
        }
    }

    /// Returns the maximum number of cached records.
    #[inline]
    pub const fn capacity() -> usize {
        CAPACITY
    }

    /// Returns the number of currently cached records.
    #[inline]
    pub fn count(&self) -> usize {
        self.entries.len()
    }

    /// Pops the most recently cached record, if there is any.
    ///
    /// If the cache is empty, the caller has to acquire a record directly
    /// from the domain.
    #[inline]
    pub fn try_claim(&mut self) -> Option<&'d HazardRecord> {
        self.entries.pop().map(|entry| entry.get())
    }

    /// Resets `record` and pushes it into the cache.
    ///
    /// # Errors
    ///
    /// Fails with [`RecycleError::Capacity`] if the cache is full, in which
    /// case the caller has to release the record to the domain directly.
    #[inline]
    pub fn try_return(&mut self, record: &'d HazardRecord) -> Result<(), RecycleError> {
        self.entries.try_push(CacheEntry::fill(record))?;
        record.reset();
        Ok(())
    }

    /// Claims a cached record or acquires one from the domain, if the cache is
    /// empty.
    #[inline]
    pub fn acquire(&mut self) -> &'d HazardRecord {
        match self.try_claim() {
            Some(record) => record,
            None => self.domain.acquire_record(),
        }
    }

    /// Returns `record` to the cache or releases it to the domain, if the
    /// cache is full.
    #[inline]
    pub fn release(&mut self, record: &'d HazardRecord) {
        if self.try_return(record).is_err() {
            self.domain.release_record(record);
        }
    }

    /// Acquires `num` additional records from the domain and pushes them into
    /// the cache.
    ///
    /// # Panics
    ///
    /// This function panics, if the cache has not enough room for `num` more
    /// records or if it is called more often than the configured maximum
    /// number of times within the configured fill period.
    #[inline(never)]
    pub fn bulk_refill(&mut self, num: usize) {
        assert!(
            self.count() + num <= CAPACITY,
            "refill of {} records exceeds the thread cache capacity",
            num
        );

        self.fills.record_fill();
        tracing::trace!(num, count = self.count(), "refilling thread cache");

        for _ in 0..num {
            self.entries.push(CacheEntry::fill(self.domain.acquire_record()));
        }
    }

    /// Pops `num` records and releases them to the domain.
    ///
    /// # Panics
    ///
    /// This function panics, if the cache contains less than `num` records.
    #[inline(never)]
    pub fn bulk_drain(&mut self, num: usize) {
        assert!(num <= self.count(), "drain of {} records exceeds the cached records", num);
        tracing::trace!(num, count = self.count(), "draining thread cache");

        let domain = self.domain;
        let len = self.entries.len();
        self.entries.drain(len - num..).for_each(|entry| entry.evict(domain));
    }

    /// Claims `num` records at once and refills the cache from the domain
    /// first, if it does not contain enough records.
    ///
    /// # Panics
    ///
    /// This function panics, if `num` exceeds the cache's capacity.
    #[inline]
    pub fn claim_batch(&mut self, num: usize) -> ArrayVec<[&'d HazardRecord; CAPACITY]> {
        assert!(num <= CAPACITY, "batch of {} records exceeds the thread cache capacity", num);
        if self.count() < num {
            self.bulk_refill(num - self.count());
        }

        let len = self.entries.len();
        self.entries.drain(len - num..).map(|entry| entry.get()).collect()
    }

    /// Returns all `records` at once and drains as many cached records to the
    /// domain first as is necessary to make room for them.
    ///
    /// # Panics
    ///
    /// This function panics, if the number of records exceeds the cache's
    /// capacity.
    #[inline]
    pub fn return_batch(&mut self, records: &[&'d HazardRecord]) {
        assert!(
            records.len() <= CAPACITY,
            "batch of {} records exceeds the thread cache capacity",
            records.len()
        );

        let overflow = (self.count() + records.len()).saturating_sub(CAPACITY);
        if overflow > 0 {
            self.bulk_drain(overflow);
        }

        for &record in records {
            record.reset();
            self.entries.push(CacheEntry::fill(record));
        }
    }

    /// Returns `true` if the cache is currently checked out for exclusive use.
    ///
    /// This is only tracked in debug builds and always `false` otherwise.
    #[inline]
    pub fn is_local(&self) -> bool {
        #[cfg(debug_assertions)]
        return self.local;
        #[cfg(not(debug_assertions))]
        return false;
    }

    /// Marks the cache as checked out (or returned) for exclusive use.
    ///
    /// This has no effect in release builds.
    #[inline]
    pub fn set_local(&mut self, local: bool) {
        #[cfg(debug_assertions)]
        {
            self.local = local;
        }

        #[cfg(not(debug_assertions))]
        let _ = local;
    }
}

/********** impl Drop *****************************************************************************/

impl<D: Domain> Drop for ThreadCache<'_, D> {
    #[inline(never)]
    fn drop(&mut self) {
        let domain = self.domain;
        self.entries.drain(..).for_each(|entry| entry.evict(domain));
    }
}

////////////////////////////////////////////////////////////////////////////////////////////////////
// FillCheck
////////////////////////////////////////////////////////////////////////////////////////////////////

cfg_if! {
    if #[cfg(feature = "std")] {
        use core::time::Duration;
        use std::time::Instant;

        /// Detector for bulk refills that occur so frequently that the cache
        /// capacity is most likely insufficient for the usage pattern.
        #[derive(Debug)]
        struct FillCheck {
            max_fills: u16,
            period: Duration,
            num_fills: u16,
            first_fill: Instant,
        }

        impl FillCheck {
            #[inline]
            fn new(config: &Config) -> Self {
                Self {
                    max_fills: config.max_fills(),
                    period: config.fill_period(),
                    num_fills: 0,
                    first_fill: Instant::now(),
                }
            }

            #[cold]
            fn record_fill(&mut self) {
                let prev = self.num_fills;
                self.num_fills = self.num_fills.saturating_add(1);

                if prev == 0 {
                    self.first_fill = Instant::now();
                } else if self.num_fills > self.max_fills {
                    let now = Instant::now();
                    let elapsed = now - self.first_fill;

                    if elapsed <= self.period {
                        tracing::error!(
                            fills = self.num_fills,
                            elapsed_ns = elapsed.as_nanos() as u64,
                            "frequent thread cache refills"
                        );

                        panic!(
                            "[*** INVESTIGATE: {} thread cache refills within {:?} indicate either \
                             an insufficient thread cache capacity or the unnecessary acquisition \
                             of additional hazard records ***]",
                            self.num_fills,
                            elapsed
                        );
                    }

                    self.num_fills = 1;
                    self.first_fill = now;
                }
            }
        }
    } else {
        /// Without a clock, refills are not tracked.
        #[derive(Debug)]
        struct FillCheck;

        impl FillCheck {
            #[inline]
            fn new(_: &Config) -> Self {
                FillCheck
            }

            #[inline]
            fn record_fill(&mut self) {}
        }
    }
}

////////////////////////////////////////////////////////////////////////////////////////////////////
// RecycleError
////////////////////////////////////////////////////////////////////////////////////////////////////

/// Error type for returning hazard records to a thread local cache.
#[derive(Copy, Clone, Debug, Eq, Ord, PartialEq, PartialOrd)]
pub enum RecycleError {
    /// The thread local cache has already been destroyed.
    Access,
    /// The thread local cache is full.
    Capacity,
}

/********** impl From *****************************************************************************/

impl From<CapacityError<CacheEntry<'_>>> for RecycleError {
    #[inline]
    fn from(_: CapacityError<CacheEntry<'_>>) -> Self {
        RecycleError::Capacity
    }
}

/********** impl Display **************************************************************************/

impl fmt::Display for RecycleError {
    #[inline]
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        use RecycleError::{Access, Capacity};
        match *self {
            Access => write!(f, "failed to access already destroyed thread local storage"),
            Capacity => write!(f, "thread local cache for hazard records already full"),
        }
    }
}

/********** impl Error ****************************************************************************/

#[cfg(feature = "std")]
impl error::Error for RecycleError {}
