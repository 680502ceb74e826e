//! Thread local caches for hazard pointer based concurrent memory reclamation.
//!
//! With hazard pointers, every thread that wants to protect a pointer must
//! first acquire a hazard record and every thread that retires a record must
//! eventually hand it to a globally shared structure, which reclaims it once
//! no hazard record protects it anymore.
//! Doing either through shared atomics on every single operation quickly
//! becomes a source of contention.
//!
//! This crate provides the two thread local structures that sit between the
//! individual operations of a thread and the shared [`Domain`]:
//!
//! - [`ThreadCache`]: a small fixed-capacity stack of hazard records that are
//!   reserved for the owning thread.
//!   Records are claimed from and returned to the cache without touching any
//!   shared state, unless the cache is empty or full.
//! - [`PrivateList`]: a lock-free linked list of the records a thread has
//!   retired, which is pushed to the domain in batches once a threshold is
//!   reached or the thread exits.
//!
//! Both release everything they still hold to the domain when they are
//! dropped, so no hazard record is leaked and no retired record is lost.
//!
//! # Default Domain
//!
//! With the `std` feature (enabled by default), a global [`Global`] domain and
//! one instance of each structure per thread are created on demand:
//!
//! ```
//! use std::ptr::NonNull;
//!
//! let value = NonNull::from(Box::leak(Box::new(17)));
//!
//! let record = hazptr_local::acquire_record();
//! record.protect(value);
//! // ... unlink `value` from the shared data structure ...
//! unsafe { hazptr_local::retire(value) };
//!
//! record.reset();
//! hazptr_local::release_record(record);
//! hazptr_local::cleanup();
//! ```
//!
//! # Configuration
//!
//! The runtime parameters can be set once through [`CONFIG`] before the
//! default domain or any thread local structure is first used.
//! The default threshold for privately retired records can be also be set at
//! build time through the `HAZPTR_RETIRE_THRESHOLD` environment variable.

#![cfg_attr(not(any(test, feature = "std")), no_std)]
#![warn(missing_docs)]

#[cfg(not(feature = "std"))]
extern crate alloc;

#[cfg(feature = "std")]
mod default;

mod config;
mod domain;
mod hazard;
mod local;
mod queue;
mod retired;

#[cfg(test)]
mod tests;

use cfg_if::cfg_if;

pub use crate::config::{Config, ConfigBuilder};
pub use crate::domain::{Domain, Global};
pub use crate::hazard::{HazardRecord, ProtectedPtr};
pub use crate::local::{CacheEntry, PrivateList, RecycleError, ThreadCache, CAPACITY};
pub use crate::retired::{Iter, Retired, RetiredList};

cfg_if! {
    if #[cfg(feature = "std")] {
        pub use crate::default::{
            acquire_record, claim_batch, cleanup, domain, release_record, retire, retire_with,
            return_batch, try_claim, try_return,
        };

        use conquer_once::OnceCell;
    } else {
        use conquer_once::spin::OnceCell;
    }
}

/// Global one-time configuration for runtime parameters.
pub static CONFIG: OnceCell<Config> = OnceCell::uninit();

/// Returns the global configuration or the default configuration, if it has
/// not been set.
#[inline]
pub(crate) fn global_config() -> Config {
    CONFIG.try_get().ok().copied().unwrap_or_default()
}

// The ThreadSanitizer can not correctly asses ordering restraints from explicit
// fences, so memory operations around such fences need stricter ordering than
// `Relaxed`, when instrumentation is chosen.

#[cfg(not(feature = "sanitize-threads"))]
mod sanitize {
    use core::sync::atomic::Ordering;

    pub const RELAXED_LOAD: Ordering = Ordering::Relaxed;
}

#[cfg(feature = "sanitize-threads")]
mod sanitize {
    use core::sync::atomic::Ordering;

    pub const RELAXED_LOAD: Ordering = Ordering::Acquire;
}
