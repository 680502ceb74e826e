//! Thread local state for amortizing the access to the shared domain.
//!
//! Each thread owns (at most) one [`ThreadCache`] of reserved hazard records
//! and one [`PrivateList`] of retired records.
//! Neither is ever accessed by any other thread, although the records they
//! contain are logically owned by the domain.
//! Both release everything they still hold to the domain when they are
//! dropped, which usually happens when the owning thread exits.

mod cache;
mod private;

pub use self::cache::{CacheEntry, RecycleError, ThreadCache, CAPACITY};
pub use self::private::PrivateList;
