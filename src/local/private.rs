//! The thread local list of retired records, which are pushed to the domain in
//! batches.

use core::ptr::{self, NonNull};
use core::sync::atomic::{AtomicBool, AtomicPtr, AtomicUsize, Ordering};

#[cfg(not(feature = "std"))]
use alloc::boxed::Box;

use crate::config::Config;
use crate::domain::Domain;
use crate::queue::RawNode;
use crate::retired::{Retired, RetiredList};

////////////////////////////////////////////////////////////////////////////////////////////////////
// PrivateList
////////////////////////////////////////////////////////////////////////////////////////////////////

/// A lock-free singly linked list of records retired by one thread, which have
/// not yet been handed to the domain.
///
/// The list is delimited by two independently updated atomic pointers, so it
/// can be detached as a whole by exchanging both with `null`.
/// Once the number of privately retired records reaches the configured
/// threshold, the whole list is pushed to the domain in a single batch.
#[derive(Debug)]
pub struct PrivateList<'d, D: Domain> {
    domain: &'d D,
    head: AtomicPtr<Retired>,
    tail: AtomicPtr<Retired>,
    rcount: AtomicUsize,
    in_dtor: AtomicBool,
    threshold: usize,
}

/********** impl inherent *************************************************************************/

impl<'d, D: Domain> PrivateList<'d, D> {
    /// Creates a new empty list for `domain` using the global configuration.
    #[inline]
    pub fn new(domain: &'d D) -> Self {
        Self::with_config(domain, crate::global_config())
    }

    /// Creates a new empty list for `domain`.
    #[inline]
    pub fn with_config(domain: &'d D, config: Config) -> Self {
        Self {
            domain,
            head: AtomicPtr::new(ptr::null_mut()),
            tail: AtomicPtr::new(ptr::null_mut()),
            rcount: AtomicUsize::new(0),
            in_dtor: AtomicBool::new(false),
            threshold: config.retire_threshold() as usize,
        }
    }

    /// Returns the number of records retired since the last push to the
    /// domain.
    #[inline]
    pub fn len(&self) -> usize {
        self.rcount.load(Ordering::Relaxed)
    }

    /// Returns `true` if the list contains no retired records.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.head().is_null()
    }

    /// Returns `true` if the list is being torn down.
    #[inline]
    pub fn in_dtor(&self) -> bool {
        self.in_dtor.load(Ordering::Relaxed)
    }

    /// Retires a record.
    ///
    /// While the list is being torn down, the record is pushed to the domain
    /// immediately.
    #[inline]
    pub fn push(&self, retired: Box<Retired>) {
        if !self.in_dtor() {
            self.push_in_private_list(retired);
        } else {
            tracing::debug!("private list in teardown, pushing retired record to domain");
            self.domain.push_retired(RetiredList::single(retired));
        }
    }

    /// Detaches all privately retired records and pushes them to the domain
    /// as a single batch.
    #[inline]
    pub fn push_all_to_domain(&self) {
        let mut chain = Chain::default();
        self.collect(&mut chain);

        if let Some((head, tail)) = chain.into_parts() {
            let count = self.rcount.swap(0, Ordering::Relaxed);
            tracing::trace!(count, "pushing private retired records to domain");
            self.domain.push_retired(unsafe { RetiredList::from_raw_parts(head, tail, count) });
        }
    }

    #[inline]
    fn push_in_private_list(&self, retired: Box<Retired>) {
        let node = Box::into_raw(retired);
        loop {
            let pushed = if !self.tail().is_null() {
                self.push_in_non_empty_list(node)
            } else {
                self.push_in_empty_list(node)
            };

            if pushed {
                break;
            }
        }

        if self.rcount.fetch_add(1, Ordering::Relaxed) + 1 >= self.threshold {
            self.push_all_to_domain();
        }
    }

    /// Detaches the list and appends it to the `chain` being collected.
    ///
    /// This does not change the retired count.
    #[inline]
    fn collect(&self, chain: &mut Chain) {
        let head = match NonNull::new(self.exchange_head()) {
            Some(head) => head,
            None => return,
        };

        match NonNull::new(self.exchange_tail()) {
            Some(tail) => chain.append(head, tail),
            None => panic!("private retired list with a head but without a tail"),
        }
    }

    #[inline]
    fn push_in_non_empty_list(&self, node: *mut Retired) -> bool {
        let head = self.head();
        if !head.is_null() {
            unsafe { Retired::set_next(node, head) };
            return self.cas_head(head, node);
        }

        false
    }

    #[inline]
    fn push_in_empty_list(&self, node: *mut Retired) -> bool {
        unsafe { Retired::set_next(node, ptr::null_mut()) };
        if self.cas_tail(ptr::null_mut(), node) {
            // no other push can succeed before the head is published
            self.set_head(node);
            return true;
        }

        false
    }

    #[inline]
    fn begin_teardown(&self) {
        self.in_dtor.store(true, Ordering::Relaxed);
    }

    #[inline]
    fn head(&self) -> *mut Retired {
        self.head.load(Ordering::Acquire)
    }

    #[inline]
    fn tail(&self) -> *mut Retired {
        self.tail.load(Ordering::Acquire)
    }

    #[inline]
    fn set_head(&self, node: *mut Retired) {
        self.head.store(node, Ordering::Release);
    }

    #[inline]
    fn cas_head(&self, current: *mut Retired, new: *mut Retired) -> bool {
        self.head.compare_exchange_weak(current, new, Ordering::AcqRel, Ordering::Relaxed).is_ok()
    }

    #[inline]
    fn cas_tail(&self, current: *mut Retired, new: *mut Retired) -> bool {
        self.tail.compare_exchange_weak(current, new, Ordering::AcqRel, Ordering::Relaxed).is_ok()
    }

    #[inline]
    fn exchange_head(&self) -> *mut Retired {
        self.head.swap(ptr::null_mut(), Ordering::AcqRel)
    }

    #[inline]
    fn exchange_tail(&self) -> *mut Retired {
        self.tail.swap(ptr::null_mut(), Ordering::AcqRel)
    }
}

/********** impl Drop *****************************************************************************/

impl<D: Domain> Drop for PrivateList<'_, D> {
    #[inline(never)]
    fn drop(&mut self) {
        self.begin_teardown();
        if !self.is_empty() {
            self.push_all_to_domain();
        }
    }
}

////////////////////////////////////////////////////////////////////////////////////////////////////
// Chain
////////////////////////////////////////////////////////////////////////////////////////////////////

/// Accumulator for detached (sub-)lists of retired records.
#[derive(Debug, Default)]
struct Chain {
    head: Option<NonNull<Retired>>,
    tail: Option<NonNull<Retired>>,
}

impl Chain {
    #[inline]
    fn append(&mut self, head: NonNull<Retired>, tail: NonNull<Retired>) {
        match self.tail {
            Some(last) => unsafe { Retired::set_next(last.as_ptr(), head.as_ptr()) },
            None => self.head = Some(head),
        }

        self.tail = Some(tail);
    }

    #[inline]
    fn into_parts(self) -> Option<(NonNull<Retired>, NonNull<Retired>)> {
        Some((self.head?, self.tail?))
    }
}
