//! A domain for unit tests, which records every interaction of the thread
//! local caches with it.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use crate::config::ConfigBuilder;
use crate::domain::{Domain, Global};
use crate::hazard::HazardRecord;
use crate::retired::{Retired, RetiredList};

/// A batch as it was received by the domain.
#[derive(Clone, Debug, Eq, PartialEq)]
pub(crate) struct Batch {
    pub addresses: Vec<usize>,
    pub count: usize,
}

#[derive(Debug)]
pub(crate) struct TestDomain {
    inner: Global,
    acquired: AtomicUsize,
    released: AtomicUsize,
    batches: Mutex<Vec<Batch>>,
}

impl TestDomain {
    pub fn new() -> Self {
        Self {
            inner: Global::new(ConfigBuilder::new().reclaim_threshold(u32::max_value()).build()),
            acquired: AtomicUsize::new(0),
            released: AtomicUsize::new(0),
            batches: Mutex::new(Vec::new()),
        }
    }

    pub fn acquired(&self) -> usize {
        self.acquired.load(Ordering::Relaxed)
    }

    pub fn released(&self) -> usize {
        self.released.load(Ordering::Relaxed)
    }

    pub fn batches(&self) -> Vec<Batch> {
        self.batches.lock().unwrap().clone()
    }
}

impl Domain for TestDomain {
    fn acquire_record(&self) -> &HazardRecord {
        self.acquired.fetch_add(1, Ordering::Relaxed);
        self.inner.acquire_record()
    }

    fn release_record(&self, record: &HazardRecord) {
        self.released.fetch_add(1, Ordering::Relaxed);
        self.inner.release_record(record);
    }

    fn push_retired(&self, list: RetiredList) {
        let batch = Batch { addresses: list.iter().map(Retired::address).collect(), count: list.len() };
        self.batches.lock().unwrap().push(batch);
        // nothing is ever protected in unit tests, so the records can be reclaimed right away
        drop(list);
    }
}
