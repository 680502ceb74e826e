use std::ptr::NonNull;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Barrier};
use std::thread;

use hazptr_local::Domain;

const THREADS: usize = 4;
const RETIRES_PER_THREAD: usize = 50;

struct DropCount(Arc<AtomicUsize>);
impl Drop for DropCount {
    #[inline]
    fn drop(&mut self) {
        self.0.fetch_add(1, Ordering::Relaxed);
    }
}

#[test]
fn exiting_threads_hand_over_everything() {
    let drop_count = Arc::new(AtomicUsize::new(0));
    let barrier = Arc::new(Barrier::new(THREADS));

    let handles: Vec<_> = (0..THREADS)
        .map(|_| {
            let drop_count = Arc::clone(&drop_count);
            let barrier = Arc::clone(&barrier);
            thread::spawn(move || {
                // hold more records than fit into the cache at once
                let records: Vec<_> = (0..8).map(|_| hazptr_local::acquire_record()).collect();
                barrier.wait();

                for _ in 0..RETIRES_PER_THREAD {
                    let record = NonNull::from(Box::leak(Box::new(DropCount(Arc::clone(&drop_count)))));
                    unsafe { hazptr_local::retire(record) };
                }

                for record in records {
                    hazptr_local::release_record(record);
                }

                // the cache is full, the remaining records went to the domain
                let cached = hazptr_local::claim_batch(hazptr_local::CAPACITY);
                assert!(hazptr_local::try_claim().is_none());
                hazptr_local::return_batch(&cached);
            })
        })
        .collect();

    for handle in handles {
        handle.join().unwrap();
    }

    // records of the final, partial batches are pushed when the threads exit
    hazptr_local::cleanup();
    assert_eq!(drop_count.load(Ordering::Relaxed), THREADS * RETIRES_PER_THREAD);
    assert_eq!(hazptr_local::domain().retired_count(), 0);

    // all cached records have been released, so none have to be allocated anew
    let domain = hazptr_local::domain();
    let allocated = domain.hazard_count();
    assert_eq!(allocated, THREADS * 8);

    let records: Vec<_> = (0..allocated).map(|_| domain.acquire_record()).collect();
    assert_eq!(domain.hazard_count(), allocated);
    for record in records {
        domain.release_record(record);
    }
}
