use std::ptr::NonNull;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::thread;

static RECLAIMED: AtomicUsize = AtomicUsize::new(0);
static VALUES: [u64; 3] = [1, 2, 3];

unsafe fn reclaim(record: NonNull<()>) {
    let value = *record.cast::<u64>().as_ptr();
    RECLAIMED.fetch_add(value as usize, Ordering::Relaxed);
}

#[test]
fn custom_reclaim_runs_after_thread_exit() {
    thread::spawn(|| {
        for value in &VALUES {
            unsafe { hazptr_local::retire_with(NonNull::from(value).cast(), reclaim) };
        }
    })
    .join()
    .unwrap();

    // the exiting thread has pushed its private list to the domain
    assert_eq!(hazptr_local::domain().retired_count(), VALUES.len());
    assert_eq!(hazptr_local::cleanup(), VALUES.len());
    assert_eq!(RECLAIMED.load(Ordering::Relaxed), 6);
}
