use std::ptr::NonNull;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

struct DropCount(Arc<AtomicUsize>);
impl Drop for DropCount {
    #[inline]
    fn drop(&mut self) {
        self.0.fetch_add(1, Ordering::Relaxed);
    }
}

#[test]
fn protected_record_survives_cleanup() {
    let drop_count = Arc::new(AtomicUsize::new(0));
    let alloc = || NonNull::from(Box::leak(Box::new(DropCount(Arc::clone(&drop_count)))));

    let protected = alloc();
    let unprotected = alloc();

    let record = hazptr_local::acquire_record();
    record.protect(protected);

    unsafe {
        hazptr_local::retire(protected);
        hazptr_local::retire(unprotected);
    }

    // both records are still held in the private list
    assert_eq!(drop_count.load(Ordering::Relaxed), 0);

    assert_eq!(hazptr_local::cleanup(), 1);
    assert_eq!(drop_count.load(Ordering::Relaxed), 1);
    assert_eq!(hazptr_local::domain().retired_count(), 1);

    // the record is still accessible while it is protected
    assert_eq!(Arc::strong_count(&unsafe { protected.as_ref() }.0), 2);

    record.reset();
    assert_eq!(hazptr_local::cleanup(), 1);
    assert_eq!(drop_count.load(Ordering::Relaxed), 2);
    assert_eq!(hazptr_local::domain().retired_count(), 0);

    hazptr_local::release_record(record);
}
