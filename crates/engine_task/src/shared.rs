//! Thread-safe shared ownership with upgradeable weak references.
//!
//! [`Shared`] is the handle used to hand systems, pipeline nodes, component
//! tables and the worker pool across worker threads. It is a thin wrapper
//! over [`Arc`]; [`WeakShared`] wraps [`Weak`].
//!
//! ## Upgrade contract
//!
//! [`WeakShared::upgrade`] never revives a value whose strong count has
//! already reached zero. `Weak::upgrade` implements this with a
//! compare-and-swap loop that refuses to increment a zero strong count and
//! only retries when another thread changed the count concurrently, so no
//! extra bookkeeping is layered on top here.

use std::fmt;
use std::ops::Deref;
use std::sync::{Arc, Weak};

/// A strong, thread-safe reference to a shared value.
pub struct Shared<T: ?Sized>(Arc<T>);

impl<T> Shared<T> {
    /// Move `value` into a new shared allocation with one strong and one
    /// (implicit) weak reference.
    #[must_use]
    pub fn new(value: T) -> Self {
        Self(Arc::new(value))
    }

    /// Returns the inner value if this is the only strong reference.
    ///
    /// # Errors
    ///
    /// Gives the handle back unchanged if other strong references exist.
    pub fn try_unwrap(this: Self) -> Result<T, Self> {
        Arc::try_unwrap(this.0).map_err(Self)
    }
}

impl<T: ?Sized> Shared<T> {
    /// Create a weak reference to the shared value.
    #[must_use]
    pub fn downgrade(this: &Self) -> WeakShared<T> {
        WeakShared(Arc::downgrade(&this.0))
    }

    /// Number of strong references currently alive.
    #[must_use]
    pub fn strong_count(this: &Self) -> usize {
        Arc::strong_count(&this.0)
    }

    /// Number of weak references currently alive, not counting the implicit
    /// one held on behalf of the strong references.
    #[must_use]
    pub fn weak_count(this: &Self) -> usize {
        Arc::weak_count(&this.0)
    }

    /// Returns `true` if both handles point at the same allocation.
    #[must_use]
    pub fn ptr_eq(a: &Self, b: &Self) -> bool {
        Arc::ptr_eq(&a.0, &b.0)
    }
}

impl<T: ?Sized> Clone for Shared<T> {
    fn clone(&self) -> Self {
        Self(Arc::clone(&self.0))
    }
}

impl<T: ?Sized> Deref for Shared<T> {
    type Target = T;

    fn deref(&self) -> &T {
        &self.0
    }
}

impl<T: ?Sized> From<Arc<T>> for Shared<T> {
    fn from(arc: Arc<T>) -> Self {
        Self(arc)
    }
}

impl<T: ?Sized + fmt::Debug> fmt::Debug for Shared<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(&*self.0, f)
    }
}

/// A weak reference that does not keep the shared value alive.
pub struct WeakShared<T: ?Sized>(Weak<T>);

impl<T> WeakShared<T> {
    /// A weak reference that never upgrades.
    #[must_use]
    pub fn new() -> Self {
        Self(Weak::new())
    }
}

impl<T> Default for WeakShared<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: ?Sized> WeakShared<T> {
    /// Attempt to obtain a strong reference.
    ///
    /// Returns `None` once every strong reference has been released, even if
    /// other threads are concurrently upgrading or releasing.
    #[must_use]
    pub fn upgrade(&self) -> Option<Shared<T>> {
        self.0.upgrade().map(Shared)
    }

    /// Number of strong references to the value, `0` once it is dropped.
    #[must_use]
    pub fn strong_count(&self) -> usize {
        self.0.strong_count()
    }
}

impl<T: ?Sized> Clone for WeakShared<T> {
    fn clone(&self) -> Self {
        Self(Weak::clone(&self.0))
    }
}

impl<T: ?Sized> fmt::Debug for WeakShared<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "(WeakShared)")
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::thread;

    use super::*;

    struct DropCounter(Arc<AtomicUsize>);

    impl Drop for DropCounter {
        fn drop(&mut self) {
            self.0.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[test]
    fn test_counts_start_at_one_strong() {
        let shared = Shared::new(5u32);
        assert_eq!(Shared::strong_count(&shared), 1);
        assert_eq!(Shared::weak_count(&shared), 0);

        let weak = Shared::downgrade(&shared);
        assert_eq!(Shared::weak_count(&shared), 1);
        assert_eq!(weak.strong_count(), 1);
    }

    #[test]
    fn test_release_last_strong_drops_payload() {
        let drops = Arc::new(AtomicUsize::new(0));
        let shared = Shared::new(DropCounter(drops.clone()));
        let weak = Shared::downgrade(&shared);

        let second = shared.clone();
        drop(shared);
        assert_eq!(drops.load(Ordering::SeqCst), 0);

        drop(second);
        assert_eq!(drops.load(Ordering::SeqCst), 1);
        assert!(weak.upgrade().is_none());
        assert_eq!(weak.strong_count(), 0);
    }

    #[test]
    fn test_upgrade_while_alive() {
        let shared = Shared::new(String::from("alive"));
        let weak = Shared::downgrade(&shared);
        let upgraded = weak.upgrade().expect("value is still alive");
        assert!(Shared::ptr_eq(&shared, &upgraded));
        assert_eq!(Shared::strong_count(&shared), 2);
    }

    #[test]
    fn test_empty_weak_never_upgrades() {
        let weak: WeakShared<u8> = WeakShared::new();
        assert!(weak.upgrade().is_none());
    }

    #[test]
    fn test_upgrade_never_resurrects_under_contention() {
        // Many threads hammer upgrade/release while the owner drops the last
        // strong reference. A successful upgrade always observes a live
        // payload, and the payload is dropped exactly once.
        for _ in 0..50 {
            let drops = Arc::new(AtomicUsize::new(0));
            let shared = Shared::new(DropCounter(drops.clone()));
            let weak = Shared::downgrade(&shared);

            let handles: Vec<_> = (0..4)
                .map(|_| {
                    let weak = weak.clone();
                    let drops = drops.clone();
                    thread::spawn(move || {
                        for _ in 0..1_000 {
                            match weak.upgrade() {
                                Some(strong) => {
                                    assert_eq!(drops.load(Ordering::SeqCst), 0);
                                    drop(strong);
                                }
                                None => break,
                            }
                        }
                    })
                })
                .collect();

            drop(shared);
            for handle in handles {
                handle.join().expect("upgrade thread panicked");
            }

            assert_eq!(drops.load(Ordering::SeqCst), 1);
            assert!(weak.upgrade().is_none());
        }
    }

    #[test]
    fn test_try_unwrap_requires_unique_owner() {
        let shared = Shared::new(7u8);
        let other = shared.clone();
        let shared = Shared::try_unwrap(shared).expect_err("two owners");
        drop(other);
        assert_eq!(Shared::try_unwrap(shared).ok(), Some(7));
    }

    #[test]
    fn test_unsized_from_arc() {
        let arc: Arc<dyn Fn() -> u8 + Send + Sync> = Arc::new(|| 3);
        let shared: Shared<dyn Fn() -> u8 + Send + Sync> = Shared::from(arc);
        assert_eq!((*shared)(), 3);
    }
}
