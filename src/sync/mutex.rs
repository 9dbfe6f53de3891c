//! Mutex wrapper - uses parking_lot if available, std otherwise.
//!
//! Both variants expose the same infallible `lock()`; the std variant
//! recovers the guard from a poisoned lock since every value kept behind
//! it (collected diagnostics) stays consistent across a panic.

#[cfg(feature = "parking_lot")]
pub use parking_lot::Mutex;

#[cfg(not(feature = "parking_lot"))]
mod std_mutex {
    use std::ops::{Deref, DerefMut};
    use std::sync::{Mutex as StdMutex, MutexGuard as StdMutexGuard, PoisonError};

    /// Thin wrapper around std::sync::Mutex.
    pub struct Mutex<T>(StdMutex<T>);

    impl<T> Mutex<T> {
        /// Create a new mutex.
        pub const fn new(value: T) -> Self {
            Self(StdMutex::new(value))
        }

        /// Lock the mutex, ignoring poisoning.
        pub fn lock(&self) -> MutexGuard<'_, T> {
            MutexGuard(self.0.lock().unwrap_or_else(PoisonError::into_inner))
        }
    }

    /// Guard for std mutex.
    pub struct MutexGuard<'a, T>(StdMutexGuard<'a, T>);

    impl<T> Deref for MutexGuard<'_, T> {
        type Target = T;

        fn deref(&self) -> &T {
            &self.0
        }
    }

    impl<T> DerefMut for MutexGuard<'_, T> {
        fn deref_mut(&mut self) -> &mut T {
            &mut self.0
        }
    }
}

#[cfg(not(feature = "parking_lot"))]
pub use std_mutex::Mutex;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lock_after_panic() {
        let mutex = std::sync::Arc::new(Mutex::new(1u32));
        let shared = mutex.clone();
        let _ = std::thread::spawn(move || {
            let _guard = shared.lock();
            panic!("poison");
        })
        .join();

        *mutex.lock() += 1;
        assert_eq!(*mutex.lock(), 2);
    }
}
