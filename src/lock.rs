use std::collections::HashSet;
use std::sync::{Condvar, Mutex};
use std::time::{Duration, Instant};

use log::debug;

use crate::error::{OcflError, Result};

pub const DEFAULT_LOCK_TIMEOUT: Duration = Duration::from_secs(10);

/// Advisory per-object locks for the local process. A lock is held for the duration of
/// a planning-and-commit sequence; waiting acquirers block up to the configured timeout.
/// Cross-process correctness rests on the prior-inventory digest check, not this lock.
pub struct LockManager {
    locked: Mutex<HashSet<String>>,
    released: Condvar,
    timeout: Duration,
}

/// A held object lock. The lock is released when the guard drops.
pub struct ObjectLock<'a> {
    manager: &'a LockManager,
    object_id: String,
}

impl LockManager {
    pub fn new(timeout: Duration) -> Self {
        Self {
            locked: Mutex::new(HashSet::new()),
            released: Condvar::new(),
            timeout,
        }
    }

    /// Acquires the lock for the object, waiting up to the configured timeout.
    /// `OcflError::LockAcquire` is returned when the wait times out. The lock is _not_
    /// reentrant.
    pub fn acquire(&self, object_id: &str) -> Result<ObjectLock> {
        let deadline = Instant::now() + self.timeout;
        let mut locked = self.locked.lock().unwrap();

        while locked.contains(object_id) {
            let remaining = match deadline.checked_duration_since(Instant::now()) {
                Some(remaining) => remaining,
                None => return Err(OcflError::LockAcquire(object_id.to_string())),
            };

            let (guard, wait) = self.released.wait_timeout(locked, remaining).unwrap();
            locked = guard;

            if wait.timed_out() && locked.contains(object_id) {
                return Err(OcflError::LockAcquire(object_id.to_string()));
            }
        }

        locked.insert(object_id.to_string());
        debug!("Acquired lock on object {}", object_id);

        Ok(ObjectLock {
            manager: self,
            object_id: object_id.to_string(),
        })
    }
}

impl Default for LockManager {
    fn default() -> Self {
        Self::new(DEFAULT_LOCK_TIMEOUT)
    }
}

impl<'a> Drop for ObjectLock<'a> {
    fn drop(&mut self) {
        let mut locked = self.manager.locked.lock().unwrap();
        locked.remove(&self.object_id);
        debug!("Released lock on object {}", self.object_id);
        self.manager.released.notify_all();
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use crate::error::OcflError;
    use crate::lock::LockManager;

    #[test]
    fn acquire_lock_when_available() {
        let manager = LockManager::new(Duration::from_millis(50));

        let object_id = "testing";

        let _lock = manager.acquire(object_id).unwrap();

        assert_cannot_acquire_lock(object_id, &manager);
    }

    #[test]
    fn acquire_multiple_locks() {
        let manager = LockManager::new(Duration::from_millis(50));

        let object_1_id = "one";
        let object_2_id = "two";

        let _lock1 = manager.acquire(object_1_id).unwrap();
        let _lock2 = manager.acquire(object_2_id).unwrap();

        assert_cannot_acquire_lock(object_1_id, &manager);
        assert_cannot_acquire_lock(object_2_id, &manager);
    }

    #[test]
    fn release_lock_when_out_of_scope() {
        let manager = LockManager::new(Duration::from_millis(50));

        let object_1_id = "one";
        let object_2_id = "two";

        {
            let _lock1 = manager.acquire(object_1_id).unwrap();
            assert_cannot_acquire_lock(object_1_id, &manager);

            {
                let _lock2 = manager.acquire(object_2_id).unwrap();
                assert_cannot_acquire_lock(object_2_id, &manager);
                assert_cannot_acquire_lock(object_1_id, &manager);
            }

            let _lock2 = manager.acquire(object_2_id).unwrap();
        }

        let _lock1 = manager.acquire(object_1_id).unwrap();
    }

    #[test]
    fn waiting_acquire_succeeds_after_release() {
        let manager = std::sync::Arc::new(LockManager::new(Duration::from_secs(5)));

        let lock = manager.acquire("obj").unwrap();

        let manager2 = manager.clone();
        let handle = std::thread::spawn(move || {
            let _lock = manager2.acquire("obj").unwrap();
        });

        std::thread::sleep(Duration::from_millis(20));
        drop(lock);

        handle.join().unwrap();
    }

    fn assert_cannot_acquire_lock(object_id: &str, manager: &LockManager) {
        match manager.acquire(object_id) {
            Err(OcflError::LockAcquire(..)) => (),
            _ => {
                panic!("Expected the lock to be unavailable")
            }
        }
    }
}
