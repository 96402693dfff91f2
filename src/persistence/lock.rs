use std::sync::{Mutex, MutexGuard, TryLockError};
use std::thread;
use std::time::{Duration, Instant};

use crate::error::{TrackerError, TrackerResult};

const POLL_INTERVAL: Duration = Duration::from_millis(5);

/// In-process lock with a name and a bounded wait. It does not guard
/// the save files against other processes.
///
/// The guard releases on every exit path. A holder that panicked leaves
/// the lock poisoned; the next acquisition reports `LockAbandoned` and
/// clears the poison so the one after that succeeds.
#[derive(Debug)]
pub struct NamedLock {
    name: String,
    inner: Mutex<()>,
}

impl NamedLock {
    pub fn new(name: impl Into<String>) -> Self {
        NamedLock { name: name.into(), inner: Mutex::new(()) }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Block the calling thread for at most `wait`
    pub fn acquire(&self, wait: Duration) -> TrackerResult<MutexGuard<'_, ()>> {
        let deadline = Instant::now() + wait;
        loop {
            match self.inner.try_lock() {
                Ok(guard) => return Ok(guard),
                Err(TryLockError::Poisoned(poisoned)) => {
                    drop(poisoned.into_inner());
                    self.inner.clear_poison();
                    log::warn!("Lock {} was abandoned, recovering", self.name);
                    return Err(TrackerError::LockAbandoned { name: self.name.clone() });
                }
                Err(TryLockError::WouldBlock) => {
                    if Instant::now() >= deadline {
                        return Err(TrackerError::LockTimeout {
                            name: self.name.clone(),
                            waited: wait,
                        });
                    }
                    thread::sleep(POLL_INTERVAL);
                }
            }
        }
    }

    /// Acquire, treating an abandoned lock as free
    pub fn acquire_recovering(&self, wait: Duration) -> TrackerResult<MutexGuard<'_, ()>> {
        match self.acquire(wait) {
            Err(TrackerError::LockAbandoned { .. }) => self.acquire(wait),
            other => other,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn test_timeout_while_held() {
        let lock = NamedLock::new("save");
        let _held = lock.acquire(Duration::from_millis(10)).unwrap();
        match lock.acquire(Duration::from_millis(30)) {
            Err(TrackerError::LockTimeout { name, waited }) => {
                assert_eq!(name, "save");
                assert_eq!(waited, Duration::from_millis(30));
            }
            other => panic!("unexpected {:?}", other.map(|_| ())),
        };
    }

    #[test]
    fn test_released_on_drop() {
        let lock = NamedLock::new("save");
        {
            let _guard = lock.acquire(Duration::from_millis(10)).unwrap();
        }
        assert!(lock.acquire(Duration::from_millis(10)).is_ok());
    }

    #[test]
    fn test_abandoned_then_recovered() {
        let lock = Arc::new(NamedLock::new("autosave"));
        let holder = lock.clone();
        let _ = thread::spawn(move || {
            let _guard = holder.acquire(Duration::from_millis(10)).unwrap();
            panic!("holder dies with the lock");
        })
        .join();

        assert!(matches!(
            lock.acquire(Duration::from_millis(10)),
            Err(TrackerError::LockAbandoned { .. })
        ));
        assert!(lock.acquire(Duration::from_millis(10)).is_ok());
    }

    #[test]
    fn test_acquire_recovering_skips_abandoned() {
        let lock = Arc::new(NamedLock::new("autosave"));
        let holder = lock.clone();
        let _ = thread::spawn(move || {
            let _guard = holder.acquire(Duration::from_millis(10)).unwrap();
            panic!("holder dies with the lock");
        })
        .join();

        assert!(lock.acquire_recovering(Duration::from_millis(10)).is_ok());
    }
}
