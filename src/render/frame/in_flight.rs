//! Counting semaphore bounding the number of frames queued on the GPU

use std::sync::{Arc, Condvar, Mutex, MutexGuard};

struct Slots {
    available: Mutex<usize>,
    released: Condvar,
    capacity: usize,
}

impl Slots {
    fn lock(&self) -> MutexGuard<'_, usize> {
        // The count stays consistent even if a holder panicked
        self.available.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

/// Hands out at most `capacity` [`FramePermit`]s at a time
///
/// Acquisition blocks once every permit is out. A permit returns to the pool
/// when it is dropped, which the GPU completion callback does for submitted
/// frames.
#[derive(Clone)]
pub struct InFlightSemaphore {
    slots: Arc<Slots>,
}

impl InFlightSemaphore {
    pub fn new(capacity: usize) -> Self {
        assert!(capacity > 0, "in-flight capacity must be non-zero");
        Self {
            slots: Arc::new(Slots {
                available: Mutex::new(capacity),
                released: Condvar::new(),
                capacity,
            }),
        }
    }

    /// Block until a permit is free
    pub fn acquire(&self) -> FramePermit {
        let mut available = self.slots.lock();
        while *available == 0 {
            available = self
                .slots
                .released
                .wait(available)
                .unwrap_or_else(|poisoned| poisoned.into_inner());
        }
        *available -= 1;
        self.permit()
    }

    /// Take a permit if one is free
    pub fn try_acquire(&self) -> Option<FramePermit> {
        let mut available = self.slots.lock();
        if *available == 0 {
            return None;
        }
        *available -= 1;
        Some(self.permit())
    }

    /// Permits currently held
    pub fn in_flight(&self) -> usize {
        self.slots.capacity - *self.slots.lock()
    }

    pub fn capacity(&self) -> usize {
        self.slots.capacity
    }

    fn permit(&self) -> FramePermit {
        FramePermit {
            slots: Arc::clone(&self.slots),
        }
    }
}

/// One acquired in-flight slot; released on drop
pub struct FramePermit {
    slots: Arc<Slots>,
}

impl Drop for FramePermit {
    fn drop(&mut self) {
        let mut available = self.slots.lock();
        *available += 1;
        debug_assert!(*available <= self.slots.capacity);
        self.slots.released.notify_one();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::mpsc;
    use std::thread;
    use std::time::Duration;

    #[test]
    fn test_capacity_bounds_permits() {
        let semaphore = InFlightSemaphore::new(3);
        let permits: Vec<_> = (0..3).map(|_| semaphore.acquire()).collect();
        assert_eq!(semaphore.in_flight(), 3);
        assert!(semaphore.try_acquire().is_none());

        drop(permits);
        assert_eq!(semaphore.in_flight(), 0);
        assert!(semaphore.try_acquire().is_some());
    }

    #[test]
    fn test_acquire_blocks_until_release() {
        let semaphore = InFlightSemaphore::new(2);
        let first = semaphore.acquire();
        let _second = semaphore.acquire();

        let (tx, rx) = mpsc::channel();
        let waiter = {
            let semaphore = semaphore.clone();
            thread::spawn(move || {
                let permit = semaphore.acquire();
                tx.send(()).unwrap();
                drop(permit);
            })
        };

        // Still blocked while both permits are held
        assert!(rx.recv_timeout(Duration::from_millis(100)).is_err());

        // Released from another thread, as a GPU completion callback would
        thread::spawn(move || drop(first)).join().unwrap();
        rx.recv_timeout(Duration::from_secs(5)).expect("waiter should wake");
        waiter.join().unwrap();
    }
}
