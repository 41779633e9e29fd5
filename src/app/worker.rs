use std::collections::HashMap;
use std::sync::{Arc, Condvar, Mutex};

/// Counting semaphore bounding how many device commands run at once.
/// Every background action must hold a permit for its whole duration, so a
/// burst of user actions queues instead of spawning unbounded work.
pub struct CommandSemaphore {
    capacity: usize,
    in_flight: Mutex<usize>,
    signal: Condvar,
}

impl CommandSemaphore {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            in_flight: Mutex::new(0),
            signal: Condvar::new(),
        }
    }

    pub fn acquire(self: Arc<Self>) -> CommandPermit {
        {
            let mut in_flight = self.in_flight.lock().expect("semaphore lock poisoned");
            while *in_flight >= self.capacity {
                in_flight = self.signal.wait(in_flight).expect("semaphore lock poisoned");
            }
            *in_flight += 1;
        }
        CommandPermit { semaphore: self }
    }

    fn release(&self) {
        let mut in_flight = self.in_flight.lock().expect("semaphore lock poisoned");
        *in_flight = in_flight.saturating_sub(1);
        self.signal.notify_one();
    }
}

pub struct CommandPermit {
    semaphore: Arc<CommandSemaphore>,
}

impl Drop for CommandPermit {
    fn drop(&mut self) {
        self.semaphore.release();
    }
}

/// Bounded scheduler for background actions. Besides the global permit pool
/// it hands out one mutex per package document, so in-process mutations of
/// the same document are serialized (cross-process writers remain
/// last-writer-wins).
pub struct ActionScheduler {
    permits: Arc<CommandSemaphore>,
    document_locks: Mutex<HashMap<String, Arc<Mutex<()>>>>,
}

impl ActionScheduler {
    pub fn new(max_parallel: usize) -> Self {
        Self {
            permits: Arc::new(CommandSemaphore::new(max_parallel)),
            document_locks: Mutex::new(HashMap::new()),
        }
    }

    pub fn acquire(&self) -> CommandPermit {
        Arc::clone(&self.permits).acquire()
    }

    pub fn document_lock(&self, document: &str) -> Arc<Mutex<()>> {
        let mut guard = self.document_locks.lock().expect("document locks poisoned");
        guard
            .entry(document.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::thread;
    use std::time::Duration;

    #[test]
    fn permits_bound_concurrency() {
        let scheduler = Arc::new(ActionScheduler::new(2));

        let running = Arc::new(AtomicUsize::new(0));
        let peak = Arc::new(AtomicUsize::new(0));

        let mut handles = Vec::new();
        for _ in 0..8 {
            let scheduler = Arc::clone(&scheduler);
            let running = Arc::clone(&running);
            let peak = Arc::clone(&peak);
            handles.push(thread::spawn(move || {
                let _permit = scheduler.acquire();
                let now = running.fetch_add(1, Ordering::SeqCst) + 1;
                peak.fetch_max(now, Ordering::SeqCst);
                thread::sleep(Duration::from_millis(25));
                running.fetch_sub(1, Ordering::SeqCst);
            }));
        }

        for handle in handles {
            handle.join().expect("join");
        }

        assert!(peak.load(Ordering::SeqCst) <= 2);
    }

    #[test]
    fn document_lock_serializes_same_document() {
        let scheduler = Arc::new(ActionScheduler::new(8));

        let running = Arc::new(AtomicUsize::new(0));
        let peak = Arc::new(AtomicUsize::new(0));

        let mut handles = Vec::new();
        for _ in 0..6 {
            let scheduler = Arc::clone(&scheduler);
            let running = Arc::clone(&running);
            let peak = Arc::clone(&peak);
            handles.push(thread::spawn(move || {
                let _permit = scheduler.acquire();
                let lock = scheduler.document_lock("/tmp/mainFile.json");
                let _guard = lock.lock().expect("lock");
                let now = running.fetch_add(1, Ordering::SeqCst) + 1;
                peak.fetch_max(now, Ordering::SeqCst);
                thread::sleep(Duration::from_millis(10));
                running.fetch_sub(1, Ordering::SeqCst);
            }));
        }

        for handle in handles {
            handle.join().expect("join");
        }

        assert_eq!(peak.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn zero_capacity_is_clamped_to_one() {
        let scheduler = Arc::new(ActionScheduler::new(0));
        let _permit = scheduler.acquire();
    }
}
