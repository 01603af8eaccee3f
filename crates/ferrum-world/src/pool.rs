//! Worker pool for short blocking jobs (chunk generation, persistence).
//!
//! One FIFO queue per worker thread. `submit` round-robins across queues;
//! a worker that finds its own queue empty attempts to steal a single job
//! from a randomly chosen peer before going back to sleep.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Condvar, Mutex};
use std::thread;
use std::time::Duration;

use tracing::trace;

type Job = Box<dyn FnOnce() + Send + 'static>;

struct Worker {
    queue: Mutex<VecDeque<Job>>,
    cv: Condvar,
}

impl Worker {
    fn new() -> Self {
        Self {
            queue: Mutex::new(VecDeque::new()),
            cv: Condvar::new(),
        }
    }

    fn pop(&self) -> Option<Job> {
        self.queue.lock().unwrap().pop_front()
    }

    fn try_steal(&self) -> Option<Job> {
        self.queue.try_lock().ok()?.pop_front()
    }
}

pub struct WorkerPool {
    workers: Vec<Arc<Worker>>,
    threads: Mutex<Vec<thread::JoinHandle<()>>>,
    next_worker: AtomicUsize,
    shutdown: Arc<AtomicBool>,
}

impl WorkerPool {
    /// Spawn `threads` workers; 0 means hardware concurrency.
    pub fn new(threads: usize) -> Self {
        let count = if threads == 0 {
            thread::available_parallelism().map(|n| n.get()).unwrap_or(4)
        } else {
            threads
        };

        let workers: Vec<Arc<Worker>> = (0..count).map(|_| Arc::new(Worker::new())).collect();
        let shutdown = Arc::new(AtomicBool::new(false));

        let handles = (0..count)
            .map(|id| {
                let workers = workers.clone();
                let shutdown = shutdown.clone();
                thread::Builder::new()
                    .name(format!("worker-{id}"))
                    .spawn(move || worker_loop(id, &workers, &shutdown))
                    .expect("failed to spawn worker thread")
            })
            .collect();

        Self {
            workers,
            threads: Mutex::new(handles),
            next_worker: AtomicUsize::new(0),
            shutdown,
        }
    }

    pub fn size(&self) -> usize {
        self.workers.len()
    }

    /// Queue a job on the next worker in round-robin order.
    ///
    /// Jobs submitted after shutdown are dropped.
    pub fn submit(&self, job: impl FnOnce() + Send + 'static) {
        if self.shutdown.load(Ordering::Acquire) {
            trace!("Dropping job submitted after worker pool shutdown");
            return;
        }
        let index = self.next_worker.fetch_add(1, Ordering::Relaxed) % self.workers.len();
        let worker = &self.workers[index];
        worker.queue.lock().unwrap().push_back(Box::new(job));
        worker.cv.notify_one();
    }

    /// Stop accepting jobs, finish what is queued, and join the threads.
    pub fn shutdown(&self) {
        if self.shutdown.swap(true, Ordering::AcqRel) {
            return;
        }
        for worker in &self.workers {
            worker.cv.notify_all();
        }
        let mut threads = self.threads.lock().unwrap();
        for handle in threads.drain(..) {
            let _ = handle.join();
        }
    }
}

impl Drop for WorkerPool {
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn worker_loop(id: usize, workers: &[Arc<Worker>], shutdown: &AtomicBool) {
    let own = &workers[id];
    // Cheap xorshift state for steal-victim selection; no need for a seeded RNG.
    let mut rng_state = (id as u64).wrapping_mul(0x9E37_79B9_7F4A_7C15) | 1;

    loop {
        if let Some(job) = own.pop() {
            job();
            continue;
        }

        // Own queue empty: try to steal one job from a random peer.
        let mut stolen = None;
        for _ in 0..workers.len() {
            rng_state ^= rng_state << 13;
            rng_state ^= rng_state >> 7;
            rng_state ^= rng_state << 17;
            let victim = (rng_state % workers.len() as u64) as usize;
            if victim == id {
                continue;
            }
            if let Some(job) = workers[victim].try_steal() {
                stolen = Some(job);
                break;
            }
        }
        if let Some(job) = stolen {
            job();
            continue;
        }

        if shutdown.load(Ordering::Acquire) {
            // Drain-on-shutdown: exit only once our queue is empty.
            if own.queue.lock().unwrap().is_empty() {
                return;
            }
            continue;
        }

        let guard = own.queue.lock().unwrap();
        if guard.is_empty() && !shutdown.load(Ordering::Acquire) {
            // Timed wait so steals retry even without a local notification.
            let _unused = own
                .cv
                .wait_timeout(guard, Duration::from_millis(50))
                .unwrap();
        }
    }
}
