//! Recording job system (Section 4.J): a fixed worker pool draining a
//! shared FIFO of task thunks, coordinated by a `WaitGroup`.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Condvar, Mutex};
use std::thread::JoinHandle;

type Task = Box<dyn FnOnce() -> bool + Send + 'static>;

struct Shared {
    queue: Mutex<VecDeque<Task>>,
    queue_cv: Condvar,
    shutdown: AtomicBool,
    pending: AtomicUsize,
    done_cv: Condvar,
    done_mutex: Mutex<()>,
    ok: AtomicBool,
}

/// A fixed-size worker pool draining a shared FIFO, sized
/// `clamp(hardware_threads - 1, 1, max_workers)` by the caller (see
/// `CullingConfig::worker_count`).
pub struct WorkerPool {
    shared: Arc<Shared>,
    handles: Vec<JoinHandle<()>>,
}

impl WorkerPool {
    pub fn new(worker_count: usize) -> Self {
        let worker_count = worker_count.max(1);
        let shared = Arc::new(Shared {
            queue: Mutex::new(VecDeque::new()),
            queue_cv: Condvar::new(),
            shutdown: AtomicBool::new(false),
            pending: AtomicUsize::new(0),
            done_cv: Condvar::new(),
            done_mutex: Mutex::new(()),
            ok: AtomicBool::new(true),
        });

        let handles = (0..worker_count)
            .map(|_| {
                let shared = Arc::clone(&shared);
                std::thread::spawn(move || worker_loop(shared))
            })
            .collect();

        Self { shared, handles }
    }

    pub fn worker_count(&self) -> usize {
        self.handles.len()
    }

    /// Enqueues a task and bumps the in-flight counter; returns
    /// immediately without blocking the caller. `task` returns `false` on
    /// failure, which clears the pool's sticky `ok` flag observed after
    /// `wait`.
    pub fn submit(&self, task: impl FnOnce() -> bool + Send + 'static) {
        self.shared.pending.fetch_add(1, Ordering::SeqCst);
        self.shared.queue.lock().unwrap().push_back(Box::new(task));
        self.shared.queue_cv.notify_one();
    }

    /// Blocks until every submitted task (at the point of the call) has
    /// completed, then returns whether all of them reported success.
    pub fn wait(&self) -> bool {
        let mut guard = self.shared.done_mutex.lock().unwrap();
        while self.shared.pending.load(Ordering::SeqCst) != 0 {
            guard = self.shared.done_cv.wait(guard).unwrap();
        }
        drop(guard);
        self.shared.ok.swap(true, Ordering::SeqCst)
    }
}

impl Drop for WorkerPool {
    /// Workers drain the queue on shutdown; no in-flight task is killed.
    fn drop(&mut self) {
        self.shared.shutdown.store(true, Ordering::SeqCst);
        self.shared.queue_cv.notify_all();
        for handle in self.handles.drain(..) {
            let _ = handle.join();
        }
    }
}

fn worker_loop(shared: Arc<Shared>) {
    loop {
        let task = {
            let mut queue = shared.queue.lock().unwrap();
            loop {
                if let Some(task) = queue.pop_front() {
                    break Some(task);
                }
                if shared.shutdown.load(Ordering::SeqCst) {
                    break None;
                }
                queue = shared.queue_cv.wait(queue).unwrap();
            }
        };
        let Some(task) = task else {
            return;
        };
        let ok = task();
        if !ok {
            shared.ok.store(false, Ordering::SeqCst);
        }
        if shared.pending.fetch_sub(1, Ordering::SeqCst) == 1 {
            let _guard = shared.done_mutex.lock().unwrap();
            shared.done_cv.notify_all();
        }
    }
}
