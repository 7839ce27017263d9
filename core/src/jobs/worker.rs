//! Long-lived worker threads draining the job queue.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::JoinHandle;

use super::JobQueue;

/// Fixed pool of worker threads consuming from one [`JobQueue`].
///
/// Workers block (not spin) when the queue is empty. Jobs are never
/// cancelled: dropping the pool wakes the workers so they can observe the
/// stop flag and exit, but anything already claimed runs to completion.
pub struct WorkerPool {
    queue: Arc<JobQueue>,
    stop: Arc<AtomicBool>,
    handles: Vec<JoinHandle<()>>,
}

impl WorkerPool {
    /// Spawn `count` named worker threads draining `queue`.
    pub fn spawn(queue: Arc<JobQueue>, count: usize) -> Self {
        let stop = Arc::new(AtomicBool::new(false));
        let handles = (0..count)
            .map(|index| {
                let queue = Arc::clone(&queue);
                let stop = Arc::clone(&stop);
                std::thread::Builder::new()
                    .name(format!("kiln-worker-{index}"))
                    .spawn(move || worker_loop(&queue, &stop))
                    .expect("failed to spawn worker thread")
            })
            .collect();
        Self {
            queue,
            stop,
            handles,
        }
    }

    pub fn worker_count(&self) -> usize {
        self.handles.len()
    }
}

fn worker_loop(queue: &JobQueue, stop: &AtomicBool) {
    loop {
        if stop.load(Ordering::Acquire) {
            break;
        }
        if !queue.try_run_next() {
            queue.wait_for_work();
        }
    }
}

impl Drop for WorkerPool {
    fn drop(&mut self) {
        self.stop.store(true, Ordering::Release);
        self.queue.wake(self.handles.len() as u32);
        for handle in self.handles.drain(..) {
            let _ = handle.join();
        }
    }
}
