use std::sync::{
    Arc, Mutex,
    atomic::{AtomicBool, Ordering},
    mpsc::{self, Receiver, Sender},
};
use std::thread::JoinHandle;

use tracing::{debug, info};

pub(crate) type TileJob = Box<dyn FnOnce() + Send + 'static>;

/// Fixed set of threads draining one shared tile job queue.
pub struct TileWorkerPool {
    sender: Option<Sender<TileJob>>,
    shutdown: Arc<AtomicBool>,
    threads: Vec<JoinHandle<()>>,
}

impl TileWorkerPool {
    /// Start `worker_count_with_override(override_count)` workers.
    pub fn new(override_count: u32) -> Self {
        let worker_count = worker_count_with_override(override_count);
        let (sender, receiver) = mpsc::channel::<TileJob>();
        let receiver = Arc::new(Mutex::new(receiver));
        let shutdown = Arc::new(AtomicBool::new(false));
        let threads = (0..worker_count)
            .map(|index| spawn_worker(index, receiver.clone(), shutdown.clone()))
            .collect();
        info!("Tile workers starting: {}", worker_count);
        Self {
            sender: Some(sender),
            shutdown,
            threads,
        }
    }

    pub fn worker_count(&self) -> usize {
        self.threads.len()
    }

    /// Queue a job; returns false once the pool is shut down.
    pub(crate) fn submit(&self, job: TileJob) -> bool {
        if self.shutdown.load(Ordering::Relaxed) {
            return false;
        }
        match &self.sender {
            Some(sender) => sender.send(job).is_ok(),
            None => false,
        }
    }

    /// Stop accepting work, skip queued jobs and join every worker.
    pub fn shutdown(&mut self) {
        self.shutdown.store(true, Ordering::Relaxed);
        self.sender = None;
        for handle in self.threads.drain(..) {
            let _ = handle.join();
        }
    }
}

impl Drop for TileWorkerPool {
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn spawn_worker(
    index: usize,
    receiver: Arc<Mutex<Receiver<TileJob>>>,
    shutdown: Arc<AtomicBool>,
) -> JoinHandle<()> {
    std::thread::spawn(move || {
        loop {
            let job = {
                let Ok(guard) = receiver.lock() else {
                    break;
                };
                guard.recv()
            };
            let Ok(job) = job else {
                break;
            };
            if shutdown.load(Ordering::Relaxed) {
                continue;
            }
            job();
        }
        debug!("Tile worker {} stopped", index);
    })
}

/// Explicit override, else `PIXCLASS_TILE_WORKERS`, else all cores but two.
pub fn worker_count_with_override(override_count: u32) -> usize {
    if override_count >= 1 {
        return override_count as usize;
    }
    if let Ok(value) = std::env::var("PIXCLASS_TILE_WORKERS") {
        if let Ok(parsed) = value.trim().parse::<usize>() {
            if parsed >= 1 {
                return parsed;
            }
        }
    }
    std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(1)
        .saturating_sub(2)
        .max(1)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    #[test]
    fn override_wins() {
        assert_eq!(worker_count_with_override(3), 3);
        assert!(worker_count_with_override(0) >= 1);
    }

    #[test]
    fn runs_jobs_and_joins_on_shutdown() {
        let mut pool = TileWorkerPool::new(2);
        let counter = Arc::new(AtomicUsize::new(0));
        let (done_tx, done_rx) = mpsc::channel();
        for _ in 0..8 {
            let counter = counter.clone();
            let done_tx = done_tx.clone();
            assert!(pool.submit(Box::new(move || {
                counter.fetch_add(1, Ordering::SeqCst);
                let _ = done_tx.send(());
            })));
        }
        for _ in 0..8 {
            done_rx.recv().unwrap();
        }
        pool.shutdown();
        assert_eq!(counter.load(Ordering::SeqCst), 8);
        assert_eq!(pool.worker_count(), 0);
        assert!(!pool.submit(Box::new(|| {})));
    }
}
