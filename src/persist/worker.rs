//! Bounded writer pool
//!
//! A fixed set of worker threads drains a bounded job queue. Submission is
//! non-blocking: a full queue hands the job back to the caller instead of
//! stalling the trigger loop or spawning extra threads, so a burst of
//! rotations is bounded by queue depth rather than thread count.

use crossbeam::channel::{bounded, Receiver, Sender, TrySendError};
use std::thread;

pub type WriteJob = Box<dyn FnOnce() + Send + 'static>;

pub struct WriterPool {
    sender: Option<Sender<WriteJob>>,
    workers: Vec<thread::JoinHandle<()>>,
}

impl WriterPool {
    pub fn new(threads: usize, queue_depth: usize) -> Self {
        let (sender, receiver) = bounded::<WriteJob>(queue_depth.max(1));

        let workers = (0..threads.max(1))
            .map(|index| {
                let receiver: Receiver<WriteJob> = receiver.clone();
                thread::spawn(move || {
                    log::debug!("writer {} started", index);
                    while let Ok(job) = receiver.recv() {
                        job();
                    }
                    log::debug!("writer {} stopped", index);
                })
            })
            .collect();

        Self {
            sender: Some(sender),
            workers,
        }
    }

    /// Queue a job without blocking. On a full (or closed) queue the job is
    /// returned so the caller can retry on a later tick.
    pub fn try_submit(&self, job: WriteJob) -> Result<(), WriteJob> {
        match &self.sender {
            Some(sender) => sender.try_send(job).map_err(|err| match err {
                TrySendError::Full(job) | TrySendError::Disconnected(job) => job,
            }),
            None => Err(job),
        }
    }

    pub fn worker_count(&self) -> usize {
        self.workers.len()
    }
}

impl Drop for WriterPool {
    fn drop(&mut self) {
        // Closing the channel lets each worker finish its current job and exit
        self.sender.take();
        for handle in self.workers.drain(..) {
            let _ = handle.join();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use std::time::Duration;

    #[test]
    fn test_jobs_run_on_workers() {
        let pool = WriterPool::new(2, 16);
        let counter = Arc::new(AtomicUsize::new(0));

        for _ in 0..10 {
            let counter = counter.clone();
            pool.try_submit(Box::new(move || {
                counter.fetch_add(1, Ordering::SeqCst);
            }))
            .unwrap_or_else(|_| panic!("queue unexpectedly full"));
        }

        drop(pool); // joins workers
        assert_eq!(counter.load(Ordering::SeqCst), 10);
    }

    #[test]
    fn test_full_queue_returns_job() {
        let pool = WriterPool::new(1, 1);
        let gate = Arc::new(AtomicUsize::new(0));

        // Occupy the single worker
        let busy = gate.clone();
        pool.try_submit(Box::new(move || {
            while busy.load(Ordering::SeqCst) == 0 {
                std::thread::sleep(Duration::from_millis(1));
            }
        }))
        .unwrap_or_else(|_| panic!("first submit must succeed"));

        // Fill the single queue slot, then overflow
        std::thread::sleep(Duration::from_millis(10));
        let _ = pool.try_submit(Box::new(|| {}));
        let overflow = pool.try_submit(Box::new(|| {}));
        assert!(overflow.is_err(), "full queue must hand the job back");

        gate.store(1, Ordering::SeqCst);
    }
}
