//! Render worker pool
//!
//! Dispatched renders are sent to a small pool of worker threads over a
//! channel; each worker runs the executor callback and sends a
//! [`RenderCompletion`] back. The owner drains completions from its own
//! event loop, so the scheduler itself never leaves that thread.

use crate::cancel::CancellationToken;
use crate::priority::RenderTask;
use crate::scheduler::RenderFailure;
use std::io;
use std::panic::{self, AssertUnwindSafe};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, Sender};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};
use std::time::Duration;

/// Callback that performs one render
///
/// Receives the task and its cancellation token. It should check the token
/// between units of work and return `Err(RenderFailure::Cancelled)` as soon
/// as it fires.
pub type RenderExecutor<P> =
    Arc<dyn Fn(&RenderTask, &CancellationToken) -> Result<P, RenderFailure> + Send + Sync>;

/// Result of one render, sent back to the pool's owner
#[derive(Debug)]
pub struct RenderCompletion<P> {
    /// The task as it was dispatched
    pub task: RenderTask,

    /// Rendered payload or the reason there is none
    pub result: Result<P, RenderFailure>,
}

/// Configuration for the render worker pool.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkerPoolConfig {
    /// Number of worker threads to spawn.
    /// Default: 1, matching strictly sequential rendering.
    pub num_workers: usize,

    /// Thread name prefix.
    pub thread_name: String,
}

impl Default for WorkerPoolConfig {
    fn default() -> Self {
        Self::new(1)
    }
}

impl WorkerPoolConfig {
    /// Create a new worker pool configuration.
    pub fn new(num_workers: usize) -> Self {
        Self { num_workers: num_workers.max(1), thread_name: "folio-render".to_owned() }
    }

    /// Set the thread name prefix.
    pub fn with_thread_name(mut self, name: impl Into<String>) -> Self {
        self.thread_name = name.into();
        self
    }
}

type Dispatch = (RenderTask, CancellationToken);

/// Pool of render worker threads
///
/// # Example
///
/// ```
/// use folio_scheduler::{
///     CancellationToken, RenderFailure, RenderPriority, RenderTask, RenderWorkerPool,
///     WorkerPoolConfig,
/// };
/// use std::sync::Arc;
/// use std::time::Duration;
///
/// let executor = Arc::new(|task: &RenderTask, token: &CancellationToken| -> Result<u32, RenderFailure> {
///     token.check()?;
///     Ok(task.page_index * 2)
/// });
/// let pool = RenderWorkerPool::new(executor, WorkerPoolConfig::default()).unwrap();
///
/// let task = RenderTask { generation: 1, page_index: 21, scale: 1.0, priority: RenderPriority::Visible };
/// assert!(pool.submit(task, CancellationToken::new()));
///
/// let completion = pool.recv_timeout(Duration::from_secs(5)).unwrap();
/// assert_eq!(completion.result, Ok(42));
/// pool.shutdown();
/// ```
pub struct RenderWorkerPool<P> {
    sender: Option<Sender<Dispatch>>,
    completions: Receiver<RenderCompletion<P>>,
    workers: Vec<JoinHandle<()>>,
}

impl<P: Send + 'static> RenderWorkerPool<P> {
    /// Spawn the worker threads.
    ///
    /// # Errors
    /// Returns an error if a thread cannot be spawned.
    pub fn new(executor: RenderExecutor<P>, config: WorkerPoolConfig) -> io::Result<Self> {
        let (sender, receiver) = mpsc::channel::<Dispatch>();
        let (completion_tx, completions) = mpsc::channel();
        let receiver = Arc::new(Mutex::new(receiver));

        let mut workers = Vec::with_capacity(config.num_workers);
        for id in 0..config.num_workers {
            let receiver = Arc::clone(&receiver);
            let executor = Arc::clone(&executor);
            let completion_tx = completion_tx.clone();

            let handle = thread::Builder::new()
                .name(format!("{}-{}", config.thread_name, id))
                .spawn(move || run_worker(&receiver, &executor, &completion_tx))?;
            workers.push(handle);
        }

        tracing::debug!(workers = workers.len(), "render worker pool started");
        Ok(Self { sender: Some(sender), completions, workers })
    }

    /// Hand a render to the next free worker.
    ///
    /// Returns `false` if the pool has shut down.
    pub fn submit(&self, task: RenderTask, token: CancellationToken) -> bool {
        self.sender.as_ref().is_some_and(|sender| sender.send((task, token)).is_ok())
    }

    /// Take a completion if one is ready.
    pub fn try_recv(&self) -> Option<RenderCompletion<P>> {
        self.completions.try_recv().ok()
    }

    /// Wait up to `timeout` for a completion.
    pub fn recv_timeout(&self, timeout: Duration) -> Option<RenderCompletion<P>> {
        match self.completions.recv_timeout(timeout) {
            Ok(completion) => Some(completion),
            Err(RecvTimeoutError::Timeout | RecvTimeoutError::Disconnected) => None,
        }
    }

    /// Get the number of worker threads.
    pub fn num_workers(&self) -> usize {
        self.workers.len()
    }

    /// Stop accepting work and wait for the workers to exit.
    ///
    /// Workers finish the render they are executing; cancel its token first
    /// to make that prompt.
    pub fn shutdown(mut self) {
        self.sender = None;
        for worker in self.workers.drain(..) {
            if worker.join().is_err() {
                tracing::warn!("render worker exited with a panic");
            }
        }
    }
}

impl<P> Drop for RenderWorkerPool<P> {
    fn drop(&mut self) {
        // Closing the channel lets idle workers exit; busy ones are detached.
        self.sender = None;
    }
}

fn run_worker<P>(
    receiver: &Mutex<Receiver<Dispatch>>,
    executor: &RenderExecutor<P>,
    completions: &Sender<RenderCompletion<P>>,
) {
    loop {
        let next = match receiver.lock() {
            Ok(receiver) => receiver.recv(),
            Err(_) => break,
        };
        let Ok((task, token)) = next else {
            break;
        };

        let result = if token.is_cancelled() {
            Err(RenderFailure::Cancelled)
        } else {
            panic::catch_unwind(AssertUnwindSafe(|| executor(&task, &token))).unwrap_or_else(|_| {
                Err(RenderFailure::Failed(format!("renderer panicked on page {}", task.page_index)))
            })
        };

        if completions.send(RenderCompletion { task, result }).is_err() {
            break;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::priority::RenderPriority;
    use std::sync::atomic::{AtomicUsize, Ordering};

    const WAIT: Duration = Duration::from_secs(5);

    fn task(generation: u64, page_index: u32) -> RenderTask {
        RenderTask { generation, page_index, scale: 1.0, priority: RenderPriority::Visible }
    }

    #[test]
    fn test_worker_pool_config() {
        assert_eq!(WorkerPoolConfig::default().num_workers, 1);
        assert_eq!(WorkerPoolConfig::new(0).num_workers, 1);

        let config = WorkerPoolConfig::new(3).with_thread_name("thumbs");
        assert_eq!(config.num_workers, 3);
        assert_eq!(config.thread_name, "thumbs");
    }

    #[test]
    fn test_worker_pool_executes_in_submission_order() {
        let executor: RenderExecutor<u32> = Arc::new(|task: &RenderTask, _token: &CancellationToken| Ok(task.page_index));
        let pool = RenderWorkerPool::new(executor, WorkerPoolConfig::new(1)).unwrap();

        for (generation, page) in [(1, 5), (2, 3), (3, 9)] {
            assert!(pool.submit(task(generation, page), CancellationToken::new()));
        }

        let pages: Vec<u32> = (0..3)
            .map(|_| pool.recv_timeout(WAIT).unwrap().result.unwrap())
            .collect();
        assert_eq!(pages, vec![5, 3, 9]);
        pool.shutdown();
    }

    #[test]
    fn test_cancelled_before_start_skips_executor() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&calls);
        let executor: RenderExecutor<()> = Arc::new(move |_task: &RenderTask, _token: &CancellationToken| {
            counter.fetch_add(1, Ordering::SeqCst);
            Ok(())
        });
        let pool = RenderWorkerPool::new(executor, WorkerPoolConfig::new(1)).unwrap();

        let token = CancellationToken::new();
        token.cancel();
        pool.submit(task(1, 0), token);

        let completion = pool.recv_timeout(WAIT).unwrap();
        assert_eq!(completion.result, Err(RenderFailure::Cancelled));
        assert_eq!(calls.load(Ordering::SeqCst), 0);
        pool.shutdown();
    }

    #[test]
    fn test_panicking_executor_reports_failure() {
        let executor: RenderExecutor<()> = Arc::new(|task: &RenderTask, _token: &CancellationToken| {
            if task.page_index == 13 {
                panic!("bad page");
            }
            Ok(())
        });
        let pool = RenderWorkerPool::new(executor, WorkerPoolConfig::new(1)).unwrap();

        pool.submit(task(1, 13), CancellationToken::new());
        pool.submit(task(2, 14), CancellationToken::new());

        let first = pool.recv_timeout(WAIT).unwrap();
        assert!(matches!(first.result, Err(RenderFailure::Failed(_))));
        let second = pool.recv_timeout(WAIT).unwrap();
        assert_eq!(second.task.page_index, 14);
        assert!(second.result.is_ok());
        pool.shutdown();
    }

    #[test]
    fn test_try_recv_empty() {
        let executor: RenderExecutor<()> = Arc::new(|_task: &RenderTask, _token: &CancellationToken| Ok(()));
        let pool = RenderWorkerPool::new(executor, WorkerPoolConfig::new(2)).unwrap();
        assert_eq!(pool.num_workers(), 2);
        assert!(pool.try_recv().is_none());
        pool.shutdown();
    }
}
