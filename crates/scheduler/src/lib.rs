//! Folio Scheduler Library
//!
//! Page render scheduling with cancellable, generation-tagged tasks.
//!
//! This crate decides which page renders run and in what order. Renders for
//! visible pages run before renders for buffered pages, and within each group
//! pages nearer the viewport center come first. Each dispatched render carries
//! a generation token so that results arriving after a cancellation are
//! recognised and dropped.
//!
//! # Example
//!
//! ```
//! use folio_scheduler::{
//!     CancellationToken, CompletionVerdict, PageGeometry, RenderFailure, RenderScheduler,
//!     RenderTask, RenderWorkerPool, WorkerPoolConfig,
//! };
//! use std::collections::BTreeSet;
//! use std::sync::Arc;
//! use std::time::Duration;
//!
//! struct Letter;
//!
//! impl PageGeometry for Letter {
//!     fn page_scale(&self, _page: u32) -> Option<f64> {
//!         Some(1.0)
//!     }
//!     fn page_center(&self, page: u32) -> Option<f64> {
//!         Some(12.0 + page as f64 * 804.0 + 396.0)
//!     }
//! }
//!
//! let executor = Arc::new(
//!     |task: &RenderTask, token: &CancellationToken| -> Result<u32, RenderFailure> {
//!         token.check()?;
//!         Ok(task.page_index)
//!     },
//! );
//! let pool = RenderWorkerPool::new(executor, WorkerPoolConfig::default()).unwrap();
//! let mut scheduler = RenderScheduler::new(1);
//!
//! let needed: BTreeSet<u32> = (0..=4).collect();
//! scheduler.reconcile(&needed, 0..=1, &Letter, 400.0);
//!
//! while !scheduler.is_idle() {
//!     if let Some((task, token)) = scheduler.next_dispatch() {
//!         pool.submit(task, token);
//!     }
//!     let completion = pool.recv_timeout(Duration::from_secs(5)).unwrap();
//!     let verdict = scheduler.complete(completion.task.generation, &completion.result);
//!     assert_eq!(verdict, CompletionVerdict::Accepted);
//! }
//!
//! pool.shutdown();
//! ```

mod cancel;
mod frame;
mod priority;
mod scheduler;
mod worker;

// Re-export public API
pub use cancel::{CancellationRegistry, CancellationToken, Cancelled, InFlightRender};
pub use frame::{FrameBudget, FrameCoalescer, FrameWork, FRAME_BUDGET_60FPS};
pub use priority::{
    scales_match, Generation, PageGeometry, PendingRender, RenderPriority, RenderTask,
    SCALE_TOLERANCE,
};
pub use scheduler::{
    CompletionVerdict, ReconcileReport, RenderFailure, RenderScheduler, SchedulerStats,
};
pub use worker::{RenderCompletion, RenderExecutor, RenderWorkerPool, WorkerPoolConfig};
