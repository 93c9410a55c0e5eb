//! Cancellation tokens and the in-flight render registry
//!
//! Every dispatched render carries a [`CancellationToken`]. Cancellation is
//! cooperative: the decoding backend polls the token and bails out early, and
//! the scheduler never blocks waiting for that to happen. The
//! [`CancellationRegistry`] remembers which generation is the live render for
//! each page so that superseded or late results can be recognised.

use crate::priority::Generation;
use std::collections::HashMap;
use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};

/// Returned by [`CancellationToken::check`] once the token has fired.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("render cancelled")]
pub struct Cancelled;

/// Cancellation token for cooperative render cancellation
///
/// Clones share the same underlying flag, so the scheduler can keep one copy
/// while the worker thread holds another.
///
/// # Example
///
/// ```
/// use folio_scheduler::CancellationToken;
///
/// let token = CancellationToken::new();
/// let worker_token = token.clone();
///
/// token.cancel();
/// assert!(worker_token.is_cancelled());
/// assert!(worker_token.check().is_err());
/// ```
#[derive(Debug, Clone, Default)]
pub struct CancellationToken {
    cancelled: Arc<AtomicBool>,
}

impl CancellationToken {
    /// Create a new, non-cancelled token
    pub fn new() -> Self {
        Self::default()
    }

    /// Cancel this token and every clone of it
    ///
    /// Idempotent.
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::Release);
    }

    /// Check whether `cancel()` has been called on this token or any clone
    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::Acquire)
    }

    /// `Err(Cancelled)` once the token has fired
    ///
    /// Convenient for backends that check between work units with `?`.
    pub fn check(&self) -> Result<(), Cancelled> {
        if self.is_cancelled() {
            Err(Cancelled)
        } else {
            Ok(())
        }
    }
}

/// Bookkeeping for one dispatched render
#[derive(Debug, Clone)]
pub struct InFlightRender {
    /// Page being rendered
    pub page_index: u32,

    /// Scale the render was dispatched at
    pub scale: f64,

    /// Token handed to the worker
    pub token: CancellationToken,

    /// Set once the scheduler has given up on this render
    pub cancelled: bool,
}

/// Registry of dispatched renders keyed by generation
///
/// A render stays registered until its completion has been observed, even
/// after it was cancelled, so that dispatch capacity accounts for work the
/// backend may still be doing. Only non-cancelled renders count as the
/// *active* render of their page.
///
/// # Example
///
/// ```
/// use folio_scheduler::CancellationRegistry;
///
/// let mut registry = CancellationRegistry::new();
/// let token = registry.register(1, 7, 1.5);
/// assert_eq!(registry.active_for_page(7), Some(1));
///
/// registry.cancel(1);
/// assert!(token.is_cancelled());
/// assert_eq!(registry.active_for_page(7), None);
/// assert_eq!(registry.len(), 1);
/// ```
#[derive(Debug, Default)]
pub struct CancellationRegistry {
    renders: HashMap<Generation, InFlightRender>,
    active_by_page: HashMap<u32, Generation>,
}

impl CancellationRegistry {
    /// Create a new empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a dispatched render and return the token for the worker
    ///
    /// Any render already active for the same page is cancelled first, which
    /// keeps at most one active render per page.
    pub fn register(&mut self, generation: Generation, page_index: u32, scale: f64) -> CancellationToken {
        if let Some(previous) = self.active_by_page.get(&page_index).copied() {
            self.cancel(previous);
        }

        let token = CancellationToken::new();
        self.renders.insert(
            generation,
            InFlightRender { page_index, scale, token: token.clone(), cancelled: false },
        );
        self.active_by_page.insert(page_index, generation);
        token
    }

    /// Cancel a render by generation
    ///
    /// Returns `true` if the render was registered and not already cancelled.
    pub fn cancel(&mut self, generation: Generation) -> bool {
        let Some(render) = self.renders.get_mut(&generation) else {
            return false;
        };
        if render.cancelled {
            return false;
        }

        render.token.cancel();
        render.cancelled = true;
        if self.active_by_page.get(&render.page_index) == Some(&generation) {
            self.active_by_page.remove(&render.page_index);
        }
        true
    }

    /// Cancel the active render of a page, returning its generation
    pub fn cancel_page(&mut self, page_index: u32) -> Option<Generation> {
        let generation = self.active_by_page.get(&page_index).copied()?;
        self.cancel(generation);
        Some(generation)
    }

    /// Cancel every active render
    ///
    /// Returns the number of renders cancelled.
    pub fn cancel_all(&mut self) -> usize {
        let generations: Vec<Generation> = self.active_by_page.values().copied().collect();
        generations.into_iter().filter(|generation| self.cancel(*generation)).count()
    }

    /// Remove a render once its completion has been observed
    pub fn unregister(&mut self, generation: Generation) -> Option<InFlightRender> {
        let render = self.renders.remove(&generation)?;
        if self.active_by_page.get(&render.page_index) == Some(&generation) {
            self.active_by_page.remove(&render.page_index);
        }
        Some(render)
    }

    /// Generation of the active (non-cancelled) render for a page
    pub fn active_for_page(&self, page_index: u32) -> Option<Generation> {
        self.active_by_page.get(&page_index).copied()
    }

    /// Scale of the active render for a page
    pub fn active_scale(&self, page_index: u32) -> Option<f64> {
        let generation = self.active_for_page(page_index)?;
        self.renders.get(&generation).map(|render| render.scale)
    }

    /// Snapshot of active renders as `(page_index, generation, scale)`
    pub fn active(&self) -> Vec<(u32, Generation, f64)> {
        let mut active: Vec<_> = self
            .active_by_page
            .iter()
            .filter_map(|(page, generation)| {
                self.renders.get(generation).map(|render| (*page, *generation, render.scale))
            })
            .collect();
        active.sort_by_key(|(page, _, _)| *page);
        active
    }

    /// Number of active (non-cancelled) renders
    pub fn active_len(&self) -> usize {
        self.active_by_page.len()
    }

    /// Number of registered renders, including cancelled ones whose
    /// completion has not been observed yet
    pub fn len(&self) -> usize {
        self.renders.len()
    }

    /// Check if no render is registered
    pub fn is_empty(&self) -> bool {
        self.renders.is_empty()
    }
}
