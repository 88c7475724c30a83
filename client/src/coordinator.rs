//! Single-flight credential refresh.
//!
//! Any number of request chains may observe a 401 at the same moment.
//! The first one to arrive runs the refresh; everyone else queues behind
//! it and is released once it finishes, whatever the outcome. Released
//! waiters are not told whether the refresh worked: they retry their
//! request and find out from the response.
//!
//! Each successful refresh starts a new credential generation. A caller
//! whose 401 answers a request sent before the latest refresh is released
//! at once instead of refreshing again.

use std::collections::VecDeque;
use std::sync::Arc;
use std::sync::Mutex;
use std::sync::PoisonError;

use tokio::sync::oneshot;

use crate::refresh::CredentialRefresher;

/// What a caller of [`RefreshCoordinator::coordinate_refresh`] should do next.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RefreshOutcome {
    /// This caller ran the refresh and it succeeded.
    Refreshed,
    /// This caller ran the refresh and it failed.
    Failed,
    /// Another caller ran the refresh, or the credential was renewed after
    /// this caller's request was sent.
    Released,
}

impl RefreshOutcome {
    /// Whether the original request should be issued again.
    pub fn should_retry(self) -> bool {
        !matches!(self, Self::Failed)
    }
}

#[derive(Debug, Default)]
struct RefreshState {
    refreshing: bool,
    generation: u64,
    waiters: VecDeque<oneshot::Sender<()>>,
}

pub struct RefreshCoordinator {
    refresher: Arc<dyn CredentialRefresher>,
    state: Mutex<RefreshState>,
}

impl std::fmt::Debug for RefreshCoordinator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RefreshCoordinator")
            .field("refreshing", &self.is_refreshing())
            .field("generation", &self.generation())
            .field("pending_waiters", &self.pending_waiters())
            .finish_non_exhaustive()
    }
}

/// Ends the in-flight refresh and wakes every waiter, even if the
/// refreshing future is dropped part-way.
struct ReleaseOnDrop<'a> {
    state: &'a Mutex<RefreshState>,
}

impl Drop for ReleaseOnDrop<'_> {
    fn drop(&mut self) {
        let waiters = {
            let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
            state.refreshing = false;
            std::mem::take(&mut state.waiters)
        };
        let released = waiters.len();
        for waiter in waiters {
            // A waiter whose request was dropped has hung up; nothing to do.
            let _ = waiter.send(());
        }
        if released > 0 {
            tracing::debug!(released, "released refresh waiters");
        }
    }
}

impl RefreshCoordinator {
    pub fn new(refresher: Arc<dyn CredentialRefresher>) -> Self {
        Self {
            refresher,
            state: Mutex::new(RefreshState::default()),
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, RefreshState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn is_refreshing(&self) -> bool {
        self.lock().refreshing
    }

    /// Number of successful refreshes so far. Record it before sending a
    /// request and pass it to [`Self::coordinate_refresh`] on a 401.
    pub fn generation(&self) -> u64 {
        self.lock().generation
    }

    /// Callers currently queued behind an in-flight refresh.
    pub fn pending_waiters(&self) -> usize {
        self.lock().waiters.len()
    }

    /// Refresh the credential, or wait for the refresh already running.
    ///
    /// `sent_generation` is the [`Self::generation`] observed when the
    /// rejected request was sent.
    pub async fn coordinate_refresh(&self, sent_generation: u64) -> RefreshOutcome {
        let waiter = {
            let mut state = self.lock();
            if state.generation != sent_generation && !state.refreshing {
                tracing::debug!(
                    sent_generation,
                    current = state.generation,
                    "credential already renewed"
                );
                return RefreshOutcome::Released;
            }
            if state.refreshing {
                let (tx, rx) = oneshot::channel();
                state.waiters.push_back(tx);
                Some(rx)
            } else {
                state.refreshing = true;
                None
            }
        };

        if let Some(rx) = waiter {
            // The sender is always consumed by `ReleaseOnDrop`; an error
            // would only mean it was dropped, which is a release too.
            let _ = rx.await;
            return RefreshOutcome::Released;
        }

        let release = ReleaseOnDrop { state: &self.state };
        let refreshed = self.refresher.refresh().await;
        if refreshed {
            self.lock().generation += 1;
        }
        drop(release);

        if refreshed {
            tracing::info!("credential refreshed");
            RefreshOutcome::Refreshed
        } else {
            tracing::info!("credential refresh failed");
            RefreshOutcome::Failed
        }
    }
}
