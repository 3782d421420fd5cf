//! Skip debouncing.
//!
//! Rapid skip presses accumulate into one delta. The seek is issued once the
//! presses stop for the quiet period.

use crate::model::Ticks;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

#[derive(Debug, Default)]
pub struct SkipDebouncer {
    pending: Ticks,
    generation: u64,
    token: Option<CancellationToken>,
}

impl SkipDebouncer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add `delta` to the pending skip and restart the quiet timer.
    ///
    /// When the timer elapses `make(generation)` is sent on `tx`; the session
    /// then calls [`take`](Self::take) with that generation. Returns the
    /// accumulated delta.
    pub fn push<T, F>(
        &mut self,
        delta: Ticks,
        quiet: Duration,
        tx: mpsc::UnboundedSender<T>,
        make: F,
    ) -> Ticks
    where
        T: Send + 'static,
        F: FnOnce(u64) -> T + Send + 'static,
    {
        if let Some(token) = self.token.take() {
            token.cancel();
        }
        self.pending += delta;
        self.generation += 1;

        let generation = self.generation;
        let token = CancellationToken::new();
        let cancelled = token.clone();
        tokio::spawn(async move {
            tokio::select! {
                _ = cancelled.cancelled() => {}
                _ = tokio::time::sleep(quiet) => {
                    let _ = tx.send(make(generation));
                }
            }
        });
        self.token = Some(token);

        self.pending
    }

    /// Claim the accumulated delta if `generation` is the latest timer.
    pub fn take(&mut self, generation: u64) -> Option<Ticks> {
        if self.token.is_none() || generation != self.generation {
            return None;
        }
        self.token = None;
        Some(std::mem::take(&mut self.pending))
    }

    /// Drop any pending skip.
    pub fn cancel(&mut self) {
        if let Some(token) = self.token.take() {
            token.cancel();
            self.generation += 1;
        }
        self.pending = Ticks::ZERO;
    }

    pub fn is_pending(&self) -> bool {
        self.token.is_some()
    }

    pub fn pending(&self) -> Ticks {
        self.pending
    }
}
