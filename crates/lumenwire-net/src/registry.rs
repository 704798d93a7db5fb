//! Destination error registry
//!
//! Every resolved destination address has exactly one [`ErrorState`], shared
//! by all packets and streams pointed at it, so that outputs addressing the
//! same device back off on one clock.
//!
//! # States
//!
//! - **Healthy**: no consecutive failures
//! - **Degraded**: 1-2 failures, sends still attempted every frame
//! - **Backoff**: 3+ failures, sends wait until `retry_not_before`
//!   (50ms doubling per failure, capped at 1600ms)

use parking_lot::Mutex;
use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::packet::{SendOutcome, SkipReason};

/// Consecutive failures before backoff kicks in
pub const FAILURE_THRESHOLD: u32 = 3;
/// Backoff after the threshold-th failure
pub const BASE_BACKOFF: Duration = Duration::from_millis(50);
/// Cap on the backoff doubling exponent
pub const MAX_BACKOFF_EXPONENT: u32 = 5;

/// Health classification of a destination
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Health {
    Healthy,
    Degraded,
    Backoff,
}

/// Failure bookkeeping for one destination
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ErrorState {
    consecutive_failures: u32,
    total_failures: u64,
    retry_not_before: Option<Instant>,
}

/// Shared handle to a destination's state
pub type ErrorHandle = Arc<Mutex<ErrorState>>;

impl ErrorState {
    /// Failures since the last success
    pub fn consecutive_failures(&self) -> u32 {
        self.consecutive_failures
    }

    /// Failures over the lifetime of the destination, never reset
    pub fn total_failures(&self) -> u64 {
        self.total_failures
    }

    /// Earliest instant the next attempt may be made
    pub fn retry_not_before(&self) -> Option<Instant> {
        self.retry_not_before
    }

    pub fn health(&self) -> Health {
        match self.consecutive_failures {
            0 => Health::Healthy,
            n if n < FAILURE_THRESHOLD => Health::Degraded,
            _ => Health::Backoff,
        }
    }

    /// Whether the destination is failing badly enough to flag
    pub fn is_error(&self) -> bool {
        self.consecutive_failures >= FAILURE_THRESHOLD
    }

    /// Whether an attempt at `now` is allowed
    pub fn can_send(&self, now: Instant) -> bool {
        self.retry_not_before.map_or(true, |t| now >= t)
    }

    /// Record a successful send. Returns the failure count it recovered from,
    /// if any.
    pub fn record_success(&mut self) -> Option<u32> {
        let previous = self.consecutive_failures;
        self.consecutive_failures = 0;
        self.retry_not_before = None;
        (previous > 0).then_some(previous)
    }

    /// Record a failed send at `now`. Returns the backoff applied, if any.
    pub fn record_failure(&mut self, now: Instant) -> Option<Duration> {
        self.consecutive_failures = self.consecutive_failures.saturating_add(1);
        self.total_failures = self.total_failures.saturating_add(1);
        let delay = backoff_delay(self.consecutive_failures)?;
        self.retry_not_before = Some(now + delay);
        Some(delay)
    }
}

/// Backoff after `failures` consecutive failures, `None` below the threshold
pub fn backoff_delay(failures: u32) -> Option<Duration> {
    if failures < FAILURE_THRESHOLD {
        return None;
    }
    let exponent = (failures - FAILURE_THRESHOLD).min(MAX_BACKOFF_EXPONENT);
    Some(BASE_BACKOFF * (1u32 << exponent))
}

/// Run `send` against `addr` unless its destination is backing off, and fold
/// the result into `state`. The lock is not held while sending.
pub(crate) fn attempt<F>(state: &ErrorHandle, addr: SocketAddr, now: Instant, send: F) -> SendOutcome
where
    F: FnOnce() -> std::io::Result<()>,
{
    if !state.lock().can_send(now) {
        return SendOutcome::Skipped(SkipReason::Backoff);
    }

    match send() {
        Ok(()) => {
            if let Some(failures) = state.lock().record_success() {
                tracing::info!("{} recovered after {} failed sends", addr, failures);
            }
            SendOutcome::Sent
        }
        Err(e) => {
            let mut state = state.lock();
            match state.record_failure(now) {
                Some(delay) => tracing::warn!(
                    "Send to {} failed {} times ({}), backing off {:?}",
                    addr,
                    state.consecutive_failures(),
                    e,
                    delay
                ),
                None => tracing::debug!("Send to {} failed: {}", addr, e),
            }
            SendOutcome::Failed
        }
    }
}

/// Table of destination states keyed by resolved address
#[derive(Debug, Default)]
pub struct DestinationRegistry {
    entries: Mutex<HashMap<SocketAddr, ErrorHandle>>,
}

impl DestinationRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Convenience for sharing one registry between outputs
    pub fn shared() -> Arc<Self> {
        Arc::new(Self::new())
    }

    /// State for `addr`, created on first use
    pub fn handle(&self, addr: SocketAddr) -> ErrorHandle {
        self.entries
            .lock()
            .entry(addr)
            .or_insert_with(|| {
                tracing::debug!("Tracking new destination {}", addr);
                Arc::new(Mutex::new(ErrorState::default()))
            })
            .clone()
    }

    /// Copy of the state for `addr`, if it has been used
    pub fn get(&self, addr: &SocketAddr) -> Option<ErrorState> {
        self.entries.lock().get(addr).map(|h| h.lock().clone())
    }

    /// Every tracked destination with its current state
    pub fn snapshot(&self) -> Vec<(SocketAddr, ErrorState)> {
        let mut all: Vec<_> = self
            .entries
            .lock()
            .iter()
            .map(|(addr, h)| (*addr, h.lock().clone()))
            .collect();
        all.sort_by_key(|(addr, _)| *addr);
        all
    }

    /// Destinations currently waiting out a backoff
    pub fn failing(&self) -> Vec<SocketAddr> {
        self.snapshot()
            .into_iter()
            .filter(|(_, state)| state.is_error())
            .map(|(addr, _)| addr)
            .collect()
    }

    /// Forget the failure history of `addr`
    pub fn reset(&self, addr: &SocketAddr) {
        if let Some(handle) = self.entries.lock().get(addr) {
            *handle.lock() = ErrorState::default();
        }
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn addr(port: u16) -> SocketAddr {
        SocketAddr::from(([10, 0, 0, 1], port))
    }

    #[test]
    fn test_backoff_schedule() {
        let expected = [50, 100, 200, 400, 800, 1600, 1600];
        for (failures, ms) in (3..=9).zip(expected) {
            assert_eq!(
                backoff_delay(failures),
                Some(Duration::from_millis(ms)),
                "failures = {}",
                failures
            );
        }
        assert_eq!(backoff_delay(1), None);
        assert_eq!(backoff_delay(2), None);
    }

    #[test]
    fn test_state_machine() {
        let t0 = Instant::now();
        let mut state = ErrorState::default();
        assert_eq!(state.health(), Health::Healthy);

        assert_eq!(state.record_failure(t0), None);
        assert_eq!(state.record_failure(t0), None);
        assert_eq!(state.health(), Health::Degraded);
        assert!(state.can_send(t0));
        assert!(!state.is_error());

        assert_eq!(state.record_failure(t0), Some(Duration::from_millis(50)));
        assert_eq!(state.health(), Health::Backoff);
        assert!(state.is_error());
        assert_eq!(state.retry_not_before(), Some(t0 + Duration::from_millis(50)));
        assert!(!state.can_send(t0 + Duration::from_millis(49)));
        assert!(state.can_send(t0 + Duration::from_millis(50)));

        assert_eq!(state.record_success(), Some(3));
        assert_eq!(state.health(), Health::Healthy);
        assert_eq!(state.retry_not_before(), None);
        assert_eq!(state.total_failures(), 3);
        assert_eq!(state.record_success(), None);
    }

    #[test]
    fn test_retry_not_before_tracks_failure_time() {
        let t0 = Instant::now();
        let mut state = ErrorState::default();
        for failures in 1..=9u32 {
            let now = t0 + Duration::from_secs(failures as u64);
            state.record_failure(now);
            if let Some(delay) = backoff_delay(failures) {
                assert_eq!(state.retry_not_before(), Some(now + delay));
            }
        }
    }

    #[test]
    fn test_handles_are_shared_per_address() {
        let registry = DestinationRegistry::new();
        let a = registry.handle(addr(6454));
        let b = registry.handle(addr(6454));
        let other = registry.handle(addr(6455));
        assert!(Arc::ptr_eq(&a, &b));
        assert!(!Arc::ptr_eq(&a, &other));
        assert_eq!(registry.len(), 2);

        a.lock().record_failure(Instant::now());
        assert_eq!(b.lock().consecutive_failures(), 1);
        assert_eq!(registry.get(&addr(6454)).unwrap().consecutive_failures(), 1);
    }

    #[test]
    fn test_attempt_skips_during_backoff() {
        let t0 = Instant::now();
        let handle: ErrorHandle = Default::default();
        let fail = || -> std::io::Result<()> { Err(std::io::Error::new(std::io::ErrorKind::Other, "down")) };

        for _ in 0..3 {
            assert_eq!(attempt(&handle, addr(1), t0, fail), SendOutcome::Failed);
        }
        let mut called = false;
        let outcome = attempt(&handle, addr(1), t0 + Duration::from_millis(10), || {
            called = true;
            Ok(())
        });
        assert_eq!(outcome, SendOutcome::Skipped(SkipReason::Backoff));
        assert!(!called);
        assert_eq!(handle.lock().consecutive_failures(), 3);

        let later = t0 + Duration::from_millis(50);
        assert_eq!(attempt(&handle, addr(1), later, || Ok(())), SendOutcome::Sent);
        assert_eq!(handle.lock().health(), Health::Healthy);
        assert_eq!(handle.lock().total_failures(), 3);
    }

    #[test]
    fn test_snapshot_and_reset() {
        let registry = DestinationRegistry::new();
        let now = Instant::now();
        let h = registry.handle(addr(1));
        registry.handle(addr(2));
        for _ in 0..3 {
            h.lock().record_failure(now);
        }
        assert_eq!(registry.failing(), vec![addr(1)]);
        assert_eq!(registry.snapshot().len(), 2);

        registry.reset(&addr(1));
        assert!(registry.failing().is_empty());
        assert_eq!(h.lock().total_failures(), 0);
    }
}
