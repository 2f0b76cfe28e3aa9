//! Admission gate shared by every upstream request.
//!
//! The gate does two things:
//!
//! 1. bounds the number of in-flight requests with a semaphore, and
//! 2. holds a single global "suspended until" instant. When any request is
//!    rate limited, the gate closes for everybody until the announced reset
//!    time, instead of every caller retrying on its own schedule.

use std::sync::Mutex;
use std::time::Duration;
use tokio::sync::{Semaphore, SemaphorePermit};
use tokio::time::{Instant, sleep_until};
use tracing::{debug, warn};

#[derive(Debug)]
pub struct RequestGate {
    permits: Semaphore,
    suspended_until: Mutex<Option<Instant>>,
}

impl RequestGate {
    /// Creates a gate admitting at most `max_concurrent` requests at a time.
    pub fn new(max_concurrent: usize) -> Self {
        Self {
            permits: Semaphore::new(max_concurrent.max(1)),
            suspended_until: Mutex::new(None),
        }
    }

    fn resume_at(&self) -> Option<Instant> {
        let guard = self
            .suspended_until
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        (*guard).filter(|until| *until > Instant::now())
    }

    /// Waits until the gate is open and a concurrency slot is free.
    pub async fn acquire(&self) -> SemaphorePermit<'_> {
        loop {
            if let Some(until) = self.resume_at() {
                debug!(wait = ?until.saturating_duration_since(Instant::now()), "Request gate suspended, waiting");
                sleep_until(until).await;
            }
            // The semaphore is never closed, so acquire can't fail.
            let Ok(permit) = self.permits.acquire().await else {
                continue;
            };
            // Someone may have been rate limited while we queued for a slot.
            if self.resume_at().is_none() {
                return permit;
            }
        }
    }

    /// Closes the gate for `delay`. Overlapping suspensions keep the later
    /// deadline.
    pub fn suspend_for(&self, delay: Duration) {
        let until = Instant::now() + delay;
        let mut guard = self
            .suspended_until
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        if guard.is_none_or(|current| current < until) {
            warn!(?delay, "Rate limited, suspending all upstream requests");
            *guard = Some(until);
        }
    }

    /// True while a suspension is in effect.
    pub fn is_suspended(&self) -> bool {
        self.resume_at().is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[tokio::test(start_paused = true)]
    async fn test_suspension_delays_all_callers() {
        let gate = Arc::new(RequestGate::new(4));
        let start = Instant::now();
        gate.suspend_for(Duration::from_secs(30));
        assert!(gate.is_suspended());

        let mut handles = Vec::new();
        for _ in 0..3 {
            let gate = gate.clone();
            handles.push(tokio::spawn(async move {
                let _permit = gate.acquire().await;
                Instant::now()
            }));
        }
        for handle in handles {
            let admitted = handle.await.unwrap();
            assert!(admitted.duration_since(start) >= Duration::from_secs(30));
        }
        assert!(!gate.is_suspended());
    }

    #[tokio::test(start_paused = true)]
    async fn test_later_deadline_wins() {
        let gate = RequestGate::new(1);
        let start = Instant::now();
        gate.suspend_for(Duration::from_secs(60));
        gate.suspend_for(Duration::from_secs(10));
        let _permit = gate.acquire().await;
        assert!(start.elapsed() >= Duration::from_secs(60));
    }

    #[tokio::test]
    async fn test_open_gate_admits_immediately() {
        let gate = RequestGate::new(2);
        let first = gate.acquire().await;
        let second = gate.acquire().await;
        assert_eq!(gate.permits.available_permits(), 0);
        drop(first);
        drop(second);
        assert_eq!(gate.permits.available_permits(), 2);
    }
}
