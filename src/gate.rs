//! Shared rate gate for quota-bound provider calls.
//!
//! The enrichment quota is expressed as requests per minute. [`RateGate`]
//! spaces call slots a fixed interval apart (`60 / requests_per_minute`
//! seconds) and hands them out in arrival order, so the aggregate call rate
//! stays inside the quota no matter how many workers share the gate.

use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::Instant;

pub struct RateGate {
    interval: Duration,
    next_slot: Mutex<Option<Instant>>,
}

impl RateGate {
    pub fn new(requests_per_minute: u32) -> Self {
        Self::with_interval(Duration::from_secs_f64(
            60.0 / f64::from(requests_per_minute.max(1)),
        ))
    }

    pub fn with_interval(interval: Duration) -> Self {
        Self {
            interval,
            next_slot: Mutex::new(None),
        }
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Wait for the next free call slot.
    ///
    /// The first caller proceeds immediately; every later slot starts
    /// `interval` after the previous one. Callers book their slot under
    /// the lock and sleep outside it.
    pub async fn acquire(&self) {
        let slot = {
            let mut next = self.next_slot.lock().await;
            let now = Instant::now();
            let slot = match *next {
                Some(at) if at > now => at,
                _ => now,
            };
            *next = Some(slot + self.interval);
            slot
        };
        tokio::time::sleep_until(slot).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[tokio::test]
    async fn first_acquire_is_immediate() {
        let gate = RateGate::with_interval(Duration::from_millis(200));
        let start = Instant::now();
        gate.acquire().await;
        assert!(start.elapsed() < Duration::from_millis(100));
    }

    #[tokio::test]
    async fn sequential_acquires_are_spaced_by_interval() {
        let gate = RateGate::with_interval(Duration::from_millis(30));
        let start = Instant::now();
        for _ in 0..3 {
            gate.acquire().await;
        }
        // Three slots: 0ms, 30ms, 60ms.
        assert!(start.elapsed() >= Duration::from_millis(60));
    }

    #[tokio::test]
    async fn concurrent_acquires_share_one_schedule() {
        let gate = Arc::new(RateGate::with_interval(Duration::from_millis(25)));
        let start = Instant::now();

        let mut handles = Vec::new();
        for _ in 0..3 {
            let gate = Arc::clone(&gate);
            handles.push(tokio::spawn(async move { gate.acquire().await }));
        }
        for handle in handles {
            handle.await.unwrap();
        }

        assert!(start.elapsed() >= Duration::from_millis(50));
    }

    #[test]
    fn interval_is_sixty_seconds_over_rpm() {
        assert_eq!(RateGate::new(60).interval(), Duration::from_secs(1));
        assert_eq!(RateGate::new(120).interval(), Duration::from_millis(500));
    }
}
