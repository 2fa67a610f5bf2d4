use std::future::Future;
use std::time::Duration;

/// Doubling backoff for operations that wait on an external service.
#[derive(Clone, Copy, Debug)]
pub struct Backoff {
    attempts: usize,
    first_delay: Duration,
    max_delay: Duration,
}

impl Backoff {
    /// `attempts` tries in total, the first retry after `first_delay`.
    pub fn new(attempts: usize, first_delay: Duration) -> Self {
        Self {
            attempts: attempts.max(1),
            first_delay,
            max_delay: first_delay * 16,
        }
    }

    pub fn with_max_delay(mut self, max_delay: Duration) -> Self {
        self.max_delay = max_delay;
        self
    }

    /// Delay before retry number `retry` (starting at 1).
    pub fn delay(&self, retry: usize) -> Duration {
        let shift = u32::try_from(retry.saturating_sub(1)).unwrap_or(u32::MAX).min(16);
        self.first_delay
            .saturating_mul(1u32 << shift)
            .min(self.max_delay)
    }

    /// Run `op` until it succeeds, returning the last error once attempts run out.
    pub async fn retry<F, Fut, T, E>(&self, mut op: F) -> Result<T, E>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        let mut retry = 0;
        loop {
            match op().await {
                Ok(value) => return Ok(value),
                Err(err) if retry + 1 >= self.attempts => return Err(err),
                Err(_) => {
                    retry += 1;
                    tokio::time::sleep(self.delay(retry)).await;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tokio::time::Instant;

    #[test]
    fn delays_double_up_to_the_cap() {
        let backoff = Backoff::new(10, Duration::from_millis(100))
            .with_max_delay(Duration::from_millis(500));
        let delays: Vec<_> = (1..=5).map(|n| backoff.delay(n)).collect();
        assert_eq!(
            delays,
            [100, 200, 400, 500, 500].map(Duration::from_millis).to_vec()
        );
    }

    #[tokio::test(start_paused = true)]
    async fn retries_until_success() {
        let calls = AtomicUsize::new(0);
        let started = Instant::now();
        let value = Backoff::new(5, Duration::from_millis(10))
            .retry(|| async {
                if calls.fetch_add(1, Ordering::SeqCst) < 2 {
                    Err("not yet")
                } else {
                    Ok(7)
                }
            })
            .await
            .unwrap();
        assert_eq!(value, 7);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
        assert_eq!(started.elapsed(), Duration::from_millis(30));
    }

    #[tokio::test(start_paused = true)]
    async fn gives_up_with_the_last_error() {
        let calls = AtomicUsize::new(0);
        let result: Result<(), usize> = Backoff::new(3, Duration::from_millis(10))
            .retry(|| async { Err(calls.fetch_add(1, Ordering::SeqCst)) })
            .await;
        assert_eq!(result, Err(2));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }
}
