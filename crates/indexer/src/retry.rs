use std::fmt::Display;
use std::future::Future;
use std::time::Duration;

/// Fixed attempt budget with exponential backoff between attempts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts, including the first one
    pub max_attempts: u32,
    pub initial_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_delay: Duration::from_millis(500),
        }
    }
}

impl RetryPolicy {
    /// Delay after failed attempt `attempt` (1-based): `initial * 2^(attempt-1)`.
    #[must_use]
    pub fn delay_after(&self, attempt: u32) -> Duration {
        self.initial_delay
            .saturating_mul(2u32.saturating_pow(attempt.saturating_sub(1)))
    }

    /// Run `op` until it succeeds or the attempt budget is spent; the last error
    /// is returned.
    pub async fn run<T, E, F, Fut>(&self, label: &str, mut op: F) -> Result<T, E>
    where
        E: Display,
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        let max_attempts = self.max_attempts.max(1);
        let mut attempt = 1;
        loop {
            match op().await {
                Ok(value) => return Ok(value),
                Err(err) if attempt < max_attempts => {
                    let delay = self.delay_after(attempt);
                    log::warn!(
                        "{label} failed (attempt {attempt}/{max_attempts}): {err}; retrying in {}ms",
                        delay.as_millis()
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(err) => {
                    log::error!("{label} failed after {max_attempts} attempts: {err}");
                    return Err(err);
                }
            }
        }
    }
}
