use std::fmt::Display;
use std::future::Future;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::time::sleep;
use tracing::warn;

/// Bounded attempts with a fixed pause between them.
///
/// The policy only reports how the last attempt ended; the call site decides
/// whether exhaustion means falling back (customization) or failing
/// (submission).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetryPolicy {
    /// Total attempts, including the first. Zero is treated as one.
    pub max_attempts: u32,
    /// Fixed delay in milliseconds between attempts.
    pub backoff_ms: u64,
}

impl RetryPolicy {
    pub const fn new(max_attempts: u32, backoff_ms: u64) -> Self {
        Self {
            max_attempts,
            backoff_ms,
        }
    }

    /// Three attempts two seconds apart.
    pub const fn customization() -> Self {
        Self::new(3, 2_000)
    }

    /// Three attempts five seconds apart.
    pub const fn submission() -> Self {
        Self::new(3, 5_000)
    }

    /// Three attempts one second apart.
    pub const fn ledger() -> Self {
        Self::new(3, 1_000)
    }

    pub fn backoff(&self) -> Duration {
        Duration::from_millis(self.backoff_ms)
    }

    /// Run `op` until it succeeds or the attempt bound is reached.
    ///
    /// `op` receives the 1-based attempt number. No backoff is taken after
    /// the final attempt.
    pub async fn run<T, E, F, Fut>(&self, label: &str, mut op: F) -> Retried<T, E>
    where
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: Display,
    {
        let max = self.max_attempts.max(1);
        let mut attempt = 0;

        loop {
            attempt += 1;
            match op(attempt).await {
                Ok(value) => {
                    return Retried {
                        result: Ok(value),
                        attempts: attempt,
                    };
                }
                Err(err) if attempt >= max => {
                    warn!(attempt, max, error = %err, "{label} failed, giving up");
                    return Retried {
                        result: Err(err),
                        attempts: attempt,
                    };
                }
                Err(err) => {
                    warn!(
                        attempt,
                        max,
                        error = %err,
                        "{label} failed, retrying in {}ms",
                        self.backoff_ms
                    );
                    sleep(self.backoff()).await;
                }
            }
        }
    }
}

/// Final result of a retried operation plus how many attempts it took.
#[derive(Debug)]
pub struct Retried<T, E> {
    pub result: Result<T, E>,
    pub attempts: u32,
}

impl<T, E> Retried<T, E> {
    /// The value, or `fallback()` if every attempt failed. The flag is `true`
    /// when the fallback was used.
    pub fn or_fallback(self, fallback: impl FnOnce() -> T) -> (T, bool) {
        match self.result {
            Ok(value) => (value, false),
            Err(_) => (fallback(), true),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[tokio::test(start_paused = true)]
    async fn succeeds_first_time_without_waiting() {
        let start = tokio::time::Instant::now();
        let retried: Retried<u32, String> = RetryPolicy::submission()
            .run("op", |n| async move { Ok(n) })
            .await;
        assert_eq!(retried.result.unwrap(), 1);
        assert_eq!(retried.attempts, 1);
        assert_eq!(start.elapsed(), Duration::ZERO);
    }

    #[tokio::test(start_paused = true)]
    async fn stops_at_the_bound_and_skips_final_backoff() {
        let calls = AtomicU32::new(0);
        let start = tokio::time::Instant::now();
        let retried: Retried<(), String> = RetryPolicy::new(3, 2_000)
            .run("op", |n| {
                calls.fetch_add(1, Ordering::SeqCst);
                async move { Err(format!("boom {n}")) }
            })
            .await;

        assert_eq!(retried.attempts, 3);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
        assert_eq!(retried.result.unwrap_err(), "boom 3");
        // Two backoffs between three attempts.
        assert_eq!(start.elapsed(), Duration::from_millis(4_000));
    }

    #[tokio::test(start_paused = true)]
    async fn success_on_second_attempt_makes_no_third() {
        let calls = AtomicU32::new(0);
        let retried: Retried<&str, String> = RetryPolicy::submission()
            .run("op", |n| {
                calls.fetch_add(1, Ordering::SeqCst);
                async move {
                    if n < 2 {
                        Err("transient".to_string())
                    } else {
                        Ok("sent")
                    }
                }
            })
            .await;
        assert_eq!(retried.result.unwrap(), "sent");
        assert_eq!(retried.attempts, 2);
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn zero_attempts_still_runs_once() {
        let retried: Retried<(), &str> =
            RetryPolicy::new(0, 10).run("op", |_| async { Err("no") }).await;
        assert_eq!(retried.attempts, 1);
    }

    #[test]
    fn fallback_only_on_failure() {
        let ok: Retried<String, &str> = Retried {
            result: Ok("custom".into()),
            attempts: 1,
        };
        assert_eq!(ok.or_fallback(|| "base".into()), ("custom".to_string(), false));

        let failed: Retried<String, &str> = Retried {
            result: Err("down"),
            attempts: 3,
        };
        assert_eq!(failed.or_fallback(|| "base".into()), ("base".to_string(), true));
    }

    #[test]
    fn default_policies() {
        assert_eq!(RetryPolicy::customization(), RetryPolicy::new(3, 2_000));
        assert_eq!(RetryPolicy::submission().backoff(), Duration::from_secs(5));
    }
}
