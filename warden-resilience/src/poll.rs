//! Tick-based polling for conditions observed on disk

use log::debug;
use std::future::Future;
use tokio::time::sleep;

use crate::retry::RetryPolicy;

/// Result of a bounded poll
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PollOutcome<T> {
    /// The condition produced a value on the given attempt
    Ready { value: T, attempts: u32 },
    /// The budget ran out
    Exhausted { attempts: u32 },
}

impl<T> PollOutcome<T> {
    pub fn ready(self) -> Option<T> {
        match self {
            PollOutcome::Ready { value, .. } => Some(value),
            PollOutcome::Exhausted { .. } => None,
        }
    }

    pub fn is_ready(&self) -> bool {
        matches!(self, PollOutcome::Ready { .. })
    }
}

/// Evaluate `check` up to `policy.max_attempts` times, sleeping the policy's
/// delay between evaluations, until it yields `Some`.
pub async fn poll_until<F, Fut, T>(policy: &RetryPolicy, mut check: F) -> PollOutcome<T>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Option<T>>,
{
    let mut attempt = 1;

    loop {
        if let Some(value) = check(attempt).await {
            return PollOutcome::Ready {
                value,
                attempts: attempt,
            };
        }

        if attempt >= policy.max_attempts {
            debug!("Condition not met after {} polls", attempt);
            return PollOutcome::Exhausted { attempts: attempt };
        }

        sleep(policy.delay).await;
        attempt += 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test(start_paused = true)]
    async fn test_poll_ready_on_third_tick() {
        let policy = RetryPolicy::fixed(15, Duration::from_secs(1));
        let outcome = poll_until(&policy, |attempt| async move {
            (attempt == 3).then_some("pid matched")
        })
        .await;

        assert_eq!(
            outcome,
            PollOutcome::Ready {
                value: "pid matched",
                attempts: 3
            }
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_poll_exhausts_budget() {
        let policy = RetryPolicy::fixed(4, Duration::from_secs(1));
        let started = tokio::time::Instant::now();
        let outcome: PollOutcome<()> = poll_until(&policy, |_| async { None }).await;

        assert_eq!(outcome, PollOutcome::Exhausted { attempts: 4 });
        assert!(outcome.ready().is_none());
        // Three sleeps between four checks
        assert_eq!(started.elapsed(), Duration::from_secs(3));
    }
}
