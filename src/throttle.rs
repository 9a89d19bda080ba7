//! Per-profile throttle and backoff.
//!
//! `governor` enforces minimum inter-request spacing, one limiter per
//! profile; `exponential_backoff` drives the failure-count delay curve; and
//! `fastrand` supplies the jitter term.

use std::{
    collections::HashMap,
    num::NonZeroU32,
    sync::atomic::{AtomicU32, Ordering},
    time::Duration,
};

use exponential_backoff::Backoff;
use governor::{DefaultDirectRateLimiter, Quota, RateLimiter};
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;

use crate::{error::{Error, ErrorKind, Result}, profile::ProfileName};

/// Minimum spacing between requests to the same profile.
const MIN_INTERVAL: Duration = Duration::from_millis(1500);

/// Backoff floor`).
const BACKOFF_BASE_MS: u64 = 2000;

/// Backoff ceiling.
const BACKOFF_MAX_MS: u64 = 30_000;

/// Consecutive failures after which a profile is skipped for the remainder
/// of the current `resolve` call.
const CIRCUIT_OPEN_THRESHOLD: u32 = 3;

/// Per-profile throttle state.
struct ProfileState {
    limiter: DefaultDirectRateLimiter,
    consecutive_failures: AtomicU32,
}

impl ProfileState {
    fn new() -> Self {
        let quota = Quota::with_period(MIN_INTERVAL)
            .expect("min interval is nonzero")
            .allow_burst(NonZeroU32::new(1).expect("nonzero"));
        Self {
            limiter: RateLimiter::direct(quota),
            consecutive_failures: AtomicU32::new(0),
        }
    }
}

/// Per-profile-name minimum spacing, failure counters, and circuit-open.
pub struct ProfileThrottle {
    states: Mutex<HashMap<ProfileName, ProfileState>>,
}

impl ProfileThrottle {
    /// Builds a throttle with no prior history for any profile.
    #[must_use]
    pub fn new() -> Self {
        Self {
            states: Mutex::new(HashMap::new()),
        }
    }

    /// `true` if `profile` has failed `CIRCUIT_OPEN_THRESHOLD` times in a row
    /// and should be skipped for the rest of this call (, §8
    /// property 5).
    pub async fn is_circuit_open(&self, profile: ProfileName) -> bool {
        let mut states = self.states.lock().await;
        let state = states.entry(profile).or_insert_with(ProfileState::new);
        state.consecutive_failures.load(Ordering::Relaxed) >= CIRCUIT_OPEN_THRESHOLD
    }

    /// Waits out the minimum inter-request spacing, then — if the profile
    /// has prior failures — the exponential backoff-plus-jitter delay.
    /// Cancelable via `cancel`.
    ///
    /// # Errors
    ///
    /// Returns a [`crate::error::ErrorKind::Cancelled`] error if `cancel` is
    /// triggered before the wait completes.
    pub async fn wait(&self, profile: ProfileName, cancel: &CancellationToken) -> Result<()> {
        let failures = {
            let mut states = self.states.lock().await;
            let state = states.entry(profile).or_insert_with(ProfileState::new);
            state.limiter.until_ready().await;
            state.consecutive_failures.load(Ordering::Relaxed)
        };

        if failures > 0 {
            let delay = backoff_delay(failures);
            tokio::select! {
                () = tokio::time::sleep(delay) => Ok(()),
                () = cancel.cancelled() => Err(Error::cancelled("throttle wait cancelled")),
            }
        } else {
            Ok(())
        }
    }

    /// Resets the profile's failure counter to zero ("a success
    /// resets the counter").
    pub async fn record_success(&self, profile: ProfileName) {
        let mut states = self.states.lock().await;
        let state = states.entry(profile).or_insert_with(ProfileState::new);
        state.consecutive_failures.store(0, Ordering::Relaxed);
    }

    /// Increments the profile's consecutive-failure counter.
    pub async fn record_failure(&self, profile: ProfileName) {
        let mut states = self.states.lock().await;
        let state = states.entry(profile).or_insert_with(ProfileState::new);
        state.consecutive_failures.fetch_add(1, Ordering::Relaxed);
    }
}

impl Default for ProfileThrottle {
    fn default() -> Self {
        Self::new()
    }
}

/// Computes `min(30000, 2000*2^(n-1)) + uniform(0, quarter)` for `n`
/// consecutive failures.
fn backoff_delay(consecutive_failures: u32) -> Duration {
    let mut backoff = Backoff::new(
        consecutive_failures,
        Duration::from_millis(BACKOFF_BASE_MS),
        Duration::from_millis(BACKOFF_MAX_MS),
    );
    // Jitter is added explicitly below`),
    // so the crate's own randomization is disabled to avoid compounding it.
    backoff.set_jitter(0.0);
    let base = backoff
        .iter()
        .last()
        .flatten()
        .unwrap_or(Duration::from_millis(BACKOFF_MAX_MS));
    let jitter_ceiling = base.as_millis() as u64 / 4;
    let jitter = if jitter_ceiling == 0 { 0 } else { fastrand::u64(0..=jitter_ceiling) };
    base + Duration::from_millis(jitter)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn backoff_delay_is_within_spec_bounds() {
        for n in 1..=6u32 {
            let floor_ms = BACKOFF_BASE_MS * 2u64.pow(n - 1);
            let capped_floor = floor_ms.min(BACKOFF_MAX_MS);
            let ceiling = (capped_floor as f64 * 1.25) as u64;
            let delay = backoff_delay(n).as_millis() as u64;
            assert!(delay >= capped_floor, "n={n} delay={delay} floor={capped_floor}");
            assert!(delay <= ceiling, "n={n} delay={delay} ceiling={ceiling}");
        }
    }

    #[tokio::test]
    async fn circuit_opens_after_threshold_failures() {
        let throttle = ProfileThrottle::new();
        for _ in 0..CIRCUIT_OPEN_THRESHOLD {
            throttle.record_failure(ProfileName::AndroidVr).await;
        }
        assert!(throttle.is_circuit_open(ProfileName::AndroidVr).await);
    }

    #[tokio::test]
    async fn success_resets_failure_counter() {
        let throttle = ProfileThrottle::new();
        throttle.record_failure(ProfileName::Ios).await;
        throttle.record_failure(ProfileName::Ios).await;
        throttle.record_success(ProfileName::Ios).await;
        assert!(!throttle.is_circuit_open(ProfileName::Ios).await);
    }

    #[tokio::test]
    async fn cancellation_interrupts_a_pending_wait() {
        let throttle = ProfileThrottle::new();
        throttle.record_failure(ProfileName::Web).await;
        let cancel = CancellationToken::new();
        cancel.cancel();
        let result = throttle.wait(ProfileName::Web, &cancel).await;
        assert!(matches!(result, Err(e) if e.kind == ErrorKind::Cancelled));
    }
}
