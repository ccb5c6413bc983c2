//! Adaptive pacing and backoff state for the fetch client
//!
//! The state is owned by a single [`FetchClient`](super::FetchClient) and mutated
//! only by it. `base_delay` is sticky: throttling ratchets it upward, successes
//! never lower it, and it is always capped at `max_base_delay`.

use crate::config::FetchConfig;
use rand::Rng;
use std::time::Duration;
use tokio::time::Instant;

/// Mutable pacing state of one fetch client
#[derive(Clone, Debug)]
pub struct FetchState {
    base_delay: Duration,
    consecutive_rate_limits: u32,
    last_request: Option<Instant>,
}

impl FetchState {
    /// Fresh state starting at the configured base delay
    pub fn new(config: &FetchConfig) -> Self {
        Self {
            base_delay: config.base_delay.min(config.max_base_delay),
            consecutive_rate_limits: 0,
            last_request: None,
        }
    }

    /// Current minimum spacing between requests
    pub fn base_delay(&self) -> Duration {
        self.base_delay
    }

    /// Rate-limit responses seen since the last success
    pub fn consecutive_rate_limits(&self) -> u32 {
        self.consecutive_rate_limits
    }

    /// How long to wait before the next request may be issued
    pub fn pacing_wait(&self, now: Instant) -> Duration {
        match self.last_request {
            Some(last) => self.base_delay.saturating_sub(now.saturating_duration_since(last)),
            None => Duration::ZERO,
        }
    }

    /// Record that a request is being issued at `now`
    pub fn mark_request(&mut self, now: Instant) {
        self.last_request = Some(now);
    }

    /// Count a 429 and escalate the base delay once throttling looks sustained
    pub fn record_rate_limit(&mut self, config: &FetchConfig) {
        self.consecutive_rate_limits += 1;
        if self.consecutive_rate_limits >= config.rate_limit_escalation_threshold {
            let escalated = self.base_delay.mul_f64(config.escalation_factor);
            self.base_delay = escalated.min(config.max_base_delay);
            tracing::warn!(
                consecutive = self.consecutive_rate_limits,
                base_delay_ms = self.base_delay.as_millis() as u64,
                "Sustained rate limiting; escalating base delay"
            );
        }
    }

    /// Reset the rate-limit streak; the base delay is left untouched
    pub fn record_success(&mut self) {
        self.consecutive_rate_limits = 0;
    }

    /// Compute the sleep for a failed `attempt` and update the base delay
    ///
    /// With a usable retry-after `hint` the delay is clamped into
    /// `[base_delay, max_base_delay]` and becomes the new base delay. Without one
    /// the delay is `base_delay * 2^attempt` capped at `max_backoff`, and the base
    /// delay drifts up by `drift_factor`. The returned value excludes jitter.
    pub fn next_backoff(&mut self, config: &FetchConfig, attempt: u32, hint: Option<&str>) -> Duration {
        match hint {
            Some(raw) => {
                let hinted = parse_retry_after(raw).unwrap_or(self.base_delay);
                let delay = hinted.clamp(self.base_delay, config.max_base_delay.max(self.base_delay));
                self.base_delay = delay.min(config.max_base_delay);
                delay
            }
            None => {
                let factor = 2_f64.powi(attempt.min(30) as i32);
                let delay = self.base_delay.mul_f64(factor).min(config.max_backoff);
                self.base_delay = self
                    .base_delay
                    .mul_f64(config.drift_factor)
                    .min(config.max_base_delay);
                delay
            }
        }
    }

    /// Upper bound for jitter: `min(max_jitter, base_delay)`
    pub fn jitter_bound(&self, config: &FetchConfig) -> Duration {
        config.max_jitter.min(self.base_delay)
    }
}

/// Parse a retry-after header given in (possibly fractional) seconds
///
/// HTTP-date forms are not interpreted and yield `None`. Values too large for a
/// `Duration` saturate to `Duration::MAX`.
pub fn parse_retry_after(raw: &str) -> Option<Duration> {
    let secs: f64 = raw.trim().parse().ok()?;
    if !secs.is_finite() || secs < 0.0 {
        return None;
    }
    Some(Duration::try_from_secs_f64(secs).unwrap_or(Duration::MAX))
}

/// Add uniformly distributed jitter in `[0, bound]` to a delay
pub fn add_jitter(delay: Duration, bound: Duration) -> Duration {
    if bound.is_zero() {
        return delay;
    }
    let mut rng = rand::thread_rng();
    let extra_ms: u64 = rng.gen_range(0..=bound.as_millis() as u64);
    delay + Duration::from_millis(extra_ms)
}
