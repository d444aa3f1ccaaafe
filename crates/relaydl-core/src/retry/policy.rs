use std::time::Duration;

/// What went wrong with a remote call, as far as retrying is concerned.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Connect or transfer timed out.
    Timeout,
    /// 429 / 503: the server is alive but busy.
    Throttled,
    /// Refused, reset, unresolvable or cut off mid-response.
    Connection,
    /// Any other 5xx.
    Http5xx(u16),
    /// 4xx, undecodable bodies, local errors. Never retried.
    Other,
}

impl ErrorKind {
    /// Kinds that look like a slow or briefly unreachable server.
    pub fn is_transient(self) -> bool {
        !matches!(self, ErrorKind::Other)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryDecision {
    NoRetry,
    RetryAfter(Duration),
}

/// Capped exponential backoff for one remote operation (`[retry]` in config.toml).
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    /// Attempts per operation, the first one included.
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            base_delay: Duration::from_millis(250),
            max_delay: Duration::from_secs(30),
        }
    }
}

impl RetryPolicy {
    /// Decision after attempt number `attempt` (1-based) failed with `kind`.
    /// A throttled server gets one extra doubling.
    pub fn decide(&self, attempt: u32, kind: ErrorKind) -> RetryDecision {
        if attempt >= self.max_attempts || !kind.is_transient() {
            return RetryDecision::NoRetry;
        }
        let mut step = attempt.saturating_sub(1);
        if kind == ErrorKind::Throttled {
            step += 1;
        }
        let factor = 1u32 << step.min(10);
        RetryDecision::RetryAfter(self.base_delay.saturating_mul(factor).min(self.max_delay))
    }
}

/// Consecutive-failure budget for the status poll loop. Any successful poll
/// resets it; a non-transient failure exhausts it at once.
#[derive(Debug, Clone, Copy)]
pub struct FailureCeiling {
    limit: u32,
    consecutive: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CeilingDecision {
    /// Keep polling at the normal interval.
    Tolerate,
    /// Transient failures reached the limit.
    Exhausted { attempts: u32 },
    /// The error will not go away by asking again.
    Fatal,
}

impl FailureCeiling {
    pub fn new(limit: u32) -> Self {
        Self {
            limit: limit.max(1),
            consecutive: 0,
        }
    }

    pub fn reset(&mut self) {
        self.consecutive = 0;
    }

    pub fn consecutive(&self) -> u32 {
        self.consecutive
    }

    pub fn record(&mut self, kind: ErrorKind) -> CeilingDecision {
        if !kind.is_transient() {
            return CeilingDecision::Fatal;
        }
        self.consecutive += 1;
        if self.consecutive >= self.limit {
            CeilingDecision::Exhausted {
                attempts: self.consecutive,
            }
        } else {
            CeilingDecision::Tolerate
        }
    }
}
