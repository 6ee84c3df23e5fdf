use std::time::{Duration, Instant};

/// Lets at most one rate-limit alert through per window.
///
/// Rejections are never gated; only rate limiting repeats often enough to
/// flood the operator channel.
#[derive(Debug, Clone)]
pub struct AlertGate {
    window: Duration,
    last_rate_limit_alert: Option<Instant>,
    suppressed: u64,
}

impl AlertGate {
    pub fn new(window: Duration) -> Self {
        Self {
            window,
            last_rate_limit_alert: None,
            suppressed: 0,
        }
    }

    pub fn window(&self) -> Duration {
        self.window
    }

    /// Whether a rate-limit alert may go out now
    pub fn allow_rate_limit_alert(&mut self) -> bool {
        self.allow_rate_limit_alert_at(Instant::now())
    }

    pub fn allow_rate_limit_alert_at(&mut self, now: Instant) -> bool {
        let open = match self.last_rate_limit_alert {
            Some(last) => now.saturating_duration_since(last) >= self.window,
            None => true,
        };
        if open {
            self.last_rate_limit_alert = Some(now);
        } else {
            self.suppressed += 1;
        }
        open
    }

    /// Alerts held back so far
    pub fn suppressed(&self) -> u64 {
        self.suppressed
    }
}
