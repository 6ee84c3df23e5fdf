use std::time::Duration;

use piclaim_settings::{PolicySettings, ScheduleMode};

use crate::CycleReport;

/// Smallest delay backoff grows from when the base delay is zero
const MIN_BACKOFF: Duration = Duration::from_millis(500);

/// How long to wait between cycles
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchedulePolicy {
    /// Start the next cycle right away
    Immediate,
    /// Same delay after every cycle
    Fixed(Duration),
    /// `initial` after a clean cycle, doubling per consecutive failed cycle
    /// up to `max`
    Backoff { initial: Duration, max: Duration },
}

impl SchedulePolicy {
    pub fn from_settings(policy: &PolicySettings) -> Self {
        match policy.schedule {
            ScheduleMode::Immediate => Self::Immediate,
            ScheduleMode::Fixed => Self::Fixed(policy.cycle_delay()),
            ScheduleMode::Backoff => Self::Backoff {
                initial: policy.cycle_delay(),
                max: policy.backoff_max(),
            },
        }
    }
}

#[derive(Debug, Clone)]
pub struct Scheduler {
    policy: SchedulePolicy,
    consecutive_failures: u32,
}

impl Scheduler {
    pub fn new(policy: SchedulePolicy) -> Self {
        Self {
            policy,
            consecutive_failures: 0,
        }
    }

    pub fn policy(&self) -> SchedulePolicy {
        self.policy
    }

    pub fn consecutive_failures(&self) -> u32 {
        self.consecutive_failures
    }

    /// Delay before the cycle after `report`.
    ///
    /// A rate limit's `retry_after` is a floor whatever the policy.
    pub fn next_delay(&mut self, report: &CycleReport) -> Duration {
        if report.had_failures() {
            self.consecutive_failures = self.consecutive_failures.saturating_add(1);
        } else {
            self.consecutive_failures = 0;
        }

        let delay = match self.policy {
            SchedulePolicy::Immediate => Duration::ZERO,
            SchedulePolicy::Fixed(delay) => delay,
            SchedulePolicy::Backoff { initial, max } => {
                if self.consecutive_failures == 0 {
                    initial
                } else {
                    let base = initial.max(MIN_BACKOFF);
                    let factor = 1u32 << self.consecutive_failures.min(16);
                    base.saturating_mul(factor).min(max.max(initial))
                }
            }
        };

        match report.rate_limit() {
            Some(Some(retry_after)) => delay.max(retry_after),
            _ => delay,
        }
    }
}
