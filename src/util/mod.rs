//! Run-time limits for long batch runs.

use std::time::{Duration, Instant};

/// Cooperative stop signal, polled once per emitted row.
pub trait AbortCheck {
    /// Whether the run should stop now.
    fn should_abort(&mut self) -> bool;
}

/// Never stops the run.
#[derive(Debug, Clone, Copy, Default)]
pub struct NeverAbort;

impl AbortCheck for NeverAbort {
    fn should_abort(&mut self) -> bool {
        false
    }
}

/// Stops the run once a wall-clock budget is spent.
#[derive(Debug, Clone, Copy)]
pub struct TimeBudget {
    deadline: Instant,
}

impl TimeBudget {
    /// Budget starting now.
    pub fn new(budget: Duration) -> Self {
        Self {
            deadline: Instant::now() + budget,
        }
    }

    /// Time left before the deadline.
    pub fn remaining(&self) -> Duration {
        self.deadline.saturating_duration_since(Instant::now())
    }
}

impl AbortCheck for TimeBudget {
    fn should_abort(&mut self) -> bool {
        Instant::now() > self.deadline
    }
}

impl<F: FnMut() -> bool> AbortCheck for F {
    fn should_abort(&mut self) -> bool {
        self()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zero_budget_expires() {
        let mut budget = TimeBudget::new(Duration::ZERO);
        std::thread::sleep(Duration::from_millis(2));
        assert!(budget.should_abort());
        assert_eq!(budget.remaining(), Duration::ZERO);
    }

    #[test]
    fn generous_budget_does_not_expire() {
        let mut budget = TimeBudget::new(Duration::from_secs(3600));
        assert!(!budget.should_abort());
        assert!(!NeverAbort.should_abort());
    }

    #[test]
    fn closures_are_abort_checks() {
        let mut calls = 0;
        let mut check = || {
            calls += 1;
            calls > 2
        };
        assert!(!check.should_abort());
        assert!(!check.should_abort());
        assert!(check.should_abort());
    }
}
