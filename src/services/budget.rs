//! Per-article run budget.
//!
//! Bounds one run by wall-clock time and by the number of backend attempts.
//! The budget is shared by every task of the run (concurrent retrievals
//! included), so the call counter is atomic.

use std::sync::atomic::{AtomicU32, Ordering};
use std::time::{Duration, Instant};

/// Why a budget refused further work.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BudgetExhausted {
    /// The wall-clock limit passed.
    WallClock(Duration),
    /// The backend call limit was reached.
    Calls(u32),
}

impl std::fmt::Display for BudgetExhausted {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::WallClock(limit) => write!(f, "wall-clock budget of {}s spent", limit.as_secs_f64()),
            Self::Calls(limit) => write!(f, "backend call budget of {limit} calls spent"),
        }
    }
}

/// Wall-clock and backend call limits shared by one article's run.
#[derive(Debug)]
pub struct RunBudget {
    started: Instant,
    wall_clock: Option<Duration>,
    max_calls: Option<u32>,
    calls: AtomicU32,
}

impl RunBudget {
    /// Budget starting now; `None` leaves that limit off.
    pub fn new(wall_clock: Option<Duration>, max_calls: Option<u32>) -> Self {
        Self {
            started: Instant::now(),
            wall_clock,
            max_calls,
            calls: AtomicU32::new(0),
        }
    }

    /// Budget that never refuses.
    pub fn unlimited() -> Self {
        Self::new(None, None)
    }

    /// Instant the wall-clock limit expires, if set.
    pub fn deadline(&self) -> Option<Instant> {
        self.wall_clock.map(|limit| self.started + limit)
    }

    /// Calls charged so far.
    pub fn calls_made(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }

    /// Fails once either limit has been reached.
    pub fn check(&self) -> Result<(), BudgetExhausted> {
        if let Some(limit) = self.wall_clock {
            if self.started.elapsed() >= limit {
                return Err(BudgetExhausted::WallClock(limit));
            }
        }
        if let Some(limit) = self.max_calls {
            if self.calls.load(Ordering::SeqCst) >= limit {
                return Err(BudgetExhausted::Calls(limit));
            }
        }
        Ok(())
    }

    /// Reserve one backend attempt.
    pub fn acquire_call(&self) -> Result<(), BudgetExhausted> {
        if let Some(limit) = self.wall_clock {
            if self.started.elapsed() >= limit {
                return Err(BudgetExhausted::WallClock(limit));
            }
        }
        match self.max_calls {
            Some(limit) => self
                .calls
                .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| (n < limit).then_some(n + 1))
                .map(|_| ())
                .map_err(|_| BudgetExhausted::Calls(limit)),
            None => {
                self.calls.fetch_add(1, Ordering::SeqCst);
                Ok(())
            }
        }
    }
}
