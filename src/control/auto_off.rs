//! Fogger auto-off bookkeeping.
//!
//! Starting the fogger arms a one-shot deadline identified by a fresh
//! token.  Arming again replaces the pending deadline; an expiry carrying a
//! token that is no longer pending is stale and ignored.  The timer task
//! only sees [`TimerDirective`]s and reports expiries back by token.

use std::time::{Duration, Instant};

/// Identity of one armed deadline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct AutoOffToken(u64);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AutoOffDeadline {
    pub token: AutoOffToken,
    pub at: Instant,
}

/// Instruction for the timer task.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimerDirective {
    /// Replace any pending deadline with this one.
    Arm(AutoOffDeadline),
    /// Drop the pending deadline.
    Cancel,
}

#[derive(Debug, Default)]
pub struct AutoOffTimer {
    next_token: u64,
    pending: Option<AutoOffDeadline>,
}

impl AutoOffTimer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Arm a new deadline `after` from `now`, replacing any pending one.
    pub fn arm(&mut self, now: Instant, after: Duration) -> AutoOffDeadline {
        self.next_token = self.next_token.wrapping_add(1);
        let deadline = AutoOffDeadline {
            token: AutoOffToken(self.next_token),
            at: now + after,
        };
        self.pending = Some(deadline);
        deadline
    }

    /// Drop the pending deadline.  Returns the directive to send, if any.
    pub fn cancel(&mut self) -> Option<TimerDirective> {
        self.pending.take().map(|_| TimerDirective::Cancel)
    }

    pub fn pending(&self) -> Option<AutoOffDeadline> {
        self.pending
    }

    /// Consume the pending deadline if `token` is still current.
    pub fn take_if_current(&mut self, token: AutoOffToken) -> bool {
        match self.pending {
            Some(d) if d.token == token => {
                self.pending = None;
                true
            }
            _ => false,
        }
    }
}
