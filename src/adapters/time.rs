//! System time adapter.
//!
//! Wall-clock UTC for reading timestamps, and the host's local hour for
//! the light schedule.

use chrono::{DateTime, Local, Timelike, Utc};

use crate::app::ports::Clock;

#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl SystemClock {
    pub fn new() -> Self {
        Self
    }
}

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }

    fn local_hour(&self) -> u32 {
        Local::now().hour()
    }
}
