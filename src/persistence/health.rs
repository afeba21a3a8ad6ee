//! Primary-backend health monitor.
//!
//! Runs on its own interval, separate from the sampling tick.  While the
//! service is on the fallback it pings the primary; a successful ping
//! switches persistence back.  Failed probes are logged at debug level
//! and retried on the next interval.

use std::sync::Arc;
use std::time::Duration;

use crate::persistence::{Backend, PersistenceService};

pub struct HealthMonitor {
    persistence: Arc<PersistenceService>,
    interval: Duration,
}

impl HealthMonitor {
    pub fn new(persistence: Arc<PersistenceService>, interval: Duration) -> Self {
        Self {
            persistence,
            interval,
        }
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Probe once.  `true` only when this probe restored the primary.
    pub fn probe(&self) -> bool {
        if self.persistence.current_backend() == Backend::Primary {
            return false;
        }
        self.persistence.probe_primary()
    }
}
