//! Dual-backend reading persistence with failover.
//!
//! ```text
//!            ┌──────────── save / latest / history ────────────┐
//!            ▼                                                 │
//!   selector == Primary ──► RemoteStore ──Err──► mark Fallback ┤
//!            │                                    retry once   ▼
//!            └── == Fallback ─────────────────────────────► LocalStore
//! ```
//!
//! Server timestamps carry millisecond precision, the finest both stores
//! keep, so ordering and window filtering agree across backends.
//!
//! Once failed over, every call goes straight to the fallback until the
//! [`HealthMonitor`](health::HealthMonitor) restores the primary.  The
//! selector is a single atomic, so readers never see a half-switched
//! backend.

pub mod health;
pub mod local;
pub mod remote;

use core::fmt;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::{DateTime, SubsecRound, TimeDelta, Utc};
use log::{debug, error, info, warn};
use serde::Serialize;

use crate::app::ports::{Clock, ReadingStore};
use crate::error::StoreError;
use crate::model::Reading;

/// Default `latest` page size.
pub const DEFAULT_LATEST_LIMIT: usize = 10;
/// Default `history` window.
pub const DEFAULT_HISTORY_WINDOW: Duration = Duration::from_secs(24 * 3600);
/// Default `history` page size.
pub const DEFAULT_HISTORY_LIMIT: usize = 500;
/// Fractional-second digits kept in `server_timestamp` (BSON dates are ms).
const SERVER_TS_DIGITS: u16 = 3;

// ── Backend selection ─────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Backend {
    Primary,
    Fallback,
}

impl fmt::Display for Backend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Primary => write!(f, "primary"),
            Self::Fallback => write!(f, "fallback"),
        }
    }
}

/// Process-wide current backend.
#[derive(Debug)]
pub struct BackendSelector(AtomicU8);

impl BackendSelector {
    const PRIMARY: u8 = 0;
    const FALLBACK: u8 = 1;

    pub fn new(initial: Backend) -> Self {
        Self(AtomicU8::new(Self::encode(initial)))
    }

    pub fn current(&self) -> Backend {
        match self.0.load(Ordering::Acquire) {
            Self::PRIMARY => Backend::Primary,
            _ => Backend::Fallback,
        }
    }

    /// Primary → Fallback.  `true` if this call made the switch.
    pub fn fail_over(&self) -> bool {
        self.swap(Backend::Primary, Backend::Fallback)
    }

    /// Fallback → Primary.  `true` if this call made the switch.
    pub fn restore(&self) -> bool {
        self.swap(Backend::Fallback, Backend::Primary)
    }

    fn swap(&self, from: Backend, to: Backend) -> bool {
        self.0
            .compare_exchange(
                Self::encode(from),
                Self::encode(to),
                Ordering::AcqRel,
                Ordering::Acquire,
            )
            .is_ok()
    }

    const fn encode(b: Backend) -> u8 {
        match b {
            Backend::Primary => Self::PRIMARY,
            Backend::Fallback => Self::FALLBACK,
        }
    }
}

// ── Identity / status ─────────────────────────────────────────

/// Backend-assigned id of a stored reading.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum ReadingId {
    /// SQLite row id.
    Local(i64),
    /// MongoDB ObjectId, hex encoded.
    Remote(String),
}

impl fmt::Display for ReadingId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Local(id) => write!(f, "{id}"),
            Self::Remote(id) => f.write_str(id),
        }
    }
}

/// Which backend is live, for status displays.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BackendStatus {
    pub backend: Backend,
    /// Name of the store currently serving ("mongodb", "sqlite").
    pub store: &'static str,
    pub primary_configured: bool,
    pub device_id: String,
}

// ── Service ───────────────────────────────────────────────────

pub struct PersistenceService {
    device_id: String,
    primary: Option<Box<dyn ReadingStore>>,
    fallback: Box<dyn ReadingStore>,
    selector: BackendSelector,
    clock: Arc<dyn Clock>,
    last_server_ts: Mutex<Option<DateTime<Utc>>>,
}

impl PersistenceService {
    /// Build the service.  A configured primary is pinged once; the service
    /// starts on it only if the ping succeeds.
    pub fn new(
        device_id: impl Into<String>,
        primary: Option<Box<dyn ReadingStore>>,
        fallback: Box<dyn ReadingStore>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let initial = match &primary {
            Some(store) => match store.ping() {
                Ok(()) => {
                    info!("Persistence: primary '{}' reachable", store.name());
                    Backend::Primary
                }
                Err(e) => {
                    warn!(
                        "Persistence: primary '{}' unreachable at startup ({e}), using '{}'",
                        store.name(),
                        fallback.name()
                    );
                    Backend::Fallback
                }
            },
            None => {
                info!("Persistence: no primary configured, using '{}'", fallback.name());
                Backend::Fallback
            }
        };
        Self {
            device_id: device_id.into(),
            primary,
            fallback,
            selector: BackendSelector::new(initial),
            clock,
            last_server_ts: Mutex::new(None),
        }
    }

    pub fn device_id(&self) -> &str {
        &self.device_id
    }

    pub fn current_backend(&self) -> Backend {
        self.selector.current()
    }

    pub fn status(&self) -> BackendStatus {
        let backend = self.current_backend();
        BackendStatus {
            backend,
            store: self.store_for(backend).name(),
            primary_configured: self.primary.is_some(),
            device_id: self.device_id.clone(),
        }
    }

    /// Stamp `server_timestamp` and store the reading.
    ///
    /// Fails only when both backends reject it.
    pub fn save(&self, reading: &mut Reading) -> Result<ReadingId, StoreError> {
        reading.clamp_ranges();
        reading.server_timestamp = Some(self.next_server_timestamp());
        let stored: &Reading = reading;
        let id = self.run("save", |store| store.insert(stored))?;
        debug!("Persistence: saved reading {id}");
        Ok(id)
    }

    /// Most recent readings for this device, newest first.  Empty when no
    /// backend can answer.
    pub fn latest(&self, limit: usize) -> Vec<Reading> {
        self.run("latest", |store| store.latest(&self.device_id, limit))
            .unwrap_or_default()
    }

    /// Readings stored within `window` of now, newest first.
    pub fn history(&self, window: Duration, limit: usize) -> Vec<Reading> {
        let now = self.clock.now();
        let cutoff = TimeDelta::from_std(window)
            .ok()
            .and_then(|w| now.checked_sub_signed(w))
            .unwrap_or(DateTime::<Utc>::MIN_UTC)
            .trunc_subsecs(SERVER_TS_DIGITS);
        self.run("history", |store| store.since(&self.device_id, cutoff, limit))
            .unwrap_or_default()
    }

    /// Ping the primary and switch back to it on success.  Returns `true`
    /// only when this call restored the primary.
    pub fn probe_primary(&self) -> bool {
        let Some(primary) = &self.primary else {
            return false;
        };
        if self.current_backend() == Backend::Primary {
            return false;
        }
        match primary.ping() {
            Ok(()) => {
                let restored = self.selector.restore();
                if restored {
                    info!(
                        "Persistence: primary '{}' reachable again, switching back from '{}'",
                        primary.name(),
                        self.fallback.name()
                    );
                }
                restored
            }
            Err(e) => {
                debug!("Persistence: primary probe failed: {e}");
                false
            }
        }
    }

    fn store_for(&self, backend: Backend) -> &dyn ReadingStore {
        match (backend, &self.primary) {
            (Backend::Primary, Some(primary)) => primary.as_ref(),
            _ => self.fallback.as_ref(),
        }
    }

    /// Run `op` on the current backend, failing over once on a primary error.
    fn run<T>(
        &self,
        op: &'static str,
        f: impl Fn(&dyn ReadingStore) -> Result<T, StoreError>,
    ) -> Result<T, StoreError> {
        if let (Backend::Primary, Some(primary)) = (self.current_backend(), &self.primary) {
            match f(primary.as_ref()) {
                Ok(v) => return Ok(v),
                Err(e) => {
                    if self.selector.fail_over() {
                        warn!(
                            "Persistence: {op} on '{}' failed ({e}), failing over to '{}'",
                            primary.name(),
                            self.fallback.name()
                        );
                    }
                }
            }
        }
        f(self.fallback.as_ref()).inspect_err(|e| {
            error!("Persistence: {op} on '{}' failed: {e}", self.fallback.name());
        })
    }

    /// Wall-clock now at millisecond precision, but never earlier than the
    /// previous stamp.
    fn next_server_timestamp(&self) -> DateTime<Utc> {
        let now = self.clock.now().trunc_subsecs(SERVER_TS_DIGITS);
        let mut last = self
            .last_server_ts
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        let stamp = match *last {
            Some(prev) if prev > now => prev,
            _ => now,
        };
        *last = Some(stamp);
        stamp
    }
}
