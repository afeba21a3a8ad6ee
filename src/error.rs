//! Unified error types for the Mycobox controller.
//!
//! A single `Error` enum that every subsystem converts into, keeping the
//! sampling loop's error handling uniform.  Sensor and actuator errors are
//! `Copy`; persistence and config errors carry the backend's message.

use core::fmt;

// ---------------------------------------------------------------------------
// Top-level controller error
// ---------------------------------------------------------------------------

/// Every fallible operation in the controller funnels into this type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Error {
    /// A sensor could not be read or returned unusable data.
    Sensor(SensorError),
    /// An actuator command failed.
    Actuator(ActuatorError),
    /// Both storage backends rejected an operation.
    Persistence(StoreError),
    /// Configuration is invalid or could not be loaded.
    Config(ConfigError),
    /// A shared lock was poisoned by a panicking holder.
    LockPoisoned(&'static str),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Sensor(e) => write!(f, "sensor: {e}"),
            Self::Actuator(e) => write!(f, "actuator: {e}"),
            Self::Persistence(e) => write!(f, "persistence: {e}"),
            Self::Config(e) => write!(f, "config: {e}"),
            Self::LockPoisoned(what) => write!(f, "lock poisoned: {what}"),
        }
    }
}

impl std::error::Error for Error {}

// ---------------------------------------------------------------------------
// Sensor errors
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SensorError {
    /// The driver returned no value.
    NoData,
    /// The read did not complete within its timeout.
    Timeout,
    /// The driver returned NaN or infinity.
    NotFinite,
}

impl fmt::Display for SensorError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NoData => write!(f, "no data"),
            Self::Timeout => write!(f, "read timed out"),
            Self::NotFinite => write!(f, "non-finite value"),
        }
    }
}

impl From<SensorError> for Error {
    fn from(e: SensorError) -> Self {
        Self::Sensor(e)
    }
}

// ---------------------------------------------------------------------------
// Actuator errors
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActuatorError {
    /// Relay GPIO write failed.
    GpioWriteFailed,
    /// Fan PWM duty-cycle write failed.
    PwmWriteFailed,
    /// The requested value is outside what the device accepts.
    OutOfRange,
}

impl fmt::Display for ActuatorError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::GpioWriteFailed => write!(f, "GPIO write failed"),
            Self::PwmWriteFailed => write!(f, "PWM write failed"),
            Self::OutOfRange => write!(f, "value out of range"),
        }
    }
}

impl std::error::Error for ActuatorError {}

impl From<ActuatorError> for Error {
    fn from(e: ActuatorError) -> Self {
        Self::Actuator(e)
    }
}

// ---------------------------------------------------------------------------
// Storage errors
// ---------------------------------------------------------------------------

/// Failure reported by a single storage backend.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    /// The backend could not be reached (connection refused, timed out).
    Unavailable(String),
    /// The backend was reachable but rejected the statement.
    Query(String),
    /// A stored record could not be turned back into a reading.
    Decode(String),
    /// The caller handed over a record the backend cannot store.
    Invalid(&'static str),
}

impl fmt::Display for StoreError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Unavailable(msg) => write!(f, "backend unavailable: {msg}"),
            Self::Query(msg) => write!(f, "query failed: {msg}"),
            Self::Decode(msg) => write!(f, "decode failed: {msg}"),
            Self::Invalid(msg) => write!(f, "invalid record: {msg}"),
        }
    }
}

impl std::error::Error for StoreError {}

impl From<StoreError> for Error {
    fn from(e: StoreError) -> Self {
        Self::Persistence(e)
    }
}

impl From<rusqlite::Error> for StoreError {
    fn from(e: rusqlite::Error) -> Self {
        match e {
            rusqlite::Error::SqliteFailure(code, _)
                if matches!(
                    code.code,
                    rusqlite::ErrorCode::CannotOpen
                        | rusqlite::ErrorCode::DatabaseBusy
                        | rusqlite::ErrorCode::DatabaseLocked
                ) =>
            {
                Self::Unavailable(e.to_string())
            }
            rusqlite::Error::FromSqlConversionFailure(..)
            | rusqlite::Error::InvalidColumnType(..) => Self::Decode(e.to_string()),
            other => Self::Query(other.to_string()),
        }
    }
}

impl From<mongodb::error::Error> for StoreError {
    fn from(e: mongodb::error::Error) -> Self {
        Self::Unavailable(e.to_string())
    }
}

// ---------------------------------------------------------------------------
// Configuration errors
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    /// No configuration stored yet; defaults apply.
    NotFound,
    /// Stored configuration could not be parsed.
    Corrupted(String),
    /// A field is outside its allowed range.
    ValidationFailed(&'static str),
    /// The named growth phase does not exist.
    UnknownPhase(String),
    /// Reading or writing the configuration file failed.
    Io(String),
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NotFound => write!(f, "config not found"),
            Self::Corrupted(msg) => write!(f, "config corrupted: {msg}"),
            Self::ValidationFailed(msg) => write!(f, "validation failed: {msg}"),
            Self::UnknownPhase(name) => write!(f, "unknown growth phase '{name}'"),
            Self::Io(msg) => write!(f, "config i/o: {msg}"),
        }
    }
}

impl std::error::Error for ConfigError {}

impl From<ConfigError> for Error {
    fn from(e: ConfigError) -> Self {
        Self::Config(e)
    }
}

pub type Result<T> = core::result::Result<T, Error>;
