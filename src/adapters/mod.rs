//! Adapters — concrete implementations of the hexagonal port traits.
//!
//! | Adapter        | Implements         | Connects to                 |
//! |----------------|--------------------|-----------------------------|
//! | `channel_sink` | Broadcaster        | Bounded event channel       |
//! | `config_file`  | ConfigPort         | JSON file on disk           |
//! | `console`      | AppCommand parser  | Operator text lines         |
//! | `log_sink`     | Broadcaster        | Process log output          |
//! | `relays`       | ActuatorDriver     | embedded-hal pins / memory  |
//! | `time`         | Clock              | System wall clock           |
//!
//! Reading stores live in [`crate::persistence`].

pub mod channel_sink;
pub mod config_file;
pub mod console;
pub mod log_sink;
pub mod relays;
pub mod time;
