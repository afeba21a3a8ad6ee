//! Application core — domain orchestration behind port traits.
//!
//! This module ties the Mycobox pieces together: the owned control
//! context, the sampling orchestrator, operator commands and outbound
//! events.  All interaction with hardware, databases and observers happens
//! through the **port traits** in [`ports`], keeping this layer testable
//! without real peripherals.

pub mod commands;
pub mod context;
pub mod events;
pub mod orchestrator;
pub mod ports;
