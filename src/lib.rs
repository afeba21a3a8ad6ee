//! Mycobox grow-chamber controller library.
//!
//! Exposes the control loop, persistence and adapters for the binary and
//! for integration testing.  Hardware access sits behind the port traits
//! in [`app::ports`]; with no drivers linked the loop runs on simulated
//! sensors.

#![deny(unused_must_use)]

pub mod adapters;
pub mod app;
pub mod config;
pub mod control;
pub mod error;
pub mod model;
pub mod persistence;
pub mod runtime;
pub mod sensors;
pub mod status;
