//! Integration test driver for `tests/integration/` submodule.
//!
//! Each `mod` below maps to a file that exercises a specific subsystem
//! against mock adapters.  All tests run on the host with no sensors,
//! relays or database server required.

mod control_tests;
mod failover_tests;
mod mock_hw;
mod orchestrator_tests;
