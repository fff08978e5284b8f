//! Integration test driver for the `tests/integration/` submodules.
//!
//! Each `mod` below maps to a file that exercises one subsystem against
//! the mock adapters in `mock_hw`.  All tests run on the host with no
//! real hardware required.

mod dispatcher_tests;
mod mock_hw;
