//! RoverCam runtime library.
//!
//! Exposes the domain core and the adapters for the firmware binary and
//! for host-side integration tests.  All ESP-IDF-specific code is guarded
//! by `#[cfg(target_os = "espidf")]` within each module and falls back to
//! simulation stubs elsewhere.

#![deny(unused_must_use)]

pub mod app;
pub mod config;
pub mod control;
pub mod error;
pub mod power;
pub mod sensors;
pub mod stream;

pub mod adapters;
pub mod drivers;
pub mod pins;
