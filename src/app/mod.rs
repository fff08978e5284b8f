//! Application core: domain logic behind port traits.
//!
//! The request-loop service ([`service`]), the shared device registry
//! ([`registry`]) and the status projection ([`status`]).  All interaction
//! with hardware happens through **port traits** defined in [`ports`],
//! keeping this layer fully testable without real peripherals.

pub mod commands;
pub mod events;
pub mod ports;
pub mod registry;
pub mod service;
pub mod status;
