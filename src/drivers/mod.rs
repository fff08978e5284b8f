//! Actuator drivers, hardware initialisation, and peripheral helpers.

pub mod hw_init;
pub mod illumination;
pub mod servo;
pub mod task_pin;
pub mod watchdog;
