//! Sensor frame decoders.
//!
//! One module per sensor on the bus. Decoders are pure: frame in,
//! `Option<value>` out — frames shorter than the sensor's encoding are
//! rejected with `None` and silently dropped by the caller. Wiring the
//! decoded values into the supervisor happens where the reactions live,
//! in [`crate::system`].

pub mod ignition;
pub mod level;
pub mod temperature;
