//! Error types for the cooling controller.
//!
//! The control core itself never surfaces errors as `Result` — invalid
//! bus arguments and capacity exhaustion are reported as `false`, short
//! frames are silently dropped, and safety conditions drive state
//! transitions instead of propagating. The one genuinely fallible
//! surface is configuration validation at startup, which gets a typed
//! error so the CLI can refuse bad parameters with a precise message.

use thiserror::Error;

/// Configuration validation failures.
#[derive(Debug, Clone, Copy, PartialEq, Error)]
pub enum ConfigError {
    /// A numeric field is outside its permitted range.
    #[error("{field} out of range: {value}")]
    OutOfRange { field: &'static str, value: f64 },

    /// A numeric field is NaN or infinite.
    #[error("{field} is not finite")]
    NotFinite { field: &'static str },
}
