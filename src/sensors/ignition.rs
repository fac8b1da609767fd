//! Ignition input (frame 0x102).
//!
//! One payload byte: zero means ignition off, anything else means on.

use crate::canbus::Frame;

/// Decode an ignition frame. `None` if the payload is empty.
pub fn decode(frame: &Frame) -> Option<bool> {
    frame.payload().first().map(|&b| b != 0)
}
