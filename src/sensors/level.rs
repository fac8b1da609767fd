//! Coolant level switch (frame 0x101).
//!
//! One payload byte: zero means level low, anything else means OK.

use crate::canbus::Frame;

/// Decode a level frame. `None` if the payload is empty.
pub fn decode(frame: &Frame) -> Option<bool> {
    frame.payload().first().map(|&b| b != 0)
}
