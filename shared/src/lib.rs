//! Shared types for the Kiln hot-reload runtime.
//!
//! These types cross the host/simulation boundary: the per-frame input
//! sample the host captures (and the replay subsystem records) and the
//! layout of the host-owned linear memory the simulation module runs in.
//! Everything here is POD so it can be snapshotted and compared
//! byte-for-byte.

pub mod input;
pub mod memory;

pub use input::{BUTTON_COUNT, Button, ButtonState, InputSample, KEY_COUNT, keycode};
pub use memory::MemoryLayout;
