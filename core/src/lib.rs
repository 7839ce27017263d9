//! Kiln Core - runtime infrastructure for a hot-reloadable simulation host
//!
//! This crate is the host side of an interactive real-time application:
//! it owns the hardware-facing resources, loads an independently-compiled
//! simulation module, and drives it at a fixed time step.
//!
//! # Architecture
//!
//! - [`JobQueue`] - lock-free single-producer/multi-consumer ring drained
//!   by a [`WorkerPool`] of blocking worker threads
//! - [`Replay`] - deterministic input recording and looping playback over
//!   a snapshot of the permanent memory region
//! - [`ReloadWatcher`] - detects fresh simulation builds and hands their
//!   bytes to the runtime for an in-place swap
//! - [`SimInstance`] - a loaded simulation module bound to host-owned
//!   linear memory that survives swaps
//! - [`Runtime`] - the frame orchestrator tying these together

pub mod arena;
pub mod audio;
pub mod ffi;
pub mod jobs;
pub mod platform;
pub mod reload;
pub mod replay;
pub mod runtime;
pub mod wasm;

pub use arena::{Arena, ArenaSlice, Mark};
pub use audio::{SoundClock, SoundRegion};
pub use jobs::{Job, JobFn, JobQueue, WorkerPool};
pub use platform::{DrawCommand, HostEvent, MouseButton, Platform};
pub use reload::{ReloadCheck, ReloadError, ReloadWatcher};
pub use replay::{Replay, ReplayState, Snapshot};
pub use runtime::{FrameStats, KeyBindings, Runtime, RuntimeConfig};
pub use wasm::{HostState, SimInstance, WasmEngine};

// Re-export the shared boundary types for embedders
pub use kiln_shared::{Button, ButtonState, InputSample, MemoryLayout};
