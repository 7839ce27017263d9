//! Simulation module hosting.
//!
//! The simulation is an independently-compiled WASM artifact with a
//! single `update` export. It runs against linear memory the host
//! creates and the module imports, so a hot swap replaces code while all
//! state stays in place.

mod engine;
mod instance;
mod state;


pub use engine::WasmEngine;
pub use instance::{SimInstance, UPDATE_EXPORT};
pub use state::{HostState, SoundStage};
