//! WASM engine wrapper for loading and compiling simulation modules.

use anyhow::{Context, Result};
use wasmtime::{Engine, Module};

/// Shared WASM engine (one per host process).
pub struct WasmEngine {
    engine: Engine,
}

impl WasmEngine {
    /// Create a new WASM engine with default configuration.
    ///
    /// Intentionally not `Default`: engine initialization is fallible on
    /// unsupported platforms and the error should propagate.
    pub fn new() -> Result<Self> {
        let engine = Engine::default();
        Ok(Self { engine })
    }

    pub fn engine(&self) -> &Engine {
        &self.engine
    }

    /// Compile a simulation module from artifact bytes.
    pub fn load_module(&self, bytes: &[u8]) -> Result<Module> {
        Module::new(&self.engine, bytes).context("failed to compile simulation module")
    }
}
