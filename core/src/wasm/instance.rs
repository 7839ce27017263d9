//! A loaded simulation module bound to host-owned memory.

use anyhow::{Context, Result};
use wasmtime::{Instance, Linker, Memory, MemoryType, Module, Store, TypedFunc};

use super::engine::WasmEngine;
use super::state::HostState;
use crate::ffi::register_host_ffi;

/// Fixed export name the entry point is resolved by.
pub const UPDATE_EXPORT: &str = "update";

/// A simulation module instantiated against host-owned linear memory.
///
/// The store (and with it the memory and all [`HostState`]) lives for the
/// whole session; [`hot_swap`](Self::hot_swap) replaces only the instance
/// and its rebound entry point. The module imports the memory as
/// `(import "env" "memory")`, so its own data segments re-initialize the
/// low module-owned area on a swap while the regions above
/// `layout.base` are untouched.
pub struct SimInstance {
    store: Store<HostState>,
    linker: Linker<HostState>,
    memory: Memory,
    /// Kept alive for the lifetime of the bound entry point.
    #[allow(dead_code)]
    instance: Instance,
    update_fn: TypedFunc<(f32, f32, f32, i32), ()>,
}

impl SimInstance {
    /// Instantiate the first build of the simulation.
    pub fn new(engine: &WasmEngine, module: &Module, state: HostState) -> Result<Self> {
        let layout = state.layout;
        let mut store = Store::new(engine.engine(), state);

        let pages = layout.pages();
        let memory = Memory::new(&mut store, MemoryType::new(pages, Some(pages)))
            .context("failed to create simulation memory")?;
        store.data_mut().memory = Some(memory);

        let mut linker: Linker<HostState> = Linker::new(engine.engine());
        linker
            .define(&mut store, "env", "memory", memory)
            .context("failed to export host memory to the module")?;
        register_host_ffi(&mut linker)?;

        let (instance, update_fn) = bind(&mut linker, &mut store, module)?;
        Ok(Self {
            store,
            linker,
            memory,
            instance,
            update_fn,
        })
    }

    /// Swap in a new build of the module.
    ///
    /// Only commits on success: if instantiation fails or the new build
    /// lacks the `update` export, the previous instance keeps running.
    pub fn hot_swap(&mut self, module: &Module) -> Result<()> {
        let (instance, update_fn) = bind(&mut self.linker, &mut self.store, module)?;
        self.instance = instance;
        self.update_fn = update_fn;
        Ok(())
    }

    /// Invoke the simulation entry point.
    ///
    /// `is_reloaded` must be true exactly on the first call after a
    /// swap so the module can re-derive anything cached from code.
    pub fn update(&mut self, screen_size: (f32, f32), dt: f32, is_reloaded: bool) -> Result<()> {
        self.update_fn
            .call(
                &mut self.store,
                (screen_size.0, screen_size.1, dt, is_reloaded as i32),
            )
            .context("simulation update trapped")
    }

    pub fn state(&self) -> &HostState {
        self.store.data()
    }

    pub fn state_mut(&mut self) -> &mut HostState {
        self.store.data_mut()
    }

    /// The permanent region: the unit of replay snapshotting.
    pub fn perm(&self) -> &[u8] {
        let range = self.store.data().layout.permanent_range();
        &self.memory.data(&self.store)[range]
    }

    pub fn perm_mut(&mut self) -> &mut [u8] {
        let range = self.store.data().layout.permanent_range();
        &mut self.memory.data_mut(&mut self.store)[range]
    }

    /// The diagnostic region; read-only for the core.
    pub fn diagnostic(&self) -> &[u8] {
        let range = self.store.data().layout.diagnostic_range();
        &self.memory.data(&self.store)[range]
    }
}

fn bind(
    linker: &mut Linker<HostState>,
    store: &mut Store<HostState>,
    module: &Module,
) -> Result<(Instance, TypedFunc<(f32, f32, f32, i32), ()>)> {
    let instance = linker
        .instantiate(&mut *store, module)
        .context("failed to instantiate simulation module")?;
    let update_fn = instance
        .get_typed_func::<(f32, f32, f32, i32), ()>(&mut *store, UPDATE_EXPORT)
        .with_context(|| format!("simulation module is missing the `{UPDATE_EXPORT}` export"))?;
    Ok((instance, update_fn))
}
