//! Layout of the host-owned linear memory the simulation runs in.
//!
//! The host creates the module's linear memory and the module imports it,
//! so code can be swapped while data cannot be silently invalidated. Three
//! disjoint regions live above `base`:
//!
//! - **permanent** - simulation state; survives hot reloads and is the
//!   unit of replay snapshotting,
//! - **scratch** - per-frame transient space for the module,
//! - **diagnostic** - introspection data the core never mutates.
//!
//! Everything below `base` belongs to the module itself (data segments,
//! shadow stack, heap). Re-instantiating a new build rewrites that area
//! and leaves the regions untouched.

use std::ops::Range;

use serde::{Deserialize, Serialize};

/// Size of one WebAssembly page.
pub const WASM_PAGE_SIZE: usize = 64 * 1024;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MemoryLayout {
    /// First byte of the permanent region; the module owns everything below.
    pub base: usize,
    pub permanent_size: usize,
    pub scratch_size: usize,
    pub diagnostic_size: usize,
}

impl Default for MemoryLayout {
    fn default() -> Self {
        Self {
            base: 1024 * 1024,
            permanent_size: 1024 * 1024,
            scratch_size: 4 * 1024 * 1024,
            diagnostic_size: 256 * 1024,
        }
    }
}

impl MemoryLayout {
    /// Total bytes of linear memory the layout needs.
    pub fn total_size(&self) -> usize {
        self.base + self.permanent_size + self.scratch_size + self.diagnostic_size
    }

    /// Linear memory pages needed to cover the layout.
    pub fn pages(&self) -> u32 {
        self.total_size().div_ceil(WASM_PAGE_SIZE) as u32
    }

    pub fn permanent_range(&self) -> Range<usize> {
        self.base..self.base + self.permanent_size
    }

    pub fn scratch_range(&self) -> Range<usize> {
        let start = self.base + self.permanent_size;
        start..start + self.scratch_size
    }

    pub fn diagnostic_range(&self) -> Range<usize> {
        let start = self.base + self.permanent_size + self.scratch_size;
        start..start + self.diagnostic_size
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn regions_are_disjoint_and_ordered() {
        let layout = MemoryLayout::default();
        let perm = layout.permanent_range();
        let scratch = layout.scratch_range();
        let diag = layout.diagnostic_range();

        assert_eq!(perm.start, layout.base);
        assert_eq!(perm.end, scratch.start);
        assert_eq!(scratch.end, diag.start);
        assert_eq!(diag.end, layout.total_size());
    }

    #[test]
    fn page_count_covers_total() {
        let layout = MemoryLayout::default();
        assert!(layout.pages() as usize * WASM_PAGE_SIZE >= layout.total_size());

        let one_byte_over = MemoryLayout {
            base: 0,
            permanent_size: WASM_PAGE_SIZE + 1,
            scratch_size: 0,
            diagnostic_size: 0,
        };
        assert_eq!(one_byte_over.pages(), 2);
    }
}
