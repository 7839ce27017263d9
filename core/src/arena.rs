//! Fixed-capacity bump allocator with a rewindable mark.
//!
//! The orchestrator owns one scratch arena per simulation instance and
//! rewinds it to the top-of-frame mark after every frame; the file-read
//! capability stages bytes in it. Allocations hand out index ranges
//! rather than references so holders and the arena can live in the same
//! struct without borrow gymnastics.

use std::path::Path;

/// Rewind point returned by [`Arena::mark`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Mark(usize);

/// Index range of one allocation.
#[derive(Debug, Clone, Copy)]
pub struct ArenaSlice {
    start: usize,
    len: usize,
}

impl ArenaSlice {
    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }
}

pub struct Arena {
    buf: Box<[u8]>,
    used: usize,
}

impl Arena {
    pub fn new(capacity: usize) -> Self {
        Self {
            buf: vec![0; capacity].into_boxed_slice(),
            used: 0,
        }
    }

    pub fn capacity(&self) -> usize {
        self.buf.len()
    }

    pub fn used(&self) -> usize {
        self.used
    }

    /// Allocate `size` bytes.
    ///
    /// # Panics
    ///
    /// Panics when the arena is exhausted: scratch usage is bounded per
    /// frame and running out means the host was sized wrong.
    pub fn alloc(&mut self, size: usize) -> ArenaSlice {
        assert!(
            self.used + size <= self.buf.len(),
            "scratch arena exhausted: {} + {} > {}",
            self.used,
            size,
            self.buf.len()
        );
        let slice = ArenaSlice {
            start: self.used,
            len: size,
        };
        self.used += size;
        slice
    }

    pub fn get(&self, slice: ArenaSlice) -> &[u8] {
        &self.buf[slice.start..slice.start + slice.len]
    }

    pub fn get_mut(&mut self, slice: ArenaSlice) -> &mut [u8] {
        &mut self.buf[slice.start..slice.start + slice.len]
    }

    pub fn mark(&self) -> Mark {
        Mark(self.used)
    }

    /// Rewind to `mark`, releasing everything allocated after it.
    pub fn reset(&mut self, mark: Mark) {
        debug_assert!(mark.0 <= self.used, "reset to a mark from the future");
        self.used = mark.0;
    }

    /// Top-of-frame rewind.
    pub fn reset_all(&mut self) {
        self.used = 0;
    }

    /// Stage a whole file's contents in the arena.
    pub fn read_file(&mut self, path: &Path) -> std::io::Result<ArenaSlice> {
        use std::io::Read;

        let mut file = std::fs::File::open(path)?;
        let size = file.metadata()?.len() as usize;
        let slice = self.alloc(size);
        file.read_exact(self.get_mut(slice))?;
        Ok(slice)
    }
}
