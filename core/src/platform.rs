//! Seam between the orchestrator and the platform collaborators.
//!
//! Window/surface creation, the render backend, and the audio device are
//! external to the core; the runtime only needs polled events, a screen
//! size, somewhere to present recorded draw commands, and the audio ring
//! cursor. Tests drive the runtime through a headless implementation.

use anyhow::Result;
use smallvec::SmallVec;

/// Mouse buttons the input sample tracks.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MouseButton {
    Left,
    Right,
}

/// One polled platform event.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum HostEvent {
    Key { code: u8, down: bool },
    Mouse { button: MouseButton, down: bool },
    MouseMoved { x: f32, y: f32 },
    Char(u32),
    CloseRequested,
}

/// Per-frame event batch; sized for the common case of a few events.
pub type EventBatch = SmallVec<[HostEvent; 16]>;

/// Draw primitive recorded by the simulation through the capability
/// table, executed by the platform's render backend.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum DrawCommand {
    Clear {
        color: [f32; 4],
    },
    Rect {
        x: f32,
        y: f32,
        w: f32,
        h: f32,
        color: [f32; 4],
    },
    Sprite {
        index: u32,
        x: f32,
        y: f32,
        w: f32,
        h: f32,
        angle: f32,
    },
}

/// Host process collaborators the frame orchestrator drives.
pub trait Platform {
    /// Drain pending window/input events.
    fn poll_events(&mut self) -> EventBatch;

    /// Current drawable size in pixels.
    fn screen_size(&self) -> (f32, f32);

    /// Execute this frame's draw list and present. Paces the loop (e.g.
    /// vsync) on windowed platforms.
    fn present(&mut self, draw_list: &[DrawCommand]) -> Result<()>;

    /// Byte offset of the audio device's play cursor in its ring, or
    /// `None` when no audio device exists.
    fn audio_play_cursor(&mut self) -> Option<u32> {
        None
    }

    /// Submit interleaved samples staged by the simulation.
    fn submit_audio(&mut self, _samples: &[i16]) -> Result<()> {
        Ok(())
    }
}
