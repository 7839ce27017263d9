//! Per-frame input sampling types.
//!
//! An [`InputSample`] is an immutable snapshot of button/key/mouse state,
//! produced fresh each frame by the host's event fold, or substituted
//! wholesale by the replay player. It is `Pod` so replay can store a
//! bounded array of samples and compare runs byte-for-byte.

use bytemuck::{Pod, Zeroable};

/// Number of raw key slots tracked per sample (indexed by key code).
pub const KEY_COUNT: usize = 128;

/// Number of named logical buttons.
pub const BUTTON_COUNT: usize = 5;

/// Logical buttons the host maps key codes onto.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(usize)]
pub enum Button {
    MoveLeft = 0,
    MoveRight = 1,
    MoveUp = 2,
    MoveDown = 3,
    Start = 4,
}

/// Classic key codes the default bindings use.
///
/// Letter keys are their ASCII uppercase value.
pub mod keycode {
    pub const SPACE: u8 = 32;
    pub const LEFT: u8 = 37;
    pub const UP: u8 = 38;
    pub const RIGHT: u8 = 39;
    pub const DOWN: u8 = 40;
    pub const F1: u8 = 112;
    pub const F2: u8 = 113;
}

/// One button's state, packed into a flag byte.
///
/// `IS_DOWN` is level state and survives the per-frame edge reset;
/// the other three are edges valid for a single frame only.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Pod, Zeroable)]
#[repr(C)]
pub struct ButtonState {
    pub flags: u8,
}

impl ButtonState {
    pub const IS_DOWN: u8 = 1 << 0;
    pub const WENT_DOWN: u8 = 1 << 1;
    pub const WENT_UP: u8 = 1 << 2;
    pub const PRESSED: u8 = 1 << 3;

    pub fn is_down(self) -> bool {
        self.flags & Self::IS_DOWN != 0
    }

    pub fn went_down(self) -> bool {
        self.flags & Self::WENT_DOWN != 0
    }

    pub fn went_up(self) -> bool {
        self.flags & Self::WENT_UP != 0
    }

    pub fn pressed(self) -> bool {
        self.flags & Self::PRESSED != 0
    }

    /// Fold one key/button transition event into this state.
    ///
    /// `pressed` fires on every down event (including key repeat),
    /// `went_down`/`went_up` only on genuine level changes.
    pub fn handle_event(&mut self, is_down: bool) {
        if is_down {
            self.flags |= Self::PRESSED;
        }
        if self.is_down() && !is_down {
            self.flags |= Self::WENT_UP;
        } else if !self.is_down() && is_down {
            self.flags |= Self::WENT_DOWN;
        }
        if is_down {
            self.flags |= Self::IS_DOWN;
        } else {
            self.flags &= !Self::IS_DOWN;
        }
    }

    /// Clear edge flags, keeping level state.
    pub fn clear_edges(&mut self) {
        self.flags &= Self::IS_DOWN;
    }
}

/// Immutable per-frame snapshot of all input state.
#[derive(Debug, Clone, Copy, PartialEq, Pod, Zeroable)]
#[repr(C)]
pub struct InputSample {
    /// Raw key table, indexed by key code.
    pub keys: [ButtonState; KEY_COUNT],
    /// Named logical buttons, indexed by [`Button`].
    pub buttons: [ButtonState; BUTTON_COUNT],
    pub mouse_left: ButtonState,
    pub mouse_right: ButtonState,
    _pad: [u8; 1],
    pub mouse_x: f32,
    pub mouse_y: f32,
    /// Character produced this frame, 0 if none.
    pub char_code: u32,
}

impl Default for InputSample {
    fn default() -> Self {
        Zeroable::zeroed()
    }
}

impl InputSample {
    pub fn key(&self, code: u8) -> ButtonState {
        self.keys.get(code as usize).copied().unwrap_or_default()
    }

    pub fn button(&self, button: Button) -> ButtonState {
        self.buttons[button as usize]
    }

    pub fn key_mut(&mut self, code: u8) -> Option<&mut ButtonState> {
        self.keys.get_mut(code as usize)
    }

    pub fn button_mut(&mut self, button: Button) -> &mut ButtonState {
        &mut self.buttons[button as usize]
    }

    /// Top-of-frame reset: drop all edge flags and the pending character,
    /// preserve level state so held keys stay held across frames.
    pub fn clear_edges(&mut self) {
        for key in &mut self.keys {
            key.clear_edges();
        }
        for button in &mut self.buttons {
            button.clear_edges();
        }
        self.mouse_left.clear_edges();
        self.mouse_right.clear_edges();
        self.char_code = 0;
    }
}
