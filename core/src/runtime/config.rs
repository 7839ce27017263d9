//! Runtime configuration

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use kiln_shared::{Button, MemoryLayout, keycode};

/// Key codes mapped onto logical buttons and replay triggers.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct KeyBindings {
    pub move_left: Vec<u8>,
    pub move_right: Vec<u8>,
    pub move_up: Vec<u8>,
    pub move_down: Vec<u8>,
    pub start: Vec<u8>,
    pub begin_recording: u8,
    pub begin_playback: u8,
}

impl Default for KeyBindings {
    fn default() -> Self {
        Self {
            move_left: vec![keycode::LEFT, b'A'],
            move_right: vec![keycode::RIGHT, b'D'],
            move_up: vec![keycode::UP, b'W'],
            move_down: vec![keycode::DOWN, b'S'],
            start: vec![keycode::SPACE],
            begin_recording: keycode::F1,
            begin_playback: keycode::F2,
        }
    }
}

impl KeyBindings {
    /// Logical button a key code maps to, if any.
    pub fn button_for(&self, code: u8) -> Option<Button> {
        let groups = [
            (&self.move_left, Button::MoveLeft),
            (&self.move_right, Button::MoveRight),
            (&self.move_up, Button::MoveUp),
            (&self.move_down, Button::MoveDown),
            (&self.start, Button::Start),
        ];
        groups
            .into_iter()
            .find(|(codes, _)| codes.contains(&code))
            .map(|(_, button)| button)
    }
}

/// Host runtime configuration, loadable from TOML.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RuntimeConfig {
    /// Fixed simulation rate in Hz; also the replay sampling rate.
    pub tick_rate: u32,
    /// Per-frame CPU budget warning threshold, microseconds.
    pub cpu_budget_us: u64,
    /// Worker threads draining the job queue.
    pub worker_count: usize,
    /// Job ring slots (one is always kept free).
    pub queue_capacity: u32,
    /// Longest recordable replay, seconds.
    pub replay_max_seconds: u32,
    /// Simulation module artifact the build system produces.
    pub artifact_path: PathBuf,
    /// Root directory for the file capabilities.
    pub asset_root: PathBuf,
    /// Host scratch arena capacity in bytes.
    pub scratch_arena_size: usize,
    pub memory: MemoryLayout,
    pub bindings: KeyBindings,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            tick_rate: 60,
            cpu_budget_us: 4000,
            worker_count: 8,
            queue_capacity: 32,
            replay_max_seconds: 60,
            artifact_path: PathBuf::from("sim.wasm"),
            asset_root: PathBuf::from("data"),
            scratch_arena_size: 40 * 1024,
            memory: MemoryLayout::default(),
            bindings: KeyBindings::default(),
        }
    }
}

impl RuntimeConfig {
    pub fn from_path(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config {}", path.display()))?;
        toml::from_str(&text).with_context(|| format!("failed to parse config {}", path.display()))
    }

    /// The fixed per-frame time delta. The simulation always advances by
    /// this amount regardless of wall-clock frame time; that is what
    /// makes replay determinism possible.
    pub fn fixed_dt(&self) -> f32 {
        1.0 / self.tick_rate as f32
    }

    pub fn cpu_budget(&self) -> Duration {
        Duration::from_micros(self.cpu_budget_us)
    }

    /// Replay sample buffer size: tick rate x max seconds.
    pub fn replay_capacity(&self) -> usize {
        (self.tick_rate * self.replay_max_seconds) as usize
    }
}
