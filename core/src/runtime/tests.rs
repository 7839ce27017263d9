use std::collections::VecDeque;
use std::fs::File;
use std::path::Path;
use std::time::{Duration, SystemTime};

use smallvec::smallvec;
use tempfile::TempDir;

use kiln_shared::{MemoryLayout, keycode};

use crate::platform::{DrawCommand, EventBatch, HostEvent, Platform};
use crate::replay::{ReplayState, fnv1a};

use super::{Runtime, RuntimeConfig};

/// Platform double: a scripted event queue plus recorders for whatever
/// the runtime hands back.
#[derive(Default)]
struct HeadlessPlatform {
    events: VecDeque<EventBatch>,
    presents: usize,
    last_draw_list: Vec<DrawCommand>,
    /// `Some` simulates an attached audio device at this play cursor.
    play_cursor: Option<u32>,
    audio: Vec<i16>,
}

impl HeadlessPlatform {
    fn queue(&mut self, batch: EventBatch) {
        self.events.push_back(batch);
    }
}

impl Platform for HeadlessPlatform {
    fn poll_events(&mut self) -> EventBatch {
        self.events.pop_front().unwrap_or_default()
    }

    fn screen_size(&self) -> (f32, f32) {
        (320.0, 240.0)
    }

    fn present(&mut self, draw_list: &[DrawCommand]) -> anyhow::Result<()> {
        self.presents += 1;
        self.last_draw_list = draw_list.to_vec();
        Ok(())
    }

    fn audio_play_cursor(&mut self) -> Option<u32> {
        self.play_cursor
    }

    fn submit_audio(&mut self, samples: &[i16]) -> anyhow::Result<()> {
        self.audio.extend_from_slice(samples);
        Ok(())
    }
}

/// Mixes the MoveLeft button flags into a running hash at perm[0] and
/// mirrors the reload flag into perm[1]. The multiply-and-mask makes the
/// byte sensitive to both the value and the order of inputs, which is
/// what the determinism tests need.
const COUNTER_WAT: &str = r#"
    (module
      (import "env" "memory" (memory 1))
      (import "env" "button" (func $button (param i32) (result i32)))
      (func (export "update") (param f32 f32 f32 i32)
        (i32.store8 (i32.const 1024)
          (i32.add
            (i32.mul (i32.load8_u (i32.const 1024)) (i32.const 31))
            (i32.and (call $button (i32.const 0)) (i32.const 15))))
        (i32.store8 (i32.const 1025) (local.get 3))))
"#;

/// Stages four stereo sample pairs a frame, far fewer than a full region.
const PARTIAL_AUDIO_WAT: &str = r#"
    (module
      (import "env" "memory" (memory 1))
      (import "env" "audio_submit" (func $submit (param i32 i32) (result i32)))
      (func (export "update") (param f32 f32 f32 i32)
        (drop (call $submit (i32.const 0) (i32.const 4)))))
"#;

const MARKER_WAT: &str = r#"
    (module
      (import "env" "memory" (memory 1))
      (func (export "update") (param f32 f32 f32 i32)
        (i32.store8 (i32.const 1026) (i32.const 7))))
"#;

fn test_config(artifact: &Path) -> RuntimeConfig {
    RuntimeConfig {
        artifact_path: artifact.to_path_buf(),
        worker_count: 2,
        queue_capacity: 8,
        replay_max_seconds: 1,
        memory: MemoryLayout {
            base: 1024,
            permanent_size: 1024,
            scratch_size: 1024,
            diagnostic_size: 1024,
        },
        ..RuntimeConfig::default()
    }
}

fn write_artifact(path: &Path, wat_text: &str, mtime_offset_secs: u64) {
    let bytes = wat::parse_str(wat_text).unwrap();
    std::fs::write(path, bytes).unwrap();
    // Filesystem timestamps can be coarse; push the mtime forward so the
    // watcher always sees the rewrite.
    File::options()
        .write(true)
        .open(path)
        .unwrap()
        .set_modified(SystemTime::now() + Duration::from_secs(mtime_offset_secs))
        .unwrap();
}

fn runtime_with(wat_text: &str) -> (Runtime<HeadlessPlatform>, TempDir) {
    let dir = TempDir::new().unwrap();
    let artifact = dir.path().join("sim.wasm");
    write_artifact(&artifact, wat_text, 0);
    let runtime = Runtime::new(test_config(&artifact), HeadlessPlatform::default()).unwrap();
    (runtime, dir)
}

fn key_down(code: u8) -> EventBatch {
    smallvec![HostEvent::Key { code, down: true }]
}

fn key_up(code: u8) -> EventBatch {
    smallvec![HostEvent::Key { code, down: false }]
}

fn perm_byte(runtime: &Runtime<HeadlessPlatform>, offset: usize) -> u8 {
    runtime.sim().unwrap().perm()[offset]
}

/// Checksum of the whole permanent region, the bit-identity witness for
/// the determinism tests.
fn perm_checksum(runtime: &Runtime<HeadlessPlatform>) -> u64 {
    fnv1a(runtime.sim().unwrap().perm())
}

#[test]
fn first_frame_loads_the_artifact_and_reports_the_reload() {
    let (mut runtime, _dir) = runtime_with(COUNTER_WAT);

    let stats = runtime.frame().unwrap();
    assert!(stats.ran_update);
    assert!(stats.reloaded);
    assert_eq!(perm_byte(&runtime, 1), 1, "reload flag visible to the module");
    assert_eq!(runtime.platform().presents, 1);
    assert!(runtime.platform().last_draw_list.is_empty());

    let stats = runtime.frame().unwrap();
    assert!(!stats.reloaded);
    assert_eq!(perm_byte(&runtime, 1), 0);
    assert_eq!(runtime.tick(), 2);
}

#[test]
fn runtime_idles_until_a_build_artifact_appears() {
    let dir = TempDir::new().unwrap();
    let artifact = dir.path().join("sim.wasm");
    let mut runtime = Runtime::new(test_config(&artifact), HeadlessPlatform::default()).unwrap();

    let stats = runtime.frame().unwrap();
    assert!(!stats.ran_update);
    assert!(runtime.sim().is_none());
    // The platform is still paced while waiting.
    assert_eq!(runtime.platform().presents, 1);

    write_artifact(&artifact, COUNTER_WAT, 0);
    let stats = runtime.frame().unwrap();
    assert!(stats.ran_update);
    assert!(stats.reloaded);
}

#[test]
fn edge_flags_last_exactly_one_frame() {
    let (mut runtime, _dir) = runtime_with(COUNTER_WAT);
    runtime.frame().unwrap(); // load; perm[0] stays 0

    runtime.platform_mut().queue(key_down(keycode::LEFT));
    runtime.frame().unwrap();
    // is_down | went_down | pressed = 0b1011
    assert_eq!(perm_byte(&runtime, 0), 11);

    // No events: the edge flags are gone, is_down persists.
    runtime.frame().unwrap();
    assert_eq!(perm_byte(&runtime, 0), (11u32 * 31 + 1) as u8);
}

#[test]
fn close_request_stops_the_loop() {
    let (mut runtime, _dir) = runtime_with(COUNTER_WAT);
    runtime.frame().unwrap();
    assert!(runtime.is_running());

    runtime
        .platform_mut()
        .queue(smallvec![HostEvent::CloseRequested]);
    runtime.run().unwrap();
    assert!(!runtime.is_running());
}

#[test]
fn replay_loops_reproduce_the_recorded_trajectory() {
    let (mut runtime, _dir) = runtime_with(COUNTER_WAT);
    runtime.frame().unwrap(); // load

    // Record four frames with a distinctive input pattern.
    runtime.platform_mut().queue(key_down(keycode::F1));
    runtime.platform_mut().queue(key_down(keycode::LEFT));
    runtime.platform_mut().queue(EventBatch::new());
    runtime.platform_mut().queue(key_up(keycode::LEFT));

    let mut recorded = Vec::new();
    for _ in 0..4 {
        let stats = runtime.frame().unwrap();
        assert_eq!(stats.replay_state, ReplayState::Recording);
        recorded.push(perm_checksum(&runtime));
    }

    // Switch to playback; this frame already consumes replayed sample 0.
    runtime.platform_mut().queue(key_down(keycode::F2));
    for loop_index in 0..2 {
        let mut replayed = Vec::new();
        for _ in 0..4 {
            let stats = runtime.frame().unwrap();
            assert_eq!(stats.replay_state, ReplayState::Playing);
            replayed.push(perm_checksum(&runtime));
        }
        assert_eq!(replayed, recorded, "loop {loop_index} diverged");
    }
}

#[test]
fn recording_fills_up_and_loops_on_its_own() {
    let (mut runtime, _dir) = runtime_with(COUNTER_WAT);
    runtime.frame().unwrap();

    runtime.platform_mut().queue(key_down(keycode::F1));
    // replay_max_seconds = 1 at 60 Hz.
    for _ in 0..60 {
        runtime.frame().unwrap();
    }
    assert_eq!(runtime.replay().state(), ReplayState::Playing);
    assert_eq!(runtime.replay().sample_count(), 60);
}

#[test]
fn hot_swap_preserves_the_permanent_region() {
    let (mut runtime, dir) = runtime_with(COUNTER_WAT);
    runtime.frame().unwrap();

    runtime.platform_mut().queue(key_down(keycode::LEFT));
    runtime.frame().unwrap();
    assert_eq!(perm_byte(&runtime, 0), 11);

    write_artifact(&dir.path().join("sim.wasm"), MARKER_WAT, 2);
    let stats = runtime.frame().unwrap();
    assert!(stats.reloaded);
    assert_eq!(perm_byte(&runtime, 2), 7, "new build ran");
    assert_eq!(perm_byte(&runtime, 0), 11, "state survived the swap");
}

#[test]
fn sound_clock_advances_by_staged_samples_only() {
    let (mut runtime, _dir) = runtime_with(PARTIAL_AUDIO_WAT);
    runtime.platform_mut().play_cursor = Some(0);

    runtime.frame().unwrap();
    // 4 stereo sample pairs reached the device...
    assert_eq!(runtime.platform().audio.len(), 8);
    // ...and all of them fell inside the overwrite window, so the write
    // index must not move. Advancing by the full offered region instead
    // would leave it 800 samples (3200 bytes) past the real data.
    assert_eq!(runtime.sound_clock().write_start(), 0);
}

#[test]
fn unreadable_artifact_keeps_the_old_module_running() {
    let (mut runtime, dir) = runtime_with(COUNTER_WAT);
    runtime.frame().unwrap();

    // A directory squatting the shadow path makes the watcher's copy
    // fail with an I/O error once a fresh build appears. The first load
    // left a shadow file there; replace it.
    let shadow = dir.path().join("sim.hot.wasm");
    let _ = std::fs::remove_file(&shadow);
    std::fs::create_dir(&shadow).unwrap();
    let artifact = dir.path().join("sim.wasm");
    File::options()
        .write(true)
        .open(&artifact)
        .unwrap()
        .set_modified(SystemTime::now() + Duration::from_secs(2))
        .unwrap();

    let stats = runtime.frame().unwrap();
    assert!(stats.ran_update, "copy failure must not kill the frame loop");
    assert!(!stats.reloaded);
    assert!(runtime.is_running());
}

#[test]
fn broken_build_keeps_the_old_module_running() {
    let (mut runtime, dir) = runtime_with(COUNTER_WAT);
    runtime.frame().unwrap();

    let artifact = dir.path().join("sim.wasm");
    std::fs::write(&artifact, b"not a wasm module").unwrap();
    File::options()
        .write(true)
        .open(&artifact)
        .unwrap()
        .set_modified(SystemTime::now() + Duration::from_secs(2))
        .unwrap();

    let stats = runtime.frame().unwrap();
    assert!(stats.ran_update, "old module keeps running");
    assert!(!stats.reloaded);

    // A subsequent good build is still picked up.
    write_artifact(&artifact, MARKER_WAT, 4);
    let stats = runtime.frame().unwrap();
    assert!(stats.reloaded);
    assert_eq!(perm_byte(&runtime, 2), 7);
}
