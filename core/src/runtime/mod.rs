//! Frame orchestrator.
//!
//! One `frame()` call runs the full per-frame sequence in a fixed order:
//!
//! 1. poll the build artifact and hot-swap the simulation module
//! 2. clear input edge flags, fold platform events into the sample
//! 3. service the replay state machine (triggers, record or override)
//! 4. publish the sample, timing, and the audio region to the module
//! 5. run the module's `update` export once with the fixed time delta
//! 6. hand the recorded draw list and staged audio to the platform
//! 7. rewind the scratch arena and advance the tick counters
//!
//! The simulation always advances by exactly `1 / tick_rate` seconds per
//! frame; pacing to real time is the platform's job (vsync in
//! `present`). That fixed delta is load-bearing: it is what lets a
//! recorded input sequence replay into a bit-identical trajectory.

use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};

use kiln_shared::InputSample;

use crate::audio::{SoundClock, SoundRegion};
use crate::jobs::{JobFn, JobQueue, WorkerPool};
use crate::platform::{HostEvent, MouseButton, Platform};
use crate::reload::{ReloadCheck, ReloadWatcher};
use crate::replay::{Replay, ReplayState};
use crate::wasm::{HostState, SimInstance, WasmEngine};

mod config;
#[cfg(test)]
mod tests;

pub use config::{KeyBindings, RuntimeConfig};

/// What one `frame()` call did, for callers that drive the loop
/// themselves.
#[derive(Debug, Clone, Copy)]
pub struct FrameStats {
    /// Whether the simulation update ran (false while waiting for the
    /// first build artifact).
    pub ran_update: bool,
    /// Whether a fresh module build was swapped in this frame.
    pub reloaded: bool,
    pub replay_state: ReplayState,
    pub frame_time: Duration,
}

/// The host runtime: owns the module instance, the worker pool, the
/// replay recorder, and the reload watcher, and drives them through a
/// `Platform`.
pub struct Runtime<P: Platform> {
    config: RuntimeConfig,
    platform: P,
    engine: WasmEngine,
    sim: Option<SimInstance>,
    jobs: Arc<JobQueue>,
    workers: WorkerPool,
    watcher: ReloadWatcher,
    replay: Replay,
    sound_clock: SoundClock,
    input: InputSample,
    job_handler: Option<JobFn>,
    /// Set when a swap happened and the module has not yet been told.
    pending_reload: bool,
    running: bool,
    tick: u64,
    elapsed: f32,
}

impl<P: Platform> Runtime<P> {
    pub fn new(config: RuntimeConfig, platform: P) -> Result<Self> {
        let engine = WasmEngine::new()?;
        let jobs = Arc::new(JobQueue::new(config.queue_capacity));
        let workers = WorkerPool::spawn(Arc::clone(&jobs), config.worker_count);
        let watcher = ReloadWatcher::new(&config.artifact_path);
        let replay = Replay::new(config.replay_capacity());
        let sound_clock = SoundClock::new(48_000, 2, 2);

        Ok(Self {
            config,
            platform,
            engine,
            sim: None,
            jobs,
            workers,
            watcher,
            replay,
            sound_clock,
            input: InputSample::default(),
            job_handler: None,
            pending_reload: false,
            running: true,
            tick: 0,
            elapsed: 0.0,
        })
    }

    pub fn platform(&self) -> &P {
        &self.platform
    }

    pub fn platform_mut(&mut self) -> &mut P {
        &mut self.platform
    }

    pub fn sim(&self) -> Option<&SimInstance> {
        self.sim.as_ref()
    }

    pub fn replay(&self) -> &Replay {
        &self.replay
    }

    pub fn jobs(&self) -> &Arc<JobQueue> {
        &self.jobs
    }

    pub fn sound_clock(&self) -> &SoundClock {
        &self.sound_clock
    }

    pub fn worker_count(&self) -> usize {
        self.workers.worker_count()
    }

    pub fn is_running(&self) -> bool {
        self.running
    }

    pub fn tick(&self) -> u64 {
        self.tick
    }

    /// Install the dispatch function invoked for jobs the module
    /// submits. Takes effect for the current instance and every
    /// instance created after a swap.
    pub fn set_job_handler(&mut self, handler: JobFn) {
        self.job_handler = Some(handler);
        if let Some(sim) = self.sim.as_mut() {
            sim.state_mut().job_handler = handler;
        }
    }

    /// Drive frames until the simulation or the platform asks to stop.
    pub fn run(&mut self) -> Result<()> {
        while self.running {
            self.frame()?;
        }
        Ok(())
    }

    /// Run one frame of the fixed sequence documented at module level.
    pub fn frame(&mut self) -> Result<FrameStats> {
        let frame_start = Instant::now();

        let reloaded = self.check_reload()?;
        if reloaded {
            self.pending_reload = true;
        }

        self.input.clear_edges();
        for event in self.platform.poll_events() {
            self.fold_event(event);
        }

        let Some(sim) = self.sim.as_mut() else {
            // No build artifact yet. Keep pacing through the platform so
            // the window stays responsive while we wait.
            self.platform.present(&[])?;
            return Ok(FrameStats {
                ran_update: false,
                reloaded,
                replay_state: self.replay.state(),
                frame_time: frame_start.elapsed(),
            });
        };

        // Replay triggers are edge-triggered on live input only; a
        // replayed sample never re-triggers them.
        if self.input.key(self.config.bindings.begin_recording).went_down() && self.replay.is_idle()
        {
            self.replay.begin_recording(sim.perm());
        } else if self.input.key(self.config.bindings.begin_playback).went_down()
            && self.replay.is_recording()
        {
            self.replay.begin_playback(sim.perm_mut());
        }

        let mut sample = self.input;
        match self.replay.state() {
            ReplayState::Idle => {}
            // Record first; if this fills the buffer the state flips to
            // Playing but this frame still runs with the live sample.
            ReplayState::Recording => self.replay.record_sample(sample, sim.perm_mut()),
            ReplayState::Playing => sample = self.replay.next_sample(sim.perm_mut()),
        }

        let dt = self.config.fixed_dt();
        let region = match self.platform.audio_play_cursor() {
            Some(play_cursor) => self
                .sound_clock
                .request_region(play_cursor, self.config.tick_rate),
            None => SoundRegion::default(),
        };

        {
            let state = sim.state_mut();
            state.input = sample;
            state.delta_time = dt;
            state.elapsed_time = self.elapsed;
            state.tick_count = self.tick;
            state.sound.region = region;
            state.draw_list.clear();
            state.sound.samples.clear();
        }

        let screen = self.platform.screen_size();
        let is_reloaded = std::mem::take(&mut self.pending_reload);
        sim.update(screen, dt, is_reloaded)
            .context("simulation frame failed")?;

        let draw_list = std::mem::take(&mut sim.state_mut().draw_list);
        self.platform.present(&draw_list)?;
        // Hand the draw list's allocation back to avoid churning it.
        sim.state_mut().draw_list = draw_list;

        let samples = std::mem::take(&mut sim.state_mut().sound.samples);
        if !samples.is_empty() {
            self.platform.submit_audio(&samples)?;
            // Advance by what was actually staged, not by the offered
            // region; a module that writes fewer samples must not drift
            // the write index past real data.
            let written = samples.len() as u32 / self.sound_clock.channel_count;
            self.sound_clock.advance(SoundRegion {
                sample_count: written,
                overwrite_count: region.overwrite_count.min(written),
            });
        }

        if sim.state().quit_requested {
            self.running = false;
        }

        sim.state_mut().scratch.reset_all();
        self.tick += 1;
        self.elapsed += dt;

        let frame_time = frame_start.elapsed();
        if frame_time > self.config.cpu_budget() {
            tracing::warn!(
                frame_time_us = frame_time.as_micros() as u64,
                budget_us = self.config.cpu_budget_us,
                "frame exceeded CPU budget"
            );
        }

        Ok(FrameStats {
            ran_update: true,
            reloaded: is_reloaded,
            replay_state: self.replay.state(),
            frame_time,
        })
    }

    fn fold_event(&mut self, event: HostEvent) {
        match event {
            HostEvent::Key { code, down } => {
                if let Some(button) = self.config.bindings.button_for(code) {
                    self.input.button_mut(button).handle_event(down);
                }
                if let Some(key) = self.input.key_mut(code) {
                    key.handle_event(down);
                }
            }
            HostEvent::Mouse { button, down } => match button {
                MouseButton::Left => self.input.mouse_left.handle_event(down),
                MouseButton::Right => self.input.mouse_right.handle_event(down),
            },
            HostEvent::MouseMoved { x, y } => {
                self.input.mouse_x = x;
                self.input.mouse_y = y;
            }
            HostEvent::Char(code) => self.input.char_code = code,
            HostEvent::CloseRequested => self.running = false,
        }
    }

    /// Poll the build artifact and swap the module in if it changed.
    ///
    /// An environment failure - shadow copy I/O, a build that fails to
    /// compile or instantiate - keeps the previous module running and
    /// leaves the watcher uncommitted, so the next successful build is
    /// picked up normally. Before any module has loaded there is nothing
    /// to fall back to and the error is fatal.
    fn check_reload(&mut self) -> Result<bool> {
        let check = match self.watcher.poll() {
            Ok(check) => check,
            Err(err) if self.sim.is_some() => {
                tracing::warn!(error = %err, "reload poll failed, keeping the old module");
                return Ok(false);
            }
            Err(err) => {
                return Err(anyhow::Error::new(err).context("initial simulation module load failed"));
            }
        };
        let ReloadCheck::Changed { bytes, mtime } = check else {
            return Ok(false);
        };

        let result = self.engine.load_module(&bytes).and_then(|module| {
            match self.sim.as_mut() {
                Some(sim) => sim.hot_swap(&module),
                None => {
                    let mut state = HostState::new(
                        self.config.memory,
                        Arc::clone(&self.jobs),
                        self.config.asset_root.clone(),
                        self.config.scratch_arena_size,
                    );
                    if let Some(handler) = self.job_handler {
                        state.job_handler = handler;
                    }
                    self.sim = Some(SimInstance::new(&self.engine, &module, state)?);
                    Ok(())
                }
            }
        });

        match result {
            Ok(()) => {
                self.watcher.commit(mtime);
                tracing::info!(
                    artifact = %self.watcher.artifact_path().display(),
                    bytes = bytes.len(),
                    "simulation module loaded"
                );
                Ok(true)
            }
            Err(err) if self.sim.is_some() => {
                tracing::warn!(error = %format!("{err:#}"), "new build rejected, keeping the old module");
                Ok(false)
            }
            Err(err) => Err(err.context("initial simulation module load failed")),
        }
    }
}
