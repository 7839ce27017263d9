//! Host-side state visible to the capability table.

use std::path::PathBuf;
use std::sync::Arc;

use wasmtime::Memory;

use kiln_shared::{InputSample, MemoryLayout};

use crate::arena::Arena;
use crate::audio::SoundRegion;
use crate::jobs::{JobFn, JobQueue};
use crate::platform::DrawCommand;

/// Audio samples staged by the simulation this frame, drained to the
/// device by the orchestrator after `update` returns.
#[derive(Debug)]
pub struct SoundStage {
    pub region: SoundRegion,
    /// Interleaved channel count of the staged samples.
    pub channel_count: u32,
    pub samples: Vec<i16>,
}

impl Default for SoundStage {
    fn default() -> Self {
        Self {
            region: SoundRegion::default(),
            channel_count: 2,
            samples: Vec::new(),
        }
    }
}

fn discard_job(data: u64) {
    tracing::trace!(data, "module job dropped: no job handler installed");
}

/// Store data backing a [`SimInstance`](super::SimInstance).
///
/// Everything the FFI capability functions read or write lives here; the
/// orchestrator publishes the frame's input sample and timing before each
/// `update` call and drains the draw list and sound stage afterwards.
pub struct HostState {
    /// Host-created linear memory (set during instantiation).
    pub memory: Option<Memory>,
    pub layout: MemoryLayout,

    /// The (possibly replayed) sample for the current frame.
    pub input: InputSample,
    pub delta_time: f32,
    pub elapsed_time: f32,
    pub tick_count: u64,

    /// Per-frame staging space, rewound by the orchestrator.
    pub scratch: Arena,
    pub draw_list: Vec<DrawCommand>,
    pub sound: SoundStage,

    /// Queue handle for the `job_submit` capability.
    pub jobs: Arc<JobQueue>,
    /// Host work function run for module-submitted jobs. Modules cannot
    /// name host functions, so the embedder installs one handler and the
    /// module passes it opaque data words.
    pub job_handler: JobFn,

    /// Root directory the file capabilities resolve paths under.
    pub asset_root: PathBuf,
    /// Files held open by the module, indexed by handle; closed handles
    /// leave a `None` slot that the next open reuses.
    pub open_files: Vec<Option<std::fs::File>>,

    pub quit_requested: bool,
}

impl HostState {
    pub fn new(
        layout: MemoryLayout,
        jobs: Arc<JobQueue>,
        asset_root: PathBuf,
        scratch_capacity: usize,
    ) -> Self {
        Self {
            memory: None,
            layout,
            input: InputSample::default(),
            delta_time: 0.0,
            elapsed_time: 0.0,
            tick_count: 0,
            scratch: Arena::new(scratch_capacity),
            draw_list: Vec::new(),
            sound: SoundStage::default(),
            jobs,
            job_handler: discard_job,
            asset_root,
            open_files: Vec::new(),
            quit_requested: false,
        }
    }
}
