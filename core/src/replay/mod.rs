//! Deterministic input recording and looping playback.
//!
//! Recording captures a snapshot of the permanent memory region plus a
//! bounded sequence of per-frame input samples. Playback restores the
//! snapshot and re-emits the samples; reaching the end restores the
//! snapshot again and wraps, producing an infinitely repeating
//! trajectory. Because the simulation always runs with the same fixed
//! time delta, the replayed trajectory is bit-identical to the recorded
//! one.
//!
//! State machine: `Idle -> Recording` (external trigger),
//! `Recording -> Playing` (external trigger, or the sample buffer filling
//! up), `Playing -> Playing` (loop). There is no way back to `Idle`;
//! calling an accessor in the wrong state is a programmer error and
//! panics.
//!
//! During playback the recorded sample replaces live input entirely;
//! mixing live and replayed input is out of contract.

use kiln_shared::InputSample;


#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReplayState {
    Idle,
    Recording,
    Playing,
}

/// Copy of the permanent region taken when recording began.
#[derive(Debug, Clone, Default)]
pub struct Snapshot {
    data: Vec<u8>,
    checksum: u64,
}

impl Snapshot {
    pub fn capture(perm: &[u8]) -> Self {
        Self {
            data: perm.to_vec(),
            checksum: fnv1a(perm),
        }
    }

    pub fn restore(&self, perm: &mut [u8]) {
        assert_eq!(
            perm.len(),
            self.data.len(),
            "permanent region size changed under an active replay"
        );
        perm.copy_from_slice(&self.data);
    }

    pub fn checksum(&self) -> u64 {
        self.checksum
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}

/// FNV-1a, fast with a good distribution for change detection.
pub fn fnv1a(data: &[u8]) -> u64 {
    const FNV_OFFSET_BASIS: u64 = 0xcbf29ce484222325;
    const FNV_PRIME: u64 = 0x100000001b3;

    let mut hash = FNV_OFFSET_BASIS;
    for byte in data {
        hash ^= *byte as u64;
        hash = hash.wrapping_mul(FNV_PRIME);
    }
    hash
}

/// Replay recorder/player over one snapshot buffer and a bounded sample
/// sequence.
pub struct Replay {
    state: ReplayState,
    snapshot: Snapshot,
    samples: Vec<InputSample>,
    capacity: usize,
    cursor: usize,
}

impl Replay {
    /// `capacity` bounds the recorded sequence; the runtime sizes it as
    /// tick_rate x max_seconds.
    pub fn new(capacity: usize) -> Self {
        assert!(capacity > 0, "replay capacity must be non-zero");
        Self {
            state: ReplayState::Idle,
            snapshot: Snapshot::default(),
            samples: Vec::with_capacity(capacity),
            capacity,
            cursor: 0,
        }
    }

    pub fn state(&self) -> ReplayState {
        self.state
    }

    pub fn is_idle(&self) -> bool {
        self.state == ReplayState::Idle
    }

    pub fn is_recording(&self) -> bool {
        self.state == ReplayState::Recording
    }

    pub fn is_playing(&self) -> bool {
        self.state == ReplayState::Playing
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn sample_count(&self) -> usize {
        self.samples.len()
    }

    pub fn snapshot(&self) -> &Snapshot {
        &self.snapshot
    }

    /// Begin recording: snapshot the permanent region and reset the
    /// sample sequence. Only valid from `Idle`.
    pub fn begin_recording(&mut self, perm: &[u8]) {
        assert!(
            self.state == ReplayState::Idle,
            "replay: begin_recording is only valid from Idle"
        );
        self.snapshot = Snapshot::capture(perm);
        self.samples.clear();
        self.state = ReplayState::Recording;
        tracing::info!(perm_bytes = perm.len(), "replay recording started");
    }

    /// Begin playback early, restoring the permanent region to the state
    /// recording started from. Only valid from `Recording`.
    pub fn begin_playback(&mut self, perm: &mut [u8]) {
        assert!(
            self.state == ReplayState::Recording,
            "replay: begin_playback is only valid from Recording"
        );
        self.enter_playback(perm);
    }

    /// Append one sample. Only valid while `Recording`; filling the
    /// buffer auto-transitions to `Playing`.
    pub fn record_sample(&mut self, sample: InputSample, perm: &mut [u8]) {
        assert!(
            self.state == ReplayState::Recording,
            "replay: record_sample outside Recording"
        );
        self.samples.push(sample);
        if self.samples.len() == self.capacity {
            tracing::info!(samples = self.capacity, "replay buffer full, looping");
            self.enter_playback(perm);
        }
    }

    /// Return the sample at the play cursor and advance it. On an
    /// exhausted sequence the permanent region is restored from the
    /// snapshot first and playback wraps to sample 0. Only valid while
    /// `Playing`.
    pub fn next_sample(&mut self, perm: &mut [u8]) -> InputSample {
        assert!(
            self.state == ReplayState::Playing,
            "replay: next_sample outside Playing"
        );
        assert!(
            !self.samples.is_empty(),
            "replay: playback with no recorded samples"
        );
        if self.cursor == self.samples.len() {
            self.snapshot.restore(perm);
            self.cursor = 0;
        }
        let sample = self.samples[self.cursor];
        self.cursor += 1;
        sample
    }

    fn enter_playback(&mut self, perm: &mut [u8]) {
        // Playback must start from the exact state recording began with,
        // not whatever state existed when recording stopped.
        self.snapshot.restore(perm);
        self.cursor = 0;
        self.state = ReplayState::Playing;
        tracing::info!(samples = self.samples.len(), "replay playback started");
    }
}
