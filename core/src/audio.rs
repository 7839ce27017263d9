//! Audio buffer-region bookkeeping.
//!
//! The device side (mixing, the actual ring buffer) lives behind
//! [`Platform`](crate::platform::Platform); this module only answers the
//! question the simulation asks every frame: given the device's current
//! play cursor, how many samples may be written now, and how many of
//! those overwrite samples submitted last frame (`overwrite_count`)
//! without an audible glitch. Writing slightly past the play cursor every
//! frame and backing the write index up by the overwrite amount keeps the
//! device fed across frame-rate hiccups.

/// Writable region the simulation fills this frame.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SoundRegion {
    /// Interleaved multi-channel samples that may be written.
    pub sample_count: u32,
    /// Trailing samples of the previous submission that will be
    /// overwritten by this one.
    pub overwrite_count: u32,
}

/// Host-side bookkeeping for one looping output buffer.
#[derive(Debug, Clone)]
pub struct SoundClock {
    pub samples_per_second: u32,
    pub channel_count: u32,
    pub bytes_per_sample: u32,
    /// Device ring length in multi-channel samples.
    pub buffer_sample_count: u32,
    current_sample_index: u32,
}

/// Round `x` up to a multiple of the power-of-two `align`.
fn align_pow2(x: u32, align: u32) -> u32 {
    debug_assert!(align.is_power_of_two());
    (x + align - 1) & !(align - 1)
}

impl SoundClock {
    pub fn new(samples_per_second: u32, channel_count: u32, bytes_per_sample: u32) -> Self {
        Self {
            samples_per_second,
            channel_count,
            bytes_per_sample,
            buffer_sample_count: align_pow2(samples_per_second, 16),
            current_sample_index: 0,
        }
    }

    /// Bytes of one interleaved multi-channel sample.
    pub fn frame_size(&self) -> u32 {
        self.bytes_per_sample * self.channel_count
    }

    pub fn buffer_size_bytes(&self) -> u32 {
        self.buffer_sample_count * self.frame_size()
    }

    fn bytes_per_tick(&self, tick_rate: u32) -> u32 {
        self.samples_per_second * self.frame_size() / tick_rate
    }

    fn overwrite_bytes(&self, tick_rate: u32) -> u32 {
        align_pow2(
            self.samples_per_second / tick_rate * self.frame_size() * 2,
            32,
        )
    }

    /// Byte offset in the device ring where this frame's write begins.
    pub fn write_start(&self) -> u32 {
        self.current_sample_index * self.frame_size() % self.buffer_size_bytes()
    }

    /// Compute the writable region from the device's play cursor (a byte
    /// offset into the ring).
    pub fn request_region(&self, play_cursor: u32, tick_rate: u32) -> SoundRegion {
        let buffer_size = self.buffer_size_bytes();
        let write_start = self.write_start();
        let target = align_pow2(
            (play_cursor + self.bytes_per_tick(tick_rate) + self.overwrite_bytes(tick_rate))
                % buffer_size,
            32,
        ) % buffer_size;

        let write_bytes = if target == write_start {
            0
        } else if target > write_start {
            target - write_start
        } else {
            buffer_size - write_start + target
        };

        SoundRegion {
            sample_count: write_bytes / self.frame_size(),
            overwrite_count: self.overwrite_bytes(tick_rate) / self.frame_size(),
        }
    }

    /// Account for a submitted region: the write index moves forward by
    /// the fresh samples only, so next frame rewrites the overwrite tail.
    pub fn advance(&mut self, region: SoundRegion) {
        self.current_sample_index = self
            .current_sample_index
            .wrapping_add(region.sample_count)
            .wrapping_sub(region.overwrite_count);
    }
}
