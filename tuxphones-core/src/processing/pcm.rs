//! PCM sample layout helpers.
//!
//! The monitor stream delivers signed 16-bit samples in native byte order.
//! Buffers from the server are byte slices that may split a sample at the
//! end; trailing odd bytes are ignored.

/// Bytes per signed 16-bit sample.
pub const BYTES_PER_SAMPLE: usize = 2;

/// Duration of one captured frame. A valid Opus frame length.
pub const FRAME_DURATION_MS: u32 = 20;

/// Decode native-endian 16-bit samples from a raw server buffer.
pub fn samples_from_ne_bytes(bytes: &[u8]) -> Vec<i16> {
    bytes
        .chunks_exact(BYTES_PER_SAMPLE)
        .map(|pair| i16::from_ne_bytes([pair[0], pair[1]]))
        .collect()
}

/// Size in bytes of `sample_count` 16-bit samples.
///
/// This is also the output bound handed to the codec: an encoded frame may
/// never be larger than the raw frame it came from.
pub fn encoded_capacity(sample_count: usize) -> usize {
    sample_count * BYTES_PER_SAMPLE
}

/// Number of mono samples in `millis` milliseconds at `sample_rate`.
pub fn samples_for_duration(sample_rate: u32, millis: u32) -> usize {
    (sample_rate as u64 * millis as u64 / 1000) as usize
}

/// Regroups byte fragments of any size into fixed-length sample frames.
///
/// The server hands out whatever its memblocks hold, which rarely matches a
/// codec frame. Bytes left over after the last whole frame are kept for the
/// next push, including a sample split across two fragments.
#[derive(Debug)]
pub struct FrameAssembler {
    frame_bytes: usize,
    pending: Vec<u8>,
}

impl FrameAssembler {
    pub fn new(frame_samples: usize) -> Self {
        let frame_bytes = encoded_capacity(frame_samples.max(1));
        Self {
            frame_bytes,
            pending: Vec::with_capacity(frame_bytes * 2),
        }
    }

    /// Frame of `FRAME_DURATION_MS` for interleaved audio at `sample_rate`.
    pub fn for_rate(sample_rate: u32, channels: u8) -> Self {
        Self::new(samples_for_duration(sample_rate, FRAME_DURATION_MS) * channels as usize)
    }

    pub fn frame_bytes(&self) -> usize {
        self.frame_bytes
    }

    pub fn pending_bytes(&self) -> usize {
        self.pending.len()
    }

    /// Append `bytes` and call `emit` once per completed frame, in order.
    pub fn push(&mut self, bytes: &[u8], mut emit: impl FnMut(&[i16])) {
        self.pending.extend_from_slice(bytes);
        let complete = self.pending.len() - self.pending.len() % self.frame_bytes;
        if complete == 0 {
            return;
        }
        for frame in self.pending[..complete].chunks_exact(self.frame_bytes) {
            emit(&samples_from_ne_bytes(frame));
        }
        self.pending.drain(..complete);
    }

    /// Forget a partial frame, e.g. after a gap in the stream.
    pub fn reset(&mut self) {
        self.pending.clear();
    }
}
