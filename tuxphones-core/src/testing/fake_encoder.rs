//! Codec stand-in with the frame-size and sample-rate rules of Opus.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use crate::models::error::EncoderError;
use crate::traits::frame_encoder::{EncoderFactory, EncoderSettings, FrameEncoder};

const RATES: [u32; 5] = [8000, 12000, 16000, 24000, 48000];
/// Frame durations accepted, in tenths of a millisecond.
const FRAME_TENTHS_MS: [u64; 6] = [25, 50, 100, 200, 400, 600];
const BAD_ARG: i32 = -1;

#[derive(Default)]
pub struct FakeEncoderFactory {
    /// Encoders created so far.
    pub created: Arc<AtomicUsize>,
}

impl FakeEncoderFactory {
    pub fn new() -> Self {
        Self::default()
    }
}

impl EncoderFactory for FakeEncoderFactory {
    fn create(&self, settings: &EncoderSettings) -> Result<Box<dyn FrameEncoder>, EncoderError> {
        if !RATES.contains(&settings.sample_rate) {
            return Err(EncoderError::InitFailed("invalid argument".into()));
        }
        if settings.channels != 1 && settings.channels != 2 {
            return Err(EncoderError::UnsupportedChannels(settings.channels));
        }
        self.created.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(FakeEncoder { settings: *settings }))
    }
}

pub struct FakeEncoder {
    settings: EncoderSettings,
}

impl FrameEncoder for FakeEncoder {
    fn encode(&mut self, pcm: &[i16], out: &mut [u8]) -> Result<usize, EncoderError> {
        let frames = (pcm.len() / self.settings.channels as usize) as u64;
        let tenths_ms = frames * 10_000 / self.settings.sample_rate as u64;
        let exact = frames * 10_000 % self.settings.sample_rate as u64 == 0;
        if !exact || !FRAME_TENTHS_MS.contains(&tenths_ms) {
            return Err(EncoderError::EncodeFailed {
                code: BAD_ARG,
                message: "invalid argument".into(),
            });
        }
        // A small deterministic "packet": the frame length followed by a checksum byte.
        let len = out.len().min(3);
        let header = [
            (pcm.len() >> 8) as u8,
            pcm.len() as u8,
            pcm.iter().fold(0u8, |acc, &s| acc.wrapping_add(s as u8)),
        ];
        out[..len].copy_from_slice(&header[..len]);
        Ok(len)
    }

    fn settings(&self) -> EncoderSettings {
        self.settings
    }
}
