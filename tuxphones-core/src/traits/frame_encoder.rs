use std::sync::Arc;

use crate::models::config::EncoderApplication;
use crate::models::error::EncoderError;

/// Consumer of encoded frames, handed one compressed frame per call.
pub type EncodedFrameCallback = Arc<dyn Fn(&[u8]) + Send + Sync + 'static>;

/// Parameters a codec backend is created with.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EncoderSettings {
    pub sample_rate: u32,
    pub channels: u16,
    pub application: EncoderApplication,
    pub bitrate: Option<u32>,
}

/// Stateful per-session codec.
///
/// Implemented by:
/// - `OpusFrameEncoder` (tuxphones-opus)
///
/// Not `Sync`: an encoder is used by one thread at a time, behind the
/// pipeline's lock.
pub trait FrameEncoder: Send {
    /// Encode one buffer of interleaved samples into `out`.
    ///
    /// Returns the number of bytes written. A codec rejection is reported as
    /// `EncoderError::EncodeFailed` carrying the codec's result code.
    fn encode(&mut self, pcm: &[i16], out: &mut [u8]) -> Result<usize, EncoderError>;

    fn settings(&self) -> EncoderSettings;
}

/// Creates encoders lazily, when a capture starts.
pub trait EncoderFactory: Send + Sync {
    fn create(&self, settings: &EncoderSettings) -> Result<Box<dyn FrameEncoder>, EncoderError>;
}
