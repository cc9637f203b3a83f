use std::sync::Arc;

use crate::models::config::{CaptureConfiguration, DeliveryMode, EncoderApplication};
use crate::models::error::EncoderError;
use crate::models::stats::{CaptureStats, FrameDropReason};
use crate::pipeline::delivery::FrameDelivery;
use crate::processing::{levels, pcm};
use crate::traits::capture_delegate::CaptureDelegate;
use crate::traits::frame_encoder::{EncodedFrameCallback, EncoderFactory, EncoderSettings, FrameEncoder};

/// Captured audio is always mono.
pub const CAPTURE_CHANNELS: u16 = 1;

/// Live encoder for one capture session.
struct EncoderState {
    codec: Box<dyn FrameEncoder>,
    delivery: FrameDelivery,
}

/// Turns raw PCM buffers from the monitor stream into compressed frames.
///
/// Exactly the samples handed to `on_frame` are encoded per call; there is
/// no reframing. At most one encoder exists at a time.
pub struct EncodingPipeline {
    factory: Arc<dyn EncoderFactory>,
    application: EncoderApplication,
    bitrate: Option<u32>,
    delivery_mode: DeliveryMode,
    delegate: Option<Arc<dyn CaptureDelegate>>,
    state: Option<EncoderState>,
    stats: Option<CaptureStats>,
}

impl EncodingPipeline {
    pub fn new(factory: Arc<dyn EncoderFactory>, config: &CaptureConfiguration) -> Self {
        Self {
            factory,
            application: config.encoder_application,
            bitrate: config.bitrate,
            delivery_mode: config.delivery,
            delegate: None,
            state: None,
            stats: None,
        }
    }

    pub fn set_delegate(&mut self, delegate: Arc<dyn CaptureDelegate>) {
        self.delegate = Some(delegate);
    }

    pub fn is_open(&self) -> bool {
        self.state.is_some()
    }

    /// Create a mono encoder at `sample_rate` and start frame delivery.
    pub fn open(
        &mut self,
        sample_rate: u32,
        process_id: u32,
        consumer: EncodedFrameCallback,
    ) -> Result<(), EncoderError> {
        if self.state.is_some() {
            return Err(EncoderError::AlreadyOpen);
        }

        let settings = EncoderSettings {
            sample_rate,
            channels: CAPTURE_CHANNELS,
            application: self.application,
            bitrate: self.bitrate,
        };
        let codec = self.factory.create(&settings)?;
        let delivery = FrameDelivery::start(self.delivery_mode, consumer)?;

        log::debug!("Encoder open: {} Hz mono, {:?}", sample_rate, self.application);
        self.state = Some(EncoderState { codec, delivery });
        self.stats = Some(CaptureStats::new(process_id, sample_rate));
        Ok(())
    }

    /// Encode one server-delivered buffer and forward the result.
    ///
    /// A codec rejection drops the frame: the result is empty, nothing is
    /// forwarded, and the session carries on. An empty input encodes to an
    /// empty output.
    pub fn on_frame(&mut self, samples: &[i16]) -> Result<Vec<u8>, EncoderError> {
        let (Some(state), Some(stats)) = (self.state.as_mut(), self.stats.as_mut()) else {
            return Err(EncoderError::NotOpen);
        };

        stats.frames_received += 1;
        stats.samples_received += samples.len() as u64;
        if samples.is_empty() {
            return Ok(Vec::new());
        }
        stats.levels = levels::measure(samples);

        let mut encoded = vec![0u8; pcm::encoded_capacity(samples.len())];
        let written = match state.codec.encode(samples, &mut encoded) {
            Ok(written) => written,
            Err(EncoderError::EncodeFailed { code, message }) => {
                stats.frames_dropped += 1;
                log::warn!(
                    "Dropping frame of {} samples: {} (code {})",
                    samples.len(),
                    message,
                    code
                );
                if let Some(ref delegate) = self.delegate {
                    delegate.on_frame_dropped(&FrameDropReason::Codec { code, message });
                }
                return Ok(Vec::new());
            }
            Err(e) => return Err(e),
        };
        encoded.truncate(written);
        if encoded.is_empty() {
            return Ok(encoded);
        }

        stats.frames_encoded += 1;
        stats.bytes_encoded += encoded.len() as u64;

        if let Err(reason) = state.delivery.deliver(&encoded) {
            stats.frames_dropped += 1;
            log::debug!("Encoded frame not delivered: {:?}", reason);
            if let Some(ref delegate) = self.delegate {
                delegate.on_frame_dropped(&reason);
            }
        }
        Ok(encoded)
    }

    /// Release the encoder and drain delivery. No-op when not open.
    pub fn close(&mut self) {
        let Some(mut state) = self.state.take() else {
            return;
        };
        state.delivery.shutdown();
        if let Some(ref stats) = self.stats {
            log::info!(
                "Encoder closed after {:.1}s: {} frames encoded, {} dropped, {} bytes",
                stats.duration_secs(),
                stats.frames_encoded,
                stats.frames_dropped,
                stats.bytes_encoded
            );
        }
    }

    /// Counters for the open session, or the last one after close.
    pub fn stats(&self) -> Option<CaptureStats> {
        self.stats.clone()
    }
}

impl Drop for EncodingPipeline {
    fn drop(&mut self) {
        self.close();
    }
}
