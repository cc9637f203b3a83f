//! Opus encoding of mono or stereo 16-bit PCM via libopus.

use std::ffi::CStr;

use tuxphones_core::models::config::EncoderApplication;
use tuxphones_core::models::error::EncoderError;
use tuxphones_core::traits::frame_encoder::{EncoderFactory, EncoderSettings, FrameEncoder};

/// Application profiles from opus.h.
const OPUS_APPLICATION_VOIP: i32 = 2048;
const OPUS_APPLICATION_AUDIO: i32 = 2049;
const OPUS_APPLICATION_RESTRICTED_LOWDELAY: i32 = 2051;

const OPUS_OK: i32 = 0;

fn application_code(application: EncoderApplication) -> i32 {
    match application {
        EncoderApplication::Voip => OPUS_APPLICATION_VOIP,
        EncoderApplication::Audio => OPUS_APPLICATION_AUDIO,
        EncoderApplication::LowDelay => OPUS_APPLICATION_RESTRICTED_LOWDELAY,
    }
}

/// libopus' description of a result code.
fn error_message(code: i32) -> String {
    // SAFETY: opus_strerror returns a pointer to a static NUL-terminated string.
    let message = unsafe { libopus_sys::opus_strerror(code) };
    if message.is_null() {
        return format!("opus error {}", code);
    }
    // SAFETY: checked non-null above; the string is static.
    unsafe { CStr::from_ptr(message) }.to_string_lossy().into_owned()
}

/// Stateful libopus encoder.
///
/// Encodes exactly the samples it is given per call, so every call must be a
/// valid Opus frame duration (2.5, 5, 10, 20, 40 or 60 ms).
pub struct OpusFrameEncoder {
    encoder: *mut libopus_sys::OpusEncoder,
    settings: EncoderSettings,
}

// SAFETY: the libopus encoder state is only reachable through this value and
// is used from one thread at a time (`&mut self`). Not `Sync`.
unsafe impl Send for OpusFrameEncoder {}

impl OpusFrameEncoder {
    pub fn new(settings: &EncoderSettings) -> Result<Self, EncoderError> {
        if settings.channels != 1 && settings.channels != 2 {
            return Err(EncoderError::UnsupportedChannels(settings.channels));
        }

        let mut error: i32 = 0;
        // SAFETY: `error` outlives the call; rate and channels are validated by
        // libopus, which reports a bad combination through `error`.
        let encoder = unsafe {
            libopus_sys::opus_encoder_create(
                settings.sample_rate as i32,
                settings.channels as i32,
                application_code(settings.application),
                &mut error,
            )
        };
        if encoder.is_null() || error != OPUS_OK {
            if !encoder.is_null() {
                // SAFETY: created above and not yet shared.
                unsafe { libopus_sys::opus_encoder_destroy(encoder) };
            }
            return Err(EncoderError::InitFailed(format!(
                "{} Hz, {} channels: {}",
                settings.sample_rate,
                settings.channels,
                error_message(error)
            )));
        }

        if let Some(bitrate) = settings.bitrate {
            // SAFETY: `encoder` is a live encoder; OPUS_SET_BITRATE takes one i32.
            let result = unsafe {
                libopus_sys::opus_encoder_ctl(
                    encoder,
                    libopus_sys::OPUS_SET_BITRATE_REQUEST as i32,
                    bitrate as i32,
                )
            };
            if result != OPUS_OK {
                // SAFETY: created above and not yet shared.
                unsafe { libopus_sys::opus_encoder_destroy(encoder) };
                return Err(EncoderError::InitFailed(format!(
                    "bitrate {}: {}",
                    bitrate,
                    error_message(result)
                )));
            }
        }

        log::debug!(
            "Opus encoder created: {} Hz, {} channels, {:?}",
            settings.sample_rate,
            settings.channels,
            settings.application
        );
        Ok(Self {
            encoder,
            settings: *settings,
        })
    }
}

impl FrameEncoder for OpusFrameEncoder {
    fn encode(&mut self, pcm: &[i16], out: &mut [u8]) -> Result<usize, EncoderError> {
        let frame_size = pcm.len() / self.settings.channels as usize;
        // SAFETY: `pcm` holds `frame_size * channels` samples and `out.len()`
        // bounds the write; `&mut self` gives exclusive use of the encoder.
        let written = unsafe {
            libopus_sys::opus_encode(
                self.encoder,
                pcm.as_ptr(),
                frame_size as i32,
                out.as_mut_ptr(),
                out.len() as i32,
            )
        };
        if written < 0 {
            return Err(EncoderError::EncodeFailed {
                code: written,
                message: error_message(written),
            });
        }
        Ok(written as usize)
    }

    fn settings(&self) -> EncoderSettings {
        self.settings
    }
}

impl Drop for OpusFrameEncoder {
    fn drop(&mut self) {
        if !self.encoder.is_null() {
            // SAFETY: owned by this value and destroyed exactly once, here.
            unsafe {
                libopus_sys::opus_encoder_destroy(self.encoder);
            }
        }
    }
}

/// Creates an [`OpusFrameEncoder`] for each capture.
#[derive(Debug, Clone, Copy, Default)]
pub struct OpusEncoderFactory;

impl EncoderFactory for OpusEncoderFactory {
    fn create(&self, settings: &EncoderSettings) -> Result<Box<dyn FrameEncoder>, EncoderError> {
        Ok(Box::new(OpusFrameEncoder::new(settings)?))
    }
}
