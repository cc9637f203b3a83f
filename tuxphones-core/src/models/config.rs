use std::time::Duration;

use serde::{Deserialize, Serialize};

pub const DEFAULT_CAPTURE_SINK: &str = "TuxphonesPassthrough";
pub const DEFAULT_COMBINED_SINK: &str = "TuxphonesPassthroughCombined";

/// Codec application profile.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EncoderApplication {
    Voip,
    Audio,
    LowDelay,
}

/// Where the consumer callback runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum DeliveryMode {
    /// Synchronously on the audio server's event-loop thread.
    Inline,
    /// On a dedicated delivery thread fed by a bounded queue. Frames that
    /// do not fit are dropped rather than stalling the event loop.
    Queued { capacity: usize },
}

/// Configuration for an `AudioCaptureService`.
///
/// Held in memory only; hosts may build it from JSON with [`from_json`].
///
/// [`from_json`]: CaptureConfiguration::from_json
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CaptureConfiguration {
    /// Client name announced to the audio server.
    pub client_name: String,

    /// Null sink the target application is tapped from.
    pub capture_sink_name: String,

    /// Sink mixing the capture sink with the real output.
    pub combined_sink_name: String,

    /// Upper bound for reaching a ready session (None = wait forever).
    pub connect_timeout_ms: Option<u64>,

    /// Upper bound for each server round trip (None = wait forever).
    pub operation_timeout_ms: Option<u64>,

    pub encoder_application: EncoderApplication,

    /// Target bitrate in bits per second, or None for the codec default.
    pub bitrate: Option<u32>,

    pub delivery: DeliveryMode,
}

impl CaptureConfiguration {
    pub fn from_json(json: &str) -> Result<Self, String> {
        let config: Self =
            serde_json::from_str(json).map_err(|e| format!("invalid configuration: {}", e))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), String> {
        if self.client_name.trim().is_empty() {
            return Err("client name must not be empty".into());
        }
        for name in [&self.capture_sink_name, &self.combined_sink_name] {
            if name.is_empty() {
                return Err("sink names must not be empty".into());
            }
            // Module arguments are whitespace separated.
            if name.chars().any(char::is_whitespace) {
                return Err(format!("sink name contains whitespace: {:?}", name));
            }
        }
        if self.capture_sink_name == self.combined_sink_name {
            return Err("capture and combined sink names must differ".into());
        }
        if self.connect_timeout_ms == Some(0) || self.operation_timeout_ms == Some(0) {
            return Err("timeouts must be positive".into());
        }
        if let DeliveryMode::Queued { capacity: 0 } = self.delivery {
            return Err("delivery queue capacity must be positive".into());
        }
        if self.bitrate == Some(0) {
            return Err("bitrate must be positive".into());
        }
        Ok(())
    }

    pub fn connect_timeout(&self) -> Option<Duration> {
        self.connect_timeout_ms.map(Duration::from_millis)
    }

    pub fn operation_timeout(&self) -> Option<Duration> {
        self.operation_timeout_ms.map(Duration::from_millis)
    }
}

impl Default for CaptureConfiguration {
    fn default() -> Self {
        Self {
            client_name: "tuxphones".into(),
            capture_sink_name: DEFAULT_CAPTURE_SINK.into(),
            combined_sink_name: DEFAULT_COMBINED_SINK.into(),
            connect_timeout_ms: Some(10_000),
            operation_timeout_ms: Some(5_000),
            encoder_application: EncoderApplication::Audio,
            bitrate: None,
            delivery: DeliveryMode::Inline,
        }
    }
}
