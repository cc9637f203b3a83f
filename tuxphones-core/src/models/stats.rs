use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

use super::audio_models::AudioLevels;

/// Why a frame never reached the consumer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FrameDropReason {
    /// The codec returned a negative result code.
    Codec { code: i32, message: String },
    /// The bounded delivery queue was full.
    QueueFull,
}

/// Counters for one capture session, updated on the event-loop thread.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CaptureStats {
    pub session_id: Uuid,
    pub started_at: DateTime<Utc>,
    pub process_id: u32,
    pub sample_rate: u32,
    pub frames_received: u64,
    pub samples_received: u64,
    pub frames_encoded: u64,
    /// Frames the codec rejected or the delivery queue could not take.
    pub frames_dropped: u64,
    pub bytes_encoded: u64,
    pub levels: AudioLevels,
}

impl CaptureStats {
    pub fn new(process_id: u32, sample_rate: u32) -> Self {
        Self {
            session_id: Uuid::new_v4(),
            started_at: Utc::now(),
            process_id,
            sample_rate,
            frames_received: 0,
            samples_received: 0,
            frames_encoded: 0,
            frames_dropped: 0,
            bytes_encoded: 0,
            levels: AudioLevels::default(),
        }
    }

    /// Seconds of mono audio received so far.
    pub fn duration_secs(&self) -> f64 {
        if self.sample_rate == 0 {
            return 0.0;
        }
        self.samples_received as f64 / self.sample_rate as f64
    }
}
