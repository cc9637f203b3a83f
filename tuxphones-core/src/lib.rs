//! # tuxphones-core
//!
//! Platform-agnostic core for capturing the audio of a single application.
//!
//! The target application's playback stream is moved onto a combined sink
//! that mixes into both a silent capture sink and the user's real output, so
//! playback stays audible while the capture sink's monitor is recorded and
//! encoded. Audio server and codec backends implement the `AudioServer` and
//! `EncoderFactory` traits and plug into the generic `AudioCaptureService`.
//!
//! ## Architecture
//!
//! ```text
//! tuxphones-core (this crate)
//! ├── traits/       ← AudioServer, MonitorStream, FrameEncoder, EncoderFactory, CaptureDelegate
//! ├── models/       ← errors, CaptureState, CaptureConfiguration, Deadline, handles, stats
//! ├── routing/      ← SinkGraphManager, ApplicationDiscovery
//! ├── session/      ← CaptureSession (routing state machine)
//! ├── pipeline/     ← EncodingPipeline, FrameDelivery
//! ├── processing/   ← PCM conversion, RMS/peak levels
//! └── service.rs    ← AudioCaptureService (host-facing facade)
//! ```

pub mod models;
pub mod pipeline;
pub mod processing;
pub mod routing;
pub mod service;
pub mod session;
pub mod traits;

#[cfg(test)]
mod testing;

// Re-export key types at crate root for convenience.
pub use models::audio_models::{
    ApplicationInfo, ApplicationStreamDescriptor, AudioLevels, ModuleHandle, MonitorStreamSpec, RawStreamInfo,
    SinkDescriptor, SinkHandle, StreamHandle,
};
pub use models::config::{CaptureConfiguration, DeliveryMode, EncoderApplication};
pub use models::deadline::{CancellationToken, Deadline};
pub use models::error::{CaptureError, ConnectionError, EncoderError, RoutingError};
pub use models::state::{CaptureSessionState, CaptureState};
pub use models::stats::{CaptureStats, FrameDropReason};
pub use pipeline::encoding::EncodingPipeline;
pub use routing::discovery::ApplicationDiscovery;
pub use routing::sink_graph::{SinkGraphManager, SyntheticSinks, DEFAULT_SINK_SENTINEL};
pub use service::AudioCaptureService;
pub use session::capture::CaptureSession;
pub use traits::audio_server::{AudioServer, FrameCallback, MonitorStream, OperationOutcome, ServerRequest};
pub use traits::capture_delegate::CaptureDelegate;
pub use traits::frame_encoder::{EncodedFrameCallback, EncoderFactory, EncoderSettings, FrameEncoder};
