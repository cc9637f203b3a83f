//! # tuxphones-pulse
//!
//! PulseAudio backend for tuxphones. Also works against pipewire-pulse.
//!
//! Provides:
//! - `PulseConnection`: `AudioServer` over a threaded mainloop and context
//! - `PulseMonitorStream`: mono s16 record stream on a sink monitor source
//!
//! ## Usage
//! ```ignore
//! use std::sync::Arc;
//! use tuxphones_core::{AudioCaptureService, CaptureConfiguration};
//! use tuxphones_opus::OpusEncoderFactory;
//! use tuxphones_pulse::PulseConnection;
//!
//! let config = CaptureConfiguration::default();
//! let server = Arc::new(PulseConnection::from_config(&config));
//! let mut service = AudioCaptureService::new(server, Arc::new(OpusEncoderFactory), config)?;
//! service.setup(None)?;
//! service.start_capture(pid, 48000, |frame| send(frame))?;
//! ```

#![cfg_attr(not(target_os = "linux"), allow(dead_code))]

mod completion;
mod operation;

#[cfg(target_os = "linux")]
mod connection;
#[cfg(target_os = "linux")]
mod monitor;

#[cfg(target_os = "linux")]
pub use connection::PulseConnection;
#[cfg(target_os = "linux")]
pub use monitor::PulseMonitorStream;
