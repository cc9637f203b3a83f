use std::sync::Arc;

use crate::models::audio_models::ApplicationInfo;
use crate::models::config::CaptureConfiguration;
use crate::models::deadline::Deadline;
use crate::models::error::{CaptureError, ConnectionError, RoutingError};
use crate::models::state::CaptureState;
use crate::models::stats::CaptureStats;
use crate::routing::sink_graph::{SinkGraphManager, SyntheticSinks};
use crate::session::capture::CaptureSession;
use crate::traits::audio_server::AudioServer;
use crate::traits::capture_delegate::CaptureDelegate;
use crate::traits::frame_encoder::EncoderFactory;

/// Single entry point for hosts: one connection, one sink graph, at most
/// one active capture.
///
/// ```text
/// setup ─→ list_applications ─→ start_capture ─→ stop_capture ─→ teardown
///   └──────────────── (repeatable) ─────────────────┘
/// ```
///
/// Dropping the service stops an active capture; the synthetic sinks stay
/// loaded until `teardown`.
pub struct AudioCaptureService<S: AudioServer> {
    server: Arc<S>,
    config: CaptureConfiguration,
    sink_graph: SinkGraphManager<S>,
    session: CaptureSession<S>,
}

impl<S: AudioServer> AudioCaptureService<S> {
    pub fn new(
        server: Arc<S>,
        encoder_factory: Arc<dyn EncoderFactory>,
        config: CaptureConfiguration,
    ) -> Result<Self, String> {
        config.validate()?;
        Ok(Self {
            sink_graph: SinkGraphManager::new(Arc::clone(&server), &config),
            session: CaptureSession::new(Arc::clone(&server), encoder_factory, &config),
            server,
            config,
        })
    }

    pub fn config(&self) -> &CaptureConfiguration {
        &self.config
    }

    pub fn set_delegate(&mut self, delegate: Arc<dyn CaptureDelegate>) {
        self.session.set_delegate(delegate);
    }

    /// Connect and make sure the synthetic sinks exist.
    ///
    /// `output_override` names the real sink to keep audio audible on; the
    /// server default is used otherwise. Connection failures and a missing
    /// override leave the service disconnected.
    pub fn setup(&mut self, output_override: Option<&str>) -> Result<(), RoutingError> {
        if !self.server.is_connected() {
            let deadline = Deadline::from_timeout(self.config.connect_timeout());
            if let Err(e) = self.server.connect(&deadline) {
                log::error!("Failed to connect to the audio server: {}", e);
                self.server.disconnect();
                return Err(e.into());
            }
            log::info!("Connected to the audio server as {}", self.config.client_name);
        }

        match self.sink_graph.ensure_sinks(output_override) {
            Ok(_) => Ok(()),
            Err(RoutingError::Connection(e)) => {
                log::error!("Sink setup lost the connection: {}", e);
                self.server.disconnect();
                Err(RoutingError::Connection(e))
            }
            Err(e) => Err(e),
        }
    }

    /// Stop any capture, unload the synthetic sinks and disconnect.
    ///
    /// Idempotent. The connection is released even when an unload fails.
    pub fn teardown(&mut self) -> Result<(), RoutingError> {
        if let Err(e) = self.session.stop_capture() {
            log::warn!("Capture did not stop cleanly during teardown: {}", e);
        }
        if !self.server.is_connected() {
            log::debug!("Teardown while disconnected, nothing to unload");
            return Ok(());
        }
        let result = self.sink_graph.teardown();
        self.server.disconnect();
        log::info!("Disconnected from the audio server");
        result
    }

    /// Applications with an addressable playback stream.
    pub fn list_applications(&self) -> Result<Vec<ApplicationInfo>, ConnectionError> {
        self.session.discovery().list_applications()
    }

    /// Capture the application owned by `pid`, handing each encoded frame to `on_frame`.
    pub fn start_capture<F>(&mut self, pid: u32, sample_rate: u32, on_frame: F) -> Result<(), CaptureError>
    where
        F: Fn(&[u8]) + Send + Sync + 'static,
    {
        let sinks = self.ready_sinks()?;
        self.session.start_capture(pid, sample_rate, Arc::new(on_frame), &sinks)
    }

    pub fn stop_capture(&mut self) -> Result<(), CaptureError> {
        self.session.stop_capture()
    }

    pub fn state(&self) -> CaptureState {
        self.session.state()
    }

    /// Counters for the active capture, or the last one.
    pub fn stats(&self) -> Option<CaptureStats> {
        self.session.stats()
    }

    fn ready_sinks(&self) -> Result<SyntheticSinks, CaptureError> {
        if !self.server.is_connected() {
            return Err(CaptureError::Connection(ConnectionError::NotConnected));
        }
        self.sink_graph.sinks().cloned().ok_or(CaptureError::SinksNotReady)
    }
}
