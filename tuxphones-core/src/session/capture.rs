use std::sync::Arc;

use parking_lot::Mutex;

use crate::models::audio_models::{ApplicationStreamDescriptor, MonitorStreamSpec, SinkHandle};
use crate::models::config::CaptureConfiguration;
use crate::models::deadline::Deadline;
use crate::models::error::{CaptureError, ConnectionError};
use crate::models::state::{CaptureSessionState, CaptureState};
use crate::models::stats::CaptureStats;
use crate::pipeline::encoding::{EncodingPipeline, CAPTURE_CHANNELS};
use crate::routing::discovery::ApplicationDiscovery;
use crate::routing::sink_graph::SyntheticSinks;
use crate::traits::audio_server::{AudioServer, FrameCallback, MonitorStream, ServerRequest};
use crate::traits::capture_delegate::CaptureDelegate;
use crate::traits::frame_encoder::{EncodedFrameCallback, EncoderFactory};

/// Redirects one application's stream through the synthetic sinks and
/// records it.
///
/// ```text
/// start_capture: find stream → open encoder → move stream to combined sink
///                → open monitor on capture sink → frames flow
/// stop_capture:  close monitor → move stream back → close encoder
/// ```
///
/// The encoder is shared with the frame callback, which runs on the audio
/// server's event-loop thread. The session never holds the encoder lock while
/// making a server round trip.
pub struct CaptureSession<S: AudioServer> {
    server: Arc<S>,
    discovery: ApplicationDiscovery<S>,
    deadline: Deadline,
    state: CaptureSessionState,
    pipeline: Arc<Mutex<EncodingPipeline>>,
    monitor: Option<Box<dyn MonitorStream>>,
    delegate: Option<Arc<dyn CaptureDelegate>>,
}

impl<S: AudioServer> CaptureSession<S> {
    pub fn new(server: Arc<S>, encoder_factory: Arc<dyn EncoderFactory>, config: &CaptureConfiguration) -> Self {
        Self {
            discovery: ApplicationDiscovery::new(Arc::clone(&server), config),
            server,
            deadline: Deadline::from_timeout(config.operation_timeout()),
            state: CaptureSessionState::new(),
            pipeline: Arc::new(Mutex::new(EncodingPipeline::new(encoder_factory, config))),
            monitor: None,
            delegate: None,
        }
    }

    pub fn set_delegate(&mut self, delegate: Arc<dyn CaptureDelegate>) {
        self.pipeline.lock().set_delegate(Arc::clone(&delegate));
        self.delegate = Some(delegate);
    }

    pub fn state(&self) -> CaptureState {
        self.state.phase()
    }

    pub fn session_state(&self) -> &CaptureSessionState {
        &self.state
    }

    pub fn stats(&self) -> Option<CaptureStats> {
        self.pipeline.lock().stats()
    }

    pub fn discovery(&self) -> &ApplicationDiscovery<S> {
        &self.discovery
    }

    /// Start capturing the first stream owned by `pid`. Transitions: idle → routed → streaming.
    ///
    /// `sinks` must come from a successful `ensure_sinks`. If the monitor
    /// stream cannot be opened the session is left routed and
    /// `stop_capture` is required to restore the stream.
    pub fn start_capture(
        &mut self,
        pid: u32,
        sample_rate: u32,
        on_frame: EncodedFrameCallback,
        sinks: &SyntheticSinks,
    ) -> Result<(), CaptureError> {
        if self.state.target_stream.is_some() || self.pipeline.lock().is_open() {
            return Err(CaptureError::AlreadyCapturing);
        }

        let target = self
            .discovery
            .find_by_process_id(pid)?
            .ok_or(CaptureError::ApplicationNotFound(pid))?;

        self.pipeline.lock().open(sample_rate, pid, on_frame)?;

        self.state.capture_sink = Some(sinks.capture.handle);
        self.state.combined_sink = Some(sinks.combined.handle);
        self.state.original_sink = Some(target.current_sink);
        self.state.target_stream = Some(target.clone());

        if let Err(e) = self.move_stream(&target, sinks.combined.handle) {
            return Err(self.abandon_redirect(&target, e));
        }
        log::info!(
            "Redirected {} (pid {}) from {} to {}",
            target.name,
            pid,
            target.current_sink,
            sinks.combined.name
        );
        self.notify_state();

        let spec = MonitorStreamSpec {
            source: sinks.capture.monitor_source_name(),
            sample_rate,
            channels: CAPTURE_CHANNELS as u8,
            stream_name: format!("{} capture", target.name),
        };
        let monitor = match self.server.open_monitor_stream(&spec, self.frame_callback(), &self.deadline) {
            Ok(monitor) => monitor,
            Err(e) => {
                log::error!("Failed to open monitor on {}: {}", spec.source, e);
                let err = CaptureError::StreamSetupError(e.to_string());
                self.notify_error(&err);
                return Err(err);
            }
        };

        self.state.monitor_stream = Some(monitor.handle());
        self.monitor = Some(monitor);
        log::info!("Capturing {} at {} Hz from {}", target.name, sample_rate, spec.source);
        self.notify_state();
        Ok(())
    }

    /// Stop capturing and put the target stream back where it was.
    ///
    /// No-op when idle. If the restore fails the original sink stays
    /// recorded so a later call can retry it.
    pub fn stop_capture(&mut self) -> Result<(), CaptureError> {
        let was = self.state.phase();
        if was.is_idle() && self.monitor.is_none() && !self.pipeline.lock().is_open() {
            log::debug!("Stop requested with no active capture");
            return Ok(());
        }

        if let Some(mut monitor) = self.monitor.take() {
            if let Err(e) = monitor.close() {
                log::warn!("Failed to close monitor {}: {}", monitor.handle(), e);
            }
        }
        self.state.monitor_stream = None;

        let restored = self.restore_routing();
        self.pipeline.lock().close();

        if self.state.phase() != was {
            self.notify_state();
        }
        if let Err(ref e) = restored {
            self.notify_error(e);
        }
        restored
    }

    fn restore_routing(&mut self) -> Result<(), CaptureError> {
        let (Some(target), Some(original)) = (self.state.target_stream.clone(), self.state.original_sink) else {
            self.state.clear_routing();
            return Ok(());
        };

        match self.move_stream(&target, original) {
            Ok(()) => log::info!("Restored {} to {}", target.name, original),
            Err(ConnectionError::EntityGone(what)) => {
                log::info!("{} no longer routable ({} gone), nothing to restore", target.name, what)
            }
            Err(e) => {
                log::error!("Failed to restore {} to {}: {}", target.name, original, e);
                return Err(CaptureError::RoutingFailed(e.to_string()));
            }
        }
        self.state.clear_routing();
        Ok(())
    }

    /// Undo the bookkeeping for a redirect that did not happen.
    ///
    /// A timed-out or cancelled move may still land on the server, so those
    /// keep the session routed for `stop_capture` to restore.
    fn abandon_redirect(&mut self, target: &ApplicationStreamDescriptor, error: ConnectionError) -> CaptureError {
        log::error!("Failed to redirect {}: {}", target.name, error);
        let err = match error {
            ConnectionError::Timeout(_) | ConnectionError::Cancelled => {
                self.notify_state();
                CaptureError::Connection(error)
            }
            other => {
                self.state.clear_routing();
                self.pipeline.lock().close();
                CaptureError::RoutingFailed(other.to_string())
            }
        };
        self.notify_error(&err);
        err
    }

    fn move_stream(&self, target: &ApplicationStreamDescriptor, sink: SinkHandle) -> Result<(), ConnectionError> {
        let request = ServerRequest::MoveStream {
            stream: target.stream_handle,
            sink,
        };
        log::debug!("{}", request.describe());
        self.server.submit_and_wait(request, &self.deadline)?.into_completed()
    }

    fn frame_callback(&self) -> FrameCallback {
        let pipeline = Arc::clone(&self.pipeline);
        Arc::new(move |samples: &[i16]| {
            if let Err(e) = pipeline.lock().on_frame(samples) {
                log::debug!("Frame of {} samples not encoded: {}", samples.len(), e);
            }
        })
    }

    fn notify_state(&self) {
        if let Some(ref delegate) = self.delegate {
            delegate.on_state_changed(self.state.phase());
        }
    }

    fn notify_error(&self, error: &CaptureError) {
        if let Some(ref delegate) = self.delegate {
            delegate.on_error(error);
        }
    }
}

impl<S: AudioServer> Drop for CaptureSession<S> {
    fn drop(&mut self) {
        if self.state.phase().is_idle() && self.monitor.is_none() {
            return;
        }
        log::warn!("Capture session dropped while {}, stopping", self.state.phase().as_str());
        if let Err(e) = self.stop_capture() {
            log::error!("Failed to stop capture on drop: {}", e);
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;
    use crate::models::audio_models::StreamHandle;
    use crate::models::error::EncoderError;
    use crate::models::stats::FrameDropReason;
    use crate::routing::sink_graph::SinkGraphManager;
    use crate::testing::{init_logging, FakeAudioServer, FakeEncoderFactory};

    struct Fixture {
        server: Arc<FakeAudioServer>,
        session: CaptureSession<FakeAudioServer>,
        sinks: SyntheticSinks,
        speakers: SinkHandle,
        music: StreamHandle,
    }

    fn fixture() -> Fixture {
        init_logging();
        let server = Arc::new(FakeAudioServer::with_speakers());
        let speakers = server.sink_by_name("Speakers").unwrap().handle;
        let music = server.add_stream("Music", Some(42), speakers);
        server.connect(&Deadline::unbounded()).unwrap();

        let config = CaptureConfiguration::default();
        let sinks = SinkGraphManager::new(Arc::clone(&server), &config)
            .ensure_sinks(None)
            .unwrap();
        let session = CaptureSession::new(Arc::clone(&server), Arc::new(FakeEncoderFactory::new()), &config);
        server.clear_requests();

        Fixture {
            server,
            session,
            sinks,
            speakers,
            music,
        }
    }

    fn counting_consumer() -> (Arc<AtomicUsize>, EncodedFrameCallback) {
        let calls = Arc::new(AtomicUsize::new(0));
        let seen = Arc::clone(&calls);
        let consumer: EncodedFrameCallback = Arc::new(move |frame: &[u8]| {
            assert!(!frame.is_empty());
            seen.fetch_add(1, Ordering::SeqCst);
        });
        (calls, consumer)
    }

    #[derive(Default)]
    struct Recorder {
        states: Mutex<Vec<CaptureState>>,
        errors: Mutex<Vec<CaptureError>>,
    }

    impl CaptureDelegate for Recorder {
        fn on_state_changed(&self, state: CaptureState) {
            self.states.lock().push(state);
        }
        fn on_frame_dropped(&self, _reason: &FrameDropReason) {}
        fn on_error(&self, error: &CaptureError) {
            self.errors.lock().push(error.clone());
        }
    }

    #[test]
    fn capture_round_trip_restores_original_sink() {
        let mut f = fixture();
        let (calls, consumer) = counting_consumer();

        f.session.start_capture(42, 48000, consumer, &f.sinks).unwrap();

        assert_eq!(f.session.state(), CaptureState::Streaming);
        assert_eq!(f.server.stream_sink(f.music), Some(f.sinks.combined.handle));
        let spec = f.server.monitor_spec().unwrap();
        assert_eq!(spec.source, "TuxphonesPassthrough.monitor");
        assert_eq!(spec.sample_rate, 48000);
        assert_eq!(spec.channels, 1);

        // 20 ms at 48 kHz mono.
        assert!(f.server.deliver(&vec![300i16; 960]));
        assert!(f.server.deliver(&vec![300i16; 960]));
        assert_eq!(calls.load(Ordering::SeqCst), 2);

        f.session.stop_capture().unwrap();

        assert_eq!(f.session.state(), CaptureState::Idle);
        assert_eq!(f.server.stream_sink(f.music), Some(f.speakers));
        assert!(!f.server.deliver(&vec![300i16; 960]));
        assert_eq!(f.session.session_state().original_sink, None);
        assert_eq!(f.session.stats().unwrap().frames_encoded, 2);
    }

    #[test]
    fn unknown_process_is_not_found_and_nothing_moves() {
        let mut f = fixture();
        let (_, consumer) = counting_consumer();

        let err = f.session.start_capture(7, 48000, consumer, &f.sinks).unwrap_err();

        assert_eq!(err, CaptureError::ApplicationNotFound(7));
        assert_eq!(f.server.move_count(), 0);
        assert_eq!(f.server.stream_sink(f.music), Some(f.speakers));
        assert!(f.session.state().is_idle());
        assert!(f.session.stats().is_none());
    }

    #[test]
    fn second_start_is_rejected_without_touching_routing() {
        let mut f = fixture();
        let (_, consumer) = counting_consumer();
        f.session.start_capture(42, 48000, Arc::clone(&consumer), &f.sinks).unwrap();
        f.server.clear_requests();

        let err = f.session.start_capture(42, 48000, consumer, &f.sinks).unwrap_err();

        assert_eq!(err, CaptureError::AlreadyCapturing);
        assert!(f.server.requests().is_empty());
        assert_eq!(f.server.monitors_opened(), 1);
        assert_eq!(f.session.session_state().original_sink, Some(f.speakers));
        assert_eq!(f.server.stream_sink(f.music), Some(f.sinks.combined.handle));
    }

    #[test]
    fn stop_without_capture_is_a_no_op() {
        let mut f = fixture();
        f.session.stop_capture().unwrap();
        f.session.stop_capture().unwrap();
        assert!(f.server.requests().is_empty());
    }

    #[test]
    fn encoder_rejection_leaves_routing_alone() {
        let mut f = fixture();
        let (_, consumer) = counting_consumer();

        let err = f.session.start_capture(42, 44100, consumer, &f.sinks).unwrap_err();

        assert!(matches!(err, CaptureError::Encoder(EncoderError::InitFailed(_))));
        assert_eq!(f.server.move_count(), 0);
        assert!(f.session.state().is_idle());
    }

    #[test]
    fn monitor_failure_leaves_session_routed_until_stop() {
        let mut f = fixture();
        let recorder = Arc::new(Recorder::default());
        f.session.set_delegate(Arc::clone(&recorder) as Arc<dyn CaptureDelegate>);
        f.server
            .fail_monitor(Some(ConnectionError::OperationFailed("refused".into())));
        let (_, consumer) = counting_consumer();

        let err = f.session.start_capture(42, 48000, consumer, &f.sinks).unwrap_err();

        assert!(matches!(err, CaptureError::StreamSetupError(_)));
        assert_eq!(f.session.state(), CaptureState::Routed);
        assert_eq!(f.server.stream_sink(f.music), Some(f.sinks.combined.handle));

        let (_, consumer) = counting_consumer();
        assert_eq!(
            f.session.start_capture(42, 48000, consumer, &f.sinks),
            Err(CaptureError::AlreadyCapturing)
        );

        f.session.stop_capture().unwrap();
        assert_eq!(f.server.stream_sink(f.music), Some(f.speakers));
        assert_eq!(
            *recorder.states.lock(),
            vec![CaptureState::Routed, CaptureState::Idle]
        );
        assert_eq!(recorder.errors.lock().len(), 1);
    }

    #[test]
    fn failed_redirect_is_rolled_back() {
        let mut f = fixture();
        f.server.fail_moves(true);
        let (_, consumer) = counting_consumer();

        let err = f.session.start_capture(42, 48000, consumer, &f.sinks).unwrap_err();

        assert!(matches!(err, CaptureError::RoutingFailed(_)));
        assert!(f.session.state().is_idle());
        assert_eq!(f.server.monitors_opened(), 0);

        f.server.fail_moves(false);
        let (_, consumer) = counting_consumer();
        f.session.start_capture(42, 48000, consumer, &f.sinks).unwrap();
    }

    #[test]
    fn exited_application_counts_as_restored() {
        let mut f = fixture();
        let (_, consumer) = counting_consumer();
        f.session.start_capture(42, 48000, consumer, &f.sinks).unwrap();

        f.server.remove_stream(f.music);

        f.session.stop_capture().unwrap();
        assert!(f.session.state().is_idle());
    }

    #[test]
    fn failed_restore_keeps_original_for_retry() {
        let mut f = fixture();
        let (_, consumer) = counting_consumer();
        f.session.start_capture(42, 48000, consumer, &f.sinks).unwrap();

        f.server.fail_moves(true);
        let err = f.session.stop_capture().unwrap_err();
        assert!(matches!(err, CaptureError::RoutingFailed(_)));
        assert_eq!(f.session.state(), CaptureState::Routed);
        assert_eq!(f.session.session_state().original_sink, Some(f.speakers));
        assert!(!f.server.deliver(&[0i16; 960]));

        f.server.fail_moves(false);
        f.session.stop_capture().unwrap();
        assert_eq!(f.server.stream_sink(f.music), Some(f.speakers));
        assert!(f.session.state().is_idle());
    }

    #[test]
    fn delegate_sees_each_transition() {
        let mut f = fixture();
        let recorder = Arc::new(Recorder::default());
        f.session.set_delegate(Arc::clone(&recorder) as Arc<dyn CaptureDelegate>);
        let (_, consumer) = counting_consumer();

        f.session.start_capture(42, 48000, consumer, &f.sinks).unwrap();
        f.session.stop_capture().unwrap();

        assert_eq!(
            *recorder.states.lock(),
            vec![CaptureState::Routed, CaptureState::Streaming, CaptureState::Idle]
        );
        assert!(recorder.errors.lock().is_empty());
    }

    #[test]
    fn dropping_an_active_session_restores_routing() {
        let f = fixture();
        let Fixture {
            server,
            mut session,
            sinks,
            speakers,
            music,
        } = f;
        let (_, consumer) = counting_consumer();
        session.start_capture(42, 48000, consumer, &sinks).unwrap();

        drop(session);

        assert_eq!(server.stream_sink(music), Some(speakers));
        assert!(server.monitor_spec().is_none());
    }
}
