//! PulseAudio implementation of the audio-server seam.
//!
//! A threaded mainloop runs the server's event loop on its own thread.
//! Callers take the mainloop lock to issue a request, release it, and block
//! on a [`Completion`] that the request's callback fills in. Waiting never
//! happens with the mainloop lock held, so the event loop keeps dispatching
//! frames to an open monitor stream while a caller waits.

use std::cell::{RefCell, RefMut};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;

use parking_lot::Mutex;
use pulse::callbacks::ListResult;
use pulse::context::introspect::{SinkInfo, SinkInputInfo};
use pulse::context::{Context, FlagSet as ContextFlagSet, State as ContextState};
use pulse::error::{Code, PAErr};
use pulse::mainloop::threaded::Mainloop;

use tuxphones_core::models::audio_models::{
    ModuleHandle, MonitorStreamSpec, RawStreamInfo, SinkDescriptor, SinkHandle, StreamHandle,
};
use tuxphones_core::models::config::CaptureConfiguration;
use tuxphones_core::models::deadline::Deadline;
use tuxphones_core::models::error::ConnectionError;
use tuxphones_core::routing::discovery::{PROP_APPLICATION_NAME, PROP_APPLICATION_PROCESS_ID};
use tuxphones_core::traits::audio_server::{
    AudioServer, FrameCallback, MonitorStream, OperationOutcome, ServerRequest,
};

use crate::completion::Completion;
use crate::monitor::{self, PulseMonitorStream};
use crate::operation::{await_operation, request_failure, PendingOperation, POLL_INTERVAL};

/// Index the server reports when a module failed to load.
const INVALID_INDEX: u32 = u32::MAX;

/// Stream properties copied into [`RawStreamInfo`].
const STREAM_PROPERTIES: [&str; 2] = [PROP_APPLICATION_NAME, PROP_APPLICATION_PROCESS_ID];

/// Mainloop and context of one connection.
///
/// `context` is declared first so it is released before the mainloop.
pub(crate) struct PulseSession {
    context: RefCell<Context>,
    mainloop: RefCell<Mainloop>,
    stopped: AtomicBool,
}

// SAFETY: the mainloop and context are only touched by caller threads that
// hold the connection's round-trip lock, and apart from locking the mainloop
// itself only while also holding the mainloop lock. The event-loop thread
// never touches them from Rust: request callbacks only capture `Arc`s.
unsafe impl Send for PulseSession {}
unsafe impl Sync for PulseSession {}

impl PulseSession {
    /// Take the mainloop lock until the guard is dropped.
    pub(crate) fn lock(&self) -> MainloopGuard<'_> {
        self.mainloop.borrow_mut().lock();
        MainloopGuard {
            mainloop: &self.mainloop,
        }
    }

    /// The context. Only with the mainloop lock held.
    pub(crate) fn context(&self) -> RefMut<'_, Context> {
        self.context.borrow_mut()
    }

    pub(crate) fn errno(&self) -> PAErr {
        self.context.borrow().errno()
    }

    /// Disconnect the context and stop the event-loop thread. Idempotent.
    fn shutdown(&self) {
        if self.stopped.swap(true, Ordering::SeqCst) {
            return;
        }
        {
            let _lock = self.lock();
            self.context().disconnect();
        }
        self.mainloop.borrow_mut().stop();
    }
}

impl Drop for PulseSession {
    fn drop(&mut self) {
        self.shutdown();
    }
}

pub(crate) struct MainloopGuard<'a> {
    mainloop: &'a RefCell<Mainloop>,
}

impl Drop for MainloopGuard<'_> {
    fn drop(&mut self) {
        self.mainloop.borrow_mut().unlock();
    }
}

/// Connection to a PulseAudio (or pipewire-pulse) server.
pub struct PulseConnection {
    client_name: String,
    round_trip: Arc<Mutex<()>>,
    session: Mutex<Option<Arc<PulseSession>>>,
}

impl PulseConnection {
    pub fn new(client_name: impl Into<String>) -> Self {
        Self {
            client_name: client_name.into(),
            round_trip: Arc::new(Mutex::new(())),
            session: Mutex::new(None),
        }
    }

    pub fn from_config(config: &CaptureConfiguration) -> Self {
        Self::new(config.client_name.clone())
    }

    fn session(&self) -> Result<Arc<PulseSession>, ConnectionError> {
        self.session.lock().clone().ok_or(ConnectionError::NotConnected)
    }

    /// Start a fresh mainloop and context and wait for the context to be ready.
    fn open_session(&self, deadline: &Deadline) -> Result<Arc<PulseSession>, ConnectionError> {
        let mut mainloop = Mainloop::new()
            .ok_or_else(|| ConnectionError::MainloopStart("failed to create mainloop".into()))?;
        let mut context = Context::new(&mainloop, &self.client_name)
            .ok_or_else(|| ConnectionError::Connect("failed to create context".into()))?;

        let changed = Completion::<()>::new();
        {
            let changed = Arc::clone(&changed);
            context.set_state_callback(Some(Box::new(move || changed.complete(()))));
        }
        context
            .connect(None, ContextFlagSet::NOFLAGS, None)
            .map_err(|e| ConnectionError::Connect(describe_error(e)))?;
        mainloop
            .start()
            .map_err(|e| ConnectionError::MainloopStart(describe_error(e)))?;

        let session = Arc::new(PulseSession {
            context: RefCell::new(context),
            mainloop: RefCell::new(mainloop),
            stopped: AtomicBool::new(false),
        });

        let expires = deadline.start();
        loop {
            {
                let _lock = session.lock();
                let state = session.context.borrow().get_state();
                match state {
                    ContextState::Ready => break,
                    ContextState::Failed | ContextState::Terminated => {
                        let err = describe_error(session.errno());
                        drop(_lock);
                        session.shutdown();
                        return Err(ConnectionError::ContextFailed(err));
                    }
                    _ => {}
                }
            }
            if deadline.is_cancelled() {
                session.shutdown();
                return Err(ConnectionError::Cancelled);
            }
            if let (Some(expires), Some(timeout)) = (expires, deadline.timeout) {
                if Instant::now() >= expires {
                    session.shutdown();
                    return Err(ConnectionError::Timeout(timeout));
                }
            }
            changed.wait_for(POLL_INTERVAL);
        }

        {
            let _lock = session.lock();
            session.context().set_state_callback(None);
        }
        Ok(session)
    }

    /// Issue `request` against the context. Only with the mainloop lock held.
    fn start_request(
        session: &PulseSession,
        request: &ServerRequest,
        done: &Arc<Completion<Option<OperationOutcome>>>,
    ) -> Box<dyn PendingOperation> {
        let mut introspector = session.context().introspect();
        let done = Arc::clone(done);
        match request {
            ServerRequest::ServerInfo => Box::new(introspector.get_server_info(move |info| {
                let default_sink = info.default_sink_name.as_ref().map(|name| name.to_string());
                done.complete(Some(OperationOutcome::ServerInfo { default_sink }));
            })),
            ServerRequest::ListSinks => {
                let mut sinks = Vec::new();
                Box::new(introspector.get_sink_info_list(move |result| match result {
                    ListResult::Item(info) => sinks.push(sink_descriptor(info)),
                    ListResult::End => done.complete(Some(OperationOutcome::Sinks(std::mem::take(&mut sinks)))),
                    ListResult::Error => done.complete(None),
                }))
            }
            ServerRequest::ListStreams => {
                let mut streams = Vec::new();
                Box::new(introspector.get_sink_input_info_list(move |result| match result {
                    ListResult::Item(info) => streams.push(raw_stream_info(info)),
                    ListResult::End => {
                        done.complete(Some(OperationOutcome::Streams(std::mem::take(&mut streams))))
                    }
                    ListResult::Error => done.complete(None),
                }))
            }
            ServerRequest::LoadModule { name, argument } => {
                Box::new(introspector.load_module(name, argument, move |index| {
                    let loaded = (index != INVALID_INDEX).then(|| OperationOutcome::ModuleLoaded(ModuleHandle(index)));
                    done.complete(loaded);
                }))
            }
            ServerRequest::UnloadModule(module) => Box::new(introspector.unload_module(module.0, move |ok| {
                done.complete(ok.then_some(OperationOutcome::Completed));
            })),
            ServerRequest::MoveStream { stream, sink } => Box::new(introspector.move_sink_input_by_index(
                stream.0,
                sink.0,
                Some(Box::new(move |ok| done.complete(ok.then_some(OperationOutcome::Completed)))),
            )),
        }
    }
}

impl AudioServer for PulseConnection {
    fn connect(&self, deadline: &Deadline) -> Result<(), ConnectionError> {
        let _turn = self.round_trip.lock();
        if let Some(existing) = self.session.lock().clone() {
            let _lock = existing.lock();
            if existing.context.borrow().get_state() == ContextState::Ready {
                log::debug!("Already connected");
                return Ok(());
            }
        }

        let session = self.open_session(deadline)?;
        if let Some(stale) = self.session.lock().replace(session) {
            stale.shutdown();
        }
        log::info!("Connected to PulseAudio as {}", self.client_name);
        Ok(())
    }

    fn disconnect(&self) {
        let _turn = self.round_trip.lock();
        if let Some(session) = self.session.lock().take() {
            session.shutdown();
            log::info!("Disconnected from PulseAudio");
        }
    }

    fn is_connected(&self) -> bool {
        let _turn = self.round_trip.lock();
        let Some(session) = self.session.lock().clone() else {
            return false;
        };
        let _lock = session.lock();
        let ready = session.context.borrow().get_state() == ContextState::Ready;
        ready
    }

    fn submit_and_wait(
        &self,
        request: ServerRequest,
        deadline: &Deadline,
    ) -> Result<OperationOutcome, ConnectionError> {
        let _turn = self.round_trip.lock();
        let session = self.session()?;
        log::debug!("Request: {}", request.describe());

        let done = Completion::new();
        let mut op = {
            let _lock = session.lock();
            Self::start_request(&session, &request, &done)
        };
        let result = await_operation(&mut *op, &done, deadline, || session.lock());

        let _lock = session.lock();
        drop(op);
        match result {
            Ok(Some(outcome)) => Ok(outcome),
            Ok(None) => {
                let err = session.errno();
                Err(request_failure(&request, is_no_entity(err), &describe_error(err)))
            }
            Err(e) => {
                log::warn!("{} did not complete: {}", request.describe(), e);
                Err(e)
            }
        }
    }

    fn open_monitor_stream(
        &self,
        spec: &MonitorStreamSpec,
        on_frame: FrameCallback,
        deadline: &Deadline,
    ) -> Result<Box<dyn MonitorStream>, ConnectionError> {
        let _turn = self.round_trip.lock();
        let session = self.session()?;
        let stream = monitor::open_record_stream(&session, spec, on_frame, deadline)?;
        log::info!("Recording from {} as {}", spec.source, stream.handle());
        Ok(Box::new(PulseMonitorStream::new(
            session,
            Arc::clone(&self.round_trip),
            stream,
        )))
    }
}

impl Drop for PulseConnection {
    fn drop(&mut self) {
        if let Some(session) = self.session.get_mut().take() {
            session.shutdown();
        }
    }
}

fn sink_descriptor(info: &SinkInfo) -> SinkDescriptor {
    SinkDescriptor {
        name: info.name.as_ref().map(|n| n.to_string()).unwrap_or_default(),
        handle: SinkHandle(info.index),
        owner_module: info.owner_module.map(ModuleHandle),
        monitor_source: info.monitor_source_name.as_ref().map(|n| n.to_string()),
    }
}

fn raw_stream_info(info: &SinkInputInfo) -> RawStreamInfo {
    RawStreamInfo {
        handle: StreamHandle(info.index),
        name: info.name.as_ref().map(|n| n.to_string()).unwrap_or_default(),
        sink: SinkHandle(info.sink),
        properties: STREAM_PROPERTIES
            .iter()
            .filter_map(|key| info.proplist.get_str(key).map(|value| (key.to_string(), value)))
            .collect(),
    }
}

pub(crate) fn describe_error(err: PAErr) -> String {
    err.to_string().unwrap_or_else(|| format!("error code {}", err.0))
}

/// Context errno is positive, operation results negative.
pub(crate) fn is_no_entity(err: PAErr) -> bool {
    err.0.abs() == Code::NoEntity as i32
}
