//! In-memory audio server for unit tests.
//!
//! Models sinks, modules, playback streams and one driveable monitor stream
//! with enough fidelity to exercise routing and session transitions.

use std::sync::Arc;

use parking_lot::Mutex;

use crate::models::audio_models::{
    ModuleHandle, MonitorStreamSpec, RawStreamInfo, SinkDescriptor, SinkHandle, StreamHandle,
};
use crate::models::deadline::Deadline;
use crate::models::error::ConnectionError;
use crate::traits::audio_server::{
    AudioServer, FrameCallback, MonitorStream, OperationOutcome, ServerRequest,
};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoadedModule {
    pub handle: ModuleHandle,
    pub name: String,
    pub argument: String,
}

struct FakeState {
    connected: bool,
    connect_error: Option<ConnectionError>,
    default_sink: Option<String>,
    sinks: Vec<SinkDescriptor>,
    streams: Vec<RawStreamInfo>,
    modules: Vec<LoadedModule>,
    next_index: u32,
    requests: Vec<ServerRequest>,
    stalled: bool,
    fail_module_loads: bool,
    failing_modules: Vec<String>,
    fail_unloads: bool,
    fail_moves: bool,
    monitor_error: Option<ConnectionError>,
    monitor: Option<(StreamHandle, MonitorStreamSpec, FrameCallback)>,
    monitors_opened: usize,
}

pub struct FakeAudioServer {
    state: Arc<Mutex<FakeState>>,
}

impl FakeAudioServer {
    pub fn new() -> Self {
        Self {
            state: Arc::new(Mutex::new(FakeState {
                connected: false,
                connect_error: None,
                default_sink: None,
                sinks: Vec::new(),
                streams: Vec::new(),
                modules: Vec::new(),
                next_index: 100,
                requests: Vec::new(),
                stalled: false,
                fail_module_loads: false,
                failing_modules: Vec::new(),
                fail_unloads: false,
                fail_moves: false,
                monitor_error: None,
                monitor: None,
                monitors_opened: 0,
            })),
        }
    }

    /// A server with one hardware sink, `Speakers`, set as default.
    pub fn with_speakers() -> Self {
        let server = Self::new();
        server.add_sink("Speakers");
        server.set_default_sink(Some("Speakers"));
        server
    }

    pub fn add_sink(&self, name: &str) -> SinkHandle {
        let mut s = self.state.lock();
        let handle = SinkHandle(s.next_index);
        s.next_index += 1;
        s.sinks.push(SinkDescriptor {
            name: name.into(),
            handle,
            owner_module: None,
            monitor_source: Some(format!("{}.monitor", name)),
        });
        handle
    }

    pub fn set_default_sink(&self, name: Option<&str>) {
        self.state.lock().default_sink = name.map(str::to_string);
    }

    /// Add a playback stream; `pid: None` omits the process identity tag.
    pub fn add_stream(&self, app_name: &str, pid: Option<u32>, sink: SinkHandle) -> StreamHandle {
        let mut s = self.state.lock();
        let handle = StreamHandle(s.next_index);
        s.next_index += 1;
        let mut properties = vec![("application.name".to_string(), app_name.to_string())];
        if let Some(pid) = pid {
            properties.push(("application.process.id".to_string(), pid.to_string()));
        }
        s.streams.push(RawStreamInfo {
            handle,
            name: "Playback".into(),
            sink,
            properties,
        });
        handle
    }

    pub fn remove_stream(&self, handle: StreamHandle) {
        self.state.lock().streams.retain(|st| st.handle != handle);
    }

    pub fn stream_sink(&self, handle: StreamHandle) -> Option<SinkHandle> {
        self.state
            .lock()
            .streams
            .iter()
            .find(|st| st.handle == handle)
            .map(|st| st.sink)
    }

    pub fn sink_by_name(&self, name: &str) -> Option<SinkDescriptor> {
        self.state.lock().sinks.iter().find(|sk| sk.name == name).cloned()
    }

    pub fn sink_count(&self, name: &str) -> usize {
        self.state.lock().sinks.iter().filter(|sk| sk.name == name).count()
    }

    pub fn modules(&self) -> Vec<LoadedModule> {
        self.state.lock().modules.clone()
    }

    pub fn requests(&self) -> Vec<ServerRequest> {
        self.state.lock().requests.clone()
    }

    pub fn clear_requests(&self) {
        self.state.lock().requests.clear();
    }

    pub fn move_count(&self) -> usize {
        self.requests()
            .iter()
            .filter(|r| matches!(r, ServerRequest::MoveStream { .. }))
            .count()
    }

    pub fn fail_connect(&self, error: ConnectionError) {
        self.state.lock().connect_error = Some(error);
    }

    /// Requests never complete; callers see their deadline expire.
    pub fn stall(&self, stalled: bool) {
        self.state.lock().stalled = stalled;
    }

    pub fn fail_module_loads(&self, fail: bool) {
        self.state.lock().fail_module_loads = fail;
    }

    /// Fail loads of one module type only.
    pub fn fail_module(&self, name: &str, fail: bool) {
        let mut s = self.state.lock();
        s.failing_modules.retain(|m| m != name);
        if fail {
            s.failing_modules.push(name.to_string());
        }
    }

    pub fn fail_unloads(&self, fail: bool) {
        self.state.lock().fail_unloads = fail;
    }

    pub fn fail_moves(&self, fail: bool) {
        self.state.lock().fail_moves = fail;
    }

    pub fn fail_monitor(&self, error: Option<ConnectionError>) {
        self.state.lock().monitor_error = error;
    }

    pub fn monitor_spec(&self) -> Option<MonitorStreamSpec> {
        self.state.lock().monitor.as_ref().map(|(_, spec, _)| spec.clone())
    }

    pub fn monitors_opened(&self) -> usize {
        self.state.lock().monitors_opened
    }

    /// Push one buffer through the open monitor, as the event loop would.
    ///
    /// Returns false when no monitor is open.
    pub fn deliver(&self, samples: &[i16]) -> bool {
        let callback = self.state.lock().monitor.as_ref().map(|(_, _, cb)| Arc::clone(cb));
        match callback {
            Some(cb) => {
                cb(samples);
                true
            }
            None => false,
        }
    }

    fn load_module(s: &mut FakeState, name: &str, argument: &str) -> Result<OperationOutcome, ConnectionError> {
        if s.fail_module_loads || s.failing_modules.iter().any(|m| m == name) {
            return Err(ConnectionError::OperationFailed(format!("failed to load {}", name)));
        }
        let sink_name = argument
            .split_whitespace()
            .find_map(|arg| arg.strip_prefix("sink_name="))
            .ok_or_else(|| ConnectionError::OperationFailed("missing sink_name".into()))?
            .to_string();

        let module = ModuleHandle(s.next_index);
        let sink = SinkHandle(s.next_index + 1);
        s.next_index += 2;
        s.modules.push(LoadedModule {
            handle: module,
            name: name.into(),
            argument: argument.into(),
        });
        s.sinks.push(SinkDescriptor {
            monitor_source: Some(format!("{}.monitor", sink_name)),
            name: sink_name,
            handle: sink,
            owner_module: Some(module),
        });
        Ok(OperationOutcome::ModuleLoaded(module))
    }
}

impl AudioServer for FakeAudioServer {
    fn connect(&self, _deadline: &Deadline) -> Result<(), ConnectionError> {
        let mut s = self.state.lock();
        if let Some(err) = s.connect_error.clone() {
            return Err(err);
        }
        s.connected = true;
        Ok(())
    }

    fn disconnect(&self) {
        let mut s = self.state.lock();
        s.connected = false;
        s.monitor = None;
    }

    fn is_connected(&self) -> bool {
        self.state.lock().connected
    }

    fn submit_and_wait(
        &self,
        request: ServerRequest,
        deadline: &Deadline,
    ) -> Result<OperationOutcome, ConnectionError> {
        let mut s = self.state.lock();
        if !s.connected {
            return Err(ConnectionError::NotConnected);
        }
        s.requests.push(request.clone());

        if deadline.is_cancelled() {
            return Err(ConnectionError::Cancelled);
        }
        if s.stalled {
            return match deadline.timeout {
                Some(timeout) => Err(ConnectionError::Timeout(timeout)),
                None => panic!("stalled fake server with an unbounded deadline would hang"),
            };
        }

        match request {
            ServerRequest::ServerInfo => Ok(OperationOutcome::ServerInfo {
                default_sink: s.default_sink.clone(),
            }),
            ServerRequest::ListSinks => Ok(OperationOutcome::Sinks(s.sinks.clone())),
            ServerRequest::ListStreams => Ok(OperationOutcome::Streams(s.streams.clone())),
            ServerRequest::LoadModule { name, argument } => Self::load_module(&mut s, &name, &argument),
            ServerRequest::UnloadModule(module) => {
                if s.fail_unloads {
                    return Err(ConnectionError::OperationFailed(format!("failed to unload {}", module)));
                }
                if !s.modules.iter().any(|m| m.handle == module) {
                    return Err(ConnectionError::EntityGone(module.to_string()));
                }
                s.modules.retain(|m| m.handle != module);
                s.sinks.retain(|sk| sk.owner_module != Some(module));
                Ok(OperationOutcome::Completed)
            }
            ServerRequest::MoveStream { stream, sink } => {
                if s.fail_moves {
                    return Err(ConnectionError::OperationFailed(format!("failed to move {}", stream)));
                }
                if !s.sinks.iter().any(|sk| sk.handle == sink) {
                    return Err(ConnectionError::EntityGone(sink.to_string()));
                }
                match s.streams.iter_mut().find(|st| st.handle == stream) {
                    Some(st) => {
                        st.sink = sink;
                        Ok(OperationOutcome::Completed)
                    }
                    None => Err(ConnectionError::EntityGone(stream.to_string())),
                }
            }
        }
    }

    fn open_monitor_stream(
        &self,
        spec: &MonitorStreamSpec,
        on_frame: FrameCallback,
        _deadline: &Deadline,
    ) -> Result<Box<dyn MonitorStream>, ConnectionError> {
        let mut s = self.state.lock();
        if !s.connected {
            return Err(ConnectionError::NotConnected);
        }
        if let Some(err) = s.monitor_error.clone() {
            return Err(err);
        }
        let source_exists = s.sinks.iter().any(|sk| sk.monitor_source_name() == spec.source);
        if !source_exists {
            return Err(ConnectionError::EntityGone(spec.source.clone()));
        }
        let handle = StreamHandle(s.next_index);
        s.next_index += 1;
        s.monitor = Some((handle, spec.clone(), on_frame));
        s.monitors_opened += 1;
        Ok(Box::new(FakeMonitorStream {
            handle,
            state: Arc::clone(&self.state),
            closed: false,
        }))
    }
}

struct FakeMonitorStream {
    handle: StreamHandle,
    state: Arc<Mutex<FakeState>>,
    closed: bool,
}

impl MonitorStream for FakeMonitorStream {
    fn handle(&self) -> StreamHandle {
        self.handle
    }

    fn close(&mut self) -> Result<(), ConnectionError> {
        if self.closed {
            return Ok(());
        }
        self.closed = true;
        let mut s = self.state.lock();
        if s.monitor.as_ref().is_some_and(|(h, _, _)| *h == self.handle) {
            s.monitor = None;
        }
        Ok(())
    }
}

impl Drop for FakeMonitorStream {
    fn drop(&mut self) {
        let _ = self.close();
    }
}
