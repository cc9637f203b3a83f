//! Record stream attached to a sink monitor source.

use std::cell::RefCell;
use std::rc::Rc;
use std::sync::Arc;
use std::time::Instant;

use parking_lot::Mutex;
use pulse::def::BufferAttr;
use pulse::sample::{Format, Spec};
use pulse::stream::{FlagSet as StreamFlagSet, PeekResult, State as StreamState, Stream};

use tuxphones_core::models::audio_models::{MonitorStreamSpec, StreamHandle};
use tuxphones_core::models::deadline::Deadline;
use tuxphones_core::models::error::ConnectionError;
use tuxphones_core::processing::pcm::FrameAssembler;
use tuxphones_core::traits::audio_server::{FrameCallback, MonitorStream};

use crate::completion::Completion;
use crate::connection::{describe_error, is_no_entity, PulseSession};
use crate::operation::POLL_INTERVAL;

/// Signed 16-bit native-endian samples at the requested rate and channel count.
pub(crate) fn sample_spec(spec: &MonitorStreamSpec) -> Result<Spec, ConnectionError> {
    let sample_spec = Spec {
        format: Format::S16NE,
        channels: spec.channels,
        rate: spec.sample_rate,
    };
    if !sample_spec.is_valid() {
        return Err(ConnectionError::OperationFailed(format!(
            "invalid sample spec: {} Hz, {} channels",
            spec.sample_rate, spec.channels
        )));
    }
    Ok(sample_spec)
}

/// Ask for one codec frame per fragment; the rest is left to the server.
pub(crate) fn buffer_attr(spec: &MonitorStreamSpec) -> BufferAttr {
    let fragment = FrameAssembler::for_rate(spec.sample_rate, spec.channels).frame_bytes();
    BufferAttr {
        maxlength: u32::MAX,
        tlength: u32::MAX,
        prebuf: u32::MAX,
        minreq: u32::MAX,
        fragsize: fragment as u32,
    }
}

/// An open record stream.
///
/// While open, the stream is shared with its read callback, which runs on
/// the event-loop thread. Dropping an open stream closes it.
pub struct PulseMonitorStream {
    session: Arc<PulseSession>,
    round_trip: Arc<Mutex<()>>,
    stream: Option<Rc<RefCell<Stream>>>,
    handle: StreamHandle,
}

// SAFETY: the `Rc` and the stream behind it are only touched with the
// mainloop lock held, by `close` on the owning thread or by the read
// callback on the event-loop thread, which holds the lock while dispatching.
unsafe impl Send for PulseMonitorStream {}

impl PulseMonitorStream {
    pub(crate) fn new(session: Arc<PulseSession>, round_trip: Arc<Mutex<()>>, stream: OpenStream) -> Self {
        Self {
            session,
            round_trip,
            handle: stream.handle,
            stream: Some(stream.stream),
        }
    }
}

impl MonitorStream for PulseMonitorStream {
    fn handle(&self) -> StreamHandle {
        self.handle
    }

    fn close(&mut self) -> Result<(), ConnectionError> {
        let Some(stream) = self.stream.take() else {
            return Ok(());
        };
        let _turn = self.round_trip.lock();
        let _lock = self.session.lock();
        let result = release_stream(&stream);
        drop(stream);
        log::debug!("Closed record stream {}", self.handle);
        result
    }
}

impl Drop for PulseMonitorStream {
    fn drop(&mut self) {
        if let Err(e) = self.close() {
            log::warn!("Failed to close record stream {}: {}", self.handle, e);
        }
    }
}

/// A record stream that reached the ready state.
pub(crate) struct OpenStream {
    stream: Rc<RefCell<Stream>>,
    handle: StreamHandle,
}

impl OpenStream {
    pub(crate) fn handle(&self) -> StreamHandle {
        self.handle
    }
}

/// Create a record stream on `spec.source` and wait until it is ready.
///
/// Must be called with the connection's round-trip lock held and without
/// the mainloop lock.
pub(crate) fn open_record_stream(
    session: &PulseSession,
    spec: &MonitorStreamSpec,
    on_frame: FrameCallback,
    deadline: &Deadline,
) -> Result<OpenStream, ConnectionError> {
    let sample_spec = sample_spec(spec)?;
    let attr = buffer_attr(spec);
    let mut assembler = FrameAssembler::for_rate(spec.sample_rate, spec.channels);
    let changed = Completion::<()>::new();

    let stream = {
        let _lock = session.lock();
        let created = Stream::new(&mut session.context(), &spec.stream_name, &sample_spec, None);
        let stream = match created {
            Some(stream) => Rc::new(RefCell::new(stream)),
            None => {
                return Err(ConnectionError::OperationFailed(format!(
                    "failed to create record stream: {}",
                    describe_error(session.errno())
                )))
            }
        };

        {
            let changed = Arc::clone(&changed);
            let reader = Rc::downgrade(&stream);
            let mut s = stream.borrow_mut();
            s.set_state_callback(Some(Box::new(move || changed.complete(()))));
            s.set_read_callback(Some(Box::new(move |_readable| {
                let Some(stream) = reader.upgrade() else {
                    return;
                };
                let Ok(mut stream) = stream.try_borrow_mut() else {
                    return;
                };
                drain(&mut stream, &mut assembler, &on_frame);
            })));
        }

        let connected = stream
            .borrow_mut()
            .connect_record(Some(spec.source.as_str()), Some(&attr), StreamFlagSet::ADJUST_LATENCY);
        if let Err(e) = connected {
            let _ = release_stream(&stream);
            drop(stream);
            return Err(ConnectionError::OperationFailed(format!(
                "failed to record from {}: {}",
                spec.source,
                describe_error(e)
            )));
        }
        stream
    };

    let expires = deadline.start();
    let ready = loop {
        {
            let _lock = session.lock();
            let state = stream.borrow().get_state();
            match state {
                StreamState::Ready => break Ok(()),
                StreamState::Failed | StreamState::Terminated => {
                    let err = session.errno();
                    break Err(if is_no_entity(err) {
                        ConnectionError::EntityGone(spec.source.clone())
                    } else {
                        ConnectionError::OperationFailed(format!(
                            "record stream on {} failed: {}",
                            spec.source,
                            describe_error(err)
                        ))
                    });
                }
                _ => {}
            }
        }
        if deadline.is_cancelled() {
            break Err(ConnectionError::Cancelled);
        }
        if let (Some(expires), Some(timeout)) = (expires, deadline.timeout) {
            if Instant::now() >= expires {
                break Err(ConnectionError::Timeout(timeout));
            }
        }
        changed.wait_for(POLL_INTERVAL);
    };

    let _lock = session.lock();
    if let Err(e) = ready {
        let _ = release_stream(&stream);
        drop(stream);
        return Err(e);
    }
    let index = stream.borrow().get_index();
    match index {
        Some(index) => {
            stream.borrow_mut().set_state_callback(None);
            Ok(OpenStream {
                stream,
                handle: StreamHandle(index),
            })
        }
        None => {
            let _ = release_stream(&stream);
            drop(stream);
            Err(ConnectionError::OperationFailed("record stream has no index".into()))
        }
    }
}

/// Detach callbacks and disconnect. Only with the mainloop lock held.
///
/// No read callback runs once this returns.
fn release_stream(stream: &Rc<RefCell<Stream>>) -> Result<(), ConnectionError> {
    let mut s = stream.borrow_mut();
    s.set_read_callback(None);
    s.set_state_callback(None);
    if !matches!(s.get_state(), StreamState::Creating | StreamState::Ready) {
        return Ok(());
    }
    s.disconnect()
        .map_err(|e| ConnectionError::OperationFailed(format!("failed to disconnect record stream: {}", describe_error(e))))
}

/// Consume every readable fragment, handing `on_frame` whole frames only.
fn drain(stream: &mut Stream, assembler: &mut FrameAssembler, on_frame: &FrameCallback) {
    loop {
        match stream.peek() {
            Ok(PeekResult::Empty) => return,
            Ok(PeekResult::Hole(len)) => {
                log::trace!("Skipping {} byte hole in record stream", len);
                assembler.reset();
            }
            Ok(PeekResult::Data(bytes)) => assembler.push(bytes, |frame| on_frame(frame)),
            Err(e) => {
                log::warn!("Failed to read record stream: {}", describe_error(e));
                return;
            }
        }
        if let Err(e) = stream.discard() {
            log::warn!("Failed to discard record fragment: {}", describe_error(e));
            return;
        }
    }
}
