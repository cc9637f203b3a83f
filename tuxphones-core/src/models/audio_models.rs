use std::fmt;

use serde::{Deserialize, Serialize};

/// Server-side index of a sink.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SinkHandle(pub u32);

/// Server-side index of a stream (a playback sink input or our record stream).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct StreamHandle(pub u32);

/// Server-side index of a loaded module.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ModuleHandle(pub u32);

impl fmt::Display for SinkHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "sink#{}", self.0)
    }
}

impl fmt::Display for StreamHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "stream#{}", self.0)
    }
}

impl fmt::Display for ModuleHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "module#{}", self.0)
    }
}

/// A mixing destination known to the audio server.
///
/// The server owns the sink itself. `owner_module` is the module that
/// provides it, which is what teardown unloads.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SinkDescriptor {
    pub name: String,
    pub handle: SinkHandle,
    pub owner_module: Option<ModuleHandle>,
    /// Name of the monitor source that taps this sink, when the server reports one.
    pub monitor_source: Option<String>,
}

impl SinkDescriptor {
    /// Source name to record from when monitoring this sink.
    pub fn monitor_source_name(&self) -> String {
        self.monitor_source
            .clone()
            .unwrap_or_else(|| format!("{}.monitor", self.name))
    }
}

/// One playback stream as reported by the server, before identity filtering.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawStreamInfo {
    pub handle: StreamHandle,
    pub name: String,
    pub sink: SinkHandle,
    /// Stream properties (`application.name`, `application.process.id`, ...).
    pub properties: Vec<(String, String)>,
}

impl RawStreamInfo {
    pub fn property(&self, key: &str) -> Option<&str> {
        self.properties
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }
}

/// An application's outbound audio stream and the sink it is attached to.
///
/// Re-enumerated on every discovery call; never cached.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApplicationStreamDescriptor {
    pub name: String,
    pub process_id: u32,
    pub stream_handle: StreamHandle,
    pub current_sink: SinkHandle,
}

/// What the host boundary sees of an application.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApplicationInfo {
    pub name: String,
    pub process_id: u32,
}

impl From<&ApplicationStreamDescriptor> for ApplicationInfo {
    fn from(stream: &ApplicationStreamDescriptor) -> Self {
        Self {
            name: stream.name.clone(),
            process_id: stream.process_id,
        }
    }
}

/// Sample layout requested for the monitor capture stream.
///
/// Samples are always signed 16-bit in native byte order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MonitorStreamSpec {
    /// Source to record from (the capture sink's monitor).
    pub source: String,
    pub sample_rate: u32,
    pub channels: u8,
    /// Stream name announced to the server.
    pub stream_name: String,
}

/// Real-time level of the most recent frame (RMS and peak, 0.0-1.0).
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct AudioLevels {
    pub rms: f32,
    pub peak: f32,
}
