use std::sync::Arc;

use crate::models::audio_models::{ApplicationInfo, ApplicationStreamDescriptor, RawStreamInfo};
use crate::models::config::CaptureConfiguration;
use crate::models::deadline::Deadline;
use crate::models::error::ConnectionError;
use crate::traits::audio_server::{AudioServer, ServerRequest};

pub const PROP_APPLICATION_NAME: &str = "application.name";
pub const PROP_APPLICATION_PROCESS_ID: &str = "application.process.id";

/// Enumerates application playback streams and the sinks they play into.
pub struct ApplicationDiscovery<S: AudioServer> {
    server: Arc<S>,
    deadline: Deadline,
}

impl<S: AudioServer> ApplicationDiscovery<S> {
    pub fn new(server: Arc<S>, config: &CaptureConfiguration) -> Self {
        Self {
            server,
            deadline: Deadline::from_timeout(config.operation_timeout()),
        }
    }

    /// Streams that carry a readable process id, in server order.
    pub fn list_application_streams(&self) -> Result<Vec<ApplicationStreamDescriptor>, ConnectionError> {
        let streams = self
            .server
            .submit_and_wait(ServerRequest::ListStreams, &self.deadline)?
            .into_streams()?;

        let total = streams.len();
        let described: Vec<_> = streams.iter().filter_map(describe_stream).collect();
        if described.len() < total {
            log::debug!(
                "Skipped {} of {} streams without a process id",
                total - described.len(),
                total
            );
        }
        Ok(described)
    }

    /// First stream owned by `pid`, in server order.
    ///
    /// Processes with several streams are not multiplexed; which one comes
    /// first is up to the server and may change between calls.
    pub fn find_by_process_id(&self, pid: u32) -> Result<Option<ApplicationStreamDescriptor>, ConnectionError> {
        let mut matches = self
            .list_application_streams()?
            .into_iter()
            .filter(|stream| stream.process_id == pid);
        let first = matches.next();
        let extra = matches.count();
        if extra > 0 {
            log::warn!("Process {} has {} more audio streams, using the first", pid, extra);
        }
        Ok(first)
    }

    pub fn list_applications(&self) -> Result<Vec<ApplicationInfo>, ConnectionError> {
        Ok(self
            .list_application_streams()?
            .iter()
            .map(ApplicationInfo::from)
            .collect())
    }
}

fn describe_stream(stream: &RawStreamInfo) -> Option<ApplicationStreamDescriptor> {
    let process_id = stream
        .property(PROP_APPLICATION_PROCESS_ID)?
        .trim()
        .parse::<u32>()
        .ok()?;
    let name = stream
        .property(PROP_APPLICATION_NAME)
        .unwrap_or(&stream.name)
        .to_string();
    Some(ApplicationStreamDescriptor {
        name,
        process_id,
        stream_handle: stream.handle,
        current_sink: stream.sink,
    })
}
