//! Provisioning of the two synthetic sinks capture depends on.
//!
//! ```text
//! [target app] → [combined sink] ─┬→ [capture sink] → monitor → encoder
//!                                 └→ [real output]  → speakers
//! ```

use std::sync::Arc;

use crate::models::audio_models::{ModuleHandle, SinkDescriptor};
use crate::models::config::CaptureConfiguration;
use crate::models::deadline::Deadline;
use crate::models::error::{ConnectionError, RoutingError};
use crate::traits::audio_server::{AudioServer, ServerRequest};

/// Name that makes the server substitute its configured default sink.
pub const DEFAULT_SINK_SENTINEL: &str = "@DEFAULT_SINK@";

const NULL_SINK_MODULE: &str = "module-null-sink";
const COMBINE_SINK_MODULE: &str = "module-combine-sink";

/// Handles to the provisioned sinks, as last listed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyntheticSinks {
    pub capture: SinkDescriptor,
    pub combined: SinkDescriptor,
    /// Real output the combined sink mixes into.
    pub passthrough: String,
}

pub struct SinkGraphManager<S: AudioServer> {
    server: Arc<S>,
    capture_sink_name: String,
    combined_sink_name: String,
    deadline: Deadline,
    sinks: Option<SyntheticSinks>,
}

impl<S: AudioServer> SinkGraphManager<S> {
    pub fn new(server: Arc<S>, config: &CaptureConfiguration) -> Self {
        Self {
            server,
            capture_sink_name: config.capture_sink_name.clone(),
            combined_sink_name: config.combined_sink_name.clone(),
            deadline: Deadline::from_timeout(config.operation_timeout()),
            sinks: None,
        }
    }

    /// All sinks the server currently knows, ours included.
    pub fn list_sinks(&self) -> Result<Vec<SinkDescriptor>, ConnectionError> {
        self.server
            .submit_and_wait(ServerRequest::ListSinks, &self.deadline)?
            .into_sinks()
    }

    /// The synthetic sinks, if `ensure_sinks` has succeeded.
    pub fn sinks(&self) -> Option<&SyntheticSinks> {
        self.sinks.as_ref()
    }

    /// Make sure the capture and combined sinks exist, creating only what is missing.
    ///
    /// An explicit `output_override` must name an existing sink; otherwise the
    /// connection is released and `PassthroughSinkNotFound` is returned before
    /// anything is created.
    pub fn ensure_sinks(&mut self, output_override: Option<&str>) -> Result<SyntheticSinks, RoutingError> {
        let mut listed = self.list_sinks()?;

        let passthrough = match output_override {
            Some(name) => {
                if !listed.iter().any(|sink| sink.name == name) {
                    log::error!("Passthrough sink {:?} not found, disconnecting", name);
                    self.server.disconnect();
                    return Err(RoutingError::PassthroughSinkNotFound(name.to_string()));
                }
                name.to_string()
            }
            None => {
                let default_sink = self.resolve_default_sink()?;
                if default_sink != DEFAULT_SINK_SENTINEL && find_sink(&listed, &default_sink).is_none() {
                    log::warn!("Default sink {} is not among the listed sinks", default_sink);
                }
                default_sink
            }
        };

        if find_sink(&listed, &self.capture_sink_name).is_none() {
            let argument = format!("sink_name={}", self.capture_sink_name);
            self.load_module(NULL_SINK_MODULE, argument)?;
            listed = self.list_sinks()?;
        } else {
            log::debug!("Reusing existing capture sink {}", self.capture_sink_name);
        }

        if find_sink(&listed, &self.combined_sink_name).is_none() {
            let argument = format!(
                "sink_name={} slaves={},{}",
                self.combined_sink_name, self.capture_sink_name, passthrough
            );
            self.load_module(COMBINE_SINK_MODULE, argument)?;
            listed = self.list_sinks()?;
        } else {
            log::warn!(
                "Reusing existing combined sink {}: it keeps the outputs it was loaded with, {} may not be one of them",
                self.combined_sink_name,
                passthrough
            );
        }

        let capture = find_sink(&listed, &self.capture_sink_name).ok_or_else(|| {
            RoutingError::ModuleLoadError(format!("{} missing after load", self.capture_sink_name))
        })?;
        let combined = find_sink(&listed, &self.combined_sink_name).ok_or_else(|| {
            RoutingError::ModuleLoadError(format!("{} missing after load", self.combined_sink_name))
        })?;

        log::info!(
            "Synthetic sinks ready: capture {} ({}), combined {} ({}) into {}",
            capture.name,
            capture.handle,
            combined.name,
            combined.handle,
            passthrough
        );

        let sinks = SyntheticSinks {
            capture,
            combined,
            passthrough,
        };
        self.sinks = Some(sinks.clone());
        Ok(sinks)
    }

    /// Unload the combined sink, then the capture sink.
    ///
    /// Sinks are found by listing, so ones left by an interrupted setup or a
    /// previous run are removed too. Best effort: a failed unload is logged
    /// and does not stop the other. Fails only when every attempted unload
    /// failed.
    pub fn teardown(&mut self) -> Result<(), RoutingError> {
        let cached = self.sinks.take();
        let ours = match self.list_sinks() {
            Ok(listed) => [&self.combined_sink_name, &self.capture_sink_name]
                .into_iter()
                .filter_map(|name| find_sink(&listed, name))
                .collect::<Vec<_>>(),
            Err(e) => match cached {
                Some(sinks) => {
                    log::warn!("Could not list sinks for teardown ({}), using the last known ones", e);
                    vec![sinks.combined, sinks.capture]
                }
                None => return Err(e.into()),
            },
        };
        if ours.is_empty() {
            log::debug!("Teardown found no synthetic sinks, nothing to unload");
            return Ok(());
        }

        let mut attempted = 0;
        let mut failures = Vec::new();
        for sink in ours {
            let Some(module) = sink.owner_module else {
                log::warn!("Sink {} has no owner module, leaving it in place", sink.name);
                continue;
            };
            attempted += 1;
            match self.unload_module(module) {
                Ok(()) => log::info!("Unloaded {} ({})", sink.name, module),
                Err(ConnectionError::EntityGone(_)) => {
                    log::info!("{} ({}) was already unloaded", sink.name, module)
                }
                Err(e) => {
                    log::error!("Failed to unload {} ({}): {}", sink.name, module, e);
                    failures.push(format!("{}: {}", sink.name, e));
                }
            }
        }

        if attempted > 0 && failures.len() == attempted {
            return Err(RoutingError::ModuleUnloadError(failures.join("; ")));
        }
        Ok(())
    }

    fn resolve_default_sink(&self) -> Result<String, RoutingError> {
        let default_sink = self
            .server
            .submit_and_wait(ServerRequest::ServerInfo, &self.deadline)?
            .into_default_sink()?;
        Ok(default_sink.unwrap_or_else(|| {
            log::warn!("Server reports no default sink, using {}", DEFAULT_SINK_SENTINEL);
            DEFAULT_SINK_SENTINEL.to_string()
        }))
    }

    fn load_module(&self, name: &str, argument: String) -> Result<ModuleHandle, RoutingError> {
        log::debug!("Loading {} with {:?}", name, argument);
        let module = self
            .server
            .submit_and_wait(
                ServerRequest::LoadModule {
                    name: name.to_string(),
                    argument,
                },
                &self.deadline,
            )
            .and_then(|outcome| outcome.into_module())
            .map_err(|e| RoutingError::ModuleLoadError(format!("{}: {}", name, e)))?;
        log::info!("Loaded {} as {}", name, module);
        Ok(module)
    }

    fn unload_module(&self, module: ModuleHandle) -> Result<(), ConnectionError> {
        self.server
            .submit_and_wait(ServerRequest::UnloadModule(module), &self.deadline)?
            .into_completed()
    }
}

fn find_sink(sinks: &[SinkDescriptor], name: &str) -> Option<SinkDescriptor> {
    sinks.iter().find(|sink| sink.name == name).cloned()
}
