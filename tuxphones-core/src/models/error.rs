use std::time::Duration;

use thiserror::Error;

/// Errors raised while talking to the audio server.
///
/// Every blocking round trip in the crate surfaces one of these; nothing is
/// retried automatically.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ConnectionError {
    #[error("error starting mainloop: {0}")]
    MainloopStart(String),

    #[error("error connecting context: {0}")]
    Connect(String),

    #[error("context failed to connect: {0}")]
    ContextFailed(String),

    #[error("not connected to the audio server")]
    NotConnected,

    #[error("operation timed out after {0:?}")]
    Timeout(Duration),

    #[error("operation cancelled")]
    Cancelled,

    #[error("operation failed: {0}")]
    OperationFailed(String),

    /// The server no longer knows the addressed object (stream, sink, module).
    #[error("no such entity: {0}")]
    EntityGone(String),
}

/// Errors raised while provisioning or removing the synthetic sinks.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum RoutingError {
    #[error("PASSTHROUGH_SINK_NOT_FOUND: {0}")]
    PassthroughSinkNotFound(String),

    #[error("module load failed: {0}")]
    ModuleLoadError(String),

    #[error("module unload failed: {0}")]
    ModuleUnloadError(String),

    #[error("synthetic sinks are not set up")]
    SinksNotReady,

    #[error(transparent)]
    Connection(#[from] ConnectionError),
}

/// Errors raised by capture session transitions.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CaptureError {
    #[error("already capturing")]
    AlreadyCapturing,

    #[error("no audio stream found for process {0}")]
    ApplicationNotFound(u32),

    #[error("capture stream setup failed: {0}")]
    StreamSetupError(String),

    #[error("stream routing failed: {0}")]
    RoutingFailed(String),

    #[error("synthetic sinks are not set up")]
    SinksNotReady,

    #[error(transparent)]
    Encoder(#[from] EncoderError),

    #[error(transparent)]
    Connection(#[from] ConnectionError),
}

/// Errors raised by the encoding pipeline and codec backends.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum EncoderError {
    #[error("encoder initialization failed: {0}")]
    InitFailed(String),

    #[error("encoder already open")]
    AlreadyOpen,

    #[error("encoder not open")]
    NotOpen,

    #[error("unsupported channel count: {0}")]
    UnsupportedChannels(u16),

    /// The codec returned a negative result code for one frame.
    #[error("encode failed: {message} (code {code})")]
    EncodeFailed { code: i32, message: String },
}
