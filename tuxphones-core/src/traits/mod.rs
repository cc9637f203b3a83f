pub mod audio_server;
pub mod capture_delegate;
pub mod frame_encoder;
