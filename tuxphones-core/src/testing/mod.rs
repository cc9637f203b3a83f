//! Test doubles for the backend seams.

pub mod fake_encoder;
pub mod fake_server;

pub use fake_encoder::FakeEncoderFactory;
pub use fake_server::FakeAudioServer;

pub fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}
