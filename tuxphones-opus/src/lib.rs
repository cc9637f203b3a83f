//! # tuxphones-opus
//!
//! Opus implementation of the `EncoderFactory` seam, over the bundled
//! libopus from `libopus_sys`.

pub mod encoder;

pub use encoder::{OpusEncoderFactory, OpusFrameEncoder};
