//! Hand-off of encoded frames to the consumer.
//!
//! `Inline` runs the consumer on the event-loop thread with the lowest
//! latency, at the cost of stalling the server connection if the consumer is
//! slow. `Queued` moves the consumer onto its own thread behind a bounded
//! queue: one extra thread hop of latency, and frames are dropped when the
//! consumer falls `capacity` frames behind.

use std::thread;

use crossbeam_channel::{bounded, Sender, TrySendError};

use crate::models::config::DeliveryMode;
use crate::models::error::EncoderError;
use crate::models::stats::FrameDropReason;
use crate::traits::frame_encoder::EncodedFrameCallback;

pub enum FrameDelivery {
    Inline(EncodedFrameCallback),
    Queued {
        sender: Option<Sender<Vec<u8>>>,
        handle: Option<thread::JoinHandle<()>>,
    },
}

impl FrameDelivery {
    pub fn start(mode: DeliveryMode, consumer: EncodedFrameCallback) -> Result<Self, EncoderError> {
        match mode {
            DeliveryMode::Inline => Ok(Self::Inline(consumer)),
            DeliveryMode::Queued { capacity } => {
                let (sender, receiver) = bounded::<Vec<u8>>(capacity);
                let handle = thread::Builder::new()
                    .name("frame-delivery".into())
                    .spawn(move || {
                        for frame in receiver.iter() {
                            consumer(&frame);
                        }
                        log::debug!("Frame delivery thread drained");
                    })
                    .map_err(|e| EncoderError::InitFailed(format!("failed to spawn delivery thread: {}", e)))?;
                Ok(Self::Queued {
                    sender: Some(sender),
                    handle: Some(handle),
                })
            }
        }
    }

    /// Forward one encoded frame. Never blocks in queued mode.
    pub fn deliver(&self, frame: &[u8]) -> Result<(), FrameDropReason> {
        match self {
            Self::Inline(consumer) => {
                consumer(frame);
                Ok(())
            }
            Self::Queued { sender: Some(sender), .. } => match sender.try_send(frame.to_vec()) {
                Ok(()) => Ok(()),
                Err(TrySendError::Full(_)) => Err(FrameDropReason::QueueFull),
                Err(TrySendError::Disconnected(_)) => {
                    log::warn!("Frame delivery thread is gone, dropping frame");
                    Err(FrameDropReason::QueueFull)
                }
            },
            Self::Queued { sender: None, .. } => Err(FrameDropReason::QueueFull),
        }
    }

    /// Deliver what is queued, then join the delivery thread.
    pub fn shutdown(&mut self) {
        if let Self::Queued { sender, handle } = self {
            drop(sender.take());
            if let Some(handle) = handle.take() {
                if handle.join().is_err() {
                    log::error!("Frame delivery thread panicked");
                }
            }
        }
    }
}

impl Drop for FrameDelivery {
    fn drop(&mut self) {
        self.shutdown();
    }
}
