//! Voice-note capture.
//!
//! The microphone is abstracted as a [`CaptureDevice`] that opens a
//! [`CaptureStream`]. A [`Recorder`] is either idle or recording, and the
//! hardware stream is released whenever it leaves the recording state,
//! including when the recorder is dropped.

use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use goldconnect_shared::constants::AUDIO_CONTENT_TYPE;
use tokio::time::Instant;
use tracing::{debug, warn};

use crate::error::Result;

/// A finished recording.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Clip {
    pub bytes: Bytes,
    pub content_type: String,
    /// Whole seconds.
    pub duration_secs: u32,
}

#[async_trait]
pub trait CaptureDevice: Send + Sync {
    async fn open(&self) -> Result<Box<dyn CaptureStream>>;
}

#[async_trait]
pub trait CaptureStream: Send {
    /// Stop capturing and hand over what was recorded.
    async fn finish(&mut self) -> Result<Bytes>;

    /// Stop the underlying hardware tracks. Called exactly once.
    fn release(&mut self);
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecorderState {
    Idle,
    Recording,
}

struct Active {
    stream: Box<dyn CaptureStream>,
    started: Instant,
}

pub struct Recorder {
    device: Arc<dyn CaptureDevice>,
    active: Option<Active>,
}

impl Recorder {
    pub fn new(device: Arc<dyn CaptureDevice>) -> Self {
        Self {
            device,
            active: None,
        }
    }

    pub fn state(&self) -> RecorderState {
        if self.active.is_some() {
            RecorderState::Recording
        } else {
            RecorderState::Idle
        }
    }

    /// Start recording. Does nothing if already recording.
    pub async fn start(&mut self) -> Result<()> {
        if self.active.is_some() {
            debug!("already recording");
            return Ok(());
        }
        let stream = self.device.open().await?;
        self.active = Some(Active {
            stream,
            started: Instant::now(),
        });
        debug!("recording started");
        Ok(())
    }

    /// Stop recording and return the clip, or `None` if idle.
    pub async fn stop(&mut self) -> Result<Option<Clip>> {
        let Some(mut active) = self.active.take() else {
            return Ok(None);
        };
        let duration_secs = u32::try_from(active.started.elapsed().as_secs()).unwrap_or(u32::MAX);
        let finished = active.stream.finish().await;
        active.stream.release();

        let bytes = finished?;
        debug!(duration_secs, size = bytes.len(), "recording stopped");
        Ok(Some(Clip {
            bytes,
            content_type: AUDIO_CONTENT_TYPE.to_string(),
            duration_secs,
        }))
    }
}

impl Drop for Recorder {
    fn drop(&mut self) {
        if let Some(mut active) = self.active.take() {
            warn!("recorder dropped while recording, releasing stream");
            active.stream.release();
        }
    }
}
