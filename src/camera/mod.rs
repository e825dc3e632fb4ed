// Camera capture and MJPEG relay
//
// A `FrameSource` hands out complete JPEG frames; the HTTP layer wraps each
// one as a part of a `multipart/x-mixed-replace` response.

mod jpeg;
mod rpicam;

use std::collections::VecDeque;

use async_trait::async_trait;
use bytes::{BufMut, Bytes, BytesMut};
use serde::{Deserialize, Serialize};

pub use jpeg::JpegSplitter;
pub use rpicam::RpiCamera;

/// Multipart boundary used by the video feed
pub const BOUNDARY: &str = "frame";
pub const MULTIPART_CONTENT_TYPE: &str = "multipart/x-mixed-replace; boundary=frame";

#[derive(Debug, thiserror::Error)]
pub enum CameraError {
    #[error("failed to start `{command}`: {source}")]
    Spawn {
        command: String,
        source: std::io::Error,
    },

    #[error("IO error reading frames: {0}")]
    Io(#[from] std::io::Error),

    #[error("camera stream ended")]
    StreamEnded,
}

/// Exposure profiles
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum,
)]
#[serde(rename_all = "snake_case")]
pub enum CameraMode {
    /// Camera defaults (auto exposure and white balance)
    #[default]
    Auto,
    /// Short exposure, low gain, daylight white balance
    Day,
    /// Long exposure, high gain, fixed warm colour gains
    Night,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CameraSettings {
    pub command: String,
    pub width: u32,
    pub height: u32,
    pub framerate: u32,
    pub mode: CameraMode,
}

/// Source of JPEG-encoded frames
#[async_trait]
pub trait FrameSource: Send {
    /// Wait for the next complete frame
    async fn next_frame(&mut self) -> Result<Bytes, CameraError>;

    /// Switch exposure profile
    async fn set_mode(&mut self, mode: CameraMode) -> Result<(), CameraError>;
}

/// Wrap one JPEG frame as a multipart part
pub fn multipart_part(frame: &[u8]) -> Bytes {
    let header = format!("--{BOUNDARY}\r\nContent-Type: image/jpeg\r\n\r\n");
    let mut part = BytesMut::with_capacity(header.len() + frame.len() + 2);
    part.put_slice(header.as_bytes());
    part.put_slice(frame);
    part.put_slice(b"\r\n");
    part.freeze()
}

/// Replays a fixed list of frames, then reports the stream as ended
///
/// Stands in for a camera when none is attached.
#[derive(Debug, Default)]
pub struct StaticFrames {
    frames: VecDeque<Bytes>,
    mode: CameraMode,
}

impl StaticFrames {
    pub fn new(frames: impl IntoIterator<Item = Bytes>) -> Self {
        Self {
            frames: frames.into_iter().collect(),
            mode: CameraMode::Auto,
        }
    }

    pub fn mode(&self) -> CameraMode {
        self.mode
    }
}

#[async_trait]
impl FrameSource for StaticFrames {
    async fn next_frame(&mut self) -> Result<Bytes, CameraError> {
        self.frames.pop_front().ok_or(CameraError::StreamEnded)
    }

    async fn set_mode(&mut self, mode: CameraMode) -> Result<(), CameraError> {
        self.mode = mode;
        Ok(())
    }
}
