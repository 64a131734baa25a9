//! Face embedding collaborator and its Unix-socket client.
//!
//! The embedding model runs in a separate service. Each frame is one
//! request on a fresh connection:
//!
//! ```text
//! -> u32 LE header length | JSON {"width", "height", "len"} | len raw grayscale bytes
//! <- u32 LE reply length  | JSON {"faces": [{"region", "embedding"}]} or {"error": "..."}
//! ```

use crate::types::{FaceObservation, Frame};
use serde::{Deserialize, Serialize};
use std::io::{Read, Write};
use std::os::unix::net::UnixStream;
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

/// Upper bound on a reply from the embedding service.
const MAX_REPLY_BYTES: usize = 1024 * 1024;

#[derive(Error, Debug)]
pub enum EmbedError {
    #[error("embedding service I/O: {0}")]
    Io(#[from] std::io::Error),
    #[error("malformed embedding reply: {0}")]
    Json(#[from] serde_json::Error),
    #[error("embedding reply too large: {0} bytes")]
    ReplyTooLarge(usize),
    #[error("embedding service error: {0}")]
    Service(String),
}

/// Turns a frame into zero or more face embeddings.
pub trait FaceEmbedder: Send {
    fn detect(&mut self, frame: &Frame) -> Result<Vec<FaceObservation>, EmbedError>;
}

#[derive(Debug, Serialize, Deserialize)]
struct FrameHeader {
    width: u32,
    height: u32,
    len: usize,
}

#[derive(Debug, Serialize, Deserialize)]
struct EmbedReply {
    #[serde(default)]
    faces: Vec<FaceObservation>,
    #[serde(default)]
    error: Option<String>,
}

/// Client for the out-of-process embedding service.
pub struct SocketEmbedder {
    socket_path: PathBuf,
    timeout: Duration,
    /// Integer downscale applied before sending.
    scale: u32,
}

impl SocketEmbedder {
    pub fn new(socket_path: impl Into<PathBuf>, timeout: Duration, scale: u32) -> Self {
        Self {
            socket_path: socket_path.into(),
            timeout,
            scale: scale.max(1),
        }
    }

    fn exchange(&self, frame: &Frame) -> Result<EmbedReply, EmbedError> {
        let mut stream = UnixStream::connect(&self.socket_path)?;
        stream.set_read_timeout(Some(self.timeout))?;
        stream.set_write_timeout(Some(self.timeout))?;

        let header = serde_json::to_vec(&FrameHeader {
            width: frame.width,
            height: frame.height,
            len: frame.data.len(),
        })?;
        write_prefixed(&mut stream, &header)?;
        stream.write_all(&frame.data)?;
        stream.flush()?;

        let reply = read_prefixed(&mut stream)?;
        Ok(serde_json::from_slice(&reply)?)
    }
}

impl FaceEmbedder for SocketEmbedder {
    fn detect(&mut self, frame: &Frame) -> Result<Vec<FaceObservation>, EmbedError> {
        let scaled;
        let frame = if self.scale > 1 {
            scaled = frame.downscaled(self.scale);
            &scaled
        } else {
            frame
        };

        let reply = self.exchange(frame)?;
        if let Some(err) = reply.error {
            return Err(EmbedError::Service(err));
        }
        tracing::trace!(seq = frame.sequence, faces = reply.faces.len(), "embedding reply");
        Ok(reply.faces)
    }
}

fn write_prefixed(stream: &mut impl Write, payload: &[u8]) -> std::io::Result<()> {
    stream.write_all(&(payload.len() as u32).to_le_bytes())?;
    stream.write_all(payload)
}

fn read_prefixed(stream: &mut impl Read) -> Result<Vec<u8>, EmbedError> {
    let mut len_buf = [0u8; 4];
    stream.read_exact(&mut len_buf)?;
    let len = u32::from_le_bytes(len_buf) as usize;
    if len > MAX_REPLY_BYTES {
        return Err(EmbedError::ReplyTooLarge(len));
    }
    let mut buf = vec![0u8; len];
    stream.read_exact(&mut buf)?;
    Ok(buf)
}
