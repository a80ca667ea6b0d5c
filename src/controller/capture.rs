//! Capture device boundary.
//!
//! The controller owns one acquired device handle for the whole interview
//! and starts/stops a stream per question. Constraints are fixed policy of
//! the controller, chosen to bound bandwidth and file size; they are not
//! negotiable per question.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::mpsc;
use tracing::info;

use crate::error::Result;

/// Fixed capture policy: resolution, framerate, bitrate, and a codec
/// preference list (first supported wins).
#[derive(Debug, Clone)]
pub struct CaptureConstraints {
    pub width: u32,
    pub height: u32,
    pub frame_rate: u32,
    pub video_bitrate_bps: u32,
    pub audio_bitrate_bps: u32,
    pub mime_preferences: Vec<String>,
}

impl Default for CaptureConstraints {
    fn default() -> Self {
        Self {
            width: 1280,
            height: 720,
            frame_rate: 30,
            video_bitrate_bps: 2_500_000,
            audio_bitrate_bps: 128_000,
            mime_preferences: vec![
                "video/webm;codecs=vp9".to_string(),
                "video/webm;codecs=vp8".to_string(),
                "video/webm".to_string(),
            ],
        }
    }
}

/// One time-sliced fragment of captured media. Opaque to the core.
#[derive(Debug, Clone)]
pub struct MediaChunk {
    pub bytes: Vec<u8>,
    pub timestamp_ms: u64,
}

/// A device that can be acquired under declared constraints. Permission
/// denial and device-busy failures surface as `PermissionDenied` and block
/// entry into recording.
#[async_trait]
pub trait CaptureDevice: Send + Sync {
    async fn acquire(&self, constraints: &CaptureConstraints) -> Result<Box<dyn CaptureStream>>;
}

/// An acquired stream. `start` begins a capture segment and yields chunks
/// over a channel; `stop` ends the segment and closes the channel.
#[async_trait]
pub trait CaptureStream: Send + Sync {
    async fn start(&mut self) -> Result<mpsc::Receiver<MediaChunk>>;

    async fn stop(&mut self) -> Result<()>;

    /// The negotiated container/codec, from the constraint preference list.
    fn mime_type(&self) -> &str;
}

/// Synthetic capture device: emits a fixed payload on a fixed cadence.
/// Used by tests and embedded drivers where no physical device exists.
pub struct SyntheticCapture {
    pub chunk_bytes: Vec<u8>,
    pub chunk_interval: Duration,
}

impl SyntheticCapture {
    pub fn new(chunk_bytes: Vec<u8>, chunk_interval: Duration) -> Self {
        Self {
            chunk_bytes,
            chunk_interval,
        }
    }
}

#[async_trait]
impl CaptureDevice for SyntheticCapture {
    async fn acquire(&self, constraints: &CaptureConstraints) -> Result<Box<dyn CaptureStream>> {
        let mime = constraints
            .mime_preferences
            .first()
            .cloned()
            .unwrap_or_else(|| "video/webm".to_string());
        info!("synthetic capture acquired ({})", mime);
        Ok(Box::new(SyntheticStream {
            chunk_bytes: self.chunk_bytes.clone(),
            chunk_interval: self.chunk_interval,
            mime,
            running: Arc::new(AtomicBool::new(false)),
        }))
    }
}

struct SyntheticStream {
    chunk_bytes: Vec<u8>,
    chunk_interval: Duration,
    mime: String,
    running: Arc<AtomicBool>,
}

#[async_trait]
impl CaptureStream for SyntheticStream {
    async fn start(&mut self) -> Result<mpsc::Receiver<MediaChunk>> {
        let (tx, rx) = mpsc::channel(16);

        // Fresh flag per segment so a stopped segment's task can never be
        // revived by a later start.
        let running = Arc::new(AtomicBool::new(true));
        self.running = Arc::clone(&running);
        let bytes = self.chunk_bytes.clone();
        let interval = self.chunk_interval;

        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.tick().await; // first tick is immediate
            let mut seq: u64 = 0;
            while running.load(Ordering::SeqCst) {
                ticker.tick().await;
                if !running.load(Ordering::SeqCst) {
                    break;
                }
                seq += 1;
                let chunk = MediaChunk {
                    bytes: bytes.clone(),
                    timestamp_ms: seq * interval.as_millis() as u64,
                };
                if tx.send(chunk).await.is_err() {
                    break;
                }
            }
        });

        Ok(rx)
    }

    async fn stop(&mut self) -> Result<()> {
        self.running.store(false, Ordering::SeqCst);
        Ok(())
    }

    fn mime_type(&self) -> &str {
        &self.mime
    }
}
