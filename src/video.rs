// video.rs - decoded frame hand-off into the video texture
//
// A decoder thread holds a `VideoProducer` obtained from the surface id and
// submits RGBA frames; the render thread drains the newest one per frame.

use crate::device::{RenderDevice, TextureId};
use crate::error::{PlayerError, Result};
use crate::registry;
use crate::throttle::LogThrottle;
use crossbeam_channel::{Receiver, Sender, TrySendError};
use log::{debug, info, warn};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

const IDENTITY: [f32; 16] = [
    1.0, 0.0, 0.0, 0.0,
    0.0, 1.0, 0.0, 0.0,
    0.0, 0.0, 1.0, 0.0,
    0.0, 0.0, 0.0, 1.0,
];

/// Frames buffered between producer and renderer before the producer drops.
const QUEUE_DEPTH: usize = 2;

/// One decoded RGBA8 frame plus the producer's texture-coordinate transform.
#[derive(Debug, Clone, PartialEq)]
pub struct VideoFrame {
    pub width: u32,
    pub height: u32,
    pub pixels: Vec<u8>,
    pub transform: [f32; 16],
}

impl VideoFrame {
    pub fn rgba(width: u32, height: u32, pixels: Vec<u8>) -> Result<Self> {
        let expected = width as usize * height as usize * 4;
        if width == 0 || height == 0 || pixels.len() != expected {
            return Err(PlayerError::InvalidArgument(format!(
                "frame {width}x{height} needs {expected} bytes, got {}",
                pixels.len()
            )));
        }
        Ok(Self { width, height, pixels, transform: IDENTITY })
    }

    pub fn with_transform(mut self, transform: [f32; 16]) -> Self {
        self.transform = transform;
        self
    }
}

/// Sender side shared by a surface's registry entry and its producers.
#[derive(Debug)]
struct Channel {
    tx: Sender<VideoFrame>,
    producers: AtomicUsize,
}

/// Registry entry of a video surface; hands out producers.
#[derive(Debug, Clone)]
pub(crate) struct VideoSource {
    surface_id: u64,
    channel: Arc<Channel>,
}

impl VideoSource {
    fn attach(&self) -> VideoProducer {
        VideoProducer::attached(self.surface_id, Arc::clone(&self.channel))
    }
}

/// Producer end of a video surface. The surface counts as fed while at least
/// one producer is alive.
#[derive(Debug)]
pub struct VideoProducer {
    surface_id: u64,
    channel: Arc<Channel>,
}

impl VideoProducer {
    fn attached(surface_id: u64, channel: Arc<Channel>) -> Self {
        channel.producers.fetch_add(1, Ordering::AcqRel);
        Self { surface_id, channel }
    }

    pub fn surface_id(&self) -> u64 {
        self.surface_id
    }

    /// Queues a frame. Returns `Ok(false)` when the renderer is behind and the
    /// frame was dropped.
    pub fn submit(&self, frame: VideoFrame) -> Result<bool> {
        match self.channel.tx.try_send(frame) {
            Ok(()) => Ok(true),
            Err(TrySendError::Full(_)) => Ok(false),
            Err(TrySendError::Disconnected(_)) => Err(PlayerError::VideoSourceDisconnected),
        }
    }
}

impl Clone for VideoProducer {
    fn clone(&self) -> Self {
        Self::attached(self.surface_id, Arc::clone(&self.channel))
    }
}

impl Drop for VideoProducer {
    fn drop(&mut self) {
        self.channel.producers.fetch_sub(1, Ordering::AcqRel);
    }
}

/// Looks up the producer for a surface id as handed out by the player.
pub fn connect(surface_id: &str) -> Result<VideoProducer> {
    let id: u64 = surface_id
        .trim()
        .parse()
        .map_err(|_| PlayerError::InvalidArgument(format!("surface id {surface_id:?}")))?;
    registry::lookup_video_surface(id)
        .map(|source| source.attach())
        .ok_or(PlayerError::SurfaceNotFound(id))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VideoStatus {
    NotConnected,
    Connected,
    Disconnected,
}

/// Flips the V axis of a texture transform: row 1 becomes `1 - row 1`.
pub fn flip_y(mut m: [f32; 16]) -> [f32; 16] {
    m[1] = -m[1];
    m[5] = -m[5];
    m[9] = -m[9];
    m[13] = 1.0 - m[13];
    m
}

/// Consumer end, owned by the render thread together with its texture.
pub struct VideoSurface {
    id: u64,
    texture: TextureId,
    rx: Receiver<VideoFrame>,
    channel: Arc<Channel>,
    transform: [f32; 16],
    status: VideoStatus,
    ever_succeeded: bool,
    consecutive_failures: u32,
    disconnect_threshold: u32,
    waiting_log: LogThrottle,
    transient_log: LogThrottle,
}

impl VideoSurface {
    pub fn create(
        texture: TextureId,
        disconnect_threshold: u32,
        waiting_log_every: u32,
        transient_log_every: u32,
    ) -> Self {
        let (tx, rx) = crossbeam_channel::bounded(QUEUE_DEPTH);
        let channel = Arc::new(Channel { tx, producers: AtomicUsize::new(0) });
        let id = registry::register_video_surface(|surface_id| VideoSource {
            surface_id,
            channel: Arc::clone(&channel),
        });
        info!("video surface {id} created");
        Self {
            id,
            texture,
            rx,
            channel,
            transform: flip_y(IDENTITY),
            status: VideoStatus::NotConnected,
            ever_succeeded: false,
            consecutive_failures: 0,
            disconnect_threshold: disconnect_threshold.max(1),
            waiting_log: LogThrottle::new(waiting_log_every),
            transient_log: LogThrottle::new(transient_log_every),
        }
    }

    pub fn surface_id(&self) -> u64 {
        self.id
    }

    pub fn texture(&self) -> TextureId {
        self.texture
    }

    pub fn status(&self) -> VideoStatus {
        self.status
    }

    /// Sampling transform of the last uploaded frame.
    pub fn transform(&self) -> [f32; 16] {
        self.transform
    }

    /// Producers currently attached to this surface.
    pub fn producer_count(&self) -> usize {
        self.channel.producers.load(Ordering::Acquire)
    }

    /// Uploads the newest queued frame, if any.
    ///
    /// Before the first frame this reports `VideoSourceNotConnected`. Afterwards
    /// an empty queue with a producer attached just keeps the previous frame and
    /// transform. Only update failures (no producer left, or an upload the
    /// device rejected) count, and a run of them reports
    /// `VideoSourceDisconnected`.
    pub fn update(&mut self, device: &mut dyn RenderDevice) -> Result<[f32; 16]> {
        let Some(frame) = self.rx.try_iter().last() else {
            if self.producer_count() > 0 {
                return self.on_idle();
            }
            return self.on_failure("no producer attached");
        };

        if let Err(e) = device.upload_video_frame(self.texture, &frame) {
            return self.on_failure(&e.to_string());
        }
        self.transform = flip_y(frame.transform);
        self.consecutive_failures = 0;
        self.ever_succeeded = true;
        if self.status != VideoStatus::Connected {
            info!("video surface {} connected ({}x{})", self.id, frame.width, frame.height);
            self.status = VideoStatus::Connected;
            self.transient_log.reset();
        }
        Ok(self.transform)
    }

    fn on_idle(&mut self) -> Result<[f32; 16]> {
        if !self.ever_succeeded {
            return self.not_connected();
        }
        Ok(self.transform)
    }

    fn not_connected(&mut self) -> Result<[f32; 16]> {
        if self.waiting_log.tick() {
            debug!(
                "video surface {} has no frame yet ({} checks)",
                self.id,
                self.waiting_log.count()
            );
        }
        Err(PlayerError::VideoSourceNotConnected)
    }

    fn on_failure(&mut self, reason: &str) -> Result<[f32; 16]> {
        if !self.ever_succeeded {
            return self.not_connected();
        }

        self.consecutive_failures += 1;
        if self.transient_log.tick() {
            debug!("video surface {} update failed ({reason}), reusing last frame", self.id);
        }
        if self.consecutive_failures >= self.disconnect_threshold {
            if self.status == VideoStatus::Connected {
                warn!(
                    "video surface {} disconnected after {} failed updates: {reason}",
                    self.id, self.consecutive_failures
                );
            }
            self.status = VideoStatus::Disconnected;
            return Err(PlayerError::VideoSourceDisconnected);
        }
        Ok(self.transform)
    }
}

impl Drop for VideoSurface {
    fn drop(&mut self) {
        registry::unregister_video_surface(self.id);
        info!("video surface {} released", self.id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::{GpuCall, RecordingBackend};

    fn frame() -> VideoFrame {
        VideoFrame::rgba(2, 2, vec![255; 16]).unwrap()
    }

    #[test]
    fn rejects_short_frames() {
        assert!(matches!(
            VideoFrame::rgba(2, 2, vec![0; 15]),
            Err(PlayerError::InvalidArgument(_))
        ));
    }

    #[test]
    fn flip_is_an_involution_on_v() {
        let flipped = flip_y(IDENTITY);
        assert_eq!(flipped[5], -1.0);
        assert_eq!(flipped[13], 1.0);
        assert_eq!(flip_y(flipped), IDENTITY);
    }

    #[test]
    fn connect_by_surface_id() {
        let (mut device, log) = RecordingBackend::new();
        let texture = device.create_video_texture();
        let mut surface = VideoSurface::create(texture, 3, 60, 300);
        let id = surface.surface_id().to_string();

        let producer = connect(&id).unwrap();
        assert_eq!(producer.surface_id(), surface.surface_id());
        assert!(producer.submit(frame()).unwrap());
        assert!(surface.update(&mut device).is_ok());
        assert_eq!(log.count(|c| matches!(c, GpuCall::UploadVideoFrame { .. })), 1);

        assert!(matches!(connect("nope"), Err(PlayerError::InvalidArgument(_))));
        drop(surface);
        assert!(matches!(connect(&id), Err(PlayerError::SurfaceNotFound(_))));
    }

    #[test]
    fn connection_tracking() {
        let (mut device, _log) = RecordingBackend::new();
        let texture = device.create_video_texture();
        let mut surface = VideoSurface::create(texture, 3, 60, 300);
        let producer = connect(&surface.surface_id().to_string()).unwrap();
        assert_eq!(surface.producer_count(), 1);

        assert_eq!(surface.update(&mut device), Err(PlayerError::VideoSourceNotConnected));
        assert_eq!(surface.status(), VideoStatus::NotConnected);

        let transform = [
            1.0, 0.0, 0.0, 0.0, 0.0, 1.0, 0.0, 0.0, 0.0, 0.0, 1.0, 0.0, 0.25, 0.0, 0.0, 1.0,
        ];
        producer.submit(frame().with_transform(transform)).unwrap();
        let applied = surface.update(&mut device).unwrap();
        assert_eq!(applied, flip_y(transform));
        assert_eq!(surface.status(), VideoStatus::Connected);

        // An empty queue with a live producer reuses the last transform.
        for _ in 0..10 {
            assert_eq!(surface.update(&mut device), Ok(applied));
        }
        assert_eq!(surface.status(), VideoStatus::Connected);
        assert_eq!(surface.transform(), applied);
    }

    #[test]
    fn slow_producer_stays_connected() {
        let (mut device, log) = RecordingBackend::new();
        let texture = device.create_video_texture();
        let mut surface = VideoSurface::create(texture, 3, 60, 300);
        let producer = connect(&surface.surface_id().to_string()).unwrap();

        let mut transitions = 0;
        let mut last = surface.status();
        for tick in 0..40 {
            if tick % 4 == 0 {
                producer.submit(frame()).unwrap();
            }
            assert!(surface.update(&mut device).is_ok(), "update {tick} failed");
            if surface.status() != last {
                transitions += 1;
                last = surface.status();
            }
        }
        assert_eq!(transitions, 1);
        assert_eq!(surface.status(), VideoStatus::Connected);
        assert_eq!(log.count(|c| matches!(c, GpuCall::UploadVideoFrame { .. })), 10);
    }

    #[test]
    fn dropped_producer_escalates_to_disconnected() {
        let (mut device, _log) = RecordingBackend::new();
        let texture = device.create_video_texture();
        let mut surface = VideoSurface::create(texture, 3, 60, 300);
        let producer = connect(&surface.surface_id().to_string()).unwrap();
        let second = producer.clone();
        assert_eq!(surface.producer_count(), 2);

        producer.submit(frame()).unwrap();
        let applied = surface.update(&mut device).unwrap();
        drop(producer);
        assert_eq!(surface.update(&mut device), Ok(applied));
        drop(second);
        assert_eq!(surface.producer_count(), 0);

        assert_eq!(surface.update(&mut device), Ok(applied));
        assert_eq!(surface.update(&mut device), Ok(applied));
        assert_eq!(surface.status(), VideoStatus::Connected);
        assert_eq!(surface.update(&mut device), Err(PlayerError::VideoSourceDisconnected));
        assert_eq!(surface.status(), VideoStatus::Disconnected);
        assert_eq!(surface.transform(), applied);

        let producer = connect(&surface.surface_id().to_string()).unwrap();
        producer.submit(frame()).unwrap();
        assert!(surface.update(&mut device).is_ok());
        assert_eq!(surface.status(), VideoStatus::Connected);
    }

    #[test]
    fn rejected_uploads_count_as_failures() {
        let (mut device, log) = RecordingBackend::new();
        let controls = device.controls();
        let texture = device.create_video_texture();
        let mut surface = VideoSurface::create(texture, 2, 60, 300);
        let producer = connect(&surface.surface_id().to_string()).unwrap();

        producer.submit(frame()).unwrap();
        let applied = surface.update(&mut device).unwrap();

        controls.fail_upload(true);
        producer.submit(frame()).unwrap();
        assert_eq!(surface.update(&mut device), Ok(applied));
        producer.submit(frame()).unwrap();
        assert_eq!(surface.update(&mut device), Err(PlayerError::VideoSourceDisconnected));
        assert_eq!(log.count(|c| matches!(c, GpuCall::UploadVideoFrame { .. })), 1);

        controls.fail_upload(false);
        producer.submit(frame()).unwrap();
        assert!(surface.update(&mut device).is_ok());
        assert_eq!(surface.status(), VideoStatus::Connected);
    }

    #[test]
    fn newest_frame_wins_and_full_queue_drops() {
        let (mut device, log) = RecordingBackend::new();
        let texture = device.create_video_texture();
        let mut surface = VideoSurface::create(texture, 3, 60, 300);
        let producer = connect(&surface.surface_id().to_string()).unwrap();

        assert!(producer.submit(frame()).unwrap());
        assert!(producer.submit(VideoFrame::rgba(1, 1, vec![0; 4]).unwrap()).unwrap());
        assert!(!producer.submit(frame()).unwrap());

        surface.update(&mut device).unwrap();
        let uploads: Vec<_> = log
            .calls()
            .into_iter()
            .filter(|c| matches!(c, GpuCall::UploadVideoFrame { .. }))
            .collect();
        assert_eq!(uploads, vec![GpuCall::UploadVideoFrame { texture, width: 1, height: 1 }]);
    }
}
