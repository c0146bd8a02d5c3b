//! Video source abstraction.
//!
//! The capture manager walks a ladder of `CaptureConfig` requests and asks a
//! `SourceProvider` to open each one. Opened sources report dimensions once
//! their metadata is ready and hand frames over via a non-blocking poll.
//!
//! Two providers ship in-tree:
//! - `SyntheticProvider`: deterministic moving-block scene, so the daemon and
//!   the end-to-end tests run without camera hardware.
//! - `ScriptedProvider`: replays a scripted sequence of attempt outcomes, for
//!   exercising the fallback ladder, the timeouts, and teardown accounting.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicIsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use rand::Rng;

use crate::capture::error::SourceError;
use crate::frame::FrameBuffer;

/// Preferred sensor orientation for one acquisition attempt.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Facing {
    Rear,
    Front,
    Any,
}

/// One candidate set of source-acquisition parameters.
///
/// Attempts are ordered most specific first; each later rung asks for less so
/// that *some* source can still be acquired on constrained hardware.
#[derive(Clone, Debug)]
pub struct CaptureConfig {
    pub facing: Facing,
    pub ideal_width: Option<u32>,
    pub ideal_height: Option<u32>,
}

impl CaptureConfig {
    /// The default fallback ladder: rear-facing high resolution, then
    /// front-facing, then any available source.
    pub fn default_ladder() -> Vec<CaptureConfig> {
        vec![
            CaptureConfig {
                facing: Facing::Rear,
                ideal_width: Some(1280),
                ideal_height: Some(720),
            },
            CaptureConfig {
                facing: Facing::Front,
                ideal_width: None,
                ideal_height: None,
            },
            CaptureConfig {
                facing: Facing::Any,
                ideal_width: None,
                ideal_height: None,
            },
        ]
    }
}

/// An open video source.
///
/// `ready` resolves once the source reports usable dimensions; the capture
/// manager bounds that wait with its own timeout. `poll_frame` never blocks:
/// it returns `None` whenever no new frame is available for this tick.
pub trait VideoSource {
    fn ready(&mut self) -> impl std::future::Future<Output = Result<(), SourceError>>;

    /// Reported dimensions, `None` until metadata is ready.
    fn dimensions(&self) -> Option<(u32, u32)>;

    fn poll_frame(&mut self) -> Option<FrameBuffer>;

    /// Release the underlying tracks/resources. Must be idempotent.
    fn release(&mut self);
}

/// Opens sources for capture configurations.
pub trait SourceProvider {
    type Source: VideoSource;

    fn open(
        &mut self,
        config: &CaptureConfig,
    ) -> impl std::future::Future<Output = Result<Self::Source, SourceError>>;
}

// ----------------------------------------------------------------------------
// Synthetic provider: moving-block scene
// ----------------------------------------------------------------------------

/// Scene parameters for the synthetic source.
#[derive(Clone, Debug)]
pub struct SyntheticScene {
    pub width: u32,
    pub height: u32,
    pub target_fps: u32,
    /// Horizontal block displacement per emitted frame, in pixels.
    pub block_step_px: u32,
    /// Edge length of the moving block, in pixels.
    pub block_size_px: u32,
}

impl Default for SyntheticScene {
    fn default() -> Self {
        Self {
            width: 640,
            height: 480,
            target_fps: 30,
            block_step_px: 12,
            block_size_px: 64,
        }
    }
}

/// Provider that opens synthetic sources; every configuration succeeds.
#[derive(Clone, Debug, Default)]
pub struct SyntheticProvider {
    pub scene: SyntheticScene,
}

impl SyntheticProvider {
    pub fn new(scene: SyntheticScene) -> Self {
        Self { scene }
    }
}

impl SourceProvider for SyntheticProvider {
    type Source = SyntheticSource;

    async fn open(&mut self, config: &CaptureConfig) -> Result<SyntheticSource, SourceError> {
        // ideal_width/height are hints. The synthetic device has exactly one
        // mode, like real hardware that cannot honor an ideal constraint, so
        // the configured scene geometry always wins.
        log::debug!(
            "synthetic source opened ({:?}, {}x{})",
            config.facing,
            self.scene.width,
            self.scene.height
        );
        Ok(SyntheticSource::new(self.scene.clone()))
    }
}

/// Deterministic moving-block scene with low-amplitude sensor noise.
///
/// A bright block sweeps horizontally across a dark background, wrapping at
/// the right edge. Per-channel noise stays well under the differ's change
/// threshold so only the block registers as motion.
pub struct SyntheticSource {
    scene: SyntheticScene,
    epoch: Instant,
    frame_count: u64,
    next_frame_at: Duration,
    released: bool,
}

const SCENE_BACKGROUND: [u8; 4] = [34, 38, 46, 255];
const SCENE_BLOCK: [u8; 4] = [220, 210, 90, 255];
const SCENE_NOISE_AMPLITUDE: u8 = 6;

impl SyntheticSource {
    fn new(scene: SyntheticScene) -> Self {
        Self {
            scene,
            epoch: Instant::now(),
            frame_count: 0,
            next_frame_at: Duration::ZERO,
            released: false,
        }
    }

    fn frame_interval(&self) -> Duration {
        let fps = self.scene.target_fps.max(1);
        Duration::from_secs(1) / fps
    }

    fn render(&mut self, timestamp: Duration) -> FrameBuffer {
        let mut frame =
            FrameBuffer::filled(self.scene.width, self.scene.height, SCENE_BACKGROUND, timestamp);

        let travel = self.frame_count * self.scene.block_step_px as u64;
        let span = self.scene.width.saturating_sub(self.scene.block_size_px).max(1) as u64;
        let left = (travel % span) as u32;
        let top = self.scene.height / 2 - self.scene.block_size_px.min(self.scene.height) / 2;
        frame.fill_rect(
            left,
            top,
            self.scene.block_size_px,
            self.scene.block_size_px,
            SCENE_BLOCK,
        );

        let mut rng = rand::thread_rng();
        for _ in 0..64 {
            let x = rng.gen_range(0..self.scene.width);
            let y = rng.gen_range(0..self.scene.height);
            let n = rng.gen_range(0..SCENE_NOISE_AMPLITUDE);
            frame.put_pixel(
                x,
                y,
                [
                    SCENE_BACKGROUND[0].saturating_add(n),
                    SCENE_BACKGROUND[1].saturating_add(n),
                    SCENE_BACKGROUND[2].saturating_add(n),
                    255,
                ],
            );
        }

        frame
    }
}

impl VideoSource for SyntheticSource {
    async fn ready(&mut self) -> Result<(), SourceError> {
        // Synthetic metadata is always immediately available.
        Ok(())
    }

    fn dimensions(&self) -> Option<(u32, u32)> {
        Some((self.scene.width, self.scene.height))
    }

    fn poll_frame(&mut self) -> Option<FrameBuffer> {
        if self.released {
            return None;
        }
        let now = self.epoch.elapsed();
        if now < self.next_frame_at {
            return None;
        }
        self.next_frame_at = now + self.frame_interval();
        self.frame_count += 1;
        Some(self.render(now))
    }

    fn release(&mut self) {
        self.released = true;
    }
}

// ----------------------------------------------------------------------------
// Scripted provider: replayed attempt outcomes
// ----------------------------------------------------------------------------

/// Outcome script for one acquisition attempt.
#[derive(Clone, Debug)]
pub enum AttemptScript {
    /// `open` fails with this raw error.
    Fail(SourceError),
    /// `open` never resolves; only a timeout unblocks the manager.
    HangOpen,
    /// `open` succeeds but `ready` never resolves (metadata stall).
    HangReady { width: u32, height: u32 },
    /// `open` and `ready` succeed; frames are queued by the test.
    Succeed { width: u32, height: u32 },
    /// `open` resolves successfully only after this delay. Used for
    /// cancellation tests where a stop races a slow acquisition.
    SucceedAfter {
        delay: Duration,
        width: u32,
        height: u32,
    },
}

/// Counts sources currently holding resources, so tests can assert that every
/// failed, abandoned, or cancelled attempt was released.
#[derive(Clone, Debug, Default)]
pub struct ResourceLedger(Arc<AtomicIsize>);

impl ResourceLedger {
    pub fn open_count(&self) -> isize {
        self.0.load(Ordering::SeqCst)
    }

    fn acquire(&self) {
        self.0.fetch_add(1, Ordering::SeqCst);
    }

    fn release(&self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

/// Provider that replays a fixed outcome per attempt, in order.
#[derive(Clone, Debug)]
pub struct ScriptedProvider {
    script: VecDeque<AttemptScript>,
    ledger: ResourceLedger,
    frames: VecDeque<FrameBuffer>,
}

impl ScriptedProvider {
    pub fn new(script: Vec<AttemptScript>) -> Self {
        Self {
            script: script.into(),
            ledger: ResourceLedger::default(),
            frames: VecDeque::new(),
        }
    }

    pub fn ledger(&self) -> ResourceLedger {
        self.ledger.clone()
    }

    /// Queue frames the next successful source will hand out in order.
    pub fn queue_frames(&mut self, frames: Vec<FrameBuffer>) {
        self.frames.extend(frames);
    }
}

impl SourceProvider for ScriptedProvider {
    type Source = ScriptedSource;

    async fn open(&mut self, _config: &CaptureConfig) -> Result<ScriptedSource, SourceError> {
        let step = self
            .script
            .pop_front()
            .unwrap_or_else(|| AttemptScript::Fail(SourceError::new("ENODEV", "script exhausted")));

        match step {
            AttemptScript::Fail(err) => Err(err),
            AttemptScript::HangOpen => std::future::pending().await,
            AttemptScript::HangReady { width, height } => {
                self.ledger.acquire();
                Ok(ScriptedSource {
                    dimensions: (width, height),
                    metadata_stalls: true,
                    frames: VecDeque::new(),
                    ledger: self.ledger.clone(),
                    released: false,
                })
            }
            AttemptScript::Succeed { width, height } => {
                self.ledger.acquire();
                Ok(ScriptedSource {
                    dimensions: (width, height),
                    metadata_stalls: false,
                    frames: std::mem::take(&mut self.frames),
                    ledger: self.ledger.clone(),
                    released: false,
                })
            }
            AttemptScript::SucceedAfter {
                delay,
                width,
                height,
            } => {
                tokio::time::sleep(delay).await;
                self.ledger.acquire();
                Ok(ScriptedSource {
                    dimensions: (width, height),
                    metadata_stalls: false,
                    frames: std::mem::take(&mut self.frames),
                    ledger: self.ledger.clone(),
                    released: false,
                })
            }
        }
    }
}

/// Source produced by `ScriptedProvider`.
pub struct ScriptedSource {
    dimensions: (u32, u32),
    metadata_stalls: bool,
    frames: VecDeque<FrameBuffer>,
    ledger: ResourceLedger,
    released: bool,
}

impl VideoSource for ScriptedSource {
    async fn ready(&mut self) -> Result<(), SourceError> {
        if self.metadata_stalls {
            std::future::pending().await
        } else {
            Ok(())
        }
    }

    fn dimensions(&self) -> Option<(u32, u32)> {
        Some(self.dimensions)
    }

    fn poll_frame(&mut self) -> Option<FrameBuffer> {
        if self.released {
            return None;
        }
        self.frames.pop_front()
    }

    fn release(&mut self) {
        if !self.released {
            self.released = true;
            self.ledger.release();
        }
    }
}

impl Drop for ScriptedSource {
    fn drop(&mut self) {
        self.release();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_ladder_degrades_in_specificity() {
        let ladder = CaptureConfig::default_ladder();
        assert_eq!(ladder.len(), 3);
        assert_eq!(ladder[0].facing, Facing::Rear);
        assert!(ladder[0].ideal_width.is_some());
        assert_eq!(ladder[2].facing, Facing::Any);
        assert!(ladder[2].ideal_width.is_none());
    }

    #[tokio::test]
    async fn ideal_dimensions_are_hints_not_overrides() {
        let mut provider = SyntheticProvider::new(SyntheticScene {
            width: 320,
            height: 240,
            ..SyntheticScene::default()
        });
        // Rung 0 asks for rear 1280x720; the device's one mode still wins.
        let ladder = CaptureConfig::default_ladder();
        assert_eq!(ladder[0].ideal_width, Some(1280));
        let source = provider.open(&ladder[0]).await.expect("open synthetic");
        assert_eq!(source.dimensions(), Some((320, 240)));
    }

    #[tokio::test]
    async fn synthetic_source_emits_moving_frames() {
        let mut provider = SyntheticProvider::new(SyntheticScene {
            width: 160,
            height: 120,
            target_fps: 1000,
            ..SyntheticScene::default()
        });
        let ladder = CaptureConfig::default_ladder();
        let mut source = provider.open(&ladder[2]).await.expect("open synthetic");
        source.ready().await.expect("ready");
        assert_eq!(source.dimensions(), Some((160, 120)));

        let first = source.poll_frame().expect("first frame");
        tokio::time::sleep(Duration::from_millis(5)).await;
        let second = loop {
            if let Some(frame) = source.poll_frame() {
                break frame;
            }
            tokio::time::sleep(Duration::from_millis(1)).await;
        };
        assert!(second.timestamp > first.timestamp);
        assert_ne!(first.pixels(), second.pixels());
    }

    #[tokio::test]
    async fn scripted_source_releases_into_ledger() {
        let mut provider = ScriptedProvider::new(vec![AttemptScript::Succeed {
            width: 64,
            height: 48,
        }]);
        let ledger = provider.ledger();
        let mut source = provider
            .open(&CaptureConfig::default_ladder()[0])
            .await
            .expect("open scripted");
        assert_eq!(ledger.open_count(), 1);
        source.release();
        source.release();
        assert_eq!(ledger.open_count(), 0);
    }
}
