//! Capture lifecycle management.
//!
//! The capture manager owns the one live video source: it acquires a source
//! with graceful degradation across a ladder of configuration requests,
//! exposes the current status, and tears the session down deterministically.
//!
//! State machine:
//!
//! ```text
//! Idle -> Acquiring -> Active -> Idle        (stop)
//!            |
//!            +-> Failed -> Idle              (exhaustion; manual retry re-enters Acquiring)
//! ```
//!
//! Acquisition is the only suspending operation in the crate. Each attempt is
//! bounded by two independent timeouts (the acquisition call itself, and the
//! wait for usable dimensions) and every failed or abandoned attempt releases
//! its partially-opened resources before the next rung is tried. A stop or
//! restart during a pending acquisition bumps a generation counter; an attempt
//! that resolves against a stale generation is discarded and released instead
//! of silently becoming Active.

pub mod error;
pub mod source;

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use crate::frame::FrameBuffer;

pub use error::{CaptureError, CaptureErrorKind, SourceError};
pub use source::{
    AttemptScript, CaptureConfig, Facing, ResourceLedger, ScriptedProvider, SourceProvider,
    SyntheticProvider, SyntheticScene, VideoSource,
};

/// Bound on one acquisition call.
pub const ACQUIRE_TIMEOUT: Duration = Duration::from_secs(8);
/// Bound on the wait for the source to report usable dimensions.
pub const METADATA_TIMEOUT: Duration = Duration::from_secs(5);

/// Where the capture manager currently stands.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CaptureStatus {
    Idle,
    Acquiring,
    Active { width: u32, height: u32 },
    Failed(CaptureErrorKind),
}

/// One open video source. Exactly one exists at a time, owned by the manager.
pub struct CaptureSession<S> {
    source: S,
    width: u32,
    height: u32,
}

impl<S: VideoSource> CaptureSession<S> {
    pub fn dimensions(&self) -> (u32, u32) {
        (self.width, self.height)
    }
}

/// Handle for interrupting a pending acquisition from outside the `start()`
/// call. Bumping the generation does not release anything by itself; the
/// pending attempt notices the stale generation and releases its own
/// resources before committing.
#[derive(Clone, Debug)]
pub struct CancelHandle(Arc<AtomicU64>);

impl CancelHandle {
    pub fn cancel(&self) {
        self.0.fetch_add(1, Ordering::SeqCst);
    }
}

pub struct CaptureManager<P: SourceProvider> {
    provider: P,
    ladder: Vec<CaptureConfig>,
    status: CaptureStatus,
    session: Option<CaptureSession<P::Source>>,
    generation: Arc<AtomicU64>,
    acquire_timeout: Duration,
    metadata_timeout: Duration,
}

impl<P: SourceProvider> CaptureManager<P> {
    pub fn new(provider: P) -> Self {
        Self::with_ladder(provider, CaptureConfig::default_ladder())
    }

    pub fn with_ladder(provider: P, ladder: Vec<CaptureConfig>) -> Self {
        Self {
            provider,
            ladder,
            status: CaptureStatus::Idle,
            session: None,
            generation: Arc::new(AtomicU64::new(0)),
            acquire_timeout: ACQUIRE_TIMEOUT,
            metadata_timeout: METADATA_TIMEOUT,
        }
    }

    /// Shrink the per-attempt timeouts. Test harnesses only; production keeps
    /// the 8 s / 5 s bounds.
    pub fn with_timeouts(mut self, acquire: Duration, metadata: Duration) -> Self {
        self.acquire_timeout = acquire;
        self.metadata_timeout = metadata;
        self
    }

    pub fn status(&self) -> CaptureStatus {
        self.status
    }

    pub fn is_active(&self) -> bool {
        matches!(self.status, CaptureStatus::Active { .. })
    }

    pub fn cancel_handle(&self) -> CancelHandle {
        CancelHandle(Arc::clone(&self.generation))
    }

    /// Acquire a source, walking the configuration ladder most-preferred
    /// first. The first attempt that succeeds becomes Active. If every rung
    /// fails, the last failure is classified and the manager lands in
    /// `Failed`; each per-attempt failure stays local and never aborts the
    /// sequence early.
    pub async fn start(&mut self) -> Result<(), CaptureError> {
        // Starting always tears down any prior session first.
        self.teardown_session();
        let generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
        self.status = CaptureStatus::Acquiring;

        let ladder = self.ladder.clone();
        let mut last_failure: Option<SourceError> = None;

        for (rung, config) in ladder.iter().enumerate() {
            if self.cancelled(generation) {
                log::info!("capture start cancelled before rung {rung}");
                self.status = CaptureStatus::Idle;
                return Ok(());
            }

            match self.attempt(config).await {
                Ok(mut source) => {
                    if self.cancelled(generation) {
                        // Late success after a stop/restart request: the user
                        // believes the system idle, so discard and release.
                        log::info!("discarding acquisition that resolved after stop");
                        source.release();
                        self.status = CaptureStatus::Idle;
                        return Ok(());
                    }
                    let Some((width, height)) = source.dimensions() else {
                        source.release();
                        last_failure =
                            Some(SourceError::new("EIO", "source reported no usable dimensions"));
                        continue;
                    };
                    log::info!("capture active at {width}x{height} (ladder rung {rung})");
                    self.session = Some(CaptureSession {
                        source,
                        width,
                        height,
                    });
                    self.status = CaptureStatus::Active { width, height };
                    return Ok(());
                }
                Err(failure) => {
                    log::warn!("capture attempt {rung} ({:?}) failed: {failure}", config.facing);
                    last_failure = Some(failure);
                }
            }
        }

        if self.cancelled(generation) {
            // Stop arrived while the last attempt was in flight; the user
            // asked for Idle, not a failure report.
            log::info!("capture start cancelled during final attempt");
            self.status = CaptureStatus::Idle;
            return Ok(());
        }

        let error = match &last_failure {
            Some(raw) => CaptureError::classify(raw),
            None => CaptureError {
                kind: CaptureErrorKind::Generic,
                detail: "no capture configurations to attempt".to_string(),
            },
        };
        log::error!("capture start exhausted all attempts: {error}");
        self.status = CaptureStatus::Failed(error.kind);
        Err(error)
    }

    /// Release the active source and return to Idle. No-op when already Idle.
    /// Also invalidates any acquisition still in flight.
    pub fn stop(&mut self) {
        self.generation.fetch_add(1, Ordering::SeqCst);
        self.teardown_session();
        self.status = CaptureStatus::Idle;
    }

    /// Non-blocking frame poll. `None` when idle or when the source has no
    /// new frame this tick; the caller simply skips the tick.
    pub fn poll_frame(&mut self) -> Option<FrameBuffer> {
        self.session.as_mut()?.source.poll_frame()
    }

    pub fn active_dimensions(&self) -> Option<(u32, u32)> {
        self.session.as_ref().map(CaptureSession::dimensions)
    }

    fn cancelled(&self, generation: u64) -> bool {
        self.generation.load(Ordering::SeqCst) != generation
    }

    fn teardown_session(&mut self) {
        if let Some(mut session) = self.session.take() {
            session.source.release();
        }
    }

    /// One rung of the ladder: open under the acquisition timeout, then wait
    /// for metadata under its own timeout. Any partially-opened source is
    /// released on the failure paths.
    async fn attempt(&mut self, config: &CaptureConfig) -> Result<P::Source, SourceError> {
        let open = self.provider.open(config);
        let mut source = match tokio::time::timeout(self.acquire_timeout, open).await {
            Ok(Ok(source)) => source,
            Ok(Err(err)) => return Err(err),
            Err(_) => return Err(SourceError::new("ETIMEDOUT", "Timeout starting video source")),
        };

        match tokio::time::timeout(self.metadata_timeout, source.ready()).await {
            Ok(Ok(())) => Ok(source),
            Ok(Err(err)) => {
                source.release();
                Err(err)
            }
            Err(_) => {
                source.release();
                Err(SourceError::new(
                    "ETIMEDOUT",
                    "Timeout waiting for video metadata",
                ))
            }
        }
    }
}

impl<P: SourceProvider> Drop for CaptureManager<P> {
    fn drop(&mut self) {
        self.teardown_session();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn failing(code: &str, message: &str) -> AttemptScript {
        AttemptScript::Fail(SourceError::new(code, message))
    }

    #[tokio::test]
    async fn first_successful_rung_becomes_active() {
        let provider = ScriptedProvider::new(vec![
            failing("EBUSY", "device held by another consumer"),
            AttemptScript::Succeed {
                width: 320,
                height: 240,
            },
        ]);
        let ledger = provider.ledger();
        let mut manager = CaptureManager::new(provider);

        manager.start().await.expect("start succeeds on rung 1");
        assert_eq!(
            manager.status(),
            CaptureStatus::Active {
                width: 320,
                height: 240
            }
        );
        assert_eq!(ledger.open_count(), 1);

        manager.stop();
        assert_eq!(manager.status(), CaptureStatus::Idle);
        assert_eq!(ledger.open_count(), 0);
        // stop when already Idle is a no-op
        manager.stop();
        assert_eq!(manager.status(), CaptureStatus::Idle);
    }

    #[tokio::test]
    async fn exhaustion_classifies_last_failure() {
        let provider = ScriptedProvider::new(vec![
            failing("EIO", "generic failure"),
            failing("EIO", "generic failure"),
            failing("EBUSY", "Could not start video source"),
        ]);
        let ledger = provider.ledger();
        let mut manager = CaptureManager::new(provider);

        let err = manager.start().await.expect_err("all rungs fail");
        assert_eq!(err.kind, CaptureErrorKind::DeviceInUse);
        assert_eq!(
            manager.status(),
            CaptureStatus::Failed(CaptureErrorKind::DeviceInUse)
        );
        assert_eq!(ledger.open_count(), 0);
    }

    #[tokio::test]
    async fn failed_state_allows_manual_retry() {
        let provider = ScriptedProvider::new(vec![
            failing("EACCES", "permission denied"),
            failing("EACCES", "permission denied"),
            failing("EACCES", "permission denied"),
            AttemptScript::Succeed {
                width: 640,
                height: 480,
            },
        ]);
        let mut manager = CaptureManager::new(provider);

        let err = manager.start().await.expect_err("first start fails");
        assert_eq!(err.kind, CaptureErrorKind::PermissionDenied);

        manager.start().await.expect("retry succeeds");
        assert!(manager.is_active());
    }

    #[tokio::test(start_paused = true)]
    async fn hung_acquisition_times_out_and_falls_through() {
        let provider = ScriptedProvider::new(vec![
            AttemptScript::HangOpen,
            AttemptScript::Succeed {
                width: 640,
                height: 480,
            },
        ]);
        let mut manager = CaptureManager::new(provider);

        manager.start().await.expect("second rung succeeds");
        assert!(manager.is_active());
    }

    #[tokio::test(start_paused = true)]
    async fn metadata_stall_releases_the_partial_source() {
        let provider = ScriptedProvider::new(vec![
            AttemptScript::HangReady {
                width: 640,
                height: 480,
            },
            failing("EIO", "fell through"),
            failing("EIO", "operation timed out"),
        ]);
        let ledger = provider.ledger();
        let mut manager = CaptureManager::new(provider);

        let err = manager.start().await.expect_err("exhausted");
        assert_eq!(err.kind, CaptureErrorKind::AcquisitionTimeout);
        assert_eq!(ledger.open_count(), 0, "stalled source must be released");
    }

    #[tokio::test(start_paused = true)]
    async fn cancel_during_a_failing_final_attempt_lands_idle() {
        // A single-rung ladder whose attempt hangs until the acquisition
        // timeout; the cancel arrives mid-attempt, so exhaustion must report
        // Idle, not Failed.
        let provider = ScriptedProvider::new(vec![AttemptScript::HangOpen]);
        let ladder = vec![CaptureConfig {
            facing: Facing::Any,
            ideal_width: None,
            ideal_height: None,
        }];
        let mut manager = CaptureManager::with_ladder(provider, ladder);
        let handle = manager.cancel_handle();

        let (result, ()) = tokio::join!(manager.start(), async {
            tokio::time::sleep(Duration::from_millis(50)).await;
            handle.cancel();
        });

        result.expect("cancelled start is not an error");
        assert_eq!(manager.status(), CaptureStatus::Idle);
    }

    #[tokio::test(start_paused = true)]
    async fn cancelled_start_discards_a_late_success() {
        let provider = ScriptedProvider::new(vec![AttemptScript::SucceedAfter {
            delay: Duration::from_millis(200),
            width: 640,
            height: 480,
        }]);
        let ledger = provider.ledger();
        let mut manager = CaptureManager::new(provider);
        let handle = manager.cancel_handle();

        let (result, ()) = tokio::join!(manager.start(), async {
            tokio::time::sleep(Duration::from_millis(50)).await;
            handle.cancel();
        });

        result.expect("cancelled start is not an error");
        assert_eq!(manager.status(), CaptureStatus::Idle);
        assert_eq!(ledger.open_count(), 0, "late success must be released");
    }
}
