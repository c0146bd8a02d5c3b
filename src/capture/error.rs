//! Capture failure taxonomy.
//!
//! The capture manager is the only component with real failure modes, and its
//! callers need to branch on *why* acquisition failed (to pick the right
//! operator remedy), so failures carry a closed `CaptureErrorKind` rather than
//! an opaque error chain. Classification inspects the identifying code and
//! message text of the last failed attempt.

use thiserror::Error;

/// Raw failure reported by a source provider for one acquisition attempt.
///
/// `code` is the provider's identifying signal (an errno-style or driver error
/// name such as `EACCES`, `EBUSY`, `ENODEV`); `message` is free text. Both
/// feed classification.
#[derive(Clone, Debug, Error)]
#[error("{code}: {message}")]
pub struct SourceError {
    pub code: String,
    pub message: String,
}

impl SourceError {
    pub fn new(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            message: message.into(),
        }
    }
}

/// Terminal classification of an exhausted start sequence.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Error)]
pub enum CaptureErrorKind {
    #[error("permission denied")]
    PermissionDenied,
    #[error("device not found")]
    DeviceNotFound,
    #[error("device in use")]
    DeviceInUse,
    #[error("acquisition timeout")]
    AcquisitionTimeout,
    #[error("capture failed")]
    Generic,
}

impl CaptureErrorKind {
    /// Operator-facing remedy text shown next to the retry control.
    pub fn remedy(&self) -> &'static str {
        match self {
            CaptureErrorKind::PermissionDenied => {
                "Camera access was declined. Re-grant camera permissions and retry."
            }
            CaptureErrorKind::DeviceNotFound => {
                "No matching camera was found. Check that the hardware is connected."
            }
            CaptureErrorKind::DeviceInUse => {
                "Another application is currently using the camera. Close it and retry."
            }
            CaptureErrorKind::AcquisitionTimeout => {
                "The camera hardware failed to respond in time. Retry, possibly with a different configuration."
            }
            CaptureErrorKind::Generic => "The optical link could not be established. Retry.",
        }
    }
}

/// Classified capture failure. Produced only when every configuration attempt
/// in the ladder has failed; per-attempt failures stay local to the manager.
#[derive(Clone, Debug, Error)]
#[error("{kind}: {detail}")]
pub struct CaptureError {
    pub kind: CaptureErrorKind,
    pub detail: String,
}

impl CaptureError {
    pub fn timeout(detail: impl Into<String>) -> Self {
        Self {
            kind: CaptureErrorKind::AcquisitionTimeout,
            detail: detail.into(),
        }
    }

    /// Classify the last attempt's raw failure into exactly one kind.
    pub fn classify(last: &SourceError) -> Self {
        let code = last.code.to_ascii_lowercase();
        let message = last.message.to_ascii_lowercase();
        let matches = |needle: &str| code.contains(needle) || message.contains(needle);

        let kind = if matches("eacces") || matches("permission") || matches("denied") {
            CaptureErrorKind::PermissionDenied
        } else if matches("enodev") || matches("not found") || matches("no such device") {
            CaptureErrorKind::DeviceNotFound
        } else if matches("ebusy") || matches("in use") || matches("could not start") {
            CaptureErrorKind::DeviceInUse
        } else if matches("etimedout") || matches("timeout") || matches("timed out") {
            CaptureErrorKind::AcquisitionTimeout
        } else {
            CaptureErrorKind::Generic
        };

        Self {
            kind,
            detail: last.message.clone(),
        }
    }
}
