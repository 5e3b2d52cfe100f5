// error.rs - error taxonomy for the batch render orchestrator

use thiserror::Error;

/// Stable, serializable classification for why a job or component operation
/// failed. Mirrors the failure taxonomy jobs record in `error_kind`.
#[derive(Error, Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum ErrorKind {
    #[error("scene path does not exist or is not readable")]
    SceneNotFound,

    #[error("no render layers specified")]
    NoRenderLayers,

    #[error("invalid frame range expression: {0}")]
    InvalidFrameRange(String),

    #[error("requested GPU id {0} is not available")]
    GpuUnavailable(u32),

    #[error("renderer executable could not be located")]
    ExecutableNotFound,

    #[error("failed to spawn renderer process: {0}")]
    SpawnFailed(String),

    #[error("renderer exited with non-zero status: {0}")]
    NonZeroExit(i32),

    #[error("renderer emitted a fatal log line: {0}")]
    RendererFatal(String),

    #[error("renderer process timed out after {0}s")]
    Timeout(u64),

    #[error("job was cancelled")]
    Cancelled,

    #[error("temp scene write failed: {0}")]
    SceneWriteFailed(String),

    #[error("internal scheduler error: {0}")]
    Internal(String),
}

/// Component-level error type. Lower layers convert into this via `#[from]`
/// where the conversion is lossless; call sites that need job-level context
/// wrap the resulting `ErrorKind` onto the job record themselves.
#[derive(Error, Debug)]
pub enum OrchestratorError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("invalid frame range expression: {0}")]
    FrameRange(String),

    #[error("context resolution error: {0}")]
    Context(String),

    #[error("temp file error: {0}")]
    TempFile(String),

    #[error("process supervisor error: {0}")]
    Process(String),

    #[error("job {0} not found")]
    JobNotFound(String),

    #[error("scheduler is shutting down")]
    ShuttingDown,

    #[error("scene host error: {0}")]
    SceneHost(String),

    #[error(transparent)]
    Job(#[from] ErrorKind),
}

pub type Result<T> = std::result::Result<T, OrchestratorError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_kind_round_trips_through_json() {
        let kind = ErrorKind::GpuUnavailable(3);
        let json = serde_json::to_string(&kind).unwrap();
        let back: ErrorKind = serde_json::from_str(&json).unwrap();
        assert_eq!(kind, back);
    }

    #[test]
    fn orchestrator_error_displays_job_error_transparently() {
        let err: OrchestratorError = ErrorKind::Cancelled.into();
        assert_eq!(err.to_string(), "job was cancelled");
    }
}
