use thiserror::Error;

/// Why a frame produced nothing to classify.
#[derive(Error, Debug)]
pub enum RecognitionFailure {
    #[error("no faces detected")]
    NoFaces,
    #[error("no valid faces detected")]
    NoQualifyingFaces,
    #[error("inference timed out")]
    Timeout,
    #[error("inference failed: {0}")]
    Inference(anyhow::Error),
}

/// Failure of one recognition, geofence, training or boundary operation.
///
/// Duplicate attendance is not represented here; it surfaces as
/// `AttendanceStatus::AlreadyMarked`.
#[derive(Error, Debug)]
pub enum ProcessError {
    #[error("{0}")]
    Input(String),
    #[error("unknown user: {0}")]
    UnknownUser(String),
    #[error(transparent)]
    Recognition(#[from] RecognitionFailure),
    #[error("store error: {0}")]
    Store(anyhow::Error),
    #[error("internal error: {0}")]
    Internal(anyhow::Error),
}

impl ProcessError {
    pub fn input(msg: impl Into<String>) -> Self {
        ProcessError::Input(msg.into())
    }

    pub fn store(err: impl Into<anyhow::Error>) -> Self {
        ProcessError::Store(err.into())
    }

    pub fn internal(err: impl Into<anyhow::Error>) -> Self {
        ProcessError::Internal(err.into())
    }
}

impl From<r2d2::Error> for ProcessError {
    fn from(e: r2d2::Error) -> Self {
        ProcessError::Store(e.into())
    }
}

impl From<tokio::task::JoinError> for ProcessError {
    fn from(e: tokio::task::JoinError) -> Self {
        ProcessError::Internal(e.into())
    }
}
