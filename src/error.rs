use thiserror::Error;
use uuid::Uuid;

pub type Result<T> = std::result::Result<T, Error>;

/// Error taxonomy for the interview core.
///
/// The propagation policy is uneven on purpose: permission and authorization
/// failures stop forward progress immediately, upload and transcription
/// failures degrade and let the flow continue, and analysis failures surface
/// only through the operator retry path.
#[derive(Debug, Error)]
pub enum Error {
    #[error("capture permission denied: {0}")]
    PermissionDenied(String),

    #[error("not authorized: {0}")]
    Authorization(String),

    #[error("upload failed after {attempts} attempts: {reason}")]
    Upload { attempts: u32, reason: String },

    #[error("interview finalization failed: {0}")]
    Finalize(String),

    #[error("no chunks uploaded for question {question_id}")]
    NoChunks { question_id: Uuid },

    #[error("transcription failed: {0}")]
    Transcription(String),

    #[error("analysis failed: {0}")]
    Analysis(String),

    #[error("analysis response did not match the expected shape: {0}")]
    MalformedAnalysis(String),

    #[error("{kind} not found: {id}")]
    NotFound { kind: &'static str, id: String },

    #[error("invalid transition from {from} to {to}")]
    InvalidTransition { from: String, to: String },

    #[error("skip is not allowed before {min_secs}s of recording")]
    SkipTooEarly { min_secs: u64 },

    #[error("storage error: {0}")]
    Storage(String),

    #[error("i/o failure: {0}")]
    Io(#[from] std::io::Error),

    #[error("json failure: {0}")]
    Json(#[from] serde_json::Error),

    #[error("http failure: {0}")]
    Http(#[from] reqwest::Error),
}

impl Error {
    pub fn not_found(kind: &'static str, id: impl ToString) -> Self {
        Self::NotFound {
            kind,
            id: id.to_string(),
        }
    }

    /// Whether the caller may usefully retry the same operation.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::Upload { .. }
                | Self::Finalize(_)
                | Self::Transcription(_)
                | Self::Analysis(_)
                | Self::MalformedAnalysis(_)
                | Self::Http(_)
        )
    }
}
