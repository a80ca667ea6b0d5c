use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::blob::BlobRef;

/// Lifecycle status of an interview. Strictly monotonic: the store rejects
/// any transition to an earlier variant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InterviewStatus {
    Pending,
    InProgress,
    Completed,
    Analyzed,
}

impl InterviewStatus {
    /// Completed and analyzed interviews accept no further candidate input.
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Analyzed)
    }
}

impl std::fmt::Display for InterviewStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Pending => "pending",
            Self::InProgress => "in_progress",
            Self::Completed => "completed",
            Self::Analyzed => "analyzed",
        };
        f.write_str(s)
    }
}

/// Candidate name/email as entered on the intro screen.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CandidateIdentity {
    pub name: String,
    pub email: String,
}

impl CandidateIdentity {
    pub fn is_complete(&self) -> bool {
        !self.name.trim().is_empty() && !self.email.trim().is_empty()
    }
}

/// One candidate's end-to-end session against a job link.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Interview {
    pub id: Uuid,

    /// The link token the candidate followed.
    pub link_token: String,

    /// Operator who owns the job link (and may request analysis).
    pub operator_id: String,

    /// Unset until the candidate starts the interview.
    pub candidate: Option<CandidateIdentity>,

    pub status: InterviewStatus,

    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
}

/// A single interview question as authored on the job profile.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Question {
    pub id: Uuid,

    pub prompt: String,

    /// Per-question override of the default answer time limit.
    pub time_limit_secs: Option<u64>,

    pub allow_retake: bool,

    /// Supplementary context shown when the candidate asks to elaborate.
    pub elaboration: Option<String>,

    /// Per-question override of the one-time elaborate extension.
    pub extension_secs: Option<u64>,
}

impl Question {
    pub fn new(prompt: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            prompt: prompt.into(),
            time_limit_secs: None,
            allow_retake: false,
            elaboration: None,
            extension_secs: None,
        }
    }
}

/// Job metadata handed over by the (external) job-profile authoring side.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobProfile {
    pub title: String,
    pub description: String,
    pub questions: Vec<Question>,
}

/// Transient row for one uploaded chunk, unique per
/// (interview, question, chunk_index). Deleted on finalize.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChunkRow {
    pub interview_id: Uuid,
    pub question_id: Uuid,
    pub chunk_index: u32,
    pub blob: BlobRef,
    pub uploaded_at: DateTime<Utc>,
}

/// The finalized recording for one question and attempt.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Response {
    pub interview_id: Uuid,
    pub question_id: Uuid,

    /// Retake counter; only the highest attempt survives finalize.
    pub attempt: u32,

    /// Ordered blob references, ascending by original chunk index.
    pub blobs: Vec<BlobRef>,

    pub duration_secs: f64,

    /// Filled in by the transcription stage; the sentinel marker when
    /// transcription failed for this response.
    pub transcript: Option<String>,

    pub created_at: DateTime<Utc>,
}

/// Per-question slice of the aggregate analysis.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QuestionAnalysis {
    pub question_id: Uuid,
    pub score: f32,
    pub feedback: String,
}

/// The single AI-produced scoring/feedback record per interview.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Analysis {
    pub interview_id: Uuid,
    pub overall_score: f32,
    pub strengths: Vec<String>,
    pub weaknesses: Vec<String>,
    pub communication_style: String,
    pub confidence_level: String,
    pub skill_alignment: String,
    pub red_flags: Vec<String>,
    pub summary: String,
    pub per_question: Vec<QuestionAnalysis>,
    pub generated_at: DateTime<Utc>,
}
