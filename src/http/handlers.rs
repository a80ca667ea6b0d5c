use super::state::AppState;
use crate::blob::BlobRef;
use crate::error::Error;
use crate::model::{Analysis, CandidateIdentity, Interview, InterviewStatus, Question};
use axum::{
    extract::{Path, State},
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Json, Response},
};
use base64::Engine;
use serde::{Deserialize, Serialize};
use tracing::{error, info};
use uuid::Uuid;

// ============================================================================
// Request/Response Types
// ============================================================================

#[derive(Debug, Deserialize)]
pub struct StartInterviewRequest {
    pub link_token: String,
    pub name: String,
    pub email: String,
}

#[derive(Debug, Serialize)]
pub struct StartInterviewResponse {
    pub interview_id: Uuid,
    pub status: InterviewStatus,
    pub questions: Vec<Question>,
}

#[derive(Debug, Serialize)]
pub struct LinkStatusResponse {
    /// The interview behind this link, if one was created already. Resuming
    /// clients reconcile their stored session against this.
    pub interview: Option<Interview>,
}

#[derive(Debug, Deserialize)]
pub struct AppendChunkRequest {
    pub chunk_index: u32,

    /// Base64-encoded media bytes.
    pub data: String,
}

#[derive(Debug, Serialize)]
pub struct AppendChunkResponse {
    pub blob_ref: String,
    pub chunk_index: u32,
}

#[derive(Debug, Deserialize)]
pub struct FinalizeResponseRequest {
    pub duration_secs: f64,
    pub attempt: u32,

    /// Legacy single-file producers pass the blob reference they already
    /// pushed through the blob store instead of streaming chunks.
    pub blob_ref: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct FinalizeResponseResponse {
    pub question_id: Uuid,
    pub attempt: u32,
    pub blob_count: usize,
}

#[derive(Debug, Serialize)]
pub struct FinalizeInterviewResponse {
    pub interview_id: Uuid,
    pub status: InterviewStatus,
}

#[derive(Debug, Serialize)]
pub struct ResponseView {
    pub question_id: Uuid,
    pub attempt: u32,
    pub duration_secs: f64,
    pub transcript: Option<String>,
    pub urls: Vec<String>,
}

#[derive(Debug, Serialize)]
pub struct InterviewView {
    pub interview: Interview,
    pub responses: Vec<ResponseView>,
    pub analysis: Option<Analysis>,
    pub degraded_questions: Vec<Uuid>,
}

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
    pub retryable: bool,
}

fn error_response(e: Error) -> Response {
    let status = match &e {
        Error::PermissionDenied(_) | Error::Authorization(_) => StatusCode::FORBIDDEN,
        Error::NotFound { .. } => StatusCode::NOT_FOUND,
        Error::NoChunks { .. } | Error::InvalidTransition { .. } | Error::SkipTooEarly { .. } => {
            StatusCode::CONFLICT
        }
        Error::Upload { .. }
        | Error::Finalize(_)
        | Error::Transcription(_)
        | Error::Analysis(_)
        | Error::MalformedAnalysis(_)
        | Error::Http(_) => StatusCode::BAD_GATEWAY,
        Error::Storage(_) | Error::Io(_) | Error::Json(_) => StatusCode::INTERNAL_SERVER_ERROR,
    };
    let body = ErrorResponse {
        error: e.to_string(),
        retryable: e.is_retryable(),
    };
    (status, Json(body)).into_response()
}

fn bad_request(message: impl Into<String>) -> Response {
    (
        StatusCode::BAD_REQUEST,
        Json(ErrorResponse {
            error: message.into(),
            retryable: false,
        }),
    )
        .into_response()
}

/// Candidate input is rejected once the interview is terminal.
async fn reject_terminal(state: &AppState, interview_id: Uuid) -> Result<(), Response> {
    let interview = state
        .store
        .get(interview_id)
        .await
        .map_err(error_response)?;
    if interview.status.is_terminal() {
        return Err(error_response(Error::InvalidTransition {
            from: interview.status.to_string(),
            to: InterviewStatus::InProgress.to_string(),
        }));
    }
    Ok(())
}

fn operator_id(headers: &HeaderMap) -> Result<String, Response> {
    headers
        .get("x-operator-id")
        .and_then(|v| v.to_str().ok())
        .map(str::to_string)
        .ok_or_else(|| {
            error_response(Error::Authorization(
                "missing operator identity header".into(),
            ))
        })
}

// ============================================================================
// Candidate-facing handlers
// ============================================================================

/// POST /interviews/start
/// Start (or resume) the interview behind a link token
pub async fn start_interview(
    State(state): State<AppState>,
    Json(req): Json<StartInterviewRequest>,
) -> impl IntoResponse {
    let identity = CandidateIdentity {
        name: req.name,
        email: req.email,
    };

    let interview = match state.store.start_interview(&req.link_token, identity).await {
        Ok(i) => i,
        Err(e) => return error_response(e),
    };

    let profile = match state.store.profile_for_interview(interview.id).await {
        Ok(p) => p,
        Err(e) => return error_response(e),
    };

    info!("interview {} running for link {}", interview.id, req.link_token);

    (
        StatusCode::OK,
        Json(StartInterviewResponse {
            interview_id: interview.id,
            status: interview.status,
            questions: profile.questions,
        }),
    )
        .into_response()
}

/// GET /links/:token
/// Server truth for a link, consumed by session reconciliation
pub async fn link_status(
    State(state): State<AppState>,
    Path(token): Path<String>,
) -> impl IntoResponse {
    let interview = state.store.interview_for_link(&token).await;
    (StatusCode::OK, Json(LinkStatusResponse { interview })).into_response()
}

/// POST /interviews/:id/questions/:question_id/chunks
/// Upload one media chunk; idempotent per chunk index
pub async fn append_chunk(
    State(state): State<AppState>,
    Path((interview_id, question_id)): Path<(Uuid, Uuid)>,
    Json(req): Json<AppendChunkRequest>,
) -> impl IntoResponse {
    if let Err(response) = reject_terminal(&state, interview_id).await {
        return response;
    }

    let bytes = match base64::engine::general_purpose::STANDARD.decode(&req.data) {
        Ok(b) => b,
        Err(e) => return bad_request(format!("chunk data is not valid base64: {}", e)),
    };

    match state
        .assembler
        .upload_chunk(interview_id, question_id, req.chunk_index, bytes)
        .await
    {
        Ok(blob) => (
            StatusCode::OK,
            Json(AppendChunkResponse {
                blob_ref: blob.0,
                chunk_index: req.chunk_index,
            }),
        )
            .into_response(),
        Err(e) => {
            error!("chunk upload failed: {}", e);
            error_response(e)
        }
    }
}

/// POST /interviews/:id/questions/:question_id/finalize
/// Bind the uploaded chunks (or a single pre-uploaded blob) into the
/// question's response, purging earlier attempts
pub async fn finalize_response(
    State(state): State<AppState>,
    Path((interview_id, question_id)): Path<(Uuid, Uuid)>,
    Json(req): Json<FinalizeResponseRequest>,
) -> impl IntoResponse {
    if let Err(response) = reject_terminal(&state, interview_id).await {
        return response;
    }

    if req.attempt > 1 {
        let profile = match state.store.profile_for_interview(interview_id).await {
            Ok(p) => p,
            Err(e) => return error_response(e),
        };
        let allowed = profile
            .questions
            .iter()
            .find(|q| q.id == question_id)
            .map(|q| q.allow_retake)
            .unwrap_or(false);
        if !allowed {
            return error_response(Error::Authorization(
                "retakes are not allowed for this question".into(),
            ));
        }
    }

    let result = match req.blob_ref {
        Some(blob_ref) => {
            state
                .assembler
                .finalize_single(
                    interview_id,
                    question_id,
                    BlobRef(blob_ref),
                    req.duration_secs,
                    req.attempt,
                )
                .await
        }
        None => {
            state
                .assembler
                .finalize(interview_id, question_id, req.duration_secs, req.attempt)
                .await
        }
    };

    match result {
        Ok(response) => (
            StatusCode::OK,
            Json(FinalizeResponseResponse {
                question_id,
                attempt: response.attempt,
                blob_count: response.blobs.len(),
            }),
        )
            .into_response(),
        Err(e) => error_response(e),
    }
}

/// POST /interviews/:id/finalize
/// Mark the interview completed and schedule the analysis pipeline
pub async fn finalize_interview(
    State(state): State<AppState>,
    Path(interview_id): Path<Uuid>,
) -> impl IntoResponse {
    if let Err(e) = state
        .store
        .advance_status(interview_id, InterviewStatus::Completed)
        .await
    {
        error!("interview finalization failed: {}", e);
        return error_response(e);
    }

    // Detached: the candidate flow never waits on the pipeline.
    state.orchestrator.schedule(interview_id);

    (
        StatusCode::OK,
        Json(FinalizeInterviewResponse {
            interview_id,
            status: InterviewStatus::Completed,
        }),
    )
        .into_response()
}

// ============================================================================
// Operator-facing handlers
// ============================================================================

/// POST /interviews/:id/analysis
/// Re-run the analysis pipeline; owning operator only
pub async fn request_analysis(
    State(state): State<AppState>,
    Path(interview_id): Path<Uuid>,
    headers: HeaderMap,
) -> impl IntoResponse {
    let operator = match operator_id(&headers) {
        Ok(op) => op,
        Err(response) => return response,
    };

    match state
        .orchestrator
        .request_analysis(interview_id, &operator)
        .await
    {
        Ok(()) => (
            StatusCode::OK,
            Json(FinalizeInterviewResponse {
                interview_id,
                status: InterviewStatus::Analyzed,
            }),
        )
            .into_response(),
        Err(e) => error_response(e),
    }
}

/// GET /interviews/:id
/// Full interview view: responses with fetchable URLs, plus the analysis
/// when one exists
pub async fn read_interview(
    State(state): State<AppState>,
    Path(interview_id): Path<Uuid>,
    headers: HeaderMap,
) -> impl IntoResponse {
    let operator = match operator_id(&headers) {
        Ok(op) => op,
        Err(response) => return response,
    };

    let interview = match state.store.get(interview_id).await {
        Ok(i) => i,
        Err(e) => return error_response(e),
    };
    if interview.operator_id != operator {
        return error_response(Error::Authorization(
            "interview belongs to a different operator".into(),
        ));
    }

    let mut responses = Vec::new();
    for r in state.store.responses_for(interview_id).await {
        let mut urls = Vec::with_capacity(r.blobs.len());
        for blob in &r.blobs {
            match state.blobs.fetch_url(blob).await {
                Ok(url) => urls.push(url),
                Err(e) => return error_response(e),
            }
        }
        responses.push(ResponseView {
            question_id: r.question_id,
            attempt: r.attempt,
            duration_secs: r.duration_secs,
            transcript: r.transcript,
            urls,
        });
    }

    let view = InterviewView {
        analysis: state.store.analysis(interview_id).await,
        degraded_questions: state.store.degraded_questions(interview_id).await,
        interview,
        responses,
    };

    (StatusCode::OK, Json(view)).into_response()
}

/// GET /health
/// Health check endpoint
pub async fn health_check() -> impl IntoResponse {
    (StatusCode::OK, "OK")
}
