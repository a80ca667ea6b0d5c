//! Two-stage AI pipeline: per-response transcription, then one aggregate
//! structured analysis.
//!
//! Stage one is partially failable: a response that cannot be transcribed
//! gets the sentinel marker and the batch continues. Stage two is
//! all-or-nothing: a malformed or missing report fails the invocation and
//! the interview stays `completed`, retryable by the owning operator.
//! Re-entry is idempotent: transcripts already present are kept, the
//! analysis is always recomputed and replaces any prior one.

mod analyze;
mod transcribe;

pub use analyze::{AnalysisReport, AnalysisRequest, Analyst, HttpAnalyst, QuestionReport, TranscriptEntry};
pub use transcribe::{HttpTranscriber, Transcriber};

use std::sync::Arc;

use chrono::Utc;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::assembler::ResponseAssembler;
use crate::error::{Error, Result};
use crate::model::{Analysis, InterviewStatus, QuestionAnalysis, Response};
use crate::retry::{with_retry, RetryPolicy};
use crate::store::InterviewStore;

/// Stored in place of a transcript when transcription failed, and used as
/// the stage-two placeholder for questions that never produced a response.
pub const TRANSCRIPT_FAILURE_SENTINEL: &str = "[transcription unavailable]";

/// Container the captured media is labeled with when submitted for
/// transcription; fixed by the controller's capture policy.
const MEDIA_MIME: &str = "video/webm";

/// Cheap-to-clone handle; all state lives behind one shared inner.
#[derive(Clone)]
pub struct PipelineOrchestrator {
    inner: Arc<PipelineInner>,
}

struct PipelineInner {
    store: Arc<InterviewStore>,
    assembler: Arc<ResponseAssembler>,
    transcriber: Arc<dyn Transcriber>,
    analyst: Arc<dyn Analyst>,
    retry: RetryPolicy,
}

impl PipelineOrchestrator {
    pub fn new(
        store: Arc<InterviewStore>,
        assembler: Arc<ResponseAssembler>,
        transcriber: Arc<dyn Transcriber>,
        analyst: Arc<dyn Analyst>,
        retry: RetryPolicy,
    ) -> Self {
        Self {
            inner: Arc::new(PipelineInner {
                store,
                assembler,
                transcriber,
                analyst,
                retry,
            }),
        }
    }

    /// Detached trigger used when an interview is marked completed. The
    /// completion transition never blocks on the pipeline; outcomes are
    /// observed later by reading the interview.
    pub fn schedule(&self, interview_id: Uuid) {
        let this = self.clone();
        tokio::spawn(async move {
            if let Err(e) = this.run(interview_id).await {
                error!("analysis pipeline for {} failed: {}", interview_id, e);
            }
        });
    }

    /// Manual retry, restricted to the interview's owning operator and to
    /// terminal-status interviews.
    pub async fn request_analysis(&self, interview_id: Uuid, operator_id: &str) -> Result<()> {
        let interview = self.inner.store.get(interview_id).await?;
        if interview.operator_id != operator_id {
            return Err(Error::Authorization(
                "only the owning operator may request analysis".into(),
            ));
        }
        if !interview.status.is_terminal() {
            return Err(Error::InvalidTransition {
                from: interview.status.to_string(),
                to: InterviewStatus::Analyzed.to_string(),
            });
        }
        self.run(interview_id).await
    }

    /// One full pipeline invocation.
    pub async fn run(&self, interview_id: Uuid) -> Result<()> {
        let interview = self.inner.store.get(interview_id).await?;
        if !interview.status.is_terminal() {
            return Err(Error::InvalidTransition {
                from: interview.status.to_string(),
                to: InterviewStatus::Analyzed.to_string(),
            });
        }

        self.transcribe_stage(interview_id).await?;
        self.analyze_stage(interview_id).await?;

        info!("interview {} analyzed", interview_id);
        Ok(())
    }

    /// Stage one. Responses that already carry a transcript are skipped, so
    /// re-runs only pay for what previously failed.
    async fn transcribe_stage(&self, interview_id: Uuid) -> Result<()> {
        let pending: Vec<Response> = self
            .inner
            .store
            .responses_for(interview_id)
            .await
            .into_iter()
            .filter(|r| r.transcript.is_none())
            .collect();

        for response in pending {
            let text = match self.transcribe_response(&response).await {
                Ok(text) => text,
                Err(e) => {
                    // One failed response never aborts the batch.
                    warn!(
                        "transcription for question {} failed: {}",
                        response.question_id, e
                    );
                    TRANSCRIPT_FAILURE_SENTINEL.to_string()
                }
            };
            self.inner
                .store
                .set_transcript(interview_id, response.question_id, text)
                .await?;
        }
        Ok(())
    }

    async fn transcribe_response(&self, response: &Response) -> Result<String> {
        // Concurrent fetch of all the response's chunks; any failed fetch
        // fails this response's reconstruction.
        let media = self.inner.assembler.reconstruct(response).await?;
        with_retry(&self.inner.retry, "transcription call", || {
            let media = &media;
            async move { self.inner.transcriber.transcribe(media, MEDIA_MIME).await }
        })
        .await
    }

    /// Stage two. All-or-nothing: no partial Analysis is ever written.
    async fn analyze_stage(&self, interview_id: Uuid) -> Result<()> {
        let profile = self.inner.store.profile_for_interview(interview_id).await?;
        let responses = self.inner.store.responses_for(interview_id).await;

        let entries = profile
            .questions
            .iter()
            .map(|q| TranscriptEntry {
                question_id: q.id,
                prompt: q.prompt.clone(),
                transcript: responses
                    .iter()
                    .find(|r| r.question_id == q.id)
                    .and_then(|r| r.transcript.clone())
                    .unwrap_or_else(|| TRANSCRIPT_FAILURE_SENTINEL.to_string()),
            })
            .collect();

        let request = AnalysisRequest {
            job_title: profile.title.clone(),
            job_description: profile.description.clone(),
            entries,
        };

        let report = with_retry(&self.inner.retry, "analysis call", || {
            let request = &request;
            async move { self.inner.analyst.analyze(request).await }
        })
        .await?;

        let analysis = Analysis {
            interview_id,
            overall_score: report.overall_score,
            strengths: report.strengths,
            weaknesses: report.weaknesses,
            communication_style: report.communication_style,
            confidence_level: report.confidence_level,
            skill_alignment: report.skill_alignment,
            red_flags: report.red_flags,
            summary: report.summary,
            per_question: report
                .question_analyses
                .into_iter()
                .map(|q| QuestionAnalysis {
                    question_id: q.question_id,
                    score: q.score,
                    feedback: q.feedback,
                })
                .collect(),
            generated_at: Utc::now(),
        };

        self.inner.store.upsert_analysis(analysis).await?;
        self.inner
            .store
            .advance_status(interview_id, InterviewStatus::Analyzed)
            .await?;
        Ok(())
    }
}
