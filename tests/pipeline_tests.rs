// Integration tests for the two-stage analysis pipeline
//
// Stage one must isolate per-response transcription failures behind the
// sentinel marker; stage two must be all-or-nothing and idempotent across
// re-runs.

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use uuid::Uuid;
use vetview::pipeline::{AnalysisRequest, QuestionReport};
use vetview::{
    AnalysisReport, Analyst, CandidateIdentity, Error, InterviewStatus, InterviewStore,
    JobProfile, MemoryBlobStore, PipelineOrchestrator, Question, ResponseAssembler, RetryPolicy,
    Transcriber, TRANSCRIPT_FAILURE_SENTINEL,
};

// ----------------------------------------------------------------------
// Test doubles
// ----------------------------------------------------------------------

/// Echoes media bytes back as the transcript; fails when the media contains
/// the configured marker.
struct CountingTranscriber {
    calls: AtomicU32,
    fail_marker: Option<&'static [u8]>,
}

impl CountingTranscriber {
    fn new(fail_marker: Option<&'static [u8]>) -> Self {
        Self {
            calls: AtomicU32::new(0),
            fail_marker,
        }
    }

    fn calls(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Transcriber for CountingTranscriber {
    async fn transcribe(&self, media: &[u8], _mime: &str) -> vetview::Result<String> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Some(marker) = self.fail_marker {
            if media.windows(marker.len()).any(|w| w == marker) {
                return Err(Error::Transcription("decoder crashed".into()));
            }
        }
        Ok(String::from_utf8_lossy(media).into_owned())
    }
}

struct CountingAnalyst {
    calls: AtomicU32,
    malformed: bool,
}

impl CountingAnalyst {
    fn new(malformed: bool) -> Self {
        Self {
            calls: AtomicU32::new(0),
            malformed,
        }
    }

    fn calls(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Analyst for CountingAnalyst {
    async fn analyze(&self, request: &AnalysisRequest) -> vetview::Result<AnalysisReport> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.malformed {
            return Err(Error::MalformedAnalysis("missing overall_score".into()));
        }
        Ok(AnalysisReport {
            overall_score: 68.0,
            strengths: vec!["structured answers".into()],
            weaknesses: vec!["little detail on testing".into()],
            communication_style: "measured".into(),
            confidence_level: "medium".into(),
            skill_alignment: "adequate".into(),
            red_flags: vec![],
            summary: "viable candidate".into(),
            question_analyses: request
                .entries
                .iter()
                .map(|e| QuestionReport {
                    question_id: e.question_id,
                    score: if e.transcript == TRANSCRIPT_FAILURE_SENTINEL {
                        0.0
                    } else {
                        75.0
                    },
                    feedback: format!("from transcript: {}", e.transcript),
                })
                .collect(),
        })
    }
}

// ----------------------------------------------------------------------
// Harness
// ----------------------------------------------------------------------

struct Harness {
    store: Arc<InterviewStore>,
    orchestrator: PipelineOrchestrator,
    transcriber: Arc<CountingTranscriber>,
    analyst: Arc<CountingAnalyst>,
    interview_id: Uuid,
    question_ids: Vec<Uuid>,
}

/// A completed three-question interview with distinct media per answer.
/// Question 0's media carries the "broken" marker for failure tests.
async fn completed_interview(
    transcriber: Arc<CountingTranscriber>,
    analyst: Arc<CountingAnalyst>,
) -> Result<Harness> {
    let store = Arc::new(InterviewStore::new());
    let assembler = Arc::new(ResponseAssembler::new(
        Arc::clone(&store),
        Arc::new(MemoryBlobStore::new()),
        RetryPolicy {
            max_attempts: 2,
            initial_backoff_ms: 1,
            max_backoff_ms: 1,
        },
    ));
    let orchestrator = PipelineOrchestrator::new(
        Arc::clone(&store),
        Arc::clone(&assembler),
        Arc::clone(&transcriber) as Arc<dyn Transcriber>,
        Arc::clone(&analyst) as Arc<dyn Analyst>,
        RetryPolicy {
            max_attempts: 2,
            initial_backoff_ms: 1,
            max_backoff_ms: 1,
        },
    );

    let questions = vec![
        Question::new("One"),
        Question::new("Two"),
        Question::new("Three"),
    ];
    let question_ids: Vec<Uuid> = questions.iter().map(|q| q.id).collect();

    store
        .register_link(
            "link-1",
            "op-1",
            JobProfile {
                title: "Backend Engineer".into(),
                description: "Rust services".into(),
                questions,
            },
        )
        .await;
    let interview = store
        .start_interview(
            "link-1",
            CandidateIdentity {
                name: "Ada".into(),
                email: "ada@example.com".into(),
            },
        )
        .await?;

    let answers: [&[u8]; 3] = [b"broken answer one", b"answer two", b"answer three"];
    for (question_id, media) in question_ids.iter().zip(answers) {
        assembler
            .upload_chunk(interview.id, *question_id, 0, media.to_vec())
            .await?;
        assembler.finalize(interview.id, *question_id, 20.0, 1).await?;
    }

    store
        .advance_status(interview.id, InterviewStatus::Completed)
        .await?;

    Ok(Harness {
        store,
        orchestrator,
        transcriber,
        analyst,
        interview_id: interview.id,
        question_ids,
    })
}

// ----------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------

#[tokio::test]
async fn run_transcribes_analyzes_and_advances_status() -> Result<()> {
    let h = completed_interview(
        Arc::new(CountingTranscriber::new(None)),
        Arc::new(CountingAnalyst::new(false)),
    )
    .await?;

    h.orchestrator.run(h.interview_id).await?;

    let interview = h.store.get(h.interview_id).await?;
    assert_eq!(interview.status, InterviewStatus::Analyzed);

    let responses = h.store.responses_for(h.interview_id).await;
    assert!(responses
        .iter()
        .all(|r| r.transcript.as_deref().map_or(false, |t| t.contains("answer"))));

    let analysis = h.store.analysis(h.interview_id).await.expect("analysis");
    assert_eq!(analysis.per_question.len(), 3);
    assert_eq!(analysis.overall_score, 68.0);

    Ok(())
}

#[tokio::test]
async fn second_run_replaces_analysis_without_retranscribing() -> Result<()> {
    let h = completed_interview(
        Arc::new(CountingTranscriber::new(None)),
        Arc::new(CountingAnalyst::new(false)),
    )
    .await?;

    h.orchestrator.run(h.interview_id).await?;
    assert_eq!(h.transcriber.calls(), 3);

    h.orchestrator.run(h.interview_id).await?;

    // Transcripts already present were not re-transcribed; the analysis was
    // recomputed and replaced.
    assert_eq!(h.transcriber.calls(), 3);
    assert_eq!(h.analyst.calls(), 2);

    let analysis = h.store.analysis(h.interview_id).await.expect("analysis");
    assert_eq!(analysis.per_question.len(), 3, "still exactly one analysis");

    Ok(())
}

/// Transcription failing for one response stores the sentinel and the batch
/// continues; the analysis derives that question from the placeholder.
#[tokio::test]
async fn transcription_failure_is_isolated_per_response() -> Result<()> {
    let h = completed_interview(
        Arc::new(CountingTranscriber::new(Some(b"broken"))),
        Arc::new(CountingAnalyst::new(false)),
    )
    .await?;

    h.orchestrator.run(h.interview_id).await?;

    let responses = h.store.responses_for(h.interview_id).await;
    let transcript_of = |id: Uuid| {
        responses
            .iter()
            .find(|r| r.question_id == id)
            .and_then(|r| r.transcript.clone())
            .unwrap()
    };
    assert_eq!(transcript_of(h.question_ids[0]), TRANSCRIPT_FAILURE_SENTINEL);
    assert_eq!(transcript_of(h.question_ids[1]), "answer two");
    assert_eq!(transcript_of(h.question_ids[2]), "answer three");

    let analysis = h.store.analysis(h.interview_id).await.expect("analysis");
    let first = analysis
        .per_question
        .iter()
        .find(|q| q.question_id == h.question_ids[0])
        .unwrap();
    assert_eq!(first.score, 0.0);
    assert!(first.feedback.contains(TRANSCRIPT_FAILURE_SENTINEL));

    assert_eq!(
        h.store.get(h.interview_id).await?.status,
        InterviewStatus::Analyzed
    );

    Ok(())
}

/// A malformed analysis reply fails the whole invocation: nothing is
/// written and the interview stays completed, retryable.
#[tokio::test]
async fn malformed_analysis_writes_nothing() -> Result<()> {
    let h = completed_interview(
        Arc::new(CountingTranscriber::new(None)),
        Arc::new(CountingAnalyst::new(true)),
    )
    .await?;

    let err = h.orchestrator.run(h.interview_id).await.unwrap_err();
    assert!(matches!(err, Error::MalformedAnalysis(_)));
    assert!(err.is_retryable());

    assert!(h.store.analysis(h.interview_id).await.is_none());
    assert_eq!(
        h.store.get(h.interview_id).await?.status,
        InterviewStatus::Completed
    );

    // Transcripts from stage one are kept, so the retry is cheap.
    let responses = h.store.responses_for(h.interview_id).await;
    assert!(responses.iter().all(|r| r.transcript.is_some()));

    Ok(())
}

#[tokio::test]
async fn manual_retry_is_restricted_to_the_owning_operator() -> Result<()> {
    let h = completed_interview(
        Arc::new(CountingTranscriber::new(None)),
        Arc::new(CountingAnalyst::new(false)),
    )
    .await?;

    let err = h
        .orchestrator
        .request_analysis(h.interview_id, "op-2")
        .await
        .unwrap_err();
    assert!(matches!(err, Error::Authorization(_)));
    assert_eq!(h.analyst.calls(), 0);

    h.orchestrator.request_analysis(h.interview_id, "op-1").await?;
    assert_eq!(
        h.store.get(h.interview_id).await?.status,
        InterviewStatus::Analyzed
    );

    Ok(())
}

#[tokio::test]
async fn pipeline_rejects_interviews_that_are_not_terminal() -> Result<()> {
    let store = Arc::new(InterviewStore::new());
    let assembler = Arc::new(ResponseAssembler::new(
        Arc::clone(&store),
        Arc::new(MemoryBlobStore::new()),
        RetryPolicy::default(),
    ));
    let orchestrator = PipelineOrchestrator::new(
        Arc::clone(&store),
        assembler,
        Arc::new(CountingTranscriber::new(None)),
        Arc::new(CountingAnalyst::new(false)),
        RetryPolicy::default(),
    );

    store
        .register_link(
            "link-1",
            "op-1",
            JobProfile {
                title: "Role".into(),
                description: "Desc".into(),
                questions: vec![Question::new("Only")],
            },
        )
        .await;
    let interview = store
        .start_interview(
            "link-1",
            CandidateIdentity {
                name: "Ada".into(),
                email: "ada@example.com".into(),
            },
        )
        .await?;

    let err = orchestrator.run(interview.id).await.unwrap_err();
    assert!(matches!(err, Error::InvalidTransition { .. }));

    let err = orchestrator
        .request_analysis(interview.id, "op-1")
        .await
        .unwrap_err();
    assert!(matches!(err, Error::InvalidTransition { .. }));

    Ok(())
}
