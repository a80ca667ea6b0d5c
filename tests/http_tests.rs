// Integration tests for the HTTP surface
//
// Runs the real router on a loopback listener and drives the candidate and
// operator operations end to end with an HTTP client.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;
use base64::Engine;
use serde_json::{json, Value};
use uuid::Uuid;
use vetview::pipeline::{AnalysisRequest, QuestionReport};
use vetview::{
    create_router, AnalysisReport, Analyst, AppState, InterviewStore, JobProfile,
    MemoryBlobStore, PipelineOrchestrator, Question, ResponseAssembler, RetryPolicy, Transcriber,
};

struct EchoTranscriber;

#[async_trait]
impl Transcriber for EchoTranscriber {
    async fn transcribe(&self, media: &[u8], _mime: &str) -> vetview::Result<String> {
        Ok(String::from_utf8_lossy(media).into_owned())
    }
}

struct EchoAnalyst;

#[async_trait]
impl Analyst for EchoAnalyst {
    async fn analyze(&self, request: &AnalysisRequest) -> vetview::Result<AnalysisReport> {
        Ok(AnalysisReport {
            overall_score: 70.0,
            strengths: vec!["clear".into()],
            weaknesses: vec![],
            communication_style: "direct".into(),
            confidence_level: "high".into(),
            skill_alignment: "good".into(),
            red_flags: vec![],
            summary: "fine".into(),
            question_analyses: request
                .entries
                .iter()
                .map(|e| QuestionReport {
                    question_id: e.question_id,
                    score: 75.0,
                    feedback: format!("saw: {}", e.transcript),
                })
                .collect(),
        })
    }
}

async fn serve(questions: Vec<Question>) -> Result<(SocketAddr, Arc<InterviewStore>)> {
    let store = Arc::new(InterviewStore::new());
    let blobs: Arc<dyn vetview::BlobStore> = Arc::new(MemoryBlobStore::new());
    let assembler = Arc::new(ResponseAssembler::new(
        Arc::clone(&store),
        Arc::clone(&blobs),
        RetryPolicy {
            max_attempts: 2,
            initial_backoff_ms: 1,
            max_backoff_ms: 1,
        },
    ));
    let orchestrator = PipelineOrchestrator::new(
        Arc::clone(&store),
        Arc::clone(&assembler),
        Arc::new(EchoTranscriber),
        Arc::new(EchoAnalyst),
        RetryPolicy {
            max_attempts: 1,
            initial_backoff_ms: 1,
            max_backoff_ms: 1,
        },
    );

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

    let state = AppState {
        store: Arc::clone(&store),
        assembler,
        orchestrator,
        blobs,
    };

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await?;
    let addr = listener.local_addr()?;
    tokio::spawn(async move {
        axum::serve(listener, create_router(state)).await.ok();
    });

    Ok((addr, store))
}

fn b64(bytes: &[u8]) -> String {
    base64::engine::general_purpose::STANDARD.encode(bytes)
}

#[tokio::test]
async fn candidate_flow_over_http() -> Result<()> {
    let (addr, store) = serve(vec![Question::new("One"), Question::new("Two")]).await?;
    let client = reqwest::Client::new();
    let base = format!("http://{}", addr);

    // Start against the link.
    let started: Value = client
        .post(format!("{}/interviews/start", base))
        .json(&json!({
            "link_token": "link-1",
            "name": "Ada",
            "email": "ada@example.com"
        }))
        .send()
        .await?
        .error_for_status()?
        .json()
        .await?;
    let interview_id: Uuid = serde_json::from_value(started["interview_id"].clone())?;
    assert_eq!(started["status"], "in_progress");
    let questions = started["questions"].as_array().unwrap();
    assert_eq!(questions.len(), 2);

    // Upload chunks for both questions and finalize each.
    for q in questions {
        let question_id = q["id"].as_str().unwrap();
        for (index, part) in ["hello ", "world"].iter().enumerate() {
            let status = client
                .post(format!(
                    "{}/interviews/{}/questions/{}/chunks",
                    base, interview_id, question_id
                ))
                .json(&json!({ "chunk_index": index, "data": b64(part.as_bytes()) }))
                .send()
                .await?
                .status();
            assert!(status.is_success());
        }
        let finalized: Value = client
            .post(format!(
                "{}/interviews/{}/questions/{}/finalize",
                base, interview_id, question_id
            ))
            .json(&json!({ "duration_secs": 30.0, "attempt": 1 }))
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;
        assert_eq!(finalized["blob_count"], 2);
    }

    // Complete the interview; the pipeline runs detached.
    client
        .post(format!("{}/interviews/{}/finalize", base, interview_id))
        .send()
        .await?
        .error_for_status()?;

    // Reading without operator identity is rejected.
    let denied = client
        .get(format!("{}/interviews/{}", base, interview_id))
        .send()
        .await?;
    assert_eq!(denied.status(), 403);

    // Poll as the owning operator until the analysis lands.
    let mut analysis = Value::Null;
    for _ in 0..50 {
        let view: Value = client
            .get(format!("{}/interviews/{}", base, interview_id))
            .header("X-Operator-Id", "op-1")
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;
        if !view["analysis"].is_null() {
            analysis = view["analysis"].clone();
            assert_eq!(view["interview"]["status"], "analyzed");
            let responses = view["responses"].as_array().unwrap();
            assert_eq!(responses.len(), 2);
            for r in responses {
                assert_eq!(r["transcript"], "hello world");
                assert_eq!(r["urls"].as_array().unwrap().len(), 2);
            }
            break;
        }
        tokio::time::sleep(Duration::from_millis(50)).await;
    }
    assert_eq!(analysis["per_question"].as_array().unwrap().len(), 2);

    // Manual re-analysis is owner-gated.
    let foreign = client
        .post(format!("{}/interviews/{}/analysis", base, interview_id))
        .header("X-Operator-Id", "op-2")
        .send()
        .await?;
    assert_eq!(foreign.status(), 403);

    client
        .post(format!("{}/interviews/{}/analysis", base, interview_id))
        .header("X-Operator-Id", "op-1")
        .send()
        .await?
        .error_for_status()?;

    // Status never regresses below analyzed.
    assert_eq!(
        store.get(interview_id).await?.status,
        vetview::InterviewStatus::Analyzed
    );

    Ok(())
}

#[tokio::test]
async fn retakes_respect_the_question_flag() -> Result<()> {
    let mut retakeable = Question::new("Retakeable");
    retakeable.allow_retake = true;
    let fixed = Question::new("One shot");
    let retakeable_id = retakeable.id;
    let fixed_id = fixed.id;

    let (addr, store) = serve(vec![retakeable, fixed]).await?;
    let client = reqwest::Client::new();
    let base = format!("http://{}", addr);

    let started: Value = client
        .post(format!("{}/interviews/start", base))
        .json(&json!({
            "link_token": "link-1",
            "name": "Ada",
            "email": "ada@example.com"
        }))
        .send()
        .await?
        .error_for_status()?
        .json()
        .await?;
    let interview_id: Uuid = serde_json::from_value(started["interview_id"].clone())?;

    let record = |question_id: Uuid, attempt: u32, media: &'static str| {
        let client = client.clone();
        let base = base.clone();
        async move {
            client
                .post(format!(
                    "{}/interviews/{}/questions/{}/chunks",
                    base, interview_id, question_id
                ))
                .json(&json!({ "chunk_index": 0, "data": b64(media.as_bytes()) }))
                .send()
                .await?
                .error_for_status()?;
            let response = client
                .post(format!(
                    "{}/interviews/{}/questions/{}/finalize",
                    base, interview_id, question_id
                ))
                .json(&json!({ "duration_secs": 10.0, "attempt": attempt }))
                .send()
                .await?;
            Ok::<_, anyhow::Error>(response.status())
        }
    };

    // First attempts succeed on both questions.
    assert!(record(retakeable_id, 1, "first take").await?.is_success());
    assert!(record(fixed_id, 1, "only take").await?.is_success());

    // Scenario B: the retake replaces the earlier attempt.
    assert!(record(retakeable_id, 2, "second take").await?.is_success());
    let responses = store.responses_for(interview_id).await;
    let survivor = responses
        .iter()
        .find(|r| r.question_id == retakeable_id)
        .unwrap();
    assert_eq!(survivor.attempt, 2);
    assert_eq!(
        responses
            .iter()
            .filter(|r| r.question_id == retakeable_id)
            .count(),
        1
    );

    // The non-retakeable question rejects a second attempt.
    let status = record(fixed_id, 2, "sneaky retake").await?;
    assert_eq!(status, 403);

    Ok(())
}

#[tokio::test]
async fn malformed_chunk_payload_is_a_bad_request() -> Result<()> {
    let question = Question::new("Only");
    let question_id = question.id;
    let (addr, _store) = serve(vec![question]).await?;
    let client = reqwest::Client::new();
    let base = format!("http://{}", addr);

    let started: Value = client
        .post(format!("{}/interviews/start", base))
        .json(&json!({
            "link_token": "link-1",
            "name": "Ada",
            "email": "ada@example.com"
        }))
        .send()
        .await?
        .error_for_status()?
        .json()
        .await?;
    let interview_id: Uuid = serde_json::from_value(started["interview_id"].clone())?;

    let response = client
        .post(format!(
            "{}/interviews/{}/questions/{}/chunks",
            base, interview_id, question_id
        ))
        .json(&json!({ "chunk_index": 0, "data": "not base64 !!!" }))
        .send()
        .await?;
    assert_eq!(response.status(), 400);

    Ok(())
}
