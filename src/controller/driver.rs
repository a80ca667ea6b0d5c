//! Async driver for the recording flow.
//!
//! Owns the capture device handle, the per-question timer, and the chunk
//! uploader, and feeds the state machine. Events are serialized through the
//! machine lock, so a timer expiry and a user skip can race freely: the
//! machine hands out at most one finalize claim per question.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};
use uuid::Uuid;

use super::capture::{CaptureConstraints, CaptureDevice, CaptureStream};
use super::machine::{AdvanceClaim, Machine, Phase};
use crate::assembler::ResponseAssembler;
use crate::config::RecordingPolicy;
use crate::error::{Error, Result};
use crate::model::{CandidateIdentity, InterviewStatus, Question};
use crate::pipeline::PipelineOrchestrator;
use crate::store::InterviewStore;

const TIMER_TICK: Duration = Duration::from_millis(100);

/// Cheap-to-clone handle; all state lives behind one shared inner.
#[derive(Clone)]
pub struct RecordingController {
    inner: Arc<Inner>,
}

struct Inner {
    interview_id: Uuid,
    link_token: String,
    questions: Vec<Question>,
    policy: RecordingPolicy,
    constraints: CaptureConstraints,

    machine: Mutex<Machine>,
    device: Arc<dyn CaptureDevice>,
    stream: Mutex<Option<Box<dyn CaptureStream>>>,
    upload_task: Mutex<Option<JoinHandle<()>>>,
    attempts: Mutex<HashMap<Uuid, u32>>,

    store: Arc<InterviewStore>,
    assembler: Arc<ResponseAssembler>,
    orchestrator: PipelineOrchestrator,
}

impl RecordingController {
    /// Open (or resume) the interview behind a link and build the machine
    /// for its question list. The controller starts in `Intro`.
    pub async fn connect(
        store: Arc<InterviewStore>,
        assembler: Arc<ResponseAssembler>,
        orchestrator: PipelineOrchestrator,
        device: Arc<dyn CaptureDevice>,
        policy: RecordingPolicy,
        link_token: impl Into<String>,
    ) -> Result<Self> {
        let link_token = link_token.into();
        let interview = store.open_link(&link_token).await?;
        let profile = store.profile_for_interview(interview.id).await?;
        let machine = Machine::new(policy.clone(), &profile.questions);

        Ok(Self {
            inner: Arc::new(Inner {
                interview_id: interview.id,
                link_token,
                questions: profile.questions,
                policy,
                constraints: CaptureConstraints::default(),
                machine: Mutex::new(machine),
                device,
                stream: Mutex::new(None),
                upload_task: Mutex::new(None),
                attempts: Mutex::new(HashMap::new()),
                store,
                assembler,
                orchestrator,
            }),
        })
    }

    pub fn interview_id(&self) -> Uuid {
        self.inner.interview_id
    }

    pub fn questions(&self) -> &[Question] {
        &self.inner.questions
    }

    pub async fn phase(&self) -> Phase {
        self.inner.machine.lock().await.phase()
    }

    /// Intro → Recording. Requires complete candidate identity, device
    /// acquisition, and (on resume) identity match against the interview.
    /// Any failure leaves the machine in `Intro`.
    pub async fn start(&self, identity: CandidateIdentity) -> Result<Phase> {
        let phase = self.inner.machine.lock().await.phase();
        if phase != Phase::Intro {
            return Err(Error::InvalidTransition {
                from: phase.to_string(),
                to: "recording".to_string(),
            });
        }
        if !identity.is_complete() {
            return Err(Error::Authorization(
                "candidate name and email are required".into(),
            ));
        }

        // Device first: a permission denial must block before any state is
        // touched server-side.
        let stream = self.inner.device.acquire(&self.inner.constraints).await?;

        let interview = self
            .inner
            .store
            .start_interview(&self.inner.link_token, identity)
            .await?;
        info!(
            "interview {} started by {}",
            interview.id,
            interview
                .candidate
                .as_ref()
                .map(|c| c.email.as_str())
                .unwrap_or("<unknown>")
        );

        *self.inner.stream.lock().await = Some(stream);

        let resume_index = self.resume_index().await;
        let phase = self.inner.machine.lock().await.begin_at(resume_index)?;

        match phase {
            Phase::Recording { index } => {
                self.begin_capture(index).await?;
                self.spawn_timer();
            }
            Phase::Uploading => {
                // Every question already answered; only the finalization
                // call remains. Best-effort here, retryable by the caller.
                *self.inner.stream.lock().await = None;
                if let Err(e) = self.complete_interview().await {
                    warn!("interview finalization failed on resume: {}", e);
                }
            }
            _ => {}
        }

        Ok(self.inner.machine.lock().await.phase())
    }

    /// First question index with neither a response nor a degraded flag.
    async fn resume_index(&self) -> usize {
        let mut answered: HashSet<Uuid> = self
            .inner
            .store
            .responses_for(self.inner.interview_id)
            .await
            .into_iter()
            .map(|r| r.question_id)
            .collect();
        answered.extend(
            self.inner
                .store
                .degraded_questions(self.inner.interview_id)
                .await,
        );

        self.inner
            .questions
            .iter()
            .position(|q| !answered.contains(&q.id))
            .unwrap_or(self.inner.questions.len())
    }

    /// User skip. No-op if a timer expiry already claimed this question;
    /// an error before the minimum recording time.
    pub async fn skip(&self) -> Result<()> {
        let claim = self.inner.machine.lock().await.skip()?;
        if let Some(claim) = claim {
            self.finalize_and_advance(claim).await;
        }
        Ok(())
    }

    /// One-time elaborate action: extends the current question's timer and
    /// returns the supplementary text. `None` when already used (the timer
    /// is not extended again) or when not recording.
    pub async fn elaborate(&self) -> Option<String> {
        let mut machine = self.inner.machine.lock().await;
        let Phase::Recording { index } = machine.phase() else {
            return None;
        };
        if machine.elaborate() {
            Some(
                self.inner.questions[index]
                    .elaboration
                    .clone()
                    .unwrap_or_default(),
            )
        } else {
            None
        }
    }

    /// Uploading → Complete, gated on the interview finalization call. On
    /// failure the machine stays in `Uploading` and the error is retryable.
    pub async fn complete_interview(&self) -> Result<()> {
        {
            let machine = self.inner.machine.lock().await;
            if machine.phase() != Phase::Uploading {
                return Err(Error::InvalidTransition {
                    from: machine.phase().to_string(),
                    to: "complete".to_string(),
                });
            }
        }

        self.inner
            .store
            .advance_status(self.inner.interview_id, InterviewStatus::Completed)
            .await
            .map_err(|e| Error::Finalize(e.to_string()))?;

        // Detached: completion never blocks on the AI pipeline.
        self.inner.orchestrator.schedule(self.inner.interview_id);

        self.inner.machine.lock().await.complete()?;
        info!("interview {} complete", self.inner.interview_id);
        Ok(())
    }

    fn spawn_timer(&self) {
        let this = self.clone();
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(TIMER_TICK);
            ticker.tick().await;
            loop {
                ticker.tick().await;
                let claim = this.inner.machine.lock().await.tick(TIMER_TICK);
                if let Some(claim) = claim {
                    this.finalize_and_advance(claim).await;
                }
                let phase = this.inner.machine.lock().await.phase();
                if matches!(phase, Phase::Uploading | Phase::Complete) {
                    break;
                }
            }
        });
    }

    async fn begin_capture(&self, index: usize) -> Result<()> {
        let question_id = self.inner.questions[index].id;
        let mut rx = {
            let mut stream = self.inner.stream.lock().await;
            let stream = stream
                .as_mut()
                .ok_or_else(|| Error::Storage("capture stream not acquired".into()))?;
            stream.start().await?
        };

        let this = self.clone();
        let handle = tokio::spawn(async move {
            let mut chunk_index: u32 = 0;
            while let Some(chunk) = rx.recv().await {
                // Sequential uploads with bounded retry; a lost chunk never
                // blocks progression.
                if let Err(e) = this
                    .inner
                    .assembler
                    .upload_chunk(
                        this.inner.interview_id,
                        question_id,
                        chunk_index,
                        chunk.bytes,
                    )
                    .await
                {
                    warn!(
                        "chunk {} for question {} dropped: {}",
                        chunk_index, question_id, e
                    );
                }
                chunk_index += 1;
            }
        });
        *self.inner.upload_task.lock().await = Some(handle);
        Ok(())
    }

    /// The single finalize-and-advance body. Runs at most once per question
    /// because claims come from the machine.
    async fn finalize_and_advance(&self, claim: AdvanceClaim) {
        let question_id = self.inner.questions[claim.index].id;
        info!(
            "question {} ({}) finalizing after {:.1}s ({:?})",
            claim.index,
            question_id,
            claim.elapsed.as_secs_f64(),
            claim.trigger
        );

        // Stop the capture segment, then drain the uploader so every chunk
        // that made it off the device is indexed before finalize reads.
        if let Some(stream) = self.inner.stream.lock().await.as_mut() {
            if let Err(e) = stream.stop().await {
                warn!("capture stop failed: {}", e);
            }
        }
        if let Some(task) = self.inner.upload_task.lock().await.take() {
            if let Err(e) = task.await {
                error!("upload task panicked: {}", e);
            }
        }

        let attempt = {
            let mut attempts = self.inner.attempts.lock().await;
            let n = attempts.entry(question_id).or_insert(0);
            *n += 1;
            *n
        };

        if let Err(e) = self
            .inner
            .assembler
            .finalize(
                self.inner.interview_id,
                question_id,
                claim.elapsed.as_secs_f64(),
                attempt,
            )
            .await
        {
            // Degrade and continue: the candidate always reaches Complete.
            warn!("finalize for question {} failed: {}", question_id, e);
            self.inner
                .assembler
                .flag_degraded(self.inner.interview_id, question_id)
                .await;
        }

        let next = self.inner.machine.lock().await.advance();
        match next {
            Ok(Phase::Intermission { next_index }) => {
                let this = self.clone();
                tokio::spawn(async move {
                    tokio::time::sleep(Duration::from_secs(this.inner.policy.intermission_secs))
                        .await;
                    match this.inner.machine.lock().await.intermission_elapsed() {
                        Ok(index) => {
                            if let Err(e) = this.begin_capture(index).await {
                                warn!("capture for question {} unavailable: {}", index, e);
                            }
                        }
                        Err(e) => error!("intermission transition failed: {}", e),
                    }
                });
            }
            Ok(Phase::Uploading) => {
                if let Err(e) = self.complete_interview().await {
                    warn!("interview finalization failed (retryable): {}", e);
                }
            }
            Ok(phase) => error!("unexpected post-finalize phase {}", phase),
            Err(e) => error!("post-finalize advance failed: {}", e),
        }
    }
}
