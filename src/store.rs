//! Interview lifecycle store.
//!
//! Holds interviews, job links, transient chunk rows, finalized responses and
//! analyses. Interview status is strictly monotonic; finalize runs as one
//! atomic unit under the table lock. Deletion of interviews is an operator
//! action outside this core and does not exist here.

use std::collections::HashMap;

use chrono::Utc;
use tokio::sync::RwLock;
use tracing::info;
use uuid::Uuid;

use crate::blob::BlobRef;
use crate::error::{Error, Result};
use crate::model::{
    Analysis, CandidateIdentity, ChunkRow, Interview, InterviewStatus, JobProfile, Response,
};

struct LinkRow {
    operator_id: String,
    profile: JobProfile,
    interview_id: Option<Uuid>,
}

#[derive(Default)]
struct Tables {
    interviews: HashMap<Uuid, Interview>,
    links: HashMap<String, LinkRow>,
    chunks: HashMap<(Uuid, Uuid, u32), ChunkRow>,
    responses: Vec<Response>,
    analyses: HashMap<Uuid, Analysis>,
    /// Questions whose upload degraded past retry; they have no Response.
    degraded: Vec<(Uuid, Uuid)>,
}

pub struct InterviewStore {
    tables: RwLock<Tables>,
}

impl InterviewStore {
    pub fn new() -> Self {
        Self {
            tables: RwLock::new(Tables::default()),
        }
    }

    /// Interface point for the (external) job authoring side: register a
    /// link token with its profile and owning operator.
    pub async fn register_link(
        &self,
        link_token: impl Into<String>,
        operator_id: impl Into<String>,
        profile: JobProfile,
    ) {
        let mut t = self.tables.write().await;
        t.links.insert(
            link_token.into(),
            LinkRow {
                operator_id: operator_id.into(),
                profile,
                interview_id: None,
            },
        );
    }

    /// First candidate action against a link creates the interview in
    /// `Pending`; later calls return the existing one.
    pub async fn open_link(&self, link_token: &str) -> Result<Interview> {
        let mut guard = self.tables.write().await;
        let t = &mut *guard;
        let link = t
            .links
            .get_mut(link_token)
            .ok_or_else(|| Error::not_found("link", link_token))?;

        if let Some(id) = link.interview_id {
            return t
                .interviews
                .get(&id)
                .cloned()
                .ok_or_else(|| Error::not_found("interview", id));
        }

        let interview = Interview {
            id: Uuid::new_v4(),
            link_token: link_token.to_string(),
            operator_id: link.operator_id.clone(),
            candidate: None,
            status: InterviewStatus::Pending,
            started_at: None,
            completed_at: None,
        };
        link.interview_id = Some(interview.id);
        t.interviews.insert(interview.id, interview.clone());
        info!("created interview {} for link {}", interview.id, link_token);
        Ok(interview)
    }

    /// Candidate identity is bound on start; a mismatch against an already
    /// bound identity means the caller is on someone else's session.
    pub async fn start_interview(
        &self,
        link_token: &str,
        identity: CandidateIdentity,
    ) -> Result<Interview> {
        if !identity.is_complete() {
            return Err(Error::Authorization(
                "candidate name and email are required".into(),
            ));
        }

        let opened = self.open_link(link_token).await?;
        let mut t = self.tables.write().await;
        let interview = t
            .interviews
            .get_mut(&opened.id)
            .ok_or_else(|| Error::not_found("interview", opened.id))?;

        if interview.status.is_terminal() {
            return Err(Error::InvalidTransition {
                from: interview.status.to_string(),
                to: InterviewStatus::InProgress.to_string(),
            });
        }

        match &interview.candidate {
            Some(existing) if *existing != identity => {
                return Err(Error::Authorization(
                    "candidate identity does not match this interview".into(),
                ))
            }
            Some(_) => {}
            None => interview.candidate = Some(identity),
        }

        if interview.status < InterviewStatus::InProgress {
            interview.status = InterviewStatus::InProgress;
            interview.started_at = Some(Utc::now());
        }

        Ok(interview.clone())
    }

    pub async fn get(&self, interview_id: Uuid) -> Result<Interview> {
        self.tables
            .read()
            .await
            .interviews
            .get(&interview_id)
            .cloned()
            .ok_or_else(|| Error::not_found("interview", interview_id))
    }

    pub async fn interview_for_link(&self, link_token: &str) -> Option<Interview> {
        let t = self.tables.read().await;
        let id = t.links.get(link_token)?.interview_id?;
        t.interviews.get(&id).cloned()
    }

    pub async fn profile_for_interview(&self, interview_id: Uuid) -> Result<JobProfile> {
        let t = self.tables.read().await;
        let interview = t
            .interviews
            .get(&interview_id)
            .ok_or_else(|| Error::not_found("interview", interview_id))?;
        let link = t
            .links
            .get(&interview.link_token)
            .ok_or_else(|| Error::not_found("link", &interview.link_token))?;
        Ok(link.profile.clone())
    }

    /// Monotonic status advance. Same-status calls are no-ops; regressions
    /// are rejected.
    pub async fn advance_status(&self, interview_id: Uuid, to: InterviewStatus) -> Result<()> {
        let mut t = self.tables.write().await;
        let interview = t
            .interviews
            .get_mut(&interview_id)
            .ok_or_else(|| Error::not_found("interview", interview_id))?;

        if to < interview.status {
            return Err(Error::InvalidTransition {
                from: interview.status.to_string(),
                to: to.to_string(),
            });
        }
        if to == interview.status {
            return Ok(());
        }

        info!("interview {}: {} -> {}", interview_id, interview.status, to);
        interview.status = to;
        match to {
            InterviewStatus::InProgress => interview.started_at = Some(Utc::now()),
            InterviewStatus::Completed => interview.completed_at = Some(Utc::now()),
            _ => {}
        }
        Ok(())
    }

    // ------------------------------------------------------------------
    // Chunks
    // ------------------------------------------------------------------

    /// Upsert by (interview, question, chunk_index): re-saving a key
    /// replaces the row, never duplicates it.
    pub async fn upsert_chunk(
        &self,
        interview_id: Uuid,
        question_id: Uuid,
        chunk_index: u32,
        blob: BlobRef,
    ) -> Result<()> {
        let mut t = self.tables.write().await;
        if !t.interviews.contains_key(&interview_id) {
            return Err(Error::not_found("interview", interview_id));
        }
        t.chunks.insert(
            (interview_id, question_id, chunk_index),
            ChunkRow {
                interview_id,
                question_id,
                chunk_index,
                blob,
                uploaded_at: Utc::now(),
            },
        );
        Ok(())
    }

    pub async fn chunk_count(&self, interview_id: Uuid, question_id: Uuid) -> usize {
        self.tables
            .read()
            .await
            .chunks
            .keys()
            .filter(|(i, q, _)| *i == interview_id && *q == question_id)
            .count()
    }

    // ------------------------------------------------------------------
    // Responses
    // ------------------------------------------------------------------

    /// Atomic finalize: read the key's chunks, order them strictly by
    /// ascending index, bind one Response, purge superseded attempts, then
    /// drop the transient chunk rows (blobs are retained). Runs entirely
    /// under the table write lock so no reader interleaves with the purge.
    pub async fn finalize_response(
        &self,
        interview_id: Uuid,
        question_id: Uuid,
        duration_secs: f64,
        attempt: u32,
    ) -> Result<Response> {
        let mut t = self.tables.write().await;

        let mut rows: Vec<ChunkRow> = t
            .chunks
            .values()
            .filter(|c| c.interview_id == interview_id && c.question_id == question_id)
            .cloned()
            .collect();
        if rows.is_empty() {
            return Err(Error::NoChunks { question_id });
        }
        rows.sort_by_key(|c| c.chunk_index);

        let response = Response {
            interview_id,
            question_id,
            attempt,
            blobs: rows.iter().map(|c| c.blob.clone()).collect(),
            duration_secs,
            transcript: None,
            created_at: Utc::now(),
        };

        Self::bind_response(&mut t, response.clone());
        t.chunks
            .retain(|(i, q, _), _| !(*i == interview_id && *q == question_id));

        info!(
            "finalized response for interview {} question {} (attempt {}, {} chunks)",
            interview_id,
            question_id,
            attempt,
            response.blobs.len()
        );
        Ok(response)
    }

    /// Legacy single-blob path: same retake-purge semantics, no reassembly.
    pub async fn finalize_single(
        &self,
        interview_id: Uuid,
        question_id: Uuid,
        blob: BlobRef,
        duration_secs: f64,
        attempt: u32,
    ) -> Result<Response> {
        let mut t = self.tables.write().await;
        if !t.interviews.contains_key(&interview_id) {
            return Err(Error::not_found("interview", interview_id));
        }

        let response = Response {
            interview_id,
            question_id,
            attempt,
            blobs: vec![blob],
            duration_secs,
            transcript: None,
            created_at: Utc::now(),
        };
        Self::bind_response(&mut t, response.clone());
        Ok(response)
    }

    /// Purge every attempt at or below the incoming one, then insert. Keeps
    /// exactly one live Response per (interview, question).
    fn bind_response(t: &mut Tables, response: Response) {
        t.responses.retain(|r| {
            !(r.interview_id == response.interview_id
                && r.question_id == response.question_id
                && r.attempt <= response.attempt)
        });
        t.responses.push(response);
    }

    pub async fn responses_for(&self, interview_id: Uuid) -> Vec<Response> {
        self.tables
            .read()
            .await
            .responses
            .iter()
            .filter(|r| r.interview_id == interview_id)
            .cloned()
            .collect()
    }

    pub async fn response_for_question(
        &self,
        interview_id: Uuid,
        question_id: Uuid,
    ) -> Option<Response> {
        self.tables
            .read()
            .await
            .responses
            .iter()
            .find(|r| r.interview_id == interview_id && r.question_id == question_id)
            .cloned()
    }

    pub async fn set_transcript(
        &self,
        interview_id: Uuid,
        question_id: Uuid,
        transcript: impl Into<String>,
    ) -> Result<()> {
        let mut t = self.tables.write().await;
        let response = t
            .responses
            .iter_mut()
            .find(|r| r.interview_id == interview_id && r.question_id == question_id)
            .ok_or_else(|| Error::not_found("response", question_id))?;
        response.transcript = Some(transcript.into());
        Ok(())
    }

    /// Record a question whose upload never produced a usable response, so
    /// downstream stages can substitute a placeholder.
    pub async fn flag_degraded(&self, interview_id: Uuid, question_id: Uuid) {
        let mut t = self.tables.write().await;
        if !t.degraded.contains(&(interview_id, question_id)) {
            t.degraded.push((interview_id, question_id));
        }
    }

    pub async fn degraded_questions(&self, interview_id: Uuid) -> Vec<Uuid> {
        self.tables
            .read()
            .await
            .degraded
            .iter()
            .filter(|(i, _)| *i == interview_id)
            .map(|(_, q)| *q)
            .collect()
    }

    // ------------------------------------------------------------------
    // Analysis
    // ------------------------------------------------------------------

    /// Replace-if-exists, insert-if-absent: one Analysis per interview.
    pub async fn upsert_analysis(&self, analysis: Analysis) -> Result<()> {
        let mut t = self.tables.write().await;
        if !t.interviews.contains_key(&analysis.interview_id) {
            return Err(Error::not_found("interview", analysis.interview_id));
        }
        t.analyses.insert(analysis.interview_id, analysis);
        Ok(())
    }

    pub async fn analysis(&self, interview_id: Uuid) -> Option<Analysis> {
        self.tables.read().await.analyses.get(&interview_id).cloned()
    }
}

impl Default for InterviewStore {
    fn default() -> Self {
        Self::new()
    }
}
