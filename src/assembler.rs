//! Response assembly: idempotent chunk indexing, ordered reassembly on
//! finalize, and retake purging.
//!
//! Finalize for one (interview, question) key is a critical section: callers
//! racing on the same key are serialized on a per-key lock, and the table
//! mutation itself happens atomically inside the store.

use std::collections::HashMap;
use std::sync::Arc;

use futures::future::try_join_all;
use tokio::sync::Mutex;
use tracing::warn;
use uuid::Uuid;

use crate::blob::{BlobRef, BlobStore};
use crate::error::{Error, Result};
use crate::model::Response;
use crate::retry::{with_retry, RetryPolicy};
use crate::store::InterviewStore;

pub struct ResponseAssembler {
    store: Arc<InterviewStore>,
    blobs: Arc<dyn BlobStore>,
    retry: RetryPolicy,
    locks: Mutex<HashMap<(Uuid, Uuid), Arc<Mutex<()>>>>,
}

impl ResponseAssembler {
    pub fn new(store: Arc<InterviewStore>, blobs: Arc<dyn BlobStore>, retry: RetryPolicy) -> Self {
        Self {
            store,
            blobs,
            retry,
            locks: Mutex::new(HashMap::new()),
        }
    }

    async fn key_lock(&self, interview_id: Uuid, question_id: Uuid) -> Arc<Mutex<()>> {
        let mut locks = self.locks.lock().await;
        locks
            .entry((interview_id, question_id))
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }

    /// Push chunk bytes through the blob store (two-phase write, bounded
    /// retry) and index the resulting reference. Sequential per chunk so
    /// upload bandwidth stays predictable.
    pub async fn upload_chunk(
        &self,
        interview_id: Uuid,
        question_id: Uuid,
        chunk_index: u32,
        bytes: Vec<u8>,
    ) -> Result<BlobRef> {
        let blob = with_retry(&self.retry, "chunk upload", || {
            let bytes = bytes.clone();
            async move {
                let target = self.blobs.begin_upload().await?;
                self.blobs.put(&target, bytes).await?;
                Ok::<_, Error>(target.blob)
            }
        })
        .await
        .map_err(|e| Error::Upload {
            attempts: self.retry.max_attempts,
            reason: e.to_string(),
        })?;

        self.append_chunk(interview_id, question_id, chunk_index, blob.clone())
            .await?;
        Ok(blob)
    }

    /// Register an already-stored blob as the chunk at `chunk_index`.
    /// Idempotent: re-invoking with the same key replaces the row.
    pub async fn append_chunk(
        &self,
        interview_id: Uuid,
        question_id: Uuid,
        chunk_index: u32,
        blob: BlobRef,
    ) -> Result<()> {
        let lock = self.key_lock(interview_id, question_id).await;
        let _guard = lock.lock().await;
        self.store
            .upsert_chunk(interview_id, question_id, chunk_index, blob)
            .await
    }

    /// Bind every uploaded chunk for the key into one ordered Response and
    /// purge superseded attempts. Fails with `NoChunks` when nothing was
    /// uploaded.
    pub async fn finalize(
        &self,
        interview_id: Uuid,
        question_id: Uuid,
        duration_secs: f64,
        attempt: u32,
    ) -> Result<Response> {
        let lock = self.key_lock(interview_id, question_id).await;
        let _guard = lock.lock().await;
        self.store
            .finalize_response(interview_id, question_id, duration_secs, attempt)
            .await
    }

    /// Legacy one-file-per-response path: same retake semantics, no
    /// reassembly.
    pub async fn finalize_single(
        &self,
        interview_id: Uuid,
        question_id: Uuid,
        blob: BlobRef,
        duration_secs: f64,
        attempt: u32,
    ) -> Result<Response> {
        let lock = self.key_lock(interview_id, question_id).await;
        let _guard = lock.lock().await;
        self.store
            .finalize_single(interview_id, question_id, blob, duration_secs, attempt)
            .await
    }

    /// Reconstruct a response's media by fetching all its chunks
    /// concurrently and concatenating in order. Any failed fetch fails the
    /// reconstruction.
    pub async fn reconstruct(&self, response: &Response) -> Result<Vec<u8>> {
        let fetches = response.blobs.iter().map(|b| self.blobs.fetch(b));
        let parts = try_join_all(fetches).await?;
        Ok(parts.concat())
    }

    /// Degrade-and-continue entry point for the recording driver: a question
    /// whose upload or finalize could not produce a Response is flagged so
    /// the candidate still reaches completion.
    pub async fn flag_degraded(&self, interview_id: Uuid, question_id: Uuid) {
        warn!(
            "interview {} question {}: response degraded, continuing without it",
            interview_id, question_id
        );
        self.store.flag_degraded(interview_id, question_id).await;
    }
}
