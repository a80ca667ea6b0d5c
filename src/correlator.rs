//! Session correlation: maps a link id to a previously-created interview,
//! persisted client-side with expiry and reconciled against server truth.
//!
//! Purely local bookkeeping; no network calls originate here. The caller
//! fetches server state and passes it to `reconcile`.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Mutex;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};
use uuid::Uuid;

use crate::model::{CandidateIdentity, Interview, InterviewStatus};

/// One persisted record per link token.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionRecord {
    pub link_id: String,
    pub interview_id: Uuid,
    pub saved_at: DateTime<Utc>,
}

/// Injected persistence for session records. Payloads are opaque strings;
/// parsing (and therefore corruption handling) lives in the correlator.
pub trait SessionStore: Send + Sync {
    fn get(&self, link_id: &str) -> Option<String>;
    fn put(&self, link_id: &str, payload: &str);
    fn clear(&self, link_id: &str);
}

/// In-memory store for tests and embedded drivers.
#[derive(Default)]
pub struct MemorySessionStore {
    records: Mutex<HashMap<String, String>>,
}

impl MemorySessionStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl SessionStore for MemorySessionStore {
    fn get(&self, link_id: &str) -> Option<String> {
        self.records.lock().unwrap().get(link_id).cloned()
    }

    fn put(&self, link_id: &str, payload: &str) {
        self.records
            .lock()
            .unwrap()
            .insert(link_id.to_string(), payload.to_string());
    }

    fn clear(&self, link_id: &str) {
        self.records.lock().unwrap().remove(link_id);
    }
}

/// File-backed store: one JSON file per link under a state directory.
pub struct JsonFileSessionStore {
    dir: PathBuf,
}

impl JsonFileSessionStore {
    pub fn new(dir: impl Into<PathBuf>) -> std::io::Result<Self> {
        let dir = dir.into();
        std::fs::create_dir_all(&dir)?;
        Ok(Self { dir })
    }

    fn path_for(&self, link_id: &str) -> PathBuf {
        let safe: String = link_id
            .chars()
            .map(|c| if c.is_ascii_alphanumeric() || c == '-' { c } else { '_' })
            .collect();
        self.dir.join(format!("{}.json", safe))
    }
}

impl SessionStore for JsonFileSessionStore {
    fn get(&self, link_id: &str) -> Option<String> {
        std::fs::read_to_string(self.path_for(link_id)).ok()
    }

    fn put(&self, link_id: &str, payload: &str) {
        if let Err(e) = std::fs::write(self.path_for(link_id), payload) {
            warn!("failed to persist session record for {}: {}", link_id, e);
        }
    }

    fn clear(&self, link_id: &str) {
        let _ = std::fs::remove_file(self.path_for(link_id));
    }
}

/// Outcome of reconciling local state against server truth.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reconciliation {
    /// Stored id matches the server; resume with identity prefilled from
    /// server state.
    Resume {
        interview_id: Uuid,
        identity: Option<CandidateIdentity>,
    },
    /// The server interview already reached a terminal status; the stored
    /// record was cleared and the terminal UI should be shown.
    Terminal { status: InterviewStatus },
    /// No usable stored session; start fresh.
    Fresh,
}

pub struct SessionCorrelator {
    store: Box<dyn SessionStore>,
    ttl: Duration,
    now: fn() -> DateTime<Utc>,
}

impl SessionCorrelator {
    pub fn new(store: Box<dyn SessionStore>, ttl: Duration) -> Self {
        Self {
            store,
            ttl,
            now: Utc::now,
        }
    }

    /// Test seam: a fixed clock instead of wall time.
    pub fn with_clock(store: Box<dyn SessionStore>, ttl: Duration, now: fn() -> DateTime<Utc>) -> Self {
        Self { store, ttl, now }
    }

    /// Load the stored interview id for a link. Malformed, mismatched, and
    /// expired records are deleted as a side effect and yield `None`.
    pub fn load(&self, link_id: &str) -> Option<Uuid> {
        let raw = self.store.get(link_id)?;

        let record: SessionRecord = match serde_json::from_str(&raw) {
            Ok(r) => r,
            Err(e) => {
                warn!("discarding corrupt session record for {}: {}", link_id, e);
                self.store.clear(link_id);
                return None;
            }
        };

        if record.link_id != link_id {
            warn!("discarding session record saved under a different link");
            self.store.clear(link_id);
            return None;
        }

        if (self.now)() - record.saved_at > self.ttl {
            info!("session record for {} expired", link_id);
            self.store.clear(link_id);
            return None;
        }

        Some(record.interview_id)
    }

    pub fn save(&self, link_id: &str, interview_id: Uuid) {
        let record = SessionRecord {
            link_id: link_id.to_string(),
            interview_id,
            saved_at: (self.now)(),
        };
        match serde_json::to_string(&record) {
            Ok(payload) => self.store.put(link_id, &payload),
            Err(e) => warn!("failed to serialize session record: {}", e),
        }
    }

    pub fn clear(&self, link_id: &str) {
        self.store.clear(link_id);
    }

    /// Reconcile the stored session against the server's view of the link.
    ///
    /// A terminal server interview always clears local state. A stored id
    /// matching the server resumes, with candidate identity prefilled from
    /// server state. A stored id the server does not corroborate belongs to
    /// some other session and is discarded.
    pub fn reconcile(&self, link_id: &str, server: Option<&Interview>) -> Reconciliation {
        let stored = self.load(link_id);

        if let Some(interview) = server {
            if interview.status.is_terminal() {
                self.clear(link_id);
                return Reconciliation::Terminal {
                    status: interview.status,
                };
            }
        }

        match (stored, server) {
            (Some(id), Some(interview)) if interview.id == id => Reconciliation::Resume {
                interview_id: id,
                identity: interview.candidate.clone(),
            },
            (Some(_), _) => {
                // Different or unknown interview on the server side: the
                // record belongs to a different session.
                self.clear(link_id);
                Reconciliation::Fresh
            }
            (None, _) => Reconciliation::Fresh,
        }
    }
}
