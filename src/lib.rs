pub mod assembler;
pub mod blob;
pub mod config;
pub mod controller;
pub mod correlator;
pub mod error;
pub mod http;
pub mod model;
pub mod pipeline;
pub mod retry;
pub mod store;

pub use assembler::ResponseAssembler;
pub use blob::{BlobRef, BlobStore, FsBlobStore, MemoryBlobStore};
pub use config::{Config, RecordingPolicy};
pub use controller::{
    CaptureConstraints, CaptureDevice, CaptureStream, MediaChunk, Phase, RecordingController,
    SyntheticCapture,
};
pub use correlator::{
    JsonFileSessionStore, MemorySessionStore, Reconciliation, SessionCorrelator, SessionRecord,
    SessionStore,
};
pub use error::{Error, Result};
pub use http::{create_router, AppState};
pub use model::{
    Analysis, CandidateIdentity, Interview, InterviewStatus, JobProfile, Question,
    QuestionAnalysis, Response,
};
pub use pipeline::{
    AnalysisReport, Analyst, HttpAnalyst, HttpTranscriber, PipelineOrchestrator, Transcriber,
    TRANSCRIPT_FAILURE_SENTINEL,
};
pub use retry::RetryPolicy;
pub use store::InterviewStore;
