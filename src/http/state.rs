use std::sync::Arc;

use crate::assembler::ResponseAssembler;
use crate::blob::BlobStore;
use crate::pipeline::PipelineOrchestrator;
use crate::store::InterviewStore;

/// Shared application state for HTTP handlers
#[derive(Clone)]
pub struct AppState {
    pub store: Arc<InterviewStore>,
    pub assembler: Arc<ResponseAssembler>,
    pub orchestrator: PipelineOrchestrator,
    pub blobs: Arc<dyn BlobStore>,
}
