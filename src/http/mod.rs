//! HTTP API server for candidate and operator operations
//!
//! Candidate-facing:
//! - POST /interviews/start - Start (or resume) an interview behind a link
//! - POST /interviews/:id/questions/:question_id/chunks - Upload one chunk
//! - POST /interviews/:id/questions/:question_id/finalize - Bind a response
//! - POST /interviews/:id/finalize - Complete and schedule analysis
//! - GET /links/:token - Server truth for session reconciliation
//!
//! Operator-facing:
//! - POST /interviews/:id/analysis - Re-run the analysis pipeline
//! - GET /interviews/:id - Interview, responses with URLs, analysis
//! - GET /health - Health check

mod handlers;
mod routes;
mod state;

pub use routes::create_router;
pub use state::AppState;
