use std::sync::Arc;

use anyhow::Result;
use clap::Parser;
use tracing::info;
use vetview::{
    create_router, AppState, Config, FsBlobStore, HttpAnalyst, HttpTranscriber, InterviewStore,
    PipelineOrchestrator, ResponseAssembler,
};

#[derive(Parser)]
#[command(name = "vetview", about = "Unattended video interview service")]
struct Args {
    /// Config file (without extension), loaded via the config crate
    #[arg(long, default_value = "config/vetview")]
    config: String,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt::init();

    let args = Args::parse();
    let cfg = Config::load(&args.config)?;

    info!("{} v{}", cfg.service.name, env!("CARGO_PKG_VERSION"));

    let blobs: Arc<dyn vetview::BlobStore> = Arc::new(FsBlobStore::new(
        cfg.blobs.storage_path.clone(),
        cfg.blobs.public_base_url.clone(),
    )?);
    let store = Arc::new(InterviewStore::new());
    let assembler = Arc::new(ResponseAssembler::new(
        Arc::clone(&store),
        Arc::clone(&blobs),
        cfg.upload.clone(),
    ));
    let orchestrator = PipelineOrchestrator::new(
        Arc::clone(&store),
        Arc::clone(&assembler),
        Arc::new(HttpTranscriber::new(
            cfg.ai.transcription_url.clone(),
            cfg.ai.api_key.clone(),
        )),
        Arc::new(HttpAnalyst::new(
            cfg.ai.analysis_url.clone(),
            cfg.ai.api_key.clone(),
            cfg.ai.model.clone(),
        )),
        cfg.ai.retry.clone(),
    );

    let state = AppState {
        store,
        assembler,
        orchestrator,
        blobs,
    };

    let addr = format!("{}:{}", cfg.service.http.bind, cfg.service.http.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    info!("listening on {}", addr);

    axum::serve(listener, create_router(state)).await?;

    Ok(())
}
