use std::sync::Arc;
use tokio::sync::Semaphore;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::info;

mod cleanup;
mod config;
mod effects;
mod ffmpeg;
mod handlers;
mod jobs;
mod models;
mod system_info;

use config::Config;
use jobs::JobRegistry;
use models::AppState;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter("bodycam_effects_backend=debug,tower_http=debug")
        .init();

    // Load configuration
    let config = Config::from_env();

    // Ensure the job temp directory exists
    tokio::fs::create_dir_all(&config.temp_dir).await?;

    // Print system info at startup
    system_info::print_startup_info(&config);

    let registry = JobRegistry::new();

    // Start the periodic expiry sweep
    cleanup::start_sweep_task(registry.clone(), config.clone());

    // Create app state
    let state = Arc::new(AppState {
        registry,
        transcode_slots: Arc::new(Semaphore::new(config.max_concurrent_transcodes)),
        config: config.clone(),
    });

    // Build router
    let app = handlers::router(state)
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http());

    // Start server
    let addr = format!("0.0.0.0:{}", config.port);
    info!("🚀 Server starting on {}", addr);

    let listener = tokio::net::TcpListener::bind(&addr).await?;

    println!("{}", "=".repeat(60));
    println!("✅ Server running on http://0.0.0.0:{}", config.port);
    println!("✅ Server accessible at http://localhost:{}", config.port);
    println!("{}", "=".repeat(60));

    info!("✅ Server listening on {}", addr);

    axum::serve(listener, app).await?;

    Ok(())
}
