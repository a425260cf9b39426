//! Clip server example
//!
//! Runs slice-dl with the REST API enabled. Requires `yt-dlp` and `ffmpeg`
//! on PATH.
//!
//! After starting, you can:
//! - View Swagger UI at http://localhost:6790/swagger-ui
//! - Start a job via POST http://localhost:6790/api/v1/jobs
//! - Follow its progress via GET http://localhost:6790/api/v1/jobs/{id}/events
//! - Fetch the finished file via GET http://localhost:6790/api/v1/jobs/{id}/file

use std::net::SocketAddr;
use std::sync::Arc;
use slice_dl::config::{ApiConfig, Config, ServerIntegrationConfig};
use slice_dl::{SliceDownloader, run_with_shutdown};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "slice_dl=debug,info".into()),
        )
        .init();

    let api_config = ApiConfig {
        bind_address: "127.0.0.1:6790".parse::<SocketAddr>()?,
        api_key: None, // No authentication for local use
        cors_enabled: true,
        cors_origins: vec!["*".to_string()],
        swagger_ui: true,
    };

    let config = Config {
        server: ServerIntegrationConfig { api: api_config },
        ..Default::default()
    };

    let downloader = Arc::new(SliceDownloader::new(config).await?);
    let _api = downloader.spawn_api_server();
    let _reaper = downloader.spawn_reaper();

    println!("Starting slice-dl clip server");
    println!("Swagger UI: http://localhost:6790/swagger-ui");
    println!("API Base:   http://localhost:6790/api/v1");
    println!();
    println!("Example commands:");
    println!("  # Start a job for seconds 30 to 45");
    println!("  curl -X POST http://localhost:6790/api/v1/jobs \\");
    println!("    -H 'Content-Type: application/json' \\");
    println!(
        "    -d '{{\"url\": \"https://www.youtube.com/watch?v=aqz-KE-bpKQ\", \"startTime\": 30, \"endTime\": 45, \"filename\": \"highlight\"}}'"
    );
    println!();
    println!("  # Stream progress (Server-Sent Events)");
    println!("  curl -N http://localhost:6790/api/v1/jobs/<jobId>/events");
    println!();
    println!("  # Download the result (once)");
    println!("  curl -OJ http://localhost:6790/api/v1/jobs/<jobId>/file");
    println!();
    println!("Press Ctrl+C to stop");

    run_with_shutdown((*downloader).clone()).await;

    Ok(())
}
