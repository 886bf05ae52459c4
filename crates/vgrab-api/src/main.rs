//! Gateway server binary.

use std::net::SocketAddr;
use std::time::Duration;

use tracing::{error, info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use vgrab_api::{create_router, ApiConfig, AppState};
use vgrab_queue::AddOptions;

/// Cadence of the auto-sync background pass.
const AUTO_SYNC_INTERVAL: Duration = Duration::from_secs(5 * 60);

/// Threshold for the auto-sync pass's stuck-upload recovery.
const STUCK_TIMEOUT_MINUTES: i64 = 30;

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();

    // Install rustls crypto provider (required for rustls 0.23+)
    rustls::crypto::ring::default_provider()
        .install_default()
        .expect("Failed to install rustls crypto provider");

    let use_json = std::env::var("LOG_FORMAT")
        .map(|v| v.to_lowercase() == "json")
        .unwrap_or(false);

    let env_filter = EnvFilter::from_default_env()
        .add_directive("vgrab=info".parse().unwrap());

    if use_json {
        tracing_subscriber::registry()
            .with(fmt::layer().json())
            .with(env_filter)
            .init();
    } else {
        tracing_subscriber::registry()
            .with(
                fmt::layer()
                    .with_ansi(true)
                    .with_target(true)
                    .with_thread_ids(false)
                    .with_file(false)
                    .with_line_number(false),
            )
            .with(env_filter)
            .init();
    }

    info!("Starting vgrab gateway");

    let config = ApiConfig::from_env();
    info!("config: host={}, port={}", config.host, config.port);

    let state = match AppState::new(config.clone()).await {
        Ok(state) => state,
        Err(e) => {
            error!("Failed to create application state: {}", e);
            std::process::exit(1);
        }
    };

    state.start().await;

    if config.auto_sync_videos {
        tokio::spawn(auto_sync_loop(state.clone()));
    }

    let app = create_router(state.clone());

    let addr: SocketAddr = match format!("{}:{}", config.host, config.port).parse() {
        Ok(addr) => addr,
        Err(e) => {
            error!("Invalid bind address: {}", e);
            std::process::exit(1);
        }
    };

    info!("Listening on {}", addr);

    let listener = match tokio::net::TcpListener::bind(addr).await {
        Ok(listener) => listener,
        Err(e) => {
            error!("Failed to bind {}: {}", addr, e);
            std::process::exit(1);
        }
    };

    if let Err(e) = axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
    {
        error!("Server error: {}", e);
        std::process::exit(1);
    }

    // In-flight queue items are abandoned here; their records stay in
    // `uploading` and are recovered by the stuck-upload reset.
    state.shutdown().await;
    info!("Server shutdown complete");
}

async fn shutdown_signal() {
    tokio::signal::ctrl_c()
        .await
        .expect("Failed to install CTRL+C handler");
    info!("Received shutdown signal");
}

/// Periodically recover stuck uploads and enqueue pending videos.
async fn auto_sync_loop(state: AppState) {
    let mut interval = tokio::time::interval(AUTO_SYNC_INTERVAL);
    loop {
        interval.tick().await;

        match state
            .video_tracker
            .reset_stuck_uploads(STUCK_TIMEOUT_MINUTES)
            .await
        {
            Ok(0) => {}
            Ok(reset) => info!(reset, "auto-sync reset stuck uploads"),
            Err(e) => warn!("auto-sync stuck reset failed: {}", e),
        }

        let query = vgrab_tracker::VideoQuery {
            status: Some(vgrab_models::VideoStatus::Pending),
            ..Default::default()
        };
        match state.video_tracker.get_all(&query).await {
            Ok((records, _)) => {
                for record in records {
                    if record.is_protected {
                        continue;
                    }
                    state.queue.add(record.id, AddOptions::default());
                }
            }
            Err(e) => warn!("auto-sync listing failed: {}", e),
        }
    }
}
