use clap::Parser;
use dotenvy::dotenv;
use marker_gateway::config::GatewayConfig;
use marker_gateway::infrastructure::{converter, staging};
use marker_gateway::{AppState, create_app};
use tokio::signal;
use tokio_util::sync::CancellationToken;
use tower_http::trace::TraceLayer;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser, Debug)]
#[command(author, version, about = "PDF to Markdown conversion gateway", long_about = None)]
struct Args {
    /// Listen host (overrides HOST)
    #[arg(long)]
    host: Option<String>,

    /// Listen port (overrides MARKER_PORT)
    #[arg(short, long)]
    port: Option<u16>,
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> anyhow::Result<()> {
    // 1. Environment & logging
    dotenv().ok();
    let args = Args::parse();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "marker_gateway=info,tower_http=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let mut config = GatewayConfig::from_env();
    if let Some(host) = args.host {
        config.host = host;
    }
    if let Some(port) = args.port {
        config.port = port;
    }

    info!("🚀 Starting Marker API server on {}", config.bind_address());
    info!("TORCH_DEVICE: {}", config.torch_device);
    info!("TEMP_DIR: {}", config.temp_dir.display());

    // 2. Infrastructure
    let store = staging::setup_staging(&config).await?;
    let converter = converter::setup_converter(&config).await;
    let state = AppState::new(config.clone(), store, converter);

    // 3. Cleanup scheduler, tied to process lifetime
    let shutdown = CancellationToken::new();
    let cleanup_handle = tokio::spawn(state.cleanup.clone().run(shutdown.child_token()));

    // 4. HTTP server
    let trace_layer = TraceLayer::new_for_http()
        .make_span_with(|request: &axum::http::Request<_>| {
            let request_id = request
                .headers()
                .get("x-request-id")
                .and_then(|v| v.to_str().ok())
                .unwrap_or("unknown");
            tracing::info_span!(
                "http_request",
                method = %request.method(),
                uri = %request.uri(),
                request_id = %request_id,
            )
        })
        .on_request(|request: &axum::http::Request<_>, _span: &tracing::Span| {
            info!("📥 {} {}", request.method(), request.uri());
        })
        .on_response(
            |response: &axum::http::Response<_>,
             latency: std::time::Duration,
             _span: &tracing::Span| {
                info!(
                    "📤 Finished in {:?} with status {}",
                    latency,
                    response.status()
                );
            },
        );

    let app = create_app(state).layer(trace_layer);
    let listener = tokio::net::TcpListener::bind(config.bind_address()).await?;

    info!("✅ Listening on: http://{}", listener.local_addr()?);
    info!("📖 Swagger UI documentation: http://{}/swagger-ui", listener.local_addr()?);

    let server_shutdown = shutdown.clone();
    if let Err(e) = axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            shutdown_signal().await;
            server_shutdown.cancel();
        })
        .await
    {
        error!("❌ Server runtime error: {}", e);
    }

    // 5. Stop background work
    shutdown.cancel();
    if let Err(e) = cleanup_handle.await {
        error!("Cleanup scheduler ended abnormally: {}", e);
    }

    info!("👋 Marker API exited cleanly.");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!("Failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("⌨️  Ctrl+C received, initiating graceful shutdown...");
        },
        _ = terminate => {
            info!("💤 SIGTERM received, initiating graceful shutdown...");
        },
    }
}
