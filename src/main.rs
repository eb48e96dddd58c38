mod config;
mod dto;
mod handler;
mod service;
mod transport;

use tracing_subscriber::EnvFilter;

use std::sync::Arc;

use service::ReplyService;
use transport::SmtpTransportFactory;

#[tokio::main]
async fn main() {
    // Log setup
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    // Load config
    let cfg = config::load_config().unwrap_or_else(|e| {
        tracing::error!("Failed to load auto-reply config: {e}");
        panic!("failed to load auto-reply config: {e}");
    });
    tracing::info!("Successfully loaded auto-reply config");
    tracing::info!(
        "Configured SMTP relay: {}:{} (implicit TLS: {}, timeout: {:?})",
        cfg.smtp.host,
        cfg.smtp.port,
        cfg.smtp.implicit_tls(),
        cfg.smtp.timeout
    );

    let port = cfg.port;

    // Setup service
    let service = Arc::new(ReplyService::new(cfg, Arc::new(SmtpTransportFactory)));

    // Setup router
    let router = handler::router(service);

    // Start server
    let listener = tokio::net::TcpListener::bind(format!("0.0.0.0:{port}"))
        .await
        .expect("Failed to bind to address");
    let addr = listener.local_addr().expect("Failed to read local address");

    tracing::info!(
        "Auto-reply service starting, listening on {}{}",
        addr,
        handler::REPLY_PATH
    );

    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .expect("Failed to start server");
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for shutdown signal: {e}");
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutdown signal received, stopping auto-reply service");
}
