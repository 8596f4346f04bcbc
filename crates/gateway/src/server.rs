use std::{net::SocketAddr, sync::Arc};

use {
    axum::{
        Router,
        routing::{get, post},
    },
    tower_http::{
        cors::{Any, CorsLayer},
        trace::TraceLayer,
    },
    tracing::info,
};

use crate::{routes, state::GatewayState};

// ── Router ───────────────────────────────────────────────────────────────────

/// Build the gateway router (shared between production startup and tests).
pub fn build_gateway_app(state: Arc<GatewayState>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let api = Router::new()
        .route("/sandbox/create", post(routes::create_sandbox))
        .route("/sandbox/destroy", post(routes::destroy_sandbox))
        .route("/execute", post(routes::execute))
        .route("/exec", post(routes::exec_script))
        .route("/run", post(routes::run_oneshot))
        .route("/sandboxes", get(routes::list_sandboxes))
        .route("/sandboxes/{name}", get(routes::get_sandbox))
        .route("/sandboxes/{name}/logs", get(routes::sandbox_logs))
        .route("/pods", get(routes::list_pods));

    Router::new()
        .route("/health", get(routes::health))
        .route("/", get(routes::index))
        .nest("/api/v1", api)
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}

// ── Server startup ───────────────────────────────────────────────────────────

/// Serve the HTTP API until the process is stopped, then destroy every
/// sandbox this server created.
pub async fn start_gateway(state: Arc<GatewayState>, bind: &str, port: u16) -> anyhow::Result<()> {
    let app = build_gateway_app(Arc::clone(&state));

    let addr: SocketAddr = format!("{bind}:{port}").parse()?;
    check_exposure(state.engine.backend_name(), &addr)?;
    let listener = tokio::net::TcpListener::bind(addr).await?;

    let lines = [
        format!("sandboxed gateway v{}", state.version),
        format!("listening on {addr}"),
        format!("cluster backend: {}", state.engine.backend_name()),
        format!("default namespace: {}", state.engine.config().namespace),
    ];
    let width = lines.iter().map(|l| l.len()).max().unwrap_or(0) + 4;
    info!("┌{}┐", "─".repeat(width));
    for line in &lines {
        info!("│  {:<w$}│", line, w = width - 2);
    }
    info!("└{}┘", "─".repeat(width));

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    let destroyed = state.engine.destroy_all().await;
    info!(destroyed, "gateway stopped");
    Ok(())
}

/// The local backend runs commands on this host, so it only serves loopback.
fn check_exposure(backend: &str, addr: &SocketAddr) -> anyhow::Result<()> {
    if backend == "local" && !addr.ip().is_loopback() {
        anyhow::bail!(
            "refusing to listen on {addr} with the local backend, which runs commands \
             directly on this host; bind a loopback address or use the kubectl backend"
        );
    }
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::warn!(error = %e, "failed to listen for ctrl-c");
        std::future::pending::<()>().await;
    }
    info!("shutdown requested");
}
