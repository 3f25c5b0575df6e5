//! Demo host application with the relay agent mounted.
//!
//! Run with: cargo run -p relay-demo
//!
//! A panel connects over ws://localhost:3000/ws. Configuration comes from
//! the `CONSOLE_RELAY_*` environment variables.

use std::{net::SocketAddr, sync::Arc, time::Duration};

use anyhow::Context;
use axum::{Json, Router, extract::State, routing::get};
use console_relay_agent::Agent;
use console_relay_core::{AgentConfig, Arg, Console};
use console_relay_transport::websocket::create_ws_router;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    let config = AgentConfig::from_env().context("invalid relay configuration")?;
    let console = Arc::new(Console::stdio());
    let agent = Arc::new(Agent::new(config, Arc::clone(&console))?);
    agent.activate();

    let heartbeat = tokio::spawn({
        let console = Arc::clone(&console);
        async move {
            let mut interval = tokio::time::interval(Duration::from_secs(2));
            let mut beat = 0_i64;
            loop {
                interval.tick().await;
                beat += 1;
                console.log(&[Arg::from("heartbeat"), Arg::from(beat)]);
            }
        }
    });

    let app = Router::new()
        .route("/status", get(status_handler))
        .with_state(Arc::clone(&agent))
        .merge(create_ws_router(Arc::clone(&agent)))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive());

    let addr = SocketAddr::from(([127, 0, 0, 1], 3000));
    tracing::info!("Relay demo listening on http://{addr}");

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind {addr}"))?;
    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
        })
        .await?;

    heartbeat.abort();
    let report = agent.deactivate().await;
    if report.unflushed > 0 {
        tracing::warn!(unflushed = report.unflushed, "shut down with unflushed writes");
    }
    Ok(())
}

async fn status_handler(State(agent): State<Arc<Agent>>) -> Json<serde_json::Value> {
    let status = agent.status();
    Json(serde_json::json!({
        "enabled": status.enabled,
        "destination": status.destination,
        "connected": agent.is_connected(),
    }))
}
