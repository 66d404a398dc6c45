//! Pharma Assistant - LLM research agent over openFDA, Neo4j and a report corpus
//!
//! A Rust backend running a tool-calling agent loop as a pure state machine,
//! served over HTTP with streamed intermediate steps.

mod api;
mod config;
mod llm;
mod runtime;
mod session;
mod setup;
mod state_machine;
mod system_prompt;
mod tools;

use api::{create_router, AppState};
use config::{AgentConfig, ServerConfig};
use session::Session;
use setup::DefaultAgentFactory;
use std::net::SocketAddr;
use std::sync::Arc;
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Local .env is optional
    let dotenv = dotenvy::dotenv();

    // Initialize logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "pharma_assistant=info,tower_http=info".into()),
        )
        .with(
            tracing_subscriber::fmt::layer()
                .json()
                .with_current_span(false)
                .with_span_list(false),
        )
        .init();

    if let Ok(path) = dotenv {
        tracing::info!(path = %path.display(), "Loaded environment file");
    }

    // Configuration
    let config = ServerConfig::from_env();
    tracing::info!(
        model = %config.agent.model,
        max_rounds = config.agent.max_rounds,
        parallel_tools = config.agent.parallel_tools,
        "Agent settings loaded"
    );

    let session = Arc::new(Session::new(Arc::new(DefaultAgentFactory::new(
        config.agent.clone(),
    ))));

    // Eager initialization when credentials come from the environment
    match AgentConfig::from_env() {
        Some(agent_config) => {
            if let Err(e) = session.initialize(&agent_config).await {
                tracing::warn!(error = %e, "Startup initialization failed; waiting for /api/configure");
            }
        }
        None => tracing::info!("No credentials in environment; waiting for /api/configure"),
    }

    // Create router
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let app = create_router(AppState::new(session))
        .layer(cors)
        .layer(TraceLayer::new_for_http());

    // Start server
    let addr = SocketAddr::from(([0, 0, 0, 0], config.port));
    tracing::info!("Pharma assistant listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
