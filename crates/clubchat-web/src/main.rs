mod error;
mod routes;

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::{Context, Result};
use clubchat_core::auth::AuthService;
use clubchat_core::config::ClubChatConfig;
use clubchat_core::llm::LlmService;
use clubchat_core::storage::{self, SqliteStorage};

/// Handles shared by every request, built once at startup.
pub struct AppState {
    pub storage: SqliteStorage,
    pub auth: AuthService,
    pub config: ClubChatConfig,
    pub llm: Option<LlmService>,
}

#[tokio::main]
async fn main() -> Result<()> {
    // A missing .env is normal outside local development.
    let _ = dotenvy::dotenv();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                tracing_subscriber::EnvFilter::new("clubchat_web=info,clubchat_core=info")
            }),
        )
        .init();

    let cwd = std::env::current_dir().ok();
    let config = ClubChatConfig::load(cwd.as_deref()).context("failed to load configuration")?;

    let auth = AuthService::from_config(&config.auth)
        .context("refusing to start without a token signing secret")?;

    let storage = storage::create_backend(&config).context("failed to open club store")?;
    tracing::info!(path = %storage.path().display(), "club store ready");

    let llm = if config.llm.enabled {
        match LlmService::from_config(&config.llm) {
            Ok(service) => {
                tracing::info!(
                    provider = service.provider_name(),
                    model = service.model(),
                    "language model configured"
                );
                Some(service)
            }
            Err(e) => {
                tracing::warn!("language model disabled: {e}");
                None
            }
        }
    } else {
        None
    };

    let addr = format!("{}:{}", config.web.host, config.web.port);

    let state = Arc::new(AppState {
        storage,
        auth,
        config,
        llm,
    });

    let app = routes::router(state)
        .layer(tower_http::trace::TraceLayer::new_for_http())
        .layer(tower_http::cors::CorsLayer::permissive());

    tracing::info!("clubchat-web listening on http://{addr}");

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .await?;

    Ok(())
}
