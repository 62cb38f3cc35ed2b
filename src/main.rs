use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::bail;
use clap::Parser;
use tracing_subscriber::EnvFilter;

use postline::auth::google::{DynIdentityProvider, GoogleProvider};
use postline::auth::tokens::TokenService;
use postline::config::{Cli, Command, Config};
use postline::db;
use postline::routes;
use postline::state::AppState;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    // Parse CLI args and load config
    let cli = Cli::parse();
    let data_dir = Config::data_dir(&cli);
    std::fs::create_dir_all(&data_dir)?;
    tracing::info!("Data directory: {}", data_dir.display());

    let config = Config::load(&cli)?;

    // Initialize database
    let pool = db::create_pool(&config.db_path())?;
    db::run_migrations(&pool)?;

    let tokens = TokenService::new(
        config.auth.jwt_secret.as_deref(),
        config.auth.token_ttl_days,
    );
    let identity = if config.google.is_configured() {
        GoogleProvider::from_config(&config.google)
            .map(|provider| Arc::new(provider) as DynIdentityProvider)
    } else {
        tracing::info!("Google sign-in disabled (no client credentials)");
        None
    };

    let state = AppState::new(pool, config.clone(), tokens, identity);

    match cli.command.unwrap_or(Command::Serve) {
        Command::Reconcile => {
            let corrected = state.posts.reconcile_all().await?;
            tracing::info!("Reconciled posts: {} corrected", corrected);
            Ok(())
        }
        Command::Serve => {
            if !state.tokens.is_configured() {
                bail!("no token signing secret: set auth.jwt_secret or POSTLINE_JWT_SECRET");
            }
            serve(state, &config).await
        }
    }
}

async fn serve(state: AppState, config: &Config) -> anyhow::Result<()> {
    let app = routes::app(state);

    let addr: SocketAddr = format!("{}:{}", config.server.host, config.server.port).parse()?;
    tracing::info!("Listening on http://{}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
