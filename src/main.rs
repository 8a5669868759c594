use std::sync::Arc;
use std::time::Duration;

use axum::http::{HeaderValue, Method, header};
use tokengate::core::auth::{
    AuthApiState, AuthService, BcryptVerifier, JwtConfig, JwtError, JwtService, auth_api_router,
    spawn_session_sweeper,
};
use tokengate::core::cache::{SessionCache, SessionCacheConfig};
use tokengate::core::config::Config;
use tokengate::core::db::{
    DbConfig, DbError, MemorySessionStore, MemoryUserStore, PgPool, PgSessionRepository,
    PgUserRepository, SessionStore, UserStore, create_pool_with_migrations,
};
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing_subscriber::EnvFilter;

type Stores = (Arc<dyn UserStore>, Arc<dyn SessionStore>, Option<PgPool>);

/// PostgreSQL when configured; debug builds fall back to in-memory stores
async fn build_stores() -> Result<Stores, Box<dyn std::error::Error>> {
    match DbConfig::from_env() {
        Ok(db_config) => {
            let pool = create_pool_with_migrations(&db_config).await?;
            tracing::info!("Connected to PostgreSQL");
            let users: Arc<dyn UserStore> = Arc::new(PgUserRepository::new(pool.clone()));
            let sessions: Arc<dyn SessionStore> =
                Arc::new(PgSessionRepository::new(pool.clone()));
            Ok((users, sessions, Some(pool)))
        }
        Err(DbError::MissingDatabaseUrl) if cfg!(debug_assertions) => {
            tracing::warn!("DATABASE_URL not set, using in-memory stores (development only)");
            let users: Arc<dyn UserStore> = Arc::new(MemoryUserStore::new());
            let sessions: Arc<dyn SessionStore> = Arc::new(MemorySessionStore::new());
            Ok((users, sessions, None))
        }
        Err(e) => Err(e.into()),
    }
}

fn build_jwt_service() -> Result<JwtService, JwtError> {
    match JwtService::from_env() {
        Ok(service) => Ok(service),
        Err(JwtError::MissingSecret) if cfg!(debug_assertions) => {
            tracing::warn!("JWT_SECRET not set, using development secrets");
            Ok(JwtService::new(
                JwtConfig::new("tokengate_dev_access_secret_not_for_production")
                    .refresh_secret("tokengate_dev_refresh_secret_not_for_production"),
            ))
        }
        Err(e) => Err(e),
    }
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutdown signal received");
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Load .env file (if exists)
    let _ = dotenvy::dotenv();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let config = Config::from_env()?;
    let cache_config = SessionCacheConfig::from_env();

    // Log config status (without revealing secrets)
    tracing::info!(
        "Config loaded: environment={}, redis={}",
        config.environment,
        cache_config.redis_url.is_some()
    );

    let (users, sessions, pool) = build_stores().await?;
    let jwt = build_jwt_service()?;

    let cache = SessionCache::from_config(&cache_config, jwt.refresh_token_ttl().to_std()?);
    if cache.is_enabled() && !cache.probe().await {
        tracing::warn!("Redis not reachable at startup, serving from the session store");
    }

    let auth_service = AuthService::new(
        users,
        sessions,
        Arc::new(BcryptVerifier::new(config.bcrypt_cost)),
        jwt,
        cache,
    );

    let sweeper = spawn_session_sweeper(
        auth_service.clone(),
        Duration::from_secs(config.sweep_interval_secs),
    );

    let cors = CorsLayer::new()
        .allow_origin(config.frontend_url.parse::<HeaderValue>()?)
        .allow_credentials(true)
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers([header::AUTHORIZATION, header::CONTENT_TYPE]);

    let mut state = AuthApiState::new(auth_service, config.environment);
    if let Some(pool) = pool {
        state = state.with_database(pool);
    }

    let app = auth_api_router(state)
        .layer(cors)
        .layer(TraceLayer::new_for_http());

    let listener = tokio::net::TcpListener::bind(config.bind_addr).await?;
    tracing::info!("listening on http://{}", config.bind_addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    if let Some(handle) = sweeper {
        handle.abort();
    }

    tracing::info!("Server stopped");
    Ok(())
}
