use plugin_options::{
    config::AppConfig,
    db::{self, SqliteBackend},
    store::{MemoryBackend, OptionsBackend},
    plugin::{PluginIdentity, PluginOptions},
    settings::AuthSettings,
    token::{HostVerifier, KeyedTokenAuthority, TokenAuthority},
    web,
};
use sqlx::sqlite::SqlitePoolOptions;
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize logging first
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "plugin_options=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting plugin-options v{}", env!("CARGO_PKG_VERSION"));

    if let Err(e) = dotenvy::dotenv() {
        info!("No .env file loaded: {}", e);
    }

    let config = AppConfig::load()?;
    info!(plugin = %config.plugin.name, "Configuration loaded");

    let backend: Arc<dyn OptionsBackend> = if AppConfig::memory_mode(std::env::args().skip(1)) {
        warn!("Running with in-memory options backend; changes are lost on exit");
        Arc::new(MemoryBackend::new())
    } else {
        // Initialize database
        let pool = SqlitePoolOptions::new()
            .max_connections(config.database.max_connections)
            .connect(&config.database.url)
            .await?;
        info!("Database connected: {}", config.database.url);

        // Run migrations
        db::init_db(&pool).await?;
        Arc::new(SqliteBackend::new(pool))
    };

    let authority: Arc<dyn TokenAuthority> = if config.token.secret.is_empty() {
        warn!("No token secret configured; generated a random key. Issued tokens will not survive a restart.");
        Arc::new(KeyedTokenAuthority::generate(config.token.lifetime_secs))
    } else {
        Arc::new(KeyedTokenAuthority::new(
            &config.token.secret,
            config.token.lifetime_secs,
        ))
    };

    let verifier = Arc::new(HostVerifier::new(
        authority.clone(),
        config.web.admin_origin.clone(),
    ));

    let mut options = PluginOptions::new(
        PluginIdentity::from(&config.plugin),
        Arc::new(AuthSettings),
        backend,
        authority,
        verifier,
    );
    options.set_token(&config.token.field, &config.token.action);
    info!(
        field = %options.token_gate().field_name(),
        action = %options.token_gate().action(),
        "Request token configured"
    );
    let options = Arc::new(options);

    // Warm the cache and apply any pending migration before serving
    let loaded = options.get_options(true).await?;
    info!(count = loaded.len(), "Options loaded");

    let app = web::create_router(web::AppState { options }, &config.web.admin_origin);

    let addr = config.web.bind_addr();
    let listener = TcpListener::bind(&addr).await?;
    info!("Web server listening on http://{}", addr);

    axum::serve(listener, app).await?;

    Ok(())
}
