use std::net::SocketAddr;
use std::path::Path;
use std::sync::Arc;

use diesel_migrations::{embed_migrations, EmbeddedMigrations, MigrationHarness};
use tokio::net::TcpListener;
use tracing_subscriber::EnvFilter;

use attesta::auth::jwt::JwtService;
use attesta::cache::MemoryCache;
use attesta::config::AppConfig;
use attesta::create_router;
use attesta::db;
use attesta::mail::{EmailTemplate, HttpApiMailer, LogMailer, Mailer};
use attesta::s3::build_client;
use attesta::state::AppState;
use attesta::storage::S3Storage;

const MIGRATIONS: EmbeddedMigrations = embed_migrations!("migrations");

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv::dotenv().ok();
    init_tracing();

    let config = AppConfig::from_env()?;
    tracing::info!(
        component = "server",
        database_url = %config.redacted_database_url(),
        pool_size = config.database_max_pool_size,
        server_host = %config.server_host,
        server_port = config.server_port,
        mail_api_enabled = config.mail_api_url.is_some(),
        recaptcha_enabled = config.recaptcha_secret_key.is_some(),
        s3_bucket = %config.s3_bucket,
        "loaded configuration"
    );

    let pool = db::init_pool(&config.database_url, config.database_max_pool_size)?;
    {
        let mut conn = pool.get()?;
        conn.run_pending_migrations(MIGRATIONS)
            .map_err(|err| anyhow::anyhow!("failed to run migrations: {err}"))?;
    }

    let s3_client = build_client(&config).await?;
    let storage = Arc::new(S3Storage::new(s3_client, config.s3_bucket.clone()));
    let jwt = JwtService::from_config(&config)?;
    let http = reqwest::Client::new();

    let mailer: Arc<dyn Mailer> = match &config.mail_api_url {
        Some(api_url) => Arc::new(HttpApiMailer::new(
            http.clone(),
            api_url.clone(),
            config.mail_api_token.clone(),
            config.mail_from.clone(),
        )),
        None => {
            tracing::warn!("MAIL_API_URL not set, outgoing mail will only be logged");
            Arc::new(LogMailer)
        }
    };

    let email_template = match &config.email_template_path {
        Some(path) => EmailTemplate::load_from_frontend_asset(Path::new(path)),
        None => EmailTemplate::built_in(),
    };

    let cache = Arc::new(MemoryCache::new());

    let state = AppState::new(
        pool,
        config,
        storage,
        mailer,
        cache,
        jwt,
        http,
        email_template,
    );

    let listen_addr: SocketAddr = {
        let config = state.config.clone();
        format!("{}:{}", config.server_host, config.server_port).parse()?
    };
    let router = create_router(state);

    let listener = TcpListener::bind(listen_addr).await?;
    tracing::info!("listening on {}", listen_addr);

    axum::serve(listener, router).await?;
    Ok(())
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .compact()
        .init();
}
