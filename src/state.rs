use std::sync::Arc;

use diesel::{
    pg::PgConnection,
    r2d2::{ConnectionManager, PooledConnection},
};

use crate::{
    auth::jwt::JwtService,
    cache::Cache,
    config::AppConfig,
    db::PgPool,
    error::{AppError, AppResult},
    mail::{EmailTemplate, Mailer},
    storage::ObjectStorage,
    verification::VerificationRateLimiter,
};

type PgPooledConnection = PooledConnection<ConnectionManager<PgConnection>>;

#[derive(Clone)]
pub struct AppState {
    pub pool: PgPool,
    pub config: Arc<AppConfig>,
    pub storage: Arc<dyn ObjectStorage>,
    pub mailer: Arc<dyn Mailer>,
    pub cache: Arc<dyn Cache>,
    pub jwt: JwtService,
    pub http: reqwest::Client,
    pub email_template: Arc<EmailTemplate>,
}

impl AppState {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        pool: PgPool,
        config: AppConfig,
        storage: Arc<dyn ObjectStorage>,
        mailer: Arc<dyn Mailer>,
        cache: Arc<dyn Cache>,
        jwt: JwtService,
        http: reqwest::Client,
        email_template: EmailTemplate,
    ) -> Self {
        Self {
            pool,
            config: Arc::new(config),
            storage,
            mailer,
            cache,
            jwt,
            http,
            email_template: Arc::new(email_template),
        }
    }

    pub fn db(&self) -> AppResult<PgPooledConnection> {
        self.pool
            .get()
            .map_err(|err| AppError::internal(format!("database pool error: {err}")))
    }

    pub fn rate_limiter(&self) -> VerificationRateLimiter {
        VerificationRateLimiter::new(self.cache.clone())
    }
}
