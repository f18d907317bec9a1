use std::env;

use anyhow::{Context, Result, anyhow};
use sqlx::{PgPool, postgres::PgPoolOptions};
use tracing::info;
use uuid::Uuid;

use crate::mailer::Mailer;
use crate::modules::uploads::UploadClient;

#[derive(Clone)]
pub struct AppState {
    pool: PgPool,
    mailer: Mailer,
    uploader: UploadClient,
}

impl AppState {
    pub async fn new() -> Result<Self> {
        let database_url = env::var("DATABASE_URL").context("DATABASE_URL env var is missing")?;

        let mailer = Mailer::from_env().context("failed to initialize mail client")?;
        let uploader = UploadClient::from_env().context("failed to initialize upload client")?;

        let pool = PgPoolOptions::new()
            .max_connections(10)
            .connect(&database_url)
            .await
            .context("failed to connect to Postgres")?;

        sqlx::migrate!("./migrations")
            .run(&pool)
            .await
            .context("failed to run database migrations")?;

        Ok(Self {
            pool,
            mailer,
            uploader,
        })
    }

    pub async fn ensure_seed_admin(&self) -> Result<()> {
        let has_admin: bool =
            sqlx::query_scalar("SELECT EXISTS(SELECT 1 FROM users WHERE role = 'admin')")
                .fetch_one(&self.pool)
                .await
                .context("failed to verify admin presence")?;

        if !has_admin {
            let email = env::var("ADMIN_EMAIL").unwrap_or_else(|_| "admin@agency.local".to_string());
            let password_hash = crate::web::auth::hash_password("change-me")
                .map_err(|err| anyhow!("failed to hash seed admin password: {err}"))?;

            sqlx::query(
                "INSERT INTO users (id, email, password_hash, role, email_verified) VALUES ($1, $2, $3, 'admin', TRUE)",
            )
            .bind(Uuid::new_v4())
            .bind(&email)
            .bind(password_hash)
            .execute(&self.pool)
            .await
            .context("failed to insert seed admin user")?;

            info!(%email, "Seeded default admin user (password: 'change-me'). Update it promptly.");
        }

        Ok(())
    }

    pub fn pool_ref(&self) -> &PgPool {
        &self.pool
    }

    pub fn mailer(&self) -> &Mailer {
        &self.mailer
    }

    pub fn uploader(&self) -> &UploadClient {
        &self.uploader
    }
}
