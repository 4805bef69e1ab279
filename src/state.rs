use std::sync::Arc;

use anyhow::Context;
use sqlx::{postgres::PgPoolOptions, PgPool};

use crate::config::AppConfig;
use crate::users::repo::{PgUserStore, UserStore};

#[derive(Clone)]
pub struct AppState {
    pub users: Arc<dyn UserStore>,
    pub config: Arc<AppConfig>,
}

impl AppState {
    pub fn from_parts(users: Arc<dyn UserStore>, config: Arc<AppConfig>) -> Self {
        Self { users, config }
    }

    /// State backed by Postgres. The pool is returned too so the caller can
    /// close it after the server stops.
    pub async fn connect(config: AppConfig) -> anyhow::Result<(Self, PgPool)> {
        let db = PgPoolOptions::new()
            .max_connections(config.max_connections)
            .connect(&config.database_url)
            .await
            .context("connect to database")?;

        sqlx::migrate!("./migrations")
            .run(&db)
            .await
            .context("run migrations")?;

        let users = Arc::new(PgUserStore::new(db.clone())) as Arc<dyn UserStore>;
        Ok((Self::from_parts(users, Arc::new(config)), db))
    }

    #[cfg(test)]
    pub fn fake() -> Self {
        use crate::users::repo::memory::MemoryUserStore;

        let users = Arc::new(MemoryUserStore::default()) as Arc<dyn UserStore>;
        Self::from_parts(users, Arc::new(AppConfig::for_tests()))
    }
}
