//! # OAuth2 Token Repository
//!
//! Durable storage for per-marketplace OAuth2 token pairs, upsert by
//! system. No expiry checking happens here: adapters decide when to
//! refresh.

use std::str::FromStr;

use chrono::{DateTime, Utc};
use sqlx::SqlitePool;
use tracing::info;

use crate::error::{DbError, DbResult};
use shopsync_core::{Oauth2Tokens, System};

#[derive(Debug, sqlx::FromRow)]
struct Oauth2Row {
    system: String,
    access_token: String,
    refresh_token: String,
    created_on: DateTime<Utc>,
    expires_on: DateTime<Utc>,
}

impl Oauth2Row {
    fn into_tokens(self) -> DbResult<Oauth2Tokens> {
        let system = System::from_str(&self.system)
            .map_err(|e| DbError::Corrupt(format!("bad system column: {e}")))?;
        Ok(Oauth2Tokens {
            system,
            access_token: self.access_token,
            refresh_token: self.refresh_token,
            created_on: self.created_on,
            expires_on: self.expires_on,
        })
    }
}

/// Repository for OAuth2 token pairs.
#[derive(Debug, Clone)]
pub struct Oauth2Repository {
    pool: SqlitePool,
}

impl Oauth2Repository {
    /// Creates a new Oauth2Repository.
    pub fn new(pool: SqlitePool) -> Self {
        Oauth2Repository { pool }
    }

    /// Saves the token pair for a system, refreshing `created_on`.
    ///
    /// UPDATE-then-INSERT: the first save for a system creates its row.
    pub async fn save(
        &self,
        system: System,
        access_token: &str,
        refresh_token: &str,
        expires_on: DateTime<Utc>,
    ) -> DbResult<()> {
        info!(system = %system, %expires_on, "Saving OAuth2 tokens");

        let created_on = Utc::now();

        let updated = sqlx::query(
            r#"
            UPDATE oauth2
            SET access_token = ?1, refresh_token = ?2, expires_on = ?3, created_on = ?4
            WHERE system = ?5
            "#,
        )
        .bind(access_token)
        .bind(refresh_token)
        .bind(expires_on)
        .bind(created_on)
        .bind(system.as_str())
        .execute(&self.pool)
        .await?;

        if updated.rows_affected() == 0 {
            sqlx::query(
                r#"
                INSERT INTO oauth2 (system, access_token, refresh_token, created_on, expires_on)
                VALUES (?1, ?2, ?3, ?4, ?5)
                "#,
            )
            .bind(system.as_str())
            .bind(access_token)
            .bind(refresh_token)
            .bind(created_on)
            .bind(expires_on)
            .execute(&self.pool)
            .await?;
        }

        Ok(())
    }

    /// Retrieves the stored token pair for a system.
    ///
    /// ## Returns
    /// * `Err(DbError::NotFound)` - no token has ever been stored
    pub async fn get(&self, system: System) -> DbResult<Oauth2Tokens> {
        let row = sqlx::query_as::<_, Oauth2Row>(
            r#"
            SELECT system, access_token, refresh_token, created_on, expires_on
            FROM oauth2
            WHERE system = ?1
            "#,
        )
        .bind(system.as_str())
        .fetch_optional(&self.pool)
        .await?;

        match row {
            Some(row) => row.into_tokens(),
            None => Err(DbError::not_found("Oauth2Tokens", system.as_str())),
        }
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use crate::pool::{Database, DbConfig};
    use chrono::{Duration, Utc};
    use shopsync_core::System;

    async fn db() -> Database {
        Database::new(DbConfig::in_memory()).await.unwrap()
    }

    #[tokio::test]
    async fn test_get_missing_is_not_found() {
        let db = db().await;
        let err = db.oauth2().get(System::Lazada).await.unwrap_err();
        assert!(err.is_not_found());
    }

    #[tokio::test]
    async fn test_save_is_upsert_by_system() {
        let db = db().await;
        let repo = db.oauth2();
        let expires = Utc::now() + Duration::seconds(3600);

        repo.save(System::Lazada, "access-1", "refresh-1", expires)
            .await
            .unwrap();
        let got = repo.get(System::Lazada).await.unwrap();
        assert_eq!(got.access_token, "access-1");
        assert_eq!(got.refresh_token, "refresh-1");

        repo.save(System::Lazada, "access-2", "refresh-2", expires)
            .await
            .unwrap();
        let got = repo.get(System::Lazada).await.unwrap();
        assert_eq!(got.access_token, "access-2");
        assert_eq!(got.system, System::Lazada);
    }

    #[tokio::test]
    async fn test_systems_are_independent() {
        let db = db().await;
        let repo = db.oauth2();
        let expires = Utc::now() + Duration::seconds(3600);

        repo.save(System::Lazada, "lz", "lz-r", expires).await.unwrap();
        repo.save(System::Tiktok, "tk", "tk-r", expires).await.unwrap();

        assert_eq!(repo.get(System::Lazada).await.unwrap().access_token, "lz");
        assert_eq!(repo.get(System::Tiktok).await.unwrap().access_token, "tk");
    }
}
