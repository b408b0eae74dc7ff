//! `SQLite` snapshot store.

use std::collections::{BTreeSet, HashMap, VecDeque};

use chrono::{DateTime, Utc};
use sqlx::Row;
use sqlx::sqlite::{SqlitePool, SqlitePoolOptions};
use tracing::{debug, info};

use super::{PersistenceError, PersistenceProvider};
use crate::account::Account;

/// Provider keeping the snapshot in two `SQLite` tables.
///
/// `save_all` rewrites both tables inside one transaction.
#[derive(Debug, Clone)]
pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    /// Open (or create) the database at `database_path`.
    ///
    /// # Errors
    ///
    /// Returns an error if the database connection fails or schema creation fails.
    pub async fn new(database_path: &str) -> Result<Self, PersistenceError> {
        let url = format!("sqlite:{database_path}?mode=rwc");
        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect(&url)
            .await?;

        let store = Self { pool };
        store.initialize().await?;
        Ok(store)
    }

    /// Create an in-memory store for testing.
    ///
    /// # Errors
    ///
    /// Returns an error if the database connection fails or schema creation fails.
    pub async fn in_memory() -> Result<Self, PersistenceError> {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await?;

        let store = Self { pool };
        store.initialize().await?;
        Ok(store)
    }

    async fn initialize(&self) -> Result<(), PersistenceError> {
        sqlx::query(
            r"
            CREATE TABLE IF NOT EXISTS accounts (
                username TEXT PRIMARY KEY NOT NULL,
                password_hash TEXT NOT NULL,
                roles TEXT NOT NULL,
                expires_at TEXT NOT NULL
            )
            ",
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r"
            CREATE TABLE IF NOT EXISTS password_history (
                username TEXT NOT NULL REFERENCES accounts(username) ON DELETE CASCADE,
                position INTEGER NOT NULL,
                password_hash TEXT NOT NULL,
                PRIMARY KEY (username, position)
            )
            ",
        )
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn load_history(&self) -> Result<HashMap<String, VecDeque<String>>, PersistenceError> {
        let rows = sqlx::query(
            r"
            SELECT username, password_hash
            FROM password_history
            ORDER BY username ASC, position ASC
            ",
        )
        .fetch_all(&self.pool)
        .await?;

        let mut history: HashMap<String, VecDeque<String>> = HashMap::new();
        for row in &rows {
            let username: String = row.try_get("username")?;
            let hash: String = row.try_get("password_hash")?;
            history.entry(username).or_default().push_back(hash);
        }
        Ok(history)
    }
}

impl PersistenceProvider for SqliteStore {
    async fn load_all(&self) -> Result<Vec<Account>, PersistenceError> {
        let rows = sqlx::query(
            r"
            SELECT username, password_hash, roles, expires_at
            FROM accounts
            ORDER BY username ASC
            ",
        )
        .fetch_all(&self.pool)
        .await?;

        let mut history = self.load_history().await?;
        let mut accounts = Vec::with_capacity(rows.len());
        for row in &rows {
            let username: String = row.try_get("username")?;
            let password_history = history.remove(&username).unwrap_or_default();
            accounts.push(row_to_account(row, username, password_history)?);
        }

        info!("Restored {} accounts from database", accounts.len());
        Ok(accounts)
    }

    async fn save_all(&self, accounts: &[Account]) -> Result<(), PersistenceError> {
        let mut tx = self.pool.begin().await?;

        sqlx::query("DELETE FROM password_history")
            .execute(&mut *tx)
            .await?;
        sqlx::query("DELETE FROM accounts").execute(&mut *tx).await?;

        for account in accounts {
            let roles = serde_json::to_string(&account.roles)?;
            sqlx::query(
                r"
                INSERT INTO accounts (username, password_hash, roles, expires_at)
                VALUES (?, ?, ?, ?)
                ",
            )
            .bind(&account.username)
            .bind(&account.password_hash)
            .bind(roles)
            .bind(account.expires_at.to_rfc3339())
            .execute(&mut *tx)
            .await?;

            let mut position: i64 = 0;
            for hash in &account.password_history {
                sqlx::query(
                    r"
                    INSERT INTO password_history (username, position, password_hash)
                    VALUES (?, ?, ?)
                    ",
                )
                .bind(&account.username)
                .bind(position)
                .bind(hash)
                .execute(&mut *tx)
                .await?;
                position += 1;
            }
        }

        tx.commit().await?;
        debug!("Saved {} accounts to database", accounts.len());
        Ok(())
    }
}

/// Convert a database row plus its history into an Account.
fn row_to_account(
    row: &sqlx::sqlite::SqliteRow,
    username: String,
    password_history: VecDeque<String>,
) -> Result<Account, PersistenceError> {
    let roles: String = row.try_get("roles")?;
    let roles: BTreeSet<String> = serde_json::from_str(&roles)?;

    let expires_at: String = row.try_get("expires_at")?;
    let expires_at = DateTime::parse_from_rfc3339(&expires_at)
        .map_err(|e| PersistenceError::Corrupt(format!("expires_at for {username}: {e}")))?
        .with_timezone(&Utc);

    Ok(Account {
        password_hash: row.try_get("password_hash")?,
        username,
        roles,
        password_history,
        expires_at,
    })
}
