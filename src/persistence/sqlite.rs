//! SQLite implementation of GrantRepository and GrantLedger.
//!
//! Schema:
//! - `grant_proposals`: one row per active proposal, keyed by voting message
//! - `voters`: (user_id, voting_message_id), cascades from `grant_proposals`
//! - `granted_points`: append-only record of applied grants

use super::repository::{GrantRepository, RepositoryError, RepositoryResult};
use crate::chat::{ChannelId, MessageId, UserId};
use crate::grants::ledger::{GrantLedger, LedgerError};
use crate::grants::proposal::{unix_now, Proposal, Voter};
use async_trait::async_trait;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use sqlx::FromRow;
use std::collections::HashMap;
use std::path::Path;
use std::str::FromStr;

const SCHEMA: [&str; 3] = [
    r#"
    CREATE TABLE IF NOT EXISTS grant_proposals (
        voting_message_id INTEGER PRIMARY KEY,
        message_id INTEGER NOT NULL,
        bot_response_message_id INTEGER NOT NULL,
        channel_id INTEGER NOT NULL,
        author_id INTEGER NOT NULL,
        beneficiary_id INTEGER NOT NULL,
        amount INTEGER NOT NULL CHECK (amount > 0),
        description TEXT NOT NULL,
        timer_secs INTEGER NOT NULL,
        created_at INTEGER NOT NULL
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS voters (
        user_id INTEGER NOT NULL,
        voting_message_id INTEGER NOT NULL
            REFERENCES grant_proposals (voting_message_id) ON DELETE CASCADE,
        voted_at INTEGER NOT NULL,
        PRIMARY KEY (user_id, voting_message_id)
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS granted_points (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        beneficiary_id INTEGER NOT NULL,
        amount INTEGER NOT NULL,
        granted_at INTEGER NOT NULL
    )
    "#,
];

/// SQLite-backed proposal repository
#[derive(Clone)]
pub struct SqliteGrantRepository {
    pool: SqlitePool,
}

#[derive(FromRow)]
struct ProposalRow {
    voting_message_id: i64,
    message_id: i64,
    bot_response_message_id: i64,
    channel_id: i64,
    author_id: i64,
    beneficiary_id: i64,
    amount: i64,
    description: String,
    timer_secs: i64,
    created_at: i64,
}

#[derive(FromRow)]
struct VoterRow {
    user_id: i64,
    voting_message_id: i64,
    voted_at: i64,
}

impl ProposalRow {
    fn into_proposal(self, voters: Vec<Voter>) -> Proposal {
        Proposal {
            voting_message_id: MessageId(self.voting_message_id as u64),
            message_id: MessageId(self.message_id as u64),
            bot_response_message_id: MessageId(self.bot_response_message_id as u64),
            channel_id: ChannelId(self.channel_id as u64),
            author: UserId(self.author_id as u64),
            beneficiary: UserId(self.beneficiary_id as u64),
            amount: self.amount as u64,
            description: self.description,
            timer_secs: self.timer_secs.max(0) as u64,
            created_at: self.created_at as u64,
            voters,
        }
    }
}

impl From<VoterRow> for Voter {
    fn from(row: VoterRow) -> Self {
        Voter {
            user_id: UserId(row.user_id as u64),
            voting_message_id: MessageId(row.voting_message_id as u64),
            voted_at: row.voted_at as u64,
        }
    }
}

impl SqliteGrantRepository {
    /// Open (or create) the database file and apply the schema
    pub async fn open(path: &Path) -> RepositoryResult<Self> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(|e| {
                RepositoryError::Unavailable(format!(
                    "Failed to create database directory '{}': {}",
                    parent.display(),
                    e
                ))
            })?;
        }

        let options = SqliteConnectOptions::new()
            .filename(path)
            .create_if_missing(true)
            .foreign_keys(true);
        let pool = SqlitePoolOptions::new()
            .max_connections(4)
            .connect_with(options)
            .await?;

        let repository = Self { pool };
        repository.migrate().await?;
        Ok(repository)
    }

    /// Private in-memory database (single connection, lives as long as the pool)
    pub async fn in_memory() -> RepositoryResult<Self> {
        let options = SqliteConnectOptions::from_str("sqlite::memory:")?.foreign_keys(true);
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect_with(options)
            .await?;

        let repository = Self { pool };
        repository.migrate().await?;
        Ok(repository)
    }

    async fn migrate(&self) -> RepositoryResult<()> {
        for statement in SCHEMA {
            sqlx::query(statement).execute(&self.pool).await?;
        }
        Ok(())
    }

    /// Total points granted per beneficiary, largest first
    pub async fn granted_totals(&self) -> RepositoryResult<Vec<(UserId, u64)>> {
        let rows: Vec<(i64, i64)> = sqlx::query_as(
            r#"
            SELECT beneficiary_id, SUM(amount) AS total
            FROM granted_points
            GROUP BY beneficiary_id
            ORDER BY total DESC, beneficiary_id
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .into_iter()
            .map(|(beneficiary, total)| (UserId(beneficiary as u64), total as u64))
            .collect())
    }

    pub async fn close(&self) {
        self.pool.close().await;
    }
}

fn map_write_error(err: sqlx::Error, what: String) -> RepositoryError {
    match err.as_database_error() {
        Some(db) if db.is_unique_violation() => RepositoryError::Duplicate(what),
        Some(db) if db.is_foreign_key_violation() => RepositoryError::Missing(what),
        _ => RepositoryError::Database(err),
    }
}

#[async_trait]
impl GrantRepository for SqliteGrantRepository {
    async fn insert_proposal(&self, proposal: &Proposal) -> RepositoryResult<()> {
        sqlx::query(
            r#"
            INSERT INTO grant_proposals (
                voting_message_id, message_id, bot_response_message_id, channel_id,
                author_id, beneficiary_id, amount, description, timer_secs, created_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)
            "#,
        )
        .bind(proposal.voting_message_id.0 as i64)
        .bind(proposal.message_id.0 as i64)
        .bind(proposal.bot_response_message_id.0 as i64)
        .bind(proposal.channel_id.0 as i64)
        .bind(proposal.author.0 as i64)
        .bind(proposal.beneficiary.0 as i64)
        .bind(proposal.amount as i64)
        .bind(proposal.description.as_str())
        .bind(proposal.timer_secs as i64)
        .bind(proposal.created_at as i64)
        .execute(&self.pool)
        .await
        .map_err(|e| map_write_error(e, format!("proposal {}", proposal.voting_message_id)))?;

        Ok(())
    }

    async fn delete_proposal(&self, voting_message_id: MessageId) -> RepositoryResult<()> {
        let result = sqlx::query("DELETE FROM grant_proposals WHERE voting_message_id = ?1")
            .bind(voting_message_id.0 as i64)
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(RepositoryError::Missing(format!(
                "proposal {}",
                voting_message_id
            )));
        }
        Ok(())
    }

    async fn update_timer(
        &self,
        voting_message_id: MessageId,
        remaining_secs: u64,
    ) -> RepositoryResult<()> {
        let result =
            sqlx::query("UPDATE grant_proposals SET timer_secs = ?2 WHERE voting_message_id = ?1")
                .bind(voting_message_id.0 as i64)
                .bind(remaining_secs as i64)
                .execute(&self.pool)
                .await?;

        if result.rows_affected() == 0 {
            return Err(RepositoryError::Missing(format!(
                "proposal {}",
                voting_message_id
            )));
        }
        Ok(())
    }

    async fn insert_voter(&self, voter: &Voter) -> RepositoryResult<()> {
        sqlx::query(
            "INSERT INTO voters (user_id, voting_message_id, voted_at) VALUES (?1, ?2, ?3)",
        )
        .bind(voter.user_id.0 as i64)
        .bind(voter.voting_message_id.0 as i64)
        .bind(voter.voted_at as i64)
        .execute(&self.pool)
        .await
        .map_err(|e| {
            map_write_error(
                e,
                format!("voter {} on {}", voter.user_id, voter.voting_message_id),
            )
        })?;

        Ok(())
    }

    async fn delete_voter(
        &self,
        user_id: UserId,
        voting_message_id: MessageId,
    ) -> RepositoryResult<()> {
        let result =
            sqlx::query("DELETE FROM voters WHERE user_id = ?1 AND voting_message_id = ?2")
                .bind(user_id.0 as i64)
                .bind(voting_message_id.0 as i64)
                .execute(&self.pool)
                .await?;

        if result.rows_affected() == 0 {
            return Err(RepositoryError::Missing(format!(
                "voter {} on {}",
                user_id, voting_message_id
            )));
        }
        Ok(())
    }

    async fn load_proposals(&self) -> RepositoryResult<Vec<Proposal>> {
        let proposals: Vec<ProposalRow> = sqlx::query_as(
            r#"
            SELECT voting_message_id, message_id, bot_response_message_id, channel_id,
                   author_id, beneficiary_id, amount, description, timer_secs, created_at
            FROM grant_proposals
            ORDER BY created_at, voting_message_id
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        let voter_rows: Vec<VoterRow> = sqlx::query_as(
            "SELECT user_id, voting_message_id, voted_at FROM voters ORDER BY voted_at, user_id",
        )
        .fetch_all(&self.pool)
        .await?;

        let mut voters: HashMap<i64, Vec<Voter>> = HashMap::new();
        for row in voter_rows {
            voters
                .entry(row.voting_message_id)
                .or_default()
                .push(Voter::from(row));
        }

        Ok(proposals
            .into_iter()
            .map(|row| {
                let own_voters = voters.remove(&row.voting_message_id).unwrap_or_default();
                row.into_proposal(own_voters)
            })
            .collect())
    }
}

#[async_trait]
impl GrantLedger for SqliteGrantRepository {
    async fn grant(&self, beneficiary: UserId, amount: u64) -> Result<(), LedgerError> {
        sqlx::query(
            "INSERT INTO granted_points (beneficiary_id, amount, granted_at) VALUES (?1, ?2, ?3)",
        )
        .bind(beneficiary.0 as i64)
        .bind(amount as i64)
        .bind(unix_now() as i64)
        .execute(&self.pool)
        .await
        .map_err(|e| LedgerError::Write(e.to_string()))?;

        Ok(())
    }
}
