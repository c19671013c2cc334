//! PostgreSQL storage for payment claims
//!
//! Claims live in a single `payment_claims` table with ENUM-typed method and
//! status columns. The schema is applied on startup from an embedded
//! migration. A partial unique index keeps one claim per on-chain
//! transaction.

use anyhow::Result;
use deadpool_postgres::{Config, Pool, Runtime};
use serde::{Deserialize, Serialize};
use tokio_postgres::error::SqlState;
use tokio_postgres::NoTls;
use tracing::info;

use crate::claims::{ClaimStatus, NewClaim, PaymentClaim, PaymentMethod};

/// Database pool configuration
const DB_POOL_MAX_SIZE: usize = 20;
const DB_QUERY_TIMEOUT_SECS: u64 = 30;

const CLAIM_COLUMNS: &str = "id, user_id, username, first_name, last_name, method, proof, \
     wallet_address, personal_link, status, notes, created_at, updated_at";

// ============================================================================
// RESULT TYPES
// ============================================================================

/// Outcome of a moderation transition
#[derive(Debug)]
pub enum TransitionOutcome {
    /// The claim moved; carries the post-transition row
    Applied(PaymentClaim),
    /// No claim with that id
    NotFound,
    /// The claim already left pending; carries its current status
    AlreadyFinal(ClaimStatus),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatusCount {
    pub status: ClaimStatus,
    pub count: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MethodCount {
    pub method: PaymentMethod,
    pub count: i64,
}

// ============================================================================
// PG STORAGE
// ============================================================================

#[derive(Clone)]
pub struct PgStorage {
    pool: Pool,
}

impl PgStorage {
    /// Create storage from a PostgreSQL connection string
    pub async fn new(database_url: &str) -> Result<Self> {
        use deadpool_postgres::{ManagerConfig, PoolConfig, RecyclingMethod};
        use std::time::Duration;

        let mut config = Config::new();
        config.url = Some(database_url.to_string());

        config.manager = Some(ManagerConfig {
            recycling_method: RecyclingMethod::Fast,
        });

        config.pool = Some(PoolConfig {
            max_size: DB_POOL_MAX_SIZE,
            timeouts: deadpool_postgres::Timeouts {
                wait: Some(Duration::from_secs(DB_QUERY_TIMEOUT_SECS)),
                create: Some(Duration::from_secs(10)),
                recycle: Some(Duration::from_secs(30)),
            },
            ..Default::default()
        });

        let pool = config.create_pool(Some(Runtime::Tokio1), NoTls)?;

        // Test connection
        let client = pool.get().await?;
        client
            .execute(
                &format!("SET statement_timeout = '{}s'", DB_QUERY_TIMEOUT_SECS),
                &[],
            )
            .await?;

        info!(
            "Connected to PostgreSQL (pool_size: {}, query_timeout: {}s)",
            DB_POOL_MAX_SIZE, DB_QUERY_TIMEOUT_SECS
        );

        let storage = Self { pool };
        storage.run_migrations().await?;

        Ok(storage)
    }

    /// Run embedded migrations
    async fn run_migrations(&self) -> Result<()> {
        let client = self.pool.get().await?;

        // Check if migrations table exists
        let exists: bool = client
            .query_one(
                "SELECT EXISTS(SELECT 1 FROM information_schema.tables WHERE table_name = 'schema_migrations')",
                &[],
            )
            .await?
            .get(0);

        if !exists {
            let migration_sql = include_str!("../migrations/001_schema.sql");
            client.batch_execute(migration_sql).await?;
            info!("Applied migration 001_schema");
        }

        Ok(())
    }

    // ========================================================================
    // CLAIMS
    // ========================================================================

    /// Insert a new claim, returning the stored row
    pub async fn insert_claim(&self, claim: &NewClaim) -> Result<PaymentClaim> {
        let client = self.pool.get().await?;

        let row = client
            .query_one(
                &format!(
                    "INSERT INTO payment_claims
                         (user_id, username, first_name, last_name, method, proof,
                          wallet_address, personal_link, status)
                     VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
                     RETURNING {}",
                    CLAIM_COLUMNS
                ),
                &[
                    &claim.user_id,
                    &claim.username,
                    &claim.first_name,
                    &claim.last_name,
                    &claim.method,
                    &claim.proof,
                    &claim.wallet_address,
                    &claim.personal_link,
                    &claim.status,
                ],
            )
            .await?;

        let stored = claim_from_row(&row);
        info!(
            "Inserted {} claim #{} for user {} ({})",
            stored.status, stored.id, stored.user_id, stored.method
        );
        Ok(stored)
    }

    /// Apply a moderation transition. Only pending claims move; the
    /// conditional update is also the race guard when two moderators act on
    /// the same claim.
    pub async fn transition_status(
        &self,
        id: i32,
        target: ClaimStatus,
        notes: Option<&str>,
    ) -> Result<TransitionOutcome> {
        let client = self.pool.get().await?;

        let row = client
            .query_opt(
                &format!(
                    "UPDATE payment_claims
                     SET status = $2, notes = $3, updated_at = NOW()
                     WHERE id = $1 AND status = 'pending'
                     RETURNING {}",
                    CLAIM_COLUMNS
                ),
                &[&id, &target, &notes],
            )
            .await?;

        if let Some(row) = row {
            info!("Claim #{} transitioned to {}", id, target);
            return Ok(TransitionOutcome::Applied(claim_from_row(&row)));
        }

        // Nothing moved: unknown id, or the claim already left pending
        let current = client
            .query_opt("SELECT status FROM payment_claims WHERE id = $1", &[&id])
            .await?;

        match current {
            Some(row) => Ok(TransitionOutcome::AlreadyFinal(row.get(0))),
            None => Ok(TransitionOutcome::NotFound),
        }
    }

    /// Claims with a given status, newest first
    pub async fn claims_by_status(&self, status: ClaimStatus) -> Result<Vec<PaymentClaim>> {
        let client = self.pool.get().await?;

        let rows = client
            .query(
                &format!(
                    "SELECT {} FROM payment_claims
                     WHERE status = $1
                     ORDER BY created_at DESC, id DESC",
                    CLAIM_COLUMNS
                ),
                &[&status],
            )
            .await?;

        Ok(rows.iter().map(claim_from_row).collect())
    }

    /// A single claim by id
    pub async fn claim_by_id(&self, id: i32) -> Result<Option<PaymentClaim>> {
        let client = self.pool.get().await?;

        let row = client
            .query_opt(
                &format!("SELECT {} FROM payment_claims WHERE id = $1", CLAIM_COLUMNS),
                &[&id],
            )
            .await?;

        Ok(row.map(|r| claim_from_row(&r)))
    }

    /// All claims made by one user, newest first
    pub async fn claims_by_user(&self, user_id: &str) -> Result<Vec<PaymentClaim>> {
        let client = self.pool.get().await?;

        let rows = client
            .query(
                &format!(
                    "SELECT {} FROM payment_claims
                     WHERE user_id = $1
                     ORDER BY created_at DESC, id DESC",
                    CLAIM_COLUMNS
                ),
                &[&user_id],
            )
            .await?;

        Ok(rows.iter().map(claim_from_row).collect())
    }

    // ========================================================================
    // METRICS
    // ========================================================================

    /// Claim counts grouped by status
    pub async fn status_counts(&self) -> Result<Vec<StatusCount>> {
        let client = self.pool.get().await?;

        let rows = client
            .query(
                "SELECT status, COUNT(*) FROM payment_claims GROUP BY status ORDER BY status",
                &[],
            )
            .await?;

        Ok(rows
            .iter()
            .map(|r| StatusCount {
                status: r.get(0),
                count: r.get(1),
            })
            .collect())
    }

    /// Claim counts grouped by payment method
    pub async fn method_counts(&self) -> Result<Vec<MethodCount>> {
        let client = self.pool.get().await?;

        let rows = client
            .query(
                "SELECT method, COUNT(*) FROM payment_claims GROUP BY method ORDER BY method",
                &[],
            )
            .await?;

        Ok(rows
            .iter()
            .map(|r| MethodCount {
                method: r.get(0),
                count: r.get(1),
            })
            .collect())
    }

    /// Most recent claims across all statuses
    pub async fn recent_claims(&self, limit: i64) -> Result<Vec<PaymentClaim>> {
        let client = self.pool.get().await?;

        let rows = client
            .query(
                &format!(
                    "SELECT {} FROM payment_claims
                     ORDER BY created_at DESC, id DESC
                     LIMIT $1",
                    CLAIM_COLUMNS
                ),
                &[&limit],
            )
            .await?;

        Ok(rows.iter().map(claim_from_row).collect())
    }
}

/// True when an error is the one-claim-per-transaction index firing
pub fn is_unique_violation(err: &anyhow::Error) -> bool {
    err.downcast_ref::<tokio_postgres::Error>()
        .and_then(|e| e.code())
        .map(|code| *code == SqlState::UNIQUE_VIOLATION)
        .unwrap_or(false)
}

fn claim_from_row(row: &tokio_postgres::Row) -> PaymentClaim {
    PaymentClaim {
        id: row.get(0),
        user_id: row.get(1),
        username: row.get(2),
        first_name: row.get(3),
        last_name: row.get(4),
        method: row.get(5),
        proof: row.get(6),
        wallet_address: row.get(7),
        personal_link: row.get(8),
        status: row.get(9),
        notes: row.get(10),
        created_at: row.get(11),
        updated_at: row.get(12),
    }
}
