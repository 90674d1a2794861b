//! PostgreSQL ticket account store.

use crate::error::Result;
use crate::providers::LedgerStore;
use crate::retry::storage_err;
use crate::state::{PairId, ResetReport, TicketAccount};
use chrono::{DateTime, Utc};
use sqlx::postgres::PgRow;
use sqlx::{PgPool, Row};

const ACCOUNT_COLUMNS: &str = "pair_id, balance, used_today, last_synced_at";

/// PostgreSQL ticket account store.
///
/// Balance changes are single `UPDATE ... WHERE ... RETURNING` statements, so
/// row locking alone serializes concurrent consumers.
#[derive(Debug, Clone)]
pub struct PostgresLedgerStore {
    pool: PgPool,
}

impl PostgresLedgerStore {
    /// Create a store over a connection pool.
    #[must_use]
    pub const fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    async fn update_returning(&self, sql: &str, pair_id: &PairId, now: DateTime<Utc>) -> Result<Option<TicketAccount>> {
        sqlx::query(sql)
            .bind(pair_id.as_str())
            .bind(now)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| storage_err("Failed to update ticket account", e))?
            .map(|row| row_to_account(&row))
            .transpose()
    }
}

fn row_to_account(row: &PgRow) -> Result<TicketAccount> {
    let get_err = |e: sqlx::Error| storage_err("Failed to decode ticket account", e);
    let balance: i32 = row.try_get("balance").map_err(get_err)?;

    Ok(TicketAccount {
        pair_id: PairId(row.try_get("pair_id").map_err(get_err)?),
        balance: u32::try_from(balance).map_err(|e| storage_err("Negative ticket balance", e))?,
        used_today: row.try_get("used_today").map_err(get_err)?,
        last_synced_at: row.try_get("last_synced_at").map_err(get_err)?,
    })
}

fn balance_to_sql(balance: u32) -> Result<i32> {
    i32::try_from(balance).map_err(|e| storage_err("Ticket balance out of range", e))
}

impl LedgerStore for PostgresLedgerStore {
    async fn get(&self, pair_id: &PairId) -> Result<Option<TicketAccount>> {
        let sql = format!("SELECT {ACCOUNT_COLUMNS} FROM ticket_account WHERE pair_id = $1");
        sqlx::query(&sql)
            .bind(pair_id.as_str())
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| storage_err("Failed to load ticket account", e))?
            .map(|row| row_to_account(&row))
            .transpose()
    }

    async fn insert_if_absent(&self, account: &TicketAccount) -> Result<TicketAccount> {
        sqlx::query(
            r"
            INSERT INTO ticket_account (pair_id, balance, used_today, last_synced_at)
            VALUES ($1, $2, $3, $4)
            ON CONFLICT (pair_id) DO NOTHING
            ",
        )
        .bind(account.pair_id.as_str())
        .bind(balance_to_sql(account.balance)?)
        .bind(account.used_today)
        .bind(account.last_synced_at)
        .execute(&self.pool)
        .await
        .map_err(|e| storage_err("Failed to create ticket account", e))?;

        self.get(&account.pair_id)
            .await?
            .ok_or_else(|| storage_err("Ticket account vanished after insert", &account.pair_id))
    }

    async fn decrement_if_positive(&self, pair_id: &PairId, now: DateTime<Utc>) -> Result<Option<TicketAccount>> {
        let sql = format!(
            r"
            UPDATE ticket_account
            SET balance = balance - 1, last_synced_at = $2
            WHERE pair_id = $1 AND balance > 0
            RETURNING {ACCOUNT_COLUMNS}
            "
        );
        self.update_returning(&sql, pair_id, now).await
    }

    async fn credit_if_unused(&self, pair_id: &PairId, now: DateTime<Utc>) -> Result<Option<TicketAccount>> {
        let sql = format!(
            r"
            UPDATE ticket_account
            SET balance = balance + 1, used_today = TRUE, last_synced_at = $2
            WHERE pair_id = $1 AND used_today = FALSE
            RETURNING {ACCOUNT_COLUMNS}
            "
        );
        self.update_returning(&sql, pair_id, now).await
    }

    async fn apply_if_newer(&self, account: &TicketAccount) -> Result<bool> {
        let result = sqlx::query(
            r"
            INSERT INTO ticket_account (pair_id, balance, used_today, last_synced_at)
            VALUES ($1, $2, $3, $4)
            ON CONFLICT (pair_id) DO UPDATE
            SET balance = EXCLUDED.balance,
                used_today = EXCLUDED.used_today,
                last_synced_at = EXCLUDED.last_synced_at
            WHERE ticket_account.last_synced_at <= EXCLUDED.last_synced_at
            ",
        )
        .bind(account.pair_id.as_str())
        .bind(balance_to_sql(account.balance)?)
        .bind(account.used_today)
        .bind(account.last_synced_at)
        .execute(&self.pool)
        .await
        .map_err(|e| storage_err("Failed to apply ticket sync", e))?;

        Ok(result.rows_affected() == 1)
    }

    async fn reset_used_today(&self, now: DateTime<Utc>) -> Result<Vec<TicketAccount>> {
        let sql = format!(
            r"
            UPDATE ticket_account
            SET used_today = FALSE, last_synced_at = $1
            WHERE used_today = TRUE
            RETURNING {ACCOUNT_COLUMNS}
            "
        );
        let rows = sqlx::query(&sql)
            .bind(now)
            .fetch_all(&self.pool)
            .await
            .map_err(|e| storage_err("Failed to reset daily tickets", e))?;

        rows.iter().map(row_to_account).collect()
    }

    async fn reset_report(&self) -> Result<ResetReport> {
        let row = sqlx::query(
            r"
            SELECT COUNT(*) AS total, COUNT(*) FILTER (WHERE used_today) AS still_used
            FROM ticket_account
            ",
        )
        .fetch_one(&self.pool)
        .await
        .map_err(|e| storage_err("Failed to count ticket accounts", e))?;

        let total: i64 = row.try_get("total").map_err(|e| storage_err("Failed to decode count", e))?;
        let still_used: i64 = row
            .try_get("still_used")
            .map_err(|e| storage_err("Failed to decode count", e))?;

        Ok(ResetReport {
            total: u64::try_from(total).unwrap_or_default(),
            still_used: u64::try_from(still_used).unwrap_or_default(),
        })
    }
}
