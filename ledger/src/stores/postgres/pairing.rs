//! PostgreSQL pairing room store.
//!
//! Every transition is one conditional statement. Statements that check the
//! single-open-room invariant for a subject first take a transaction-scoped
//! advisory lock on that subject, so a concurrent create and redeem by the
//! same subject serialize.

use crate::error::Result;
use crate::providers::{InsertOutcome, PairingStore};
use crate::retry::storage_err;
use crate::state::{InviteCode, PairId, PairingRoom, RoomState, SubjectId};
use chrono::{DateTime, Utc};
use sqlx::postgres::PgRow;
use sqlx::{PgPool, Postgres, Row, Transaction};

const ROOM_COLUMNS: &str = "invite_code, pair_id, creator_id, partner_id, state, created_at, updated_at";

/// PostgreSQL pairing room store.
#[derive(Debug, Clone)]
pub struct PostgresPairingStore {
    pool: PgPool,
}

impl PostgresPairingStore {
    /// Create a store over a connection pool.
    #[must_use]
    pub const fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    async fn lock_subject(tx: &mut Transaction<'_, Postgres>, subject: &SubjectId) -> Result<()> {
        sqlx::query("SELECT pg_advisory_xact_lock(hashtext($1))")
            .bind(subject.as_str())
            .execute(&mut **tx)
            .await
            .map_err(|e| storage_err("Failed to lock subject", e))?;
        Ok(())
    }

    async fn fetch_one_where(&self, condition: &str, value: &str) -> Result<Option<PairingRoom>> {
        let sql = format!("SELECT {ROOM_COLUMNS} FROM pairing_room WHERE {condition} LIMIT 1");
        sqlx::query(&sql)
            .bind(value)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| storage_err("Failed to load pairing room", e))?
            .map(|row| row_to_room(&row))
            .transpose()
    }
}

fn row_to_room(row: &PgRow) -> Result<PairingRoom> {
    let get_err = |e: sqlx::Error| storage_err("Failed to decode pairing room", e);

    let code: String = row.try_get("invite_code").map_err(get_err)?;
    let pair_id: Option<String> = row.try_get("pair_id").map_err(get_err)?;
    let creator_id: String = row.try_get("creator_id").map_err(get_err)?;
    let partner_id: Option<String> = row.try_get("partner_id").map_err(get_err)?;
    let state: String = row.try_get("state").map_err(get_err)?;

    Ok(PairingRoom {
        invite_code: InviteCode::parse(&code).map_err(|e| storage_err("Corrupt invite code", e))?,
        pair_id: pair_id.map(PairId),
        creator_id: SubjectId(creator_id),
        partner_id: partner_id.map(SubjectId),
        state: RoomState::parse(&state)?,
        created_at: row.try_get("created_at").map_err(get_err)?,
        updated_at: row.try_get("updated_at").map_err(get_err)?,
    })
}

impl PairingStore for PostgresPairingStore {
    async fn invite_code_exists(&self, code: &InviteCode) -> Result<bool> {
        sqlx::query_scalar::<_, bool>("SELECT EXISTS (SELECT 1 FROM pairing_room WHERE invite_code = $1)")
            .bind(code.as_str())
            .fetch_one(&self.pool)
            .await
            .map_err(|e| storage_err("Failed to check invite code", e))
    }

    async fn insert_room(&self, room: &PairingRoom) -> Result<InsertOutcome> {
        let mut tx = self.pool.begin().await.map_err(|e| storage_err("Failed to begin transaction", e))?;
        Self::lock_subject(&mut tx, &room.creator_id).await?;

        let inserted = sqlx::query(
            r"
            INSERT INTO pairing_room (invite_code, pair_id, creator_id, partner_id, state, created_at, updated_at)
            SELECT $1, NULL, $2, NULL, 'PENDING', $3, $3
            WHERE NOT EXISTS (
                SELECT 1 FROM pairing_room
                WHERE state IN ('PENDING', 'ACTIVE') AND (creator_id = $2 OR partner_id = $2)
            )
            ON CONFLICT (invite_code) DO NOTHING
            ",
        )
        .bind(room.invite_code.as_str())
        .bind(room.creator_id.as_str())
        .bind(room.created_at)
        .execute(&mut *tx)
        .await;

        let outcome = match inserted {
            Ok(result) if result.rows_affected() == 1 => InsertOutcome::Inserted,
            Ok(_) => {
                let taken = sqlx::query_scalar::<_, bool>(
                    "SELECT EXISTS (SELECT 1 FROM pairing_room WHERE invite_code = $1)",
                )
                .bind(room.invite_code.as_str())
                .fetch_one(&mut *tx)
                .await
                .map_err(|e| storage_err("Failed to check invite code", e))?;
                if taken { InsertOutcome::CodeTaken } else { InsertOutcome::SubjectBusy }
            }
            Err(sqlx::Error::Database(db_err)) if db_err.is_unique_violation() => {
                return Ok(match db_err.constraint() {
                    Some("pairing_room_open_creator") => InsertOutcome::SubjectBusy,
                    _ => InsertOutcome::CodeTaken,
                });
            }
            Err(e) => return Err(storage_err("Failed to insert pairing room", e)),
        };

        tx.commit().await.map_err(|e| storage_err("Failed to commit pairing room", e))?;

        tracing::debug!(invite_code = %room.invite_code, ?outcome, "Pairing room insert");
        Ok(outcome)
    }

    async fn find_by_invite_code(&self, code: &InviteCode) -> Result<Option<PairingRoom>> {
        self.fetch_one_where("invite_code = $1", code.as_str()).await
    }

    async fn find_by_pair_id(&self, pair_id: &PairId) -> Result<Option<PairingRoom>> {
        self.fetch_one_where("pair_id = $1", pair_id.as_str()).await
    }

    async fn find_open_room(&self, subject: &SubjectId) -> Result<Option<PairingRoom>> {
        self.fetch_one_where(
            "state IN ('PENDING', 'ACTIVE') AND (creator_id = $1 OR partner_id = $1)",
            subject.as_str(),
        )
        .await
    }

    async fn try_match(
        &self,
        code: &InviteCode,
        partner: &SubjectId,
        pair_id: &PairId,
        now: DateTime<Utc>,
    ) -> Result<Option<PairingRoom>> {
        let mut tx = self.pool.begin().await.map_err(|e| storage_err("Failed to begin transaction", e))?;
        Self::lock_subject(&mut tx, partner).await?;

        let sql = format!(
            r"
            UPDATE pairing_room
            SET partner_id = $2, pair_id = $3, state = 'ACTIVE', updated_at = $4
            WHERE invite_code = $1
              AND state = 'PENDING'
              AND partner_id IS NULL
              AND creator_id <> $2
              AND NOT EXISTS (
                  SELECT 1 FROM pairing_room other
                  WHERE other.state IN ('PENDING', 'ACTIVE')
                    AND (other.creator_id = $2 OR other.partner_id = $2)
              )
            RETURNING {ROOM_COLUMNS}
            "
        );
        let updated = sqlx::query(&sql)
            .bind(code.as_str())
            .bind(partner.as_str())
            .bind(pair_id.as_str())
            .bind(now)
            .fetch_optional(&mut *tx)
            .await;

        let row = match updated {
            Ok(row) => row,
            // The partner became a member elsewhere between the check and the write.
            Err(sqlx::Error::Database(db_err)) if db_err.is_unique_violation() => return Ok(None),
            Err(e) => return Err(storage_err("Failed to match pairing room", e)),
        };
        let room = row.map(|row| row_to_room(&row)).transpose()?;

        tx.commit().await.map_err(|e| storage_err("Failed to commit match", e))?;
        Ok(room)
    }

    async fn try_release(
        &self,
        pair_id: &PairId,
        next_state: RoomState,
        new_code: Option<&InviteCode>,
        now: DateTime<Utc>,
    ) -> Result<Option<PairingRoom>> {
        let sql = format!(
            r"
            UPDATE pairing_room
            SET state = $2, partner_id = NULL, invite_code = COALESCE($3, invite_code), updated_at = $4
            WHERE pair_id = $1 AND state = 'ACTIVE'
            RETURNING {ROOM_COLUMNS}
            "
        );
        sqlx::query(&sql)
            .bind(pair_id.as_str())
            .bind(next_state.as_str())
            .bind(new_code.map(InviteCode::as_str))
            .bind(now)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| storage_err("Failed to release pairing room", e))?
            .map(|row| row_to_room(&row))
            .transpose()
    }

    async fn delete_pending(&self, creator: &SubjectId) -> Result<Option<PairingRoom>> {
        let sql = format!(
            "DELETE FROM pairing_room WHERE creator_id = $1 AND state = 'PENDING' RETURNING {ROOM_COLUMNS}"
        );
        sqlx::query(&sql)
            .bind(creator.as_str())
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| storage_err("Failed to delete pending room", e))?
            .map(|row| row_to_room(&row))
            .transpose()
    }
}

