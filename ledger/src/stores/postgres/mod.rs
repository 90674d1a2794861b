//! PostgreSQL storage implementations.
//!
//! - `pairing_room`: invite codes, members and lifecycle state
//! - `ticket_account`: per-pair balance and daily earn flag

pub mod ledger;
pub mod pairing;

pub use ledger::PostgresLedgerStore;
pub use pairing::PostgresPairingStore;

use crate::error::{LedgerError, Result};
use sqlx::PgPool;

/// Run the bundled migrations.
///
/// # Errors
///
/// Returns error if migrations fail.
pub async fn migrate(pool: &PgPool) -> Result<()> {
    sqlx::migrate!("./migrations")
        .run(pool)
        .await
        .map_err(|e| LedgerError::StorageError(format!("Migration failed: {e}")))?;
    Ok(())
}
