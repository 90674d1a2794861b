//! Error types for pairing and ticket ledger operations.

use thiserror::Error;

/// Result type alias for pairing and ledger operations.
pub type Result<T> = std::result::Result<T, LedgerError>;

/// Error taxonomy for the pairing state machine and the ticket ledger.
///
/// Variants are grouped by how a caller is expected to react: validation
/// errors are rejected before any store is touched, conflicts and not-found
/// errors are terminal business outcomes, and infrastructure errors mean no
/// mutation was applied.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum LedgerError {
    // ═══════════════════════════════════════════════════════════
    // Validation
    // ═══════════════════════════════════════════════════════════

    /// Invite code is not six uppercase alphanumeric characters.
    #[error("Invalid invite code: {code:?}")]
    InvalidInviteCode {
        /// The rejected input
        code: String,
    },

    /// Subject identifier is empty.
    #[error("Subject id is missing")]
    MissingSubject,

    /// Externally pushed ledger change could not be interpreted.
    #[error("Invalid sync message: {0}")]
    InvalidSyncMessage(String),

    // ═══════════════════════════════════════════════════════════
    // Conflicts
    // ═══════════════════════════════════════════════════════════

    /// Subject already holds a pending or active pairing room.
    #[error("Subject is already paired or waiting for a partner")]
    AlreadyPaired,

    /// Invite code was already redeemed or its room is not open.
    #[error("Invite code has already been matched")]
    AlreadyMatched,

    /// Creator tried to redeem their own invite code.
    #[error("Cannot pair with yourself")]
    SelfMatch,

    /// Pairing is not active (already cancelled or waiting for a partner).
    #[error("Pairing is already cancelled")]
    AlreadyCancelled,

    // ═══════════════════════════════════════════════════════════
    // Not found
    // ═══════════════════════════════════════════════════════════

    /// No room exists for this invite code.
    #[error("Invite code not found")]
    CodeNotFound,

    /// No active pairing exists for this pair id.
    #[error("Pair not found")]
    PairNotFound,

    /// Subject has no pairing room in the requested state.
    #[error("Subject is not paired")]
    NotPaired,

    // ═══════════════════════════════════════════════════════════
    // Resource exhausted
    // ═══════════════════════════════════════════════════════════

    /// Ticket balance is zero.
    #[error("Insufficient ticket balance")]
    InsufficientBalance,

    /// Could not find a free invite code within the attempt budget.
    #[error("No free invite code after {attempts} attempts")]
    CodeSpaceExhausted {
        /// Number of codes tried
        attempts: usize,
    },

    // ═══════════════════════════════════════════════════════════
    // Infrastructure
    // ═══════════════════════════════════════════════════════════

    /// Durable store operation failed.
    #[error("Storage error: {0}")]
    StorageError(String),

    /// Cache operation failed.
    #[error("Cache error: {0}")]
    CacheError(String),

    /// Value could not be encoded or decoded.
    #[error("Serialization error: {0}")]
    SerializationError(String),

    /// Configuration value is missing or malformed.
    #[error("Configuration error: {0}")]
    ConfigError(String),
}

impl LedgerError {
    /// Returns `true` for terminal business conflicts that must not be retried.
    ///
    /// # Examples
    ///
    /// ```
    /// # use couple_ledger::LedgerError;
    /// assert!(LedgerError::AlreadyMatched.is_conflict());
    /// assert!(!LedgerError::CodeNotFound.is_conflict());
    /// ```
    #[must_use]
    pub const fn is_conflict(&self) -> bool {
        matches!(
            self,
            Self::AlreadyPaired | Self::AlreadyMatched | Self::SelfMatch | Self::AlreadyCancelled
        )
    }

    /// Returns `true` if the referenced code, pair or room does not exist.
    #[must_use]
    pub const fn is_not_found(&self) -> bool {
        matches!(self, Self::CodeNotFound | Self::PairNotFound | Self::NotPaired)
    }

    /// Returns `true` for input the caller must fix before trying again.
    #[must_use]
    pub const fn is_validation(&self) -> bool {
        matches!(
            self,
            Self::InvalidInviteCode { .. } | Self::MissingSubject | Self::InvalidSyncMessage(_)
        )
    }

    /// Returns `true` if the failure is transient and the same call may succeed later.
    ///
    /// # Examples
    ///
    /// ```
    /// # use couple_ledger::LedgerError;
    /// assert!(LedgerError::StorageError("timeout".into()).is_retryable());
    /// assert!(!LedgerError::InsufficientBalance.is_retryable());
    /// ```
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        matches!(self, Self::StorageError(_) | Self::CacheError(_))
    }
}
