//! Pairing and ledger constants.

/// Invite code format.
pub mod invite_code {
    /// Number of characters in an invite code.
    pub const LENGTH: usize = 6;

    /// Alphabet invite codes are drawn from.
    pub const CHARSET: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZ0123456789";
}

/// Ticket ledger defaults observed in deployment.
pub mod tickets {
    /// Balance a new ticket account starts with.
    pub const DEFAULT_INITIAL_BALANCE: u32 = 2;

    /// Cache time-to-live for a ticket account (24 hours).
    pub const DEFAULT_CACHE_TTL_SECS: u64 = 24 * 60 * 60;
}

/// Redis key and channel names.
pub mod redis_keys {
    /// Prefix of cached ticket accounts: `couple:ticket:{pair_id}`.
    pub const TICKET_PREFIX: &str = "couple:ticket:";

    /// Pub/sub channel the gateway publishes ledger changes on.
    pub const SYNC_CHANNEL: &str = "ticket-sync-channel";
}
