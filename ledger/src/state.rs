//! Pairing and ledger state types.
//!
//! Everything here is plain data: identifiers, the pairing room record, the
//! ticket account record, and the small result types returned by the engine
//! and the ledger. All types are `Clone` and serializable so they can travel
//! through the cache and the sync channel unchanged.

use crate::constants::invite_code;
use crate::error::{LedgerError, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

// ═══════════════════════════════════════════════════════════════════════
// ID Types
// ═══════════════════════════════════════════════════════════════════════

/// Opaque identifier of an authenticated end-user.
///
/// Supplied by the identity adapter; the core never interprets it.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SubjectId(pub String);

impl SubjectId {
    /// Wrap a subject identifier.
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Build the subject id the identity adapter derives from a social login.
    ///
    /// # Examples
    ///
    /// ```
    /// # use couple_ledger::state::{IdentityProvider, SubjectId};
    /// let subject = SubjectId::federated(IdentityProvider::Kakao, "12345");
    /// assert_eq!(subject.as_str(), "kakao_12345");
    /// ```
    #[must_use]
    pub fn federated(provider: IdentityProvider, external_id: &str) -> Self {
        Self(format!("{}_{external_id}", provider.as_str()))
    }

    /// Borrow the raw identifier.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Reject empty identifiers before they reach a store.
    ///
    /// # Errors
    ///
    /// Returns [`LedgerError::MissingSubject`] if the id is blank.
    pub fn validate(&self) -> Result<()> {
        if self.0.trim().is_empty() {
            return Err(LedgerError::MissingSubject);
        }
        Ok(())
    }
}

impl fmt::Display for SubjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Identifier assigned to a couple at the moment of a successful match.
///
/// Scopes the ticket ledger.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PairId(pub String);

impl PairId {
    /// Wrap a pair identifier.
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Generate a new random pair id.
    #[must_use]
    pub fn generate() -> Self {
        Self(uuid::Uuid::new_v4().to_string())
    }

    /// Borrow the raw identifier.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for PairId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Six-character `[A-Z0-9]` capability token shared out-of-band with a partner.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct InviteCode(String);

impl InviteCode {
    /// Parse user input into an invite code.
    ///
    /// Surrounding whitespace is trimmed and letters are upper-cased before
    /// the format check.
    ///
    /// # Errors
    ///
    /// Returns [`LedgerError::InvalidInviteCode`] if the input is not six
    /// alphanumeric characters.
    ///
    /// # Examples
    ///
    /// ```
    /// # use couple_ledger::state::InviteCode;
    /// assert_eq!(InviteCode::parse(" ab12cd ").unwrap().as_str(), "AB12CD");
    /// assert!(InviteCode::parse("AB12C").is_err());
    /// assert!(InviteCode::parse("AB-2CD").is_err());
    /// ```
    pub fn parse(input: &str) -> Result<Self> {
        let normalized = input.trim().to_ascii_uppercase();
        let well_formed = normalized.len() == invite_code::LENGTH
            && normalized.bytes().all(|b| invite_code::CHARSET.contains(&b));

        if !well_formed {
            return Err(LedgerError::InvalidInviteCode {
                code: input.to_string(),
            });
        }
        Ok(Self(normalized))
    }

    /// Wrap a code produced by a generator from [`invite_code::CHARSET`].
    pub(crate) const fn from_generated(code: String) -> Self {
        Self(code)
    }

    /// Borrow the code.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for InviteCode {
    type Error = LedgerError;

    fn try_from(value: String) -> Result<Self> {
        Self::parse(&value)
    }
}

impl From<InviteCode> for String {
    fn from(code: InviteCode) -> Self {
        code.0
    }
}

impl fmt::Display for InviteCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Social login provider a subject authenticated with.
///
/// Only the identity adapter branches on this; pairing and ledger logic see
/// the resulting [`SubjectId`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IdentityProvider {
    /// Google sign-in.
    Google,
    /// Kakao sign-in.
    Kakao,
}

impl IdentityProvider {
    /// Get the provider name as a string.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Google => "google",
            Self::Kakao => "kakao",
        }
    }

    /// Parse provider from string.
    ///
    /// # Errors
    ///
    /// Returns [`LedgerError::ConfigError`] if the provider is not recognized.
    pub fn parse(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "google" => Ok(Self::Google),
            "kakao" => Ok(Self::Kakao),
            _ => Err(LedgerError::ConfigError(format!("Unknown identity provider: {s}"))),
        }
    }
}

// ═══════════════════════════════════════════════════════════════════════
// Pairing Rooms
// ═══════════════════════════════════════════════════════════════════════

/// Lifecycle state of a pairing room.
///
/// ```text
/// PENDING ──redeem──▶ ACTIVE ──cancel───▶ PENDING
///                        └────dissolve──▶ CANCELLED
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RoomState {
    /// Waiting for a partner to redeem the invite code.
    Pending,
    /// Matched; `pair_id` and `partner_id` are set.
    Active,
    /// Permanently closed.
    Cancelled,
}

impl RoomState {
    /// Convert state to its persisted representation.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "PENDING",
            Self::Active => "ACTIVE",
            Self::Cancelled => "CANCELLED",
        }
    }

    /// Parse state from its persisted representation.
    ///
    /// # Errors
    ///
    /// Returns [`LedgerError::StorageError`] for unknown values.
    pub fn parse(s: &str) -> Result<Self> {
        match s {
            "PENDING" => Ok(Self::Pending),
            "ACTIVE" => Ok(Self::Active),
            "CANCELLED" => Ok(Self::Cancelled),
            _ => Err(LedgerError::StorageError(format!("Invalid room state: {s}"))),
        }
    }

    /// Whether a room in this state counts toward a subject's single pairing.
    #[must_use]
    pub const fn is_open(&self) -> bool {
        matches!(self, Self::Pending | Self::Active)
    }
}

/// A pairing room: the invite code and the two subjects it binds.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PairingRoom {
    /// Invite code (primary key).
    pub invite_code: InviteCode,

    /// Pair id of the current or most recent match.
    pub pair_id: Option<PairId>,

    /// Subject that created the room.
    pub creator_id: SubjectId,

    /// Subject that redeemed the code; `None` until matched.
    pub partner_id: Option<SubjectId>,

    /// Lifecycle state.
    pub state: RoomState,

    /// Creation timestamp.
    pub created_at: DateTime<Utc>,

    /// Last transition timestamp.
    pub updated_at: DateTime<Utc>,
}

impl PairingRoom {
    /// New room waiting for a partner.
    #[must_use]
    pub const fn pending(invite_code: InviteCode, creator_id: SubjectId, now: DateTime<Utc>) -> Self {
        Self {
            invite_code,
            pair_id: None,
            creator_id,
            partner_id: None,
            state: RoomState::Pending,
            created_at: now,
            updated_at: now,
        }
    }

    /// Whether the subject is the creator or the partner of this room.
    #[must_use]
    pub fn involves(&self, subject: &SubjectId) -> bool {
        self.creator_id == *subject || self.partner_id.as_ref() == Some(subject)
    }

    /// Whether a partner may still redeem this room's code.
    #[must_use]
    pub fn is_redeemable(&self) -> bool {
        self.state == RoomState::Pending && self.partner_id.is_none()
    }

    /// The other member of the couple, seen from `subject`.
    #[must_use]
    pub fn counterpart_of(&self, subject: &SubjectId) -> Option<&SubjectId> {
        if self.creator_id == *subject {
            self.partner_id.as_ref()
        } else if self.partner_id.as_ref() == Some(subject) {
            Some(&self.creator_id)
        } else {
            None
        }
    }
}

/// Outcome of a successful redeem.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Match {
    /// Freshly assigned pair id.
    pub pair_id: PairId,

    /// Subject that created the room.
    pub creator_id: SubjectId,

    /// Subject that redeemed the code.
    pub partner_id: SubjectId,
}

/// An active couple seen from one of its members.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CoupleInfo {
    /// Pair id scoping the ticket ledger.
    pub pair_id: PairId,

    /// Invite code of the room.
    pub invite_code: InviteCode,

    /// The other member.
    pub partner_id: SubjectId,

    /// Whether the viewing subject created the room.
    pub is_creator: bool,
}

// ═══════════════════════════════════════════════════════════════════════
// Ticket Accounts
// ═══════════════════════════════════════════════════════════════════════

/// Per-pair ticket balance and daily earn flag.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TicketAccount {
    /// Pair id (primary key).
    pub pair_id: PairId,

    /// Remaining tickets.
    pub balance: u32,

    /// `true` once today's earn slot has been consumed.
    pub used_today: bool,

    /// Timestamp of the last write; orders external writes.
    pub last_synced_at: DateTime<Utc>,
}

impl TicketAccount {
    /// Build an account snapshot.
    #[must_use]
    pub const fn new(pair_id: PairId, balance: u32, used_today: bool, last_synced_at: DateTime<Utc>) -> Self {
        Self {
            pair_id,
            balance,
            used_today,
            last_synced_at,
        }
    }
}

/// Result of an earn attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Earned {
    /// Whether a ticket was credited.
    pub earned: bool,

    /// Balance after the attempt.
    pub new_balance: u32,
}

/// Result of applying an externally originated ledger write.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum WriteOutcome {
    /// The write was newer than the stored row and replaced it.
    Applied,
    /// The stored row is newer; the write was ignored.
    Stale,
}

/// Daily flag counts observed after a reset.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ResetReport {
    /// Number of ticket accounts.
    pub total: u64,

    /// Accounts whose earn slot is still marked as used.
    pub still_used: u64,
}

impl ResetReport {
    /// Whether every account has its earn slot available again.
    #[must_use]
    pub const fn is_clean(&self) -> bool {
        self.still_used == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn room() -> PairingRoom {
        let mut room = PairingRoom::pending(
            InviteCode::from_generated("AB12CD".into()),
            SubjectId::new("alice"),
            Utc::now(),
        );
        room.partner_id = Some(SubjectId::new("bob"));
        room.state = RoomState::Active;
        room
    }

    #[test]
    fn test_invite_code_rejects_bad_input() {
        for bad in ["", "ABC", "ABCDEFG", "AB 2CD", "ÄB12CD", "AB_2CD"] {
            assert!(
                matches!(InviteCode::parse(bad), Err(LedgerError::InvalidInviteCode { .. })),
                "{bad:?} should be rejected"
            );
        }
    }

    #[test]
    fn test_invite_code_serde_validates() {
        let ok: std::result::Result<InviteCode, _> = serde_json::from_str("\"zz99aa\"");
        assert_eq!(ok.map(|c| c.to_string()).ok(), Some("ZZ99AA".to_string()));

        let bad: std::result::Result<InviteCode, _> = serde_json::from_str("\"nope\"");
        assert!(bad.is_err());
    }

    #[test]
    fn test_room_state_round_trip() {
        for state in [RoomState::Pending, RoomState::Active, RoomState::Cancelled] {
            assert_eq!(RoomState::parse(state.as_str()), Ok(state));
        }
        assert!(RoomState::parse("DEACTIVATED").is_err());
        assert!(RoomState::Pending.is_open());
        assert!(!RoomState::Cancelled.is_open());
    }

    #[test]
    fn test_counterpart_lookup() {
        let room = room();
        let alice = SubjectId::new("alice");
        let bob = SubjectId::new("bob");
        let carol = SubjectId::new("carol");

        assert_eq!(room.counterpart_of(&alice), Some(&bob));
        assert_eq!(room.counterpart_of(&bob), Some(&alice));
        assert_eq!(room.counterpart_of(&carol), None);
        assert!(room.involves(&bob));
        assert!(!room.involves(&carol));
        assert!(!room.is_redeemable());
    }

    #[test]
    fn test_subject_validation() {
        assert_eq!(SubjectId::new("  ").validate(), Err(LedgerError::MissingSubject));
        assert!(SubjectId::new("google_1").validate().is_ok());
    }

    #[test]
    fn test_identity_provider_parse() {
        assert_eq!(IdentityProvider::parse("KAKAO"), Ok(IdentityProvider::Kakao));
        assert!(IdentityProvider::parse("naver").is_err());
    }
}
