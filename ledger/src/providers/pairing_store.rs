//! Pairing room store trait.

use crate::error::Result;
use crate::state::{InviteCode, PairId, PairingRoom, RoomState, SubjectId};
use chrono::{DateTime, Utc};

/// Result of inserting a new PENDING room.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InsertOutcome {
    /// The room was persisted.
    Inserted,
    /// Another room already uses this invite code.
    CodeTaken,
    /// The creator already holds a PENDING or ACTIVE room.
    SubjectBusy,
}

/// Durable record of pairing rooms.
///
/// The single source of truth for pairing state. Every state-changing method
/// is a conditional update that either applies atomically or reports that its
/// precondition no longer holds; the engine never writes a room it merely read.
///
/// # Implementation Notes
///
/// - Rooms are keyed by invite code and indexed by pair id and by subject
/// - A subject appears in at most one PENDING or ACTIVE room
/// - Conditional updates must be linearizable with each other
pub trait PairingStore: Send + Sync {
    /// Whether any room (in any state) uses this invite code.
    ///
    /// # Errors
    ///
    /// Returns error if the store is unreachable.
    fn invite_code_exists(&self, code: &InviteCode) -> impl std::future::Future<Output = Result<bool>> + Send;

    /// Insert a PENDING room.
    ///
    /// Must atomically re-check both the invite code and the creator's
    /// single-open-room invariant.
    ///
    /// # Errors
    ///
    /// Returns error if the store is unreachable.
    fn insert_room(&self, room: &PairingRoom) -> impl std::future::Future<Output = Result<InsertOutcome>> + Send;

    /// Look up a room by invite code.
    ///
    /// # Errors
    ///
    /// Returns error if the store is unreachable.
    fn find_by_invite_code(
        &self,
        code: &InviteCode,
    ) -> impl std::future::Future<Output = Result<Option<PairingRoom>>> + Send;

    /// Look up a room by its current pair id.
    ///
    /// # Errors
    ///
    /// Returns error if the store is unreachable.
    fn find_by_pair_id(&self, pair_id: &PairId) -> impl std::future::Future<Output = Result<Option<PairingRoom>>> + Send;

    /// The PENDING or ACTIVE room the subject created or joined, if any.
    ///
    /// # Errors
    ///
    /// Returns error if the store is unreachable.
    fn find_open_room(
        &self,
        subject: &SubjectId,
    ) -> impl std::future::Future<Output = Result<Option<PairingRoom>>> + Send;

    /// Compare-and-swap PENDING to ACTIVE.
    ///
    /// Applies only if the room is PENDING, has no partner, was not created by
    /// `partner`, and `partner` holds no other open room. Returns the updated
    /// room, or `None` if any precondition failed.
    ///
    /// # Errors
    ///
    /// Returns error if the store is unreachable.
    fn try_match(
        &self,
        code: &InviteCode,
        partner: &SubjectId,
        pair_id: &PairId,
        now: DateTime<Utc>,
    ) -> impl std::future::Future<Output = Result<Option<PairingRoom>>> + Send;

    /// Move an ACTIVE room to `next_state`, clearing the partner.
    ///
    /// When `new_code` is given the room is re-keyed under it. Returns the
    /// updated room, or `None` if the room was not ACTIVE.
    ///
    /// # Errors
    ///
    /// Returns error if the store is unreachable or `new_code` is taken.
    fn try_release(
        &self,
        pair_id: &PairId,
        next_state: RoomState,
        new_code: Option<&InviteCode>,
        now: DateTime<Utc>,
    ) -> impl std::future::Future<Output = Result<Option<PairingRoom>>> + Send;

    /// Delete the PENDING room created by `creator`. Returns the deleted room.
    ///
    /// # Errors
    ///
    /// Returns error if the store is unreachable.
    fn delete_pending(
        &self,
        creator: &SubjectId,
    ) -> impl std::future::Future<Output = Result<Option<PairingRoom>>> + Send;
}
