//! Invite-code pairing state machine.
//!
//! ```text
//!            create_room            redeem (CAS)
//!   (none) ─────────────▶ PENDING ───────────────▶ ACTIVE
//!                           ▲  │                    │  │
//!                           │  └── withdraw ──▶ ✗   │  │
//!                           └────── cancel ─────────┘  │
//!                                       CANCELLED ◀────┘ dissolve
//! ```
//!
//! Every transition is decided by a conditional update in the
//! [`PairingStore`]; reads performed here only classify a failed update into
//! the right error.

use crate::config::{InviteCodePolicy, PairingConfig};
use crate::error::{LedgerError, Result};
use crate::metrics;
use crate::providers::{Clock, CodeGenerator, InsertOutcome, PairingStore};
use crate::state::{CoupleInfo, InviteCode, Match, PairId, PairingRoom, RoomState, SubjectId};
use std::sync::Arc;

/// Resolves subjects and pair ids to active pairings.
///
/// The ticket ledger depends on this seam rather than on the engine so it can
/// be tested against a fixed set of pairs.
pub trait PairResolver: Send + Sync {
    /// Succeeds only if `pair_id` names an ACTIVE room.
    ///
    /// # Errors
    ///
    /// Returns [`LedgerError::PairNotFound`] otherwise.
    fn ensure_active(&self, pair_id: &PairId) -> impl std::future::Future<Output = Result<()>> + Send;

    /// Pair id of the subject's ACTIVE room.
    ///
    /// # Errors
    ///
    /// Returns [`LedgerError::NotPaired`] if the subject is not in an ACTIVE room.
    fn resolve_pair_id(&self, subject: &SubjectId) -> impl std::future::Future<Output = Result<PairId>> + Send;
}

impl<T: PairResolver> PairResolver for Arc<T> {
    fn ensure_active(&self, pair_id: &PairId) -> impl std::future::Future<Output = Result<()>> + Send {
        (**self).ensure_active(pair_id)
    }

    fn resolve_pair_id(&self, subject: &SubjectId) -> impl std::future::Future<Output = Result<PairId>> + Send {
        (**self).resolve_pair_id(subject)
    }
}

/// Owns the pairing room lifecycle.
pub struct PairingEngine<S, G> {
    store: S,
    codes: G,
    clock: Arc<dyn Clock>,
    config: PairingConfig,
}

impl<S, G> std::fmt::Debug for PairingEngine<S, G> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PairingEngine").field("config", &self.config).finish_non_exhaustive()
    }
}

impl<S: PairingStore, G: CodeGenerator> PairingEngine<S, G> {
    /// Create an engine over a store and a code generator.
    #[must_use]
    pub fn new(store: S, codes: G, clock: Arc<dyn Clock>, config: PairingConfig) -> Self {
        Self {
            store,
            codes,
            clock,
            config,
        }
    }

    /// Access the underlying store.
    #[must_use]
    pub const fn store(&self) -> &S {
        &self.store
    }

    /// Open a PENDING room for `subject` and return its invite code.
    ///
    /// # Errors
    ///
    /// - [`LedgerError::MissingSubject`] for a blank subject
    /// - [`LedgerError::AlreadyPaired`] if the subject holds a PENDING or ACTIVE room
    /// - [`LedgerError::CodeSpaceExhausted`] if no free code was found
    #[tracing::instrument(skip_all, fields(subject = %subject))]
    pub async fn create_room(&self, subject: &SubjectId) -> Result<InviteCode> {
        subject.validate()?;

        if self.store.find_open_room(subject).await?.is_some() {
            metrics::record_pairing("already_paired");
            return Err(LedgerError::AlreadyPaired);
        }

        for attempt in 1..=self.config.max_code_attempts {
            let code = self.codes.invite_code();
            if self.store.invite_code_exists(&code).await? {
                tracing::debug!(attempt, "Invite code collision, regenerating");
                continue;
            }

            let room = PairingRoom::pending(code.clone(), subject.clone(), self.clock.now());
            match self.store.insert_room(&room).await? {
                InsertOutcome::Inserted => {
                    metrics::record_pairing("created");
                    tracing::info!(invite_code = %code, "Pairing room created");
                    return Ok(code);
                }
                InsertOutcome::CodeTaken => {
                    tracing::debug!(attempt, "Invite code taken at insert, regenerating");
                }
                InsertOutcome::SubjectBusy => {
                    metrics::record_pairing("already_paired");
                    return Err(LedgerError::AlreadyPaired);
                }
            }
        }

        tracing::error!(attempts = self.config.max_code_attempts, "Invite code space exhausted");
        Err(LedgerError::CodeSpaceExhausted {
            attempts: self.config.max_code_attempts,
        })
    }

    /// Join the room behind `invite_code` as its partner.
    ///
    /// Exactly one of any number of concurrent redeemers wins.
    ///
    /// # Errors
    ///
    /// - [`LedgerError::InvalidInviteCode`] if the code is malformed
    /// - [`LedgerError::CodeNotFound`] if no room uses the code
    /// - [`LedgerError::SelfMatch`] if the subject created the room
    /// - [`LedgerError::AlreadyMatched`] if the room is not waiting for a partner
    /// - [`LedgerError::AlreadyPaired`] if the subject holds another open room
    #[tracing::instrument(skip_all, fields(subject = %subject))]
    pub async fn redeem(&self, subject: &SubjectId, invite_code: &str) -> Result<Match> {
        subject.validate()?;
        let code = InviteCode::parse(invite_code)?;

        let room = self.store.find_by_invite_code(&code).await?.ok_or(LedgerError::CodeNotFound)?;
        self.check_redeemable(&room, subject).await?;

        let pair_id = self.codes.pair_id();
        let now = self.clock.now();
        match self.store.try_match(&code, subject, &pair_id, now).await? {
            Some(matched) => {
                metrics::record_pairing("matched");
                tracing::info!(pair_id = %pair_id, invite_code = %code, "Pairing matched");
                Ok(Match {
                    pair_id,
                    creator_id: matched.creator_id,
                    partner_id: subject.clone(),
                })
            }
            None => {
                // Lost a race; re-read to report why.
                let err = match self.store.find_by_invite_code(&code).await? {
                    None => LedgerError::CodeNotFound,
                    Some(current) => self
                        .check_redeemable(&current, subject)
                        .await
                        .err()
                        .unwrap_or(LedgerError::AlreadyMatched),
                };
                metrics::record_pairing("rejected");
                tracing::info!(invite_code = %code, error = %err, "Redeem lost to a concurrent update");
                Err(err)
            }
        }
    }

    async fn check_redeemable(&self, room: &PairingRoom, subject: &SubjectId) -> Result<()> {
        if room.creator_id == *subject {
            metrics::record_pairing("self_match");
            return Err(LedgerError::SelfMatch);
        }
        if !room.is_redeemable() {
            metrics::record_pairing("already_matched");
            return Err(LedgerError::AlreadyMatched);
        }
        if self.store.find_open_room(subject).await?.is_some() {
            metrics::record_pairing("already_paired");
            return Err(LedgerError::AlreadyPaired);
        }
        Ok(())
    }

    /// End an ACTIVE pairing and reopen the room for a new partner.
    ///
    /// Returns the invite code the room now waits under; it differs from the
    /// old one only under [`InviteCodePolicy::Regenerate`].
    ///
    /// # Errors
    ///
    /// - [`LedgerError::PairNotFound`] if no room carries the pair id
    /// - [`LedgerError::AlreadyCancelled`] if the room is not ACTIVE
    #[tracing::instrument(skip_all, fields(pair_id = %pair_id))]
    pub async fn cancel(&self, pair_id: &PairId) -> Result<InviteCode> {
        let new_code = match self.config.invite_code_policy {
            InviteCodePolicy::Retain => None,
            InviteCodePolicy::Regenerate => Some(self.fresh_code().await?),
        };

        let room = self.release(pair_id, RoomState::Pending, new_code.as_ref()).await?;
        metrics::record_pairing("cancelled");
        tracing::info!(invite_code = %room.invite_code, "Pairing cancelled, room reopened");
        Ok(room.invite_code)
    }

    /// Permanently close an ACTIVE pairing.
    ///
    /// # Errors
    ///
    /// - [`LedgerError::PairNotFound`] if no room carries the pair id
    /// - [`LedgerError::AlreadyCancelled`] if the room is not ACTIVE
    #[tracing::instrument(skip_all, fields(pair_id = %pair_id))]
    pub async fn dissolve(&self, pair_id: &PairId) -> Result<()> {
        self.release(pair_id, RoomState::Cancelled, None).await?;
        metrics::record_pairing("dissolved");
        tracing::info!("Pairing dissolved");
        Ok(())
    }

    async fn release(&self, pair_id: &PairId, next: RoomState, new_code: Option<&InviteCode>) -> Result<PairingRoom> {
        let now = self.clock.now();
        if let Some(room) = self.store.try_release(pair_id, next, new_code, now).await? {
            return Ok(room);
        }

        match self.store.find_by_pair_id(pair_id).await? {
            None => Err(LedgerError::PairNotFound),
            Some(_) => Err(LedgerError::AlreadyCancelled),
        }
    }

    /// A code no room currently uses.
    async fn fresh_code(&self) -> Result<InviteCode> {
        for _ in 0..self.config.max_code_attempts {
            let code = self.codes.invite_code();
            if !self.store.invite_code_exists(&code).await? {
                return Ok(code);
            }
        }
        Err(LedgerError::CodeSpaceExhausted {
            attempts: self.config.max_code_attempts,
        })
    }

    /// Delete the subject's own PENDING room so they can redeem another code.
    ///
    /// # Errors
    ///
    /// Returns [`LedgerError::NotPaired`] if the subject created no PENDING room.
    #[tracing::instrument(skip_all, fields(subject = %subject))]
    pub async fn withdraw(&self, subject: &SubjectId) -> Result<InviteCode> {
        subject.validate()?;
        let room = self.store.delete_pending(subject).await?.ok_or(LedgerError::NotPaired)?;
        metrics::record_pairing("withdrawn");
        tracing::info!(invite_code = %room.invite_code, "Pending room withdrawn");
        Ok(room.invite_code)
    }

    /// Pair id of the subject's ACTIVE room.
    ///
    /// # Errors
    ///
    /// Returns [`LedgerError::NotPaired`] if the subject is not in an ACTIVE room.
    pub async fn resolve_pair_id(&self, subject: &SubjectId) -> Result<PairId> {
        self.active_room_of(subject)
            .await?
            .pair_id
            .ok_or_else(|| LedgerError::StorageError("active room without pair id".to_string()))
    }

    /// Whether the subject holds a PENDING or ACTIVE room.
    ///
    /// # Errors
    ///
    /// Returns error if the store is unreachable.
    pub async fn is_paired(&self, subject: &SubjectId) -> Result<bool> {
        subject.validate()?;
        Ok(self.store.find_open_room(subject).await?.is_some())
    }

    /// The subject's ACTIVE couple.
    ///
    /// # Errors
    ///
    /// Returns [`LedgerError::NotPaired`] if the subject is not in an ACTIVE room.
    pub async fn couple_info(&self, subject: &SubjectId) -> Result<CoupleInfo> {
        let room = self.active_room_of(subject).await?;
        let partner_id = room.counterpart_of(subject).cloned().ok_or(LedgerError::NotPaired)?;
        let pair_id = room
            .pair_id
            .clone()
            .ok_or_else(|| LedgerError::StorageError("active room without pair id".to_string()))?;

        Ok(CoupleInfo {
            pair_id,
            is_creator: room.creator_id == *subject,
            invite_code: room.invite_code,
            partner_id,
        })
    }

    async fn active_room_of(&self, subject: &SubjectId) -> Result<PairingRoom> {
        subject.validate()?;
        self.store
            .find_open_room(subject)
            .await?
            .filter(|room| room.state == RoomState::Active)
            .ok_or(LedgerError::NotPaired)
    }
}

impl<S: PairingStore, G: CodeGenerator> PairResolver for PairingEngine<S, G> {
    async fn ensure_active(&self, pair_id: &PairId) -> Result<()> {
        match self.store.find_by_pair_id(pair_id).await? {
            Some(room) if room.state == RoomState::Active => Ok(()),
            _ => Err(LedgerError::PairNotFound),
        }
    }

    async fn resolve_pair_id(&self, subject: &SubjectId) -> Result<PairId> {
        Self::resolve_pair_id(self, subject).await
    }
}

#[cfg(all(test, feature = "test-utils"))]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::mocks::{MockPairingStore, ScriptedCodeGenerator};
    use crate::providers::SystemClock;

    fn code(s: &str) -> InviteCode {
        InviteCode::parse(s).unwrap()
    }

    fn engine(codes: ScriptedCodeGenerator, config: PairingConfig) -> PairingEngine<MockPairingStore, ScriptedCodeGenerator> {
        PairingEngine::new(MockPairingStore::new(), codes, Arc::new(SystemClock), config)
    }

    #[tokio::test]
    async fn test_create_room_regenerates_on_collision() {
        let codes = ScriptedCodeGenerator::with_codes([code("AAAAAA"), code("AAAAAA"), code("BBBBBB")]);
        let engine = engine(codes, PairingConfig::default());

        let first = engine.create_room(&SubjectId::new("alice")).await.unwrap();
        let second = engine.create_room(&SubjectId::new("bob")).await.unwrap();

        assert_eq!(first, code("AAAAAA"));
        assert_eq!(second, code("BBBBBB"));
    }

    #[tokio::test]
    async fn test_create_room_gives_up_after_budget() {
        let codes = ScriptedCodeGenerator::with_codes([code("AAAAAA"), code("AAAAAA"), code("AAAAAA")]);
        let engine = engine(codes, PairingConfig::new().with_max_code_attempts(2));

        engine.create_room(&SubjectId::new("alice")).await.unwrap();
        let result = engine.create_room(&SubjectId::new("bob")).await;

        assert_eq!(result, Err(LedgerError::CodeSpaceExhausted { attempts: 2 }));
    }

    #[tokio::test]
    async fn test_regenerate_policy_rekeys_room_on_cancel() {
        let codes = ScriptedCodeGenerator::with_codes([code("AAAAAA"), code("CCCCCC")]);
        let engine = engine(
            codes,
            PairingConfig::new().with_invite_code_policy(InviteCodePolicy::Regenerate),
        );

        engine.create_room(&SubjectId::new("alice")).await.unwrap();
        let matched = engine.redeem(&SubjectId::new("bob"), "AAAAAA").await.unwrap();
        let reopened = engine.cancel(&matched.pair_id).await.unwrap();

        assert_eq!(reopened, code("CCCCCC"));
        assert_eq!(
            engine.redeem(&SubjectId::new("carol"), "AAAAAA").await,
            Err(LedgerError::CodeNotFound)
        );
        assert!(engine.redeem(&SubjectId::new("carol"), "CCCCCC").await.is_ok());
    }

    #[tokio::test]
    async fn test_blank_subject_is_rejected() {
        let engine = engine(ScriptedCodeGenerator::new(), PairingConfig::default());
        assert_eq!(
            engine.create_room(&SubjectId::new("")).await,
            Err(LedgerError::MissingSubject)
        );
    }
}
