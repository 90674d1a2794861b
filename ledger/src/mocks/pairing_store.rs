//! Mock pairing store for testing.

use crate::error::{LedgerError, Result};
use crate::providers::{InsertOutcome, PairingStore};
use crate::state::{InviteCode, PairId, PairingRoom, RoomState, SubjectId};
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

type Rooms = Arc<Mutex<HashMap<InviteCode, PairingRoom>>>;

/// Mock pairing store.
///
/// Uses in-memory storage for testing. A single mutex guards every room, so
/// each conditional update is atomic with respect to all others.
#[derive(Debug, Clone, Default)]
pub struct MockPairingStore {
    rooms: Rooms,
    unavailable: Arc<AtomicBool>,
}

impl MockPairingStore {
    /// Create an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every call fail with a storage error until reset.
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    /// Snapshot of all rooms (for testing).
    ///
    /// # Errors
    ///
    /// Returns error if lock is poisoned.
    pub fn rooms(&self) -> Result<Vec<PairingRoom>> {
        Ok(lock(&self.rooms)?.values().cloned().collect())
    }

    /// Insert a room directly, bypassing invariant checks (for test setup).
    ///
    /// # Errors
    ///
    /// Returns error if lock is poisoned.
    pub fn seed(&self, room: PairingRoom) -> Result<()> {
        lock(&self.rooms)?.insert(room.invite_code.clone(), room);
        Ok(())
    }

    fn check_available(unavailable: &AtomicBool) -> Result<()> {
        if unavailable.load(Ordering::SeqCst) {
            return Err(LedgerError::StorageError("pairing store unavailable".to_string()));
        }
        Ok(())
    }
}

fn lock(rooms: &Rooms) -> Result<std::sync::MutexGuard<'_, HashMap<InviteCode, PairingRoom>>> {
    rooms
        .lock()
        .map_err(|_| LedgerError::StorageError("Mutex lock failed".to_string()))
}

fn holds_open_room(rooms: &HashMap<InviteCode, PairingRoom>, subject: &SubjectId) -> bool {
    rooms.values().any(|room| room.state.is_open() && room.involves(subject))
}

impl PairingStore for MockPairingStore {
    fn invite_code_exists(&self, code: &InviteCode) -> impl Future<Output = Result<bool>> + Send {
        let rooms = Arc::clone(&self.rooms);
        let unavailable = Arc::clone(&self.unavailable);
        let code = code.clone();

        async move {
            Self::check_available(&unavailable)?;
            Ok(lock(&rooms)?.contains_key(&code))
        }
    }

    fn insert_room(&self, room: &PairingRoom) -> impl Future<Output = Result<InsertOutcome>> + Send {
        let rooms = Arc::clone(&self.rooms);
        let unavailable = Arc::clone(&self.unavailable);
        let room = room.clone();

        async move {
            Self::check_available(&unavailable)?;
            let mut guard = lock(&rooms)?;

            if guard.contains_key(&room.invite_code) {
                return Ok(InsertOutcome::CodeTaken);
            }
            if holds_open_room(&guard, &room.creator_id) {
                return Ok(InsertOutcome::SubjectBusy);
            }

            guard.insert(room.invite_code.clone(), room);
            Ok(InsertOutcome::Inserted)
        }
    }

    fn find_by_invite_code(&self, code: &InviteCode) -> impl Future<Output = Result<Option<PairingRoom>>> + Send {
        let rooms = Arc::clone(&self.rooms);
        let unavailable = Arc::clone(&self.unavailable);
        let code = code.clone();

        async move {
            Self::check_available(&unavailable)?;
            Ok(lock(&rooms)?.get(&code).cloned())
        }
    }

    fn find_by_pair_id(&self, pair_id: &PairId) -> impl Future<Output = Result<Option<PairingRoom>>> + Send {
        let rooms = Arc::clone(&self.rooms);
        let unavailable = Arc::clone(&self.unavailable);
        let pair_id = pair_id.clone();

        async move {
            Self::check_available(&unavailable)?;
            Ok(lock(&rooms)?
                .values()
                .find(|room| room.pair_id.as_ref() == Some(&pair_id))
                .cloned())
        }
    }

    fn find_open_room(&self, subject: &SubjectId) -> impl Future<Output = Result<Option<PairingRoom>>> + Send {
        let rooms = Arc::clone(&self.rooms);
        let unavailable = Arc::clone(&self.unavailable);
        let subject = subject.clone();

        async move {
            Self::check_available(&unavailable)?;
            Ok(lock(&rooms)?
                .values()
                .find(|room| room.state.is_open() && room.involves(&subject))
                .cloned())
        }
    }

    fn try_match(
        &self,
        code: &InviteCode,
        partner: &SubjectId,
        pair_id: &PairId,
        now: DateTime<Utc>,
    ) -> impl Future<Output = Result<Option<PairingRoom>>> + Send {
        let rooms = Arc::clone(&self.rooms);
        let unavailable = Arc::clone(&self.unavailable);
        let code = code.clone();
        let partner = partner.clone();
        let pair_id = pair_id.clone();

        async move {
            Self::check_available(&unavailable)?;
            let mut guard = lock(&rooms)?;

            let partner_busy = holds_open_room(&guard, &partner);
            let Some(room) = guard.get_mut(&code) else {
                return Ok(None);
            };
            if !room.is_redeemable() || room.creator_id == partner || partner_busy {
                return Ok(None);
            }

            room.partner_id = Some(partner);
            room.pair_id = Some(pair_id);
            room.state = RoomState::Active;
            room.updated_at = now;
            Ok(Some(room.clone()))
        }
    }

    fn try_release(
        &self,
        pair_id: &PairId,
        next_state: RoomState,
        new_code: Option<&InviteCode>,
        now: DateTime<Utc>,
    ) -> impl Future<Output = Result<Option<PairingRoom>>> + Send {
        let rooms = Arc::clone(&self.rooms);
        let unavailable = Arc::clone(&self.unavailable);
        let pair_id = pair_id.clone();
        let new_code = new_code.cloned();

        async move {
            Self::check_available(&unavailable)?;
            let mut guard = lock(&rooms)?;

            let Some(current_code) = guard
                .values()
                .find(|room| room.pair_id.as_ref() == Some(&pair_id) && room.state == RoomState::Active)
                .map(|room| room.invite_code.clone())
            else {
                return Ok(None);
            };

            if let Some(code) = &new_code {
                if guard.contains_key(code) {
                    return Err(LedgerError::StorageError(format!("invite code {code} already in use")));
                }
            }

            let Some(mut room) = guard.remove(&current_code) else {
                return Ok(None);
            };
            room.state = next_state;
            room.partner_id = None;
            room.updated_at = now;
            if let Some(code) = new_code {
                room.invite_code = code;
            }

            guard.insert(room.invite_code.clone(), room.clone());
            Ok(Some(room))
        }
    }

    fn delete_pending(&self, creator: &SubjectId) -> impl Future<Output = Result<Option<PairingRoom>>> + Send {
        let rooms = Arc::clone(&self.rooms);
        let unavailable = Arc::clone(&self.unavailable);
        let creator = creator.clone();

        async move {
            Self::check_available(&unavailable)?;
            let mut guard = lock(&rooms)?;

            let code = guard
                .values()
                .find(|room| room.state == RoomState::Pending && room.creator_id == creator)
                .map(|room| room.invite_code.clone());

            Ok(code.and_then(|code| guard.remove(&code)))
        }
    }
}
