//! Invite code and pair id generation.

use crate::constants::invite_code;
use crate::state::{InviteCode, PairId};
use rand::Rng;

/// Produces candidate invite codes and fresh pair ids.
///
/// Uniqueness is not the generator's job: the engine checks every candidate
/// against the [`PairingStore`](crate::providers::PairingStore) and asks again
/// on collision.
pub trait CodeGenerator: Send + Sync {
    /// Produce a candidate invite code.
    fn invite_code(&self) -> InviteCode;

    /// Produce a new pair id.
    fn pair_id(&self) -> PairId;
}

/// Generator backed by the thread-local CSPRNG and UUID v4.
#[derive(Debug, Clone, Copy, Default)]
pub struct RandomCodeGenerator;

impl RandomCodeGenerator {
    /// Draw a random code from [`invite_code::CHARSET`].
    #[must_use]
    pub fn random_code() -> InviteCode {
        let mut rng = rand::thread_rng();
        let code: String = (0..invite_code::LENGTH)
            .map(|_| char::from(invite_code::CHARSET[rng.gen_range(0..invite_code::CHARSET.len())]))
            .collect();
        InviteCode::from_generated(code)
    }
}

impl CodeGenerator for RandomCodeGenerator {
    fn invite_code(&self) -> InviteCode {
        Self::random_code()
    }

    fn pair_id(&self) -> PairId {
        PairId::generate()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_random_codes_are_well_formed() {
        let generator = RandomCodeGenerator;
        for _ in 0..200 {
            let code = generator.invite_code();
            assert!(InviteCode::parse(code.as_str()).is_ok(), "{code} is malformed");
        }
    }

    #[test]
    fn test_pair_ids_are_distinct() {
        let generator = RandomCodeGenerator;
        assert_ne!(generator.pair_id(), generator.pair_id());
    }
}
