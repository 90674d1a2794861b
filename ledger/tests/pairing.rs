//! Integration tests for the invite-code pairing lifecycle.

#![allow(clippy::unwrap_used, clippy::expect_used)]

use couple_ledger::{
    InviteCode, InviteCodePolicy, LedgerConfig, LedgerError, PairId, PairingConfig, RoomState, SubjectId,
};
use couple_ledger::strategy::CacheAside;
use couple_ledger_testing::TestHarness;
use couple_ledger_testing::properties::invite_code;
use proptest::prelude::*;
use std::sync::Arc;

fn subject(id: &str) -> SubjectId {
    SubjectId::new(id)
}

fn code(s: &str) -> InviteCode {
    InviteCode::parse(s).unwrap()
}

// ═══════════════════════════════════════════════════════════════════════
// Create
// ═══════════════════════════════════════════════════════════════════════

#[tokio::test]
async fn test_create_room_returns_well_formed_code() {
    let harness = TestHarness::new();

    let code = harness.engine.create_room(&subject("kakao_1")).await.unwrap();

    assert_eq!(code.as_str().len(), 6);
    assert!(code.as_str().chars().all(|c| c.is_ascii_uppercase() || c.is_ascii_digit()));

    let rooms = harness.rooms.rooms().unwrap();
    assert_eq!(rooms.len(), 1);
    assert_eq!(rooms[0].state, RoomState::Pending);
    assert_eq!(rooms[0].creator_id, subject("kakao_1"));
    assert!(rooms[0].pair_id.is_none());
}

#[tokio::test]
async fn test_create_room_twice_is_already_paired() {
    let harness = TestHarness::new();
    harness.engine.create_room(&subject("kakao_1")).await.unwrap();

    let err = harness.engine.create_room(&subject("kakao_1")).await.unwrap_err();

    assert_eq!(err, LedgerError::AlreadyPaired);
    assert_eq!(harness.rooms.rooms().unwrap().len(), 1);
}

#[tokio::test]
async fn test_partner_cannot_create_room_while_active() {
    let harness = TestHarness::new();
    harness.pair("kakao_1", "google_2").await.unwrap();

    let err = harness.engine.create_room(&subject("google_2")).await.unwrap_err();

    assert_eq!(err, LedgerError::AlreadyPaired);
}

#[tokio::test]
async fn test_concurrent_create_by_same_subject_opens_one_room() {
    let harness = TestHarness::new();
    let creator = subject("kakao_1");

    let (a, b) = tokio::join!(
        harness.engine.create_room(&creator),
        harness.engine.create_room(&creator),
    );

    assert_eq!(usize::from(a.is_ok()) + usize::from(b.is_ok()), 1);
    let err = a.err().or(b.err()).unwrap();
    assert_eq!(err, LedgerError::AlreadyPaired);
    assert_eq!(harness.rooms.rooms().unwrap().len(), 1);
}

// ═══════════════════════════════════════════════════════════════════════
// Redeem
// ═══════════════════════════════════════════════════════════════════════

#[tokio::test]
async fn test_redeem_activates_room() {
    let harness = TestHarness::new();
    let code = harness.engine.create_room(&subject("kakao_1")).await.unwrap();

    let matched = harness.engine.redeem(&subject("google_2"), code.as_str()).await.unwrap();

    assert_eq!(matched.creator_id, subject("kakao_1"));
    assert_eq!(matched.partner_id, subject("google_2"));
    assert_eq!(matched.pair_id, PairId::new("pair-1"));

    let rooms = harness.rooms.rooms().unwrap();
    assert_eq!(rooms[0].state, RoomState::Active);
    assert_eq!(rooms[0].partner_id, Some(subject("google_2")));
    assert_eq!(rooms[0].pair_id, Some(PairId::new("pair-1")));
}

#[tokio::test]
async fn test_redeem_accepts_lowercase_and_padded_code() {
    let harness = TestHarness::new();
    harness.codes.push(code("ABC123"));
    harness.engine.create_room(&subject("kakao_1")).await.unwrap();

    let matched = harness.engine.redeem(&subject("google_2"), "  abc123 ").await.unwrap();

    assert_eq!(matched.creator_id, subject("kakao_1"));
}

#[tokio::test]
async fn test_redeem_rejects_malformed_code() {
    let harness = TestHarness::new();

    for bad in ["", "ABC12", "ABC1234", "ABC-12", "ÄBC123"] {
        let err = harness.engine.redeem(&subject("google_2"), bad).await.unwrap_err();
        assert!(matches!(err, LedgerError::InvalidInviteCode { .. }), "{bad:?} gave {err:?}");
    }
}

#[tokio::test]
async fn test_redeem_unknown_code_is_not_found() {
    let harness = TestHarness::new();

    let err = harness.engine.redeem(&subject("google_2"), "ZZZZZZ").await.unwrap_err();

    assert_eq!(err, LedgerError::CodeNotFound);
}

#[tokio::test]
async fn test_redeem_own_code_is_self_match() {
    let harness = TestHarness::new();
    let code = harness.engine.create_room(&subject("kakao_1")).await.unwrap();

    let err = harness.engine.redeem(&subject("kakao_1"), code.as_str()).await.unwrap_err();

    assert_eq!(err, LedgerError::SelfMatch);
    assert_eq!(harness.rooms.rooms().unwrap()[0].state, RoomState::Pending);
}

#[tokio::test]
async fn test_redeem_matched_code_is_already_matched() {
    let harness = TestHarness::new();
    let code = harness.engine.create_room(&subject("kakao_1")).await.unwrap();
    harness.engine.redeem(&subject("google_2"), code.as_str()).await.unwrap();

    let err = harness.engine.redeem(&subject("google_3"), code.as_str()).await.unwrap_err();

    assert_eq!(err, LedgerError::AlreadyMatched);
}

#[tokio::test]
async fn test_redeem_while_holding_pending_room_is_already_paired() {
    let harness = TestHarness::new();
    let code = harness.engine.create_room(&subject("kakao_1")).await.unwrap();
    harness.engine.create_room(&subject("google_2")).await.unwrap();

    let err = harness.engine.redeem(&subject("google_2"), code.as_str()).await.unwrap_err();

    assert_eq!(err, LedgerError::AlreadyPaired);
}

#[tokio::test]
async fn test_withdraw_then_redeem_succeeds() {
    let harness = TestHarness::new();
    let code = harness.engine.create_room(&subject("kakao_1")).await.unwrap();
    let own = harness.engine.create_room(&subject("google_2")).await.unwrap();

    let withdrawn = harness.engine.withdraw(&subject("google_2")).await.unwrap();
    let matched = harness.engine.redeem(&subject("google_2"), code.as_str()).await.unwrap();

    assert_eq!(withdrawn, own);
    assert_eq!(matched.partner_id, subject("google_2"));
    assert_eq!(
        harness.engine.redeem(&subject("google_9"), own.as_str()).await.unwrap_err(),
        LedgerError::CodeNotFound
    );
}

#[tokio::test]
async fn test_withdraw_without_pending_room_is_not_paired() {
    let harness = TestHarness::new();
    harness.pair("kakao_1", "google_2").await.unwrap();

    assert_eq!(
        harness.engine.withdraw(&subject("kakao_1")).await.unwrap_err(),
        LedgerError::NotPaired
    );
    assert_eq!(
        harness.engine.withdraw(&subject("google_2")).await.unwrap_err(),
        LedgerError::NotPaired
    );
}

#[tokio::test]
async fn test_blank_subject_is_rejected_before_store() {
    let harness = TestHarness::new();
    harness.rooms.set_unavailable(true);

    assert_eq!(
        harness.engine.create_room(&subject("  ")).await.unwrap_err(),
        LedgerError::MissingSubject
    );
    assert_eq!(
        harness.engine.redeem(&subject(""), "ABC123").await.unwrap_err(),
        LedgerError::MissingSubject
    );
}

// ═══════════════════════════════════════════════════════════════════════
// Cancel / dissolve
// ═══════════════════════════════════════════════════════════════════════

#[tokio::test]
async fn test_cancel_reopens_room_under_same_code() {
    let harness = TestHarness::new();
    let original = harness.engine.create_room(&subject("kakao_1")).await.unwrap();
    let matched = harness.engine.redeem(&subject("google_2"), original.as_str()).await.unwrap();

    let reopened = harness.engine.cancel(&matched.pair_id).await.unwrap();

    assert_eq!(reopened, original);
    let room = &harness.rooms.rooms().unwrap()[0];
    assert_eq!(room.state, RoomState::Pending);
    assert!(room.partner_id.is_none());

    // The former partner is free, and the creator's room accepts someone new.
    assert!(!harness.engine.is_paired(&subject("google_2")).await.unwrap());
    let rematch = harness.engine.redeem(&subject("google_3"), reopened.as_str()).await.unwrap();
    assert_eq!(rematch.pair_id, PairId::new("pair-2"));
}

#[tokio::test]
async fn test_cancel_twice_is_already_cancelled() {
    let harness = TestHarness::new();
    let matched = harness.pair("kakao_1", "google_2").await.unwrap();
    harness.engine.cancel(&matched.pair_id).await.unwrap();

    assert_eq!(
        harness.engine.cancel(&matched.pair_id).await.unwrap_err(),
        LedgerError::AlreadyCancelled
    );
}

#[tokio::test]
async fn test_cancel_unknown_pair_is_not_found() {
    let harness = TestHarness::new();

    assert_eq!(
        harness.engine.cancel(&PairId::new("nope")).await.unwrap_err(),
        LedgerError::PairNotFound
    );
}

#[tokio::test]
async fn test_cancel_with_regenerate_policy_issues_new_code() {
    let harness = TestHarness::with_config(
        Arc::new(CacheAside),
        PairingConfig::default().with_invite_code_policy(InviteCodePolicy::Regenerate),
        LedgerConfig::default(),
    );
    harness.codes.push(code("AAAAAA"));
    harness.codes.push(code("BBBBBB"));
    let matched = harness.pair("kakao_1", "google_2").await.unwrap();

    let reopened = harness.engine.cancel(&matched.pair_id).await.unwrap();

    assert_eq!(reopened, code("BBBBBB"));
    assert_eq!(
        harness.engine.redeem(&subject("google_3"), "AAAAAA").await.unwrap_err(),
        LedgerError::CodeNotFound
    );
}

#[tokio::test]
async fn test_dissolve_is_terminal() {
    let harness = TestHarness::new();
    let original = harness.engine.create_room(&subject("kakao_1")).await.unwrap();
    let matched = harness.engine.redeem(&subject("google_2"), original.as_str()).await.unwrap();

    harness.engine.dissolve(&matched.pair_id).await.unwrap();

    assert_eq!(harness.rooms.rooms().unwrap()[0].state, RoomState::Cancelled);
    assert_eq!(
        harness.engine.redeem(&subject("google_3"), original.as_str()).await.unwrap_err(),
        LedgerError::AlreadyMatched
    );
    assert_eq!(
        harness.engine.dissolve(&matched.pair_id).await.unwrap_err(),
        LedgerError::AlreadyCancelled
    );

    // Both members may start over.
    harness.engine.create_room(&subject("kakao_1")).await.unwrap();
    harness.engine.create_room(&subject("google_2")).await.unwrap();
}

// ═══════════════════════════════════════════════════════════════════════
// Queries
// ═══════════════════════════════════════════════════════════════════════

#[tokio::test]
async fn test_couple_info_from_both_sides() {
    let harness = TestHarness::new();
    let code = harness.engine.create_room(&subject("kakao_1")).await.unwrap();
    let matched = harness.engine.redeem(&subject("google_2"), code.as_str()).await.unwrap();

    let creator = harness.engine.couple_info(&subject("kakao_1")).await.unwrap();
    let partner = harness.engine.couple_info(&subject("google_2")).await.unwrap();

    assert!(creator.is_creator);
    assert_eq!(creator.partner_id, subject("google_2"));
    assert!(!partner.is_creator);
    assert_eq!(partner.partner_id, subject("kakao_1"));
    assert_eq!(creator.pair_id, matched.pair_id);
    assert_eq!(partner.invite_code, code);
}

#[tokio::test]
async fn test_pending_creator_is_paired_but_has_no_couple() {
    let harness = TestHarness::new();
    harness.engine.create_room(&subject("kakao_1")).await.unwrap();

    assert!(harness.engine.is_paired(&subject("kakao_1")).await.unwrap());
    assert_eq!(
        harness.engine.couple_info(&subject("kakao_1")).await.unwrap_err(),
        LedgerError::NotPaired
    );
    assert_eq!(
        harness.engine.resolve_pair_id(&subject("kakao_1")).await.unwrap_err(),
        LedgerError::NotPaired
    );
}

#[tokio::test]
async fn test_store_outage_surfaces_storage_error() {
    let harness = TestHarness::new();
    harness.rooms.set_unavailable(true);

    let err = harness.engine.create_room(&subject("kakao_1")).await.unwrap_err();

    assert!(err.is_retryable(), "{err:?}");
}

proptest! {
    #[test]
    fn prop_invite_code_parse_ignores_case(code in invite_code()) {
        let lower = code.as_str().to_ascii_lowercase();
        prop_assert_eq!(InviteCode::parse(&lower).unwrap(), code);
    }
}
