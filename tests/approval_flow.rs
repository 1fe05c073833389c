#![allow(non_snake_case)]

use ethers::types::U256;
use spin_wager::{
    broadcast::LegCall,
    orchestrator::{
        IssueRejection,
        LegEvent,
        LegKind,
        LegState,
    },
    test_helpers::{
        TestContext,
        game_contract,
    },
    validator::ValidationError,
};

const MIN: u64 = 1_000000;
const MAX: u64 = 100_000000;

#[tokio::test]
async fn issue_wager__requires_confirmed_approval_then_succeeds() {
    // given
    let mut ctx = TestContext::new(MIN, MAX, 5_000000, 0, "2").await;
    let snapshot = ctx.orchestrator.snapshot();
    assert_eq!(snapshot.validation, Ok(()));
    assert_eq!(snapshot.needs_approval, Some(true));

    // when spinning before approving
    let rejected = ctx.orchestrator.issue_wager().await;

    // then
    assert_eq!(
        rejected,
        Err(IssueRejection::Invalid(ValidationError::ApprovalRequired))
    );
    assert!(ctx.wallet.sent().is_empty());
    assert_eq!(
        ctx.orchestrator.snapshot().last_rejection,
        Some(IssueRejection::Invalid(ValidationError::ApprovalRequired))
    );

    // when approving
    ctx.orchestrator.issue_approval().await.unwrap();
    assert_eq!(ctx.orchestrator.snapshot().approval, LegState::Submitting);
    let (update, applied) = ctx.pump().await;
    assert!(applied);
    let LegEvent::Broadcast(approve_hash) = update.event else {
        panic!("expected broadcast, got {:?}", update.event);
    };
    assert_eq!(
        ctx.orchestrator.snapshot().approval,
        LegState::Pending(approve_hash)
    );
    ctx.chain.set_allowance(2_000000);
    ctx.wallet.settle(approve_hash, Ok(()));
    ctx.pump().await;

    // then the refreshed allowance is visible and the spin goes out
    let snapshot = ctx.orchestrator.snapshot();
    assert_eq!(snapshot.approval, LegState::Confirmed(approve_hash));
    assert_eq!(snapshot.account.allowance, Some(U256::from(2_000000u64)));
    assert_eq!(snapshot.needs_approval, Some(false));

    ctx.orchestrator.issue_wager().await.unwrap();
    let (update, _) = ctx.pump().await;
    let LegEvent::Broadcast(spin_hash) = update.event else {
        panic!("expected broadcast, got {:?}", update.event);
    };
    ctx.chain.set_balance(3_000000);
    ctx.chain.set_allowance(0);
    ctx.wallet.settle(spin_hash, Ok(()));
    ctx.pump().await;

    let snapshot = ctx.orchestrator.snapshot();
    assert_eq!(snapshot.wager, LegState::Confirmed(spin_hash));
    assert_eq!(snapshot.account.balance, Some(U256::from(3_000000u64)));
    assert_eq!(snapshot.account.allowance, Some(U256::zero()));
    let sent: Vec<LegCall> = ctx.wallet.sent().into_iter().map(|(_, call)| call).collect();
    assert_eq!(
        sent,
        vec![
            LegCall::Approve {
                spender: game_contract(),
                amount: U256::from(2_000000u64),
            },
            LegCall::Spin {
                amount: U256::from(2_000000u64),
            },
        ]
    );
}

#[tokio::test]
async fn issue_approval__is_not_broadcast_twice_while_in_flight() {
    // given
    let mut ctx = TestContext::new(MIN, MAX, 5_000000, 0, "2").await;
    ctx.orchestrator.issue_approval().await.unwrap();

    // when still submitting
    let while_submitting = ctx.orchestrator.issue_approval().await;
    ctx.pump().await;
    // and when pending
    let while_pending = ctx.orchestrator.issue_approval().await;

    // then
    assert_eq!(
        while_submitting,
        Err(IssueRejection::LegInFlight(LegKind::Approval))
    );
    assert_eq!(while_pending, Err(IssueRejection::LegInFlight(LegKind::Approval)));
    assert_eq!(ctx.wallet.sent().len(), 1);
}

#[tokio::test]
async fn apply__approval_confirmation_refetches_allowance_before_wager_check() {
    // given
    let mut ctx = TestContext::new(MIN, MAX, 5_000000, 0, "2").await;
    ctx.orchestrator.issue_approval().await.unwrap();
    let (update, _) = ctx.pump().await;
    let LegEvent::Broadcast(hash) = update.event else {
        panic!("expected broadcast");
    };
    let reads_before_confirmation = ctx.chain.allowance_reads();

    // when
    ctx.chain.set_allowance(2_000000);
    ctx.wallet.settle(hash, Ok(()));
    ctx.pump().await;

    // then
    assert_eq!(ctx.chain.allowance_reads(), reads_before_confirmation + 1);
    ctx.orchestrator.issue_wager().await.unwrap();
    assert_eq!(ctx.chain.allowance_reads(), reads_before_confirmation + 2);
}

#[tokio::test]
async fn issue_wager__rejected_without_approval_even_if_allowance_suffices() {
    // given an allowance left over from an earlier session
    let mut ctx = TestContext::new(MIN, MAX, 5_000000, 10_000000, "2").await;
    assert_eq!(ctx.orchestrator.snapshot().needs_approval, Some(false));

    // when
    let result = ctx.orchestrator.issue_wager().await;

    // then
    assert_eq!(
        result,
        Err(IssueRejection::Invalid(ValidationError::ApprovalRequired))
    );
    assert!(ctx.wallet.sent().is_empty());
}

#[tokio::test]
async fn issue_wager__rechecks_allowance_changed_out_of_band() {
    // given a confirmed approval
    let mut ctx = TestContext::new(MIN, MAX, 5_000000, 0, "2").await;
    ctx.orchestrator.issue_approval().await.unwrap();
    let (update, _) = ctx.pump().await;
    let LegEvent::Broadcast(hash) = update.event else {
        panic!("expected broadcast");
    };
    ctx.chain.set_allowance(2_000000);
    ctx.wallet.settle(hash, Ok(()));
    ctx.pump().await;

    // when the allowance is spent elsewhere before spinning
    ctx.chain.set_allowance(500000);
    let result = ctx.orchestrator.issue_wager().await;

    // then
    assert_eq!(
        result,
        Err(IssueRejection::Invalid(ValidationError::ApprovalRequired))
    );
    assert_eq!(ctx.wallet.sent().len(), 1);
    assert_eq!(
        ctx.orchestrator.snapshot().account.allowance,
        Some(U256::from(500000u64))
    );
}

#[tokio::test]
async fn issue_approval__after_completed_spin_starts_new_attempt() {
    // given a finished attempt
    let mut ctx = TestContext::new(MIN, MAX, 5_000000, 0, "2").await;
    ctx.orchestrator.issue_approval().await.unwrap();
    let (update, _) = ctx.pump().await;
    let LegEvent::Broadcast(approve_hash) = update.event else {
        panic!("expected broadcast");
    };
    ctx.chain.set_allowance(2_000000);
    ctx.wallet.settle(approve_hash, Ok(()));
    ctx.pump().await;
    ctx.orchestrator.issue_wager().await.unwrap();
    let (update, _) = ctx.pump().await;
    let LegEvent::Broadcast(spin_hash) = update.event else {
        panic!("expected broadcast");
    };
    ctx.chain.set_allowance(0);
    ctx.wallet.settle(spin_hash, Ok(()));
    ctx.pump().await;
    let first_attempt = ctx.orchestrator.snapshot().attempt_id;

    // when spinning again with the same amount
    let again = ctx.orchestrator.issue_wager().await;
    ctx.orchestrator.issue_approval().await.unwrap();

    // then
    assert_eq!(
        again,
        Err(IssueRejection::Invalid(ValidationError::ApprovalRequired))
    );
    let snapshot = ctx.orchestrator.snapshot();
    assert_ne!(snapshot.attempt_id, first_attempt);
    assert_eq!(snapshot.approval, LegState::Submitting);
    assert_eq!(snapshot.wager, LegState::Idle);
}
