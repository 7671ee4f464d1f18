mod common;

use chrono::Utc;
use common::*;
use futures::future::join_all;
use resource_lending::application::loan_request::{
    CheckInAction, LoanRequestError, ScanPurpose, activate_request, check_in, check_in_code,
    create_request, verify_request,
};
use resource_lending::domain::{
    RequestStatus, ResourceKey, VerificationDecision,
    commands::{ActivateLoanRequest, VerifyLoanRequest},
};
use resource_lending::ports::{EventStore, ReservationStore};

const CONTENDERS: usize = 8;

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_creates_admit_exactly_one() {
    let ctx = TestContext::new();
    let unit = ctx.general_unit();

    let handles: Vec<_> = (0..CONTENDERS)
        .map(|i| {
            let deps = ctx.deps.clone();
            // 時間帯は少しずつずらしても全て重なる
            let cmd = create_cmd(vec![unit], None, (i % 2) as i64, 3);
            tokio::spawn(async move { create_request(&deps, &requester(), cmd).await })
        })
        .collect();

    let results: Vec<_> = join_all(handles)
        .await
        .into_iter()
        .map(|joined| joined.unwrap())
        .collect();

    let winners = results.iter().filter(|r| r.is_ok()).count();
    assert_eq!(winners, 1);
    assert!(
        results
            .iter()
            .filter_map(|r| r.as_ref().err())
            .all(|e| matches!(e, LoanRequestError::ResourceUnavailable(_)))
    );

    let holds = ctx.store.allocations_for(&ResourceKey::Unit(unit)).await.unwrap();
    assert_eq!(holds.len(), 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_creates_on_shared_units_do_not_deadlock() {
    let ctx = TestContext::new();
    let first = ctx.general_unit();
    let second = ctx.general_unit();

    // 逆順に資源を指定しても、ロック順が決定的なのでデッドロックしない
    let handles: Vec<_> = (0..CONTENDERS)
        .map(|i| {
            let deps = ctx.deps.clone();
            let units = if i % 2 == 0 {
                vec![first, second]
            } else {
                vec![second, first]
            };
            let cmd = create_cmd(units, None, 0, 2);
            tokio::spawn(async move { create_request(&deps, &requester(), cmd).await })
        })
        .collect();

    let results = tokio::time::timeout(std::time::Duration::from_secs(10), join_all(handles))
        .await
        .expect("creates should not deadlock");

    let winners = results
        .into_iter()
        .map(|joined| joined.unwrap())
        .filter(|r| r.is_ok())
        .count();
    assert_eq!(winners, 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_activations_apply_once() {
    let ctx = TestContext::new();
    let unit = ctx.general_unit();
    let approver = kepala();

    let created = create_request(&ctx.deps, &requester(), create_cmd(vec![unit], None, 0, 2))
        .await
        .unwrap();
    verify_request(
        &ctx.deps,
        &approver,
        VerifyLoanRequest {
            request_id: created.request_id,
            decision: VerificationDecision::Approve,
            verified_at: Utc::now(),
        },
    )
    .await
    .unwrap();

    let handles: Vec<_> = (0..CONTENDERS)
        .map(|_| {
            let deps = ctx.deps.clone();
            let actor = approver;
            let cmd = ActivateLoanRequest {
                request_id: created.request_id,
                activated_at: Utc::now(),
            };
            tokio::spawn(async move { activate_request(&deps, &actor, cmd).await })
        })
        .collect();

    let results: Vec<_> = join_all(handles)
        .await
        .into_iter()
        .map(|joined| joined.unwrap())
        .collect();

    assert_eq!(results.iter().filter(|r| r.is_ok()).count(), 1);
    assert!(results.iter().filter_map(|r| r.as_ref().err()).all(|e| matches!(
        e,
        LoanRequestError::InvalidTransition(_) | LoanRequestError::ConcurrencyConflict
    )));

    // 作成・承認・貸出開始の3イベントのみ
    let events = ctx.store.load(created.request_id).await.unwrap();
    assert_eq!(events.len(), 3);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_check_ins_are_idempotent() {
    let ctx = TestContext::new();
    let unit = ctx.general_unit();
    let desk = staff();

    let created = create_request(&ctx.deps, &requester(), create_cmd(vec![unit], None, 0, 2))
        .await
        .unwrap();
    verify_request(
        &ctx.deps,
        &desk,
        VerifyLoanRequest {
            request_id: created.request_id,
            decision: VerificationDecision::Approve,
            verified_at: Utc::now(),
        },
    )
    .await
    .unwrap();

    let code = check_in_code(created.request_id);
    let handles: Vec<_> = (0..CONTENDERS)
        .map(|_| {
            let deps = ctx.deps.clone();
            let actor = desk;
            let code = code.clone();
            tokio::spawn(async move {
                check_in(&deps, &actor, &code, ScanPurpose::PickUp, Utc::now()).await
            })
        })
        .collect();

    let outcomes: Vec<_> = join_all(handles)
        .await
        .into_iter()
        .map(|joined| joined.unwrap().unwrap())
        .collect();

    let activated = outcomes
        .iter()
        .filter(|o| o.action == CheckInAction::Activated)
        .count();
    assert_eq!(activated, 1);
    assert!(
        outcomes
            .iter()
            .all(|o| o.request.status == RequestStatus::Active)
    );

    let events = ctx.store.load(created.request_id).await.unwrap();
    assert_eq!(events.len(), 3);
}
