//! Read Modelが遅れる・失敗する状況での一貫性
//!
//! イベントログが真実の情報源で、ビューはコミット後に最新のバージョンへ収束する。

mod common;

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use common::*;
use resource_lending::adapters::memory::InMemoryLoanRequestReadModel;
use resource_lending::application::loan_request::{
    PendingDeadline, activate_request, cancel_request, create_request, expire_pending_requests,
    get_request, project_request, verify_request,
};
use resource_lending::domain::{
    ActorId, LoanRequestId, RequestStatus, Verification, VerificationDecision,
    commands::{ActivateLoanRequest, CancelLoanRequest, VerifyLoanRequest},
};
use resource_lending::ports::{EventStore, LoanRequestReadModel, LoanRequestView, RequestFilter};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

type ReadModelResult<T> = Result<T, Box<dyn std::error::Error + Send + Sync>>;

/// 保存の失敗や遅延を差し込めるRead Model
struct UnsteadyReadModel {
    inner: Arc<InMemoryLoanRequestReadModel>,
    failing: AtomicBool,
    /// 承認済み（booking / approved）のビューの保存をこの時間だけ遅らせる
    approved_delay: Option<std::time::Duration>,
}

impl UnsteadyReadModel {
    fn new(inner: Arc<InMemoryLoanRequestReadModel>) -> Self {
        Self {
            inner,
            failing: AtomicBool::new(false),
            approved_delay: None,
        }
    }

    fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }
}

#[async_trait]
impl LoanRequestReadModel for UnsteadyReadModel {
    async fn save(&self, view: LoanRequestView) -> ReadModelResult<()> {
        if self.failing.load(Ordering::SeqCst) {
            return Err("read model unavailable".into());
        }
        if let Some(delay) = self.approved_delay {
            if view.status == RequestStatus::Booking
                && view.verification == Verification::Approved
            {
                tokio::time::sleep(delay).await;
            }
        }
        self.inner.save(view).await
    }

    async fn get_by_id(
        &self,
        request_id: LoanRequestId,
    ) -> ReadModelResult<Option<LoanRequestView>> {
        self.inner.get_by_id(request_id).await
    }

    async fn list(&self, filter: &RequestFilter) -> ReadModelResult<Vec<LoanRequestView>> {
        self.inner.list(filter).await
    }

    async fn find_pending_created_before(
        &self,
        cutoff: DateTime<Utc>,
    ) -> ReadModelResult<Vec<LoanRequestView>> {
        self.inner.find_pending_created_before(cutoff).await
    }
}

fn approve(request_id: LoanRequestId) -> VerifyLoanRequest {
    VerifyLoanRequest {
        request_id,
        decision: VerificationDecision::Approve,
        verified_at: Utc::now(),
    }
}

/// イベントが`count`件になるまで待つ
async fn wait_for_events(ctx: &TestContext, request_id: LoanRequestId, count: usize) {
    tokio::time::timeout(std::time::Duration::from_secs(5), async {
        while ctx.store.load(request_id).await.unwrap().len() < count {
            tokio::time::sleep(std::time::Duration::from_millis(5)).await;
        }
    })
    .await
    .expect("events were not committed in time");
}

// ============================================================================
// バージョン順の保存
// ============================================================================

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_delayed_approval_view_does_not_overwrite_cancellation() {
    let mut ctx = TestContext::new();
    let read_model = Arc::new(UnsteadyReadModel {
        approved_delay: Some(std::time::Duration::from_millis(300)),
        ..UnsteadyReadModel::new(ctx.read_model.clone())
    });
    ctx.deps.read_model = read_model.clone();

    let unit = ctx.general_unit();
    let borrower = requester();
    let created = create_request(&ctx.deps, &borrower, create_cmd(vec![unit], None, 0, 2))
        .await
        .unwrap();

    // 承認はコミット済みだが、ビューの保存がまだ終わっていない
    let deps = ctx.deps.clone();
    let approver = kepala();
    let request_id = created.request_id;
    let approval =
        tokio::spawn(async move { verify_request(&deps, &approver, approve(request_id)).await });
    wait_for_events(&ctx, request_id, 2).await;

    let cancelled = cancel_request(
        &ctx.deps,
        &borrower,
        CancelLoanRequest {
            request_id: created.request_id,
            cancelled_at: Utc::now(),
        },
    )
    .await
    .unwrap();
    assert_eq!(cancelled.status, RequestStatus::Cancelled);

    let approved = approval.await.unwrap().unwrap();
    assert_eq!(approved.verification, Verification::Approved);

    // 遅れて届いた承認時のビューは無視される
    let view = ctx.read_model.get_by_id(created.request_id).await.unwrap().unwrap();
    assert_eq!(view.status, RequestStatus::Cancelled);
    assert_eq!(view.version, 3);
    assert_eq!(
        ctx.store.load(created.request_id).await.unwrap().len() as u32,
        view.version
    );
}

// ============================================================================
// Read Modelの更新失敗
// ============================================================================

#[tokio::test]
async fn test_committed_command_succeeds_when_view_update_fails() {
    let mut ctx = TestContext::new();
    let read_model = Arc::new(UnsteadyReadModel::new(ctx.read_model.clone()));
    ctx.deps.read_model = read_model.clone();

    let unit = ctx.general_unit();
    let approver = kepala();
    let created = create_request(&ctx.deps, &requester(), create_cmd(vec![unit], None, 0, 2))
        .await
        .unwrap();

    read_model.set_failing(true);
    let approved = verify_request(&ctx.deps, &approver, approve(created.request_id))
        .await
        .unwrap();
    assert_eq!(approved.verification, Verification::Approved);
    assert_eq!(ctx.store.load(created.request_id).await.unwrap().len(), 2);

    // ビューは古いまま
    let stale = ctx.read_model.get_by_id(created.request_id).await.unwrap().unwrap();
    assert_eq!(stale.verification, Verification::Pending);
    assert_eq!(stale.version, 1);

    // 再投影はRead Modelが戻るまで失敗する
    assert!(project_request(&ctx.deps, created.request_id).await.is_err());

    read_model.set_failing(false);
    let repaired = project_request(&ctx.deps, created.request_id).await.unwrap();
    assert_eq!(repaired.verification, Verification::Approved);
    assert_eq!(repaired.version, 2);

    let view = get_request(&ctx.deps, &approver, created.request_id)
        .await
        .unwrap();
    assert_eq!(view, repaired);
}

#[tokio::test]
async fn test_next_command_brings_view_up_to_date() {
    let mut ctx = TestContext::new();
    let read_model = Arc::new(UnsteadyReadModel::new(ctx.read_model.clone()));
    ctx.deps.read_model = read_model.clone();

    let unit = ctx.general_unit();
    let approver = kepala();
    let created = create_request(&ctx.deps, &requester(), create_cmd(vec![unit], None, 0, 2))
        .await
        .unwrap();

    read_model.set_failing(true);
    verify_request(&ctx.deps, &approver, approve(created.request_id))
        .await
        .unwrap();
    read_model.set_failing(false);

    // 再試行ではなく次の操作として受け付けられる
    let active = activate_request(
        &ctx.deps,
        &approver,
        ActivateLoanRequest {
            request_id: created.request_id,
            activated_at: Utc::now(),
        },
    )
    .await
    .unwrap();
    assert_eq!(active.status, RequestStatus::Active);

    let view = ctx.read_model.get_by_id(created.request_id).await.unwrap().unwrap();
    assert_eq!(view.status, RequestStatus::Active);
    assert_eq!(view.verification, Verification::Approved);
    assert_eq!(view.version, 3);
}

#[tokio::test]
async fn test_create_succeeds_without_view_and_projection_recovers_it() {
    let mut ctx = TestContext::new();
    let read_model = Arc::new(UnsteadyReadModel::new(ctx.read_model.clone()));
    ctx.deps.read_model = read_model.clone();
    let unit = ctx.general_unit();

    read_model.set_failing(true);
    let created = create_request(&ctx.deps, &requester(), create_cmd(vec![unit], None, 0, 2))
        .await
        .unwrap();
    assert!(ctx.read_model.get_by_id(created.request_id).await.unwrap().is_none());

    // 確保はコミット済みなので、重なる申請は拒否される
    let result =
        create_request(&ctx.deps, &requester(), create_cmd(vec![unit], None, 1, 2)).await;
    assert!(result.is_err());

    read_model.set_failing(false);
    let view = project_request(&ctx.deps, created.request_id).await.unwrap();
    assert_eq!(view.status, RequestStatus::Booking);
    assert_eq!(view.version, 1);
}

#[tokio::test]
async fn test_expiry_sweep_repairs_stale_views() {
    let mut ctx = TestContext::new();
    let read_model = Arc::new(UnsteadyReadModel::new(ctx.read_model.clone()));
    ctx.deps.read_model = read_model.clone();
    let now = Utc::now();

    let mut cmd = create_cmd(vec![ctx.general_unit()], None, 0, 1);
    cmd.requested_at = now - Duration::hours(72);
    let created = create_request(&ctx.deps, &requester(), cmd).await.unwrap();

    // 承認のビュー更新が失われ、Read Modelでは承認待ちのまま
    read_model.set_failing(true);
    verify_request(&ctx.deps, &kepala(), approve(created.request_id))
        .await
        .unwrap();
    read_model.set_failing(false);

    let expired = expire_pending_requests(
        &ctx.deps,
        &PendingDeadline(Duration::hours(48)),
        ActorId::new(),
        now,
    )
    .await
    .unwrap();
    assert_eq!(expired, 0);

    let view = ctx.read_model.get_by_id(created.request_id).await.unwrap().unwrap();
    assert_eq!(view.status, RequestStatus::Booking);
    assert_eq!(view.verification, Verification::Approved);
    assert_eq!(view.version, 2);
}
