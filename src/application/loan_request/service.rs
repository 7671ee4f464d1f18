use crate::domain::{
    self, Actor, CancelReason, DomainEvent, LoanRequestId, LocationCode, ResourceKey,
    ResourceProfile, ResourceUnitId, TimeWindow, VerificationDecision,
    approval::{Action, ApprovalPolicy, Classification, RequestSnapshot},
    commands::*,
    loan_request::LoanRequest,
};
use crate::ports::*;
use futures::future::try_join_all;
use std::future::Future;
use std::sync::Arc;

use super::errors::{LoanRequestError, Result};
use super::projection::{classify_existing, publish_view};

/// `ConcurrencyConflict`を透過的に再試行する既定回数
pub const DEFAULT_CONFLICT_RETRY_LIMIT: u32 = 3;

/// エンジンの動作設定
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EngineSettings {
    pub conflict_retry_limit: u32,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            conflict_retry_limit: DEFAULT_CONFLICT_RETRY_LIMIT,
        }
    }
}

/// サービスの依存関係
///
/// 関数型DDDの原則に従い、データ構造として定義。
/// 振る舞い（メソッド）は持たず、純粋な関数に依存関係を渡す。
#[derive(Clone)]
pub struct ServiceDependencies {
    pub event_store: Arc<dyn EventStore>,
    pub reservation_store: Arc<dyn ReservationStore>,
    pub read_model: Arc<dyn LoanRequestReadModel>,
    pub catalog: Arc<dyn ResourceCatalog>,
    pub approval_policy: Arc<ApprovalPolicy>,
    pub settings: EngineSettings,
}

/// イベントストアから申請集約を復元するヘルパー関数
///
/// # エラー
/// - EventStoreError: イベント読み込み失敗
/// - CorruptedHistory: イベント列が遷移グラフに反している
/// - NotFound: イベントが存在しない
pub(super) async fn load_request(
    event_store: &Arc<dyn EventStore>,
    request_id: LoanRequestId,
) -> Result<LoanRequest> {
    let events = event_store.load(request_id).await?;

    domain::loan_request::replay_events(&events)
        .map_err(LoanRequestError::CorruptedHistory)?
        .ok_or(LoanRequestError::NotFound)
}

/// 申請が参照する資源をカタログから取得するヘルパー関数
///
/// 新規申請の検証用。カタログに存在しない資源は`InvalidRequest`とする。
/// 既存の申請の分類には`classify_existing`を使う。
async fn load_profile(
    catalog: &Arc<dyn ResourceCatalog>,
    unit_ids: &[ResourceUnitId],
    location: Option<&LocationCode>,
) -> Result<ResourceProfile> {
    let lookups = unit_ids.iter().map(|unit_id| async move {
        catalog
            .get_resource(*unit_id)
            .await
            .map_err(LoanRequestError::CatalogError)?
            .ok_or_else(|| {
                LoanRequestError::InvalidRequest(format!("Unknown resource unit {}", unit_id))
            })
    });
    let units = try_join_all(lookups).await?;

    let location = match location {
        Some(code) => Some(
            catalog
                .get_location(code)
                .await
                .map_err(LoanRequestError::CatalogError)?
                .ok_or_else(|| {
                    LoanRequestError::InvalidRequest(format!("Unknown location {}", code))
                })?,
        ),
        None => None,
    };

    Ok(ResourceProfile { units, location })
}

/// カタログ上で供用停止中の資源キー
fn out_of_service(profile: &ResourceProfile) -> Vec<ResourceKey> {
    profile
        .units
        .iter()
        .filter(|unit| !unit.available)
        .map(|unit| ResourceKey::Unit(unit.id))
        .chain(
            profile
                .location
                .iter()
                .filter(|location| !location.available)
                .map(|location| ResourceKey::Location(location.code.clone())),
        )
        .collect()
}

pub(super) fn snapshot(request: &LoanRequest, classification: Classification) -> RequestSnapshot {
    RequestSnapshot {
        requester_id: request.requester_id,
        status: request.status,
        verification: request.verification,
        classification,
    }
}

/// 承認ルーティングで認可するヘルパー関数
///
/// 分類はキャッシュせず、呼び出し側がコマンドのたびにカタログから求めたものを渡す。
pub(super) fn authorize(
    deps: &ServiceDependencies,
    action: Action,
    request: &LoanRequest,
    classification: Classification,
    actor: &Actor,
) -> Result<()> {
    deps.approval_policy
        .authorize(action, &snapshot(request, classification), actor)
        .map_err(|denial| {
            tracing::debug!(
                request_id = %request.request_id,
                actor = %actor.id,
                role = actor.role.as_str(),
                %denial,
                "Command denied"
            );
            LoanRequestError::from(denial)
        })
}

/// 申請集約からRead Model用のビューを構築するヘルパー関数
pub(super) fn build_view(
    request: &LoanRequest,
    classification: Classification,
) -> LoanRequestView {
    LoanRequestView {
        request_id: request.request_id,
        requester_id: request.requester_id,
        agenda: request.agenda.clone(),
        start_at: request.window.start(),
        end_at: request.window.end(),
        unit_ids: request.unit_ids.clone(),
        location: request.location.clone(),
        extra_location: request.extra_location.clone(),
        status: request.status,
        verification: request.verification,
        departmental: classification.departmental,
        general_pool: classification.general_pool,
        created_at: request.created_at,
        updated_at: request.updated_at,
        version: request.version,
    }
}

pub(super) fn allocation_change(
    request: &LoanRequest,
    events: Vec<DomainEvent>,
) -> AllocationChange {
    AllocationChange {
        request_id: request.request_id,
        expected_version: request.version,
        keys: request.resource_keys(),
        window: request.window,
        events,
    }
}

/// `ConcurrencyConflict`を上限回数まで再試行する
///
/// 再試行のたびに集約を読み直すため、`operation`は状態を持たないこと。
async fn with_conflict_retry<T, F, Fut>(
    settings: EngineSettings,
    command: &'static str,
    request_id: LoanRequestId,
    mut operation: F,
) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let mut attempt = 0;
    loop {
        match operation().await {
            Err(LoanRequestError::ConcurrencyConflict)
                if attempt < settings.conflict_retry_limit =>
            {
                attempt += 1;
                tracing::warn!(
                    %request_id,
                    command,
                    attempt,
                    "Concurrency conflict, retrying"
                );
                tokio::task::yield_now().await;
            }
            result => return result,
        }
    }
}

/// 貸出を申請する
///
/// ビジネスルール：
/// - 申請者ロールのみ
/// - 時間帯は start < end
/// - 資源を少なくとも1つ参照し、すべてカタログに存在すること
/// - 供用停止中の資源や、他の申請が重なる時間帯を押さえている資源は申請不可
///
/// 空き確認と仮押さえの作成は同じトランザクションで行う。
///
/// # 一貫性保証
///
/// イベントと確保は原子的に確定する。Read Modelはその後に更新される（結果整合性）。
/// Read Modelの更新に失敗しても、確定済みの申請を返す。
pub async fn create_request(
    deps: &ServiceDependencies,
    actor: &Actor,
    cmd: CreateLoanRequest,
) -> Result<LoanRequest> {
    // 1. 認可（申請者ロールのみ）
    deps.approval_policy.authorize_create(actor).map_err(|denial| {
        tracing::debug!(actor = %actor.id, role = actor.role.as_str(), %denial, "Create denied");
        LoanRequestError::from(denial)
    })?;

    // 2. 入力の検証
    let window = TimeWindow::new(cmd.start_at, cmd.end_at)
        .map_err(|e| LoanRequestError::InvalidRequest(e.to_string()))?;

    let (request, event) = domain::loan_request::request_loan(
        actor.id,
        &cmd.agenda,
        window,
        cmd.unit_ids,
        cmd.location,
        cmd.extra_location,
        cmd.requested_at,
    )
    .map_err(|e| LoanRequestError::InvalidRequest(e.to_string()))?;

    // 3. カタログから資源を取得（存在確認と分類）
    let profile =
        load_profile(&deps.catalog, &request.unit_ids, request.location.as_ref()).await?;

    let out_of_service = out_of_service(&profile);
    if !out_of_service.is_empty() {
        return Err(LoanRequestError::ResourceUnavailable(out_of_service));
    }

    let classification = deps.approval_policy.classify(&profile);

    // 4. 空き確認と仮押さえ（同一トランザクション）
    deps.reservation_store
        .insert_if_available(AllocationChange {
            request_id: request.request_id,
            expected_version: 0,
            keys: request.resource_keys(),
            window,
            events: vec![DomainEvent::LoanRequested(event)],
        })
        .await?;

    // 5. Read Modelを更新（失敗してもコマンドは確定済み）
    publish_view(deps, &request, classification).await;

    tracing::info!(
        request_id = %request.request_id,
        requester = %actor.id,
        departmental = classification.departmental,
        "Loan request created"
    );

    Ok(request)
}

/// 申請を検証する（承認・却下）
///
/// ビジネスルール：
/// - booking / pending のときのみ（再検証は不可）
/// - 学科扱いの申請は学科職員、それ以外は教務課長（全学共通なら一般職員も可）
/// - 却下した申請の仮押さえは同じトランザクションで解放する
pub async fn verify_request(
    deps: &ServiceDependencies,
    actor: &Actor,
    cmd: VerifyLoanRequest,
) -> Result<LoanRequest> {
    with_conflict_retry(deps.settings, "verify", cmd.request_id, || {
        verify_once(deps, actor, &cmd)
    })
    .await
}

async fn verify_once(
    deps: &ServiceDependencies,
    actor: &Actor,
    cmd: &VerifyLoanRequest,
) -> Result<LoanRequest> {
    let request = load_request(&deps.event_store, cmd.request_id).await?;
    let classification = classify_existing(deps, &request).await?;

    authorize(deps, Action::Verify, &request, classification, actor)?;

    let (updated, event) = domain::loan_request::verify_request(
        &request,
        cmd.decision,
        actor.id,
        cmd.verified_at,
    )
    .map_err(|e| LoanRequestError::InvalidTransition(e.to_string()))?;

    let events = vec![DomainEvent::RequestVerified(event)];
    match cmd.decision {
        VerificationDecision::Approve => {
            deps.event_store
                .append(request.request_id, request.version, events)
                .await?;
        }
        VerificationDecision::Reject => {
            deps.reservation_store
                .release_allocation(allocation_change(&request, events))
                .await?;
        }
    }

    publish_view(deps, &updated, classification).await;

    tracing::info!(
        request_id = %updated.request_id,
        verifier = %actor.id,
        role = actor.role.as_str(),
        verification = updated.verification.as_str(),
        "Loan request verified"
    );

    Ok(updated)
}

/// 貸出を開始する
///
/// ビジネスルール：
/// - booking / approved のときのみ
/// - 仮押さえを確定に変える。承認後に他の申請が確定済みなら`ResourceUnavailable`
pub async fn activate_request(
    deps: &ServiceDependencies,
    actor: &Actor,
    cmd: ActivateLoanRequest,
) -> Result<LoanRequest> {
    with_conflict_retry(deps.settings, "activate", cmd.request_id, || {
        activate_once(deps, actor, &cmd)
    })
    .await
}

async fn activate_once(
    deps: &ServiceDependencies,
    actor: &Actor,
    cmd: &ActivateLoanRequest,
) -> Result<LoanRequest> {
    let request = load_request(&deps.event_store, cmd.request_id).await?;
    let classification = classify_existing(deps, &request).await?;

    authorize(deps, Action::Activate, &request, classification, actor)?;

    let (updated, event) =
        domain::loan_request::activate_request(&request, actor.id, cmd.activated_at)
            .map_err(|e| LoanRequestError::InvalidTransition(e.to_string()))?;

    deps.reservation_store
        .confirm_allocation(allocation_change(
            &request,
            vec![DomainEvent::RequestActivated(event)],
        ))
        .await?;

    publish_view(deps, &updated, classification).await;

    tracing::info!(
        request_id = %updated.request_id,
        actor = %actor.id,
        role = actor.role.as_str(),
        "Loan request activated"
    );

    Ok(updated)
}

/// 資源を返却する
///
/// ビジネスルール：
/// - active のときのみ
/// - 貸出開始と同じロール区分が実行できる
/// - すべての確保を解放し、重ならない新規申請が可能になる
pub async fn return_request(
    deps: &ServiceDependencies,
    actor: &Actor,
    cmd: ReturnLoanRequest,
) -> Result<LoanRequest> {
    with_conflict_retry(deps.settings, "return", cmd.request_id, || {
        return_once(deps, actor, &cmd)
    })
    .await
}

async fn return_once(
    deps: &ServiceDependencies,
    actor: &Actor,
    cmd: &ReturnLoanRequest,
) -> Result<LoanRequest> {
    let request = load_request(&deps.event_store, cmd.request_id).await?;
    let classification = classify_existing(deps, &request).await?;

    authorize(deps, Action::Return, &request, classification, actor)?;

    let (updated, event) =
        domain::loan_request::return_request(&request, actor.id, cmd.returned_at)
            .map_err(|e| LoanRequestError::InvalidTransition(e.to_string()))?;

    deps.reservation_store
        .release_allocation(allocation_change(
            &request,
            vec![DomainEvent::RequestReturned(event)],
        ))
        .await?;

    publish_view(deps, &updated, classification).await;

    tracing::info!(
        request_id = %updated.request_id,
        actor = %actor.id,
        role = actor.role.as_str(),
        "Loan request completed"
    );

    Ok(updated)
}

/// 申請を取り消す
///
/// ビジネスルール：
/// - booking のときのみ（検証状態は問わない）
/// - 申請者本人、または検証権限を持つロール（管理上の取消）
/// - 仮押さえを解放する
pub async fn cancel_request(
    deps: &ServiceDependencies,
    actor: &Actor,
    cmd: CancelLoanRequest,
) -> Result<LoanRequest> {
    with_conflict_retry(deps.settings, "cancel", cmd.request_id, || {
        cancel_once(deps, actor, &cmd)
    })
    .await
}

async fn cancel_once(
    deps: &ServiceDependencies,
    actor: &Actor,
    cmd: &CancelLoanRequest,
) -> Result<LoanRequest> {
    let request = load_request(&deps.event_store, cmd.request_id).await?;
    let classification = classify_existing(deps, &request).await?;

    authorize(deps, Action::Cancel, &request, classification, actor)?;

    let reason = if request.is_requested_by(actor.id) {
        CancelReason::Withdrawn
    } else {
        CancelReason::Administrative
    };

    let (updated, event) =
        domain::loan_request::cancel_request(&request, actor.id, reason, cmd.cancelled_at)
            .map_err(|e| LoanRequestError::InvalidTransition(e.to_string()))?;

    deps.reservation_store
        .release_allocation(allocation_change(
            &request,
            vec![DomainEvent::RequestCancelled(event)],
        ))
        .await?;

    publish_view(deps, &updated, classification).await;

    tracing::info!(
        request_id = %updated.request_id,
        actor = %actor.id,
        ?reason,
        "Loan request cancelled"
    );

    Ok(updated)
}
