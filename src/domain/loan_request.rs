use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashSet};

use super::{
    ActivateError, ActorId, CancelError, CancelReason, DomainEvent, LoanRequestId, LoanRequested,
    LocationCode, ReplayError, RequestActivated, RequestCancelled, RequestLoanError,
    RequestReturned, RequestStatus, RequestVerified, ResourceKey, ResourceUnitId, ReturnError,
    TimeWindow, Verification, VerificationDecision, VerifyError,
};

/// 監査証跡の遷移種別
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransitionKind {
    Created,
    Approved,
    Rejected,
    Activated,
    Returned,
    Cancelled,
}

/// 監査証跡の1エントリ（誰が・いつ・何をしたか）
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuditEntry {
    pub transition: TransitionKind,
    pub actor: ActorId,
    pub at: DateTime<Utc>,
}

/// LoanRequest集約 - 1回の貸出取引
///
/// 不変条件：
/// - 備品ユニットまたは部屋を少なくとも1つ参照する
/// - verificationはpendingからのみ遷移する（approved/rejectedは終端）
/// - statusはbooking → active → completed、cancelledはbookingからのみ
/// - activeになれるのはverification = approvedの場合のみ
///
/// 物理削除はしない。終端状態も監査のため保持する。
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoanRequest {
    // 識別子
    pub request_id: LoanRequestId,
    pub requester_id: ActorId,

    // 申請内容（booking以外になった後は不変）
    pub agenda: String,
    pub window: TimeWindow,
    pub unit_ids: Vec<ResourceUnitId>,
    pub location: Option<LocationCode>,
    pub extra_location: Option<String>,

    // 状態
    pub status: RequestStatus,
    pub verification: Verification,

    // 監査情報
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub history: Vec<AuditEntry>,

    /// 適用済みイベント数（楽観的排他制御のバージョン）
    pub version: u32,
}

impl LoanRequest {
    /// 申請が参照する資源キーの集合（決定的な順序）
    pub fn resource_keys(&self) -> BTreeSet<ResourceKey> {
        self.unit_ids
            .iter()
            .copied()
            .map(ResourceKey::Unit)
            .chain(self.location.clone().map(ResourceKey::Location))
            .collect()
    }

    pub fn is_requested_by(&self, actor_id: ActorId) -> bool {
        self.requester_id == actor_id
    }

    fn record(mut self, transition: TransitionKind, actor: ActorId, at: DateTime<Utc>) -> Self {
        self.history.push(AuditEntry {
            transition,
            actor,
            at,
        });
        self.updated_at = at;
        self.version += 1;
        self
    }
}

/// 純粋関数：貸出を申請する
///
/// ビジネスルール：
/// - 資源（備品ユニットまたは部屋）を少なくとも1つ参照すること
/// - 同じ備品ユニットの重複参照は不可
/// - 用件（agenda）は必須
/// - 初期状態は booking / pending
///
/// 副作用なし。新しいLoanRequestとイベントを返す。
pub fn request_loan(
    requester_id: ActorId,
    agenda: &str,
    window: TimeWindow,
    unit_ids: Vec<ResourceUnitId>,
    location: Option<LocationCode>,
    extra_location: Option<String>,
    requested_at: DateTime<Utc>,
) -> Result<(LoanRequest, LoanRequested), RequestLoanError> {
    let agenda = agenda.trim();
    if agenda.is_empty() {
        return Err(RequestLoanError::EmptyAgenda);
    }

    if unit_ids.is_empty() && location.is_none() {
        return Err(RequestLoanError::NoResources);
    }

    let mut seen = HashSet::with_capacity(unit_ids.len());
    for unit_id in &unit_ids {
        if !seen.insert(*unit_id) {
            return Err(RequestLoanError::DuplicateUnit(*unit_id));
        }
    }

    let extra_location = extra_location
        .map(|note| note.trim().to_string())
        .filter(|note| !note.is_empty());

    let event = LoanRequested {
        request_id: LoanRequestId::new(),
        requester_id,
        agenda: agenda.to_string(),
        window,
        unit_ids,
        location,
        extra_location,
        requested_at,
    };

    Ok((created_from(&event), event))
}

/// 純粋関数：申請を検証する
///
/// ビジネスルール：
/// - status = booking かつ verification = pending のときのみ
/// - 一度承認・却下された申請は再検証できない
pub fn verify_request(
    request: &LoanRequest,
    decision: VerificationDecision,
    verified_by: ActorId,
    verified_at: DateTime<Utc>,
) -> Result<(LoanRequest, RequestVerified), VerifyError> {
    if request.status != RequestStatus::Booking {
        return Err(VerifyError::NotBooking(request.status));
    }
    if request.verification != Verification::Pending {
        return Err(VerifyError::AlreadyVerified(request.verification));
    }

    let event = RequestVerified {
        request_id: request.request_id,
        decision,
        verified_by,
        verified_at,
    };

    Ok((verified(request.clone(), &event), event))
}

/// 純粋関数：貸出を開始する
///
/// ビジネスルール：
/// - status = booking かつ verification = approved のときのみ
/// - 却下された申請は開始できない
pub fn activate_request(
    request: &LoanRequest,
    activated_by: ActorId,
    activated_at: DateTime<Utc>,
) -> Result<(LoanRequest, RequestActivated), ActivateError> {
    if request.status != RequestStatus::Booking {
        return Err(ActivateError::NotBooking(request.status));
    }
    if request.verification != Verification::Approved {
        return Err(ActivateError::NotApproved(request.verification));
    }

    let event = RequestActivated {
        request_id: request.request_id,
        activated_by,
        activated_at,
    };

    Ok((activated(request.clone(), &event), event))
}

/// 純粋関数：資源を返却する
pub fn return_request(
    request: &LoanRequest,
    returned_by: ActorId,
    returned_at: DateTime<Utc>,
) -> Result<(LoanRequest, RequestReturned), ReturnError> {
    if request.status != RequestStatus::Active {
        return Err(ReturnError::NotActive(request.status));
    }

    let event = RequestReturned {
        request_id: request.request_id,
        returned_by,
        returned_at,
    };

    Ok((returned(request.clone(), &event), event))
}

/// 純粋関数：申請を取り消す
///
/// bookingであれば検証状態は問わない（却下済み申請のクローズにも使う）。
pub fn cancel_request(
    request: &LoanRequest,
    cancelled_by: ActorId,
    reason: CancelReason,
    cancelled_at: DateTime<Utc>,
) -> Result<(LoanRequest, RequestCancelled), CancelError> {
    if request.status != RequestStatus::Booking {
        return Err(CancelError::NotBooking(request.status));
    }

    let event = RequestCancelled {
        request_id: request.request_id,
        cancelled_by,
        reason,
        cancelled_at,
    };

    Ok((cancelled(request.clone(), &event), event))
}

fn created_from(e: &LoanRequested) -> LoanRequest {
    LoanRequest {
        request_id: e.request_id,
        requester_id: e.requester_id,
        agenda: e.agenda.clone(),
        window: e.window,
        unit_ids: e.unit_ids.clone(),
        location: e.location.clone(),
        extra_location: e.extra_location.clone(),
        status: RequestStatus::Booking,
        verification: Verification::Pending,
        created_at: e.requested_at,
        updated_at: e.requested_at,
        history: vec![AuditEntry {
            transition: TransitionKind::Created,
            actor: e.requester_id,
            at: e.requested_at,
        }],
        version: 1,
    }
}

fn verified(request: LoanRequest, e: &RequestVerified) -> LoanRequest {
    let (verification, transition) = match e.decision {
        VerificationDecision::Approve => (Verification::Approved, TransitionKind::Approved),
        VerificationDecision::Reject => (Verification::Rejected, TransitionKind::Rejected),
    };
    LoanRequest {
        verification,
        ..request
    }
    .record(transition, e.verified_by, e.verified_at)
}

fn activated(request: LoanRequest, e: &RequestActivated) -> LoanRequest {
    LoanRequest {
        status: RequestStatus::Active,
        ..request
    }
    .record(TransitionKind::Activated, e.activated_by, e.activated_at)
}

fn returned(request: LoanRequest, e: &RequestReturned) -> LoanRequest {
    LoanRequest {
        status: RequestStatus::Completed,
        ..request
    }
    .record(TransitionKind::Returned, e.returned_by, e.returned_at)
}

fn cancelled(request: LoanRequest, e: &RequestCancelled) -> LoanRequest {
    LoanRequest {
        status: RequestStatus::Cancelled,
        ..request
    }
    .record(TransitionKind::Cancelled, e.cancelled_by, e.cancelled_at)
}

/// イベントを適用して新しい状態を生成する純粋関数
///
/// 状態遷移グラフに反するイベントは`ReplayError`として返す。
pub fn apply_event(
    request: Option<LoanRequest>,
    event: &DomainEvent,
) -> Result<LoanRequest, ReplayError> {
    let request = match (request, event) {
        (None, DomainEvent::LoanRequested(e)) => return Ok(created_from(e)),
        (None, other) => return Err(ReplayError::MissingCreation(other.request_id())),
        (Some(request), _) => request,
    };

    if event.request_id() != request.request_id {
        return Err(ReplayError::ForeignEvent {
            expected: request.request_id,
            found: event.request_id(),
        });
    }

    let invalid = |request: &LoanRequest| ReplayError::InvalidTransition {
        request_id: request.request_id,
        event_type: event.event_type(),
        status: request.status.as_str(),
        verification: request.verification.as_str(),
    };

    match event {
        DomainEvent::RequestVerified(e)
            if request.status == RequestStatus::Booking
                && request.verification == Verification::Pending =>
        {
            Ok(verified(request, e))
        }
        DomainEvent::RequestActivated(e)
            if request.status == RequestStatus::Booking
                && request.verification == Verification::Approved =>
        {
            Ok(activated(request, e))
        }
        DomainEvent::RequestReturned(e) if request.status == RequestStatus::Active => {
            Ok(returned(request, e))
        }
        DomainEvent::RequestCancelled(e) if request.status == RequestStatus::Booking => {
            Ok(cancelled(request, e))
        }
        _ => Err(invalid(&request)),
    }
}

/// イベント列から現在の状態を復元する純粋関数
///
/// # 戻り値
/// * イベントが空の場合は`Ok(None)`
/// * それ以外は復元されたLoanRequestを`Ok(Some)`で返す
pub fn replay_events(events: &[DomainEvent]) -> Result<Option<LoanRequest>, ReplayError> {
    events
        .iter()
        .try_fold(None, |request, event| apply_event(request, event).map(Some))
}
