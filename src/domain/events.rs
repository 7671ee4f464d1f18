use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{
    ActorId, CancelReason, LocationCode, LoanRequestId, ResourceUnitId, TimeWindow,
    VerificationDecision,
};

/// イベント：貸出が申請された
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoanRequested {
    pub request_id: LoanRequestId,
    pub requester_id: ActorId,
    pub agenda: String,
    pub window: TimeWindow,
    pub unit_ids: Vec<ResourceUnitId>,
    pub location: Option<LocationCode>,
    pub extra_location: Option<String>,
    pub requested_at: DateTime<Utc>,
}

/// イベント：申請が検証（承認・却下）された
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequestVerified {
    pub request_id: LoanRequestId,
    pub decision: VerificationDecision,
    pub verified_by: ActorId,
    pub verified_at: DateTime<Utc>,
}

/// イベント：貸出が開始された（資源の確保が確定）
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequestActivated {
    pub request_id: LoanRequestId,
    pub activated_by: ActorId,
    pub activated_at: DateTime<Utc>,
}

/// イベント：資源が返却され貸出が完了した
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequestReturned {
    pub request_id: LoanRequestId,
    pub returned_by: ActorId,
    pub returned_at: DateTime<Utc>,
}

/// イベント：申請が取り消された
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequestCancelled {
    pub request_id: LoanRequestId,
    pub cancelled_by: ActorId,
    pub reason: CancelReason,
    pub cancelled_at: DateTime<Utc>,
}

/// ドメインイベント統合型
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum DomainEvent {
    LoanRequested(LoanRequested),
    RequestVerified(RequestVerified),
    RequestActivated(RequestActivated),
    RequestReturned(RequestReturned),
    RequestCancelled(RequestCancelled),
}

impl DomainEvent {
    /// イベント種別の識別子（永続化時の判別子）
    pub fn event_type(&self) -> &'static str {
        match self {
            DomainEvent::LoanRequested(_) => "LoanRequested",
            DomainEvent::RequestVerified(_) => "RequestVerified",
            DomainEvent::RequestActivated(_) => "RequestActivated",
            DomainEvent::RequestReturned(_) => "RequestReturned",
            DomainEvent::RequestCancelled(_) => "RequestCancelled",
        }
    }

    pub fn request_id(&self) -> LoanRequestId {
        match self {
            DomainEvent::LoanRequested(e) => e.request_id,
            DomainEvent::RequestVerified(e) => e.request_id,
            DomainEvent::RequestActivated(e) => e.request_id,
            DomainEvent::RequestReturned(e) => e.request_id,
            DomainEvent::RequestCancelled(e) => e.request_id,
        }
    }

    pub fn occurred_at(&self) -> DateTime<Utc> {
        match self {
            DomainEvent::LoanRequested(e) => e.requested_at,
            DomainEvent::RequestVerified(e) => e.verified_at,
            DomainEvent::RequestActivated(e) => e.activated_at,
            DomainEvent::RequestReturned(e) => e.returned_at,
            DomainEvent::RequestCancelled(e) => e.cancelled_at,
        }
    }
}
