use thiserror::Error;

use super::{LoanRequestId, RequestStatus, ResourceUnitId, Verification};

/// 申請作成のエラー
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RequestLoanError {
    /// 備品も部屋も参照していない
    #[error("a loan request must reference at least one resource")]
    NoResources,
    /// 同じ備品ユニットを重複して参照している
    #[error("resource unit {0} is listed more than once")]
    DuplicateUnit(ResourceUnitId),
    /// 用件が空
    #[error("agenda must not be empty")]
    EmptyAgenda,
}

/// 検証のエラー
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum VerifyError {
    /// 既に検証済み（再検証は不可）
    #[error("request has already been verified ({})", .0.as_str())]
    AlreadyVerified(Verification),
    /// 予約中ではない
    #[error("request is {}, expected booking", .0.as_str())]
    NotBooking(RequestStatus),
}

/// 貸出開始のエラー
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ActivateError {
    /// 承認されていない
    #[error("request verification is {}, expected approved", .0.as_str())]
    NotApproved(Verification),
    /// 予約中ではない
    #[error("request is {}, expected booking", .0.as_str())]
    NotBooking(RequestStatus),
}

/// 返却のエラー
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ReturnError {
    /// 貸出中ではない
    #[error("request is {}, expected active", .0.as_str())]
    NotActive(RequestStatus),
}

/// 取消のエラー
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CancelError {
    /// 予約中ではない
    #[error("request is {}, only booking requests can be cancelled", .0.as_str())]
    NotBooking(RequestStatus),
}

/// イベント列からの復元エラー
///
/// 永続化済みのイベント列が状態遷移グラフに反している場合に発生する。
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ReplayError {
    #[error("event stream for {0} does not start with LoanRequested")]
    MissingCreation(LoanRequestId),
    #[error("event {event_type} for {request_id} cannot be applied in state {status}/{verification}")]
    InvalidTransition {
        request_id: LoanRequestId,
        event_type: &'static str,
        status: &'static str,
        verification: &'static str,
    },
    #[error("event for {found} found in the stream of {expected}")]
    ForeignEvent {
        expected: LoanRequestId,
        found: LoanRequestId,
    },
}
