use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{LoanRequestId, LocationCode, ResourceUnitId, VerificationDecision};

/// コマンド：貸出を申請する
///
/// 時間帯はまだ検証前の生の値で受け取り、エンジン側で`TimeWindow`に変換する。
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreateLoanRequest {
    pub agenda: String,
    pub start_at: DateTime<Utc>,
    pub end_at: DateTime<Utc>,
    pub unit_ids: Vec<ResourceUnitId>,
    pub location: Option<LocationCode>,
    pub extra_location: Option<String>,
    pub requested_at: DateTime<Utc>,
}

/// コマンド：申請を検証する
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VerifyLoanRequest {
    pub request_id: LoanRequestId,
    pub decision: VerificationDecision,
    pub verified_at: DateTime<Utc>,
}

/// コマンド：貸出を開始する
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActivateLoanRequest {
    pub request_id: LoanRequestId,
    pub activated_at: DateTime<Utc>,
}

/// コマンド：資源を返却する
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReturnLoanRequest {
    pub request_id: LoanRequestId,
    pub returned_at: DateTime<Utc>,
}

/// コマンド：申請を取り消す
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CancelLoanRequest {
    pub request_id: LoanRequestId,
    pub cancelled_at: DateTime<Utc>,
}
