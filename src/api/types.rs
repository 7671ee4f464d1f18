use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::application::loan_request::{
    CheckInAction, CheckInOutcome, ListRequestsQuery, LoanRequestError, ScanPurpose,
    check_in_code,
};
use crate::domain::{
    LocationCode, RequestStatus, ResourceUnitId, Verification, VerificationDecision,
    approval::Action, commands::CreateLoanRequest, loan_request::AuditEntry,
    loan_request::TransitionKind,
};
use crate::ports::LoanRequestView;

/// 貸出申請の作成リクエスト（POST /loan-requests）
#[derive(Debug, Deserialize, Serialize)]
pub struct CreateLoanRequestBody {
    pub agenda: String,
    pub start_at: DateTime<Utc>,
    pub end_at: DateTime<Utc>,
    #[serde(default)]
    pub unit_ids: Vec<Uuid>,
    #[serde(default)]
    pub location: Option<String>,
    #[serde(default)]
    pub extra_location: Option<String>,
}

impl CreateLoanRequestBody {
    pub fn to_command(
        self,
        requested_at: DateTime<Utc>,
    ) -> Result<CreateLoanRequest, LoanRequestError> {
        let location = self
            .location
            .filter(|code| !code.trim().is_empty())
            .map(LocationCode::parse)
            .transpose()
            .map_err(|e| LoanRequestError::InvalidRequest(e.to_string()))?;

        Ok(CreateLoanRequest {
            agenda: self.agenda,
            start_at: self.start_at,
            end_at: self.end_at,
            unit_ids: self.unit_ids.into_iter().map(ResourceUnitId::from_uuid).collect(),
            location,
            extra_location: self.extra_location,
            requested_at,
        })
    }
}

/// 検証リクエスト（POST /loan-requests/:id/verify）
#[derive(Debug, Deserialize, Serialize)]
pub struct VerifyRequestBody {
    pub decision: VerificationDecision,
}

/// チェックインリクエスト（POST /check-in）
#[derive(Debug, Deserialize, Serialize)]
pub struct CheckInBody {
    pub code: String,
    #[serde(default)]
    pub purpose: ScanPurpose,
}

/// 申請一覧取得のクエリパラメータ
#[derive(Debug, Default, Deserialize)]
pub struct ListLoanRequestsParams {
    /// ステータスでフィルタリング
    pub status: Option<String>,
    /// 検証状態でフィルタリング
    pub verification: Option<String>,
    /// 自分が今操作できる申請のみ
    pub actionable: Option<bool>,
}

impl ListLoanRequestsParams {
    pub fn to_query(&self) -> Result<ListRequestsQuery, String> {
        let status = self
            .status
            .as_deref()
            .map(str::parse::<RequestStatus>)
            .transpose()
            .map_err(|e| e.to_string())?;
        let verification = self
            .verification
            .as_deref()
            .map(str::parse::<Verification>)
            .transpose()
            .map_err(|e| e.to_string())?;

        Ok(ListRequestsQuery {
            status,
            verification,
            actionable: self.actionable.unwrap_or(false),
        })
    }
}

/// 申請レスポンス
#[derive(Debug, Serialize, Deserialize)]
pub struct LoanRequestResponse {
    pub request_id: Uuid,
    pub requester_id: Uuid,
    pub agenda: String,
    pub start_at: DateTime<Utc>,
    pub end_at: DateTime<Utc>,
    pub unit_ids: Vec<Uuid>,
    pub location: Option<String>,
    pub extra_location: Option<String>,
    pub status: RequestStatus,
    pub verification: Verification,
    pub departmental: bool,
    pub general_pool: bool,
    pub check_in_code: String,
    /// リクエストしたアクターが今実行できる操作
    pub allowed_actions: Vec<Action>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl LoanRequestResponse {
    pub fn new(view: LoanRequestView, allowed_actions: Vec<Action>) -> Self {
        Self {
            request_id: view.request_id.value(),
            requester_id: view.requester_id.value(),
            agenda: view.agenda,
            start_at: view.start_at,
            end_at: view.end_at,
            unit_ids: view.unit_ids.iter().map(|id| id.value()).collect(),
            location: view.location.map(String::from),
            extra_location: view.extra_location,
            status: view.status,
            verification: view.verification,
            departmental: view.departmental,
            general_pool: view.general_pool,
            check_in_code: check_in_code(view.request_id),
            allowed_actions,
            created_at: view.created_at,
            updated_at: view.updated_at,
        }
    }
}

/// チェックインレスポンス
#[derive(Debug, Serialize, Deserialize)]
pub struct CheckInResponse {
    pub action: CheckInAction,
    pub request_id: Uuid,
    pub status: RequestStatus,
    pub verification: Verification,
    pub updated_at: DateTime<Utc>,
}

impl From<CheckInOutcome> for CheckInResponse {
    fn from(outcome: CheckInOutcome) -> Self {
        Self {
            action: outcome.action,
            request_id: outcome.request.request_id.value(),
            status: outcome.request.status,
            verification: outcome.request.verification,
            updated_at: outcome.request.updated_at,
        }
    }
}

/// 監査証跡の1エントリ（GET /loan-requests/:id/history）
#[derive(Debug, Serialize, Deserialize)]
pub struct HistoryEntryResponse {
    pub transition: TransitionKind,
    pub actor_id: Uuid,
    pub at: DateTime<Utc>,
}

impl From<AuditEntry> for HistoryEntryResponse {
    fn from(entry: AuditEntry) -> Self {
        Self {
            transition: entry.transition,
            actor_id: entry.actor.value(),
            at: entry.at,
        }
    }
}

/// エラーレスポンス
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
    pub message: String,
}

impl ErrorResponse {
    pub fn new(error: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            error: error.into(),
            message: message.into(),
        }
    }
}
