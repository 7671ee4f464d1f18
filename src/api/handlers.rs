use crate::application::loan_request::{self as app, ServiceDependencies, allowed_actions};
use crate::domain::{
    Actor, LoanRequestId,
    commands::{ActivateLoanRequest, CancelLoanRequest, ReturnLoanRequest, VerifyLoanRequest},
    loan_request::LoanRequest,
};
use axum::{
    Json,
    extract::{Path, Query, State},
    http::StatusCode,
};
use chrono::Utc;
use std::sync::Arc;
use uuid::Uuid;

use super::{
    error::ApiError,
    extractor::ActorContext,
    types::{
        CheckInBody, CheckInResponse, CreateLoanRequestBody, HistoryEntryResponse,
        ListLoanRequestsParams, LoanRequestResponse, VerifyRequestBody,
    },
};

// ============================================================================
// State
// ============================================================================

/// ハンドラー間で共有されるアプリケーション状態
#[derive(Clone)]
pub struct AppState {
    pub service_deps: ServiceDependencies,
}

/// コマンドが確定した集約をレスポンスにする
///
/// Read Modelの更新を待たず、コマンドの結果そのものを返す。
async fn request_response(
    deps: &ServiceDependencies,
    actor: &Actor,
    request: &LoanRequest,
) -> Result<LoanRequestResponse, ApiError> {
    let view = app::request_view(deps, request).await?;

    let actions = allowed_actions(deps, actor, &view);
    Ok(LoanRequestResponse::new(view, actions))
}

// ============================================================================
// Command handlers (POST)
// ============================================================================

/// POST /loan-requests - 貸出を申請
///
/// 強制されるビジネスルール:
/// - 申請者ロールのみ
/// - 資源を少なくとも1つ参照し、時間帯は start < end
/// - 重なる時間帯に他の申請が確保している資源は申請不可
pub async fn create_loan_request(
    State(state): State<Arc<AppState>>,
    ActorContext(actor): ActorContext,
    Json(body): Json<CreateLoanRequestBody>,
) -> Result<(StatusCode, Json<LoanRequestResponse>), ApiError> {
    let cmd = body.to_command(Utc::now())?;
    let request = app::create_request(&state.service_deps, &actor, cmd).await?;

    let response = request_response(&state.service_deps, &actor, &request).await?;
    Ok((StatusCode::CREATED, Json(response)))
}

/// POST /loan-requests/:id/verify - 申請を承認・却下
pub async fn verify_loan_request(
    State(state): State<Arc<AppState>>,
    ActorContext(actor): ActorContext,
    Path(request_id): Path<Uuid>,
    Json(body): Json<VerifyRequestBody>,
) -> Result<Json<LoanRequestResponse>, ApiError> {
    let request_id = LoanRequestId::from_uuid(request_id);
    let cmd = VerifyLoanRequest {
        request_id,
        decision: body.decision,
        verified_at: Utc::now(),
    };

    let request = app::verify_request(&state.service_deps, &actor, cmd).await?;

    Ok(Json(request_response(&state.service_deps, &actor, &request).await?))
}

/// POST /loan-requests/:id/activate - 貸出を開始
pub async fn activate_loan_request(
    State(state): State<Arc<AppState>>,
    ActorContext(actor): ActorContext,
    Path(request_id): Path<Uuid>,
) -> Result<Json<LoanRequestResponse>, ApiError> {
    let request_id = LoanRequestId::from_uuid(request_id);
    let cmd = ActivateLoanRequest {
        request_id,
        activated_at: Utc::now(),
    };

    let request = app::activate_request(&state.service_deps, &actor, cmd).await?;

    Ok(Json(request_response(&state.service_deps, &actor, &request).await?))
}

/// POST /loan-requests/:id/return - 資源を返却
pub async fn return_loan_request(
    State(state): State<Arc<AppState>>,
    ActorContext(actor): ActorContext,
    Path(request_id): Path<Uuid>,
) -> Result<Json<LoanRequestResponse>, ApiError> {
    let request_id = LoanRequestId::from_uuid(request_id);
    let cmd = ReturnLoanRequest {
        request_id,
        returned_at: Utc::now(),
    };

    let request = app::return_request(&state.service_deps, &actor, cmd).await?;

    Ok(Json(request_response(&state.service_deps, &actor, &request).await?))
}

/// POST /loan-requests/:id/cancel - 申請を取り消す
pub async fn cancel_loan_request(
    State(state): State<Arc<AppState>>,
    ActorContext(actor): ActorContext,
    Path(request_id): Path<Uuid>,
) -> Result<Json<LoanRequestResponse>, ApiError> {
    let request_id = LoanRequestId::from_uuid(request_id);
    let cmd = CancelLoanRequest {
        request_id,
        cancelled_at: Utc::now(),
    };

    let request = app::cancel_request(&state.service_deps, &actor, cmd).await?;

    Ok(Json(request_response(&state.service_deps, &actor, &request).await?))
}

/// POST /check-in - 確認コードのスキャン
///
/// 受け取りのスキャンは冪等（既に貸出中なら現在の状態を返す）。
pub async fn check_in(
    State(state): State<Arc<AppState>>,
    ActorContext(actor): ActorContext,
    Json(body): Json<CheckInBody>,
) -> Result<Json<CheckInResponse>, ApiError> {
    let outcome =
        app::check_in(&state.service_deps, &actor, &body.code, body.purpose, Utc::now()).await?;

    Ok(Json(CheckInResponse::from(outcome)))
}

// ============================================================================
// Query handlers (GET)
// ============================================================================

/// GET /loan-requests - 申請一覧（ロールごとの閲覧範囲）
pub async fn list_loan_requests(
    State(state): State<Arc<AppState>>,
    ActorContext(actor): ActorContext,
    Query(params): Query<ListLoanRequestsParams>,
) -> Result<Json<Vec<LoanRequestResponse>>, ApiError> {
    let query = params.to_query().map_err(ApiError::BadRequest)?;
    let views = app::list_requests(&state.service_deps, &actor, query).await?;

    let responses = views
        .into_iter()
        .map(|view| {
            let actions = allowed_actions(&state.service_deps, &actor, &view);
            LoanRequestResponse::new(view, actions)
        })
        .collect();

    Ok(Json(responses))
}

/// GET /loan-requests/:id - 申請の詳細
pub async fn get_loan_request(
    State(state): State<Arc<AppState>>,
    ActorContext(actor): ActorContext,
    Path(request_id): Path<Uuid>,
) -> Result<Json<LoanRequestResponse>, ApiError> {
    let view = app::get_request(
        &state.service_deps,
        &actor,
        LoanRequestId::from_uuid(request_id),
    )
    .await?;

    let actions = allowed_actions(&state.service_deps, &actor, &view);
    Ok(Json(LoanRequestResponse::new(view, actions)))
}

/// GET /loan-requests/:id/history - 監査証跡
pub async fn get_loan_request_history(
    State(state): State<Arc<AppState>>,
    ActorContext(actor): ActorContext,
    Path(request_id): Path<Uuid>,
) -> Result<Json<Vec<HistoryEntryResponse>>, ApiError> {
    let history = app::request_history(
        &state.service_deps,
        &actor,
        LoanRequestId::from_uuid(request_id),
    )
    .await?;

    Ok(Json(history.into_iter().map(HistoryEntryResponse::from).collect()))
}
