use crate::application::loan_request::LoanRequestError;
use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};

use super::types::ErrorResponse;

/// API層のエラー型
///
/// アプリケーション層のエラーをラップし、HTTPレスポンスへのマッピングを提供する。
#[derive(Debug)]
pub enum ApiError {
    Application(LoanRequestError),
    /// アクターのヘッダが無い・不正
    Unauthorized(String),
    /// パス・クエリパラメータが不正
    BadRequest(String),
}

impl From<LoanRequestError> for ApiError {
    fn from(err: LoanRequestError) -> Self {
        ApiError::Application(err)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, error_type, message) = match self {
            ApiError::Unauthorized(msg) => (StatusCode::UNAUTHORIZED, "UNAUTHORIZED", msg),
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, "BAD_REQUEST", msg),
            ApiError::Application(err) => application_error(err),
        };

        let body = Json(ErrorResponse::new(error_type, message));
        (status, body).into_response()
    }
}

fn application_error(err: LoanRequestError) -> (StatusCode, &'static str, String) {
    let message = err.to_string();
    match err {
        // 400 Bad Request - 作成入力の不正
        LoanRequestError::InvalidRequest(_) => {
            (StatusCode::BAD_REQUEST, "INVALID_REQUEST", message)
        }

        // 404 Not Found - リクエストされた申請が存在しない
        LoanRequestError::NotFound => (StatusCode::NOT_FOUND, "NOT_FOUND", message),

        // 403 Forbidden - 承認ルーティングに合わない
        LoanRequestError::PermissionDenied(_) => {
            (StatusCode::FORBIDDEN, "PERMISSION_DENIED", message)
        }

        // 409 Conflict - 状態遷移・確保の競合
        LoanRequestError::InvalidTransition(_) => {
            (StatusCode::CONFLICT, "INVALID_TRANSITION", message)
        }
        LoanRequestError::ResourceUnavailable(_) => {
            (StatusCode::CONFLICT, "RESOURCE_UNAVAILABLE", message)
        }
        LoanRequestError::ConcurrencyConflict => {
            (StatusCode::CONFLICT, "CONCURRENCY_CONFLICT", message)
        }

        // 500 Internal Server Error - システム障害
        // 内部エラーの詳細はログに記録し、クライアントには一般的なメッセージのみを返す
        e @ (LoanRequestError::CorruptedHistory(_)
        | LoanRequestError::EventStoreError(_)
        | LoanRequestError::ReservationStoreError(_)
        | LoanRequestError::ReadModelError(_)
        | LoanRequestError::CatalogError(_)) => {
            tracing::error!(
                error.cause_chain = ?e,
                error.message = %e,
                "Unexpected error happened"
            );
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                "INTERNAL_ERROR",
                "Internal server error".to_string(),
            )
        }
    }
}
