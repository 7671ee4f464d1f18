//! チェックイン（受付窓口でのスキャン）
//!
//! 確認コード`PINJAM-<requestId>`を、現在の状態に応じて貸出開始か返却のコマンドに変換する。
//! スキャンした職員がアクターになる。

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::domain::{
    Actor, LoanRequestId, RequestStatus, Verification,
    approval::Action,
    commands::{ActivateLoanRequest, ReturnLoanRequest},
    loan_request::LoanRequest,
};

use super::errors::{LoanRequestError, Result};
use super::projection::classify_existing;
use super::service::{self, ServiceDependencies, load_request};

/// 確認コードの接頭辞
pub const CHECK_IN_PREFIX: &str = "PINJAM-";

/// 申請の確認コードを生成する
pub fn check_in_code(request_id: LoanRequestId) -> String {
    format!("{}{}", CHECK_IN_PREFIX, request_id)
}

/// 確認コードを申請IDに変換する
///
/// 前後の空白は無視する。署名は持たない平文トークン。
pub fn parse_check_in_code(code: &str) -> Result<LoanRequestId> {
    let unrecognized =
        || LoanRequestError::InvalidRequest(format!("Unrecognized check-in code: {}", code));

    let raw = code
        .trim()
        .strip_prefix(CHECK_IN_PREFIX)
        .ok_or_else(unrecognized)?;

    Uuid::parse_str(raw)
        .map(LoanRequestId::from_uuid)
        .map_err(|_| unrecognized())
}

/// スキャンの目的
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScanPurpose {
    /// 受け取り（貸出開始）
    #[default]
    PickUp,
    /// 返却
    Return,
}

/// スキャンの結果として実行された操作
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CheckInAction {
    Activated,
    /// 既に貸出中だった（何もしない）
    AlreadyActive,
    Returned,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CheckInOutcome {
    pub action: CheckInAction,
    pub request: LoanRequest,
}

/// 確認コードをスキャンする
///
/// - 受け取り：booking / approved なら貸出開始。既に active なら現在の状態をそのまま返す（冪等）
/// - 返却：active なら返却
/// - completed / cancelled の申請は`InvalidTransition`
pub async fn check_in(
    deps: &ServiceDependencies,
    actor: &Actor,
    code: &str,
    purpose: ScanPurpose,
    scanned_at: DateTime<Utc>,
) -> Result<CheckInOutcome> {
    let request_id = parse_check_in_code(code)?;
    let request = load_request(&deps.event_store, request_id).await?;

    let outcome = match (purpose, request.status) {
        (_, RequestStatus::Completed | RequestStatus::Cancelled) => {
            return Err(LoanRequestError::InvalidTransition(format!(
                "request {} is already {}",
                request_id,
                request.status.as_str()
            )));
        }
        (ScanPurpose::PickUp, RequestStatus::Active) => {
            already_active(deps, actor, request).await?
        }
        (ScanPurpose::PickUp, RequestStatus::Booking) => {
            let activated = service::activate_request(
                deps,
                actor,
                ActivateLoanRequest {
                    request_id,
                    activated_at: scanned_at,
                },
            )
            .await;

            match activated {
                Ok(request) => CheckInOutcome {
                    action: CheckInAction::Activated,
                    request,
                },
                // 同じコードの同時スキャンに負けた場合も冪等に扱う
                Err(
                    LoanRequestError::InvalidTransition(_)
                    | LoanRequestError::ConcurrencyConflict,
                ) => {
                    let current = load_request(&deps.event_store, request_id).await?;
                    if current.status != RequestStatus::Active
                        || current.verification != Verification::Approved
                    {
                        return Err(LoanRequestError::InvalidTransition(format!(
                            "cannot activate a request in state {}/{}",
                            current.status.as_str(),
                            current.verification.as_str()
                        )));
                    }
                    already_active(deps, actor, current).await?
                }
                Err(other) => return Err(other),
            }
        }
        (ScanPurpose::Return, RequestStatus::Active) => CheckInOutcome {
            action: CheckInAction::Returned,
            request: service::return_request(
                deps,
                actor,
                ReturnLoanRequest {
                    request_id,
                    returned_at: scanned_at,
                },
            )
            .await?,
        },
        (ScanPurpose::Return, RequestStatus::Booking) => {
            return Err(LoanRequestError::InvalidTransition(format!(
                "request {} has not been picked up",
                request_id
            )));
        }
    };

    tracing::info!(
        %request_id,
        actor = %actor.id,
        action = ?outcome.action,
        "Check-in processed"
    );

    Ok(outcome)
}

/// 再スキャン：貸出を開始できるロールであれば現在の状態を返す
async fn already_active(
    deps: &ServiceDependencies,
    actor: &Actor,
    request: LoanRequest,
) -> Result<CheckInOutcome> {
    let classification = classify_existing(deps, &request).await?;

    if !deps
        .approval_policy
        .role_permits(Action::Activate, &classification, actor.role)
    {
        return Err(LoanRequestError::PermissionDenied(format!(
            "role {} may not check in this request",
            actor.role.as_str()
        )));
    }

    Ok(CheckInOutcome {
        action: CheckInAction::AlreadyActive,
        request,
    })
}
