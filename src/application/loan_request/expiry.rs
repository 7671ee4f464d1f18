use chrono::{DateTime, Duration, Utc};

use crate::domain::{
    self, ActorId, CancelReason, DomainEvent, RequestStatus, Verification,
    approval::Classification,
    loan_request::LoanRequest,
};
use crate::ports::{ExpiryPolicy, LoanRequestView};

use super::errors::{LoanRequestError, Result};
use super::projection::{classify_existing, publish_view};
use super::service::{ServiceDependencies, allocation_change, load_request};

/// 期限なし（既定）
///
/// 承認待ちの申請は、権限のあるアクターが処理するか申請者が取り消すまで残る。
#[derive(Debug, Clone, Copy, Default)]
pub struct NeverExpire;

impl ExpiryPolicy for NeverExpire {
    fn cutoff(&self, _now: DateTime<Utc>) -> Option<DateTime<Utc>> {
        None
    }
}

/// 作成から一定時間を過ぎた承認待ち申請を期限切れとする
#[derive(Debug, Clone, Copy)]
pub struct PendingDeadline(pub Duration);

impl ExpiryPolicy for PendingDeadline {
    fn cutoff(&self, now: DateTime<Utc>) -> Option<DateTime<Utc>> {
        Some(now - self.0)
    }
}

/// 期限切れの承認待ち申請を取り消すバッチ
///
/// 定期的に実行され、ポリシーの期限を過ぎた booking / pending の申請を
/// 理由`Expired`で取り消し、仮押さえを解放する。
///
/// 処理フロー：
/// 1. Read Modelから期限切れ候補を取得
/// 2. 各候補について：
///    - イベントから現在の状態を復元（Read Modelは遅れている可能性がある）
///    - まだ booking / pending の場合のみ取り消す
///    - 既に処理済みでビューが遅れていれば、イベントから再構築する
///    - 他のコマンドと競合した場合はスキップ（次回の実行で再判定）
/// 3. 取り消した件数を返す
///
/// 承認ルーティングは経由しない。`sweeper`はシステムのアクターとして監査証跡に残る。
pub async fn expire_pending_requests(
    deps: &ServiceDependencies,
    policy: &dyn ExpiryPolicy,
    sweeper: ActorId,
    now: DateTime<Utc>,
) -> Result<usize> {
    let Some(cutoff) = policy.cutoff(now) else {
        return Ok(0);
    };

    // 1. Read Modelから期限切れ候補を取得
    let candidates = deps
        .read_model
        .find_pending_created_before(cutoff)
        .await
        .map_err(LoanRequestError::ReadModelError)?;

    let mut expired_count = 0;

    for view in candidates {
        // 2.1. イベントから現在の状態を復元
        let request = load_request(&deps.event_store, view.request_id).await?;

        // 2.2. 既に処理された申請はスキップ（遅れているビューは修復する）
        if request.status != RequestStatus::Booking
            || request.verification != Verification::Pending
            || request.created_at >= cutoff
        {
            if request.version > view.version {
                tracing::warn!(
                    request_id = %request.request_id,
                    view_version = view.version,
                    version = request.version,
                    "Stale view found during expiry sweep, reprojecting"
                );
                let classification = current_classification(deps, &request, &view).await;
                publish_view(deps, &request, classification).await;
            }
            continue;
        }

        let (updated, event) = domain::loan_request::cancel_request(
            &request,
            sweeper,
            CancelReason::Expired,
            now,
        )
        .map_err(|e| LoanRequestError::InvalidTransition(e.to_string()))?;

        match deps
            .reservation_store
            .release_allocation(allocation_change(
                &request,
                vec![DomainEvent::RequestCancelled(event)],
            ))
            .await
            .map_err(LoanRequestError::from)
        {
            Ok(()) => {}
            Err(LoanRequestError::ConcurrencyConflict) => {
                tracing::warn!(
                    request_id = %request.request_id,
                    "Request changed during expiry sweep, skipping"
                );
                continue;
            }
            Err(other) => return Err(other),
        }

        // 2.3. Read Modelを更新
        let classification = current_classification(deps, &updated, &view).await;
        publish_view(deps, &updated, classification).await;

        tracing::info!(
            request_id = %updated.request_id,
            created_at = %updated.created_at,
            "Pending loan request expired"
        );

        expired_count += 1;
    }

    Ok(expired_count)
}

/// 取消は確定済みなので、カタログを参照できなければ保存済みの分類を使う
async fn current_classification(
    deps: &ServiceDependencies,
    request: &LoanRequest,
    view: &LoanRequestView,
) -> Classification {
    match classify_existing(deps, request).await {
        Ok(classification) => classification,
        Err(e) => {
            tracing::warn!(
                request_id = %request.request_id,
                error.message = %e,
                "Catalog lookup failed, keeping stored classification"
            );
            Classification {
                departmental: view.departmental,
                general_pool: view.general_pool,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_never_expire_has_no_cutoff() {
        assert_eq!(NeverExpire.cutoff(Utc::now()), None);
    }

    #[test]
    fn test_pending_deadline_cutoff() {
        let now = Utc::now();
        let policy = PendingDeadline(Duration::hours(48));
        assert_eq!(policy.cutoff(now), Some(now - Duration::hours(48)));
    }
}
