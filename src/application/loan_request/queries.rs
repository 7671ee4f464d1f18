use crate::domain::{
    Actor, LoanRequestId, RequestStatus, Role, Verification,
    approval::{Action, Classification, RequestSnapshot},
    loan_request::AuditEntry,
};
use crate::ports::{LoanRequestView, RequestFilter};

use super::errors::{LoanRequestError, Result};
use super::service::{ServiceDependencies, load_request};

/// 一覧取得の条件
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ListRequestsQuery {
    pub status: Option<RequestStatus>,
    pub verification: Option<Verification>,
    /// trueならアクターが今実行できる操作がある申請に絞る
    pub actionable: bool,
}

/// ロールごとの閲覧範囲
///
/// - 申請者：自分の申請のみ
/// - 学科職員：学科扱いの申請のみ
/// - 一般職員・教務課長：すべて（モニタリング用）
fn visibility_filter(actor: &Actor) -> RequestFilter {
    match actor.role {
        Role::Requester => RequestFilter {
            requester_id: Some(actor.id),
            ..Default::default()
        },
        Role::StaffProdi => RequestFilter {
            departmental: Some(true),
            ..Default::default()
        },
        Role::Staff | Role::KepalaBagianAkademik => RequestFilter::default(),
    }
}

fn is_visible(actor: &Actor, view: &LoanRequestView) -> bool {
    visibility_filter(actor).matches(view)
}

/// ビューに保存された分類スナップショットから判定用の入力を作る
pub(super) fn view_snapshot(view: &LoanRequestView) -> RequestSnapshot {
    RequestSnapshot {
        requester_id: view.requester_id,
        status: view.status,
        verification: view.verification,
        classification: Classification {
            departmental: view.departmental,
            general_pool: view.general_pool,
        },
    }
}

/// アクターがこの申請に対して今実行できる操作
///
/// 表示用。コマンド実行時はカタログから分類し直して改めて認可する。
pub fn allowed_actions(
    deps: &ServiceDependencies,
    actor: &Actor,
    view: &LoanRequestView,
) -> Vec<Action> {
    deps.approval_policy
        .allowed_actions(&view_snapshot(view), actor)
}

/// 申請一覧を取得する（新しい順）
pub async fn list_requests(
    deps: &ServiceDependencies,
    actor: &Actor,
    query: ListRequestsQuery,
) -> Result<Vec<LoanRequestView>> {
    let filter = RequestFilter {
        status: query.status,
        verification: query.verification,
        ..visibility_filter(actor)
    };

    let views = deps
        .read_model
        .list(&filter)
        .await
        .map_err(LoanRequestError::ReadModelError)?;

    let views: Vec<_> = if query.actionable {
        views
            .into_iter()
            .filter(|view| !allowed_actions(deps, actor, view).is_empty())
            .collect()
    } else {
        views
    };

    tracing::debug!(
        actor = %actor.id,
        role = actor.role.as_str(),
        count = views.len(),
        "Listed loan requests"
    );

    Ok(views)
}

/// 申請を1件取得する
///
/// 閲覧範囲外の申請は`PermissionDenied`。
pub async fn get_request(
    deps: &ServiceDependencies,
    actor: &Actor,
    request_id: LoanRequestId,
) -> Result<LoanRequestView> {
    let view = deps
        .read_model
        .get_by_id(request_id)
        .await
        .map_err(LoanRequestError::ReadModelError)?
        .ok_or(LoanRequestError::NotFound)?;

    if !is_visible(actor, &view) {
        return Err(LoanRequestError::PermissionDenied(format!(
            "role {} may not view request {}",
            actor.role.as_str(),
            request_id
        )));
    }

    Ok(view)
}

/// 申請の監査証跡（イベントログから復元した遷移の履歴）
pub async fn request_history(
    deps: &ServiceDependencies,
    actor: &Actor,
    request_id: LoanRequestId,
) -> Result<Vec<AuditEntry>> {
    get_request(deps, actor, request_id).await?;
    let request = load_request(&deps.event_store, request_id).await?;
    Ok(request.history)
}
