//! Read Modelへの投影
//!
//! イベントが真実の情報源で、ビューはイベントから復元した集約の完全な状態から導出する。
//! 保存はビューのバージョンで順序付けられ、古い状態が新しい状態を上書きすることはない。

use crate::domain::{
    LoanRequestId, ResourceProfile, approval::Classification, loan_request::LoanRequest,
};
use crate::ports::LoanRequestView;

use super::errors::{LoanRequestError, Result};
use super::service::{ServiceDependencies, build_view, load_request};

/// 既存の申請を現在のカタログで分類する
///
/// 作成後にカタログから消えた資源があっても申請は処理できる必要がある。
/// 解決できた資源だけで分類し、欠けている資源があれば学科扱いとする（保守的なルーティング）。
pub(super) async fn classify_existing(
    deps: &ServiceDependencies,
    request: &LoanRequest,
) -> Result<Classification> {
    let mut profile = ResourceProfile {
        units: Vec::with_capacity(request.unit_ids.len()),
        location: None,
    };
    let mut missing = 0;

    for unit_id in &request.unit_ids {
        match deps
            .catalog
            .get_resource(*unit_id)
            .await
            .map_err(LoanRequestError::CatalogError)?
        {
            Some(unit) => profile.units.push(unit),
            None => missing += 1,
        }
    }

    if let Some(code) = &request.location {
        match deps
            .catalog
            .get_location(code)
            .await
            .map_err(LoanRequestError::CatalogError)?
        {
            Some(location) => profile.location = Some(location),
            None => missing += 1,
        }
    }

    let classification = deps.approval_policy.classify(&profile);
    if missing == 0 {
        return Ok(classification);
    }

    tracing::warn!(
        request_id = %request.request_id,
        missing,
        "Resources no longer in catalog, routing as departmental"
    );
    Ok(Classification {
        departmental: true,
        general_pool: false,
    })
}

/// 集約から現在のビューを組み立てる（Read Modelを経由しない）
pub async fn request_view(
    deps: &ServiceDependencies,
    request: &LoanRequest,
) -> Result<LoanRequestView> {
    let classification = classify_existing(deps, request).await?;
    Ok(build_view(request, classification))
}

/// コミット済みの状態をRead Modelに反映する
///
/// イベントと確保は既に確定しているため、失敗はコマンドの結果にしない。
/// エラーを記録し、次のコマンドか`project_request`でビューが追いつく。
pub(super) async fn publish_view(
    deps: &ServiceDependencies,
    request: &LoanRequest,
    classification: Classification,
) {
    if let Err(e) = deps
        .read_model
        .save(build_view(request, classification))
        .await
    {
        tracing::error!(
            request_id = %request.request_id,
            version = request.version,
            error.cause_chain = ?e,
            error.message = %e,
            "Failed to update read model"
        );
    }
}

/// イベントログから申請のビューを再構築して保存する
///
/// Read Modelの更新に失敗した申請や、遅れているビューの修復に使う。
pub async fn project_request(
    deps: &ServiceDependencies,
    request_id: LoanRequestId,
) -> Result<LoanRequestView> {
    let request = load_request(&deps.event_store, request_id).await?;
    let view = request_view(deps, &request).await?;

    deps.read_model
        .save(view.clone())
        .await
        .map_err(LoanRequestError::ReadModelError)?;

    tracing::debug!(
        %request_id,
        version = view.version,
        status = view.status.as_str(),
        "Loan request view projected"
    );

    Ok(view)
}
