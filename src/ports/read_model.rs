use crate::domain::{
    ActorId, LoanRequestId, LocationCode, RequestStatus, ResourceUnitId, Verification,
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};

#[allow(dead_code)]
pub type Result<T> = std::result::Result<T, Box<dyn std::error::Error + Send + Sync>>;

/// 貸出申請ビュー（Read Model）
///
/// クエリに最適化された非正規化ビュー（CQRSパターン）。
/// 分類（学科扱いか・全学共通か）は保存時点のスナップショットで、一覧の絞り込みにのみ使う。
/// コマンドの認可は必ずカタログから分類し直す。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoanRequestView {
    pub request_id: LoanRequestId,
    pub requester_id: ActorId,
    pub agenda: String,
    pub start_at: DateTime<Utc>,
    pub end_at: DateTime<Utc>,
    pub unit_ids: Vec<ResourceUnitId>,
    pub location: Option<LocationCode>,
    pub extra_location: Option<String>,
    pub status: RequestStatus,
    pub verification: Verification,
    pub departmental: bool,
    pub general_pool: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    /// ビューの元になった集約のバージョン（適用済みイベント数）
    pub version: u32,
}

/// 一覧取得の絞り込み条件（すべて任意、指定されたものはAND）
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RequestFilter {
    pub status: Option<RequestStatus>,
    pub verification: Option<Verification>,
    pub requester_id: Option<ActorId>,
    pub departmental: Option<bool>,
}

impl RequestFilter {
    pub fn matches(&self, view: &LoanRequestView) -> bool {
        self.status.is_none_or(|s| view.status == s)
            && self.verification.is_none_or(|v| view.verification == v)
            && self.requester_id.is_none_or(|r| view.requester_id == r)
            && self.departmental.is_none_or(|d| view.departmental == d)
    }
}

/// 貸出申請Read Modelポート
#[async_trait]
pub trait LoanRequestReadModel: Send + Sync {
    /// 申請の現在状態を保存する（upsert）
    ///
    /// イベントから復元した集約の完全な状態を保存し、部分更新は行わない。
    /// 保存済みのビューより`version`が大きい場合のみ上書きする（古い状態での上書きは無視）。
    async fn save(&self, view: LoanRequestView) -> Result<()>;

    /// IDで申請を取得する
    async fn get_by_id(&self, request_id: LoanRequestId) -> Result<Option<LoanRequestView>>;

    /// 条件に合う申請を新しい順に取得する
    async fn list(&self, filter: &RequestFilter) -> Result<Vec<LoanRequestView>>;

    /// 指定時刻より前に作成され、まだ booking / pending の申請を取得する
    ///
    /// 承認待ち期限切れのバッチ処理に使用される。
    async fn find_pending_created_before(
        &self,
        cutoff: DateTime<Utc>,
    ) -> Result<Vec<LoanRequestView>>;
}
