use crate::domain::{events::DomainEvent, value_objects::LoanRequestId};
use async_trait::async_trait;
use thiserror::Error;

/// イベントストアのエラー
#[derive(Debug, Error)]
pub enum StoreError {
    /// 楽観的排他制御の競合（他のコマンドが先に同じ申請を更新した）
    #[error("concurrency conflict on {request_id}: expected version {expected}, found {actual}")]
    VersionConflict {
        request_id: LoanRequestId,
        expected: u32,
        actual: u32,
    },

    /// 永続化層のエラー
    #[error("event store backend error")]
    Backend(#[source] Box<dyn std::error::Error + Send + Sync>),
}

impl StoreError {
    pub fn backend(err: impl std::error::Error + Send + Sync + 'static) -> Self {
        StoreError::Backend(Box::new(err))
    }
}

pub type Result<T> = std::result::Result<T, StoreError>;

/// イベントストアポート
///
/// 申請ごとの追記専用イベントログ。イベント列がそのまま監査証跡になる。
/// イベントは変更・削除不可で、追加された順序が保持される。
#[async_trait]
pub trait EventStore: Send + Sync {
    /// 申請のイベントを追加する
    ///
    /// `expected_version`は呼び出し側が読み込んだ時点の適用済みイベント数。
    /// 現在のバージョンと一致しない場合は`StoreError::VersionConflict`を返し、何も書き込まない。
    async fn append(
        &self,
        request_id: LoanRequestId,
        expected_version: u32,
        events: Vec<DomainEvent>,
    ) -> Result<()>;

    /// 申請のすべてのイベントを追加順に読み込む
    ///
    /// replay_events による集約状態の復元に使用される。
    async fn load(&self, request_id: LoanRequestId) -> Result<Vec<DomainEvent>>;
}
