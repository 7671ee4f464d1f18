use crate::domain::{DomainEvent, LoanRequestId, ResourceKey, TimeWindow};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::str::FromStr;
use thiserror::Error;

/// 確保の状態
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HoldState {
    /// 仮押さえ（申請中・承認済み）
    Tentative,
    /// 確定（貸出中）
    Confirmed,
}

impl HoldState {
    pub fn as_str(&self) -> &'static str {
        match self {
            HoldState::Tentative => "tentative",
            HoldState::Confirmed => "confirmed",
        }
    }
}

impl FromStr for HoldState {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "tentative" => Ok(HoldState::Tentative),
            "confirmed" => Ok(HoldState::Confirmed),
            _ => Err(format!("Invalid hold state: {}", s)),
        }
    }
}

/// 1つの資源に対する1件の申請の確保
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Allocation {
    pub request_id: LoanRequestId,
    pub key: ResourceKey,
    pub window: TimeWindow,
    pub state: HoldState,
}

/// 資源キー集合をスコープとする1トランザクション分の変更
///
/// 確保の変更と、それを記述するイベントの追記は同じトランザクションで確定する。
#[derive(Debug, Clone)]
pub struct AllocationChange {
    pub request_id: LoanRequestId,
    /// 読み込み時点の適用済みイベント数（新規作成時は0）
    pub expected_version: u32,
    pub keys: BTreeSet<ResourceKey>,
    pub window: TimeWindow,
    pub events: Vec<DomainEvent>,
}

/// 予約ストアのエラー
#[derive(Debug, Error)]
pub enum AllocationError {
    /// 他の申請が重なる時間帯を確保している
    #[error("resources unavailable for the requested window: {0:?}")]
    Unavailable(Vec<ResourceKey>),

    /// 同じ申請に対する並行コマンドとの競合
    #[error("concurrency conflict on {request_id}: expected version {expected}, found {actual}")]
    VersionConflict {
        request_id: LoanRequestId,
        expected: u32,
        actual: u32,
    },

    /// 永続化層のエラー
    #[error("reservation store backend error")]
    Backend(#[source] Box<dyn std::error::Error + Send + Sync>),
}

impl AllocationError {
    pub fn backend(err: impl std::error::Error + Send + Sync + 'static) -> Self {
        AllocationError::Backend(Box::new(err))
    }
}

pub type Result<T> = std::result::Result<T, AllocationError>;

/// 予約ストアポート
///
/// 排他確保の不変条件を強制する。各操作は対象の資源キー集合をロックし
/// （キー順に取得してデッドロックを防ぐ）、ロック内で空き状況を再検証してから書き込む。
/// 空き確認と確保の書き込みの間に、他のトランザクションが割り込む余地はない。
#[async_trait]
pub trait ReservationStore: Send + Sync {
    /// 新しい申請の仮押さえを作成する
    ///
    /// 同じ資源に重なる時間帯の確保（仮押さえ・確定を問わない）が他の申請にあれば
    /// `AllocationError::Unavailable`を返す。申請の最初のイベントも同時に追記する。
    async fn insert_if_available(&self, change: AllocationChange) -> Result<()>;

    /// 仮押さえを確定に変える
    ///
    /// 他の申請の確定済み確保と重なる場合は`AllocationError::Unavailable`を返す。
    async fn confirm_allocation(&self, change: AllocationChange) -> Result<()>;

    /// 申請の確保をすべて解放する
    async fn release_allocation(&self, change: AllocationChange) -> Result<()>;

    /// 資源の現在の確保一覧を取得する
    async fn allocations_for(&self, key: &ResourceKey) -> Result<Vec<Allocation>>;
}
