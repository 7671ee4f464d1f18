use crate::domain::{ReplayError, ResourceKey, approval::Denial};
use crate::ports::{AllocationError, StoreError};
use thiserror::Error;

/// 貸出申請アプリケーション層のエラー
///
/// 失敗したコマンドは申請にも資源にも何も適用しない。
#[derive(Debug, Error)]
pub enum LoanRequestError {
    /// 作成入力が不正（資源なし・時間帯不正・存在しない資源など）
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    /// 申請が見つからない
    #[error("Loan request not found")]
    NotFound,

    /// 現在の状態ではそのコマンドは実行できない
    #[error("Invalid transition: {0}")]
    InvalidTransition(String),

    /// ロール・所属が承認ルーティングに合わない
    #[error("Permission denied: {0}")]
    PermissionDenied(String),

    /// 確保の競合（作成時または貸出開始時に検出）
    #[error("Resource unavailable: {}", describe_keys(.0))]
    ResourceUnavailable(Vec<ResourceKey>),

    /// ロック・バージョン競合に負けた（再試行して安全）
    #[error("Concurrency conflict, safe to retry")]
    ConcurrencyConflict,

    /// 永続化済みイベント列が状態遷移グラフに反している
    #[error("Corrupted event history")]
    CorruptedHistory(#[source] ReplayError),

    /// EventStoreのエラー
    #[error("Event store error")]
    EventStoreError(#[source] Box<dyn std::error::Error + Send + Sync>),

    /// ReservationStoreのエラー
    #[error("Reservation store error")]
    ReservationStoreError(#[source] Box<dyn std::error::Error + Send + Sync>),

    /// ReadModelのエラー
    #[error("Read model error")]
    ReadModelError(#[source] Box<dyn std::error::Error + Send + Sync>),

    /// ResourceCatalogのエラー
    #[error("Resource catalog error")]
    CatalogError(#[source] Box<dyn std::error::Error + Send + Sync>),
}

fn describe_keys(keys: &[ResourceKey]) -> String {
    keys.iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}

impl From<StoreError> for LoanRequestError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::VersionConflict { .. } => LoanRequestError::ConcurrencyConflict,
            StoreError::Backend(source) => LoanRequestError::EventStoreError(source),
        }
    }
}

impl From<AllocationError> for LoanRequestError {
    fn from(err: AllocationError) -> Self {
        match err {
            AllocationError::Unavailable(keys) => LoanRequestError::ResourceUnavailable(keys),
            AllocationError::VersionConflict { .. } => LoanRequestError::ConcurrencyConflict,
            AllocationError::Backend(source) => LoanRequestError::ReservationStoreError(source),
        }
    }
}

impl From<Denial> for LoanRequestError {
    fn from(denial: Denial) -> Self {
        match denial {
            Denial::InvalidState { .. } => LoanRequestError::InvalidTransition(denial.to_string()),
            Denial::NotPermitted { .. } => LoanRequestError::PermissionDenied(denial.to_string()),
        }
    }
}

/// アプリケーション層の Result型
pub type Result<T> = std::result::Result<T, LoanRequestError>;
