use crate::domain::{Location, LocationCode, ResourceUnit, ResourceUnitId};
use async_trait::async_trait;

#[allow(dead_code)]
pub type Result<T> = std::result::Result<T, Box<dyn std::error::Error + Send + Sync>>;

/// 資源カタログポート
///
/// 貸出コンテキストとカタログコンテキストの境界を維持する。
/// 貸出コンテキストはカタログを読むだけで、所有も更新もしない。
#[async_trait]
pub trait ResourceCatalog: Send + Sync {
    /// 備品ユニットを取得する（存在しなければ`None`）
    ///
    /// カテゴリと所属タグは承認ルーティングの分類入力になる。
    async fn get_resource(&self, unit_id: ResourceUnitId) -> Result<Option<ResourceUnit>>;

    /// 部屋を取得する（存在しなければ`None`）
    async fn get_location(&self, code: &LocationCode) -> Result<Option<Location>>;
}
