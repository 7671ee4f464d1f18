use serde::{Deserialize, Serialize};

use super::{Category, DepartmentTag, LocationCode, ResourceUnitId};

/// 備品ユニット（カタログコンテキストが所有する読み取り専用ビュー）
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceUnit {
    pub id: ResourceUnitId,
    pub category: Category,
    pub department: DepartmentTag,
    /// 貸出対象として供用中か（整備中などは false）
    pub available: bool,
}

/// 部屋（カタログコンテキストが所有する読み取り専用ビュー）
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Location {
    pub code: LocationCode,
    pub department: DepartmentTag,
    pub available: bool,
}

/// 1件の申請が参照する資源一式
///
/// 承認ルーティングの分類入力。コマンドのたびにカタログから取り直す。
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ResourceProfile {
    pub units: Vec<ResourceUnit>,
    pub location: Option<Location>,
}
