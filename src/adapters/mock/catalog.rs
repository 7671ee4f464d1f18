use crate::domain::{Location, LocationCode, ResourceUnit, ResourceUnitId};
use crate::ports::catalog::{ResourceCatalog as ResourceCatalogTrait, Result};
use async_trait::async_trait;
use serde::Deserialize;
use std::collections::HashMap;
use std::sync::{Mutex, PoisonError};

/// Catalog contents in the seed file format
#[derive(Debug, Default, Deserialize)]
pub struct CatalogSeed {
    #[serde(default)]
    pub units: Vec<ResourceUnit>,
    #[serde(default)]
    pub locations: Vec<Location>,
}

/// ResourceCatalogのモック実装
///
/// 備品ユニットと部屋を登録することで状態を持ったテストをサポート。
/// 供用状態（available）はテスト中に切り替え可能。
#[derive(Default)]
pub struct ResourceCatalog {
    units: Mutex<HashMap<ResourceUnitId, ResourceUnit>>,
    locations: Mutex<HashMap<LocationCode, Location>>,
}

impl ResourceCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// JSONのシードから構築する
    pub fn from_json(json: &str) -> serde_json::Result<Self> {
        let seed: CatalogSeed = serde_json::from_str(json)?;
        let catalog = Self::new();
        for unit in seed.units {
            catalog.add_unit(unit);
        }
        for location in seed.locations {
            catalog.add_location(location);
        }
        Ok(catalog)
    }

    /// テスト用に備品ユニットを登録
    pub fn add_unit(&self, unit: ResourceUnit) {
        self.units
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(unit.id, unit);
    }

    /// テスト用に部屋を登録
    pub fn add_location(&self, location: Location) {
        self.locations
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(location.code.clone(), location);
    }

    /// 備品ユニットの供用状態を切り替える（未登録なら何もしない）
    pub fn set_unit_available(&self, unit_id: ResourceUnitId, available: bool) {
        if let Some(unit) = self
            .units
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get_mut(&unit_id)
        {
            unit.available = available;
        }
    }

    /// 備品ユニットをカタログから外す（廃棄など）
    pub fn remove_unit(&self, unit_id: ResourceUnitId) -> Option<ResourceUnit> {
        self.units
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&unit_id)
    }

    pub fn unit_count(&self) -> usize {
        self.units.lock().unwrap_or_else(PoisonError::into_inner).len()
    }
}

#[async_trait]
impl ResourceCatalogTrait for ResourceCatalog {
    async fn get_resource(&self, unit_id: ResourceUnitId) -> Result<Option<ResourceUnit>> {
        Ok(self
            .units
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&unit_id)
            .cloned())
    }

    async fn get_location(&self, code: &LocationCode) -> Result<Option<Location>> {
        Ok(self
            .locations
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(code)
            .cloned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{Category, DepartmentTag};

    #[tokio::test]
    async fn test_seed_from_json() {
        let unit_id = ResourceUnitId::new();
        let json = format!(
            r#"{{
                "units": [
                    {{"id": "{}", "category": "Sound System", "department": "umum", "available": true}}
                ],
                "locations": [
                    {{"code": "LAB-TIF", "department": "tif", "available": true}}
                ]
            }}"#,
            unit_id.value()
        );

        let catalog = ResourceCatalog::from_json(&json).unwrap();

        let unit = catalog.get_resource(unit_id).await.unwrap().unwrap();
        assert_eq!(unit.category, Category::new("sound-system"));
        assert_eq!(unit.department, DepartmentTag::General);

        let lab = catalog
            .get_location(&LocationCode::parse("LAB-TIF").unwrap())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(lab.department, DepartmentTag::Department("tif".to_string()));
    }

    #[tokio::test]
    async fn test_unknown_resource_is_none() {
        let catalog = ResourceCatalog::new();
        assert!(catalog.get_resource(ResourceUnitId::new()).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_set_unit_available() {
        let catalog = ResourceCatalog::new();
        let unit = ResourceUnit {
            id: ResourceUnitId::new(),
            category: Category::generic(),
            department: DepartmentTag::General,
            available: true,
        };
        catalog.add_unit(unit.clone());
        catalog.set_unit_available(unit.id, false);

        let stored = catalog.get_resource(unit.id).await.unwrap().unwrap();
        assert!(!stored.available);
    }
}
