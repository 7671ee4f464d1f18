use crate::domain::{
    Category, DepartmentTag, Location, LocationCode, ResourceUnit, ResourceUnitId,
};
use crate::ports::catalog::{ResourceCatalog as ResourceCatalogTrait, Result};
use async_trait::async_trait;
use sqlx::{PgPool, Row};

/// PostgreSQL implementation of ResourceCatalog
///
/// Reads the `resource_units` and `locations` tables. The lending context
/// never writes to them.
pub struct ResourceCatalog {
    pool: PgPool,
}

impl ResourceCatalog {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl ResourceCatalogTrait for ResourceCatalog {
    async fn get_resource(&self, unit_id: ResourceUnitId) -> Result<Option<ResourceUnit>> {
        let row = sqlx::query(
            r#"
            SELECT unit_id, category, department, available
            FROM resource_units
            WHERE unit_id = $1
            "#,
        )
        .bind(unit_id.value())
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(|row| ResourceUnit {
            id: ResourceUnitId::from_uuid(row.get("unit_id")),
            category: Category::new(row.get::<String, _>("category")),
            department: DepartmentTag::from(row.get::<String, _>("department")),
            available: row.get("available"),
        }))
    }

    async fn get_location(&self, code: &LocationCode) -> Result<Option<Location>> {
        let row = sqlx::query(
            r#"
            SELECT department, available
            FROM locations
            WHERE code = $1
            "#,
        )
        .bind(code.as_str())
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(|row| Location {
            code: code.clone(),
            department: DepartmentTag::from(row.get::<String, _>("department")),
            available: row.get("available"),
        }))
    }
}
