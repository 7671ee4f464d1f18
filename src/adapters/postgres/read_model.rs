use crate::domain::{
    ActorId, LoanRequestId, LocationCode, RequestStatus, ResourceUnitId, Verification,
};
use crate::ports::read_model::{
    LoanRequestReadModel as LoanRequestReadModelTrait, LoanRequestView, RequestFilter, Result,
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{PgPool, Row, postgres::PgRow};
use std::str::FromStr;
use uuid::Uuid;

const VIEW_COLUMNS: &str = r#"
    request_id,
    requester_id,
    agenda,
    start_at,
    end_at,
    unit_ids,
    location_code,
    extra_location,
    status,
    verification,
    departmental,
    general_pool,
    created_at,
    updated_at,
    version
"#;

fn invalid_data(message: String) -> Box<dyn std::error::Error + Send + Sync> {
    Box::new(std::io::Error::new(std::io::ErrorKind::InvalidData, message))
}

/// PostgreSQLの行データをLoanRequestViewに変換する
///
/// status・verification・部屋コードは文字列から値オブジェクトに変換し、
/// 不正な値はエラーとして返す。
fn map_row_to_view(row: &PgRow) -> Result<LoanRequestView> {
    let status: String = row.get("status");
    let verification: String = row.get("verification");
    let location: Option<String> = row.get("location_code");
    let unit_ids: Vec<Uuid> = row.get("unit_ids");
    let version: i32 = row.get("version");

    Ok(LoanRequestView {
        request_id: LoanRequestId::from_uuid(row.get("request_id")),
        requester_id: ActorId::from_uuid(row.get("requester_id")),
        agenda: row.get("agenda"),
        start_at: row.get("start_at"),
        end_at: row.get("end_at"),
        unit_ids: unit_ids.into_iter().map(ResourceUnitId::from_uuid).collect(),
        location: location
            .map(LocationCode::parse)
            .transpose()
            .map_err(|e| invalid_data(e.to_string()))?,
        extra_location: row.get("extra_location"),
        status: RequestStatus::from_str(&status).map_err(|e| invalid_data(e.to_string()))?,
        verification: Verification::from_str(&verification)
            .map_err(|e| invalid_data(e.to_string()))?,
        departmental: row.get("departmental"),
        general_pool: row.get("general_pool"),
        created_at: row.get("created_at"),
        updated_at: row.get("updated_at"),
        version: u32::try_from(version).map_err(|e| invalid_data(e.to_string()))?,
    })
}

/// LoanRequestReadModelのPostgreSQL実装
///
/// CQRSパターンの読み取り側として、クエリに最適化された
/// 非正規化ビューを提供する。
pub struct LoanRequestReadModel {
    pool: PgPool,
}

impl LoanRequestReadModel {
    /// PostgreSQLコネクションプールから新しいLoanRequestReadModelを作成
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl LoanRequestReadModelTrait for LoanRequestReadModel {
    /// 申請ビューをRead Modelに保存（upsert）
    ///
    /// INSERT ... ON CONFLICT UPDATEを使用して冪等性を保証する。
    /// 既存行のバージョンが新しい場合は更新しない（遅れて届いた古い状態で上書きしない）。
    async fn save(&self, view: LoanRequestView) -> Result<()> {
        let unit_ids: Vec<Uuid> = view.unit_ids.iter().map(|id| id.value()).collect();

        sqlx::query(
            r#"
            INSERT INTO loan_requests_view (
                request_id,
                requester_id,
                agenda,
                start_at,
                end_at,
                unit_ids,
                location_code,
                extra_location,
                status,
                verification,
                departmental,
                general_pool,
                created_at,
                updated_at,
                version
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15)
            ON CONFLICT (request_id)
            DO UPDATE SET
                status = EXCLUDED.status,
                verification = EXCLUDED.verification,
                departmental = EXCLUDED.departmental,
                general_pool = EXCLUDED.general_pool,
                updated_at = EXCLUDED.updated_at,
                version = EXCLUDED.version
            WHERE loan_requests_view.version < EXCLUDED.version
            "#,
        )
        .bind(view.request_id.value())
        .bind(view.requester_id.value())
        .bind(&view.agenda)
        .bind(view.start_at)
        .bind(view.end_at)
        .bind(&unit_ids)
        .bind(view.location.as_ref().map(LocationCode::as_str))
        .bind(view.extra_location.as_deref())
        .bind(view.status.as_str())
        .bind(view.verification.as_str())
        .bind(view.departmental)
        .bind(view.general_pool)
        .bind(view.created_at)
        .bind(view.updated_at)
        .bind(view.version as i32)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn get_by_id(&self, request_id: LoanRequestId) -> Result<Option<LoanRequestView>> {
        let row = sqlx::query(&format!(
            "SELECT {} FROM loan_requests_view WHERE request_id = $1",
            VIEW_COLUMNS
        ))
        .bind(request_id.value())
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(map_row_to_view).transpose()
    }

    /// 条件に合う申請を新しい順に取得
    ///
    /// 未指定の条件はNULLとして渡し、SQL側で無視する。
    async fn list(&self, filter: &RequestFilter) -> Result<Vec<LoanRequestView>> {
        let rows = sqlx::query(&format!(
            r#"
            SELECT {}
            FROM loan_requests_view
            WHERE ($1::varchar IS NULL OR status = $1)
              AND ($2::varchar IS NULL OR verification = $2)
              AND ($3::uuid IS NULL OR requester_id = $3)
              AND ($4::boolean IS NULL OR departmental = $4)
            ORDER BY created_at DESC
            "#,
            VIEW_COLUMNS
        ))
        .bind(filter.status.map(|s| s.as_str()))
        .bind(filter.verification.map(|v| v.as_str()))
        .bind(filter.requester_id.map(|r| r.value()))
        .bind(filter.departmental)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(map_row_to_view).collect()
    }

    /// 承認待ち期限切れの候補を検索
    ///
    /// (created_at) の部分インデックスを使用する。
    async fn find_pending_created_before(
        &self,
        cutoff: DateTime<Utc>,
    ) -> Result<Vec<LoanRequestView>> {
        let rows = sqlx::query(&format!(
            r#"
            SELECT {}
            FROM loan_requests_view
            WHERE status = 'booking'
              AND verification = 'pending'
              AND created_at < $1
            ORDER BY created_at ASC
            "#,
            VIEW_COLUMNS
        ))
        .bind(cutoff)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(map_row_to_view).collect()
    }
}
