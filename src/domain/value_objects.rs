#![allow(dead_code)]

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;
use uuid::Uuid;

/// 貸出申請ID - 貸出申請集約のID
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct LoanRequestId(Uuid);

impl LoanRequestId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    pub fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }

    pub fn value(&self) -> Uuid {
        self.0
    }
}

impl Default for LoanRequestId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for LoanRequestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// アクターID - 認証基盤が発行する利用者の識別子
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ActorId(Uuid);

impl ActorId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    pub fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }

    pub fn value(&self) -> Uuid {
        self.0
    }
}

impl Default for ActorId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ActorId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// 備品ユニットID - カタログコンテキストへの参照
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ResourceUnitId(Uuid);

impl ResourceUnitId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    pub fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }

    pub fn value(&self) -> Uuid {
        self.0
    }
}

impl Default for ResourceUnitId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ResourceUnitId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// 値オブジェクトの検証エラー
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValueError {
    #[error("location code must not be empty")]
    EmptyLocationCode,
    #[error("time window start must be before its end")]
    InvalidTimeWindow,
    #[error("unknown role: {0}")]
    UnknownRole(String),
    #[error("unknown resource key: {0}")]
    UnknownResourceKey(String),
    #[error("invalid {field}: {value}")]
    InvalidEnumValue { field: &'static str, value: String },
}

/// 部屋（ロケーション）コード
///
/// 前後の空白を除去して保持する。空文字列は不可。
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct LocationCode(String);

impl LocationCode {
    pub fn parse(code: impl AsRef<str>) -> Result<Self, ValueError> {
        let trimmed = code.as_ref().trim();
        if trimmed.is_empty() {
            return Err(ValueError::EmptyLocationCode);
        }
        Ok(Self(trimmed.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for LocationCode {
    type Error = ValueError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(value)
    }
}

impl From<LocationCode> for String {
    fn from(code: LocationCode) -> Self {
        code.0
    }
}

impl fmt::Display for LocationCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// アクターのロール（セッション中は不変）
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    /// 申請者（学内利用者）
    #[serde(alias = "civitas_faste")]
    Requester,
    /// 一般職員
    Staff,
    /// 学科職員
    StaffProdi,
    /// 教務課長
    KepalaBagianAkademik,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Requester => "requester",
            Role::Staff => "staff",
            Role::StaffProdi => "staff_prodi",
            Role::KepalaBagianAkademik => "kepala_bagian_akademik",
        }
    }
}

impl FromStr for Role {
    type Err = ValueError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "requester" | "civitas_faste" => Ok(Role::Requester),
            "staff" => Ok(Role::Staff),
            "staff_prodi" => Ok(Role::StaffProdi),
            "kepala_bagian_akademik" => Ok(Role::KepalaBagianAkademik),
            other => Err(ValueError::UnknownRole(other.to_string())),
        }
    }
}

/// 認証済みアクター
///
/// セッション状態をグローバルに持たず、すべてのコマンドに明示的に渡す。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Actor {
    pub id: ActorId,
    pub role: Role,
}

impl Actor {
    pub fn new(id: ActorId, role: Role) -> Self {
        Self { id, role }
    }
}

/// 所属タグ
///
/// `general`（または旧来の`umum`）は全学共通、それ以外は学科所有として扱う。
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum DepartmentTag {
    General,
    Department(String),
}

impl DepartmentTag {
    pub fn is_general(&self) -> bool {
        matches!(self, DepartmentTag::General)
    }

    pub fn as_str(&self) -> &str {
        match self {
            DepartmentTag::General => "general",
            DepartmentTag::Department(name) => name,
        }
    }
}

impl From<&str> for DepartmentTag {
    fn from(value: &str) -> Self {
        let normalized = value.trim().to_lowercase();
        match normalized.as_str() {
            "" | "general" | "umum" => DepartmentTag::General,
            _ => DepartmentTag::Department(normalized),
        }
    }
}

impl From<String> for DepartmentTag {
    fn from(value: String) -> Self {
        DepartmentTag::from(value.as_str())
    }
}

impl From<DepartmentTag> for String {
    fn from(tag: DepartmentTag) -> Self {
        tag.as_str().to_string()
    }
}

/// 備品カテゴリ
///
/// 小文字化し、空白とアンダースコアをハイフンに正規化する
/// （例: "Sound System" → "sound-system"）。
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub struct Category(String);

impl Category {
    pub fn new(name: impl AsRef<str>) -> Self {
        let normalized = name
            .as_ref()
            .trim()
            .to_lowercase()
            .split(|c: char| c.is_whitespace() || c == '_' || c == '-')
            .filter(|part| !part.is_empty())
            .collect::<Vec<_>>()
            .join("-");
        Self(normalized)
    }

    pub fn generic() -> Self {
        Self("generic".to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<String> for Category {
    fn from(value: String) -> Self {
        Self::new(value)
    }
}

impl From<Category> for String {
    fn from(category: Category) -> Self {
        category.0
    }
}

/// 予約時間帯
///
/// 不変条件：start < end（半開区間 [start, end)）
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeWindow {
    start: DateTime<Utc>,
    end: DateTime<Utc>,
}

impl TimeWindow {
    pub fn new(start: DateTime<Utc>, end: DateTime<Utc>) -> Result<Self, ValueError> {
        if start >= end {
            return Err(ValueError::InvalidTimeWindow);
        }
        Ok(Self { start, end })
    }

    pub fn start(&self) -> DateTime<Utc> {
        self.start
    }

    pub fn end(&self) -> DateTime<Utc> {
        self.end
    }

    /// 2つの時間帯が重なるか（端点が接するだけなら重ならない）
    pub fn overlaps(&self, other: &TimeWindow) -> bool {
        self.start < other.end && other.start < self.end
    }
}

/// 排他確保の対象となる資源のキー
///
/// ロック順序を決定的にするため`Ord`を実装する（ユニット → ロケーションの順）。
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum ResourceKey {
    Unit(ResourceUnitId),
    Location(LocationCode),
}

impl fmt::Display for ResourceKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ResourceKey::Unit(id) => write!(f, "unit:{}", id),
            ResourceKey::Location(code) => write!(f, "location:{}", code),
        }
    }
}

impl FromStr for ResourceKey {
    type Err = ValueError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if let Some(rest) = s.strip_prefix("unit:") {
            let uuid = Uuid::parse_str(rest)
                .map_err(|_| ValueError::UnknownResourceKey(s.to_string()))?;
            return Ok(ResourceKey::Unit(ResourceUnitId::from_uuid(uuid)));
        }
        if let Some(rest) = s.strip_prefix("location:") {
            return LocationCode::parse(rest)
                .map(ResourceKey::Location)
                .map_err(|_| ValueError::UnknownResourceKey(s.to_string()));
        }
        Err(ValueError::UnknownResourceKey(s.to_string()))
    }
}

impl TryFrom<String> for ResourceKey {
    type Error = ValueError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<ResourceKey> for String {
    fn from(key: ResourceKey) -> Self {
        key.to_string()
    }
}

/// 貸出申請のステータス
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RequestStatus {
    /// 予約中（承認待ち・承認済み・却下を含む）
    Booking,
    /// 貸出中
    Active,
    /// 返却済み
    Completed,
    /// 取消済み
    Cancelled,
}

impl RequestStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            RequestStatus::Booking => "booking",
            RequestStatus::Active => "active",
            RequestStatus::Completed => "completed",
            RequestStatus::Cancelled => "cancelled",
        }
    }
}

impl FromStr for RequestStatus {
    type Err = ValueError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "booking" => Ok(RequestStatus::Booking),
            "active" | "aktif" => Ok(RequestStatus::Active),
            "completed" => Ok(RequestStatus::Completed),
            "cancelled" => Ok(RequestStatus::Cancelled),
            _ => Err(ValueError::InvalidEnumValue {
                field: "status",
                value: s.to_string(),
            }),
        }
    }
}

/// 検証（承認）状態
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Verification {
    Pending,
    Approved,
    Rejected,
}

impl Verification {
    pub fn as_str(&self) -> &'static str {
        match self {
            Verification::Pending => "pending",
            Verification::Approved => "approved",
            Verification::Rejected => "rejected",
        }
    }
}

impl FromStr for Verification {
    type Err = ValueError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(Verification::Pending),
            "approved" | "diterima" => Ok(Verification::Approved),
            "rejected" | "ditolak" => Ok(Verification::Rejected),
            _ => Err(ValueError::InvalidEnumValue {
                field: "verification",
                value: s.to_string(),
            }),
        }
    }
}

/// 検証の判断
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VerificationDecision {
    Approve,
    Reject,
}

/// 取消理由
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CancelReason {
    /// 申請者本人による取り下げ
    Withdrawn,
    /// 承認権限者による管理上の取消
    Administrative,
    /// 承認待ちのまま期限切れ
    Expired,
}
