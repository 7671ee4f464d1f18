//! 承認ルーティング
//!
//! 申請が参照する資源の所属から「誰が検証・貸出開始・返却できるか」を決める純粋なポリシー。
//! ロールごとの条件分岐を散在させず、`Rule`の表として保持する。
//! 分類はカタログの状態に依存するため、結果をキャッシュせずコマンドごとに評価し直すこと。

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;

use super::{
    Actor, ActorId, Category, RequestStatus, ResourceProfile, Role, Verification,
};

/// ルーティング対象の操作
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Action {
    Create,
    Verify,
    Activate,
    Return,
    Cancel,
}

impl Action {
    pub fn as_str(&self) -> &'static str {
        match self {
            Action::Create => "create",
            Action::Verify => "verify",
            Action::Activate => "activate",
            Action::Return => "return",
            Action::Cancel => "cancel",
        }
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 学科承認が必要なカテゴリの一覧（設定可能）
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RestrictedCategories(BTreeSet<Category>);

impl RestrictedCategories {
    pub fn new<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self(
            names
                .into_iter()
                .map(Category::new)
                .filter(|c| !c.as_str().is_empty())
                .collect(),
        )
    }

    pub fn contains(&self, category: &Category) -> bool {
        self.0.contains(category)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Category> {
        self.0.iter()
    }
}

impl Default for RestrictedCategories {
    fn default() -> Self {
        Self::new(["projector", "microphone", "sound-system"])
    }
}

/// 申請の分類結果
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Classification {
    pub departmental: bool,
    pub general_pool: bool,
}

/// いずれかの備品が制限カテゴリに属するか、いずれかの資源が学科所属なら学科扱い（ANY）
pub fn is_departmental(profile: &ResourceProfile, restricted: &RestrictedCategories) -> bool {
    let restricted_unit = profile
        .units
        .iter()
        .any(|unit| restricted.contains(&unit.category) || !unit.department.is_general());
    let departmental_location = profile
        .location
        .as_ref()
        .is_some_and(|location| !location.department.is_general());

    restricted_unit || departmental_location
}

/// すべての備品が全学共通で、部屋が無いか全学共通の部屋なら全学共通扱い（ALL）
pub fn is_general_pool(profile: &ResourceProfile) -> bool {
    profile.units.iter().all(|unit| unit.department.is_general())
        && profile
            .location
            .as_ref()
            .is_none_or(|location| location.department.is_general())
}

pub fn classify(profile: &ResourceProfile, restricted: &RestrictedCategories) -> Classification {
    Classification {
        departmental: is_departmental(profile, restricted),
        general_pool: is_general_pool(profile),
    }
}

/// ルールが適用される申請の範囲
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Scope {
    Any,
    Departmental,
    NonDepartmental,
    GeneralPool,
}

impl Scope {
    pub fn covers(&self, classification: &Classification) -> bool {
        match self {
            Scope::Any => true,
            Scope::Departmental => classification.departmental,
            Scope::NonDepartmental => !classification.departmental,
            // 制限カテゴリを含む申請は全学共通タグでも学科扱いが優先
            Scope::GeneralPool => classification.general_pool && !classification.departmental,
        }
    }
}

/// 許可ルール：`scope`に該当する申請に対して`role`は`action`を実行できる
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Rule {
    pub action: Action,
    pub scope: Scope,
    pub role: Role,
}

impl Rule {
    pub const fn new(action: Action, scope: Scope, role: Role) -> Self {
        Self {
            action,
            scope,
            role,
        }
    }
}

/// 既定のルール表
///
/// 取消は表に持たず、申請者本人か検証権限を持つロールに許可する。
pub const DEFAULT_RULES: &[Rule] = &[
    Rule::new(Action::Create, Scope::Any, Role::Requester),
    Rule::new(Action::Verify, Scope::Departmental, Role::StaffProdi),
    Rule::new(Action::Verify, Scope::NonDepartmental, Role::KepalaBagianAkademik),
    Rule::new(Action::Verify, Scope::GeneralPool, Role::Staff),
    Rule::new(Action::Activate, Scope::Departmental, Role::StaffProdi),
    Rule::new(Action::Activate, Scope::NonDepartmental, Role::KepalaBagianAkademik),
    Rule::new(Action::Activate, Scope::GeneralPool, Role::Staff),
    Rule::new(Action::Return, Scope::Departmental, Role::StaffProdi),
    Rule::new(Action::Return, Scope::NonDepartmental, Role::KepalaBagianAkademik),
    Rule::new(Action::Return, Scope::GeneralPool, Role::Staff),
];

/// ルーティング判定に必要な申請のスナップショット
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RequestSnapshot {
    pub requester_id: ActorId,
    pub status: RequestStatus,
    pub verification: Verification,
    pub classification: Classification,
}

/// 拒否理由
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Denial {
    /// 現在の状態ではその操作は行えない
    InvalidState {
        action: Action,
        status: RequestStatus,
        verification: Verification,
    },
    /// ロール（または所属）が操作に見合わない
    NotPermitted { action: Action, role: Role },
}

impl fmt::Display for Denial {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Denial::InvalidState {
                action,
                status,
                verification,
            } => write!(
                f,
                "cannot {} a request in state {}/{}",
                action,
                status.as_str(),
                verification.as_str()
            ),
            Denial::NotPermitted { action, role } => {
                write!(f, "role {} may not {} this request", role.as_str(), action)
            }
        }
    }
}

/// 承認ポリシー
///
/// 副作用を持たない。入力は申請スナップショットとアクターのみ。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApprovalPolicy {
    restricted: RestrictedCategories,
    rules: Vec<Rule>,
}

impl ApprovalPolicy {
    pub fn new(restricted: RestrictedCategories, rules: Vec<Rule>) -> Self {
        Self { restricted, rules }
    }

    pub fn with_restricted_categories(restricted: RestrictedCategories) -> Self {
        Self::new(restricted, DEFAULT_RULES.to_vec())
    }

    pub fn restricted_categories(&self) -> &RestrictedCategories {
        &self.restricted
    }

    pub fn classify(&self, profile: &ResourceProfile) -> Classification {
        classify(profile, &self.restricted)
    }

    /// 状態を問わず、ロールと分類だけで操作が許されるか
    pub fn role_permits(
        &self,
        action: Action,
        classification: &Classification,
        role: Role,
    ) -> bool {
        let action = match action {
            Action::Cancel => Action::Verify,
            other => other,
        };
        self.rules.iter().any(|rule| {
            rule.action == action && rule.role == role && rule.scope.covers(classification)
        })
    }

    /// 申請作成の認可（申請者ロールのみ）
    pub fn authorize_create(&self, actor: &Actor) -> Result<(), Denial> {
        let any = Classification {
            departmental: false,
            general_pool: true,
        };
        if self.role_permits(Action::Create, &any, actor.role) {
            Ok(())
        } else {
            Err(Denial::NotPermitted {
                action: Action::Create,
                role: actor.role,
            })
        }
    }

    /// 既存申請に対する操作の認可
    ///
    /// 状態の前提条件を先に判定し、満たしていればロールを判定する。
    pub fn authorize(
        &self,
        action: Action,
        snapshot: &RequestSnapshot,
        actor: &Actor,
    ) -> Result<(), Denial> {
        if action == Action::Create {
            return self.authorize_create(actor);
        }

        if !state_allows(action, snapshot) {
            return Err(Denial::InvalidState {
                action,
                status: snapshot.status,
                verification: snapshot.verification,
            });
        }

        let owner_cancel = action == Action::Cancel && snapshot.requester_id == actor.id;
        if owner_cancel || self.role_permits(action, &snapshot.classification, actor.role) {
            Ok(())
        } else {
            Err(Denial::NotPermitted {
                action,
                role: actor.role,
            })
        }
    }

    /// アクターが今この申請に対して実行できる操作の一覧
    pub fn allowed_actions(&self, snapshot: &RequestSnapshot, actor: &Actor) -> Vec<Action> {
        [
            Action::Verify,
            Action::Activate,
            Action::Return,
            Action::Cancel,
        ]
        .into_iter()
        .filter(|action| self.authorize(*action, snapshot, actor).is_ok())
        .collect()
    }
}

impl Default for ApprovalPolicy {
    fn default() -> Self {
        Self::with_restricted_categories(RestrictedCategories::default())
    }
}

fn state_allows(action: Action, snapshot: &RequestSnapshot) -> bool {
    match action {
        Action::Create => true,
        Action::Verify => {
            snapshot.status == RequestStatus::Booking
                && snapshot.verification == Verification::Pending
        }
        Action::Activate => {
            snapshot.status == RequestStatus::Booking
                && snapshot.verification == Verification::Approved
        }
        Action::Return => snapshot.status == RequestStatus::Active,
        Action::Cancel => snapshot.status == RequestStatus::Booking,
    }
}
