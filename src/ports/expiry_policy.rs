use chrono::{DateTime, Utc};

/// 承認待ち期限ポリシーポート
///
/// booking / pending のまま放置された申請をいつ自動取消するかを決める。
/// 期限を持たない運用もあるため、差し替え可能な拡張点として定義する。
pub trait ExpiryPolicy: Send + Sync {
    /// `now`の時点で期限切れとみなす作成時刻の境界
    ///
    /// この時刻より前に作成された承認待ち申請が期限切れになる。`None`なら期限なし。
    fn cutoff(&self, now: DateTime<Utc>) -> Option<DateTime<Utc>>;
}
