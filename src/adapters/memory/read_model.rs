use crate::domain::{LoanRequestId, RequestStatus, Verification};
use crate::ports::read_model::{
    LoanRequestReadModel as LoanRequestReadModelTrait, LoanRequestView, RequestFilter, Result,
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::collections::hash_map::Entry;
use std::sync::{PoisonError, RwLock};

/// In-process implementation of LoanRequestReadModel
///
/// Keeps the latest view per request. A save only replaces a stored view
/// with a higher `version`, so a late write of an older state is dropped.
/// Used when no database is configured and by the integration tests.
#[derive(Default)]
pub struct LoanRequestReadModel {
    views: RwLock<HashMap<LoanRequestId, LoanRequestView>>,
}

impl LoanRequestReadModel {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl LoanRequestReadModelTrait for LoanRequestReadModel {
    async fn save(&self, view: LoanRequestView) -> Result<()> {
        let mut views = self.views.write().unwrap_or_else(PoisonError::into_inner);
        match views.entry(view.request_id) {
            Entry::Occupied(mut stored) => {
                if stored.get().version < view.version {
                    stored.insert(view);
                }
            }
            Entry::Vacant(slot) => {
                slot.insert(view);
            }
        }
        Ok(())
    }

    async fn get_by_id(&self, request_id: LoanRequestId) -> Result<Option<LoanRequestView>> {
        Ok(self
            .views
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&request_id)
            .cloned())
    }

    async fn list(&self, filter: &RequestFilter) -> Result<Vec<LoanRequestView>> {
        let mut views: Vec<LoanRequestView> = self
            .views
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .values()
            .filter(|view| filter.matches(view))
            .cloned()
            .collect();

        views.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(views)
    }

    async fn find_pending_created_before(
        &self,
        cutoff: DateTime<Utc>,
    ) -> Result<Vec<LoanRequestView>> {
        let mut views: Vec<LoanRequestView> = self
            .views
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .values()
            .filter(|view| {
                view.status == RequestStatus::Booking
                    && view.verification == Verification::Pending
                    && view.created_at < cutoff
            })
            .cloned()
            .collect();

        views.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        Ok(views)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::ActorId;
    use chrono::Duration;

    fn view(created_at: DateTime<Utc>, status: RequestStatus) -> LoanRequestView {
        LoanRequestView {
            request_id: LoanRequestId::new(),
            requester_id: ActorId::new(),
            agenda: "Workshop".to_string(),
            start_at: created_at + Duration::days(1),
            end_at: created_at + Duration::days(1) + Duration::hours(2),
            unit_ids: vec![],
            location: None,
            extra_location: None,
            status,
            verification: Verification::Pending,
            departmental: false,
            general_pool: true,
            created_at,
            updated_at: created_at,
            version: 1,
        }
    }

    #[tokio::test]
    async fn test_list_is_newest_first_and_filtered() {
        let read_model = LoanRequestReadModel::new();
        let now = Utc::now();
        let older = view(now - Duration::hours(2), RequestStatus::Booking);
        let newer = view(now, RequestStatus::Booking);
        let cancelled = view(now - Duration::hours(1), RequestStatus::Cancelled);

        for v in [older.clone(), newer.clone(), cancelled] {
            read_model.save(v).await.unwrap();
        }

        let booking = read_model
            .list(&RequestFilter {
                status: Some(RequestStatus::Booking),
                ..Default::default()
            })
            .await
            .unwrap();

        assert_eq!(booking, vec![newer, older]);
    }

    #[tokio::test]
    async fn test_save_overwrites_existing_view() {
        let read_model = LoanRequestReadModel::new();
        let mut v = view(Utc::now(), RequestStatus::Booking);
        read_model.save(v.clone()).await.unwrap();

        v.status = RequestStatus::Active;
        v.version = 2;
        read_model.save(v.clone()).await.unwrap();

        let stored = read_model.get_by_id(v.request_id).await.unwrap().unwrap();
        assert_eq!(stored.status, RequestStatus::Active);
        assert_eq!(read_model.list(&RequestFilter::default()).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_older_version_does_not_overwrite() {
        let read_model = LoanRequestReadModel::new();
        let mut cancelled = view(Utc::now(), RequestStatus::Cancelled);
        cancelled.version = 2;
        read_model.save(cancelled.clone()).await.unwrap();

        // Saves of the same or an earlier version are ignored
        let mut stale = cancelled.clone();
        stale.status = RequestStatus::Booking;
        stale.verification = Verification::Approved;
        stale.version = 2;
        read_model.save(stale.clone()).await.unwrap();
        stale.version = 1;
        read_model.save(stale).await.unwrap();

        let stored = read_model.get_by_id(cancelled.request_id).await.unwrap();
        assert_eq!(stored, Some(cancelled));
    }

    #[tokio::test]
    async fn test_find_pending_created_before() {
        let read_model = LoanRequestReadModel::new();
        let now = Utc::now();
        let stale = view(now - Duration::days(3), RequestStatus::Booking);
        let fresh = view(now, RequestStatus::Booking);
        let stale_cancelled = view(now - Duration::days(3), RequestStatus::Cancelled);

        for v in [stale.clone(), fresh, stale_cancelled] {
            read_model.save(v).await.unwrap();
        }

        let found = read_model
            .find_pending_created_before(now - Duration::days(1))
            .await
            .unwrap();
        assert_eq!(found, vec![stale]);
    }
}
