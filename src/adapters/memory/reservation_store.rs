use crate::domain::{DomainEvent, LoanRequestId, ResourceKey};
use crate::ports::event_store::{self, EventStore as EventStoreTrait, StoreError};
use crate::ports::reservation_store::{
    self, Allocation, AllocationChange, AllocationError, HoldState,
    ReservationStore as ReservationStoreTrait,
};
use async_trait::async_trait;
use std::collections::{BTreeSet, HashMap};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::sync::{Mutex as KeyLock, OwnedMutexGuard};

type Ledger = Arc<KeyLock<Vec<Allocation>>>;
type LedgerGuard = OwnedMutexGuard<Vec<Allocation>>;

/// In-process event store and reservation store
///
/// Each resource key owns a ledger of allocations behind its own async lock.
/// A change locks every key it touches in `ResourceKey` order, re-checks
/// availability and the aggregate version while holding those locks, then
/// appends the events and rewrites the ledgers before releasing them.
/// Ledgers left empty after a change are dropped from the map.
///
/// Event streams live behind a plain mutex that is never held across an await.
#[derive(Default)]
pub struct ReservationStore {
    streams: Mutex<HashMap<LoanRequestId, Vec<DomainEvent>>>,
    ledgers: Mutex<HashMap<ResourceKey, Ledger>>,
}

impl ReservationStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn streams(&self) -> MutexGuard<'_, HashMap<LoanRequestId, Vec<DomainEvent>>> {
        self.streams.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn ledgers(&self) -> MutexGuard<'_, HashMap<ResourceKey, Ledger>> {
        self.ledgers.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Lock the ledgers of `keys` in ascending key order
    async fn lock_keys(&self, keys: &BTreeSet<ResourceKey>) -> Vec<LedgerGuard> {
        let ledgers: Vec<Ledger> = {
            let mut map = self.ledgers();
            keys.iter()
                .map(|key| map.entry(key.clone()).or_default().clone())
                .collect()
        };

        let mut guards = Vec::with_capacity(ledgers.len());
        for ledger in ledgers {
            guards.push(ledger.lock_owned().await);
        }
        guards
    }

    /// Remove the ledgers of `keys` that are empty and not in use
    ///
    /// Ledger handles are only cloned while the map is locked, so an entry
    /// whose only reference is the map itself has no waiter.
    fn prune(&self, keys: &BTreeSet<ResourceKey>) {
        let mut map = self.ledgers();
        for key in keys {
            let idle = map.get(key).is_some_and(|ledger| {
                Arc::strong_count(ledger) == 1
                    && ledger.try_lock().is_ok_and(|held| held.is_empty())
            });
            if idle {
                map.remove(key);
            }
        }
    }

    /// Append `events` if the stream is still at `expected_version`
    fn append_checked(
        &self,
        request_id: LoanRequestId,
        expected_version: u32,
        events: Vec<DomainEvent>,
    ) -> Result<(), (u32, u32)> {
        let mut streams = self.streams();
        let actual = streams.get(&request_id).map_or(0, |stream| stream.len() as u32);
        if actual != expected_version {
            return Err((expected_version, actual));
        }
        streams.entry(request_id).or_default().extend(events);
        Ok(())
    }

    fn append_change(
        &self,
        request_id: LoanRequestId,
        expected_version: u32,
        events: Vec<DomainEvent>,
    ) -> reservation_store::Result<()> {
        self.append_checked(request_id, expected_version, events)
            .map_err(|(expected, actual)| AllocationError::VersionConflict {
                request_id,
                expected,
                actual,
            })
    }

    fn insert_locked(
        &self,
        mut guards: Vec<LedgerGuard>,
        change: AllocationChange,
    ) -> reservation_store::Result<()> {
        // Any overlapping hold blocks a new request, tentative or confirmed
        let conflicts = conflicting_keys(&change, &guards, |_| true);
        if !conflicts.is_empty() {
            return Err(AllocationError::Unavailable(conflicts));
        }

        self.append_change(change.request_id, change.expected_version, change.events)?;

        for (key, ledger) in change.keys.iter().zip(guards.iter_mut()) {
            ledger.push(Allocation {
                request_id: change.request_id,
                key: key.clone(),
                window: change.window,
                state: HoldState::Tentative,
            });
        }

        Ok(())
    }

    fn confirm_locked(
        &self,
        mut guards: Vec<LedgerGuard>,
        change: AllocationChange,
    ) -> reservation_store::Result<()> {
        let conflicts =
            conflicting_keys(&change, &guards, |a| a.state == HoldState::Confirmed);
        if !conflicts.is_empty() {
            return Err(AllocationError::Unavailable(conflicts));
        }

        self.append_change(change.request_id, change.expected_version, change.events)?;

        for (key, ledger) in change.keys.iter().zip(guards.iter_mut()) {
            ledger.retain(|a| a.request_id != change.request_id);
            ledger.push(Allocation {
                request_id: change.request_id,
                key: key.clone(),
                window: change.window,
                state: HoldState::Confirmed,
            });
        }

        Ok(())
    }

    fn release_locked(
        &self,
        mut guards: Vec<LedgerGuard>,
        change: AllocationChange,
    ) -> reservation_store::Result<()> {
        self.append_change(change.request_id, change.expected_version, change.events)?;

        for ledger in guards.iter_mut() {
            ledger.retain(|a| a.request_id != change.request_id);
        }

        Ok(())
    }
}

/// Keys whose ledger holds an allocation of another request that overlaps `change`
fn conflicting_keys<F>(
    change: &AllocationChange,
    guards: &[LedgerGuard],
    blocks: F,
) -> Vec<ResourceKey>
where
    F: Fn(&Allocation) -> bool,
{
    change
        .keys
        .iter()
        .zip(guards)
        .filter(|(_, ledger)| {
            ledger.iter().any(|allocation| {
                allocation.request_id != change.request_id
                    && allocation.window.overlaps(&change.window)
                    && blocks(allocation)
            })
        })
        .map(|(key, _)| key.clone())
        .collect()
}

#[async_trait]
impl EventStoreTrait for ReservationStore {
    async fn append(
        &self,
        request_id: LoanRequestId,
        expected_version: u32,
        events: Vec<DomainEvent>,
    ) -> event_store::Result<()> {
        self.append_checked(request_id, expected_version, events)
            .map_err(|(expected, actual)| StoreError::VersionConflict {
                request_id,
                expected,
                actual,
            })
    }

    async fn load(&self, request_id: LoanRequestId) -> event_store::Result<Vec<DomainEvent>> {
        Ok(self.streams().get(&request_id).cloned().unwrap_or_default())
    }
}

// Guards are released inside the `*_locked` calls, before pruning.
#[async_trait]
impl ReservationStoreTrait for ReservationStore {
    async fn insert_if_available(
        &self,
        change: AllocationChange,
    ) -> reservation_store::Result<()> {
        let keys = change.keys.clone();
        let guards = self.lock_keys(&keys).await;
        let result = self.insert_locked(guards, change);
        self.prune(&keys);
        result
    }

    async fn confirm_allocation(
        &self,
        change: AllocationChange,
    ) -> reservation_store::Result<()> {
        let keys = change.keys.clone();
        let guards = self.lock_keys(&keys).await;
        let result = self.confirm_locked(guards, change);
        self.prune(&keys);
        result
    }

    async fn release_allocation(
        &self,
        change: AllocationChange,
    ) -> reservation_store::Result<()> {
        let keys = change.keys.clone();
        let guards = self.lock_keys(&keys).await;
        let result = self.release_locked(guards, change);
        self.prune(&keys);
        result
    }

    async fn allocations_for(
        &self,
        key: &ResourceKey,
    ) -> reservation_store::Result<Vec<Allocation>> {
        let ledger = self.ledgers().get(key).cloned();
        match ledger {
            Some(ledger) => Ok(ledger.lock().await.clone()),
            None => Ok(Vec::new()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{
        ActorId, LocationCode, LoanRequested, RequestActivated, ResourceUnitId, TimeWindow,
    };
    use chrono::{Duration, TimeZone, Utc};

    fn window(offset_hours: i64, length_hours: i64) -> TimeWindow {
        let base = Utc.with_ymd_and_hms(2030, 1, 7, 8, 0, 0).unwrap();
        let start = base + Duration::hours(offset_hours);
        TimeWindow::new(start, start + Duration::hours(length_hours)).unwrap()
    }

    fn created(request_id: LoanRequestId, window: TimeWindow) -> DomainEvent {
        DomainEvent::LoanRequested(LoanRequested {
            request_id,
            requester_id: ActorId::new(),
            agenda: "Rapat".to_string(),
            window,
            unit_ids: vec![],
            location: None,
            extra_location: None,
            requested_at: Utc::now(),
        })
    }

    fn activated(request_id: LoanRequestId) -> DomainEvent {
        DomainEvent::RequestActivated(RequestActivated {
            request_id,
            activated_by: ActorId::new(),
            activated_at: Utc::now(),
        })
    }

    fn change(
        request_id: LoanRequestId,
        expected_version: u32,
        keys: &[ResourceKey],
        window: TimeWindow,
        events: Vec<DomainEvent>,
    ) -> AllocationChange {
        AllocationChange {
            request_id,
            expected_version,
            keys: keys.iter().cloned().collect(),
            window,
            events,
        }
    }

    /// New request on `key` holding `window`
    fn hold(request_id: LoanRequestId, key: &ResourceKey, window: TimeWindow) -> AllocationChange {
        change(request_id, 0, &[key.clone()], window, vec![created(request_id, window)])
    }

    fn ledger_count(store: &ReservationStore) -> usize {
        store.ledgers().len()
    }

    #[tokio::test]
    async fn test_overlapping_hold_is_unavailable() {
        let store = ReservationStore::new();
        let key = ResourceKey::Unit(ResourceUnitId::new());
        let first = LoanRequestId::new();
        let second = LoanRequestId::new();

        store
            .insert_if_available(hold(first, &key, window(0, 3)))
            .await
            .unwrap();

        let result = store
            .insert_if_available(hold(second, &key, window(2, 3)))
            .await;

        match result {
            Err(AllocationError::Unavailable(keys)) => assert_eq!(keys, vec![key]),
            other => panic!("expected Unavailable, got {:?}", other),
        }
        // The rejected request left no events behind
        assert!(store.load(second).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_adjacent_windows_do_not_conflict() {
        let store = ReservationStore::new();
        let key = ResourceKey::Location(LocationCode::parse("AULA").unwrap());
        let first = LoanRequestId::new();
        let second = LoanRequestId::new();

        store
            .insert_if_available(hold(first, &key, window(0, 2)))
            .await
            .unwrap();
        store
            .insert_if_available(hold(second, &key, window(2, 2)))
            .await
            .unwrap();

        assert_eq!(store.allocations_for(&key).await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_confirm_only_blocked_by_confirmed_allocations() {
        let store = ReservationStore::new();
        let key = ResourceKey::Unit(ResourceUnitId::new());
        let first = LoanRequestId::new();
        let second = LoanRequestId::new();
        let unrelated = ResourceKey::Unit(ResourceUnitId::new());

        store
            .insert_if_available(hold(first, &key, window(0, 3)))
            .await
            .unwrap();
        store
            .insert_if_available(hold(second, &unrelated, window(0, 3)))
            .await
            .unwrap();

        store
            .confirm_allocation(change(
                first,
                1,
                &[key.clone()],
                window(0, 3),
                vec![activated(first)],
            ))
            .await
            .unwrap();

        let allocations = store.allocations_for(&key).await.unwrap();
        assert_eq!(allocations.len(), 1);
        assert_eq!(allocations[0].state, HoldState::Confirmed);

        let result = store
            .confirm_allocation(change(
                second,
                1,
                &[key.clone()],
                window(1, 1),
                vec![activated(second)],
            ))
            .await;
        assert!(matches!(result, Err(AllocationError::Unavailable(_))));
    }

    #[tokio::test]
    async fn test_stale_version_is_rejected() {
        let store = ReservationStore::new();
        let key = ResourceKey::Unit(ResourceUnitId::new());
        let request_id = LoanRequestId::new();

        store
            .insert_if_available(hold(request_id, &key, window(0, 1)))
            .await
            .unwrap();

        let result = store
            .release_allocation(change(
                request_id,
                0,
                &[key.clone()],
                window(0, 1),
                vec![activated(request_id)],
            ))
            .await;
        assert!(matches!(
            result,
            Err(AllocationError::VersionConflict {
                expected: 0,
                actual: 1,
                ..
            })
        ));
        // Allocations are untouched on conflict
        assert_eq!(store.allocations_for(&key).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_release_frees_resource() {
        let store = ReservationStore::new();
        let key = ResourceKey::Unit(ResourceUnitId::new());
        let request_id = LoanRequestId::new();

        store
            .insert_if_available(hold(request_id, &key, window(0, 1)))
            .await
            .unwrap();
        store
            .release_allocation(change(
                request_id,
                1,
                &[key.clone()],
                window(0, 1),
                vec![activated(request_id)],
            ))
            .await
            .unwrap();

        assert!(store.allocations_for(&key).await.unwrap().is_empty());
        assert_eq!(store.load(request_id).await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_empty_ledgers_are_dropped() {
        let store = ReservationStore::new();
        let busy = ResourceKey::Unit(ResourceUnitId::new());
        let first = LoanRequestId::new();

        for round in 0..3 {
            let key = ResourceKey::Unit(ResourceUnitId::new());
            let request_id = LoanRequestId::new();
            store
                .insert_if_available(hold(request_id, &key, window(round, 1)))
                .await
                .unwrap();
            store
                .release_allocation(change(
                    request_id,
                    1,
                    &[key.clone()],
                    window(round, 1),
                    vec![activated(request_id)],
                ))
                .await
                .unwrap();
        }
        assert_eq!(ledger_count(&store), 0);

        // A stale change on an unused key leaves nothing behind
        let unused = ResourceKey::Unit(ResourceUnitId::new());
        let result = store
            .release_allocation(change(first, 5, &[unused.clone()], window(0, 1), vec![]))
            .await;
        assert!(matches!(result, Err(AllocationError::VersionConflict { .. })));
        assert_eq!(ledger_count(&store), 0);

        // Reading a key does not create a ledger
        assert!(store.allocations_for(&unused).await.unwrap().is_empty());
        assert_eq!(ledger_count(&store), 0);

        // Ledgers still holding allocations are kept
        store
            .insert_if_available(hold(first, &busy, window(0, 1)))
            .await
            .unwrap();
        assert_eq!(ledger_count(&store), 1);
        assert_eq!(store.allocations_for(&busy).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_event_store_append_checks_version() {
        let store = ReservationStore::new();
        let request_id = LoanRequestId::new();

        store
            .append(request_id, 0, vec![created(request_id, window(0, 1))])
            .await
            .unwrap();

        let result = store.append(request_id, 0, vec![activated(request_id)]).await;
        assert!(matches!(result, Err(StoreError::VersionConflict { actual: 1, .. })));
        assert_eq!(store.load(request_id).await.unwrap().len(), 1);
    }
}
