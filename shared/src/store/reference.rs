use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::{Arc, Mutex as SyncMutex, PoisonError};

use async_trait::async_trait;
use tokio::sync::{Mutex, OwnedMutexGuard};

use crate::models::{EventDate, EventInstance, Family, FamilyId, RsvpResponse};
use crate::{Error, Result};

use super::{EventPartition, Store};

/// In-memory store.
///
/// Each event gets its own async mutex; an open partition owns that mutex, so
/// partitions on the same event run one at a time while different events
/// proceed in parallel. A date's mutex lives only while some partition holds
/// or awaits it.
#[derive(Default, Clone)]
pub struct ReferenceStore {
    families: Arc<Mutex<BTreeMap<FamilyId, Family>>>,
    events: Arc<Mutex<BTreeMap<EventDate, EventInstance>>>,
    responses: Arc<Mutex<HashMap<EventDate, BTreeMap<FamilyId, RsvpResponse>>>>,
    partitions: Arc<SyncMutex<PartitionLocks>>,
    faults: Arc<Faults>,
}

type PartitionLocks = HashMap<EventDate, Arc<Mutex<()>>>;

/// Exclusive hold on one event's mutex.
struct PartitionLease {
    date: EventDate,
    locks: Arc<SyncMutex<PartitionLocks>>,
    guard: Option<OwnedMutexGuard<()>>,
}

impl Drop for PartitionLease {
    fn drop(&mut self) {
        drop(self.guard.take());

        let mut locks = self.locks.lock().unwrap_or_else(PoisonError::into_inner);
        let idle = locks
            .get(&self.date)
            .is_some_and(|lock| Arc::strong_count(lock) == 1);
        if idle {
            locks.remove(&self.date);
        }
    }
}

#[derive(Default)]
struct Faults {
    unavailable: AtomicBool,
    pending_conflicts: AtomicU32,
}

impl ReferenceStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every subsequent call fail with `StoreFailure` until cleared.
    pub fn set_unavailable(&self, unavailable: bool) {
        self.faults.unavailable.store(unavailable, Ordering::SeqCst);
    }

    /// Make the next `count` partition commits fail with `Conflict`.
    pub fn inject_conflicts(&self, count: u32) {
        self.faults.pending_conflicts.store(count, Ordering::SeqCst);
    }

    fn check_available(&self) -> Result<()> {
        if self.faults.unavailable.load(Ordering::SeqCst) {
            Err(Error::StoreFailure("reference store unavailable".to_string()))
        } else {
            Ok(())
        }
    }

    fn take_conflict(&self) -> bool {
        self.faults
            .pending_conflicts
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
    }
}

#[async_trait]
impl Store for ReferenceStore {
    async fn fetch_family(&self, id: FamilyId) -> Result<Option<Family>> {
        self.check_available()?;
        Ok(self.families.lock().await.get(&id).cloned())
    }

    async fn fetch_families(&self) -> Result<Vec<Family>> {
        self.check_available()?;
        Ok(self.families.lock().await.values().cloned().collect())
    }

    async fn put_family(&self, family: &Family) -> Result<()> {
        self.check_available()?;
        let mut families = self.families.lock().await;
        let token_taken = families
            .values()
            .any(|other| other.id != family.id && other.token == family.token);
        if token_taken {
            return Err(Error::BadRequest(
                "token: already assigned to another family".to_string(),
            ));
        }
        families.insert(family.id, family.clone());
        Ok(())
    }

    async fn fetch_event(&self, date: &EventDate) -> Result<Option<EventInstance>> {
        self.check_available()?;
        Ok(self.events.lock().await.get(date).cloned())
    }

    async fn fetch_events_from(&self, from: &EventDate) -> Result<Vec<EventInstance>> {
        self.check_available()?;
        Ok(self
            .events
            .lock()
            .await
            .range(*from..)
            .map(|(_, event)| event.clone())
            .collect())
    }

    async fn fetch_responses(&self, date: &EventDate) -> Result<Vec<RsvpResponse>> {
        self.check_available()?;
        Ok(self
            .responses
            .lock()
            .await
            .get(date)
            .map(|by_family| by_family.values().cloned().collect())
            .unwrap_or_default())
    }

    async fn open_partition(&self, date: &EventDate) -> Result<Box<dyn EventPartition>> {
        self.check_available()?;

        let lock = {
            let mut partitions = self
                .partitions
                .lock()
                .unwrap_or_else(PoisonError::into_inner);
            Arc::clone(partitions.entry(*date).or_default())
        };
        let lease = PartitionLease {
            date: *date,
            locks: Arc::clone(&self.partitions),
            guard: Some(lock.lock_owned().await),
        };

        let event = self.events.lock().await.get(date).cloned();

        Ok(Box::new(ReferencePartition {
            store: self.clone(),
            date: *date,
            event,
            staged_event: None,
            staged_responses: BTreeMap::new(),
            _lease: lease,
        }))
    }
}

struct ReferencePartition {
    store: ReferenceStore,
    date: EventDate,
    event: Option<EventInstance>,
    staged_event: Option<EventInstance>,
    staged_responses: BTreeMap<FamilyId, RsvpResponse>,
    _lease: PartitionLease,
}

#[async_trait]
impl EventPartition for ReferencePartition {
    fn event(&self) -> Option<&EventInstance> {
        self.staged_event.as_ref().or(self.event.as_ref())
    }

    async fn fetch_response(&mut self, family: FamilyId) -> Result<Option<RsvpResponse>> {
        self.store.check_available()?;
        if let Some(staged) = self.staged_responses.get(&family) {
            return Ok(Some(staged.clone()));
        }
        Ok(self
            .store
            .responses
            .lock()
            .await
            .get(&self.date)
            .and_then(|by_family| by_family.get(&family))
            .cloned())
    }

    async fn fetch_responses(&mut self) -> Result<Vec<RsvpResponse>> {
        self.store.check_available()?;
        let mut merged = self
            .store
            .responses
            .lock()
            .await
            .get(&self.date)
            .cloned()
            .unwrap_or_default();
        merged.extend(
            self.staged_responses
                .iter()
                .map(|(family, response)| (*family, response.clone())),
        );
        Ok(merged.into_values().collect())
    }

    async fn put_response(&mut self, response: &RsvpResponse) -> Result<()> {
        self.store.check_available()?;
        if response.event_date != self.date {
            return Err(Error::Internal(format!(
                "response for {} written through partition {}",
                response.event_date, self.date
            )));
        }
        if self.event().is_none() {
            return Err(Error::StoreFailure(format!(
                "no event {} to attach the response to",
                self.date
            )));
        }
        self.staged_responses
            .insert(response.family_id, response.clone());
        Ok(())
    }

    async fn put_event(&mut self, event: &EventInstance) -> Result<()> {
        self.store.check_available()?;
        if event.date != self.date {
            return Err(Error::Internal(format!(
                "event {} written through partition {}",
                event.date, self.date
            )));
        }
        self.staged_event = Some(event.clone());
        Ok(())
    }

    async fn commit(self: Box<Self>) -> Result<()> {
        self.store.check_available()?;
        if self.store.take_conflict() {
            return Err(Error::Conflict(format!(
                "concurrent update to event {}",
                self.date
            )));
        }

        let ReferencePartition {
            store,
            date,
            staged_event,
            staged_responses,
            _lease,
            ..
        } = *self;

        if let Some(event) = staged_event {
            store.events.lock().await.insert(date, event);
        }
        if !staged_responses.is_empty() {
            store
                .responses
                .lock()
                .await
                .entry(date)
                .or_default()
                .extend(staged_responses);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn date(s: &str) -> EventDate {
        s.parse().unwrap()
    }

    fn response(day: &str, family: i64, attending: u32) -> RsvpResponse {
        RsvpResponse {
            event_date: date(day),
            family_id: FamilyId::new(family).unwrap(),
            attending,
            note: String::new(),
            updated_at: Utc::now(),
        }
    }

    async fn store_with_event(day: &str, cap: u32) -> ReferenceStore {
        let store = ReferenceStore::new();
        let mut partition = store.open_partition(&date(day)).await.unwrap();
        partition
            .put_event(&EventInstance {
                date: date(day),
                cap,
                notes: String::new(),
            })
            .await
            .unwrap();
        partition.commit().await.unwrap();
        store
    }

    #[tokio::test]
    async fn test_dropped_partition_writes_nothing() {
        let store = store_with_event("2024-06-01", 10).await;

        let mut partition = store.open_partition(&date("2024-06-01")).await.unwrap();
        partition.put_response(&response("2024-06-01", 1, 2)).await.unwrap();
        assert_eq!(partition.fetch_responses().await.unwrap().len(), 1);
        drop(partition);

        assert!(store.fetch_responses(&date("2024-06-01")).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_response_requires_event() {
        let store = ReferenceStore::new();
        let mut partition = store.open_partition(&date("2024-06-01")).await.unwrap();
        assert!(partition.event().is_none());
        let err = partition
            .put_response(&response("2024-06-01", 1, 2))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::StoreFailure(_)));
    }

    #[tokio::test]
    async fn test_injected_conflict_discards_staged_writes() {
        let store = store_with_event("2024-06-01", 10).await;
        store.inject_conflicts(1);

        let mut partition = store.open_partition(&date("2024-06-01")).await.unwrap();
        partition.put_response(&response("2024-06-01", 1, 2)).await.unwrap();
        assert!(matches!(partition.commit().await, Err(Error::Conflict(_))));
        assert!(store.fetch_responses(&date("2024-06-01")).await.unwrap().is_empty());

        let mut partition = store.open_partition(&date("2024-06-01")).await.unwrap();
        partition.put_response(&response("2024-06-01", 1, 2)).await.unwrap();
        partition.commit().await.unwrap();
        assert_eq!(store.fetch_responses(&date("2024-06-01")).await.unwrap().len(), 1);
    }

    fn lock_count(store: &ReferenceStore) -> usize {
        store.partitions.lock().unwrap().len()
    }

    #[tokio::test]
    async fn test_partition_locks_are_released() {
        let store = ReferenceStore::new();
        for day in 1..=20 {
            let partition = store
                .open_partition(&date(&format!("2030-01-{:02}", day)))
                .await
                .unwrap();
            drop(partition);
        }
        assert_eq!(lock_count(&store), 0);

        let held = store.open_partition(&date("2024-06-01")).await.unwrap();
        let waiter = {
            let store = store.clone();
            tokio::spawn(async move {
                let partition = store.open_partition(&date("2024-06-01")).await.unwrap();
                partition.commit().await.unwrap();
            })
        };
        tokio::task::yield_now().await;
        assert_eq!(lock_count(&store), 1);

        held.commit().await.unwrap();
        waiter.await.unwrap();
        assert_eq!(lock_count(&store), 0);
    }

    #[tokio::test]
    async fn test_duplicate_token_rejected() {
        let store = ReferenceStore::new();
        let family = |id: i64, token: &str| Family {
            id: FamilyId::new(id).unwrap(),
            name: format!("Family {}", id),
            token: token.to_string(),
            notes: String::new(),
            people: vec![],
        };
        store.put_family(&family(1, "alpha")).await.unwrap();
        store.put_family(&family(1, "alpha")).await.unwrap();
        let err = store.put_family(&family(2, "alpha")).await.unwrap_err();
        assert!(matches!(err, Error::BadRequest(_)));
    }
}
