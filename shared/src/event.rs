//! Event resolver.

use crate::models::{EventDate, EventInstance};
use crate::store::Store;
use crate::{Error, Result};

/// Load the event keyed by `date`.
pub async fn resolve_event(store: &dyn Store, date: &EventDate) -> Result<EventInstance> {
    require_event(date, store.fetch_event(date).await?)
}

/// Turn an absent event into a reportable `NotFound`.
pub fn require_event(date: &EventDate, event: Option<EventInstance>) -> Result<EventInstance> {
    event.ok_or_else(|| Error::NotFound(format!("no event on {}", date)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{ReferenceStore, Store};

    #[tokio::test]
    async fn test_missing_event_is_not_found() {
        let store = ReferenceStore::new();
        let date: EventDate = "2024-06-01".parse().unwrap();
        let err = resolve_event(&store, &date).await.unwrap_err();
        assert_eq!(err, Error::NotFound("no event on 2024-06-01".to_string()));
    }

    #[tokio::test]
    async fn test_store_failure_is_not_masked_as_not_found() {
        let store = ReferenceStore::new();
        store.set_unavailable(true);
        let date: EventDate = "2024-06-01".parse().unwrap();
        let err = resolve_event(&store, &date).await.unwrap_err();
        assert!(matches!(err, Error::StoreFailure(_)));
        assert!(store.fetch_event(&date).await.is_err());
    }
}
