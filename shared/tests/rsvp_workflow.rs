mod common;

use std::sync::Arc;
use std::time::Duration;

use common::{date, fixture, id, token_for};
use shared::{Error, EventInstance, Store};

#[tokio::test]
async fn test_cap_boundary() {
    let fx = fixture();
    fx.add_event("2024-06-01", 5).await;
    for n in 1..=3 {
        fx.add_family(n).await;
    }

    fx.submit(1, "2024-06-01", 3).await.unwrap();
    fx.submit(2, "2024-06-01", 2).await.unwrap();

    let err = fx.submit(3, "2024-06-01", 1).await.unwrap_err();
    assert!(matches!(err, Error::CapExceeded(_)));

    fx.submit(3, "2024-06-01", 0).await.unwrap();
    assert_eq!(fx.total("2024-06-01").await, 5);
}

#[tokio::test]
async fn test_rejected_write_leaves_previous_response() {
    let fx = fixture();
    fx.add_event("2024-06-01", 5).await;
    fx.add_family(1).await;
    fx.add_family(2).await;

    fx.submit(1, "2024-06-01", 2).await.unwrap();
    fx.submit(2, "2024-06-01", 3).await.unwrap();
    assert!(fx.submit(1, "2024-06-01", 3).await.is_err());

    let own = fx.store.fetch_responses(&date("2024-06-01")).await.unwrap();
    assert_eq!(own.iter().find(|r| r.family_id == id(1)).unwrap().attending, 2);
}

#[tokio::test]
async fn test_own_seats_not_counted_against_growth() {
    let fx = fixture();
    fx.add_event("2024-06-01", 5).await;
    fx.add_family(1).await;

    fx.submit(1, "2024-06-01", 3).await.unwrap();
    // Growing 3 -> 5 only needs 5 seats in total, not 8.
    fx.submit(1, "2024-06-01", 5).await.unwrap();
    assert_eq!(fx.total("2024-06-01").await, 5);
}

#[tokio::test]
async fn test_shrinking_skips_cap_check() {
    let fx = fixture();
    fx.add_event("2024-06-01", 5).await;
    fx.add_family(1).await;
    fx.force_response("2024-06-01", 1, 4).await;
    fx.force_response("2024-06-01", 2, 5).await;

    fx.submit(1, "2024-06-01", 2).await.unwrap();
    fx.submit(1, "2024-06-01", 2).await.unwrap();

    let err = fx.submit(1, "2024-06-01", 3).await.unwrap_err();
    assert!(matches!(err, Error::CapExceeded(_)));
}

#[tokio::test]
async fn test_resubmission_is_idempotent() {
    let fx = fixture();
    fx.add_event("2024-06-01", 5).await;
    fx.add_family(1).await;

    let first = fx
        .service
        .submit_rsvp(id(1), &token_for(1), "2024-06-01", 4, "two kids")
        .await
        .unwrap();
    let stored_once = fx.store.fetch_responses(&date("2024-06-01")).await.unwrap();

    let second = fx
        .service
        .submit_rsvp(id(1), &token_for(1), "2024-06-01", 4, "two kids")
        .await
        .unwrap();
    let stored_twice = fx.store.fetch_responses(&date("2024-06-01")).await.unwrap();

    assert_eq!(first, second);
    assert_eq!(stored_once, stored_twice);
    assert_eq!(stored_twice.len(), 1);
    assert_eq!(stored_twice[0].note, "two kids");
}

#[tokio::test]
async fn test_unknown_family_and_wrong_token_look_the_same() {
    let fx = fixture();
    fx.add_event("2024-06-01", 5).await;
    fx.add_family(1).await;

    let unknown = fx
        .service
        .submit_rsvp(id(99), "anything", "2024-06-01", 1, "")
        .await
        .unwrap_err();
    let wrong_token = fx
        .service
        .submit_rsvp(id(1), "family-token-2", "2024-06-01", 1, "")
        .await
        .unwrap_err();

    assert!(matches!(unknown, Error::Unauthorized(_)));
    assert_eq!(unknown.to_string(), wrong_token.to_string());
    assert!(!wrong_token.to_string().contains("family-token"));
}

#[tokio::test]
async fn test_family_check_runs_before_input_validation() {
    let fx = fixture();
    let err = fx
        .service
        .submit_rsvp(id(5), "nope", "not-a-date", -4, "")
        .await
        .unwrap_err();
    assert!(matches!(err, Error::Unauthorized(_)));
}

#[tokio::test]
async fn test_bad_input_is_bad_request() {
    let fx = fixture();
    fx.add_event("2024-06-01", 5).await;
    fx.add_family(1).await;

    let negative = fx.submit(1, "2024-06-01", -1).await.unwrap_err();
    assert!(matches!(negative, Error::BadRequest(msg) if msg.contains("attending")));

    let malformed = fx.submit(1, "2024-6-1", 1).await.unwrap_err();
    assert!(matches!(malformed, Error::BadRequest(msg) if msg.contains("date")));
}

#[tokio::test]
async fn test_unknown_event_writes_nothing() {
    let fx = fixture();
    fx.add_family(1).await;

    let err = fx.submit(1, "2024-06-02", 1).await.unwrap_err();
    assert_eq!(err, Error::NotFound("no event on 2024-06-02".to_string()));
    assert!(fx.store.fetch_responses(&date("2024-06-02")).await.unwrap().is_empty());
}

#[tokio::test]
async fn test_store_outage_is_reported() {
    let fx = fixture();
    fx.add_event("2024-06-01", 5).await;
    fx.add_family(1).await;

    fx.store.set_unavailable(true);
    let err = fx.submit(1, "2024-06-01", 1).await.unwrap_err();
    assert!(matches!(err, Error::StoreFailure(_)));
    assert!(err.is_retryable());

    fx.store.set_unavailable(false);
    fx.submit(1, "2024-06-01", 1).await.unwrap();
}

#[tokio::test]
async fn test_conflicts_are_retried_then_reported() {
    let fx = fixture();
    fx.add_event("2024-06-01", 5).await;
    fx.add_family(1).await;

    fx.store.inject_conflicts(2);
    fx.submit(1, "2024-06-01", 2).await.unwrap();

    fx.store.inject_conflicts(3);
    let err = fx.submit(1, "2024-06-01", 3).await.unwrap_err();
    assert!(matches!(err, Error::Conflict(_)));
    assert_eq!(fx.total("2024-06-01").await, 2);
}

#[tokio::test]
async fn test_deadline_aborts_before_write() {
    let fx = fixture();
    fx.add_event("2024-06-01", 5).await;
    fx.add_family(1).await;

    let service = shared::RsvpService::new(
        Arc::new(fx.store.clone()),
        Arc::new(shared::SystemClock),
        chrono_tz::America::Los_Angeles,
    )
    .with_request_timeout(Duration::from_millis(50));

    let held = fx.store.open_partition(&date("2024-06-01")).await.unwrap();
    let err = service
        .submit_rsvp(id(1), &token_for(1), "2024-06-01", 2, "")
        .await
        .unwrap_err();
    assert!(matches!(err, Error::StoreFailure(msg) if msg.contains("submit_rsvp")));
    drop(held);

    assert_eq!(fx.total("2024-06-01").await, 0);
}

#[tokio::test]
async fn test_admin_event_write_respects_deadline() {
    let fx = fixture();
    fx.add_event("2024-06-01", 5).await;

    let service = shared::RsvpService::new(
        Arc::new(fx.store.clone()),
        Arc::new(shared::SystemClock),
        chrono_tz::America::Los_Angeles,
    )
    .with_request_timeout(Duration::from_millis(50));

    let held = fx.store.open_partition(&date("2024-06-01")).await.unwrap();
    let bigger = EventInstance {
        date: date("2024-06-01"),
        cap: 9,
        notes: String::new(),
    };
    let outcome = tokio::time::timeout(
        Duration::from_secs(2),
        service.admin_put_event(&fx.admin, &bigger),
    )
    .await
    .expect("admin event write outlived its deadline");
    assert!(matches!(outcome, Err(Error::StoreFailure(msg)) if msg.contains("admin_put_event")));
    drop(held);

    let stored = fx.store.fetch_event(&date("2024-06-01")).await.unwrap().unwrap();
    assert_eq!(stored.cap, 5);

    service.admin_put_event(&fx.admin, &bigger).await.unwrap();
    let stored = fx.store.fetch_event(&date("2024-06-01")).await.unwrap().unwrap();
    assert_eq!(stored.cap, 9);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_submissions_cannot_both_fit() {
    let fx = Arc::new(fixture());
    fx.add_event("2024-06-01", 5).await;
    fx.add_family(1).await;
    fx.add_family(2).await;

    let a = {
        let fx = Arc::clone(&fx);
        tokio::spawn(async move { fx.submit(1, "2024-06-01", 3).await })
    };
    let b = {
        let fx = Arc::clone(&fx);
        tokio::spawn(async move { fx.submit(2, "2024-06-01", 3).await })
    };
    let results = [a.await.unwrap(), b.await.unwrap()];

    assert_eq!(results.iter().filter(|r| r.is_ok()).count(), 1);
    assert!(results
        .iter()
        .any(|r| matches!(r, Err(Error::CapExceeded(_)) | Err(Error::Conflict(_)))));
    assert_eq!(fx.total("2024-06-01").await, 3);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_cap_holds_under_many_concurrent_families() {
    let fx = Arc::new(fixture());
    fx.add_event("2024-06-01", 7).await;
    fx.add_event("2024-06-08", 7).await;
    for n in 1..=12 {
        fx.add_family(n).await;
    }

    let mut handles = Vec::new();
    for n in 1..=12i64 {
        for day in ["2024-06-01", "2024-06-08"] {
            let fx = Arc::clone(&fx);
            handles.push(tokio::spawn(async move {
                fx.submit(n, day, n % 3 + 1).await
            }));
        }
    }
    for handle in handles {
        let _ = handle.await.unwrap();
    }

    assert!(fx.total("2024-06-01").await <= 7);
    assert!(fx.total("2024-06-08").await <= 7);
}

#[tokio::test]
async fn test_admin_override_respects_cap() {
    let fx = fixture();
    fx.add_event("2024-06-01", 4).await;
    fx.add_family(1).await;
    fx.add_family(2).await;

    fx.submit(1, "2024-06-01", 3).await.unwrap();

    let err = fx
        .service
        .admin_submit_rsvp(&fx.admin, id(2), "2024-06-01", 2, "")
        .await
        .unwrap_err();
    assert!(matches!(err, Error::CapExceeded(_)));

    let ack = fx
        .service
        .admin_submit_rsvp(&fx.admin, id(2), "2024-06-01", 1, "called in")
        .await
        .unwrap();
    assert_eq!(ack.attending, 1);
    assert_eq!(fx.total("2024-06-01").await, 4);
}

#[tokio::test]
async fn test_admin_override_unknown_family() {
    let fx = fixture();
    fx.add_event("2024-06-01", 4).await;
    let err = fx
        .service
        .admin_submit_rsvp(&fx.admin, id(42), "2024-06-01", 1, "")
        .await
        .unwrap_err();
    assert!(matches!(err, Error::NotFound(_)));
}
