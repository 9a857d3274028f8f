//! Stress tests for fieldkit-storage
//!
//! These tests verify queue ordering and store consistency under concurrent
//! access.

use std::sync::Arc;
use std::time::Instant;

use chrono::Utc;
use fieldkit_core::{
    AuditInfo, Geometry, LocalStore, LocationOfInterest, Mutation, MutationType, Point, Survey,
    TargetKind,
};
use fieldkit_storage::{InMemoryLocalStore, MutationQueue, PersistentLocalStore};
use tempfile::TempDir;

fn loi(survey_id: &str, id: usize) -> LocationOfInterest {
    LocationOfInterest {
        id: format!("loi-{id}"),
        survey_id: survey_id.to_string(),
        job_id: "job-1".to_string(),
        geometry: Geometry::Point(Point::new(id as f64, 0.0)),
        custom_id: None,
        caption: None,
        created: AuditInfo::fallback(),
        last_modified: AuditInfo::fallback(),
    }
}

fn edit(target_id: &str) -> Mutation {
    Mutation::new(
        "survey-1",
        TargetKind::LocationOfInterest,
        target_id,
        target_id,
        "job-1",
        MutationType::Update,
        serde_json::json!({}),
        "user-1",
        Utc::now(),
    )
}

// ============================================================================
// Queue ordering
// ============================================================================

/// Concurrent producers must never reorder mutations within one target
#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_enqueue_preserves_per_target_order() {
    let queue = Arc::new(MutationQueue::new());
    let targets = 8;
    let per_target = 250;

    let start = Instant::now();
    let handles: Vec<_> = (0..targets)
        .map(|t| {
            let queue = Arc::clone(&queue);
            tokio::spawn(async move {
                for _ in 0..per_target {
                    queue.enqueue(edit(&format!("loi-{t}"))).unwrap();
                    tokio::task::yield_now().await;
                }
            })
        })
        .collect();
    for handle in handles {
        handle.await.unwrap();
    }
    println!("Enqueued {} mutations in {:?}", targets * per_target, start.elapsed());

    assert_eq!(queue.len(), targets * per_target);
    let queues = queue.target_queues("survey-1");
    assert_eq!(queues.len(), targets);
    for target_queue in queues {
        assert_eq!(target_queue.len(), per_target);
        assert!(target_queue.windows(2).all(|w| w[0].sequence < w[1].sequence));
    }
}

/// A journaled queue written concurrently replays into the same per-target order
#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_journaled_queue_reopens_in_order() {
    let dir = TempDir::new().unwrap();
    let targets = 4;
    let per_target = 100;
    let before = {
        let queue = Arc::new(MutationQueue::with_options(dir.path(), false).await.unwrap());
        let handles: Vec<_> = (0..targets)
            .map(|t| {
                let queue = Arc::clone(&queue);
                tokio::spawn(async move {
                    for _ in 0..per_target {
                        queue.enqueue(edit(&format!("loi-{t}"))).unwrap();
                        tokio::task::yield_now().await;
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.await.unwrap();
        }
        queue.target_queues("survey-1")
    };

    let queue = MutationQueue::open(dir.path()).await.unwrap();
    assert_eq!(queue.len(), targets * per_target);
    assert_eq!(queue.target_queues("survey-1"), before);

    let highest = before.iter().flatten().map(|m| m.sequence).max().unwrap();
    let next = queue.enqueue(edit("loi-0")).unwrap();
    assert!(next.sequence > highest);
}

// ============================================================================
// Store consistency
// ============================================================================

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_loi_writes() {
    let store = Arc::new(InMemoryLocalStore::new());
    let handles: Vec<_> = (0..4)
        .map(|worker| {
            let store = Arc::clone(&store);
            tokio::spawn(async move {
                for i in 0..500 {
                    store.put_loi(loi("survey-1", worker * 500 + i)).await.unwrap();
                }
            })
        })
        .collect();
    for handle in handles {
        handle.await.unwrap();
    }

    assert_eq!(store.lois("survey-1").await.unwrap().len(), 2_000);
    store.delete_survey("survey-1").await.unwrap();
    assert!(store.lois("survey-1").await.unwrap().is_empty());
}

#[tokio::test]
async fn test_persistent_store_many_writes_survive_reopen() {
    let dir = TempDir::new().unwrap();
    {
        let store = PersistentLocalStore::with_options(dir.path(), false)
            .await
            .unwrap();
        store.put_survey(Survey::new("survey-1", "Census")).await.unwrap();
        for i in 0..1_000 {
            store.put_loi(loi("survey-1", i)).await.unwrap();
        }
        for i in (0..1_000).step_by(2) {
            store.delete_loi("survey-1", &format!("loi-{i}")).await.unwrap();
        }
        store.flush().await.unwrap();
    }

    let store = PersistentLocalStore::open(dir.path()).await.unwrap();
    let lois = store.lois("survey-1").await.unwrap();
    assert_eq!(lois.len(), 500);
    assert!(store.get_offline_loi("survey-1", "loi-1").await.unwrap().is_some());
    assert!(store.get_offline_loi("survey-1", "loi-0").await.unwrap().is_none());
}
