//! Behavior tests for ReportStore implementations.
//! Memory tests always run. Postgres tests require DATABASE_TEST_URL or are skipped.

use std::sync::Arc;

use chrono::{Duration, Utc};
use sqlx::PgPool;
use uuid::Uuid;

use napulita_common::{BoundingBox, Category, GeoPoint, ReportId, ReportStatus};
use napulita_geo::GeoIndex;
use napulita_store::{
    MemoryReportStore, NewComment, NewReport, PgReportStore, ReportStore, StatusChange,
    StatusGuard,
};

fn new_report(lat: f64, lon: f64) -> NewReport {
    NewReport {
        reporter_id: Uuid::new_v4(),
        location: GeoPoint::new(lat, lon),
        category: Category::Trash,
        note: Some("bags by the bench".into()),
        before_photo_ref: "reports/before/1.jpg".into(),
        created_at: Utc::now(),
    }
}

/// Get a migrated test database store, or skip if no test DB is available.
async fn test_pg_store() -> Option<PgReportStore> {
    let url = std::env::var("DATABASE_TEST_URL").ok()?;
    let pool = PgPool::connect(&url).await.ok()?;
    let store = PgReportStore::new(pool);
    store.migrate().await.ok()?;

    // Clean slate for each test
    sqlx::query("TRUNCATE score_events, comments, reports RESTART IDENTITY CASCADE")
        .execute(store.pool())
        .await
        .ok()?;

    Some(store)
}

// =========================================================================
// Shared scenarios
// =========================================================================

async fn claim_then_cleanup(store: &dyn ReportStore) {
    let report = store.insert_report(new_report(40.85, 14.27)).await.unwrap();
    assert_eq!(report.status, ReportStatus::Open);
    assert!(report.check_invariants().is_ok());

    let alice = Uuid::new_v4();
    let claimed = store
        .compare_and_set(
            report.id,
            StatusGuard::status(ReportStatus::Open),
            StatusChange::Claim {
                claimant: alice,
                at: Utc::now(),
            },
        )
        .await
        .unwrap()
        .expect("first claim wins");
    assert_eq!(claimed.claimant_id, Some(alice));

    let second = store
        .compare_and_set(
            report.id,
            StatusGuard::status(ReportStatus::Open),
            StatusChange::Claim {
                claimant: Uuid::new_v4(),
                at: Utc::now(),
            },
        )
        .await
        .unwrap();
    assert!(second.is_none(), "second claim must lose");

    let cleanup = StatusChange::Cleanup {
        after_photo_ref: "reports/after/1.jpg".into(),
        after_location: GeoPoint::new(40.8501, 14.2701),
        at: Utc::now(),
    };
    let cleaned = store
        .compare_and_set(report.id, StatusGuard::claimed_by(alice), cleanup.clone())
        .await
        .unwrap()
        .expect("claimant can clean");
    assert_eq!(cleaned.status, ReportStatus::Cleaned);
    assert!(cleaned.check_invariants().is_ok());

    let replay = store
        .compare_and_set(report.id, StatusGuard::claimed_by(alice), cleanup)
        .await
        .unwrap();
    assert!(replay.is_none(), "cleanup applies once");
}

async fn illegal_edges_never_apply(store: &dyn ReportStore) {
    let report = store.insert_report(new_report(40.85, 14.27)).await.unwrap();

    // open -> cleaned is not an edge, even if the caller asks for it.
    let result = store
        .compare_and_set(
            report.id,
            StatusGuard::status(ReportStatus::Open),
            StatusChange::Cleanup {
                after_photo_ref: "x.jpg".into(),
                after_location: GeoPoint::new(40.85, 14.27),
                at: Utc::now(),
            },
        )
        .await
        .unwrap();
    assert!(result.is_none());

    let invalid = store
        .compare_and_set(
            report.id,
            StatusGuard::any_of(&[ReportStatus::Open, ReportStatus::Claimed]),
            StatusChange::Invalidate,
        )
        .await
        .unwrap()
        .expect("open -> invalid");
    assert_eq!(invalid.status, ReportStatus::Invalid);

    let reopen = store
        .compare_and_set(
            report.id,
            StatusGuard::any_of(&ReportStatus::ALL),
            StatusChange::Release,
        )
        .await
        .unwrap();
    assert!(reopen.is_none(), "invalid is terminal");
}

async fn concurrent_claims_have_one_winner(store: Arc<dyn ReportStore>) {
    let report = store.insert_report(new_report(40.85, 14.27)).await.unwrap();

    let contenders: Vec<Uuid> = (0..16).map(|_| Uuid::new_v4()).collect();
    let handles: Vec<_> = contenders
        .iter()
        .map(|&who| {
            let store = store.clone();
            tokio::spawn(async move {
                store
                    .compare_and_set(
                        report.id,
                        StatusGuard::status(ReportStatus::Open),
                        StatusChange::Claim {
                            claimant: who,
                            at: Utc::now(),
                        },
                    )
                    .await
                    .unwrap()
                    .map(|_| who)
            })
        })
        .collect();

    let winners: Vec<Uuid> = futures::future::join_all(handles)
        .await
        .into_iter()
        .filter_map(|r| r.unwrap())
        .collect();
    assert_eq!(winners.len(), 1);

    let stored = store.get_report(report.id).await.unwrap().unwrap();
    assert_eq!(stored.claimant_id, Some(winners[0]));
}

async fn comments_come_back_oldest_first(store: &dyn ReportStore) {
    let report = store.insert_report(new_report(40.85, 14.27)).await.unwrap();
    let base = Utc::now();
    let author = Uuid::new_v4();

    let later = store
        .insert_comment(NewComment {
            report_id: report.id,
            author_id: author,
            body: "second".into(),
            parent_id: None,
            created_at: base + Duration::seconds(10),
        })
        .await
        .unwrap();
    let earlier = store
        .insert_comment(NewComment {
            report_id: report.id,
            author_id: author,
            body: "first".into(),
            parent_id: None,
            created_at: base,
        })
        .await
        .unwrap();

    let listed = store.list_comments(report.id).await.unwrap();
    let ids: Vec<_> = listed.iter().map(|c| c.id).collect();
    assert_eq!(ids, vec![earlier.id, later.id]);
    assert!(store.list_comments(ReportId(9999)).await.unwrap().is_empty());
}

// =========================================================================
// Memory store
// =========================================================================

#[tokio::test]
async fn memory_claim_then_cleanup() {
    claim_then_cleanup(&MemoryReportStore::new()).await;
}

#[tokio::test]
async fn memory_illegal_edges_never_apply() {
    illegal_edges_never_apply(&MemoryReportStore::new()).await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn memory_concurrent_claims_have_one_winner() {
    concurrent_claims_have_one_winner(Arc::new(MemoryReportStore::new())).await;
}

#[tokio::test]
async fn memory_comments_come_back_oldest_first() {
    comments_come_back_oldest_first(&MemoryReportStore::new()).await;
}

#[tokio::test]
async fn memory_get_reports_keeps_requested_order() {
    let store = MemoryReportStore::new();
    let a = store.insert_report(new_report(40.85, 14.27)).await.unwrap();
    let b = store.insert_report(new_report(40.86, 14.28)).await.unwrap();

    let got = store
        .get_reports(&[b.id, ReportId(404), a.id])
        .await
        .unwrap();
    let ids: Vec<_> = got.iter().map(|r| r.id).collect();
    assert_eq!(ids, vec![b.id, a.id]);
}

#[tokio::test]
async fn memory_claims_older_than_only_returns_stale_claims() {
    let store = MemoryReportStore::new();
    let stale = store.insert_report(new_report(40.85, 14.27)).await.unwrap();
    let fresh = store.insert_report(new_report(40.86, 14.28)).await.unwrap();
    let now = Utc::now();

    for (id, at) in [(stale.id, now - Duration::hours(100)), (fresh.id, now)] {
        store
            .compare_and_set(
                id,
                StatusGuard::status(ReportStatus::Open),
                StatusChange::Claim {
                    claimant: Uuid::new_v4(),
                    at,
                },
            )
            .await
            .unwrap()
            .unwrap();
    }

    let old = store
        .claims_older_than(now - Duration::hours(72))
        .await
        .unwrap();
    assert_eq!(old.len(), 1);
    assert_eq!(old[0].id, stale.id);
}

// =========================================================================
// Postgres store
// =========================================================================

#[tokio::test]
async fn pg_claim_then_cleanup() {
    let Some(store) = test_pg_store().await else {
        return;
    };
    claim_then_cleanup(&store).await;
}

#[tokio::test]
async fn pg_illegal_edges_never_apply() {
    let Some(store) = test_pg_store().await else {
        return;
    };
    illegal_edges_never_apply(&store).await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn pg_concurrent_claims_have_one_winner() {
    let Some(store) = test_pg_store().await else {
        return;
    };
    concurrent_claims_have_one_winner(Arc::new(store)).await;
}

#[tokio::test]
async fn pg_comments_come_back_oldest_first() {
    let Some(store) = test_pg_store().await else {
        return;
    };
    comments_come_back_oldest_first(&store).await;
}

#[tokio::test]
async fn pg_geo_query_uses_box_and_window() {
    let Some(store) = test_pg_store().await else {
        return;
    };
    let mut old = new_report(40.85, 14.27);
    old.created_at = Utc::now() - Duration::days(30);
    let old = store.insert_report(old).await.unwrap();

    let naples = BoundingBox::new(14.0, 40.5, 14.5, 41.0).unwrap();
    let elsewhere = BoundingBox::new(15.0, 41.0, 16.0, 42.0).unwrap();

    let within_45 = store
        .query(&naples, Utc::now() - Duration::days(45), None)
        .await
        .unwrap();
    assert_eq!(within_45, vec![old.id]);

    let within_21 = store
        .query(&naples, Utc::now() - Duration::days(21), None)
        .await
        .unwrap();
    assert!(within_21.is_empty());

    let away = store
        .query(&elsewhere, Utc::now() - Duration::days(45), None)
        .await
        .unwrap();
    assert!(away.is_empty());
}
