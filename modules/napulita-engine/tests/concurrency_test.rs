mod support;

use napulita_common::{Category, ReportStatus};

use support::{harness, north_of, user, PLEBISCITO};

#[tokio::test(flavor = "multi_thread", worker_threads = 8)]
async fn concurrent_claims_have_exactly_one_winner() {
    let h = harness().await;
    let id = h.report_at(&user(), PLEBISCITO, Category::Trash).await;

    let contenders: Vec<_> = (0..32).map(|_| user()).collect();
    let tasks: Vec<_> = contenders
        .iter()
        .cloned()
        .map(|actor| {
            let engine = h.engine.clone();
            tokio::spawn(async move {
                let won = engine.claim_report(&actor, id).await.unwrap();
                (actor.user_id, won)
            })
        })
        .collect();

    let results: Vec<_> = futures::future::join_all(tasks)
        .await
        .into_iter()
        .map(|r| r.unwrap())
        .collect();
    let winners: Vec<_> = results.iter().filter(|(_, won)| *won).collect();
    assert_eq!(winners.len(), 1);

    let report = h.engine.get_report(id).await.unwrap();
    assert_eq!(report.status, ReportStatus::Claimed);
    assert_eq!(report.claimant_id, Some(winners[0].0));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_cleanup_retries_credit_once() {
    let h = harness().await;
    let a = user();
    let id = h.report_at(&user(), PLEBISCITO, Category::OverflowingBin).await;
    h.engine.claim_report(&a, id).await.unwrap();
    let photo = h.after_photo();

    let tasks: Vec<_> = (0..8)
        .map(|_| {
            let engine = h.engine.clone();
            let actor = a;
            let photo = photo.clone();
            tokio::spawn(async move {
                engine
                    .submit_cleanup(&actor, id, &photo, north_of(PLEBISCITO, 15.0))
                    .await
            })
        })
        .collect();

    for result in futures::future::join_all(tasks).await {
        // Losers either see the cleaned report as a retry or lose the write.
        result.unwrap().unwrap();
    }

    assert_eq!(h.ledger.events().len(), 1);
    let card = h.scoring.score_card(a.user_id).await.unwrap();
    assert_eq!(card.cumulative_points(), 15);
    assert_eq!(card.all_time.reports_cleaned, 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn sweep_racing_cleanup_never_reopens_a_cleaned_report() {
    let h = harness().await;
    let a = user();
    let id = h.report_at(&user(), PLEBISCITO, Category::Trash).await;
    h.engine.claim_report(&a, id).await.unwrap();
    h.clock.advance(chrono::Duration::hours(80));
    let photo = h.after_photo();

    let sweeper = {
        let engine = h.engine.clone();
        tokio::spawn(async move { engine.sweep_expired_claims().await.unwrap() })
    };
    let cleanup = {
        let engine = h.engine.clone();
        let actor = a;
        tokio::spawn(async move {
            engine
                .submit_cleanup(&actor, id, &photo, PLEBISCITO)
                .await
        })
    };
    let stats = sweeper.await.unwrap();
    let cleaned = cleanup.await.unwrap();

    let report = h.engine.get_report(id).await.unwrap();
    assert!(report.check_invariants().is_ok());
    match report.status {
        ReportStatus::Cleaned => {
            assert_eq!(stats.released, 0);
            assert!(cleaned.unwrap());
            assert_eq!(h.ledger.events().len(), 1);
        }
        ReportStatus::Open => {
            assert_eq!(stats.released, 1);
            assert!(h.ledger.events().is_empty());
        }
        other => panic!("unexpected status {other}"),
    }
}
