use std::sync::Arc;

use anyhow::{Context, Result};
use axum::http::{header, HeaderValue};
use tower_http::compression::CompressionLayer;
use tower_http::set_header::SetResponseHeaderLayer;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use napulita_api::{router, AppState, QueryGateway};
use napulita_common::{Config, GeoIndexKind};
use napulita_engine::{
    spawn_claim_sweeper, AcceptingPhotoStore, HttpPhotoStore, LifecycleEngine, PhotoStore,
};
use napulita_geo::{GeoIndex, GeohashIndex};
use napulita_scoring::{
    spawn_score_refresher, CategoryMultiplierPolicy, MemoryScoreLedger, PgScoreLedger,
    ScoreLedger, Scoring,
};
use napulita_store::{MemoryReportStore, PgReportStore, ReportStore};

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("napulita=info".parse()?))
        .init();

    let config = Config::from_env()?;
    config.log_redacted();

    // Storage: Postgres when configured, otherwise in-memory
    let (store, index, ledger): (
        Arc<dyn ReportStore>,
        Arc<dyn GeoIndex>,
        Arc<dyn ScoreLedger>,
    ) = match &config.database_url {
        Some(url) => {
            let pg = PgReportStore::connect(url)
                .await
                .context("Failed to connect to Postgres")?;
            pg.migrate().await.context("Failed to run migrations")?;
            let ledger = Arc::new(PgScoreLedger::new(pg.pool().clone()));
            let pg = Arc::new(pg);
            let index: Arc<dyn GeoIndex> = match config.geo_index {
                GeoIndexKind::Sql => pg.clone(),
                GeoIndexKind::Geohash => {
                    let grid = GeohashIndex::from_entries(pg.index_entries().await?);
                    info!(reports = grid.len(), "Geo index rebuilt");
                    Arc::new(grid)
                }
            };
            (pg, index, ledger)
        }
        None => {
            warn!("DATABASE_URL not set, reports will not survive a restart");
            (
                Arc::new(MemoryReportStore::new()),
                Arc::new(GeohashIndex::new()),
                Arc::new(MemoryScoreLedger::new()),
            )
        }
    };

    let photos: Arc<dyn PhotoStore> = match &config.photo_base_url {
        Some(base) => Arc::new(HttpPhotoStore::new(base.clone(), config.engine.photo_timeout)?),
        None => Arc::new(AcceptingPhotoStore::new(None)),
    };

    let policy = Arc::new(CategoryMultiplierPolicy::new(
        config.points_policy_version.clone(),
        config.points_base,
        config.points_multipliers.clone(),
    ));
    let scoring = Arc::new(Scoring::load(ledger, policy).await?);
    // Other instances append to the same ledger
    let _refresher = config
        .database_url
        .is_some()
        .then(|| spawn_score_refresher(scoring.clone(), config.score_refresh_interval));

    let engine = Arc::new(LifecycleEngine::new(
        store,
        index,
        photos,
        scoring,
        config.engine.clone(),
    ));
    let _sweeper = spawn_claim_sweeper(engine.clone(), config.sweep_interval);

    let state = Arc::new(AppState {
        gateway: QueryGateway::new(engine),
    });

    let app = router(state)
        .layer(
            tower_http::cors::CorsLayer::new()
                .allow_origin(tower_http::cors::Any)
                .allow_methods(tower_http::cors::Any)
                .allow_headers(tower_http::cors::Any),
        )
        .layer(SetResponseHeaderLayer::overriding(
            header::CACHE_CONTROL,
            HeaderValue::from_static("no-store"),
        ))
        .layer(CompressionLayer::new())
        // Method + path + status + latency only
        .layer(
            tower_http::trace::TraceLayer::new_for_http().make_span_with(
                |request: &axum::http::Request<_>| {
                    tracing::info_span!(
                        "http_request",
                        method = %request.method(),
                        path = %request.uri().path(),
                    )
                },
            ),
        );

    let addr = format!("{}:{}", config.web_host, config.web_port);
    info!("Napulita API starting on {addr}");

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
