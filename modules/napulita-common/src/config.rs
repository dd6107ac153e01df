use std::env;
use std::time::Duration;

use anyhow::{Context, Result};

use crate::geo::BoundingBox;
use crate::types::Category;

/// Default service region: the Naples metropolitan area.
pub const DEFAULT_SERVICE_REGION: &str = "13.9,40.6,14.6,41.1";

/// Application configuration loaded from environment variables.
#[derive(Debug, Clone)]
pub struct Config {
    // Database
    pub database_url: Option<String>,
    pub geo_index: GeoIndexKind,

    // Web server
    pub web_host: String,
    pub web_port: u16,

    // Photo storage
    pub photo_base_url: Option<String>,

    // Lifecycle policy
    pub engine: EngineConfig,
    pub sweep_interval: Duration,

    // Point policy
    pub score_refresh_interval: Duration,
    pub points_base: i64,
    pub points_multipliers: Vec<(Category, f64)>,
    pub points_policy_version: String,
}

/// Which structure answers box queries when Postgres is configured.
/// Without a database the in-memory geohash grid is always used.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GeoIndexKind {
    /// Range scan on the reports table. Every instance sees every write.
    Sql,
    /// Geohash grid rebuilt from the store at startup. Single instance only.
    Geohash,
}

impl std::str::FromStr for GeoIndexKind {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim() {
            "sql" => Ok(Self::Sql),
            "geohash" => Ok(Self::Geohash),
            other => anyhow::bail!("GEO_INDEX must be sql or geohash, got {other}"),
        }
    }
}

/// Policy knobs the lifecycle engine needs.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    pub service_region: BoundingBox,
    pub cleanup_radius_meters: f64,
    pub claim_ttl: chrono::Duration,
    pub photo_timeout: Duration,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            service_region: BoundingBox {
                min_lon: 13.9,
                min_lat: 40.6,
                max_lon: 14.6,
                max_lat: 41.1,
            },
            cleanup_radius_meters: 100.0,
            claim_ttl: chrono::Duration::hours(72),
            photo_timeout: Duration::from_millis(3000),
        }
    }
}

impl Config {
    /// Load configuration from environment variables (and `.env` if present).
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok();

        let service_region: BoundingBox = env::var("SERVICE_REGION")
            .unwrap_or_else(|_| DEFAULT_SERVICE_REGION.to_string())
            .parse()
            .context("SERVICE_REGION must be minLon,minLat,maxLon,maxLat")?;

        let claim_ttl_hours: i64 = parse_env("CLAIM_TTL_HOURS", 72)?;
        let photo_timeout_ms: u64 = parse_env("PHOTO_TIMEOUT_MS", 3000)?;

        Ok(Self {
            database_url: env::var("DATABASE_URL").ok().filter(|s| !s.is_empty()),
            geo_index: parse_env("GEO_INDEX", GeoIndexKind::Sql)?,
            web_host: env::var("WEB_HOST").unwrap_or_else(|_| "0.0.0.0".to_string()),
            web_port: parse_env("WEB_PORT", 3000)?,
            photo_base_url: env::var("PHOTO_BASE_URL").ok().filter(|s| !s.is_empty()),
            engine: EngineConfig {
                service_region,
                cleanup_radius_meters: parse_env("CLEANUP_RADIUS_METERS", 100.0)?,
                claim_ttl: chrono::Duration::hours(claim_ttl_hours),
                photo_timeout: Duration::from_millis(photo_timeout_ms),
            },
            sweep_interval: Duration::from_secs(parse_env("SWEEP_INTERVAL_SECS", 300)?),
            score_refresh_interval: Duration::from_secs(parse_env("SCORE_REFRESH_SECS", 10)?),
            points_base: parse_env("POINTS_BASE", 10)?,
            points_multipliers: parse_multipliers(
                &env::var("POINTS_MULTIPLIERS")
                    .unwrap_or_else(|_| "bulky_item=2.0,overflowing_bin=1.5".to_string()),
            )?,
            points_policy_version: env::var("POINTS_POLICY_VERSION")
                .unwrap_or_else(|_| "v1".to_string()),
        })
    }

    pub fn log_redacted(&self) {
        let db = match &self.database_url {
            Some(url) => redact_url(url),
            None => "<not set, using in-memory store>".to_string(),
        };
        let region = &self.engine.service_region;
        tracing::info!("Config loaded:");
        tracing::info!("  DATABASE_URL: {db}");
        tracing::info!("  GEO_INDEX: {:?}", self.geo_index);
        tracing::info!("  WEB: {}:{}", self.web_host, self.web_port);
        tracing::info!(
            "  PHOTO_BASE_URL: {}",
            self.photo_base_url.as_deref().unwrap_or("<not set>")
        );
        tracing::info!(
            "  SERVICE_REGION: {},{},{},{}",
            region.min_lon,
            region.min_lat,
            region.max_lon,
            region.max_lat
        );
        tracing::info!(
            "  CLEANUP_RADIUS_METERS: {}",
            self.engine.cleanup_radius_meters
        );
        tracing::info!("  CLAIM_TTL_HOURS: {}", self.engine.claim_ttl.num_hours());
        tracing::info!(
            "  POINTS: base={} policy={} refresh={}s",
            self.points_base,
            self.points_policy_version,
            self.score_refresh_interval.as_secs()
        );
    }
}

fn parse_env<T: std::str::FromStr>(key: &str, default: T) -> Result<T> {
    match env::var(key) {
        Ok(raw) if !raw.trim().is_empty() => raw
            .trim()
            .parse()
            .map_err(|_| anyhow::anyhow!("{key} has an invalid value: {raw}")),
        _ => Ok(default),
    }
}

/// Parses `category=multiplier` pairs separated by commas.
pub fn parse_multipliers(raw: &str) -> Result<Vec<(Category, f64)>> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(|pair| {
            let (cat, mult) = pair
                .split_once('=')
                .with_context(|| format!("multiplier entry '{pair}' must be category=value"))?;
            let category: Category = cat.parse()?;
            let multiplier: f64 = mult
                .trim()
                .parse()
                .with_context(|| format!("multiplier for {category} is not a number"))?;
            anyhow::ensure!(
                multiplier.is_finite() && multiplier >= 0.0,
                "multiplier for {category} must be non-negative"
            );
            Ok((category, multiplier))
        })
        .collect()
}

fn redact_url(url: &str) -> String {
    match (url.find("://"), url.rfind('@')) {
        (Some(scheme_end), Some(at)) if at > scheme_end => {
            format!("{}://***{}", &url[..scheme_end], &url[at..])
        }
        _ => url.to_string(),
    }
}
