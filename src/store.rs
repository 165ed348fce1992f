//! Region cache and the fail-over loading chain.
//!
//! Region metadata is cached in sqlite and superseded wholesale on each
//! successful refresh. Loading prefers the cache, then the regions REST
//! API, then a regions file compiled into the binary. The bundled file is
//! a last resort so a fresh install still works while the regions
//! directory is unreachable; the regional servers themselves may be fine.

use sqlx::{Sqlite, SqlitePool, Transaction};
use tracing::{debug, info, warn};

use crate::providers::oba::{parse_regions_document, ObaClient};
use crate::regions::{Region, RegionBounds};

/// Regions directory document compiled into the binary.
const BUNDLED_REGIONS: &str = include_str!("../data/regions.json");

#[derive(Clone)]
pub struct RegionCache {
    pool: SqlitePool,
}

#[derive(Debug, sqlx::FromRow)]
struct RegionRow {
    id: i64,
    name: String,
    api_base_url: String,
    active: i64,
    supports_discovery: i64,
    supports_realtime: i64,
    experimental: i64,
}

impl RegionCache {
    pub fn new(pool: SqlitePool) -> Self {
        RegionCache { pool }
    }

    pub async fn init_schema(&self) -> Result<(), sqlx::Error> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS regions (
                id INTEGER PRIMARY KEY,
                name TEXT NOT NULL,
                api_base_url TEXT NOT NULL,
                active INTEGER NOT NULL,
                supports_discovery INTEGER NOT NULL,
                supports_realtime INTEGER NOT NULL,
                experimental INTEGER NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS region_bounds (
                region_id INTEGER NOT NULL REFERENCES regions(id) ON DELETE CASCADE,
                lat REAL NOT NULL,
                lon REAL NOT NULL,
                lat_span REAL NOT NULL,
                lon_span REAL NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Loads every cached region with its bounds. An empty result means
    /// the cache was never populated.
    pub async fn load(&self) -> Result<Vec<Region>, sqlx::Error> {
        let rows: Vec<RegionRow> = sqlx::query_as(
            r#"
            SELECT id, name, api_base_url, active,
                   supports_discovery, supports_realtime, experimental
            FROM regions
            ORDER BY id
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        let bounds_rows: Vec<(i64, f64, f64, f64, f64)> = sqlx::query_as(
            "SELECT region_id, lat, lon, lat_span, lon_span FROM region_bounds",
        )
        .fetch_all(&self.pool)
        .await?;

        let mut regions: Vec<Region> = rows
            .into_iter()
            .map(|r| Region {
                id: r.id,
                name: r.name,
                api_base_url: r.api_base_url,
                bounds: Vec::new(),
                active: r.active != 0,
                supports_discovery: r.supports_discovery != 0,
                supports_realtime: r.supports_realtime != 0,
                experimental: r.experimental != 0,
            })
            .collect();

        for (region_id, lat, lon, lat_span, lon_span) in bounds_rows {
            if let Some(region) = regions.iter_mut().find(|r| r.id == region_id) {
                region.bounds.push(RegionBounds {
                    lat,
                    lon,
                    lat_span,
                    lon_span,
                });
            }
        }

        Ok(regions)
    }

    /// Replaces the entire cache with the given regions in one
    /// transaction. Regions that are not usable are not worth caching and
    /// are skipped, matching what the selection logic would drop anyway.
    pub async fn replace(
        &self,
        regions: &[Region],
        experimental_opt_in: bool,
    ) -> Result<(), sqlx::Error> {
        let mut tx = self.pool.begin().await?;

        sqlx::query("DELETE FROM region_bounds")
            .execute(&mut *tx)
            .await?;
        sqlx::query("DELETE FROM regions").execute(&mut *tx).await?;

        for region in regions {
            if !region.is_usable(experimental_opt_in) {
                debug!(region = %region.name, "Skipping cache insert of unusable region");
                continue;
            }
            Self::insert_region(&mut tx, region).await?;
            debug!(region = %region.name, "Cached region");
        }

        tx.commit().await
    }

    async fn insert_region(
        tx: &mut Transaction<'_, Sqlite>,
        region: &Region,
    ) -> Result<(), sqlx::Error> {
        sqlx::query(
            r#"
            INSERT INTO regions
                (id, name, api_base_url, active,
                 supports_discovery, supports_realtime, experimental)
            VALUES (?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(region.id)
        .bind(&region.name)
        .bind(&region.api_base_url)
        .bind(region.active as i64)
        .bind(region.supports_discovery as i64)
        .bind(region.supports_realtime as i64)
        .bind(region.experimental as i64)
        .execute(&mut **tx)
        .await?;

        for b in &region.bounds {
            sqlx::query(
                r#"
                INSERT INTO region_bounds (region_id, lat, lon, lat_span, lon_span)
                VALUES (?, ?, ?, ?, ?)
                "#,
            )
            .bind(region.id)
            .bind(b.lat)
            .bind(b.lon)
            .bind(b.lat_span)
            .bind(b.lon_span)
            .execute(&mut **tx)
            .await?;
        }

        Ok(())
    }
}

/// Regions from the file compiled into the binary.
pub fn bundled_regions() -> Vec<Region> {
    match parse_regions_document(BUNDLED_REGIONS) {
        Ok(regions) => regions,
        Err(e) => {
            // The file ships with the binary, so this only happens when a
            // bad file made it through the build.
            warn!(error = %e, "Bundled regions file failed to parse");
            Vec::new()
        }
    }
}

/// Loads regions with fail-over: cache, then server, then the bundled
/// file. `force_reload` asks the server first and falls back to the cache
/// afterwards. Fresh server or bundled data is persisted to the cache.
/// Returns an empty list only when every source failed.
pub async fn load_regions(
    cache: &RegionCache,
    client: &ObaClient,
    regions_url: &str,
    force_reload: bool,
    experimental_opt_in: bool,
) -> Vec<Region> {
    if !force_reload {
        match cache.load().await {
            Ok(cached) if !cached.is_empty() => {
                info!(count = cached.len(), "Retrieved regions from cache");
                return cached;
            }
            Ok(_) => debug!("Region cache is empty"),
            Err(e) => warn!(error = %e, "Failed to read region cache"),
        }
    }

    let from_server = match client.fetch_regions(regions_url).await {
        Ok(regions) if !regions.is_empty() => Some(regions),
        Ok(_) => {
            warn!("Regions list retrieved from server was empty");
            None
        }
        Err(e) => {
            warn!(error = %e, "Failed to fetch regions from server");
            None
        }
    };

    let regions = match from_server {
        Some(regions) => regions,
        None => {
            if force_reload {
                // The cache was not consulted yet on a forced reload.
                match cache.load().await {
                    Ok(cached) if !cached.is_empty() => {
                        info!(count = cached.len(), "Retrieved regions from cache");
                        return cached;
                    }
                    Ok(_) => debug!("Region cache is empty"),
                    Err(e) => warn!(error = %e, "Failed to read region cache"),
                }
            }

            let bundled = bundled_regions();
            if bundled.is_empty() {
                warn!("No region source available, regions list is empty");
                return Vec::new();
            }
            info!(count = bundled.len(), "Retrieved regions from bundled file");
            bundled
        }
    };

    if let Err(e) = cache.replace(&regions, experimental_opt_in).await {
        warn!(error = %e, "Failed to persist regions to cache");
    }
    regions
}

#[cfg(test)]
mod tests {
    use super::*;
    use sqlx::sqlite::SqlitePoolOptions;

    async fn cache() -> RegionCache {
        let pool = SqlitePoolOptions::new()
            .connect("sqlite::memory:")
            .await
            .unwrap();
        let cache = RegionCache::new(pool);
        cache.init_schema().await.unwrap();
        cache
    }

    fn region(id: i64, name: &str) -> Region {
        Region {
            id,
            name: name.to_string(),
            api_base_url: format!("https://api.example.org/{}", id),
            bounds: vec![RegionBounds {
                lat: 47.6,
                lon: -122.3,
                lat_span: 0.5,
                lon_span: 0.5,
            }],
            active: true,
            supports_discovery: true,
            supports_realtime: true,
            experimental: false,
        }
    }

    #[tokio::test]
    async fn test_replace_and_load_roundtrip() {
        let cache = cache().await;
        let regions = vec![region(1, "Puget Sound"), region(2, "Tampa Bay")];
        cache.replace(&regions, false).await.unwrap();

        let loaded = cache.load().await.unwrap();
        assert_eq!(loaded.len(), 2);
        assert_eq!(loaded[0].name, "Puget Sound");
        assert_eq!(loaded[0].bounds.len(), 1);
        assert!(loaded[1].active);
    }

    #[tokio::test]
    async fn test_replace_skips_unusable_regions() {
        let cache = cache().await;
        let mut inactive = region(1, "Inactive");
        inactive.active = false;
        let mut experimental = region(2, "Beta");
        experimental.experimental = true;

        cache
            .replace(&[inactive, experimental, region(3, "Good")], false)
            .await
            .unwrap();

        let loaded = cache.load().await.unwrap();
        assert_eq!(loaded.len(), 1);
        assert_eq!(loaded[0].name, "Good");
    }

    #[tokio::test]
    async fn test_replace_supersedes_wholesale() {
        let cache = cache().await;
        cache
            .replace(&[region(1, "Old"), region(2, "Older")], false)
            .await
            .unwrap();
        cache.replace(&[region(3, "New")], false).await.unwrap();

        let loaded = cache.load().await.unwrap();
        assert_eq!(loaded.len(), 1);
        assert_eq!(loaded[0].name, "New");
    }

    // Nothing listens on port 1, so every fetch fails fast.
    fn dead_client() -> ObaClient {
        ObaClient::new("TEST".to_string()).unwrap()
    }

    const DEAD_URL: &str = "http://127.0.0.1:1/regions-v3.json";

    #[tokio::test]
    async fn test_load_regions_prefers_cache_over_server() {
        let cache = cache().await;
        cache.replace(&[region(1, "Cached")], false).await.unwrap();

        // The server is unreachable, but the cache satisfies the load
        // without a round-trip.
        let regions = load_regions(&cache, &dead_client(), DEAD_URL, false, false).await;
        assert_eq!(regions.len(), 1);
        assert_eq!(regions[0].name, "Cached");
    }

    #[tokio::test]
    async fn test_load_regions_force_reload_falls_back_to_cache() {
        let cache = cache().await;
        cache.replace(&[region(1, "Cached")], false).await.unwrap();

        let regions = load_regions(&cache, &dead_client(), DEAD_URL, true, false).await;
        assert_eq!(regions.len(), 1);
        assert_eq!(regions[0].name, "Cached");
    }

    #[tokio::test]
    async fn test_load_regions_bundled_fallback_is_persisted() {
        let cache = cache().await;

        let regions = load_regions(&cache, &dead_client(), DEAD_URL, false, false).await;
        let bundled = bundled_regions();
        assert!(!regions.is_empty());
        assert_eq!(regions.len(), bundled.len());
        assert_eq!(regions[0].name, bundled[0].name);

        // The fallback result lands in the cache for the next load.
        let cached = cache.load().await.unwrap();
        assert_eq!(cached.len(), bundled.len());
    }

    #[test]
    fn test_bundled_regions_parse() {
        let regions = bundled_regions();
        assert!(!regions.is_empty());
        // Every bundled region must be usable out of the box.
        assert!(regions.iter().all(|r| r.is_usable(false)));
        assert!(regions.iter().all(|r| !r.bounds.is_empty()));
    }
}
