use std::sync::Arc;

use sqlx::SqlitePool;
use tokio::sync::RwLock;
use tracing::{info, warn};

use crate::config::Config;
use crate::prefs::PrefStore;
use crate::providers::oba::ObaClient;
use crate::regions::Region;
use crate::store::{load_regions, RegionCache};

/// In-memory snapshot of the current region list, shared with the API.
pub type RegionSnapshot = Arc<RwLock<Vec<Region>>>;

/// Manages the region cache and its periodic refresh from the regions
/// directory server.
pub struct SyncManager {
    cache: RegionCache,
    prefs: PrefStore,
    client: Arc<ObaClient>,
    regions_url: String,
    refresh_hours: u64,
    regions: RegionSnapshot,
}

impl SyncManager {
    pub fn new(
        pool: SqlitePool,
        client: Arc<ObaClient>,
        config: &Config,
    ) -> Self {
        SyncManager {
            cache: RegionCache::new(pool.clone()),
            prefs: PrefStore::new(pool),
            client,
            regions_url: config.regions_url.clone(),
            refresh_hours: config.region_refresh_hours,
            regions: Arc::new(RwLock::new(Vec::new())),
        }
    }

    /// Get a reference to the region snapshot for API access.
    pub fn region_snapshot(&self) -> RegionSnapshot {
        self.regions.clone()
    }

    pub async fn init_schema(&self) -> Result<(), sqlx::Error> {
        self.cache.init_schema().await?;
        self.prefs.init_schema().await
    }

    /// Start the region refresh loop. The initial load prefers the cache;
    /// the periodic reload forces a server round-trip so stale region
    /// metadata eventually heals.
    pub async fn start(self: Arc<Self>) {
        info!("Starting region sync");

        self.refresh_regions(false).await;

        let mut interval =
            tokio::time::interval(tokio::time::Duration::from_secs(self.refresh_hours * 60 * 60));
        // Skip the first tick which fires immediately (we already loaded above)
        interval.tick().await;

        loop {
            interval.tick().await;
            self.refresh_regions(true).await;
        }
    }

    /// Run the fail-over loading chain and publish the result.
    pub async fn refresh_regions(&self, force_reload: bool) {
        let experimental_opt_in = match self.prefs.load().await {
            Ok(prefs) => prefs.experimental_regions,
            Err(e) => {
                warn!(error = %e, "Failed to load preferences, assuming defaults");
                false
            }
        };

        let regions = load_regions(
            &self.cache,
            &self.client,
            &self.regions_url,
            force_reload,
            experimental_opt_in,
        )
        .await;

        if regions.is_empty() {
            // Keep whatever snapshot we had; an empty refresh must not
            // wipe a working region list.
            warn!("Region refresh produced no regions, keeping previous snapshot");
            return;
        }

        let count = regions.len();
        let mut snapshot = self.regions.write().await;
        *snapshot = regions;
        drop(snapshot);

        info!(count, force_reload, "Published region snapshot");
    }
}
