//! Persisted rider preferences and route+headsign favorites.
//!
//! A small key-value table backs the boolean preferences; favorites get
//! their own table because they are a set, not a scalar. Defaults apply
//! when a key was never written.

use std::collections::HashSet;

use serde::{Deserialize, Serialize};
use sqlx::SqlitePool;
use utoipa::ToSchema;

pub const KEY_SHOW_NEGATIVE_ARRIVALS: &str = "show_negative_arrivals";
pub const KEY_AUTO_SELECT_REGION: &str = "auto_select_region";
pub const KEY_EXPERIMENTAL_REGIONS: &str = "experimental_regions";

/// The boolean preferences as one bundle, for the preferences API.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct Preferences {
    /// Show arrivals that already departed ("-2 min").
    pub show_negative_arrivals: bool,
    /// Pick the closest region automatically from the device location.
    pub auto_select_region: bool,
    /// Opt in to experimental (beta) regions.
    pub experimental_regions: bool,
}

impl Default for Preferences {
    fn default() -> Self {
        Preferences {
            show_negative_arrivals: true,
            auto_select_region: true,
            experimental_regions: false,
        }
    }
}

/// Sqlite-backed preference store.
#[derive(Clone)]
pub struct PrefStore {
    pool: SqlitePool,
}

impl PrefStore {
    pub fn new(pool: SqlitePool) -> Self {
        PrefStore { pool }
    }

    pub async fn init_schema(&self) -> Result<(), sqlx::Error> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS preferences (
                key TEXT PRIMARY KEY,
                value INTEGER NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS route_favorites (
                route_id TEXT NOT NULL,
                headsign TEXT NOT NULL,
                PRIMARY KEY (route_id, headsign)
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    pub async fn get_bool(&self, key: &str, default: bool) -> Result<bool, sqlx::Error> {
        let row: Option<(i64,)> = sqlx::query_as("SELECT value FROM preferences WHERE key = ?")
            .bind(key)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.map(|(v,)| v != 0).unwrap_or(default))
    }

    pub async fn set_bool(&self, key: &str, value: bool) -> Result<(), sqlx::Error> {
        sqlx::query(
            r#"
            INSERT INTO preferences (key, value) VALUES (?, ?)
            ON CONFLICT(key) DO UPDATE SET value = excluded.value
            "#,
        )
        .bind(key)
        .bind(value as i64)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn load(&self) -> Result<Preferences, sqlx::Error> {
        let defaults = Preferences::default();
        Ok(Preferences {
            show_negative_arrivals: self
                .get_bool(KEY_SHOW_NEGATIVE_ARRIVALS, defaults.show_negative_arrivals)
                .await?,
            auto_select_region: self
                .get_bool(KEY_AUTO_SELECT_REGION, defaults.auto_select_region)
                .await?,
            experimental_regions: self
                .get_bool(KEY_EXPERIMENTAL_REGIONS, defaults.experimental_regions)
                .await?,
        })
    }

    pub async fn save(&self, prefs: &Preferences) -> Result<(), sqlx::Error> {
        self.set_bool(KEY_SHOW_NEGATIVE_ARRIVALS, prefs.show_negative_arrivals)
            .await?;
        self.set_bool(KEY_AUTO_SELECT_REGION, prefs.auto_select_region)
            .await?;
        self.set_bool(KEY_EXPERIMENTAL_REGIONS, prefs.experimental_regions)
            .await?;
        Ok(())
    }

    pub async fn add_favorite(&self, route_id: &str, headsign: &str) -> Result<(), sqlx::Error> {
        sqlx::query(
            "INSERT OR IGNORE INTO route_favorites (route_id, headsign) VALUES (?, ?)",
        )
        .bind(route_id)
        .bind(headsign)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn remove_favorite(
        &self,
        route_id: &str,
        headsign: &str,
    ) -> Result<(), sqlx::Error> {
        sqlx::query("DELETE FROM route_favorites WHERE route_id = ? AND headsign = ?")
            .bind(route_id)
            .bind(headsign)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    pub async fn list_favorites(&self) -> Result<Vec<(String, String)>, sqlx::Error> {
        sqlx::query_as(
            "SELECT route_id, headsign FROM route_favorites ORDER BY route_id, headsign",
        )
        .fetch_all(&self.pool)
        .await
    }

    /// Favorites as a set, for tagging arrivals.
    pub async fn favorite_set(&self) -> Result<HashSet<(String, String)>, sqlx::Error> {
        Ok(self.list_favorites().await?.into_iter().collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sqlx::sqlite::SqlitePoolOptions;

    async fn store() -> PrefStore {
        let pool = SqlitePoolOptions::new()
            .connect("sqlite::memory:")
            .await
            .unwrap();
        let store = PrefStore::new(pool);
        store.init_schema().await.unwrap();
        store
    }

    #[tokio::test]
    async fn test_defaults_apply_when_unset() {
        let store = store().await;
        let prefs = store.load().await.unwrap();
        assert!(prefs.show_negative_arrivals);
        assert!(prefs.auto_select_region);
        assert!(!prefs.experimental_regions);
    }

    #[tokio::test]
    async fn test_save_and_reload_roundtrip() {
        let store = store().await;
        let prefs = Preferences {
            show_negative_arrivals: false,
            auto_select_region: false,
            experimental_regions: true,
        };
        store.save(&prefs).await.unwrap();
        let loaded = store.load().await.unwrap();
        assert!(!loaded.show_negative_arrivals);
        assert!(!loaded.auto_select_region);
        assert!(loaded.experimental_regions);
    }

    #[tokio::test]
    async fn test_favorites_set() {
        let store = store().await;
        store.add_favorite("route-1", "Downtown").await.unwrap();
        store.add_favorite("route-1", "Downtown").await.unwrap();
        store.add_favorite("route-2", "Airport").await.unwrap();

        let favorites = store.favorite_set().await.unwrap();
        assert_eq!(favorites.len(), 2);
        assert!(favorites.contains(&("route-1".to_string(), "Downtown".to_string())));

        store.remove_favorite("route-1", "Downtown").await.unwrap();
        let favorites = store.favorite_set().await.unwrap();
        assert_eq!(favorites.len(), 1);
    }
}
