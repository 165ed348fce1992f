pub mod arrivals;
pub mod error;
pub mod favorites;
pub mod preferences;
pub mod regions;

pub use error::{bad_request, internal_error, service_unavailable, upstream_error, ErrorResponse};

use std::sync::Arc;

use sqlx::SqlitePool;
use utoipa::OpenApi;

use crate::config::Config;
use crate::providers::oba::ObaClient;
use crate::sync::RegionSnapshot;

#[derive(Clone)]
pub struct AppState {
    pub pool: SqlitePool,
    pub regions: RegionSnapshot,
    pub client: Arc<ObaClient>,
    pub config: Arc<Config>,
}

#[derive(OpenApi)]
#[openapi(
    info(
        title = "busboard",
        description = "Rider information API: ranked arrival predictions and region selection"
    ),
    tags(
        (name = "arrivals", description = "Arrival predictions for stops"),
        (name = "regions", description = "Transit service regions"),
        (name = "preferences", description = "Rider preferences and favorites")
    )
)]
pub struct ApiDoc;
