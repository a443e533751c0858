use std::sync::Arc;
use std::time::Duration;

use moka::future::Cache;

use crate::error::{EngineError, Result};
use crate::model::Employee;
use crate::store::RosterSource;

/// Roster reads go through this moka cache so the merge path and the
/// notification fan-out do not hammer the profile store. Invalidated on date
/// change or explicit reload; entries also age out on their own.
pub struct RosterCache {
    source: Arc<dyn RosterSource>,
    cache: Cache<String, Arc<Vec<Employee>>>,
}

impl RosterCache {
    pub fn new(source: Arc<dyn RosterSource>, ttl: Duration) -> Self {
        let cache = Cache::builder()
            .max_capacity(64)
            .time_to_live(ttl)
            .build();

        Self { source, cache }
    }

    /// Pre-populates the active-roster entry so the first reconciliation does
    /// not pay the cold read.
    pub async fn warmup(&self) -> Result<()> {
        let roster = self.active().await?;
        tracing::info!(count = roster.len(), "Roster cache warmup complete");
        Ok(())
    }

    pub async fn active(&self) -> Result<Arc<Vec<Employee>>> {
        let source = Arc::clone(&self.source);
        self.cache
            .try_get_with("active".to_string(), async move {
                source.list_active().await.map(Arc::new)
            })
            .await
            .map_err(|e: Arc<EngineError>| EngineError::UpstreamUnavailable(e.to_string()))
    }

    pub async fn role(&self, role: &str) -> Result<Arc<Vec<Employee>>> {
        let source = Arc::clone(&self.source);
        let owned = role.to_string();
        self.cache
            .try_get_with(format!("role:{role}"), async move {
                source.list_role(&owned).await.map(Arc::new)
            })
            .await
            .map_err(|e: Arc<EngineError>| EngineError::UpstreamUnavailable(e.to_string()))
    }

    pub fn invalidate(&self) {
        self.cache.invalidate_all();
    }
}
