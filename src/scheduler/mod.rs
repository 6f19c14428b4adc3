/// Recurring sweep trigger.
///
/// The closer itself is idempotent and conflict-safe, so the scheduler is
/// a plain interval loop: a slow sweep overlapping the next tick, or a
/// second service instance sweeping the same auctions, resolves through the
/// store's conditional writes.
// region:    --- Imports
use chrono::Utc;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::interval;
use tracing::{debug, error, info};

use crate::cache::CacheInvalidator;
use crate::closer;
use crate::store::EntityStore;
// endregion: --- Imports

// region:    --- Sweep Scheduler

pub struct SweepScheduler {
    store: Arc<dyn EntityStore>,
    cache: Arc<dyn CacheInvalidator>,
    period: Duration,
}

impl SweepScheduler {
    pub fn new(
        store: Arc<dyn EntityStore>,
        cache: Arc<dyn CacheInvalidator>,
        period: Duration,
    ) -> Self {
        Self {
            store,
            cache,
            period,
        }
    }

    /// Spawn the sweep loop. Errors are logged and the loop continues; a
    /// failed sweep is simply retried on the next tick.
    pub fn start(&self) {
        let store = Arc::clone(&self.store);
        let cache = Arc::clone(&self.cache);
        let period = self.period;
        tokio::spawn(async move {
            let mut ticker = interval(period);
            loop {
                ticker.tick().await;
                match closer::sweep(store.as_ref(), Utc::now()).await {
                    Ok(outcomes) if !outcomes.is_empty() => {
                        info!(
                            "{:<12} --> sweep closed {} auction(s)",
                            "Scheduler",
                            outcomes.len()
                        );
                        cache.invalidate_listings().await;
                    }
                    Ok(_) => debug!("{:<12} --> sweep found nothing to close", "Scheduler"),
                    Err(e) => error!("{:<12} --> sweep failed: {}", "Scheduler", e),
                }
            }
        });
    }
}

// endregion: --- Sweep Scheduler
