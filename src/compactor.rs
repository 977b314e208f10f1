use std::sync::Arc;
use std::time::Duration;

use tracing::info;

use crate::engine::Engine;

/// Default append count that triggers a WAL rewrite.
pub const DEFAULT_COMPACT_THRESHOLD: u64 = 10_000;

/// Background task that rewrites the WAL once enough appends have piled
/// up since the last compaction.
pub async fn run_compactor(engine: Arc<Engine>, threshold: u64) {
    let mut interval = tokio::time::interval(Duration::from_secs(60));
    loop {
        interval.tick().await;
        let appends = engine.appends_since_compact().await;
        if appends < threshold {
            continue;
        }
        match engine.compact_wal().await {
            Ok(()) => info!(appends, "compactor rewrote WAL"),
            Err(e) => tracing::warn!(error = %e, "compaction failed, will retry"),
        }
    }
}
