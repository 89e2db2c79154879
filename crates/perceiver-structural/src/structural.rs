use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;
use cdp_adapter::{Cdp, NodeRef, PageId};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::api::StructuralPerceiver;
use crate::errors::PerceiverError;
use crate::model::{Snapshot, Verdict};
use crate::policy::SnapshotConfig;
use crate::{indexer, judges, metrics, walker};

pub struct StructuralPerceiverImpl {
    cdp: Arc<dyn Cdp>,
}

impl StructuralPerceiverImpl {
    pub fn new(cdp: Arc<dyn Cdp>) -> Self {
        Self { cdp }
    }

    pub fn cdp(&self) -> &Arc<dyn Cdp> {
        &self.cdp
    }
}

#[async_trait]
impl StructuralPerceiver for StructuralPerceiverImpl {
    async fn build_snapshot(
        &self,
        page: PageId,
        cfg: &SnapshotConfig,
        cancel: &CancellationToken,
    ) -> Result<Snapshot, PerceiverError> {
        let started = Instant::now();
        let walk = match walker::walk(self.cdp.as_ref(), page, cfg, cancel).await {
            Ok(walk) => walk,
            Err(err) => {
                metrics::record_snapshot_failure();
                warn!(?err, %page, "snapshot aborted");
                return Err(err);
            }
        };

        let snapshot = indexer::assign(page, cfg, walk);
        let elapsed = started.elapsed();
        metrics::record_snapshot(snapshot.stats(), snapshot.len(), elapsed);

        let stats = snapshot.stats();
        info!(
            %page,
            snapshot_id = %snapshot.id(),
            url = %snapshot.url(),
            interactables = snapshot.len(),
            visited = stats.visited,
            detached = stats.detached,
            timed_out = stats.timed_out,
            opaque_frames = stats.opaque_frames,
            latency_ms = elapsed.as_millis() as u64,
            "snapshot built"
        );
        Ok(snapshot)
    }

    async fn recheck(&self, page: PageId, node: NodeRef, cfg: &SnapshotConfig) -> Verdict {
        let started = Instant::now();
        let verdict = judges::recheck(self.cdp.as_ref(), page, node, cfg).await;
        metrics::record_recheck(!verdict.interactable, started.elapsed());
        debug!(%page, %node, reason = %verdict.reason, "recheck");
        verdict
    }
}
