use async_trait::async_trait;
use cdp_adapter::{NodeRef, PageId};
use tokio_util::sync::CancellationToken;

use crate::errors::PerceiverError;
use crate::model::{Snapshot, Verdict};
use crate::policy::SnapshotConfig;

#[async_trait]
pub trait StructuralPerceiver: Send + Sync {
    /// Walk, classify and index the page. A cancelled token yields
    /// [`PerceiverError::Cancelled`] and no snapshot.
    async fn build_snapshot(
        &self,
        page: PageId,
        cfg: &SnapshotConfig,
        cancel: &CancellationToken,
    ) -> Result<Snapshot, PerceiverError>;

    /// Narrowed liveness check for a node captured by an earlier snapshot.
    async fn recheck(&self, page: PageId, node: NodeRef, cfg: &SnapshotConfig) -> Verdict;
}
