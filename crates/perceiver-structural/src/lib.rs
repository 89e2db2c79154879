//! Interactable-DOM snapshots.
//!
//! [`walker`] descends the live document through the [`cdp_adapter::Cdp`]
//! surface, [`judges`] decides which elements a user could act on, and
//! [`indexer`] numbers those in document order into an immutable
//! [`Snapshot`]. [`render`] turns a snapshot into prompt text.

pub mod api;
pub mod errors;
pub mod indexer;
pub mod judges;
pub mod metrics;
pub mod model;
pub mod policy;
pub mod render;
pub mod structural;
pub mod walker;

pub use api::StructuralPerceiver;
pub use errors::PerceiverError;
pub use model::{
    Check, FrameKey, InteractableNode, LabelSource, Node, NodeId, NodeKind, OpaqueReason,
    Snapshot, Verdict, WalkStats,
};
pub use policy::SnapshotConfig;
pub use structural::StructuralPerceiverImpl;
