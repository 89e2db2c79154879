//! Index-addressed browser actions
//!
//! The agent names an element by its index in a [`perceiver_structural::Snapshot`];
//! this crate turns that into one input command:
//! - [`resolver`]: lookup, liveness re-check, payload validation, dispatch
//! - [`primitives`]: click, type, select, scroll, read, press-key
//! - [`guard`]: refuses the same action repeated too often in a row

pub mod errors;
pub mod guard;
pub mod metrics;
pub mod primitives;
pub mod resolver;
pub mod types;

pub use errors::*;
pub use guard::{Fingerprint, GuardDecision, RepeatGuard};
pub use primitives::{ActionPrimitives, DefaultActionPrimitives};
pub use resolver::{ActionResolver, DefaultActionResolver, Operation};
pub use types::*;
