//! Domain types for the indexing pipeline.
//!
//! - [`primitives`] - Heights and failure reasons
//! - [`block`] - Enqueue jobs, raw bundles and canonical block records
//! - [`tx`] - Transaction batches and message wrappers
//! - [`events`] - Block lifecycle event batches and wrappers

pub mod block;
pub mod events;
pub mod primitives;
pub mod tx;

pub use block::{BlockRecord, EnqueueJob, RawBundle};
pub use events::{EventBatch, EventWrapper, LifecyclePosition};
pub use primitives::{FailureReason, Height};
pub use tx::{MessageWrapper, TxBatch, TxWrapper};
