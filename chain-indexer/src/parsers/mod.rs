//! Parser and filter registries: the pipeline's extension surface.
//!
//! Everything in this module is built before the pipeline starts and frozen
//! behind an `Arc`; the processor and committer read it without locking.
//!
//! # Extension points
//!
//! - [`MessageParser`] - custom per-message parsing keyed by type URL
//! - [`BlockEventParser`] - custom begin/end block-event parsing keyed by
//!   event type
//! - [`MessageTypeFilter`] - accept/reject predicates over message type URLs
//! - [`BlockEventFilter`] / rolling-window filters - event survival rules
//! - [`TxDecoder`] - the seam that turns raw node payloads into messages
//!
//! Registration happens through
//! [`PipelineBuilder`](crate::pipeline::PipelineBuilder), which enforces
//! identifier uniqueness and produces the immutable [`ParserRegistry`].

mod decode;
mod filter_file;
mod filters;
mod registry;
mod traits;

pub use decode::{DecodedTx, EventDerivedDecoder, TxDecoder};
pub use filter_file::{
    EventTypeFilterDef, FilterFile, MessageTypeFilterDef, RollingWindowFilterDef,
};
pub use filters::{
    BlockEventFilter, EventTypeFilter, RollingWindowFilter, StaticBlockEventFilterRegistry,
};
pub use registry::{ParserRegistry, ParserRegistryBuilder};
pub use traits::{BlockEventParser, MessageParser, MessageTypeAllowlist, MessageTypeFilter};
