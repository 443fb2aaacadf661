//! Delta distribution engine.
//!
//! Keeps, per client scope, a full snapshot of feature and segment
//! definitions plus a bounded log of the recent events folded into it:
//!
//! - **Snapshot**: served to clients that are new or have fallen too far
//!   behind ([`HydrationEvent`])
//! - **Event log**: replayed to clients whose last seen id is still retained
//!   ([`DeltaEvent`])
//!
//! ## Configuration
//!
//! The retention bound is set in `flagsync.toml`:
//!
//! ```toml
//! [delta]
//! max_length = 20
//! ```

mod cache;
mod config;
mod events;
mod keys;
mod lock;
mod query;
mod registry;
mod source;

pub use cache::{DeltaCache, DeltaState};
pub use config::DeltaConfig;
pub use events::{DeltaEvent, EventId, HydrationEvent};
pub use keys::{ALL_PROJECTS, DEFAULT_ENVIRONMENT, ScopeKey};
pub use query::{ClientEvent, DeltaResponse, SyncOutcome, filter_events, filter_hydration, resolve};
pub use registry::DeltaRegistry;
pub use source::{HydrationSource, SourceError, StateFile, StateStore};
