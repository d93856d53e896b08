//! EventSub webhook intake: wire types, replay suppression, keyword
//! filtering, upstream lookups and the stream lifecycle.

pub mod dedup;
pub mod filters;
pub mod tracker;
pub mod types;
pub mod upstream;


pub use dedup::{DebounceDecision, Debouncer, DedupLedger};
pub use filters::KeywordFilter;
pub use tracker::{OfflineOutcome, OnlineOutcome, StreamLifecycleTracker, TrackerError};
pub use types::{Envelope, MessageType, StreamOfflineEvent, StreamOnlineEvent};
pub use upstream::{HelixClient, StreamSource, UpstreamError, UpstreamStream};
