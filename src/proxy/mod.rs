//! Offline caching proxy
//!
//! Every request from the application shell passes through `CacheProxy`, which
//! routes it to one of four strategies:
//!
//! - remote question/dictionary APIs: stale-while-revalidate bounded by a TTL
//! - other foreign origins: network first, falling back to the cached copy
//! - page navigations: network first, falling back to the cached root document
//! - the shell's own assets: cache first with a background refresh
//!
//! Non-GET requests bypass the caches. Background refreshes are detached
//! tasks; `CacheProxy::flush` waits for them.

mod classify;
mod clock;
mod fetcher;
mod message;
mod worker;

pub use classify::{Classifier, Strategy};
pub use clock::{Clock, ManualClock, SystemClock};
pub use fetcher::{FetchError, Fetcher, HttpFetcher};
pub use message::{ControlMessage, PrewarmReport};
pub use worker::{CacheProxy, Lifecycle, MessageOutcome, ProxyError, WorkerState};
