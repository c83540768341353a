//! Rate limiting logic and state management.

mod cache;
mod gatekeeper;
mod stats;
mod window;

pub use cache::{CacheEntry, StatsCache};
pub use gatekeeper::{Decision, DenyReason, RateLimitGatekeeper};
pub use stats::StatsSnapshot;
