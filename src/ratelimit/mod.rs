//! Sliding-window rate limiting and idle-client reclamation.

mod client;
mod clock;
mod limiter;
mod reclaimer;
mod request_log;

pub use client::ClientKey;
pub use clock::{Clock, SystemClock};
pub use limiter::{RateLimitDecision, SlidingWindowLimiter};
pub use reclaimer::ReclaimerState;
pub use request_log::RequestLog;
