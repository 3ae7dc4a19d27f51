//! Turnstile - Per-client Sliding-Window Admission Control
//!
//! This crate decides, for each incoming request, whether its client has
//! exceeded a fixed number of admissions within a trailing time window. State
//! lives in memory for a single process; a background reclaimer task evicts
//! clients whose history has aged out.
//!
//! ```no_run
//! use std::time::Duration;
//! use turnstile::ratelimit::SlidingWindowLimiter;
//!
//! # #[tokio::main]
//! # async fn main() -> turnstile::error::Result<()> {
//! let limiter = SlidingWindowLimiter::new(Duration::from_secs(1), 3)?;
//!
//! if !limiter.allow("203.0.113.9") {
//!     // respond with 429 Too Many Requests
//! }
//!
//! limiter.shutdown();
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod error;
pub mod ratelimit;
