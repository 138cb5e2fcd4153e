//! Redis-backed shared state.
//!
//! Two concerns live here, both built on per-key TTLs and atomic
//! primitives: the session store (the authoritative session → container
//! map) and the per-principal rate limiter.

pub mod rate;
pub mod session;

pub use rate::RateLimiter;
pub use session::{SessionRecord, SessionStore};
