//! Gatehouse - Client-Side Rate Limit Gatekeeper
//!
//! This crate decides, for a given API key and service name, whether an
//! incoming request should be allowed. It fetches per-key usage statistics
//! from a remote rate limit authority, caches them with a server-specified
//! expiry, and evaluates a 60-second sliding window plus a daily quota
//! against them. Request events observed locally are reported back to the
//! authority and folded into the cached statistics so evaluation stays
//! accurate between refreshes. Each process holds its own independent
//! cache; nothing is persisted or shared.

pub mod config;
pub mod error;
pub mod ratelimit;
pub mod remote;
