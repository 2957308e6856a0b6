//! Turnstile - HTTP Admission Control
//!
//! This crate decides, per client and per endpoint, whether an incoming HTTP
//! request may proceed or must be rejected because the client exceeded its
//! configured request rate. Counting uses absolute-time-aligned fixed
//! windows held in an in-process concurrent store.

pub mod config;
pub mod error;
pub mod http;
pub mod ratelimit;
