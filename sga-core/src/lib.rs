#![warn(missing_docs)]
//! Core domain for the star gift auction system.
//!
//! Buyers lock virtual currency ("stars") by placing monotonically
//! non-decreasing bids during a time-boxed round; when the round closes the
//! top bidders win a fixed number of fungible gifts, their locked stars are
//! consumed and every other lock is released. An auction may chain several
//! rounds with distinct durations and prize vectors.

/// Core domain models for the auction system.
///
/// These are primarily data structures with minimal business logic. The
/// exceptions are the pieces of pure arithmetic the whole system leans on:
/// the composite ranking score, idempotency-key validation and the
/// deterministic operation ids used for crash-safe settlement.
pub mod models;

/// Interface traits for the auction system.
///
/// These traits are the "ports" in the hexagonal architecture pattern. They
/// define the contract between the domain logic and external adapters (the
/// durable store, the job queue) without specifying implementation details,
/// which keeps the settlement and coordination code testable against any
/// backend.
pub mod ports;
