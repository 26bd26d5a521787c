//! Air-quality telemetry reconciliation engine.
//!
//! Pulls the latest reading for each configured monitoring device from a
//! remote telemetry API and reconciles it into a per-device record in a
//! partitioned key-value store. One reconciler invocation per device
//! identifier, fanned out concurrently, with exactly one store write per
//! invocation on every path that gets past the network fetch.

pub mod agent;
pub mod config;
pub mod directory;
pub mod feed;
pub mod reconciler;
pub mod store;
pub mod sync;
pub mod telemetry;
