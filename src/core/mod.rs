//! In-memory operation store and index helpers.

/// Helper index aliases.
pub mod indices;
/// Flat operation store fed by backend fetches.
pub mod store;
