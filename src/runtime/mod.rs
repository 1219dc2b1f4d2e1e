//! Single-writer tracker runtime, polling, and completion waits.

/// Event stream types emitted by the tracker.
pub mod events;
/// Handle and command loop implementation.
pub mod handle;
/// Awaitable completion of one or many operations.
pub mod waiter;
