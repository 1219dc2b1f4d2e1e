//! App lifecycle sequences and their observable flow state.

/// Retryable, observable execution of one action.
pub mod flow;
/// Flow states and guarded transitions.
pub mod machine;
/// Step sequences for install, sideload, update, uninstall and instance actions.
pub mod steps;
