//! Tracking and orchestration of long-running device operations.
//!
//! The device executes installs, migrations and instance changes as
//! backend operations ("quests"). This crate mirrors them in a local
//! store, polls them while someone is interested, waits for completion,
//! and chains them into multi-step app lifecycle flows.
//!
//! # Examples
//!
//! Registering a reported operation tree with [`core::store::OperationStore`]:
//! ```
//! use questlog::{
//!     core::store::OperationStore,
//!     operation::OperationRecord,
//!     types::OperationStatus,
//! };
//!
//! let mut store = OperationStore::new();
//! store.register(
//!     OperationRecord::new(1, OperationStatus::Running, "Install app")
//!         .with_subquest(OperationRecord::new(2, OperationStatus::Successful, "Download")),
//! );
//! assert_eq!(store.children(1), &[2]);
//! assert_eq!(store.parent(2), Some(1));
//! ```
//!
//! Installing an app against a live device:
//! ```no_run
//! use std::sync::Arc;
//!
//! use questlog::{
//!     backend::http::HttpBackend,
//!     config::DeviceConfig,
//!     core::store::OperationStore,
//!     orchestrator::{flow::Flow, steps::{LifecycleAction, Orchestrator}},
//!     runtime::handle::{spawn_tracker, RuntimeConfig},
//!     types::AppKey,
//! };
//!
//! # #[tokio::main]
//! # async fn main() {
//! let backend = Arc::new(HttpBackend::new(&DeviceConfig::from_env().expect("config")).expect("client"));
//! let tracker = spawn_tracker(OperationStore::new(), backend.clone(), RuntimeConfig::default());
//! let flow = Flow::new(
//!     Orchestrator::new(backend, tracker.clone()),
//!     LifecycleAction::install(AppKey::new("org.mosquitto.broker", "2.0.18")),
//! );
//! let view = flow.run_to_end().await;
//! println!("{}", view.message);
//! tracker.shutdown().await.expect("shutdown");
//! # }
//! ```

/// Apps, instances and listing assembly.
pub mod app;
/// Device backend trait and its HTTP implementation.
pub mod backend;
/// Environment-driven device configuration.
pub mod config;
/// Operation store and index helpers.
pub mod core;
/// Operation records as reported by the device.
pub mod operation;
/// Lifecycle orchestration.
pub mod orchestrator;
/// Tracker runtime, polling and waits.
pub mod runtime;
/// Shared primitive types and enums.
pub mod types;
/// Version ordering.
pub mod version;
