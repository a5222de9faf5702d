pub mod classify;
pub mod config;
pub mod constants;
pub mod creative;
pub mod db;
pub mod facebook;
pub mod metrics;
pub mod models;
pub mod provisioning;
pub mod store;
pub mod targeting;
pub mod telemetry;

pub use classify::{classify, ProvisionError};
pub use facebook::{FacebookAPI, FacebookApiError, GraphApi};
pub use metrics::{MetricsReconciler, ReconcileOutcome, SkipReason};
pub use provisioning::{AdProvisioner, PublishRequest};
pub use store::AdStore;
