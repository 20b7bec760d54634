//! marimo operator - reconciles MarimoNotebook resources into running notebooks
//!
//! - [`controller`]: the reconcile pass and its Kubernetes client abstraction
//! - [`controller_runner`]: controller wiring and watch configuration
//! - [`telemetry`]: logging setup

pub mod controller;
pub mod controller_runner;
pub mod telemetry;

pub use controller::{error_policy, reconcile, NotebookContext};
