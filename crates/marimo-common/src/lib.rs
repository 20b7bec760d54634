//! Common types for the marimo operator: CRDs, errors, and configuration

#![deny(missing_docs)]

pub mod config;
pub mod crd;
pub mod error;

pub use config::OperatorConfig;
pub use error::Error;

/// Field manager / reporting component name used for API writes
pub const FIELD_MANAGER: &str = "marimo-operator";

/// Label key for the application name
pub const LABEL_NAME: &str = "app.kubernetes.io/name";

/// Label key for the owning notebook instance
pub const LABEL_INSTANCE: &str = "app.kubernetes.io/instance";

/// Label key for the managing controller
pub const LABEL_MANAGED_BY: &str = "app.kubernetes.io/managed-by";

/// Value of [`LABEL_NAME`] on every managed object
pub const LABEL_NAME_MARIMO: &str = "marimo";

/// Value of [`LABEL_MANAGED_BY`] on every managed object
pub const LABEL_MANAGED_BY_OPERATOR: &str = "marimo-operator";
