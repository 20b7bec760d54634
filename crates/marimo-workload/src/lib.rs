//! Desired-state compilation for MarimoNotebook
//!
//! Compiles a `MarimoNotebook` into the Kubernetes objects that realize it:
//! an optional content ConfigMap, an optional PVC, the notebook Pod (init
//! steps, marimo container, sidecars) and its Service. Everything here is
//! pure: no API calls, no environment lookups, same input → same output.
//!
//! # Usage
//!
//! ```rust,ignore
//! let desired = NotebookCompiler::new(&notebook, &config).compile();
//! ```

use std::collections::BTreeMap;

use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use marimo_common::crd::MarimoNotebook;
use marimo_common::{
    LABEL_INSTANCE, LABEL_MANAGED_BY, LABEL_MANAGED_BY_OPERATOR, LABEL_NAME, LABEL_NAME_MARIMO,
};

mod compiler;
pub mod content;
pub mod mounts;
pub mod overrides;
pub mod pod;
pub mod service;
pub mod status;
pub mod storage;

pub use compiler::{DesiredObjects, NotebookCompiler};
pub use mounts::{expand_mounts, BucketMount, MountUri, RemoteMount};
pub use status::{project_status, status_needs_update};

/// Directory holding notebooks inside every container that mounts the data volume
pub const NOTEBOOK_DIR: &str = "/home/marimo/notebooks";

/// Identity of the notebook being compiled
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct NotebookMeta<'a> {
    /// Notebook name; also the name of its Pod, Service and PVC
    pub name: &'a str,
    /// Notebook namespace
    pub namespace: &'a str,
}

impl<'a> NotebookMeta<'a> {
    /// Read name and namespace from the notebook's metadata
    pub fn of(notebook: &'a MarimoNotebook) -> Self {
        Self {
            name: notebook.metadata.name.as_deref().unwrap_or_default(),
            namespace: notebook.metadata.namespace.as_deref().unwrap_or_default(),
        }
    }

    /// Standard labels for every managed object; also the Service selector
    pub fn labels(&self) -> BTreeMap<String, String> {
        BTreeMap::from([
            (LABEL_NAME.to_string(), LABEL_NAME_MARIMO.to_string()),
            (LABEL_INSTANCE.to_string(), self.name.to_string()),
            (
                LABEL_MANAGED_BY.to_string(),
                LABEL_MANAGED_BY_OPERATOR.to_string(),
            ),
        ])
    }

    /// Metadata for a managed object with the given name
    pub fn object_meta(&self, name: String) -> ObjectMeta {
        ObjectMeta {
            name: Some(name),
            namespace: Some(self.namespace.to_string()),
            labels: Some(self.labels()),
            ..Default::default()
        }
    }
}
