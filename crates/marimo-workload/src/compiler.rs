//! Notebook compiler
//!
//! Single entry point that turns a `MarimoNotebook` into every object it
//! needs. Mount URIs are expanded here once so the Pod and Service see the
//! same sidecar list.

use k8s_openapi::api::core::v1::{ConfigMap, PersistentVolumeClaim, Pod, Service};
use marimo_common::crd::{ContentSource, MarimoNotebook, SidecarSpec};
use marimo_common::OperatorConfig;
use tracing::debug;

use crate::content::compile_config_map;
use crate::mounts::expand_mounts;
use crate::pod::compile_pod;
use crate::service::compile_service;
use crate::storage::compile_pvc;
use crate::NotebookMeta;

/// Objects realizing one notebook, in creation order
#[derive(Clone, Debug, PartialEq)]
pub struct DesiredObjects {
    /// Inline content store; only for inline content
    pub config_map: Option<ConfigMap>,
    /// Persistent data volume; only when storage is requested
    pub pvc: Option<PersistentVolumeClaim>,
    /// The notebook Pod
    pub pod: Pod,
    /// ClusterIP Service in front of the Pod
    pub service: Service,
}

/// Compiles a MarimoNotebook into its desired objects
pub struct NotebookCompiler<'a> {
    notebook: &'a MarimoNotebook,
    config: &'a OperatorConfig,
}

impl<'a> NotebookCompiler<'a> {
    /// Create a compiler for `notebook`
    pub fn new(notebook: &'a MarimoNotebook, config: &'a OperatorConfig) -> Self {
        Self { notebook, config }
    }

    /// Mount-generated sidecars followed by the explicit ones
    pub fn sidecars(&self) -> Vec<SidecarSpec> {
        let spec = &self.notebook.spec;
        let mut sidecars = expand_mounts(&spec.mounts, self.config);
        sidecars.extend(spec.sidecars.iter().cloned());
        sidecars
    }

    /// Compile all objects. Owner references are left to the caller.
    pub fn compile(&self) -> DesiredObjects {
        let meta = NotebookMeta::of(self.notebook);
        let spec = &self.notebook.spec;
        let sidecars = self.sidecars();

        let config_map = match spec.content_source() {
            ContentSource::Inline(content) => Some(compile_config_map(&meta, content)),
            _ => None,
        };
        let pvc = spec.storage.as_ref().map(|s| compile_pvc(&meta, s));

        debug!(
            notebook = %meta.name,
            sidecars = sidecars.len(),
            config_map = config_map.is_some(),
            pvc = pvc.is_some(),
            "compiled notebook"
        );

        DesiredObjects {
            config_map,
            pvc,
            pod: compile_pod(&meta, spec, &sidecars, self.config),
            service: compile_service(&meta, spec.port, &sidecars),
        }
    }
}
