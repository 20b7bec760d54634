//! Status projection from observed objects

use k8s_openapi::api::core::v1::{Pod, Service};
use marimo_common::crd::{ContentSource, MarimoNotebookSpec, MarimoNotebookStatus, NotebookPhase};

use crate::content::{content_hash, source_hash};

/// Map a pod's reported phase onto the notebook lifecycle
pub fn phase_of(pod: Option<&Pod>) -> NotebookPhase {
    let phase = pod
        .and_then(|p| p.status.as_ref())
        .and_then(|s| s.phase.as_deref());
    match phase {
        Some("Running") => NotebookPhase::Running,
        Some("Failed") => NotebookPhase::Failed,
        _ => NotebookPhase::Pending,
    }
}

/// In-cluster URL of a notebook service
pub fn service_url(service: &Service, port: i32) -> Option<String> {
    let name = service.metadata.name.as_deref()?;
    let namespace = service.metadata.namespace.as_deref()?;
    Some(format!("http://{name}.{namespace}.svc.cluster.local:{port}"))
}

/// Fingerprint of where the notebook content came from.
///
/// Never empty: without content or source the empty URL is hashed, so a
/// status that once carried a fingerprint is always overwritten.
pub fn content_fingerprint(spec: &MarimoNotebookSpec) -> String {
    match spec.content_source() {
        ContentSource::Inline(content) => content_hash(content),
        ContentSource::Repository(source) => source_hash(source),
        ContentSource::External => source_hash(""),
    }
}

/// Project the externally visible status from the observed Pod and Service
pub fn project_status(
    pod: Option<&Pod>,
    service: Option<&Service>,
    spec: &MarimoNotebookSpec,
) -> MarimoNotebookStatus {
    MarimoNotebookStatus {
        phase: phase_of(pod),
        url: service.and_then(|svc| service_url(svc, spec.port)),
        source_hash: content_fingerprint(spec),
        pod_name: pod.and_then(|p| p.metadata.name.clone()),
        service_name: service.and_then(|s| s.metadata.name.clone()),
    }
}

/// Whether `desired` differs from the stored status in any field
pub fn status_needs_update(
    current: Option<&MarimoNotebookStatus>,
    desired: &MarimoNotebookStatus,
) -> bool {
    current != Some(desired)
}
