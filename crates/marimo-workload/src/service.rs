//! Service generation for MarimoNotebook

use k8s_openapi::api::core::v1::{Service, ServicePort, ServiceSpec};
use k8s_openapi::apimachinery::pkg::util::intstr::IntOrString;
use marimo_common::crd::SidecarSpec;

use crate::pod::HTTP_PORT_NAME;
use crate::NotebookMeta;

fn tcp_port(name: &str, port: i32) -> ServicePort {
    ServicePort {
        name: Some(name.to_string()),
        port,
        target_port: Some(IntOrString::Int(port)),
        protocol: Some("TCP".to_string()),
        ..Default::default()
    }
}

/// Build the ClusterIP Service selecting the notebook Pod.
///
/// The marimo port is always exposed as `http`; every sidecar with an
/// `exposePort` adds a port named after the sidecar.
pub fn compile_service(meta: &NotebookMeta<'_>, port: i32, sidecars: &[SidecarSpec]) -> Service {
    let mut ports = vec![tcp_port(HTTP_PORT_NAME, port)];
    ports.extend(
        sidecars
            .iter()
            .filter_map(|s| s.expose_port.map(|p| tcp_port(&s.name, p))),
    );

    Service {
        metadata: meta.object_meta(meta.name.to_string()),
        spec: Some(ServiceSpec {
            type_: Some("ClusterIP".to_string()),
            selector: Some(meta.labels()),
            ports: Some(ports),
            ..Default::default()
        }),
        ..Default::default()
    }
}
