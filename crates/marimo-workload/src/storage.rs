//! PersistentVolumeClaim generation
//!
//! The claim shares the notebook's name and is created once. Size and class
//! are never reconciled afterwards, and the claim carries no owner reference
//! so notebook data survives deletion of the MarimoNotebook.

use std::collections::BTreeMap;

use k8s_openapi::api::core::v1::{
    PersistentVolumeClaim, PersistentVolumeClaimSpec, VolumeResourceRequirements,
};
use k8s_openapi::apimachinery::pkg::api::resource::Quantity;
use marimo_common::crd::{StorageSpec, DEFAULT_STORAGE_SIZE};

use crate::NotebookMeta;

/// Volume name of the notebook data volume (PVC- or emptyDir-backed)
pub const DATA_VOLUME_NAME: &str = "notebook-data";

/// Build the PVC for a notebook with storage configured
pub fn compile_pvc(meta: &NotebookMeta<'_>, storage: &StorageSpec) -> PersistentVolumeClaim {
    let size = if storage.size.is_empty() {
        DEFAULT_STORAGE_SIZE
    } else {
        storage.size.as_str()
    };

    PersistentVolumeClaim {
        metadata: meta.object_meta(meta.name.to_string()),
        spec: Some(PersistentVolumeClaimSpec {
            access_modes: Some(vec!["ReadWriteOnce".to_string()]),
            resources: Some(VolumeResourceRequirements {
                requests: Some(BTreeMap::from([(
                    "storage".to_string(),
                    Quantity(size.to_string()),
                )])),
                ..Default::default()
            }),
            storage_class_name: storage.storage_class_name.clone(),
            ..Default::default()
        }),
        ..Default::default()
    }
}

/// Requested size of a claim, if any
pub fn requested_size(pvc: &PersistentVolumeClaim) -> Option<&str> {
    pvc.spec
        .as_ref()?
        .resources
        .as_ref()?
        .requests
        .as_ref()?
        .get("storage")
        .map(|q| q.0.as_str())
}
