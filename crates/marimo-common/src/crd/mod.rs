//! Custom Resource Definitions for the marimo operator

mod notebook;

pub use notebook::{
    AuthPolicy, AuthSpec, ContentSource, MarimoNotebook, MarimoNotebookSpec,
    MarimoNotebookStatus, NotebookMode, NotebookPhase, PasswordSecretRef, ResourcesSpec,
    SecretKeyRef, SidecarSpec, StorageSpec, DEFAULT_IMAGE, DEFAULT_PORT, DEFAULT_STORAGE_SIZE,
};
