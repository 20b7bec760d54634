//! MarimoNotebook CRD types
//!
//! A `MarimoNotebook` describes one marimo server: the image and port it runs
//! on, where its notebook content comes from (git source or inline text),
//! optional persistent storage, authentication, and any sidecars or
//! high-level mount URIs that run next to it.
//!
//! The wire types mirror what users write in YAML. Several fields are
//! tri-state on the wire (absent, present-but-empty, populated); accessor
//! methods expose those as explicit enums so callers never branch on
//! `Option` nesting directly.

use std::collections::BTreeMap;

use k8s_openapi::api::core::v1::{EnvVar, ResourceRequirements, SecurityContext};
use k8s_openapi::apimachinery::pkg::api::resource::Quantity;
use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Default marimo image
pub const DEFAULT_IMAGE: &str = "ghcr.io/marimo-team/marimo:latest";

/// Default marimo server port
pub const DEFAULT_PORT: i32 = 2718;

/// Default PVC size when `storage.size` is omitted
pub const DEFAULT_STORAGE_SIZE: &str = "1Gi";

fn default_image() -> String {
    DEFAULT_IMAGE.to_string()
}

fn default_port() -> i32 {
    DEFAULT_PORT
}

fn default_storage_size() -> String {
    DEFAULT_STORAGE_SIZE.to_string()
}

// =============================================================================
// Phase
// =============================================================================

/// Lifecycle phase of a MarimoNotebook
#[derive(Clone, Copy, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq, Eq)]
pub enum NotebookPhase {
    /// Resources are being created or the pod is not running yet
    #[default]
    Pending,
    /// The notebook pod is running
    Running,
    /// The notebook pod failed
    Failed,
}

impl std::fmt::Display for NotebookPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Pending => write!(f, "Pending"),
            Self::Running => write!(f, "Running"),
            Self::Failed => write!(f, "Failed"),
        }
    }
}

// =============================================================================
// Mode
// =============================================================================

/// marimo server mode
#[derive(Clone, Copy, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum NotebookMode {
    /// Interactive editing
    #[default]
    Edit,
    /// Read-only app
    Run,
}

impl NotebookMode {
    /// The marimo subcommand for this mode
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Edit => "edit",
            Self::Run => "run",
        }
    }
}

impl std::fmt::Display for NotebookMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// =============================================================================
// Storage / resources
// =============================================================================

/// Persistent storage configuration
#[derive(Clone, Debug, Deserialize, Serialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct StorageSpec {
    /// Size of the PVC (e.g. "1Gi", "10Gi")
    #[serde(default = "default_storage_size")]
    pub size: String,

    /// StorageClassName for the PVC (cluster default if unset)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub storage_class_name: Option<String>,
}

impl Default for StorageSpec {
    fn default() -> Self {
        Self {
            size: default_storage_size(),
            storage_class_name: None,
        }
    }
}

/// Compute resources for the marimo container
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ResourcesSpec {
    /// Minimum resources required
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub requests: Option<BTreeMap<String, Quantity>>,

    /// Maximum resources allowed
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub limits: Option<BTreeMap<String, Quantity>>,
}

// =============================================================================
// Auth
// =============================================================================

/// Reference to a key in a Secret
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct SecretKeyRef {
    /// Name of the Secret
    pub name: String,
    /// Key within the Secret
    pub key: String,
}

/// Password source for marimo token auth
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct PasswordSecretRef {
    /// Secret and key holding the password
    pub secret_key_ref: SecretKeyRef,
}

/// Authentication block as written by users.
///
/// `auth` absent and `auth: {}` mean different things; see [`AuthPolicy`].
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct AuthSpec {
    /// Password read from a Secret
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub password: Option<PasswordSecretRef>,
}

/// Effective authentication policy for the marimo server
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum AuthPolicy {
    /// No `auth` block: marimo generates a one-time access token
    Unset,
    /// Empty `auth` block: explicit opt-out of authentication
    NoToken,
    /// Password mounted from a Secret key
    PasswordFromSecret {
        /// Secret name
        secret_name: String,
        /// Key within the Secret
        key: String,
    },
}

impl AuthPolicy {
    /// Interpret the optional wire-level auth block
    pub fn from_spec(auth: Option<&AuthSpec>) -> Self {
        match auth {
            None => Self::Unset,
            Some(AuthSpec { password: None }) => Self::NoToken,
            Some(AuthSpec {
                password: Some(password),
            }) => Self::PasswordFromSecret {
                secret_name: password.secret_key_ref.name.clone(),
                key: password.secret_key_ref.key.clone(),
            },
        }
    }
}

// =============================================================================
// Sidecars
// =============================================================================

/// An additional container that runs alongside marimo and shares its data volume
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct SidecarSpec {
    /// Container name, unique across explicit and mount-generated sidecars
    pub name: String,

    /// Container image
    pub image: String,

    /// Port added to the Service for external access
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expose_port: Option<i32>,

    /// Environment variables
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub env: Vec<EnvVar>,

    /// Entrypoint override
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub command: Vec<String>,

    /// Arguments to the entrypoint
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub args: Vec<String>,

    /// Compute resources
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resources: Option<ResourceRequirements>,

    /// Security context; FUSE mounts (s3fs, sshfs) need `privileged: true`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub security_context: Option<SecurityContext>,
}

impl SidecarSpec {
    /// Whether this sidecar performs user-space filesystem mounts
    pub fn is_privileged(&self) -> bool {
        self.security_context
            .as_ref()
            .and_then(|sc| sc.privileged)
            .unwrap_or(false)
    }
}

// =============================================================================
// Content
// =============================================================================

/// Where the notebook content comes from
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ContentSource<'a> {
    /// Inline notebook text stored in a ConfigMap
    Inline(&'a str),
    /// Git repository cloned into the data directory
    Repository(&'a str),
    /// Nothing to fetch; files are synchronized from outside
    External,
}

// =============================================================================
// CRD
// =============================================================================

fn preserve_unknown_fields(_gen: &mut schemars::gen::SchemaGenerator) -> schemars::schema::Schema {
    schemars::schema::Schema::Object(schemars::schema::SchemaObject {
        instance_type: Some(schemars::schema::InstanceType::Object.into()),
        extensions: [(
            "x-kubernetes-preserve-unknown-fields".to_string(),
            serde_json::Value::Bool(true),
        )]
        .into_iter()
        .collect(),
        ..Default::default()
    })
}

/// A marimo notebook server with optional sidecars and persistent storage
#[derive(CustomResource, Clone, Debug, Deserialize, Serialize, JsonSchema, PartialEq)]
#[kube(
    group = "marimo.io",
    version = "v1alpha1",
    kind = "MarimoNotebook",
    plural = "marimos",
    singular = "marimo",
    shortname = "mo",
    namespaced,
    status = "MarimoNotebookStatus",
    printcolumn = r#"{"name":"Phase","type":"string","jsonPath":".status.phase"}"#,
    printcolumn = r#"{"name":"URL","type":"string","jsonPath":".status.url"}"#,
    printcolumn = r#"{"name":"Age","type":"date","jsonPath":".metadata.creationTimestamp"}"#
)]
#[serde(rename_all = "camelCase")]
pub struct MarimoNotebookSpec {
    /// Image for the marimo container
    #[serde(default = "default_image")]
    pub image: String,

    /// Port for the marimo server
    #[serde(default = "default_port")]
    pub port: i32,

    /// Git URL cloned into the data directory (mutually exclusive with `content`)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,

    /// Inline notebook content, marimo `.py` or `.md` (mutually exclusive with `source`)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,

    /// Persistent storage; required when sidecars or mounts are used
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub storage: Option<StorageSpec>,

    /// Compute resources for the marimo container
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resources: Option<ResourcesSpec>,

    /// Authentication; absent = generated token, `{}` = no token
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub auth: Option<AuthSpec>,

    /// Server mode
    #[serde(default)]
    pub mode: NotebookMode,

    /// Environment for the marimo container, applied after the built-in defaults
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub env: Vec<EnvVar>,

    /// High-level data source URIs expanded to sidecars (cw://, sshfs://, rsync://)
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub mounts: Vec<String>,

    /// Additional containers sharing the data volume
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub sidecars: Vec<SidecarSpec>,

    /// Partial PodSpec merged into the generated pod (containers merge by name)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[schemars(schema_with = "preserve_unknown_fields")]
    pub pod_overrides: Option<serde_json::Value>,
}

impl Default for MarimoNotebookSpec {
    fn default() -> Self {
        Self {
            image: default_image(),
            port: default_port(),
            source: None,
            content: None,
            storage: None,
            resources: None,
            auth: None,
            mode: NotebookMode::default(),
            env: Vec::new(),
            mounts: Vec::new(),
            sidecars: Vec::new(),
            pod_overrides: None,
        }
    }
}

impl MarimoNotebookSpec {
    /// Effective authentication policy
    pub fn auth_policy(&self) -> AuthPolicy {
        AuthPolicy::from_spec(self.auth.as_ref())
    }

    /// Where notebook content comes from. Empty strings count as unset.
    pub fn content_source(&self) -> ContentSource<'_> {
        match (self.content.as_deref(), self.source.as_deref()) {
            (Some(content), _) if !content.is_empty() => ContentSource::Inline(content),
            (_, Some(source)) if !source.is_empty() => ContentSource::Repository(source),
            _ => ContentSource::External,
        }
    }
}

/// Observed state of a MarimoNotebook
///
/// Every field serializes, unset ones as `null`, so a merge patch of the
/// whole status also clears fields that are no longer observed.
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct MarimoNotebookStatus {
    /// Current phase
    #[serde(default)]
    pub phase: NotebookPhase,

    /// In-cluster URL of the notebook service
    #[serde(default)]
    pub url: Option<String>,

    /// Fingerprint of the inline content or source URL
    #[serde(default)]
    pub source_hash: String,

    /// Name of the notebook Pod
    #[serde(default)]
    pub pod_name: Option<String>,

    /// Name of the notebook Service
    #[serde(default)]
    pub service_name: Option<String>,
}

// =============================================================================
// Tests
// =============================================================================
