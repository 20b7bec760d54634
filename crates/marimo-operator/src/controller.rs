//! MarimoNotebook controller implementation
//!
//! One pass converges every managed object in order:
//! ConfigMap → PVC → Pod → Service, then projects status.
//!
//! - ConfigMap: created if absent, replaced only when the notebook text differs
//! - PVC: created if absent, never updated, never owned (data outlives the notebook)
//! - Pod, Service: created if absent, otherwise adopted as-is
//!
//! A 409 on create means another pass won the race; the existing object is
//! re-read and used. Every other store error is returned so the controller
//! runtime can back off and retry. Nothing is cleaned up mid-pass; the next
//! pass finishes whatever this one did not.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use k8s_openapi::api::core::v1::{ConfigMap, PersistentVolumeClaim, Pod, Service};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::OwnerReference;
use kube::api::{Api, Patch, PatchParams, PostParams};
use kube::runtime::controller::Action;
use kube::{Client, Resource, ResourceExt};
use tracing::{debug, error, info, instrument, warn};

#[cfg(test)]
use mockall::automock;

use marimo_common::crd::{MarimoNotebook, MarimoNotebookStatus};
use marimo_common::{Error, OperatorConfig, FIELD_MANAGER};
use marimo_workload::content::CONTENT_KEY;
use marimo_workload::{project_status, status_needs_update, NotebookCompiler};

/// Result of a create call that may lose a race with another writer
#[derive(Clone, Debug, PartialEq)]
pub enum CreateOutcome<T> {
    /// The object was created; carries the stored object
    Created(T),
    /// An object with the same name already exists
    AlreadyExists,
}

// =============================================================================
// Traits for dependency injection and testability
// =============================================================================

/// Kubernetes operations needed to converge a MarimoNotebook
///
/// Reads return `Ok(None)` on 404 and creates return
/// `CreateOutcome::AlreadyExists` on 409, so the reconciler only sees
/// errors it cannot handle itself.
#[cfg_attr(test, automock)]
#[async_trait]
pub trait NotebookKubeClient: Send + Sync {
    /// Get a ConfigMap by name
    async fn get_config_map(&self, name: &str, namespace: &str)
        -> Result<Option<ConfigMap>, Error>;

    /// Create a ConfigMap
    async fn create_config_map(
        &self,
        namespace: &str,
        config_map: &ConfigMap,
    ) -> Result<CreateOutcome<ConfigMap>, Error>;

    /// Replace an existing ConfigMap (optimistic on its resourceVersion)
    async fn replace_config_map(&self, namespace: &str, config_map: &ConfigMap)
        -> Result<(), Error>;

    /// Get a PersistentVolumeClaim by name
    async fn get_pvc(
        &self,
        name: &str,
        namespace: &str,
    ) -> Result<Option<PersistentVolumeClaim>, Error>;

    /// Create a PersistentVolumeClaim
    async fn create_pvc(
        &self,
        namespace: &str,
        pvc: &PersistentVolumeClaim,
    ) -> Result<CreateOutcome<PersistentVolumeClaim>, Error>;

    /// Get a Pod by name
    async fn get_pod(&self, name: &str, namespace: &str) -> Result<Option<Pod>, Error>;

    /// Create a Pod
    async fn create_pod(&self, namespace: &str, pod: &Pod) -> Result<CreateOutcome<Pod>, Error>;

    /// Get a Service by name
    async fn get_service(&self, name: &str, namespace: &str) -> Result<Option<Service>, Error>;

    /// Create a Service
    async fn create_service(
        &self,
        namespace: &str,
        service: &Service,
    ) -> Result<CreateOutcome<Service>, Error>;

    /// Patch the status subresource of a MarimoNotebook
    async fn patch_notebook_status(
        &self,
        name: &str,
        namespace: &str,
        status: &MarimoNotebookStatus,
    ) -> Result<(), Error>;
}

/// Real Kubernetes client implementation
pub struct NotebookKubeClientImpl {
    client: Client,
}

impl NotebookKubeClientImpl {
    /// Create a new NotebookKubeClientImpl wrapping the given client
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    async fn get<K>(&self, name: &str, namespace: &str) -> Result<Option<K>, Error>
    where
        K: Resource<Scope = k8s_openapi::NamespaceResourceScope>
            + Clone
            + std::fmt::Debug
            + serde::de::DeserializeOwned,
        K::DynamicType: Default,
    {
        let api: Api<K> = Api::namespaced(self.client.clone(), namespace);
        match api.get(name).await {
            Ok(obj) => Ok(Some(obj)),
            Err(kube::Error::Api(ae)) if ae.code == 404 => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    async fn create<K>(&self, namespace: &str, obj: &K) -> Result<CreateOutcome<K>, Error>
    where
        K: Resource<Scope = k8s_openapi::NamespaceResourceScope>
            + Clone
            + std::fmt::Debug
            + serde::Serialize
            + serde::de::DeserializeOwned,
        K::DynamicType: Default,
    {
        let api: Api<K> = Api::namespaced(self.client.clone(), namespace);
        match api.create(&PostParams::default(), obj).await {
            Ok(created) => Ok(CreateOutcome::Created(created)),
            Err(kube::Error::Api(ae)) if ae.code == 409 => Ok(CreateOutcome::AlreadyExists),
            Err(e) => Err(e.into()),
        }
    }
}

#[async_trait]
impl NotebookKubeClient for NotebookKubeClientImpl {
    async fn get_config_map(
        &self,
        name: &str,
        namespace: &str,
    ) -> Result<Option<ConfigMap>, Error> {
        self.get(name, namespace).await
    }

    async fn create_config_map(
        &self,
        namespace: &str,
        config_map: &ConfigMap,
    ) -> Result<CreateOutcome<ConfigMap>, Error> {
        self.create(namespace, config_map).await
    }

    async fn replace_config_map(
        &self,
        namespace: &str,
        config_map: &ConfigMap,
    ) -> Result<(), Error> {
        let api: Api<ConfigMap> = Api::namespaced(self.client.clone(), namespace);
        let name = config_map.name_any();
        api.replace(&name, &PostParams::default(), config_map)
            .await?;
        Ok(())
    }

    async fn get_pvc(
        &self,
        name: &str,
        namespace: &str,
    ) -> Result<Option<PersistentVolumeClaim>, Error> {
        self.get(name, namespace).await
    }

    async fn create_pvc(
        &self,
        namespace: &str,
        pvc: &PersistentVolumeClaim,
    ) -> Result<CreateOutcome<PersistentVolumeClaim>, Error> {
        self.create(namespace, pvc).await
    }

    async fn get_pod(&self, name: &str, namespace: &str) -> Result<Option<Pod>, Error> {
        self.get(name, namespace).await
    }

    async fn create_pod(&self, namespace: &str, pod: &Pod) -> Result<CreateOutcome<Pod>, Error> {
        self.create(namespace, pod).await
    }

    async fn get_service(&self, name: &str, namespace: &str) -> Result<Option<Service>, Error> {
        self.get(name, namespace).await
    }

    async fn create_service(
        &self,
        namespace: &str,
        service: &Service,
    ) -> Result<CreateOutcome<Service>, Error> {
        self.create(namespace, service).await
    }

    async fn patch_notebook_status(
        &self,
        name: &str,
        namespace: &str,
        status: &MarimoNotebookStatus,
    ) -> Result<(), Error> {
        let api: Api<MarimoNotebook> = Api::namespaced(self.client.clone(), namespace);
        let status_patch = serde_json::json!({ "status": status });

        api.patch_status(
            name,
            &PatchParams::apply(FIELD_MANAGER),
            &Patch::Merge(&status_patch),
        )
        .await?;

        Ok(())
    }
}

// =============================================================================
// Context
// =============================================================================

/// Shared context for the MarimoNotebook controller
pub struct NotebookContext {
    /// Kubernetes client abstraction
    pub kube: Arc<dyn NotebookKubeClient>,
    /// Images and endpoints for generated objects
    pub config: OperatorConfig,
}

impl NotebookContext {
    /// Create a context backed by a real Kubernetes client
    pub fn from_client(client: Client, config: OperatorConfig) -> Self {
        Self {
            kube: Arc::new(NotebookKubeClientImpl::new(client)),
            config,
        }
    }

    /// Create a context for testing with a mock client
    #[cfg(test)]
    pub fn for_testing(kube: Arc<dyn NotebookKubeClient>) -> Self {
        Self {
            kube,
            config: OperatorConfig::default(),
        }
    }
}

// =============================================================================
// Reconciliation
// =============================================================================

/// Reconcile a MarimoNotebook resource
///
/// Converges the ConfigMap, PVC, Pod and Service, then writes status if
/// any projected field changed. Re-running with unchanged inputs performs
/// no writes.
#[instrument(skip(notebook, ctx), fields(notebook = %notebook.name_any()))]
pub async fn reconcile(
    notebook: Arc<MarimoNotebook>,
    ctx: Arc<NotebookContext>,
) -> Result<Action, Error> {
    let name = notebook.name_any();

    if notebook.metadata.deletion_timestamp.is_some() {
        debug!("notebook is being deleted, skipping");
        return Ok(Action::await_change());
    }

    let namespace = notebook
        .namespace()
        .ok_or_else(|| Error::MissingNamespace { name: name.clone() })?;
    let owner = notebook
        .controller_owner_ref(&())
        .ok_or_else(|| Error::MissingOwnerUid { name: name.clone() })?;

    info!("reconciling notebook");

    let mut desired = NotebookCompiler::new(&notebook, &ctx.config).compile();
    if let Some(cm) = desired.config_map.as_mut() {
        set_owner(&mut cm.metadata.owner_references, &owner);
    }
    set_owner(&mut desired.pod.metadata.owner_references, &owner);
    set_owner(&mut desired.service.metadata.owner_references, &owner);

    let kube = ctx.kube.as_ref();
    let (name, namespace) = (name.as_str(), namespace.as_str());

    if let Some(cm) = &desired.config_map {
        ensure_config_map(kube, namespace, cm).await?;
    }
    if let Some(pvc) = &desired.pvc {
        ensure_pvc(kube, namespace, pvc).await?;
    }

    let desired_pod = &desired.pod;
    let pod = get_or_create(
        "Pod",
        move || kube.get_pod(name, namespace),
        move || kube.create_pod(namespace, desired_pod),
    )
    .await?;
    let desired_service = &desired.service;
    let service = get_or_create(
        "Service",
        move || kube.get_service(name, namespace),
        move || kube.create_service(namespace, desired_service),
    )
    .await?;

    let status = project_status(Some(&pod), Some(&service), &notebook.spec);
    if status_needs_update(notebook.status.as_ref(), &status) {
        info!(phase = %status.phase, url = ?status.url, "updating status");
        kube.patch_notebook_status(name, namespace, &status).await?;
    } else {
        debug!("status unchanged");
    }

    Ok(Action::await_change())
}

fn set_owner(refs: &mut Option<Vec<OwnerReference>>, owner: &OwnerReference) {
    *refs = Some(vec![owner.clone()]);
}

/// Create the content ConfigMap, or replace it when the notebook text changed
async fn ensure_config_map(
    kube: &dyn NotebookKubeClient,
    namespace: &str,
    desired: &ConfigMap,
) -> Result<(), Error> {
    let name = desired.name_any();
    let desired_content = desired.data.as_ref().and_then(|d| d.get(CONTENT_KEY));

    match kube.get_config_map(&name, namespace).await? {
        None => match kube.create_config_map(namespace, desired).await? {
            CreateOutcome::Created(_) => info!(config_map = %name, "created content ConfigMap"),
            CreateOutcome::AlreadyExists => {
                debug!(config_map = %name, "content ConfigMap created concurrently")
            }
        },
        Some(existing) => {
            let current = existing.data.as_ref().and_then(|d| d.get(CONTENT_KEY));
            if current == desired_content {
                return Ok(());
            }
            let updated = ConfigMap {
                data: desired.data.clone(),
                ..existing
            };
            kube.replace_config_map(namespace, &updated).await?;
            info!(config_map = %name, "updated notebook content");
        }
    }
    Ok(())
}

/// Create the data PVC if absent; an existing claim is never modified
async fn ensure_pvc(
    kube: &dyn NotebookKubeClient,
    namespace: &str,
    desired: &PersistentVolumeClaim,
) -> Result<(), Error> {
    let name = desired.name_any();
    if kube.get_pvc(&name, namespace).await?.is_some() {
        return Ok(());
    }
    match kube.create_pvc(namespace, desired).await? {
        CreateOutcome::Created(_) => info!(pvc = %name, "created data PVC"),
        CreateOutcome::AlreadyExists => debug!(pvc = %name, "data PVC created concurrently"),
    }
    Ok(())
}

/// Return the observed object, creating it when absent.
///
/// A lost create race re-reads the winner's object.
async fn get_or_create<K, G, GF, C, CF>(kind: &str, get: G, create: C) -> Result<K, Error>
where
    G: Fn() -> GF,
    GF: Future<Output = Result<Option<K>, Error>>,
    C: FnOnce() -> CF,
    CF: Future<Output = Result<CreateOutcome<K>, Error>>,
{
    if let Some(existing) = get().await? {
        return Ok(existing);
    }

    match create().await? {
        CreateOutcome::Created(created) => {
            info!(kind, "created");
            Ok(created)
        }
        CreateOutcome::AlreadyExists => {
            debug!(kind, "created concurrently, adopting existing object");
            get().await?.ok_or_else(|| {
                warn!(kind, "object vanished after conflicting create");
                Error::internal_with_context(kind, "object vanished after conflicting create")
            })
        }
    }
}

/// Error policy for MarimoNotebook reconciliation
pub fn error_policy(
    notebook: Arc<MarimoNotebook>,
    error: &Error,
    _ctx: Arc<NotebookContext>,
) -> Action {
    error!(
        ?error,
        notebook = %notebook.name_any(),
        retryable = error.is_retryable(),
        "notebook reconciliation failed"
    );
    Action::requeue(Duration::from_secs(30))
}
