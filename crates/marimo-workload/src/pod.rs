//! Pod generation for MarimoNotebook
//!
//! Layout of the generated pod:
//!
//! - init: `copy-content` (inline content) or `git-clone` (source URL), then
//!   `setup-venv`; both are no-ops when their work already exists on disk
//! - containers: `marimo` first, then sidecars in order (mount-generated
//!   before explicit)
//! - volumes: `notebook-data` (PVC or emptyDir), `notebook-content`,
//!   `venv`, `auth-secret`, `ssh-pubkey` as needed
//!
//! Privileged sidecars mount FUSE filesystems under the data directory. For
//! those mounts to be visible across containers, the sidecar's data mount
//! uses `Bidirectional` propagation and marimo's uses `HostToContainer`.

use k8s_openapi::api::core::v1::{
    ConfigMapVolumeSource, Container, ContainerPort, EmptyDirVolumeSource, EnvVar, KeyToPath,
    PersistentVolumeClaimVolumeSource, Pod, PodSpec, ResourceRequirements, SecretVolumeSource,
    Volume, VolumeMount,
};
use marimo_common::crd::{
    AuthPolicy, ContentSource, MarimoNotebookSpec, ResourcesSpec, SidecarSpec,
};
use marimo_common::OperatorConfig;

use crate::content::{
    config_map_name, detect_content_file, CONTENT_KEY, CONTENT_MOUNT_PATH, CONTENT_VOLUME_NAME,
};
use crate::mounts::{SSHFS_SIDECAR_PREFIX, SSH_KEY_MOUNT_PATH};
use crate::overrides::apply_pod_overrides;
use crate::storage::DATA_VOLUME_NAME;
use crate::{NotebookMeta, NOTEBOOK_DIR};

/// Name of the main container
pub const MARIMO_CONTAINER: &str = "marimo";

/// Name of the container port (and Service port) for the marimo server
pub const HTTP_PORT_NAME: &str = "http";

/// Python virtual environment shared by `setup-venv` and marimo
pub const VENV_DIR: &str = "/opt/venv";

const VENV_VOLUME_NAME: &str = "venv";
const AUTH_VOLUME_NAME: &str = "auth-secret";
const AUTH_MOUNT_PATH: &str = "/etc/marimo";
const PASSWORD_FILE: &str = "password";

/// Secret holding the sshfs key; consumed, never created, by the operator
pub const SSH_KEY_SECRET: &str = "ssh-pubkey";
const SSH_KEY_VOLUME_NAME: &str = "ssh-pubkey";

const HOST_TO_CONTAINER: &str = "HostToContainer";
const BIDIRECTIONAL: &str = "Bidirectional";

// =============================================================================
// Shell fragments
// =============================================================================

/// Clone `source` into the notebook directory unless a repository is already there
pub fn clone_script(source: &str) -> String {
    format!(
        "if [ -d {NOTEBOOK_DIR}/.git ]; then echo 'Repository already exists, skipping clone'; \
         else git clone --depth 1 {source} {NOTEBOOK_DIR}; fi"
    )
}

/// Create the virtual environment unless it already exists
pub fn venv_script() -> String {
    format!(
        "if [ ! -f {VENV_DIR}/bin/python ]; then echo 'Creating venv...'; uv venv {VENV_DIR}; fi"
    )
}

/// Copy the ConfigMap content into the notebook directory as `file`
pub fn copy_script(file: &str) -> String {
    format!("cp {CONTENT_MOUNT_PATH}/{CONTENT_KEY} {NOTEBOOK_DIR}/{file}")
}

// =============================================================================
// Command line and environment
// =============================================================================

/// Arguments for the `marimo` command
pub fn marimo_args(spec: &MarimoNotebookSpec, auth: &AuthPolicy, file: Option<&str>) -> Vec<String> {
    let mut args = vec![
        spec.mode.as_str().to_string(),
        "--headless".to_string(),
        "--host=0.0.0.0".to_string(),
        format!("--port={}", spec.port),
    ];

    match auth {
        AuthPolicy::Unset => {}
        AuthPolicy::NoToken => args.push("--no-token".to_string()),
        AuthPolicy::PasswordFromSecret { .. } => {
            args.push("--token-password-file".to_string());
            args.push(format!("{AUTH_MOUNT_PATH}/{PASSWORD_FILE}"));
        }
    }

    match file {
        Some(file) => {
            args.push("--sandbox".to_string());
            args.push(format!("{NOTEBOOK_DIR}/{file}"));
        }
        None => args.push(NOTEBOOK_DIR.to_string()),
    }
    args
}

fn env_var(name: &str, value: &str) -> EnvVar {
    EnvVar {
        name: name.to_string(),
        value: Some(value.to_string()),
        ..Default::default()
    }
}

/// Built-in environment followed by the user's entries.
///
/// Kubernetes resolves duplicate names to the last entry, so user values
/// override the defaults.
pub fn marimo_env(user: &[EnvVar]) -> Vec<EnvVar> {
    let mut env = vec![
        env_var("VIRTUAL_ENV", VENV_DIR),
        env_var("UV_PROJECT_ENVIRONMENT", VENV_DIR),
        env_var("UV", "/usr/bin/uv"),
        env_var("UV_SYSTEM_PYTHON", "1"),
        env_var("MODAL_TASK_ID", "1"),
        env_var(
            "PYTHONPATH",
            "/usr/local/lib/python3.13/site-packages/:/opt/venv/lib/python3.13/site-packages/",
        ),
    ];
    env.extend(user.iter().cloned());
    env
}

fn resource_requirements(resources: Option<&ResourcesSpec>) -> Option<ResourceRequirements> {
    resources.map(|r| ResourceRequirements {
        requests: r.requests.clone(),
        limits: r.limits.clone(),
        ..Default::default()
    })
}

// =============================================================================
// Volumes and mounts
// =============================================================================

fn data_volume(meta: &NotebookMeta<'_>, spec: &MarimoNotebookSpec) -> Volume {
    match spec.storage {
        Some(_) => Volume {
            name: DATA_VOLUME_NAME.to_string(),
            persistent_volume_claim: Some(PersistentVolumeClaimVolumeSource {
                claim_name: meta.name.to_string(),
                ..Default::default()
            }),
            ..Default::default()
        },
        None => empty_dir(DATA_VOLUME_NAME),
    }
}

fn empty_dir(name: &str) -> Volume {
    Volume {
        name: name.to_string(),
        empty_dir: Some(EmptyDirVolumeSource::default()),
        ..Default::default()
    }
}

fn mount(name: &str, path: &str) -> VolumeMount {
    VolumeMount {
        name: name.to_string(),
        mount_path: path.to_string(),
        ..Default::default()
    }
}

fn read_only_mount(name: &str, path: &str) -> VolumeMount {
    VolumeMount {
        read_only: Some(true),
        ..mount(name, path)
    }
}

fn data_mount(propagation: Option<&str>) -> VolumeMount {
    VolumeMount {
        mount_propagation: propagation.map(str::to_string),
        ..mount(DATA_VOLUME_NAME, NOTEBOOK_DIR)
    }
}

fn is_sshfs_sidecar(sidecar: &SidecarSpec) -> bool {
    sidecar.name.starts_with(SSHFS_SIDECAR_PREFIX)
}

// =============================================================================
// Containers
// =============================================================================

fn sidecar_container(sidecar: &SidecarSpec) -> Container {
    let propagation = sidecar.is_privileged().then_some(BIDIRECTIONAL);
    let mut volume_mounts = vec![data_mount(propagation)];
    if is_sshfs_sidecar(sidecar) {
        volume_mounts.push(read_only_mount(SSH_KEY_VOLUME_NAME, SSH_KEY_MOUNT_PATH));
    }

    let non_empty = |v: &Vec<String>| (!v.is_empty()).then(|| v.clone());

    Container {
        name: sidecar.name.clone(),
        image: Some(sidecar.image.clone()),
        env: (!sidecar.env.is_empty()).then(|| sidecar.env.clone()),
        command: non_empty(&sidecar.command),
        args: non_empty(&sidecar.args),
        ports: sidecar.expose_port.map(|port| {
            vec![ContainerPort {
                name: Some(sidecar.name.clone()),
                container_port: port,
                protocol: Some("TCP".to_string()),
                ..Default::default()
            }]
        }),
        resources: sidecar.resources.clone(),
        security_context: sidecar.security_context.clone(),
        volume_mounts: Some(volume_mounts),
        ..Default::default()
    }
}

fn init_containers(
    spec: &MarimoNotebookSpec,
    content_file: Option<&str>,
    config: &OperatorConfig,
) -> Vec<Container> {
    let mut init = Vec::with_capacity(2);

    match (spec.content_source(), content_file) {
        (ContentSource::Inline(_), Some(file)) => init.push(Container {
            name: "copy-content".to_string(),
            image: Some(config.init_image.clone()),
            command: Some(vec!["sh".to_string(), "-c".to_string(), copy_script(file)]),
            volume_mounts: Some(vec![
                data_mount(None),
                read_only_mount(CONTENT_VOLUME_NAME, CONTENT_MOUNT_PATH),
            ]),
            ..Default::default()
        }),
        (ContentSource::Repository(source), _) => init.push(Container {
            name: "git-clone".to_string(),
            image: Some(config.git_image.clone()),
            command: Some(vec!["sh".to_string(), "-c".to_string(), clone_script(source)]),
            volume_mounts: Some(vec![data_mount(None)]),
            ..Default::default()
        }),
        // Files arrive from outside (e.g. kubectl cp)
        _ => {}
    }

    init.push(Container {
        name: "setup-venv".to_string(),
        image: Some(spec.image.clone()),
        command: Some(vec!["sh".to_string(), "-c".to_string(), venv_script()]),
        volume_mounts: Some(vec![mount(VENV_VOLUME_NAME, VENV_DIR)]),
        ..Default::default()
    });

    init
}

/// Build the notebook Pod.
///
/// `sidecars` is the full sidecar list: mount-expanded entries followed by
/// the explicit `spec.sidecars`.
pub fn compile_pod(
    meta: &NotebookMeta<'_>,
    spec: &MarimoNotebookSpec,
    sidecars: &[SidecarSpec],
    config: &OperatorConfig,
) -> Pod {
    let auth = spec.auth_policy();
    let content_file = match spec.content_source() {
        ContentSource::Inline(content) => Some(detect_content_file(content)),
        _ => None,
    };

    let mut volumes = vec![data_volume(meta, spec)];
    if content_file.is_some() {
        volumes.push(Volume {
            name: CONTENT_VOLUME_NAME.to_string(),
            config_map: Some(ConfigMapVolumeSource {
                name: config_map_name(meta.name),
                ..Default::default()
            }),
            ..Default::default()
        });
    }
    volumes.push(empty_dir(VENV_VOLUME_NAME));

    let has_privileged_sidecar = sidecars.iter().any(SidecarSpec::is_privileged);
    let marimo_propagation = has_privileged_sidecar.then_some(HOST_TO_CONTAINER);
    let mut marimo_mounts = vec![
        data_mount(marimo_propagation),
        mount(VENV_VOLUME_NAME, VENV_DIR),
    ];

    if let AuthPolicy::PasswordFromSecret { secret_name, key } = &auth {
        volumes.push(Volume {
            name: AUTH_VOLUME_NAME.to_string(),
            secret: Some(SecretVolumeSource {
                secret_name: Some(secret_name.clone()),
                items: Some(vec![KeyToPath {
                    key: key.clone(),
                    path: PASSWORD_FILE.to_string(),
                    ..Default::default()
                }]),
                ..Default::default()
            }),
            ..Default::default()
        });
        marimo_mounts.push(read_only_mount(AUTH_VOLUME_NAME, AUTH_MOUNT_PATH));
    }

    if sidecars.iter().any(is_sshfs_sidecar) {
        volumes.push(Volume {
            name: SSH_KEY_VOLUME_NAME.to_string(),
            secret: Some(SecretVolumeSource {
                secret_name: Some(SSH_KEY_SECRET.to_string()),
                // ssh refuses identity files readable by others
                default_mode: Some(0o400),
                ..Default::default()
            }),
            ..Default::default()
        });
    }

    let mut containers = vec![Container {
        name: MARIMO_CONTAINER.to_string(),
        image: Some(spec.image.clone()),
        working_dir: Some(NOTEBOOK_DIR.to_string()),
        command: Some(vec!["marimo".to_string()]),
        args: Some(marimo_args(spec, &auth, content_file)),
        env: Some(marimo_env(&spec.env)),
        ports: Some(vec![ContainerPort {
            name: Some(HTTP_PORT_NAME.to_string()),
            container_port: spec.port,
            protocol: Some("TCP".to_string()),
            ..Default::default()
        }]),
        volume_mounts: Some(marimo_mounts),
        resources: resource_requirements(spec.resources.as_ref()),
        ..Default::default()
    }];
    containers.extend(sidecars.iter().map(sidecar_container));

    let mut pod_spec = PodSpec {
        init_containers: Some(init_containers(spec, content_file, config)),
        containers,
        volumes: Some(volumes),
        ..Default::default()
    };
    if let Some(overrides) = &spec.pod_overrides {
        pod_spec = apply_pod_overrides(pod_spec, overrides);
    }

    Pod {
        metadata: meta.object_meta(meta.name.to_string()),
        spec: Some(pod_spec),
        ..Default::default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mounts::expand_mounts;
    use k8s_openapi::apimachinery::pkg::api::resource::Quantity;
    use marimo_common::crd::{AuthSpec, PasswordSecretRef, SecretKeyRef, StorageSpec};
    use k8s_openapi::api::core::v1::SecurityContext;
    use serde_json::json;
    use std::collections::BTreeMap;

    const META: NotebookMeta<'static> = NotebookMeta {
        name: "demo",
        namespace: "default",
    };

    fn git_spec() -> MarimoNotebookSpec {
        MarimoNotebookSpec {
            source: Some("https://github.com/marimo-team/marimo.git".to_string()),
            ..Default::default()
        }
    }

    fn build(spec: &MarimoNotebookSpec) -> PodSpec {
        let config = OperatorConfig::default();
        let mut sidecars = expand_mounts(&spec.mounts, &config);
        sidecars.extend(spec.sidecars.iter().cloned());
        compile_pod(&META, spec, &sidecars, &config)
            .spec
            .expect("pod spec")
    }

    fn container<'a>(pod: &'a PodSpec, name: &str) -> &'a Container {
        pod.containers
            .iter()
            .find(|c| c.name == name)
            .unwrap_or_else(|| panic!("container {name} missing"))
    }

    fn args(pod: &PodSpec) -> Vec<String> {
        container(pod, MARIMO_CONTAINER).args.clone().unwrap_or_default()
    }

    fn data_mount_of(c: &Container) -> VolumeMount {
        c.volume_mounts
            .iter()
            .flatten()
            .find(|m| m.name == DATA_VOLUME_NAME)
            .cloned()
            .expect("data mount")
    }

    fn volume<'a>(pod: &'a PodSpec, name: &str) -> Option<&'a Volume> {
        pod.volumes.iter().flatten().find(|v| v.name == name)
    }

    fn sidecar(name: &str) -> SidecarSpec {
        SidecarSpec {
            name: name.to_string(),
            image: "busybox".to_string(),
            ..Default::default()
        }
    }

    // =========================================================================
    // Basic layout
    // =========================================================================

    #[test]
    fn git_source_without_storage_uses_transient_volume() {
        let pod = build(&git_spec());

        let data = volume(&pod, DATA_VOLUME_NAME).expect("data volume");
        assert!(data.empty_dir.is_some());
        assert!(data.persistent_volume_claim.is_none());

        let init = pod.init_containers.as_ref().expect("init containers");
        let names: Vec<&str> = init.iter().map(|c| c.name.as_str()).collect();
        assert_eq!(names, vec!["git-clone", "setup-venv"]);
        assert_eq!(init[0].image.as_deref(), Some("alpine/git:latest"));

        assert_eq!(pod.containers.len(), 1);
        let marimo = &pod.containers[0];
        assert_eq!(marimo.name, "marimo");
        assert_eq!(marimo.command, Some(vec!["marimo".to_string()]));
        assert_eq!(marimo.working_dir.as_deref(), Some(NOTEBOOK_DIR));
        let ports = marimo.ports.as_ref().expect("ports");
        assert_eq!(ports[0].container_port, 2718);
        assert_eq!(ports[0].name.as_deref(), Some("http"));
    }

    #[test]
    fn clone_is_skipped_when_repository_exists() {
        let pod = build(&git_spec());
        let command = pod.init_containers.as_ref().expect("init")[0]
            .command
            .clone()
            .expect("command");
        assert_eq!(command[..2], ["sh".to_string(), "-c".to_string()]);
        assert_eq!(
            command[2],
            "if [ -d /home/marimo/notebooks/.git ]; then echo 'Repository already exists, skipping clone'; \
             else git clone --depth 1 https://github.com/marimo-team/marimo.git /home/marimo/notebooks; fi"
        );
    }

    #[test]
    fn venv_setup_always_runs_with_notebook_image() {
        let spec = MarimoNotebookSpec {
            image: "custom/marimo:1".to_string(),
            ..Default::default()
        };
        let pod = build(&spec);
        let init = pod.init_containers.as_ref().expect("init");
        assert_eq!(init.len(), 1);
        assert_eq!(init[0].name, "setup-venv");
        assert_eq!(init[0].image.as_deref(), Some("custom/marimo:1"));
        assert_eq!(
            init[0].command.as_ref().expect("command")[2],
            "if [ ! -f /opt/venv/bin/python ]; then echo 'Creating venv...'; uv venv /opt/venv; fi"
        );
    }

    #[test]
    fn storage_backs_data_volume_with_claim_named_after_notebook() {
        let spec = MarimoNotebookSpec {
            storage: Some(StorageSpec {
                size: "2Gi".to_string(),
                storage_class_name: None,
            }),
            ..git_spec()
        };
        let pod = build(&spec);
        let claim = volume(&pod, DATA_VOLUME_NAME)
            .and_then(|v| v.persistent_volume_claim.as_ref())
            .expect("pvc volume");
        assert_eq!(claim.claim_name, "demo");
    }

    // =========================================================================
    // Inline content
    // =========================================================================

    #[test]
    fn inline_content_is_copied_and_served_in_sandbox() {
        let spec = MarimoNotebookSpec {
            content: Some("import marimo\napp = marimo.App()".to_string()),
            ..Default::default()
        };
        let pod = build(&spec);

        let init = pod.init_containers.as_ref().expect("init");
        assert_eq!(init[0].name, "copy-content");
        assert_eq!(init[0].image.as_deref(), Some("busybox:1.36"));
        assert_eq!(
            init[0].command.as_ref().expect("command")[2],
            "cp /content/notebook.py /home/marimo/notebooks/notebook.py"
        );

        let content = volume(&pod, CONTENT_VOLUME_NAME).expect("content volume");
        assert_eq!(
            content.config_map.as_ref().map(|c| c.name.as_str()),
            Some("demo-content")
        );

        let args = args(&pod);
        let tail: Vec<&str> = args.iter().rev().take(2).map(String::as_str).collect();
        assert_eq!(tail, vec!["/home/marimo/notebooks/notebook.py", "--sandbox"]);
    }

    #[test]
    fn markdown_content_keeps_md_extension() {
        let spec = MarimoNotebookSpec {
            content: Some("---\ntitle: Demo\n---\n# Hello".to_string()),
            ..Default::default()
        };
        let pod = build(&spec);
        assert_eq!(
            args(&pod).last().map(String::as_str),
            Some("/home/marimo/notebooks/notebook.md")
        );
    }

    #[test]
    fn without_content_marimo_serves_directory() {
        let pod = build(&git_spec());
        let args = args(&pod);
        assert_eq!(args.last().map(String::as_str), Some(NOTEBOOK_DIR));
        assert!(!args.contains(&"--sandbox".to_string()));
        assert!(volume(&pod, CONTENT_VOLUME_NAME).is_none());
    }

    // =========================================================================
    // Command line and auth
    // =========================================================================

    #[test]
    fn args_start_with_mode_host_and_port() {
        let spec = MarimoNotebookSpec {
            port: 8080,
            mode: marimo_common::crd::NotebookMode::Run,
            ..git_spec()
        };
        let args = args(&build(&spec));
        assert_eq!(args[..4], ["run", "--headless", "--host=0.0.0.0", "--port=8080"]);
    }

    #[test]
    fn absent_auth_keeps_generated_token() {
        let args = args(&build(&git_spec()));
        assert!(!args.contains(&"--no-token".to_string()));
        assert!(!args.contains(&"--token-password-file".to_string()));
    }

    #[test]
    fn empty_auth_disables_token() {
        let spec = MarimoNotebookSpec {
            auth: Some(AuthSpec::default()),
            ..git_spec()
        };
        assert!(args(&build(&spec)).contains(&"--no-token".to_string()));
    }

    #[test]
    fn password_auth_mounts_secret_file() {
        let spec = MarimoNotebookSpec {
            auth: Some(AuthSpec {
                password: Some(PasswordSecretRef {
                    secret_key_ref: SecretKeyRef {
                        name: "marimo-secret".to_string(),
                        key: "pw".to_string(),
                    },
                }),
            }),
            ..git_spec()
        };
        let pod = build(&spec);

        let args = args(&pod);
        let idx = args
            .iter()
            .position(|a| a == "--token-password-file")
            .expect("password flag");
        assert_eq!(args[idx + 1], "/etc/marimo/password");
        assert!(!args.contains(&"--no-token".to_string()));

        let secret = volume(&pod, "auth-secret")
            .and_then(|v| v.secret.as_ref())
            .expect("secret volume");
        assert_eq!(secret.secret_name.as_deref(), Some("marimo-secret"));
        let items = secret.items.as_ref().expect("items");
        assert_eq!(items[0].key, "pw");
        assert_eq!(items[0].path, "password");

        let marimo = container(&pod, MARIMO_CONTAINER);
        assert!(marimo
            .volume_mounts
            .iter()
            .flatten()
            .any(|m| m.name == "auth-secret" && m.read_only == Some(true)));
    }

    // =========================================================================
    // Environment and resources
    // =========================================================================

    #[test]
    fn user_env_follows_baseline() {
        let spec = MarimoNotebookSpec {
            env: vec![env_var("DEBUG", "true"), env_var("UV", "/custom/uv")],
            ..git_spec()
        };
        let pod = build(&spec);
        let env = container(&pod, MARIMO_CONTAINER).env.clone().expect("env");

        assert_eq!(env[0].name, "VIRTUAL_ENV");
        assert_eq!(env[0].value.as_deref(), Some("/opt/venv"));
        let debug = env.iter().position(|e| e.name == "DEBUG").expect("DEBUG");
        let baseline_uv = env.iter().position(|e| e.name == "UV").expect("UV");
        let user_uv = env.iter().rposition(|e| e.name == "UV").expect("UV");
        assert!(baseline_uv < debug && debug < user_uv);
        assert_eq!(env[user_uv].value.as_deref(), Some("/custom/uv"));
    }

    #[test]
    fn resources_pass_through_to_marimo() {
        let spec = MarimoNotebookSpec {
            resources: Some(ResourcesSpec {
                requests: Some(BTreeMap::from([(
                    "cpu".to_string(),
                    Quantity("500m".to_string()),
                )])),
                limits: Some(BTreeMap::from([(
                    "memory".to_string(),
                    Quantity("2Gi".to_string()),
                )])),
            }),
            ..git_spec()
        };
        let pod = build(&spec);
        let resources = container(&pod, MARIMO_CONTAINER)
            .resources
            .clone()
            .expect("resources");
        assert_eq!(resources.requests.expect("requests")["cpu"].0, "500m");
        assert_eq!(resources.limits.expect("limits")["memory"].0, "2Gi");
    }

    #[test]
    fn no_resources_means_none() {
        let pod = build(&git_spec());
        assert!(container(&pod, MARIMO_CONTAINER).resources.is_none());
    }

    // =========================================================================
    // Sidecars and mount propagation
    // =========================================================================

    #[test]
    fn cw_mount_sets_propagation_on_both_sides() {
        let spec = MarimoNotebookSpec {
            storage: Some(StorageSpec::default()),
            mounts: vec!["cw://mybucket/data".to_string()],
            ..Default::default()
        };
        let pod = build(&spec);

        assert_eq!(pod.containers.len(), 2);
        let cw = container(&pod, "cw-0");
        assert_eq!(
            cw.security_context.as_ref().and_then(|s| s.privileged),
            Some(true)
        );
        assert_eq!(cw.env.as_ref().map(Vec::len), Some(2));
        assert_eq!(
            data_mount_of(cw).mount_propagation.as_deref(),
            Some("Bidirectional")
        );
        assert_eq!(
            data_mount_of(container(&pod, MARIMO_CONTAINER))
                .mount_propagation
                .as_deref(),
            Some("HostToContainer")
        );
    }

    #[test]
    fn unprivileged_sidecars_leave_propagation_unset() {
        let spec = MarimoNotebookSpec {
            storage: Some(StorageSpec::default()),
            mounts: vec!["rsync://u@h:/data".to_string()],
            sidecars: vec![sidecar("helper")],
            ..Default::default()
        };
        let pod = build(&spec);

        for c in &pod.containers {
            assert!(data_mount_of(c).mount_propagation.is_none(), "{}", c.name);
        }
    }

    #[test]
    fn explicit_privileged_sidecar_gets_bidirectional_mount() {
        let mut fuse = sidecar("fuse");
        fuse.security_context = Some(SecurityContext {
            privileged: Some(true),
            ..Default::default()
        });
        let spec = MarimoNotebookSpec {
            storage: Some(StorageSpec::default()),
            sidecars: vec![fuse],
            ..Default::default()
        };
        let pod = build(&spec);
        assert_eq!(
            data_mount_of(container(&pod, "fuse")).mount_propagation.as_deref(),
            Some("Bidirectional")
        );
    }

    #[test]
    fn mount_sidecars_precede_explicit_sidecars() {
        let spec = MarimoNotebookSpec {
            storage: Some(StorageSpec::default()),
            mounts: vec!["sshfs://u@h:/a".to_string(), "cw://bucket".to_string()],
            sidecars: vec![sidecar("explicit")],
            ..Default::default()
        };
        let pod = build(&spec);
        let names: Vec<&str> = pod.containers.iter().map(|c| c.name.as_str()).collect();
        assert_eq!(names, vec!["marimo", "sshfs-0", "cw-1", "explicit"]);
    }

    #[test]
    fn sshfs_sidecars_receive_key_secret() {
        let spec = MarimoNotebookSpec {
            storage: Some(StorageSpec::default()),
            sidecars: vec![sidecar("sshfs-0"), sidecar("other")],
            ..Default::default()
        };
        let pod = build(&spec);

        let key = volume(&pod, "ssh-pubkey")
            .and_then(|v| v.secret.as_ref())
            .expect("key volume");
        assert_eq!(key.secret_name.as_deref(), Some("ssh-pubkey"));

        let has_key = |c: &Container| {
            c.volume_mounts.iter().flatten().any(|m| {
                m.name == "ssh-pubkey"
                    && m.mount_path == "/config/ssh-pubkey"
                    && m.read_only == Some(true)
            })
        };
        assert!(has_key(container(&pod, "sshfs-0")));
        assert!(!has_key(container(&pod, "other")));
        assert!(!has_key(container(&pod, MARIMO_CONTAINER)));
    }

    #[test]
    fn no_sshfs_sidecar_means_no_key_volume() {
        let spec = MarimoNotebookSpec {
            storage: Some(StorageSpec::default()),
            sidecars: vec![sidecar("helper")],
            ..Default::default()
        };
        assert!(volume(&build(&spec), "ssh-pubkey").is_none());
    }

    #[test]
    fn sidecar_fields_pass_through() {
        let mut s = sidecar("proxy");
        s.expose_port = Some(8080);
        s.command = vec!["/bin/proxy".to_string()];
        s.args = vec!["--verbose".to_string()];
        s.env = vec![env_var("MODE", "fast")];
        let spec = MarimoNotebookSpec {
            storage: Some(StorageSpec::default()),
            sidecars: vec![s],
            ..Default::default()
        };
        let pod = build(&spec);
        let proxy = container(&pod, "proxy");

        assert_eq!(proxy.image.as_deref(), Some("busybox"));
        assert_eq!(proxy.command, Some(vec!["/bin/proxy".to_string()]));
        assert_eq!(proxy.args, Some(vec!["--verbose".to_string()]));
        assert_eq!(proxy.env.as_ref().map(Vec::len), Some(1));
        let port = &proxy.ports.as_ref().expect("ports")[0];
        assert_eq!(port.container_port, 8080);
        assert_eq!(port.name.as_deref(), Some("proxy"));
        assert_eq!(data_mount_of(proxy).mount_path, NOTEBOOK_DIR);
    }

    // =========================================================================
    // Overrides and determinism
    // =========================================================================

    #[test]
    fn pod_overrides_merge_into_generated_spec() {
        let spec = MarimoNotebookSpec {
            pod_overrides: Some(json!({
                "nodeSelector": {"gpu": "true"},
                "containers": [{"name": "marimo", "imagePullPolicy": "Always"}]
            })),
            ..git_spec()
        };
        let pod = build(&spec);
        assert_eq!(
            pod.node_selector.as_ref().map(|n| n["gpu"].as_str()),
            Some("true")
        );
        let marimo = container(&pod, MARIMO_CONTAINER);
        assert_eq!(marimo.image_pull_policy.as_deref(), Some("Always"));
        assert!(marimo.args.is_some());
        assert_eq!(pod.init_containers.as_ref().map(Vec::len), Some(2));
    }

    #[test]
    fn compile_is_deterministic() {
        let spec = MarimoNotebookSpec {
            storage: Some(StorageSpec::default()),
            content: Some("import marimo".to_string()),
            mounts: vec!["cw://a".to_string(), "sshfs://u@h:/b".to_string()],
            auth: Some(AuthSpec::default()),
            ..Default::default()
        };
        assert_eq!(build(&spec), build(&spec));
    }
}
