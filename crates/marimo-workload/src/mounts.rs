//! Mount URI expansion
//!
//! `spec.mounts` entries are high-level data source URIs. Each supported URI
//! becomes one sidecar that mounts or synchronizes the data under the shared
//! notebook directory:
//!
//! - `cw://bucket[/subpath][:/mount]` → privileged s3fs sidecar (`cw-N`)
//! - `sshfs://user@host:/remote[:/mount]` → privileged sshfs sidecar (`sshfs-N`)
//! - `rsync://user@host:/remote[:/mount]` → unprivileged pull-then-push loop (`rsync-N`)
//!
//! `N` is the URI's index in the input list, so reordering `spec.mounts`
//! renames the generated sidecars. Unknown schemes and URIs missing their
//! bucket or host are skipped without error.

use k8s_openapi::api::core::v1::{EnvVar, EnvVarSource, SecretKeySelector, SecurityContext};
use marimo_common::crd::SidecarSpec;
use marimo_common::OperatorConfig;
use tracing::debug;

use crate::NOTEBOOK_DIR;

/// Secret holding S3 credentials for cw:// mounts
pub const CW_CREDENTIALS_SECRET: &str = "cw-credentials";

/// Access key id entry in [`CW_CREDENTIALS_SECRET`]
pub const CW_ACCESS_KEY_ID: &str = "AWS_ACCESS_KEY_ID";

/// Secret access key entry in [`CW_CREDENTIALS_SECRET`]
pub const CW_SECRET_ACCESS_KEY: &str = "AWS_SECRET_ACCESS_KEY";

/// Name prefix of sidecars that receive the ssh key secret
pub const SSHFS_SIDECAR_PREFIX: &str = "sshfs-";

/// Where the ssh key secret is mounted inside sshfs sidecars
pub const SSH_KEY_MOUNT_PATH: &str = "/config/ssh-pubkey";

/// Private half of the key pair, used as the sshfs client identity
pub const SSH_KEY_FILE: &str = "ssh-privatekey";

/// Public half of the key pair, advertised through `PUBLIC_KEY_FILE`
pub const SSH_PUBLIC_KEY_FILE: &str = "ssh-publickey";

const CW_SCHEME: &str = "cw://";
const SSHFS_SCHEME: &str = "sshfs://";
const RSYNC_SCHEME: &str = "rsync://";

const SSH_OPTS: &str = "-o StrictHostKeyChecking=accept-new";

// =============================================================================
// Parsed URIs
// =============================================================================

/// `cw://bucket[/subpath][:/mount]`
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BucketMount {
    /// Bucket name
    pub bucket: String,
    /// Path inside the bucket
    pub subpath: Option<String>,
    /// Explicit local mount point
    pub mount_point: Option<String>,
}

impl BucketMount {
    /// Parse a `cw://` URI. Returns `None` for other schemes or an empty bucket.
    pub fn parse(uri: &str) -> Option<Self> {
        let rest = uri.strip_prefix(CW_SCHEME)?;
        let (rest, mount_point) = split_mount_point(rest);

        let (bucket, subpath) = match rest.split_once('/') {
            Some((bucket, subpath)) => (bucket, non_empty(subpath)),
            None => (rest, None),
        };
        if bucket.is_empty() {
            return None;
        }

        Some(Self {
            bucket: bucket.to_string(),
            subpath,
            mount_point,
        })
    }

    /// Render back to URI form
    pub fn to_uri(&self) -> String {
        let mut uri = format!("{CW_SCHEME}{}", self.bucket);
        if let Some(subpath) = &self.subpath {
            uri.push('/');
            uri.push_str(subpath);
        }
        if let Some(mount) = &self.mount_point {
            uri.push(':');
            uri.push_str(mount);
        }
        uri
    }

    /// Remote spec passed to s3fs: `bucket` or `bucket:/subpath`
    fn s3fs_remote(&self) -> String {
        match &self.subpath {
            Some(subpath) => format!("{}:/{}", self.bucket, subpath),
            None => self.bucket.clone(),
        }
    }
}

/// `scheme://user@host:/remote[:/mount]` for sshfs and rsync
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RemoteMount {
    /// ssh destination, `user@host` or `host`
    pub target: String,
    /// Absolute path on the remote host
    pub remote_path: String,
    /// Explicit local mount point
    pub mount_point: Option<String>,
}

impl RemoteMount {
    /// Parse the part after the scheme. Returns `None` when host or path is missing.
    fn parse_after_scheme(rest: &str) -> Option<Self> {
        let (target, path) = rest.split_once(":/")?;
        let host = target.rsplit_once('@').map_or(target, |(_, host)| host);
        if target.is_empty() || host.is_empty() {
            return None;
        }

        // `path` lost its leading slash to the split above
        let path = format!("/{path}");
        let (remote_path, mount_point) = split_mount_point(&path);

        Some(Self {
            target: target.to_string(),
            remote_path: remote_path.to_string(),
            mount_point,
        })
    }

    /// Parse an `sshfs://` URI
    pub fn parse_sshfs(uri: &str) -> Option<Self> {
        Self::parse_after_scheme(uri.strip_prefix(SSHFS_SCHEME)?)
    }

    /// Parse an `rsync://` URI
    pub fn parse_rsync(uri: &str) -> Option<Self> {
        Self::parse_after_scheme(uri.strip_prefix(RSYNC_SCHEME)?)
    }

    fn to_uri(&self, scheme: &str) -> String {
        let mut uri = format!("{scheme}{}:{}", self.target, self.remote_path);
        if let Some(mount) = &self.mount_point {
            uri.push(':');
            uri.push_str(mount);
        }
        uri
    }

    fn remote_spec(&self) -> String {
        format!("{}:{}", self.target, self.remote_path)
    }
}

/// A recognized mount URI
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum MountUri {
    /// S3-compatible bucket via s3fs
    Cw(BucketMount),
    /// Remote directory via sshfs
    Sshfs(RemoteMount),
    /// Remote directory synchronized with rsync
    Rsync(RemoteMount),
}

impl MountUri {
    /// Parse any supported URI. Unknown schemes and malformed URIs yield `None`.
    pub fn parse(uri: &str) -> Option<Self> {
        if uri.starts_with(CW_SCHEME) {
            BucketMount::parse(uri).map(Self::Cw)
        } else if uri.starts_with(SSHFS_SCHEME) {
            RemoteMount::parse_sshfs(uri).map(Self::Sshfs)
        } else if uri.starts_with(RSYNC_SCHEME) {
            RemoteMount::parse_rsync(uri).map(Self::Rsync)
        } else {
            None
        }
    }

    /// Render back to URI form; the scheme prefix follows the variant
    pub fn to_uri(&self) -> String {
        match self {
            Self::Cw(m) => m.to_uri(),
            Self::Sshfs(m) => m.to_uri(SSHFS_SCHEME),
            Self::Rsync(m) => m.to_uri(RSYNC_SCHEME),
        }
    }

    /// Short scheme name used as the sidecar name prefix
    pub fn scheme(&self) -> &'static str {
        match self {
            Self::Cw(_) => "cw",
            Self::Sshfs(_) => "sshfs",
            Self::Rsync(_) => "rsync",
        }
    }

    fn mount_point(&self) -> Option<&str> {
        match self {
            Self::Cw(m) => m.mount_point.as_deref(),
            Self::Sshfs(m) | Self::Rsync(m) => m.mount_point.as_deref(),
        }
    }
}

/// Split a trailing `:/mount` off `s`. The last `:/` wins; position 0 is not a separator.
fn split_mount_point(s: &str) -> (&str, Option<String>) {
    match s.rfind(":/") {
        Some(idx) if idx > 0 => (&s[..idx], Some(s[idx + 1..].to_string())),
        _ => (s, None),
    }
}

fn non_empty(s: &str) -> Option<String> {
    (!s.is_empty()).then(|| s.to_string())
}

// =============================================================================
// Expansion
// =============================================================================

/// Expand mount URIs into sidecar specs, preserving input order.
pub fn expand_mounts(uris: &[String], config: &OperatorConfig) -> Vec<SidecarSpec> {
    uris.iter()
        .enumerate()
        .filter_map(|(index, uri)| {
            let Some(mount) = MountUri::parse(uri) else {
                debug!(uri = %uri, index, "ignoring unsupported or malformed mount URI");
                return None;
            };
            Some(build_sidecar(&mount, index, config))
        })
        .collect()
}

fn build_sidecar(mount: &MountUri, index: usize, config: &OperatorConfig) -> SidecarSpec {
    let name = format!("{}-{}", mount.scheme(), index);
    let mount_point = mount
        .mount_point()
        .map(str::to_string)
        .unwrap_or_else(|| default_mount_point(&name));

    match mount {
        MountUri::Cw(bucket) => cw_sidecar(name, bucket, &mount_point, config),
        MountUri::Sshfs(remote) => sshfs_sidecar(name, remote, &mount_point, config),
        MountUri::Rsync(remote) => rsync_sidecar(name, remote, &mount_point, config),
    }
}

/// Mount point used when the URI does not name one
pub fn default_mount_point(sidecar_name: &str) -> String {
    format!("{NOTEBOOK_DIR}/mounts/{sidecar_name}")
}

fn privileged() -> Option<SecurityContext> {
    Some(SecurityContext {
        privileged: Some(true),
        ..Default::default()
    })
}

fn secret_env(name: &str, secret: &str, key: &str) -> EnvVar {
    EnvVar {
        name: name.to_string(),
        value_from: Some(EnvVarSource {
            secret_key_ref: Some(SecretKeySelector {
                name: secret.to_string(),
                key: key.to_string(),
                ..Default::default()
            }),
            ..Default::default()
        }),
        ..Default::default()
    }
}

fn cw_sidecar(
    name: String,
    bucket: &BucketMount,
    mount_point: &str,
    config: &OperatorConfig,
) -> SidecarSpec {
    let script = format!(
        "mkdir -p {mount} && \
         echo \"$AWS_ACCESS_KEY_ID:$AWS_SECRET_ACCESS_KEY\" > /etc/passwd-s3fs && \
         chmod 600 /etc/passwd-s3fs && \
         s3fs {remote} {mount} \
         -o passwd_file=/etc/passwd-s3fs \
         -o url=${{S3_ENDPOINT:-{endpoint}}} \
         -o allow_other \
         -o umask=0000 \
         -f",
        mount = mount_point,
        remote = bucket.s3fs_remote(),
        endpoint = config.s3_endpoint,
    );

    SidecarSpec {
        name,
        image: config.s3fs_image.clone(),
        command: vec!["sh".to_string(), "-c".to_string()],
        args: vec![script],
        env: vec![
            secret_env(CW_ACCESS_KEY_ID, CW_CREDENTIALS_SECRET, CW_ACCESS_KEY_ID),
            secret_env(CW_SECRET_ACCESS_KEY, CW_CREDENTIALS_SECRET, CW_SECRET_ACCESS_KEY),
        ],
        security_context: privileged(),
        ..Default::default()
    }
}

fn sshfs_sidecar(
    name: String,
    remote: &RemoteMount,
    mount_point: &str,
    config: &OperatorConfig,
) -> SidecarSpec {
    let script = format!(
        "apk add --no-cache sshfs openssh-client >/dev/null && \
         mkdir -p {mount} && \
         exec sshfs -f {remote} {mount} \
         -o allow_other \
         -o reconnect \
         -o ServerAliveInterval=15 \
         {SSH_OPTS} \
         -o IdentityFile={SSH_KEY_MOUNT_PATH}/{SSH_KEY_FILE}",
        mount = mount_point,
        remote = remote.remote_spec(),
    );

    SidecarSpec {
        name,
        image: config.alpine_image.clone(),
        command: vec!["sh".to_string(), "-c".to_string()],
        args: vec![script],
        env: vec![EnvVar {
            name: "PUBLIC_KEY_FILE".to_string(),
            value: Some(format!("{SSH_KEY_MOUNT_PATH}/{SSH_PUBLIC_KEY_FILE}")),
            ..Default::default()
        }],
        security_context: privileged(),
        ..Default::default()
    }
}

fn rsync_sidecar(
    name: String,
    remote: &RemoteMount,
    mount_point: &str,
    config: &OperatorConfig,
) -> SidecarSpec {
    let script = format!(
        "apk add --no-cache rsync openssh-client inotify-tools >/dev/null && \
         mkdir -p {mount} && \
         rsync -az -e 'ssh {SSH_OPTS}' {remote}/ {mount}/ && \
         while inotifywait -r -qq -e modify,create,delete,move {mount}; do \
         rsync -az -e 'ssh {SSH_OPTS}' {mount}/ {remote}/; \
         done",
        mount = mount_point,
        remote = remote.remote_spec(),
    );

    SidecarSpec {
        name,
        image: config.alpine_image.clone(),
        command: vec!["sh".to_string(), "-c".to_string()],
        args: vec![script],
        ..Default::default()
    }
}
