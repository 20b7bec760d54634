//! Operator-wide configuration threaded into the desired-state builders
//!
//! The binary resolves these values once (CLI flags with environment
//! fallbacks) and hands the struct to every compile call. Builders never
//! read the process environment themselves.

/// Default image for the content copy init container
pub const DEFAULT_INIT_IMAGE: &str = "busybox:1.36";

/// Default image for the git clone init container
pub const DEFAULT_GIT_IMAGE: &str = "alpine/git:latest";

/// Default image for sshfs and rsync mount sidecars
pub const DEFAULT_ALPINE_IMAGE: &str = "alpine:latest";

/// Default image for cw:// (S3) mount sidecars
pub const DEFAULT_S3FS_IMAGE: &str = "ghcr.io/marimo-team/marimo-operator/s3fs:latest";

/// Default S3-compatible endpoint used when the sidecar has no `S3_ENDPOINT`
pub const DEFAULT_S3_ENDPOINT: &str = "https://cwobject.com";

/// Images and endpoints used when generating managed objects
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct OperatorConfig {
    /// Image for the `copy-content` init container
    pub init_image: String,
    /// Image for the `git-clone` init container
    pub git_image: String,
    /// Image for sshfs/rsync sidecars
    pub alpine_image: String,
    /// Image for s3fs sidecars
    pub s3fs_image: String,
    /// Fallback S3 endpoint baked into the s3fs command line
    pub s3_endpoint: String,
}

impl Default for OperatorConfig {
    fn default() -> Self {
        Self {
            init_image: DEFAULT_INIT_IMAGE.to_string(),
            git_image: DEFAULT_GIT_IMAGE.to_string(),
            alpine_image: DEFAULT_ALPINE_IMAGE.to_string(),
            s3fs_image: DEFAULT_S3FS_IMAGE.to_string(),
            s3_endpoint: DEFAULT_S3_ENDPOINT.to_string(),
        }
    }
}
