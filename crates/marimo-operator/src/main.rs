//! marimo operator binary

use clap::Parser;
use kube::{Api, Client, CustomResourceExt};

use marimo_common::config::{
    DEFAULT_ALPINE_IMAGE, DEFAULT_GIT_IMAGE, DEFAULT_INIT_IMAGE, DEFAULT_S3FS_IMAGE,
    DEFAULT_S3_ENDPOINT,
};
use marimo_common::crd::MarimoNotebook;
use marimo_common::{OperatorConfig, FIELD_MANAGER};
use marimo_operator::controller_runner::run_notebook_controller;
use marimo_operator::telemetry::init_logging;

/// marimo operator - runs marimo notebooks on Kubernetes
#[derive(Parser, Debug)]
#[command(name = "marimo-operator", version, about, long_about = None)]
struct Cli {
    /// Print the MarimoNotebook CRD manifest and exit
    #[arg(long)]
    crd: bool,

    /// Emit logs as JSON lines
    #[arg(long, env = "LOG_JSON")]
    log_json: bool,

    /// Image for the content copy init container
    #[arg(long, env = "DEFAULT_INIT_IMAGE", default_value = DEFAULT_INIT_IMAGE)]
    init_image: String,

    /// Image for the git clone init container
    #[arg(long, env = "GIT_IMAGE", default_value = DEFAULT_GIT_IMAGE)]
    git_image: String,

    /// Image for sshfs and rsync mount sidecars
    #[arg(long, env = "ALPINE_IMAGE", default_value = DEFAULT_ALPINE_IMAGE)]
    alpine_image: String,

    /// Image for cw:// mount sidecars
    #[arg(long, env = "S3FS_IMAGE", default_value = DEFAULT_S3FS_IMAGE)]
    s3fs_image: String,

    /// S3 endpoint used by cw:// mounts without their own S3_ENDPOINT
    #[arg(long, env = "S3_ENDPOINT", default_value = DEFAULT_S3_ENDPOINT)]
    s3_endpoint: String,
}

impl Cli {
    fn operator_config(&self) -> OperatorConfig {
        OperatorConfig {
            init_image: self.init_image.clone(),
            git_image: self.git_image.clone(),
            alpine_image: self.alpine_image.clone(),
            s3fs_image: self.s3fs_image.clone(),
            s3_endpoint: self.s3_endpoint.clone(),
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    if cli.crd {
        let crd = serde_yaml::to_string(&MarimoNotebook::crd())
            .map_err(|e| anyhow::anyhow!("Failed to serialize CRD: {}", e))?;
        println!("{crd}");
        return Ok(());
    }

    init_logging(cli.log_json)?;

    let config = cli.operator_config();
    tracing::info!(?config, "starting marimo operator");

    let client = Client::try_default()
        .await
        .map_err(|e| anyhow::anyhow!("Failed to create Kubernetes client: {}", e))?;

    ensure_crds_installed(&client).await?;
    run_notebook_controller(client, config).await;

    Ok(())
}

/// Install the MarimoNotebook CRD with server-side apply so its version
/// always matches the operator's.
async fn ensure_crds_installed(client: &Client) -> anyhow::Result<()> {
    use k8s_openapi::apiextensions_apiserver::pkg::apis::apiextensions::v1::CustomResourceDefinition;
    use kube::api::{Patch, PatchParams};

    let crds: Api<CustomResourceDefinition> = Api::all(client.clone());
    let params = PatchParams::apply(FIELD_MANAGER).force();

    tracing::info!("Installing MarimoNotebook CRD...");
    crds.patch(
        MarimoNotebook::crd_name(),
        &params,
        &Patch::Apply(&MarimoNotebook::crd()),
    )
    .await
    .map_err(|e| anyhow::anyhow!("Failed to install MarimoNotebook CRD: {}", e))?;

    Ok(())
}
