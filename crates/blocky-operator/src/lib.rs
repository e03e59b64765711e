//! Blocky operator: CRD installation and controller wiring

pub mod controller_runner;

use k8s_openapi::apiextensions_apiserver::pkg::apis::apiextensions::v1::CustomResourceDefinition;
use kube::api::{Api, Patch, PatchParams};
use kube::{Client, CustomResourceExt};

use blocky_common::crd::Blocky;
use blocky_common::CONTROLLER_NAME;

/// Render the Blocky CRD as YAML
pub fn crd_yaml() -> anyhow::Result<String> {
    serde_yaml::to_string(&Blocky::crd())
        .map_err(|e| anyhow::anyhow!("Failed to serialize CRD: {}", e))
}

/// Install or upgrade the Blocky CRD with server-side apply
///
/// Keeps the served schema in step with the running operator version.
pub async fn ensure_crd_installed(client: &Client) -> anyhow::Result<()> {
    let crds: Api<CustomResourceDefinition> = Api::all(client.clone());
    let params = PatchParams::apply(CONTROLLER_NAME).force();

    let crd = Blocky::crd();
    let name = crd.metadata.name.clone().unwrap_or_default();
    tracing::info!(crd = %name, "Installing Blocky CRD");
    crds.patch(&name, &params, &Patch::Apply(&crd))
        .await
        .map_err(|e| anyhow::anyhow!("Failed to install Blocky CRD: {}", e))?;

    Ok(())
}
