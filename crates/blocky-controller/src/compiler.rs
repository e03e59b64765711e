//! Blocky to Deployment compilation
//!
//! `compile_deployment` is pure: the same Blocky and image always produce the
//! same Deployment (label maps are `BTreeMap`, so serialization order is
//! fixed). Drift is judged on a small structural projection of the object
//! rather than a deep comparison, because the API server fills in defaults
//! the compiler never sets.

use std::collections::BTreeMap;

use k8s_openapi::api::apps::v1::{Deployment, DeploymentSpec};
use k8s_openapi::api::core::v1::{
    Capabilities, Container, ContainerPort, PodSecurityContext, PodSpec, PodTemplateSpec,
    SeccompProfile, SecurityContext,
};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::{LabelSelector, ObjectMeta, OwnerReference};
use kube::Resource;

use blocky_common::crd::Blocky;
use blocky_common::{Error, Result, CONTROLLER_NAME};

/// Name of the operand container and of its port
pub const CONTAINER_NAME: &str = "blocky";

/// UID the operand runs as
const RUN_AS_USER: i64 = 1001;

/// Longest value Kubernetes accepts for a label
const MAX_LABEL_VALUE_LEN: usize = 63;

/// Compile the Deployment a Blocky should own
///
/// The Deployment has the Blocky's name and namespace, `size` replicas, one
/// container exposing `containerPort`, and a controller owner reference back
/// to the Blocky. Fails only when the Blocky lacks name, namespace or uid.
pub fn compile_deployment(blocky: &Blocky, image: &str) -> Result<Deployment> {
    let name = blocky
        .meta()
        .name
        .clone()
        .ok_or_else(|| Error::validation("Blocky is missing metadata.name"))?;
    let namespace = blocky.meta().namespace.clone().ok_or_else(|| {
        Error::validation_for_field(&name, "metadata.namespace", "Blocky is missing a namespace")
    })?;
    let uid = blocky.meta().uid.clone().ok_or_else(|| {
        Error::validation_for_field(&name, "metadata.uid", "Blocky has not been persisted yet")
    })?;

    let labels = labels_for(&name, image);

    let owner = OwnerReference {
        api_version: Blocky::api_version(&()).to_string(),
        kind: Blocky::kind(&()).to_string(),
        name: name.clone(),
        uid,
        controller: Some(true),
        block_owner_deletion: Some(true),
    };

    let container = Container {
        name: CONTAINER_NAME.to_string(),
        image: Some(image.to_string()),
        image_pull_policy: Some("IfNotPresent".to_string()),
        ports: Some(vec![ContainerPort {
            name: Some(CONTAINER_NAME.to_string()),
            container_port: blocky.spec.container_port,
            ..Default::default()
        }]),
        security_context: Some(SecurityContext {
            run_as_non_root: Some(true),
            run_as_user: Some(RUN_AS_USER),
            allow_privilege_escalation: Some(false),
            capabilities: Some(Capabilities {
                drop: Some(vec!["ALL".to_string()]),
                ..Default::default()
            }),
            ..Default::default()
        }),
        ..Default::default()
    };

    Ok(Deployment {
        metadata: ObjectMeta {
            name: Some(name),
            namespace: Some(namespace),
            labels: Some(labels.clone()),
            owner_references: Some(vec![owner]),
            ..Default::default()
        },
        spec: Some(DeploymentSpec {
            replicas: Some(blocky.spec.size),
            selector: LabelSelector {
                match_labels: Some(labels.clone()),
                ..Default::default()
            },
            template: PodTemplateSpec {
                metadata: Some(ObjectMeta {
                    labels: Some(labels),
                    ..Default::default()
                }),
                spec: Some(PodSpec {
                    security_context: Some(PodSecurityContext {
                        run_as_non_root: Some(true),
                        seccomp_profile: Some(SeccompProfile {
                            type_: "RuntimeDefault".to_string(),
                            ..Default::default()
                        }),
                        ..Default::default()
                    }),
                    containers: vec![container],
                    ..Default::default()
                }),
            },
            ..Default::default()
        }),
        ..Default::default()
    })
}

/// Recommended app.kubernetes.io labels for a Blocky's workload
fn labels_for(name: &str, image: &str) -> BTreeMap<String, String> {
    let mut labels = BTreeMap::new();
    labels.insert("app.kubernetes.io/name".to_string(), "Blocky".to_string());
    labels.insert("app.kubernetes.io/instance".to_string(), name.to_string());
    labels.insert(
        "app.kubernetes.io/part-of".to_string(),
        CONTROLLER_NAME.to_string(),
    );
    labels.insert(
        "app.kubernetes.io/managed-by".to_string(),
        CONTROLLER_NAME.to_string(),
    );
    if let Some(tag) = image_tag(image) {
        labels.insert("app.kubernetes.io/version".to_string(), tag.to_string());
    }
    labels
}

/// Tag of an image reference, ignoring registry ports and digests
fn image_tag(image: &str) -> Option<&str> {
    let without_digest = image.split('@').next().unwrap_or(image);
    let last_segment = without_digest.rsplit('/').next().unwrap_or(without_digest);
    last_segment
        .split_once(':')
        .map(|(_, tag)| tag)
        .filter(|tag| !tag.is_empty() && tag.len() <= MAX_LABEL_VALUE_LEN)
}

/// Controller owner reference fields that link a Deployment to its Blocky
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct OwnerLink {
    /// Owner apiVersion
    pub api_version: String,
    /// Owner kind
    pub kind: String,
    /// Owner name
    pub name: String,
    /// Owner uid
    pub uid: String,
}

/// The fields of a Deployment the controller owns
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct WorkloadShape {
    /// `spec.replicas`
    pub replicas: Option<i32>,
    /// Container port of the operand container
    pub container_port: Option<i32>,
    /// The controller owner reference, if any
    pub owner: Option<OwnerLink>,
}

impl WorkloadShape {
    /// Project a Deployment onto its structural fields
    pub fn of(deployment: &Deployment) -> Self {
        let spec = deployment.spec.as_ref();
        let container_port = spec
            .and_then(|s| s.template.spec.as_ref())
            .and_then(|pod| pod.containers.iter().find(|c| c.name == CONTAINER_NAME))
            .and_then(|c| c.ports.as_ref())
            .and_then(|ports| ports.first())
            .map(|p| p.container_port);
        let owner = deployment
            .metadata
            .owner_references
            .iter()
            .flatten()
            .find(|r| r.controller == Some(true))
            .map(|r| OwnerLink {
                api_version: r.api_version.clone(),
                kind: r.kind.clone(),
                name: r.name.clone(),
                uid: r.uid.clone(),
            });

        Self {
            replicas: spec.and_then(|s| s.replicas),
            container_port,
            owner,
        }
    }
}

/// Whether the observed Deployment differs from the target on owned fields
pub fn has_drift(observed: &Deployment, target: &Deployment) -> bool {
    WorkloadShape::of(observed) != WorkloadShape::of(target)
}

/// Update object for a drifted Deployment
///
/// Starts from `observed` (keeping its resourceVersion and any server-side
/// or third-party fields) and replaces only the structural fields with the
/// target's values.
pub fn overlay_structural(observed: &Deployment, target: &Deployment) -> Deployment {
    let mut updated = observed.clone();
    updated.status = None;

    let target_controller = target
        .metadata
        .owner_references
        .iter()
        .flatten()
        .find(|r| r.controller == Some(true))
        .cloned();
    let mut owners: Vec<OwnerReference> = updated
        .metadata
        .owner_references
        .take()
        .unwrap_or_default()
        .into_iter()
        .filter(|r| r.controller != Some(true))
        .collect();
    owners.extend(target_controller);
    updated.metadata.owner_references = Some(owners);

    let Some(target_spec) = target.spec.as_ref() else {
        return updated;
    };
    let spec = updated.spec.get_or_insert_with(|| target_spec.clone());
    spec.replicas = target_spec.replicas;

    let Some(target_container) = target_spec
        .template
        .spec
        .as_ref()
        .and_then(|pod| pod.containers.iter().find(|c| c.name == CONTAINER_NAME))
    else {
        return updated;
    };
    match spec.template.spec.as_mut() {
        Some(pod) => match pod.containers.iter_mut().find(|c| c.name == CONTAINER_NAME) {
            Some(container) => container.ports = target_container.ports.clone(),
            None => pod.containers.push(target_container.clone()),
        },
        None => spec.template.spec = target_spec.template.spec.clone(),
    }

    updated
}
