//! Blocky CRD: a desired DNS-proxy workload of 1 to 3 replicas
//!
//! A Blocky is compiled into exactly one `apps/v1 Deployment` with the same
//! name and namespace, owned by the Blocky.

use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use super::types::Condition;

/// Smallest accepted replica count
pub const MIN_SIZE: i32 = 1;

/// Largest accepted replica count
pub const MAX_SIZE: i32 = 3;

/// Blocky describes how many replicas of the operand to run and which port
/// they listen on.
///
/// Example:
/// ```yaml
/// apiVersion: apps.blocky.dev/v1alpha1
/// kind: Blocky
/// metadata:
///   name: demo
///   namespace: dns
/// spec:
///   size: 1
///   containerPort: 53
/// ```
#[derive(CustomResource, Clone, Debug, Deserialize, Serialize, JsonSchema, PartialEq)]
#[kube(
    group = "apps.blocky.dev",
    version = "v1alpha1",
    kind = "Blocky",
    plural = "blockies",
    namespaced,
    status = "BlockyStatus",
    printcolumn = r#"{"name":"Size","type":"integer","jsonPath":".spec.size"}"#,
    printcolumn = r#"{"name":"Port","type":"integer","jsonPath":".spec.containerPort"}"#,
    printcolumn = r#"{"name":"Available","type":"string","jsonPath":".status.conditions[?(@.type==\"Available\")].status"}"#,
    printcolumn = r#"{"name":"Age","type":"date","jsonPath":".metadata.creationTimestamp"}"#
)]
#[serde(rename_all = "camelCase")]
pub struct BlockySpec {
    /// Number of replicas to run
    #[schemars(range(min = 1, max = 3))]
    pub size: i32,

    /// Port the operand container listens on
    #[schemars(range(min = 1))]
    pub container_port: i32,
}

impl BlockySpec {
    /// Check the spec against the accepted domain
    ///
    /// The API server enforces the same bounds through the generated schema;
    /// this guards objects written with validation disabled.
    pub fn validate(&self, name: &str) -> Result<(), crate::Error> {
        if !(MIN_SIZE..=MAX_SIZE).contains(&self.size) {
            return Err(crate::Error::validation_for_field(
                name,
                "spec.size",
                format!(
                    "size must be between {} and {}, got {}",
                    MIN_SIZE, MAX_SIZE, self.size
                ),
            ));
        }
        if self.container_port <= 0 {
            return Err(crate::Error::validation_for_field(
                name,
                "spec.containerPort",
                format!("containerPort must be positive, got {}", self.container_port),
            ));
        }
        Ok(())
    }
}

/// Blocky status
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct BlockyStatus {
    /// Ordered condition history, at most one entry per type
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub conditions: Vec<Condition>,
}

impl BlockyStatus {
    /// Look up a condition by type
    pub fn condition(&self, type_: &str) -> Option<&Condition> {
        self.conditions.iter().find(|c| c.type_ == type_)
    }
}

impl Blocky {
    /// Conditions currently recorded on the object
    pub fn conditions(&self) -> &[Condition] {
        self.status
            .as_ref()
            .map(|s| s.conditions.as_slice())
            .unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crd::ConditionStatus;
    use kube::CustomResourceExt;

    fn spec(size: i32, container_port: i32) -> BlockySpec {
        BlockySpec {
            size,
            container_port,
        }
    }

    #[test]
    fn accepts_sizes_in_range() {
        for size in MIN_SIZE..=MAX_SIZE {
            assert!(spec(size, 53).validate("demo").is_ok());
        }
    }

    #[test]
    fn rejects_out_of_range_size() {
        for size in [0, 4, -1] {
            let err = spec(size, 53).validate("demo").unwrap_err();
            match err {
                crate::Error::Validation { name, field, .. } => {
                    assert_eq!(name, "demo");
                    assert_eq!(field.as_deref(), Some("spec.size"));
                }
                other => panic!("expected validation error, got {other:?}"),
            }
        }
    }

    #[test]
    fn rejects_non_positive_port() {
        let err = spec(1, 0).validate("demo").unwrap_err();
        assert!(err.to_string().contains("containerPort"));
    }

    #[test]
    fn spec_uses_camel_case_on_the_wire() {
        let parsed: BlockySpec =
            serde_json::from_value(serde_json::json!({"size": 2, "containerPort": 5353})).unwrap();
        assert_eq!(parsed, spec(2, 5353));
    }

    #[test]
    fn crd_carries_group_plural_and_status() {
        let crd = Blocky::crd();
        assert_eq!(crd.spec.group, "apps.blocky.dev");
        assert_eq!(crd.spec.names.plural, "blockies");
        assert_eq!(crd.spec.scope, "Namespaced");

        let version = &crd.spec.versions[0];
        assert_eq!(version.name, "v1alpha1");
        assert!(version
            .subresources
            .as_ref()
            .and_then(|s| s.status.as_ref())
            .is_some());
    }

    #[test]
    fn crd_schema_bounds_size() {
        let crd = Blocky::crd();
        let schema = serde_json::to_value(&crd.spec.versions[0].schema).unwrap();
        let size = &schema["openAPIV3Schema"]["properties"]["spec"]["properties"]["size"];
        assert_eq!(size["minimum"], 1.0);
        assert_eq!(size["maximum"], 3.0);
    }

    #[test]
    fn conditions_default_to_empty() {
        let blocky = Blocky::new("demo", spec(1, 53));
        assert!(blocky.conditions().is_empty());

        let mut blocky = blocky;
        blocky.status = Some(BlockyStatus {
            conditions: vec![Condition::new(
                "Available",
                ConditionStatus::True,
                "Reconciling",
                "ok",
            )],
        });
        assert_eq!(blocky.conditions().len(), 1);
        assert!(blocky
            .status
            .as_ref()
            .and_then(|s| s.condition("Available"))
            .is_some());
    }
}
