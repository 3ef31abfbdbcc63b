use std::collections::BTreeMap;

use k8s_openapi::apiextensions_apiserver::pkg::apis::apiextensions::v1::{
    CustomResourceDefinition, CustomResourceDefinitionNames, CustomResourceDefinitionSpec,
    CustomResourceDefinitionVersion, CustomResourceSubresourceStatus, CustomResourceSubresources,
    CustomResourceValidation, JSONSchemaProps,
};
use kube::api::{ApiResource, ObjectMeta};

use crate::error::OperatorResult;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Scope {
    Namespaced,
    Cluster,
}

impl std::fmt::Display for Scope {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Scope::Namespaced => write!(f, "Namespaced"),
            Scope::Cluster => write!(f, "Cluster"),
        }
    }
}

/// Describes one custom resource kind: how it is addressed on the API server
/// and how its CRD is registered.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ResourceKind {
    pub group: String,
    pub version: String,
    pub plural: String,
    pub singular: String,
    pub kind: String,
    pub scope: Scope,
    pub short_names: Vec<String>,
}

impl ResourceKind {
    /// A namespaced kind
    pub fn new(group: &str, version: &str, kind: &str, plural: &str, singular: &str) -> Self {
        Self {
            group: group.to_string(),
            version: version.to_string(),
            plural: plural.to_string(),
            singular: singular.to_string(),
            kind: kind.to_string(),
            scope: Scope::Namespaced,
            short_names: Vec::new(),
        }
    }

    pub fn with_scope(mut self, scope: Scope) -> Self {
        self.scope = scope;
        self
    }

    pub fn with_short_name(mut self, short_name: &str) -> Self {
        self.short_names.push(short_name.to_string());
        self
    }

    /// `plural.group`, the name of the CRD object
    pub fn crd_name(&self) -> String {
        format!("{}.{}", self.plural, self.group)
    }

    /// `group/version`
    pub fn api_version(&self) -> String {
        format!("{}/{}", self.group, self.version)
    }

    pub fn api_resource(&self) -> ApiResource {
        ApiResource {
            group: self.group.clone(),
            version: self.version.clone(),
            api_version: self.api_version(),
            kind: self.kind.clone(),
            plural: self.plural.clone(),
        }
    }

    /// The CRD registering this kind. The schema preserves unknown fields so
    /// `spec` stays opaque, and the status subresource is enabled.
    pub fn crd(&self) -> CustomResourceDefinition {
        let open_object = JSONSchemaProps {
            type_: Some("object".to_string()),
            x_kubernetes_preserve_unknown_fields: Some(true),
            ..Default::default()
        };

        let mut properties = BTreeMap::new();
        properties.insert("spec".to_string(), open_object.clone());
        properties.insert("status".to_string(), open_object);

        let schema = JSONSchemaProps {
            type_: Some("object".to_string()),
            properties: Some(properties),
            ..Default::default()
        };

        CustomResourceDefinition {
            metadata: ObjectMeta {
                name: Some(self.crd_name()),
                ..Default::default()
            },
            spec: CustomResourceDefinitionSpec {
                group: self.group.clone(),
                names: CustomResourceDefinitionNames {
                    kind: self.kind.clone(),
                    plural: self.plural.clone(),
                    singular: Some(self.singular.clone()),
                    short_names: if self.short_names.is_empty() {
                        None
                    } else {
                        Some(self.short_names.clone())
                    },
                    ..Default::default()
                },
                scope: self.scope.to_string(),
                versions: vec![CustomResourceDefinitionVersion {
                    name: self.version.clone(),
                    served: true,
                    storage: true,
                    schema: Some(CustomResourceValidation {
                        open_api_v3_schema: Some(schema),
                    }),
                    subresources: Some(CustomResourceSubresources {
                        status: Some(CustomResourceSubresourceStatus(serde_json::json!({}))),
                        ..Default::default()
                    }),
                    ..Default::default()
                }],
                ..Default::default()
            },
            status: None,
        }
    }

    /// The CRD as a YAML manifest
    pub fn crd_yaml(&self) -> OperatorResult<String> {
        Ok(serde_yaml::to_string(&self.crd())?)
    }
}
