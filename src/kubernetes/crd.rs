use std::sync::Arc;

use crate::error::{OperatorError, OperatorResult};
use crate::kubernetes::api::ClusterApi;
use crate::kubernetes::kind::ResourceKind;

/// What `ensure_registered` found or did
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CrdRegistration {
    AlreadyPresent,
    Created,
}

/// Registers the CRD for a resource kind if the cluster does not have it yet
pub struct CrdBootstrapper {
    api: Arc<dyn ClusterApi>,
    kind: Arc<ResourceKind>,
}

impl CrdBootstrapper {
    pub fn new(api: Arc<dyn ClusterApi>, kind: Arc<ResourceKind>) -> Self {
        Self { api, kind }
    }

    pub async fn ensure_registered(&self) -> OperatorResult<CrdRegistration> {
        let name = self.kind.crd_name();
        log::info!("Checking for CustomResourceDefinition for {}", self.kind.kind);

        let existing = self
            .api
            .get_crd(&name)
            .await
            .map_err(OperatorError::CrdBootstrap)?;
        if existing.is_some() {
            log::info!("CustomResourceDefinition {} already exists", name);
            return Ok(CrdRegistration::AlreadyPresent);
        }

        log::info!("Creating CustomResourceDefinition: {}", name);
        match self.api.create_crd(&self.kind.crd()).await {
            Ok(()) => {}
            Err(e) if e.is_null_conditions_defect() => {
                log::debug!("Ignoring known CRD creation defect: {}", e);
            }
            Err(e) => return Err(OperatorError::CrdBootstrap(e)),
        }
        log::info!("CustomResourceDefinition {} created", name);

        Ok(CrdRegistration::Created)
    }
}
