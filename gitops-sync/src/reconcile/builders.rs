//! Desired-state documents built from stored records

use std::sync::Arc;

use tracing::{debug, info};

use crate::errors::EngineError;
use crate::manifest::kube::{
    C7nHelmRelease, Ingress, IntOrString, ObjectMeta, Service, ServicePort, ServiceSpec, StringMap,
};
use crate::manifest::values::ValuesMerger;
use crate::reconcile::ingress::{IngressBuilder, NETWORK_LABEL};
use crate::storage::models::{ApplicationInstance, DevopsIngress, DevopsService, PortMap};
use crate::storage::repos::{
    required, ApplicationStore, IngressStore, InstanceStore, ResourceDetailStore, ServiceStore,
    VersionStore,
};
use crate::utils::join_url;

const SERVICE_KIND: &str = "Service";
const DEFAULT_PROTOCOL: &str = "TCP";
const NO_TARGET_PORT: &str = "<none>";

/// Stores and services a [`ManifestBuilder`] reads from
#[derive(Clone)]
pub struct BuilderDeps {
    pub instances: Arc<dyn InstanceStore>,
    pub versions: Arc<dyn VersionStore>,
    pub applications: Arc<dyn ApplicationStore>,
    pub services: Arc<dyn ServiceStore>,
    pub ingresses: Arc<dyn IngressStore>,
    pub resource_details: Arc<dyn ResourceDetailStore>,
    pub values: Arc<dyn ValuesMerger>,
    pub ingress_builder: Arc<dyn IngressBuilder>,
}

pub struct ManifestBuilder {
    deps: BuilderDeps,
    helm_base_url: String,
}

impl ManifestBuilder {
    pub fn new(deps: BuilderDeps, helm_base_url: impl Into<String>) -> Self {
        Self {
            deps,
            helm_base_url: helm_base_url.into(),
        }
    }

    /// Helm release for an application instance
    pub async fn release(&self, instance: &ApplicationInstance) -> Result<C7nHelmRelease, EngineError> {
        let version = required(
            self.deps.versions.get(instance.version_id).await?,
            "application version",
            instance.version_id,
        )?;
        let app = required(
            self.deps.applications.get(instance.app_id).await?,
            "application",
            instance.app_id,
        )?;
        let overrides = self.deps.instances.env_values(instance.env_id, app.id).await?;
        let values = self
            .deps
            .values
            .merge(version.values.as_deref().unwrap_or_default(), overrides.as_deref())?;

        let mut release = C7nHelmRelease::new(instance.code.as_str());
        release.spec.repo_url = Some(join_url(&self.helm_base_url, &version.repository));
        release.spec.chart_name = Some(app.code);
        release.spec.chart_version = Some(version.version);
        release.spec.values = Some(values.trim().to_string());
        Ok(release)
    }

    /// Service document; may persist ports derived from observed state
    pub async fn service(&self, record: &DevopsService) -> Result<Service, EngineError> {
        let mut labels = StringMap::new();
        labels.insert(NETWORK_LABEL.to_string(), "service".to_string());

        let metadata = ObjectMeta {
            name: Some(record.name.clone()),
            labels: Some(labels),
            annotations: parse_string_map(record.annotations.as_deref(), "annotations")?,
        };

        let external_ips = record
            .external_ip
            .as_deref()
            .filter(|ips| !ips.is_empty())
            .map(|ips| ips.split(',').map(str::to_string).collect());

        let spec = ServiceSpec {
            ports: self.service_ports(record).await?,
            selector: parse_string_map(record.labels.as_deref(), "selector")?,
            external_ips,
            session_affinity: Some("None".to_string()),
            service_type: Some("ClusterIP".to_string()),
        };

        Ok(Service {
            api_version: "v1".to_string(),
            kind: SERVICE_KIND.to_string(),
            metadata,
            spec,
        })
    }

    async fn service_ports(&self, record: &DevopsService) -> Result<Option<Vec<ServicePort>>, EngineError> {
        if let Some(ports) = &record.ports {
            return Ok(Some(explicit_ports(ports)));
        }

        let Some(derived) = self.derive_port(record).await? else {
            debug!("Service {} has no ports and no backing instance", record.name);
            return Ok(None);
        };

        let port = ServicePort {
            name: derived.name.clone(),
            protocol: derived.protocol.clone(),
            port: derived.port,
            target_port: derived.target_port.as_deref().map(IntOrString::parse),
            node_port: None,
        };

        let mut updated = record.clone();
        updated.ports = Some(vec![derived]);
        self.deps.services.update(&updated).await?;
        info!("Persisted observed port of service {}", record.name);

        Ok(Some(vec![port]))
    }

    /// First port of the live Service last observed for the first backing instance
    async fn derive_port(&self, record: &DevopsService) -> Result<Option<PortMap>, EngineError> {
        let Some(instance_id) = self.deps.services.backing_instances(record.id).await?.first().copied()
        else {
            return Ok(None);
        };

        let message = self
            .deps
            .resource_details
            .observed(instance_id, SERVICE_KIND, &record.name)
            .await?
            .ok_or_else(|| {
                EngineError::LookupError(format!(
                    "observed service {} of instance {} not found",
                    record.name, instance_id
                ))
            })?;
        let observed: Service = serde_json::from_str(&message).map_err(|e| {
            EngineError::SerializationError(format!("observed service {}: {}", record.name, e))
        })?;
        let first = observed
            .spec
            .ports
            .and_then(|ports| ports.into_iter().next())
            .ok_or_else(|| {
                EngineError::LookupError(format!("observed service {} has no ports", record.name))
            })?;

        Ok(Some(PortMap {
            name: first.name,
            protocol: first.protocol,
            port: first.port,
            target_port: Some(
                first
                    .target_port
                    .map(|p| p.to_string())
                    .unwrap_or_else(|| NO_TARGET_PORT.to_string()),
            ),
            node_port: None,
        }))
    }

    /// Ingress with one path per stored path record, in stored order
    pub async fn ingress(&self, record: &DevopsIngress) -> Result<Ingress, EngineError> {
        let builder = &self.deps.ingress_builder;
        let mut ingress = builder.init_ingress(&record.domain, &record.name, record.cert_name.as_deref());

        let mut paths = Vec::new();
        for path in self.deps.ingresses.list_paths(record.id).await? {
            paths.push(
                builder
                    .create_path(&path.path, path.service_id, path.service_port)
                    .await?,
            );
        }

        match ingress.spec.rules.first_mut() {
            Some(rule) => rule.http.paths.extend(paths),
            None => {
                return Err(EngineError::SerializationError(format!(
                    "ingress {} has no rule to attach paths to",
                    record.name
                )))
            }
        }
        Ok(ingress)
    }
}

/// Stored ports, naming unnamed entries `http0`, `http1`, ...
fn explicit_ports(ports: &[PortMap]) -> Vec<ServicePort> {
    let mut serial = 0;
    ports
        .iter()
        .map(|p| {
            let name = match &p.name {
                Some(name) => name.clone(),
                None => {
                    let name = format!("http{}", serial);
                    serial += 1;
                    name
                }
            };
            ServicePort {
                name: Some(name),
                protocol: Some(p.protocol.clone().unwrap_or_else(|| DEFAULT_PROTOCOL.to_string())),
                port: p.port,
                target_port: p.target_port.as_deref().map(IntOrString::parse),
                node_port: p.node_port,
            }
        })
        .collect()
}

/// Parse a stored JSON object of strings; blank input means absent
fn parse_string_map(raw: Option<&str>, field: &str) -> Result<Option<StringMap>, EngineError> {
    match raw {
        Some(text) if !text.trim().is_empty() => serde_json::from_str(text)
            .map(Some)
            .map_err(|e| EngineError::SerializationError(format!("invalid {} json: {}", field, e))),
        _ => Ok(None),
    }
}
