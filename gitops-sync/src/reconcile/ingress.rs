//! Ingress document construction

use std::sync::Arc;

use async_trait::async_trait;

use crate::errors::EngineError;
use crate::manifest::kube::{
    HttpIngressPath, HttpIngressRuleValue, Ingress, IngressBackend, IngressRule, IngressSpec,
    IngressTls, IntOrString, ObjectMeta, StringMap,
};
use crate::storage::repos::{required, ServiceStore};

pub const NETWORK_LABEL: &str = "choerodon.io/network";
const INGRESS_API_VERSION: &str = "extensions/v1beta1";

/// Builds ingress documents from stored ingress and path records
#[async_trait]
pub trait IngressBuilder: Send + Sync {
    /// Ingress with one rule for `domain` and no paths yet
    fn init_ingress(&self, domain: &str, name: &str, cert_name: Option<&str>) -> Ingress;

    /// Path entry routing `path` to a stored service
    async fn create_path(
        &self,
        path: &str,
        service_id: i64,
        service_port: i64,
    ) -> Result<HttpIngressPath, EngineError>;
}

/// Resolves backend service names through the service store
pub struct DefaultIngressBuilder {
    services: Arc<dyn ServiceStore>,
}

impl DefaultIngressBuilder {
    pub fn new(services: Arc<dyn ServiceStore>) -> Self {
        Self { services }
    }
}

#[async_trait]
impl IngressBuilder for DefaultIngressBuilder {
    fn init_ingress(&self, domain: &str, name: &str, cert_name: Option<&str>) -> Ingress {
        let mut labels = StringMap::new();
        labels.insert(NETWORK_LABEL.to_string(), "ingress".to_string());

        let tls = cert_name
            .filter(|cert| !cert.is_empty())
            .map(|cert| {
                vec![IngressTls {
                    hosts: vec![domain.to_string()],
                    secret_name: Some(cert.to_string()),
                }]
            });

        Ingress {
            api_version: INGRESS_API_VERSION.to_string(),
            kind: "Ingress".to_string(),
            metadata: ObjectMeta {
                name: Some(name.to_string()),
                labels: Some(labels),
                annotations: None,
            },
            spec: IngressSpec {
                tls,
                rules: vec![IngressRule {
                    host: Some(domain.to_string()),
                    http: HttpIngressRuleValue::default(),
                }],
            },
        }
    }

    async fn create_path(
        &self,
        path: &str,
        service_id: i64,
        service_port: i64,
    ) -> Result<HttpIngressPath, EngineError> {
        let service = required(self.services.get(service_id).await?, "service", service_id)?;
        Ok(HttpIngressPath {
            path: Some(path.to_string()),
            backend: IngressBackend {
                service_name: service.name,
                service_port: IntOrString::Int(service_port),
            },
        })
    }
}
