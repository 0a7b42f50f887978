/*
 * Copyright (C) 2025 Pedro Henrique / phkaiser13
 *
 * File: target.rs
 *
 * Target introspection and spec defaulting (spec.4.2). The engine supports
 * two workload kinds, `Deployment` and the OpenShift-specific
 * `DeploymentConfig`. Both are modeled behind one small capability trait so
 * the rest of the engine never switches on a string kind name beyond the
 * initial API dispatch that decides which one to fetch.
 *
 * `Deployment` comes from `k8s_openapi`. `DeploymentConfig` is not part of
 * upstream Kubernetes, so it is hand-rolled here the way this ecosystem
 * models third-party API-group resources it does not own a generated crate
 * for: a plain struct implementing `k8s_openapi::Resource`/`Metadata`
 * manually, which `kube::Api` accepts via its blanket `Resource` impl.
 *
 * SPDX-License-Identifier: Apache-2.0
 */

use k8s_openapi::api::apps::v1::Deployment;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::{LabelSelector, ObjectMeta};
use k8s_openapi::apimachinery::pkg::util::intstr::IntOrString;
use k8s_openapi::{ListableResource, Metadata, NamespaceResourceScope, Resource as K8sResource};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::crds::CanarySpec;
use crate::error::Error;

/// A single container port, reduced to what the defaulting logic needs.
#[derive(Clone, Debug)]
pub struct ContainerPort {
    pub name: Option<String>,
    pub container_port: i32,
    pub protocol: Option<String>,
}

/// A single container, reduced to what the defaulting logic needs.
#[derive(Clone, Debug)]
pub struct ContainerView {
    pub name: String,
    pub ports: Vec<ContainerPort>,
}

/// Capability every polymorphic target kind exposes to the engine.
pub trait PodTemplateOwner {
    fn containers(&self) -> Vec<ContainerView>;
    fn selector_labels(&self) -> BTreeMap<String, String>;
}

impl PodTemplateOwner for Deployment {
    fn containers(&self) -> Vec<ContainerView> {
        extract_containers(
            self.spec
                .as_ref()
                .and_then(|s| s.template.spec.as_ref())
                .map(|p| p.containers.as_slice())
                .unwrap_or(&[]),
        )
    }

    fn selector_labels(&self) -> BTreeMap<String, String> {
        self.spec
            .as_ref()
            .and_then(|s| s.selector.match_labels.clone())
            .map(|m| m.into_iter().collect())
            .unwrap_or_default()
    }
}

fn extract_containers(containers: &[k8s_openapi::api::core::v1::Container]) -> Vec<ContainerView> {
    containers
        .iter()
        .map(|c| ContainerView {
            name: c.name.clone(),
            ports: c
                .ports
                .as_ref()
                .map(|ports| {
                    ports
                        .iter()
                        .map(|p| ContainerPort {
                            name: p.name.clone(),
                            container_port: p.container_port,
                            protocol: p.protocol.clone(),
                        })
                        .collect()
                })
                .unwrap_or_default(),
        })
        .collect()
}

/// OpenShift's `DeploymentConfig`. Not present in `k8s_openapi`; modeled by
/// hand with just the shape the engine reads (pod template + selector).
#[derive(Clone, Debug, Deserialize, Serialize, Default)]
pub struct DeploymentConfig {
    pub metadata: ObjectMeta,
    pub spec: Option<DeploymentConfigSpec>,
}

#[derive(Clone, Debug, Deserialize, Serialize, Default)]
pub struct DeploymentConfigSpec {
    #[serde(default)]
    pub selector: BTreeMap<String, String>,
    pub template: Option<DeploymentConfigPodTemplate>,
}

#[derive(Clone, Debug, Deserialize, Serialize, Default)]
pub struct DeploymentConfigPodTemplate {
    pub spec: Option<DeploymentConfigPodSpec>,
}

#[derive(Clone, Debug, Deserialize, Serialize, Default)]
pub struct DeploymentConfigPodSpec {
    #[serde(default)]
    pub containers: Vec<k8s_openapi::api::core::v1::Container>,
}

impl K8sResource for DeploymentConfig {
    const API_VERSION: &'static str = "apps.openshift.io/v1";
    const GROUP: &'static str = "apps.openshift.io";
    const KIND: &'static str = "DeploymentConfig";
    const VERSION: &'static str = "v1";
    const URL_PATH_SEGMENT: &'static str = "deploymentconfigs";
    type Scope = NamespaceResourceScope;
}

impl ListableResource for DeploymentConfig {
    const LIST_KIND: &'static str = "DeploymentConfigList";
}

impl Metadata for DeploymentConfig {
    type Ty = ObjectMeta;

    fn metadata(&self) -> &Self::Ty {
        &self.metadata
    }

    fn metadata_mut(&mut self) -> &mut Self::Ty {
        &mut self.metadata
    }
}

impl PodTemplateOwner for DeploymentConfig {
    fn containers(&self) -> Vec<ContainerView> {
        extract_containers(
            self.spec
                .as_ref()
                .and_then(|s| s.template.as_ref())
                .and_then(|t| t.spec.as_ref())
                .map(|p| p.containers.as_slice())
                .unwrap_or(&[]),
        )
    }

    fn selector_labels(&self) -> BTreeMap<String, String> {
        self.spec.as_ref().map(|s| s.selector.clone()).unwrap_or_default()
    }
}

/// Result of attempting to default-fill a not-yet-initialized spec.
pub enum InitOutcome {
    /// `spec.initialized` was already true; no mutation performed.
    AlreadyInitialized,
    /// Defaults were filled in; caller must persist `spec` and end the tick.
    JustInitialized,
}

/// Implements spec.4.2: extract containers/ports/selector from the resolved
/// target and fill any empty `targetRef*` fields on `spec`.
pub fn fill_defaults(spec: &mut CanarySpec, target: &impl PodTemplateOwner) -> Result<InitOutcome, Error> {
    if spec.initialized {
        return Ok(InitOutcome::AlreadyInitialized);
    }

    let containers = target.containers();
    if containers.is_empty() {
        return Err(Error::TargetResolution(
            "target has no containers in its pod template".into(),
        ));
    }

    let container = if spec.target_ref_container_name.is_empty() {
        &containers[0]
    } else {
        containers
            .iter()
            .find(|c| c.name == spec.target_ref_container_name)
            .ok_or_else(|| {
                Error::Validation(format!(
                    "container '{}' not found on target",
                    spec.target_ref_container_name
                ))
            })?
    };
    spec.target_ref_container_name = container.name.clone();

    if container.ports.is_empty() {
        return Err(Error::TargetResolution(format!(
            "container '{}' exposes no ports",
            container.name
        )));
    }

    if spec.container_port_is_empty() {
        let port = container
            .ports
            .iter()
            .find(|p| p.name.is_some())
            .unwrap_or(&container.ports[0]);
        spec.target_ref_container_port = match &port.name {
            Some(name) => IntOrString::String(name.clone()),
            None => IntOrString::Int(port.container_port),
        };
        if spec.target_ref_container_protocol.is_empty() {
            spec.target_ref_container_protocol =
                port.protocol.clone().unwrap_or_else(|| "TCP".to_string());
        }
    }

    if spec.target_ref_selector.is_empty() {
        spec.target_ref_selector = target.selector_labels();
    }

    spec.initialized = true;
    Ok(InitOutcome::JustInitialized)
}

/// A type-erased view over whichever target kind was resolved, used only to
/// satisfy `PodTemplateOwner` generically at the one call site that needs it.
pub enum ResolvedTarget {
    Deployment(Deployment),
    DeploymentConfig(DeploymentConfig),
}

impl PodTemplateOwner for ResolvedTarget {
    fn containers(&self) -> Vec<ContainerView> {
        match self {
            ResolvedTarget::Deployment(d) => d.containers(),
            ResolvedTarget::DeploymentConfig(dc) => dc.containers(),
        }
    }

    fn selector_labels(&self) -> BTreeMap<String, String> {
        match self {
            ResolvedTarget::Deployment(d) => d.selector_labels(),
            ResolvedTarget::DeploymentConfig(dc) => dc.selector_labels(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crds::{CanaryAnalysis, CanaryType, Metric, Operator, TargetRef};

    fn base_spec() -> CanarySpec {
        CanarySpec {
            enabled: true,
            initialized: false,
            type_: CanaryType::Native,
            service_name: "podinfo".into(),
            target_ref: TargetRef {
                api_version: "apps/v1".into(),
                kind: "Deployment".into(),
                name: "podinfo".into(),
            },
            target_ref_selector: BTreeMap::new(),
            target_ref_container_name: String::new(),
            target_ref_container_port: IntOrString::String(String::new()),
            target_ref_container_protocol: String::new(),
            canary_analysis: CanaryAnalysis {
                metrics_server: "http://prom".into(),
                interval: 10,
                threshold: 5,
                max_weight: 50,
                step_weight: 10,
                metric: Metric {
                    name: "request-success-rate".into(),
                    threshold: 99.0,
                    interval: 10,
                    prometheus_query: "sum(rate(http_requests_total[1m]))".into(),
                    operator: Operator::Ge,
                },
            },
        }
    }

    fn target_with_ports() -> ResolvedTarget {
        ResolvedTarget::Deployment(Deployment {
            spec: Some(k8s_openapi::api::apps::v1::DeploymentSpec {
                selector: LabelSelector {
                    match_labels: Some(BTreeMap::from([("app".to_string(), "podinfo".to_string())])),
                    ..Default::default()
                },
                template: k8s_openapi::api::core::v1::PodTemplateSpec {
                    spec: Some(k8s_openapi::api::core::v1::PodSpec {
                        containers: vec![k8s_openapi::api::core::v1::Container {
                            name: "app".into(),
                            ports: Some(vec![k8s_openapi::api::core::v1::ContainerPort {
                                name: Some("http".into()),
                                container_port: 9898,
                                protocol: Some("TCP".into()),
                                ..Default::default()
                            }]),
                            ..Default::default()
                        }],
                        ..Default::default()
                    }),
                    ..Default::default()
                },
                ..Default::default()
            }),
            ..Default::default()
        })
    }

    #[test]
    fn s1_bootstrap_fills_every_default() {
        let mut spec = base_spec();
        let target = target_with_ports();

        let outcome = fill_defaults(&mut spec, &target).expect("defaulting succeeds");
        assert!(matches!(outcome, InitOutcome::JustInitialized));
        assert!(spec.initialized);
        assert_eq!(spec.target_ref_container_name, "app");
        assert_eq!(
            spec.target_ref_container_port,
            IntOrString::String("http".into())
        );
        assert_eq!(spec.target_ref_container_protocol, "TCP");
        assert_eq!(
            spec.target_ref_selector,
            BTreeMap::from([("app".to_string(), "podinfo".to_string())])
        );
    }

    #[test]
    fn already_initialized_is_a_noop() {
        let mut spec = base_spec();
        spec.initialized = true;
        spec.target_ref_container_name = "keep-me".into();
        let target = target_with_ports();

        let outcome = fill_defaults(&mut spec, &target).expect("defaulting succeeds");
        assert!(matches!(outcome, InitOutcome::AlreadyInitialized));
        assert_eq!(spec.target_ref_container_name, "keep-me");
    }

    #[test]
    fn empty_containers_is_an_error() {
        let mut spec = base_spec();
        let target = ResolvedTarget::Deployment(Deployment::default());
        assert!(fill_defaults(&mut spec, &target).is_err());
    }
}
