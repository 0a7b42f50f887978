/*
 * Copyright (C) 2025 Pedro Henrique / phkaiser13
 *
 * File: routing.rs
 *
 * The routing writer (spec.4.3): ensures the per-version backend `Service`
 * and rewrites the weighted routing object that splits traffic between a
 * primary and an optional canary backend.
 *
 * The routing object modeled here is OpenShift's `Route`
 * (`route.openshift.io/v1`), whose native `spec.to`/`spec.alternateBackends`
 * weight split is exactly the "primary + alternate backend" shape this
 * engine needs for `Native`-type canaries — and, like `DeploymentConfig` in
 * `target.rs`, it is not present in `k8s_openapi`, so it is hand-rolled the
 * same way.
 *
 * SPDX-License-Identifier: Apache-2.0
 */

use k8s_openapi::api::core::v1::{Service, ServicePort, ServiceSpec};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::{OwnerReference, ObjectMeta};
use k8s_openapi::apimachinery::pkg::util::intstr::IntOrString;
use k8s_openapi::{ListableResource, Metadata, NamespaceResourceScope, Resource as K8sResource};
use kube::api::{Patch, PatchParams};
use kube::{Api, Client, ResourceExt};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::crds::{CanarySpec, Release};
use crate::error::Error;

const FIELD_MANAGER: &str = "kharon-operator";

/// OpenShift `Route`, modeled only as far as the engine reads/writes it.
#[derive(Clone, Debug, Deserialize, Serialize, Default)]
pub struct Route {
    pub metadata: ObjectMeta,
    pub spec: Option<RouteSpec>,
}

#[derive(Clone, Debug, Deserialize, Serialize, Default)]
pub struct RouteSpec {
    pub to: RouteTargetReference,
    #[serde(rename = "alternateBackends", default, skip_serializing_if = "Vec::is_empty")]
    pub alternate_backends: Vec<RouteTargetReference>,
}

#[derive(Clone, Debug, Deserialize, Serialize, Default)]
pub struct RouteTargetReference {
    pub kind: String,
    pub name: String,
    pub weight: i32,
}

impl K8sResource for Route {
    const API_VERSION: &'static str = "route.openshift.io/v1";
    const GROUP: &'static str = "route.openshift.io";
    const KIND: &'static str = "Route";
    const VERSION: &'static str = "v1";
    const URL_PATH_SEGMENT: &'static str = "routes";
    type Scope = NamespaceResourceScope;
}

impl ListableResource for Route {
    const LIST_KIND: &'static str = "RouteList";
}

impl Metadata for Route {
    type Ty = ObjectMeta;

    fn metadata(&self) -> &Self::Ty {
        &self.metadata
    }

    fn metadata_mut(&mut self) -> &mut Self::Ty {
        &mut self.metadata
    }
}

/// Implements spec.4.3 EnsureBackendService: a per-version `ClusterIP`
/// service named `spec.targetRef.name`, selecting `spec.targetRefSelector`.
pub async fn ensure_backend_service(
    client: &Client,
    namespace: &str,
    spec: &CanarySpec,
    owner: OwnerReference,
) -> Result<(), Error> {
    let port_name = match &spec.target_ref_container_port {
        IntOrString::String(name) if !name.is_empty() => name.clone(),
        IntOrString::Int(port) => format!("{}-{}", port, spec.target_ref_container_protocol.to_lowercase()),
        IntOrString::String(_) => "0-tcp".to_string(),
    };

    let port_number = match &spec.target_ref_container_port {
        IntOrString::Int(port) => *port,
        IntOrString::String(_) => 0,
    };

    let service = Service {
        metadata: ObjectMeta {
            name: Some(spec.target_ref.name.clone()),
            namespace: Some(namespace.to_string()),
            owner_references: Some(vec![owner]),
            ..Default::default()
        },
        spec: Some(ServiceSpec {
            selector: Some(spec.target_ref_selector.clone().into_iter().collect::<BTreeMap<_, _>>()),
            ports: Some(vec![ServicePort {
                name: Some(port_name),
                protocol: Some(spec.target_ref_container_protocol.clone()),
                port: if port_number != 0 { port_number } else { 80 },
                target_port: Some(spec.target_ref_container_port.clone()),
                ..Default::default()
            }]),
            session_affinity: Some("None".to_string()),
            type_: Some("ClusterIP".to_string()),
            ..Default::default()
        }),
        ..Default::default()
    };

    let api: Api<Service> = Api::namespaced(client.clone(), namespace);
    api.patch(
        &spec.target_ref.name,
        &PatchParams::apply(FIELD_MANAGER),
        &Patch::Apply(&service),
    )
    .await
    .map_err(|e| Error::Routing(format!("could not ensure backend service: {e}")))?;

    Ok(())
}

/// Implements spec.4.3 EnsureRouting: creates or rewrites the `Route` named
/// `spec.serviceName` with `to = primary` and, if `canary` is given, a
/// single alternate backend entry whose weight is `100 − primary.weight`.
pub async fn ensure_routing(
    client: &Client,
    namespace: &str,
    spec: &CanarySpec,
    owner: OwnerReference,
    primary: &Release,
    primary_weight: i32,
    canary: Option<&Release>,
) -> Result<(), Error> {
    let alternate_backends = match canary {
        Some(canary) => vec![RouteTargetReference {
            kind: "Service".to_string(),
            name: canary.name.clone(),
            weight: 100 - primary_weight,
        }],
        None => Vec::new(),
    };

    let route = Route {
        metadata: ObjectMeta {
            name: Some(spec.service_name.clone()),
            namespace: Some(namespace.to_string()),
            owner_references: Some(vec![owner]),
            ..Default::default()
        },
        spec: Some(RouteSpec {
            to: RouteTargetReference {
                kind: "Service".to_string(),
                name: primary.name.clone(),
                weight: primary_weight,
            },
            alternate_backends,
        }),
    };

    let api: Api<Route> = Api::namespaced(client.clone(), namespace);
    api.patch(
        &spec.service_name,
        &PatchParams::apply(FIELD_MANAGER),
        &Patch::Apply(&route),
    )
    .await
    .map_err(|e| Error::Routing(format!("could not ensure routing object: {e}")))?;

    Ok(())
}

/// Reads the current `Route`; a missing object is a `RoutingError` in the
/// `ProgressCanaryRelease`/`EndCanaryRelease`/`RollbackRelease` actions,
/// which all expect it to already exist (spec.4.5).
pub async fn get_routing(client: &Client, namespace: &str, service_name: &str) -> Result<Route, Error> {
    let api: Api<Route> = Api::namespaced(client.clone(), namespace);
    api.get(service_name)
        .await
        .map_err(|e| Error::Routing(format!("routing object '{service_name}' not found: {e}")))
}

pub fn owner_reference_for(canary: &crate::crds::Canary) -> OwnerReference {
    OwnerReference {
        api_version: crate::crds::Canary::api_version(&()).to_string(),
        kind: crate::crds::Canary::kind(&()).to_string(),
        name: canary.name_any(),
        uid: canary.uid().unwrap_or_default(),
        controller: Some(true),
        block_owner_deletion: Some(true),
    }
}
